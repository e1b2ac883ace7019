//! Wire transport to provider endpoints.
//!
//! Transport-level failures (network, 5xx) are transient and retried at the
//! step boundary; business-level rejections (4xx with a reason) are final.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::model::{CommandResult, Provider, ProviderCommandMessage};

#[derive(Error, Debug)]
pub enum TransportError {
    /// Could not reach the provider or it answered with a server error;
    /// worth retrying.
    #[error("provider '{provider_id}' unreachable: {message}")]
    Unreachable {
        provider_id: String,
        message: String,
    },

    /// The provider understood the delivery and refused it; never retried.
    #[error("provider '{provider_id}' rejected delivery: {message}")]
    Rejected {
        provider_id: String,
        message: String,
    },
}

impl TransportError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unreachable { .. })
    }
}

/// Delivery of command messages to a provider endpoint.
///
/// A provider may answer [`send`](Self::send) with a final result right away,
/// or acknowledge with an active (pending/running) result and resolve the
/// callback URL later.
#[async_trait]
pub trait ProviderTransport: Send + Sync {
    async fn send(
        &self,
        provider: &Provider,
        message: &ProviderCommandMessage,
    ) -> Result<CommandResult, TransportError>;

    /// Last-chance result fetch after the callback wait ceiling elapsed.
    async fn fetch_result(
        &self,
        provider: &Provider,
        command_id: Uuid,
    ) -> Result<CommandResult, TransportError>;
}

/// HTTP transport: `POST {endpoint}` with the command message,
/// `GET {endpoint}/{command_id}` for the last-chance fetch.
#[derive(Debug, Clone)]
pub struct HttpProviderTransport {
    client: reqwest::Client,
}

impl HttpProviderTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    fn classify(provider: &Provider, err: reqwest::Error) -> TransportError {
        let provider_id = provider.id.clone();
        match err.status() {
            Some(status) if status.is_client_error() => TransportError::Rejected {
                provider_id,
                message: format!("HTTP {status}"),
            },
            Some(status) => TransportError::Unreachable {
                provider_id,
                message: format!("HTTP {status}"),
            },
            None => TransportError::Unreachable {
                provider_id,
                message: err.to_string(),
            },
        }
    }
}

impl Default for HttpProviderTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderTransport for HttpProviderTransport {
    async fn send(
        &self,
        provider: &Provider,
        message: &ProviderCommandMessage,
    ) -> Result<CommandResult, TransportError> {
        let response = self
            .client
            .post(provider.endpoint.clone())
            .json(message)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| Self::classify(provider, err))?;

        response
            .json::<CommandResult>()
            .await
            .map_err(|err| TransportError::Unreachable {
                provider_id: provider.id.clone(),
                message: format!("invalid result payload: {err}"),
            })
    }

    async fn fetch_result(
        &self,
        provider: &Provider,
        command_id: Uuid,
    ) -> Result<CommandResult, TransportError> {
        let url = format!(
            "{}/{command_id}",
            provider.endpoint.as_str().trim_end_matches('/')
        );
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| Self::classify(provider, err))?;

        response
            .json::<CommandResult>()
            .await
            .map_err(|err| TransportError::Unreachable {
                provider_id: provider.id.clone(),
                message: format!("invalid result payload: {err}"),
            })
    }
}
