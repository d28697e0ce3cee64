//! Provider error taxonomy shared by every adapter.

use thiserror::Error;

use crate::broadcast::BroadcastStatus;

/// Typed failures from provider adapters. Every variant carries the
/// adapter's name for attribution in logs.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Missing or invalid credentials; fatal at adapter construction.
    #[error("{provider}: configuration error: {message}")]
    Configuration {
        provider: &'static str,
        message: String,
    },

    /// Non-2xx response or transport failure; raw status/body preserved.
    #[error("{provider}: provider request failed (status {status:?}): {body}")]
    Remote {
        provider: &'static str,
        status: Option<u16>,
        body: String,
    },

    /// Remote entity absent.
    #[error("{provider}: {entity} not found")]
    NotFound {
        provider: &'static str,
        entity: String,
    },

    /// Edit or delete attempted outside the adapter's editable-status set.
    #[error("{provider}: broadcast in status '{status}' is not editable", status = .status.as_str())]
    InvalidStatus {
        provider: &'static str,
        status: BroadcastStatus,
    },

    /// Capability gap: the provider has no API for this operation. Expected
    /// and handled gracefully by callers, not a bug.
    #[error("{provider}: operation '{operation}' is not supported")]
    NotSupported {
        provider: &'static str,
        operation: &'static str,
    },

    /// Malformed local input, caught before any network call.
    #[error("{provider}: validation failed: {message}")]
    Validation {
        provider: &'static str,
        message: String,
    },
}

impl ProviderError {
    pub fn provider(&self) -> &'static str {
        match self {
            ProviderError::Configuration { provider, .. }
            | ProviderError::Remote { provider, .. }
            | ProviderError::NotFound { provider, .. }
            | ProviderError::InvalidStatus { provider, .. }
            | ProviderError::NotSupported { provider, .. }
            | ProviderError::Validation { provider, .. } => provider,
        }
    }

    pub fn is_not_supported(&self) -> bool {
        matches!(self, ProviderError::NotSupported { .. })
    }

    /// Short machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            ProviderError::Configuration { .. } => "configuration_error",
            ProviderError::Remote { .. } => "provider_error",
            ProviderError::NotFound { .. } => "not_found",
            ProviderError::InvalidStatus { .. } => "invalid_status",
            ProviderError::NotSupported { .. } => "not_supported",
            ProviderError::Validation { .. } => "validation_error",
        }
    }
}
