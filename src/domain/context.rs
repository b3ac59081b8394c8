//! Operation Context
//!
//! Contains metadata about the current operation for tracing.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use uuid::Uuid;

use super::OwnerId;

/// Context for an operation, attached to log records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationContext {
    /// Owner resolved from the request credential
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_owner_id: Option<OwnerId>,

    /// Correlation ID for request tracing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,

    /// Client IP address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<IpAddr>,
}

impl OperationContext {
    /// Create a new empty context
    pub fn new() -> Self {
        Self {
            request_owner_id: None,
            correlation_id: None,
            client_ip: None,
        }
    }

    /// Create context with the authenticated owner
    pub fn with_request_owner(mut self, owner_id: OwnerId) -> Self {
        self.request_owner_id = Some(owner_id);
        self
    }

    /// Create context with correlation ID
    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Create context with client IP
    pub fn with_client_ip(mut self, ip: IpAddr) -> Self {
        self.client_ip = Some(ip);
        self
    }

    /// Generate a new correlation ID if not present
    pub fn ensure_correlation_id(&mut self) -> Uuid {
        *self.correlation_id.get_or_insert_with(Uuid::new_v4)
    }
}

impl Default for OperationContext {
    fn default() -> Self {
        Self::new()
    }
}
