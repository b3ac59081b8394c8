//! Identity Provider
//!
//! Resolves a request credential to the owner it was issued for. The ledger
//! core never inspects credentials; it only receives the resolved owner id.

use async_trait::async_trait;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::OwnerId;

/// Credential resolution failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Unauthorized request: no access token found")]
    MissingCredential,

    #[error("Access token is invalid or has been revoked")]
    InvalidCredential,
}

/// Resolves and issues bearer credentials
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Owner the credential was issued for
    async fn resolve(&self, credential: &str) -> Result<OwnerId, AuthError>;

    /// Issue a new credential for an owner
    async fn issue(&self, owner_id: OwnerId) -> String;

    /// Forget a credential. Returns whether it was known.
    async fn revoke(&self, credential: &str) -> bool;
}

/// Opaque random tokens, stored only as SHA-256 digests.
#[derive(Debug, Default)]
pub struct TokenIdentityProvider {
    tokens: RwLock<HashMap<String, OwnerId>>,
}

impl TokenIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityProvider for TokenIdentityProvider {
    async fn resolve(&self, credential: &str) -> Result<OwnerId, AuthError> {
        if credential.is_empty() {
            return Err(AuthError::MissingCredential);
        }
        let tokens = self.tokens.read().await;
        tokens
            .get(&hash_token(credential))
            .copied()
            .ok_or(AuthError::InvalidCredential)
    }

    async fn issue(&self, owner_id: OwnerId) -> String {
        let token = generate_token();
        let mut tokens = self.tokens.write().await;
        tokens.insert(hash_token(&token), owner_id);
        token
    }

    async fn revoke(&self, credential: &str) -> bool {
        let mut tokens = self.tokens.write().await;
        tokens.remove(&hash_token(credential)).is_some()
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
