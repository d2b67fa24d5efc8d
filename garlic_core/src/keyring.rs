//! Shared storage for private keys.
//!
//! The keyring is the only holder of secret key material in the process.
//! Components refer to keys by short id and ask the keyring to decrypt on
//! their behalf; chain teardown deletes every session key it minted.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::RwLock;

use garlic_crypto::{open, PublicKey, SecretKey, ShortId};

/// Error that can happen when asking the keyring to decrypt a message.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum KeyringError {
    /// No key with the given id is stored.
    #[error("No key with id {0}")]
    UnknownKey(ShortId),
    /// The sealed box did not open under the named key.
    #[error("Failed to decrypt message")]
    Decrypt,
}

/// Capability-keyed map of private keys.
#[derive(Clone, Default)]
pub struct Keyring {
    keys: Arc<RwLock<HashMap<ShortId, SecretKey>>>,
}

impl Keyring {
    /// Create an empty `Keyring`.
    pub fn new() -> Keyring {
        Keyring::default()
    }

    /// Store a key, returning the short id it is addressed by.
    pub async fn add_key(&self, sk: SecretKey) -> ShortId {
        let id = ShortId::of(&sk.public_key());
        self.keys.write().await.insert(id, sk);
        id
    }

    /// Delete a key. Returns whether it was present.
    pub async fn del_key(&self, id: &ShortId) -> bool {
        self.keys.write().await.remove(id).is_some()
    }

    /// Public half of a stored key.
    pub async fn get_public_key(&self, id: &ShortId) -> Option<PublicKey> {
        self.keys.read().await.get(id).map(|sk| sk.public_key())
    }

    /// Open a sealed box with the named key.
    pub async fn decrypt_message(&self, id: &ShortId, data: &[u8]) -> Result<Vec<u8>, KeyringError> {
        let keys = self.keys.read().await;
        let sk = keys.get(id).ok_or(KeyringError::UnknownKey(*id))?;
        open(sk, data).map_err(|()| KeyringError::Decrypt)
    }
}
