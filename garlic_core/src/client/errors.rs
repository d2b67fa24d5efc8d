//! Errors of the garlic client manager and its chain builder.

use futures::channel::mpsc::SendError;
use thiserror::Error;

use garlic_crypto::ShortId;

/// Error that can happen when onion-wrapping and sending a message.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum WrapMessageError {
    /// The wrapped message would not fit a datagram.
    #[error("Message too large")]
    Oversize,
    /// Send packet(s) error.
    #[error("Send packet(s) error")]
    SendTo(SendError),
}

/// Error that can happen when attempting to build a chain.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum InitConnectionError {
    /// A chain of length zero was requested.
    #[error("Invalid chain length")]
    InvalidArgument,
    /// The directory does not hold enough usable relays.
    #[error("Not enough relays: {available} of {required}")]
    Exhausted {
        /// Relays currently usable for selection.
        available: usize,
        /// Requested chain length.
        required: usize,
    },
    /// Sending the chain setup bundle failed.
    #[error("Failed to send init message: {0}")]
    Wrap(WrapMessageError),
}

/// Error that can happen when registering a secret identity.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum CreateSecretIdError {
    /// The identity is already registered.
    #[error("Duplicate secret id {0}")]
    Duplicate(ShortId),
    /// Send packet(s) error.
    #[error("Send packet(s) error")]
    SendTo(SendError),
}
