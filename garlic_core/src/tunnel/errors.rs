//! Errors of the tunnel points.

use futures::channel::mpsc::SendError;
use thiserror::Error;

use crate::keyring::KeyringError;

/// Error that can happen when a tunnel point processes a datagram.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum HandleTunnelPacketError {
    /// The datagram is not framed as a tunnel packet.
    #[error("Invalid tunnel packet prefix")]
    InvalidPrefix,
    /// The prefix id does not name the expected peel layer.
    #[error("Wrong midpoint id at layer {layer}")]
    WrongMidpoint {
        /// Index of the peel layer the mismatch occurred at.
        layer: usize,
    },
    /// Decryption failed at some layer.
    #[error("Failed to decrypt tunnel packet: {0}")]
    Decrypt(KeyringError),
    /// The decrypted layer is neither packet contents nor a custom message.
    #[error("Malformed tunnel packet contents")]
    Malformed,
    /// The wrapped datagram would no longer fit a message.
    #[error("Tunnel packet too large")]
    Oversize,
    /// Send packet(s) error.
    #[error("Send packet(s) error")]
    SendTo(SendError),
}
