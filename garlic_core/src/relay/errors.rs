//! Errors of the relay message handlers.
//!
//! Every one of these is strictly local to the relay: the embedding loop
//! debug-logs and drops, nothing is ever reported back to the sender.

use futures::channel::mpsc::SendError;
use thiserror::Error;

use garlic_crypto::ShortId;

use crate::keyring::KeyringError;
use crate::tunnel::errors::HandleTunnelPacketError;

/// Error that can happen when handling an incoming garlic message.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum HandleMessageError {
    /// The message (or a decrypted inner message) could not be parsed.
    #[error("Failed to parse message")]
    Malformed,
    /// The re-wrapped message would not fit a datagram.
    #[error("Message too large")]
    Oversize,
    /// Decrypting an encrypted message failed.
    #[error("Failed to decrypt message: {0}")]
    Decrypt(KeyringError),
    /// Decrypting a channel message failed.
    #[error("Failed to decrypt channel message")]
    ChannelDecrypt,
    /// No tunnel midpoint with the given id.
    #[error("Unknown tunnel {0}")]
    UnknownTunnel(ShortId),
    /// A midpoint with the given id already exists.
    #[error("Duplicate tunnel {0}")]
    DuplicateTunnel(ShortId),
    /// No channel with the given key id.
    #[error("Unknown channel {0}")]
    UnknownChannel(ShortId),
    /// A channel with the given key id already exists.
    #[error("Duplicate channel {0}")]
    DuplicateChannel(ShortId),
    /// A tunnel point failed to forward the packet.
    #[error("Failed to forward tunnel packet: {0}")]
    Tunnel(HandleTunnelPacketError),
    /// Send packet(s) error.
    #[error("Send packet(s) error")]
    SendTo(SendError),
}
