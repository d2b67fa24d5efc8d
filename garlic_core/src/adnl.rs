//! Handles of the collaborators this crate plugs into: the ADNL datagram
//! transport and the peer-discovery overlay.
//!
//! Both are modelled as command enums carried over bounded channels. The
//! embedding node owns the receiving ends and is responsible for executing
//! the requests; everything in this crate only ever holds a sender.

use std::net::{SocketAddr, SocketAddrV4};
use std::time::SystemTime;

use futures::channel::mpsc;

use garlic_crypto::{sha256, PublicKey, ShortId};
use garlic_packet::garlic::PUBLIC_OVERLAY_DESCRIPTOR_ID;

use crate::time::unix_time;

/// Commands accepted by the ADNL transport.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AdnlRequest {
    /// Best-effort datagram message to another node.
    SendMessage {
        /// Local identity the message is sent from.
        src: ShortId,
        /// Short id of the destination node.
        dst: ShortId,
        /// Serialized message.
        data: Vec<u8>,
    },
    /// Like `SendMessage`, but the transport must not fall back to peer
    /// discovery to locate `dst`.
    SendMessageDirect {
        /// Local identity the message is sent from.
        src: ShortId,
        /// Short id of the destination node.
        dst: ShortId,
        /// Serialized message.
        data: Vec<u8>,
    },
    /// Raw UDP datagram emission.
    SendUdpPacket {
        /// Local identity used for logging on the transport side.
        src: ShortId,
        /// Destination socket address.
        addr: SocketAddr,
        /// Datagram payload.
        data: Vec<u8>,
    },
    /// Inject a datagram into the local stack as if it had been received
    /// from `src_addr`, with a wildcard category mask.
    ReceivePacket {
        /// Source address carried through the tunnel, when known.
        src_addr: Option<SocketAddrV4>,
        /// The fully peeled datagram.
        data: Vec<u8>,
    },
    /// Register (or re-register) a local identity with an address list.
    AddId {
        /// Full public key of the identity.
        id: PublicKey,
        /// Addresses the identity is reachable at.
        addr_list: AddressList,
        /// ADNL category of the identity.
        category: u8,
        /// Ignore any remote address peers advertise for this identity,
        /// forcing inbound traffic through the listed addresses.
        ignore_remote_addr: bool,
    },
    /// Route DHT traffic of the identity through a custom DHT node.
    SetCustomDhtNode {
        /// Short id of the identity.
        id: ShortId,
        /// Short id of the DHT client identity to use.
        dht: ShortId,
    },
}

/// Shorthand for the transmit half of the ADNL request channel.
pub type AdnlTx = mpsc::Sender<AdnlRequest>;

/// Requests to the peer-discovery overlay.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum OverlayRequest {
    /// Join a public overlay.
    Join {
        /// Local identity joining the overlay.
        local_id: ShortId,
        /// Overlay to join.
        overlay_id: ShortId,
        /// Membership metadata.
        meta: String,
    },
    /// Leave a previously joined overlay.
    Leave {
        /// Local identity leaving the overlay.
        local_id: ShortId,
        /// Overlay to leave.
        overlay_id: ShortId,
    },
    /// Ask for a batch of random overlay members. Answers are fed back via
    /// `GarlicManager::handle_random_peers`.
    RandomPeers {
        /// Local identity asking.
        local_id: ShortId,
        /// Overlay to sample.
        overlay_id: ShortId,
        /// Maximum number of peers to return.
        limit: usize,
    },
}

/// Shorthand for the transmit half of the overlay request channel.
pub type OverlayTx = mpsc::Sender<OverlayRequest>;

/// Membership metadata every garlic node attaches to the overlay.
pub const GARLIC_OVERLAY_META: &str = r#"{ "type": "garlic" }"#;

/// The well-known overlay id: the hash of the public overlay descriptor tag.
pub fn public_overlay_id() -> ShortId {
    ShortId::from(sha256(&PUBLIC_OVERLAY_DESCRIPTOR_ID))
}

/// Externally visible address of a tunnelled identity: reachable via `relay`
/// under the terminal session key `pubkey`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TunnelAddress {
    /// Short id of the last relay of the chain.
    pub relay: ShortId,
    /// Terminal session key peers encrypt tunnel packets under.
    pub pubkey: PublicKey,
}

/// Address list an identity is registered with. The empty list is the
/// not-reachable binding used while no chain is ready.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AddressList {
    /// Unix timestamp of the moment the list was assembled.
    pub version: u64,
    /// Addresses in order of preference.
    pub addrs: Vec<TunnelAddress>,
}

impl AddressList {
    /// An address list with no addresses.
    pub fn empty() -> AddressList {
        AddressList {
            version: unix_time(SystemTime::now()),
            addrs: Vec::new(),
        }
    }

    /// An address list with a single tunnel address.
    pub fn tunnel(relay: ShortId, pubkey: PublicKey) -> AddressList {
        AddressList {
            version: unix_time(SystemTime::now()),
            addrs: vec![TunnelAddress { relay, pubkey }],
        }
    }

    /// Whether the list carries no addresses.
    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }
}
