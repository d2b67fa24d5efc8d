/*! Tunnel packets: the framing family of return traffic.

A tunnel datagram is a [`TunnelPacketPrefix`] whose body is a sealed box.
Each relay on the return path adds one prefix-and-seal layer; the endpoint
peels them all. The plaintext under a non-terminal layer is either a
[`TunnelPacketContents`] (ordinary traffic) or a [`TunnelCustomMessage`]
(a control answer addressed to the endpoint itself).
*/

mod custom_message;
mod packet_contents;
mod packet_prefix;

pub use self::custom_message::*;
pub use self::packet_contents::*;
pub use self::packet_prefix::*;

pub(crate) use crate::length_bytes;

/// Check whether a datagram is framed as a tunnel packet.
pub fn is_tunnel_packet(data: &[u8]) -> bool {
    data.len() >= TUNNEL_PACKET_PREFIX_ID.len() && data[..TUNNEL_PACKET_PREFIX_ID.len()] == TUNNEL_PACKET_PREFIX_ID
}
