/*! Tunnel points: the relay-side midpoint and the client-side endpoint of an
inbound tunnel.

Return traffic enters the chain at its last relay and gains one encryption
layer per hop on the way back: each midpoint wraps the datagram it received,
seals it under its session key, stamps the key's short id in front and hands
it to its predecessor. The endpoint holds all session keys and peels every
layer in one pass.
*/

pub mod errors;

use std::net::SocketAddrV4;

use futures::SinkExt;
use rand::thread_rng;

use garlic_binary_io::{FromBytes, ToBytes};
use garlic_crypto::{seal, PublicKey, ShortId};
use garlic_packet::garlic::MAX_MESSAGE_SIZE;
use garlic_packet::tunnel::*;

use crate::adnl::{AdnlRequest, AdnlTx};
use crate::keyring::Keyring;
use self::errors::*;

/// Serialize a tunnel packet into a fresh byte vector. Fails when the
/// wrapped datagram would no longer fit a message.
fn packet_to_vec<P: ToBytes>(packet: &P) -> Result<Vec<u8>, HandleTunnelPacketError> {
    let mut buf = vec![0; MAX_MESSAGE_SIZE];
    let (_, size) = packet.to_bytes((&mut buf, 0))
        .map_err(|_| HandleTunnelPacketError::Oversize)?;
    buf.truncate(size);
    Ok(buf)
}

/** Relay-side state of one hop of an inbound tunnel.

A midpoint never decrypts anything. It wraps whatever datagram reaches it,
seals the result under the session key it was created with and forwards it to
the predecessor as a direct message, so that the layers pile up towards the
client.
*/
#[derive(Clone)]
pub struct TunnelMidpoint {
    /// Session key return packets are sealed under.
    encrypt_via: PublicKey,
    /// Short id of `encrypt_via`, stamped on every wrapped packet.
    encrypt_key_id: ShortId,
    /// The owning relay's id, used as the source of forwarded messages.
    local_id: ShortId,
    /// Predecessor the wrapped packets are forwarded to.
    proxy_to: ShortId,
    /// Handle of the ADNL transport.
    adnl_tx: AdnlTx,
}

impl TunnelMidpoint {
    /// Create a new `TunnelMidpoint`.
    pub fn new(encrypt_via: PublicKey, proxy_to: ShortId, local_id: ShortId, adnl_tx: AdnlTx) -> TunnelMidpoint {
        let encrypt_key_id = ShortId::of(&encrypt_via);
        TunnelMidpoint {
            encrypt_via,
            encrypt_key_id,
            local_id,
            proxy_to,
            adnl_tx,
        }
    }

    /// Wrap an inbound datagram and pass it down the tunnel. The source
    /// address is recorded so the endpoint can tag the final plaintext.
    pub async fn receive_packet(&self, src_addr: Option<SocketAddrV4>, datagram: Vec<u8>) -> Result<(), HandleTunnelPacketError> {
        let contents = TunnelPacketContents {
            from_addr: src_addr,
            message: Some(datagram),
        };
        self.send_wrapped(&packet_to_vec(&contents)?).await
    }

    /// Wrap a control answer addressed to the tunnel endpoint itself. This
    /// is how pongs travel back.
    pub async fn send_custom_message(&self, data: Vec<u8>) -> Result<(), HandleTunnelPacketError> {
        let custom = TunnelCustomMessage { data };
        self.send_wrapped(&packet_to_vec(&custom)?).await
    }

    async fn send_wrapped(&self, plain: &[u8]) -> Result<(), HandleTunnelPacketError> {
        let sealed = seal(&mut thread_rng(), &self.encrypt_via, plain);
        let packet = TunnelPacketPrefix {
            id: self.encrypt_key_id,
            data: sealed,
        };
        let request = AdnlRequest::SendMessageDirect {
            src: self.local_id,
            dst: self.proxy_to,
            data: packet_to_vec(&packet)?,
        };
        self.adnl_tx.clone().send(request).await.map_err(HandleTunnelPacketError::SendTo)
    }
}

/// A control message peeled mid-tunnel, addressed to the endpoint itself.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CustomMessage {
    /// Peel layer (= hop index) the message was found at.
    pub sender_id: usize,
    /// Carried payload.
    pub data: Vec<u8>,
}

/** Client-side terminus of an inbound tunnel.

Holds the short ids of all session keys of a chain, in peel order. Every
inbound datagram must carry the layers in exactly that order; skipped or
reordered layers terminate processing for the datagram.
*/
#[derive(Clone)]
pub struct TunnelEndpoint {
    /// Session key ids in peel order, one per hop plus the terminal layer.
    decrypt_via: Vec<ShortId>,
    /// Keyring holding the session secrets.
    keyring: Keyring,
    /// Handle of the ADNL transport fully peeled datagrams are delivered to.
    adnl_tx: AdnlTx,
}

impl TunnelEndpoint {
    /// Create a new `TunnelEndpoint`.
    pub fn new(decrypt_via: Vec<ShortId>, keyring: Keyring, adnl_tx: AdnlTx) -> TunnelEndpoint {
        assert!(!decrypt_via.is_empty());
        TunnelEndpoint {
            decrypt_via,
            keyring,
            adnl_tx,
        }
    }

    /** Peel all layers of an inbound tunnel datagram.

    The fully peeled plaintext is delivered to the local ADNL stack tagged
    with the source address carried in the innermost wrapping. A custom
    message found under a non-terminal layer is returned to the caller
    instead, together with the index of the hop that emitted it.
    */
    pub async fn receive_packet(
        &self,
        src_addr: Option<SocketAddrV4>,
        datagram: Vec<u8>,
    ) -> Result<Option<CustomMessage>, HandleTunnelPacketError> {
        let mut datagram = datagram;
        let mut from_addr = src_addr;
        for (idx, key_id) in self.decrypt_via.iter().enumerate() {
            let (_, prefix) = TunnelPacketPrefix::from_bytes(&datagram)
                .map_err(|_| HandleTunnelPacketError::InvalidPrefix)?;
            if prefix.id != *key_id {
                return Err(HandleTunnelPacketError::WrongMidpoint { layer: idx });
            }
            let plain = self.keyring.decrypt_message(key_id, &prefix.data).await
                .map_err(HandleTunnelPacketError::Decrypt)?;
            if idx == self.decrypt_via.len() - 1 {
                datagram = plain;
                break;
            }
            if let Ok((_, contents)) = TunnelPacketContents::from_bytes(&plain) {
                if let Some(addr) = contents.from_addr {
                    from_addr = Some(addr);
                }
                match contents.message {
                    Some(message) => datagram = message,
                    None => return Ok(None),
                }
            } else if let Ok((_, custom)) = TunnelCustomMessage::from_bytes(&plain) {
                return Ok(Some(CustomMessage { sender_id: idx, data: custom.data }));
            } else {
                return Err(HandleTunnelPacketError::Malformed);
            }
        }
        let request = AdnlRequest::ReceivePacket {
            src_addr: from_addr,
            data: datagram,
        };
        self.adnl_tx.clone().send(request).await.map_err(HandleTunnelPacketError::SendTo)?;
        Ok(None)
    }
}
