/*! The garlic relay.

A relay accepts layered messages at its long-term identity, peels exactly one
layer and either forwards the remainder to the next hop, emits it as a raw
UDP datagram, or installs per-chain state (tunnel midpoints, symmetric
channels). Every fault is local: bad messages are debug-logged and dropped,
the sender learns nothing.
*/

pub mod errors;

use std::collections::HashMap;
use std::net::{SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::{FutureExt, SinkExt};
use tokio::sync::RwLock;
use tokio::time::Instant;

use garlic_binary_io::FromBytes;
use garlic_crypto::{channel_cipher, channel_decrypt, ShortId, XSalsa20Poly1305};
use garlic_packet::garlic::*;
use garlic_packet::tunnel::TunnelPacketPrefix;

use crate::adnl::*;
use crate::keyring::Keyring;
use crate::time::*;
use crate::tunnel::TunnelMidpoint;
use self::errors::*;

/// Idle time after which a midpoint or channel is evicted.
pub const TUNNEL_TTL: Duration = Duration::from_secs(300);

/// How often the eviction sweep runs.
pub const EVICTION_INTERVAL: Duration = Duration::from_secs(60);

struct MidpointEntry {
    midpoint: TunnelMidpoint,
    refreshed: Instant,
}

struct ChannelEntry {
    cipher: XSalsa20Poly1305,
    refreshed: Instant,
}

/// Relay state: per-chain midpoints and channels, keyed by the id traffic
/// arrives under.
#[derive(Default)]
struct ServerState {
    midpoints: HashMap<ShortId, MidpointEntry>,
    channels: HashMap<ShortId, ChannelEntry>,
}

/** The relay-side half of the garlic overlay.

The embedding transport feeds parsed messages into [`handle_message`] and
tunnel datagrams into [`handle_tunnel_packet`]; everything the relay emits
leaves through the ADNL request channel.

[`handle_message`]: #method.handle_message
[`handle_tunnel_packet`]: #method.handle_tunnel_packet
*/
#[derive(Clone)]
pub struct GarlicServer {
    /// Short id of the relay's long-term key.
    pub local_id: ShortId,
    keyring: Keyring,
    adnl_tx: AdnlTx,
    overlay_tx: OverlayTx,
    state: Arc<RwLock<ServerState>>,
}

impl GarlicServer {
    /// Create a new `GarlicServer` instance.
    pub fn new(local_id: ShortId, keyring: Keyring, adnl_tx: AdnlTx, overlay_tx: OverlayTx) -> GarlicServer {
        debug!("Created new GarlicServer instance");
        GarlicServer {
            local_id,
            keyring,
            adnl_tx,
            overlay_tx,
            state: Arc::new(RwLock::new(ServerState::default())),
        }
    }

    /// Join the public garlic overlay so clients can discover this relay.
    pub async fn start(&self) -> Result<(), HandleMessageError> {
        let request = OverlayRequest::Join {
            local_id: self.local_id,
            overlay_id: public_overlay_id(),
            meta: GARLIC_OVERLAY_META.to_owned(),
        };
        self.overlay_tx.clone().send(request).await.map_err(HandleMessageError::SendTo)
    }

    /// Leave the overlay.
    pub async fn shutdown(&self) -> Result<(), HandleMessageError> {
        let request = OverlayRequest::Leave {
            local_id: self.local_id,
            overlay_id: public_overlay_id(),
        };
        self.overlay_tx.clone().send(request).await.map_err(HandleMessageError::SendTo)
    }

    /// Handle one incoming garlic message.
    pub async fn handle_message(&self, src: ShortId, message: Message) -> Result<(), HandleMessageError> {
        self.process_message(src, message).await
    }

    fn process_message<'a>(&'a self, src: ShortId, message: Message) -> BoxFuture<'a, Result<(), HandleMessageError>> {
        async move {
            match message {
                Message::EncryptedMessage(m) => self.handle_encrypted_message(src, m).await,
                Message::EncryptedMessageChannel(m) => self.handle_encrypted_message_channel(src, m).await,
                Message::MultipleMessages(m) => self.handle_multiple_messages(src, m).await,
                Message::ForwardToUdp(m) => self.handle_forward_to_udp(m).await,
                Message::ForwardToNext(m) => self.handle_forward_to_next(m).await,
                Message::ForwardToNextChannel(m) => self.handle_forward_to_next_channel(m).await,
                Message::CreateTunnelMidpoint(m) => self.handle_create_tunnel_midpoint(m).await,
                Message::CreateChannel(m) => self.handle_create_channel(m).await,
                Message::Ping(m) => self.handle_ping(m).await,
                // Pongs travel to clients through tunnels, never to a relay
                // identity directly.
                Message::Pong(_) => Err(HandleMessageError::Malformed),
            }
        }.boxed()
    }

    /// Decrypt with the relay's long-term key and recurse into the plaintext.
    async fn handle_encrypted_message(&self, src: ShortId, message: EncryptedMessage) -> Result<(), HandleMessageError> {
        let plain = self.keyring.decrypt_message(&self.local_id, &message.data).await
            .map_err(HandleMessageError::Decrypt)?;
        let inner = Message::from_slice(&plain).ok_or(HandleMessageError::Malformed)?;
        self.process_message(src, inner).await
    }

    /// Decrypt with an installed channel key and recurse into the plaintext.
    async fn handle_encrypted_message_channel(&self, src: ShortId, message: EncryptedMessageChannel) -> Result<(), HandleMessageError> {
        let cipher = {
            let state = self.state.read().await;
            let entry = state.channels.get(&message.key_id)
                .ok_or(HandleMessageError::UnknownChannel(message.key_id))?;
            entry.cipher.clone()
        };
        let plain = channel_decrypt(&cipher, &message.data)
            .map_err(|()| HandleMessageError::ChannelDecrypt)?;
        if let Some(entry) = self.state.write().await.channels.get_mut(&message.key_id) {
            entry.refreshed = clock_now();
        }
        let inner = Message::from_slice(&plain).ok_or(HandleMessageError::Malformed)?;
        self.process_message(src, inner).await
    }

    /// Process each inner message independently; one malformed entry does
    /// not poison its siblings.
    async fn handle_multiple_messages(&self, src: ShortId, message: MultipleMessages) -> Result<(), HandleMessageError> {
        for inner in message.messages {
            if let Err(e) = self.process_message(src, inner).await {
                debug!("Failed to process inner message: {}", e);
            }
        }
        Ok(())
    }

    /// Emit the carried payload as a raw UDP datagram.
    async fn handle_forward_to_udp(&self, message: ForwardToUdp) -> Result<(), HandleMessageError> {
        let request = AdnlRequest::SendUdpPacket {
            src: self.local_id,
            addr: SocketAddr::new(message.ip, message.port),
            data: message.data,
        };
        self.send_to_adnl(request).await
    }

    /// Pass the carried ciphertext to the next hop without interpreting it.
    async fn handle_forward_to_next(&self, message: ForwardToNext) -> Result<(), HandleMessageError> {
        let wrapped = Message::EncryptedMessage(EncryptedMessage { data: message.data });
        let request = AdnlRequest::SendMessage {
            src: self.local_id,
            dst: message.dst,
            data: wrapped.to_vec().map_err(|_| HandleMessageError::Oversize)?,
        };
        self.send_to_adnl(request).await
    }

    /// Channel twin of `handle_forward_to_next`.
    async fn handle_forward_to_next_channel(&self, message: ForwardToNextChannel) -> Result<(), HandleMessageError> {
        let wrapped = Message::EncryptedMessageChannel(EncryptedMessageChannel {
            key_id: message.key_id,
            data: message.data,
        });
        let request = AdnlRequest::SendMessage {
            src: self.local_id,
            dst: message.dst,
            data: wrapped.to_vec().map_err(|_| HandleMessageError::Oversize)?,
        };
        self.send_to_adnl(request).await
    }

    /// Install a tunnel midpoint. Duplicate prefixes are not replaced.
    async fn handle_create_tunnel_midpoint(&self, message: CreateTunnelMidpoint) -> Result<(), HandleMessageError> {
        let mut state = self.state.write().await;
        if state.midpoints.contains_key(&message.message_prefix) {
            return Err(HandleMessageError::DuplicateTunnel(message.message_prefix));
        }
        debug!("Creating tunnel midpoint {}", message.message_prefix);
        let midpoint = TunnelMidpoint::new(
            message.encrypt_via,
            message.proxy_as,
            self.local_id,
            self.adnl_tx.clone(),
        );
        state.midpoints.insert(message.message_prefix, MidpointEntry {
            midpoint,
            refreshed: clock_now(),
        });
        Ok(())
    }

    /// Install a symmetric channel. Duplicate key ids are not replaced.
    async fn handle_create_channel(&self, message: CreateChannel) -> Result<(), HandleMessageError> {
        let id = ShortId::of_channel_key(&message.key);
        let mut state = self.state.write().await;
        if state.channels.contains_key(&id) {
            return Err(HandleMessageError::DuplicateChannel(id));
        }
        debug!("Creating channel {}", id);
        state.channels.insert(id, ChannelEntry {
            cipher: channel_cipher(&message.key),
            refreshed: clock_now(),
        });
        Ok(())
    }

    /// Refresh the probed midpoint and answer with a pong over its return
    /// path.
    async fn handle_ping(&self, message: Ping) -> Result<(), HandleMessageError> {
        let midpoint = {
            let mut state = self.state.write().await;
            let entry = state.midpoints.get_mut(&message.tunnel_id)
                .ok_or(HandleMessageError::UnknownTunnel(message.tunnel_id))?;
            entry.refreshed = clock_now();
            entry.midpoint.clone()
        };
        let pong = Message::Pong(Pong { nonce: message.nonce });
        let data = pong.to_vec().map_err(|_| HandleMessageError::Oversize)?;
        midpoint.send_custom_message(data).await.map_err(HandleMessageError::Tunnel)
    }

    /// Route a tunnel datagram to the midpoint its prefix names, refreshing
    /// the midpoint's TTL.
    pub async fn handle_tunnel_packet(&self, src_addr: Option<SocketAddrV4>, data: Vec<u8>) -> Result<(), HandleMessageError> {
        let (_, prefix) = TunnelPacketPrefix::from_bytes(&data)
            .map_err(|_| HandleMessageError::Malformed)?;
        let midpoint = {
            let mut state = self.state.write().await;
            let entry = state.midpoints.get_mut(&prefix.id)
                .ok_or(HandleMessageError::UnknownTunnel(prefix.id))?;
            entry.refreshed = clock_now();
            entry.midpoint.clone()
        };
        // The midpoint wraps the whole datagram, prefix included.
        midpoint.receive_packet(src_addr, data).await.map_err(HandleMessageError::Tunnel)
    }

    /// Periodically evict midpoints and channels that have seen no traffic
    /// for `TUNNEL_TTL`. Runs until the task is dropped.
    pub async fn run_ttl_eviction(&self) {
        let mut interval = tokio::time::interval(EVICTION_INTERVAL);
        loop {
            interval.tick().await;
            self.evict_expired().await;
        }
    }

    async fn evict_expired(&self) {
        let mut state = self.state.write().await;
        state.midpoints.retain(|id, entry| {
            let keep = clock_elapsed(entry.refreshed) < TUNNEL_TTL;
            if !keep {
                debug!("Evicting tunnel midpoint {}", id);
            }
            keep
        });
        state.channels.retain(|id, entry| {
            let keep = clock_elapsed(entry.refreshed) < TUNNEL_TTL;
            if !keep {
                debug!("Evicting channel {}", id);
            }
            keep
        });
    }

    async fn send_to_adnl(&self, request: AdnlRequest) -> Result<(), HandleMessageError> {
        self.adnl_tx.clone().send(request).await.map_err(HandleMessageError::SendTo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use futures::channel::mpsc;
    use futures::StreamExt;
    use garlic_crypto::{channel_encrypt, seal, SecretKey};
    use rand::thread_rng;

    macro_rules! unpack {
        ($variable:expr, $variant:path) => (
            match $variable {
                $variant { .. } => (),
                other => panic!("Expected {} but got {:?}", stringify!($variant), other),
            }
        )
    }

    fn create_relay() -> (GarlicServer, Keyring, SecretKey, mpsc::Receiver<AdnlRequest>, mpsc::Receiver<OverlayRequest>) {
        let mut rng = thread_rng();
        let sk = SecretKey::generate(&mut rng);
        let local_id = ShortId::of(&sk.public_key());
        let keyring = Keyring::new();
        let (adnl_tx, adnl_rx) = mpsc::channel(32);
        let (overlay_tx, overlay_rx) = mpsc::channel(32);
        let relay = GarlicServer::new(local_id, keyring.clone(), adnl_tx, overlay_tx);
        (relay, keyring, sk, adnl_rx, overlay_rx)
    }

    fn create_midpoint_message(session_pk: &garlic_crypto::PublicKey, proxy_as: ShortId, message_prefix: ShortId) -> Message {
        Message::CreateTunnelMidpoint(CreateTunnelMidpoint {
            encrypt_via: session_pk.clone(),
            proxy_as,
            message_prefix,
        })
    }

    #[tokio::test]
    async fn overlay_membership() {
        let (relay, _keyring, _sk, _adnl_rx, mut overlay_rx) = create_relay();
        relay.start().await.unwrap();
        relay.shutdown().await.unwrap();

        assert_eq!(overlay_rx.next().await.unwrap(), OverlayRequest::Join {
            local_id: relay.local_id,
            overlay_id: public_overlay_id(),
            meta: GARLIC_OVERLAY_META.to_owned(),
        });
        assert_eq!(overlay_rx.next().await.unwrap(), OverlayRequest::Leave {
            local_id: relay.local_id,
            overlay_id: public_overlay_id(),
        });
    }

    #[tokio::test]
    async fn forward_to_udp_emits_exact_datagram() {
        let (relay, _keyring, _sk, mut adnl_rx, _overlay_rx) = create_relay();
        let message = Message::ForwardToUdp(ForwardToUdp {
            ip: "127.0.0.1".parse().unwrap(),
            port: 9999,
            data: b"hello".to_vec(),
        });
        relay.handle_message(ShortId::ZERO, message).await.unwrap();

        match adnl_rx.next().await.unwrap() {
            AdnlRequest::SendUdpPacket { src, addr, data } => {
                assert_eq!(src, relay.local_id);
                assert_eq!(addr, "127.0.0.1:9999".parse::<SocketAddr>().unwrap());
                assert_eq!(data, b"hello".to_vec());
            },
            other => panic!("Expected SendUdpPacket but got {:?}", other),
        }
        // Nothing else is emitted.
        drop(relay);
        assert!(adnl_rx.collect::<Vec<_>>().await.is_empty());
    }

    #[tokio::test]
    async fn forward_to_next_rewraps_as_encrypted_message() {
        let (relay, _keyring, _sk, mut adnl_rx, _overlay_rx) = create_relay();
        let dst = ShortId::from([7; 32]);
        let message = Message::ForwardToNext(ForwardToNext {
            dst,
            data: vec![42; 123],
        });
        relay.handle_message(ShortId::ZERO, message).await.unwrap();

        match adnl_rx.next().await.unwrap() {
            AdnlRequest::SendMessage { src, dst: sent_dst, data } => {
                assert_eq!(src, relay.local_id);
                assert_eq!(sent_dst, dst);
                assert_eq!(
                    Message::from_slice(&data),
                    Some(Message::EncryptedMessage(EncryptedMessage { data: vec![42; 123] }))
                );
            },
            other => panic!("Expected SendMessage but got {:?}", other),
        }
    }

    #[tokio::test]
    async fn encrypted_message_peels_one_layer() {
        let mut rng = thread_rng();
        let (relay, keyring, sk, mut adnl_rx, _overlay_rx) = create_relay();
        keyring.add_key(sk.clone()).await;

        // An onion layer addressed to this relay, carrying a forward.
        let inner = Message::ForwardToUdp(ForwardToUdp {
            ip: "127.0.0.1".parse().unwrap(),
            port: 9999,
            data: b"peeled".to_vec(),
        });
        let message = Message::EncryptedMessage(EncryptedMessage {
            data: seal(&mut rng, &sk.public_key(), &inner.to_vec().unwrap()),
        });
        relay.handle_message(ShortId::ZERO, message).await.unwrap();

        unpack!(adnl_rx.next().await.unwrap(), AdnlRequest::SendUdpPacket);
    }

    #[tokio::test]
    async fn encrypted_message_decrypt_failure_is_local() {
        let mut rng = thread_rng();
        let (relay, keyring, sk, mut adnl_rx, _overlay_rx) = create_relay();
        keyring.add_key(sk).await;

        let other_pk = SecretKey::generate(&mut rng).public_key();
        let message = Message::EncryptedMessage(EncryptedMessage {
            data: seal(&mut rng, &other_pk, b"not for this relay"),
        });
        assert!(matches!(
            relay.handle_message(ShortId::ZERO, message).await,
            Err(HandleMessageError::Decrypt(_))
        ));
        drop(relay);
        assert!(adnl_rx.collect::<Vec<_>>().await.is_empty());
    }

    #[tokio::test]
    async fn duplicate_midpoint_is_rejected() {
        let mut rng = thread_rng();
        let (relay, _keyring, _sk, _adnl_rx, _overlay_rx) = create_relay();
        let session_pk = SecretKey::generate(&mut rng).public_key();
        let prefix = ShortId::from([9; 32]);

        let message = create_midpoint_message(&session_pk, ShortId::from([1; 32]), prefix);
        relay.handle_message(ShortId::ZERO, message.clone()).await.unwrap();
        assert_eq!(
            relay.handle_message(ShortId::ZERO, message).await,
            Err(HandleMessageError::DuplicateTunnel(prefix))
        );
    }

    #[tokio::test]
    async fn ping_refreshes_and_answers_through_midpoint() {
        let mut rng = thread_rng();
        let (relay, keyring, _sk, mut adnl_rx, _overlay_rx) = create_relay();

        // The client-side session key the midpoint encrypts under.
        let session_sk = SecretKey::generate(&mut rng);
        let session_pk = session_sk.public_key();
        let session_id = keyring.add_key(session_sk).await;
        let predecessor = ShortId::from([1; 32]);
        let tunnel_id = ShortId::from([2; 32]);

        let create = create_midpoint_message(&session_pk, predecessor, tunnel_id);
        relay.handle_message(ShortId::ZERO, create).await.unwrap();

        let ping = Message::Ping(Ping { tunnel_id, nonce: [3; 32] });
        relay.handle_message(ShortId::ZERO, ping).await.unwrap();

        match adnl_rx.next().await.unwrap() {
            AdnlRequest::SendMessageDirect { src, dst, data } => {
                assert_eq!(src, relay.local_id);
                assert_eq!(dst, predecessor);
                // The answer peels under the session key to a pong.
                let (_, prefix) = TunnelPacketPrefix::from_bytes(&data).unwrap();
                assert_eq!(prefix.id, session_id);
                let plain = keyring.decrypt_message(&session_id, &prefix.data).await.unwrap();
                let (_, custom) = garlic_packet::tunnel::TunnelCustomMessage::from_bytes(&plain).unwrap();
                assert_eq!(
                    Message::from_slice(&custom.data),
                    Some(Message::Pong(Pong { nonce: [3; 32] }))
                );
            },
            other => panic!("Expected SendMessageDirect but got {:?}", other),
        }
    }

    #[tokio::test]
    async fn ping_unknown_tunnel_is_dropped() {
        let (relay, _keyring, _sk, mut adnl_rx, _overlay_rx) = create_relay();
        let tunnel_id = ShortId::from([8; 32]);
        let ping = Message::Ping(Ping { tunnel_id, nonce: [0; 32] });
        assert_eq!(
            relay.handle_message(ShortId::ZERO, ping).await,
            Err(HandleMessageError::UnknownTunnel(tunnel_id))
        );
        drop(relay);
        assert!(adnl_rx.collect::<Vec<_>>().await.is_empty());
    }

    #[tokio::test]
    async fn multiple_messages_survive_one_bad_entry() {
        let (relay, _keyring, _sk, mut adnl_rx, _overlay_rx) = create_relay();
        let message = Message::MultipleMessages(MultipleMessages {
            messages: vec![
                // Unknown tunnel: dropped.
                Message::Ping(Ping { tunnel_id: ShortId::from([1; 32]), nonce: [0; 32] }),
                // Still processed.
                Message::ForwardToUdp(ForwardToUdp {
                    ip: "127.0.0.1".parse().unwrap(),
                    port: 9999,
                    data: b"survivor".to_vec(),
                }),
            ],
        });
        relay.handle_message(ShortId::ZERO, message).await.unwrap();
        unpack!(adnl_rx.next().await.unwrap(), AdnlRequest::SendUdpPacket);
    }

    #[tokio::test]
    async fn midpoint_eviction_after_ttl() {
        tokio::time::pause();
        let mut rng = thread_rng();
        let (relay, _keyring, _sk, _adnl_rx, _overlay_rx) = create_relay();
        let session_pk = SecretKey::generate(&mut rng).public_key();
        let tunnel_id = ShortId::from([4; 32]);

        let create = create_midpoint_message(&session_pk, ShortId::from([1; 32]), tunnel_id);
        relay.handle_message(ShortId::ZERO, create).await.unwrap();

        tokio::time::advance(Duration::from_secs(301)).await;
        relay.evict_expired().await;

        let ping = Message::Ping(Ping { tunnel_id, nonce: [0; 32] });
        assert_eq!(
            relay.handle_message(ShortId::ZERO, ping).await,
            Err(HandleMessageError::UnknownTunnel(tunnel_id))
        );
    }

    #[tokio::test]
    async fn traffic_refreshes_midpoint_ttl() {
        tokio::time::pause();
        let mut rng = thread_rng();
        let (relay, _keyring, _sk, mut adnl_rx, _overlay_rx) = create_relay();
        let session_pk = SecretKey::generate(&mut rng).public_key();
        let tunnel_id = ShortId::from([5; 32]);

        let create = create_midpoint_message(&session_pk, ShortId::from([1; 32]), tunnel_id);
        relay.handle_message(ShortId::ZERO, create).await.unwrap();

        // A ping half-way through the TTL pushes the expiry out.
        tokio::time::advance(Duration::from_secs(200)).await;
        relay.handle_message(ShortId::ZERO, Message::Ping(Ping { tunnel_id, nonce: [0; 32] })).await.unwrap();
        unpack!(adnl_rx.next().await.unwrap(), AdnlRequest::SendMessageDirect);

        tokio::time::advance(Duration::from_secs(200)).await;
        relay.evict_expired().await;

        // Total 400s elapsed since creation, but only 200s idle.
        relay.handle_message(ShortId::ZERO, Message::Ping(Ping { tunnel_id, nonce: [1; 32] })).await.unwrap();
        unpack!(adnl_rx.next().await.unwrap(), AdnlRequest::SendMessageDirect);
    }

    #[tokio::test]
    async fn channel_round_trip() {
        let mut rng = thread_rng();
        let (relay, _keyring, _sk, mut adnl_rx, _overlay_rx) = create_relay();
        let key = [21; 32];
        let key_id = ShortId::of_channel_key(&key);

        relay.handle_message(ShortId::ZERO, Message::CreateChannel(CreateChannel { key })).await.unwrap();
        assert_eq!(
            relay.handle_message(ShortId::ZERO, Message::CreateChannel(CreateChannel { key })).await,
            Err(HandleMessageError::DuplicateChannel(key_id))
        );

        // A message encrypted under the channel is peeled like an
        // asymmetric one.
        let inner = Message::ForwardToUdp(ForwardToUdp {
            ip: "127.0.0.1".parse().unwrap(),
            port: 9999,
            data: b"via channel".to_vec(),
        });
        let cipher = channel_cipher(&key);
        let message = Message::EncryptedMessageChannel(EncryptedMessageChannel {
            key_id,
            data: channel_encrypt(&mut rng, &cipher, &inner.to_vec().unwrap()),
        });
        relay.handle_message(ShortId::ZERO, message).await.unwrap();
        unpack!(adnl_rx.next().await.unwrap(), AdnlRequest::SendUdpPacket);

        // Unknown channel and bad ciphertext are local faults.
        let unknown = Message::EncryptedMessageChannel(EncryptedMessageChannel {
            key_id: ShortId::from([22; 32]),
            data: vec![0; 64],
        });
        assert!(matches!(
            relay.handle_message(ShortId::ZERO, unknown).await,
            Err(HandleMessageError::UnknownChannel(_))
        ));
        let garbage = Message::EncryptedMessageChannel(EncryptedMessageChannel {
            key_id,
            data: vec![0; 64],
        });
        assert_eq!(
            relay.handle_message(ShortId::ZERO, garbage).await,
            Err(HandleMessageError::ChannelDecrypt)
        );
    }
}
