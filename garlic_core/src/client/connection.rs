/*! One garlic chain: relay selection aftermath, session keys, the build
handshake and keepalives.

A connection is born in `Building` state with the setup bundle already on the
wire. Pongs flowing back through the tunnel endpoint mark hops alive; the
last hop's pong makes the chain `Ready`. All deadline work happens in
[`alarm`], driven from the manager's periodic tick; state transitions are
returned as [`ConnectionEvent`]s so the owning manager applies them without
re-entering this module.

[`alarm`]: struct.Connection.html#method.alarm
*/

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::SinkExt;
use rand::{thread_rng, Rng};
use tokio::sync::RwLock;
use tokio::time::Instant;

use garlic_crypto::{seal, PublicKey, SecretKey, ShortId};
use garlic_packet::garlic::*;

use crate::adnl::{AddressList, AdnlRequest, AdnlTx};
use crate::keyring::Keyring;
use crate::time::*;
use crate::tunnel::TunnelEndpoint;
use crate::tunnel::errors::HandleTunnelPacketError;
use super::errors::*;

/// Number of times the setup bundle is re-sent before the chain is declared
/// dead.
pub const INIT_RETRIES: u8 = 3;

/// Interval between setup bundle sends.
pub const INIT_RESEND_INTERVAL: Duration = Duration::from_secs(3);

/// Number of keepalive retransmissions before the chain is declared dead.
pub const PING_RETRIES: u8 = 3;

/// Interval between keepalive retransmissions.
pub const PING_RESEND_INTERVAL: Duration = Duration::from_secs(2);

/// Bounds of the randomised gap between successful keepalives, in seconds.
const KEEPALIVE_MIN_SECS: f64 = 10.0;
const KEEPALIVE_MAX_SECS: f64 = 15.0;

fn keepalive_interval() -> Duration {
    Duration::from_secs_f64(thread_rng().gen_range(KEEPALIVE_MIN_SECS..KEEPALIVE_MAX_SECS))
}

/// One relay of the chain.
#[derive(Clone)]
struct ChainNode {
    id: ShortId,
    pubkey: PublicKey,
}

impl ChainNode {
    fn new(pubkey: PublicKey) -> ChainNode {
        ChainNode {
            id: ShortId::of(&pubkey),
            pubkey,
        }
    }
}

/// Signal a connection hands back to its owning manager.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ConnectionEvent {
    /// The chain completed its build; identities may be bound to the list.
    Ready(AddressList),
    /// The chain is dead. `causer` is the first hop that never answered
    /// during the build, if the failure is attributable.
    Failed(Option<ShortId>),
}

struct Keepalive {
    nonce: [u8; 32],
    retries_remaining: u8,
    next_resend: Instant,
}

enum ConnectionStatus {
    Building {
        retries_remaining: u8,
        got_pong: Vec<bool>,
        next_resend: Instant,
    },
    Ready {
        keepalive: Option<Keepalive>,
        next_ping: Instant,
    },
    Failed,
}

/** A single chain of relays and the client-side state serving it.

The client exclusively owns all per-chain secret material; [`destroy`] must
be called when the connection is dropped by its manager so that every session
key is purged from the keyring.

[`destroy`]: #method.destroy
*/
#[derive(Clone)]
pub struct Connection {
    local_id: ShortId,
    chain: Vec<ChainNode>,
    /// Session public keys `k[0..=N]`; the secrets live in the keyring.
    session_pubkeys: Vec<PublicKey>,
    /// Short ids of the session keys, in peel order.
    decrypt_via: Vec<ShortId>,
    init_nonce: [u8; 32],
    endpoint: TunnelEndpoint,
    keyring: Keyring,
    adnl_tx: AdnlTx,
    status: Arc<RwLock<ConnectionStatus>>,
}

impl Connection {
    /** Mint the session keys, send the setup bundle to the first relay and
    start the build timers.

    `chain` must not be empty. On failure the freshly minted keys are purged
    again before the error is returned.
    */
    pub async fn new(
        local_id: ShortId,
        chain: Vec<PublicKey>,
        keyring: Keyring,
        adnl_tx: AdnlTx,
    ) -> Result<Connection, WrapMessageError> {
        assert!(!chain.is_empty());
        let chain: Vec<ChainNode> = chain.into_iter().map(ChainNode::new).collect();
        info!("Creating garlic connection via {} relays", chain.len());
        for (i, node) in chain.iter().enumerate() {
            debug!("  Hop #{}: {}", i, node.id);
        }

        let mut session_pubkeys = Vec::with_capacity(chain.len() + 1);
        let mut decrypt_via = Vec::with_capacity(chain.len() + 1);
        for _ in 0..=chain.len() {
            let sk = SecretKey::generate(&mut thread_rng());
            session_pubkeys.push(sk.public_key());
            decrypt_via.push(keyring.add_key(sk).await);
        }

        let endpoint = TunnelEndpoint::new(decrypt_via.clone(), keyring.clone(), adnl_tx.clone());
        let mut init_nonce = [0; 32];
        thread_rng().fill(&mut init_nonce[..]);

        let got_pong = vec![false; chain.len()];
        let connection = Connection {
            local_id,
            chain,
            session_pubkeys,
            decrypt_via,
            init_nonce,
            endpoint,
            keyring,
            adnl_tx,
            status: Arc::new(RwLock::new(ConnectionStatus::Building {
                retries_remaining: INIT_RETRIES,
                got_pong,
                next_resend: clock_now() + INIT_RESEND_INTERVAL,
            })),
        };
        if let Err(e) = connection.send_init_message().await {
            connection.destroy().await;
            return Err(e);
        }
        Ok(connection)
    }

    /// One setup message per hop: install the midpoint and probe it, both in
    /// one clove.
    async fn send_init_message(&self) -> Result<(), WrapMessageError> {
        debug!("Sending init message");
        let mut msgs = Vec::with_capacity(self.chain.len());
        for i in 0..self.chain.len() {
            let tunnel_id = self.decrypt_via[i + 1];
            let create = Message::CreateTunnelMidpoint(CreateTunnelMidpoint {
                encrypt_via: self.session_pubkeys[i].clone(),
                proxy_as: if i == 0 { self.local_id } else { self.chain[i - 1].id },
                message_prefix: tunnel_id,
            });
            let ping = Message::Ping(Ping {
                tunnel_id,
                nonce: self.init_nonce,
            });
            msgs.push(Some(Message::MultipleMessages(MultipleMessages {
                messages: vec![create, ping],
            })));
        }
        self.wrap_send_message(msgs).await
    }

    /** Onion-wrap one optional message per hop and hand the bundle to the
    first relay.

    Walking the chain backwards, each hop's own message is merged with the
    `ForwardToNext` continuation carrying everything behind it, sealed under
    the *next* hop's long-term key. The hop `h[0]` layer is sent in the clear;
    the ADNL channel to it provides the outer encryption.
    */
    async fn wrap_send_message(&self, mut msgs: Vec<Option<Message>>) -> Result<(), WrapMessageError> {
        debug_assert_eq!(msgs.len(), self.chain.len());
        let mut data = Vec::new();
        for i in (0..self.chain.len()).rev() {
            let own = msgs[i].take();
            let message = if i == self.chain.len() - 1 {
                own.unwrap_or_else(|| Message::MultipleMessages(MultipleMessages { messages: Vec::new() }))
            } else {
                let sealed = seal(&mut thread_rng(), &self.chain[i + 1].pubkey, &data);
                let forward = Message::ForwardToNext(ForwardToNext {
                    dst: self.chain[i + 1].id,
                    data: sealed,
                });
                match own {
                    Some(Message::MultipleMessages(mut multiple)) => {
                        multiple.messages.push(forward);
                        Message::MultipleMessages(multiple)
                    },
                    Some(other) => Message::MultipleMessages(MultipleMessages {
                        messages: vec![other, forward],
                    }),
                    None => forward,
                }
            };
            data = message.to_vec().map_err(|_| WrapMessageError::Oversize)?;
        }
        let request = AdnlRequest::SendMessage {
            src: self.local_id,
            dst: self.chain[0].id,
            data,
        };
        self.adnl_tx.clone().send(request).await.map_err(WrapMessageError::SendTo)
    }

    /// Wrap a single message addressed to the terminal hop.
    async fn wrap_send_single(&self, message: Message) -> Result<(), WrapMessageError> {
        let mut msgs: Vec<Option<Message>> = vec![None; self.chain.len()];
        *msgs.last_mut().unwrap() = Some(message);
        self.wrap_send_message(msgs).await
    }

    /// Send a datagram through the chain, to be emitted as UDP at the exit
    /// relay. Dropped with a debug log while the chain is not ready.
    pub async fn send_packet(&self, src: ShortId, dst: SocketAddr, data: Vec<u8>) -> Result<(), WrapMessageError> {
        {
            let status = self.status.read().await;
            if !matches!(*status, ConnectionStatus::Ready { .. }) {
                debug!("Failed to send packet from {}: connection is not ready", src);
                return Ok(());
            }
        }
        let message = Message::ForwardToUdp(ForwardToUdp {
            ip: dst.ip(),
            port: dst.port(),
            data,
        });
        self.wrap_send_single(message).await
    }

    /// Feed an inbound tunnel datagram through the endpoint. Pongs update
    /// the build/keepalive state; everything else is delivered onward by the
    /// endpoint itself.
    pub async fn handle_tunnel_packet(&self, data: Vec<u8>) -> Result<Option<ConnectionEvent>, HandleTunnelPacketError> {
        match self.endpoint.receive_packet(None, data).await? {
            Some(custom) => Ok(self.receive_custom_message(custom.sender_id, custom.data).await),
            None => Ok(None),
        }
    }

    async fn receive_custom_message(&self, sender_id: usize, data: Vec<u8>) -> Option<ConnectionEvent> {
        if sender_id >= self.chain.len() {
            return None;
        }
        let pong = match Message::from_slice(&data) {
            Some(Message::Pong(pong)) => pong,
            _ => {
                debug!("Dropping unexpected custom message from hop #{}", sender_id);
                return None;
            },
        };

        let mut status = self.status.write().await;
        match &mut *status {
            ConnectionStatus::Building { got_pong, .. } => {
                if pong.nonce != self.init_nonce {
                    return None;
                }
                if !got_pong[sender_id] {
                    info!("Got init pong from hop #{} ({})", sender_id, self.chain[sender_id].id);
                    got_pong[sender_id] = true;
                }
                if sender_id + 1 == self.chain.len() {
                    info!("Connection is ready");
                    *status = ConnectionStatus::Ready {
                        keepalive: None,
                        next_ping: clock_now() + keepalive_interval(),
                    };
                    return Some(ConnectionEvent::Ready(self.address_list()));
                }
                None
            },
            ConnectionStatus::Ready { keepalive, next_ping } => {
                let acknowledged = matches!(
                    keepalive,
                    Some(ka) if ka.nonce == pong.nonce && sender_id + 1 == self.chain.len()
                );
                if acknowledged {
                    *keepalive = None;
                    *next_ping = clock_now() + keepalive_interval();
                }
                None
            },
            ConnectionStatus::Failed => None,
        }
    }

    /** Drive the deadlines of the state machine. Must be called at least
    once a second by the owner; returns an event when the chain transitions
    to a terminal state.
    */
    pub async fn alarm(&self) -> Option<ConnectionEvent> {
        enum Action {
            Wait,
            ResendInit,
            InitTimeout(Option<ShortId>),
            SendPing([u8; 32]),
            PingTimeout,
        }

        let action = {
            let mut status = self.status.write().await;
            match &mut *status {
                ConnectionStatus::Building { retries_remaining, got_pong, next_resend } => {
                    if clock_now() < *next_resend {
                        Action::Wait
                    } else if *retries_remaining > 0 {
                        *retries_remaining -= 1;
                        *next_resend = clock_now() + INIT_RESEND_INTERVAL;
                        Action::ResendInit
                    } else {
                        let causer = got_pong.iter()
                            .position(|&got| !got)
                            .map(|i| self.chain[i].id);
                        Action::InitTimeout(causer)
                    }
                },
                ConnectionStatus::Ready { keepalive, next_ping } => {
                    match keepalive {
                        Some(ka) => {
                            if clock_now() < ka.next_resend {
                                Action::Wait
                            } else if ka.retries_remaining > 0 {
                                ka.retries_remaining -= 1;
                                ka.next_resend = clock_now() + PING_RESEND_INTERVAL;
                                Action::SendPing(ka.nonce)
                            } else {
                                Action::PingTimeout
                            }
                        },
                        None => {
                            if clock_now() < *next_ping {
                                Action::Wait
                            } else {
                                let mut nonce = [0; 32];
                                thread_rng().fill(&mut nonce[..]);
                                *keepalive = Some(Keepalive {
                                    nonce,
                                    retries_remaining: PING_RETRIES,
                                    next_resend: clock_now() + PING_RESEND_INTERVAL,
                                });
                                Action::SendPing(nonce)
                            }
                        },
                    }
                },
                ConnectionStatus::Failed => Action::Wait,
            }
        };

        match action {
            Action::Wait => None,
            Action::ResendInit => {
                if let Err(e) = self.send_init_message().await {
                    debug!("Failed to resend init message: {}", e);
                }
                None
            },
            Action::InitTimeout(causer) => {
                info!("Failed to create connection: timeout, causer {:?}", causer);
                *self.status.write().await = ConnectionStatus::Failed;
                Some(ConnectionEvent::Failed(causer))
            },
            Action::SendPing(nonce) => {
                let ping = Message::Ping(Ping {
                    tunnel_id: *self.decrypt_via.last().unwrap(),
                    nonce,
                });
                if let Err(e) = self.wrap_send_single(ping).await {
                    debug!("Failed to send keepalive ping: {}", e);
                }
                None
            },
            Action::PingTimeout => {
                info!("Ping timeout, closing connection");
                *self.status.write().await = ConnectionStatus::Failed;
                Some(ConnectionEvent::Failed(None))
            },
        }
    }

    /// The externally visible address of this chain: the terminal relay
    /// paired with the terminal session key.
    pub fn address_list(&self) -> AddressList {
        AddressList::tunnel(
            self.chain.last().unwrap().id,
            self.session_pubkeys.last().unwrap().clone(),
        )
    }

    /// Purge every session key this connection minted from the keyring.
    pub async fn destroy(&self) {
        debug!("Destroying connection, purging {} session keys", self.decrypt_via.len());
        for id in &self.decrypt_via {
            self.keyring.del_key(id).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;

    use futures::channel::mpsc;
    use garlic_crypto::open;
    use garlic_packet::tunnel::is_tunnel_packet;

    use crate::relay::GarlicServer;

    /// A client, N relays and a router delivering messages between them.
    struct TestNet {
        client_id: ShortId,
        client_rx: mpsc::Receiver<AdnlRequest>,
        relays: HashMap<ShortId, (GarlicServer, mpsc::Receiver<AdnlRequest>)>,
        relay_ids: Vec<ShortId>,
        relay_pubkeys: Vec<PublicKey>,
        /// Hops that silently drop everything addressed to them.
        dead: Vec<ShortId>,
        connection: Option<Connection>,
        keyring: Keyring,
        client_tx: AdnlTx,
    }

    impl TestNet {
        async fn new(hops: usize) -> TestNet {
            let mut rng = thread_rng();
            let client_id = ShortId::from([255; 32]);
            let (client_tx, client_rx) = mpsc::channel(64);
            let mut relays = HashMap::new();
            let mut relay_ids = Vec::new();
            let mut relay_pubkeys = Vec::new();
            for _ in 0..hops {
                let sk = SecretKey::generate(&mut rng);
                let pk = sk.public_key();
                let id = ShortId::of(&pk);
                let keyring = Keyring::new();
                keyring.add_key(sk).await;
                let (adnl_tx, adnl_rx) = mpsc::channel(64);
                let (overlay_tx, _overlay_rx) = mpsc::channel(64);
                // The overlay receiver is dropped: these relays are not
                // exercising discovery.
                let server = GarlicServer::new(id, keyring, adnl_tx, overlay_tx);
                relays.insert(id, (server, adnl_rx));
                relay_ids.push(id);
                relay_pubkeys.push(pk);
            }
            TestNet {
                client_id,
                client_rx,
                relays,
                relay_ids,
                relay_pubkeys,
                dead: Vec::new(),
                connection: None,
                keyring: Keyring::new(),
                client_tx,
            }
        }

        async fn connect(&mut self) {
            let connection = Connection::new(
                self.client_id,
                self.relay_pubkeys.clone(),
                self.keyring.clone(),
                self.client_tx.clone(),
            ).await.unwrap();
            self.connection = Some(connection);
        }

        /// Deliver queued messages until the network is quiescent. Returns
        /// the events the connection produced and every request that reached
        /// a non-relay target.
        async fn pump(&mut self) -> (Vec<ConnectionEvent>, Vec<AdnlRequest>) {
            let mut events = Vec::new();
            let mut external = Vec::new();
            loop {
                let mut idle = true;
                let mut pending = Vec::new();
                while let Ok(Some(request)) = self.client_rx.try_next() {
                    pending.push(request);
                }
                for id in &self.relay_ids {
                    let rx = &mut self.relays.get_mut(id).unwrap().1;
                    while let Ok(Some(request)) = rx.try_next() {
                        pending.push(request);
                    }
                }
                for request in pending {
                    idle = false;
                    match request {
                        AdnlRequest::SendMessage { dst, data, .. }
                        | AdnlRequest::SendMessageDirect { dst, data, .. } => {
                            self.deliver(dst, data, &mut events).await;
                        },
                        other => external.push(other),
                    }
                }
                if idle {
                    break;
                }
            }
            (events, external)
        }

        async fn deliver(&mut self, dst: ShortId, data: Vec<u8>, events: &mut Vec<ConnectionEvent>) {
            if self.dead.contains(&dst) {
                return;
            }
            if dst == self.client_id {
                let connection = self.connection.as_ref().unwrap();
                if let Ok(Some(event)) = connection.handle_tunnel_packet(data).await {
                    events.push(event);
                }
                return;
            }
            let (server, _) = match self.relays.get(&dst) {
                Some(entry) => entry,
                None => return,
            };
            let server = server.clone();
            if is_tunnel_packet(&data) {
                let _ = server.handle_tunnel_packet(None, data).await;
            } else if let Some(message) = Message::from_slice(&data) {
                let _ = server.handle_message(ShortId::ZERO, message).await;
            }
        }
    }

    #[tokio::test]
    async fn three_hop_build_becomes_ready() {
        let mut net = TestNet::new(3).await;
        net.connect().await;

        let (events, external) = net.pump().await;
        assert!(external.is_empty());

        // Three init pongs culminate in exactly one Ready carrying the
        // terminal relay and session key.
        let connection = net.connection.as_ref().unwrap();
        assert_eq!(events.len(), 1);
        let addr_list = match &events[0] {
            ConnectionEvent::Ready(addr_list) => addr_list.clone(),
            other => panic!("Expected Ready but got {:?}", other),
        };
        assert_eq!(addr_list.addrs.len(), 1);
        assert_eq!(addr_list.addrs[0].relay, net.relay_ids[2]);
        assert_eq!(addr_list.addrs[0].pubkey, *connection.session_pubkeys.last().unwrap());
    }

    #[tokio::test]
    async fn single_hop_udp_round_trip() {
        let mut net = TestNet::new(1).await;
        net.connect().await;
        let (events, _) = net.pump().await;
        assert_eq!(events.len(), 1);

        let connection = net.connection.as_ref().unwrap().clone();
        connection.send_packet(ShortId::ZERO, "127.0.0.1:9999".parse().unwrap(), b"hello".to_vec()).await.unwrap();
        let (_, external) = net.pump().await;
        assert_eq!(external, vec![AdnlRequest::SendUdpPacket {
            src: net.relay_ids[0],
            addr: "127.0.0.1:9999".parse().unwrap(),
            data: b"hello".to_vec(),
        }]);
    }

    #[tokio::test]
    async fn send_packet_before_ready_is_dropped() {
        let mut net = TestNet::new(2).await;
        net.connect().await;
        // Do not pump: the chain is still building.
        let connection = net.connection.as_ref().unwrap().clone();
        connection.send_packet(ShortId::ZERO, "127.0.0.1:9999".parse().unwrap(), b"early".to_vec()).await.unwrap();

        let (_, external) = net.pump().await;
        // Only the build handshake ran; the early packet went nowhere.
        assert!(external.is_empty());
    }

    #[tokio::test]
    async fn dead_middle_hop_is_blamed() {
        tokio::time::pause();
        let mut net = TestNet::new(3).await;
        net.connect().await;
        net.dead.push(net.relay_ids[1]);

        let mut events = Vec::new();
        // Initial send plus three retries at 3 s intervals, then the
        // verdict.
        for _ in 0..(INIT_RETRIES as usize + 2) {
            let (pumped, _) = net.pump().await;
            events.extend(pumped);
            let connection = net.connection.as_ref().unwrap().clone();
            if let Some(event) = connection.alarm().await {
                events.push(event);
            }
            tokio::time::advance(INIT_RESEND_INTERVAL).await;
        }
        assert_eq!(events, vec![ConnectionEvent::Failed(Some(net.relay_ids[1]))]);
    }

    #[tokio::test]
    async fn keepalive_timeout_fails_the_chain() {
        tokio::time::pause();
        let mut net = TestNet::new(2).await;
        net.connect().await;
        let (events, _) = net.pump().await;
        assert_eq!(events.len(), 1);

        // Kill the exit relay: keepalives go unanswered from now on.
        net.dead.push(net.relay_ids[1]);

        let connection = net.connection.as_ref().unwrap().clone();
        let mut failed = None;
        // Worst case: 15 s gap, then 1 send + 3 retries at 2 s each.
        for _ in 0..30 {
            if let Some(event) = connection.alarm().await {
                failed = Some(event);
                break;
            }
            net.pump().await;
            tokio::time::advance(Duration::from_secs(1)).await;
        }
        assert_eq!(failed, Some(ConnectionEvent::Failed(None)));
    }

    #[tokio::test]
    async fn keepalive_pong_keeps_the_chain_alive() {
        tokio::time::pause();
        let mut net = TestNet::new(2).await;
        net.connect().await;
        let (events, _) = net.pump().await;
        assert_eq!(events.len(), 1);

        let connection = net.connection.as_ref().unwrap().clone();
        // Run well past several keepalive rounds with honest relays.
        for _ in 0..60 {
            assert_eq!(connection.alarm().await, None);
            net.pump().await;
            tokio::time::advance(Duration::from_secs(1)).await;
        }
    }

    #[tokio::test]
    async fn destroy_purges_session_keys() {
        let mut net = TestNet::new(2).await;
        net.connect().await;
        net.pump().await;

        let connection = net.connection.as_ref().unwrap().clone();
        let ids = connection.decrypt_via.clone();
        for id in &ids {
            assert!(net.keyring.get_public_key(id).await.is_some());
        }
        connection.destroy().await;
        for id in &ids {
            assert!(net.keyring.get_public_key(id).await.is_none());
        }
    }

    #[tokio::test]
    async fn init_bundle_hides_client_and_exit_from_middle_hop() {
        // Build the init onion for a three-hop chain and peel it the way the
        // relays would, checking what each hop's plaintext exposes.
        let mut rng = thread_rng();
        let client_id = ShortId::from([255; 32]);
        let keyring = Keyring::new();
        let (adnl_tx, mut adnl_rx) = mpsc::channel(64);

        let relay_sks: Vec<SecretKey> = (0..3).map(|_| SecretKey::generate(&mut rng)).collect();
        let relay_pks: Vec<PublicKey> = relay_sks.iter().map(|sk| sk.public_key()).collect();
        let relay_ids: Vec<ShortId> = relay_pks.iter().map(ShortId::of).collect();

        let _connection = Connection::new(client_id, relay_pks, keyring, adnl_tx).await.unwrap();
        let first = match net_next(&mut adnl_rx).await {
            AdnlRequest::SendMessage { dst, data, .. } => {
                assert_eq!(dst, relay_ids[0]);
                data
            },
            other => panic!("Expected SendMessage but got {:?}", other),
        };

        // Hop 0 sees the client id (it talks to it directly) and hop 1.
        let hop0 = Message::from_slice(&first).unwrap();
        let sealed_for_1 = extract_forward(&hop0, &relay_ids[1]);
        assert!(contains(&first, client_id.as_bytes()));

        // Hop 1's plaintext names only its neighbours, never the client.
        let hop1_plain = open(&relay_sks[1], &sealed_for_1).unwrap();
        let hop1 = Message::from_slice(&hop1_plain).unwrap();
        let sealed_for_2 = extract_forward(&hop1, &relay_ids[2]);
        assert!(!contains(&hop1_plain, client_id.as_bytes()));
        assert!(contains(&hop1_plain, relay_ids[0].as_bytes()));
        assert!(contains(&hop1_plain, relay_ids[2].as_bytes()));

        // Hop 2's plaintext names hop 1 but neither the client nor hop 0.
        let hop2_plain = open(&relay_sks[2], &sealed_for_2).unwrap();
        assert!(!contains(&hop2_plain, client_id.as_bytes()));
        assert!(!contains(&hop2_plain, relay_ids[0].as_bytes()));
        assert!(contains(&hop2_plain, relay_ids[1].as_bytes()));
    }

    async fn net_next(rx: &mut mpsc::Receiver<AdnlRequest>) -> AdnlRequest {
        use futures::StreamExt;
        rx.next().await.unwrap()
    }

    /// Pull the sealed continuation for `dst` out of a hop's clove bundle.
    fn extract_forward(message: &Message, dst: &ShortId) -> Vec<u8> {
        let messages = match message {
            Message::MultipleMessages(multiple) => &multiple.messages,
            other => panic!("Expected MultipleMessages but got {:?}", other),
        };
        messages.iter()
            .find_map(|inner| match inner {
                Message::ForwardToNext(forward) if forward.dst == *dst => Some(forward.data.clone()),
                _ => None,
            })
            .expect("No forward for the next hop")
    }

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|window| window == needle)
    }
}
