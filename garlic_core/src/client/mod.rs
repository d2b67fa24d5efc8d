/*! The garlic client manager.

Owns the relay directory, at most one active chain and the set of secret
identities published at the chain's address. The manager is driven by a
periodic alarm: it refreshes the directory from the discovery overlay,
rebuilds the chain after failures and re-binds every secret identity whenever
the externally visible address changes.
*/

mod connection;
pub mod errors;

pub use self::connection::{Connection, ConnectionEvent};
pub use self::connection::{INIT_RESEND_INTERVAL, INIT_RETRIES, PING_RESEND_INTERVAL, PING_RETRIES};

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::channel::mpsc::SendError;
use futures::SinkExt;
use rand::seq::SliceRandom;
use rand::thread_rng;
use tokio::sync::RwLock;
use tokio::time::Instant;

use garlic_crypto::{PublicKey, SecretKey, ShortId};

use crate::adnl::*;
use crate::keyring::Keyring;
use crate::time::*;
use self::errors::*;

/// How often the manager alarm runs.
pub const MAIN_LOOP_INTERVAL: Duration = Duration::from_secs(1);

/// Batch size of random peers requested from the overlay per tick.
const RANDOM_PEERS_COUNT: usize = 8;

/// How long a relay blamed for a chain failure is skipped by selection.
const CAUSER_COOLDOWN: Duration = Duration::from_secs(60);

/// Configuration of a [`GarlicManager`](./struct.GarlicManager.html).
#[derive(Clone, Debug)]
pub struct GarlicConfig {
    /// Number of relays per chain.
    pub chain_length: usize,
    /// Grace period after startup before the first chain is attempted,
    /// giving discovery time to fill the directory.
    pub start_delay: Duration,
    /// Mint a dedicated identity and route all secret-identity DHT traffic
    /// through a DHT client bound to it.
    pub use_secret_dht: bool,
}

impl Default for GarlicConfig {
    fn default() -> GarlicConfig {
        GarlicConfig {
            chain_length: 3,
            start_delay: Duration::from_secs(10),
            use_secret_dht: false,
        }
    }
}

struct ManagerState {
    /// Known relays, fed by overlay discovery.
    servers: HashMap<ShortId, PublicKey>,
    /// Relays temporarily excluded from selection.
    cooldown: HashMap<ShortId, Instant>,
    connection: Option<Connection>,
    secret_ids: HashMap<ShortId, PublicKey>,
    secret_dht: Option<ShortId>,
    /// Address list secret identities are currently bound to.
    addr_list: AddressList,
    create_connection_at: Instant,
}

/** The client-side half of the garlic overlay.

The embedding node calls [`handle_random_peers`] with discovery results and
[`handle_tunnel_packet`] with inbound tunnel datagrams, and drives [`run`]
(or [`alarm`] directly) for the periodic work.

[`handle_random_peers`]: #method.handle_random_peers
[`handle_tunnel_packet`]: #method.handle_tunnel_packet
[`run`]: #method.run
[`alarm`]: #method.alarm
*/
#[derive(Clone)]
pub struct GarlicManager {
    /// Short id of the client's transport identity.
    pub local_id: ShortId,
    adnl_cat: u8,
    config: GarlicConfig,
    keyring: Keyring,
    adnl_tx: AdnlTx,
    overlay_tx: OverlayTx,
    state: Arc<RwLock<ManagerState>>,
}

impl GarlicManager {
    /// Create a new `GarlicManager` instance.
    pub fn new(
        local_id: ShortId,
        adnl_cat: u8,
        config: GarlicConfig,
        keyring: Keyring,
        adnl_tx: AdnlTx,
        overlay_tx: OverlayTx,
    ) -> GarlicManager {
        debug!("Created new GarlicManager instance");
        let state = ManagerState {
            servers: HashMap::new(),
            cooldown: HashMap::new(),
            connection: None,
            secret_ids: HashMap::new(),
            secret_dht: None,
            addr_list: AddressList::empty(),
            create_connection_at: clock_now() + config.start_delay,
        };
        GarlicManager {
            local_id,
            adnl_cat,
            config,
            keyring,
            adnl_tx,
            overlay_tx,
            state: Arc::new(RwLock::new(state)),
        }
    }

    /// Join the discovery overlay as an observer and, when configured, set
    /// up the secret DHT identity.
    pub async fn start(&self) -> Result<(), CreateSecretIdError> {
        let request = OverlayRequest::Join {
            local_id: self.local_id,
            overlay_id: public_overlay_id(),
            meta: GARLIC_OVERLAY_META.to_owned(),
        };
        self.overlay_tx.clone().send(request).await.map_err(CreateSecretIdError::SendTo)?;

        if self.config.use_secret_dht {
            let sk = SecretKey::generate(&mut thread_rng());
            let pk = sk.public_key();
            let dht_id = self.keyring.add_key(sk).await;
            self.state.write().await.secret_dht = Some(dht_id);
            self.create_secret_id(pk).await?;
            debug!("Created secret DHT identity {}", dht_id);
        }
        Ok(())
    }

    /// Tear the chain down and leave the overlay.
    pub async fn shutdown(&self) {
        let connection = self.state.write().await.connection.take();
        if let Some(connection) = connection {
            connection.destroy().await;
        }
        let request = OverlayRequest::Leave {
            local_id: self.local_id,
            overlay_id: public_overlay_id(),
        };
        if let Err(e) = self.overlay_tx.clone().send(request).await {
            debug!("Failed to leave overlay: {}", e);
        }
    }

    /// Run the periodic alarm until the task is dropped.
    pub async fn run(&self) {
        let mut interval = tokio::time::interval(MAIN_LOOP_INTERVAL);
        loop {
            interval.tick().await;
            self.alarm().await;
        }
    }

    /// One alarm tick: refresh the directory, drive the chain state machine,
    /// rebuild when possible.
    pub async fn alarm(&self) {
        let request = OverlayRequest::RandomPeers {
            local_id: self.local_id,
            overlay_id: public_overlay_id(),
            limit: RANDOM_PEERS_COUNT,
        };
        if let Err(e) = self.overlay_tx.clone().send(request).await {
            debug!("Failed to request overlay peers: {}", e);
        }

        let connection = self.state.read().await.connection.clone();
        if let Some(connection) = connection {
            if let Some(event) = connection.alarm().await {
                self.process_connection_event(event).await;
            }
        }

        if let Err(e) = self.try_create_connection().await {
            debug!("Failed to create connection: {}", e);
        }
    }

    /// Merge freshly discovered relays into the directory.
    pub async fn handle_random_peers(&self, peers: Vec<PublicKey>) {
        let mut state = self.state.write().await;
        for pubkey in peers {
            let id = ShortId::of(&pubkey);
            state.servers.entry(id).or_insert_with(|| {
                debug!("Adding relay {}", id);
                pubkey
            });
        }
    }

    async fn try_create_connection(&self) -> Result<(), InitConnectionError> {
        let mut state = self.state.write().await;
        if state.connection.is_some() || clock_now() < state.create_connection_at {
            return Ok(());
        }
        if self.config.chain_length == 0 {
            return Err(InitConnectionError::InvalidArgument);
        }

        let now = clock_now();
        state.cooldown.retain(|_, until| *until > now);
        let mut candidates: Vec<PublicKey> = state.servers.iter()
            .filter(|(id, _)| !state.cooldown.contains_key(*id))
            .map(|(_, pubkey)| pubkey.clone())
            .collect();
        if candidates.len() < self.config.chain_length {
            return Err(InitConnectionError::Exhausted {
                available: candidates.len(),
                required: self.config.chain_length,
            });
        }

        let (selected, _) = candidates.partial_shuffle(&mut thread_rng(), self.config.chain_length);
        let chain = selected.to_vec();
        let connection = Connection::new(self.local_id, chain, self.keyring.clone(), self.adnl_tx.clone())
            .await
            .map_err(InitConnectionError::Wrap)?;
        state.connection = Some(connection);
        Ok(())
    }

    /// Route an inbound tunnel datagram to the chain endpoint.
    pub async fn handle_tunnel_packet(&self, data: Vec<u8>) {
        let connection = self.state.read().await.connection.clone();
        let connection = match connection {
            Some(connection) => connection,
            None => {
                debug!("Dropping tunnel packet: no connection");
                return;
            },
        };
        match connection.handle_tunnel_packet(data).await {
            Ok(Some(event)) => self.process_connection_event(event).await,
            Ok(None) => (),
            Err(e) => debug!("Failed to handle tunnel packet: {}", e),
        }
    }

    async fn process_connection_event(&self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Ready(addr_list) => {
                self.state.write().await.addr_list = addr_list;
                self.update_addr_lists().await;
            },
            ConnectionEvent::Failed(causer) => {
                let connection = {
                    let mut state = self.state.write().await;
                    if let Some(causer) = causer {
                        info!("Penalising relay {}", causer);
                        state.cooldown.insert(causer, clock_now() + CAUSER_COOLDOWN);
                    }
                    state.addr_list = AddressList::empty();
                    state.connection.take()
                };
                // Drop before the next tick may create a replacement.
                if let Some(connection) = connection {
                    connection.destroy().await;
                }
                self.update_addr_lists().await;
            },
        }
    }

    /// Re-register every secret identity with the current address list.
    async fn update_addr_lists(&self) {
        let (addr_list, ids, dht) = {
            let state = self.state.read().await;
            (
                state.addr_list.clone(),
                state.secret_ids.values().cloned().collect::<Vec<_>>(),
                state.secret_dht,
            )
        };
        for pubkey in ids {
            if let Err(e) = self.register_id(pubkey, addr_list.clone(), dht).await {
                debug!("Failed to rebind secret id: {}", e);
            }
        }
    }

    async fn register_id(&self, pubkey: PublicKey, addr_list: AddressList, dht: Option<ShortId>) -> Result<(), SendError> {
        let id = ShortId::of(&pubkey);
        let request = AdnlRequest::AddId {
            id: pubkey,
            addr_list,
            category: self.adnl_cat,
            ignore_remote_addr: true,
        };
        self.adnl_tx.clone().send(request).await?;
        if let Some(dht) = dht {
            self.adnl_tx.clone().send(AdnlRequest::SetCustomDhtNode { id, dht }).await?;
        }
        Ok(())
    }

    /** Register a tunnel-rooted identity.

    The identity is bound to the chain's current address list (empty while no
    chain is ready) with the ignore-remote-addr mode, so peers can only reach
    it through the tunnel. Registration persists for the manager's lifetime
    and is refreshed on every chain change.
    */
    pub async fn create_secret_id(&self, pubkey: PublicKey) -> Result<(), CreateSecretIdError> {
        let id = ShortId::of(&pubkey);
        let (addr_list, dht) = {
            let mut state = self.state.write().await;
            if state.secret_ids.contains_key(&id) {
                return Err(CreateSecretIdError::Duplicate(id));
            }
            state.secret_ids.insert(id, pubkey.clone());
            (state.addr_list.clone(), state.secret_dht)
        };
        debug!("Registering secret id {}", id);
        self.register_id(pubkey, addr_list, dht).await.map_err(CreateSecretIdError::SendTo)
    }

    /// Send a datagram through the chain, to be emitted as UDP at the exit
    /// relay. Fire-and-forget: dropped with a debug log while no chain is
    /// ready.
    pub async fn send_packet(&self, src: ShortId, dst: SocketAddr, data: Vec<u8>) {
        let connection = self.state.read().await.connection.clone();
        match connection {
            Some(connection) => {
                if let Err(e) = connection.send_packet(src, dst, data).await {
                    debug!("Failed to send packet: {}", e);
                }
            },
            None => debug!("Failed to send packet from {}: connection is not ready", src),
        }
    }
}
