//! The garlic relay daemon.
//!
//! Binds a UDP socket, loads or generates the relay identity under the state
//! root and runs a `GarlicServer` on top. The static DHT nodes of the global
//! config double as the peer table used to resolve next-hop short ids.

#[macro_use]
extern crate log;

mod node_config;

use std::collections::HashMap;
use std::convert::TryInto;
use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::net::SocketAddr;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Error};
use futures::channel::mpsc;
use futures::StreamExt;
use rand::thread_rng;
use tokio::net::UdpSocket;
use tokio::runtime;

use garlic::core::adnl::{AdnlRequest, OverlayRequest};
use garlic::core::keyring::Keyring;
use garlic::core::relay::GarlicServer;
use garlic::crypto::{PublicKey, SecretKey, ShortId, KEY_SIZE};
use garlic::packet::garlic::Message;
use garlic::packet::tunnel::is_tunnel_packet;

use crate::node_config::*;

/// Channel size for transport and overlay requests.
const REQUEST_CHANNEL_SIZE: usize = 32;

/// Receive buffer size; a datagram cannot exceed the UDP maximum.
const RECV_BUFFER_SIZE: usize = 65536;

fn init_logger(config: &NodeConfig) {
    let level = match config.verbosity {
        0 => log::LevelFilter::Error,
        1 => log::LevelFilter::Warn,
        2 => log::LevelFilter::Info,
        3 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);
    if let Some(path) = &config.log_file {
        match File::create(path) {
            Ok(file) => {
                builder.target(env_logger::Target::Pipe(Box::new(file)));
            },
            Err(e) => {
                eprintln!("Failed to open log file '{}': {}", path, e);
                process::exit(2);
            },
        }
    }
    builder.init();
}

/// Save the relay keypair to a binary file readable only by the owner.
fn save_keys(keys_file: &str, pk: &PublicKey, sk: &SecretKey) -> Result<(), Error> {
    #[cfg(unix)]
    use std::os::unix::fs::OpenOptionsExt;

    let mut options = std::fs::OpenOptions::new();
    options.create(true).write(true);
    #[cfg(unix)]
    options.mode(0o600);
    let mut file = options.open(keys_file)
        .with_context(|| format!("Failed to create the keys file '{}'", keys_file))?;

    file.write_all(pk.as_bytes()).context("Failed to save the public key")?;
    file.write_all(sk.as_bytes()).context("Failed to save the secret key")?;
    Ok(())
}

/// Load the relay keypair from a binary file.
fn load_keys(mut file: File) -> Result<(PublicKey, SecretKey), Error> {
    let mut buf = [0; KEY_SIZE * 2];
    file.read_exact(&mut buf).context("Failed to read the keys file")?;
    let pk_bytes: [u8; KEY_SIZE] = buf[..KEY_SIZE].try_into().unwrap();
    let sk_bytes: [u8; KEY_SIZE] = buf[KEY_SIZE..].try_into().unwrap();
    let pk = PublicKey::from(pk_bytes);
    let sk = SecretKey::from(sk_bytes);
    if pk != sk.public_key() {
        return Err(anyhow::anyhow!("The stored public key does not match the stored secret key"));
    }
    Ok((pk, sk))
}

/// Load the relay keypair or generate and save a fresh one.
fn load_or_gen_keys(keys_file: &str) -> Result<(PublicKey, SecretKey), Error> {
    match File::open(keys_file) {
        Ok(file) => load_keys(file),
        Err(ref e) if e.kind() == ErrorKind::NotFound => {
            info!("Generating new relay keys and storing them to '{}'", keys_file);
            let sk = SecretKey::generate(&mut thread_rng());
            let pk = sk.public_key();
            save_keys(keys_file, &pk, &sk)?;
            Ok((pk, sk))
        },
        Err(e) => Err(Error::new(e).context(format!("Failed to open the keys file '{}'", keys_file))),
    }
}

/// Execute ADNL transport requests against the socket and peer table.
async fn run_requests(
    socket: Arc<UdpSocket>,
    mut rx: mpsc::Receiver<AdnlRequest>,
    peers: HashMap<ShortId, SocketAddr>,
) {
    while let Some(request) = rx.next().await {
        match request {
            AdnlRequest::SendMessage { dst, data, .. }
            | AdnlRequest::SendMessageDirect { dst, data, .. } => match peers.get(&dst) {
                Some(addr) => {
                    if let Err(e) = socket.send_to(&data, addr).await {
                        debug!("Failed to send message to {}: {}", dst, e);
                    }
                },
                None => debug!("Dropping message to unknown peer {}", dst),
            },
            AdnlRequest::SendUdpPacket { addr, data, .. } => {
                if let Err(e) = socket.send_to(&data, addr).await {
                    debug!("Failed to send UDP packet to {}: {}", addr, e);
                }
            },
            AdnlRequest::ReceivePacket { .. } => {
                debug!("Dropping received packet: relay has no local consumer");
            },
            AdnlRequest::AddId { .. } | AdnlRequest::SetCustomDhtNode { .. } => {
                debug!("Ignoring identity request in relay mode");
            },
        }
    }
}

/// Log overlay membership changes. Discovery itself is served by the static
/// node list, so peer requests need no answer here.
async fn run_overlay(mut rx: mpsc::Receiver<OverlayRequest>) {
    while let Some(request) = rx.next().await {
        match request {
            OverlayRequest::Join { overlay_id, .. } => info!("Joined overlay {}", overlay_id),
            OverlayRequest::Leave { overlay_id, .. } => info!("Left overlay {}", overlay_id),
            OverlayRequest::RandomPeers { .. } => (),
        }
    }
}

/// Feed incoming datagrams into the server, dispatching on the framing.
async fn run_socket(socket: Arc<UdpSocket>, server: GarlicServer) {
    let mut buf = vec![0; RECV_BUFFER_SIZE];
    loop {
        let (len, addr) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                warn!("UDP recv error: {}", e);
                continue;
            },
        };
        let data = buf[..len].to_vec();
        let src_addr = match addr {
            SocketAddr::V4(v4) => Some(v4),
            SocketAddr::V6(_) => None,
        };
        if is_tunnel_packet(&data) {
            if let Err(e) = server.handle_tunnel_packet(src_addr, data).await {
                debug!("Failed to handle tunnel packet from {}: {}", addr, e);
            }
        } else if let Some(message) = Message::from_slice(&data) {
            if let Err(e) = server.handle_message(ShortId::ZERO, message).await {
                debug!("Failed to handle message from {}: {}", addr, e);
            }
        } else {
            debug!("Dropping malformed datagram from {}", addr);
        }
    }
}

async fn run(config: NodeConfig, dht: DhtConfig, sk: SecretKey) -> Result<(), Error> {
    let socket = UdpSocket::bind(&config.udp_addr).await
        .with_context(|| format!("Failed to bind UDP socket at {}", config.udp_addr))?;
    let socket = Arc::new(socket);

    let keyring = Keyring::new();
    let local_id = keyring.add_key(sk).await;
    let (adnl_tx, adnl_rx) = mpsc::channel(REQUEST_CHANNEL_SIZE);
    let (overlay_tx, overlay_rx) = mpsc::channel(REQUEST_CHANNEL_SIZE);
    let server = GarlicServer::new(local_id, keyring, adnl_tx, overlay_tx);
    server.start().await?;
    info!("Started garlic relay {} on {}", local_id, config.udp_addr);

    let peers: HashMap<ShortId, SocketAddr> = dht.static_nodes.iter()
        .flat_map(StaticNode::resolve)
        .collect();
    info!("Peer table holds {} static nodes", peers.len());

    let eviction = {
        let server = server.clone();
        tokio::spawn(async move { server.run_ttl_eviction().await })
    };
    let requests = tokio::spawn(run_requests(Arc::clone(&socket), adnl_rx, peers));
    let overlay = tokio::spawn(run_overlay(overlay_rx));
    let receiver = {
        let server = server.clone();
        tokio::spawn(run_socket(Arc::clone(&socket), server))
    };

    tokio::signal::ctrl_c().await.context("Failed to wait for shutdown signal")?;
    info!("Shutting down");
    server.shutdown().await?;
    eviction.abort();
    receiver.abort();
    overlay.abort();
    requests.abort();
    Ok(())
}

fn main() {
    let config = cli_parse();
    init_logger(&config);
    if config.daemonize {
        warn!("Daemon mode is not supported, continuing in the foreground");
    }

    let global = match load_global_config(&config.config_path) {
        Ok(global) => global,
        Err(e) => {
            eprintln!("Failed to load global config: {:#}", e);
            process::exit(2);
        },
    };
    let dht = match global.dht {
        Some(dht) => dht,
        None => {
            eprintln!("Global config does not contain a dht section");
            process::exit(2);
        },
    };

    if let Err(e) = std::fs::create_dir_all(&config.db_root) {
        eprintln!("Failed to create state root '{}': {}", config.db_root, e);
        process::exit(2);
    }
    let keys_file = format!("{}/keys", config.db_root);
    let (pk, sk) = match load_or_gen_keys(&keys_file) {
        Ok(keys) => keys,
        Err(e) => {
            eprintln!("{:#}", e);
            process::exit(2);
        },
    };
    if let Some(expected) = config.adnl_id {
        if ShortId::of(&pk) != expected {
            eprintln!("The stored identity {} does not match the requested {}", ShortId::of(&pk), expected);
            process::exit(2);
        }
    }

    let runtime = match runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to create runtime: {}", e);
            process::exit(2);
        },
    };
    if let Err(e) = runtime.block_on(run(config, dht, sk)) {
        error!("{:#}", e);
        process::exit(2);
    }
}
