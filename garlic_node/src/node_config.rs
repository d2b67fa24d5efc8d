//! CLI and global config parsing for the relay daemon.

use std::net::{SocketAddr, ToSocketAddrs};
use std::process;

use anyhow::Context;
use clap::{App, Arg, ErrorKind};
use hex::FromHex;
use serde::{de, Deserialize, Deserializer};

use garlic::crypto::{PublicKey, ShortId};

/// Config parsed from command line arguments.
#[derive(Clone, Debug)]
pub struct NodeConfig {
    /// Local UDP bind address.
    pub udp_addr: SocketAddr,
    /// Pre-existing relay identity; a random one is generated if absent.
    pub adnl_id: Option<ShortId>,
    /// Path of the global config file.
    pub config_path: String,
    /// State root directory.
    pub db_root: String,
    /// Verbosity level, additive to FATAL.
    pub verbosity: u8,
    /// Daemonise on SIGHUP.
    pub daemonize: bool,
    /// Log to file instead of stderr.
    pub log_file: Option<String>,
}

/// Parse command line arguments. Exits with code 2 on invalid input.
pub fn cli_parse() -> NodeConfig {
    let matches = App::new("garlic-node")
        .version(clap::crate_version!())
        .about(
            "A garlic relay proxies layered datagram messages and hosts adnl \
             tunnel midpoints.\nClients use several garlic relays to \
             anonymously send and receive adnl messages.",
        )
        .arg(Arg::with_name("address")
            .short("a")
            .long("address")
            .required(true)
            .takes_value(true)
            .help("Local <ip>:<port> to bind the UDP socket to"))
        .arg(Arg::with_name("adnl-id")
            .short("A")
            .long("adnl-id")
            .takes_value(true)
            .help("Relay identity (hex short id); random if not set"))
        .arg(Arg::with_name("config")
            .short("C")
            .long("config")
            .required(true)
            .takes_value(true)
            .help("Global config file; must contain a dht section"))
        .arg(Arg::with_name("db-root")
            .short("D")
            .long("db-root")
            .takes_value(true)
            .default_value(".")
            .help("State root directory"))
        .arg(Arg::with_name("verbosity")
            .short("v")
            .long("verbosity")
            .takes_value(true)
            .default_value("0")
            .help("Verbosity level, additive to FATAL"))
        .arg(Arg::with_name("daemonize")
            .short("d")
            .long("daemonize")
            .help("Daemonise on SIGHUP"))
        .arg(Arg::with_name("log-file")
            .short("l")
            .long("log-file")
            .takes_value(true)
            .help("Write the log to a file instead of stderr"))
        .get_matches_safe()
        .unwrap_or_else(|e| {
            if e.kind == ErrorKind::HelpDisplayed || e.kind == ErrorKind::VersionDisplayed {
                e.exit();
            }
            eprintln!("{}", e.message);
            process::exit(2);
        });

    let udp_addr = matches.value_of("address").unwrap().parse().unwrap_or_else(|e| {
        eprintln!("Invalid bind address: {}", e);
        process::exit(2);
    });
    let adnl_id = matches.value_of("adnl-id").map(|s| {
        ShortId::from_hex(s).unwrap_or_else(|e| {
            eprintln!("Invalid adnl id: {}", e);
            process::exit(2);
        })
    });
    let verbosity = matches.value_of("verbosity").unwrap().parse().unwrap_or_else(|e| {
        eprintln!("Invalid verbosity: {}", e);
        process::exit(2);
    });

    NodeConfig {
        udp_addr,
        adnl_id,
        config_path: matches.value_of("config").unwrap().to_owned(),
        db_root: matches.value_of("db-root").unwrap().to_owned(),
        verbosity,
        daemonize: matches.is_present("daemonize"),
        log_file: matches.value_of("log-file").map(str::to_owned),
    }
}

/// Static node with a generic string address which might be either an IP
/// address or a DNS name.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize)]
pub struct StaticNode {
    /// `PublicKey` of the node.
    #[serde(deserialize_with = "de_from_hex")]
    pub pk: PublicKey,
    /// Generic string address.
    pub addr: String,
}

impl StaticNode {
    /// Resolve the string address to possibly multiple socket addresses,
    /// each paired with the node's short id.
    pub fn resolve(&self) -> impl Iterator<Item = (ShortId, SocketAddr)> {
        let id = ShortId::of(&self.pk);
        let addrs = match self.addr.to_socket_addrs() {
            Ok(addrs) => addrs,
            Err(e) => {
                warn!("Failed to resolve static node address '{}': {}", self.addr, e);
                Vec::new().into_iter()
            },
        };
        addrs.map(move |addr| (id, addr))
    }
}

fn de_from_hex<'de, D>(deserializer: D) -> Result<PublicKey, D::Error> where D: Deserializer<'de> {
    let s = String::deserialize(deserializer)?;

    let pk_bytes: [u8; 32] = FromHex::from_hex(s)
        .map_err(|e| de::Error::custom(format!("Can't make bytes from hex string {:?}", e)))?;
    Ok(PublicKey::from(pk_bytes))
}

/// The `dht` section of the global config.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize)]
pub struct DhtConfig {
    /// Bootstrap nodes of the DHT, doubling as the initial peer table.
    #[serde(rename = "static-nodes")]
    pub static_nodes: Vec<StaticNode>,
}

/// Global config file contents.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize)]
pub struct GlobalConfig {
    /// DHT section. Mandatory for the daemon, optional in the format.
    pub dht: Option<DhtConfig>,
}

/// Load and parse the global config file.
pub fn load_global_config(path: &str) -> anyhow::Result<GlobalConfig> {
    let file = std::fs::File::open(path).with_context(|| format!("Failed to read '{}'", path))?;
    serde_yaml::from_reader(file).with_context(|| format!("Failed to parse '{}'", path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_global_config() {
        let yaml = r#"
dht:
  static-nodes:
    - pk: "2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a"
      addr: "127.0.0.1:33445"
"#;
        let config: GlobalConfig = serde_yaml::from_str(yaml).unwrap();
        let dht = config.dht.unwrap();
        assert_eq!(dht.static_nodes.len(), 1);
        assert_eq!(dht.static_nodes[0].pk, PublicKey::from([0x2a; 32]));

        let resolved: Vec<_> = dht.static_nodes[0].resolve().collect();
        assert_eq!(resolved, vec![(
            ShortId::of(&dht.static_nodes[0].pk),
            "127.0.0.1:33445".parse().unwrap(),
        )]);
    }

    #[test]
    fn parse_global_config_without_dht() {
        let config: GlobalConfig = serde_yaml::from_str("{}").unwrap();
        assert!(config.dht.is_none());
    }

    #[test]
    fn unresolvable_static_node_is_empty() {
        let node = StaticNode {
            pk: PublicKey::from([1; 32]),
            addr: "definitely not an address".to_owned(),
        };
        assert_eq!(node.resolve().count(), 0);
    }
}
