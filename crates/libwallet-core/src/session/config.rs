use std::path::{Path, PathBuf};
use std::time::Duration;

use bitcoin::Network;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::logging::LogConfig;
use crate::wallet::LoaderOptions;

/// File name of the transaction index inside the data directory.
pub const TX_DB_NAME: &str = "tx.db";

pub const DEFAULT_INDEX_LOCK_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub data_dir: PathBuf,
    pub network: Network,
    /// Spawn a listener that shuts the session down on SIGINT/SIGTERM.
    /// Requires a running tokio runtime at open time.
    pub listen_for_signals: bool,
    /// Terminate the process once a signal-driven shutdown completes.
    pub exit_on_signal: bool,
    #[serde(with = "duration_millis")]
    pub index_lock_timeout: Duration,
    pub log: LogConfig,
    pub loader: LoaderOptions,
}

impl SessionConfig {
    /// Data directory is `<root_dir>/<network>`; OS signals end the session.
    pub fn new(root_dir: impl AsRef<Path>, network_name: &str) -> Result<Self, Error> {
        let network = parse_network(network_name)?;
        Ok(Self {
            data_dir: root_dir.as_ref().join(network_dir_name(network)),
            listen_for_signals: true,
            ..Self::with_data_dir(PathBuf::new(), network)
        })
    }

    /// Use `data_dir` as-is, without a signal listener.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>, network: Network) -> Self {
        Self {
            data_dir: data_dir.into(),
            network,
            listen_for_signals: false,
            exit_on_signal: false,
            index_lock_timeout: DEFAULT_INDEX_LOCK_TIMEOUT,
            log: LogConfig::default(),
            loader: LoaderOptions::default(),
        }
    }

    pub fn tx_db_path(&self) -> PathBuf {
        self.data_dir.join(TX_DB_NAME)
    }
}

/// Accepts the common spellings of each supported network.
pub fn parse_network(name: &str) -> Result<Network, Error> {
    match name.trim().to_ascii_lowercase().as_str() {
        "mainnet" | "bitcoin" | "main" => Ok(Network::Bitcoin),
        "testnet" | "testnet3" | "test" => Ok(Network::Testnet),
        "signet" => Ok(Network::Signet),
        "regtest" => Ok(Network::Regtest),
        other => Err(Error::Config(format!("unsupported network type {other:?}"))),
    }
}

pub fn network_dir_name(network: Network) -> &'static str {
    match network {
        Network::Bitcoin => "mainnet",
        Network::Testnet => "testnet3",
        Network::Signet => "signet",
        Network::Regtest => "regtest",
        other => other.to_core_arg(),
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
