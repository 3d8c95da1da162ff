use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use libwallet_core::logging::LogRotation;

/// libwallet — wallet session driver: open a session, sign and verify
/// messages, decode raw transactions.
#[derive(Parser)]
#[command(version, about)]
pub struct Cli {
    /// Root directory; each network gets its own subdirectory.
    #[arg(long, default_value = "libwallet-data", env = "LIBWALLET_ROOT_DIR")]
    pub root_dir: PathBuf,

    /// mainnet, testnet, signet or regtest.
    #[arg(long, default_value = "regtest", env = "LIBWALLET_NETWORK")]
    pub network: String,

    /// Default log filter when RUST_LOG is unset.
    #[arg(long, default_value = "info", env = "LIBWALLET_LOG_LEVEL")]
    pub log_level: String,

    /// never, hourly or daily.
    #[arg(long, default_value = "daily", env = "LIBWALLET_LOG_ROTATION")]
    pub log_rotation: LogRotation,

    /// Rotated log files to keep.
    #[arg(long, default_value = "3")]
    pub max_log_files: usize,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Open a session and hold it until SIGINT/SIGTERM.
    Run(RunArgs),

    /// Sign a message with a WIF private key.
    SignMessage {
        /// Private key in WIF encoding.
        #[arg(long, env = "LIBWALLET_WIF")]
        wif: String,

        /// Passphrase guarding the in-memory keyring.
        #[arg(long, env = "LIBWALLET_PASSPHRASE")]
        passphrase: String,

        /// P2PKH address or hex public key of the key. Defaults to the
        /// key's P2PKH address.
        #[arg(long)]
        address: Option<String>,

        #[arg(long)]
        message: String,
    },

    /// Check a base64 signature over a message.
    VerifyMessage {
        #[arg(long)]
        address: String,

        #[arg(long)]
        message: String,

        #[arg(long)]
        signature: String,
    },

    /// Decode a hex-encoded raw transaction and print it as JSON.
    DecodeTx {
        /// Raw transaction hex.
        hex: String,
    },
}

#[derive(Args)]
pub struct RunArgs {
    /// Bitcoin Core RPC URL. Without it, no RPC client is attached.
    #[arg(long, env = "LIBWALLET_RPC_URL")]
    pub rpc_url: Option<String>,

    #[arg(long, env = "LIBWALLET_RPC_USER")]
    pub rpc_user: Option<String>,

    #[arg(long, env = "LIBWALLET_RPC_PASS")]
    pub rpc_pass: Option<String>,

    /// Cookie file used when user/pass are not given.
    #[arg(long, env = "LIBWALLET_RPC_COOKIE")]
    pub rpc_cookie: Option<PathBuf>,
}
