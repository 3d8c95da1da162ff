//! The wallet collaborator contract and the default loader.
//!
//! Key derivation and UTXO management live behind the [`Wallet`] trait.
//! The session only needs to lock/unlock, sign, answer ownership queries
//! for decoding, and close the wallet on unload.

mod keyring;

pub use keyring::Keyring;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use bitcoin::sign_message::MessageSignature;
use bitcoin::{Amount, Network};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::address::WalletAddress;
use crate::decode::DecodeContext;
use crate::error::WalletError;
use crate::lock;

// ==============================================================================
// Wallet
// ==============================================================================

pub trait Wallet: DecodeContext + Send + Sync {
    fn is_locked(&self) -> bool;

    fn unlock(&self, passphrase: &[u8]) -> Result<(), WalletError>;

    fn lock(&self);

    /// Produce a signed-message signature with the key behind `address`.
    /// The address has already passed the signing capability gate.
    fn sign_message(
        &self,
        message: &str,
        address: &WalletAddress,
    ) -> Result<MessageSignature, WalletError>;

    /// Release whatever the wallet holds open. Called once on unload.
    fn close(&self) -> Result<(), WalletError> {
        Ok(())
    }
}

// ==============================================================================
// Loader
// ==============================================================================

pub trait WalletLoader: Send + Sync {
    fn loaded_wallet(&self) -> Option<Arc<dyn Wallet>>;

    fn load_wallet(&self, wallet: Arc<dyn Wallet>) -> Result<(), WalletError>;

    /// Close and forget the loaded wallet. A no-op when none is loaded.
    fn unload_wallet(&self) -> Result<(), WalletError>;
}

/// Options a loader passes on to the wallets it opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderOptions {
    pub address_gap_limit: u32,
    pub account_gap_limit: u32,
    pub allow_high_fees: bool,
    pub relay_fee_per_kvb: Amount,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            address_gap_limit: 20,
            account_gap_limit: 10,
            allow_high_fees: false,
            relay_fee_per_kvb: Amount::from_sat(1_000),
        }
    }
}

/// Loader bound to one network and data directory. Holds at most one
/// loaded wallet.
pub struct Loader {
    network: Network,
    data_dir: PathBuf,
    options: LoaderOptions,
    wallet: Mutex<Option<Arc<dyn Wallet>>>,
}

impl Loader {
    pub fn new(network: Network, data_dir: impl Into<PathBuf>, options: LoaderOptions) -> Self {
        Self {
            network,
            data_dir: data_dir.into(),
            options,
            wallet: Mutex::new(None),
        }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn options(&self) -> &LoaderOptions {
        &self.options
    }
}

impl WalletLoader for Loader {
    fn loaded_wallet(&self) -> Option<Arc<dyn Wallet>> {
        lock(&self.wallet).clone()
    }

    fn load_wallet(&self, wallet: Arc<dyn Wallet>) -> Result<(), WalletError> {
        let mut slot = lock(&self.wallet);
        if slot.is_some() {
            return Err(WalletError::Backend("a wallet is already loaded".into()));
        }
        *slot = Some(wallet);
        info!(network = %self.network, data_dir = %self.data_dir.display(), "wallet loaded");
        Ok(())
    }

    fn unload_wallet(&self) -> Result<(), WalletError> {
        let Some(wallet) = lock(&self.wallet).take() else {
            return Ok(());
        };
        wallet.close()
    }
}
