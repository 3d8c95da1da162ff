use std::io;
use std::path::Path;
use std::sync::Arc;

use crate::error::StoreError;
use crate::index::{FileTxIndex, TxIndex};
use crate::logging::{FileLogSink, LogSink};
use crate::signing::{MessageVerifier, Secp256k1Verifier};
use crate::wallet::{Loader, WalletLoader};

use super::config::SessionConfig;

/// Opens the exclusively-owned handles a session holds.
///
/// Each call hands back a fresh handle; the session owns it from then on
/// and is responsible for closing it exactly once.
pub trait ResourceFactory: Send + Sync {
    fn init_log_sink(&self, config: &SessionConfig) -> io::Result<Box<dyn LogSink>>;

    fn open_index(&self, config: &SessionConfig) -> Result<Box<dyn TxIndex>, StoreError>;

    fn wallet_loader(&self, config: &SessionConfig) -> Result<Arc<dyn WalletLoader>, io::Error>;

    fn message_verifier(&self) -> Arc<dyn MessageVerifier> {
        Arc::new(Secp256k1Verifier::new())
    }
}

/// Disk-backed resources under the configured data directory.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiskResources;

impl ResourceFactory for DiskResources {
    fn init_log_sink(&self, config: &SessionConfig) -> io::Result<Box<dyn LogSink>> {
        Ok(Box::new(FileLogSink::init(&config.data_dir, &config.log)?))
    }

    fn open_index(&self, config: &SessionConfig) -> Result<Box<dyn TxIndex>, StoreError> {
        let index = FileTxIndex::open(config.tx_db_path(), config.index_lock_timeout)?;
        Ok(Box::new(index))
    }

    fn wallet_loader(&self, config: &SessionConfig) -> Result<Arc<dyn WalletLoader>, io::Error> {
        ensure_dir(&config.data_dir)?;
        Ok(Arc::new(Loader::new(
            config.network,
            config.data_dir.clone(),
            config.loader.clone(),
        )))
    }
}

fn ensure_dir(dir: &Path) -> io::Result<()> {
    if dir.is_dir() {
        return Ok(());
    }
    Err(io::Error::new(
        io::ErrorKind::NotFound,
        format!("data directory {} does not exist", dir.display()),
    ))
}
