use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use bitcoin::Txid;
use fs2::FileExt;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::StoreError;

use super::{
    newest_first, IndexedTransaction, TxIndex, BUCKET_TRANSACTIONS, BUCKET_TX_INFO, KEY_END_BLOCK,
};

const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(50);

type Buckets = BTreeMap<String, BTreeMap<String, Value>>;

/// A single-file JSON bucket store held under an exclusive advisory lock.
///
/// The whole file is rewritten on every mutation.
pub struct FileTxIndex {
    path: PathBuf,
    file: Option<File>,
    buckets: Buckets,
}

impl FileTxIndex {
    /// Open (creating if needed) and lock the store at `path`, retrying
    /// while another handle holds the lock until `timeout` elapses.
    ///
    /// Blocks the calling thread for up to `timeout`.
    pub fn open(path: impl AsRef<Path>, timeout: Duration) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        acquire_lock(&path, timeout, || file.try_lock_exclusive())?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        let buckets = if contents.trim().is_empty() {
            Buckets::new()
        } else {
            match serde_json::from_str(&contents) {
                Ok(buckets) => buckets,
                Err(e) => {
                    let _ = FileExt::unlock(&file);
                    return Err(StoreError::Corrupt(e.to_string()));
                }
            }
        };

        debug!(path = %path.display(), buckets = buckets.len(), "opened tx index");
        Ok(Self {
            path,
            file: Some(file),
            buckets,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.file.is_none() {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    fn persist(&mut self) -> Result<(), StoreError> {
        let file = self.file.as_mut().ok_or(StoreError::Closed)?;
        let encoded =
            serde_json::to_vec_pretty(&self.buckets).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&encoded)?;
        file.sync_data()?;
        Ok(())
    }

    fn bucket(&self, name: &str) -> Result<&BTreeMap<String, Value>, StoreError> {
        self.ensure_open()?;
        self.buckets
            .get(name)
            .ok_or_else(|| StoreError::Corrupt(format!("missing bucket {name}")))
    }

    fn bucket_mut(&mut self, name: &str) -> Result<&mut BTreeMap<String, Value>, StoreError> {
        self.ensure_open()?;
        self.buckets
            .get_mut(name)
            .ok_or_else(|| StoreError::Corrupt(format!("missing bucket {name}")))
    }
}

fn decode_tx(value: &Value) -> Result<IndexedTransaction, StoreError> {
    serde_json::from_value(value.clone()).map_err(|e| StoreError::Corrupt(e.to_string()))
}

/// Poll `try_lock` until it succeeds or `timeout` elapses. Only contention is
/// retried; any other lock failure is returned as I/O at once.
fn acquire_lock(
    path: &Path,
    timeout: Duration,
    mut try_lock: impl FnMut() -> io::Result<()>,
) -> Result<(), StoreError> {
    let contended = fs2::lock_contended_error().kind();
    let deadline = Instant::now() + timeout;
    loop {
        match try_lock() {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() != contended => {
                warn!(path = %path.display(), error = %e, "index lock failed");
                return Err(StoreError::Io(e));
            }
            Err(_) if Instant::now() < deadline => std::thread::sleep(LOCK_RETRY_INTERVAL),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "index lock not acquired");
                return Err(StoreError::Timeout {
                    path: path.to_path_buf(),
                });
            }
        }
    }
}

impl TxIndex for FileTxIndex {
    fn init_schema(&mut self) -> Result<(), StoreError> {
        self.ensure_open()?;
        let before = self.buckets.len();
        for name in [BUCKET_TX_INFO, BUCKET_TRANSACTIONS] {
            self.buckets.entry(name.to_owned()).or_default();
        }
        if self.buckets.len() != before {
            self.persist()?;
        }
        Ok(())
    }

    fn end_block(&self) -> Result<u32, StoreError> {
        match self.bucket(BUCKET_TX_INFO)?.get(KEY_END_BLOCK) {
            None => Ok(0),
            Some(value) => value
                .as_u64()
                .and_then(|h| u32::try_from(h).ok())
                .ok_or_else(|| StoreError::Corrupt(format!("bad {KEY_END_BLOCK} value {value}"))),
        }
    }

    fn set_end_block(&mut self, height: u32) -> Result<(), StoreError> {
        self.bucket_mut(BUCKET_TX_INFO)?
            .insert(KEY_END_BLOCK.to_owned(), Value::from(height));
        self.persist()
    }

    fn save_transaction(&mut self, tx: &IndexedTransaction) -> Result<(), StoreError> {
        let value = serde_json::to_value(tx).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        self.bucket_mut(BUCKET_TRANSACTIONS)?
            .insert(tx.hash.to_string(), value);
        self.persist()
    }

    fn transaction(&self, hash: &Txid) -> Result<Option<IndexedTransaction>, StoreError> {
        self.bucket(BUCKET_TRANSACTIONS)?
            .get(&hash.to_string())
            .map(decode_tx)
            .transpose()
    }

    fn transactions(&self) -> Result<Vec<IndexedTransaction>, StoreError> {
        let mut txs = self
            .bucket(BUCKET_TRANSACTIONS)?
            .values()
            .map(decode_tx)
            .collect::<Result<Vec<_>, _>>()?;
        newest_first(&mut txs);
        Ok(txs)
    }

    fn close(&mut self) -> Result<(), StoreError> {
        let Some(file) = self.file.take() else {
            return Ok(());
        };
        if let Err(e) = FileExt::unlock(&file) {
            warn!(path = %self.path.display(), error = %e, "failed to release index lock");
            return Err(e.into());
        }
        debug!(path = %self.path.display(), "closed tx index");
        Ok(())
    }
}

impl Drop for FileTxIndex {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = FileExt::unlock(&file);
        }
    }
}
