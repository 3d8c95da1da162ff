//! Shared test helpers for `libwallet-core` unit tests.
//!
//! Deterministic keys and addresses, a spy wallet and verifier for the
//! signing gate, and an instrumented resource factory that counts opens
//! and closes and can fail at any startup step.

use std::collections::BTreeMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bitcoin::absolute::LockTime;
use bitcoin::hashes::Hash;
use bitcoin::key::CompressedPublicKey;
use bitcoin::secp256k1::{Message, Secp256k1, SecretKey, XOnlyPublicKey};
use bitcoin::sign_message::{signed_msg_hash, MessageSignature};
use bitcoin::transaction::Version;
use bitcoin::{
    consensus, Address, Amount, Network, OutPoint, PrivateKey, PublicKey, ScriptBuf, Sequence,
    Transaction, TxIn, TxOut, Txid, Witness,
};

use crate::address::WalletAddress;
use crate::decode::DecodeContext;
use crate::error::{RpcError, StoreError, WalletError};
use crate::index::{newest_first, IndexedTransaction, TxIndex};
use crate::lock;
use crate::logging::LogSink;
use crate::rpc::{ChainInfo, RpcClient};
use crate::session::{ResourceFactory, SessionConfig};
use crate::signing::MessageVerifier;
use crate::wallet::{Loader, Wallet, WalletLoader};

// ==============================================================================
// Keys, Addresses, Transactions
// ==============================================================================

/// Create a deterministic `Txid` from a single distinguishing byte.
pub fn txid_from_byte(b: u8) -> Txid {
    let mut bytes = [0u8; 32];
    bytes[0] = b;
    Txid::from_byte_array(bytes)
}

/// A deterministic compressed private key. `b` must be non-zero.
pub fn test_key(b: u8) -> PrivateKey {
    let secret = SecretKey::from_slice(&[b; 32]).expect("non-zero test key is valid");
    PrivateKey::new(secret, Network::Regtest)
}

pub fn public_key(key: &PrivateKey) -> PublicKey {
    key.public_key(&Secp256k1::new())
}

pub fn p2pkh_address(key: &PrivateKey, network: Network) -> Address {
    Address::p2pkh(public_key(key).pubkey_hash(), network)
}

pub fn p2tr_address(key: &PrivateKey, network: Network) -> Address {
    let internal = XOnlyPublicKey::from(public_key(key).inner);
    Address::p2tr(&Secp256k1::new(), internal, None, network)
}

pub fn p2pkh_string(key: &PrivateKey, network: Network) -> String {
    p2pkh_address(key, network).to_string()
}

pub fn p2sh_string(key: &PrivateKey, network: Network) -> String {
    let redeem = ScriptBuf::new_p2pkh(&public_key(key).pubkey_hash());
    Address::p2sh(&redeem, network)
        .expect("small redeem script")
        .to_string()
}

pub fn p2wpkh_string(key: &PrivateKey, network: Network) -> String {
    Address::p2wpkh(&CompressedPublicKey(public_key(key).inner), network).to_string()
}

pub fn p2tr_string(key: &PrivateKey, network: Network) -> String {
    p2tr_address(key, network).to_string()
}

/// A one-in, one-out transaction and its txid, serialized.
pub fn sample_raw_transaction() -> (Txid, Vec<u8>) {
    let tx = Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint::new(txid_from_byte(1), 0),
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }],
        output: vec![TxOut {
            value: Amount::from_sat(50_000),
            script_pubkey: p2pkh_address(&test_key(2), Network::Regtest).script_pubkey(),
        }],
    };
    (tx.compute_txid(), consensus::serialize(&tx))
}

// ==============================================================================
// Event Log
// ==============================================================================

/// Shared, ordered record of teardown events across fakes.
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<&'static str>>>);

impl EventLog {
    pub fn push(&self, event: &'static str) {
        lock(&self.0).push(event);
    }

    pub fn closed(&self) -> Vec<&'static str> {
        lock(&self.0).clone()
    }
}

// ==============================================================================
// Spy Wallet
// ==============================================================================

/// A single-key wallet that records how the signing gate drives it.
pub struct SpyWallet {
    key: PrivateKey,
    passphrase: Vec<u8>,
    unlocked: AtomicBool,
    sign_calls: AtomicUsize,
    close_calls: AtomicUsize,
    fail_sign: bool,
    panic_sign: bool,
    fail_close: bool,
    events: Option<EventLog>,
}

impl SpyWallet {
    pub fn with_key(key: PrivateKey, passphrase: &[u8]) -> Self {
        Self {
            key,
            passphrase: passphrase.to_vec(),
            unlocked: AtomicBool::new(false),
            sign_calls: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
            fail_sign: false,
            panic_sign: false,
            fail_close: false,
            events: None,
        }
    }

    pub fn failing_sign(mut self) -> Self {
        self.fail_sign = true;
        self
    }

    pub fn panicking_sign(mut self) -> Self {
        self.panic_sign = true;
        self
    }

    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    pub fn recording(mut self, events: EventLog) -> Self {
        self.events = Some(events);
        self
    }

    pub fn sign_calls(&self) -> usize {
        self.sign_calls.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

impl DecodeContext for SpyWallet {}

impl Wallet for SpyWallet {
    fn is_locked(&self) -> bool {
        !self.unlocked.load(Ordering::SeqCst)
    }

    fn unlock(&self, passphrase: &[u8]) -> Result<(), WalletError> {
        if passphrase != self.passphrase.as_slice() {
            return Err(WalletError::Passphrase);
        }
        self.unlocked.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn lock(&self) {
        self.unlocked.store(false, Ordering::SeqCst);
    }

    fn sign_message(
        &self,
        message: &str,
        _address: &WalletAddress,
    ) -> Result<MessageSignature, WalletError> {
        self.sign_calls.fetch_add(1, Ordering::SeqCst);
        if self.panic_sign {
            panic!("signing backend panicked");
        }
        if self.fail_sign {
            return Err(WalletError::Backend("hardware signer unplugged".into()));
        }
        if self.is_locked() {
            return Err(WalletError::Locked);
        }
        let digest = Message::from_digest(signed_msg_hash(message).to_byte_array());
        let signature = Secp256k1::new().sign_ecdsa_recoverable(&digest, &self.key.inner);
        Ok(MessageSignature::new(signature, self.key.compressed))
    }

    fn close(&self) -> Result<(), WalletError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(events) = &self.events {
            events.push("wallet-close");
        }
        if self.fail_close {
            return Err(WalletError::Backend("wallet db close failed".into()));
        }
        Ok(())
    }
}

// ==============================================================================
// Spy Verifier
// ==============================================================================

#[derive(Default)]
pub struct SpyVerifier {
    calls: AtomicUsize,
}

impl SpyVerifier {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl MessageVerifier for SpyVerifier {
    fn verify(
        &self,
        _address: &WalletAddress,
        _message: &str,
        _signature: &[u8],
    ) -> Result<bool, crate::error::Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }
}

// ==============================================================================
// Recording RPC
// ==============================================================================

pub struct RecordingRpc {
    events: EventLog,
    stopped: AtomicBool,
}

impl RecordingRpc {
    pub fn new(events: EventLog) -> Self {
        Self {
            events,
            stopped: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl RpcClient for RecordingRpc {
    async fn get_blockchain_info(&self) -> Result<ChainInfo, RpcError> {
        Err(RpcError::InvalidResponse("not served".into()))
    }

    async fn get_raw_transaction(&self, _txid: &Txid) -> Result<Option<Vec<u8>>, RpcError> {
        Ok(None)
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.events.push("rpc-stop");
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

// ==============================================================================
// Counting Resources
// ==============================================================================

/// The startup step an instrumented factory fails at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    LogSink,
    IndexInUse,
    IndexOpen,
    Schema,
    Loader,
}

#[derive(Default)]
struct Counters {
    opened: Mutex<Vec<&'static str>>,
    log_opens: AtomicUsize,
    log_closes: AtomicUsize,
    index_opens: AtomicUsize,
    index_closes: AtomicUsize,
}

/// In-memory resources that count every open and close.
#[derive(Default)]
pub struct CountingResources {
    counters: Arc<Counters>,
    events: EventLog,
    fail_at: Option<FailAt>,
    failing_closes: bool,
}

impl CountingResources {
    pub fn failing_at(step: FailAt) -> Self {
        Self {
            fail_at: Some(step),
            ..Self::default()
        }
    }

    pub fn with_failing_closes(mut self) -> Self {
        self.failing_closes = true;
        self
    }

    pub fn events(&self) -> EventLog {
        self.events.clone()
    }

    pub fn opened(&self) -> Vec<&'static str> {
        lock(&self.counters.opened).clone()
    }

    pub fn log_opens(&self) -> usize {
        self.counters.log_opens.load(Ordering::SeqCst)
    }

    pub fn log_closes(&self) -> usize {
        self.counters.log_closes.load(Ordering::SeqCst)
    }

    pub fn index_opens(&self) -> usize {
        self.counters.index_opens.load(Ordering::SeqCst)
    }

    pub fn index_closes(&self) -> usize {
        self.counters.index_closes.load(Ordering::SeqCst)
    }

    fn step(&self, name: &'static str, fail: FailAt) -> bool {
        if self.fail_at == Some(fail) {
            return false;
        }
        lock(&self.counters.opened).push(name);
        true
    }
}

impl ResourceFactory for CountingResources {
    fn init_log_sink(&self, _config: &SessionConfig) -> io::Result<Box<dyn LogSink>> {
        if !self.step("log", FailAt::LogSink) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "log dir read-only"));
        }
        self.counters.log_opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountingSink {
            counters: self.counters.clone(),
            events: self.events.clone(),
            fail: self.failing_closes,
            closed: false,
        }))
    }

    fn open_index(&self, config: &SessionConfig) -> Result<Box<dyn TxIndex>, StoreError> {
        if self.fail_at == Some(FailAt::IndexInUse) {
            return Err(StoreError::Timeout {
                path: config.tx_db_path(),
            });
        }
        if !self.step("index", FailAt::IndexOpen) {
            return Err(StoreError::Io(io::Error::other("disk unplugged")));
        }
        self.counters.index_opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryTxIndex {
            counters: self.counters.clone(),
            events: self.events.clone(),
            fail_schema: self.fail_at == Some(FailAt::Schema),
            fail_close: self.failing_closes,
            closed: false,
            end_block: None,
            transactions: BTreeMap::new(),
        }))
    }

    fn wallet_loader(&self, config: &SessionConfig) -> Result<Arc<dyn WalletLoader>, io::Error> {
        if !self.step("loader", FailAt::Loader) {
            return Err(io::Error::other("loader refused"));
        }
        Ok(Arc::new(Loader::new(
            config.network,
            config.data_dir.clone(),
            config.loader.clone(),
        )))
    }
}

struct CountingSink {
    counters: Arc<Counters>,
    events: EventLog,
    fail: bool,
    closed: bool,
}

impl LogSink for CountingSink {
    fn close(&mut self) -> io::Result<()> {
        if std::mem::replace(&mut self.closed, true) {
            return Ok(());
        }
        self.counters.log_closes.fetch_add(1, Ordering::SeqCst);
        self.events.push("log-close");
        if self.fail {
            return Err(io::Error::other("log flush failed"));
        }
        Ok(())
    }
}

struct MemoryTxIndex {
    counters: Arc<Counters>,
    events: EventLog,
    fail_schema: bool,
    fail_close: bool,
    closed: bool,
    end_block: Option<u32>,
    transactions: BTreeMap<Txid, IndexedTransaction>,
}

impl MemoryTxIndex {
    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

impl TxIndex for MemoryTxIndex {
    fn init_schema(&mut self) -> Result<(), StoreError> {
        self.ensure_open()?;
        if self.fail_schema {
            return Err(StoreError::Corrupt("bucket creation failed".into()));
        }
        lock(&self.counters.opened).push("schema");
        Ok(())
    }

    fn end_block(&self) -> Result<u32, StoreError> {
        self.ensure_open()?;
        Ok(self.end_block.unwrap_or(0))
    }

    fn set_end_block(&mut self, height: u32) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.end_block = Some(height);
        Ok(())
    }

    fn save_transaction(&mut self, tx: &IndexedTransaction) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.transactions.insert(tx.hash, tx.clone());
        Ok(())
    }

    fn transaction(&self, hash: &Txid) -> Result<Option<IndexedTransaction>, StoreError> {
        self.ensure_open()?;
        Ok(self.transactions.get(hash).cloned())
    }

    fn transactions(&self) -> Result<Vec<IndexedTransaction>, StoreError> {
        self.ensure_open()?;
        let mut txs: Vec<_> = self.transactions.values().cloned().collect();
        newest_first(&mut txs);
        Ok(txs)
    }

    fn close(&mut self) -> Result<(), StoreError> {
        if std::mem::replace(&mut self.closed, true) {
            return Ok(());
        }
        self.counters.index_closes.fetch_add(1, Ordering::SeqCst);
        self.events.push("index-close");
        if self.fail_close {
            return Err(StoreError::Io(io::Error::other("fsync failed")));
        }
        Ok(())
    }
}
