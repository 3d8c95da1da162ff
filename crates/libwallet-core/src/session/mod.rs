//! The wallet session: ordered acquisition and one-shot teardown of the
//! resources a wallet needs, plus the operations that run against them.
//!
//! Startup acquires, in order, the log sink, the transaction index (and
//! its schema), the wallet loader, and optionally an OS-signal listener.
//! A failure at any step releases everything acquired before it.
//!
//! Shutdown may be requested by the owner, by the signal listener, or by
//! dropping the last handle. The first request performs teardown and gets
//! a [`ShutdownReport`]; every other request returns `None` immediately.
//! Teardown order: stop the RPC client, broadcast cancellation, run the
//! registered sync-cancel hook, close the log sink, unload the wallet,
//! close the index.

mod config;
mod resources;
mod shutdown;

pub use config::{
    network_dir_name, parse_network, SessionConfig, DEFAULT_INDEX_LOCK_TIMEOUT, TX_DB_NAME,
};
pub use resources::{DiskResources, ResourceFactory};
pub use shutdown::{Cancellation, ShutdownReport, TeardownFailure};

use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex};

use bitcoin::{Network, Txid};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::decode::{self, NoContext};
use crate::error::{Error, Resource, RpcError, StoreError};
use crate::index::TxIndex;
use crate::logging::LogSink;
use crate::lock;
use crate::rpc::RpcClient;
use crate::signing::{self, MessageVerifier};
use crate::types::DecodedTransaction;
use crate::wallet::WalletLoader;

use shutdown::{spawn_signal_listener, SignalStreams};

// ==============================================================================
// Lifecycle State
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Initializing,
    Running,
    ShuttingDown,
    Terminated,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Initializing => write!(f, "initializing"),
            Self::Running => write!(f, "running"),
            Self::ShuttingDown => write!(f, "shutting down"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

// ==============================================================================
// Acquired Resources
// ==============================================================================

type SyncCancel = Box<dyn FnOnce() + Send>;

/// Handles owned by a session. Also used during startup: dropping a
/// partially filled set releases what it holds.
#[derive(Default)]
struct Held {
    log_sink: Option<Box<dyn LogSink>>,
    index: Option<Box<dyn TxIndex>>,
}

impl Held {
    fn release(&mut self) {
        if let Some(mut index) = self.index.take() {
            if let Err(e) = index.close() {
                warn!(error = %e, "failed to close tx index after aborted startup");
            }
        }
        if let Some(mut sink) = self.log_sink.take() {
            if let Err(e) = sink.close() {
                warn!(error = %e, "failed to close log sink after aborted startup");
            }
        }
    }
}

impl Drop for Held {
    fn drop(&mut self) {
        self.release();
    }
}

// ==============================================================================
// Session
// ==============================================================================

pub struct Session {
    config: SessionConfig,
    state: Mutex<LifecycleState>,
    held: Mutex<Held>,
    loader: Arc<dyn WalletLoader>,
    verifier: Arc<dyn MessageVerifier>,
    rpc: Mutex<Option<Arc<dyn RpcClient>>>,
    sync_cancel: Mutex<Option<SyncCancel>>,
    cancel: watch::Sender<bool>,
    terminated: watch::Sender<bool>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Open a session over the disk-backed resources in `config.data_dir`.
    ///
    /// Blocks for up to `config.index_lock_timeout` while another process
    /// holds the index; from async code call it through `spawn_blocking`.
    pub fn open(config: SessionConfig) -> Result<Arc<Self>, Error> {
        Self::open_with(config, &DiskResources)
    }

    pub fn open_with(
        config: SessionConfig,
        factory: &dyn ResourceFactory,
    ) -> Result<Arc<Self>, Error> {
        let runtime = if config.listen_for_signals {
            Some(Handle::try_current().map_err(|_| {
                Error::Config("listening for OS signals requires a tokio runtime".to_owned())
            })?)
        } else {
            None
        };

        std::fs::create_dir_all(&config.data_dir)?;

        let mut held = Held::default();

        held.log_sink = Some(factory.init_log_sink(&config).map_err(|e| {
            Error::ResourceOpen {
                resource: Resource::LogSink,
                message: e.to_string(),
            }
        })?);

        let mut index = factory.open_index(&config).map_err(|e| match e {
            StoreError::Timeout { path } => Error::ResourceInUse { path },
            other => Error::ResourceOpen {
                resource: Resource::IndexStore,
                message: other.to_string(),
            },
        })?;
        let schema = index.init_schema();
        held.index = Some(index);
        schema.map_err(|e| Error::ResourceOpen {
            resource: Resource::IndexStore,
            message: format!("initializing schema: {e}"),
        })?;

        let loader = factory
            .wallet_loader(&config)
            .map_err(|e| Error::ResourceOpen {
                resource: Resource::WalletLoader,
                message: e.to_string(),
            })?;

        let signals = match &runtime {
            Some(runtime) => {
                let _entered = runtime.enter();
                Some(SignalStreams::install().map_err(|e| Error::ResourceOpen {
                    resource: Resource::SignalListener,
                    message: e.to_string(),
                })?)
            }
            None => None,
        };

        let (cancel, cancel_rx) = watch::channel(false);
        let (terminated, _) = watch::channel(false);
        let session = Arc::new(Self {
            state: Mutex::new(LifecycleState::Initializing),
            held: Mutex::new(std::mem::take(&mut held)),
            loader,
            verifier: factory.message_verifier(),
            rpc: Mutex::new(None),
            sync_cancel: Mutex::new(None),
            cancel,
            terminated,
            listener: Mutex::new(None),
            config,
        });

        if let (Some(runtime), Some(signals)) = (runtime, signals) {
            let handle = spawn_signal_listener(
                &runtime,
                signals,
                Arc::downgrade(&session),
                shutdown::Cancellation::new(cancel_rx),
                session.config.exit_on_signal,
            );
            *lock(&session.listener) = Some(handle);
        }

        *lock(&session.state) = LifecycleState::Running;
        info!(
            network = %session.config.network,
            data_dir = %session.config.data_dir.display(),
            signals = session.config.listen_for_signals,
            "wallet session running"
        );
        Ok(session)
    }

    pub fn state(&self) -> LifecycleState {
        *lock(&self.state)
    }

    pub fn network(&self) -> Network {
        self.config.network
    }

    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn loader(&self) -> Arc<dyn WalletLoader> {
        Arc::clone(&self.loader)
    }

    /// A receiver that background work polls or awaits to learn the
    /// session is going away.
    pub fn cancellation(&self) -> Cancellation {
        Cancellation::new(self.cancel.subscribe())
    }

    fn ensure_running(&self) -> Result<(), Error> {
        match self.state() {
            LifecycleState::Running => Ok(()),
            _ => Err(Error::SessionClosed),
        }
    }

    // ==========================================================================
    // Background Work Hooks
    // ==========================================================================

    /// Register the hook that aborts an active sync. Replaces any previous
    /// hook; runs at most once, during shutdown.
    pub fn register_sync_cancel(&self, hook: impl FnOnce() + Send + 'static) -> Result<(), Error> {
        let state = lock(&self.state);
        if *state != LifecycleState::Running {
            return Err(Error::SessionClosed);
        }
        *lock(&self.sync_cancel) = Some(Box::new(hook));
        Ok(())
    }

    /// Forget the sync hook once the sync finishes on its own.
    pub fn clear_sync_cancel(&self) -> bool {
        lock(&self.sync_cancel).take().is_some()
    }

    /// Hand the session an RPC client to own. A previously attached client
    /// is stopped. A closed session stops the client and refuses it.
    pub fn attach_rpc_client(&self, client: Arc<dyn RpcClient>) -> Result<(), Error> {
        let state = lock(&self.state);
        if *state != LifecycleState::Running {
            client.stop();
            return Err(Error::SessionClosed);
        }
        if let Some(previous) = lock(&self.rpc).replace(client) {
            previous.stop();
        }
        Ok(())
    }

    pub fn rpc_client(&self) -> Option<Arc<dyn RpcClient>> {
        lock(&self.rpc).clone()
    }

    // ==========================================================================
    // Operations
    // ==========================================================================

    /// Sign `message` with the loaded wallet's key for `address` and return
    /// the base64 signature.
    pub fn sign_message(
        &self,
        passphrase: &[u8],
        address: &str,
        message: &str,
    ) -> Result<String, Error> {
        self.ensure_running()?;
        let wallet = self.loader.loaded_wallet().ok_or(Error::WalletNotLoaded)?;
        let signature =
            signing::sign_message(wallet.as_ref(), self.network(), passphrase, address, message)?;
        Ok(signing::encode_signature(&signature))
    }

    /// Needs no wallet and works on any network's address encoding.
    pub fn verify_message(
        &self,
        address: &str,
        message: &str,
        signature_base64: &str,
    ) -> Result<bool, Error> {
        signing::verify_message(self.verifier.as_ref(), address, message, signature_base64)
    }

    /// Decode raw transaction bytes, annotating ownership from the loaded
    /// wallet when there is one.
    pub fn decode_transaction(&self, raw: &[u8]) -> Result<DecodedTransaction, Error> {
        self.ensure_running()?;
        match self.loader.loaded_wallet() {
            Some(wallet) => decode::decode_transaction(raw, self.network(), wallet.as_ref()),
            None => decode::decode_transaction(raw, self.network(), &NoContext),
        }
    }

    /// Fetch a transaction through the attached RPC client and decode it.
    pub async fn fetch_transaction(
        &self,
        txid: &Txid,
    ) -> Result<Option<DecodedTransaction>, Error> {
        self.ensure_running()?;
        let rpc = self.rpc_client().ok_or_else(|| {
            Error::Rpc(RpcError::InvalidConfig("no rpc client attached".to_owned()))
        })?;
        match rpc.get_raw_transaction(txid).await? {
            Some(raw) => self.decode_transaction(&raw).map(Some),
            None => Ok(None),
        }
    }

    /// Run `f` against the open index.
    pub fn with_index<R>(
        &self,
        f: impl FnOnce(&mut dyn TxIndex) -> Result<R, StoreError>,
    ) -> Result<R, Error> {
        let mut held = lock(&self.held);
        let index = held.index.as_deref_mut().ok_or(Error::SessionClosed)?;
        Ok(f(index)?)
    }

    // ==========================================================================
    // Shutdown
    // ==========================================================================

    /// Tear the session down. Only the first call does any work and gets a
    /// report; later and concurrent calls return `None` straight away.
    /// With `exit`, the process terminates once teardown completes.
    pub fn shutdown(&self, exit: bool) -> Option<ShutdownReport> {
        {
            let mut state = lock(&self.state);
            match *state {
                LifecycleState::ShuttingDown | LifecycleState::Terminated => return None,
                _ => *state = LifecycleState::ShuttingDown,
            }
        }
        info!(data_dir = %self.config.data_dir.display(), "shutting down wallet session");

        let mut report = ShutdownReport::default();

        if let Some(rpc) = lock(&self.rpc).take() {
            rpc.stop();
            debug!("rpc client stopped");
        }

        self.cancel.send_replace(true);

        if let Some(hook) = lock(&self.sync_cancel).take() {
            hook();
            debug!("active sync cancelled");
        }

        let (log_sink, index) = {
            let mut held = lock(&self.held);
            (held.log_sink.take(), held.index.take())
        };

        if let Some(mut sink) = log_sink {
            if let Err(e) = sink.close() {
                error!(error = %e, "failed to close log sink");
                report.record(Resource::LogSink, e);
            }
        }

        if self.loader.loaded_wallet().is_some() {
            if let Err(e) = self.loader.unload_wallet() {
                error!(error = %e, "failed to unload wallet");
                report.record(Resource::Wallet, e);
            }
        }

        if let Some(mut index) = index {
            if let Err(e) = index.close() {
                error!(error = %e, "failed to close tx index");
                report.record(Resource::IndexStore, e);
            }
        }

        // The listener ends on cancellation; it is not joined here because
        // it may be the caller.
        drop(lock(&self.listener).take());

        *lock(&self.state) = LifecycleState::Terminated;
        self.terminated.send_replace(true);

        if exit {
            std::process::exit(if report.is_clean() { 0 } else { 1 });
        }
        Some(report)
    }

    /// Resolves once teardown has finished, whoever started it.
    pub async fn wait_terminated(&self) {
        let mut rx = self.terminated.subscribe();
        let _ = rx.wait_for(|done| *done).await;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.state() != LifecycleState::Terminated {
            self.shutdown(false);
        }
    }
}
