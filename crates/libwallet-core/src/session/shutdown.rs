use std::fmt;
use std::io;
use std::sync::Weak;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::Resource;

use super::Session;

// ==============================================================================
// Cancellation
// ==============================================================================

/// Read side of a session's one-shot cancellation broadcast.
///
/// Every clone observes the same flag. Checking it never blocks.
#[derive(Debug, Clone)]
pub struct Cancellation {
    rx: watch::Receiver<bool>,
}

impl Cancellation {
    pub(super) fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the session starts shutting down.
    pub async fn cancelled(&mut self) {
        // A dropped sender means the session is gone, which counts too.
        let _ = self.rx.wait_for(|cancelled| *cancelled).await;
    }
}

// ==============================================================================
// Teardown Report
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownFailure {
    pub resource: Resource,
    pub message: String,
}

impl fmt::Display for TeardownFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.resource, self.message)
    }
}

/// What went wrong while releasing resources. Teardown always runs to
/// completion; failures are collected here instead of aborting it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub failures: Vec<TeardownFailure>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub(super) fn record(&mut self, resource: Resource, err: impl fmt::Display) {
        self.failures.push(TeardownFailure {
            resource,
            message: err.to_string(),
        });
    }
}

// ==============================================================================
// Signal Listener
// ==============================================================================

/// Interrupt and terminate streams, registered before the listener task
/// is spawned so registration errors surface during startup.
pub(super) struct SignalStreams {
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
}

impl SignalStreams {
    /// Must be called from within a runtime context.
    pub(super) fn install() -> io::Result<Self> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            Ok(Self {
                terminate: signal(SignalKind::terminate())?,
                interrupt: signal(SignalKind::interrupt())?,
            })
        }

        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }

    async fn recv(&mut self) -> &'static str {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = self.terminate.recv() => "SIGTERM",
                _ = self.interrupt.recv() => "SIGINT",
            }
        }

        #[cfg(not(unix))]
        {
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
            "Ctrl+C"
        }
    }
}

/// Run the session's shutdown when a signal arrives. The task ends on its
/// own once the session is cancelled by any other path.
pub(super) fn spawn_signal_listener(
    runtime: &Handle,
    mut streams: SignalStreams,
    session: Weak<Session>,
    mut cancellation: Cancellation,
    exit: bool,
) -> JoinHandle<()> {
    runtime.spawn(async move {
        tokio::select! {
            signal = streams.recv() => {
                info!(signal, "received signal, shutting down wallet session");
                if let Some(session) = session.upgrade() {
                    session.shutdown(exit);
                }
            }
            () = cancellation.cancelled() => debug!("signal listener stopped"),
        }
    })
}
