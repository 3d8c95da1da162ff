pub mod address;
pub mod decode;
pub mod error;
pub mod index;
pub mod logging;
pub mod rpc;
pub mod session;
pub mod signing;
pub mod types;
pub mod wallet;

#[cfg(test)]
mod test_util;

pub use address::{AddressKind, SignatureAlgorithm, WalletAddress};
pub use error::{Error, ErrorKind, Resource, RpcError, StoreError, WalletError};
pub use session::{LifecycleState, Session, SessionConfig, ShutdownReport};
pub use types::{
    AddressInfo, DecodedInput, DecodedOutput, DecodedTransaction, TransactionDirection,
};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the data if a previous holder panicked.
/// Teardown must keep going even after a panic elsewhere.
pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
