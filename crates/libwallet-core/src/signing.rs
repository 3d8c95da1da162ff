//! Message signing and verification, gated by address capability.
//!
//! Both directions decode the address first and refuse anything that is
//! not a single ECDSA secp256k1 key before key material or the signature
//! routine is touched. Signing holds the wallet unlocked through an
//! [`UnlockGuard`] that restores the previous lock state on every exit path,
//! including unwinding.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bitcoin::secp256k1::{Secp256k1, VerifyOnly};
use bitcoin::sign_message::{signed_msg_hash, MessageSignature};
use bitcoin::Network;
use tracing::debug;

use crate::address::{ensure_message_signing, WalletAddress};
use crate::error::Error;
use crate::wallet::Wallet;

// ==============================================================================
// Scoped Unlock
// ==============================================================================

/// Holds a wallet unlocked for the lifetime of the guard.
///
/// A wallet that was already unlocked when the guard was taken is left
/// unlocked on drop; one that was locked is locked again.
pub struct UnlockGuard<'a> {
    wallet: &'a dyn Wallet,
    relock: bool,
}

impl<'a> UnlockGuard<'a> {
    pub fn acquire(wallet: &'a dyn Wallet, passphrase: &[u8]) -> Result<Self, Error> {
        let relock = wallet.is_locked();
        wallet.unlock(passphrase)?;
        Ok(Self { wallet, relock })
    }
}

impl Drop for UnlockGuard<'_> {
    fn drop(&mut self) {
        if self.relock {
            self.wallet.lock();
            debug!("wallet relocked after scoped unlock");
        }
    }
}

// ==============================================================================
// Sign
// ==============================================================================

/// Sign `message` with the key behind `address`.
pub fn sign_message(
    wallet: &dyn Wallet,
    network: Network,
    passphrase: &[u8],
    address: &str,
    message: &str,
) -> Result<MessageSignature, Error> {
    let _unlocked = UnlockGuard::acquire(wallet, passphrase)?;

    let address = WalletAddress::decode_for_network(address, network)?;
    ensure_message_signing(&address)?;

    let signature = wallet.sign_message(message, &address)?;
    debug!(%address, "signed message");
    Ok(signature)
}

/// Standard base64 of the 65-byte compact recoverable signature.
pub fn encode_signature(signature: &MessageSignature) -> String {
    BASE64.encode(signature.serialize())
}

// ==============================================================================
// Verify
// ==============================================================================

/// The routine that checks a decoded signature against an address that
/// already passed the capability gate.
pub trait MessageVerifier: Send + Sync {
    fn verify(
        &self,
        address: &WalletAddress,
        message: &str,
        signature: &[u8],
    ) -> Result<bool, Error>;
}

/// Verifies compact recoverable signatures over the signed-message digest.
pub struct Secp256k1Verifier {
    secp: Secp256k1<VerifyOnly>,
}

impl Secp256k1Verifier {
    pub fn new() -> Self {
        Self {
            secp: Secp256k1::verification_only(),
        }
    }
}

impl Default for Secp256k1Verifier {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageVerifier for Secp256k1Verifier {
    fn verify(
        &self,
        address: &WalletAddress,
        message: &str,
        signature: &[u8],
    ) -> Result<bool, Error> {
        // An unparseable or unrecoverable signature is simply not valid.
        let Ok(signature) = MessageSignature::from_slice(signature) else {
            return Ok(false);
        };
        let Ok(recovered) = signature.recover_pubkey(&self.secp, signed_msg_hash(message)) else {
            return Ok(false);
        };

        Ok(match address {
            WalletAddress::Encoded(address) => address.is_related_to_pubkey(&recovered),
            WalletAddress::PublicKey(expected) => *expected == recovered,
        })
    }
}

/// Check `signature_base64` over `message` for `address`. No wallet or
/// private key is involved.
pub fn verify_message(
    verifier: &dyn MessageVerifier,
    address: &str,
    message: &str,
    signature_base64: &str,
) -> Result<bool, Error> {
    let address = WalletAddress::decode_any(address)?;
    ensure_message_signing(&address)?;

    let signature = BASE64.decode(signature_base64.trim())?;
    verifier.verify(&address, message, &signature)
}
