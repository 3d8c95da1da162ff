//! Address decoding and signing-capability classification.
//!
//! Every address the session accepts is either a standard encoded address
//! (`bitcoin::Address`) or a raw secp256k1 public key written as hex. Each
//! variant reports its [`AddressKind`] and the [`SignatureAlgorithm`] its
//! key uses; message signing is gated on those two facts alone.

use std::fmt;
use std::str::FromStr;

use bitcoin::address::{AddressType, NetworkUnchecked};
use bitcoin::{Address, Network, PublicKey};

use crate::error::Error;

// ==============================================================================
// Capability Data
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureAlgorithm {
    EcdsaSecp256k1,
    SchnorrSecp256k1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressKind {
    PublicKeyHash,
    PublicKey,
    ScriptHash,
    WitnessPublicKeyHash,
    WitnessScriptHash,
    Taproot,
    Other,
}

impl AddressKind {
    /// The algorithm a key behind this kind of address signs with, if the
    /// address commits to a key at all.
    pub fn signature_algorithm(self) -> Option<SignatureAlgorithm> {
        match self {
            Self::PublicKeyHash | Self::PublicKey | Self::WitnessPublicKeyHash => {
                Some(SignatureAlgorithm::EcdsaSecp256k1)
            }
            Self::Taproot => Some(SignatureAlgorithm::SchnorrSecp256k1),
            Self::ScriptHash | Self::WitnessScriptHash | Self::Other => None,
        }
    }
}

impl fmt::Display for AddressKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PublicKeyHash => write!(f, "pubkey-hash"),
            Self::PublicKey => write!(f, "pubkey"),
            Self::ScriptHash => write!(f, "script-hash"),
            Self::WitnessPublicKeyHash => write!(f, "witness-pubkey-hash"),
            Self::WitnessScriptHash => write!(f, "witness-script-hash"),
            Self::Taproot => write!(f, "taproot"),
            Self::Other => write!(f, "other"),
        }
    }
}

// ==============================================================================
// Wallet Address
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletAddress {
    Encoded(Address),
    /// A bare secp256k1 public key, compressed or uncompressed.
    PublicKey(PublicKey),
}

impl WalletAddress {
    /// Decode an address that must belong to `network`. Raw public keys
    /// carry no network and are accepted as-is.
    pub fn decode_for_network(s: &str, network: Network) -> Result<Self, Error> {
        if let Some(key) = parse_raw_public_key(s) {
            return Ok(Self::PublicKey(key));
        }
        let unchecked = parse_unchecked(s)?;
        let address = unchecked
            .require_network(network)
            .map_err(|_| Error::InvalidAddress(format!("{s} is not a {network} address")))?;
        Ok(Self::Encoded(address))
    }

    /// Decode an address for whichever network its encoding names.
    pub fn decode_any(s: &str) -> Result<Self, Error> {
        if let Some(key) = parse_raw_public_key(s) {
            return Ok(Self::PublicKey(key));
        }
        Ok(Self::Encoded(parse_unchecked(s)?.assume_checked()))
    }

    pub fn kind(&self) -> AddressKind {
        match self {
            Self::PublicKey(_) => AddressKind::PublicKey,
            Self::Encoded(address) => match address.address_type() {
                Some(AddressType::P2pkh) => AddressKind::PublicKeyHash,
                Some(AddressType::P2sh) => AddressKind::ScriptHash,
                Some(AddressType::P2wpkh) => AddressKind::WitnessPublicKeyHash,
                Some(AddressType::P2wsh) => AddressKind::WitnessScriptHash,
                Some(AddressType::P2tr) => AddressKind::Taproot,
                _ => AddressKind::Other,
            },
        }
    }

    pub fn signature_algorithm(&self) -> Option<SignatureAlgorithm> {
        self.kind().signature_algorithm()
    }

    /// Whether a signed message for this address can be produced and
    /// checked: the address must name a single legacy key that signs with
    /// ECDSA over secp256k1.
    pub fn supports_message_signing(&self) -> bool {
        matches!(
            self.kind(),
            AddressKind::PublicKeyHash | AddressKind::PublicKey
        ) && self.signature_algorithm() == Some(SignatureAlgorithm::EcdsaSecp256k1)
    }
}

/// Reject addresses that cannot carry a signed message.
pub fn ensure_message_signing(address: &WalletAddress) -> Result<(), Error> {
    if address.supports_message_signing() {
        return Ok(());
    }
    Err(Error::InvalidAddress(format!(
        "{address} is a {} address; message signing needs an ECDSA secp256k1 key",
        address.kind()
    )))
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encoded(address) => fmt::Display::fmt(address, f),
            Self::PublicKey(key) => fmt::Display::fmt(key, f),
        }
    }
}

fn parse_unchecked(s: &str) -> Result<Address<NetworkUnchecked>, Error> {
    s.trim()
        .parse::<Address<NetworkUnchecked>>()
        .map_err(|e| Error::InvalidAddress(format!("{s}: {e}")))
}

/// Hex public keys are 33 (compressed) or 65 (uncompressed) bytes.
fn parse_raw_public_key(s: &str) -> Option<PublicKey> {
    let s = s.trim();
    if !matches!(s.len(), 66 | 130) || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    PublicKey::from_str(s).ok()
}
