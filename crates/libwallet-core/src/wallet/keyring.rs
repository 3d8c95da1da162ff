use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use bitcoin::hashes::{sha256, Hash};
use bitcoin::secp256k1::{All, Message, Secp256k1};
use bitcoin::sign_message::{signed_msg_hash, MessageSignature};
use bitcoin::{Address, Amount, Network, OutPoint, PrivateKey, PublicKey};

use crate::address::WalletAddress;
use crate::decode::{AddressOwner, DecodeContext};
use crate::error::WalletError;
use crate::types::AccountRef;

use super::Wallet;

struct KeyEntry {
    key: PrivateKey,
    public: PublicKey,
    account: AccountRef,
    internal: bool,
}

/// An in-memory wallet over imported private keys.
///
/// Keys are only usable while unlocked. The passphrase is kept as a
/// SHA-256 digest and compared on unlock.
pub struct Keyring {
    network: Network,
    passphrase_digest: sha256::Hash,
    keys: Vec<KeyEntry>,
    prevouts: HashMap<OutPoint, Amount>,
    unlocked: AtomicBool,
    secp: Secp256k1<All>,
}

impl Keyring {
    pub fn new(network: Network, passphrase: &[u8]) -> Self {
        Self {
            network,
            passphrase_digest: sha256::Hash::hash(passphrase),
            keys: Vec::new(),
            prevouts: HashMap::new(),
            unlocked: AtomicBool::new(false),
            secp: Secp256k1::new(),
        }
    }

    /// Import a key and return its P2PKH address on the keyring's network.
    pub fn import_key(&mut self, key: PrivateKey, account: AccountRef, internal: bool) -> Address {
        let public = key.public_key(&self.secp);
        self.keys.push(KeyEntry {
            key,
            public,
            account,
            internal,
        });
        Address::p2pkh(public.pubkey_hash(), self.network)
    }

    pub fn import_wif(&mut self, wif: &str, account: AccountRef) -> Result<Address, WalletError> {
        let key = PrivateKey::from_wif(wif)
            .map_err(|e| WalletError::Backend(format!("invalid WIF key: {e}")))?;
        Ok(self.import_key(key, account, false))
    }

    /// Remember the value of an output this wallet has seen, so decoding
    /// can report input amounts and fees.
    pub fn record_prevout(&mut self, outpoint: OutPoint, value: Amount) {
        self.prevouts.insert(outpoint, value);
    }

    fn find(&self, address: &WalletAddress) -> Option<&KeyEntry> {
        self.keys.iter().find(|entry| match address {
            WalletAddress::Encoded(address) => address.is_related_to_pubkey(&entry.public),
            WalletAddress::PublicKey(key) => key.inner == entry.public.inner,
        })
    }
}

impl DecodeContext for Keyring {
    fn owner_of(&self, address: &WalletAddress) -> Option<AddressOwner> {
        self.find(address).map(|entry| AddressOwner {
            account: entry.account.clone(),
            internal: entry.internal,
        })
    }

    fn prevout_value(&self, outpoint: &OutPoint) -> Option<Amount> {
        self.prevouts.get(outpoint).copied()
    }
}

impl Wallet for Keyring {
    fn is_locked(&self) -> bool {
        !self.unlocked.load(Ordering::SeqCst)
    }

    fn unlock(&self, passphrase: &[u8]) -> Result<(), WalletError> {
        if sha256::Hash::hash(passphrase) != self.passphrase_digest {
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
        address: &WalletAddress,
    ) -> Result<MessageSignature, WalletError> {
        if self.is_locked() {
            return Err(WalletError::Locked);
        }
        let entry = self
            .find(address)
            .ok_or_else(|| WalletError::UnknownAddress(address.to_string()))?;

        let digest = Message::from_digest(signed_msg_hash(message).to_byte_array());
        let signature = self.secp.sign_ecdsa_recoverable(&digest, &entry.key.inner);
        Ok(MessageSignature::new(signature, entry.key.compressed))
    }

    fn close(&self) -> Result<(), WalletError> {
        self.lock();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::*;

    fn keyring() -> (Keyring, Address) {
        let mut keyring = Keyring::new(Network::Regtest, b"hunter2");
        let address = keyring.import_key(
            test_key(1),
            AccountRef {
                number: 0,
                name: "default".into(),
            },
            false,
        );
        (keyring, address)
    }

    #[test]
    fn starts_locked_and_checks_passphrase() {
        let (keyring, _) = keyring();
        assert!(keyring.is_locked());
        assert!(matches!(
            keyring.unlock(b"wrong"),
            Err(WalletError::Passphrase)
        ));
        assert!(keyring.is_locked());
        keyring.unlock(b"hunter2").expect("correct passphrase");
        assert!(!keyring.is_locked());
        keyring.lock();
        assert!(keyring.is_locked());
    }

    #[test]
    fn signing_requires_unlock() {
        let (keyring, address) = keyring();
        let address = WalletAddress::Encoded(address);
        assert!(matches!(
            keyring.sign_message("hi", &address),
            Err(WalletError::Locked)
        ));
        keyring.unlock(b"hunter2").expect("unlock");
        keyring.sign_message("hi", &address).expect("signs");
    }

    #[test]
    fn unknown_address_is_reported() {
        let (keyring, _) = keyring();
        keyring.unlock(b"hunter2").expect("unlock");
        let stranger = WalletAddress::PublicKey(public_key(&test_key(7)));
        assert!(matches!(
            keyring.sign_message("hi", &stranger),
            Err(WalletError::UnknownAddress(_))
        ));
    }

    #[test]
    fn ownership_covers_p2pkh_and_raw_key() {
        let (keyring, address) = keyring();
        let owner = keyring
            .owner_of(&WalletAddress::Encoded(address))
            .expect("imported address is owned");
        assert_eq!(owner.account.name, "default");
        assert!(!owner.internal);

        let raw = WalletAddress::PublicKey(public_key(&test_key(1)));
        assert!(keyring.owner_of(&raw).is_some());
        assert!(keyring
            .owner_of(&WalletAddress::PublicKey(public_key(&test_key(2))))
            .is_none());
    }

    #[test]
    fn import_wif_rejects_garbage() {
        let mut keyring = Keyring::new(Network::Regtest, b"pw");
        assert!(keyring
            .import_wif(
                "not-a-wif",
                AccountRef {
                    number: 0,
                    name: "default".into()
                }
            )
            .is_err());
    }
}
