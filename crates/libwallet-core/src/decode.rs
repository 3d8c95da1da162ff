//! Raw transaction decoding into the wallet's transaction model.
//!
//! Consensus-decodes transaction bytes, classifies every output script,
//! extracts the addresses it pays, and annotates each with wallet
//! ownership taken from a [`DecodeContext`].

use bitcoin::blockdata::script::Instruction;
use bitcoin::hex::FromHex;
use bitcoin::{consensus, Address, Amount, Network, OutPoint, PublicKey, Script, Transaction};

use crate::address::WalletAddress;
use crate::error::Error;
use crate::types::{
    AccountRef, AddressInfo, DecodedInput, DecodedOutput, DecodedTransaction, ScriptType, TxType,
};

// ==============================================================================
// Decode Context
// ==============================================================================

/// An owned address's account and branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressOwner {
    pub account: AccountRef,
    /// `true` for the internal (change) branch.
    pub internal: bool,
}

/// Chain and wallet knowledge used while decoding. Both lookups default
/// to "unknown".
pub trait DecodeContext {
    fn owner_of(&self, _address: &WalletAddress) -> Option<AddressOwner> {
        None
    }

    fn prevout_value(&self, _outpoint: &OutPoint) -> Option<Amount> {
        None
    }
}

/// Decode without a wallet: nothing is owned, no input amounts resolve.
pub struct NoContext;

impl DecodeContext for NoContext {}

// ==============================================================================
// Script Classification
// ==============================================================================

/// Classify a script using the `bitcoin` crate's built-in detection methods.
#[must_use]
pub fn classify_script(script: &Script) -> ScriptType {
    if script.is_p2pk() {
        ScriptType::P2pk
    } else if script.is_p2pkh() {
        ScriptType::P2pkh
    } else if script.is_p2sh() {
        ScriptType::P2sh
    } else if script.is_p2wpkh() {
        ScriptType::P2wpkh
    } else if script.is_p2wsh() {
        ScriptType::P2wsh
    } else if script.is_p2tr() {
        ScriptType::P2tr
    } else if script.is_multisig() {
        ScriptType::BareMultisig
    } else if script.is_op_return() {
        ScriptType::OpReturn
    } else {
        ScriptType::Unknown
    }
}

/// Addresses an output script pays to. Bare-key scripts (P2PK, bare
/// multisig) yield one raw public key per key.
fn script_addresses(script: &Script, network: Network) -> Vec<WalletAddress> {
    if let Ok(address) = Address::from_script(script, network) {
        return vec![WalletAddress::Encoded(address)];
    }
    if let Some(key) = script.p2pk_public_key() {
        return vec![WalletAddress::PublicKey(key)];
    }
    if script.is_multisig() {
        return script
            .instructions()
            .filter_map(|instruction| match instruction {
                Ok(Instruction::PushBytes(bytes)) => PublicKey::from_slice(bytes.as_bytes()).ok(),
                _ => None,
            })
            .map(WalletAddress::PublicKey)
            .collect();
    }
    Vec::new()
}

// ==============================================================================
// Decode
// ==============================================================================

pub fn decode_transaction<C: DecodeContext + ?Sized>(
    raw: &[u8],
    network: Network,
    context: &C,
) -> Result<DecodedTransaction, Error> {
    let tx: Transaction =
        consensus::deserialize(raw).map_err(|e| Error::InvalidTransaction(e.to_string()))?;
    Ok(decode_parsed(&tx, network, context))
}

pub fn decode_transaction_hex<C: DecodeContext + ?Sized>(
    hex: &str,
    network: Network,
    context: &C,
) -> Result<DecodedTransaction, Error> {
    let raw = Vec::<u8>::from_hex(hex.trim())
        .map_err(|e| Error::InvalidTransaction(format!("invalid hex: {e}")))?;
    decode_transaction(&raw, network, context)
}

fn decode_parsed<C: DecodeContext + ?Sized>(
    tx: &Transaction,
    network: Network,
    context: &C,
) -> DecodedTransaction {
    let coinbase = tx.is_coinbase();

    let resolved: Vec<Option<Amount>> = tx
        .input
        .iter()
        .map(|input| {
            if coinbase {
                None
            } else {
                context.prevout_value(&input.previous_output)
            }
        })
        .collect();

    let inputs = tx
        .input
        .iter()
        .zip(&resolved)
        .map(|(input, amount)| DecodedInput {
            previous_hash: input.previous_output.txid,
            previous_index: input.previous_output.vout,
            amount_in: amount.unwrap_or(Amount::ZERO),
        })
        .collect();

    let outputs: Vec<DecodedOutput> = tx
        .output
        .iter()
        .enumerate()
        .map(|(index, output)| decode_output(index as u32, output, network, context))
        .collect();

    let total_in = if coinbase {
        None
    } else {
        resolved
            .iter()
            .try_fold(Amount::ZERO, |acc, amount| acc.checked_add((*amount)?))
    };
    let total_out = tx
        .output
        .iter()
        .try_fold(Amount::ZERO, |acc, output| acc.checked_add(output.value));

    let fee = match (total_in, total_out) {
        (Some(total_in), Some(total_out)) => {
            total_in.checked_sub(total_out).unwrap_or(Amount::ZERO)
        }
        _ => Amount::ZERO,
    };

    let size = tx.total_size();
    let fee_rate = if size == 0 {
        Amount::ZERO
    } else {
        Amount::from_sat(fee.to_sat().saturating_mul(1000) / size as u64)
    };

    DecodedTransaction {
        hash: tx.compute_txid(),
        tx_type: if coinbase {
            TxType::Coinbase
        } else {
            TxType::Regular
        },
        version: tx.version.0,
        lock_time: tx.lock_time.to_consensus_u32(),
        expiry: 0,
        fee,
        fee_rate,
        size,
        inputs,
        outputs,
        vote: None,
    }
}

fn decode_output<C: DecodeContext + ?Sized>(
    index: u32,
    output: &bitcoin::TxOut,
    network: Network,
    context: &C,
) -> DecodedOutput {
    let script = output.script_pubkey.as_script();
    let mut internal = false;

    let addresses = script_addresses(script, network)
        .into_iter()
        .map(|address| match context.owner_of(&address) {
            Some(owner) => {
                internal |= owner.internal;
                AddressInfo::owned(address.to_string(), owner.account)
            }
            None => AddressInfo::foreign(address.to_string()),
        })
        .collect();

    DecodedOutput {
        index,
        value: output.value,
        internal,
        script_version: script.witness_version().map_or(0, |v| v.to_num()),
        script_type: classify_script(script),
        addresses,
    }
}
