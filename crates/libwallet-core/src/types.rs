//! Domain types for decoded wallet transactions.
//!
//! Contains the direction classification (`TransactionDirection`), the
//! decoded transaction model (`DecodedTransaction`, `DecodedInput`,
//! `DecodedOutput`), per-address ownership (`AddressInfo`), and the
//! `ScriptType` tag attached to outputs. All of these are plain values:
//! built once per decode call and never mutated afterwards.

use bitcoin::{Amount, Txid};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

// ==============================================================================
// Transaction Direction
// ==============================================================================

/// Direction of a wallet transaction relative to the wallet's own keys.
///
/// Stored and exchanged as an integer code. Any code outside the defined
/// range classifies as `Unclear`, so unknown values read from disk or from
/// a newer peer degrade instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum TransactionDirection {
    /// Sent to external address(es) from the wallet.
    Sent = 0,
    /// Received from external address(es) into the wallet.
    Received = 1,
    /// Moved between the wallet's own addresses.
    Transferred = 2,
    /// Anything that could not be classified.
    Unclear = 3,
}

impl TransactionDirection {
    /// Total over all integers: never fails, never indexes out of range.
    pub const fn classify(code: i64) -> Self {
        match code {
            0 => Self::Sent,
            1 => Self::Received,
            2 => Self::Transferred,
            _ => Self::Unclear,
        }
    }

    pub const fn code(self) -> i64 {
        self as i64
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Sent => "Sent",
            Self::Received => "Received",
            Self::Transferred => "Transferred",
            Self::Unclear => "Unclear",
        }
    }
}

/// Free-function form of [`TransactionDirection::classify`].
pub const fn classify(code: i64) -> TransactionDirection {
    TransactionDirection::classify(code)
}

impl From<i64> for TransactionDirection {
    fn from(code: i64) -> Self {
        Self::classify(code)
    }
}

impl From<TransactionDirection> for i64 {
    fn from(direction: TransactionDirection) -> Self {
        direction.code()
    }
}

impl std::fmt::Display for TransactionDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ==============================================================================
// Script Type Classification
// ==============================================================================

/// Classifies a script output type. Detection is delegated to the `bitcoin`
/// crate's `Script::is_p2pkh()`, `is_p2sh()`, etc.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptType {
    P2pk,
    P2pkh,
    P2sh,
    P2wpkh,
    P2wsh,
    P2tr,
    BareMultisig,
    OpReturn,
    Unknown,
}

impl std::fmt::Display for ScriptType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::P2pk => write!(f, "p2pk"),
            Self::P2pkh => write!(f, "p2pkh"),
            Self::P2sh => write!(f, "p2sh"),
            Self::P2wpkh => write!(f, "p2wpkh"),
            Self::P2wsh => write!(f, "p2wsh"),
            Self::P2tr => write!(f, "p2tr"),
            Self::BareMultisig => write!(f, "bare_multisig"),
            Self::OpReturn => write!(f, "op_return"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

// ==============================================================================
// Decoded Transaction
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxType {
    Regular,
    Coinbase,
}

impl std::fmt::Display for TxType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Regular => write!(f, "regular"),
            Self::Coinbase => write!(f, "coinbase"),
        }
    }
}

/// Voting metadata. Only chains with on-chain stake voting populate this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteInfo {
    pub version: u32,
    pub last_block_valid: bool,
    pub vote_bits: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DecodedTransaction {
    pub hash: Txid,
    #[serde(rename = "type")]
    pub tx_type: TxType,
    pub version: i32,
    pub lock_time: u32,
    pub expiry: u32,
    pub fee: Amount,
    /// Fee per 1000 bytes of serialized size.
    pub fee_rate: Amount,
    pub size: usize,
    pub inputs: Vec<DecodedInput>,
    pub outputs: Vec<DecodedOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vote: Option<VoteInfo>,
}

/// A decoded input. The combined outpoint string is always derived from
/// the hash and index, never stored on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedInput {
    pub previous_hash: Txid,
    pub previous_index: u32,
    /// Value of the spent output; zero when the decode context could not
    /// resolve it.
    pub amount_in: Amount,
}

impl DecodedInput {
    pub fn previous_outpoint(&self) -> String {
        format!("{}:{}", self.previous_hash, self.previous_index)
    }
}

impl Serialize for DecodedInput {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("DecodedInput", 4)?;
        state.serialize_field("previous_hash", &self.previous_hash)?;
        state.serialize_field("previous_index", &self.previous_index)?;
        state.serialize_field("previous_outpoint", &self.previous_outpoint())?;
        state.serialize_field("amount_in", &self.amount_in)?;
        state.end()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DecodedOutput {
    pub index: u32,
    pub value: Amount,
    /// `true` when the output pays back to one of the wallet's internal
    /// (change) addresses.
    pub internal: bool,
    /// 0 for legacy scripts, the witness version for segwit programs.
    pub script_version: u8,
    pub script_type: ScriptType,
    /// More than one entry for bare multisig outputs.
    pub addresses: Vec<AddressInfo>,
}

// ==============================================================================
// Address Ownership
// ==============================================================================

/// The account an owned address belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRef {
    pub number: u32,
    pub name: String,
}

/// An address paid by an output, annotated with wallet ownership.
///
/// Account details exist only for owned addresses; the constructors are
/// the only way to build one, so `is_mine == false` never carries an
/// account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressInfo {
    address: String,
    is_mine: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    account_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    account_name: Option<String>,
}

impl AddressInfo {
    pub fn foreign(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            is_mine: false,
            account_number: None,
            account_name: None,
        }
    }

    pub fn owned(address: impl Into<String>, account: AccountRef) -> Self {
        Self {
            address: address.into(),
            is_mine: true,
            account_number: Some(account.number),
            account_name: Some(account.name),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn is_mine(&self) -> bool {
        self.is_mine
    }

    pub fn account_number(&self) -> Option<u32> {
        self.account_number
    }

    pub fn account_name(&self) -> Option<&str> {
        self.account_name.as_deref()
    }
}
