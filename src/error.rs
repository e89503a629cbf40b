// Bitcoin Dev Kit
// Written in 2020 by Alekos Filini <alekos.filini@gmail.com>
//
// Copyright (c) 2020-2021 Bitcoin Dev Kit Developers
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

use std::fmt;

use bitcoin::{OutPoint, Txid};
use serde::Serialize;

/// Broad category of an [`Error`], used by callers to decide what to suggest next
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed caller input, rejected before any network call is made
    Validation,
    /// The transaction is not in a state that allows the requested operation
    Precondition,
    /// The data provider failed or returned something unusable. Retrying may help
    Upstream,
    /// The engine or one of its endpoints is misconfigured. Retrying won't help
    Configuration,
    /// The fee can't be funded, the exact missing amount is usually reported
    Shortfall,
}

/// Errors that can be returned by the [`Accelerator`](crate::Accelerator)
#[derive(Debug)]
pub enum Error {
    /// The given string is not a valid transaction id
    InvalidTxid(String),
    /// The given string is not a valid address for the configured network
    InvalidAddress(String),
    /// An amount supplied by the caller is out of range
    InvalidAmount(String),
    /// Fee rates must be finite and strictly positive (sat/vbyte)
    InvalidFeeRate(f64),
    /// A public key is not valid hex
    InvalidPublicKey(String),
    /// The caller didn't provide any wallet address
    NoWalletAddresses,
    /// Requested outpoint doesn't exist in the tx (vout greater than available outputs), or is
    /// spent twice by the same plan
    InvalidOutpoint(OutPoint),
    /// The output referenced by the caller doesn't match what the provider reports
    PrevoutMismatch {
        /// The output being spent
        outpoint: OutPoint,
        /// What the caller or the provider view claimed
        expected: String,
        /// What the previous transaction actually contains
        found: String,
    },

    /// Thrown when a tx is not known to the data provider
    TransactionNotFound(Txid),
    /// Happens when trying to replace or bump a transaction that is already confirmed
    TransactionConfirmed(Txid),
    /// Trying to replace a tx that doesn't signal opt-in RBF (all sequences >= `0xFFFFFFFE`)
    IrreplaceableTransaction(Txid),
    /// The transaction spends an input not controlled by the wallet
    ForeignInput {
        /// The transaction being replaced
        txid: Txid,
        /// Index of the first input not owned by the wallet
        index: usize,
    },
    /// The transaction already pays at least the target fee
    FeeRateAlreadyMet {
        /// Fee currently paid (sats)
        current: u64,
        /// Fee required by the target rate (sats)
        required: u64,
    },
    /// The output the child would spend is already spent
    OutputSpent(OutPoint),
    /// No unspent output of the transaction belongs to the wallet
    NoWalletOutput(Txid),

    /// The wallet-owned change outputs can't absorb the fee increase. CPFP may still be possible
    InsufficientChange {
        /// Sats needed on top of the current fee
        needed: u64,
        /// Sats that can be taken from change outputs without making them dust
        available: u64,
    },
    /// Available funds are not enough to cover the fee
    InsufficientFunds {
        /// Sats needed
        needed: u64,
        /// Sats available for spending
        available: u64,
    },
    /// Output created would be under the dust limit
    OutputBelowDustLimit {
        /// Index of the output
        index: usize,
        /// Value it would have
        value: u64,
        /// The dust limit in use
        limit: u64,
    },

    /// The provider returned a transaction with neither `vsize` nor `weight`
    MissingTxSize(Txid),
    /// A data provider reported an error
    Provider(String),
    /// Esplora client error
    Esplora(Box<crate::blockchain::esplora::EsploraError>),
    /// Balance indexer client error
    Indexer(crate::blockchain::indexer::IndexerError),

    /// Error serializing or deserializing JSON data
    Json(serde_json::Error),
    /// Partially signed bitcoin transaction error
    Psbt(bitcoin::psbt::Error),
    /// Generic error
    Generic(String),
}

impl Error {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidTxid(_)
            | Error::InvalidAddress(_)
            | Error::InvalidAmount(_)
            | Error::InvalidFeeRate(_)
            | Error::InvalidPublicKey(_)
            | Error::NoWalletAddresses
            | Error::InvalidOutpoint(_)
            | Error::PrevoutMismatch { .. } => ErrorKind::Validation,

            Error::TransactionNotFound(_)
            | Error::TransactionConfirmed(_)
            | Error::IrreplaceableTransaction(_)
            | Error::ForeignInput { .. }
            | Error::FeeRateAlreadyMet { .. }
            | Error::OutputSpent(_)
            | Error::NoWalletOutput(_) => ErrorKind::Precondition,

            Error::InsufficientChange { .. }
            | Error::InsufficientFunds { .. }
            | Error::OutputBelowDustLimit { .. } => ErrorKind::Shortfall,

            Error::MissingTxSize(_) | Error::Provider(_) => ErrorKind::Upstream,
            Error::Esplora(_) => ErrorKind::Upstream,
            Error::Indexer(err) if err.is_retryable() => ErrorKind::Upstream,
            Error::Indexer(_) => ErrorKind::Configuration,

            Error::Json(_) | Error::Psbt(_) | Error::Generic(_) => ErrorKind::Configuration,
        }
    }

    /// Whether calling again later with the same arguments may succeed
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Upstream
    }

    /// Exact amount of sats missing, for errors where it can be computed
    pub fn shortfall(&self) -> Option<u64> {
        match self {
            Error::InsufficientChange { needed, available }
            | Error::InsufficientFunds { needed, available } => {
                Some(needed.saturating_sub(*available))
            }
            Error::OutputBelowDustLimit { value, limit, .. } => Some(limit.saturating_sub(*value)),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTxid(txid) => write!(f, "Invalid transaction id: `{}`", txid),
            Self::InvalidAddress(err) => write!(f, "Invalid address: {}", err),
            Self::InvalidAmount(err) => write!(f, "Invalid amount: {}", err),
            Self::InvalidFeeRate(rate) => write!(
                f,
                "Invalid fee rate: {} sat/vbyte, must be a positive number",
                rate
            ),
            Self::InvalidPublicKey(err) => write!(f, "Invalid public key: {}", err),
            Self::NoWalletAddresses => write!(f, "At least one wallet address is required"),
            Self::InvalidOutpoint(outpoint) => write!(
                f,
                "Requested outpoint doesn't exist or is used twice: {}",
                outpoint
            ),
            Self::PrevoutMismatch {
                outpoint,
                expected,
                found,
            } => write!(
                f,
                "Output {} doesn't match: expected {}, found {}",
                outpoint, expected, found
            ),
            Self::TransactionNotFound(txid) => write!(f, "Transaction {} not found", txid),
            Self::TransactionConfirmed(txid) => {
                write!(f, "Transaction {} is already confirmed", txid)
            }
            Self::IrreplaceableTransaction(txid) => write!(
                f,
                "Transaction {} doesn't signal replace-by-fee and can't be replaced",
                txid
            ),
            Self::ForeignInput { txid, index } => write!(
                f,
                "Input #{} of transaction {} is not owned by the wallet, it can't be replaced",
                index, txid
            ),
            Self::FeeRateAlreadyMet { current, required } => write!(
                f,
                "Target already met: the transaction pays {} sat, the target requires {} sat",
                current, required
            ),
            Self::OutputSpent(outpoint) => write!(f, "Output {} is already spent", outpoint),
            Self::NoWalletOutput(txid) => write!(
                f,
                "Transaction {} has no unspent output owned by the wallet",
                txid
            ),
            Self::InsufficientChange { needed, available } => write!(
                f,
                "Insufficient wallet-owned change for RBF: {} sat available of {} sat needed, consider CPFP instead",
                available, needed
            ),
            Self::InsufficientFunds { needed, available } => write!(
                f,
                "Insufficient funds: {} sat available of {} sat needed",
                available, needed
            ),
            Self::OutputBelowDustLimit {
                index,
                value,
                limit,
            } => write!(
                f,
                "Output #{} would be {} sat, below the dust limit of {} sat",
                index, value, limit
            ),
            Self::MissingTxSize(txid) => write!(
                f,
                "The provider didn't report the size of transaction {}",
                txid
            ),
            Self::Provider(err) => write!(f, "Data provider error: {}", err),
            Self::Esplora(err) => write!(f, "Esplora client error: {}", err),
            Self::Indexer(err) => write!(f, "Balance indexer error: {}", err),
            Self::Json(err) => write!(f, "Serialize/Deserialize JSON error: {}", err),
            Self::Psbt(err) => write!(f, "PSBT error: {}", err),
            Self::Generic(err) => write!(f, "Generic error: {}", err),
        }
    }
}

impl std::error::Error for Error {}

macro_rules! impl_error {
    ( $from:ty, $to:ident ) => {
        impl_error!($from, $to, Error);
    };
    ( $from:ty, $to:ident, $impl_for:ty ) => {
        impl std::convert::From<$from> for $impl_for {
            fn from(err: $from) -> Self {
                <$impl_for>::$to(err)
            }
        }
    };
}

impl_error!(serde_json::Error, Json);
impl_error!(bitcoin::psbt::Error, Psbt);

impl_error!(crate::blockchain::indexer::IndexerError, Indexer);

impl From<crate::blockchain::esplora::EsploraError> for Error {
    fn from(other: crate::blockchain::esplora::EsploraError) -> Self {
        Error::Esplora(Box::new(other))
    }
}
