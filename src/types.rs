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

use bitcoin::{OutPoint, ScriptBuf, Txid};
use serde::{Deserialize, Serialize};

/// Fee rate
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, PartialOrd)]
#[serde(transparent)]
// Internally stored as satoshi/vbyte
pub struct FeeRate(f64);

impl FeeRate {
    /// Create a new instance of [`FeeRate`] given a float fee rate in satoshi/vbyte
    pub const fn from_sat_per_vb(sat_per_vb: f64) -> Self {
        FeeRate(sat_per_vb)
    }

    /// Calculate fee rate from `fee` and `vbytes`.
    pub fn from_vb(fee: u64, vbytes: u64) -> Self {
        FeeRate(fee as f64 / vbytes as f64)
    }

    /// Create a new [`FeeRate`] with the default min relay fee value
    pub const fn default_min_relay_fee() -> Self {
        FeeRate(1.0)
    }

    /// Return the value as satoshi/vbyte
    pub fn as_sat_vb(&self) -> f64 {
        self.0
    }

    /// A fee rate is usable only if it's finite and strictly positive
    pub fn is_valid(&self) -> bool {
        self.0.is_finite() && self.0 > 0.0
    }

    /// Multiply by a scalar, e.g. to derive a default target from the current rate
    pub fn scale(&self, factor: f64) -> Self {
        FeeRate(self.0 * factor)
    }

    /// Absolute fee needed to pay this rate over `vbytes`, rounded up to the next satoshi
    pub fn fee_vb(&self, vbytes: u64) -> u64 {
        crate::utils::ceil_fee(vbytes as f64 * self.0)
    }
}

impl Default for FeeRate {
    fn default() -> Self {
        FeeRate::default_min_relay_fee()
    }
}

impl fmt::Display for FeeRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} sat/vB", self.0)
    }
}

/// Where a transaction stands according to the data provider
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TxState {
    /// Included in a block
    Confirmed,
    /// Sitting in the mempool
    Unconfirmed,
    /// Unknown to the provider
    NotFound,
}

/// An input of a [`TransactionSnapshot`]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InputDescriptor {
    /// Position in the transaction
    pub index: usize,
    /// Transaction containing the spent output
    pub prev_txid: Txid,
    /// Index of the spent output
    pub prev_vout: u32,
    /// nSequence
    pub sequence: u32,
    /// Value of the spent output (sats)
    pub value: u64,
    /// Address of the spent output, if it has one
    pub address: Option<String>,
    /// Script of the spent output
    pub script_pubkey: ScriptBuf,
    /// Whether `address` is one of the caller's wallet addresses
    pub belongs_to_wallet: bool,
}

impl InputDescriptor {
    /// The spent outpoint
    pub fn previous_output(&self) -> OutPoint {
        OutPoint::new(self.prev_txid, self.prev_vout)
    }
}

/// An output of a [`TransactionSnapshot`]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OutputDescriptor {
    /// Position in the transaction
    pub index: usize,
    /// Destination address, `None` for non-standard scripts and `OP_RETURN`
    pub address: Option<String>,
    /// Output script
    pub script_pubkey: ScriptBuf,
    /// Value (sats)
    pub value: u64,
    /// Whether a transaction spending this output is known
    pub spent: bool,
    /// Whether `address` is one of the caller's wallet addresses
    pub belongs_to_wallet: bool,
}

/// A transaction as seen by the data provider at the time of the call, classified against the
/// caller's wallet addresses.
///
/// Snapshots are never cached: every operation fetches a fresh one.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionSnapshot {
    /// Transaction id
    pub txid: Txid,
    /// Confirmation state
    pub status: TxState,
    /// Fee paid (sats)
    pub fee: u64,
    /// Virtual size (vbytes)
    pub vsize: u64,
    /// `fee / vsize`
    pub fee_rate: FeeRate,
    /// Whether any input signals BIP125 replaceability
    pub opt_in_rbf: bool,
    /// Inputs, in transaction order
    pub inputs: Vec<InputDescriptor>,
    /// Outputs, in transaction order
    pub outputs: Vec<OutputDescriptor>,
}

impl TransactionSnapshot {
    /// A placeholder for a transaction the provider doesn't know about
    pub fn not_found(txid: Txid) -> Self {
        TransactionSnapshot {
            txid,
            status: TxState::NotFound,
            fee: 0,
            vsize: 0,
            fee_rate: FeeRate::from_sat_per_vb(0.0),
            opt_in_rbf: false,
            inputs: vec![],
            outputs: vec![],
        }
    }

    /// Whether the transaction is included in a block
    pub fn confirmed(&self) -> bool {
        self.status == TxState::Confirmed
    }

    /// Whether the transaction is known and still in the mempool
    pub fn is_unconfirmed(&self) -> bool {
        self.status == TxState::Unconfirmed
    }

    /// `true` iff there is at least one input and every input belongs to the wallet
    pub fn wallet_controls_all_inputs(&self) -> bool {
        !self.inputs.is_empty() && self.inputs.iter().all(|i| i.belongs_to_wallet)
    }

    /// The first unspent output paying to the wallet
    pub fn user_output(&self) -> Option<&OutputDescriptor> {
        self.outputs
            .iter()
            .find(|o| o.belongs_to_wallet && !o.spent)
    }

    /// Sum of the input values (sats)
    pub fn input_value(&self) -> u64 {
        self.inputs.iter().map(|i| i.value).sum()
    }

    /// Sum of the output values (sats)
    pub fn output_value(&self) -> u64 {
        self.outputs.iter().map(|o| o.value).sum()
    }
}

/// A spendable wallet output reported by the balance indexer
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UtxoCandidate {
    /// Transaction containing the output
    pub txid: Txid,
    /// Output index
    pub vout: u32,
    /// Value (sats)
    pub value: u64,
}

impl UtxoCandidate {
    /// The location of the output
    pub fn outpoint(&self) -> OutPoint {
        OutPoint::new(self.txid, self.vout)
    }
}

impl From<(OutPoint, u64)> for UtxoCandidate {
    fn from((outpoint, value): (OutPoint, u64)) -> Self {
        UtxoCandidate {
            txid: outpoint.txid,
            vout: outpoint.vout,
            value,
        }
    }
}

/// Way of getting a transaction confirmed faster
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Replace the transaction, paying the extra fee from its change
    Rbf,
    /// Spend one of its outputs in a child paying for both
    Cpfp,
    /// Like [`Strategy::Cpfp`], adding more wallet UTXOs to fund the child fee
    HybridCpfp,
    /// Nothing can be done
    None,
}

/// Child fee needed to lift a parent to a target package fee rate
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeeEstimate {
    /// Fee paid by the parent (sats)
    pub parent_fee: u64,
    /// Parent virtual size (vbytes)
    pub parent_size: u64,
    /// Parent fee rate
    pub parent_fee_rate: FeeRate,
    /// Assumed child virtual size (vbytes)
    pub child_size: u64,
    /// Fee the child should pay (sats)
    pub recommended_child_fee: u64,
    /// `parent_fee + recommended_child_fee`
    pub recommended_total_fee: u64,
    /// `recommended_total_fee / (parent_size + child_size)`
    pub recommended_combined_fee_rate: FeeRate,
    /// What's left of the spent output after the child fee
    pub user_receives: u64,
}
