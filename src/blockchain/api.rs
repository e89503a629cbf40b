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

//! Wire structs of the block explorer API
//!
//! see: <https://github.com/Blockstream/esplora/blob/master/API.md>
//!
//! Explorers disagree on a few fields: some report `vsize`, others only `weight`, and only a few
//! inline the `spent` flag of outputs. Those fields are optional here and filled in by the
//! client when missing.
#![allow(missing_docs)]

use std::str::FromStr;

use bitcoin::{Address, ScriptBuf, Txid};

#[derive(serde::Deserialize, serde::Serialize, Clone, Debug, PartialEq, Eq)]
pub struct PrevOut {
    pub value: u64,
    #[serde(default)]
    pub scriptpubkey: Option<ScriptBuf>,
    #[serde(default)]
    pub scriptpubkey_address: Option<String>,
}

#[derive(serde::Deserialize, serde::Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Vin {
    pub txid: Txid,
    pub vout: u32,
    // None if coinbase
    pub prevout: Option<PrevOut>,
    pub sequence: u32,
    #[serde(default)]
    pub is_coinbase: bool,
}

#[derive(serde::Deserialize, serde::Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Vout {
    pub value: u64,
    #[serde(default)]
    pub scriptpubkey: Option<ScriptBuf>,
    #[serde(default)]
    pub scriptpubkey_address: Option<String>,
    #[serde(default)]
    pub spent: Option<bool>,
}

#[derive(serde::Deserialize, serde::Serialize, Clone, Debug, PartialEq, Eq)]
pub struct TxStatus {
    pub confirmed: bool,
    #[serde(default)]
    pub block_height: Option<u32>,
    #[serde(default)]
    pub block_time: Option<u64>,
}

#[derive(serde::Deserialize, serde::Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Tx {
    pub txid: Txid,
    pub version: i32,
    pub locktime: u32,
    pub vin: Vec<Vin>,
    pub vout: Vec<Vout>,
    pub status: TxStatus,
    pub fee: u64,
    #[serde(default)]
    pub vsize: Option<u64>,
    #[serde(default)]
    pub weight: Option<u64>,
}

/// Element of `GET /tx/:txid/outspends`
#[derive(serde::Deserialize, serde::Serialize, Clone, Debug, PartialEq, Eq)]
pub struct OutSpend {
    pub spent: bool,
}

impl Tx {
    /// Virtual size, derived from the weight when the explorer doesn't report it
    pub fn vsize(&self) -> Option<u64> {
        self.vsize
            .or_else(|| self.weight.map(|weight| (weight + 3) / 4))
    }

    /// Whether any output is missing its `spent` flag
    pub fn needs_outspends(&self) -> bool {
        self.vout.iter().any(|vout| vout.spent.is_none())
    }
}

impl PrevOut {
    /// The output script, rebuilt from the address if the explorer omitted it
    pub fn script_pubkey(&self) -> Option<ScriptBuf> {
        script_or_address(&self.scriptpubkey, &self.scriptpubkey_address)
    }
}

impl Vout {
    /// The output script, rebuilt from the address if the explorer omitted it
    pub fn script_pubkey(&self) -> Option<ScriptBuf> {
        script_or_address(&self.scriptpubkey, &self.scriptpubkey_address)
    }
}

fn script_or_address(script: &Option<ScriptBuf>, address: &Option<String>) -> Option<ScriptBuf> {
    script.clone().or_else(|| {
        address
            .as_deref()
            .and_then(|addr| Address::from_str(addr).ok())
            .map(|addr| addr.assume_checked().script_pubkey())
    })
}
