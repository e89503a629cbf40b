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

//! Data providers
//!
//! The engine keeps no state: everything it knows about the chain comes from a [`Blockchain`]
//! (transactions, previous outputs) and, when extra funding is needed, from a [`UtxoIndex`] (the
//! wallet's spendable outputs). Both are read on every call.
//!
//! HTTP implementations live in [`esplora`] and [`indexer`]; an in-memory one is available in
//! `testutils` with the `test-utils` feature.

use std::ops::Deref;
use std::sync::Arc;

use bitcoin::{OutPoint, Transaction, Txid};

use crate::error::Error;

pub mod api;
pub mod esplora;
pub mod indexer;

#[cfg(feature = "esplora")]
pub use self::esplora::EsploraBlockchain;
#[cfg(feature = "indexer")]
pub use self::indexer::OrdIndexer;

/// Source of transaction data (a block explorer)
pub trait Blockchain {
    /// Fetch the explorer view of a transaction, `None` if it's unknown
    fn get_tx(&self, txid: &Txid) -> Result<Option<api::Tx>, Error>;

    /// Fetch a raw transaction, `None` if it's unknown
    fn get_raw_tx(&self, txid: &Txid) -> Result<Option<Transaction>, Error>;

    /// Fetch many raw transactions. The result is in the same order as `txids`
    fn get_raw_txs(&self, txids: &[Txid]) -> Result<Vec<Option<Transaction>>, Error> {
        txids.iter().map(|txid| self.get_raw_tx(txid)).collect()
    }
}

/// An output reported by a [`UtxoIndex`]
#[derive(serde::Deserialize, serde::Serialize, Clone, Debug, PartialEq, Eq)]
pub struct IndexedOutput {
    /// The location of the output
    pub outpoint: OutPoint,
    /// Value (sats)
    pub value: u64,
}

/// Source of the spendable outputs of an address (a balance indexer)
pub trait UtxoIndex {
    /// List the unspent outputs of `address`
    fn list_outputs(&self, address: &str) -> Result<Vec<IndexedOutput>, Error>;
}

/// Trait for [`Blockchain`] and [`UtxoIndex`] types that can be created given a configuration
pub trait ConfigurableBlockchain: Sized {
    /// Type that contains the configuration
    type Config: std::fmt::Debug;

    /// Create a new instance given a configuration
    fn from_config(config: &Self::Config) -> Result<Self, Error>;
}

impl<T: Blockchain> Blockchain for Arc<T> {
    fn get_tx(&self, txid: &Txid) -> Result<Option<api::Tx>, Error> {
        self.deref().get_tx(txid)
    }

    fn get_raw_tx(&self, txid: &Txid) -> Result<Option<Transaction>, Error> {
        self.deref().get_raw_tx(txid)
    }

    fn get_raw_txs(&self, txids: &[Txid]) -> Result<Vec<Option<Transaction>>, Error> {
        self.deref().get_raw_txs(txids)
    }
}

impl<T: UtxoIndex> UtxoIndex for Arc<T> {
    fn list_outputs(&self, address: &str) -> Result<Vec<IndexedOutput>, Error> {
        self.deref().list_outputs(address)
    }
}

impl<T: Blockchain> Blockchain for &T {
    fn get_tx(&self, txid: &Txid) -> Result<Option<api::Tx>, Error> {
        (*self).get_tx(txid)
    }

    fn get_raw_tx(&self, txid: &Txid) -> Result<Option<Transaction>, Error> {
        (*self).get_raw_tx(txid)
    }

    fn get_raw_txs(&self, txids: &[Txid]) -> Result<Vec<Option<Transaction>>, Error> {
        (*self).get_raw_txs(txids)
    }
}

impl<T: UtxoIndex> UtxoIndex for &T {
    fn list_outputs(&self, address: &str) -> Result<Vec<IndexedOutput>, Error> {
        (*self).list_outputs(address)
    }
}
