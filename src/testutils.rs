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
#![allow(missing_docs)]

//! In-memory providers for tests
//!
//! [`MemoryBlockchain`] stores raw transactions and answers like an explorer and a balance
//! indexer would: fees, previous outputs and `spent` flags are all derived from the stored
//! transactions, so every view it gives is consistent. Keys are deterministic: key `n` is the
//! public key of the secret key made of 32 `n` bytes.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use bitcoin::absolute::LockTime;
use bitcoin::key::{CompressedPublicKey, XOnlyPublicKey};
use bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey};
use bitcoin::transaction::Version;
use bitcoin::{
    Address, Amount, Network, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid,
    Witness,
};

use crate::blockchain::indexer::IndexerError;
use crate::blockchain::{api, Blockchain, IndexedOutput, UtxoIndex};
use crate::error::Error;
use crate::psbt::signing::SigningKeys;

pub const TEST_NETWORK: Network = Network::Regtest;

pub fn test_pubkey(index: u8) -> CompressedPublicKey {
    let secp = Secp256k1::new();
    let secret = SecretKey::from_slice(&[index.max(1); 32]).expect("valid secret key");
    CompressedPublicKey(PublicKey::from_secret_key(&secp, &secret))
}

pub fn test_xonly(index: u8) -> XOnlyPublicKey {
    test_pubkey(index).0.x_only_public_key().0
}

pub fn p2wpkh(index: u8) -> String {
    Address::p2wpkh(&test_pubkey(index), TEST_NETWORK).to_string()
}

pub fn p2sh_p2wpkh(index: u8) -> String {
    Address::p2shwpkh(&test_pubkey(index), TEST_NETWORK).to_string()
}

pub fn p2pkh(index: u8) -> String {
    Address::p2pkh(test_pubkey(index).pubkey_hash(), TEST_NETWORK).to_string()
}

pub fn p2tr(index: u8) -> String {
    let secp = Secp256k1::verification_only();
    Address::p2tr(&secp, test_xonly(index), None, TEST_NETWORK).to_string()
}

/// Payment and taproot keys of key `index`
pub fn signing_keys(index: u8) -> SigningKeys {
    SigningKeys::default()
        .payment_key_bytes(&test_pubkey(index).to_bytes())
        .taproot_key_bytes(&test_xonly(index).serialize())
}

pub fn script_of(address: &str) -> ScriptBuf {
    Address::from_str(address)
        .expect("valid address")
        .assume_checked()
        .script_pubkey()
}

#[derive(Clone, Debug)]
pub struct TestIncomingOutput {
    pub value: u64,
    pub to_address: String,
}

impl TestIncomingOutput {
    pub fn new(value: u64, to_address: &str) -> Self {
        Self {
            value,
            to_address: to_address.to_string(),
        }
    }

    fn txout(&self) -> TxOut {
        TxOut {
            value: Amount::from_sat(self.value),
            script_pubkey: script_of(&self.to_address),
        }
    }
}

#[derive(Clone, Debug)]
struct StoredTx {
    tx: Transaction,
    confirmed: bool,
    vsize: Option<u64>,
}

/// An explorer and a balance indexer backed by a map of transactions
#[derive(Debug, Default)]
pub struct MemoryBlockchain {
    txs: HashMap<Txid, StoredTx>,
    spent: HashSet<OutPoint>,
    indexer_down: bool,
    next_funding: u32,
}

impl MemoryBlockchain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a confirmed transaction paying `outputs` out of nowhere
    pub fn fund(&mut self, outputs: Vec<TestIncomingOutput>) -> Txid {
        self.next_funding += 1;
        let tx = Transaction {
            version: Version::TWO,
            lock_time: LockTime::from_consensus(self.next_funding),
            input: vec![TxIn {
                previous_output: OutPoint::null(),
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            }],
            output: outputs.iter().map(TestIncomingOutput::txout).collect(),
        };

        self.insert_tx(tx, true, None)
    }

    /// Create an unconfirmed transaction spending `spend`, with every input using `sequence`
    ///
    /// `vsize` stands in for the size the signed transaction would have.
    pub fn broadcast(
        &mut self,
        spend: Vec<OutPoint>,
        outputs: Vec<TestIncomingOutput>,
        sequence: Sequence,
        vsize: u64,
    ) -> Txid {
        let tx = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: spend
                .into_iter()
                .map(|previous_output| TxIn {
                    previous_output,
                    script_sig: ScriptBuf::new(),
                    sequence,
                    witness: Witness::new(),
                })
                .collect(),
            output: outputs.iter().map(TestIncomingOutput::txout).collect(),
        };

        self.insert_tx(tx, false, Some(vsize))
    }

    pub fn insert_tx(&mut self, tx: Transaction, confirmed: bool, vsize: Option<u64>) -> Txid {
        let txid = tx.compute_txid();
        if !tx.is_coinbase() {
            self.spent
                .extend(tx.input.iter().map(|input| input.previous_output));
        }
        self.txs.insert(
            txid,
            StoredTx {
                tx,
                confirmed,
                vsize,
            },
        );

        txid
    }

    pub fn confirm(&mut self, txid: &Txid) {
        if let Some(stored) = self.txs.get_mut(txid) {
            stored.confirmed = true;
        }
    }

    pub fn mark_spent(&mut self, outpoint: OutPoint) {
        self.spent.insert(outpoint);
    }

    /// Make the balance indexer fail as if it answered with an HTML error page
    pub fn set_indexer_down(&mut self, down: bool) {
        self.indexer_down = down;
    }

    fn prevout(&self, outpoint: &OutPoint) -> Option<&TxOut> {
        self.txs
            .get(&outpoint.txid)
            .and_then(|stored| stored.tx.output.get(outpoint.vout as usize))
    }
}

fn address_of(script: &ScriptBuf) -> Option<String> {
    Address::from_script(script, TEST_NETWORK)
        .ok()
        .map(|address| address.to_string())
}

impl Blockchain for MemoryBlockchain {
    fn get_tx(&self, txid: &Txid) -> Result<Option<api::Tx>, Error> {
        let stored = match self.txs.get(txid) {
            Some(stored) => stored,
            None => return Ok(None),
        };
        let tx = &stored.tx;
        let coinbase = tx.is_coinbase();

        let vin = tx
            .input
            .iter()
            .map(|input| api::Vin {
                txid: input.previous_output.txid,
                vout: input.previous_output.vout,
                prevout: self.prevout(&input.previous_output).map(|prevout| api::PrevOut {
                    value: prevout.value.to_sat(),
                    scriptpubkey: Some(prevout.script_pubkey.clone()),
                    scriptpubkey_address: address_of(&prevout.script_pubkey),
                }),
                sequence: input.sequence.0,
                is_coinbase: coinbase,
            })
            .collect::<Vec<_>>();
        let vout = tx
            .output
            .iter()
            .enumerate()
            .map(|(index, output)| api::Vout {
                value: output.value.to_sat(),
                scriptpubkey: Some(output.script_pubkey.clone()),
                scriptpubkey_address: address_of(&output.script_pubkey),
                spent: Some(self.spent.contains(&OutPoint::new(*txid, index as u32))),
            })
            .collect::<Vec<_>>();

        let input_value = vin
            .iter()
            .filter_map(|vin| vin.prevout.as_ref())
            .map(|prevout| prevout.value)
            .sum::<u64>();
        let output_value = vout.iter().map(|vout| vout.value).sum::<u64>();
        let fee = if coinbase {
            0
        } else {
            input_value.saturating_sub(output_value)
        };

        Ok(Some(api::Tx {
            txid: *txid,
            version: tx.version.0,
            locktime: tx.lock_time.to_consensus_u32(),
            vin,
            vout,
            status: api::TxStatus {
                confirmed: stored.confirmed,
                block_height: None,
                block_time: None,
            },
            fee,
            vsize: stored.vsize,
            weight: Some(tx.weight().to_wu()),
        }))
    }

    fn get_raw_tx(&self, txid: &Txid) -> Result<Option<Transaction>, Error> {
        Ok(self.txs.get(txid).map(|stored| stored.tx.clone()))
    }
}

impl UtxoIndex for MemoryBlockchain {
    fn list_outputs(&self, address: &str) -> Result<Vec<IndexedOutput>, Error> {
        if self.indexer_down {
            return Err(IndexerError::Unavailable("expected JSON, got `<html>`".into()).into());
        }

        let script = Address::from_str(address)
            .map_err(|e| Error::InvalidAddress(e.to_string()))?
            .assume_checked()
            .script_pubkey();

        let mut outputs = self
            .txs
            .iter()
            .flat_map(|(txid, stored)| {
                stored
                    .tx
                    .output
                    .iter()
                    .enumerate()
                    .map(move |(vout, output)| (OutPoint::new(*txid, vout as u32), output))
            })
            .filter(|(outpoint, output)| {
                output.script_pubkey == script && !self.spent.contains(outpoint)
            })
            .map(|(outpoint, output)| IndexedOutput {
                outpoint,
                value: output.value.to_sat(),
            })
            .collect::<Vec<_>>();
        outputs.sort_by_key(|output| output.outpoint);

        Ok(outputs)
    }
}
