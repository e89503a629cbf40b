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

//! Acceleration engine
//!
//! [`Accelerator`] is the entry point: it owns the two data providers and the [`FeePolicy`], and
//! exposes the analyzer and the three builders. It keeps no state of its own, every call fetches a
//! fresh view of the transactions it works on.
//!
//! The logic is split by strategy:
//!
//! - [`analyzer`]: what can be done for a transaction
//! - [`fee`]: child fee arithmetic
//! - [`rbf`]: same-input replacement paying the fee out of the wallet's change
//! - [`cpfp`]: child transactions, optionally funded with extra wallet UTXOs
//! - [`cancel`]: replacement sending everything back to the wallet
//! - [`utxo`]: the wallet's spendable outputs and coin selection

use std::collections::HashSet;
use std::str::FromStr;

use bitcoin::address::NetworkUnchecked;
use bitcoin::{Address, Network, OutPoint, Transaction, TxOut, Txid};

#[allow(unused_imports)]
use log::{debug, error, info, trace};

use crate::address::{classify, normalize};
use crate::blockchain::{Blockchain, UtxoIndex};
use crate::config::FeePolicy;
use crate::error::Error;
use crate::psbt::signing::{PsbtSigningExt, SigningKeys};
use crate::psbt::UnsignedPlan;
use crate::types::{FeeRate, InputDescriptor, OutputDescriptor, TransactionSnapshot, TxState};

pub mod analyzer;
pub mod cancel;
pub mod cpfp;
pub mod fee;
pub mod rbf;
pub mod utxo;

pub use analyzer::{Analysis, AnalysisReport};
pub use cpfp::{CpfpParams, CpfpPlan};

/// Analyzes stuck transactions and builds unsigned plans to accelerate or cancel them
#[derive(Debug)]
pub struct Accelerator<B, I> {
    blockchain: B,
    indexer: I,
    network: Network,
    policy: FeePolicy,
}

impl<B, I> Accelerator<B, I>
where
    B: Blockchain,
    I: UtxoIndex,
{
    /// Create a new engine reading transactions from `blockchain` and wallet outputs from `indexer`
    pub fn new(blockchain: B, indexer: I, network: Network, policy: FeePolicy) -> Self {
        Accelerator {
            blockchain,
            indexer,
            network,
            policy,
        }
    }

    /// Network addresses are checked against
    pub fn network(&self) -> Network {
        self.network
    }

    /// The fee policy in use
    pub fn policy(&self) -> &FeePolicy {
        &self.policy
    }

    /// Transaction data provider
    pub fn blockchain(&self) -> &B {
        &self.blockchain
    }

    /// Balance-indexing provider
    pub fn indexer(&self) -> &I {
        &self.indexer
    }

    pub(crate) fn parse_address(&self, address: &str) -> Result<Address, Error> {
        let unchecked = Address::<NetworkUnchecked>::from_str(address.trim())
            .map_err(|e| Error::InvalidAddress(format!("`{}`: {}", address, e)))?;

        unchecked
            .require_network(self.network)
            .map_err(|e| Error::InvalidAddress(format!("`{}`: {}", address, e)))
    }

    /// Validate the wallet addresses, all of them are checked before any network call
    ///
    /// The set holds the [normalized](crate::address::normalize) form of each address.
    pub(crate) fn wallet_set(&self, wallet: &[String]) -> Result<HashSet<String>, Error> {
        if wallet.is_empty() {
            return Err(Error::NoWalletAddresses);
        }

        wallet
            .iter()
            .map(|address| {
                self.parse_address(address)?;
                Ok(normalize(address))
            })
            .collect()
    }

    /// Fetch a transaction and classify it against `wallet`, `None` if the provider doesn't know it
    pub(crate) fn snapshot(
        &self,
        txid: &Txid,
        wallet: &HashSet<String>,
    ) -> Result<Option<TransactionSnapshot>, Error> {
        let tx = match self.blockchain.get_tx(txid)? {
            Some(tx) => tx,
            None => return Ok(None),
        };

        let vsize = match tx.vsize() {
            Some(vsize) if vsize > 0 => vsize,
            _ => return Err(Error::MissingTxSize(*txid)),
        };
        let owned = |address: &Option<String>| {
            address
                .as_ref()
                .map(|address| wallet.contains(&normalize(address)))
                .unwrap_or(false)
        };

        let inputs = tx
            .vin
            .iter()
            .enumerate()
            .map(|(index, vin)| {
                let (value, address, script_pubkey) = match &vin.prevout {
                    Some(prevout) => (
                        prevout.value,
                        prevout.scriptpubkey_address.clone(),
                        prevout.script_pubkey().unwrap_or_default(),
                    ),
                    None => (0, None, Default::default()),
                };

                InputDescriptor {
                    index,
                    prev_txid: vin.txid,
                    prev_vout: vin.vout,
                    sequence: vin.sequence,
                    value,
                    belongs_to_wallet: owned(&address),
                    address,
                    script_pubkey,
                }
            })
            .collect::<Vec<_>>();

        let outputs = tx
            .vout
            .iter()
            .enumerate()
            .map(|(index, vout)| OutputDescriptor {
                index,
                address: vout.scriptpubkey_address.clone(),
                script_pubkey: vout.script_pubkey().unwrap_or_default(),
                value: vout.value,
                spent: vout.spent.unwrap_or(false),
                belongs_to_wallet: owned(&vout.scriptpubkey_address),
            })
            .collect::<Vec<_>>();

        let opt_in_rbf = inputs
            .iter()
            .any(|input| input.sequence < bitcoin::Sequence::ENABLE_LOCKTIME_NO_RBF.0);
        let status = if tx.status.confirmed {
            TxState::Confirmed
        } else {
            TxState::Unconfirmed
        };

        Ok(Some(TransactionSnapshot {
            txid: tx.txid,
            status,
            fee: tx.fee,
            vsize,
            fee_rate: FeeRate::from_vb(tx.fee, vsize),
            opt_in_rbf,
            inputs,
            outputs,
        }))
    }

    /// Preconditions shared by RBF replacements and cancellations
    pub(crate) fn require_replaceable(&self, snapshot: &TransactionSnapshot) -> Result<(), Error> {
        if snapshot.confirmed() {
            return Err(Error::TransactionConfirmed(snapshot.txid));
        }
        if !snapshot.opt_in_rbf {
            return Err(Error::IrreplaceableTransaction(snapshot.txid));
        }
        if let Some(input) = snapshot.inputs.iter().find(|i| !i.belongs_to_wallet) {
            return Err(Error::ForeignInput {
                txid: snapshot.txid,
                index: input.index,
            });
        }

        Ok(())
    }

    /// Fetch a raw transaction, failing if the provider doesn't know it
    pub(crate) fn raw_tx(&self, txid: &Txid) -> Result<Transaction, Error> {
        self.blockchain
            .get_raw_tx(txid)?
            .ok_or(Error::TransactionNotFound(*txid))
    }

    /// Fetch the transactions containing `spent` and check that each output is worth what the
    /// caller or the provider claimed
    ///
    /// The result is in the same order as `spent`.
    pub(crate) fn fetch_prevouts(
        &self,
        spent: &[(OutPoint, u64)],
    ) -> Result<Vec<PlanInput>, Error> {
        let txids = spent
            .iter()
            .map(|(outpoint, _)| outpoint.txid)
            .collect::<Vec<_>>();
        let txs = self.blockchain.get_raw_txs(&txids)?;

        spent
            .iter()
            .zip(txs.into_iter())
            .map(|((outpoint, expected), tx)| {
                let prev_tx = tx.ok_or(Error::TransactionNotFound(outpoint.txid))?;
                let prevout = prev_tx
                    .output
                    .get(outpoint.vout as usize)
                    .cloned()
                    .ok_or(Error::InvalidOutpoint(*outpoint))?;

                if prevout.value.to_sat() != *expected {
                    return Err(Error::PrevoutMismatch {
                        outpoint: *outpoint,
                        expected: format!("{} sat", expected),
                        found: format!("{} sat", prevout.value.to_sat()),
                    });
                }
                trace!("verified {} ({} sat)", outpoint, expected);

                Ok(PlanInput {
                    outpoint: *outpoint,
                    prev_tx,
                    prevout,
                    address: None,
                })
            })
            .collect()
    }

    /// Wrap `tx` in a PSBT and attach what wallets need to sign each input
    pub(crate) fn finish_plan(
        &self,
        tx: Transaction,
        inputs: Vec<PlanInput>,
        keys: &SigningKeys,
    ) -> Result<UnsignedPlan, Error> {
        let prevouts = inputs
            .iter()
            .map(|input| input.prevout.clone())
            .collect::<Vec<TxOut>>();
        let mut plan = UnsignedPlan::new(tx, prevouts)?;

        let psbt = plan.psbt_mut();
        for (index, input) in inputs.into_iter().enumerate() {
            let value = input.prevout.value.to_sat();
            trace!("Input #{}: {} ({} sat)", index, input.outpoint, value);
            let script_type = input.address.as_deref().and_then(|a| classify(a).script_type());

            // legacy inputs commit to the whole previous transaction
            if !script_type.map(|t| t.is_witness()).unwrap_or(false) {
                psbt.inputs[index].non_witness_utxo = Some(input.prev_tx);
            }

            match input.address {
                Some(address) => psbt.inject_signing_info(index, &address, keys, Some(value)),
                None => debug!("Input #{}: no address, no signing info added", index),
            }
        }

        info!(
            "plan ready: {} inputs, {} outputs, fee {} sat",
            plan.unsigned_tx().input.len(),
            plan.unsigned_tx().output.len(),
            plan.implied_fee()
        );

        Ok(plan)
    }
}

#[cfg(all(feature = "esplora", feature = "indexer"))]
impl Accelerator<crate::blockchain::EsploraBlockchain, crate::blockchain::OrdIndexer> {
    /// Build an engine talking to the HTTP providers described in `config`
    pub fn from_config(config: &crate::config::Config) -> Result<Self, Error> {
        use crate::blockchain::{ConfigurableBlockchain, EsploraBlockchain, OrdIndexer};

        config.validate()?;

        Ok(Accelerator::new(
            EsploraBlockchain::from_config(&config.esplora)?,
            OrdIndexer::from_config(&config.indexer)?,
            config.network,
            config.policy.clone(),
        ))
    }
}

/// An input of a plan being built, along with what's needed to sign it
#[derive(Debug, Clone)]
pub(crate) struct PlanInput {
    pub(crate) outpoint: OutPoint,
    pub(crate) prev_tx: Transaction,
    pub(crate) prevout: TxOut,
    pub(crate) address: Option<String>,
}

impl PlanInput {
    pub(crate) fn with_address(mut self, address: Option<String>) -> Self {
        self.address = address;
        self
    }
}

/// Parse a transaction id given as a hex string
pub(crate) fn parse_txid(txid: &str) -> Result<Txid, Error> {
    let txid = txid.trim();
    if txid.len() != 64 {
        return Err(Error::InvalidTxid(txid.to_string()));
    }

    Txid::from_str(txid).map_err(|_| Error::InvalidTxid(txid.to_string()))
}

pub(crate) fn check_fee_rate(rate: FeeRate) -> Result<FeeRate, Error> {
    if rate.is_valid() {
        Ok(rate)
    } else {
        Err(Error::InvalidFeeRate(rate.as_sat_vb()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_txid() {
        assert!(parse_txid("6666666666666666666666666666666666666666666666666666666666666666").is_ok());
        assert!(matches!(parse_txid("abcd"), Err(Error::InvalidTxid(_))));
        assert!(matches!(
            parse_txid("zz66666666666666666666666666666666666666666666666666666666666666"),
            Err(Error::InvalidTxid(_))
        ));
    }

    #[test]
    fn test_check_fee_rate() {
        assert!(check_fee_rate(FeeRate::from_sat_per_vb(2.5)).is_ok());
        assert!(matches!(
            check_fee_rate(FeeRate::from_sat_per_vb(0.0)),
            Err(Error::InvalidFeeRate(_))
        ));
    }
}
