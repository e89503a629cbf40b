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

//! Cancellation
//!
//! A cancellation is a replacement that drops every original output and sends what's left after
//! the higher fee to a single wallet address.

#[allow(unused_imports)]
use log::{debug, error, info, trace};

use bitcoin::{Amount, Transaction, TxOut};

use crate::blockchain::{Blockchain, UtxoIndex};
use crate::error::Error;
use crate::psbt::signing::SigningKeys;
use crate::psbt::UnsignedPlan;
use crate::types::FeeRate;
use crate::utils::IsDust;

use super::rbf::check_new_fee;
use super::{check_fee_rate, parse_txid, Accelerator};

impl<B, I> Accelerator<B, I>
where
    B: Blockchain,
    I: UtxoIndex,
{
    /// Build a replacement of `txid` paying `target` and sending everything else to
    /// `return_address`
    ///
    /// The preconditions are the same as [`Accelerator::build_rbf`]. Fails with
    /// [`Error::InsufficientFunds`] if the returned amount would be dust.
    pub fn build_cancel(
        &self,
        txid: &str,
        target: FeeRate,
        wallet: &[String],
        return_address: &str,
        keys: &SigningKeys,
    ) -> Result<UnsignedPlan, Error> {
        let txid = parse_txid(txid)?;
        let target = check_fee_rate(target)?;
        let wallet = self.wallet_set(wallet)?;
        let return_address = self.parse_address(return_address)?;

        let snapshot = self
            .snapshot(&txid, &wallet)?
            .ok_or(Error::TransactionNotFound(txid))?;
        self.require_replaceable(&snapshot)?;

        let fee_delta = self.fee_delta(&snapshot, target)?;
        let new_fee = snapshot.fee + fee_delta;
        let input_value = snapshot.input_value();
        let returned = input_value.saturating_sub(new_fee);
        if returned.is_dust(self.policy.dust_limit) {
            return Err(Error::InsufficientFunds {
                needed: new_fee + self.policy.dust_limit,
                available: input_value,
            });
        }

        let original = self.original_tx(&snapshot)?;
        let (txin, inputs) = self.replacement_inputs(&snapshot)?;
        let tx = Transaction {
            version: original.version,
            lock_time: original.lock_time,
            input: txin,
            output: vec![TxOut {
                value: Amount::from_sat(returned),
                script_pubkey: return_address.script_pubkey(),
            }],
        };
        let plan = self.finish_plan(tx, inputs, keys)?;
        check_new_fee(&plan, new_fee)?;

        info!(
            "cancellation of {}: {} sat back to {}, fee {} -> {} sat",
            txid, returned, return_address, snapshot.fee, new_fee
        );

        Ok(plan)
    }
}
