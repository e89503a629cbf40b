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

//! Replace-by-fee
//!
//! A replacement spends exactly the same inputs as the original and pays the fee increase out of
//! the wallet's own outputs, largest first, never taking any of them under the dust limit. Every
//! other output is kept as it is, in the same position.

#[allow(unused_imports)]
use log::{debug, error, info, trace};

use bitcoin::{Amount, ScriptBuf, Transaction, TxIn, Witness};

use crate::blockchain::{Blockchain, UtxoIndex};
use crate::config::FeePolicy;
use crate::error::Error;
use crate::psbt::signing::SigningKeys;
use crate::psbt::UnsignedPlan;
use crate::types::{FeeRate, TransactionSnapshot};

use super::{check_fee_rate, parse_txid, Accelerator, PlanInput};

/// New output values after taking `fee_delta` sats from the wallet's outputs
///
/// Outputs owned by the wallet and worth more than the dust limit are shrunk, largest first, each
/// by at most `value - dust_limit`. Ties are broken by position.
pub fn shrink_change(
    policy: &FeePolicy,
    snapshot: &TransactionSnapshot,
    fee_delta: u64,
) -> Result<Vec<u64>, Error> {
    let mut values = snapshot.outputs.iter().map(|o| o.value).collect::<Vec<_>>();

    let mut change = snapshot
        .outputs
        .iter()
        .filter(|o| o.belongs_to_wallet && o.value > policy.dust_limit)
        .collect::<Vec<_>>();
    change.sort_by(|a, b| b.value.cmp(&a.value).then(a.index.cmp(&b.index)));

    let available = change
        .iter()
        .map(|o| o.value - policy.dust_limit)
        .sum::<u64>();
    if available < fee_delta {
        return Err(Error::InsufficientChange {
            needed: fee_delta,
            available,
        });
    }

    let mut remaining = fee_delta;
    for output in change {
        if remaining == 0 {
            break;
        }

        let take = remaining.min(output.value - policy.dust_limit);
        values[output.index] -= take;
        remaining -= take;
        debug!(
            "output #{} shrinks by {} sat to {} sat",
            output.index, take, values[output.index]
        );
    }

    Ok(values)
}

impl<B, I> Accelerator<B, I>
where
    B: Blockchain,
    I: UtxoIndex,
{
    /// Build a replacement of `txid` paying `target`, funded by the wallet's change
    ///
    /// Fails if the transaction is confirmed, doesn't signal RBF, spends an input that isn't in
    /// `wallet`, already pays the target, or if the wallet's change can't absorb the increase.
    pub fn build_rbf(
        &self,
        txid: &str,
        target: FeeRate,
        wallet: &[String],
        keys: &SigningKeys,
    ) -> Result<UnsignedPlan, Error> {
        let txid = parse_txid(txid)?;
        let target = check_fee_rate(target)?;
        let wallet = self.wallet_set(wallet)?;

        let snapshot = self
            .snapshot(&txid, &wallet)?
            .ok_or(Error::TransactionNotFound(txid))?;
        self.require_replaceable(&snapshot)?;

        let fee_delta = self.fee_delta(&snapshot, target)?;
        let values = shrink_change(&self.policy, &snapshot, fee_delta)?;

        let original = self.original_tx(&snapshot)?;
        let (txin, inputs) = self.replacement_inputs(&snapshot)?;
        let output = original
            .output
            .into_iter()
            .zip(values.into_iter())
            .map(|(mut txout, value)| {
                txout.value = Amount::from_sat(value);
                txout
            })
            .collect();

        let tx = Transaction {
            version: original.version,
            lock_time: original.lock_time,
            input: txin,
            output,
        };
        let plan = self.finish_plan(tx, inputs, keys)?;
        check_new_fee(&plan, snapshot.fee + fee_delta)?;

        info!(
            "RBF of {}: fee {} -> {} sat",
            txid,
            snapshot.fee,
            plan.implied_fee()
        );

        Ok(plan)
    }

    /// Extra fee needed to reach `target`, failing if it's already reached
    pub(crate) fn fee_delta(
        &self,
        snapshot: &TransactionSnapshot,
        target: FeeRate,
    ) -> Result<u64, Error> {
        let implied_fee = snapshot
            .input_value()
            .checked_sub(snapshot.output_value());
        if implied_fee != Some(snapshot.fee) {
            return Err(Error::Provider(format!(
                "fee of {} doesn't match its inputs and outputs",
                snapshot.txid
            )));
        }

        let required = target.fee_vb(snapshot.vsize);
        if required <= snapshot.fee {
            return Err(Error::FeeRateAlreadyMet {
                current: snapshot.fee,
                required,
            });
        }

        Ok(required - snapshot.fee)
    }

    /// Raw original transaction, checked against the snapshot built from the explorer view
    pub(crate) fn original_tx(&self, snapshot: &TransactionSnapshot) -> Result<Transaction, Error> {
        let original = self.raw_tx(&snapshot.txid)?;

        let same_inputs = original.input.len() == snapshot.inputs.len()
            && original
                .input
                .iter()
                .zip(snapshot.inputs.iter())
                .all(|(txin, input)| txin.previous_output == input.previous_output());
        let same_outputs = original.output.len() == snapshot.outputs.len()
            && original
                .output
                .iter()
                .zip(snapshot.outputs.iter())
                .all(|(txout, output)| txout.value.to_sat() == output.value);

        if !same_inputs || !same_outputs {
            return Err(Error::Provider(format!(
                "raw transaction {} doesn't match the explorer view",
                snapshot.txid
            )));
        }

        Ok(original)
    }

    /// The original inputs, signaling RBF, with their verified previous outputs
    pub(crate) fn replacement_inputs(
        &self,
        snapshot: &TransactionSnapshot,
    ) -> Result<(Vec<TxIn>, Vec<PlanInput>), Error> {
        let spent = snapshot
            .inputs
            .iter()
            .map(|input| (input.previous_output(), input.value))
            .collect::<Vec<_>>();
        let inputs = self
            .fetch_prevouts(&spent)?
            .into_iter()
            .zip(snapshot.inputs.iter())
            .map(|(plan_input, input)| plan_input.with_address(input.address.clone()))
            .collect::<Vec<_>>();

        let txin = inputs
            .iter()
            .map(|input| TxIn {
                previous_output: input.outpoint,
                script_sig: ScriptBuf::new(),
                sequence: FeePolicy::RBF_SEQUENCE,
                witness: Witness::new(),
            })
            .collect();

        Ok((txin, inputs))
    }
}

pub(crate) fn check_new_fee(plan: &UnsignedPlan, expected: u64) -> Result<(), Error> {
    if plan.implied_fee() != expected {
        return Err(Error::Generic(format!(
            "plan pays {} sat instead of {} sat",
            plan.implied_fee(),
            expected
        )));
    }

    Ok(())
}
