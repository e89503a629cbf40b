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

//! Unsigned transaction plans
//!
//! Every builder returns an [`UnsignedPlan`]: a [`Psbt`] whose inputs all carry their previous
//! output as `witness_utxo`, so that the fee can be computed from the plan alone and checked
//! before it leaves the engine.

use bitcoin::psbt::Psbt;
use bitcoin::{Transaction, TxOut};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::types::FeeRate;

pub mod signing;

/// Trait to add functions to extract utxos and calculate fees.
pub trait PsbtUtils {
    /// Get the `TxOut` for the specified input index, if it doesn't exist in the PSBT `None` is returned.
    fn get_utxo_for(&self, input_index: usize) -> Option<TxOut>;

    /// Sum of the input amounts, `None` if the PSBT is missing a `TxOut` for an input
    fn input_amount(&self) -> Option<u64>;

    /// Sum of the output amounts
    fn output_amount(&self) -> u64;

    /// The total transaction fee amount, sum of input amounts minus sum of output amounts, in sats.
    /// If the PSBT is missing a TxOut for an input, or the outputs exceed the inputs, returns None.
    fn fee_amount(&self) -> Option<u64>;
}

impl PsbtUtils for Psbt {
    fn get_utxo_for(&self, input_index: usize) -> Option<TxOut> {
        let tx = &self.unsigned_tx;
        let txin = tx.input.get(input_index)?;
        let input = self.inputs.get(input_index)?;

        if let Some(wit_utxo) = &input.witness_utxo {
            Some(wit_utxo.clone())
        } else if let Some(in_tx) = &input.non_witness_utxo {
            in_tx
                .output
                .get(txin.previous_output.vout as usize)
                .cloned()
        } else {
            None
        }
    }

    fn input_amount(&self) -> Option<u64> {
        (0..self.unsigned_tx.input.len())
            .map(|i| self.get_utxo_for(i).map(|utxo| utxo.value.to_sat()))
            .sum()
    }

    fn output_amount(&self) -> u64 {
        self.unsigned_tx
            .output
            .iter()
            .map(|o| o.value.to_sat())
            .sum()
    }

    fn fee_amount(&self) -> Option<u64> {
        self.input_amount()?.checked_sub(self.output_amount())
    }
}

/// Count and total value of one side of a plan
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Totals {
    /// Number of inputs or outputs
    pub count: usize,
    /// Their total value (sats)
    pub value: u64,
}

/// Human-readable summary of an [`UnsignedPlan`]
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanSummary {
    /// Inputs of the plan
    pub inputs: Totals,
    /// Outputs of the plan
    pub outputs: Totals,
    /// `inputs.value - outputs.value`
    pub fee: u64,
}

/// An unsigned transaction, ready to be handed to a wallet for signing
#[derive(Debug, Clone, PartialEq)]
pub struct UnsignedPlan {
    psbt: Psbt,
}

impl UnsignedPlan {
    /// Wrap `tx` in a PSBT, attaching `prevouts[i]` as the `witness_utxo` of input `i`
    ///
    /// Fails if the lengths don't match or if the outputs are worth more than the inputs.
    pub fn new(tx: Transaction, prevouts: Vec<TxOut>) -> Result<Self, Error> {
        if tx.input.len() != prevouts.len() {
            return Err(Error::Generic(format!(
                "{} inputs but {} previous outputs",
                tx.input.len(),
                prevouts.len()
            )));
        }

        let mut psbt = Psbt::from_unsigned_tx(tx)?;
        for (input, prevout) in psbt.inputs.iter_mut().zip(prevouts.into_iter()) {
            input.witness_utxo = Some(prevout);
        }

        let plan = UnsignedPlan { psbt };
        let input_amount = plan.psbt.input_amount().unwrap_or(0);
        let output_amount = plan.psbt.output_amount();
        if output_amount > input_amount {
            return Err(Error::InsufficientFunds {
                needed: output_amount,
                available: input_amount,
            });
        }

        Ok(plan)
    }

    /// The underlying PSBT
    pub fn psbt(&self) -> &Psbt {
        &self.psbt
    }

    /// Mutable access to the PSBT, used to attach signing metadata
    pub fn psbt_mut(&mut self) -> &mut Psbt {
        &mut self.psbt
    }

    /// Consume the plan, returning the PSBT
    pub fn into_psbt(self) -> Psbt {
        self.psbt
    }

    /// The transaction to be signed
    pub fn unsigned_tx(&self) -> &Transaction {
        &self.psbt.unsigned_tx
    }

    /// `Σinputs − Σoutputs`
    pub fn implied_fee(&self) -> u64 {
        self.psbt.fee_amount().unwrap_or(0)
    }

    /// Fee rate over an externally known virtual size
    pub fn fee_rate_for(&self, vsize: u64) -> FeeRate {
        FeeRate::from_vb(self.implied_fee(), vsize)
    }

    /// Output values, in order
    pub fn output_values(&self) -> Vec<u64> {
        self.psbt
            .unsigned_tx
            .output
            .iter()
            .map(|o| o.value.to_sat())
            .collect()
    }

    /// Counts and totals of the plan
    pub fn summary(&self) -> PlanSummary {
        let inputs = Totals {
            count: self.psbt.unsigned_tx.input.len(),
            value: self.psbt.input_amount().unwrap_or(0),
        };
        let outputs = Totals {
            count: self.psbt.unsigned_tx.output.len(),
            value: self.psbt.output_amount(),
        };

        PlanSummary {
            inputs,
            outputs,
            fee: inputs.value.saturating_sub(outputs.value),
        }
    }

    /// Serialize the PSBT as base64, the format wallets expect
    pub fn to_base64(&self) -> String {
        self.psbt.to_string()
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use bitcoin::absolute::LockTime;
    use bitcoin::transaction::Version;
    use bitcoin::{Amount, OutPoint, ScriptBuf, Sequence, TxIn, Txid, Witness};

    use super::*;

    fn tx(inputs: usize, outputs: &[u64]) -> Transaction {
        let txid =
            Txid::from_str("4444444444444444444444444444444444444444444444444444444444444444")
                .unwrap();
        Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: (0..inputs)
                .map(|vout| TxIn {
                    previous_output: OutPoint::new(txid, vout as u32),
                    script_sig: ScriptBuf::new(),
                    sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
                    witness: Witness::new(),
                })
                .collect(),
            output: outputs
                .iter()
                .map(|value| TxOut {
                    value: Amount::from_sat(*value),
                    script_pubkey: ScriptBuf::new(),
                })
                .collect(),
        }
    }

    fn prevout(value: u64) -> TxOut {
        TxOut {
            value: Amount::from_sat(value),
            script_pubkey: ScriptBuf::new(),
        }
    }

    #[test]
    fn test_plan_summary() {
        let plan = UnsignedPlan::new(
            tx(2, &[30_000, 15_000]),
            vec![prevout(25_000), prevout(21_000)],
        )
        .unwrap();

        assert_eq!(plan.implied_fee(), 1_000);
        assert_eq!(
            plan.summary(),
            PlanSummary {
                inputs: Totals {
                    count: 2,
                    value: 46_000
                },
                outputs: Totals {
                    count: 2,
                    value: 45_000
                },
                fee: 1_000,
            }
        );
        assert_eq!(plan.output_values(), vec![30_000, 15_000]);
    }

    #[test]
    fn test_plan_rejects_negative_fee() {
        let res = UnsignedPlan::new(tx(1, &[10_001]), vec![prevout(10_000)]);
        assert!(matches!(
            res,
            Err(Error::InsufficientFunds {
                needed: 10_001,
                available: 10_000
            })
        ));
    }

    #[test]
    fn test_plan_rejects_missing_prevouts() {
        let res = UnsignedPlan::new(tx(2, &[1_000]), vec![prevout(10_000)]);
        assert!(matches!(res, Err(Error::Generic(_))));
    }

    #[test]
    fn test_plan_base64_roundtrip() {
        let plan = UnsignedPlan::new(tx(1, &[9_000]), vec![prevout(10_000)]).unwrap();
        let parsed = Psbt::from_str(&plan.to_base64()).unwrap();
        assert_eq!(&parsed, plan.psbt());
    }

    #[test]
    fn test_get_utxo_for_non_witness() {
        let prev = tx(1, &[5_000, 7_000]);
        let mut spend = tx(1, &[6_000]);
        spend.input[0].previous_output = OutPoint::new(prev.compute_txid(), 1);

        let mut psbt = Psbt::from_unsigned_tx(spend).unwrap();
        assert_eq!(psbt.get_utxo_for(0), None);
        assert_eq!(psbt.fee_amount(), None);

        psbt.inputs[0].non_witness_utxo = Some(prev);
        assert_eq!(psbt.get_utxo_for(0).unwrap().value.to_sat(), 7_000);
        assert_eq!(psbt.fee_amount(), Some(1_000));
        assert_eq!(psbt.get_utxo_for(1), None);
    }
}
