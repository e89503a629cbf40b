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

//! Child-pays-for-parent
//!
//! The child always spends the chosen parent output as input #0 and pays to the same address as
//! output #0. Extra wallet UTXOs, when given, follow as inputs #1..N and any leftover goes back to
//! the wallet as a change output.
//!
//! Outputs that carry an inscription are usually small: when the anchor is preserved output #0
//! keeps its exact value and the whole fee is taken from the extra UTXOs. Otherwise output #0
//! covers whatever part of the fee the extra UTXOs don't.

use std::collections::HashSet;

use bitcoin::absolute::LockTime;
use bitcoin::transaction::Version;
use bitcoin::{Amount, OutPoint, ScriptBuf, Transaction, TxIn, TxOut, Witness};
use serde::{Deserialize, Serialize};

#[allow(unused_imports)]
use log::{debug, error, info, trace};

use crate::address::normalize;
use crate::blockchain::{Blockchain, UtxoIndex};
use crate::config::FeePolicy;
use crate::error::Error;
use crate::psbt::signing::SigningKeys;
use crate::psbt::UnsignedPlan;
use crate::types::{FeeEstimate, FeeRate, Strategy, UtxoCandidate};
use crate::utils::IsDust;

use super::rbf::check_new_fee;
use super::utxo::select_largest_first;
use super::{check_fee_rate, fee, parse_txid, Accelerator};

/// What the child spends and how much fee it pays
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CpfpParams {
    /// The unconfirmed parent
    pub parent_txid: String,
    /// Index of the parent output to spend
    pub output_index: u32,
    /// Value of that output (sats)
    pub output_value: u64,
    /// Address that output pays to, it receives output #0 of the child
    pub output_address: String,
    /// Wallet address that controls the additional UTXOs and receives the change
    pub user_address: String,
    /// Fee the child pays (sats)
    pub child_fee: u64,
    /// Extra wallet UTXOs funding the fee
    #[serde(default)]
    pub additional_utxos: Vec<UtxoCandidate>,
    /// Keep output #0 at exactly `output_value`
    #[serde(default)]
    pub preserve_anchor_value: bool,
}

/// Values of the child outputs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildOutputs {
    /// Output #0, paying to the address of the spent output
    pub kept: u64,
    /// Change back to the wallet, if it's not dust
    pub change: Option<u64>,
    /// Actual fee, including dust change merged into it
    pub fee: u64,
}

/// Split the child's inputs between output #0, the change and the fee
///
/// `extra` is the total value of the additional UTXOs. Unless it's preserved, output #0 must stay
/// above the dust limit.
pub fn child_outputs(
    policy: &FeePolicy,
    output_value: u64,
    extra: u64,
    child_fee: u64,
    preserve_anchor: bool,
) -> Result<ChildOutputs, Error> {
    let (kept, change) = if preserve_anchor {
        if extra < child_fee {
            return Err(Error::InsufficientFunds {
                needed: child_fee,
                available: extra,
            });
        }

        (output_value, extra - child_fee)
    } else {
        let from_extra = extra.min(child_fee);
        let shrink = child_fee - from_extra;
        // output #0 alone can't pay what's left of the fee and stay above dust
        if shrink >= output_value {
            return Err(Error::InsufficientFunds {
                needed: child_fee + policy.dust_limit,
                available: extra + output_value,
            });
        }

        let kept = output_value - shrink;
        if kept.is_dust(policy.dust_limit) {
            return Err(Error::OutputBelowDustLimit {
                index: 0,
                value: kept,
                limit: policy.dust_limit,
            });
        }

        (kept, extra - from_extra)
    };

    let (change, fee) = match change {
        0 => (None, child_fee),
        change if change.is_dust(policy.dust_limit) => {
            debug!("change of {} sat is dust, merged into the fee", change);
            (None, child_fee + change)
        }
        change => (Some(change), child_fee),
    };

    Ok(ChildOutputs { kept, change, fee })
}

/// Output of [`Accelerator::accelerate_cpfp`]
#[derive(Debug, Clone)]
pub struct CpfpPlan {
    /// [`Strategy::Cpfp`] or [`Strategy::HybridCpfp`]
    pub strategy: Strategy,
    /// The estimate the child fee comes from
    pub fee_estimate: FeeEstimate,
    /// Wallet UTXOs added to fund the fee
    pub additional_utxos: Vec<UtxoCandidate>,
    /// The child transaction
    pub plan: UnsignedPlan,
}

impl<B, I> Accelerator<B, I>
where
    B: Blockchain,
    I: UtxoIndex,
{
    /// Build a child spending output `params.output_index` of `params.parent_txid`
    ///
    /// The parent must be unconfirmed and the output unspent, paying `params.output_value` sats to
    /// `params.output_address`. Every additional UTXO is checked against its own transaction and
    /// must pay to `params.user_address`.
    pub fn build_cpfp(
        &self,
        params: &CpfpParams,
        keys: &SigningKeys,
    ) -> Result<UnsignedPlan, Error> {
        let parent_txid = parse_txid(&params.parent_txid)?;
        let output_address = self.parse_address(&params.output_address)?;
        let user_address = self.parse_address(&params.user_address)?;
        if params.output_value == 0 {
            return Err(Error::InvalidAmount("output value must be positive".into()));
        }
        if params.child_fee == 0 {
            return Err(Error::InvalidAmount("child fee must be positive".into()));
        }

        let parent_outpoint = OutPoint::new(parent_txid, params.output_index);
        let mut seen = HashSet::new();
        seen.insert(parent_outpoint);
        for utxo in &params.additional_utxos {
            if utxo.value == 0 {
                return Err(Error::InvalidAmount(format!(
                    "UTXO {} has no value",
                    utxo.outpoint()
                )));
            }
            if !seen.insert(utxo.outpoint()) {
                return Err(Error::InvalidOutpoint(utxo.outpoint()));
            }
        }

        let wallet = vec![
            normalize(&params.output_address),
            normalize(&params.user_address),
        ]
        .into_iter()
        .collect::<HashSet<_>>();
        let parent = self
            .snapshot(&parent_txid, &wallet)?
            .ok_or(Error::TransactionNotFound(parent_txid))?;
        if parent.confirmed() {
            return Err(Error::TransactionConfirmed(parent_txid));
        }

        let output = parent
            .outputs
            .get(params.output_index as usize)
            .ok_or(Error::InvalidOutpoint(parent_outpoint))?;
        if output.spent {
            return Err(Error::OutputSpent(parent_outpoint));
        }
        if output.script_pubkey != output_address.script_pubkey() {
            return Err(Error::PrevoutMismatch {
                outpoint: parent_outpoint,
                expected: params.output_address.clone(),
                found: output
                    .address
                    .clone()
                    .unwrap_or_else(|| output.script_pubkey.to_hex_string()),
            });
        }
        if output.value != params.output_value {
            return Err(Error::PrevoutMismatch {
                outpoint: parent_outpoint,
                expected: format!("{} sat", params.output_value),
                found: format!("{} sat", output.value),
            });
        }

        let extra = params
            .additional_utxos
            .iter()
            .map(|utxo| utxo.value)
            .sum::<u64>();
        let outputs = child_outputs(
            &self.policy,
            params.output_value,
            extra,
            params.child_fee,
            params.preserve_anchor_value,
        )?;

        let spent = std::iter::once((parent_outpoint, params.output_value))
            .chain(
                params
                    .additional_utxos
                    .iter()
                    .map(|utxo| (utxo.outpoint(), utxo.value)),
            )
            .collect::<Vec<_>>();
        let user_script = user_address.script_pubkey();
        let inputs = self
            .fetch_prevouts(&spent)?
            .into_iter()
            .enumerate()
            .map(|(index, input)| {
                let (address, script) = match index {
                    0 => (&params.output_address, output_address.script_pubkey()),
                    _ => (&params.user_address, user_script.clone()),
                };
                if input.prevout.script_pubkey != script {
                    return Err(Error::PrevoutMismatch {
                        outpoint: input.outpoint,
                        expected: address.clone(),
                        found: input.prevout.script_pubkey.to_hex_string(),
                    });
                }

                Ok(input.with_address(Some(normalize(address))))
            })
            .collect::<Result<Vec<_>, Error>>()?;

        let mut output = vec![TxOut {
            value: Amount::from_sat(outputs.kept),
            script_pubkey: output_address.script_pubkey(),
        }];
        if let Some(change) = outputs.change {
            output.push(TxOut {
                value: Amount::from_sat(change),
                script_pubkey: user_script,
            });
        }

        let tx = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: inputs
                .iter()
                .map(|input| TxIn {
                    previous_output: input.outpoint,
                    script_sig: ScriptBuf::new(),
                    sequence: FeePolicy::RBF_SEQUENCE,
                    witness: Witness::new(),
                })
                .collect(),
            output,
        };
        let plan = self.finish_plan(tx, inputs, keys)?;
        check_new_fee(&plan, outputs.fee)?;

        info!(
            "CPFP child of {}:{}: {} extra inputs, fee {} sat",
            parent_txid,
            params.output_index,
            params.additional_utxos.len(),
            outputs.fee
        );

        Ok(plan)
    }

    /// Analyze `txid`, estimate the child fee and build the child in one go
    ///
    /// The first unspent output of the parent paying to `wallet` is spent. If it can't pay the fee
    /// on its own, UTXOs of `funding_address` not in `excluded` are added, largest first.
    pub fn accelerate_cpfp(
        &self,
        txid: &str,
        wallet: &[String],
        funding_address: &str,
        target: Option<FeeRate>,
        excluded: &HashSet<OutPoint>,
        keys: &SigningKeys,
    ) -> Result<CpfpPlan, Error> {
        let parent_txid = parse_txid(txid)?;
        let wallet = self.wallet_set(wallet)?;
        self.parse_address(funding_address)?;
        let target = target.map(check_fee_rate).transpose()?;

        let parent = self
            .snapshot(&parent_txid, &wallet)?
            .ok_or(Error::TransactionNotFound(parent_txid))?;
        if parent.confirmed() {
            return Err(Error::TransactionConfirmed(parent_txid));
        }
        let output = parent
            .user_output()
            .ok_or(Error::NoWalletOutput(parent_txid))?;
        let output_address = output
            .address
            .clone()
            .ok_or(Error::NoWalletOutput(parent_txid))?;

        let fee_estimate = fee::estimate(
            &self.policy,
            parent.fee,
            parent.vsize,
            output.value,
            target,
            None,
        )?;
        let preserve_anchor = self.policy.is_anchor(output.value);
        let child_fee = fee_estimate.recommended_child_fee;
        let from_output = if preserve_anchor {
            0
        } else {
            output.value.saturating_sub(self.policy.dust_limit)
        };

        let (strategy, additional_utxos) = if from_output >= child_fee {
            (Strategy::Cpfp, vec![])
        } else {
            let mut excluded = excluded.clone();
            excluded.insert(OutPoint::new(parent_txid, output.index as u32));

            let candidates = self.fetch_spendable(funding_address, &excluded)?;
            let selected = select_largest_first(candidates, child_fee - from_output)?;
            (Strategy::HybridCpfp, selected)
        };
        debug!(
            "{:?} for {}: child fee {} sat, {} extra UTXOs",
            strategy,
            parent_txid,
            child_fee,
            additional_utxos.len()
        );

        let params = CpfpParams {
            parent_txid: parent_txid.to_string(),
            output_index: output.index as u32,
            output_value: output.value,
            output_address,
            user_address: normalize(funding_address),
            child_fee,
            additional_utxos: additional_utxos.clone(),
            preserve_anchor_value: preserve_anchor,
        };
        let plan = self.build_cpfp(&params, keys)?;

        Ok(CpfpPlan {
            strategy,
            fee_estimate,
            additional_utxos,
            plan,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_shrink_output_without_change() {
        let outputs = child_outputs(&FeePolicy::default(), 1_000, 0, 400, false).unwrap();
        assert_eq!(
            outputs,
            ChildOutputs {
                kept: 600,
                change: None,
                fee: 400
            }
        );
    }

    #[test]
    fn test_preserved_anchor_with_change() {
        let outputs = child_outputs(&FeePolicy::default(), 330, 2_000, 500, true).unwrap();
        assert_eq!(
            outputs,
            ChildOutputs {
                kept: 330,
                change: Some(1_500),
                fee: 500
            }
        );
    }

    #[test]
    fn test_dust_change_is_merged_into_fee() {
        let outputs = child_outputs(&FeePolicy::default(), 330, 1_000, 600, true).unwrap();
        assert_eq!(
            outputs,
            ChildOutputs {
                kept: 330,
                change: None,
                fee: 1_000
            }
        );
    }

    #[test]
    fn test_extra_funds_are_used_first() {
        let outputs = child_outputs(&FeePolicy::default(), 10_000, 1_500, 2_000, false).unwrap();
        assert_eq!(
            outputs,
            ChildOutputs {
                kept: 9_500,
                change: None,
                fee: 2_000
            }
        );
    }

    #[test]
    fn test_preserved_anchor_shortfall() {
        let err = child_outputs(&FeePolicy::default(), 330, 400, 546, true).unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientFunds {
                needed: 546,
                available: 400
            }
        ));
        assert_eq!(err.shortfall(), Some(146));
    }

    #[test]
    fn test_output_would_become_dust() {
        let err = child_outputs(&FeePolicy::default(), 1_000, 0, 500, false).unwrap_err();
        assert!(matches!(
            err,
            Error::OutputBelowDustLimit {
                index: 0,
                value: 500,
                limit: 546
            }
        ));
        assert_eq!(err.shortfall(), Some(46));
    }

    #[test]
    fn test_fee_larger_than_output() {
        let err = child_outputs(&FeePolicy::default(), 1_000, 0, 5_000, false).unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientFunds {
                needed: 5_546,
                available: 1_000
            }
        ));
        assert_eq!(err.shortfall(), Some(4_546));

        let err = child_outputs(&FeePolicy::default(), 1_000, 300, 5_000, false).unwrap_err();
        assert_eq!(err.shortfall(), Some(4_246));
    }

    #[test]
    fn test_unpreserved_dust_output_is_refused() {
        // the extra UTXO covers the whole fee but output #0 is already dust
        let err = child_outputs(&FeePolicy::default(), 330, 2_000, 500, false).unwrap_err();
        assert!(matches!(
            err,
            Error::OutputBelowDustLimit {
                index: 0,
                value: 330,
                limit: 546
            }
        ));
        assert_eq!(err.shortfall(), Some(216));
    }
}
