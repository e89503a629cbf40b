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

//! Transaction analyzer
//!
//! Looks at a transaction from the point of view of a wallet and tells which strategies can
//! accelerate it. Unsuitable transactions (confirmed, unknown, partially owned) are not errors:
//! the report simply has every capability flag set to `false`.

use serde::{Deserialize, Serialize};

#[allow(unused_imports)]
use log::{debug, error, info, trace};

use crate::blockchain::{Blockchain, UtxoIndex};
use crate::config::FeePolicy;
use crate::error::Error;
use crate::types::{FeeEstimate, FeeRate, Strategy, TransactionSnapshot};

use super::{check_fee_rate, fee, parse_txid, Accelerator};

/// What can be done for a transaction
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    /// Every input is controlled by the wallet
    pub wallet_controls_all_inputs: bool,
    /// Index of the first unspent output paying to the wallet
    pub user_output: Option<usize>,
    /// Fee rate the analysis aims for
    pub target_fee_rate: Option<FeeRate>,
    /// Fee to add on top of the current one to reach the target by replacement (sats)
    pub required_rbf_fee: u64,
    /// What the wallet's unspent outputs can give up without becoming dust (sats)
    pub available_rbf_liquidity: u64,
    /// A replacement funded by the wallet's change is possible
    pub can_rbf: bool,
    /// A child spending only the user output can pay for the package
    pub can_simple_cpfp: bool,
    /// A child spending the user output plus extra wallet UTXOs is possible
    pub can_hybrid_cpfp: bool,
    /// Best strategy, by priority RBF, CPFP, hybrid CPFP
    pub recommended_strategy: Strategy,
}

impl Analysis {
    fn nothing_to_do() -> Self {
        Analysis {
            wallet_controls_all_inputs: false,
            user_output: None,
            target_fee_rate: None,
            required_rbf_fee: 0,
            available_rbf_liquidity: 0,
            can_rbf: false,
            can_simple_cpfp: false,
            can_hybrid_cpfp: false,
            recommended_strategy: Strategy::None,
        }
    }
}

/// Output of [`Accelerator::analyze`]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    /// The transaction as seen by the provider
    pub snapshot: TransactionSnapshot,
    /// Child fee needed to reach the target, when there's a user output to spend
    pub fee_estimate: Option<FeeEstimate>,
    /// Capabilities and recommendation
    pub analysis: Analysis,
}

/// Decide what can be done for `snapshot`, without any I/O
pub fn evaluate(
    policy: &FeePolicy,
    snapshot: &TransactionSnapshot,
    target: Option<FeeRate>,
) -> (Analysis, Option<FeeEstimate>) {
    if snapshot.vsize == 0 {
        return (Analysis::nothing_to_do(), None);
    }

    let wallet_controls_all_inputs = snapshot.wallet_controls_all_inputs();
    let target = target.unwrap_or_else(|| policy.default_target(snapshot.fee_rate));

    let required_rbf_fee = target.fee_vb(snapshot.vsize).saturating_sub(snapshot.fee);
    let available_rbf_liquidity = snapshot
        .outputs
        .iter()
        .filter(|o| o.belongs_to_wallet && !o.spent)
        .map(|o| o.value.saturating_sub(policy.dust_limit))
        .sum::<u64>();

    let user_output = snapshot.user_output();
    let fee_estimate = user_output.and_then(|output| {
        fee::estimate(
            policy,
            snapshot.fee,
            snapshot.vsize,
            output.value,
            Some(target),
            None,
        )
        .ok()
    });

    let unconfirmed = snapshot.is_unconfirmed();
    let can_rbf = unconfirmed
        && snapshot.opt_in_rbf
        && wallet_controls_all_inputs
        && required_rbf_fee > 0
        && available_rbf_liquidity >= required_rbf_fee;
    let can_simple_cpfp = unconfirmed
        && match (user_output, &fee_estimate) {
            (Some(output), Some(estimate)) => {
                output.value.saturating_sub(policy.dust_limit) >= estimate.recommended_child_fee
            }
            _ => false,
        };
    let can_hybrid_cpfp = unconfirmed && user_output.is_some();

    let recommended_strategy = if can_rbf {
        Strategy::Rbf
    } else if can_simple_cpfp {
        Strategy::Cpfp
    } else if can_hybrid_cpfp {
        Strategy::HybridCpfp
    } else {
        Strategy::None
    };

    let analysis = Analysis {
        wallet_controls_all_inputs,
        user_output: user_output.map(|o| o.index),
        target_fee_rate: Some(target),
        required_rbf_fee,
        available_rbf_liquidity,
        can_rbf,
        can_simple_cpfp,
        can_hybrid_cpfp,
        recommended_strategy,
    };

    (analysis, fee_estimate)
}

impl<B, I> Accelerator<B, I>
where
    B: Blockchain,
    I: UtxoIndex,
{
    /// Analyze `txid` against the given wallet addresses, aiming for the default target rate
    pub fn analyze(&self, txid: &str, wallet: &[String]) -> Result<AnalysisReport, Error> {
        self.analyze_with_target(txid, wallet, None)
    }

    /// Analyze `txid` against the given wallet addresses, aiming for `target` if given
    ///
    /// An unknown transaction is reported with a `not_found` status and no capability.
    pub fn analyze_with_target(
        &self,
        txid: &str,
        wallet: &[String],
        target: Option<FeeRate>,
    ) -> Result<AnalysisReport, Error> {
        let txid = parse_txid(txid)?;
        let wallet = self.wallet_set(wallet)?;
        let target = target.map(check_fee_rate).transpose()?;

        let snapshot = match self.snapshot(&txid, &wallet)? {
            Some(snapshot) => snapshot,
            None => {
                debug!("{} not found", txid);
                return Ok(AnalysisReport {
                    snapshot: TransactionSnapshot::not_found(txid),
                    fee_estimate: None,
                    analysis: Analysis::nothing_to_do(),
                });
            }
        };

        let (analysis, fee_estimate) = evaluate(&self.policy, &snapshot, target);
        info!(
            "{}: {:?} ({}, {} vB at {})",
            txid, analysis.recommended_strategy, snapshot.fee, snapshot.vsize, snapshot.fee_rate
        );

        Ok(AnalysisReport {
            snapshot,
            fee_estimate,
            analysis,
        })
    }
}
