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

//! Wallet UTXOs
//!
//! Extra funding for hybrid CPFP comes from the wallet's spendable outputs as reported by the
//! balance indexer. Small outputs are never used: they cost about as much to spend as they're
//! worth.

use std::collections::HashSet;

use bitcoin::OutPoint;

#[allow(unused_imports)]
use log::{debug, error, info, trace};

use crate::address::normalize;
use crate::blockchain::{Blockchain, IndexedOutput, UtxoIndex};
use crate::config::FeePolicy;
use crate::error::Error;
use crate::types::UtxoCandidate;

/// Drop outputs worth [`FeePolicy::min_utxo_value`] or less and those in `excluded`, then sort
/// the rest by value, largest first
pub fn filter_candidates(
    policy: &FeePolicy,
    outputs: Vec<IndexedOutput>,
    excluded: &HashSet<OutPoint>,
) -> Vec<UtxoCandidate> {
    let mut candidates = outputs
        .into_iter()
        .filter(|output| output.value > policy.min_utxo_value)
        .filter(|output| !excluded.contains(&output.outpoint))
        .map(|output| UtxoCandidate::from((output.outpoint, output.value)))
        .collect::<Vec<_>>();
    candidates.sort_by(|a, b| b.value.cmp(&a.value));

    candidates
}

/// Pick candidates starting from the largest until their total reaches `amount_needed`
///
/// Fails with [`Error::InsufficientFunds`] if all of them together are not enough.
pub fn select_largest_first(
    mut candidates: Vec<UtxoCandidate>,
    amount_needed: u64,
) -> Result<Vec<UtxoCandidate>, Error> {
    candidates.sort_unstable_by_key(|utxo| utxo.value);

    let mut selected_amount = 0;
    let selected = candidates
        .into_iter()
        .rev()
        .scan(&mut selected_amount, |selected_amount, utxo| {
            if **selected_amount < amount_needed {
                **selected_amount += utxo.value;
                debug!("Selected {}, total {}", utxo.outpoint(), selected_amount);
                Some(utxo)
            } else {
                None
            }
        })
        .collect::<Vec<_>>();

    if selected_amount < amount_needed {
        return Err(Error::InsufficientFunds {
            needed: amount_needed,
            available: selected_amount,
        });
    }

    Ok(selected)
}

impl<B, I> super::Accelerator<B, I>
where
    B: Blockchain,
    I: UtxoIndex,
{
    /// Spendable outputs of `address`, largest first, skipping dust and `excluded`
    pub fn fetch_spendable(
        &self,
        address: &str,
        excluded: &HashSet<OutPoint>,
    ) -> Result<Vec<UtxoCandidate>, Error> {
        self.parse_address(address)?;

        let outputs = self.indexer.list_outputs(&normalize(address))?;
        let total = outputs.len();
        let candidates = filter_candidates(&self.policy, outputs, excluded);
        debug!(
            "{}: {} spendable outputs out of {}",
            address,
            candidates.len(),
            total
        );

        Ok(candidates)
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use super::*;

    fn output(vout: u32, value: u64) -> IndexedOutput {
        IndexedOutput {
            outpoint: OutPoint::from_str(&format!(
                "8888888888888888888888888888888888888888888888888888888888888888:{}",
                vout
            ))
            .unwrap(),
            value,
        }
    }

    #[test]
    fn test_filter_candidates() {
        let outputs = vec![
            output(0, 800),
            output(1, 5_000),
            output(2, 801),
            output(3, 20_000),
            output(4, 10_000),
        ];
        let excluded = vec![output(4, 0).outpoint].into_iter().collect();
        let candidates = filter_candidates(&FeePolicy::default(), outputs, &excluded);

        assert_eq!(
            candidates.iter().map(|c| c.value).collect::<Vec<_>>(),
            vec![20_000, 5_000, 801]
        );
    }

    #[test]
    fn test_select_largest_first() {
        let candidates = vec![
            UtxoCandidate::from((output(0, 0).outpoint, 1_000)),
            UtxoCandidate::from((output(1, 0).outpoint, 5_000)),
            UtxoCandidate::from((output(2, 0).outpoint, 3_000)),
        ];

        let selected = select_largest_first(candidates.clone(), 6_000).unwrap();
        assert_eq!(
            selected.iter().map(|c| c.value).collect::<Vec<_>>(),
            vec![5_000, 3_000]
        );

        assert!(select_largest_first(candidates.clone(), 0).unwrap().is_empty());

        let err = select_largest_first(candidates, 10_000).unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientFunds {
                needed: 10_000,
                available: 9_000
            }
        ));
        assert_eq!(err.shortfall(), Some(1_000));
    }
}
