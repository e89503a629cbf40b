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

//! Child fee estimation
//!
//! The child is never built to be measured: its size is assumed to be
//! [`FeePolicy::child_vsize`] vbytes (one input, up to two outputs). A child that ends up with
//! more inputs is larger than assumed, so the package rate it achieves is slightly lower than
//! [`FeeEstimate::recommended_combined_fee_rate`].

#[allow(unused_imports)]
use log::{debug, error, info, trace};

use crate::blockchain::{Blockchain, UtxoIndex};
use crate::config::FeePolicy;
use crate::error::Error;
use crate::types::{FeeEstimate, FeeRate};

use super::{check_fee_rate, Accelerator};

/// Compute the fee a child spending an output worth `output_value` must pay so that the package
/// reaches `target` (default: [`FeePolicy::fee_rate_multiplier`] times the parent rate)
///
/// With `preserve_anchor` (default: `output_value` is an anchor, see [`FeePolicy::is_anchor`]) the
/// spent output keeps its value, so the child fee can't be smaller than the dust limit: it has to
/// fund a change output of its own.
pub fn estimate(
    policy: &FeePolicy,
    parent_fee: u64,
    parent_size: u64,
    output_value: u64,
    target: Option<FeeRate>,
    preserve_anchor: Option<bool>,
) -> Result<FeeEstimate, Error> {
    if parent_fee == 0 {
        return Err(Error::InvalidAmount("parent fee must be positive".into()));
    }
    if parent_size == 0 {
        return Err(Error::InvalidAmount("parent size must be positive".into()));
    }
    if output_value == 0 {
        return Err(Error::InvalidAmount("output value must be positive".into()));
    }

    let parent_fee_rate = FeeRate::from_vb(parent_fee, parent_size);
    let target = match target {
        Some(rate) => check_fee_rate(rate)?,
        None => policy.default_target(parent_fee_rate),
    };
    let preserve_anchor = preserve_anchor.unwrap_or_else(|| policy.is_anchor(output_value));
    let min_child_fee = if preserve_anchor {
        policy.dust_limit
    } else {
        policy.nominal_min_child_fee
    };

    let package_size = parent_size + policy.child_vsize;
    let child_fee = target
        .fee_vb(package_size)
        .saturating_sub(parent_fee)
        .max(min_child_fee);
    let total_fee = parent_fee + child_fee;

    debug!(
        "child fee {} sat for a {} vB package at {}",
        child_fee, package_size, target
    );

    Ok(FeeEstimate {
        parent_fee,
        parent_size,
        parent_fee_rate,
        child_size: policy.child_vsize,
        recommended_child_fee: child_fee,
        recommended_total_fee: total_fee,
        recommended_combined_fee_rate: FeeRate::from_vb(total_fee, package_size),
        user_receives: output_value.saturating_sub(child_fee),
    })
}

impl<B, I> Accelerator<B, I>
where
    B: Blockchain,
    I: UtxoIndex,
{
    /// [`estimate`] with the engine's fee policy
    pub fn estimate_fee(
        &self,
        parent_fee: u64,
        parent_size: u64,
        output_value: u64,
        target: Option<FeeRate>,
        preserve_anchor: Option<bool>,
    ) -> Result<FeeEstimate, Error> {
        estimate(
            &self.policy,
            parent_fee,
            parent_size,
            output_value,
            target,
            preserve_anchor,
        )
    }
}
