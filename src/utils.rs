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

/// Trait to check if a value is below the dust limit
// we implement this trait to make sure we don't mess up the comparison with off-by-one like a <
// instead of a <= etc. An output of exactly `dust_limit` sats is *not* dust.
pub trait IsDust {
    /// Check whether or not a value is below dust limit
    fn is_dust(&self, dust_limit: u64) -> bool;
}

impl IsDust for u64 {
    fn is_dust(&self, dust_limit: u64) -> bool {
        *self < dust_limit
    }
}

// f64 products like `150 * (1000 / 150)` land a hair above the integer they represent, don't let
// that cost an extra sat.
const FEE_ROUNDING_EPSILON: f64 = 1e-6;

/// Round a fractional fee up to the next satoshi
pub(crate) fn ceil_fee(fee: f64) -> u64 {
    if !fee.is_finite() || fee <= 0.0 {
        return 0;
    }

    (fee - FEE_ROUNDING_EPSILON).ceil().max(0.0) as u64
}
