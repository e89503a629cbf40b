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

//! Address classification
//!
//! Figures out the output script type behind an address string so that builders know which
//! signing metadata an input needs. Cheap prefix checks are tried first (the human-readable part
//! of bech32 addresses, the leading character of base58 ones), then a full base58check decode and
//! finally a full bech32 decode.
//!
//! Prefix sniffing is approximate by nature, that's why the result is a [`Classification`] that
//! callers have to match on: an [`Unknown`](Classification::Unknown) address never gets a guessed
//! type.

use std::fmt;

use bitcoin::base58;
use bitcoin::bech32;
use serde::{Deserialize, Serialize};

/// Output script types the engine knows how to prepare for signing
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ScriptType {
    /// Pay to taproot (segwit v1)
    P2tr,
    /// Pay to witness public key hash (segwit v0)
    P2wpkh,
    /// Pay to script hash, assumed to wrap a P2WPKH
    P2sh,
    /// Legacy pay to public key hash
    P2pkh,
}

impl ScriptType {
    /// Whether spending this type commits to the previous output amount (BIP143/BIP341)
    pub fn is_witness(&self) -> bool {
        !matches!(self, ScriptType::P2pkh)
    }
}

impl fmt::Display for ScriptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScriptType::P2tr => "p2tr",
            ScriptType::P2wpkh => "p2wpkh",
            ScriptType::P2sh => "p2sh",
            ScriptType::P2pkh => "p2pkh",
        };
        write!(f, "{}", s)
    }
}

/// Result of [`classify`]
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase", tag = "status", content = "type")]
pub enum Classification {
    /// The address maps to a supported script type
    Known(ScriptType),
    /// The address couldn't be classified
    Unknown,
}

impl Classification {
    /// The script type, if known
    pub fn script_type(&self) -> Option<ScriptType> {
        match self {
            Classification::Known(t) => Some(*t),
            Classification::Unknown => None,
        }
    }
}

const SEGWIT_HRPS: [&str; 3] = ["bc1", "tb1", "bcrt1"];

// Base58 version bytes: mainnet then testnet/signet/regtest
const P2PKH_VERSIONS: [u8; 2] = [0x00, 0x6f];
const P2SH_VERSIONS: [u8; 2] = [0x05, 0xc4];

/// Classify an address by its script type
///
/// This is a pure function of the string: the network isn't checked here.
pub fn classify(address: &str) -> Classification {
    let address = address.trim();
    if address.is_empty() {
        return Classification::Unknown;
    }

    if let Some(script_type) = classify_prefix(address) {
        return Classification::Known(script_type);
    }

    classify_base58(address)
        .or_else(|| classify_bech32(address))
        .map(Classification::Known)
        .unwrap_or(Classification::Unknown)
}

/// Canonical form of an address for comparisons: bech32 addresses are case-insensitive and get
/// lowercased, base58 ones are kept as they are
pub fn normalize(address: &str) -> String {
    let address = address.trim();
    let lower = address.to_ascii_lowercase();
    if SEGWIT_HRPS.iter().any(|hrp| lower.starts_with(hrp)) {
        lower
    } else {
        address.to_string()
    }
}

fn classify_prefix(address: &str) -> Option<ScriptType> {
    let lower = address.to_ascii_lowercase();
    for hrp in SEGWIT_HRPS.iter() {
        if let Some(rest) = lower.strip_prefix(hrp) {
            // `bc1q` also covers P2WSH, which has a 32 bytes program and a longer address
            return match rest.chars().next() {
                Some('p') => Some(ScriptType::P2tr),
                Some('q') if rest.len() == 39 => Some(ScriptType::P2wpkh),
                _ => None,
            };
        }
    }

    if !looks_like_base58(address) {
        return None;
    }
    match address.chars().next() {
        Some('1') | Some('m') | Some('n') => Some(ScriptType::P2pkh),
        Some('3') | Some('2') => Some(ScriptType::P2sh),
        _ => None,
    }
}

// P2PKH and P2SH addresses encode 25 bytes: 26 to 35 base58 characters
fn looks_like_base58(address: &str) -> bool {
    (26..=35).contains(&address.len())
        && address
            .chars()
            .all(|c| c.is_ascii_alphanumeric() && !matches!(c, '0' | 'O' | 'I' | 'l'))
}

fn classify_base58(address: &str) -> Option<ScriptType> {
    let data = base58::decode_check(address).ok()?;
    if data.len() != 21 {
        return None;
    }

    match data[0] {
        v if P2PKH_VERSIONS.contains(&v) => Some(ScriptType::P2pkh),
        v if P2SH_VERSIONS.contains(&v) => Some(ScriptType::P2sh),
        _ => None,
    }
}

fn classify_bech32(address: &str) -> Option<ScriptType> {
    let (_hrp, version, program) = bech32::segwit::decode(address).ok()?;

    match (version.to_u8(), program.len()) {
        (0, 20) => Some(ScriptType::P2wpkh),
        (1, 32) => Some(ScriptType::P2tr),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_classify_prefixes() {
        assert_eq!(
            classify("bc1p5d7rjq7g6rdk2yhzks9smlaqtedr4dekq08ge8ztwac72sfr9rusxg3297"),
            Classification::Known(ScriptType::P2tr)
        );
        assert_eq!(
            classify("bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq"),
            Classification::Known(ScriptType::P2wpkh)
        );
        assert_eq!(
            classify("tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx"),
            Classification::Known(ScriptType::P2wpkh)
        );
        assert_eq!(
            classify("3J98t1WpEZ73CNmQviecrnyiWrnqRhWNLy"),
            Classification::Known(ScriptType::P2sh)
        );
        assert_eq!(
            classify("1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2"),
            Classification::Known(ScriptType::P2pkh)
        );
        assert_eq!(
            classify("mipcBbFg9gMiCh81Kj8tqqdgoZub1ZJRfn"),
            Classification::Known(ScriptType::P2pkh)
        );
    }

    #[test]
    fn test_classify_p2wsh_is_unknown() {
        assert_eq!(
            classify("bc1qrp33g0q5c5txsp9arysrx4k6zdkfs4nce4xj0gdcccefvpysxf3qccfmv3"),
            Classification::Unknown
        );
    }

    #[test]
    fn test_classify_garbage() {
        assert_eq!(classify(""), Classification::Unknown);
        assert_eq!(classify("   "), Classification::Unknown);
        assert_eq!(classify("not-an-address"), Classification::Unknown);
        assert_eq!(classify("bc1zw508d6qejxtdg4y5r3zarvaryvqyzf3du"), Classification::Unknown);
    }

    #[test]
    fn test_classify_is_idempotent() {
        for addr in &[
            "bc1p5d7rjq7g6rdk2yhzks9smlaqtedr4dekq08ge8ztwac72sfr9rusxg3297",
            "3J98t1WpEZ73CNmQviecrnyiWrnqRhWNLy",
            "garbage",
        ] {
            assert_eq!(classify(addr), classify(addr));
        }
    }

    #[test]
    fn test_normalize() {
        assert_eq!(
            normalize(" BC1QAR0SRRR7XFKVY5L643LYDNW9RE59GTZZWF5MDQ "),
            "bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq"
        );
        assert_eq!(
            normalize("3J98t1WpEZ73CNmQviecrnyiWrnqRhWNLy"),
            "3J98t1WpEZ73CNmQviecrnyiWrnqRhWNLy"
        );
    }

    #[test]
    fn test_base58_fallback() {
        assert_eq!(
            classify_base58("1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2"),
            Some(ScriptType::P2pkh)
        );
        assert_eq!(
            classify_base58("3J98t1WpEZ73CNmQviecrnyiWrnqRhWNLy"),
            Some(ScriptType::P2sh)
        );
        assert_eq!(classify_base58("1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN3"), None);
    }

    #[test]
    fn test_bech32_fallback() {
        assert_eq!(
            classify_bech32("bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq"),
            Some(ScriptType::P2wpkh)
        );
        assert_eq!(
            classify_bech32("bc1p5d7rjq7g6rdk2yhzks9smlaqtedr4dekq08ge8ztwac72sfr9rusxg3297"),
            Some(ScriptType::P2tr)
        );
    }
}
