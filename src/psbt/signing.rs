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

//! Partial-signing metadata
//!
//! Wallets need a little help to recognize which inputs of a PSBT they can sign: a taproot input
//! needs its internal key, a nested segwit one its redeem script, and plain key-hash inputs a key
//! origin. [`PsbtSigningExt::inject_signing_info`] adds whichever applies, based on the
//! [classification](crate::address::classify) of the address that controls the input.
//!
//! Missing or unusable key material is not an error: the input is left as it is and the wallet is
//! expected to fill in what's missing.

use std::fmt;

use bitcoin::bip32::{DerivationPath, Fingerprint};
use bitcoin::hex::{DisplayHex, FromHex};
use bitcoin::key::{CompressedPublicKey, XOnlyPublicKey};
use bitcoin::psbt::Psbt;
use bitcoin::secp256k1::PublicKey;
use bitcoin::{Amount, ScriptBuf, TxOut};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::address::{classify, Classification, ScriptType};
use crate::error::Error;

/// Public keys supplied by the wallet client, stored as lowercase hex
///
/// When deserialized each key can be given either as a hex string or as an array of bytes.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SigningKeys {
    /// Key behind the wallet's payment address (`p2wpkh`, `p2sh-p2wpkh` or `p2pkh`)
    #[serde(
        default,
        deserialize_with = "deserialize_key",
        skip_serializing_if = "Option::is_none"
    )]
    pub payment_public_key: Option<String>,
    /// Key behind the wallet's taproot address, x-only or compressed
    #[serde(
        default,
        deserialize_with = "deserialize_key",
        skip_serializing_if = "Option::is_none"
    )]
    pub taproot_public_key: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum KeyRepr {
    Hex(String),
    Bytes(Vec<u8>),
}

fn deserialize_key<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<KeyRepr>::deserialize(deserializer)? {
        None => Ok(None),
        Some(KeyRepr::Bytes(bytes)) => Ok(Some(bytes.to_lower_hex_string())),
        Some(KeyRepr::Hex(hex)) => normalize_hex(&hex).map(Some).map_err(de::Error::custom),
    }
}

fn normalize_hex(hex: &str) -> Result<String, Error> {
    let hex = hex.trim();
    Vec::<u8>::from_hex(hex).map_err(|e| Error::InvalidPublicKey(format!("{}: {}", hex, e)))?;

    Ok(hex.to_ascii_lowercase())
}

impl SigningKeys {
    /// Set the payment public key from its hex encoding
    pub fn payment_key_hex(mut self, hex: &str) -> Result<Self, Error> {
        self.payment_public_key = Some(normalize_hex(hex)?);
        Ok(self)
    }

    /// Set the taproot public key from its hex encoding
    pub fn taproot_key_hex(mut self, hex: &str) -> Result<Self, Error> {
        self.taproot_public_key = Some(normalize_hex(hex)?);
        Ok(self)
    }

    /// Set the payment public key from raw bytes
    pub fn payment_key_bytes(mut self, bytes: &[u8]) -> Self {
        self.payment_public_key = Some(bytes.to_lower_hex_string());
        self
    }

    /// Set the taproot public key from raw bytes
    pub fn taproot_key_bytes(mut self, bytes: &[u8]) -> Self {
        self.taproot_public_key = Some(bytes.to_lower_hex_string());
        self
    }

    fn payment_key(&self) -> Result<CompressedPublicKey, SkipReason> {
        let bytes = decode(self.payment_public_key.as_deref(), "payment")?;
        CompressedPublicKey::from_slice(&bytes)
            .map_err(|e| SkipReason(format!("invalid payment key: {}", e)))
    }

    fn taproot_key(&self) -> Result<XOnlyPublicKey, SkipReason> {
        let bytes = decode(self.taproot_public_key.as_deref(), "taproot")?;
        // a compressed key carries a leading parity byte
        let xonly = match bytes.len() {
            33 => &bytes[1..],
            32 => &bytes[..],
            len => {
                return Err(SkipReason(format!(
                    "taproot key must be 32 or 33 bytes, got {}",
                    len
                )))
            }
        };

        XOnlyPublicKey::from_slice(xonly)
            .map_err(|e| SkipReason(format!("invalid taproot key: {}", e)))
    }
}

fn decode(hex: Option<&str>, name: &str) -> Result<Vec<u8>, SkipReason> {
    let hex = hex.ok_or_else(|| SkipReason(format!("no {} key", name)))?;
    Vec::<u8>::from_hex(hex).map_err(|e| SkipReason(format!("{} key: {}", name, e)))
}

struct SkipReason(String);

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Attach partial-signing metadata to PSBT inputs
pub trait PsbtSigningExt {
    /// Add the metadata needed to sign input `index`, controlled by `address`
    ///
    /// - `p2tr`: the taproot internal key
    /// - `p2sh` (nested `p2wpkh`): the redeem script and, when `input_value` is given, the
    ///   `witness_utxo`. No `witness_script` is set: the redeem script is a plain `p2wpkh`
    ///   program, which has none
    /// - `p2wpkh` and `p2pkh`: a key origin with an empty path and a zero fingerprint
    ///
    /// Fields that are already set are left untouched, so calling this twice is harmless. Inputs
    /// whose address can't be classified, or for which the needed key is missing or invalid, are
    /// skipped with a warning.
    fn inject_signing_info(
        &mut self,
        index: usize,
        address: &str,
        keys: &SigningKeys,
        input_value: Option<u64>,
    );
}

impl PsbtSigningExt for Psbt {
    fn inject_signing_info(
        &mut self,
        index: usize,
        address: &str,
        keys: &SigningKeys,
        input_value: Option<u64>,
    ) {
        let script_type = match classify(address) {
            Classification::Known(script_type) => script_type,
            Classification::Unknown => {
                warn!(
                    "Input #{}: can't classify address `{}`, no signing info added",
                    index, address
                );
                return;
            }
        };

        let input = match self.inputs.get_mut(index) {
            Some(input) => input,
            None => {
                warn!("Input #{} doesn't exist, no signing info added", index);
                return;
            }
        };

        let res = match script_type {
            ScriptType::P2tr => keys.taproot_key().map(|key| {
                if input.tap_internal_key.is_none() {
                    input.tap_internal_key = Some(key);
                }
            }),
            ScriptType::P2sh => keys.payment_key().map(|key| {
                let redeem_script = ScriptBuf::new_p2wpkh(&key.wpubkey_hash());
                if input.witness_utxo.is_none() {
                    match input_value {
                        Some(value) => {
                            input.witness_utxo = Some(TxOut {
                                value: Amount::from_sat(value),
                                script_pubkey: ScriptBuf::new_p2sh(&redeem_script.script_hash()),
                            })
                        }
                        None => debug!("Input #{}: value unknown, no witness_utxo", index),
                    }
                }
                if input.redeem_script.is_none() {
                    input.redeem_script = Some(redeem_script);
                }
            }),
            ScriptType::P2wpkh | ScriptType::P2pkh => keys.payment_key().map(|key| {
                let key: PublicKey = key.0;
                input
                    .bip32_derivation
                    .entry(key)
                    .or_insert_with(|| (Fingerprint::from([0u8; 4]), DerivationPath::master()));
            }),
        };

        match res {
            Ok(()) => trace!("Input #{}: {} signing info added", index, script_type),
            Err(reason) => warn!(
                "Input #{} ({}): {}, no signing info added",
                index, script_type, reason
            ),
        }
    }
}
