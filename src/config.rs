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

//! Engine configuration
//!
//! Every constant the analyzers and builders rely on lives in [`FeePolicy`], so that tests and
//! deployments can override them without touching the code. [`Config`] bundles the policy with the
//! settings of the two data providers.
//!
//! ```
//! # use accelerator::Config;
//! let config = Config::from_json(r#"{
//!     "network": "testnet",
//!     "policy": { "fee_rate_multiplier": 2.0 },
//!     "esplora": { "base_url": "https://mempool.space/testnet/api", "timeout": 10 },
//!     "indexer": { "base_url": "http://127.0.0.1:8080" }
//! }"#)?;
//! assert_eq!(config.policy.dust_limit, 546);
//! assert_eq!(config.policy.fee_rate_multiplier, 2.0);
//! # Ok::<(), accelerator::Error>(())
//! ```

use bitcoin::{Network, Sequence};
use serde::{Deserialize, Serialize};

use crate::blockchain::esplora::EsploraBlockchainConfig;
use crate::blockchain::indexer::IndexerConfig;
use crate::error::Error;
use crate::types::FeeRate;

/// Amounts and approximations shared by every component
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct FeePolicy {
    /// Outputs below this value are never created, they are merged into the fee instead
    pub dust_limit: u64,
    /// UTXOs worth this much or less are ignored when looking for extra funding
    pub min_utxo_value: u64,
    /// Outputs worth this much or less are treated as anchors: a CPFP child keeps their value
    pub anchor_threshold: u64,
    /// When no target is given, aim for this multiple of the current fee rate
    pub fee_rate_multiplier: f64,
    /// Assumed size of a CPFP child (one input, up to two outputs), in vbytes
    ///
    /// This is an approximation: the child is not built to measure it, so the actual package rate
    /// may differ slightly from the estimate.
    pub child_vsize: u64,
    /// Smallest child fee when the spent output is allowed to shrink
    pub nominal_min_child_fee: u64,
}

impl Default for FeePolicy {
    fn default() -> Self {
        FeePolicy {
            dust_limit: 546,
            min_utxo_value: 800,
            anchor_threshold: 600,
            fee_rate_multiplier: 1.5,
            child_vsize: 140,
            nominal_min_child_fee: 1,
        }
    }
}

impl FeePolicy {
    /// nSequence put on every input of a replacement or child transaction
    pub const RBF_SEQUENCE: Sequence = Sequence::ENABLE_RBF_NO_LOCKTIME;

    /// The target used when the caller doesn't provide one
    pub fn default_target(&self, current: FeeRate) -> FeeRate {
        current.scale(self.fee_rate_multiplier)
    }

    /// Whether an output of `value` sats should be kept intact by a CPFP child
    pub fn is_anchor(&self, value: u64) -> bool {
        value <= self.anchor_threshold
    }
}

/// Full configuration of an [`Accelerator`](crate::Accelerator)
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Config {
    /// Network addresses are checked against
    #[serde(default = "default_network")]
    pub network: Network,
    /// Fee policy
    #[serde(default)]
    pub policy: FeePolicy,
    /// Transaction data provider
    pub esplora: EsploraBlockchainConfig,
    /// Balance-indexing provider
    pub indexer: IndexerConfig,
}

fn default_network() -> Network {
    Network::Bitcoin
}

impl Config {
    /// Parse a configuration from a JSON document
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;

        Ok(config)
    }

    /// Check that the policy values make sense
    pub fn validate(&self) -> Result<(), Error> {
        let policy = &self.policy;
        if !policy.fee_rate_multiplier.is_finite() || policy.fee_rate_multiplier <= 0.0 {
            return Err(Error::Generic(format!(
                "`fee_rate_multiplier` must be positive, got {}",
                policy.fee_rate_multiplier
            )));
        }
        if policy.child_vsize == 0 {
            return Err(Error::Generic("`child_vsize` can't be zero".into()));
        }
        if policy.dust_limit == 0 {
            return Err(Error::Generic("`dust_limit` can't be zero".into()));
        }

        Ok(())
    }
}
