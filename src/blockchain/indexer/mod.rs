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

//! Balance indexer
//!
//! Reads the spendable outputs of an address from an `ord`-style HTTP indexer
//! (`GET /outputs/<address>`). With [`IndexerConfig::cardinal_only`] set the indexer is asked
//! for cardinal outputs only, so inscription-bearing outputs are never offered as fee funding.
//!
//! Indexers behind a proxy tend to answer with an HTML error page when they are down: that is
//! reported as [`IndexerError::Unavailable`] and can be retried, while JSON that doesn't match
//! the expected shape means the endpoint is misconfigured ([`IndexerError::MalformedResponse`]).

use std::fmt;
use std::str::FromStr;

use bitcoin::OutPoint;

use crate::blockchain::IndexedOutput;

#[cfg(feature = "indexer")]
mod reqwest;

#[cfg(feature = "indexer")]
pub use self::reqwest::*;

/// Errors that can happen while talking to the balance indexer
#[derive(Debug)]
pub enum IndexerError {
    /// The indexer couldn't be reached, or answered with something that isn't JSON
    Unavailable(String),
    /// HTTP response error
    HttpResponse(u16),
    /// The indexer answered with JSON in an unexpected format
    MalformedResponse(String),
}

impl IndexerError {
    /// Malformed JSON won't fix itself, everything else might
    pub fn is_retryable(&self) -> bool {
        !matches!(self, IndexerError::MalformedResponse(_))
    }
}

impl fmt::Display for IndexerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable(err) => write!(f, "Service unavailable: {}", err),
            Self::HttpResponse(status) => write!(f, "Unexpected HTTP status {}", status),
            Self::MalformedResponse(err) => write!(
                f,
                "Malformed response, check the indexer endpoint configuration: {}",
                err
            ),
        }
    }
}

impl std::error::Error for IndexerError {}

/// Configuration for the balance indexer client
#[derive(Debug, serde::Deserialize, serde::Serialize, Clone, PartialEq)]
pub struct IndexerConfig {
    /// Base URL of the indexer
    pub base_url: String,
    /// Only ask for outputs that carry no inscription or rune (default: true)
    #[serde(default = "default_cardinal_only")]
    pub cardinal_only: bool,
    /// Optional URL of the proxy to use, ignored on `wasm32`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
    /// Socket timeout.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

fn default_cardinal_only() -> bool {
    true
}

impl IndexerConfig {
    /// create a config with default values given the base url
    pub fn new(base_url: String) -> Self {
        IndexerConfig {
            base_url,
            cardinal_only: true,
            proxy: None,
            timeout: None,
        }
    }
}

#[derive(serde::Deserialize)]
struct WireOutput {
    outpoint: String,
    value: u64,
    #[serde(default)]
    spent: bool,
}

/// Parse the body returned by `GET /outputs/<address>`
pub fn parse_outputs(body: &str) -> Result<Vec<IndexedOutput>, IndexerError> {
    let body = body.trim();
    if !(body.starts_with('[') || body.starts_with('{')) {
        let preview: String = body.chars().take(64).collect();
        return Err(IndexerError::Unavailable(format!(
            "expected JSON, got `{}`",
            preview
        )));
    }

    let outputs: Vec<WireOutput> =
        serde_json::from_str(body).map_err(|e| IndexerError::MalformedResponse(e.to_string()))?;

    outputs
        .into_iter()
        .filter(|output| !output.spent)
        .map(|output| {
            let outpoint = OutPoint::from_str(&output.outpoint).map_err(|e| {
                IndexerError::MalformedResponse(format!("outpoint `{}`: {}", output.outpoint, e))
            })?;
            Ok(IndexedOutput {
                outpoint,
                value: output.value,
            })
        })
        .collect()
}
