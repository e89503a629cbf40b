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

//! Esplora
//!
//! This module defines a [`EsploraBlockchain`] struct that reads transactions from an Esplora (or
//! mempool.space) HTTP API.
//!
//! ## Example
//!
//! ```no_run
//! # use accelerator::blockchain::esplora::EsploraBlockchain;
//! let blockchain = EsploraBlockchain::new("https://blockstream.info/testnet/api");
//! # Ok::<(), accelerator::Error>(())
//! ```
//!
//! The client is built on the async `reqwest` client and drives every request to completion
//! before returning, so it must not be called from within a `tokio` runtime.
use std::fmt;
use std::io;

use bitcoin::consensus;

#[cfg(feature = "esplora")]
mod reqwest;

#[cfg(feature = "esplora")]
pub use self::reqwest::*;

/// Errors that can happen while talking to an [`EsploraBlockchain`]
#[derive(Debug)]
pub enum EsploraError {
    /// Error during reqwest HTTP request
    #[cfg(feature = "esplora")]
    Reqwest(::reqwest::Error),
    /// HTTP response error
    HttpResponse(u16),
    /// IO error, e.g. while setting up the runtime
    Io(io::Error),
    /// Invalid data returned
    Parsing(String),
    /// Invalid Bitcoin data returned
    BitcoinEncoding(bitcoin::consensus::encode::Error),
}

impl fmt::Display for EsploraError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Configuration for an [`EsploraBlockchain`]
#[derive(Debug, serde::Deserialize, serde::Serialize, Clone, PartialEq)]
pub struct EsploraBlockchainConfig {
    /// Base URL of the esplora service
    ///
    /// eg. `https://blockstream.info/api/`
    pub base_url: String,
    /// Optional URL of the proxy to use to make requests to the Esplora server
    ///
    /// The string should be formatted as: `<protocol>://<user>:<password>@host:<port>`.
    ///
    /// The proxy is ignored when targeting `wasm32`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
    /// Number of parallel requests sent to the esplora service (default: 4)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<u8>,
    /// Socket timeout.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl EsploraBlockchainConfig {
    /// create a config with default values given the base url
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            proxy: None,
            timeout: None,
            concurrency: None,
        }
    }
}

impl std::error::Error for EsploraError {}

#[cfg(feature = "esplora")]
impl_error!(::reqwest::Error, Reqwest, EsploraError);
impl_error!(io::Error, Io, EsploraError);
impl_error!(consensus::encode::Error, BitcoinEncoding, EsploraError);

#[cfg(feature = "esplora")]
const DEFAULT_CONCURRENT_REQUESTS: u8 = 4;
