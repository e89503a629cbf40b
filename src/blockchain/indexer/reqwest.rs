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

//! Balance indexer by way of `reqwest` HTTP client.

#[allow(unused_imports)]
use log::{debug, error, info, trace};

use ::reqwest::header::ACCEPT;
use ::reqwest::Client;

use super::{parse_outputs, IndexerConfig, IndexerError};
use crate::blockchain::{ConfigurableBlockchain, IndexedOutput, UtxoIndex};
use crate::error::Error;

/// Client for an `ord`-style balance indexer
#[derive(Debug)]
pub struct OrdIndexer {
    url: String,
    client: Client,
    cardinal_only: bool,
}

impl OrdIndexer {
    /// Create a new instance of the client from a base URL
    pub fn new(base_url: &str) -> Self {
        OrdIndexer {
            url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
            cardinal_only: true,
        }
    }

    /// Also list outputs carrying inscriptions or runes
    pub fn include_inscribed(mut self) -> Self {
        self.cardinal_only = false;
        self
    }

    async fn _list_outputs(&self, address: &str) -> Result<Vec<IndexedOutput>, IndexerError> {
        let mut url = format!("{}/outputs/{}", self.url, address);
        if self.cardinal_only {
            url.push_str("?type=cardinal");
        }

        let resp = self
            .client
            .get(&url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| IndexerError::Unavailable(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(IndexerError::HttpResponse(resp.status().as_u16()));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| IndexerError::Unavailable(e.to_string()))?;
        let outputs = parse_outputs(&body)?;
        debug!("indexer returned {} outputs for {}", outputs.len(), address);

        Ok(outputs)
    }
}

impl UtxoIndex for OrdIndexer {
    fn list_outputs(&self, address: &str) -> Result<Vec<IndexedOutput>, Error> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| IndexerError::Unavailable(e.to_string()))?;

        Ok(runtime.block_on(self._list_outputs(address))?)
    }
}

impl ConfigurableBlockchain for OrdIndexer {
    type Config = IndexerConfig;

    fn from_config(config: &Self::Config) -> Result<Self, Error> {
        let map_e = |e: ::reqwest::Error| IndexerError::MalformedResponse(e.to_string());

        let mut indexer = OrdIndexer::new(config.base_url.as_str());
        indexer.cardinal_only = config.cardinal_only;

        let mut builder = Client::builder();
        #[cfg(not(target_arch = "wasm32"))]
        if let Some(proxy) = &config.proxy {
            builder = builder.proxy(::reqwest::Proxy::all(proxy).map_err(map_e)?);
        }

        #[cfg(not(target_arch = "wasm32"))]
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(core::time::Duration::from_secs(timeout));
        }

        indexer.client = builder.build().map_err(map_e)?;

        Ok(indexer)
    }
}
