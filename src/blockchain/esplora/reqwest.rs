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

//! Esplora by way of `reqwest` HTTP client.

use std::future::Future;

use bitcoin::consensus::deserialize;
use bitcoin::hex::FromHex;
use bitcoin::{Transaction, Txid};

#[allow(unused_imports)]
use log::{debug, error, info, trace};

use ::reqwest::{Client, StatusCode};
use futures::stream::{FuturesOrdered, TryStreamExt};

use super::EsploraError;
use crate::blockchain::api::{OutSpend, Tx};
use crate::blockchain::{Blockchain, ConfigurableBlockchain};
use crate::error::Error;

#[derive(Debug)]
struct UrlClient {
    url: String,
    // We use the async client instead of the blocking one because it automatically uses `fetch`
    // when the target platform is wasm32.
    client: Client,
    concurrency: u8,
}

/// Structure that implements the logic to read transactions from Esplora
///
/// ## Example
/// See the [`blockchain::esplora`](crate::blockchain::esplora) module for a usage example.
#[derive(Debug)]
pub struct EsploraBlockchain {
    url_client: UrlClient,
}

impl EsploraBlockchain {
    /// Create a new instance of the client from a base URL
    pub fn new(base_url: &str) -> Self {
        EsploraBlockchain {
            url_client: UrlClient {
                url: base_url.trim_end_matches('/').to_string(),
                client: Client::new(),
                concurrency: super::DEFAULT_CONCURRENT_REQUESTS,
            },
        }
    }

    /// Set the concurrency to use when fetching batches of transactions
    pub fn with_concurrency(mut self, concurrency: u8) -> Self {
        self.url_client.concurrency = concurrency;
        self
    }
}

// Every call is a short-lived request, there's nothing to keep a runtime around for.
fn await_or_block<F: Future>(future: F) -> Result<F::Output, EsploraError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    Ok(runtime.block_on(future))
}

impl Blockchain for EsploraBlockchain {
    fn get_tx(&self, txid: &Txid) -> Result<Option<Tx>, Error> {
        Ok(await_or_block(self.url_client._get_tx(txid))??)
    }

    fn get_raw_tx(&self, txid: &Txid) -> Result<Option<Transaction>, Error> {
        Ok(await_or_block(self.url_client._get_tx_hex(txid))??)
    }

    fn get_raw_txs(&self, txids: &[Txid]) -> Result<Vec<Option<Transaction>>, Error> {
        Ok(await_or_block(self.url_client._get_txs_hex(txids))??)
    }
}

impl UrlClient {
    async fn _get_tx(&self, txid: &Txid) -> Result<Option<Tx>, EsploraError> {
        let resp = self
            .client
            .get(&format!("{}/tx/{}", self.url, txid))
            .send()
            .await?;

        if let StatusCode::NOT_FOUND = resp.status() {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(EsploraError::HttpResponse(resp.status().as_u16()));
        }

        let mut tx = resp.json::<Tx>().await?;
        if tx.needs_outspends() {
            let outspends = self._get_outspends(txid).await?;
            if outspends.len() != tx.vout.len() {
                return Err(EsploraError::Parsing(format!(
                    "{} outspends returned for {} outputs",
                    outspends.len(),
                    tx.vout.len()
                )));
            }
            for (vout, outspend) in tx.vout.iter_mut().zip(outspends) {
                vout.spent.get_or_insert(outspend.spent);
            }
        }

        Ok(Some(tx))
    }

    async fn _get_outspends(&self, txid: &Txid) -> Result<Vec<OutSpend>, EsploraError> {
        let resp = self
            .client
            .get(&format!("{}/tx/{}/outspends", self.url, txid))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(EsploraError::HttpResponse(resp.status().as_u16()));
        }

        Ok(resp.json::<Vec<OutSpend>>().await?)
    }

    async fn _get_tx_hex(&self, txid: &Txid) -> Result<Option<Transaction>, EsploraError> {
        let resp = self
            .client
            .get(&format!("{}/tx/{}/hex", self.url, txid))
            .send()
            .await?;

        if let StatusCode::NOT_FOUND = resp.status() {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(EsploraError::HttpResponse(resp.status().as_u16()));
        }

        let hex = resp.text().await?;
        let bytes = Vec::<u8>::from_hex(hex.trim())
            .map_err(|e| EsploraError::Parsing(format!("raw transaction {}: {}", txid, e)))?;
        let tx: Transaction = deserialize(&bytes)?;
        if tx.compute_txid() != *txid {
            return Err(EsploraError::Parsing(format!(
                "asked for {} but got {}",
                txid,
                tx.compute_txid()
            )));
        }

        Ok(Some(tx))
    }

    async fn _get_txs_hex(&self, txids: &[Txid]) -> Result<Vec<Option<Transaction>>, EsploraError> {
        let mut txs = Vec::with_capacity(txids.len());
        for chunk in txids.chunks(self.concurrency.max(1) as usize) {
            let futures: FuturesOrdered<_> =
                chunk.iter().map(|txid| self._get_tx_hex(txid)).collect();
            let batch: Vec<Option<Transaction>> = futures.try_collect().await?;
            debug!("fetched {} previous transactions", batch.len());
            txs.extend(batch);
        }

        Ok(txs)
    }
}

impl ConfigurableBlockchain for EsploraBlockchain {
    type Config = super::EsploraBlockchainConfig;

    fn from_config(config: &Self::Config) -> Result<Self, Error> {
        let map_e = |e: ::reqwest::Error| Error::Esplora(Box::new(e.into()));

        let mut blockchain = EsploraBlockchain::new(config.base_url.as_str());
        if let Some(concurrency) = config.concurrency {
            blockchain.url_client.concurrency = concurrency;
        }
        let mut builder = Client::builder();
        #[cfg(not(target_arch = "wasm32"))]
        if let Some(proxy) = &config.proxy {
            builder = builder.proxy(::reqwest::Proxy::all(proxy).map_err(map_e)?);
        }

        #[cfg(not(target_arch = "wasm32"))]
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(core::time::Duration::from_secs(timeout));
        }

        blockchain.url_client.client = builder.build().map_err(map_e)?;

        Ok(blockchain)
    }
}
