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

// only enables the `doc_cfg` feature when
// the `docsrs` configuration attribute is defined
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]

//! Transaction acceleration engine.
//!
//! This crate inspects stuck, unconfirmed Bitcoin transactions and produces *unsigned*
//! [PSBT](bitcoin::psbt::Psbt) plans that get them confirmed faster or abandon them:
//!
//! - **RBF** ([`Accelerator::build_rbf`]): re-spend the same inputs, paying the higher fee out of
//!   the wallet's change outputs.
//! - **CPFP** ([`Accelerator::build_cpfp`]): spend one of the parent's outputs in a child that pays
//!   enough fee to lift the package rate, optionally topped up with extra wallet UTXOs.
//! - **Cancellation** ([`Accelerator::build_cancel`]): replace the transaction with one that sends
//!   everything back to the wallet.
//!
//! [`Accelerator::analyze`] decides which of these is possible for a given transaction.
//!
//! The engine never holds private keys, never signs and never broadcasts. It keeps no state
//! between calls: every operation re-reads the chain from a [`Blockchain`](blockchain::Blockchain)
//! provider and, for hybrid CPFP, the wallet's outputs from a
//! [`UtxoIndex`](blockchain::UtxoIndex).
//!
//! ## Example
//!
//! ```no_run
//! # use std::str::FromStr;
//! use accelerator::{Accelerator, Config, FeeRate, SigningKeys};
//! use bitcoin::Txid;
//!
//! let config = Config::from_json(r#"{
//!     "network": "bitcoin",
//!     "esplora": { "base_url": "https://mempool.space/api" },
//!     "indexer": { "base_url": "https://ordinals.com" }
//! }"#)?;
//! let accelerator = Accelerator::from_config(&config)?;
//!
//! let txid = "b2a1c3d8ee2b6bb0c4a6cdd2a2e0d7f4c9b1f6a3e8d2c5b4a7f0e1d2c3b4a5f6";
//! let wallet = vec!["bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq".to_string()];
//! let report = accelerator.analyze(txid, &wallet)?;
//! println!("recommended: {:?}", report.analysis.recommended_strategy);
//!
//! let keys = SigningKeys::default()
//!     .payment_key_hex("02c6047f9441ed7d6d3045406e95c07cd85c778e4b8cef3ca7abac09b95c709ee5")?;
//! let plan = accelerator.build_rbf(txid, FeeRate::from_sat_per_vb(12.0), &wallet, &keys)?;
//! println!("{}", plan.to_base64());
//! # Ok::<(), accelerator::Error>(())
//! ```

pub extern crate bitcoin;
extern crate log;
extern crate serde;
#[cfg(test)]
#[macro_use]
extern crate serde_json;

#[cfg(feature = "reqwest")]
pub extern crate reqwest;

#[macro_use]
pub(crate) mod error;
pub mod engine;
pub mod address;
pub mod blockchain;
pub mod config;
pub mod psbt;
pub mod response;
pub(crate) mod types;
pub(crate) mod utils;

#[cfg(any(test, feature = "test-utils"))]
#[cfg_attr(docsrs, doc(cfg(feature = "test-utils")))]
pub mod testutils;

pub use engine::{Accelerator, AnalysisReport, CpfpParams, CpfpPlan};
pub use address::{classify, Classification, ScriptType};
pub use config::{Config, FeePolicy};
pub use error::{Error, ErrorKind};
pub use psbt::signing::{PsbtSigningExt, SigningKeys};
pub use psbt::{PlanSummary, Totals, UnsignedPlan};
pub use response::{Outcome, PlanResponse};
pub use types::*;
pub use utils::IsDust;
