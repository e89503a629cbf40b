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

//! Response envelope
//!
//! Callers sitting behind an HTTP API want a uniform `{success, data, error}` shape rather than a
//! Rust `Result`. [`Outcome`] is that shape, with enough detail in the error for a client to tell a
//! retryable failure from a shortfall it could top up.

use serde::Serialize;

use crate::error::{Error, ErrorKind};
use crate::psbt::{PlanSummary, UnsignedPlan};

/// Structured failure
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// Category of the error
    pub kind: ErrorKind,
    /// Human-readable reason
    pub message: String,
    /// Whether calling again later may succeed
    pub retryable: bool,
    /// Missing amount (sats), when it can be computed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shortfall: Option<u64>,
}

impl From<&Error> for Failure {
    fn from(err: &Error) -> Self {
        Failure {
            kind: err.kind(),
            message: err.to_string(),
            retryable: err.is_retryable(),
            shortfall: err.shortfall(),
        }
    }
}

/// Success flag plus either the data or the error
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Outcome<T> {
    /// `true` iff `data` is set
    pub success: bool,
    /// Result of the operation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Why the operation failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Failure>,
}

impl<T> From<Result<T, Error>> for Outcome<T> {
    fn from(res: Result<T, Error>) -> Self {
        match res {
            Ok(data) => Outcome {
                success: true,
                data: Some(data),
                error: None,
            },
            Err(err) => Outcome {
                success: false,
                data: None,
                error: Some(Failure::from(&err)),
            },
        }
    }
}

impl<T> Outcome<T> {
    /// Convert the data with `f`, keeping a failure as it is
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Outcome<U> {
        Outcome {
            success: self.success,
            data: self.data.map(f),
            error: self.error,
        }
    }
}

/// What a wallet client receives for an unsigned plan
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct PlanResponse {
    /// Base64-encoded PSBT
    pub psbt: String,
    /// Counts and totals
    pub summary: PlanSummary,
}

impl From<&UnsignedPlan> for PlanResponse {
    fn from(plan: &UnsignedPlan) -> Self {
        PlanResponse {
            psbt: plan.to_base64(),
            summary: plan.summary(),
        }
    }
}

impl From<UnsignedPlan> for PlanResponse {
    fn from(plan: UnsignedPlan) -> Self {
        PlanResponse::from(&plan)
    }
}
