// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InvokerError {
    #[error("agent binary not found: {binary}")]
    BinaryMissing { binary: String },

    #[error("model unavailable: {model}")]
    ModelUnavailable { model: String },

    #[error("no prior session to resume")]
    NoPriorSession,

    #[error("agent subprocess failed: {0}")]
    Subprocess(String),

    #[error("io error launching agent: {0}")]
    Io(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, InvokerError>;
