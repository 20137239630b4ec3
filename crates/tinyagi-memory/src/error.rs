// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error(transparent)]
    Repository(#[from] tinyagi_repository::RepositoryError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid raw memory event: {0}")]
    InvalidEvent(String),
}

pub type Result<T> = std::result::Result<T, MemoryError>;
