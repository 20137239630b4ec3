// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolingError {
    #[error("command rejected: {0}")]
    Rejected(String),

    #[error("no candidate command found in the output")]
    NoCandidate,

    #[error("execution requires approval (request {request_id})")]
    NeedsApproval { request_id: String },

    #[error(transparent)]
    Repository(#[from] tinyagi_repository::RepositoryError),

    #[error("io error executing tool: {0}")]
    Io(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ToolingError>;
