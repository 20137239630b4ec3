// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SkillsError {
    #[error(transparent)]
    Repository(#[from] tinyagi_repository::RepositoryError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("skill not found: {0}")]
    NotFound(String),
    #[error("version {0} not found for skill {1}")]
    VersionNotFound(u32, String),
}

pub type Result<T> = std::result::Result<T, SkillsError>;
