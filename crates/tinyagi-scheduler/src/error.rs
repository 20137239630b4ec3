// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Repository(#[from] tinyagi_repository::RepositoryError),
    #[error(transparent)]
    Queue(#[from] tinyagi_queue::QueueError),
    #[error(transparent)]
    Memory(#[from] tinyagi_memory::MemoryError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
