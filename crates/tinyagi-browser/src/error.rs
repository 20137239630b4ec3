// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("no reachable debugger")]
    NoReachableDebugger,

    #[error("profile is locked by another Chrome instance")]
    ProfileLocked,

    #[error("will not relaunch chrome: {0}")]
    WillNotRelaunch(String),

    #[error("debugger did not become ready in time")]
    DebuggerNotReady,

    #[error("needs approval (request {request_id})")]
    NeedsApproval { request_id: String },

    #[error("human checkpoint detected: {0}")]
    NeedsInput(String),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Repository(#[from] tinyagi_repository::RepositoryError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, BrowserError>;
