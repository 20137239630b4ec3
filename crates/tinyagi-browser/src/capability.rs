// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Shared capability surface implemented by both the direct CDP client
//! and the external automation broker client, so the planner and
//! executor work only against this trait (spec §9 design note).
use async_trait::async_trait;

use crate::error::Result;

#[async_trait]
pub trait BrowserCapability: Send + Sync {
    async fn navigate(&mut self, url: &str) -> Result<()>;
    async fn click(&mut self, selector: &str) -> Result<()>;
    async fn fill(&mut self, selector: &str, value: &str) -> Result<()>;
    async fn wait_for(&mut self, selector: &str) -> Result<()>;
    async fn press(&mut self, key: &str) -> Result<()>;
    async fn extract_text(&mut self, selector: &str) -> Result<String>;
    async fn screenshot(&mut self) -> Result<Vec<u8>>;
    async fn evaluate(&mut self, script: &str) -> Result<serde_json::Value>;
    async fn read_state(&mut self) -> Result<PageState>;
    async fn close(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct PageState {
    pub url: String,
    pub visible_text: String,
}
