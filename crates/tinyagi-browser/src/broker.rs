// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! External automation-broker client: implements `BrowserCapability` over
//! a REST service instead of talking CDP directly. Used as the fallback
//! provider (spec 4.I) when direct CDP attach fails for a specific,
//! recognized reason.
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;

use crate::capability::{BrowserCapability, PageState};
use crate::error::{BrowserError, Result};

/// Failure messages from the direct CDP path that should trigger a
/// fallback to the broker rather than failing the run outright.
pub const CDP_FALLBACK_NEEDLES: [&str; 3] = ["no reachable debugger", "profile is locked", "did not become ready"];

pub fn should_fall_back_to_broker(cdp_error: &str) -> bool {
    let lower = cdp_error.to_lowercase();
    CDP_FALLBACK_NEEDLES.iter().any(|n| lower.contains(n))
}

pub struct BrokerClient {
    http: reqwest::Client,
    base_url: String,
    session_id: String,
}

#[derive(Deserialize)]
struct SessionResponse {
    #[serde(rename = "sessionId")]
    session_id: String,
}

#[derive(Deserialize)]
struct TextResponse {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ScreenshotResponse {
    #[serde(rename = "dataBase64")]
    data_base64: Option<String>,
}

#[derive(Deserialize)]
struct EvaluateResponse {
    value: serde_json::Value,
}

#[derive(Deserialize)]
struct StateResponse {
    url: Option<String>,
    #[serde(rename = "visibleText")]
    visible_text: Option<String>,
}

impl BrokerClient {
    pub async fn connect(base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(Duration::from_secs(30)).build()?;
        let resp: SessionResponse = http.post(format!("{base_url}/sessions")).json(&json!({})).send().await?.json().await?;
        Ok(Self { http, base_url: base_url.to_string(), session_id: resp.session_id })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/sessions/{}/{}", self.base_url, self.session_id, path)
    }
}

#[async_trait]
impl BrowserCapability for BrokerClient {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.http.post(self.url("navigate")).json(&json!({ "url": url })).send().await?.error_for_status()?;
        Ok(())
    }

    async fn click(&mut self, selector: &str) -> Result<()> {
        self.http.post(self.url("click")).json(&json!({ "selector": selector })).send().await?.error_for_status()?;
        Ok(())
    }

    async fn fill(&mut self, selector: &str, value: &str) -> Result<()> {
        self.http.post(self.url("fill")).json(&json!({ "selector": selector, "value": value })).send().await?.error_for_status()?;
        Ok(())
    }

    async fn wait_for(&mut self, selector: &str) -> Result<()> {
        self.http.post(self.url("wait-for")).json(&json!({ "selector": selector })).send().await?.error_for_status()?;
        Ok(())
    }

    async fn press(&mut self, key: &str) -> Result<()> {
        self.http.post(self.url("press")).json(&json!({ "key": key })).send().await?.error_for_status()?;
        Ok(())
    }

    async fn extract_text(&mut self, selector: &str) -> Result<String> {
        let resp: TextResponse = self
            .http
            .post(self.url("extract-text"))
            .json(&json!({ "selector": selector }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(resp.text.unwrap_or_default())
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>> {
        let resp: ScreenshotResponse = self.http.post(self.url("screenshot")).send().await?.error_for_status()?.json().await?;
        let encoded = resp.data_base64.ok_or_else(|| BrowserError::Other("broker returned no screenshot data".into()))?;
        BASE64.decode(&encoded).map_err(|e| BrowserError::Other(format!("invalid screenshot payload: {e}")))
    }

    async fn evaluate(&mut self, script: &str) -> Result<serde_json::Value> {
        let resp: EvaluateResponse = self
            .http
            .post(self.url("evaluate"))
            .json(&json!({ "script": script }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(resp.value)
    }

    async fn read_state(&mut self) -> Result<PageState> {
        let resp: StateResponse = self.http.get(self.url("state")).send().await?.error_for_status()?.json().await?;
        Ok(PageState { url: resp.url.unwrap_or_default(), visible_text: resp.visible_text.unwrap_or_default() })
    }

    async fn close(&mut self) -> Result<()> {
        let _ = self.http.delete(self.url("")).send().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_needle_matches_no_reachable_debugger() {
        assert!(should_fall_back_to_broker("no reachable debugger"));
    }

    #[test]
    fn fallback_needle_matches_profile_locked() {
        assert!(should_fall_back_to_broker("profile is locked by another Chrome instance"));
    }

    #[test]
    fn fallback_needle_does_not_match_unrelated_error() {
        assert!(!should_fall_back_to_broker("selector not found"));
    }
}
