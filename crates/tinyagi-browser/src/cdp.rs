// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Direct Chrome DevTools Protocol client: an HTTP probe against the
//! debugger's `/json` endpoints plus a WebSocket JSON-RPC session for
//! page commands.
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::capability::{BrowserCapability, PageState};
use crate::error::{BrowserError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

pub struct CdpClient {
    ws: WsStream,
    next_id: u64,
}

#[derive(Debug, serde::Deserialize)]
struct TargetInfo {
    #[serde(rename = "webSocketDebuggerUrl")]
    websocket_url: Option<String>,
}

impl CdpClient {
    /// Probe `http://host:port/json` for a live target's websocket URL,
    /// creating one via `/json/new` if none exists, then connect.
    pub async fn attach(host: &str, port: u16) -> Result<Self> {
        let base = format!("http://{host}:{port}");
        let client = reqwest::Client::new();

        let targets: Vec<TargetInfo> = client
            .get(format!("{base}/json"))
            .timeout(Duration::from_secs(3))
            .send()
            .await
            .map_err(|_| BrowserError::NoReachableDebugger)?
            .json()
            .await
            .map_err(|_| BrowserError::NoReachableDebugger)?;

        let ws_url = match targets.into_iter().find_map(|t| t.websocket_url) {
            Some(url) => url,
            None => {
                let created: TargetInfo = client
                    .put(format!("{base}/json/new"))
                    .send()
                    .await
                    .map_err(|_| BrowserError::NoReachableDebugger)?
                    .json()
                    .await
                    .map_err(|_| BrowserError::NoReachableDebugger)?;
                created.websocket_url.ok_or(BrowserError::NoReachableDebugger)?
            }
        };

        let (ws, _) = connect_async(&ws_url).await?;
        Ok(Self { ws, next_id: 1 })
    }

    /// Poll `http://host:port/json/version` until it answers or
    /// `timeout` elapses (spec 4.I: "wait up to 12 s for the debugger to
    /// become ready").
    pub async fn wait_until_ready(host: &str, port: u16, timeout: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        let client = reqwest::Client::new();
        loop {
            if client.get(format!("http://{host}:{port}/json/version")).timeout(Duration::from_millis(500)).send().await.is_ok() {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(BrowserError::DebuggerNotReady);
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }

    async fn call(&mut self, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
        let id = self.next_id;
        self.next_id += 1;
        let request = json!({ "id": id, "method": method, "params": params });
        self.ws.send(Message::Text(request.to_string())).await?;

        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    let frame: serde_json::Value = serde_json::from_str(&text).unwrap_or(serde_json::Value::Null);
                    if frame.get("id").and_then(|v| v.as_u64()) == Some(id) {
                        if let Some(err) = frame.get("error") {
                            return Err(BrowserError::Other(format!("CDP error calling {method}: {err}")));
                        }
                        return Ok(frame.get("result").cloned().unwrap_or(serde_json::Value::Null));
                    }
                }
                Some(Ok(Message::Close(_))) | None => return Err(BrowserError::Other("CDP connection closed".into())),
                Some(Err(e)) => return Err(e.into()),
                _ => continue,
            }
        }
    }

    async fn eval_raw(&mut self, expression: &str) -> Result<serde_json::Value> {
        let result = self.call("Runtime.evaluate", json!({ "expression": expression, "returnByValue": true })).await?;
        Ok(result.get("result").and_then(|r| r.get("value")).cloned().unwrap_or(serde_json::Value::Null))
    }
}

#[async_trait]
impl BrowserCapability for CdpClient {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.call("Page.navigate", json!({ "url": url })).await?;
        Ok(())
    }

    async fn click(&mut self, selector: &str) -> Result<()> {
        let escaped = selector.replace('\'', "\\'");
        self.eval_raw(&format!("document.querySelector('{escaped}')?.click()")).await?;
        Ok(())
    }

    async fn fill(&mut self, selector: &str, value: &str) -> Result<()> {
        let escaped_sel = selector.replace('\'', "\\'");
        let escaped_val = value.replace('\'', "\\'");
        self.eval_raw(&format!(
            "(() => {{ const el = document.querySelector('{escaped_sel}'); if (el) {{ el.value = '{escaped_val}'; el.dispatchEvent(new Event('input', {{ bubbles: true }})); }} }})()"
        ))
        .await?;
        Ok(())
    }

    async fn wait_for(&mut self, selector: &str) -> Result<()> {
        let escaped = selector.replace('\'', "\\'");
        for _ in 0..20 {
            let found = self.eval_raw(&format!("!!document.querySelector('{escaped}')")).await?;
            if found.as_bool().unwrap_or(false) {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
        Err(BrowserError::Other(format!("timed out waiting for {selector}")))
    }

    async fn press(&mut self, key: &str) -> Result<()> {
        self.call("Input.dispatchKeyEvent", json!({ "type": "keyDown", "key": key })).await?;
        self.call("Input.dispatchKeyEvent", json!({ "type": "keyUp", "key": key })).await?;
        Ok(())
    }

    async fn extract_text(&mut self, selector: &str) -> Result<String> {
        let escaped = selector.replace('\'', "\\'");
        let value = self.eval_raw(&format!("document.querySelector('{escaped}')?.innerText || ''")).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>> {
        let result = self.call("Page.captureScreenshot", json!({ "format": "png" })).await?;
        let b64 = result.get("data").and_then(|v| v.as_str()).unwrap_or_default();
        BASE64.decode(b64).map_err(|e| BrowserError::Other(format!("invalid screenshot payload: {e}")))
    }

    async fn evaluate(&mut self, script: &str) -> Result<serde_json::Value> {
        self.eval_raw(script).await
    }

    async fn read_state(&mut self) -> Result<PageState> {
        let url = self.eval_raw("window.location.href").await?;
        let text = self.eval_raw("document.body?.innerText || ''").await?;
        Ok(PageState { url: url.as_str().unwrap_or_default().to_string(), visible_text: text.as_str().unwrap_or_default().to_string() })
    }

    async fn close(&mut self) -> Result<()> {
        let _ = self.ws.close(None).await;
        Ok(())
    }
}

