// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Chooses between the direct CDP client and the external broker client
//! (spec 4.I "Provider selection").
use tinyagi_config::BrowserConfig;
use tracing::{info, warn};

use crate::broker::{should_fall_back_to_broker, BrokerClient};
use crate::capability::BrowserCapability;
use crate::cdp::CdpClient;
use crate::error::{BrowserError, Result};
use crate::session::resolve_debugger_endpoint;

/// Obtain a ready `BrowserCapability` per the configured provider.
/// `auto` tries the direct debugger first and falls back to the broker
/// only on a recognized "can't talk to CDP" failure; `cdp`/`broker`
/// force a single path.
pub async fn acquire(config: &BrowserConfig) -> Result<Box<dyn BrowserCapability>> {
    use tinyagi_config::BrowserProvider;

    match config.provider {
        BrowserProvider::Cdp => Ok(Box::new(acquire_cdp(config).await?)),
        BrowserProvider::Broker => Ok(Box::new(acquire_broker(config).await?)),
        BrowserProvider::Auto => match acquire_cdp(config).await {
            Ok(client) => Ok(Box::new(client)),
            Err(err) if should_fall_back_to_broker(&err.to_string()) => {
                warn!(error = %err, "direct CDP attach failed, falling back to automation broker");
                Ok(Box::new(acquire_broker(config).await?))
            }
            Err(err) => Err(err),
        },
    }
}

async fn acquire_cdp(config: &BrowserConfig) -> Result<CdpClient> {
    let (host, port) = resolve_debugger_endpoint(config).await?;
    info!(host = %host, port, "attaching to browser debugger");
    CdpClient::attach(&host, port).await
}

async fn acquire_broker(config: &BrowserConfig) -> Result<BrokerClient> {
    let base_url = config.mcp_channel.as_deref().ok_or_else(|| BrowserError::Other("no automation broker channel configured".into()))?;
    BrokerClient::connect(base_url).await
}
