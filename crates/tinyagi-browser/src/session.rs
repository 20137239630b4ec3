// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Locates or launches a Chrome instance with a reachable debugger
//! (spec 4.I "Session").
use std::path::PathBuf;
use std::time::Duration;

use rand::Rng;
use tinyagi_config::BrowserConfig;
use tokio::process::Command;
use tracing::{info, warn};

use crate::cdp::CdpClient;
use crate::error::{BrowserError, Result};
use crate::profile::ensure_mirror;

const CHROME_BINARIES: [&str; 4] = ["google-chrome", "google-chrome-stable", "chromium", "chromium-browser"];
const READY_TIMEOUT: Duration = Duration::from_secs(12);

fn parse_debugger_url(url: &str) -> Option<(String, u16)> {
    let stripped = url.trim_start_matches("http://").trim_start_matches("https://");
    let (host, port) = stripped.split_once(':')?;
    let port: u16 = port.trim_end_matches('/').parse().ok()?;
    Some((host.to_string(), port))
}

/// Try the configured `debugger_url`, then scan the configured port
/// range for an already-live debugger, then mirror the profile and
/// launch a fresh Chrome. Returns the `(host, port)` to attach to.
pub async fn resolve_debugger_endpoint(config: &BrowserConfig) -> Result<(String, u16)> {
    if let Some(url) = &config.debugger_url {
        let (host, port) = parse_debugger_url(url).ok_or_else(|| BrowserError::Other(format!("invalid debugger_url: {url}")))?;
        if CdpClient::wait_until_ready(&host, port, Duration::from_secs(2)).await.is_ok() {
            return Ok((host, port));
        }
        warn!(url, "configured debugger_url is not reachable, continuing discovery");
    }

    let (low, high) = config.debugger_ports;
    for port in low..=high {
        if CdpClient::wait_until_ready("127.0.0.1", port, Duration::from_millis(200)).await.is_ok() {
            info!(port, "found already-live debugger session");
            return Ok(("127.0.0.1".to_string(), port));
        }
    }

    launch_with_mirrored_profile(config).await
}

async fn launch_with_mirrored_profile(config: &BrowserConfig) -> Result<(String, u16)> {
    let profile_path = config.profile_path.as_deref().ok_or(BrowserError::WillNotRelaunch("no profile_path configured".into()))?;
    let profile_dir = config.profile_directory.as_deref().unwrap_or("Default");

    let mirror_root = PathBuf::from(profile_path).join(".tinyagi-browser-mirror");
    let mirror_dir = ensure_mirror(&PathBuf::from(profile_path), profile_dir, &mirror_root)?;

    let (low, high) = config.debugger_ports;
    let port = rand::thread_rng().gen_range(low..=high);

    let binary = find_chrome_binary().ok_or_else(|| BrowserError::WillNotRelaunch("no chrome binary found on PATH".into()))?;

    info!(binary = %binary, port, mirror = %mirror_dir.display(), "launching mirrored browser instance");
    Command::new(&binary)
        .arg(format!("--remote-debugging-port={port}"))
        .arg(format!("--user-data-dir={}", mirror_dir.display()))
        .arg(format!("--profile-directory={profile_dir}"))
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .kill_on_drop(false)
        .spawn()
        .map_err(|_| BrowserError::WillNotRelaunch(format!("failed to spawn {binary}")))?;

    CdpClient::wait_until_ready("127.0.0.1", port, READY_TIMEOUT).await?;
    Ok(("127.0.0.1".to_string(), port))
}

fn find_chrome_binary() -> Option<String> {
    CHROME_BINARIES.iter().find(|bin| which(bin)).map(|bin| bin.to_string())
}

fn which(bin: &str) -> bool {
    std::env::var_os("PATH").map(std::env::split_paths).into_iter().flatten().any(|dir| dir.join(bin).is_file())
}
