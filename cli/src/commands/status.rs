// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `festpass status` - client side of the polling protocol.
//!
//! With `--watch`, polls at the fixed interval for the bounded attempt
//! count (~60s) and then stops client-side; the server keeps processing and
//! the command can simply be re-run later.

use anyhow::{bail, Context, Result};
use colored::Colorize;

use festpass_core::application::status::{MAX_POLL_ATTEMPTS, POLL_INTERVAL};

pub async fn run(base_url: &str, id: &str, watch: bool) -> Result<()> {
    let client = reqwest::Client::new();
    let url = format!("{}/registrations/{}/status", base_url.trim_end_matches('/'), id);

    let attempts = if watch { MAX_POLL_ATTEMPTS } else { 1 };
    for attempt in 1..=attempts {
        let response = client
            .get(&url)
            .send()
            .await
            .context("status request failed")?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            bail!("registration not found: {id}");
        }
        if !response.status().is_success() {
            bail!("status request failed: HTTP {}", response.status());
        }

        let view: serde_json::Value = response.json().await.context("invalid status payload")?;
        render(&view);

        let status = view["status"].as_str().unwrap_or_default();
        if matches!(status, "completed" | "partial" | "failed") {
            return Ok(());
        }

        if attempt < attempts {
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    if watch {
        println!(
            "{}",
            "Still processing - the server keeps working; run `festpass status --watch` again later."
                .dimmed()
        );
    }
    Ok(())
}

fn render(view: &serde_json::Value) {
    let code = view["registration_code"].as_str().unwrap_or("?");
    let status = view["status"].as_str().unwrap_or("?");

    let colored_status = match status {
        "completed" => status.green().bold(),
        "partial" => status.yellow().bold(),
        "failed" => status.red().bold(),
        _ => status.cyan(),
    };
    println!("{code}  {colored_status}");

    if let Some(message) = view["error_message"].as_str() {
        println!("  {} {message}", "error:".red());
    }

    if let Some(refs) = view["credential_refs"].as_array() {
        for r in refs {
            let name = r["participant_name"].as_str().unwrap_or("?");
            let url = r["url"].as_str().unwrap_or("?");
            let tag = if r["placeholder"].as_bool().unwrap_or(false) {
                " (placeholder)".dimmed().to_string()
            } else {
                String::new()
            };
            println!("  {name}{tag}\n    {url}");
        }
    }
}
