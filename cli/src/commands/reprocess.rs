// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `festpass reprocess` - operator recovery for failed/partial registrations.

use anyhow::{bail, Context, Result};
use colored::Colorize;

pub async fn run(base_url: &str, id: &str, token: &str) -> Result<()> {
    let client = reqwest::Client::new();
    let url = format!(
        "{}/registrations/{}/reprocess",
        base_url.trim_end_matches('/'),
        id
    );

    let response = client
        .post(&url)
        .bearer_auth(token)
        .send()
        .await
        .context("reprocess request failed")?;

    match response.status() {
        reqwest::StatusCode::ACCEPTED => {
            let body: serde_json::Value = response.json().await.context("invalid response")?;
            let job_id = body["job"]["id"].as_str().unwrap_or("?").to_string();
            println!("{} job {job_id} enqueued", "reprocess:".green().bold());
            Ok(())
        }
        reqwest::StatusCode::UNAUTHORIZED => bail!("operator token rejected"),
        reqwest::StatusCode::NOT_FOUND => bail!("registration not found: {id}"),
        reqwest::StatusCode::CONFLICT => {
            let body: serde_json::Value = response.json().await.unwrap_or_default();
            bail!(
                "{}",
                body["error"].as_str().unwrap_or("registration is not in a recoverable state")
            )
        }
        status => bail!("reprocess failed: HTTP {status}"),
    }
}
