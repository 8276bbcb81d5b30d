//! Direct chunk upload/download — mostly useful for scripting around the
//! path-level commands (stage a file's bytes, then `link` the resulting key).

use anyhow::{Context, Result};
use std::path::Path;

use super::http::base_url;

pub async fn cmd_put_chunk(port: u16, file: &str) -> Result<()> {
    let data = std::fs::read(file).with_context(|| format!("reading {file}"))?;
    let url = format!("{}/chunks", base_url(port));
    let resp = reqwest::Client::new()
        .put(&url)
        .body(data)
        .send()
        .await
        .with_context(|| format!("failed to connect to vaultd at {url} — is it running?"))?
        .json::<serde_json::Value>()
        .await
        .context("failed to parse response")?;
    println!(
        "{} ({} bytes)",
        resp["key"].as_str().unwrap_or("?"),
        resp["size"].as_u64().unwrap_or(0)
    );
    Ok(())
}

pub async fn cmd_get_chunk(port: u16, key: &str, out_file: &str) -> Result<()> {
    let url = format!("{}/chunks/{key}", base_url(port));
    let bytes = reqwest::get(&url)
        .await
        .with_context(|| format!("failed to connect to vaultd at {url} — is it running?"))?
        .error_for_status()
        .context("vaultd returned an error")?
        .bytes()
        .await
        .context("failed to read response body")?;
    std::fs::write(Path::new(out_file), &bytes).with_context(|| format!("writing {out_file}"))?;
    println!("wrote {} bytes to {out_file}", bytes.len());
    Ok(())
}
