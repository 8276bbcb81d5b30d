//! Commands operating on labeled roots: mkdir, link, unlink, stat, list,
//! push, pull — the path-level surface exposed by the minion's HTTP IPC.

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;

use super::http::{base_url, get_json, post_json, post_json_body};

fn split_path(path: &str) -> Vec<String> {
    path.split('/').filter(|s| !s.is_empty()).map(str::to_string).collect()
}

pub async fn cmd_roots_list(port: u16) -> Result<()> {
    let url = format!("{}/roots", base_url(port));
    let roots: Vec<(String, String)> = get_json(&url).await?;
    if roots.is_empty() {
        println!("(no roots registered)");
        return Ok(());
    }
    for (label, key) in roots {
        println!("{label}  {key}");
    }
    Ok(())
}

#[derive(Serialize)]
struct MkdirBody<'a> {
    path: Vec<String>,
    name: &'a str,
}

pub async fn cmd_mkdir(port: u16, label: &str, dest: &str) -> Result<()> {
    let (path, name) = split_dest(dest)?;
    let url = format!("{}/roots/{label}/mkdir", base_url(port));
    let resp: Value = post_json_body(&url, &MkdirBody { path, name: &name }).await?;
    println!("{label} -> {}", resp["root"].as_str().unwrap_or("?"));
    Ok(())
}

#[derive(Serialize)]
struct LinkBody<'a> {
    path: Vec<String>,
    name: &'a str,
    key: &'a str,
    size: u64,
}

pub async fn cmd_link(port: u16, label: &str, dest: &str, key: &str, size: u64) -> Result<()> {
    let (path, name) = split_dest(dest)?;
    let url = format!("{}/roots/{label}/link", base_url(port));
    let resp: Value = post_json_body(
        &url,
        &LinkBody {
            path,
            name: &name,
            key,
            size,
        },
    )
    .await?;
    println!("{label} -> {}", resp["root"].as_str().unwrap_or("?"));
    Ok(())
}

#[derive(Serialize)]
struct UnlinkBody<'a> {
    path: Vec<String>,
    name: &'a str,
}

pub async fn cmd_unlink(port: u16, label: &str, dest: &str) -> Result<()> {
    let (path, name) = split_dest(dest)?;
    let url = format!("{}/roots/{label}/unlink", base_url(port));
    let resp: Value = post_json_body(&url, &UnlinkBody { path, name: &name }).await?;
    println!("{label} -> {}", resp["root"].as_str().unwrap_or("?"));
    Ok(())
}

pub async fn cmd_stat(port: u16, label: &str, dest: &str) -> Result<()> {
    let (path, name) = split_dest(dest)?;
    let path_str = path.join("/");
    let url = format!(
        "{}/roots/{label}/stat?path={}&name={}",
        base_url(port),
        urlencode(&path_str),
        urlencode(&name)
    );
    let resp: Value = get_json(&url).await?;
    println!("{}", serde_json::to_string_pretty(&resp)?);
    Ok(())
}

pub async fn cmd_list(port: u16, label: &str, path: &str) -> Result<()> {
    let url = format!("{}/roots/{label}/list?path={}", base_url(port), urlencode(path));
    let entries: Vec<(String, Value)> = get_json(&url).await?;
    for (name, meta) in entries {
        let is_dir = meta["is_directory"].as_bool().unwrap_or(false);
        let size = meta["size"].as_u64().unwrap_or(0);
        let marker = if is_dir { "/" } else { "" };
        println!("{name}{marker}\t{size}");
    }
    Ok(())
}

pub async fn cmd_push(port: u16, label: &str) -> Result<()> {
    let url = format!("{}/roots/{label}/push", base_url(port));
    let resp: Value = post_json(&url).await?;
    println!(
        "pushed {}: transferred {}, already present {}",
        label,
        resp["transferred"].as_u64().unwrap_or(0),
        resp["already_present"].as_u64().unwrap_or(0)
    );
    Ok(())
}

pub async fn cmd_pull(port: u16, label: &str) -> Result<()> {
    let url = format!("{}/roots/{label}/pull", base_url(port));
    let resp: Value = post_json(&url).await?;
    println!(
        "pulled {}: root {}, transferred {}, already present {}",
        label,
        resp["root"].as_str().unwrap_or("?"),
        resp["transferred"].as_u64().unwrap_or(0),
        resp["already_present"].as_u64().unwrap_or(0)
    );
    Ok(())
}

/// Splits `a/b/c` into (`["a", "b"]`, `"c"`) — the parent directory trail
/// and the leaf entry name every mkdir/link/unlink/stat call acts on.
fn split_dest(dest: &str) -> Result<(Vec<String>, String)> {
    let mut parts = split_path(dest);
    let name = parts.pop().context("path must name an entry")?;
    Ok((parts, name))
}

fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}
