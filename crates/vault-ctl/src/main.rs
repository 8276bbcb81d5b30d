//! vault-ctl — command-line interface for the minion daemon.

use anyhow::{Context, Result};

mod cmd;

const DEFAULT_PORT: u16 = 7421;

fn print_usage() {
    println!("Usage: vault-ctl [--port <port>] <command>");
    println!();
    println!("Roots");
    println!("  roots                           List known labels and their root keys");
    println!("  mkdir <label> <path>            Create a directory at <path> under <label>");
    println!("  link <label> <path> <key> <size>  Link a chunk key into <label> at <path>");
    println!("  unlink <label> <path>           Remove the entry at <path> under <label>");
    println!("  stat <label> <path>             Show metadata for <path> under <label>");
    println!("  list <label> [path]             List the directory at <path> under <label>");
    println!();
    println!("Replication");
    println!("  push <label>                    Upload <label>'s local-only chunks and publish its root");
    println!("  pull <label>                    Fetch <label>'s current root from the root service");
    println!();
    println!("Chunks");
    println!("  put-chunk <file>                Upload a file's bytes as a content-addressed chunk");
    println!("  get-chunk <key> <out-file>      Download a chunk by key to a local file");
    println!();
    println!(
        "Options:\n  --port <port>                   IPC port (default: {})",
        DEFAULT_PORT
    );
    println!();
    println!("Examples:");
    println!("  vault-ctl roots");
    println!("  vault-ctl mkdir build/ docs");
    println!("  vault-ctl put-chunk report.pdf");
    println!("  vault-ctl link build/docs report.pdf <key> 40213");
    println!("  vault-ctl push build");
    println!("  vault-ctl pull build");
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut port = DEFAULT_PORT;
    let mut remaining: Vec<String> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--port" {
            i += 1;
            port = args
                .get(i)
                .context("--port requires a value")?
                .parse()
                .context("--port must be a number")?;
        } else {
            remaining.push(args[i].clone());
        }
        i += 1;
    }

    let r: Vec<&str> = remaining.iter().map(|s| s.as_str()).collect();

    match r.as_slice() {
        ["roots"] | [] => cmd::roots::cmd_roots_list(port).await,
        ["mkdir", label, path] => cmd::roots::cmd_mkdir(port, label, path).await,
        ["link", label, path, key, size] => {
            let size: u64 = size.parse().context("size must be a number")?;
            cmd::roots::cmd_link(port, label, path, key, size).await
        }
        ["unlink", label, path] => cmd::roots::cmd_unlink(port, label, path).await,
        ["stat", label, path] => cmd::roots::cmd_stat(port, label, path).await,
        ["list", label] => cmd::roots::cmd_list(port, label, "").await,
        ["list", label, path] => cmd::roots::cmd_list(port, label, path).await,
        ["push", label] => cmd::roots::cmd_push(port, label).await,
        ["pull", label] => cmd::roots::cmd_pull(port, label).await,
        ["put-chunk", file] => cmd::chunks::cmd_put_chunk(port, file).await,
        ["get-chunk", key, out_file] => cmd::chunks::cmd_get_chunk(port, key, out_file).await,
        ["help"] | ["--help"] | ["-h"] => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
