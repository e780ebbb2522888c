//! imgwatch CLI
//!
//! Command-line interface for the imgwatch daemon.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use imgwatch_core::DaemonConfig;
use imgwatch_ipc::{IpcClient, IpcError, Request, Response, ResponseData};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "imgwatch")]
#[command(about = "imgwatch - live index of the images in a directory")]
#[command(version)]
struct Cli {
    /// Daemon address (default: listen_addr from ~/.imgwatch/config.yaml)
    #[arg(long, global = true)]
    addr: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the imgwatch daemon
    Start {
        /// Directory to watch
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Run in foreground (for debugging)
        #[arg(short, long)]
        foreground: bool,
    },

    /// Stop the imgwatch daemon
    Stop,

    /// Show daemon status
    Status,

    /// List indexed images
    List,

    /// Download an image
    Get {
        /// Image name
        name: String,

        /// Output file (default: ./<name>)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Upload an image into the watched directory
    Upload {
        /// Local file to upload
        path: PathBuf,

        /// Name to store it under (default: the file's name)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Delete an image from the watched directory
    Remove {
        /// Image name
        name: String,
    },

    /// Check if daemon is running
    Ping,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Simple logging for CLI
    if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::fmt().with_target(false).init();
    }

    let cli = Cli::parse();
    let addr = cli
        .addr
        .unwrap_or_else(|| DaemonConfig::load().listen_addr);
    let client = IpcClient::with_addr(addr);
    tracing::debug!(addr = client.addr(), "Using daemon address");

    match cli.command {
        Commands::Start { dir, foreground } => cmd_start(&client, dir, foreground).await,
        Commands::Stop => cmd_stop(&client).await,
        Commands::Status => cmd_status(&client).await,
        Commands::List => cmd_list(&client).await,
        Commands::Get { name, output } => cmd_get(&client, &name, output).await,
        Commands::Upload { path, name } => cmd_upload(&client, &path, name).await,
        Commands::Remove { name } => cmd_remove(&client, &name).await,
        Commands::Ping => cmd_ping(&client).await,
    }
}

async fn cmd_start(client: &IpcClient, dir: Option<PathBuf>, foreground: bool) -> Result<()> {
    let mut command = std::process::Command::new("imgwatch-daemon");
    command.args(["--listen", client.addr()]);
    if let Some(dir) = dir {
        let dir = dir.canonicalize().context("Invalid directory")?;
        command.arg("--dir").arg(dir);
    }

    if foreground {
        println!("Starting imgwatch daemon in foreground...");
        println!("Press Ctrl+C to stop.");

        let status = command
            .status()
            .context("Failed to start daemon. Is imgwatch-daemon in PATH?")?;

        if !status.success() {
            anyhow::bail!("Daemon exited with error");
        }
        return Ok(());
    }

    if client.is_daemon_running().await {
        println!("imgwatch daemon is already running.");
        return Ok(());
    }

    let child = command
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .context("Failed to start daemon. Is imgwatch-daemon in PATH?")?;

    println!("✓ imgwatch daemon started (PID: {})", child.id());
    Ok(())
}

async fn cmd_stop(client: &IpcClient) -> Result<()> {
    if !client.is_daemon_running().await {
        println!("imgwatch daemon is not running.");
        return Ok(());
    }

    match client.request(Request::Shutdown).await {
        Ok(Response::Ack) => {
            println!("✓ imgwatch daemon stopping...");

            // Wait a moment for cleanup
            tokio::time::sleep(Duration::from_millis(500)).await;

            if !client.is_daemon_running().await {
                println!("✓ Daemon stopped.");
            }
        }
        Ok(resp) => {
            println!("Unexpected response: {:?}", resp);
        }
        Err(e) => {
            println!("Failed to stop daemon: {}", e);
        }
    }

    Ok(())
}

async fn cmd_status(client: &IpcClient) -> Result<()> {
    match client.get_status().await {
        Ok(ResponseData::Status {
            version,
            uptime_secs,
            watch_dir,
            images_indexed,
            events_applied,
            requests_total,
            avg_latency_ms,
        }) => {
            println!("imgwatch Daemon v{}", version);
            println!();
            println!("  Status:      Running");
            println!("  Uptime:      {}", format_duration(uptime_secs));
            println!("  Directory:   {}", watch_dir.display());
            println!("  Images:      {} indexed", images_indexed);
            println!("  Changes:     {} applied", events_applied);
            println!();
            println!("  Requests:    {}", requests_total);
            println!("  Avg Latency: {}ms", avg_latency_ms);
        }
        Ok(_) => {
            println!("Unexpected status response");
        }
        Err(IpcError::DaemonNotRunning(_)) => {
            println!("imgwatch daemon is not running.");
            println!("\nStart with: imgwatch start --dir <path>");
        }
        Err(e) => {
            println!("Failed to get status: {}", e);
        }
    }

    Ok(())
}

async fn cmd_list(client: &IpcClient) -> Result<()> {
    let images = client.list_images().await.context("Failed to list images")?;

    if images.is_empty() {
        println!("No images indexed.");
        return Ok(());
    }

    let width = images.iter().map(|i| i.name.len()).max().unwrap_or(0);
    for image in &images {
        println!(
            "{:<width$}  {}x{}",
            image.name,
            image.width,
            image.height,
            width = width
        );
    }
    println!();
    println!("{} image(s)", images.len());

    Ok(())
}

async fn cmd_get(client: &IpcClient, name: &str, output: Option<PathBuf>) -> Result<()> {
    let (info, data) = match client.get_image(name).await {
        Ok(found) => found,
        Err(e) => {
            println!("✗ {}", e);
            return Ok(());
        }
    };

    let output = output.unwrap_or_else(|| PathBuf::from(&info.name));
    tokio::fs::write(&output, &data)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!(
        "✓ Saved {} ({}x{}, {} bytes) to {}",
        info.name,
        info.width,
        info.height,
        data.len(),
        output.display()
    );
    Ok(())
}

async fn cmd_upload(client: &IpcClient, path: &Path, name: Option<String>) -> Result<()> {
    let name = upload_name(path, name)?;
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    match client.upload_image(&name, data).await {
        Ok(info) => {
            println!("✓ Uploaded {} ({}x{})", info.name, info.width, info.height);
        }
        Err(e) => {
            println!("✗ Upload failed: {}", e);
        }
    }

    Ok(())
}

async fn cmd_remove(client: &IpcClient, name: &str) -> Result<()> {
    match client.remove_image(name).await {
        Ok(()) => println!("✓ Removed {}", name),
        Err(e) => println!("✗ Remove failed: {}", e),
    }

    Ok(())
}

async fn cmd_ping(client: &IpcClient) -> Result<()> {
    let start = std::time::Instant::now();
    match client.request(Request::Ping).await {
        Ok(Response::Ok {
            data: Some(ResponseData::Pong { .. }),
        }) => {
            let elapsed = start.elapsed();
            println!("✓ Pong! ({:.2}ms)", elapsed.as_secs_f64() * 1000.0);
        }
        Ok(_) => {
            println!("✗ Unexpected response");
        }
        Err(IpcError::DaemonNotRunning(_)) => {
            println!("✗ Daemon not running");
        }
        Err(e) => {
            println!("✗ Error: {}", e);
        }
    }

    Ok(())
}

/// Name an upload is stored under: explicit, else the local file name
fn upload_name(path: &Path, name: Option<String>) -> Result<String> {
    if let Some(name) = name {
        return Ok(name);
    }
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .with_context(|| format!("Cannot derive a name from {}", path.display()))
}

fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
    }
}
