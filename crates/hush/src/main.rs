use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reqwest::Client;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

// ── CLI definition ─────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "hush", about = "hush — share secrets that burn after reading", version)]
struct Cli {
    /// hush server URL (default: http://localhost:8080 or $HUSH_SERVER)
    #[arg(long, env = "HUSH_SERVER", default_value = "http://localhost:8080")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the hush HTTP server
    Serve {
        /// Port to listen on (default: $HUSH_PORT or 8080)
        #[arg(long, env = "HUSH_PORT", default_value = "8080")]
        port: u16,
        /// Host to bind (default: $HUSH_HOST or 0.0.0.0)
        #[arg(long, env = "HUSH_HOST", default_value = "0.0.0.0")]
        host: String,
        /// Keep secrets in memory only
        #[arg(long, env = "HUSH_IN_MEMORY")]
        in_memory: bool,
    },
    /// Store a secret and print its hash
    Push {
        /// Secret text
        text: String,
        /// Number of reads before the secret is destroyed
        #[arg(long, default_value = "1")]
        views: u32,
        /// Lifetime e.g. 30m, 2h, 7d (rounded up to whole minutes; default: no time limit)
        #[arg(long)]
        ttl: Option<String>,
    },
    /// Read a secret, consuming one view
    Get {
        /// Secret hash
        hash: String,
    },
    /// Print the retrieval URL for a secret
    Share {
        /// Secret hash
        hash: String,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.command {
        Commands::Serve { .. } => "info",
        _ => "warn",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("HUSH_LOG_LEVEL")
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Commands::Serve {
            port,
            host,
            in_memory,
        } => {
            let cfg = hush_server::ServerConfig {
                host,
                port,
                in_memory,
                ..Default::default()
            };
            hush_server::run(cfg).await
        }

        Commands::Push { text, views, ttl } => {
            let minutes = ttl.as_deref().map(parse_minutes).transpose()?.unwrap_or(0);
            cmd_push(&cli.server, &text, views, minutes).await
        }

        Commands::Get { hash } => cmd_get(&cli.server, &hash).await,

        Commands::Share { hash } => {
            println!("{}", secret_url(&cli.server, &hash));
            Ok(())
        }
    }
}

// ── Command implementations ───────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SecretBody {
    secret_text: String,
    hash: String,
    remaining_views: i64,
    expires_at: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    description: String,
}

async fn cmd_push(server: &str, text: &str, views: u32, minutes: u64) -> Result<()> {
    let views = views.to_string();
    let minutes = minutes.to_string();
    let resp = Client::new()
        .post(format!("{}/v1/secret", server.trim_end_matches('/')))
        .header(reqwest::header::ACCEPT, "application/json")
        .form(&[
            ("secret", text),
            ("expireAfterViews", views.as_str()),
            ("expireAfter", minutes.as_str()),
        ])
        .send()
        .await
        .context("HTTP request failed")?;

    let secret: SecretBody = parse_response(resp).await?;
    println!("{}", secret.hash);
    let expiry = secret.expires_at.as_deref().unwrap_or("never");
    eprintln!(
        "✓ stored — {} view(s), expires {}",
        secret.remaining_views, expiry
    );
    Ok(())
}

async fn cmd_get(server: &str, hash: &str) -> Result<()> {
    let resp = Client::new()
        .get(secret_url(server, hash))
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .await
        .context("HTTP request failed")?;

    let secret: SecretBody = parse_response(resp).await?;
    println!("{}", secret.secret_text);
    eprintln!("{} view(s) left", secret.remaining_views);
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn secret_url(server: &str, hash: &str) -> String {
    format!("{}/v1/secret/{}", server.trim_end_matches('/'), hash)
}

async fn parse_response(resp: reqwest::Response) -> Result<SecretBody> {
    let status = resp.status();
    if status.is_success() {
        return resp.json().await.context("parse response");
    }
    match resp.json::<ErrorBody>().await {
        Ok(err) => anyhow::bail!("{}", err.description),
        Err(_) => anyhow::bail!("server returned {status}"),
    }
}

/// Parse human duration strings like "90s", "30m", "7d" into whole minutes, rounding up.
fn parse_minutes(s: &str) -> Result<u64> {
    let d: humantime::Duration = s
        .parse()
        .with_context(|| format!("invalid duration: {s}"))?;
    Ok(d.as_secs().div_ceil(60))
}
