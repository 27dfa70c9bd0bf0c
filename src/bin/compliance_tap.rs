//! Compliance feed listener
//!
//! Connects to a gateway's `/compliance` WebSocket and prints every
//! transcription event with a UTC timestamp.
//!
//! ```text
//! compliance_tap abc123.ngrok.app
//! compliance_tap wss://abc123.ngrok.app/compliance --raw
//! compliance_tap localhost:3001 --insecure
//! ```

use anyhow::{Context, anyhow};
use chrono::{SecondsFormat, Utc};
use clap::Parser;
use futures::StreamExt;
use serde_json::{Map, Value};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

const DEFAULT_PATH: &str = "/compliance";

/// Listen to /compliance WebSocket events from a public gateway host
#[derive(Parser, Debug)]
#[command(name = "compliance_tap")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Host or full WebSocket URL (e.g. abc123.ngrok.app or wss://abc123.ngrok.app/compliance)
    target: String,

    /// WebSocket path when target is only a host
    #[arg(long, default_value = DEFAULT_PATH)]
    path: String,

    /// Use ws:// instead of wss:// when target is only a host
    #[arg(long)]
    insecure: bool,

    /// Print payloads as received, without JSON formatting
    #[arg(long)]
    raw: bool,
}

/// Resolve the listener URL.
///
/// `http(s)://` targets are mapped to `ws(s)://`. A WebSocket URL keeps its own
/// path unless it is empty or `/`, in which case `path` is used. A bare host
/// gets `wss://` (or `ws://` when `use_tls` is off) and `path`.
fn build_ws_url(target: &str, path: &str, use_tls: bool) -> Result<String, url::ParseError> {
    let target = target.trim();

    let target = if let Some(rest) = target.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if let Some(rest) = target.strip_prefix("https://") {
        format!("wss://{rest}")
    } else {
        target.to_string()
    };

    if target.starts_with("ws://") || target.starts_with("wss://") {
        let mut url = Url::parse(&target)?;
        if url.path().is_empty() || url.path() == "/" {
            url.set_path(path);
        }
        return Ok(url.to_string());
    }

    let scheme = if use_tls { "wss" } else { "ws" };
    let host = target.trim_matches('/');
    Ok(format!("{scheme}://{host}{path}"))
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, sort_keys(value)))
                    .collect::<Map<String, Value>>(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

/// Pretty-print a JSON payload with sorted keys. Non-JSON text is returned as is.
fn format_message(message: &str, raw: bool) -> String {
    if raw {
        return message.to_string();
    }

    match serde_json::from_str::<Value>(message) {
        Ok(payload) => serde_json::to_string_pretty(&sort_keys(payload)).unwrap_or_else(|_| message.to_string()),
        Err(_) => message.to_string(),
    }
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

async fn listen(url: &str, raw: bool) -> anyhow::Result<()> {
    info!("Connecting to {url}");
    let (socket, _) = connect_async(url)
        .await
        .with_context(|| format!("Failed to connect to {url}"))?;
    info!("Connected. Waiting for compliance events... (Ctrl+C to stop)");

    let (_, mut receiver) = socket.split();
    while let Some(frame) = receiver.next().await {
        match frame.context("Compliance socket error")? {
            Message::Text(text) => {
                println!("[{}]", timestamp());
                println!("{}", format_message(text.as_str(), raw));
            }
            Message::Binary(bytes) => {
                println!("[{}] <binary {} bytes>", timestamp(), bytes.len());
            }
            Message::Close(frame) => {
                info!(?frame, "Server closed the compliance feed");
                break;
            }
            _ => {}
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Needed before the first wss:// handshake
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();
    let url = build_ws_url(&cli.target, &cli.path, !cli.insecure)
        .with_context(|| format!("Invalid target '{}'", cli.target))?;

    tokio::select! {
        result = listen(&url, cli.raw) => result,
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!("Failed to listen for Ctrl-C: {}", e);
            }
            println!("\nStopped.");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_host_defaults_to_wss() {
        assert_eq!(
            build_ws_url("abc123.ngrok.app", DEFAULT_PATH, true).unwrap(),
            "wss://abc123.ngrok.app/compliance"
        );
    }

    #[test]
    fn test_bare_host_insecure_uses_ws_and_custom_path() {
        assert_eq!(
            build_ws_url(" localhost:3001/ ", "/feed", false).unwrap(),
            "ws://localhost:3001/feed"
        );
    }

    #[test]
    fn test_http_schemes_map_to_websocket_schemes() {
        assert_eq!(
            build_ws_url("https://abc123.ngrok.app", DEFAULT_PATH, true).unwrap(),
            "wss://abc123.ngrok.app/compliance"
        );
        assert_eq!(
            build_ws_url("http://localhost:3001/", DEFAULT_PATH, true).unwrap(),
            "ws://localhost:3001/compliance"
        );
    }

    #[test]
    fn test_websocket_url_keeps_its_own_path_and_query() {
        assert_eq!(
            build_ws_url("wss://abc123.ngrok.app/tap?x=1", DEFAULT_PATH, false).unwrap(),
            "wss://abc123.ngrok.app/tap?x=1"
        );
    }

    #[test]
    fn test_invalid_websocket_url_is_rejected() {
        assert!(build_ws_url("ws://", DEFAULT_PATH, true).is_err());
    }

    #[test]
    fn test_format_message_sorts_and_indents_json() {
        assert_eq!(
            format_message(r#"{"b":1,"a":{"d":2,"c":3}}"#, false),
            "{\n  \"a\": {\n    \"c\": 3,\n    \"d\": 2\n  },\n  \"b\": 1\n}"
        );
    }

    #[test]
    fn test_format_message_passes_through_raw_and_non_json() {
        assert_eq!(format_message(r#"{"b":1}"#, true), r#"{"b":1}"#);
        assert_eq!(format_message("not json", false), "not json");
    }
}
