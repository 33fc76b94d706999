//! recap-cli: operator frontend for the Recap HTTP API
//!
//! # Subcommands
//! - `turn <session> <role> <text> [--timestamp <ms>]`  record a turn
//! - `signal <session> [--last-version <n>]`           assistant-turn signal
//! - `summary <session> [--json]`                      newest summary
//! - `cadence <session>`                               cadence counters and lock
//! - `release <session>`                               clear a stuck lock
//! - `status`                                          server health

use clap::{Parser, Subcommand};
use serde::Deserialize;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8767";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "recap-cli",
    version,
    about = "Recap session summary coordinator CLI"
)]
struct Cli {
    /// Recap HTTP server URL (overrides RECAP_HTTP_URL env var)
    #[arg(long, env = "RECAP_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Record a conversation turn
    Turn {
        session: String,

        /// "user" or "assistant"
        role: String,

        text: String,

        /// Turn time in epoch milliseconds (server clock when omitted)
        #[arg(long)]
        timestamp: Option<i64>,
    },

    /// Signal an assistant turn without recording text
    Signal {
        session: String,

        /// Summary version the client last saw
        #[arg(long)]
        last_version: Option<i64>,
    },

    /// Show the newest summary for a session
    Summary {
        session: String,

        /// Print the raw summary row as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show cadence state for a session
    Cadence { session: String },

    /// Release a held generation lock
    Release { session: String },

    /// Show Recap server status
    Status,
}

// ============================================================================
// API Response Types
// ============================================================================

/// Summary row as returned by GET /sessions/:id/summary
#[derive(Debug, Deserialize)]
pub struct SummaryView {
    pub version: i64,
    pub text: String,
    pub last_message_ts: i64,
    #[serde(default)]
    pub meta: serde_json::Value,
}

/// Cadence state as returned by GET /sessions/:id/cadence
#[derive(Debug, Deserialize)]
pub struct CadenceView {
    pub session_id: String,
    pub turns_since: i64,
    pub assistant_msg_since: i64,
    pub last_generated_at: i64,
    pub last_version: i64,
    pub lock_until: i64,
    #[serde(default)]
    pub locked: bool,
}

// ============================================================================
// Output formatting
// ============================================================================

pub fn format_summary(session: &str, s: &SummaryView) -> String {
    let source = s.meta["source"].as_str().unwrap_or("?");
    format!(
        "# {} v{} (source: {}, cutoff: {})\n\n{}",
        session, s.version, source, s.last_message_ts, s.text
    )
}

pub fn format_cadence(c: &CadenceView) -> String {
    let generated = if c.last_generated_at == 0 {
        "never".to_string()
    } else {
        c.last_generated_at.to_string()
    };
    let lock = if c.locked {
        format!("held until {}", c.lock_until)
    } else {
        "free".to_string()
    };
    format!(
        "Session:          {}\n\
         Assistant turns:  {}\n\
         Turns:            {}\n\
         Last version:     {}\n\
         Last generated:   {}\n\
         Lock:             {}",
        c.session_id, c.assistant_msg_since, c.turns_since, c.last_version, generated, lock
    )
}

/// One-line rendering of a turn or signal receipt.
pub fn format_receipt(body: &serde_json::Value) -> String {
    let verdict = &body["verdict"];
    let dispatch = body["dispatch"]["dispatch"].as_str().unwrap_or("idle");
    if verdict.is_null() {
        return format!("recorded (dispatch: {})", dispatch);
    }

    let mut line = format!(
        "assistant_msg_since={} due={} locked={} dispatch={}",
        verdict["assistant_msg_since"],
        verdict["due_now"].as_bool().unwrap_or(false),
        verdict["locked"].as_bool().unwrap_or(false),
        dispatch
    );
    if let Some(reason) = verdict["reason"].as_str() {
        line.push_str(&format!(" reason={}", reason));
    }
    if let Some(version) = body["dispatch"]["outcome"]["version"].as_i64() {
        line.push_str(&format!(" version={}", version));
    }
    if let Some(err) = body["dispatch"]["error"].as_str() {
        line.push_str(&format!(" error={}", err));
    }
    line
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

fn client() -> anyhow::Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()?)
}

/// Send a request, exiting with a message on connection failure or a
/// non-success status. 404 is reported as "no such session".
fn send(req: reqwest::blocking::RequestBuilder, url: &str) -> serde_json::Value {
    let resp = match req.send() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("recap-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };

    let status = resp.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        eprintln!("recap-cli: no such session");
        std::process::exit(2);
    }
    if !status.is_success() {
        let body = resp.text().unwrap_or_default();
        eprintln!("recap-cli: server returned {}: {}", status, body);
        std::process::exit(1);
    }

    match resp.json() {
        Ok(v) => v,
        Err(e) => {
            eprintln!("recap-cli: failed to parse response: {}", e);
            std::process::exit(1);
        }
    }
}

fn do_turn(server: &str, session: &str, role: &str, text: &str, timestamp: Option<i64>) -> anyhow::Result<()> {
    let url = format!("{}/turns", server);
    let body = serde_json::json!({
        "session_id": session,
        "role": role,
        "text": text,
        "timestamp": timestamp,
    });
    let resp = send(client()?.post(&url).json(&body), &url);
    println!("{}", format_receipt(&resp));
    Ok(())
}

fn do_signal(server: &str, session: &str, last_version: Option<i64>) -> anyhow::Result<()> {
    let url = format!("{}/signal", server);
    let body = serde_json::json!({
        "session_id": session,
        "last_known_version": last_version,
    });
    let resp = send(client()?.post(&url).json(&body), &url);
    println!("{}", format_receipt(&resp));
    Ok(())
}

fn do_summary(server: &str, session: &str, json_output: bool) -> anyhow::Result<()> {
    let url = format!("{}/sessions/{}/summary", server, session);
    let resp = send(client()?.get(&url), &url);

    if json_output {
        println!("{}", serde_json::to_string_pretty(&resp)?);
    } else {
        let view: SummaryView = serde_json::from_value(resp)?;
        println!("{}", format_summary(session, &view));
    }
    Ok(())
}

fn do_cadence(server: &str, session: &str) -> anyhow::Result<()> {
    let url = format!("{}/sessions/{}/cadence", server, session);
    let resp = send(client()?.get(&url), &url);
    let view: CadenceView = serde_json::from_value(resp)?;
    println!("{}", format_cadence(&view));
    Ok(())
}

fn do_release(server: &str, session: &str) -> anyhow::Result<()> {
    let url = format!("{}/sessions/{}/release", server, session);
    send(client()?.post(&url).json(&serde_json::json!({})), &url);
    println!("released {}", session);
    Ok(())
}

/// Show the server status by calling GET /health.
fn do_status(server: &str) -> anyhow::Result<()> {
    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .build()?;

    let url = format!("{}/health", server);
    match client.get(&url).send() {
        Ok(r) if r.status().is_success() => {
            let body: serde_json::Value = r.json().unwrap_or_default();
            println!("Recap server: {}", body["status"].as_str().unwrap_or("unknown"));
            println!("Version:      {}", body["version"].as_str().unwrap_or("?"));
            println!("Store:        {}", body["store"].as_str().unwrap_or("?"));
            println!("PostgreSQL:   {}", body["postgresql"].as_str().unwrap_or("n/a"));
            println!("Generator:    {}", body["generator"].as_str().unwrap_or("?"));
            println!("Socket:       {}", body["socket"].as_str().unwrap_or("?"));
        }
        Ok(r) => {
            eprintln!("recap-cli: server unhealthy (HTTP {})", r.status());
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("recap-cli: cannot reach {}: {}", url, e);
            std::process::exit(1);
        }
    }

    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();

    let result = match cli.command {
        Commands::Turn {
            session,
            role,
            text,
            timestamp,
        } => do_turn(&server, &session, &role, &text, timestamp),
        Commands::Signal {
            session,
            last_version,
        } => do_signal(&server, &session, last_version),
        Commands::Summary { session, json } => do_summary(&server, &session, json),
        Commands::Cadence { session } => do_cadence(&server, &session),
        Commands::Release { session } => do_release(&server, &session),
        Commands::Status => do_status(&server),
    };

    if let Err(e) = result {
        eprintln!("recap-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================
