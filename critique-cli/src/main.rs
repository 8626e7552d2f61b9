//! critique-cli: terminal client for the Critique HTTP API
//!
//! Stands in for the browser UI: scan a page, submit context, and vote on the
//! recommendations that come back.
//!
//! # Subcommands
//! - `scan <url>`  capture a screenshot
//! - `analyze [--url] [--screenshot P]… [--context k=v]… [--json]`
//! - `upvote <analysis> <rec>` / `downvote <analysis> <rec>`
//! - `show <analysis>`  current ranked payload
//! - `status`  server health
//! - `review <url> [--context k=v]…`  scan → details → results

mod flow;

use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

use flow::{Event, Flow, FlowError};

const DEFAULT_SERVER: &str = "http://127.0.0.1:8787";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "critique-cli",
    version,
    about = "Critique: design recommendations for a web page"
)]
struct Cli {
    /// Critique HTTP server URL (overrides CRITIQUE_HTTP_URL env var)
    #[arg(long, env = "CRITIQUE_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Capture a screenshot of a page
    Scan {
        url: String,
    },

    /// Request recommendations for a page
    Analyze {
        #[arg(long)]
        url: Option<String>,

        /// Stored screenshot path returned by `scan` (repeatable)
        #[arg(long = "screenshot")]
        screenshots: Vec<String>,

        /// Context entry as key=value (repeatable)
        #[arg(long = "context", value_name = "KEY=VALUE")]
        context: Vec<String>,

        /// Print the raw JSON payload
        #[arg(long)]
        json: bool,
    },

    /// Upvote a recommendation
    Upvote {
        analysis_id: String,
        rec_id: String,
    },

    /// Downvote a recommendation; it is removed from the slate
    Downvote {
        analysis_id: String,
        rec_id: String,
    },

    /// Show the current ranked recommendations of an analysis
    Show {
        analysis_id: String,

        #[arg(long)]
        json: bool,
    },

    /// Show Critique server status
    Status,

    /// Scan a page, then analyze it with the given context
    Review {
        url: String,

        #[arg(long = "context", value_name = "KEY=VALUE")]
        context: Vec<String>,
    },
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationView {
    pub id: String,
    pub category: String,
    pub title: String,
    pub impact: String,
    pub confidence: String,
    #[serde(default)]
    pub why_it_matters: String,
    #[serde(default)]
    pub what_to_change: Vec<String>,
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    #[serde(default)]
    pub analytics: Vec<String>,
    #[serde(default)]
    pub anchors: Vec<String>,
    #[serde(default)]
    pub votes: u32,
}

/// Payload of `/analyze` and `/analysis/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisView {
    pub analysis_id: String,
    #[serde(default)]
    pub summary: String,
    pub recommendations: Vec<RecommendationView>,
    pub recommendations_all: Vec<RecommendationView>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanView {
    pub screenshot_path: String,
    pub screenshot_url: String,
}

#[derive(Error, Debug)]
pub enum CliError {
    #[error("connection failed to {url}: {source}")]
    Connection {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("server returned {status}: {message}")]
    Server { status: u16, message: String },

    #[error("invalid context entry '{0}', expected KEY=VALUE")]
    InvalidContext(String),
}

// ============================================================================
// Helpers
// ============================================================================

/// Parse repeated `key=value` arguments into a context object.
pub fn parse_context(entries: &[String]) -> Result<Map<String, Value>, CliError> {
    let mut map = Map::new();
    for entry in entries {
        let (key, value) = entry
            .split_once('=')
            .ok_or_else(|| CliError::InvalidContext(entry.clone()))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(CliError::InvalidContext(entry.clone()));
        }
        map.insert(key.to_string(), Value::String(value.trim().to_string()));
    }
    Ok(map)
}

/// Human-readable results view: the slate, then the backlog.
pub fn render_view(view: &AnalysisView) -> String {
    let mut out = String::new();
    out.push_str(&format!("Analysis {}\n", view.analysis_id));
    if !view.summary.is_empty() {
        out.push_str(&format!("\n{}\n", view.summary));
    }

    if view.recommendations.is_empty() {
        out.push_str("\nNo active recommendations.\n");
        return out;
    }

    out.push_str("\nTop recommendations\n");
    for (i, rec) in view.recommendations.iter().enumerate() {
        out.push_str(&format!(
            "{}. [{}] {} (impact {}, confidence {}, votes {})  id={}\n",
            i + 1,
            rec.category,
            rec.title,
            rec.impact,
            rec.confidence,
            rec.votes,
            rec.id
        ));
        if !rec.why_it_matters.is_empty() {
            out.push_str(&format!("   {}\n", rec.why_it_matters));
        }
        for change in &rec.what_to_change {
            out.push_str(&format!("   - {}\n", change));
        }
    }

    let backlog = &view.recommendations_all[view.recommendations.len().min(view.recommendations_all.len())..];
    if !backlog.is_empty() {
        out.push_str(&format!("\nBacklog ({})\n", backlog.len()));
        for rec in backlog {
            out.push_str(&format!("   {}  id={}\n", rec.title, rec.id));
        }
    }
    out
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

struct Api {
    client: reqwest::blocking::Client,
    server: String,
}

impl Api {
    fn new(server: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            server: server.trim_end_matches('/').to_string(),
        })
    }

    fn handle(&self, url: String, resp: reqwest::Result<reqwest::blocking::Response>) -> Result<Value, CliError> {
        let resp = resp.map_err(|source| CliError::Connection { url, source })?;
        let status = resp.status();
        let body: Value = resp.json().unwrap_or(Value::Null);
        if !status.is_success() {
            let message = body["error"].as_str().unwrap_or("unknown error").to_string();
            return Err(CliError::Server {
                status: status.as_u16(),
                message,
            });
        }
        Ok(body)
    }

    fn post(&self, path: &str, body: &Value) -> Result<Value, CliError> {
        let url = format!("{}{}", self.server, path);
        let resp = self.client.post(&url).json(body).send();
        self.handle(url, resp)
    }

    fn get(&self, path: &str) -> Result<Value, CliError> {
        let url = format!("{}{}", self.server, path);
        let resp = self.client.get(&url).send();
        self.handle(url, resp)
    }

    fn scan(&self, url: &str) -> anyhow::Result<ScanView> {
        Ok(serde_json::from_value(self.post("/scan", &json!({ "url": url }))?)?)
    }

    fn analyze(&self, body: Value) -> anyhow::Result<AnalysisView> {
        Ok(serde_json::from_value(self.post("/analyze", &body)?)?)
    }

    fn fetch(&self, analysis_id: &str) -> anyhow::Result<AnalysisView> {
        Ok(serde_json::from_value(self.get(&format!("/analysis/{}", analysis_id))?)?)
    }

    fn vote(&self, action: &str, analysis_id: &str, rec_id: &str) -> anyhow::Result<AnalysisView> {
        self.analyze(json!({
            "action": action,
            "rec_id": rec_id,
            "analysis_id": analysis_id,
        }))
    }
}

fn print_view(view: &AnalysisView, json_output: bool) -> anyhow::Result<()> {
    if json_output {
        println!("{}", serde_json::to_string_pretty(view)?);
    } else {
        print!("{}", render_view(view));
    }
    Ok(())
}

fn do_scan(api: &Api, url: &str) -> anyhow::Result<()> {
    let scan = api.scan(url)?;
    println!("Screenshot: {}", scan.screenshot_path);
    println!("URL:        {}", scan.screenshot_url);
    Ok(())
}

fn do_analyze(
    api: &Api,
    url: Option<String>,
    screenshots: Vec<String>,
    context: &[String],
    json_output: bool,
) -> anyhow::Result<()> {
    let context = parse_context(context)?;
    let view = api.analyze(json!({
        "url": url,
        "screenshotPaths": screenshots,
        "context": context,
    }))?;
    print_view(&view, json_output)
}

fn do_show(api: &Api, analysis_id: &str, json_output: bool) -> anyhow::Result<()> {
    print_view(&api.fetch(analysis_id)?, json_output)
}

/// Results flow for `current`, refreshed with the payload a vote returned.
fn refreshed(current: AnalysisView, updated: AnalysisView) -> Result<Flow, FlowError> {
    let mut flow = Flow::resume(current);
    flow.apply(Event::Refreshed(updated))?;
    Ok(flow)
}

fn do_vote(api: &Api, action: &str, analysis_id: &str, rec_id: &str) -> anyhow::Result<()> {
    let current = api.fetch(analysis_id)?;
    let flow = refreshed(current, api.vote(action, analysis_id, rec_id)?)?;
    if let Some(view) = flow.view() {
        print_view(view, false)?;
    }
    Ok(())
}

fn do_review(api: &Api, url: &str, context: &[String]) -> anyhow::Result<()> {
    let context = parse_context(context)?;
    let mut flow = Flow::default();

    eprintln!("Scanning {} ...", url);
    let scan = api.scan(url)?;
    flow.apply(Event::Scanned {
        url: url.to_string(),
        screenshot_path: scan.screenshot_path,
        screenshot_url: scan.screenshot_url,
    })?;

    let body = match &flow {
        Flow::Details {
            url,
            screenshot_path,
            ..
        } => json!({
            "url": url,
            "screenshotPath": screenshot_path,
            "context": context,
        }),
        other => anyhow::bail!("unexpected state {}", other.name()),
    };

    eprintln!("Analyzing ...");
    flow.apply(Event::Analyzed(api.analyze(body)?))?;

    if let Some(view) = flow.view() {
        print!("{}", render_view(view));
        println!(
            "\nVote with: critique-cli upvote|downvote {} <id>",
            view.analysis_id
        );
    }
    Ok(())
}

/// Show the server status by calling GET /health.
fn do_status(api: &Api) -> anyhow::Result<()> {
    match api.get("/health") {
        Ok(body) => {
            println!("Critique server: {}", body["status"].as_str().unwrap_or("unknown"));
            println!("Version:         {}", body["version"].as_str().unwrap_or("?"));
            println!("PostgreSQL:      {}", body["postgresql"].as_str().unwrap_or("?"));
            println!("Model:           {}", body["model"].as_str().unwrap_or("not configured"));
            println!(
                "Screenshots:     {}",
                if body["screenshots"].as_bool().unwrap_or(false) { "configured" } else { "not configured" }
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("critique-cli: server unhealthy: {}", e);
            std::process::exit(1);
        }
    }
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();

    // Model calls can take a while.
    let api = match Api::new(&cli.server, Duration::from_secs(180)) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("critique-cli: {}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Scan { url } => do_scan(&api, &url),
        Commands::Analyze {
            url,
            screenshots,
            context,
            json,
        } => do_analyze(&api, url, screenshots, &context, json),
        Commands::Upvote { analysis_id, rec_id } => do_vote(&api, "upvote", &analysis_id, &rec_id),
        Commands::Downvote { analysis_id, rec_id } => {
            do_vote(&api, "downvote", &analysis_id, &rec_id)
        }
        Commands::Show { analysis_id, json } => do_show(&api, &analysis_id, json),
        Commands::Status => do_status(&api),
        Commands::Review { url, context } => do_review(&api, &url, &context),
    };

    if let Err(e) = result {
        eprintln!("critique-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================
