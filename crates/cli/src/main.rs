use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use indexmap::IndexMap;
use serde_json::Value;
use tracing::Level;

use tokex_api::OauthServer;
use tokex_engine::{
    DriveOutcome, Endpoints, FlowGraph, HttpStepRunner, SessionDriver, SessionState, StepStatus, load_flow_from_file,
};
use tokex_types::StepDefinition;

#[derive(Parser)]
#[command(name = "tokex", version, about = "Interactive OAuth2/OIDC token-exchange walkthrough")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the steps of a flow with their dependencies
    List {
        /// Path to the flow document (YAML or JSON)
        #[arg(long, short = 'f', default_value = "flows/token_exchange.yaml")]
        file: PathBuf,
    },
    /// Validate a flow and show its request templates and substitution rules
    Preview {
        #[arg(long, short = 'f', default_value = "flows/token_exchange.yaml")]
        file: PathBuf,
        /// Only show this step
        #[arg(long)]
        step: Option<String>,
    },
    /// Drive a flow against an OAuth2 server
    Run {
        #[arg(long, short = 'f', default_value = "flows/token_exchange.yaml")]
        file: PathBuf,
        /// Base URL of the OAuth2 authorization server
        #[arg(long)]
        server: String,
        /// Request timeout in seconds
        #[arg(long, default_value_t = HttpStepRunner::DEFAULT_TIMEOUT.as_secs())]
        timeout_secs: u64,
        /// Use the OpenID Connect discovery document instead of RFC 8414
        #[arg(long)]
        openid: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::List { file } => list(&file),
        Command::Preview { file, step } => preview(&file, step.as_deref()),
        Command::Run {
            file,
            server,
            timeout_secs,
            openid,
        } => run(&file, &server, timeout_secs, openid).await,
    }
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::INFO)
        .try_init();
}

fn list(file: &Path) -> Result<()> {
    let graph = load_flow_from_file(file)?;

    for step in graph.steps() {
        let marker = if step.manual { " (manual)" } else { "" };
        let dependencies = graph.dependencies_of(&step.id);
        if dependencies.is_empty() {
            println!("{}) {}{}", step.id, step.title, marker);
        } else {
            println!("{}) {}{}  [after: {}]", step.id, step.title, marker, dependencies.join(", "));
        }
        if !step.description.is_empty() {
            println!("     {}", step.description);
        }
    }
    Ok(())
}

fn preview(file: &Path, only_step: Option<&str>) -> Result<()> {
    let graph = load_flow_from_file(file)?;

    for step in graph.steps() {
        if let Some(wanted) = only_step
            && step.id != wanted
        {
            continue;
        }
        println!("== {}) {}", step.id, step.title);
        match graph.template(&step.id) {
            Some(template) => println!("{}", template.trim_end()),
            None => println!("(manual step, no request)"),
        }
        let rules = graph.rules_for(&step.id);
        if !rules.is_empty() {
            println!("substitutions:");
            for rule in rules {
                println!("  {} <- {}", rule.placeholder, rule.reference);
            }
        }
        let keys = graph.extraction_keys(&step.id);
        if !keys.is_empty() {
            println!("extracts: {}", keys.join(", "));
        }
        println!();
    }
    Ok(())
}

async fn run(file: &Path, server: &str, timeout_secs: u64, openid: bool) -> Result<()> {
    let graph = load_flow_from_file(file)?;
    let timeout = Duration::from_secs(timeout_secs);

    let oauth = OauthServer::new(server, timeout)?;
    let discovery = if openid {
        oauth.discover_openid().await?
    } else {
        oauth.discover().await?
    };
    println!("Server validated: {}", discovery.issuer.as_deref().unwrap_or(server));
    if !discovery.scopes_supported.is_empty() {
        println!("Scopes: {}", discovery.scopes_supported.join(" "));
    }

    let endpoints = Endpoints::new(oauth.base_url(), discovery.endpoint_map(), graph.endpoint_defaults().clone());
    let runner = HttpStepRunner::new(timeout)?;
    let driver = SessionDriver::new(&graph, endpoints, &runner);
    let mut state = SessionState::new();

    loop {
        let outcome = driver.run_until_blocked(&mut state).await.context("session state corrupted")?;
        report_pass(&graph, &state, &outcome);

        if !outcome.failed.is_empty() {
            if confirm("Retry failed steps?")? {
                continue;
            }
            break;
        }

        if outcome.is_waiting_on_manual() {
            for step_id in &outcome.awaiting_manual {
                let step = graph.step(step_id).ok_or_else(|| anyhow!("unknown step '{step_id}'"))?;
                let fields = prompt_manual(step)?;
                state.complete_manual(step, fields)?;
            }
            continue;
        }

        break;
    }

    print_summary(&graph, &state);
    Ok(())
}

fn report_pass(graph: &FlowGraph, state: &SessionState, outcome: &DriveOutcome) {
    for step_id in &outcome.completed {
        let title = graph.step(step_id).map(|step| step.title.as_str()).unwrap_or(step_id);
        println!("\n✔ {step_id}) {title}");
        if let Some(result) = state.result(step_id) {
            if let Ok(pretty) = serde_json::to_string_pretty(&result.body) {
                println!("{pretty}");
            }
            surface_verification_uri(&result.body);
        }
    }
    for step_id in &outcome.failed {
        let title = graph.step(step_id).map(|step| step.title.as_str()).unwrap_or(step_id);
        println!("\n✘ {step_id}) {title}");
        if let Some(result) = state.result(step_id) {
            if let Some(reason) = &result.error {
                println!("  {reason}");
            }
            if !result.body.is_null()
                && let Ok(pretty) = serde_json::to_string_pretty(&result.body)
            {
                println!("{pretty}");
            }
        }
    }
}

/// Device-authorization responses carry a URL the user must visit; make it
/// impossible to miss.
fn surface_verification_uri(body: &Value) {
    if let Some(uri) = body.get("verification_uri_complete").and_then(Value::as_str) {
        println!("\nComplete authentication in your browser:\n  {uri}");
        if let Some(code) = body.get("user_code").and_then(Value::as_str) {
            println!("  user code: {code}");
        }
    }
}

fn prompt_manual(step: &StepDefinition) -> Result<IndexMap<String, Value>> {
    println!("\nManual step {}) {}", step.id, step.title);
    if !step.description.is_empty() {
        println!("{}", step.description);
    }
    println!("Enter field=value lines to attach values; an empty line marks the step complete.");

    let stdin = io::stdin();
    let mut fields = IndexMap::new();
    loop {
        print!("> ");
        io::stdout().flush().ok();
        let mut line = String::new();
        stdin.lock().read_line(&mut line).context("read manual step input")?;
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        match line.split_once('=') {
            Some((field, value)) => {
                fields.insert(field.trim().to_string(), Value::String(value.trim().to_string()));
            }
            None => println!("expected field=value"),
        }
    }
    Ok(fields)
}

fn confirm(question: &str) -> Result<bool> {
    print!("{question} [y/N] ");
    io::stdout().flush().ok();
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line).context("read confirmation")?;
    Ok(matches!(line.trim(), "y" | "Y" | "yes"))
}

fn print_summary(graph: &FlowGraph, state: &SessionState) {
    println!("\nSession summary:");
    for step in graph.steps() {
        let marker = match state.status_of(&step.id) {
            StepStatus::Completed => "✔",
            StepStatus::Failed => "✘",
            StepStatus::Running => "…",
            StepStatus::Pending => "·",
        };
        println!("  {marker} {}) {}", step.id, step.title);
    }
}
