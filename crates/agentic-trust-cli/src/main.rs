//! AgenticTrust CLI — `atrust` command.
//!
//! Issues and verifies capability cards, runs cards through a trust gate,
//! and maintains JSONL audit ledgers on disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};

use agentic_trust::audit::{import_json, import_jsonl};
use agentic_trust::time::micros_to_rfc3339;
use agentic_trust::{
    AgentIdentity, AuditEntry, AuditLog, CapabilityCard, ExportFormat, GatePolicy, SystemClock,
    TrustGate,
};

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Parse "90s", "15m", "24h", "7d" or combinations like "1h30m".
fn parse_duration(s: &str) -> Result<std::time::Duration> {
    let s = s.trim();
    let mut total: u64 = 0;
    let mut digits = String::new();

    for ch in s.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            continue;
        }
        let n: u64 = digits
            .parse()
            .map_err(|_| anyhow!("invalid duration: {s}"))?;
        digits.clear();
        let unit: u64 = match ch {
            's' => 1,
            'm' => 60,
            'h' => 3600,
            'd' => 86_400,
            _ => bail!("unknown duration unit '{ch}' in '{s}'"),
        };
        total = n
            .checked_mul(unit)
            .and_then(|secs| total.checked_add(secs))
            .ok_or_else(|| anyhow!("duration '{s}' is too large"))?;
    }

    if !digits.is_empty() {
        bail!("duration '{s}' is missing a unit (s/m/h/d)");
    }
    if total == 0 {
        bail!("duration must be > 0");
    }
    Ok(std::time::Duration::from_secs(total))
}

fn read_card(path: &Path) -> Result<CapabilityCard> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading card {}", path.display()))?;
    CapabilityCard::from_json(&text).with_context(|| format!("parsing card {}", path.display()))
}

/// Load a ledger written as JSONL or as a JSON array. A missing file is an
/// empty ledger.
fn read_ledger(path: &Path) -> Result<Vec<AuditEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading ledger {}", path.display()))?;
    let entries = if text.trim_start().starts_with('[') {
        import_json(&text)
    } else {
        import_jsonl(&text)
    };
    entries.with_context(|| format!("parsing ledger {}", path.display()))
}

/// Load a ledger and refuse to extend it if its chain is broken.
fn open_ledger(path: &Path) -> Result<Arc<AuditLog>> {
    let log = AuditLog::from_entries(read_ledger(path)?, Arc::new(SystemClock));
    if let Some(i) = log.first_invalid_index() {
        bail!("ledger {} is broken at entry {i}", path.display());
    }
    Ok(Arc::new(log))
}

fn write_ledger(path: &Path, log: &AuditLog) -> Result<()> {
    let text = log.export(ExportFormat::Jsonl)?;
    std::fs::write(path, text).with_context(|| format!("writing ledger {}", path.display()))
}

fn write_output(output: Option<&Path>, text: &str) -> Result<()> {
    match output {
        Some(path) => std::fs::write(path, text)
            .with_context(|| format!("writing {}", path.display())),
        None => {
            println!("{text}");
            Ok(())
        }
    }
}

// ── CLI structure ────────────────────────────────────────────────────────────

/// AgenticTrust CLI — capability cards, trust evaluation and audit ledgers
/// for AI agents.
#[derive(Parser, Debug)]
#[command(
    name = "atrust",
    about = "AgenticTrust CLI",
    version,
    long_about = "atrust — AgenticTrust CLI\n\nIssue and verify signed capability cards, evaluate them against a trust\npolicy, and keep tamper-evident audit ledgers."
)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Issue or verify capability cards
    Card {
        #[command(subcommand)]
        subcommand: CardCommands,
    },

    /// Evaluate a card against a trust policy
    Evaluate {
        /// Card JSON file
        card: PathBuf,

        /// Required capability (repeatable)
        #[arg(long = "require")]
        required: Vec<String>,

        /// Minimum trust score (overrides the policy)
        #[arg(long)]
        min_trust: Option<f64>,

        /// Policy JSON file (default policy when omitted)
        #[arg(long)]
        policy: Option<PathBuf>,

        /// Action name for rate limiting and audit
        #[arg(long)]
        action: Option<String>,

        /// Append the decision to this JSONL ledger
        #[arg(long)]
        audit: Option<PathBuf>,
    },

    /// Manage audit ledgers
    Audit {
        #[command(subcommand)]
        subcommand: AuditCommands,
    },
}

#[derive(Subcommand, Debug)]
enum CardCommands {
    /// Generate a fresh identity and a card signed by it
    New {
        #[arg(long)]
        name: String,

        #[arg(long, default_value = "")]
        description: String,

        /// Advertised capability (repeatable)
        #[arg(long = "capability")]
        capabilities: Vec<String>,

        #[arg(long, default_value_t = 0.5)]
        trust_score: f64,

        /// Identity lifetime, e.g. 24h or 7d
        #[arg(long)]
        ttl: Option<String>,

        /// Output file (default: stdout)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Verify a card's signature
    Verify {
        /// Card JSON file
        card: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum AuditCommands {
    /// Append an entry to a ledger (created if missing)
    Append {
        ledger: PathBuf,

        #[arg(long)]
        agent: String,

        #[arg(long)]
        action: String,

        #[arg(long)]
        decision: String,

        /// JSON object with extra context
        #[arg(long)]
        context: Option<String>,
    },

    /// Verify a ledger's hash chain
    Verify { ledger: PathBuf },

    /// Export a ledger as JSONL or a JSON array
    Export {
        ledger: PathBuf,

        /// jsonl or json
        #[arg(long, default_value = "jsonl")]
        format: String,

        /// Output file (default: stdout)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();
    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let result = match cli.command {
        Commands::Card { subcommand } => match subcommand {
            CardCommands::New {
                name,
                description,
                capabilities,
                trust_score,
                ttl,
                output,
            } => cmd_card_new(
                &name,
                &description,
                &capabilities,
                trust_score,
                ttl.as_deref(),
                output.as_deref(),
            ),
            CardCommands::Verify { card } => cmd_card_verify(&card),
        },
        Commands::Evaluate {
            card,
            required,
            min_trust,
            policy,
            action,
            audit,
        } => cmd_evaluate(
            &card,
            &required,
            min_trust,
            policy.as_deref(),
            action.as_deref(),
            audit.as_deref(),
        ),
        Commands::Audit { subcommand } => match subcommand {
            AuditCommands::Append {
                ledger,
                agent,
                action,
                decision,
                context,
            } => cmd_audit_append(&ledger, &agent, &action, &decision, context.as_deref()),
            AuditCommands::Verify { ledger } => cmd_audit_verify(&ledger),
            AuditCommands::Export {
                ledger,
                format,
                output,
            } => cmd_audit_export(&ledger, &format, output.as_deref()),
        },
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

// ── Command implementations ──────────────────────────────────────────────────

/// `atrust card new --name NAME [--capability CAP]...`
fn cmd_card_new(
    name: &str,
    description: &str,
    capabilities: &[String],
    trust_score: f64,
    ttl: Option<&str>,
    output: Option<&Path>,
) -> Result<()> {
    if !(0.0..=1.0).contains(&trust_score) {
        bail!("trust score must be within [0, 1]");
    }
    let ttl = ttl.map(parse_duration).transpose()?;
    let identity = AgentIdentity::generate(name, capabilities.iter().cloned(), ttl);

    let mut card = CapabilityCard::new(name, description, capabilities.iter().cloned(), trust_score);
    card.sign(&identity).context("signing card")?;
    log::info!("issued card for {}", identity.id);

    write_output(output, &card.to_json_pretty()?)?;
    if output.is_some() {
        eprintln!("Issued card for {}", identity.id);
        if let Some(exp) = identity.expires_at {
            eprintln!("  Expires: {}", micros_to_rfc3339(exp));
        }
    }
    Ok(())
}

/// `atrust card verify CARD`
fn cmd_card_verify(path: &Path) -> Result<()> {
    let card = read_card(path)?;
    if !card.verify() {
        bail!("card {} is NOT valid", path.display());
    }

    let identity = card
        .identity
        .as_ref()
        .ok_or_else(|| anyhow!("card has no identity"))?;
    println!("Card {} is valid", path.display());
    println!("  Identity:     {}", identity.id);
    println!("  Name:         {}", card.name);
    println!(
        "  Capabilities: {}",
        card.capabilities.iter().cloned().collect::<Vec<_>>().join(", ")
    );
    println!("  Trust score:  {:.2}", card.trust_score);
    if let Some(sig) = &card.signature {
        println!("  Signed:       {}", micros_to_rfc3339(sig.timestamp));
    }

    let effective = card.effective_capabilities();
    for warning in &effective.warnings {
        println!("  Warning:      {warning}");
    }
    Ok(())
}

/// `atrust evaluate CARD [--require CAP]... [--audit LEDGER]`
fn cmd_evaluate(
    card_path: &Path,
    required: &[String],
    min_trust: Option<f64>,
    policy_path: Option<&Path>,
    action: Option<&str>,
    ledger: Option<&Path>,
) -> Result<()> {
    let card = read_card(card_path)?;
    let policy = match policy_path {
        Some(p) => GatePolicy::from_file(p)
            .with_context(|| format!("loading policy {}", p.display()))?,
        None => GatePolicy::default(),
    };

    let audit = match ledger {
        Some(path) => open_ledger(path)?,
        None => Arc::new(AuditLog::new()),
    };
    let gate = TrustGate::with_parts(policy, Arc::new(SystemClock), audit.clone())?;
    let result = gate.evaluate_action(&card, required, min_trust, action)?;

    if let Some(path) = ledger {
        write_ledger(path, &audit)?;
    }
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

/// `atrust audit append LEDGER --agent A --action X --decision D`
fn cmd_audit_append(
    path: &Path,
    agent: &str,
    action: &str,
    decision: &str,
    context: Option<&str>,
) -> Result<()> {
    let context = context
        .map(|c| serde_json::from_str::<serde_json::Value>(c))
        .transpose()
        .context("--context must be JSON")?;
    let log = open_ledger(path)?;
    let entry = log.append(agent, action, decision, context)?;
    write_ledger(path, &log)?;

    println!("Appended entry {} to {}", entry.index, path.display());
    println!("  Hash: {}", entry.entry_hash);
    Ok(())
}

/// `atrust audit verify LEDGER`
fn cmd_audit_verify(path: &Path) -> Result<()> {
    let log = AuditLog::from_entries(read_ledger(path)?, Arc::new(SystemClock));
    let summary = log.summary();
    if let Some(i) = log.first_invalid_index() {
        bail!("ledger {} is broken at entry {i}", path.display());
    }

    println!("Ledger {} is intact", path.display());
    println!("  Entries: {}", summary.total);
    println!("  Agents:  {}", summary.agents);
    for (decision, count) in &summary.by_decision {
        println!("  {decision}: {count}");
    }
    println!("  Head:    {}", summary.head_hash);
    Ok(())
}

/// `atrust audit export LEDGER [--format json|jsonl]`
fn cmd_audit_export(path: &Path, format: &str, output: Option<&Path>) -> Result<()> {
    let format: ExportFormat = format.parse()?;
    let log = AuditLog::from_entries(read_ledger(path)?, Arc::new(SystemClock));
    let text = log.export(format)?;
    write_output(output, text.trim_end())
}
