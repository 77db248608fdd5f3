use std::sync::Arc;

use colored::Colorize;
use serde::Serialize;

use kb_dice::{AuditTrail, Evaluator, FallbackPolicy, RollOutcome, RollSession};
use kb_entropy::{
    Entropy, EntropyKind, EntropyProvider, EntropySource, HttpProvider, OsProvider, TrustedConfig,
};

pub struct RollOptions {
    pub seed: Option<u64>,
    pub trusted: Option<String>,
    pub timeout_ms: u64,
    pub retries: u32,
    pub degrade_seed: Option<u64>,
    pub times: usize,
    pub audit: bool,
    pub json: bool,
}

#[derive(Serialize)]
struct RollReport<'a> {
    session: Option<String>,
    entropy: EntropyKind,
    rolls: &'a [RollOutcome],
    total: i64,
    mean: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    audit: Option<&'a AuditTrail>,
}

pub fn run(notation: &str, opts: &RollOptions) -> Result<(), String> {
    let expr = super::parse_notation(notation)?;
    if opts.times == 0 {
        return Err("--times must be at least 1".into());
    }

    let mut session = RollSession::new(entropy(opts)?, Evaluator::default()).with_fallback(fallback(opts));
    let mut rolls = Vec::with_capacity(opts.times);
    for _ in 0..opts.times {
        rolls.push(session.roll(&expr).map_err(|e| e.to_string())?);
    }
    let total = rolls.iter().fold(0i64, |acc, r| acc.saturating_add(r.total()));
    let mean = total as f64 / rolls.len() as f64;

    if opts.json {
        let report = RollReport {
            session: session.session_id().map(|id| id.to_string()),
            entropy: session.entropy().kind(),
            rolls: &rolls,
            total,
            mean,
            audit: opts.audit.then(|| session.trail()),
        };
        let json = serde_json::to_string_pretty(&report).map_err(|e| format!("JSON error: {e}"))?;
        println!("{json}");
        return Ok(());
    }

    for roll in &rolls {
        print_roll(roll);
    }
    if rolls.len() > 1 {
        println!();
        println!(
            "  {} {}  {} {:.2}",
            "total".dimmed(),
            total.to_string().bold(),
            "mean".dimmed(),
            mean
        );
    }
    if session.is_degraded() {
        println!(
            "  {}",
            "trusted entropy was unavailable; later rolls used a seeded stand-in".yellow()
        );
    }
    if opts.audit {
        let json = serde_json::to_string_pretty(session.trail()).map_err(|e| format!("JSON error: {e}"))?;
        println!();
        println!("  {}", "Audit trail".bold().underline());
        println!("{json}");
    }
    Ok(())
}

fn entropy(opts: &RollOptions) -> Result<Entropy, String> {
    if let Some(seed) = opts.seed {
        return Ok(Entropy::seeded(seed));
    }
    let config = TrustedConfig::default().with_timeout_ms(opts.timeout_ms);
    let provider: Arc<dyn EntropyProvider> = match opts.trusted.as_deref() {
        None | Some("os") => Arc::new(OsProvider),
        Some(url) if url.starts_with("http://") || url.starts_with("https://") => {
            Arc::new(HttpProvider::new(url, config.timeout()))
        }
        Some(other) => return Err(format!("unknown entropy provider '{other}' (use 'os' or a URL)")),
    };
    Ok(Entropy::trusted(provider, config))
}

fn fallback(opts: &RollOptions) -> FallbackPolicy {
    match (opts.degrade_seed, opts.retries) {
        (Some(seed), _) => FallbackPolicy::Degrade { seed },
        (None, 0) => FallbackPolicy::Abort,
        (None, attempts) => FallbackPolicy::Retry { attempts },
    }
}

fn print_roll(roll: &RollOutcome) {
    let dice: Vec<String> = roll
        .dice()
        .iter()
        .map(|d| {
            if d.dropped {
                d.value.to_string().dimmed().strikethrough().to_string()
            } else {
                d.value.to_string()
            }
        })
        .collect();
    let total = roll.total().to_string();
    let total = if roll.is_critical_success() {
        total.green().bold()
    } else if roll.is_critical_failure() {
        total.red().bold()
    } else {
        total.bold()
    };
    let mut line = format!("  {}  [{}]  → {}", roll.expression().cyan(), dice.join(", "), total);
    if roll.is_critical_success() {
        line.push_str(&format!("  {}", "CRIT".green().bold()));
    }
    if roll.is_critical_failure() {
        line.push_str(&format!("  {}", "FUMBLE".red().bold()));
    }
    if let Some(reason) = roll.capped() {
        line.push_str(&format!("  {}", format!("({reason})").yellow()));
    }
    println!("{line}");
}
