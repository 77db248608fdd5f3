use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use colored::Colorize;
use comfy_table::{ContentArrangement, Table};
use serde::Deserialize;
use tracing::debug;

use kb_combat::AiProfile;
use kb_entropy::SeededFactory;
use kb_simulation::{
    EncounterSetup, Metric, MetricSummary, PolicySet, SimConfig, SimWarning, SimulationSummary,
    Simulator, builtin_policy_with_profile,
};

pub struct SimulateOptions {
    pub trials: Option<u64>,
    pub seed: Option<u64>,
    pub max_rounds: Option<u32>,
    pub metric: Option<String>,
    pub workers: Option<usize>,
    pub config: Option<PathBuf>,
    pub json: bool,
}

/// An encounter file: the roster plus a policy name per side. Sides not
/// listed use `default_policy`. `profiles` tunes a side's policy.
#[derive(Deserialize)]
struct EncounterFile {
    combatants: EncounterSetup,
    #[serde(default)]
    policies: BTreeMap<String, String>,
    #[serde(default = "default_policy")]
    default_policy: String,
    #[serde(default)]
    profiles: BTreeMap<String, AiProfile>,
}

fn default_policy() -> String {
    "first-available".to_string()
}

pub fn run(path: &Path, opts: &SimulateOptions) -> Result<(), String> {
    let encounter = load_encounter(path)?;
    let policies = policy_set(&encounter)?;
    let config = build_config(opts)?;
    debug!(
        path = %path.display(),
        combatants = encounter.combatants.combatants().len(),
        trials = config.trial_count,
        "loaded encounter"
    );

    let factory = SeededFactory::new(config.seed);
    let simulator = Simulator::new(config).map_err(|e| e.to_string())?;
    let summary = simulator
        .run(&encounter.combatants, &policies, &factory)
        .map_err(|e| e.to_string())?;

    if opts.json {
        let json = summary.to_json().map_err(|e| format!("JSON error: {e}"))?;
        println!("{json}");
    } else {
        print_summary(path, &summary);
    }
    Ok(())
}

fn load_encounter(path: &Path) -> Result<EncounterFile, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read '{}': {e}", path.display()))?;
    serde_json::from_str(&text).map_err(|e| format!("invalid encounter '{}': {e}", path.display()))
}

fn policy_set(encounter: &EncounterFile) -> Result<PolicySet, String> {
    let lookup = |name: &str, profile: AiProfile| {
        builtin_policy_with_profile(name, profile).ok_or_else(|| {
            format!("unknown policy '{name}' (available: first-available, focus-weakest)")
        })
    };
    let profile_of = |side: &str| encounter.profiles.get(side).copied().unwrap_or_default();
    let mut policies = PolicySet::uniform(lookup(&encounter.default_policy, AiProfile::default())?);
    for side in encounter.combatants.sides() {
        let side = side.as_str();
        let name = encounter
            .policies
            .get(side)
            .unwrap_or(&encounter.default_policy);
        policies = policies.with_side(side, lookup(name, profile_of(side))?);
    }
    Ok(policies)
}

fn build_config(opts: &SimulateOptions) -> Result<SimConfig, String> {
    let mut config = match &opts.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| format!("cannot read '{}': {e}", path.display()))?;
            serde_json::from_str(&text)
                .map_err(|e| format!("invalid config '{}': {e}", path.display()))?
        }
        None => SimConfig::default(),
    };
    if let Some(trials) = opts.trials {
        config = config.with_trial_count(trials);
    }
    if let Some(seed) = opts.seed {
        config = config.with_seed(seed);
    }
    if let Some(rounds) = opts.max_rounds {
        config = config.with_max_rounds(rounds);
    }
    if let Some(metric) = &opts.metric {
        let metric: Metric = metric.parse().map_err(|e: kb_simulation::SimError| e.to_string())?;
        config = config.with_metric(metric);
    }
    if let Some(workers) = opts.workers {
        config = config.with_workers(workers);
    }
    Ok(config)
}

fn print_summary(path: &Path, summary: &SimulationSummary) {
    println!(
        "  {} '{}' {}",
        "Simulation".bold(),
        path.display(),
        format!("({} trials, seed={})", summary.trial_count, summary.seed).dimmed()
    );
    println!(
        "  {} completed, {} failed, {} draws, {} hit the round limit",
        summary.completed, summary.failed, summary.draws, summary.round_limit_exceeded
    );
    println!();

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Side", "Wins", "Win rate", "95% interval"]);
    for side in &summary.sides {
        table.add_row(vec![
            side.side.to_string(),
            side.wins.to_string(),
            format!("{:.1}%", side.win_rate * 100.0),
            format!(
                "{:.1}% – {:.1}%",
                side.interval.low * 100.0,
                side.interval.high * 100.0
            ),
        ]);
    }
    println!("{table}");
    println!();

    print_metric(&summary.rounds);
    if summary.metric.metric != Metric::RoundsToResolution {
        print_metric(&summary.metric);
    }

    for warning in &summary.warnings {
        let text = match warning {
            SimWarning::NonConvergent {
                target_half_width,
                achieved_half_width,
                trials,
            } => match achieved_half_width {
                Some(h) => format!(
                    "confidence target ±{target_half_width} not met after {trials} trials (±{h:.4})"
                ),
                None => format!("confidence target ±{target_half_width} not met: too few trials"),
            },
            SimWarning::TrialsFailed { failed, first } => {
                format!("{failed} trials failed and were excluded; first: {first}")
            }
            SimWarning::Cancelled { completed } => {
                format!("run cancelled after {completed} trials")
            }
        };
        println!("  {} {text}", "WARN".yellow().bold());
    }
}

fn print_metric(metric: &MetricSummary) {
    let range = match (metric.min, metric.max) {
        (Some(lo), Some(hi)) => format!("{lo} – {hi}"),
        _ => "-".to_string(),
    };
    println!(
        "  {} {}: mean {:.2}, sd {:.2}, range {range}",
        "Metric".bold(),
        metric.metric,
        metric.mean,
        metric.std_dev
    );
    if let Some(p) = &metric.percentiles {
        let note = if metric.sampled { " (sampled)" } else { "" };
        println!(
            "    p5 {:.1}  p25 {:.1}  median {:.1}  p75 {:.1}  p95 {:.1}{}",
            p.p5,
            p.p25,
            p.p50,
            p.p75,
            p.p95,
            note.dimmed()
        );
    }
}
