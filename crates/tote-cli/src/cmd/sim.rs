//! `tote sim` — deterministic simulation campaign commands.
//!
//! `tote sim run` — execute a campaign across many seeds.
//! `tote sim replay` — replay a single seed with detailed trace output.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::ops::Range;
use std::path::Path;
use std::process;

use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;
use tote_core::backend::memory::CallCounts;
use tote_core::config::load_project_config;
use tote_sim::campaign::{CampaignConfig, DetailedTrace, replay_seed, run_campaign};
use tote_sim::network::FaultConfig;
use tote_sim::{ResolutionKind, SimulationConfig, TraceEvent};

use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

/// Top-level arguments for `tote sim`.
#[derive(Args, Debug)]
pub struct SimArgs {
    #[command(subcommand)]
    pub command: SimCommand,
}

#[derive(Subcommand, Debug)]
pub enum SimCommand {
    #[command(
        about = "Run a simulation campaign across multiple seeds",
        long_about = "Drive a scripted shopper against an in-memory cart backend over a\n\
                      network that delays, reorders and fails responses. Every seed is\n\
                      checked by the oracle; the first failing seed is reported for replay.",
        after_help = "EXAMPLES:\n    # Run 100 seeds with default faults\n    tote sim run --seeds 100\n\n\
                      # Responses race but never fail\n    tote sim run --seeds 50 --reorder-only\n\n\
                      # Machine-readable output\n    tote sim run --seeds 100 --json"
    )]
    Run(SimRunArgs),

    #[command(
        about = "Replay a single seed with detailed trace output",
        long_about = "Replay one seed with the same parameters as a campaign to get its\n\
                      resolution counts, oracle verdict and, with --trace, every event.",
        after_help = "EXAMPLES:\n    # Replay seed 42\n    tote sim replay --seed 42\n\n\
                      # Include the full event trace\n    tote sim replay --seed 42 --trace\n\n\
                      # Machine-readable output\n    tote sim replay --seed 42 --json"
    )]
    Replay(SimReplayArgs),
}

/// Fault injection knobs shared by `run` and `replay`.
#[derive(Args, Debug, Clone, Copy)]
pub struct FaultArgs {
    /// Maximum rounds a request waits before the backend commits it.
    #[arg(long, default_value_t = 2)]
    pub commit_delay: u8,

    /// Maximum response delay in rounds.
    #[arg(long, default_value_t = 3)]
    pub max_delay: u8,

    /// Percent chance of reversing the requests, or responses, that arrive together.
    #[arg(long, default_value_t = 20)]
    pub reorder: u8,

    /// Percent of requests refused before the backend applies them.
    #[arg(long, default_value_t = 4)]
    pub unavailable: u8,

    /// Percent of requests applied whose response is lost.
    #[arg(long, default_value_t = 3)]
    pub lost: u8,

    /// Percent of responses with tampered totals.
    #[arg(long, default_value_t = 2)]
    pub corrupt: u8,

    /// Percent chance per round that the backend forgets the cart.
    #[arg(long, default_value_t = 2)]
    pub expiry: u8,

    /// Only delay and reorder responses; every request succeeds.
    #[arg(long)]
    pub reorder_only: bool,
}

impl FaultArgs {
    const fn fault_config(&self) -> FaultConfig {
        if self.reorder_only {
            return FaultConfig {
                max_commit_delay_rounds: self.commit_delay,
                max_delay_rounds: self.max_delay,
                reorder_rate_percent: self.reorder,
                ..FaultConfig::reorder_only()
            };
        }
        FaultConfig {
            max_commit_delay_rounds: self.commit_delay,
            max_delay_rounds: self.max_delay,
            reorder_rate_percent: self.reorder,
            unavailable_rate_percent: self.unavailable,
            lost_response_rate_percent: self.lost,
            corrupt_rate_percent: self.corrupt,
            expiry_rate_percent: self.expiry,
        }
    }
}

#[derive(Args, Debug)]
pub struct SimRunArgs {
    /// Number of seeds to run.
    #[arg(long, default_value_t = 100)]
    pub seeds: u64,

    /// Starting seed value.
    #[arg(long, default_value_t = 0)]
    pub seed_start: u64,

    /// Number of simulation rounds per seed.
    #[arg(long, default_value_t = 40)]
    pub rounds: u64,

    #[command(flatten)]
    pub faults: FaultArgs,
}

#[derive(Args, Debug)]
pub struct SimReplayArgs {
    /// Seed to replay.
    #[arg(long)]
    pub seed: u64,

    /// Number of simulation rounds.
    #[arg(long, default_value_t = 40)]
    pub rounds: u64,

    /// Include every trace event in the output.
    #[arg(long)]
    pub trace: bool,

    #[command(flatten)]
    pub faults: FaultArgs,
}

/// JSON output for `tote sim run`.
#[derive(Debug, Serialize)]
struct RunOutput {
    seeds_run: usize,
    seeds_passed: usize,
    seeds_failed: usize,
    first_failure: Option<u64>,
    interesting_states_reached: usize,
    all_passed: bool,
    failures: Vec<FailureOutput>,
}

#[derive(Debug, Serialize)]
struct FailureOutput {
    seed: u64,
    violations: Vec<String>,
}

/// JSON output for `tote sim replay`.
#[derive(Debug, Serialize)]
struct ReplayOutput<'a> {
    seed: u64,
    rounds: u64,
    trace_events: usize,
    deliveries: usize,
    resolutions: BTreeMap<&'static str, usize>,
    expiries: usize,
    calls: CallCounts,
    converged: bool,
    oracle_passed: bool,
    violations: Vec<String>,
    interesting_state_reached: bool,
    settled_quantity: u32,
    settled_total: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    trace: Option<&'a [TraceEvent]>,
}

impl<'a> ReplayOutput<'a> {
    fn new(seed: u64, rounds: u64, detail: &'a DetailedTrace, include_trace: bool) -> Self {
        let result = &detail.result;
        let mut resolutions = BTreeMap::new();
        for delivery in &result.deliveries {
            *resolutions.entry(resolution_name(delivery.resolution)).or_insert(0) += 1;
        }

        Self {
            seed,
            rounds,
            trace_events: result.trace.len(),
            deliveries: result.deliveries.len(),
            resolutions,
            expiries: result.expiries,
            calls: result.calls,
            converged: result.converged(),
            oracle_passed: detail.oracle.passed,
            violations: detail
                .oracle
                .violations
                .iter()
                .map(tote_sim::oracle::InvariantViolation::describe)
                .collect(),
            interesting_state_reached: result.interesting_state_reached,
            settled_quantity: result.settled.confirmed.total_quantity,
            settled_total: result.settled.confirmed.totals.total.to_string(),
            trace: include_trace.then_some(result.trace.as_slice()),
        }
    }
}

const fn resolution_name(kind: ResolutionKind) -> &'static str {
    match kind {
        ResolutionKind::Confirmed => "confirmed",
        ResolutionKind::Merged => "merged",
        ResolutionKind::Superseded => "superseded",
        ResolutionKind::RolledBack { .. } => "rolled_back",
        ResolutionKind::Replayed => "replayed",
        ResolutionKind::Orphaned => "orphaned",
    }
}

/// Campaign parameters, with currency and layout taken from the project config.
fn build_campaign_config(
    seed_range: Range<u64>,
    rounds: u64,
    faults: &FaultArgs,
    project_root: &Path,
) -> Result<CampaignConfig> {
    let project = load_project_config(project_root)?;
    let fault = faults.fault_config();
    let base = SimulationConfig {
        rounds,
        currency: project.cart.currency,
        layout: project.layout,
        fault,
        ..SimulationConfig::default()
    };

    Ok(CampaignConfig {
        seed_range,
        rounds,
        shopper: base.shopper,
        fault,
        base,
    })
}

/// Execute `tote sim run`.
pub fn run_sim_run(
    args: &SimRunArgs,
    output: OutputMode,
    quiet: bool,
    project_root: &Path,
) -> Result<()> {
    let config = build_campaign_config(
        args.seed_start..args.seed_start.saturating_add(args.seeds),
        args.rounds,
        &args.faults,
        project_root,
    )?;

    let report = run_campaign(&config)?;

    let out = RunOutput {
        seeds_run: report.seeds_run,
        seeds_passed: report.seeds_passed,
        seeds_failed: report.failures.len(),
        first_failure: report.first_failure,
        interesting_states_reached: report.interesting_states_reached,
        all_passed: report.all_passed(),
        failures: report
            .failures
            .iter()
            .map(|f| FailureOutput {
                seed: f.seed,
                violations: f.violations.clone(),
            })
            .collect(),
    };

    let summary = !(quiet && out.all_passed);
    render_mode(
        output,
        &out,
        |out, w| render_run_text(out, args, summary, w),
        |out, w| {
            if summary {
                render_run_pretty(out, args, w)
            } else {
                Ok(())
            }
        },
    )?;

    // Exit code 1 on any failure for CI integration
    if !report.all_passed() {
        process::exit(1);
    }

    Ok(())
}

fn render_run_text(
    out: &RunOutput,
    args: &SimRunArgs,
    summary: bool,
    w: &mut dyn Write,
) -> io::Result<()> {
    if summary {
        writeln!(
            w,
            "campaign seeds_run={} rounds={} seed_start={}",
            out.seeds_run, args.rounds, args.seed_start
        )?;
        writeln!(
            w,
            "results passed={} failed={} interesting_states={} all_passed={}",
            out.seeds_passed, out.seeds_failed, out.interesting_states_reached, out.all_passed
        )?;
    }
    for failure in out.failures.iter().take(5) {
        writeln!(
            w,
            "failure seed={} violations={}",
            failure.seed,
            failure.violations.len()
        )?;
    }
    if out.failures.len() > 5 {
        writeln!(w, "failures_truncated count={}", out.failures.len() - 5)?;
    }
    if let Some(seed) = out.first_failure {
        writeln!(w, "hint replay_seed={seed} rounds={}", args.rounds)?;
    }
    Ok(())
}

fn render_run_pretty(out: &RunOutput, args: &SimRunArgs, w: &mut dyn Write) -> io::Result<()> {
    pretty_section(w, "Simulation Campaign")?;
    pretty_kv(w, "Seeds", out.seeds_run.to_string())?;
    pretty_kv(w, "Rounds", args.rounds.to_string())?;
    pretty_kv(w, "Faults", describe_faults(&args.faults.fault_config()))?;
    pretty_kv(
        w,
        "Results",
        format!(
            "{} passed / {} failed ({} reached races or expiry)",
            out.seeds_passed, out.seeds_failed, out.interesting_states_reached
        ),
    )?;

    let Some(seed) = out.first_failure else {
        return pretty_kv(w, "Status", "all seeds passed");
    };

    pretty_kv(
        w,
        "Status",
        format!("{} failures (first at seed {seed})", out.seeds_failed),
    )?;
    writeln!(w)?;
    pretty_section(w, "Failure Samples")?;
    for failure in out.failures.iter().take(5) {
        writeln!(
            w,
            "seed {:<8} violations={}",
            failure.seed,
            failure.violations.len()
        )?;
        for violation in &failure.violations {
            writeln!(w, "  - {violation}")?;
        }
    }
    if out.failures.len() > 5 {
        writeln!(w, "... and {} more failures", out.failures.len() - 5)?;
    }
    writeln!(w)?;
    pretty_kv(
        w,
        "Replay",
        format!("tote sim replay --seed {seed} --rounds {}", args.rounds),
    )
}

/// Execute `tote sim replay`.
pub fn run_sim_replay(args: &SimReplayArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let config = build_campaign_config(
        args.seed..args.seed.saturating_add(1),
        args.rounds,
        &args.faults,
        project_root,
    )?;

    let detail = replay_seed(args.seed, &config)?;
    let out = ReplayOutput::new(args.seed, args.rounds, &detail, args.trace);
    render_mode(output, &out, render_replay_text, render_replay_pretty)?;

    if !detail.oracle.passed {
        process::exit(1);
    }

    Ok(())
}

fn render_replay_text(out: &ReplayOutput<'_>, w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "replay seed={} rounds={}", out.seed, out.rounds)?;
    writeln!(
        w,
        "result converged={} oracle_passed={} trace_events={} deliveries={} expiries={} interesting_state_reached={}",
        out.converged,
        out.oracle_passed,
        out.trace_events,
        out.deliveries,
        out.expiries,
        out.interesting_state_reached
    )?;
    for (name, count) in &out.resolutions {
        writeln!(w, "resolution kind={name} count={count}")?;
    }
    for violation in &out.violations {
        writeln!(w, "violation={violation}")?;
    }
    for event in out.trace.unwrap_or_default() {
        writeln!(w, "{}", serde_json::to_string(event)?)?;
    }
    Ok(())
}

fn render_replay_pretty(out: &ReplayOutput<'_>, w: &mut dyn Write) -> io::Result<()> {
    pretty_section(w, &format!("Replay Seed {}", out.seed))?;
    pretty_kv(w, "Rounds", out.rounds.to_string())?;
    pretty_kv(w, "Trace events", out.trace_events.to_string())?;
    pretty_kv(w, "Deliveries", out.deliveries.to_string())?;
    pretty_kv(w, "Expiries", out.expiries.to_string())?;
    pretty_kv(
        w,
        "Backend calls",
        format!(
            "create={} fetch={} add={} update={} remove={} checkout={}",
            out.calls.create,
            out.calls.fetch,
            out.calls.add,
            out.calls.update,
            out.calls.remove,
            out.calls.checkout
        ),
    )?;
    pretty_kv(
        w,
        "Settled cart",
        format!("{} items, {}", out.settled_quantity, out.settled_total),
    )?;
    pretty_kv(w, "Converged", out.converged.to_string())?;
    pretty_kv(w, "Interesting", out.interesting_state_reached.to_string())?;
    pretty_kv(w, "Oracle", out.oracle_passed.to_string())?;

    writeln!(w)?;
    pretty_section(w, "Resolutions")?;
    for (name, count) in &out.resolutions {
        writeln!(w, "{name:<12} {count}")?;
    }

    if !out.oracle_passed {
        writeln!(w)?;
        pretty_section(w, "Invariant Violations")?;
        for violation in &out.violations {
            writeln!(w, "- {violation}")?;
        }
    }

    if let Some(trace) = out.trace {
        writeln!(w)?;
        pretty_section(w, "Trace")?;
        for event in trace {
            writeln!(w, "round {:>3}  {}", event.round, serde_json::to_string(&event.kind)?)?;
        }
    }
    Ok(())
}

fn describe_faults(fault: &FaultConfig) -> String {
    format!(
        "commit_delay<={} delay<={} reorder={}% unavailable={}% lost={}% corrupt={}% expiry={}%",
        fault.max_commit_delay_rounds,
        fault.max_delay_rounds,
        fault.reorder_rate_percent,
        fault.unavailable_rate_percent,
        fault.lost_response_rate_percent,
        fault.corrupt_rate_percent,
        fault.expiry_rate_percent
    )
}

/// Dispatch `tote sim` subcommands.
pub fn run_sim(args: &SimArgs, output: OutputMode, quiet: bool, project_root: &Path) -> Result<()> {
    match &args.command {
        SimCommand::Run(run_args) => run_sim_run(run_args, output, quiet, project_root),
        SimCommand::Replay(replay_args) => run_sim_replay(replay_args, output, project_root),
    }
}
