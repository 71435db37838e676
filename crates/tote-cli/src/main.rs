#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{Parser, Subcommand};
use output::OutputMode;
use std::env;
use std::path::Path;
use tote_core::config::resolve_config;
use tote_core::timing;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "tote: cart state synchronization toolkit",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Emit backend call timing report to stderr.
    #[arg(long, global = true)]
    timing: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    /// `--json` first, then `FORMAT`, the user config and finally the TTY.
    fn output_mode(&self, project_root: &Path) -> OutputMode {
        match resolve_config(project_root, self.json) {
            Ok(effective) => OutputMode::from_name(&effective.resolved_output)
                .unwrap_or_else(|| OutputMode::fallback(self.json)),
            Err(err) => {
                warn!(error = %err, "config unavailable, choosing output from flags");
                OutputMode::fallback(self.json)
            }
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Simulation",
        about = "Run or replay cart synchronization simulations",
        long_about = "Deterministic shopper simulations against an in-memory backend with\n\
                      delayed, reordered and failing responses.",
        after_help = "EXAMPLES:\n    # Run the default campaign\n    tote sim run\n\n    # Replay one seed with its trace\n    tote sim replay --seed 7 --trace"
    )]
    Sim(cmd::sim::SimArgs),

    #[command(
        next_help_heading = "Layout",
        about = "Show panel geometry for a viewport",
        long_about = "Derive the content, panel and navbar geometry for a viewport size\n\
                      and panel state using the project's [layout] settings.",
        after_help = "EXAMPLES:\n    # Desktop with the cart open\n    tote layout --width 1440 --height 900 --open\n\n    # Phone, machine-readable\n    tote layout --width 390 --height 844 --open --json"
    )]
    Layout(cmd::layout::LayoutArgs),

    #[command(
        next_help_heading = "Configuration",
        about = "Inspect and edit configuration",
        long_about = "Show the effective configuration or edit project (.tote/config.toml)\n\
                      and user settings.",
        after_help = "EXAMPLES:\n    # Show effective config\n    tote config show\n\n    # Move the mobile breakpoint\n    tote config set layout.breakpoint_px 900\n\n    # Prefer JSON output everywhere\n    tote config set --scope user output json"
    )]
    Config(cmd::config::ConfigArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("TOTE_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "tote=debug,info"
        } else {
            "tote=info,warn"
        })
    });

    let format = env::var("TOTE_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let timing_enabled = cli.timing || timing::enabled_from_env();
    timing::set_enabled(timing_enabled);
    timing::clear();

    if cli.verbose {
        info!("Verbose mode enabled");
    }

    let project_root = std::env::current_dir()?;
    let output = cli.output_mode(&project_root);

    let command_result = match cli.command {
        Commands::Sim(ref args) => timing::timed("cmd.sim", || {
            cmd::sim::run_sim(args, output, cli.quiet, &project_root)
        }),
        Commands::Layout(ref args) => timing::timed("cmd.layout", || {
            cmd::layout::run_layout(args, output, &project_root)
        }),
        Commands::Config(ref args) => timing::timed("cmd.config", || {
            cmd::config::run_config(args, &project_root, output)
        }),
    };

    if timing_enabled {
        let report = timing::collect_report();
        if report.is_empty() {
            eprintln!("timing report: no samples recorded");
        } else {
            eprintln!("timing report:");
            eprintln!("{}", report.display_table());
            eprintln!("timing report (json):");
            eprintln!("{}", serde_json::to_string_pretty(&report.to_json())?);
        }
    }

    command_result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timing_flag_parses_before_subcommand() {
        let cli = Cli::parse_from(["tote", "--timing", "layout", "--open"]);
        assert!(cli.timing);
        assert!(matches!(cli.command, Commands::Layout(ref args) if args.open));
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::parse_from(["tote", "sim", "run", "--seeds", "5", "--json", "-q"]);
        assert!(cli.json);
        assert!(cli.quiet);
        let Commands::Sim(args) = cli.command else {
            panic!("expected sim");
        };
        let cmd::sim::SimCommand::Run(run) = args.command else {
            panic!("expected run");
        };
        assert_eq!(run.seeds, 5);
        assert_eq!(run.rounds, 40);
        assert_eq!(run.faults.max_delay, 3);
    }

    #[test]
    fn replay_requires_seed() {
        assert!(Cli::try_parse_from(["tote", "sim", "replay"]).is_err());
        assert!(Cli::try_parse_from(["tote", "sim", "replay", "--seed", "3", "--trace"]).is_ok());
    }

    #[test]
    fn layout_defaults_to_laptop_closed() {
        let cli = Cli::parse_from(["tote", "layout"]);
        let Commands::Layout(args) = cli.command else {
            panic!("expected layout");
        };
        assert_eq!((args.width, args.height, args.open), (1280, 800, false));
    }

    #[test]
    fn json_flag_forces_json_output() {
        let root = tempfile::tempdir().expect("tempdir");
        let cli = Cli::parse_from(["tote", "--json", "layout"]);
        assert_eq!(cli.output_mode(root.path()), OutputMode::Json);
    }
}
