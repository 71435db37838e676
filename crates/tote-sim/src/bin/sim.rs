#![forbid(unsafe_code)]

use anyhow::Result;
use tote_sim::campaign::{CampaignConfig, run_campaign};

fn main() -> Result<()> {
    let report = run_campaign(&CampaignConfig::default())?;

    println!(
        "campaign complete: seeds={} passed={} interesting={} first_failure={:?}",
        report.seeds_run,
        report.seeds_passed,
        report.interesting_states_reached,
        report.first_failure
    );

    if !report.all_passed() {
        std::process::exit(1);
    }
    Ok(())
}
