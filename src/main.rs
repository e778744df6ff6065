use std::{
    fs,
    io::{self, Read},
    path::PathBuf,
};

use anyhow::{Context, Result};
use ups_battstats::{BattStats, Sample, settings};

fn main() -> Result<()> {
    env_logger::init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(settings::config_path);
    let config = settings::load_config(&config_path)?;

    let state_dir = config.state_dir();
    match &state_dir {
        Some(dir) => fs::create_dir_all(dir)
            .with_context(|| format!("couldn't create state directory {}", dir.display()))?,
        None => log::warn!("couldn't find a state directory, statistics won't be saved"),
    }

    let mut input = String::new();
    io::stdin()
        .read_to_string(&mut input)
        .context("couldn't read telemetry from stdin")?;
    let sample = Sample::parse_upsc(&input);

    let mut stats = BattStats::new(state_dir.as_deref(), config.device);
    stats.update_stats(&sample);
    let saved = stats.save();

    for message in stats.messages() {
        log::warn!("{message}");
    }

    match stats.charge_percent() {
        Some(charge) => println!("{charge:.1}"),
        None => log::info!("not enough telemetry for a charge estimate"),
    }

    saved.context("couldn't save battery statistics")
}
