use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cfg = seed_reactor::config::Config::parse();
    if cfg.list_devices {
        seed_reactor::audio::list_input_devices()?;
        return Ok(());
    }

    seed_reactor::app::run(cfg)
}
