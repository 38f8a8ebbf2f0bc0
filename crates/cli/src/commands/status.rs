//! `parley status`: show the effective configuration.

use anyhow::Context;
use parley_config::AppConfig;

pub fn run() -> anyhow::Result<()> {
    let config = AppConfig::load().context("failed to load config")?;
    let or_none = |v: Option<&str>| v.map(str::to_string).unwrap_or_else(|| "(none)".into());

    println!("💬 Parley Status");
    println!("================");
    println!("  Config dir:     {}", AppConfig::config_dir().display());
    println!("  Database:       {}", config.storage_path().display());
    println!("  Provider:       {}", config.provider);
    println!("  Endpoint:       {}", or_none(config.api_url.as_deref()));
    println!("  API key:        {}", if config.has_api_key() { "configured" } else { "missing" });
    println!("  Model:          {}", config.default_model);
    println!("  Max depth:      {}", config.agent.max_depth);
    println!("  History:        {} messages", config.agent.history_limit);
    println!("  Confirm wait:   {}s", config.agent.confirm_timeout_secs);
    println!("  Masters:        {}", config.master_ids.len());
    println!("  Image model:    {}", or_none(config.translation.image.as_deref()));
    println!("  Audio model:    {}", or_none(config.translation.audio.as_deref()));
    println!("  Video model:    {}", or_none(config.translation.video.as_deref()));
    println!("  Known models:   {}", config.models.len());
    println!("  ffmpeg:         {}", config.audio.ffmpeg_path);

    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("\n  ✅ Config file found");
    } else {
        println!("\n  ⚠️  No config file, run `parley onboard` first");
    }

    Ok(())
}
