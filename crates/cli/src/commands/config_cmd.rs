//! `toolwright config` — print or validate configuration.

use toolwright_config::AppConfig;

pub fn run(validate: bool) -> Result<(), Box<dyn std::error::Error>> {
    if !validate {
        println!("# {}", AppConfig::config_dir().join("config.toml").display());
        print!("{}", AppConfig::default_toml());
        return Ok(());
    }

    let config = AppConfig::load().map_err(|e| format!("Config error: {e}"))?;
    config.validate().map_err(|e| format!("Config error: {e}"))?;

    println!("Config OK");
    println!("  Model:          {}", config.provider.model);
    println!("  Base URL:       {}", config.provider.base_url);
    println!(
        "  API key:        {}",
        if config.provider.api_key.is_some() { "set" } else { "missing" }
    );
    println!("  Cost ceiling:   {}", config.budget.cost_ceiling);
    println!("  Compact at:     {:.0}%", config.budget.compact_at_fraction * 100.0);
    println!("  Safe mode:      {}", config.agent.safe_mode);
    Ok(())
}
