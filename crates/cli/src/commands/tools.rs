//! `toolwright tools` — list the built-in capabilities.

use toolwright_agent::prompt;
use toolwright_config::AppConfig;

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let cwd = std::env::current_dir()?;
    let registry = toolwright_tools::default_registry(&cwd, &config.tools)?;

    println!("{}", prompt::render_catalogue(&registry.snapshot()));
    println!("Workspace: {}", cwd.display());
    Ok(())
}
