use anyhow::{Context, Result};
use selva_sim::simulation::loader::load_configuration;
use selva_sim::simulation::Setup;
use std::path::Path;

use crate::printing::print_parameters;
use crate::utils::init_logging;

/// Resolve a configuration and every file it names without simulating.
pub fn validate_configuration(path: &Path) -> Result<()> {
    println!("🔍 Validating configuration: {}", path.display());

    let config = load_configuration(path)
        .with_context(|| format!("Failed to load configuration {}", path.display()))?;
    init_logging(config.global.debug);

    let setup = Setup::from_configuration(config).context("Invalid configuration")?;
    print_parameters(&setup);

    println!("✓ Configuration is valid");
    Ok(())
}
