pub mod config;
pub mod simulate;

use std::path::Path;

use tessel_world::WorldConfig;

/// Load the configuration file if one was given, otherwise the defaults.
fn load_config(path: Option<&Path>) -> Result<WorldConfig, String> {
    match path {
        Some(path) => WorldConfig::load(path).map_err(|e| e.to_string()),
        None => Ok(WorldConfig::default()),
    }
}
