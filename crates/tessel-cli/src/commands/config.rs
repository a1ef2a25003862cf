use std::path::Path;

pub fn run(path: Option<&Path>) -> Result<(), String> {
    let config = super::load_config(path)?;
    let text = config.to_json_pretty().map_err(|e| e.to_string())?;
    println!("{text}");
    Ok(())
}
