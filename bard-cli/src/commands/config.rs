use anyhow::{Context, Result};
use shared::config::{ClientConfig, ConfigFormat};
use std::{fs, path::Path};

/// Writes the default configuration in `format` to `output`, or to `bard.<format>`.
///
/// # Errors
/// Returns an error if the format is unsupported or the file cannot be written.
pub fn generate_config(format: &str, output: Option<&Path>) -> Result<()> {
    let format = ConfigFormat::from_name(format)?;
    let file_name = format!("bard.{}", format.extension());
    let path = output.unwrap_or_else(|| Path::new(&file_name));

    let serialized = ClientConfig::with_defaults().render(format)?;
    fs::write(path, serialized)
        .with_context(|| format!("failed to write {}", path.display()))?;

    println!(
        "Configuration file '{}' generated successfully.",
        path.display()
    );
    Ok(())
}
