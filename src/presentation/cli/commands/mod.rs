pub mod detect_git;
pub mod fetch;
pub mod load_commits;
pub mod ls_remote;
pub mod test_connection;

use anyhow::Result;
use serde::Serialize;

use super::OutputFormat;

/// Prints `value` as JSON or YAML. Returns false for text output.
pub(crate) fn print_structured<T: Serialize>(value: &T, format: OutputFormat) -> Result<bool> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value)?);
            Ok(true)
        }
        OutputFormat::Yaml => {
            print!("{}", serde_yaml::to_string(value)?);
            Ok(true)
        }
        OutputFormat::Text => Ok(false),
    }
}
