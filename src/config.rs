use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

/// Header names recognised for each normalized field, in preference order.
///
/// Loaded from an optional JSON file:
/// ```json
/// {
///   "time": ["Start time", "Timestamp", "Submitted At"],
///   "name": ["Preferred Name", "Full Name"]
/// }
/// ```
/// Lists that are left out keep their defaults.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ColumnAliases {
    pub time: Vec<String>,
    pub email: Vec<String>,
    pub name: Vec<String>,
}

impl Default for ColumnAliases {
    fn default() -> Self {
        Self {
            time: to_strings(&["Start time", "Timestamp"]),
            email: to_strings(&["Email", "Email Address"]),
            name: to_strings(&[
                "Full Name",
                "Name",
                "Student Name",
                "Respondent",
                "Name (First Last)",
                "Your Name",
                "Name1",
                "Name2",
            ]),
        }
    }
}

impl ColumnAliases {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read alias file {}", path.display()))?;
        let aliases: ColumnAliases = serde_json::from_str(&content)
            .with_context(|| format!("invalid alias file {}", path.display()))?;
        Ok(aliases)
    }

    pub fn load_or_default(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

#[derive(Debug, Clone)]
pub struct ReportOptions {
    pub allow_name_fallback: bool,
    pub include_diagnostics: bool,
    pub out: PathBuf,
}
