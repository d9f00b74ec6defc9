//! Versioned System Prompts
//!
//! Prompts live in YAML files with a top-level `versions` map:
//!
//! ```yaml
//! versions:
//!   "1.0":
//!     SYSTEM_PROMPT: |
//!       You are tutoring a student on {concept}...
//! ```
//!
//! When no version (or an unknown one) is requested, the highest version wins,
//! comparing dot-separated components numerically so that `1.10` > `1.2`.

use serde::Deserialize;
use std::{cmp::Ordering, collections::HashMap, path::Path};
use tracing::{debug, warn};

/// File name of the voice tutor prompt inside the prompts directory.
pub const VOICE_AGENT_PROMPT_FILE: &str = "system_prompt_voice.yaml";

#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("Failed to read prompt file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse prompt file: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("YAML file must contain a top-level 'versions' key")]
    MissingVersions,
    #[error("No prompt versions found in YAML")]
    NoVersions,
    #[error("'SYSTEM_PROMPT' missing for version '{0}'")]
    MissingSystemPrompt(String),
}

#[derive(Deserialize)]
struct PromptFile {
    versions: Option<serde_yaml::Mapping>,
}

#[derive(Deserialize, Debug, Clone)]
struct PromptVersion {
    #[serde(rename = "SYSTEM_PROMPT")]
    system_prompt: Option<String>,
}

/// All versions of one system prompt.
#[derive(Debug, Clone)]
pub struct PromptLibrary {
    versions: HashMap<String, PromptVersion>,
}

impl PromptLibrary {
    /// Loads a prompt library from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PromptError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let library = Self::from_yaml(&text)?;
        debug!(path = %path.display(), versions = library.versions.len(), "Loaded prompt library.");
        Ok(library)
    }

    pub fn from_yaml(text: &str) -> Result<Self, PromptError> {
        let file: PromptFile = serde_yaml::from_str(text)?;
        let mapping = file.versions.ok_or(PromptError::MissingVersions)?;

        let mut versions = HashMap::new();
        for (key, value) in mapping {
            // Unquoted keys such as `1.0` arrive as YAML numbers.
            let key = match key {
                serde_yaml::Value::String(s) => s,
                serde_yaml::Value::Number(n) => n.to_string(),
                other => serde_yaml::to_string(&other)?.trim().to_string(),
            };
            versions.insert(key, serde_yaml::from_value(value)?);
        }

        if versions.is_empty() {
            return Err(PromptError::NoVersions);
        }
        Ok(Self { versions })
    }

    /// The highest version present.
    pub fn latest_version(&self) -> &str {
        self.versions
            .keys()
            .max_by(|a, b| compare_versions(a, b))
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// Returns the system prompt for `version`, falling back to the latest
    /// version when `version` is `None` or unknown.
    pub fn system_prompt(&self, version: Option<&str>) -> Result<&str, PromptError> {
        let version = match version {
            Some(v) if self.versions.contains_key(v) => v,
            Some(v) => {
                warn!(requested = v, "Unknown prompt version; using the latest.");
                self.latest_version()
            }
            None => self.latest_version(),
        };
        self.versions
            .get(version)
            .and_then(|v| v.system_prompt.as_deref())
            .ok_or_else(|| PromptError::MissingSystemPrompt(version.to_string()))
    }
}

fn compare_versions(a: &str, b: &str) -> Ordering {
    let parse = |v: &str| -> Vec<u64> { v.split('.').map(|p| p.trim().parse().unwrap_or(0)).collect() };
    parse(a).cmp(&parse(b))
}

/// Fills the voice tutor template with the lesson being discussed.
///
/// Recognised placeholders are `{concept}`, `{context}` and `{steps_text}`;
/// the latter expands to one `Step N: ...` line per explained step.
pub fn build_voicebot_prompt(template: &str, concept: &str, context: &str, steps: &[&str]) -> String {
    let steps_text = steps
        .iter()
        .enumerate()
        .map(|(i, step)| format!("Step {}: {}", i + 1, step))
        .collect::<Vec<_>>()
        .join("\n");

    template
        .replace("{concept}", concept)
        .replace("{context}", context)
        .replace("{steps_text}", &steps_text)
}
