//! Keep/drop relabel rules.
//!
//! Used twice: by discovery to filter targets, and by the explorer to filter
//! series before counting them. Only the keep/drop subset is supported.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::types::Labels;

/// What to do with a subject whose joined source labels match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelabelAction {
    /// Drop the subject unless it matches.
    #[default]
    Keep,
    /// Drop the subject if it matches.
    Drop,
}

/// A relabel rule as written in the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelabelRule {
    pub source_labels: Vec<String>,
    #[serde(default = "default_separator")]
    pub separator: String,
    pub regex: String,
    #[serde(default)]
    pub action: RelabelAction,
}

fn default_separator() -> String {
    ";".to_string()
}

impl RelabelRule {
    /// Compile the rule's regex, anchored on both ends.
    pub fn compile(&self) -> ConfigResult<CompiledRule> {
        let regex = Regex::new(&format!("^(?:{})$", self.regex))
            .map_err(|e| ConfigError::Invalid(format!("relabel regex {:?}: {e}", self.regex)))?;
        Ok(CompiledRule {
            source_labels: self.source_labels.clone(),
            separator: self.separator.clone(),
            regex,
            action: self.action,
        })
    }
}

/// A relabel rule ready for evaluation.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    source_labels: Vec<String>,
    separator: String,
    regex: Regex,
    action: RelabelAction,
}

impl CompiledRule {
    /// Whether the subject survives this rule.
    pub fn keeps(&self, labels: &Labels) -> bool {
        let joined = self
            .source_labels
            .iter()
            .map(|name| labels.get(name).map(String::as_str).unwrap_or(""))
            .collect::<Vec<_>>()
            .join(&self.separator);
        let matched = self.regex.is_match(&joined);
        match self.action {
            RelabelAction::Keep => matched,
            RelabelAction::Drop => !matched,
        }
    }
}

/// Compile a list of rules.
pub fn compile_rules(rules: &[RelabelRule]) -> ConfigResult<Vec<CompiledRule>> {
    rules.iter().map(RelabelRule::compile).collect()
}

/// Apply rules in order; the first rule that drops wins.
pub fn keeps_all(rules: &[CompiledRule], labels: &Labels) -> bool {
    rules.iter().all(|r| r.keeps(labels))
}
