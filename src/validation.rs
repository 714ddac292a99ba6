use serde::{Deserialize, Serialize};

/// Outcome of a read-only validation pass over a markdown document
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ValidationResult {
    /// Whether validation passed (no errors; warnings allowed)
    pub valid: bool,
    /// Human-readable structural errors
    pub errors: Vec<String>,
    /// Non-fatal findings
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn from_findings(errors: Vec<String>, warnings: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }
}
