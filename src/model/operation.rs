//! Business operations, use cases, page definitions and test definitions.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct BusinessState {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Reference to a use case from its operation document
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct UseCaseStub {
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct UiField {
    pub name: String,
    #[serde(rename = "type", default)]
    pub field_type: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct TestCase {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub preconditions: String,
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(default)]
    pub expected: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct BusinessOperation {
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub pattern: String,
    #[serde(default)]
    pub goal: String,
    #[serde(default)]
    pub roles: Vec<String>,
    /// Ordered process steps
    #[serde(default)]
    pub process_steps: Vec<String>,
    #[serde(default)]
    pub states: Vec<BusinessState>,
    #[serde(default)]
    pub use_cases: Vec<UseCaseStub>,
    #[serde(default)]
    pub ui_fields: Vec<UiField>,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct UseCase {
    pub display_name: String,
    #[serde(default)]
    pub actor: String,
    #[serde(default)]
    pub preconditions: String,
    #[serde(default)]
    pub postconditions: String,
    #[serde(default)]
    pub main_flow: Vec<String>,
    #[serde(default)]
    pub alternative_flows: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Page {
    pub display_name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub purpose: String,
    #[serde(default)]
    pub fields: Vec<UiField>,
    #[serde(default)]
    pub actions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct TestDefinition {
    pub display_name: String,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
}
