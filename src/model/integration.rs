//! Integration specification model.

use serde::{Deserialize, Serialize};

/// A service this service depends on
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct IntegrationDependency {
    pub service: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub purpose: String,
    /// 同期 / 非同期, free text
    #[serde(default)]
    pub mode: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct EventSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ApiCall {
    pub method: String,
    pub path: String,
    /// Target service for outbound calls, caller for inbound ones
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counterpart: Option<String>,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SagaStyle {
    #[default]
    Choreography,
    Orchestration,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SagaParticipant {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SagaStep {
    pub from: String,
    pub to: String,
    pub message: String,
}

/// Best-effort reading of a sequence diagram
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SagaPattern {
    pub style: SagaStyle,
    pub participants: Vec<SagaParticipant>,
    pub steps: Vec<SagaStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct IntegrationSpec {
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub dependencies: Vec<IntegrationDependency>,
    #[serde(default)]
    pub provided_events: Vec<EventSpec>,
    #[serde(default)]
    pub consumed_events: Vec<EventSpec>,
    #[serde(default)]
    pub outbound_calls: Vec<ApiCall>,
    #[serde(default)]
    pub inbound_calls: Vec<ApiCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saga: Option<SagaPattern>,
}
