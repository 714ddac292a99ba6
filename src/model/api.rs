//! API specification model.

use serde::{Deserialize, Serialize};

use super::Property;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ApiParameter {
    pub name: String,
    /// path, query, header or body
    #[serde(default)]
    pub location: String,
    #[serde(rename = "type", default)]
    pub param_type: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ApiResponse {
    pub status: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ApiEndpoint {
    pub path: String,
    pub method: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<String>,
    #[serde(default)]
    pub parameters: Vec<ApiParameter>,
    #[serde(default)]
    pub responses: Vec<ApiResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ApiSchema {
    pub name: String,
    #[serde(default)]
    pub properties: Vec<Property>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ApiSpec {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub authentication: String,
    #[serde(default)]
    pub endpoints: Vec<ApiEndpoint>,
    #[serde(default)]
    pub schemas: Vec<ApiSchema>,
}
