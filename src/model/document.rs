//! Scanned specification documents and their sharing layers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What a scanned markdown file describes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Page,
    #[serde(rename = "usecase")]
    UseCase,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Page => "page",
            DocumentKind::UseCase => "usecase",
        }
    }
}

/// Sharing scope of a page definition
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum PageLayer {
    /// Visible to the whole system
    Global,
    /// Shared by the use cases of one business operation
    Operation,
    /// Private to one use case
    Usecase,
}

/// Sharing scope of a use case
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum UseCaseScope {
    Shared,
    Individual,
}

/// Layer assigned to a document by the classifier.
///
/// Serialized as the bare layer name (`"global"`, `"shared"`, ...).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(untagged)]
pub enum Layer {
    Page(PageLayer),
    UseCase(UseCaseScope),
}

impl Layer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::Page(PageLayer::Global) => "global",
            Layer::Page(PageLayer::Operation) => "operation",
            Layer::Page(PageLayer::Usecase) => "usecase",
            Layer::UseCase(UseCaseScope::Shared) => "shared",
            Layer::UseCase(UseCaseScope::Individual) => "individual",
        }
    }

    /// Parse a layer name as produced by [`Layer::as_str`]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "global" => Some(Layer::Page(PageLayer::Global)),
            "operation" => Some(Layer::Page(PageLayer::Operation)),
            "usecase" => Some(Layer::Page(PageLayer::Usecase)),
            "shared" => Some(Layer::UseCase(UseCaseScope::Shared)),
            "individual" => Some(Layer::UseCase(UseCaseScope::Individual)),
            _ => None,
        }
    }

    /// Narrowest scope for a document kind
    pub fn narrowest(kind: DocumentKind) -> Self {
        match kind {
            DocumentKind::Page => Layer::Page(PageLayer::Usecase),
            DocumentKind::UseCase => Layer::UseCase(UseCaseScope::Individual),
        }
    }

    pub fn kind(&self) -> DocumentKind {
        match self {
            Layer::Page(_) => DocumentKind::Page,
            Layer::UseCase(_) => DocumentKind::UseCase,
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A page or use-case markdown file found by the scanner.
///
/// Identity is `path`. Documents are rebuilt on every scan and never mutated
/// afterwards; a re-import produces fresh values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpecDocument {
    /// Path relative to the scan root, always '/'-separated
    pub path: String,
    /// Markdown content with ANSI escapes stripped
    #[serde(skip)]
    pub raw_content: String,
    pub kind: DocumentKind,
    pub layer: Layer,
    /// Name taken from the title line (falls back to the file stem)
    pub display_name: String,
    pub service_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capability_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_case_id: Option<String>,
    /// Page definitions belonging to this use case (use cases only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub associated_pages: Vec<String>,
}

impl SpecDocument {
    /// Content length in characters, used as a completeness proxy
    pub fn content_length(&self) -> usize {
        self.raw_content.chars().count()
    }

    /// Owner of the document's sharing scope.
    ///
    /// Global pages share the `global` scope, operation-level documents are
    /// owned by their operation, use-case-level documents by their use case.
    pub fn shared_scope(&self) -> String {
        let operation = [
            Some(self.service_id.as_str()),
            self.capability_id.as_deref(),
            self.operation_id.as_deref(),
        ]
        .iter()
        .flatten()
        .copied()
        .collect::<Vec<_>>()
        .join("/");

        match self.layer {
            Layer::Page(PageLayer::Global) => "global".to_string(),
            Layer::Page(PageLayer::Operation) | Layer::UseCase(UseCaseScope::Shared) => operation,
            Layer::Page(PageLayer::Usecase) | Layer::UseCase(UseCaseScope::Individual) => {
                match &self.use_case_id {
                    Some(uc) => format!("{}/{}", operation, uc),
                    None => operation,
                }
            }
        }
    }

    /// Content without its first H1 title line
    pub fn body_without_title(&self) -> &str {
        let trimmed = self.raw_content.trim_start();
        if trimmed.starts_with("# ") {
            match trimmed.find('\n') {
                Some(idx) => trimmed[idx + 1..].trim_start_matches('\n'),
                None => "",
            }
        } else {
            trimmed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(layer: Layer, use_case_id: Option<&str>) -> SpecDocument {
        SpecDocument {
            path: "services/pm/capabilities/delivery/operations/submit/x.md".to_string(),
            raw_content: "# ページ定義：一覧\n\n本文".to_string(),
            kind: layer.kind(),
            layer,
            display_name: "一覧".to_string(),
            service_id: "pm".to_string(),
            capability_id: Some("delivery".to_string()),
            operation_id: Some("submit".to_string()),
            use_case_id: use_case_id.map(|s| s.to_string()),
            associated_pages: vec![],
        }
    }

    #[test]
    fn test_layer_names_round_trip() {
        for name in ["global", "operation", "usecase", "shared", "individual"] {
            let layer = Layer::from_name(name).unwrap();
            assert_eq!(layer.as_str(), name);
        }
        assert!(Layer::from_name("unknown").is_none());
    }

    #[test]
    fn test_layer_serializes_as_bare_name() {
        let json = serde_json::to_string(&Layer::UseCase(UseCaseScope::Shared)).unwrap();
        assert_eq!(json, "\"shared\"");
        let back: Layer = serde_json::from_str("\"operation\"").unwrap();
        assert_eq!(back, Layer::Page(PageLayer::Operation));
    }

    #[test]
    fn test_shared_scope_per_layer() {
        assert_eq!(doc(Layer::Page(PageLayer::Global), None).shared_scope(), "global");
        assert_eq!(
            doc(Layer::Page(PageLayer::Operation), Some("uc")).shared_scope(),
            "pm/delivery/submit"
        );
        assert_eq!(
            doc(Layer::Page(PageLayer::Usecase), Some("uc")).shared_scope(),
            "pm/delivery/submit/uc"
        );
    }

    #[test]
    fn test_body_without_title() {
        let d = doc(Layer::Page(PageLayer::Usecase), None);
        assert_eq!(d.body_without_title(), "本文");
        assert_eq!(d.content_length(), "# ページ定義：一覧\n\n本文".chars().count());
    }
}
