//! Layer classification for page and use-case documents.
//!
//! Explicit layer directories decide the layer on their own. Legacy
//! `/pages/` and `/usecases/` paths fall back to ordered keyword matching on
//! the content; broader scopes are tested first and the first layer with a
//! matching keyword wins. With no match the narrowest scope is assumed.
//!
//! Classification is a pure function of `(path, content)`.

use crate::model::{DocumentKind, Layer};
use crate::rules::{
    PAGE_LAYER_KEYWORDS, PATH_DEDICATED_PAGES, PATH_GLOBAL_PAGES, PATH_INDIVIDUAL_USECASES,
    PATH_LEGACY_PAGES, PATH_LEGACY_USECASES, PATH_SHARED_PAGES, PATH_SHARED_USECASES,
    USECASE_SCOPE_KEYWORDS,
};
use serde::{Deserialize, Serialize};

/// Which rule produced a classification
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum ClassificationRule {
    /// Explicit layer directory in the path
    Path { marker: String },
    /// Legacy path, content contained a layer keyword
    Keyword { keyword: String },
    /// Legacy path without any keyword match
    Default,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Classification {
    pub path: String,
    pub kind: DocumentKind,
    pub layer: Layer,
    #[serde(flatten)]
    pub rule: ClassificationRule,
}

/// Layer markers that decide on their own, with the layer they assign
const PATH_RULES: &[(&str, &str)] = &[
    (PATH_GLOBAL_PAGES, "global"),
    (PATH_SHARED_PAGES, "operation"),
    (PATH_DEDICATED_PAGES, "usecase"),
    (PATH_SHARED_USECASES, "shared"),
    (PATH_INDIVIDUAL_USECASES, "individual"),
];

/// '/'-separated with a leading '/' so markers match at the first segment too
fn normalize_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    if path.starts_with('/') {
        path
    } else {
        format!("/{}", path)
    }
}

/// Kind of document implied by the rightmost layer directory in `path`.
///
/// Paths without any layer directory are treated as pages.
pub fn infer_kind(path: &str) -> DocumentKind {
    let path = normalize_path(path);
    let markers: [(&str, DocumentKind); 7] = [
        (PATH_GLOBAL_PAGES, DocumentKind::Page),
        (PATH_SHARED_PAGES, DocumentKind::Page),
        (PATH_DEDICATED_PAGES, DocumentKind::Page),
        (PATH_LEGACY_PAGES, DocumentKind::Page),
        (PATH_SHARED_USECASES, DocumentKind::UseCase),
        (PATH_INDIVIDUAL_USECASES, DocumentKind::UseCase),
        (PATH_LEGACY_USECASES, DocumentKind::UseCase),
    ];

    markers
        .iter()
        .filter_map(|(marker, kind)| path.rfind(marker).map(|pos| (pos, *kind)))
        .max_by_key(|(pos, _)| *pos)
        .map(|(_, kind)| kind)
        .unwrap_or(DocumentKind::Page)
}

/// Classify a document, reporting the rule that decided
pub fn explain(path: &str, content: &str) -> Classification {
    let kind = infer_kind(path);
    let normalized = normalize_path(path);

    // Rightmost explicit marker wins when directories nest
    let by_path = PATH_RULES
        .iter()
        .filter_map(|(marker, layer)| {
            let layer = Layer::from_name(layer)?;
            (layer.kind() == kind)
                .then(|| normalized.rfind(marker).map(|pos| (pos, *marker, layer)))
                .flatten()
        })
        .max_by_key(|(pos, _, _)| *pos);

    if let Some((_, marker, layer)) = by_path {
        return Classification {
            path: path.to_string(),
            kind,
            layer,
            rule: ClassificationRule::Path {
                marker: marker.to_string(),
            },
        };
    }

    let table = match kind {
        DocumentKind::Page => PAGE_LAYER_KEYWORDS,
        DocumentKind::UseCase => USECASE_SCOPE_KEYWORDS,
    };

    for (layer_name, keywords) in table {
        let Some(layer) = Layer::from_name(layer_name).filter(|l| l.kind() == kind) else {
            continue;
        };
        if let Some(keyword) = keywords.iter().find(|k| content.contains(*k)) {
            return Classification {
                path: path.to_string(),
                kind,
                layer,
                rule: ClassificationRule::Keyword {
                    keyword: keyword.to_string(),
                },
            };
        }
    }

    Classification {
        path: path.to_string(),
        kind,
        layer: Layer::narrowest(kind),
        rule: ClassificationRule::Default,
    }
}

/// Layer of the document at `path` with `content`
pub fn classify(path: &str, content: &str) -> Layer {
    explain(path, content).layer
}
