use crate::layer_classifier;
use crate::model::{DocumentKind, SpecDocument};
use crate::section_parser::{extract_title, strip_ansi};
use crate::spec_parsers::operation::{PAGE_PREFIX, TEST_PREFIX, USE_CASE_PREFIX};
use crate::EXCLUDED_DIRS;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

pub const SERVICES_DIR: &str = "services";
pub const GLOBAL_PAGES_DIR: &str = "global-shared-pages";
pub const GLOBAL_SERVICE_ID: &str = "global";

/// Directories below an operation that hold pages or use cases
const LAYER_DIRS: &[&str] = &[
    "shared-pages",
    "dedicated-pages",
    "shared-usecases",
    "individual-usecases",
];
const LEGACY_DIRS: &[&str] = &["pages", "usecases"];

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Scan root not found: {}", path.display())]
    RootNotFound { path: PathBuf },
    #[error("No 'services' directory under {}", path.display())]
    ServicesDirNotFound { path: PathBuf },
}

/// Documents found under a `services/` tree
#[derive(Debug, Serialize, Deserialize)]
pub struct ScanResult {
    pub root: PathBuf,
    /// Sorted by path
    pub documents: Vec<SpecDocument>,
    /// Non-fatal problems: missing optional directories, unreadable files
    pub scan_errors: Vec<String>,
}

impl ScanResult {
    pub fn count(&self, kind: DocumentKind) -> usize {
        self.documents.iter().filter(|d| d.kind == kind).count()
    }
}

/// Where a markdown file sits in the conventional layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentLocation {
    pub service_id: String,
    pub capability_id: Option<String>,
    pub operation_id: Option<String>,
    pub use_case_id: Option<String>,
}

/// Resolve a '/'-separated path relative to the scan root.
///
/// Returns `None` for files outside the page and use-case directories
/// (operation READMEs, capability overviews and the like).
pub fn locate(relative: &str, kind: DocumentKind) -> Option<DocumentLocation> {
    let segments: Vec<&str> = relative.split('/').filter(|s| !s.is_empty()).collect();
    let (&file, dirs) = segments.split_last()?;
    let stem = Path::new(file).file_stem()?.to_str()?.to_string();

    match dirs {
        [SERVICES_DIR, GLOBAL_PAGES_DIR, ..] => Some(DocumentLocation {
            service_id: GLOBAL_SERVICE_ID.to_string(),
            capability_id: None,
            operation_id: None,
            use_case_id: None,
        }),
        [SERVICES_DIR, service, "capabilities", capability, "operations", operation, layer_dir, rest @ ..] => {
            if !LAYER_DIRS.contains(layer_dir) && !LEGACY_DIRS.contains(layer_dir) {
                return None;
            }
            let nested = rest.first().map(|s| s.to_string());
            let use_case_id = match kind {
                DocumentKind::UseCase => nested.or(Some(stem)),
                DocumentKind::Page if *layer_dir == "shared-pages" => None,
                DocumentKind::Page => nested,
            };
            Some(DocumentLocation {
                service_id: service.to_string(),
                capability_id: Some(capability.to_string()),
                operation_id: Some(operation.to_string()),
                use_case_id,
            })
        }
        _ => None,
    }
}

/// Display name from the title line, falling back to the file stem
pub fn display_name(content: &str, path: &str) -> String {
    extract_title(content, &[USE_CASE_PREFIX, PAGE_PREFIX, TEST_PREFIX])
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| {
            Path::new(path)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string()
        })
}

#[derive(Debug)]
pub struct DocScanner {
    excluded_dirs: HashSet<String>,
}

impl DocScanner {
    pub fn new() -> Self {
        Self {
            excluded_dirs: EXCLUDED_DIRS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Scan `{root}/services` for page and use-case definitions
    pub fn scan(&self, root: &Path) -> Result<ScanResult, ScanError> {
        if !root.is_dir() {
            return Err(ScanError::RootNotFound {
                path: root.to_path_buf(),
            });
        }
        let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        let services = root.join(SERVICES_DIR);
        if !services.is_dir() {
            return Err(ScanError::ServicesDirNotFound { path: root });
        }

        let mut documents = Vec::new();
        let mut scan_errors = Vec::new();

        let walker = WalkDir::new(&services)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                if e.file_type().is_dir() && e.depth() > 0 {
                    return !e
                        .file_name()
                        .to_str()
                        .map(|n| self.excluded_dirs.contains(n))
                        .unwrap_or(false);
                }
                true
            });

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    scan_errors.push(e.to_string());
                    continue;
                }
            };

            if entry.file_type().is_dir() {
                if is_operation_dir(&root, entry.path()) {
                    scan_errors.extend(missing_layer_dirs(&root, entry.path()));
                }
                continue;
            }
            if entry.path().extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }

            let relative = relative_path(&root, entry.path());
            let kind = layer_classifier::infer_kind(&relative);
            let Some(location) = locate(&relative, kind) else {
                debug!(path = %relative, "Skipping file outside page/use-case directories");
                continue;
            };

            let content = match std::fs::read_to_string(entry.path()) {
                Ok(c) => strip_ansi(&c),
                Err(e) => {
                    warn!(path = %relative, error = %e, "Failed to read document");
                    scan_errors.push(format!("{}: {}", relative, e));
                    continue;
                }
            };

            let layer = layer_classifier::classify(&relative, &content);
            documents.push(SpecDocument {
                display_name: display_name(&content, &relative),
                path: relative,
                raw_content: content,
                kind,
                layer,
                service_id: location.service_id,
                capability_id: location.capability_id,
                operation_id: location.operation_id,
                use_case_id: location.use_case_id,
                associated_pages: Vec::new(),
            });
        }

        documents.sort_by(|a, b| a.path.cmp(&b.path));
        link_pages(&mut documents);

        debug!(
            documents = documents.len(),
            errors = scan_errors.len(),
            "Scan finished"
        );
        Ok(ScanResult {
            root,
            documents,
            scan_errors,
        })
    }
}

impl Default for DocScanner {
    fn default() -> Self {
        Self::new()
    }
}

fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// `services/{s}/capabilities/{c}/operations/{o}`
fn is_operation_dir(root: &Path, dir: &Path) -> bool {
    let relative = relative_path(root, dir);
    let segments: Vec<&str> = relative.split('/').collect();
    matches!(
        segments.as_slice(),
        [SERVICES_DIR, _, "capabilities", _, "operations", _]
    )
}

fn missing_layer_dirs(root: &Path, operation: &Path) -> Vec<String> {
    if LEGACY_DIRS.iter().any(|d| operation.join(d).is_dir()) {
        return Vec::new();
    }
    LAYER_DIRS
        .iter()
        .filter(|d| !operation.join(d).is_dir())
        .map(|d| format!("{}/{}: directory not found", relative_path(root, operation), d))
        .collect()
}

/// Fill `associated_pages` of each use case with the pages it owns
fn link_pages(documents: &mut [SpecDocument]) {
    let mut owned: BTreeMap<(String, Option<String>, Option<String>, String), Vec<String>> =
        BTreeMap::new();
    for doc in documents.iter().filter(|d| d.kind == DocumentKind::Page) {
        if let Some(uc) = &doc.use_case_id {
            owned
                .entry((
                    doc.service_id.clone(),
                    doc.capability_id.clone(),
                    doc.operation_id.clone(),
                    uc.clone(),
                ))
                .or_default()
                .push(doc.path.clone());
        }
    }

    for doc in documents.iter_mut().filter(|d| d.kind == DocumentKind::UseCase) {
        let Some(uc) = &doc.use_case_id else { continue };
        let key = (
            doc.service_id.clone(),
            doc.capability_id.clone(),
            doc.operation_id.clone(),
            uc.clone(),
        );
        if let Some(pages) = owned.get(&key) {
            doc.associated_pages = pages.clone();
        }
    }
}
