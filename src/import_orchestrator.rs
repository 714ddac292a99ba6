//! End-to-end import of a specification tree.
//!
//! Phases run in order: scan, classify, analyze, persist, consolidate. All
//! classified records are written in one transaction; each consolidation then
//! runs in its own transaction, so a failing group never undoes the import or
//! another group.

use crate::consolidator::{self, ConsolidationResult, StoredIds};
use crate::doc_scanner::{DocScanner, ScanError};
use crate::duplication_analyzer::{DuplicationAnalysisResult, DuplicationAnalyzer, SimilarityPass};
use crate::layer_classifier;
use crate::model::{DocumentKind, SpecDocument};
use crate::storage::{ClassifiedRecord, StorageError, StoragePort, UpsertOutcome};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    /// Report what would happen without writing to the store
    pub dry_run: bool,
    /// Consolidate every duplicate group with its proposed strategy
    pub consolidate: bool,
    /// Near-miss name reporting threshold
    pub similarity: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportSummary {
    pub imported_at: String,
    pub root: PathBuf,
    pub dry_run: bool,
    pub scanned: usize,
    pub pages: usize,
    pub usecases: usize,
    pub by_layer: BTreeMap<String, usize>,
    pub created: usize,
    pub updated: usize,
    pub duplication: DuplicationAnalysisResult,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub consolidations: Vec<ConsolidationResult>,
    pub scan_errors: Vec<String>,
    /// Documents stored as an existing record because they share its natural key
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

/// What one persist transaction wrote
#[derive(Debug, Default)]
struct Persisted {
    created: usize,
    updated: usize,
    stored_ids: StoredIds,
    collisions: Vec<String>,
}

#[derive(Debug)]
pub struct ImportOrchestrator<S: StoragePort> {
    store: S,
    scanner: DocScanner,
    stored_ids: StoredIds,
}

impl<S: StoragePort> ImportOrchestrator<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            scanner: DocScanner::new(),
            stored_ids: StoredIds::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Record id of every document persisted by the last import
    pub fn stored_ids(&self) -> &StoredIds {
        &self.stored_ids
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn run(&mut self, root: &Path, options: &ImportOptions) -> Result<ImportSummary, ScanError> {
        let scan = self.scanner.scan(root)?;
        info!(
            root = %scan.root.display(),
            documents = scan.documents.len(),
            scan_errors = scan.scan_errors.len(),
            "Scan complete"
        );

        let documents = reclassify(scan.documents);
        let mut by_layer: BTreeMap<String, usize> = BTreeMap::new();
        for doc in &documents {
            *by_layer.entry(doc.layer.as_str().to_string()).or_default() += 1;
        }

        let mut analyzer = DuplicationAnalyzer::new();
        if let Some(threshold) = options.similarity {
            analyzer = analyzer.with_similarity(SimilarityPass::new(threshold));
        }
        let duplication = analyzer.report(&documents);
        info!(
            usecase_groups = duplication.usecase_duplications.total,
            page_groups = duplication.page_duplications.total,
            "Duplication analysis complete"
        );

        let mut summary = ImportSummary {
            imported_at: chrono::Utc::now().to_rfc3339(),
            root: scan.root,
            dry_run: options.dry_run,
            scanned: documents.len(),
            pages: count(&documents, DocumentKind::Page),
            usecases: count(&documents, DocumentKind::UseCase),
            by_layer,
            created: 0,
            updated: 0,
            duplication,
            consolidations: Vec::new(),
            scan_errors: scan.scan_errors,
            warnings: Vec::new(),
            errors: Vec::new(),
        };

        self.stored_ids.clear();
        if !options.dry_run {
            match self.persist(&documents) {
                Ok(persisted) => {
                    summary.created = persisted.created;
                    summary.updated = persisted.updated;
                    summary.warnings = persisted.collisions;
                    self.stored_ids = persisted.stored_ids;
                    info!(
                        created = summary.created,
                        updated = summary.updated,
                        collisions = summary.warnings.len(),
                        "Records persisted"
                    );
                }
                Err(e) => {
                    warn!(error = %e, "Import rolled back");
                    summary.errors.push(e.to_string());
                    return Ok(summary);
                }
            }
        }

        if options.consolidate {
            let groups = summary
                .duplication
                .usecase_duplications
                .groups
                .iter()
                .chain(summary.duplication.page_duplications.groups.iter());
            let results: Vec<ConsolidationResult> = groups
                .map(|g| {
                    consolidator::consolidate_stored(
                        g,
                        g.merge_strategy,
                        options.dry_run,
                        &mut self.store,
                        &self.stored_ids,
                    )
                })
                .collect();
            for result in results.iter().filter(|r| !r.success) {
                summary.errors.extend(
                    result
                        .errors
                        .iter()
                        .map(|e| format!("{}: {}", result.normalized_key, e)),
                );
            }
            summary.consolidations = results;
        }

        Ok(summary)
    }

    /// Upsert every document in one transaction, use cases before their pages.
    ///
    /// A document whose natural key was already written by another document
    /// of this import lands on that record; the collision is reported.
    fn persist(&mut self, documents: &[SpecDocument]) -> Result<Persisted, StorageError> {
        let parents = page_parents(documents);
        let mut ordered: Vec<&SpecDocument> = documents.iter().collect();
        ordered.sort_by_key(|d| d.kind != DocumentKind::UseCase);

        self.store.begin()?;
        let mut persisted = Persisted::default();
        let mut owners: HashMap<String, &str> = HashMap::new();

        for doc in ordered {
            let parent_id = parents
                .get(doc.path.as_str())
                .map(|uc| consolidator::stored_id(&persisted.stored_ids, uc));
            let record = ClassifiedRecord::from_document(doc, parent_id);
            let key = record.natural_key();
            match self.store.upsert(record) {
                Ok((id, outcome)) => {
                    match outcome {
                        UpsertOutcome::Created => persisted.created += 1,
                        UpsertOutcome::Updated => persisted.updated += 1,
                    }
                    match owners.get(&id) {
                        Some(first) => {
                            warn!(path = %doc.path, record = %id, key = %key, "Natural key collision");
                            persisted.collisions.push(format!(
                                "'{}' shares natural key {} with '{}' and was stored as record '{}'",
                                doc.path, key, first, id
                            ));
                        }
                        None => {
                            owners.insert(id.clone(), doc.path.as_str());
                        }
                    }
                    persisted.stored_ids.insert(doc.path.clone(), id);
                }
                Err(e) => {
                    if let Err(rollback_err) = self.store.rollback() {
                        warn!(error = %rollback_err, "Rollback failed");
                    }
                    return Err(e);
                }
            }
        }

        self.store.commit()?;
        Ok(persisted)
    }
}

/// Layer is a pure function of path and content, so it is derived again here
fn reclassify(documents: Vec<SpecDocument>) -> Vec<SpecDocument> {
    documents
        .into_iter()
        .map(|doc| SpecDocument {
            layer: layer_classifier::classify(&doc.path, &doc.raw_content),
            ..doc
        })
        .collect()
}

fn count(documents: &[SpecDocument], kind: DocumentKind) -> usize {
    documents.iter().filter(|d| d.kind == kind).count()
}

/// Page path -> owning use-case path
fn page_parents(documents: &[SpecDocument]) -> HashMap<&str, &str> {
    let mut parents = HashMap::new();
    for uc in documents.iter().filter(|d| d.kind == DocumentKind::UseCase) {
        for page in &uc.associated_pages {
            parents.entry(page.as_str()).or_insert(uc.path.as_str());
        }
    }
    parents
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn op(service: &str, operation: &str) -> String {
        format!("services/{}/capabilities/delivery/operations/{}", service, operation)
    }

    /// Three operations each defining the same use case, one with a page
    fn create_tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        for (service, operation, body) in [("pm", "a", "短い"), ("sales", "b", "とても長い本文です"), ("hr", "c", "中くらい")] {
            write(
                dir.path(),
                &format!("{}/individual-usecases/submit.md", op(service, operation)),
                &format!("# ユースケース：成果物を提出する\n\n{}\n", body),
            );
        }
        write(
            dir.path(),
            &format!("{}/dedicated-pages/submit/form.md", op("pm", "a")),
            "# ページ定義：提出フォーム\n",
        );
        dir
    }

    #[test]
    fn test_import_persists_classified_records() {
        let dir = create_tree();
        let mut orchestrator = ImportOrchestrator::new(InMemoryStore::new());
        let summary = orchestrator.run(dir.path(), &ImportOptions::default()).unwrap();

        assert_eq!(summary.scanned, 4);
        assert_eq!(summary.usecases, 3);
        assert_eq!(summary.pages, 1);
        assert_eq!(summary.created, 4);
        assert_eq!(summary.by_layer.get("individual"), Some(&3));
        assert_eq!(summary.duplication.usecase_duplications.total, 1);
        assert!(summary.errors.is_empty());

        let store = orchestrator.into_store();
        let page = store
            .records()
            .find(|r| r.kind == DocumentKind::Page)
            .unwrap();
        assert_eq!(
            page.parent_id.as_deref(),
            Some(format!("{}/individual-usecases/submit.md", op("pm", "a")).as_str())
        );
    }

    #[test]
    fn test_reimport_updates_instead_of_duplicating() {
        let dir = create_tree();
        let mut orchestrator = ImportOrchestrator::new(InMemoryStore::new());
        orchestrator.run(dir.path(), &ImportOptions::default()).unwrap();
        let summary = orchestrator.run(dir.path(), &ImportOptions::default()).unwrap();

        assert_eq!(summary.created, 0);
        assert_eq!(summary.updated, 4);
        assert_eq!(orchestrator.store().len(), 4);
    }

    #[test]
    fn test_dry_run_never_touches_store() {
        let dir = create_tree();
        let mut orchestrator = ImportOrchestrator::new(InMemoryStore::new());
        let options = ImportOptions {
            dry_run: true,
            consolidate: true,
            similarity: None,
        };
        let summary = orchestrator.run(dir.path(), &options).unwrap();

        assert!(summary.dry_run);
        assert_eq!(summary.consolidations.len(), 1);
        assert!(summary.consolidations[0].dry_run);
        assert!(orchestrator.store().is_empty());
    }

    #[test]
    fn test_consolidation_after_import() {
        let dir = create_tree();
        let mut orchestrator = ImportOrchestrator::new(InMemoryStore::new());
        let options = ImportOptions {
            consolidate: true,
            ..ImportOptions::default()
        };
        let summary = orchestrator.run(dir.path(), &options).unwrap();

        let result = &summary.consolidations[0];
        assert!(result.success, "{:?}", result.errors);
        // Longest content wins for basic-function-integration
        assert_eq!(
            result.canonical_id.as_deref(),
            Some(format!("{}/individual-usecases/submit.md", op("sales", "b")).as_str())
        );
        assert_eq!(result.reparented, 1);

        let store = orchestrator.into_store();
        assert_eq!(store.len(), 2);
        let page = store.records().find(|r| r.kind == DocumentKind::Page).unwrap();
        assert_eq!(page.parent_id, result.canonical_id);
    }

    #[test]
    fn test_same_scope_duplicates_consolidate_after_import() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "services/global-shared-pages/login-v2.md", "# ページ定義：ログイン\n\n新しい画面\n");
        write(dir.path(), "services/global-shared-pages/login.md", "# ページ定義：ログイン\n\n古い画面\n");

        let mut orchestrator = ImportOrchestrator::new(InMemoryStore::new());
        let options = ImportOptions {
            consolidate: true,
            ..ImportOptions::default()
        };
        let summary = orchestrator.run(dir.path(), &options).unwrap();

        assert_eq!(summary.created, 1);
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.warnings.len(), 1);
        assert!(summary.warnings[0].contains("login.md"));

        let v2 = "services/global-shared-pages/login-v2.md";
        let ids = orchestrator.stored_ids();
        assert_eq!(ids.get("services/global-shared-pages/login.md").map(String::as_str), Some(v2));

        assert_eq!(summary.consolidations.len(), 1);
        let result = &summary.consolidations[0];
        assert!(result.success, "{:?}", result.errors);
        assert_eq!(result.canonical_id.as_deref(), Some(v2));
        assert!(result.deleted_ids.is_empty());

        let store = orchestrator.into_store();
        assert_eq!(store.len(), 1);
        let merged = store.get(v2).unwrap().content;
        assert!(merged.contains("新しい画面"));
        assert!(merged.contains("古い画面"));
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let dir = TempDir::new().unwrap();
        let mut orchestrator = ImportOrchestrator::new(InMemoryStore::new());
        assert!(orchestrator
            .run(&dir.path().join("nope"), &ImportOptions::default())
            .is_err());
    }
}
