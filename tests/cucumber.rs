use cucumber::{given, then, when, World};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

use parasol_core::consolidator::{self, ConsolidationResult};
use parasol_core::duplication_analyzer::{analyze, normalize_name, DuplicateGroup, MergeStrategy};
use parasol_core::import_orchestrator::ImportSummary;
use parasol_core::model::{DocumentKind, Layer, PageLayer, SpecDocument, UseCaseScope};
use parasol_core::spec_parsers::validate_api_spec_markdown;
use parasol_core::storage::{ClassifiedRecord, StorageError, UpsertOutcome};
use parasol_core::{classify, ImportOptions, ImportOrchestrator, InMemoryStore, StoragePort, ValidationResult};

/// In-memory store that can be told to fail after a number of writes
#[derive(Debug, Default)]
struct FaultyStore {
    inner: InMemoryStore,
    write_budget: Option<usize>,
}

impl FaultyStore {
    fn spend(&mut self, operation: &str) -> Result<(), StorageError> {
        match self.write_budget {
            Some(0) => Err(StorageError::Backend {
                operation: operation.to_string(),
                message: "injected failure".to_string(),
            }),
            Some(n) => {
                self.write_budget = Some(n - 1);
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl StoragePort for FaultyStore {
    fn begin(&mut self) -> Result<(), StorageError> {
        self.inner.begin()
    }

    fn upsert(&mut self, record: ClassifiedRecord) -> Result<(String, UpsertOutcome), StorageError> {
        self.spend("upsert")?;
        self.inner.upsert(record)
    }

    fn update_content(&mut self, id: &str, content: &str) -> Result<(), StorageError> {
        self.spend("update_content")?;
        self.inner.update_content(id, content)
    }

    fn reparent_children(&mut self, from: &str, to: &str) -> Result<usize, StorageError> {
        self.spend("reparent_children")?;
        self.inner.reparent_children(from, to)
    }

    fn delete(&mut self, id: &str) -> Result<(), StorageError> {
        self.spend("delete")?;
        self.inner.delete(id)
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        self.inner.commit()
    }

    fn rollback(&mut self) -> Result<(), StorageError> {
        self.inner.rollback()
    }

    fn get(&self, id: &str) -> Option<ClassifiedRecord> {
        self.inner.get(id)
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}

#[derive(Debug, Default, World)]
pub struct TestWorld {
    temp_dir: Option<TempDir>,
    documents: Vec<SpecDocument>,
    groups: Vec<DuplicateGroup>,
    layer: Option<Layer>,
    api_text: String,
    validation: Option<ValidationResult>,
    store: FaultyStore,
    original_content: Vec<(String, String)>,
    consolidations: Vec<ConsolidationResult>,
    group_missing: bool,
    orchestrator: Option<ImportOrchestrator<InMemoryStore>>,
    summary: Option<ImportSummary>,
}

fn table_rows(step: &cucumber::gherkin::Step) -> Vec<Vec<String>> {
    step.table
        .as_ref()
        .map(|t| t.rows.iter().skip(1).cloned().collect())
        .unwrap_or_default()
}

fn find_group<'a>(world: &'a TestWorld, name: &str) -> &'a DuplicateGroup {
    let key = normalize_name(name);
    world
        .groups
        .iter()
        .find(|g| g.normalized_key == key)
        .unwrap_or_else(|| panic!("No group named '{}'", key))
}

// ============== Duplicate Detection Steps ==============

fn push_use_case(world: &mut TestWorld, service: &str, operation: &str, name: &str) {
    let index = world.documents.len();
    world.documents.push(SpecDocument {
        path: format!(
            "services/{}/capabilities/c/operations/{}/individual-usecases/{}.md",
            service, operation, index
        ),
        raw_content: format!("# ユースケース：{}\n", name),
        kind: DocumentKind::UseCase,
        layer: Layer::UseCase(UseCaseScope::Individual),
        display_name: name.to_string(),
        service_id: service.to_string(),
        capability_id: Some("c".to_string()),
        operation_id: Some(operation.to_string()),
        use_case_id: Some(index.to_string()),
        associated_pages: vec![],
    });
}

#[given("the following use cases:")]
fn given_use_cases(world: &mut TestWorld, step: &cucumber::gherkin::Step) {
    for row in table_rows(step) {
        push_use_case(world, &row[0], &row[1], &row[2]);
    }
}

/// Quoted so that surrounding whitespace in the name survives Gherkin's cell trimming
#[given(expr = "the use case {string} in service {string} operation {string}")]
fn given_quoted_use_case(world: &mut TestWorld, name: String, service: String, operation: String) {
    push_use_case(world, &service, &operation, &name);
}

#[when("the documents are analyzed")]
fn analyze_documents(world: &mut TestWorld) {
    world.groups = analyze(&world.documents);
}

#[then(regex = r"^there (?:is|are) (\d+) duplicate groups?$")]
fn group_count(world: &mut TestWorld, expected: usize) {
    assert_eq!(world.groups.len(), expected);
}

#[then(expr = "the group {string} has {int} members across {int} services")]
fn group_members(world: &mut TestWorld, name: String, members: usize, services: usize) {
    let group = find_group(world, &name);
    assert_eq!(group.duplicate_count, members);
    assert_eq!(group.members.len(), members);
    assert_eq!(group.services.len(), services);
}

#[then(expr = "the group {string} has impact {string} and strategy {string}")]
fn group_impact(world: &mut TestWorld, name: String, impact: String, strategy: String) {
    let group = find_group(world, &name);
    assert_eq!(group.impact_level.as_str(), impact);
    assert_eq!(group.merge_strategy.as_str(), strategy);
}

// ============== Classification Steps ==============

#[when(expr = "I classify {string} with content {string}")]
fn classify_document(world: &mut TestWorld, path: String, content: String) {
    world.layer = Some(classify(&path, &content));
}

#[then(expr = "the layer is {string}")]
fn layer_is(world: &mut TestWorld, expected: String) {
    let layer = world.layer.expect("No classification");
    assert_eq!(layer.as_str(), expected);
}

// ============== Validation Steps ==============

#[given("an API spec document:")]
fn api_spec_document(world: &mut TestWorld, step: &cucumber::gherkin::Step) {
    world.api_text = step.docstring.clone().expect("No docstring");
}

#[when("the API spec is validated")]
fn validate_api_spec(world: &mut TestWorld) {
    world.validation = Some(validate_api_spec_markdown(&world.api_text));
}

#[then(expr = "the document is invalid with an error mentioning {string}")]
fn document_invalid(world: &mut TestWorld, fragment: String) {
    let result = world.validation.as_ref().expect("No validation result");
    assert!(!result.valid);
    assert!(
        result.errors.iter().any(|e| e.contains(&fragment)),
        "errors: {:?}",
        result.errors
    );
}

#[then("the document is valid")]
fn document_valid(world: &mut TestWorld) {
    let result = world.validation.as_ref().expect("No validation result");
    assert!(result.valid, "errors: {:?}", result.errors);
}

// ============== Consolidation Steps ==============

#[given("the following pages:")]
fn given_pages(world: &mut TestWorld, step: &cucumber::gherkin::Step) {
    for row in table_rows(step) {
        let (path, name) = (&row[0], &row[1]);
        let length: usize = row[2].parse().expect("Invalid length");
        world.documents.push(SpecDocument {
            path: path.clone(),
            raw_content: format!("# ページ定義：{}\n\n{}\n", name, "あ".repeat(length)),
            kind: DocumentKind::Page,
            layer: Layer::Page(PageLayer::Operation),
            display_name: name.clone(),
            service_id: "pm".to_string(),
            capability_id: Some("c".to_string()),
            operation_id: Some(path.trim_end_matches(".md").to_string()),
            use_case_id: None,
            associated_pages: vec![],
        });
    }
    world.groups = analyze(&world.documents);
}

#[given("the pages are stored")]
fn pages_are_stored(world: &mut TestWorld) {
    let store = &mut world.store.inner;
    store.begin().expect("begin");
    for doc in &world.documents {
        store
            .upsert(ClassifiedRecord::from_document(doc, None))
            .expect("upsert");
        world
            .original_content
            .push((doc.path.clone(), doc.raw_content.clone()));
    }
    store.commit().expect("commit");
}

#[given(regex = r"^the store fails after (\d+) writes?$")]
fn store_fails_after(world: &mut TestWorld, writes: usize) {
    world.store.write_budget = Some(writes);
}

fn run_consolidation(world: &mut TestWorld, name: &str, strategy: &str, dry_run: bool) {
    let strategy = MergeStrategy::from_name(strategy).expect("Unknown strategy");
    let key = normalize_name(name);
    let Some(group) = world.groups.iter().find(|g| g.normalized_key == key) else {
        world.group_missing = true;
        return;
    };
    let result = consolidator::consolidate(group, strategy, dry_run, &mut world.store);
    world.consolidations.push(result);
}

#[when(expr = "the group {string} is consolidated with strategy {string}")]
fn consolidate_group(world: &mut TestWorld, name: String, strategy: String) {
    run_consolidation(world, &name, &strategy, false);
}

#[when(regex = r#"^the group "(.+)" is previewed with strategy "(.+?)"(?: again)?$"#)]
fn preview_group(world: &mut TestWorld, name: String, strategy: String) {
    run_consolidation(world, &name, &strategy, true);
}

fn last_consolidation(world: &TestWorld) -> &ConsolidationResult {
    world.consolidations.last().expect("No consolidation result")
}

#[then("the consolidation succeeds")]
fn consolidation_succeeds(world: &mut TestWorld) {
    let result = last_consolidation(world);
    assert!(result.success, "errors: {:?}", result.errors);
}

#[then("the consolidation fails")]
fn consolidation_fails(world: &mut TestWorld) {
    let result = last_consolidation(world);
    assert!(!result.success);
    assert!(!result.errors.is_empty());
    assert_eq!(result.applied_changes.deleted, 0);
}

#[then(expr = "the canonical member is {string}")]
fn canonical_member(world: &mut TestWorld, path: String) {
    assert_eq!(last_consolidation(world).canonical_id.as_deref(), Some(path.as_str()));
}

#[then(expr = "the merged content has a section from {string}")]
fn merged_section(world: &mut TestWorld, name: String) {
    let heading = format!("## 統合されたセクション (from {})", name);
    assert!(last_consolidation(world).merged_content.contains(&heading));
}

#[then(regex = r"^the store holds (\d+) records?$")]
fn store_holds(world: &mut TestWorld, expected: usize) {
    assert_eq!(world.store.len(), expected);
    assert!(!world.store.inner.in_transaction());
}

#[then("both previews are identical")]
fn previews_identical(world: &mut TestWorld) {
    assert_eq!(world.consolidations.len(), 2);
    assert!(world.consolidations.iter().all(|r| r.dry_run && r.success));
    assert_eq!(world.consolidations[0], world.consolidations[1]);
}

#[then(expr = "record {string} keeps its original content")]
fn record_unchanged(world: &mut TestWorld, id: String) {
    let (_, original) = world
        .original_content
        .iter()
        .find(|(path, _)| *path == id)
        .expect("Unknown record");
    let stored = world.store.get(&id).expect("Record missing");
    assert_eq!(&stored.content, original);
}

#[then("no group was found")]
fn no_group_found(world: &mut TestWorld) {
    assert!(world.group_missing);
    assert!(world.consolidations.is_empty());
}

// ============== Import Steps ==============

#[given("a services tree with documents:")]
fn services_tree(world: &mut TestWorld, step: &cucumber::gherkin::Step) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    for row in table_rows(step) {
        let path = dir.path().join(&row[0]);
        fs::create_dir_all(path.parent().expect("No parent")).expect("Failed to create dir");
        fs::write(&path, format!("# {}\n\n本文\n", row[1])).expect("Failed to write file");
    }
    world.temp_dir = Some(dir);
}

#[given(expr = "the document {string} titled {string} is added")]
fn document_added(world: &mut TestWorld, relative: String, title: String) {
    let path = temp_root(world).join(relative);
    fs::create_dir_all(path.parent().expect("No parent")).expect("Failed to create dir");
    fs::write(&path, format!("# {}\n\n別の本文\n", title)).expect("Failed to write file");
}

fn temp_root(world: &TestWorld) -> PathBuf {
    world.temp_dir.as_ref().expect("No temp dir").path().to_path_buf()
}

fn import(world: &mut TestWorld, options: ImportOptions) {
    let root = temp_root(world);
    let orchestrator = world
        .orchestrator
        .get_or_insert_with(|| ImportOrchestrator::new(InMemoryStore::new()));
    world.summary = Some(orchestrator.run(&root, &options).expect("Import failed"));
}

#[when("the tree is imported")]
fn tree_imported(world: &mut TestWorld) {
    import(world, ImportOptions::default());
}

#[when("the tree is imported as a dry run with consolidation")]
fn tree_imported_dry_run(world: &mut TestWorld) {
    import(
        world,
        ImportOptions {
            dry_run: true,
            consolidate: true,
            similarity: None,
        },
    );
}

#[when("the tree is imported with consolidation")]
fn tree_imported_with_consolidation(world: &mut TestWorld) {
    import(
        world,
        ImportOptions {
            consolidate: true,
            ..ImportOptions::default()
        },
    );
}

fn summary(world: &TestWorld) -> &ImportSummary {
    world.summary.as_ref().expect("No import summary")
}

#[then(expr = "{int} documents are scanned")]
fn documents_scanned(world: &mut TestWorld, expected: usize) {
    assert_eq!(summary(world).scanned, expected);
}

#[then(expr = "{int} records are created and {int} updated")]
fn records_created(world: &mut TestWorld, created: usize, updated: usize) {
    let summary = summary(world);
    assert_eq!((summary.created, summary.updated), (created, updated));
    assert!(summary.errors.is_empty(), "errors: {:?}", summary.errors);
}

#[then(expr = "the import found {int} use-case duplicate group")]
fn import_groups(world: &mut TestWorld, expected: usize) {
    assert_eq!(summary(world).duplication.usecase_duplications.total, expected);
}

#[then(expr = "{int} consolidation is previewed")]
fn consolidation_previewed(world: &mut TestWorld, expected: usize) {
    let summary = summary(world);
    assert_eq!(summary.consolidations.len(), expected);
    assert!(summary.consolidations.iter().all(|c| c.dry_run));
}

#[then(expr = "{int} consolidations succeed")]
fn consolidations_succeed(world: &mut TestWorld, expected: usize) {
    let summary = summary(world);
    assert_eq!(summary.consolidations.len(), expected);
    for result in &summary.consolidations {
        assert!(result.success, "errors: {:?}", result.errors);
    }
}

#[then(regex = r"^(\d+) natural key collisions? (?:is|are) reported$")]
fn collisions_reported(world: &mut TestWorld, expected: usize) {
    assert_eq!(summary(world).warnings.len(), expected);
}

#[then(regex = r"^the import store holds (\d+) records?$")]
fn import_store_holds(world: &mut TestWorld, expected: usize) {
    let orchestrator = world.orchestrator.as_ref().expect("No orchestrator");
    assert_eq!(orchestrator.store().len(), expected);
}

#[then("the import store is empty")]
fn import_store_empty(world: &mut TestWorld) {
    let orchestrator = world.orchestrator.as_ref().expect("No orchestrator");
    assert!(orchestrator.store().is_empty());
}

#[tokio::main]
async fn main() {
    TestWorld::run("tests/features").await;
}
