//! Consolidation of duplicate groups into one canonical unit.
//!
//! A plan is computed without side effects: canonical selection, merged text
//! and change counts. A dry run returns the plan as is. A real run applies it
//! through a [`StoragePort`] as one transaction (update canonical, reparent
//! children, delete merged members) and rolls back on the first failure.
//!
//! Members are written through the id of the record they were stored under.
//! Two paths stored as one record (same natural key) are folded into the
//! canonical record instead of being deleted.

use crate::duplication_analyzer::{DuplicateGroup, MergeStrategy};
use crate::model::SpecDocument;
use crate::storage::{StorageError, StoragePort};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const MERGED_SECTION_HEADING: &str = "統合されたセクション";

/// Document path -> id of the record it was stored under.
///
/// Paths missing from the map are their own record id.
pub type StoredIds = BTreeMap<String, String>;

pub fn stored_id(ids: &StoredIds, path: &str) -> String {
    ids.get(path).cloned().unwrap_or_else(|| path.to_string())
}

#[derive(Debug, Error)]
pub enum ConsolidationError {
    #[error("Group '{key}' has no resolvable members")]
    NoResolvableMembers { key: String },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AppliedChanges {
    pub merged: usize,
    pub updated: usize,
    pub created: usize,
    pub deleted: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsolidationResult {
    pub success: bool,
    pub dry_run: bool,
    pub normalized_key: String,
    pub strategy: MergeStrategy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canonical_id: Option<String>,
    pub merged_ids: Vec<String>,
    pub deleted_ids: Vec<String>,
    pub applied_changes: AppliedChanges,
    /// Child records moved onto the canonical unit (real runs only)
    pub reparented: usize,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub merged_content: String,
    pub errors: Vec<String>,
}

/// Side-effect free outcome of canonical selection and merging
#[derive(Debug, Clone, PartialEq)]
pub struct ConsolidationPlan {
    pub normalized_key: String,
    pub strategy: MergeStrategy,
    pub canonical: SpecDocument,
    pub merged: Vec<SpecDocument>,
    pub merged_content: String,
    /// Record receiving the merged content
    pub canonical_id: String,
    /// Distinct records removed, excluding the canonical record
    pub delete_ids: Vec<String>,
}

impl ConsolidationPlan {
    pub fn applied_changes(&self) -> AppliedChanges {
        AppliedChanges {
            merged: self.merged.len(),
            updated: 1,
            created: 0,
            deleted: self.delete_ids.len(),
        }
    }

    fn merged_ids(&self) -> Vec<String> {
        self.merged.iter().map(|m| m.path.clone()).collect()
    }

    fn into_result(self, dry_run: bool) -> ConsolidationResult {
        ConsolidationResult {
            success: true,
            dry_run,
            applied_changes: self.applied_changes(),
            merged_ids: self.merged_ids(),
            deleted_ids: self.delete_ids,
            canonical_id: Some(self.canonical_id),
            normalized_key: self.normalized_key,
            strategy: self.strategy,
            reparented: 0,
            merged_content: self.merged_content,
            errors: Vec::new(),
        }
    }
}

/// Index of the canonical member for a strategy; ties keep the earliest member
pub fn select_canonical(members: &[SpecDocument], strategy: MergeStrategy) -> Option<usize> {
    if members.is_empty() {
        return None;
    }

    let score = |doc: &SpecDocument| -> usize {
        match strategy {
            MergeStrategy::BasicFunctionIntegration
            | MergeStrategy::WorkflowTemplate
            | MergeStrategy::Merge => doc.content_length(),
            MergeStrategy::ParameterizedSharing => doc.associated_pages.len(),
            _ => 0,
        }
    };

    let mut best = 0;
    for (idx, member) in members.iter().enumerate().skip(1) {
        if score(member) > score(&members[best]) {
            best = idx;
        }
    }
    Some(best)
}

/// Canonical body followed by one provenance-labelled section per merged member
pub fn merge_content(canonical: &SpecDocument, merged: &[SpecDocument]) -> String {
    let mut content = canonical.raw_content.trim_end().to_string();
    for member in merged {
        content.push_str(&format!(
            "\n\n## {} (from {})\n\n<!-- source: {} -->\n\n",
            MERGED_SECTION_HEADING, member.display_name, member.path
        ));
        content.push_str(member.body_without_title().trim());
    }
    content.push('\n');
    content
}

pub fn plan(group: &DuplicateGroup, strategy: MergeStrategy) -> Result<ConsolidationPlan, ConsolidationError> {
    plan_stored(group, strategy, &StoredIds::new())
}

/// Same as [`plan`], with members resolved to the records they were stored under
pub fn plan_stored(
    group: &DuplicateGroup,
    strategy: MergeStrategy,
    ids: &StoredIds,
) -> Result<ConsolidationPlan, ConsolidationError> {
    let members: Vec<SpecDocument> = group
        .members
        .iter()
        .filter(|m| !m.path.trim().is_empty())
        .cloned()
        .collect();

    let canonical_idx = select_canonical(&members, strategy).ok_or_else(|| {
        ConsolidationError::NoResolvableMembers {
            key: group.normalized_key.clone(),
        }
    })?;

    let mut merged = members;
    let canonical = merged.remove(canonical_idx);
    let merged_content = merge_content(&canonical, &merged);

    let canonical_id = stored_id(ids, &canonical.path);
    let mut delete_ids: Vec<String> = Vec::new();
    for member in &merged {
        let id = stored_id(ids, &member.path);
        if id == canonical_id {
            debug!(path = %member.path, record = %id, "Folding member stored as the canonical record");
        } else if !delete_ids.contains(&id) {
            delete_ids.push(id);
        }
    }

    debug!(
        key = %group.normalized_key,
        strategy = %strategy,
        canonical = %canonical.path,
        merged = merged.len(),
        "Selected canonical member"
    );

    Ok(ConsolidationPlan {
        normalized_key: group.normalized_key.clone(),
        strategy,
        canonical,
        merged,
        merged_content,
        canonical_id,
        delete_ids,
    })
}

fn failure(group: &DuplicateGroup, strategy: MergeStrategy, dry_run: bool, error: String) -> ConsolidationResult {
    ConsolidationResult {
        success: false,
        dry_run,
        normalized_key: group.normalized_key.clone(),
        strategy,
        canonical_id: None,
        merged_ids: Vec::new(),
        deleted_ids: Vec::new(),
        applied_changes: AppliedChanges::default(),
        reparented: 0,
        merged_content: String::new(),
        errors: vec![error],
    }
}

/// Consolidate a group without touching any store
pub fn preview(group: &DuplicateGroup, strategy: MergeStrategy) -> ConsolidationResult {
    preview_stored(group, strategy, &StoredIds::new())
}

fn preview_stored(group: &DuplicateGroup, strategy: MergeStrategy, ids: &StoredIds) -> ConsolidationResult {
    match plan_stored(group, strategy, ids) {
        Ok(plan) => plan.into_result(true),
        Err(e) => failure(group, strategy, true, e.to_string()),
    }
}

fn write_plan<S: StoragePort>(plan: &ConsolidationPlan, store: &mut S) -> Result<usize, StorageError> {
    store.update_content(&plan.canonical_id, &plan.merged_content)?;
    let mut reparented = 0;
    for id in &plan.delete_ids {
        reparented += store.reparent_children(id, &plan.canonical_id)?;
        store.delete(id)?;
    }
    store.commit()?;
    Ok(reparented)
}

fn apply_plan<S: StoragePort>(plan: &ConsolidationPlan, store: &mut S) -> Result<usize, StorageError> {
    store.begin()?;

    let result = write_plan(plan, store);
    if result.is_err() {
        if let Err(rollback_err) = store.rollback() {
            warn!(error = %rollback_err, "Rollback failed");
        }
    }
    result
}

/// Consolidate a group and commit the change set atomically
pub fn apply<S: StoragePort>(group: &DuplicateGroup, strategy: MergeStrategy, store: &mut S) -> ConsolidationResult {
    apply_stored(group, strategy, store, &StoredIds::new())
}

fn apply_stored<S: StoragePort>(
    group: &DuplicateGroup,
    strategy: MergeStrategy,
    store: &mut S,
    ids: &StoredIds,
) -> ConsolidationResult {
    let plan = match plan_stored(group, strategy, ids) {
        Ok(plan) => plan,
        Err(e) => return failure(group, strategy, false, e.to_string()),
    };

    match apply_plan(&plan, store) {
        Ok(reparented) => {
            info!(
                key = %plan.normalized_key,
                canonical = %plan.canonical_id,
                deleted = plan.delete_ids.len(),
                reparented,
                "Consolidation committed"
            );
            let mut result = plan.into_result(false);
            result.reparented = reparented;
            result
        }
        Err(e) => {
            warn!(key = %plan.normalized_key, error = %e, "Consolidation rolled back");
            let mut result = failure(group, strategy, false, e.to_string());
            result.canonical_id = Some(plan.canonical_id.clone());
            result.merged_ids = plan.merged_ids();
            result
        }
    }
}

/// Dry runs never touch `store`
pub fn consolidate<S: StoragePort>(
    group: &DuplicateGroup,
    strategy: MergeStrategy,
    dry_run: bool,
    store: &mut S,
) -> ConsolidationResult {
    consolidate_stored(group, strategy, dry_run, store, &StoredIds::new())
}

/// [`consolidate`] for members persisted by an import, resolved through `ids`
pub fn consolidate_stored<S: StoragePort>(
    group: &DuplicateGroup,
    strategy: MergeStrategy,
    dry_run: bool,
    store: &mut S,
    ids: &StoredIds,
) -> ConsolidationResult {
    if dry_run {
        preview_stored(group, strategy, ids)
    } else {
        apply_stored(group, strategy, store, ids)
    }
}
