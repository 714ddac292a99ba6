//! Persistence port for classified records.
//!
//! The pipeline never talks to a database directly; it is handed a
//! [`StoragePort`]. Every write happens between `begin` and `commit`, and
//! `rollback` must restore the state seen at `begin`.

use crate::model::{DocumentKind, Layer, SpecDocument};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Record not found: {id}")]
    NotFound { id: String },
    #[error("Record '{id}' conflicts with '{existing}' for natural key {key}")]
    Conflict {
        id: String,
        existing: String,
        key: String,
    },
    #[error("No transaction in progress")]
    NoTransaction,
    #[error("A transaction is already in progress")]
    TransactionInProgress,
    #[error("Storage backend failure during {operation}: {message}")]
    Backend { operation: String, message: String },
}

/// Upsert identity of a classified unit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NaturalKey {
    pub name: String,
    pub layer_type: String,
    pub shared_scope: String,
}

impl std::fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}:{}", self.name, self.layer_type, self.shared_scope)
    }
}

/// A page or use case as persisted by the import
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassifiedRecord {
    /// Source path of the document
    pub id: String,
    pub kind: DocumentKind,
    pub name: String,
    pub layer: Layer,
    pub shared_scope: String,
    pub service_id: String,
    pub content: String,
    /// Owning use case for pages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl ClassifiedRecord {
    pub fn from_document(doc: &SpecDocument, parent_id: Option<String>) -> Self {
        Self {
            id: doc.path.clone(),
            kind: doc.kind,
            name: doc.display_name.clone(),
            layer: doc.layer,
            shared_scope: doc.shared_scope(),
            service_id: doc.service_id.clone(),
            content: doc.raw_content.clone(),
            parent_id,
        }
    }

    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey {
            name: self.name.clone(),
            layer_type: self.layer.as_str().to_string(),
            shared_scope: self.shared_scope.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// Storage collaborator used by the import orchestrator and the consolidator
pub trait StoragePort {
    fn begin(&mut self) -> Result<(), StorageError>;

    /// Insert or update by natural key, returning the stored id
    fn upsert(&mut self, record: ClassifiedRecord) -> Result<(String, UpsertOutcome), StorageError>;

    fn update_content(&mut self, id: &str, content: &str) -> Result<(), StorageError>;

    /// Move every child of `from` under `to`; returns the number moved
    fn reparent_children(&mut self, from: &str, to: &str) -> Result<usize, StorageError>;

    fn delete(&mut self, id: &str) -> Result<(), StorageError>;

    fn commit(&mut self) -> Result<(), StorageError>;

    fn rollback(&mut self) -> Result<(), StorageError>;

    fn get(&self, id: &str) -> Option<ClassifiedRecord>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct StoreState {
    records: BTreeMap<String, ClassifiedRecord>,
    keys: BTreeMap<NaturalKey, String>,
}

/// In-process store with snapshot rollback
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: StoreState,
    snapshot: Option<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> impl Iterator<Item = &ClassifiedRecord> {
        self.state.records.values()
    }

    pub fn in_transaction(&self) -> bool {
        self.snapshot.is_some()
    }

    fn require_transaction(&self) -> Result<(), StorageError> {
        if self.snapshot.is_none() {
            return Err(StorageError::NoTransaction);
        }
        Ok(())
    }
}

impl StoragePort for InMemoryStore {
    fn begin(&mut self) -> Result<(), StorageError> {
        if self.snapshot.is_some() {
            return Err(StorageError::TransactionInProgress);
        }
        self.snapshot = Some(self.state.clone());
        Ok(())
    }

    fn upsert(&mut self, record: ClassifiedRecord) -> Result<(String, UpsertOutcome), StorageError> {
        self.require_transaction()?;
        let key = record.natural_key();

        let by_key = self.state.keys.get(&key).cloned();
        let by_id = self.state.records.contains_key(&record.id);

        let target = match (by_key, by_id) {
            (Some(existing), true) if existing != record.id => {
                return Err(StorageError::Conflict {
                    id: record.id,
                    existing,
                    key: key.to_string(),
                });
            }
            (Some(existing), _) => existing,
            (None, true) => record.id.clone(),
            (None, false) => {
                let id = record.id.clone();
                self.state.keys.insert(key, id.clone());
                self.state.records.insert(id.clone(), record);
                return Ok((id, UpsertOutcome::Created));
            }
        };

        // Same unit seen again: keep the stored id, refresh everything else
        if let Some(old) = self.state.records.get(&target) {
            let old_key = old.natural_key();
            if old_key != key {
                self.state.keys.remove(&old_key);
            }
        }
        self.state.keys.insert(key, target.clone());
        self.state
            .records
            .insert(target.clone(), ClassifiedRecord { id: target.clone(), ..record });
        Ok((target, UpsertOutcome::Updated))
    }

    fn update_content(&mut self, id: &str, content: &str) -> Result<(), StorageError> {
        self.require_transaction()?;
        let record = self
            .state
            .records
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound { id: id.to_string() })?;
        record.content = content.to_string();
        Ok(())
    }

    fn reparent_children(&mut self, from: &str, to: &str) -> Result<usize, StorageError> {
        self.require_transaction()?;
        if !self.state.records.contains_key(to) {
            return Err(StorageError::NotFound { id: to.to_string() });
        }
        let mut moved = 0;
        for record in self.state.records.values_mut() {
            if record.parent_id.as_deref() == Some(from) {
                record.parent_id = Some(to.to_string());
                moved += 1;
            }
        }
        Ok(moved)
    }

    fn delete(&mut self, id: &str) -> Result<(), StorageError> {
        self.require_transaction()?;
        let record = self
            .state
            .records
            .remove(id)
            .ok_or_else(|| StorageError::NotFound { id: id.to_string() })?;
        self.state.keys.remove(&record.natural_key());
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        self.snapshot.take().ok_or(StorageError::NoTransaction)?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), StorageError> {
        let snapshot = self.snapshot.take().ok_or(StorageError::NoTransaction)?;
        self.state = snapshot;
        Ok(())
    }

    fn get(&self, id: &str) -> Option<ClassifiedRecord> {
        self.state.records.get(id).cloned()
    }

    fn len(&self) -> usize {
        self.state.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PageLayer, UseCaseScope};

    fn record(id: &str, name: &str, parent: Option<&str>) -> ClassifiedRecord {
        ClassifiedRecord {
            id: id.to_string(),
            kind: if parent.is_some() { DocumentKind::Page } else { DocumentKind::UseCase },
            name: name.to_string(),
            layer: if parent.is_some() {
                Layer::Page(PageLayer::Usecase)
            } else {
                Layer::UseCase(UseCaseScope::Individual)
            },
            shared_scope: "pm/c/op".to_string(),
            service_id: "pm".to_string(),
            content: format!("# {}", name),
            parent_id: parent.map(|p| p.to_string()),
        }
    }

    #[test]
    fn test_writes_require_transaction() {
        let mut store = InMemoryStore::new();
        assert!(matches!(
            store.upsert(record("a.md", "A", None)),
            Err(StorageError::NoTransaction)
        ));
        store.begin().unwrap();
        assert!(matches!(store.begin(), Err(StorageError::TransactionInProgress)));
    }

    #[test]
    fn test_upsert_by_natural_key() {
        let mut store = InMemoryStore::new();
        store.begin().unwrap();
        let (id, outcome) = store.upsert(record("a.md", "A", None)).unwrap();
        assert_eq!((id.as_str(), outcome), ("a.md", UpsertOutcome::Created));

        // Same natural key from another path updates the stored unit
        let mut moved = record("b.md", "A", None);
        moved.content = "updated".to_string();
        let (id, outcome) = store.upsert(moved).unwrap();
        assert_eq!((id.as_str(), outcome), ("a.md", UpsertOutcome::Updated));
        assert_eq!(store.get("a.md").unwrap().content, "updated");
        assert_eq!(store.len(), 1);
        store.commit().unwrap();
    }

    #[test]
    fn test_upsert_renamed_document_keeps_id() {
        let mut store = InMemoryStore::new();
        store.begin().unwrap();
        store.upsert(record("a.md", "A", None)).unwrap();
        let (_, outcome) = store.upsert(record("a.md", "A2", None)).unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);
        assert_eq!(store.get("a.md").unwrap().name, "A2");

        // The old key is free again
        let (id, outcome) = store.upsert(record("c.md", "A", None)).unwrap();
        assert_eq!((id.as_str(), outcome), ("c.md", UpsertOutcome::Created));
    }

    #[test]
    fn test_upsert_conflict() {
        let mut store = InMemoryStore::new();
        store.begin().unwrap();
        store.upsert(record("a.md", "A", None)).unwrap();
        store.upsert(record("b.md", "B", None)).unwrap();
        assert!(matches!(
            store.upsert(record("b.md", "A", None)),
            Err(StorageError::Conflict { .. })
        ));
    }

    #[test]
    fn test_rollback_restores_snapshot() {
        let mut store = InMemoryStore::new();
        store.begin().unwrap();
        store.upsert(record("uc1.md", "UC1", None)).unwrap();
        store.upsert(record("uc2.md", "UC2", None)).unwrap();
        store.upsert(record("p.md", "P", Some("uc2.md"))).unwrap();
        store.commit().unwrap();

        store.begin().unwrap();
        assert_eq!(store.reparent_children("uc2.md", "uc1.md").unwrap(), 1);
        store.delete("uc2.md").unwrap();
        store.update_content("uc1.md", "merged").unwrap();
        store.rollback().unwrap();

        assert_eq!(store.len(), 3);
        assert_eq!(store.get("p.md").unwrap().parent_id.as_deref(), Some("uc2.md"));
        assert_eq!(store.get("uc1.md").unwrap().content, "# UC1");
        assert!(!store.in_transaction());
    }

    #[test]
    fn test_missing_records() {
        let mut store = InMemoryStore::new();
        store.begin().unwrap();
        assert!(matches!(store.delete("x"), Err(StorageError::NotFound { .. })));
        assert!(matches!(store.update_content("x", ""), Err(StorageError::NotFound { .. })));
        assert!(matches!(store.reparent_children("a", "x"), Err(StorageError::NotFound { .. })));
        store.rollback().unwrap();
        assert!(matches!(store.commit(), Err(StorageError::NoTransaction)));
    }
}
