//! Database schema model.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DbColumn {
    pub name: String,
    #[serde(rename = "type", default)]
    pub data_type: String,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    /// Flags from the constraint cell, e.g. `PK`, `FK`, `UNIQUE`
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DbIndex {
    pub name: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DbConstraintKind {
    PrimaryKey,
    ForeignKey,
    Unique,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForeignReference {
    pub table: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DbConstraint {
    pub kind: DbConstraintKind,
    pub columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<ForeignReference>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DbTable {
    /// Display name from the `#### {Name}テーブル` heading
    pub name: String,
    /// Physical table name
    #[serde(default)]
    pub table_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub columns: Vec<DbColumn>,
    #[serde(default)]
    pub indexes: Vec<DbIndex>,
    #[serde(default)]
    pub constraints: Vec<DbConstraint>,
}

impl DbTable {
    pub fn primary_key(&self) -> Option<&DbConstraint> {
        self.constraints
            .iter()
            .find(|c| c.kind == DbConstraintKind::PrimaryKey)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DbSchema {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub tables: Vec<DbTable>,
}
