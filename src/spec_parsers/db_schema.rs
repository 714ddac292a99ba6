//! Database schema documents.
//!
//! Tables are located by `#### {Name}テーブル` headings. Columns come from a
//! pipe table with a fixed column order (name, type, nullable, default,
//! constraint flags, description); indexes and constraints are read from
//! fenced `sql` blocks by keyword matching.

use super::unquote;
use crate::model::{
    DbColumn, DbConstraint, DbConstraintKind, DbIndex, DbSchema, DbTable, ForeignReference,
};
use crate::section_parser::{
    extract_code_blocks, extract_labeled_value, extract_subsections, extract_table_any,
    extract_title, split_list, Subsection,
};
use crate::validation::ValidationResult;
use regex::Regex;
use std::sync::OnceLock;

const TABLE_SUFFIX: &str = "テーブル";
const COLUMN_TABLE_HEADERS: &[&str] = &["カラム名", "カラム", "列名"];

struct SqlPatterns {
    primary_key: Regex,
    unique_index: Regex,
    index: Regex,
    foreign_key: Regex,
    unique: Regex,
}

fn sql_patterns() -> &'static SqlPatterns {
    static PATTERNS: OnceLock<SqlPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| SqlPatterns {
        primary_key: Regex::new(r"(?i)PRIMARY\s+KEY\s*\(([^)]*)\)").unwrap(),
        unique_index: Regex::new(
            r#"(?i)(?:CREATE\s+)?UNIQUE\s+INDEX\s+(?:IF\s+NOT\s+EXISTS\s+)?["`]?([\w.]+)["`]?\s+ON\s+["`]?[\w.]+["`]?\s*\(([^)]*)\)"#,
        )
        .unwrap(),
        index: Regex::new(
            r#"(?i)CREATE\s+INDEX\s+(?:IF\s+NOT\s+EXISTS\s+)?["`]?([\w.]+)["`]?\s+ON\s+["`]?[\w.]+["`]?\s*\(([^)]*)\)"#,
        )
        .unwrap(),
        foreign_key: Regex::new(
            r#"(?i)FOREIGN\s+KEY\s*\(([^)]*)\)\s*REFERENCES\s+["`]?([\w.]+)["`]?\s*\(([^)]*)\)"#,
        )
        .unwrap(),
        unique: Regex::new(r"(?i)\bUNIQUE\s*\(([^)]*)\)").unwrap(),
    })
}

fn column_list(text: &str) -> Vec<String> {
    split_list(text)
        .into_iter()
        .map(|c| c.trim_matches(|ch| ch == '"' || ch == '`').to_string())
        .collect()
}

fn is_nullable(cell: &str) -> bool {
    matches!(
        cell.trim().to_uppercase().as_str(),
        "YES" | "NULL" | "○" | "◯" | "✓" | "TRUE" | "可"
    )
}

fn default_value(cell: &str) -> Option<String> {
    let cell = cell.trim();
    (!cell.is_empty() && cell != "-" && cell != "－").then(|| cell.to_string())
}

fn parse_sql(block: &str, table: &mut DbTable) {
    let patterns = sql_patterns();

    for caps in patterns.primary_key.captures_iter(block) {
        table.constraints.push(DbConstraint {
            kind: DbConstraintKind::PrimaryKey,
            columns: column_list(&caps[1]),
            references: None,
        });
    }
    for caps in patterns.unique_index.captures_iter(block) {
        table.indexes.push(DbIndex {
            name: caps[1].to_string(),
            columns: column_list(&caps[2]),
            unique: true,
        });
    }
    for caps in patterns.index.captures_iter(block) {
        table.indexes.push(DbIndex {
            name: caps[1].to_string(),
            columns: column_list(&caps[2]),
            unique: false,
        });
    }
    for caps in patterns.foreign_key.captures_iter(block) {
        table.constraints.push(DbConstraint {
            kind: DbConstraintKind::ForeignKey,
            columns: column_list(&caps[1]),
            references: Some(ForeignReference {
                table: caps[2].to_string(),
                columns: column_list(&caps[3]),
            }),
        });
    }
    for caps in patterns.unique.captures_iter(block) {
        table.constraints.push(DbConstraint {
            kind: DbConstraintKind::Unique,
            columns: column_list(&caps[1]),
            references: None,
        });
    }
}

fn parse_table(sub: &Subsection) -> DbTable {
    let name = unquote(sub.heading.trim_end_matches(TABLE_SUFFIX));
    let mut table = DbTable {
        table_name: extract_labeled_value(&sub.body, "テーブル名")
            .map(|v| unquote(&v))
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| name.clone()),
        description: extract_labeled_value(&sub.body, "説明").unwrap_or_default(),
        name,
        ..Default::default()
    };

    table.columns = extract_table_any(&sub.body, COLUMN_TABLE_HEADERS)
        .into_iter()
        .filter(|cells| cells.first().is_some_and(|c| !c.is_empty()))
        .map(|cells| {
            let cell = |idx: usize| cells.get(idx).cloned().unwrap_or_default();
            DbColumn {
                name: unquote(&cell(0)),
                data_type: cell(1),
                nullable: is_nullable(&cell(2)),
                default_value: default_value(&cell(3)),
                constraints: split_list(&cell(4)),
                description: cell(5),
            }
        })
        .collect();

    for block in extract_code_blocks(&sub.body, Some("sql")) {
        parse_sql(&block, &mut table);
    }

    // Without an explicit PRIMARY KEY clause, fall back to the PK column flags
    if table.primary_key().is_none() {
        let flagged: Vec<String> = table
            .columns
            .iter()
            .filter(|c| c.constraints.iter().any(|f| f.eq_ignore_ascii_case("PK")))
            .map(|c| c.name.clone())
            .collect();
        if !flagged.is_empty() {
            table.constraints.insert(
                0,
                DbConstraint {
                    kind: DbConstraintKind::PrimaryKey,
                    columns: flagged,
                    references: None,
                },
            );
        }
    }

    table
}

fn table_sections(text: &str) -> Vec<Subsection> {
    let at_four: Vec<Subsection> = extract_subsections(text, 4)
        .into_iter()
        .filter(|s| s.heading.ends_with(TABLE_SUFFIX))
        .collect();
    if !at_four.is_empty() {
        return at_four;
    }
    extract_subsections(text, 3)
        .into_iter()
        .filter(|s| s.heading.ends_with(TABLE_SUFFIX))
        .collect()
}

/// Parse a database schema document
pub fn parse_db_schema_markdown(text: &str) -> DbSchema {
    DbSchema {
        title: extract_title(text, &["データベース設計", "データベーススキーマ", "DB設計"])
            .unwrap_or_default(),
        tables: table_sections(text).iter().map(parse_table).collect(),
    }
}

/// Render a database schema document
pub fn db_schema_to_markdown(schema: &DbSchema) -> String {
    let mut md = format!("# データベース設計: {}\n\n## テーブル定義\n", schema.title);

    for table in &schema.tables {
        md.push_str(&format!("\n#### {}{}\n\n", table.name, TABLE_SUFFIX));
        md.push_str(&format!("**テーブル名**: {}\n", table.table_name));
        if !table.description.is_empty() {
            md.push_str(&format!("**説明**: {}\n", table.description));
        }

        md.push_str("\n| カラム名 | データ型 | NULL | デフォルト | 制約 | 説明 |\n");
        md.push_str("|----------|----------|------|------------|------|------|\n");
        for c in &table.columns {
            md.push_str(&format!(
                "| {} | {} | {} | {} | {} | {} |\n",
                c.name,
                c.data_type,
                if c.nullable { "YES" } else { "NO" },
                c.default_value.as_deref().unwrap_or("-"),
                c.constraints.join(", "),
                c.description
            ));
        }

        if table.indexes.is_empty() && table.constraints.is_empty() {
            continue;
        }
        md.push_str("\n```sql\n");
        for constraint in &table.constraints {
            let columns = constraint.columns.join(", ");
            match (constraint.kind, &constraint.references) {
                (DbConstraintKind::PrimaryKey, _) => {
                    md.push_str(&format!("PRIMARY KEY ({})\n", columns));
                }
                (DbConstraintKind::ForeignKey, Some(r)) => {
                    md.push_str(&format!(
                        "FOREIGN KEY ({}) REFERENCES {}({})\n",
                        columns,
                        r.table,
                        r.columns.join(", ")
                    ));
                }
                (DbConstraintKind::ForeignKey, None) => {}
                (DbConstraintKind::Unique, _) => {
                    md.push_str(&format!("UNIQUE ({})\n", columns));
                }
            }
        }
        for index in &table.indexes {
            md.push_str(&format!(
                "CREATE {}INDEX {} ON {} ({});\n",
                if index.unique { "UNIQUE " } else { "" },
                index.name,
                table.table_name,
                index.columns.join(", ")
            ));
        }
        md.push_str("```\n");
    }

    md
}

/// Validate a database schema document
pub fn validate_db_schema_markdown(text: &str) -> ValidationResult {
    let schema = parse_db_schema_markdown(text);
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if schema.tables.is_empty() {
        errors.push("テーブル定義（#### {名前}テーブル）が1つもありません".to_string());
    }

    let known: Vec<&str> = schema.tables.iter().map(|t| t.table_name.as_str()).collect();
    for table in &schema.tables {
        if table.columns.is_empty() {
            errors.push(format!("テーブル '{}' にカラムが定義されていません", table.name));
        }
        for column in table.columns.iter().filter(|c| c.data_type.is_empty()) {
            warnings.push(format!(
                "テーブル '{}' のカラム '{}' にデータ型がありません",
                table.name, column.name
            ));
        }
        for constraint in &table.constraints {
            if let Some(reference) = &constraint.references {
                if !known.contains(&reference.table.as_str()) {
                    warnings.push(format!(
                        "テーブル '{}' の外部キーが未定義のテーブル '{}' を参照しています",
                        table.name, reference.table
                    ));
                }
            }
        }
    }

    ValidationResult::from_findings(errors, warnings)
}
