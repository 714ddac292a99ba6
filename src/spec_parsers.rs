//! Parsers for the specialized document grammars.
//!
//! Each submodule composes [`crate::section_parser`] routines into a parse,
//! generate and validate triple for one document kind. Missing optional
//! sections yield empty collections; only structurally required markers fail
//! validation.

pub mod api_spec;
pub mod db_schema;
pub mod integration_spec;
pub mod operation;

use crate::domain_language::parse_property_type;
use crate::model::Property;
use crate::section_parser::{extract_table_any, is_required_marker, strip_ansi};
use std::path::Path;
use thiserror::Error;

pub use api_spec::{api_spec_to_markdown, parse_api_spec_markdown, validate_api_spec_markdown};
pub use db_schema::{db_schema_to_markdown, parse_db_schema_markdown, validate_db_schema_markdown};
pub use integration_spec::{
    integration_spec_to_markdown, parse_integration_spec_markdown,
    validate_integration_spec_markdown,
};
pub use operation::{
    business_operation_to_markdown, page_to_markdown, parse_business_operation_markdown,
    parse_page_markdown, parse_test_definition_markdown, parse_use_case_markdown,
    test_definition_to_markdown, use_case_to_markdown, validate_business_operation_markdown,
};

/// Error types for reading specification documents
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Cannot read file '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Read a markdown document with ANSI escapes stripped
pub fn read_markdown(path: &Path) -> Result<String, ParseError> {
    let content = std::fs::read_to_string(path).map_err(|e| ParseError::FileReadError {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(strip_ansi(&content))
}

const PROPERTY_TABLE_HEADERS: &[&str] = &["属性名", "プロパティ", "フィールド", "項目名"];

/// Properties from the first `| 属性名 | 型 | 必須 | 説明 |` style table
pub(crate) fn property_rows(section: &str) -> Vec<Property> {
    extract_table_any(section, PROPERTY_TABLE_HEADERS)
        .into_iter()
        .filter(|cells| cells.first().is_some_and(|c| !c.is_empty()))
        .map(|cells| {
            let cell = |idx: usize| cells.get(idx).cloned().unwrap_or_default();
            let (property_type, enum_values) = parse_property_type(&cell(1));
            Property {
                name: cell(0),
                property_type,
                required: is_required_marker(&cell(2)),
                description: cell(3),
                enum_values,
            }
        })
        .collect()
}

/// Strip surrounding backticks from an identifier cell or heading
pub(crate) fn unquote(text: &str) -> String {
    text.trim().trim_matches('`').trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_markdown_strips_ansi() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.md");
        std::fs::write(&path, "\x1b[31m# タイトル\x1b[0m\n").unwrap();
        assert_eq!(read_markdown(&path).unwrap(), "# タイトル\n");
    }

    #[test]
    fn test_read_markdown_missing_file() {
        let err = read_markdown(Path::new("/nonexistent/doc.md")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/doc.md"));
    }

    #[test]
    fn test_property_rows() {
        let text = "| プロパティ | 型 | 必須 | 説明 |\n|---|---|---|---|\n| id | UUID | ✓ | 識別子 |\n| state | ENUM(A, B) | | |\n";
        let props = property_rows(text);
        assert_eq!(props.len(), 2);
        assert!(props[0].required);
        assert_eq!(props[1].enum_values.as_ref().unwrap().len(), 2);
    }
}
