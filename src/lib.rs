pub mod model;
pub mod rules;
pub mod section_parser;
pub mod validation;
pub mod domain_language;
pub mod spec_parsers;
pub mod layer_classifier;
pub mod duplication_analyzer;
pub mod storage;
pub mod consolidator;
pub mod doc_scanner;
pub mod import_orchestrator;
pub mod report_formatter;

/// Directories never descended into while scanning
pub const EXCLUDED_DIRS: &[&str] = &[".git", "node_modules", "target", "tests", ".parasol"];

pub use doc_scanner::DocScanner;
pub use duplication_analyzer::DuplicationAnalyzer;
pub use import_orchestrator::{ImportOptions, ImportOrchestrator};
pub use layer_classifier::classify;
pub use storage::{InMemoryStore, StoragePort};
pub use validation::ValidationResult;
