//! Build script for parasol-core
//!
//! Reads classification and consolidation rules from YAML (Single Source of
//! Truth) and generates Rust constants at compile time.

use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

/// Path markers for every layer directory
#[derive(Debug, Deserialize)]
struct LayerPaths {
    global: String,
    operation: String,
    usecase: String,
    shared: String,
    individual: String,
    legacy_pages: String,
    legacy_usecases: String,
}

/// Ordered keyword list for one layer
#[derive(Debug, Deserialize)]
struct KeywordRule {
    layer: String,
    #[serde(default)]
    keywords: Vec<String>,
}

/// Merge strategy predicate
#[derive(Debug, Deserialize)]
struct StrategyRule {
    strategy: String,
    #[serde(default)]
    all_of: Vec<String>,
    #[serde(default)]
    any_of: Vec<String>,
}

/// Impact level thresholds
#[derive(Debug, Deserialize)]
struct ImpactThresholds {
    high_service_span: usize,
    high_member_count: usize,
    medium_service_span: usize,
    medium_member_count: usize,
}

/// Rules file structure
#[derive(Debug, Deserialize)]
struct ParasolRules {
    version: String,
    layer_paths: LayerPaths,
    page_keywords: Vec<KeywordRule>,
    usecase_keywords: Vec<KeywordRule>,
    merge_strategies: Vec<StrategyRule>,
    impact: ImpactThresholds,
}

fn rust_str_literal(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

fn keyword_table(rules: &[KeywordRule]) -> String {
    let rows: Vec<String> = rules
        .iter()
        .map(|r| format!("    (\"{}\", &{:?}),\n", rust_str_literal(&r.layer), r.keywords))
        .collect();
    format!("&[\n{}]", rows.concat())
}

fn main() {
    let rules_path = "rules/parasol-rules.yaml";

    println!("cargo:rerun-if-changed={}", rules_path);

    let yaml_content = fs::read_to_string(rules_path).unwrap_or_else(|e| {
        panic!(
            "Failed to read parasol-rules.yaml at '{}': {}. \
             Make sure the file exists at rules/parasol-rules.yaml",
            rules_path, e
        )
    });

    let rules: ParasolRules = serde_yaml::from_str(&yaml_content)
        .unwrap_or_else(|e| panic!("Failed to parse parasol-rules.yaml: {}", e));

    let mut code = String::new();
    code.push_str("// Auto-generated by build.rs from rules/parasol-rules.yaml\n");
    code.push_str("// DO NOT EDIT MANUALLY - Edit rules/parasol-rules.yaml instead\n\n");

    code.push_str(&format!(
        "/// Version of the rules file\npub const RULES_VERSION: &str = \"{}\";\n\n",
        rust_str_literal(&rules.version)
    ));

    let paths = &rules.layer_paths;
    for (name, value) in [
        ("PATH_GLOBAL_PAGES", &paths.global),
        ("PATH_SHARED_PAGES", &paths.operation),
        ("PATH_DEDICATED_PAGES", &paths.usecase),
        ("PATH_SHARED_USECASES", &paths.shared),
        ("PATH_INDIVIDUAL_USECASES", &paths.individual),
        ("PATH_LEGACY_PAGES", &paths.legacy_pages),
        ("PATH_LEGACY_USECASES", &paths.legacy_usecases),
    ] {
        code.push_str(&format!(
            "pub const {}: &str = \"{}\";\n",
            name,
            rust_str_literal(value)
        ));
    }
    code.push('\n');

    code.push_str(&format!(
        "/// Page layer keyword lists, in precedence order\npub const PAGE_LAYER_KEYWORDS: &[(&str, &[&str])] = {};\n\n",
        keyword_table(&rules.page_keywords)
    ));

    code.push_str(&format!(
        "/// Use-case scope keyword lists, in precedence order\npub const USECASE_SCOPE_KEYWORDS: &[(&str, &[&str])] = {};\n\n",
        keyword_table(&rules.usecase_keywords)
    ));

    let strategy_rows: Vec<String> = rules
        .merge_strategies
        .iter()
        .map(|r| {
            format!(
                "    (\"{}\", &{:?}, &{:?}),\n",
                rust_str_literal(&r.strategy),
                r.all_of,
                r.any_of
            )
        })
        .collect();
    code.push_str(&format!(
        "/// Merge strategy predicates (strategy, all_of, any_of), first match wins\npub const MERGE_STRATEGY_RULES: &[(&str, &[&str], &[&str])] = &[\n{}];\n\n",
        strategy_rows.concat()
    ));

    let impact = &rules.impact;
    code.push_str(&format!(
        "pub const IMPACT_HIGH_SERVICE_SPAN: usize = {};\n\
         pub const IMPACT_HIGH_MEMBER_COUNT: usize = {};\n\
         pub const IMPACT_MEDIUM_SERVICE_SPAN: usize = {};\n\
         pub const IMPACT_MEDIUM_MEMBER_COUNT: usize = {};\n",
        impact.high_service_span,
        impact.high_member_count,
        impact.medium_service_span,
        impact.medium_member_count
    ));

    let out_dir = env::var("OUT_DIR").expect("OUT_DIR not set");
    let dest_path = Path::new(&out_dir).join("parasol_rules.rs");

    fs::write(&dest_path, code)
        .unwrap_or_else(|e| panic!("Failed to write generated code to {:?}: {}", dest_path, e));
}
