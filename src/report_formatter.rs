//! Markdown rendering of duplication reports and consolidation previews.
//!
//! Empty sections are omitted entirely.

use crate::consolidator::ConsolidationResult;
use crate::duplication_analyzer::{DuplicateGroup, DuplicationAnalysisResult, SimilarPair};

/// Formats a duplication report for review
pub fn format_duplication_report(result: &DuplicationAnalysisResult) -> String {
    let mut sections: Vec<String> = vec!["# Duplication Report".to_string()];

    sections.push(format!(
        "- Use-case groups: {}\n- Page groups: {}\n- Consolidation potential (pages): {}",
        result.usecase_duplications.total,
        result.page_duplications.total,
        result.page_duplications.consolidation_potential
    ));

    if let Some(s) = format_groups("Use-case Duplicates", &result.usecase_duplications.groups) {
        sections.push(s);
    }
    if let Some(s) = format_groups("Page Duplicates", &result.page_duplications.groups) {
        sections.push(s);
    }
    if let Some(s) = format_similar(&result.similar_names) {
        sections.push(s);
    }

    sections.join("\n\n")
}

fn format_groups(title: &str, groups: &[DuplicateGroup]) -> Option<String> {
    if groups.is_empty() {
        return None;
    }

    let mut lines = vec![
        format!("## {}", title),
        String::new(),
        "| Name | Count | Services | Impact | Strategy |".to_string(),
        "|------|-------|----------|--------|----------|".to_string(),
    ];
    for g in groups {
        lines.push(format!(
            "| {} | {} | {} | {} | {} |",
            g.normalized_key,
            g.duplicate_count,
            g.services.join(", "),
            g.impact_level.as_str(),
            g.merge_strategy
        ));
    }

    for g in groups {
        lines.push(String::new());
        lines.push(format!("### {}", g.normalized_key));
        lines.push(String::new());
        for m in &g.members {
            lines.push(format!("- `{}` ({})", m.path, m.layer));
        }
    }

    Some(lines.join("\n"))
}

fn format_similar(pairs: &[SimilarPair]) -> Option<String> {
    if pairs.is_empty() {
        return None;
    }
    let mut lines = vec!["## Similar Names".to_string(), String::new()];
    for p in pairs {
        lines.push(format!(
            "- {} ↔ {} ({:.2}, {})",
            p.left,
            p.right,
            p.score,
            p.kind.as_str()
        ));
    }
    Some(lines.join("\n"))
}

/// Formats one consolidation result as a preview
pub fn format_consolidation(result: &ConsolidationResult) -> String {
    let mut lines = vec![
        format!("# Consolidation: {}", result.normalized_key),
        String::new(),
        format!("- Strategy: {}", result.strategy),
        format!("- Dry run: {}", if result.dry_run { "yes" } else { "no" }),
        format!("- Success: {}", if result.success { "yes" } else { "no" }),
    ];
    if let Some(canonical) = &result.canonical_id {
        lines.push(format!("- Canonical: `{}`", canonical));
    }
    for id in &result.merged_ids {
        lines.push(format!("- Merged: `{}`", id));
    }
    let c = &result.applied_changes;
    lines.push(format!(
        "- Changes: merged {}, updated {}, created {}, deleted {}",
        c.merged, c.updated, c.created, c.deleted
    ));
    for e in &result.errors {
        lines.push(format!("- Error: {}", e));
    }
    lines.join("\n")
}
