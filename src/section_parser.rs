//! Reusable text-extraction toolkit for semi-structured markdown.
//!
//! Locates sections by heading, pulls `**Label**: value` attributes, pipe
//! tables, bulleted and numbered lists, and fenced code blocks. Nothing here
//! knows what a domain model or a use case is; the specialized parsers compose
//! these routines. Missing sections yield `None` or an empty collection and
//! never panic, so one malformed section cannot abort a whole document.

use regex::Regex;
use std::sync::OnceLock;

/// Marker used in property tables for required columns
pub const REQUIRED_MARKER: &str = "✓";

fn heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(#{1,6})\s+(.+?)\s*#*\s*$").unwrap())
}

fn ansi_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\x1b\[[0-9;]*m").unwrap())
}

fn bullet_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*[-*+]\s+(.+)$").unwrap())
}

fn numbered_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*\d+\.\s+(.+)$").unwrap())
}

fn named_heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // 顧客（Customer）<<Entity, AggregateRoot>>
    RE.get_or_init(|| {
        Regex::new(r"^(.+?)\s*(?:[（(]\s*([^）)]+?)\s*[）)])?\s*(?:<<\s*(.*?)\s*>>|«\s*(.*?)\s*»)?\s*$").unwrap()
    })
}

/// A heading line found outside fenced code blocks
#[derive(Debug, Clone, PartialEq)]
pub struct Heading {
    pub level: usize,
    pub text: String,
    /// Zero-based line index within the scanned text
    pub line: usize,
}

/// A heading together with the lines it owns
#[derive(Debug, Clone, PartialEq)]
pub struct Subsection {
    pub heading: String,
    pub body: String,
}

/// Remove ANSI color escape sequences (`\x1b[...m`)
pub fn strip_ansi(content: &str) -> String {
    ansi_re().replace_all(content, "").into_owned()
}

/// Parse a single line as a markdown heading
pub fn parse_heading(line: &str) -> Option<(usize, String)> {
    let caps = heading_re().captures(line.trim_end())?;
    let level = caps.get(1)?.as_str().len();
    let text = caps.get(2)?.as_str().trim().to_string();
    Some((level, text))
}

/// All headings in `content`, skipping lines inside fenced code blocks
pub fn headings(content: &str) -> Vec<Heading> {
    let mut result = Vec::new();
    let mut in_fence = false;

    for (idx, line) in content.lines().enumerate() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        if let Some((level, text)) = parse_heading(line) {
            result.push(Heading { level, text, line: idx });
        }
    }

    result
}

fn compile_heading_pattern(pattern: &str) -> Regex {
    Regex::new(&format!("^(?:{})$", pattern))
        .unwrap_or_else(|_| Regex::new(&format!("^{}$", regex::escape(pattern))).unwrap())
}

/// Body of the first section whose heading text matches `heading_pattern`.
///
/// The pattern is a regex matched against the whole heading text (without the
/// `#` markers); an invalid regex is treated as a literal. The section ends at
/// the next heading of equal or higher level, or at the end of the document.
pub fn extract_section(content: &str, heading_pattern: &str) -> Option<String> {
    let pattern = compile_heading_pattern(heading_pattern);
    let all = headings(content);
    let start = all.iter().position(|h| pattern.is_match(&h.text))?;
    Some(section_body(content, &all, start))
}

/// Same as [`extract_section`] but restricted to one heading level
pub fn extract_section_at(content: &str, level: usize, heading_pattern: &str) -> Option<String> {
    let pattern = compile_heading_pattern(heading_pattern);
    let all = headings(content);
    let start = all
        .iter()
        .position(|h| h.level == level && pattern.is_match(&h.text))?;
    Some(section_body(content, &all, start))
}

fn section_body(content: &str, all: &[Heading], start: usize) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let heading = &all[start];
    let end = all[start + 1..]
        .iter()
        .find(|h| h.level <= heading.level)
        .map(|h| h.line)
        .unwrap_or(lines.len());

    lines[heading.line + 1..end].join("\n")
}

/// Split text into the sections headed at exactly `level`.
///
/// Text before the first such heading is dropped; each body runs until the
/// next heading of `level` or higher.
pub fn extract_subsections(content: &str, level: usize) -> Vec<Subsection> {
    let lines: Vec<&str> = content.lines().collect();
    let all = headings(content);
    let mut result = Vec::new();

    for (idx, heading) in all.iter().enumerate() {
        if heading.level != level {
            continue;
        }
        let end = all[idx + 1..]
            .iter()
            .find(|h| h.level <= level)
            .map(|h| h.line)
            .unwrap_or(lines.len());
        result.push(Subsection {
            heading: heading.text.clone(),
            body: lines[heading.line + 1..end].join("\n"),
        });
    }

    result
}

/// Text between the title line and the first `##` heading
pub fn extract_preamble(content: &str) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let all = headings(content);
    let start = all
        .iter()
        .find(|h| h.level == 1)
        .map(|h| h.line + 1)
        .unwrap_or(0);
    let end = all
        .iter()
        .find(|h| h.level >= 2 && h.line >= start)
        .map(|h| h.line)
        .unwrap_or(lines.len());
    if start >= end {
        return String::new();
    }
    lines[start..end].join("\n")
}

/// First `# ` title, with a `{prefix}：` or `{prefix}:` lead removed.
///
/// When no prefix matches, the whole title text is returned.
pub fn extract_title(content: &str, prefixes: &[&str]) -> Option<String> {
    let title = headings(content)
        .into_iter()
        .find(|h| h.level == 1)
        .map(|h| h.text)?;

    for prefix in prefixes {
        if let Some(rest) = title.strip_prefix(prefix) {
            let rest = rest.trim_start();
            if let Some(name) = rest.strip_prefix('：').or_else(|| rest.strip_prefix(':')) {
                return Some(name.trim().to_string());
            }
        }
    }

    Some(title)
}

/// Value of a `**Label**: value` line (full-width colon accepted).
///
/// Returns `Some("")` when the label is present with no value.
pub fn extract_labeled_value(section: &str, label: &str) -> Option<String> {
    let escaped = regex::escape(label);
    let re = Regex::new(&format!(
        r"^\s*(?:[-*]\s+)?\*\*{0}\*\*\s*[:：]\s*(.*?)\s*$|^\s*(?:[-*]\s+)?\*\*{0}\s*[:：]\*\*\s*(.*?)\s*$",
        escaped
    ))
    .ok()?;

    section.lines().find_map(|line| {
        re.captures(line).map(|caps| {
            caps.get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default()
        })
    })
}

/// First labeled value among several alternative labels
pub fn extract_labeled_value_any(section: &str, labels: &[&str]) -> Option<String> {
    labels
        .iter()
        .find_map(|label| extract_labeled_value(section, label))
}

/// Items of every `- item` / `* item` line, in document order
pub fn extract_bulleted_list(section: &str) -> Vec<String> {
    section
        .lines()
        .filter_map(|line| bullet_re().captures(line))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().trim().to_string()))
        .filter(|item| !item.is_empty())
        .collect()
}

/// Items of every `1. item` line, in document order
pub fn extract_numbered_list(section: &str) -> Vec<String> {
    section
        .lines()
        .filter_map(|line| numbered_re().captures(line))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().trim().to_string()))
        .collect()
}

/// Split a `| a | b |` line into trimmed cells
pub fn parse_table_row(line: &str) -> Option<Vec<String>> {
    let trimmed = line.trim();
    if !trimmed.starts_with('|') {
        return None;
    }
    let inner = trimmed.trim_start_matches('|');
    let inner = inner.strip_suffix('|').unwrap_or(inner);
    Some(inner.split('|').map(|c| c.trim().to_string()).collect())
}

/// Whether every cell consists solely of dashes (alignment colons allowed)
pub fn is_separator_row(cells: &[String]) -> bool {
    !cells.is_empty()
        && cells.iter().all(|c| {
            !c.is_empty() && c.contains('-') && c.chars().all(|ch| ch == '-' || ch == ':')
        })
}

/// Data rows of the first table whose first header cell equals `header`
pub fn extract_table(section: &str, header: &str) -> Vec<Vec<String>> {
    extract_table_any(section, &[header])
}

/// Data rows of the first table whose first header cell is one of `headers`.
///
/// Rows end at the first non-table line; separator rows are discarded.
pub fn extract_table_any(section: &str, headers: &[&str]) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut in_table = false;

    for line in section.lines() {
        match parse_table_row(line) {
            Some(cells) if !in_table => {
                let first = cells.first().map(|c| c.as_str()).unwrap_or("");
                if headers.iter().any(|h| *h == first) {
                    in_table = true;
                }
            }
            Some(cells) => {
                if !is_separator_row(&cells) {
                    rows.push(cells);
                }
            }
            None if in_table => break,
            None => {}
        }
    }

    rows
}

/// Whether a table cell marks a required column
pub fn is_required_marker(cell: &str) -> bool {
    let cell = cell.trim();
    cell == REQUIRED_MARKER || cell == "○" || cell == "◯" || cell.eq_ignore_ascii_case("yes")
}

/// Contents of fenced code blocks, optionally restricted to one language tag
pub fn extract_code_blocks(section: &str, language: Option<&str>) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current: Option<(String, Vec<&str>)> = None;

    for line in section.lines() {
        let trimmed = line.trim_start();
        if let Some(rest) = trimmed.strip_prefix("```") {
            match current.take() {
                Some((lang, body)) => {
                    let matches = language
                        .map(|l| lang.eq_ignore_ascii_case(l))
                        .unwrap_or(true);
                    if matches {
                        blocks.push(body.join("\n"));
                    }
                }
                None => current = Some((rest.trim().to_string(), Vec::new())),
            }
            continue;
        }
        if let Some((_, ref mut body)) = current {
            body.push(line);
        }
    }

    blocks
}

/// Split `顧客（Customer）<<Entity, Root>>` into display name, internal name and stereotypes.
///
/// Headings without a parenthesised internal name return `None` for it; a
/// trailing stereotype list is split off either way.
pub fn parse_named_heading(text: &str) -> (String, Option<String>, Vec<String>) {
    match named_heading_re().captures(text.trim()) {
        Some(caps) => {
            let display = caps.get(1).map(|m| m.as_str().trim().to_string()).unwrap_or_default();
            let internal = caps.get(2).map(|m| m.as_str().trim().to_string());
            let stereotypes = caps
                .get(3)
                .or_else(|| caps.get(4))
                .map(|m| split_list(m.as_str()))
                .unwrap_or_default();
            (display, internal, stereotypes)
        }
        None => (text.trim().to_string(), None, Vec::new()),
    }
}

/// Split a comma separated list (ASCII or Japanese separators), dropping empty items
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split([',', '、', '，'])
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
