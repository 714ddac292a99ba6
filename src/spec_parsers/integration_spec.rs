//! Integration specification documents.
//!
//! Provided vs consumed events and outbound vs inbound API calls use the same
//! line grammar; which list an entry lands in is decided by the sub-section
//! it is parsed from, each sub-section being extracted on its own.

use super::unquote;
use crate::model::{
    ApiCall, EventSpec, IntegrationDependency, IntegrationSpec, SagaParticipant, SagaPattern,
    SagaStep, SagaStyle,
};
use crate::section_parser::{
    extract_bulleted_list, extract_code_blocks, extract_labeled_value, extract_section_at,
    extract_subsections, extract_table_any, extract_title, parse_named_heading,
};
use crate::validation::ValidationResult;
use regex::Regex;
use std::sync::OnceLock;

const PROVIDED_EVENT_HEADINGS: &str = "発行イベント|提供イベント|Published Events";
const CONSUMED_EVENT_HEADINGS: &str = "購読イベント|受信イベント|Subscribed Events";
const OUTBOUND_HEADINGS: &str = "呼び出すAPI|外部API呼び出し|Outbound";
const INBOUND_HEADINGS: &str = "提供するAPI|公開API|Inbound";

fn event_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^`?([^`:：]+?)`?\s*(?:[:：]\s*(.*))?$").unwrap())
}

fn api_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // `GET /users/{id}`（user-service）: 説明
    // A backticked path ends at the backtick, a bare one at whitespace.
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^(?:`(GET|POST|PUT|PATCH|DELETE)\s+([^`\s]+)`|(GET|POST|PUT|PATCH|DELETE)\s+([^\s`（(：]+))\s*(?:[（(]([^）)]+)[）)])?\s*(?:(?:→|->)\s*([\w-]+))?\s*(?:[:：]\s*(.*))?$",
        )
        .unwrap()
    })
}

fn participant_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(?:participant|actor)\s+([\w-]+)(?:\s+as\s+(.+?))?\s*$").unwrap())
}

fn message_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*([\w-]+?)\s*(?:-{1,2}>{1,2}|-{1,2}[x)])\s*[+-]?\s*([\w-]+)\s*:\s*(.+?)\s*$")
            .unwrap()
    })
}

fn parse_events(section: &str) -> Vec<EventSpec> {
    let rows = extract_table_any(section, &["イベント名", "イベント"]);
    if !rows.is_empty() {
        return rows
            .into_iter()
            .filter(|cells| cells.first().is_some_and(|c| !c.is_empty()))
            .map(|cells| EventSpec {
                name: unquote(&cells[0]),
                description: cells.get(1).cloned().unwrap_or_default(),
            })
            .collect();
    }

    extract_bulleted_list(section)
        .iter()
        .filter_map(|item| event_line_re().captures(item))
        .map(|caps| EventSpec {
            name: caps[1].trim().to_string(),
            description: caps.get(2).map(|m| m.as_str().trim().to_string()).unwrap_or_default(),
        })
        .collect()
}

fn parse_calls(section: &str) -> Vec<ApiCall> {
    let rows = extract_table_any(section, &["メソッド"]);
    if !rows.is_empty() {
        return rows
            .into_iter()
            .filter(|cells| cells.len() >= 2 && !cells[0].is_empty())
            .map(|cells| ApiCall {
                method: cells[0].to_uppercase(),
                path: unquote(&cells[1]),
                counterpart: cells.get(2).map(|c| unquote(c)).filter(|c| !c.is_empty()),
                description: cells.get(3).cloned().unwrap_or_default(),
            })
            .collect();
    }

    extract_bulleted_list(section)
        .iter()
        .filter_map(|item| api_line_re().captures(item))
        .filter_map(|caps| {
            let method = caps.get(1).or_else(|| caps.get(3))?;
            let path = caps.get(2).or_else(|| caps.get(4))?;
            Some(ApiCall {
                method: method.as_str().to_uppercase(),
                path: path.as_str().to_string(),
                counterpart: caps
                    .get(5)
                    .or_else(|| caps.get(6))
                    .map(|m| m.as_str().trim().to_string()),
                description: caps.get(7).map(|m| m.as_str().trim().to_string()).unwrap_or_default(),
            })
        })
        .collect()
}

/// Best-effort reading of the sequence diagram in a 連携パターン section
fn parse_saga(section: &str) -> Option<SagaPattern> {
    let lower = section.to_lowercase();
    let style = if section.contains("オーケストレーション") || lower.contains("orchestration") {
        SagaStyle::Orchestration
    } else {
        SagaStyle::Choreography
    };

    let mut saga = SagaPattern {
        style,
        ..Default::default()
    };

    for block in extract_code_blocks(section, Some("mermaid")) {
        for line in block.lines() {
            if let Some(caps) = participant_re().captures(line) {
                let id = caps[1].to_string();
                let name = caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_else(|| id.clone());
                saga.participants.push(SagaParticipant { id, name });
            } else if let Some(caps) = message_re().captures(line) {
                saga.steps.push(SagaStep {
                    from: caps[1].to_string(),
                    to: caps[2].to_string(),
                    message: caps[3].to_string(),
                });
            }
        }
    }

    (!saga.participants.is_empty() || !saga.steps.is_empty()).then_some(saga)
}

/// Parse an integration specification document
pub fn parse_integration_spec_markdown(text: &str) -> IntegrationSpec {
    let mut spec = IntegrationSpec {
        service: extract_title(text, &["統合仕様", "連携仕様"]).unwrap_or_default(),
        ..Default::default()
    };

    if let Some(section) = extract_section_at(text, 2, "依存サービス") {
        spec.dependencies = extract_subsections(&section, 3)
            .into_iter()
            .map(|sub| {
                let (display_name, id, _) = parse_named_heading(&sub.heading);
                IntegrationDependency {
                    service: id.unwrap_or_else(|| display_name.clone()),
                    display_name,
                    purpose: extract_labeled_value(&sub.body, "目的").unwrap_or_default(),
                    mode: extract_labeled_value(&sub.body, "連携方式").unwrap_or_default(),
                }
            })
            .collect();
    }

    if let Some(section) = extract_section_at(text, 2, "ドメインイベント") {
        if let Some(provided) = extract_section_at(&section, 3, PROVIDED_EVENT_HEADINGS) {
            spec.provided_events = parse_events(&provided);
        }
        if let Some(consumed) = extract_section_at(&section, 3, CONSUMED_EVENT_HEADINGS) {
            spec.consumed_events = parse_events(&consumed);
        }
    }

    if let Some(section) = extract_section_at(text, 2, "同期API呼び出し|API連携") {
        if let Some(outbound) = extract_section_at(&section, 3, OUTBOUND_HEADINGS) {
            spec.outbound_calls = parse_calls(&outbound);
        }
        if let Some(inbound) = extract_section_at(&section, 3, INBOUND_HEADINGS) {
            spec.inbound_calls = parse_calls(&inbound);
        }
    }

    if let Some(section) = extract_section_at(text, 2, "連携パターン|Sagaパターン") {
        spec.saga = parse_saga(&section);
    }

    spec
}

fn push_events(md: &mut String, heading: &str, events: &[EventSpec]) {
    md.push_str(&format!("\n### {}\n\n", heading));
    for event in events {
        if event.description.is_empty() {
            md.push_str(&format!("- `{}`\n", event.name));
        } else {
            md.push_str(&format!("- `{}`: {}\n", event.name, event.description));
        }
    }
}

fn push_calls(md: &mut String, heading: &str, calls: &[ApiCall]) {
    md.push_str(&format!("\n### {}\n\n", heading));
    for call in calls {
        md.push_str(&format!("- `{} {}`", call.method, call.path));
        if let Some(counterpart) = &call.counterpart {
            md.push_str(&format!("（{}）", counterpart));
        }
        if !call.description.is_empty() {
            md.push_str(&format!(": {}", call.description));
        }
        md.push('\n');
    }
}

/// Render an integration specification document
pub fn integration_spec_to_markdown(spec: &IntegrationSpec) -> String {
    let mut md = format!("# 統合仕様: {}\n\n## 依存サービス\n", spec.service);
    for dep in &spec.dependencies {
        md.push_str(&format!("\n### {}（{}）\n\n", dep.display_name, dep.service));
        md.push_str(&format!("**目的**: {}\n", dep.purpose));
        md.push_str(&format!("**連携方式**: {}\n", dep.mode));
    }

    md.push_str("\n## ドメインイベント\n");
    push_events(&mut md, "発行イベント", &spec.provided_events);
    push_events(&mut md, "購読イベント", &spec.consumed_events);

    md.push_str("\n## 同期API呼び出し\n");
    push_calls(&mut md, "呼び出すAPI", &spec.outbound_calls);
    push_calls(&mut md, "提供するAPI", &spec.inbound_calls);

    if let Some(saga) = &spec.saga {
        md.push_str("\n## 連携パターン\n\n");
        md.push_str(match saga.style {
            SagaStyle::Orchestration => "オーケストレーション型のSaga\n",
            SagaStyle::Choreography => "コレオグラフィ型のSaga\n",
        });
        md.push_str("\n```mermaid\nsequenceDiagram\n");
        for p in &saga.participants {
            md.push_str(&format!("    participant {} as {}\n", p.id, p.name));
        }
        for step in &saga.steps {
            md.push_str(&format!("    {}->>{}: {}\n", step.from, step.to, step.message));
        }
        md.push_str("```\n");
    }

    md
}

/// Validate an integration specification document
pub fn validate_integration_spec_markdown(text: &str) -> ValidationResult {
    let spec = parse_integration_spec_markdown(text);
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if spec.service.is_empty() {
        errors.push("統合仕様のタイトル（# 統合仕様: {サービス名}）がありません".to_string());
    }

    let nothing_declared = spec.dependencies.is_empty()
        && spec.provided_events.is_empty()
        && spec.consumed_events.is_empty()
        && spec.outbound_calls.is_empty()
        && spec.inbound_calls.is_empty();
    if nothing_declared {
        errors.push("依存サービス・ドメインイベント・API呼び出しのいずれも定義されていません".to_string());
    }

    for dep in spec.dependencies.iter().filter(|d| d.purpose.is_empty()) {
        warnings.push(format!("依存サービス '{}' に目的が記載されていません", dep.service));
    }

    if let Some(saga) = &spec.saga {
        if !saga.participants.is_empty() {
            for step in &saga.steps {
                for id in [&step.from, &step.to] {
                    if !saga.participants.iter().any(|p| &p.id == id) {
                        warnings.push(format!("連携パターンの参加者 '{}' が宣言されていません", id));
                    }
                }
            }
        }
    }

    ValidationResult::from_findings(errors, warnings)
}
