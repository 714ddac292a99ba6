//! Domain-language markdown ⇄ [`DomainLanguage`] conversion.
//!
//! Generation emits a fixed section order. Parsing is a tolerant line scan
//! driven by `ParseState`, an explicit state machine whose transitions are
//! looked up in small tables: `##` heading → section, first table header cell
//! → table kind, `**Label**:` → list kind. Hand-written documents with messy
//! spacing still parse; unrecognised sections are logged and skipped.

use crate::model::{
    Aggregate, BusinessRule, DomainEvent, DomainLanguage, DomainService, Entity, Method, Property,
    ValueObject,
};
use crate::section_parser::{
    is_required_marker, is_separator_row, parse_heading, parse_named_heading, parse_table_row,
    split_list, REQUIRED_MARKER,
};
use crate::validation::ValidationResult;
use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, warn};

pub const TITLE_PREFIX: &str = "ドメイン言語定義";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SectionKind {
    Entities,
    ValueObjects,
    Aggregates,
    DomainServices,
    DomainEvents,
    BusinessRules,
}

const SECTION_HEADINGS: &[(&str, SectionKind)] = &[
    ("エンティティ", SectionKind::Entities),
    ("値オブジェクト", SectionKind::ValueObjects),
    ("集約", SectionKind::Aggregates),
    ("ドメインサービス", SectionKind::DomainServices),
    ("ドメインイベント", SectionKind::DomainEvents),
    ("ビジネスルール", SectionKind::BusinessRules),
    ("entities", SectionKind::Entities),
    ("value objects", SectionKind::ValueObjects),
    ("aggregates", SectionKind::Aggregates),
    ("domain services", SectionKind::DomainServices),
    ("domain events", SectionKind::DomainEvents),
    ("business rules", SectionKind::BusinessRules),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TableKind {
    Properties,
    Methods,
    Payload,
}

const TABLE_HEADERS: &[(&str, TableKind)] = &[
    ("属性名", TableKind::Properties),
    ("プロパティ", TableKind::Properties),
    ("メソッド", TableKind::Methods),
    ("ペイロード項目", TableKind::Payload),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListKind {
    BusinessRules,
    DomainEvents,
    Constraints,
    Invariants,
}

const LIST_LABELS: &[(&str, ListKind)] = &[
    ("ビジネスルール", ListKind::BusinessRules),
    ("ドメインイベント", ListKind::DomainEvents),
    ("制約", ListKind::Constraints),
    ("不変条件", ListKind::Invariants),
];

const VERSION_LABELS: &[&str] = &["バージョン", "Version"];

fn section_for(heading: &str) -> Section {
    let normalized = heading.trim().to_lowercase();
    SECTION_HEADINGS
        .iter()
        .find(|(name, _)| *name == normalized)
        .map(|(_, kind)| Section::Known(*kind))
        .unwrap_or_else(|| Section::Unknown(heading.trim().to_string()))
}

fn table_for(first_cell: &str) -> Option<TableKind> {
    TABLE_HEADERS
        .iter()
        .find(|(header, _)| *header == first_cell)
        .map(|(_, kind)| *kind)
}

fn list_for(label: &str) -> Option<ListKind> {
    LIST_LABELS
        .iter()
        .find(|(name, _)| *name == label)
        .map(|(_, kind)| *kind)
}

fn label_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(?:[-*]\s+)?\*\*(.+?)\*\*\s*[:：]\s*(.*?)\s*$|^\s*(?:[-*]\s+)?\*\*(.+?)[:：]\*\*\s*(.*?)\s*$")
            .unwrap()
    })
}

fn bullet_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*[-*+]\s+(.+?)\s*$").unwrap())
}

fn enum_type_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^ENUM\s*\((.*)\)$").unwrap())
}

fn parse_label(line: &str) -> Option<(String, String)> {
    let caps = label_re().captures(line)?;
    let label = caps.get(1).or_else(|| caps.get(3))?.as_str().trim().to_string();
    let value = caps
        .get(2)
        .or_else(|| caps.get(4))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();
    Some((label, value))
}

/// Split `ENUM(a, b)` into `("ENUM", Some([a, b]))`; other types pass through
pub fn parse_property_type(cell: &str) -> (String, Option<Vec<String>>) {
    match enum_type_re().captures(cell.trim()) {
        Some(caps) => {
            let values = caps.get(1).map(|m| split_list(m.as_str())).unwrap_or_default();
            ("ENUM".to_string(), Some(values))
        }
        None => (cell.trim().to_string(), None),
    }
}

fn render_property_type(property: &Property) -> String {
    match &property.enum_values {
        Some(values) => format!("ENUM({})", values.join(", ")),
        None => property.property_type.clone(),
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "はい" | "yes" | "true" | "✓" | "○"
    )
}

#[derive(Debug, Clone, PartialEq)]
enum Section {
    None,
    Known(SectionKind),
    Unknown(String),
}

#[derive(Debug, Clone)]
enum Item {
    Entity(Entity),
    ValueObject(ValueObject),
    Aggregate(Aggregate),
    Service(DomainService),
    Event(DomainEvent),
    Rule(BusinessRule),
}

impl Item {
    /// New item from its heading; the flag is set when the heading carries
    /// neither an internal name nor a stereotype
    fn start(kind: SectionKind, heading: &str) -> (Self, bool) {
        let (display_name, internal, stereotypes) = parse_named_heading(heading);
        let bare = internal.is_none() && stereotypes.is_empty();
        let name = internal.unwrap_or_else(|| display_name.clone());

        let item = match kind {
            SectionKind::Entities => {
                let aggregate_root = stereotypes
                    .iter()
                    .any(|s| s.eq_ignore_ascii_case("AggregateRoot") || s == "集約ルート");
                Item::Entity(Entity {
                    name,
                    display_name,
                    aggregate_root,
                    stereotypes,
                    ..Default::default()
                })
            }
            SectionKind::ValueObjects => Item::ValueObject(ValueObject {
                name,
                display_name,
                ..Default::default()
            }),
            SectionKind::Aggregates => Item::Aggregate(Aggregate {
                name,
                display_name,
                ..Default::default()
            }),
            SectionKind::DomainServices => Item::Service(DomainService {
                name,
                display_name,
                ..Default::default()
            }),
            SectionKind::DomainEvents => Item::Event(DomainEvent {
                name,
                display_name,
                ..Default::default()
            }),
            SectionKind::BusinessRules => Item::Rule(BusinessRule {
                name,
                display_name,
                ..Default::default()
            }),
        };
        (item, bare)
    }

    fn apply_label(&mut self, label: &str, value: &str) -> bool {
        let value = value.to_string();
        match (self, label) {
            (Item::Entity(e), "説明") => e.description = value,
            (Item::Entity(e), "識別子") => e.identified_by = value,
            (Item::Entity(e), "ライフサイクル") => e.lifecycle = value,
            (Item::Entity(e), "集約ルート") => e.aggregate_root = e.aggregate_root || is_truthy(&value),
            (Item::Entity(e), "所属集約") => e.aggregate_name = Some(value).filter(|v| !v.is_empty()),
            (Item::ValueObject(v), "説明") => v.description = value,
            (Item::Aggregate(a), "ルートエンティティ") => a.aggregate_root = value,
            (Item::Aggregate(a), "含有エンティティ") => a.included_entities = split_list(&value),
            (Item::Service(s), "説明") => s.description = value,
            (Item::Event(e), "発生条件") => e.occurred_when = value,
            (Item::Rule(r), "説明") => r.description = value,
            (Item::Rule(r), "カテゴリ") => r.category = value,
            _ => return false,
        }
        true
    }

    fn apply_row(&mut self, table: TableKind, cells: &[String]) {
        let cell = |idx: usize| cells.get(idx).cloned().unwrap_or_default();
        let name = cell(0);
        if name.is_empty() {
            return;
        }

        match (self, table) {
            (Item::Entity(Entity { properties, .. }), TableKind::Properties)
            | (Item::ValueObject(ValueObject { properties, .. }), TableKind::Properties) => {
                let (property_type, enum_values) = parse_property_type(&cell(1));
                properties.push(Property {
                    name,
                    property_type,
                    required: is_required_marker(&cell(2)),
                    description: cell(3),
                    enum_values,
                });
            }
            (Item::Service(s), TableKind::Methods) => s.methods.push(Method {
                name,
                parameters: cell(1),
                return_type: cell(2),
                description: cell(3),
            }),
            (Item::Event(e), TableKind::Payload) => {
                e.payload.insert(name, cell(1));
            }
            (item, table) => {
                debug!(?table, item = item.name(), "Ignoring table row outside its item kind");
            }
        }
    }

    fn push_list(&mut self, list: ListKind, value: String) {
        match (self, list) {
            (Item::Entity(e), ListKind::BusinessRules) => e.business_rules.push(value),
            (Item::Entity(e), ListKind::DomainEvents) => e.domain_events.push(value),
            (Item::ValueObject(v), ListKind::Constraints) => v.constraints.push(value),
            (Item::Aggregate(a), ListKind::Invariants) => a.invariants.push(value),
            (item, list) => {
                debug!(?list, item = item.name(), "Ignoring list entry outside its item kind");
            }
        }
    }

    fn name(&self) -> &str {
        match self {
            Item::Entity(e) => &e.name,
            Item::ValueObject(v) => &v.name,
            Item::Aggregate(a) => &a.name,
            Item::Service(s) => &s.name,
            Item::Event(e) => &e.name,
            Item::Rule(r) => &r.name,
        }
    }
}

/// Item under construction plus what its heading looked like
#[derive(Debug)]
struct PendingItem {
    item: Item,
    level: usize,
    bare_heading: bool,
    touched: bool,
}

/// Line-by-line parser state
#[derive(Debug)]
struct ParseState {
    section: Section,
    current: Option<PendingItem>,
    table: Option<TableKind>,
    list: Option<ListKind>,
    in_fence: bool,
    model: DomainLanguage,
    unknown_sections: Vec<String>,
}

impl ParseState {
    fn new() -> Self {
        Self {
            section: Section::None,
            current: None,
            table: None,
            list: None,
            in_fence: false,
            model: DomainLanguage::default(),
            unknown_sections: Vec::new(),
        }
    }

    fn feed(&mut self, line: &str) {
        if line.trim_start().starts_with("```") {
            self.in_fence = !self.in_fence;
            return;
        }
        if self.in_fence {
            return;
        }

        if let Some((level, text)) = parse_heading(line) {
            self.on_heading(level, &text);
            return;
        }

        if let Some(cells) = parse_table_row(line) {
            self.on_table_row(cells);
            return;
        }
        self.table = None;

        if let Some((label, value)) = parse_label(line) {
            self.on_label(&label, &value);
            return;
        }

        if let Some(caps) = bullet_re().captures(line) {
            if let Some(value) = caps.get(1) {
                self.on_bullet(value.as_str());
            }
        }
    }

    fn on_heading(&mut self, level: usize, text: &str) {
        self.table = None;
        self.list = None;

        match level {
            1 => {
                let rest = text.strip_prefix(TITLE_PREFIX).unwrap_or(text).trim_start();
                let rest = rest
                    .strip_prefix(':')
                    .or_else(|| rest.strip_prefix('：'))
                    .unwrap_or(rest);
                self.model.title = rest.trim().to_string();
            }
            2 => {
                self.flush();
                self.section = section_for(text);
                if let Section::Unknown(name) = &self.section {
                    warn!(section = %name, "Unknown domain-language section, content ignored");
                    self.unknown_sections.push(name.clone());
                }
            }
            3 | 4 => {
                let Section::Known(kind) = self.section else {
                    return;
                };
                let (item, bare_heading) = Item::start(kind, text);
                // An empty bare `###` directly above a named `####` only groups its children
                if let Some(pending) = &self.current {
                    let grouping = level == 4
                        && !bare_heading
                        && pending.level == 3
                        && pending.bare_heading
                        && !pending.touched;
                    if grouping {
                        warn!(
                            heading = pending.item.name(),
                            child = item.name(),
                            "Treating empty heading as a grouping, no item created"
                        );
                        self.current = None;
                    }
                }
                self.flush();
                self.current = Some(PendingItem {
                    item,
                    level,
                    bare_heading,
                    touched: false,
                });
            }
            _ => {}
        }
    }

    fn on_table_row(&mut self, cells: Vec<String>) {
        self.list = None;
        match self.table {
            None => {
                let first = cells.first().map(|c| c.as_str()).unwrap_or("");
                self.table = table_for(first);
            }
            Some(_) if is_separator_row(&cells) => {}
            Some(table) => {
                if let Some(pending) = self.current.as_mut() {
                    pending.item.apply_row(table, &cells);
                    pending.touched = true;
                }
            }
        }
    }

    fn on_label(&mut self, label: &str, value: &str) {
        if VERSION_LABELS.contains(&label) {
            self.model.version = value.to_string();
            return;
        }

        let Some(pending) = self.current.as_mut() else {
            return;
        };
        pending.touched = true;

        if let Some(list) = list_for(label) {
            self.list = Some(list);
            if !value.is_empty() {
                pending.item.push_list(list, value.to_string());
            }
            return;
        }

        self.list = None;
        if !pending.item.apply_label(label, value) {
            debug!(label, item = pending.item.name(), "Unrecognised label");
        }
    }

    fn on_bullet(&mut self, value: &str) {
        match (self.current.as_mut(), self.list) {
            (Some(pending), Some(list)) => {
                pending.item.push_list(list, value.to_string());
                pending.touched = true;
            }
            (None, _) if self.section == Section::Known(SectionKind::BusinessRules) => {
                self.model.business_rules.push(BusinessRule {
                    name: value.to_string(),
                    display_name: value.to_string(),
                    description: value.to_string(),
                    ..Default::default()
                });
            }
            _ => {}
        }
    }

    fn flush(&mut self) {
        let Some(pending) = self.current.take() else {
            return;
        };
        match pending.item {
            Item::Entity(e) => self.model.entities.push(e),
            Item::ValueObject(v) => self.model.value_objects.push(v),
            Item::Aggregate(a) => self.model.aggregates.push(a),
            Item::Service(s) => self.model.domain_services.push(s),
            Item::Event(e) => self.model.domain_events.push(e),
            Item::Rule(r) => self.model.business_rules.push(r),
        }
    }

    fn finish(mut self) -> (DomainLanguage, Vec<String>) {
        self.flush();
        (self.model, self.unknown_sections)
    }
}

fn parse_with_report(text: &str) -> (DomainLanguage, Vec<String>) {
    let mut state = ParseState::new();
    for line in text.lines() {
        state.feed(line);
    }
    state.finish()
}

/// Parse domain-language markdown.
///
/// Never fails: missing sections produce empty collections.
pub fn markdown_to_domain_language(text: &str) -> DomainLanguage {
    let (model, _) = parse_with_report(text);
    debug!(items = model.item_count(), "Parsed domain language");
    model
}

fn item_heading(display_name: &str, name: &str) -> String {
    let display = if display_name.is_empty() { name } else { display_name };
    format!("{}（{}）", display, name)
}

fn push_label(md: &mut String, label: &str, value: &str) {
    if !value.is_empty() {
        md.push_str(&format!("**{}**: {}\n", label, value));
    }
}

fn push_bullets(md: &mut String, label: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    md.push_str(&format!("\n**{}**:\n", label));
    for item in items {
        md.push_str(&format!("- {}\n", item));
    }
}

pub(crate) fn push_property_table(md: &mut String, properties: &[Property]) {
    if properties.is_empty() {
        return;
    }
    md.push_str("\n| 属性名 | 型 | 必須 | 説明 |\n");
    md.push_str("|--------|----|------|------|\n");
    for p in properties {
        md.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            p.name,
            render_property_type(p),
            if p.required { REQUIRED_MARKER } else { "" },
            p.description
        ));
    }
}

/// Render a model as domain-language markdown.
///
/// Section order is fixed: entities, value objects, aggregates, domain
/// services, domain events, business rules. Empty sections are omitted.
pub fn domain_language_to_markdown(model: &DomainLanguage) -> String {
    let mut md = String::new();

    if model.title.is_empty() {
        md.push_str(&format!("# {}\n\n", TITLE_PREFIX));
    } else {
        md.push_str(&format!("# {}: {}\n\n", TITLE_PREFIX, model.title));
    }
    push_label(&mut md, "バージョン", &model.version);

    if !model.entities.is_empty() {
        md.push_str("\n## エンティティ\n");
        for entity in &model.entities {
            md.push_str(&format!("\n### {}", item_heading(&entity.display_name, &entity.name)));
            if !entity.stereotypes.is_empty() {
                md.push_str(&format!("<<{}>>", entity.stereotypes.join(", ")));
            }
            md.push_str("\n\n");
            push_label(&mut md, "説明", &entity.description);
            push_label(&mut md, "識別子", &entity.identified_by);
            push_label(&mut md, "ライフサイクル", &entity.lifecycle);
            if entity.aggregate_root {
                push_label(&mut md, "集約ルート", "はい");
            }
            if let Some(aggregate) = &entity.aggregate_name {
                push_label(&mut md, "所属集約", aggregate);
            }
            push_property_table(&mut md, &entity.properties);
            push_bullets(&mut md, "ビジネスルール", &entity.business_rules);
            push_bullets(&mut md, "ドメインイベント", &entity.domain_events);
        }
    }

    if !model.value_objects.is_empty() {
        md.push_str("\n## 値オブジェクト\n");
        for vo in &model.value_objects {
            md.push_str(&format!("\n### {}\n\n", item_heading(&vo.display_name, &vo.name)));
            push_label(&mut md, "説明", &vo.description);
            push_property_table(&mut md, &vo.properties);
            push_bullets(&mut md, "制約", &vo.constraints);
        }
    }

    if !model.aggregates.is_empty() {
        md.push_str("\n## 集約\n");
        for aggregate in &model.aggregates {
            md.push_str(&format!(
                "\n### {}\n\n",
                item_heading(&aggregate.display_name, &aggregate.name)
            ));
            push_label(&mut md, "ルートエンティティ", &aggregate.aggregate_root);
            push_label(&mut md, "含有エンティティ", &aggregate.included_entities.join(", "));
            push_bullets(&mut md, "不変条件", &aggregate.invariants);
        }
    }

    if !model.domain_services.is_empty() {
        md.push_str("\n## ドメインサービス\n");
        for service in &model.domain_services {
            md.push_str(&format!(
                "\n### {}\n\n",
                item_heading(&service.display_name, &service.name)
            ));
            push_label(&mut md, "説明", &service.description);
            if !service.methods.is_empty() {
                md.push_str("\n| メソッド | パラメータ | 戻り値 | 説明 |\n");
                md.push_str("|----------|------------|--------|------|\n");
                for m in &service.methods {
                    md.push_str(&format!(
                        "| {} | {} | {} | {} |\n",
                        m.name, m.parameters, m.return_type, m.description
                    ));
                }
            }
        }
    }

    if !model.domain_events.is_empty() {
        md.push_str("\n## ドメインイベント\n");
        for event in &model.domain_events {
            md.push_str(&format!("\n### {}\n\n", item_heading(&event.display_name, &event.name)));
            push_label(&mut md, "発生条件", &event.occurred_when);
            if !event.payload.is_empty() {
                md.push_str("\n| ペイロード項目 | 型 |\n");
                md.push_str("|----------------|----|\n");
                for (field, field_type) in &event.payload {
                    md.push_str(&format!("| {} | {} |\n", field, field_type));
                }
            }
        }
    }

    if !model.business_rules.is_empty() {
        md.push_str("\n## ビジネスルール\n");
        for rule in &model.business_rules {
            md.push_str(&format!("\n### {}\n\n", item_heading(&rule.display_name, &rule.name)));
            push_label(&mut md, "説明", &rule.description);
            push_label(&mut md, "カテゴリ", &rule.category);
        }
    }

    md
}

/// Read-only validation of domain-language markdown
pub fn validate_domain_language_markdown(text: &str) -> ValidationResult {
    let (model, unknown_sections) = parse_with_report(text);
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if model.version.trim().is_empty() {
        errors.push("バージョンが指定されていません".to_string());
    }
    if model.item_count() == 0 {
        errors.push("ドメイン要素（エンティティ・値オブジェクト・ドメインサービス等）が1つも定義されていません".to_string());
    }
    for entity in model.entities.iter().filter(|e| e.properties.is_empty()) {
        errors.push(format!("エンティティ '{}' にプロパティが定義されていません", entity.name));
    }
    errors.extend(model.aggregate_consistency_errors());

    for section in unknown_sections {
        warnings.push(format!("未知のセクション '{}' は無視されました", section));
    }

    ValidationResult::from_findings(errors, warnings)
}
