//! Business operation, use case, page and test definition documents.

use super::unquote;
use crate::model::{
    BusinessOperation, BusinessState, Page, TestCase, TestDefinition, UiField, UseCase,
    UseCaseStub,
};
use crate::section_parser::{
    extract_bulleted_list, extract_labeled_value, extract_numbered_list, extract_preamble,
    extract_section_at, extract_subsections, extract_table_any, extract_title, is_required_marker,
    parse_named_heading, REQUIRED_MARKER,
};
use crate::validation::ValidationResult;
use regex::Regex;
use std::sync::OnceLock;

pub const OPERATION_PREFIX: &str = "ビジネスオペレーション";
pub const USE_CASE_PREFIX: &str = "ユースケース";
pub const PAGE_PREFIX: &str = "ページ定義";
pub const TEST_PREFIX: &str = "テスト定義";

const FIELD_TABLE_HEADERS: &[&str] = &["項目名", "項目", "フィールド"];

fn list_item_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(?:[-*+]|\d+\.)\s+(.+?)\s*$").unwrap())
}

fn test_heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([A-Za-z0-9_-]+)\s*[:：]\s*(.+)$").unwrap())
}

/// Bulleted and numbered items together, in document order
fn any_list(section: &str) -> Vec<String> {
    section
        .lines()
        .filter_map(|line| list_item_re().captures(line))
        .map(|caps| caps[1].to_string())
        .collect()
}

fn ui_fields(section: &str) -> Vec<UiField> {
    extract_table_any(section, FIELD_TABLE_HEADERS)
        .into_iter()
        .filter(|cells| cells.first().is_some_and(|c| !c.is_empty()))
        .map(|cells| {
            let cell = |idx: usize| cells.get(idx).cloned().unwrap_or_default();
            UiField {
                name: cell(0),
                field_type: cell(1),
                required: is_required_marker(&cell(2)),
                description: cell(3),
            }
        })
        .collect()
}

fn push_ui_fields(md: &mut String, fields: &[UiField]) {
    md.push_str("| 項目名 | 型 | 必須 | 説明 |\n");
    md.push_str("|--------|----|------|------|\n");
    for f in fields {
        md.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            f.name,
            f.field_type,
            if f.required { REQUIRED_MARKER } else { "" },
            f.description
        ));
    }
}

fn test_cases(section: &str) -> Vec<TestCase> {
    extract_subsections(section, 3)
        .into_iter()
        .map(|sub| {
            let (id, title) = match test_heading_re().captures(&sub.heading) {
                Some(caps) => (caps[1].to_string(), caps[2].trim().to_string()),
                None => (String::new(), sub.heading.clone()),
            };
            TestCase {
                id,
                title,
                preconditions: extract_labeled_value(&sub.body, "前提条件").unwrap_or_default(),
                steps: extract_numbered_list(&sub.body),
                expected: extract_labeled_value(&sub.body, "期待結果").unwrap_or_default(),
            }
        })
        .collect()
}

fn push_test_cases(md: &mut String, cases: &[TestCase]) {
    for case in cases {
        if case.id.is_empty() {
            md.push_str(&format!("\n### {}\n\n", case.title));
        } else {
            md.push_str(&format!("\n### {}: {}\n\n", case.id, case.title));
        }
        md.push_str(&format!("**前提条件**: {}\n\n", case.preconditions));
        for (idx, step) in case.steps.iter().enumerate() {
            md.push_str(&format!("{}. {}\n", idx + 1, step));
        }
        md.push_str(&format!("\n**期待結果**: {}\n", case.expected));
    }
}

fn section_list(text: &str, heading: &str) -> Vec<String> {
    extract_section_at(text, 2, heading)
        .map(|s| extract_bulleted_list(&s))
        .unwrap_or_default()
}

/// Parse a business operation document.
///
/// Process steps keep their numbering order.
pub fn parse_business_operation_markdown(text: &str) -> BusinessOperation {
    let preamble = extract_preamble(text);

    let states = extract_section_at(text, 2, "ビジネス状態")
        .map(|section| {
            extract_bulleted_list(&section)
                .into_iter()
                .map(|item| match item.split_once([':', '：']) {
                    Some((name, description)) => BusinessState {
                        name: unquote(name),
                        description: description.trim().to_string(),
                    },
                    None => BusinessState {
                        name: unquote(&item),
                        description: String::new(),
                    },
                })
                .collect()
        })
        .unwrap_or_default();

    let use_cases = section_list(text, "ユースケース")
        .into_iter()
        .map(|item| {
            let (display_name, id, _) = parse_named_heading(&item);
            UseCaseStub { display_name, id }
        })
        .collect();

    BusinessOperation {
        display_name: extract_title(text, &[OPERATION_PREFIX]).unwrap_or_default(),
        id: extract_labeled_value(&preamble, "ID").filter(|v| !v.is_empty()),
        pattern: extract_labeled_value(&preamble, "パターン").unwrap_or_default(),
        goal: extract_labeled_value(&preamble, "目的").unwrap_or_default(),
        roles: section_list(text, "ロール"),
        process_steps: extract_section_at(text, 2, "業務プロセス")
            .map(|s| extract_numbered_list(&s))
            .unwrap_or_default(),
        states,
        use_cases,
        ui_fields: extract_section_at(text, 2, "画面項目")
            .map(|s| ui_fields(&s))
            .unwrap_or_default(),
        test_cases: extract_section_at(text, 2, "テストケース")
            .map(|s| test_cases(&s))
            .unwrap_or_default(),
    }
}

/// Render a business operation document
pub fn business_operation_to_markdown(op: &BusinessOperation) -> String {
    let mut md = format!("# {}：{}\n\n", OPERATION_PREFIX, op.display_name);
    if let Some(id) = &op.id {
        md.push_str(&format!("**ID**: {}\n", id));
    }
    md.push_str(&format!("**パターン**: {}\n", op.pattern));
    md.push_str(&format!("**目的**: {}\n", op.goal));

    md.push_str("\n## ロール\n\n");
    for role in &op.roles {
        md.push_str(&format!("- {}\n", role));
    }

    md.push_str("\n## 業務プロセス\n\n");
    for (idx, step) in op.process_steps.iter().enumerate() {
        md.push_str(&format!("{}. {}\n", idx + 1, step));
    }

    md.push_str("\n## ビジネス状態\n\n");
    for state in &op.states {
        if state.description.is_empty() {
            md.push_str(&format!("- {}\n", state.name));
        } else {
            md.push_str(&format!("- {}: {}\n", state.name, state.description));
        }
    }

    md.push_str("\n## ユースケース\n\n");
    for uc in &op.use_cases {
        match &uc.id {
            Some(id) => md.push_str(&format!("- {}（{}）\n", uc.display_name, id)),
            None => md.push_str(&format!("- {}\n", uc.display_name)),
        }
    }

    if !op.ui_fields.is_empty() {
        md.push_str("\n## 画面項目\n\n");
        push_ui_fields(&mut md, &op.ui_fields);
    }

    if !op.test_cases.is_empty() {
        md.push_str("\n## テストケース\n");
        push_test_cases(&mut md, &op.test_cases);
    }

    md
}

/// Validate a business operation document
pub fn validate_business_operation_markdown(text: &str) -> ValidationResult {
    let op = parse_business_operation_markdown(text);
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if op.display_name.is_empty() {
        errors.push(format!("タイトル（# {}：名前）がありません", OPERATION_PREFIX));
    }
    if op.process_steps.is_empty() {
        errors.push("業務プロセス（番号付きリスト）が定義されていません".to_string());
    }
    if op.use_cases.is_empty() {
        warnings.push("ユースケースが1つも列挙されていません".to_string());
    }
    for case in op.test_cases.iter().filter(|c| c.expected.is_empty()) {
        warnings.push(format!("テストケース '{}' に期待結果がありません", case.title));
    }

    ValidationResult::from_findings(errors, warnings)
}

/// Parse a use case document
pub fn parse_use_case_markdown(text: &str) -> UseCase {
    let preamble = extract_preamble(text);
    UseCase {
        display_name: extract_title(text, &[USE_CASE_PREFIX]).unwrap_or_default(),
        actor: extract_labeled_value(&preamble, "アクター").unwrap_or_default(),
        preconditions: extract_labeled_value(&preamble, "事前条件").unwrap_or_default(),
        postconditions: extract_labeled_value(&preamble, "事後条件").unwrap_or_default(),
        main_flow: extract_section_at(text, 2, "基本フロー")
            .map(|s| extract_numbered_list(&s))
            .unwrap_or_default(),
        alternative_flows: extract_section_at(text, 2, "代替フロー")
            .map(|s| any_list(&s))
            .unwrap_or_default(),
    }
}

pub fn use_case_to_markdown(uc: &UseCase) -> String {
    let mut md = format!("# {}：{}\n\n", USE_CASE_PREFIX, uc.display_name);
    md.push_str(&format!("**アクター**: {}\n", uc.actor));
    md.push_str(&format!("**事前条件**: {}\n", uc.preconditions));
    md.push_str(&format!("**事後条件**: {}\n", uc.postconditions));

    md.push_str("\n## 基本フロー\n\n");
    for (idx, step) in uc.main_flow.iter().enumerate() {
        md.push_str(&format!("{}. {}\n", idx + 1, step));
    }
    if !uc.alternative_flows.is_empty() {
        md.push_str("\n## 代替フロー\n\n");
        for flow in &uc.alternative_flows {
            md.push_str(&format!("- {}\n", flow));
        }
    }
    md
}

/// Parse a page definition document
pub fn parse_page_markdown(text: &str) -> Page {
    let preamble = extract_preamble(text);
    Page {
        display_name: extract_title(text, &[PAGE_PREFIX]).unwrap_or_default(),
        url: extract_labeled_value(&preamble, "URL").unwrap_or_default(),
        purpose: extract_labeled_value(&preamble, "目的").unwrap_or_default(),
        fields: extract_section_at(text, 2, "表示項目|画面項目")
            .map(|s| ui_fields(&s))
            .unwrap_or_default(),
        actions: section_list(text, "操作"),
    }
}

pub fn page_to_markdown(page: &Page) -> String {
    let mut md = format!("# {}：{}\n\n", PAGE_PREFIX, page.display_name);
    md.push_str(&format!("**URL**: {}\n", page.url));
    md.push_str(&format!("**目的**: {}\n", page.purpose));
    if !page.fields.is_empty() {
        md.push_str("\n## 表示項目\n\n");
        push_ui_fields(&mut md, &page.fields);
    }
    if !page.actions.is_empty() {
        md.push_str("\n## 操作\n\n");
        for action in &page.actions {
            md.push_str(&format!("- {}\n", action));
        }
    }
    md
}

/// Parse a test definition document
pub fn parse_test_definition_markdown(text: &str) -> TestDefinition {
    let body = extract_section_at(text, 2, "テストケース").unwrap_or_else(|| text.to_string());
    TestDefinition {
        display_name: extract_title(text, &[TEST_PREFIX]).unwrap_or_default(),
        test_cases: test_cases(&body),
    }
}

pub fn test_definition_to_markdown(def: &TestDefinition) -> String {
    let mut md = format!("# {}：{}\n\n## テストケース\n", TEST_PREFIX, def.display_name);
    push_test_cases(&mut md, &def.test_cases);
    md
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPERATION: &str = r#"# ビジネスオペレーション：成果物を提出する

**ID**: submit-deliverable
**パターン**: ワークフロー
**目的**: 成果物を顧客へ届ける

## ロール
- コンサルタント
- マネージャー

## 業務プロセス
1. 成果物を作成する
2. レビューを依頼する
3. 顧客へ提出する

## ビジネス状態
- 下書き: 作成中
- 提出済み：顧客に送付済み
- 完了

## ユースケース
- 成果物を登録する（register-deliverable）
- 提出履歴を確認する

## 画面項目
| 項目名 | 型 | 必須 | 説明 |
|---|---|---|---|
| タイトル | 文字列 | ✓ | 成果物名 |

## テストケース

### TC-001: 正常に提出できる
**前提条件**: 成果物が登録済み
1. 提出ボタンを押す
2. 確認ダイアログで承認する
**期待結果**: 状態が提出済みになる

### 差戻しの確認
1. 差戻す
"#;

    #[test]
    fn test_parse_business_operation() {
        let op = parse_business_operation_markdown(OPERATION);
        assert_eq!(op.display_name, "成果物を提出する");
        assert_eq!(op.id.as_deref(), Some("submit-deliverable"));
        assert_eq!(op.pattern, "ワークフロー");
        assert_eq!(op.roles, vec!["コンサルタント", "マネージャー"]);
        assert_eq!(
            op.process_steps,
            vec!["成果物を作成する", "レビューを依頼する", "顧客へ提出する"]
        );
        assert_eq!(op.states.len(), 3);
        assert_eq!(op.states[1].description, "顧客に送付済み");
        assert_eq!(op.use_cases[0].id.as_deref(), Some("register-deliverable"));
        assert!(op.use_cases[1].id.is_none());
        assert!(op.ui_fields[0].required);

        assert_eq!(op.test_cases.len(), 2);
        assert_eq!(op.test_cases[0].id, "TC-001");
        assert_eq!(op.test_cases[0].steps.len(), 2);
        assert_eq!(op.test_cases[0].expected, "状態が提出済みになる");
        assert_eq!(op.test_cases[1].id, "");
        assert_eq!(op.test_cases[1].title, "差戻しの確認");
    }

    #[test]
    fn test_business_operation_round_trip() {
        let op = parse_business_operation_markdown(OPERATION);
        assert_eq!(parse_business_operation_markdown(&business_operation_to_markdown(&op)), op);
    }

    #[test]
    fn test_validate_business_operation() {
        let result = validate_business_operation_markdown(OPERATION);
        assert!(result.valid);
        assert_eq!(result.warnings.len(), 1);

        let result = validate_business_operation_markdown("# ビジネスオペレーション：空\n");
        assert!(!result.valid);
        assert!(result.errors[0].contains("業務プロセス"));
    }

    #[test]
    fn test_use_case_round_trip() {
        let text = "# ユースケース:成果物を提出する\n\n**アクター**: コンサルタント\n**事前条件**：ログイン済み\n\n## 基本フロー\n1. 一覧を開く\n2. 提出する\n\n## 代替フロー\n- 差戻し時は再提出\n1. 期限切れは管理者へ\n";
        let uc = parse_use_case_markdown(text);
        assert_eq!(uc.display_name, "成果物を提出する");
        assert_eq!(uc.preconditions, "ログイン済み");
        assert_eq!(uc.main_flow.len(), 2);
        assert_eq!(uc.alternative_flows.len(), 2);
        assert_eq!(parse_use_case_markdown(&use_case_to_markdown(&uc)), uc);
    }

    #[test]
    fn test_page_round_trip() {
        let page = Page {
            display_name: "成果物一覧".to_string(),
            url: "/deliverables".to_string(),
            purpose: "成果物を一覧表示する".to_string(),
            fields: vec![UiField {
                name: "状態".to_string(),
                field_type: "選択".to_string(),
                required: false,
                description: "絞り込み".to_string(),
            }],
            actions: vec!["検索".to_string(), "詳細へ遷移".to_string()],
        };
        assert_eq!(parse_page_markdown(&page_to_markdown(&page)), page);
    }

    #[test]
    fn test_test_definition_round_trip() {
        let def = parse_test_definition_markdown(
            "# テスト定義：提出テスト\n\n## テストケース\n\n### T1: 提出\n**前提条件**: なし\n1. 押す\n**期待結果**: 完了\n",
        );
        assert_eq!(def.display_name, "提出テスト");
        assert_eq!(def.test_cases[0].id, "T1");
        assert_eq!(parse_test_definition_markdown(&test_definition_to_markdown(&def)), def);
    }
}
