//! API specification documents.
//!
//! ```markdown
//! # API仕様: 案件管理API
//!
//! ## 基本情報
//! **ベースURL**: /api/v1
//! **認証**: Bearer
//!
//! ## エンドポイント
//!
//! ### /projects
//!
//! #### GET
//! **概要**: 案件一覧を取得
//!
//! | パラメータ | 位置 | 型 | 必須 | 説明 |
//! |------------|------|----|------|------|
//! | status | query | string | | 絞り込み |
//!
//! | ステータス | 説明 |
//! |------------|------|
//! | 200 | 成功 |
//! ```

use super::{property_rows, unquote};
use crate::domain_language::push_property_table;
use crate::model::{ApiEndpoint, ApiParameter, ApiResponse, ApiSchema, ApiSpec};
use crate::section_parser::{
    extract_labeled_value, extract_section_at, extract_subsections, extract_table,
    extract_title, headings, is_required_marker, REQUIRED_MARKER,
};
use crate::validation::ValidationResult;

const HTTP_METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"];

fn http_method(text: &str) -> Option<String> {
    let upper = text.trim().to_uppercase();
    HTTP_METHODS.contains(&upper.as_str()).then_some(upper)
}

/// `/path` or `GET /path` heading → (path, inline method)
fn path_heading(text: &str) -> Option<(String, Option<String>)> {
    let text = unquote(text);
    if text.starts_with('/') {
        return Some((text, None));
    }
    let (method, rest) = text.split_once(char::is_whitespace)?;
    let method = http_method(method)?;
    let path = unquote(rest);
    path.starts_with('/').then_some((path, Some(method)))
}

fn parse_operation(path: &str, method: String, body: &str) -> ApiEndpoint {
    let parameters = extract_table(body, "パラメータ")
        .into_iter()
        .filter(|cells| cells.first().is_some_and(|c| !c.is_empty()))
        .map(|cells| {
            let cell = |idx: usize| cells.get(idx).cloned().unwrap_or_default();
            ApiParameter {
                name: unquote(&cell(0)),
                location: cell(1),
                param_type: cell(2),
                required: is_required_marker(&cell(3)),
                description: cell(4),
            }
        })
        .collect();

    let responses = extract_table(body, "ステータス")
        .into_iter()
        .filter(|cells| cells.first().is_some_and(|c| !c.is_empty()))
        .map(|cells| ApiResponse {
            status: cells[0].clone(),
            description: cells.get(1).cloned().unwrap_or_default(),
        })
        .collect();

    ApiEndpoint {
        path: path.to_string(),
        method,
        summary: extract_labeled_value(body, "概要").unwrap_or_default(),
        description: extract_labeled_value(body, "説明").unwrap_or_default(),
        request_body: extract_labeled_value(body, "リクエストボディ").filter(|v| !v.is_empty()),
        parameters,
        responses,
    }
}

/// Parse an API specification document
pub fn parse_api_spec_markdown(text: &str) -> ApiSpec {
    let mut spec = ApiSpec {
        title: extract_title(text, &["API仕様"]).unwrap_or_default(),
        ..Default::default()
    };

    if let Some(basic) = extract_section_at(text, 2, "基本情報") {
        spec.base_url = extract_labeled_value(&basic, "ベースURL").unwrap_or_default();
        spec.version = extract_labeled_value(&basic, "バージョン").unwrap_or_default();
        spec.authentication = extract_labeled_value(&basic, "認証").unwrap_or_default();
    }

    // Documents without an エンドポイント section still list paths at level 3
    let endpoint_source = extract_section_at(text, 2, "エンドポイント").unwrap_or_else(|| text.to_string());
    for sub in extract_subsections(&endpoint_source, 3) {
        let Some((path, inline_method)) = path_heading(&sub.heading) else {
            continue;
        };
        if let Some(method) = inline_method {
            spec.endpoints.push(parse_operation(&path, method, &sub.body));
            continue;
        }
        for op in extract_subsections(&sub.body, 4) {
            if let Some(method) = http_method(&op.heading) {
                spec.endpoints.push(parse_operation(&path, method, &op.body));
            }
        }
    }

    if let Some(schemas) = extract_section_at(text, 2, "スキーマ定義") {
        spec.schemas = extract_subsections(&schemas, 3)
            .into_iter()
            .map(|sub| ApiSchema {
                name: unquote(&sub.heading),
                properties: property_rows(&sub.body),
            })
            .collect();
    }

    spec
}

/// Render an API specification; endpoints are grouped by path in first-seen order
pub fn api_spec_to_markdown(spec: &ApiSpec) -> String {
    let mut md = format!("# API仕様: {}\n\n## 基本情報\n\n", spec.title);
    md.push_str(&format!("**ベースURL**: {}\n", spec.base_url));
    md.push_str(&format!("**バージョン**: {}\n", spec.version));
    md.push_str(&format!("**認証**: {}\n", spec.authentication));

    md.push_str("\n## エンドポイント\n");
    let mut paths: Vec<&str> = Vec::new();
    for endpoint in &spec.endpoints {
        if !paths.contains(&endpoint.path.as_str()) {
            paths.push(&endpoint.path);
        }
    }

    for path in paths {
        md.push_str(&format!("\n### {}\n", path));
        for endpoint in spec.endpoints.iter().filter(|e| e.path == path) {
            md.push_str(&format!("\n#### {}\n\n", endpoint.method));
            if !endpoint.summary.is_empty() {
                md.push_str(&format!("**概要**: {}\n", endpoint.summary));
            }
            if !endpoint.description.is_empty() {
                md.push_str(&format!("**説明**: {}\n", endpoint.description));
            }
            if let Some(body) = &endpoint.request_body {
                md.push_str(&format!("**リクエストボディ**: {}\n", body));
            }
            if !endpoint.parameters.is_empty() {
                md.push_str("\n| パラメータ | 位置 | 型 | 必須 | 説明 |\n");
                md.push_str("|------------|------|----|------|------|\n");
                for p in &endpoint.parameters {
                    md.push_str(&format!(
                        "| {} | {} | {} | {} | {} |\n",
                        p.name,
                        p.location,
                        p.param_type,
                        if p.required { REQUIRED_MARKER } else { "" },
                        p.description
                    ));
                }
            }
            if !endpoint.responses.is_empty() {
                md.push_str("\n| ステータス | 説明 |\n");
                md.push_str("|------------|------|\n");
                for r in &endpoint.responses {
                    md.push_str(&format!("| {} | {} |\n", r.status, r.description));
                }
            }
        }
    }

    if !spec.schemas.is_empty() {
        md.push_str("\n## スキーマ定義\n");
        for schema in &spec.schemas {
            md.push_str(&format!("\n### {}\n", schema.name));
            push_property_table(&mut md, &schema.properties);
        }
    }

    md
}

/// Validate an API specification document.
///
/// At least one `### /path` heading is required.
pub fn validate_api_spec_markdown(text: &str) -> ValidationResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if extract_section_at(text, 2, "基本情報").is_none() {
        errors.push("基本情報セクション（## 基本情報）がありません".to_string());
    }

    let path_headings: Vec<String> = headings(text)
        .into_iter()
        .filter(|h| h.level == 3)
        .filter_map(|h| path_heading(&h.text).map(|(path, _)| path))
        .collect();

    if path_headings.is_empty() {
        errors.push("エンドポイントが定義されていません（### /path 形式の見出しが必要です）".to_string());
    }

    let spec = parse_api_spec_markdown(text);
    for path in &path_headings {
        if !spec.endpoints.iter().any(|e| &e.path == path) {
            warnings.push(format!("エンドポイント '{}' にHTTPメソッドが定義されていません", path));
        }
    }
    for endpoint in spec.endpoints.iter().filter(|e| e.responses.is_empty()) {
        warnings.push(format!(
            "{} {} にレスポンス定義がありません",
            endpoint.method, endpoint.path
        ));
    }

    ValidationResult::from_findings(errors, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Property;

    const SAMPLE: &str = r#"# API仕様: 案件管理API

## 基本情報
**ベースURL**: /api/v1
**バージョン**: 1.0
**認証**: Bearer トークン

## エンドポイント

### /projects

#### GET
**概要**: 案件一覧を取得

| パラメータ | 位置 | 型 | 必須 | 説明 |
|------------|------|----|------|------|
| status | query | string | | 絞り込み |

| ステータス | 説明 |
|------------|------|
| 200 | 成功 |

#### POST
**概要**: 案件を登録
**リクエストボディ**: ProjectInput

### `/projects/{id}`

#### delete

| ステータス | 説明 |
|---|---|
| 204 | 削除済み |

## スキーマ定義

### ProjectInput
| 属性名 | 型 | 必須 | 説明 |
|---|---|---|---|
| name | string | ✓ | 案件名 |
"#;

    #[test]
    fn test_parse_endpoints_and_schemas() {
        let spec = parse_api_spec_markdown(SAMPLE);
        assert_eq!(spec.title, "案件管理API");
        assert_eq!(spec.base_url, "/api/v1");
        assert_eq!(spec.authentication, "Bearer トークン");
        assert_eq!(spec.endpoints.len(), 3);

        let get = &spec.endpoints[0];
        assert_eq!((get.path.as_str(), get.method.as_str()), ("/projects", "GET"));
        assert_eq!(get.parameters[0].location, "query");
        assert!(!get.parameters[0].required);
        assert_eq!(get.responses[0].status, "200");

        assert_eq!(spec.endpoints[1].request_body.as_deref(), Some("ProjectInput"));
        assert_eq!(spec.endpoints[2].path, "/projects/{id}");
        assert_eq!(spec.endpoints[2].method, "DELETE");

        assert_eq!(spec.schemas.len(), 1);
        assert!(spec.schemas[0].properties[0].required);
    }

    #[test]
    fn test_generated_markdown_parses_back() {
        let spec = ApiSpec {
            title: "請求API".to_string(),
            base_url: "/billing".to_string(),
            version: "2".to_string(),
            authentication: "OAuth2".to_string(),
            endpoints: vec![
                ApiEndpoint {
                    path: "/invoices".to_string(),
                    method: "GET".to_string(),
                    summary: "請求書一覧".to_string(),
                    parameters: vec![ApiParameter {
                        name: "month".to_string(),
                        location: "query".to_string(),
                        param_type: "string".to_string(),
                        required: true,
                        description: "対象月".to_string(),
                    }],
                    responses: vec![ApiResponse {
                        status: "200".to_string(),
                        description: "OK".to_string(),
                    }],
                    ..Default::default()
                },
                ApiEndpoint {
                    path: "/invoices".to_string(),
                    method: "POST".to_string(),
                    request_body: Some("InvoiceInput".to_string()),
                    ..Default::default()
                },
            ],
            schemas: vec![ApiSchema {
                name: "InvoiceInput".to_string(),
                properties: vec![Property {
                    name: "amount".to_string(),
                    property_type: "number".to_string(),
                    required: true,
                    ..Default::default()
                }],
            }],
        };
        assert_eq!(parse_api_spec_markdown(&api_spec_to_markdown(&spec)), spec);
    }

    #[test]
    fn test_validate_sample_is_valid() {
        let result = validate_api_spec_markdown(SAMPLE);
        assert!(result.valid, "{:?}", result.errors);
        // POST /projects has no responses
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_validate_without_endpoints_mentions_endpoint() {
        let text = "# API仕様: 空\n\n## 基本情報\n**ベースURL**: /api\n";
        let result = validate_api_spec_markdown(text);
        assert!(!result.valid);
        assert!(result.errors.iter().any(|e| e.contains("エンドポイント")));
    }

    #[test]
    fn test_validate_path_without_method_warns() {
        let text = "# API仕様: x\n## 基本情報\n## エンドポイント\n### /health\n説明のみ\n";
        let result = validate_api_spec_markdown(text);
        assert!(result.valid);
        assert!(result.warnings[0].contains("/health"));
    }

    #[test]
    fn test_inline_method_heading() {
        let spec = parse_api_spec_markdown("## エンドポイント\n### POST /login\n**概要**: ログイン\n");
        assert_eq!(spec.endpoints[0].method, "POST");
        assert_eq!(spec.endpoints[0].summary, "ログイン");
    }
}
