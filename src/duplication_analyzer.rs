//! Duplicate detection over scanned documents.
//!
//! Documents of the same kind whose display names are equal after lowercasing
//! and trimming form a duplicate group. Matching is exact after that
//! normalization; near-miss names are only reported by the opt-in
//! [`SimilarityPass`] and never change group membership.

use crate::model::{DocumentKind, SpecDocument};
use crate::rules::{
    IMPACT_HIGH_MEMBER_COUNT, IMPACT_HIGH_SERVICE_SPAN, IMPACT_MEDIUM_MEMBER_COUNT,
    IMPACT_MEDIUM_SERVICE_SPAN, MERGE_STRATEGY_RULES,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ImpactLevel {
    Low,
    Medium,
    High,
}

impl ImpactLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImpactLevel::Low => "low",
            ImpactLevel::Medium => "medium",
            ImpactLevel::High => "high",
        }
    }
}

/// How a duplicate group should be consolidated
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum MergeStrategy {
    BasicFunctionIntegration,
    ParameterizedSharing,
    WorkflowTemplate,
    CrudTemplate,
    CrossServiceIntegration,
    PatternConsolidation,
    /// Explicit merge keeping the longest document
    Merge,
}

impl MergeStrategy {
    pub const ALL: [MergeStrategy; 7] = [
        MergeStrategy::BasicFunctionIntegration,
        MergeStrategy::ParameterizedSharing,
        MergeStrategy::WorkflowTemplate,
        MergeStrategy::CrudTemplate,
        MergeStrategy::CrossServiceIntegration,
        MergeStrategy::PatternConsolidation,
        MergeStrategy::Merge,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MergeStrategy::BasicFunctionIntegration => "basic-function-integration",
            MergeStrategy::ParameterizedSharing => "parameterized-sharing",
            MergeStrategy::WorkflowTemplate => "workflow-template",
            MergeStrategy::CrudTemplate => "crud-template",
            MergeStrategy::CrossServiceIntegration => "cross-service-integration",
            MergeStrategy::PatternConsolidation => "pattern-consolidation",
            MergeStrategy::Merge => "merge",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL.iter().copied().find(|s| s.as_str() == name)
    }
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Documents sharing one normalized display name
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DuplicateGroup {
    pub normalized_key: String,
    pub kind: DocumentKind,
    /// Members in input order
    pub members: Vec<SpecDocument>,
    /// Distinct service ids, sorted
    pub services: Vec<String>,
    pub duplicate_count: usize,
    pub impact_level: ImpactLevel,
    pub merge_strategy: MergeStrategy,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct UseCaseDuplications {
    pub total: usize,
    pub groups: Vec<DuplicateGroup>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PageDuplications {
    pub total: usize,
    /// Records removable by consolidating every page group
    pub consolidation_potential: usize,
    pub groups: Vec<DuplicateGroup>,
}

/// A pair of distinct normalized names that look alike
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimilarPair {
    pub kind: DocumentKind,
    pub left: String,
    pub right: String,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DuplicationAnalysisResult {
    pub usecase_duplications: UseCaseDuplications,
    pub page_duplications: PageDuplications,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub similar_names: Vec<SimilarPair>,
}

/// Grouping key: lowercase, surrounding whitespace removed
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

pub fn impact_level(service_span: usize, member_count: usize) -> ImpactLevel {
    if service_span > IMPACT_HIGH_SERVICE_SPAN || member_count > IMPACT_HIGH_MEMBER_COUNT {
        ImpactLevel::High
    } else if service_span > IMPACT_MEDIUM_SERVICE_SPAN || member_count > IMPACT_MEDIUM_MEMBER_COUNT
    {
        ImpactLevel::Medium
    } else {
        ImpactLevel::Low
    }
}

/// First matching keyword predicate, else a service-span based default
pub fn select_strategy(normalized_key: &str, service_span: usize) -> MergeStrategy {
    for (name, all_of, any_of) in MERGE_STRATEGY_RULES {
        let all = all_of.iter().all(|k| normalized_key.contains(k));
        let any = any_of.is_empty() || any_of.iter().any(|k| normalized_key.contains(k));
        if all && any {
            if let Some(strategy) = MergeStrategy::from_name(name) {
                return strategy;
            }
        }
    }

    if service_span > 1 {
        MergeStrategy::CrossServiceIntegration
    } else {
        MergeStrategy::PatternConsolidation
    }
}

/// Opt-in near-miss name detection using the character-bigram Dice coefficient
#[derive(Debug, Clone, Copy)]
pub struct SimilarityPass {
    threshold: f64,
}

impl SimilarityPass {
    /// `threshold` is clamped to `0.0..=1.0`
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold: threshold.clamp(0.0, 1.0),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Pairs of distinct normalized names of the same kind scoring at or above the threshold
    pub fn find(&self, documents: &[SpecDocument]) -> Vec<SimilarPair> {
        let mut names: BTreeMap<DocumentKind, BTreeSet<String>> = BTreeMap::new();
        for doc in documents {
            names
                .entry(doc.kind)
                .or_default()
                .insert(normalize_name(&doc.display_name));
        }

        let mut pairs = Vec::new();
        for (kind, keys) in &names {
            let keys: Vec<&String> = keys.iter().collect();
            for (i, left) in keys.iter().enumerate() {
                for right in &keys[i + 1..] {
                    let score = dice_coefficient(left, right);
                    if score >= self.threshold {
                        pairs.push(SimilarPair {
                            kind: *kind,
                            left: left.to_string(),
                            right: right.to_string(),
                            score,
                        });
                    }
                }
            }
        }

        pairs.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.left.cmp(&b.left))
                .then_with(|| a.right.cmp(&b.right))
        });
        pairs
    }
}

fn bigrams(text: &str) -> Vec<(char, char)> {
    let chars: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
    chars.windows(2).map(|w| (w[0], w[1])).collect()
}

/// Sørensen–Dice coefficient over character bigrams (multiset)
pub fn dice_coefficient(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let left = bigrams(a);
    let right = bigrams(b);
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }

    let mut counts: HashMap<(char, char), usize> = HashMap::new();
    for gram in &left {
        *counts.entry(*gram).or_default() += 1;
    }
    let mut shared = 0;
    for gram in &right {
        if let Some(count) = counts.get_mut(gram) {
            if *count > 0 {
                *count -= 1;
                shared += 1;
            }
        }
    }

    (2 * shared) as f64 / (left.len() + right.len()) as f64
}

/// Groups duplicated documents and proposes merge strategies
#[derive(Debug, Clone, Default)]
pub struct DuplicationAnalyzer {
    similarity: Option<SimilarityPass>,
}

impl DuplicationAnalyzer {
    pub fn new() -> Self {
        Self { similarity: None }
    }

    pub fn with_similarity(mut self, pass: SimilarityPass) -> Self {
        self.similarity = Some(pass);
        self
    }

    /// Duplicate groups with at least two members.
    ///
    /// Sorted by impact (high first), member count (largest first), then key.
    pub fn analyze(&self, documents: &[SpecDocument]) -> Vec<DuplicateGroup> {
        let mut order: Vec<(DocumentKind, String)> = Vec::new();
        let mut buckets: HashMap<(DocumentKind, String), Vec<SpecDocument>> = HashMap::new();

        for doc in documents {
            let key = (doc.kind, normalize_name(&doc.display_name));
            if key.1.is_empty() {
                continue;
            }
            let bucket = buckets.entry(key.clone()).or_default();
            if bucket.is_empty() {
                order.push(key);
            }
            bucket.push(doc.clone());
        }

        let mut groups: Vec<DuplicateGroup> = order
            .into_iter()
            .filter_map(|key| {
                let members = buckets.remove(&key)?;
                (members.len() >= 2).then(|| build_group(key.0, key.1, members))
            })
            .collect();

        groups.sort_by(|a, b| {
            b.impact_level
                .cmp(&a.impact_level)
                .then_with(|| b.duplicate_count.cmp(&a.duplicate_count))
                .then_with(|| a.normalized_key.cmp(&b.normalized_key))
                .then_with(|| a.kind.cmp(&b.kind))
        });
        groups
    }

    /// Full report split by document kind
    pub fn report(&self, documents: &[SpecDocument]) -> DuplicationAnalysisResult {
        let (page_groups, usecase_groups): (Vec<_>, Vec<_>) = self
            .analyze(documents)
            .into_iter()
            .partition(|g| g.kind == DocumentKind::Page);

        let consolidation_potential = page_groups.iter().map(|g| g.duplicate_count - 1).sum();

        DuplicationAnalysisResult {
            usecase_duplications: UseCaseDuplications {
                total: usecase_groups.len(),
                groups: usecase_groups,
            },
            page_duplications: PageDuplications {
                total: page_groups.len(),
                consolidation_potential,
                groups: page_groups,
            },
            similar_names: self
                .similarity
                .map(|pass| pass.find(documents))
                .unwrap_or_default(),
        }
    }
}

fn build_group(kind: DocumentKind, normalized_key: String, members: Vec<SpecDocument>) -> DuplicateGroup {
    let services: Vec<String> = members
        .iter()
        .map(|m| m.service_id.clone())
        .collect::<HashSet<_>>()
        .into_iter()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let impact_level = impact_level(services.len(), members.len());
    let merge_strategy = select_strategy(&normalized_key, services.len());

    DuplicateGroup {
        normalized_key,
        kind,
        duplicate_count: members.len(),
        services,
        members,
        impact_level,
        merge_strategy,
    }
}

/// Analyze with default settings
pub fn analyze(documents: &[SpecDocument]) -> Vec<DuplicateGroup> {
    DuplicationAnalyzer::new().analyze(documents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Layer, PageLayer, UseCaseScope};

    fn usecase(service: &str, operation: &str, name: &str) -> SpecDocument {
        SpecDocument {
            path: format!(
                "services/{}/capabilities/c/operations/{}/usecases/{}.md",
                service, operation, name
            ),
            raw_content: format!("# ユースケース：{}\n", name),
            kind: DocumentKind::UseCase,
            layer: Layer::UseCase(UseCaseScope::Individual),
            display_name: name.to_string(),
            service_id: service.to_string(),
            capability_id: Some("c".to_string()),
            operation_id: Some(operation.to_string()),
            use_case_id: Some(name.to_string()),
            associated_pages: vec![],
        }
    }

    fn page(service: &str, name: &str) -> SpecDocument {
        SpecDocument {
            kind: DocumentKind::Page,
            layer: Layer::Page(PageLayer::Usecase),
            ..usecase(service, "op", name)
        }
    }

    #[test]
    fn test_three_services_same_usecase() {
        let docs = vec![
            usecase("pm", "a", "成果物を提出する"),
            usecase("sales", "b", "成果物を提出する"),
            usecase("hr", "c", "成果物を提出する"),
        ];
        let groups = analyze(&docs);
        assert_eq!(groups.len(), 1);
        let group = &groups[0];
        assert_eq!(group.duplicate_count, 3);
        assert_eq!(group.services, vec!["hr", "pm", "sales"]);
        assert_eq!(group.impact_level, ImpactLevel::Medium);
        assert_eq!(group.merge_strategy, MergeStrategy::BasicFunctionIntegration);
    }

    #[test]
    fn test_grouping_is_case_and_whitespace_insensitive() {
        let docs = vec![
            usecase("pm", "a", "Submit Report"),
            usecase("pm", "b", "submit report "),
            usecase("pm", "c", "Submit the Report"),
        ];
        let groups = analyze(&docs);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].normalized_key, "submit report");
        assert_eq!(groups[0].duplicate_count, 2);
        assert_eq!(groups[0].members[0].operation_id.as_deref(), Some("a"));
    }

    #[test]
    fn test_singletons_are_not_reported() {
        let docs = vec![usecase("pm", "a", "一意"), usecase("pm", "b", "別物")];
        assert!(analyze(&docs).is_empty());
    }

    #[test]
    fn test_kinds_are_grouped_separately() {
        let docs = vec![usecase("pm", "a", "一覧"), page("pm", "一覧")];
        assert!(analyze(&docs).is_empty());
    }

    #[test]
    fn test_impact_thresholds() {
        assert_eq!(impact_level(1, 2), ImpactLevel::Low);
        assert_eq!(impact_level(1, 3), ImpactLevel::Low);
        assert_eq!(impact_level(1, 4), ImpactLevel::Medium);
        assert_eq!(impact_level(2, 2), ImpactLevel::Medium);
        assert_eq!(impact_level(3, 3), ImpactLevel::Medium);
        assert_eq!(impact_level(4, 4), ImpactLevel::High);
        assert_eq!(impact_level(1, 7), ImpactLevel::High);
    }

    #[test]
    fn test_strategy_precedence() {
        assert_eq!(select_strategy("成果物を提出する", 1), MergeStrategy::BasicFunctionIntegration);
        assert_eq!(select_strategy("成果物一覧", 1), MergeStrategy::ParameterizedSharing);
        assert_eq!(select_strategy("承認一覧", 1), MergeStrategy::ParameterizedSharing);
        assert_eq!(select_strategy("経費を承認する", 1), MergeStrategy::WorkflowTemplate);
        assert_eq!(select_strategy("案件を登録する", 1), MergeStrategy::CrudTemplate);
        assert_eq!(select_strategy("請求書を作成する", 3), MergeStrategy::CrudTemplate);
        assert_eq!(select_strategy("提出する", 2), MergeStrategy::CrossServiceIntegration);
        assert_eq!(select_strategy("提出する", 1), MergeStrategy::PatternConsolidation);
    }

    #[test]
    fn test_groups_sorted_by_impact_then_size() {
        let mut docs = vec![
            usecase("pm", "a", "low"),
            usecase("pm", "b", "low"),
            usecase("pm", "a", "medium"),
            usecase("hr", "b", "medium"),
        ];
        for op in ["a", "b", "c", "d"] {
            docs.push(usecase("pm", op, "big"));
        }
        let keys: Vec<String> = analyze(&docs).into_iter().map(|g| g.normalized_key).collect();
        assert_eq!(keys, vec!["big", "medium", "low"]);
    }

    #[test]
    fn test_report_counts_consolidation_potential() {
        let docs = vec![
            page("pm", "一覧"),
            page("hr", "一覧"),
            page("sales", "一覧"),
            page("pm", "詳細"),
            page("hr", "詳細"),
            usecase("pm", "a", "登録"),
            usecase("pm", "b", "登録"),
        ];
        let report = DuplicationAnalyzer::new().report(&docs);
        assert_eq!(report.page_duplications.total, 2);
        assert_eq!(report.page_duplications.consolidation_potential, 3);
        assert_eq!(report.usecase_duplications.total, 1);
        assert!(report.similar_names.is_empty());
    }

    #[test]
    fn test_similarity_pass_reports_without_regrouping() {
        let docs = vec![
            usecase("pm", "a", "Submit Report"),
            usecase("pm", "b", "Submit the Report"),
        ];
        let analyzer = DuplicationAnalyzer::new().with_similarity(SimilarityPass::new(0.7));
        let report = analyzer.report(&docs);
        assert_eq!(report.usecase_duplications.total, 0);
        assert_eq!(report.similar_names.len(), 1);
        assert!(report.similar_names[0].score >= 0.7);
    }

    #[test]
    fn test_dice_coefficient() {
        assert_eq!(dice_coefficient("abc", "abc"), 1.0);
        assert_eq!(dice_coefficient("ab", "cd"), 0.0);
        assert_eq!(dice_coefficient("a", "b"), 0.0);
        let score = dice_coefficient("成果物提出", "成果物の提出");
        assert!(score > 0.5 && score < 1.0);
    }

    #[test]
    fn test_strategy_names_round_trip() {
        for strategy in MergeStrategy::ALL {
            assert_eq!(MergeStrategy::from_name(strategy.as_str()), Some(strategy));
            let json = serde_json::to_string(&strategy).unwrap();
            assert_eq!(json, format!("\"{}\"", strategy.as_str()));
        }
    }
}
