//! ICD-10 编码层级解析
//!
//! 编码之间的上下级与相邻关系完全基于字符串字典序，而不是真正的 ICD 层级语义，
//! 因此 `"E11.9"` 排在 `"E2"` 之前。

use medref_core::models::*;
use medref_core::utils::sibling_category;
use medref_core::{MedrefError, NotFound, Resolved, Result};
use medref_store::ReferenceStore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// 各类查询的返回条数上限
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyLimits {
    pub specializations: usize,
    pub siblings: usize,
    pub neighbors: usize,
    pub search: usize,
}

impl Default for HierarchyLimits {
    fn default() -> Self {
        Self {
            specializations: 15,
            siblings: 10,
            neighbors: 2,
            search: 10,
        }
    }
}

/// 编码摘要
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CodeSummary {
    pub code: String,
    pub name_zh: String,
    pub name_en: String,
}

impl CodeSummary {
    fn of<T: CodedEntry>(entry: &T) -> Self {
        Self {
            code: entry.code().to_string(),
            name_zh: entry.name_zh().to_string(),
            name_en: entry.name_en().to_string(),
        }
    }
}

/// 下级编码或同类编码，两者互斥
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "tier", rename_all = "snake_case")]
pub enum RelatedCodes {
    /// 以查询编码为前缀的更细编码
    Specializations {
        base_code: String,
        message: String,
        codes: Vec<CodeSummary>,
    },
    /// 没有更细编码时，同一类别下的其他编码
    Siblings {
        base_code: String,
        category: String,
        message: String,
        codes: Vec<CodeSummary>,
    },
}

impl RelatedCodes {
    pub fn codes(&self) -> &[CodeSummary] {
        match self {
            RelatedCodes::Specializations { codes, .. } | RelatedCodes::Siblings { codes, .. } => codes,
        }
    }
}

/// 相邻方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    Prev,
    Next,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NearbyCode {
    pub code: String,
    pub name_zh: String,
    pub relation: Relation,
}

/// 前后相邻编码，按编码升序合并
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NearbyCodes {
    pub target: String,
    pub nearby: Vec<NearbyCode>,
}

/// 诊断与处置并列对照
///
/// 是否存在冲突不在这里判断，交由外部（人工或模型）分析。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CrossReference {
    pub diagnosis: Resolved<DiagnosisCode>,
    pub procedure: Resolved<ProcedureCode>,
    pub instruction: String,
}

pub const CROSS_REFERENCE_INSTRUCTION: &str =
    "Analyze the above for potential contraindications or medical conflicts.";

/// 编码搜索范围
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum CodeKind {
    Diagnosis,
    Procedure,
    #[default]
    All,
}

impl CodeKind {
    fn includes_diagnoses(&self) -> bool {
        matches!(self, CodeKind::Diagnosis | CodeKind::All)
    }

    fn includes_procedures(&self) -> bool {
        matches!(self, CodeKind::Procedure | CodeKind::All)
    }
}

impl fmt::Display for CodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodeKind::Diagnosis => write!(f, "diagnosis"),
            CodeKind::Procedure => write!(f, "procedure"),
            CodeKind::All => write!(f, "all"),
        }
    }
}

impl FromStr for CodeKind {
    type Err = MedrefError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "diagnosis" => Ok(CodeKind::Diagnosis),
            "procedure" => Ok(CodeKind::Procedure),
            "all" | "" => Ok(CodeKind::All),
            other => Err(MedrefError::Validation(format!("unknown code kind: {}", other))),
        }
    }
}

impl TryFrom<String> for CodeKind {
    type Error = MedrefError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// 编码搜索结果；未搜索的表不输出
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CodeSearch {
    pub keyword: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnoses: Option<Vec<CodeSummary>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub procedures: Option<Vec<CodeSummary>>,
}

/// 编码层级解析器
#[derive(Debug, Clone)]
pub struct CodeHierarchyResolver {
    store: ReferenceStore,
    limits: HierarchyLimits,
}

impl CodeHierarchyResolver {
    pub fn new(store: ReferenceStore) -> Self {
        Self::with_limits(store, HierarchyLimits::default())
    }

    pub fn with_limits(store: ReferenceStore, limits: HierarchyLimits) -> Self {
        Self { store, limits }
    }

    /// 查找下级编码；没有下级时退回到同类编码
    pub fn find_children_or_siblings(&self, code: &str) -> Result<RelatedCodes> {
        let code = code.trim();
        let snapshot = self.store.snapshot()?;

        let children: Vec<CodeSummary> = snapshot
            .diagnoses
            .get_by_prefix(code)
            .iter()
            .filter(|d| d.code != code)
            .take(self.limits.specializations)
            .map(CodeSummary::of)
            .collect();

        if !children.is_empty() {
            debug!("Code {} has {} specializations", code, children.len());
            return Ok(RelatedCodes::Specializations {
                base_code: code.to_string(),
                message: format!("Specializations of {}", code),
                codes: children,
            });
        }

        let category = sibling_category(code);
        let siblings: Vec<CodeSummary> = snapshot
            .diagnoses
            .get_by_category(category)
            .into_iter()
            .filter(|d| d.code != code)
            .take(self.limits.siblings)
            .map(CodeSummary::of)
            .collect();

        debug!("Code {} falls back to {} siblings in {}", code, siblings.len(), category);
        Ok(RelatedCodes::Siblings {
            base_code: code.to_string(),
            category: category.to_string(),
            message: format!(
                "Code {} is specific. Showing related codes in category {}:",
                code, category
            ),
            codes: siblings,
        })
    }

    /// 字典序上紧邻的前后编码
    pub fn find_nearby(&self, code: &str) -> Result<NearbyCodes> {
        let code = code.trim();
        let snapshot = self.store.snapshot()?;
        let limit = self.limits.neighbors;

        let prev = snapshot.diagnoses.before(code, limit).iter().map(|d| (d, Relation::Prev));
        let next = snapshot.diagnoses.after(code, limit).iter().map(|d| (d, Relation::Next));

        // before 与 after 均为升序且互不重叠，直接拼接即为有序
        let nearby = prev
            .chain(next)
            .map(|(d, relation)| NearbyCode {
                code: d.code.clone(),
                name_zh: d.name_zh.clone(),
                relation,
            })
            .collect();

        Ok(NearbyCodes {
            target: code.to_string(),
            nearby,
        })
    }

    /// 并列返回诊断码与处置码的定义
    pub fn cross_reference(&self, diagnosis_code: &str, procedure_code: &str) -> Result<CrossReference> {
        let diagnosis_code = diagnosis_code.trim();
        let procedure_code = procedure_code.trim();
        let snapshot = self.store.snapshot()?;

        let diagnosis = match snapshot.diagnoses.get_by_code(diagnosis_code) {
            Some(d) => Resolved::Found(d.clone()),
            None => Resolved::NotFound(NotFound::new(diagnosis_code, "Diagnosis not found")),
        };
        let procedure = match snapshot.procedures.get_by_code(procedure_code) {
            Some(p) => Resolved::Found(p.clone()),
            None => Resolved::NotFound(NotFound::new(procedure_code, "Procedure not found")),
        };

        Ok(CrossReference {
            diagnosis,
            procedure,
            instruction: CROSS_REFERENCE_INSTRUCTION.to_string(),
        })
    }

    /// 关键字搜索诊断码 / 处置码
    pub fn search_codes(&self, keyword: &str, kind: CodeKind) -> Result<Resolved<CodeSearch>> {
        let keyword = keyword.trim();
        let snapshot = self.store.snapshot()?;
        let limit = self.limits.search;
        debug!("Searching {} codes for '{}'", kind, keyword);

        let diagnoses = kind.includes_diagnoses().then(|| {
            snapshot
                .diagnoses
                .search(keyword, limit)
                .into_iter()
                .map(CodeSummary::of)
                .collect::<Vec<_>>()
        });
        let procedures = kind.includes_procedures().then(|| {
            snapshot
                .procedures
                .search(keyword, limit)
                .into_iter()
                .map(CodeSummary::of)
                .collect::<Vec<_>>()
        });

        let empty = diagnoses.as_ref().map_or(true, Vec::is_empty)
            && procedures.as_ref().map_or(true, Vec::is_empty);
        if empty {
            return Ok(Resolved::NotFound(
                NotFound::new(keyword, format!("No results found for '{}'.", keyword))
                    .with_suggestion("Try a code prefix or a Chinese/English disease name"),
            ));
        }

        Ok(Resolved::Found(CodeSearch {
            keyword: keyword.to_string(),
            diagnoses,
            procedures,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medref_store::SnapshotBuilder;
    use proptest::prelude::*;

    fn store_with(codes: &[&str]) -> ReferenceStore {
        let snapshot = SnapshotBuilder::new()
            .diagnoses(codes.iter().map(|c| DiagnosisCode::new(*c, format!("en {}", c), format!("中 {}", c))))
            .procedures(vec![
                ProcedureCode::new("0DTJ4ZZ", "Resection of Appendix, Percutaneous Endoscopic Approach", "闌尾切除術"),
                ProcedureCode::new("5A1D70Z", "Performance of Urinary Filtration, Intermittent", "血液透析"),
            ])
            .build(1);
        ReferenceStore::new(snapshot)
    }

    fn codes_of(related: &RelatedCodes) -> Vec<&str> {
        related.codes().iter().map(|c| c.code.as_str()).collect()
    }

    #[test]
    fn test_e11_returns_specializations() {
        let resolver = CodeHierarchyResolver::new(store_with(&["E11.9", "E11.2", "I10"]));
        let related = resolver.find_children_or_siblings("E11").unwrap();

        assert!(matches!(related, RelatedCodes::Specializations { .. }));
        assert_eq!(codes_of(&related), vec!["E11.2", "E11.9"]);
    }

    #[test]
    fn test_specific_code_falls_back_to_siblings() {
        let resolver = CodeHierarchyResolver::new(store_with(&["E11", "E11.2", "E11.9", "E119", "I10"]));
        let related = resolver.find_children_or_siblings("E11.9").unwrap();

        match &related {
            RelatedCodes::Siblings { category, message, .. } => {
                assert_eq!(category, "E11");
                assert!(message.contains("category E11"));
            }
            other => panic!("expected siblings, got {:?}", other),
        }
        assert_eq!(codes_of(&related), vec!["E11", "E11.2", "E119"]);
    }

    #[test]
    fn test_unknown_code_yields_empty_siblings() {
        let resolver = CodeHierarchyResolver::new(store_with(&["E11.9", "I10"]));
        let related = resolver.find_children_or_siblings("Z99.9").unwrap();
        assert!(matches!(related, RelatedCodes::Siblings { .. }));
        assert!(related.codes().is_empty());
    }

    #[test]
    fn test_specialization_cap() {
        let codes: Vec<String> = (0..30).map(|i| format!("E11.{:02}", i)).collect();
        let refs: Vec<&str> = codes.iter().map(String::as_str).collect();
        let resolver = CodeHierarchyResolver::new(store_with(&refs));

        let related = resolver.find_children_or_siblings("E11").unwrap();
        assert_eq!(related.codes().len(), 15);
        assert_eq!(related.codes()[0].code, "E11.00");
    }

    #[test]
    fn test_nearby_keeps_string_order_quirk() {
        let resolver = CodeHierarchyResolver::new(store_with(&["E10", "E11", "E11.9", "E2", "E3", "I10"]));
        let nearby = resolver.find_nearby("E11.9").unwrap();

        let codes: Vec<_> = nearby.nearby.iter().map(|n| n.code.as_str()).collect();
        assert_eq!(codes, vec!["E10", "E11", "E2", "E3"]);
        assert_eq!(nearby.nearby[0].relation, Relation::Prev);
        assert_eq!(nearby.nearby[2].relation, Relation::Next);
    }

    #[test]
    fn test_unbounded_limits_return_whole_table() {
        let limits = HierarchyLimits {
            specializations: usize::MAX,
            siblings: usize::MAX,
            neighbors: usize::MAX,
            search: usize::MAX,
        };
        let resolver = CodeHierarchyResolver::with_limits(store_with(&["A00", "A01", "A02"]), limits);

        let nearby = resolver.find_nearby("A00").unwrap();
        let codes: Vec<_> = nearby.nearby.iter().map(|n| n.code.as_str()).collect();
        assert_eq!(codes, vec!["A01", "A02"]);

        let nearby = resolver.find_nearby("A02").unwrap();
        assert_eq!(nearby.nearby.len(), 2);
    }

    #[test]
    fn test_nearby_at_table_edge() {
        let resolver = CodeHierarchyResolver::new(store_with(&["A00", "A01", "A02"]));
        let nearby = resolver.find_nearby("A00").unwrap();
        assert!(nearby.nearby.iter().all(|n| n.relation == Relation::Next));
        assert_eq!(nearby.nearby.len(), 2);
    }

    #[test]
    fn test_cross_reference_marks_missing_side() {
        let resolver = CodeHierarchyResolver::new(store_with(&["K35.80"]));
        let xref = resolver.cross_reference("K35.80", "XXXXXXX").unwrap();

        assert!(xref.diagnosis.is_found());
        match &xref.procedure {
            Resolved::NotFound(nf) => {
                assert_eq!(nf.query, "XXXXXXX");
                assert_eq!(nf.message, "Procedure not found");
            }
            Resolved::Found(_) => panic!("procedure should be missing"),
        }
        assert_eq!(xref.instruction, CROSS_REFERENCE_INSTRUCTION);
    }

    #[test]
    fn test_search_codes_by_kind() {
        let resolver = CodeHierarchyResolver::new(store_with(&["E11.9", "I10"]));

        let result = resolver.search_codes("appendix", CodeKind::All).unwrap().found().unwrap();
        assert_eq!(result.diagnoses.as_deref().map(<[_]>::len), Some(0));
        assert_eq!(result.procedures.unwrap()[0].code, "0DTJ4ZZ");

        let result = resolver.search_codes("e11", CodeKind::Diagnosis).unwrap().found().unwrap();
        assert!(result.procedures.is_none());
        assert_eq!(result.diagnoses.unwrap().len(), 1);

        let missing = resolver.search_codes("appendix", CodeKind::Diagnosis).unwrap();
        assert!(!missing.is_found());
    }

    #[test]
    fn test_code_kind_parsing() {
        assert_eq!("Procedure".parse::<CodeKind>().unwrap(), CodeKind::Procedure);
        assert_eq!("".parse::<CodeKind>().unwrap(), CodeKind::All);
        assert!("drug".parse::<CodeKind>().is_err());

        let kind: CodeKind = serde_json::from_str("\"DIAGNOSIS\"").unwrap();
        assert_eq!(kind, CodeKind::Diagnosis);
        assert_eq!(kind.to_string(), "diagnosis");
        assert!(serde_json::from_str::<CodeKind>("\"drug\"").is_err());
    }

    fn code_strategy() -> impl Strategy<Value = String> {
        "[A-C][0-9]{1,2}(\\.[0-9]{1,2})?"
    }

    proptest! {
        #[test]
        fn prop_tiers_are_exclusive(
            table in proptest::collection::vec(code_strategy(), 0..40),
            query in code_strategy(),
        ) {
            let refs: Vec<&str> = table.iter().map(String::as_str).collect();
            let resolver = CodeHierarchyResolver::new(store_with(&refs));

            match resolver.find_children_or_siblings(&query).unwrap() {
                RelatedCodes::Specializations { codes, .. } => {
                    prop_assert!(!codes.is_empty());
                    for c in &codes {
                        prop_assert!(c.code.starts_with(&query));
                        prop_assert_ne!(&c.code, &query);
                    }
                }
                RelatedCodes::Siblings { codes, category, .. } => {
                    // 没有任何下级编码时才会走到同类查询
                    prop_assert!(!table.iter().any(|c| c.starts_with(&query) && c != &query));
                    for c in &codes {
                        prop_assert!(c.code.starts_with(&category));
                        prop_assert_ne!(&c.code, &query);
                    }
                }
            }
        }

        #[test]
        fn prop_nearby_bounded_and_sorted(
            table in proptest::collection::vec(code_strategy(), 0..40),
            query in code_strategy(),
        ) {
            let refs: Vec<&str> = table.iter().map(String::as_str).collect();
            let resolver = CodeHierarchyResolver::new(store_with(&refs));
            let nearby = resolver.find_nearby(&query).unwrap().nearby;

            let prev = nearby.iter().filter(|n| n.relation == Relation::Prev).count();
            let next = nearby.iter().filter(|n| n.relation == Relation::Next).count();
            prop_assert!(prev <= 2 && next <= 2);
            prop_assert!(nearby.windows(2).all(|w| w[0].code <= w[1].code));
        }
    }
}
