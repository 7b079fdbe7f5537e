//! 诊疗指引组装
//!
//! 疾病键匹配规则：指引键与查询键完全相同，或以查询键为前缀（三码类别可以匹配更细的键）。
//! 多个指引匹配时取装载顺序中的第一个，不做其他消歧。

use crate::pathway::{ClinicalPathway, PathwayRules};
use medref_core::models::*;
use medref_core::utils::contains_keyword;
use medref_core::{NotFound, Resolved, Result};
use medref_store::{ReferenceSnapshot, ReferenceStore};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

/// 完整指引：主信息加四个子集合
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompleteGuideline {
    pub guideline_info: GuidelineHeader,
    pub diagnostic_recommendations: Vec<DiagnosticStep>,
    pub medication_recommendations: Vec<MedicationRecommendation>,
    pub test_recommendations: Vec<TestRecommendation>,
    pub treatment_goals: Vec<TreatmentGoal>,
}

impl CompleteGuideline {
    /// 诊断按步骤、用药按治疗线、检查按类别、目标按类型排序（稳定排序）
    pub fn from_bundle(bundle: &GuidelineBundle) -> Self {
        let mut diagnostics = bundle.diagnostics.clone();
        diagnostics.sort_by_key(|d| d.step_order);

        Self {
            guideline_info: bundle.header.clone(),
            diagnostic_recommendations: diagnostics,
            medication_recommendations: sorted_medications(bundle),
            test_recommendations: sorted_tests(bundle),
            treatment_goals: sorted_goals(bundle),
        }
    }
}

fn sorted_medications(bundle: &GuidelineBundle) -> Vec<MedicationRecommendation> {
    let mut medications = bundle.medications.clone();
    medications.sort_by(|a, b| a.line_of_therapy.cmp(&b.line_of_therapy));
    medications
}

fn sorted_tests(bundle: &GuidelineBundle) -> Vec<TestRecommendation> {
    let mut tests = bundle.tests.clone();
    tests.sort_by(|a, b| a.category.cmp(&b.category));
    tests
}

fn sorted_goals(bundle: &GuidelineBundle) -> Vec<TreatmentGoal> {
    let mut goals = bundle.goals.clone();
    goals.sort_by(|a, b| a.goal_type.cmp(&b.goal_type));
    goals
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MedicationList {
    pub disease_key: String,
    pub total_recommendations: usize,
    pub medications: Vec<MedicationRecommendation>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestList {
    pub disease_key: String,
    pub total_recommendations: usize,
    pub tests: Vec<TestRecommendation>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GoalList {
    pub disease_key: String,
    pub total_goals: usize,
    pub goals: Vec<TreatmentGoal>,
}

/// 指引搜索结果中的一条
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GuidelineSummary {
    pub bundle_id: Uuid,
    pub disease_key: String,
    pub disease_name_zh: String,
    pub disease_name_en: String,
    pub title: String,
    pub source: String,
    pub year: Option<i32>,
}

impl From<&GuidelineBundle> for GuidelineSummary {
    fn from(bundle: &GuidelineBundle) -> Self {
        let header = &bundle.header;
        Self {
            bundle_id: bundle.bundle_id,
            disease_key: header.disease_key.clone(),
            disease_name_zh: header.disease_name_zh.clone(),
            disease_name_en: header.disease_name_en.clone(),
            title: header.title.clone(),
            source: header.source.clone(),
            year: header.year,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GuidelineSearch {
    pub keyword: String,
    pub total_found: usize,
    pub guidelines: Vec<GuidelineSummary>,
}

/// 诊疗指引组装器
#[derive(Debug, Clone)]
pub struct GuidelineAssembler {
    store: ReferenceStore,
    rules: PathwayRules,
}

impl GuidelineAssembler {
    pub fn new(store: ReferenceStore) -> Self {
        Self::with_rules(store, PathwayRules::default())
    }

    pub fn with_rules(store: ReferenceStore, rules: PathwayRules) -> Self {
        Self { store, rules }
    }

    /// 按疾病键取指引
    pub fn get_bundle(&self, disease_key: &str) -> Result<Resolved<GuidelineBundle>> {
        let disease_key = disease_key.trim();
        let snapshot = self.store.snapshot()?;
        Ok(match first_bundle(&snapshot, disease_key) {
            Some(bundle) => Resolved::Found(bundle.clone()),
            None => Resolved::NotFound(guideline_not_found(disease_key)),
        })
    }

    /// 完整指引
    pub fn complete_guideline(&self, disease_key: &str) -> Result<Resolved<CompleteGuideline>> {
        let disease_key = disease_key.trim();
        let snapshot = self.store.snapshot()?;
        Ok(match first_bundle(&snapshot, disease_key) {
            Some(bundle) => Resolved::Found(CompleteGuideline::from_bundle(bundle)),
            None => Resolved::NotFound(guideline_not_found(disease_key)),
        })
    }

    /// 临床路径建议
    pub fn suggest_pathway(
        &self,
        disease_key: &str,
        patient_context: Option<Map<String, Value>>,
    ) -> Result<Resolved<ClinicalPathway>> {
        let guideline = self.complete_guideline(disease_key)?;
        Ok(guideline.map(|g| self.rules.build_pathway(&g, patient_context)))
    }

    pub fn medication_recommendations(&self, disease_key: &str) -> Result<Resolved<MedicationList>> {
        let disease_key = disease_key.trim();
        let snapshot = self.store.snapshot()?;
        let medications = first_bundle(&snapshot, disease_key)
            .map(sorted_medications)
            .unwrap_or_default();

        if medications.is_empty() {
            return Ok(Resolved::NotFound(NotFound::new(
                disease_key,
                format!("找不到 ICD 碼 '{}' 的用藥建議", disease_key),
            )));
        }
        Ok(Resolved::Found(MedicationList {
            disease_key: disease_key.to_string(),
            total_recommendations: medications.len(),
            medications,
        }))
    }

    pub fn test_recommendations(&self, disease_key: &str) -> Result<Resolved<TestList>> {
        let disease_key = disease_key.trim();
        let snapshot = self.store.snapshot()?;
        let tests = first_bundle(&snapshot, disease_key)
            .map(sorted_tests)
            .unwrap_or_default();

        if tests.is_empty() {
            return Ok(Resolved::NotFound(NotFound::new(
                disease_key,
                format!("找不到 ICD 碼 '{}' 的檢查建議", disease_key),
            )));
        }
        Ok(Resolved::Found(TestList {
            disease_key: disease_key.to_string(),
            total_recommendations: tests.len(),
            tests,
        }))
    }

    pub fn treatment_goals(&self, disease_key: &str) -> Result<Resolved<GoalList>> {
        let disease_key = disease_key.trim();
        let snapshot = self.store.snapshot()?;
        let goals = first_bundle(&snapshot, disease_key)
            .map(sorted_goals)
            .unwrap_or_default();

        if goals.is_empty() {
            return Ok(Resolved::NotFound(NotFound::new(
                disease_key,
                format!("找不到 ICD 碼 '{}' 的治療目標", disease_key),
            )));
        }
        Ok(Resolved::Found(GoalList {
            disease_key: disease_key.to_string(),
            total_goals: goals.len(),
            goals,
        }))
    }

    /// 按疾病键或中英文名称搜索指引，出版年份新者在前，无年份者排最后
    pub fn search_guidelines(&self, keyword: &str) -> Result<Resolved<GuidelineSearch>> {
        let keyword = keyword.trim();
        let snapshot = self.store.snapshot()?;

        let mut guidelines: Vec<GuidelineSummary> = snapshot
            .bundles()
            .iter()
            .filter(|b| {
                contains_keyword(&b.header.disease_key, keyword)
                    || contains_keyword(&b.header.disease_name_zh, keyword)
                    || contains_keyword(&b.header.disease_name_en, keyword)
            })
            .map(GuidelineSummary::from)
            .collect();
        guidelines.sort_by(|a, b| b.year.cmp(&a.year));

        if guidelines.is_empty() {
            return Ok(Resolved::NotFound(
                NotFound::new(keyword, format!("找不到符合 '{}' 的診療指引", keyword))
                    .with_suggestion("請使用疾病中文名稱或 ICD-10 編碼搜尋"),
            ));
        }

        Ok(Resolved::Found(GuidelineSearch {
            keyword: keyword.to_string(),
            total_found: guidelines.len(),
            guidelines,
        }))
    }
}

fn first_bundle<'a>(snapshot: &'a ReferenceSnapshot, disease_key: &str) -> Option<&'a GuidelineBundle> {
    let matches = snapshot.get_bundle_by_key(disease_key);
    if matches.len() > 1 {
        debug!(
            "Guideline key {} is ambiguous ({} matches), using first in load order",
            disease_key,
            matches.len()
        );
    }
    matches.into_iter().next()
}

fn guideline_not_found(disease_key: &str) -> NotFound {
    NotFound::new(disease_key, format!("找不到 ICD 碼 '{}' 的診療指引", disease_key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pathway::PathwayPhase;
    use medref_store::{SnapshotBuilder, SnapshotLoader};
    use serde_json::json;

    fn seed_assembler() -> GuidelineAssembler {
        GuidelineAssembler::new(ReferenceStore::open(&SnapshotLoader::builtin()).unwrap())
    }

    fn bundle(key: &str, title: &str, year: Option<i32>) -> GuidelineBundle {
        GuidelineBundle {
            bundle_id: Uuid::new_v4(),
            header: GuidelineHeader {
                disease_key: key.to_string(),
                disease_name_zh: format!("疾病 {}", key),
                disease_name_en: format!("Disease {}", key),
                title: title.to_string(),
                source: String::new(),
                year,
                summary: String::new(),
            },
            diagnostics: Vec::new(),
            medications: Vec::new(),
            tests: Vec::new(),
            goals: Vec::new(),
        }
    }

    #[test]
    fn test_prefix_match_first_in_load_order() {
        let store = ReferenceStore::new(
            SnapshotBuilder::new()
                .bundles(vec![
                    bundle("E11.9", "first", Some(2020)),
                    bundle("E11", "second", Some(2024)),
                ])
                .build(1),
        );
        let assembler = GuidelineAssembler::new(store);

        let found = assembler.get_bundle("E11").unwrap().found().unwrap();
        assert_eq!(found.header.title, "first");

        let exact = assembler.get_bundle("E11.9").unwrap().found().unwrap();
        assert_eq!(exact.header.title, "first");

        assert!(!assembler.get_bundle("E12").unwrap().is_found());
    }

    #[test]
    fn test_complete_guideline_orders_children() {
        let guideline = seed_assembler().complete_guideline("E11").unwrap().found().unwrap();

        assert_eq!(guideline.guideline_info.disease_key, "E11");
        let steps: Vec<_> = guideline.diagnostic_recommendations.iter().map(|d| d.step_order).collect();
        assert_eq!(steps, vec![1, 2, 3]);
        assert!(guideline
            .medication_recommendations
            .windows(2)
            .all(|w| w[0].line_of_therapy <= w[1].line_of_therapy));
        assert!(guideline.test_recommendations.windows(2).all(|w| w[0].category <= w[1].category));
        assert!(guideline.treatment_goals.windows(2).all(|w| w[0].goal_type <= w[1].goal_type));
    }

    #[test]
    fn test_missing_guideline_is_not_found() {
        let assembler = seed_assembler();
        match assembler.complete_guideline("Z99").unwrap() {
            Resolved::NotFound(nf) => {
                assert_eq!(nf.query, "Z99");
                assert!(nf.message.contains("Z99"));
            }
            Resolved::Found(_) => panic!("expected not found"),
        }
        assert!(!assembler.suggest_pathway("Z99", None).unwrap().is_found());
        assert!(!assembler.medication_recommendations("Z99").unwrap().is_found());
    }

    #[test]
    fn test_seed_pathway_for_diabetes() {
        let context = json!({"age": 58, "sex": "male"});
        let pathway = seed_assembler()
            .suggest_pathway("E11", context.as_object().cloned())
            .unwrap()
            .found()
            .unwrap();

        assert_eq!(pathway.disease, "第二型糖尿病");
        assert_eq!(pathway.guideline_year, Some(2024));
        assert_eq!(pathway.actions(PathwayPhase::Diagnosis).len(), 3);
        assert_eq!(
            pathway.actions(PathwayPhase::TreatmentInitiation).to_vec(),
            vec!["雙胍類 (Biguanide) (e.g., Metformin)".to_string()]
        );
        assert_eq!(pathway.actions(PathwayPhase::Monitoring).to_vec(), vec!["空腹血糖 — 每次回診".to_string()]);
        assert!(pathway.note.is_some());
    }

    #[test]
    fn test_sub_queries() {
        let assembler = seed_assembler();

        let meds = assembler.medication_recommendations("I10").unwrap().found().unwrap();
        assert_eq!(meds.total_recommendations, 5);
        assert_eq!(meds.medications[0].line_of_therapy, "第一線");

        let tests = assembler.test_recommendations("E78").unwrap().found().unwrap();
        assert_eq!(tests.total_recommendations, 1);
        assert_eq!(tests.tests[0].test_id.as_deref(), Some("2093-3"));

        let goals = assembler.treatment_goals("E78").unwrap().found().unwrap();
        assert_eq!(goals.total_goals, 3);
    }

    #[test]
    fn test_search_guidelines_newest_first() {
        let assembler = seed_assembler();

        let all = assembler.search_guidelines("").unwrap().found().unwrap();
        let keys: Vec<_> = all.guidelines.iter().map(|g| g.disease_key.as_str()).collect();
        assert_eq!(keys, vec!["E11", "E78", "I10"]);

        let diabetes = assembler.search_guidelines("diabetes").unwrap().found().unwrap();
        assert_eq!(diabetes.total_found, 1);

        match assembler.search_guidelines("痛風").unwrap() {
            Resolved::NotFound(nf) => assert!(nf.suggestion.is_some()),
            Resolved::Found(_) => panic!("expected not found"),
        }
    }
}
