//! 临床路径规则
//!
//! 检查建议与用药建议按文本关键字归入阶段。这是启发式的子串匹配，不做语义推断；
//! 关键字表集中放在 [`PathwayRules`] 中，可单独测试和替换。

use crate::guideline::CompleteGuideline;
use medref_core::models::*;
use medref_core::utils::contains_keyword;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 提供患者背景时附带的提示
pub const PATIENT_CONTEXT_NOTE: &str = "臨床路徑應根據個別患者情況調整";

/// 路径阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathwayPhase {
    Diagnosis,
    BaselineTests,
    TreatmentInitiation,
    Monitoring,
    Goals,
}

impl PathwayPhase {
    pub const ALL: [PathwayPhase; 5] = [
        PathwayPhase::Diagnosis,
        PathwayPhase::BaselineTests,
        PathwayPhase::TreatmentInitiation,
        PathwayPhase::Monitoring,
        PathwayPhase::Goals,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            PathwayPhase::Diagnosis => "診斷確認階段",
            PathwayPhase::BaselineTests => "基礎檢查階段",
            PathwayPhase::TreatmentInitiation => "治療啟始階段",
            PathwayPhase::Monitoring => "追蹤監測階段",
            PathwayPhase::Goals => "治療目標",
        }
    }
}

/// 关键字 → 阶段 规则表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathwayRules {
    /// 适应症包含任一关键字的检查归入基础检查
    pub baseline_keywords: Vec<String>,
    /// 治疗线完全等于任一标签的用药归入治疗启始
    pub first_line_labels: Vec<String>,
    /// 适应症包含任一关键字的检查归入追踪监测
    pub monitoring_keywords: Vec<String>,
}

impl Default for PathwayRules {
    fn default() -> Self {
        let owned = |words: &[&str]| -> Vec<String> { words.iter().map(|w| w.to_string()).collect() };
        Self {
            baseline_keywords: owned(&["診斷", "基礎", "diagnosis", "baseline"]),
            first_line_labels: owned(&["第一線", "first line"]),
            monitoring_keywords: owned(&["追蹤", "監測", "follow-up", "monitoring"]),
        }
    }
}

impl PathwayRules {
    pub fn is_baseline(&self, indication: &str) -> bool {
        self.baseline_keywords.iter().any(|kw| contains_keyword(indication, kw))
    }

    pub fn is_first_line(&self, line_of_therapy: &str) -> bool {
        let line = line_of_therapy.trim();
        self.first_line_labels.iter().any(|label| line.eq_ignore_ascii_case(label))
    }

    pub fn is_monitoring(&self, indication: &str) -> bool {
        self.monitoring_keywords.iter().any(|kw| contains_keyword(indication, kw))
    }

    /// 把指引重新分组为五个阶段
    ///
    /// 同一条检查可能同时出现在基础检查和追踪监测阶段。
    /// `patient_context` 原样附加到结果上，不参与任何筛选或排序。
    pub fn build_pathway(
        &self,
        guideline: &CompleteGuideline,
        patient_context: Option<Map<String, Value>>,
    ) -> ClinicalPathway {
        let steps = PathwayPhase::ALL
            .iter()
            .map(|&phase| PathwayStep {
                phase,
                label: phase.label().to_string(),
                actions: self.actions_for(phase, guideline),
            })
            .collect();

        let patient_context = patient_context.filter(|ctx| !ctx.is_empty());
        let note = patient_context.as_ref().map(|_| PATIENT_CONTEXT_NOTE.to_string());
        let header = &guideline.guideline_info;

        ClinicalPathway {
            disease: header.disease_name_zh.clone(),
            disease_key: header.disease_key.clone(),
            steps,
            guideline_source: header.source.clone(),
            guideline_year: header.year,
            patient_context,
            note,
        }
    }

    fn actions_for(&self, phase: PathwayPhase, guideline: &CompleteGuideline) -> Vec<String> {
        match phase {
            PathwayPhase::Diagnosis => guideline
                .diagnostic_recommendations
                .iter()
                .map(|d| d.description.clone())
                .collect(),
            PathwayPhase::BaselineTests => guideline
                .test_recommendations
                .iter()
                .filter(|t| self.is_baseline(&t.indication_text))
                .map(|t| format!("{} ({})", t.test_name, t.indication_text))
                .collect(),
            PathwayPhase::TreatmentInitiation => guideline
                .medication_recommendations
                .iter()
                .filter(|m| self.is_first_line(&m.line_of_therapy))
                .map(format_medication)
                .collect(),
            PathwayPhase::Monitoring => guideline
                .test_recommendations
                .iter()
                .filter(|t| self.is_monitoring(&t.indication_text))
                .map(|t| format!("{} — {}", t.test_name, t.frequency))
                .collect(),
            PathwayPhase::Goals => guideline
                .treatment_goals
                .iter()
                .map(|g| format!("{}: {}", g.parameter, g.target_value))
                .collect(),
        }
    }
}

fn format_medication(med: &MedicationRecommendation) -> String {
    format!("{} (e.g., {})", med.drug_class, med.examples)
}

/// 路径中的一个阶段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathwayStep {
    pub phase: PathwayPhase,
    pub label: String,
    pub actions: Vec<String>,
}

/// 临床路径
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicalPathway {
    pub disease: String,
    pub disease_key: String,
    pub steps: Vec<PathwayStep>,
    pub guideline_source: String,
    pub guideline_year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_context: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl ClinicalPathway {
    pub fn step(&self, phase: PathwayPhase) -> Option<&PathwayStep> {
        self.steps.iter().find(|s| s.phase == phase)
    }

    pub fn actions(&self, phase: PathwayPhase) -> &[String] {
        self.step(phase).map(|s| s.actions.as_slice()).unwrap_or(&[])
    }
}
