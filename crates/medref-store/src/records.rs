//! 快照文件的行模型
//!
//! 文件中的行结构与领域模型分离，转换时补齐派生字段和归属关系。

use medref_core::models::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// diagnoses.json / procedures.json 中的一行
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeRecord {
    pub code: String,
    #[serde(default)]
    pub name_en: String,
    #[serde(default)]
    pub name_zh: String,
    /// 文件中可能带有类别列，但不被采信，始终由编码重新推导
    #[serde(default)]
    pub category: Option<String>,
}

impl From<CodeRecord> for DiagnosisCode {
    fn from(record: CodeRecord) -> Self {
        DiagnosisCode::new(record.code.trim(), record.name_en, record.name_zh)
    }
}

impl From<CodeRecord> for ProcedureCode {
    fn from(record: CodeRecord) -> Self {
        ProcedureCode::new(record.code.trim(), record.name_en, record.name_zh)
    }
}

/// lab_tests.json 中的一行
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabTestRecord {
    #[serde(alias = "loinc_code")]
    pub test_id: String,
    #[serde(alias = "loinc_name_en")]
    pub name_en: String,
    #[serde(alias = "loinc_name_zh")]
    pub name_zh: String,
    #[serde(default, alias = "common_name_zh")]
    pub common_alias: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub specimen_type: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub method: String,
}

impl From<LabTestRecord> for LabTestDefinition {
    fn from(record: LabTestRecord) -> Self {
        LabTestDefinition {
            test_id: record.test_id.trim().to_string(),
            name_en: record.name_en,
            name_zh: record.name_zh,
            common_alias: record.common_alias,
            category: record.category,
            specimen_type: record.specimen_type,
            unit: record.unit,
            method: record.method,
        }
    }
}

/// reference_bands.json 中的一行
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceBandRecord {
    #[serde(alias = "loinc_code")]
    pub test_id: String,
    pub age_min: u32,
    pub age_max: u32,
    #[serde(alias = "gender")]
    pub sex: Sex,
    #[serde(alias = "range_low")]
    pub low: f64,
    #[serde(alias = "range_high")]
    pub high: f64,
    #[serde(default)]
    pub unit: String,
    #[serde(default, alias = "interpretation")]
    pub note: String,
}

impl From<ReferenceBandRecord> for ReferenceBand {
    fn from(record: ReferenceBandRecord) -> Self {
        ReferenceBand {
            test_id: record.test_id.trim().to_string(),
            age_min: record.age_min,
            age_max: record.age_max,
            sex: record.sex,
            low: record.low,
            high: record.high,
            unit: record.unit,
            note: record.note,
        }
    }
}

/// guidelines.json 中的一个指引（主信息与四个子表嵌套存放）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuidelineRecord {
    #[serde(alias = "icd_code")]
    pub disease_key: String,
    pub disease_name_zh: String,
    #[serde(default)]
    pub disease_name_en: String,
    #[serde(alias = "guideline_title")]
    pub title: String,
    #[serde(default, alias = "guideline_source")]
    pub source: String,
    #[serde(default, alias = "publication_year")]
    pub year: Option<i32>,
    #[serde(default, alias = "guideline_summary")]
    pub summary: String,
    #[serde(default)]
    pub diagnostics: Vec<DiagnosticStepRecord>,
    #[serde(default)]
    pub medications: Vec<MedicationRecord>,
    #[serde(default)]
    pub tests: Vec<TestRecommendationRecord>,
    #[serde(default)]
    pub goals: Vec<TreatmentGoalRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticStepRecord {
    pub step_order: i32,
    #[serde(default)]
    pub recommendation_type: String,
    pub description: String,
    #[serde(default)]
    pub evidence_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicationRecord {
    pub line_of_therapy: String,
    #[serde(alias = "medication_class")]
    pub drug_class: String,
    #[serde(default, alias = "medication_examples")]
    pub examples: String,
    #[serde(default, alias = "dosage_guidance")]
    pub dosage: String,
    #[serde(default)]
    pub contraindications: String,
    #[serde(default)]
    pub evidence_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestRecommendationRecord {
    #[serde(default, alias = "test_category")]
    pub category: String,
    pub test_name: String,
    #[serde(default, alias = "loinc_code")]
    pub test_id: Option<String>,
    #[serde(default)]
    pub frequency: String,
    #[serde(default, alias = "indication")]
    pub indication_text: String,
    #[serde(default)]
    pub evidence_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreatmentGoalRecord {
    #[serde(default)]
    pub goal_type: String,
    #[serde(alias = "target_parameter")]
    pub parameter: String,
    pub target_value: String,
    #[serde(default)]
    pub timeframe: String,
}

impl GuidelineRecord {
    /// 转换为指引，分配新的 bundle id 并让所有子记录指向它
    pub fn into_bundle(self) -> GuidelineBundle {
        let bundle_id = Uuid::new_v4();

        let mut diagnostics: Vec<DiagnosticStep> = self
            .diagnostics
            .into_iter()
            .map(|d| DiagnosticStep {
                bundle_id,
                step_order: d.step_order,
                recommendation_type: d.recommendation_type,
                description: d.description,
                evidence_level: d.evidence_level,
            })
            .collect();
        diagnostics.sort_by_key(|d| d.step_order);

        let medications = self
            .medications
            .into_iter()
            .map(|m| MedicationRecommendation {
                bundle_id,
                line_of_therapy: m.line_of_therapy,
                drug_class: m.drug_class,
                examples: m.examples,
                dosage: m.dosage,
                contraindications: m.contraindications,
                evidence_level: m.evidence_level,
            })
            .collect();

        let tests = self
            .tests
            .into_iter()
            .map(|t| TestRecommendation {
                bundle_id,
                category: t.category,
                test_name: t.test_name,
                test_id: t.test_id.filter(|id| !id.trim().is_empty()),
                frequency: t.frequency,
                indication_text: t.indication_text,
                evidence_level: t.evidence_level,
            })
            .collect();

        let goals = self
            .goals
            .into_iter()
            .map(|g| TreatmentGoal {
                bundle_id,
                goal_type: g.goal_type,
                parameter: g.parameter,
                target_value: g.target_value,
                timeframe: g.timeframe,
            })
            .collect();

        GuidelineBundle {
            bundle_id,
            header: GuidelineHeader {
                disease_key: self.disease_key.trim().to_string(),
                disease_name_zh: self.disease_name_zh,
                disease_name_en: self.disease_name_en,
                title: self.title,
                source: self.source,
                year: self.year,
                summary: self.summary,
            },
            diagnostics,
            medications,
            tests,
            goals,
        }
    }
}
