//! 核心数据模型定义

use crate::error::MedrefError;
use crate::utils::icd_category;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// 带编码的条目（诊断码、处置码），编码表按字典序组织
pub trait CodedEntry {
    fn code(&self) -> &str;
    fn name_en(&self) -> &str;
    fn name_zh(&self) -> &str;
}

/// ICD-10 诊断编码
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiagnosisCode {
    pub code: String,     // 例如 E11.9
    pub name_en: String,
    pub name_zh: String,
    pub category: String, // 派生字段: 编码前3个字符
}

impl DiagnosisCode {
    /// 创建诊断编码，类别由编码推导
    pub fn new(code: impl Into<String>, name_en: impl Into<String>, name_zh: impl Into<String>) -> Self {
        let code = code.into();
        let category = icd_category(&code).to_string();
        Self {
            code,
            name_en: name_en.into(),
            name_zh: name_zh.into(),
            category,
        }
    }
}

impl CodedEntry for DiagnosisCode {
    fn code(&self) -> &str {
        &self.code
    }
    fn name_en(&self) -> &str {
        &self.name_en
    }
    fn name_zh(&self) -> &str {
        &self.name_zh
    }
}

/// ICD-10-PCS 处置编码
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcedureCode {
    pub code: String,
    pub name_en: String,
    pub name_zh: String,
}

impl ProcedureCode {
    pub fn new(code: impl Into<String>, name_en: impl Into<String>, name_zh: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name_en: name_en.into(),
            name_zh: name_zh.into(),
        }
    }
}

impl CodedEntry for ProcedureCode {
    fn code(&self) -> &str {
        &self.code
    }
    fn name_en(&self) -> &str {
        &self.name_en
    }
    fn name_zh(&self) -> &str {
        &self.name_zh
    }
}

/// 性别
///
/// 参考值区间上的 `Any` 表示不分性别；查询时传入 `Any` 则只会匹配不分性别的区间。
///
/// 反序列化经由 [`FromStr`]，接受 `M`/`F`/`all` 以及中文写法。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Sex {
    Male,
    Female,
    Any,
}

impl Sex {
    /// 本地化标签
    pub fn label(&self) -> &'static str {
        match self {
            Sex::Male => "男性",
            Sex::Female => "女性",
            Sex::Any => "不分性別",
        }
    }

    /// 区间的性别是否适用于所请求的性别
    pub fn applies_to(&self, requested: Sex) -> bool {
        *self == requested || *self == Sex::Any
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sex::Male => write!(f, "male"),
            Sex::Female => write!(f, "female"),
            Sex::Any => write!(f, "any"),
        }
    }
}

impl FromStr for Sex {
    type Err = MedrefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "male" | "m" | "男" | "男性" => Ok(Sex::Male),
            "female" | "f" | "女" | "女性" => Ok(Sex::Female),
            "any" | "all" | "" => Ok(Sex::Any),
            other => Err(MedrefError::Validation(format!("unknown sex: {}", other))),
        }
    }
}

impl TryFrom<String> for Sex {
    type Error = MedrefError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// 检验项目定义 (LOINC 对照)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabTestDefinition {
    pub test_id: String,      // LOINC 码
    pub name_en: String,
    pub name_zh: String,
    pub common_alias: String, // 常用缩写, 例如 "HbA1c"
    pub category: String,
    pub specimen_type: String,
    pub unit: String,
    pub method: String,
}

/// 检验参考值区间
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReferenceBand {
    pub test_id: String,
    pub age_min: u32, // 含
    pub age_max: u32, // 含
    pub sex: Sex,
    pub low: f64,
    pub high: f64, // 可能是哨兵值 (如 999) 表示无上限
    pub unit: String,
    pub note: String,
}

impl ReferenceBand {
    /// 年龄是否落在区间内（闭区间）
    pub fn covers_age(&self, age: u32) -> bool {
        self.age_min <= age && age <= self.age_max
    }

    /// 适用年龄描述
    pub fn age_span_label(&self) -> String {
        format!("{}-{} 歲", self.age_min, self.age_max)
    }
}

/// 诊疗指引主信息
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GuidelineHeader {
    pub disease_key: String, // ICD 类别或编码前缀
    pub disease_name_zh: String,
    pub disease_name_en: String,
    pub title: String,
    pub source: String,
    pub year: Option<i32>,
    pub summary: String,
}

/// 诊断建议步骤
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiagnosticStep {
    pub bundle_id: Uuid,
    pub step_order: i32,
    pub recommendation_type: String,
    pub description: String,
    pub evidence_level: String,
}

/// 用药建议
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MedicationRecommendation {
    pub bundle_id: Uuid,
    pub line_of_therapy: String, // 第一线 / 第二线 / 辅助治疗 ...
    pub drug_class: String,
    pub examples: String,
    pub dosage: String,
    pub contraindications: String,
    pub evidence_level: String,
}

/// 检查建议
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestRecommendation {
    pub bundle_id: Uuid,
    pub category: String,
    pub test_name: String,
    pub test_id: Option<String>,
    pub frequency: String,
    pub indication_text: String,
    pub evidence_level: String,
}

/// 治疗目标
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TreatmentGoal {
    pub bundle_id: Uuid,
    pub goal_type: String,
    pub parameter: String,
    pub target_value: String,
    pub timeframe: String,
}

/// 单一疾病的完整诊疗指引
///
/// 子集合通过 `bundle_id` 归属于主信息；指引只能整体重建，不做字段级修改。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GuidelineBundle {
    pub bundle_id: Uuid,
    pub header: GuidelineHeader,
    pub diagnostics: Vec<DiagnosticStep>,
    pub medications: Vec<MedicationRecommendation>,
    pub tests: Vec<TestRecommendation>,
    pub goals: Vec<TreatmentGoal>,
}

impl GuidelineBundle {
    /// 指引键是否匹配查询键（完全相同或以查询键为前缀）
    pub fn matches_key(&self, disease_key: &str) -> bool {
        self.header.disease_key.starts_with(disease_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnosis_category_derived() {
        let code = DiagnosisCode::new("E11.9", "Type 2 diabetes mellitus without complications", "第二型糖尿病，無併發症");
        assert_eq!(code.category, "E11");

        let short = DiagnosisCode::new("A0", "", "");
        assert_eq!(short.category, "A0");
    }

    #[test]
    fn test_sex_parsing() {
        assert_eq!("M".parse::<Sex>().unwrap(), Sex::Male);
        assert_eq!("female".parse::<Sex>().unwrap(), Sex::Female);
        assert_eq!("all".parse::<Sex>().unwrap(), Sex::Any);
        assert_eq!("any".parse::<Sex>().unwrap(), Sex::Any);
        assert!("unknown".parse::<Sex>().is_err());
    }

    #[test]
    fn test_sex_serde_aliases() {
        let sex: Sex = serde_json::from_str("\"all\"").unwrap();
        assert_eq!(sex, Sex::Any);
        let sex: Sex = serde_json::from_str("\"M\"").unwrap();
        assert_eq!(sex, Sex::Male);
        let sex: Sex = serde_json::from_str("\"女性\"").unwrap();
        assert_eq!(sex, Sex::Female);
        assert!(serde_json::from_str::<Sex>("\"x\"").is_err());
        assert_eq!(serde_json::to_string(&Sex::Female).unwrap(), "\"female\"");
    }

    #[test]
    fn test_sex_applies_to() {
        assert!(Sex::Any.applies_to(Sex::Male));
        assert!(Sex::Male.applies_to(Sex::Male));
        assert!(!Sex::Female.applies_to(Sex::Male));
        assert!(!Sex::Male.applies_to(Sex::Any));
    }

    #[test]
    fn test_band_covers_age_inclusive() {
        let band = ReferenceBand {
            test_id: "1558-6".to_string(),
            age_min: 18,
            age_max: 120,
            sex: Sex::Any,
            low: 70.0,
            high: 100.0,
            unit: "mg/dL".to_string(),
            note: "正常範圍".to_string(),
        };
        assert!(band.covers_age(18));
        assert!(band.covers_age(120));
        assert!(!band.covers_age(17));
        assert_eq!(band.age_span_label(), "18-120 歲");
    }
}
