//! 检验参考值解析与结果判读
//!
//! 参考值选择规则：年龄落在区间内（闭区间），且区间性别与请求相同或为不分性别。
//! 多个候选时，性别完全相同者优先，其次 `age_min` 较大者（更具体的年龄段），
//! 再相同则取装载顺序中的第一个。

use medref_core::models::*;
use medref_core::utils::contains_keyword;
use medref_core::{NotFound, Resolved, Result};
use medref_store::{ReferenceSnapshot, ReferenceStore};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// 关键字搜索检验项目的返回上限
pub const LAB_SEARCH_LIMIT: usize = 20;

/// 检验项目身份信息
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestIdentity {
    pub test_id: String,
    pub name_zh: String,
    pub name_en: String,
    pub common_alias: String,
}

impl From<&LabTestDefinition> for TestIdentity {
    fn from(test: &LabTestDefinition) -> Self {
        Self {
            test_id: test.test_id.clone(),
            name_zh: test.name_zh.clone(),
            name_en: test.name_en.clone(),
            common_alias: test.common_alias.clone(),
        }
    }
}

/// 参考值区间
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BandRange {
    pub low: f64,
    pub high: f64,
    pub unit: String,
    pub note: String,
}

/// 适用对象
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Applicability {
    pub age_range: String,
    pub sex: String,
}

/// 选中的参考值
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolvedBand {
    pub test: TestIdentity,
    pub reference_range: BandRange,
    pub applicable_to: Applicability,
}

impl ResolvedBand {
    fn new(test: &LabTestDefinition, band: &ReferenceBand) -> Self {
        Self {
            test: TestIdentity::from(test),
            reference_range: BandRange {
                low: band.low,
                high: band.high,
                unit: band.unit.clone(),
                note: band.note.clone(),
            },
            applicable_to: Applicability {
                age_range: band.age_span_label(),
                sex: band.sex.label().to_string(),
            },
        }
    }
}

/// 检验项目存在，但没有适用于该年龄/性别的参考值
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NoApplicableRange {
    pub test: TestIdentity,
    pub unit: String,
    pub age: u32,
    pub sex: Sex,
    pub message: String,
}

/// 检验查询的三种终态
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LabOutcome<T> {
    Resolved(T),
    TestNotFound(NotFound),
    NoApplicableRange(NoApplicableRange),
}

impl<T> LabOutcome<T> {
    pub fn resolved(self) -> Option<T> {
        match self {
            LabOutcome::Resolved(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, LabOutcome::Resolved(_))
    }
}

/// 判读结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Low,
    Normal,
    High,
}

impl ResultStatus {
    /// 闭区间判读：恰好等于上下限视为正常
    pub fn classify(value: f64, low: f64, high: f64) -> Self {
        if value < low {
            ResultStatus::Low
        } else if value > high {
            ResultStatus::High
        } else {
            ResultStatus::Normal
        }
    }

    pub fn flag(&self) -> &'static str {
        match self {
            ResultStatus::Low => "L",
            ResultStatus::Normal => "N",
            ResultStatus::High => "H",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ResultStatus::Low => "偏低 (Low)",
            ResultStatus::Normal => "正常 (Normal)",
            ResultStatus::High => "偏高 (High)",
        }
    }

    /// 固定的临床提示
    pub fn clinical_note(&self) -> &'static str {
        match self {
            ResultStatus::Low => "低於正常參考值，建議進一步評估",
            ResultStatus::Normal => "數值在正常範圍內",
            ResultStatus::High => "高於正常參考值，建議進一步評估",
        }
    }

    pub fn is_abnormal(&self) -> bool {
        *self != ResultStatus::Normal
    }
}

/// 单项检验判读
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValueClassification {
    pub test: TestIdentity,
    pub value: f64,
    pub unit: String,
    pub result: ResultStatus,
    pub flag: String,
    pub label: String,
    pub reference_range: BandRange,
    pub interpretation: String,
    pub applicable_to: Applicability,
}

impl ValueClassification {
    fn new(band: ResolvedBand, value: f64) -> Self {
        let status = ResultStatus::classify(value, band.reference_range.low, band.reference_range.high);
        Self {
            test: band.test,
            value,
            unit: band.reference_range.unit.clone(),
            result: status,
            flag: status.flag().to_string(),
            label: status.label().to_string(),
            reference_range: band.reference_range,
            interpretation: status.clinical_note().to_string(),
            applicable_to: band.applicable_to,
        }
    }
}

/// 批次判读的输入项；缺少字段的项会被直接略过
///
/// 逐项宽松解析：类型不符的项不会使整个请求失败，而是带着 `rejected` 原因进入批次，
/// 判读时记入 `skipped`。
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(from = "Value")]
pub struct BatchEntry {
    pub test_id: Option<String>,
    pub value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejected: Option<String>,
}

#[derive(Deserialize)]
struct RawBatchEntry {
    #[serde(default, alias = "loinc_code")]
    test_id: Option<String>,
    #[serde(default)]
    value: Option<f64>,
}

impl BatchEntry {
    pub fn new(test_id: impl Into<String>, value: f64) -> Self {
        Self {
            test_id: Some(test_id.into()),
            value: Some(value),
            rejected: None,
        }
    }
}

impl From<Value> for BatchEntry {
    fn from(raw: Value) -> Self {
        match serde_json::from_value::<RawBatchEntry>(raw.clone()) {
            Ok(entry) => Self {
                test_id: entry.test_id,
                value: entry.value,
                rejected: None,
            },
            Err(e) => {
                let test_id = raw
                    .get("test_id")
                    .or_else(|| raw.get("loinc_code"))
                    .map(|id| match id {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    });
                Self {
                    test_id,
                    value: None,
                    rejected: Some(e.to_string()),
                }
            }
        }
    }
}

/// 未能判读的批次项
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkippedEntry {
    pub index: usize,
    pub test_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatientInfo {
    pub age: u32,
    pub sex: String,
}

/// 批次判读汇总；计数只统计成功判读的项
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchClassification {
    pub total: usize,
    pub normal_count: usize,
    pub abnormal_count: usize,
    pub patient_info: PatientInfo,
    pub results: Vec<ValueClassification>,
    pub skipped: Vec<SkippedEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabTestSearch {
    pub keyword: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub total_found: usize,
    pub results: Vec<LabTestDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabCategories {
    pub total_categories: usize,
    pub categories: Vec<String>,
}

/// 检验参考值解析器
#[derive(Debug, Clone)]
pub struct LabReferenceResolver {
    store: ReferenceStore,
}

impl LabReferenceResolver {
    pub fn new(store: ReferenceStore) -> Self {
        Self { store }
    }

    /// 选出适用的参考值区间
    pub fn resolve_band(&self, test_id: &str, age: u32, sex: Sex) -> Result<LabOutcome<ResolvedBand>> {
        let snapshot = self.store.snapshot()?;
        Ok(resolve_in(&snapshot, test_id.trim(), age, sex))
    }

    /// 判读单项检验值
    pub fn classify_value(
        &self,
        test_id: &str,
        value: f64,
        age: u32,
        sex: Sex,
    ) -> Result<LabOutcome<ValueClassification>> {
        let snapshot = self.store.snapshot()?;
        Ok(classify_in(&snapshot, test_id.trim(), value, age, sex))
    }

    /// 批次判读：各项独立判读，单项失败不影响其他项
    pub fn classify_batch(&self, entries: &[BatchEntry], age: u32, sex: Sex) -> Result<BatchClassification> {
        // 整个批次使用同一个快照
        let snapshot = self.store.snapshot()?;

        let mut results = Vec::new();
        let mut skipped = Vec::new();
        for (index, entry) in entries.iter().enumerate() {
            if let Some(reason) = &entry.rejected {
                debug!("Batch entry {} rejected: {}", index, reason);
                skipped.push(SkippedEntry {
                    index,
                    test_id: entry.test_id.clone().unwrap_or_default(),
                    reason: format!("無法解析的項目: {}", reason),
                });
                continue;
            }

            let (test_id, value) = match (entry.test_id.as_deref().map(str::trim), entry.value) {
                (Some(id), Some(value)) if !id.is_empty() => (id, value),
                _ => continue,
            };

            match classify_in(&snapshot, test_id, value, age, sex) {
                LabOutcome::Resolved(classification) => results.push(classification),
                LabOutcome::TestNotFound(nf) => skipped.push(SkippedEntry {
                    index,
                    test_id: test_id.to_string(),
                    reason: nf.message,
                }),
                LabOutcome::NoApplicableRange(nar) => skipped.push(SkippedEntry {
                    index,
                    test_id: test_id.to_string(),
                    reason: nar.message,
                }),
            }
        }

        let abnormal_count = results.iter().filter(|r| r.result.is_abnormal()).count();
        if !skipped.is_empty() {
            warn!("Batch classification skipped {} of {} entries", skipped.len(), entries.len());
        }

        Ok(BatchClassification {
            total: results.len(),
            normal_count: results.len() - abnormal_count,
            abnormal_count,
            patient_info: PatientInfo {
                age,
                sex: sex.label().to_string(),
            },
            results,
            skipped,
        })
    }

    /// 按编号、中英文名称或常用缩写搜索检验项目，可按类别过滤
    pub fn search_lab_tests(&self, keyword: &str, category: Option<&str>) -> Result<Resolved<LabTestSearch>> {
        let keyword = keyword.trim();
        let category = category.map(str::trim).filter(|c| !c.is_empty());
        let snapshot = self.store.snapshot()?;

        let mut results: Vec<LabTestDefinition> = snapshot
            .lab_tests()
            .iter()
            .filter(|t| {
                contains_keyword(&t.test_id, keyword)
                    || contains_keyword(&t.name_zh, keyword)
                    || contains_keyword(&t.name_en, keyword)
                    || contains_keyword(&t.common_alias, keyword)
            })
            .filter(|t| category.map_or(true, |c| contains_keyword(&t.category, c)))
            .cloned()
            .collect();
        results.sort_by(|a, b| a.test_id.cmp(&b.test_id));
        results.truncate(LAB_SEARCH_LIMIT);

        if results.is_empty() {
            return Ok(Resolved::NotFound(
                NotFound::new(keyword, format!("找不到符合 '{}' 的檢驗項目", keyword))
                    .with_suggestion("請嘗試使用檢驗的中文名稱、英文名稱或常用縮寫"),
            ));
        }

        Ok(Resolved::Found(LabTestSearch {
            keyword: keyword.to_string(),
            category: category.map(str::to_string),
            total_found: results.len(),
            results,
        }))
    }

    /// 所有检验类别，去重后排序
    pub fn list_lab_categories(&self) -> Result<LabCategories> {
        let snapshot = self.store.snapshot()?;
        let categories: Vec<String> = snapshot
            .lab_tests()
            .iter()
            .map(|t| t.category.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        Ok(LabCategories {
            total_categories: categories.len(),
            categories,
        })
    }
}

fn resolve_in(snapshot: &ReferenceSnapshot, test_id: &str, age: u32, sex: Sex) -> LabOutcome<ResolvedBand> {
    let test = match snapshot.lab_test(test_id) {
        Some(test) => test,
        None => {
            debug!("Lab test {} not found", test_id);
            return LabOutcome::TestNotFound(NotFound::new(test_id, format!("找不到 LOINC 碼: {}", test_id)));
        }
    };

    match select_band(snapshot.get_bands_for_test(test_id), age, sex) {
        Some(band) => LabOutcome::Resolved(ResolvedBand::new(test, band)),
        None => {
            debug!("No reference band for {} at age {} / {}", test_id, age, sex);
            LabOutcome::NoApplicableRange(NoApplicableRange {
                test: TestIdentity::from(test),
                unit: test.unit.clone(),
                age,
                sex,
                message: format!("找不到適用於年齡 {} 歲、性別 {} 的參考值", age, sex.label()),
            })
        }
    }
}

fn classify_in(
    snapshot: &ReferenceSnapshot,
    test_id: &str,
    value: f64,
    age: u32,
    sex: Sex,
) -> LabOutcome<ValueClassification> {
    match resolve_in(snapshot, test_id, age, sex) {
        LabOutcome::Resolved(band) => LabOutcome::Resolved(ValueClassification::new(band, value)),
        LabOutcome::TestNotFound(nf) => LabOutcome::TestNotFound(nf),
        LabOutcome::NoApplicableRange(nar) => LabOutcome::NoApplicableRange(nar),
    }
}

/// 候选区间中选出唯一一个；排名相同时保留先出现者
pub fn select_band(bands: &[ReferenceBand], age: u32, sex: Sex) -> Option<&ReferenceBand> {
    let rank = |band: &ReferenceBand| (band.sex == sex, band.age_min);

    let mut best: Option<&ReferenceBand> = None;
    for band in bands.iter().filter(|b| b.covers_age(age) && b.sex.applies_to(sex)) {
        match best {
            Some(current) if rank(band) <= rank(current) => {}
            _ => best = Some(band),
        }
    }
    best
}
