//! 参考数据快照
//!
//! 一个快照是参考数据的一个完整、不可变版本。快照只能由 [`SnapshotBuilder`] 一次性构建，
//! 构建完成后不再修改；刷新时构建新快照并整体替换。

use chrono::{DateTime, Utc};
use medref_core::models::*;
use medref_core::utils::contains_keyword;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// 按编码字典序排列的编码表
///
/// 比较是纯字符串（字节序）比较，与 SQLite 默认的 BINARY 排序一致，
/// 因此 `"E11.9" < "E2"`。
#[derive(Debug, Clone)]
pub struct CodeTable<T> {
    rows: Vec<T>,
}

impl<T: CodedEntry> CodeTable<T> {
    /// 由任意顺序的行构建：空编码被丢弃，重复编码保留第一行
    fn build(rows: Vec<T>, table: &str) -> Self {
        let mut seen = HashSet::new();
        let mut kept = Vec::with_capacity(rows.len());
        for row in rows {
            if row.code().is_empty() {
                warn!("Dropping {} row with empty code", table);
                continue;
            }
            if !seen.insert(row.code().to_string()) {
                warn!("Duplicate {} code {}, keeping first row", table, row.code());
                continue;
            }
            kept.push(row);
        }
        kept.sort_by(|a, b| a.code().cmp(b.code()));
        Self { rows: kept }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.rows.iter()
    }

    /// 精确查找
    pub fn get_by_code(&self, code: &str) -> Option<&T> {
        self.rows
            .binary_search_by(|row| row.code().cmp(code))
            .ok()
            .map(|idx| &self.rows[idx])
    }

    /// 以 `prefix` 开头的所有编码（含与 prefix 相同者），字典序
    pub fn get_by_prefix(&self, prefix: &str) -> &[T] {
        let start = self.rows.partition_point(|row| row.code() < prefix);
        let len = self.rows[start..]
            .iter()
            .take_while(|row| row.code().starts_with(prefix))
            .count();
        &self.rows[start..start + len]
    }

    /// 严格小于 `code` 的最后 `limit` 个编码，升序
    pub fn before(&self, code: &str, limit: usize) -> &[T] {
        let end = self.rows.partition_point(|row| row.code() < code);
        &self.rows[end.saturating_sub(limit)..end]
    }

    /// 严格大于 `code` 的前 `limit` 个编码，升序
    pub fn after(&self, code: &str, limit: usize) -> &[T] {
        let start = self.rows.partition_point(|row| row.code() <= code);
        let end = start.saturating_add(limit).min(self.rows.len());
        &self.rows[start..end]
    }

    /// 编码或中英文名称包含关键字
    pub fn search(&self, keyword: &str, limit: usize) -> Vec<&T> {
        self.rows
            .iter()
            .filter(|row| {
                contains_keyword(row.code(), keyword)
                    || contains_keyword(row.name_zh(), keyword)
                    || contains_keyword(row.name_en(), keyword)
            })
            .take(limit)
            .collect()
    }
}

impl CodeTable<DiagnosisCode> {
    /// 属于同一 ICD 类别的诊断码，字典序
    pub fn get_by_category(&self, category: &str) -> Vec<&DiagnosisCode> {
        self.get_by_prefix(category)
            .iter()
            .filter(|row| row.category == category)
            .collect()
    }
}

impl<T> Default for CodeTable<T> {
    fn default() -> Self {
        Self { rows: Vec::new() }
    }
}

/// 快照摘要
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotInfo {
    pub version: u64,
    pub loaded_at: DateTime<Utc>,
    pub diagnoses: usize,
    pub procedures: usize,
    pub lab_tests: usize,
    pub reference_bands: usize,
    pub guidelines: usize,
}

/// 参考数据快照
#[derive(Debug, Clone)]
pub struct ReferenceSnapshot {
    version: u64,
    loaded_at: DateTime<Utc>,
    pub diagnoses: CodeTable<DiagnosisCode>,
    pub procedures: CodeTable<ProcedureCode>,
    lab_tests: Vec<LabTestDefinition>,
    lab_index: HashMap<String, usize>,
    bands: HashMap<String, Vec<ReferenceBand>>,
    bundles: Vec<GuidelineBundle>,
}

impl ReferenceSnapshot {
    /// 空快照，用于存储初始化
    pub fn empty() -> Self {
        SnapshotBuilder::new().build(0)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn info(&self) -> SnapshotInfo {
        SnapshotInfo {
            version: self.version,
            loaded_at: self.loaded_at,
            diagnoses: self.diagnoses.len(),
            procedures: self.procedures.len(),
            lab_tests: self.lab_tests.len(),
            reference_bands: self.bands.values().map(Vec::len).sum(),
            guidelines: self.bundles.len(),
        }
    }

    // ========== 检验项目 ==========

    /// 根据检验ID查找检验项目
    pub fn lab_test(&self, test_id: &str) -> Option<&LabTestDefinition> {
        self.lab_index.get(test_id).map(|&idx| &self.lab_tests[idx])
    }

    /// 检验项目的全部参考值区间，保持装载顺序
    pub fn get_bands_for_test(&self, test_id: &str) -> &[ReferenceBand] {
        self.bands.get(test_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// 所有检验项目，保持装载顺序
    pub fn lab_tests(&self) -> &[LabTestDefinition] {
        &self.lab_tests
    }

    // ========== 诊疗指引 ==========

    /// 疾病键完全匹配或前缀匹配的所有指引，保持装载顺序
    pub fn get_bundle_by_key(&self, disease_key: &str) -> Vec<&GuidelineBundle> {
        let matches: Vec<_> = self
            .bundles
            .iter()
            .filter(|bundle| bundle.matches_key(disease_key))
            .collect();
        debug!("Guideline key {} matched {} bundles", disease_key, matches.len());
        matches
    }

    /// 所有指引，保持装载顺序
    pub fn bundles(&self) -> &[GuidelineBundle] {
        &self.bundles
    }
}

/// 快照构建器
///
/// 负责数据完整性：诊断类别重新推导、唯一键去重、孤立参考值丢弃。
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    diagnoses: Vec<DiagnosisCode>,
    procedures: Vec<ProcedureCode>,
    lab_tests: Vec<LabTestDefinition>,
    bands: Vec<ReferenceBand>,
    bundles: Vec<GuidelineBundle>,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn diagnoses(mut self, rows: impl IntoIterator<Item = DiagnosisCode>) -> Self {
        self.diagnoses.extend(rows);
        self
    }

    pub fn procedures(mut self, rows: impl IntoIterator<Item = ProcedureCode>) -> Self {
        self.procedures.extend(rows);
        self
    }

    pub fn lab_tests(mut self, rows: impl IntoIterator<Item = LabTestDefinition>) -> Self {
        self.lab_tests.extend(rows);
        self
    }

    pub fn reference_bands(mut self, rows: impl IntoIterator<Item = ReferenceBand>) -> Self {
        self.bands.extend(rows);
        self
    }

    pub fn bundles(mut self, rows: impl IntoIterator<Item = GuidelineBundle>) -> Self {
        self.bundles.extend(rows);
        self
    }

    /// 构建快照
    pub fn build(self, version: u64) -> ReferenceSnapshot {
        // 类别是派生缓存字段，始终以编码为准
        let diagnoses: Vec<DiagnosisCode> = self
            .diagnoses
            .into_iter()
            .map(|d| DiagnosisCode::new(d.code, d.name_en, d.name_zh))
            .collect();

        let mut lab_tests = Vec::with_capacity(self.lab_tests.len());
        let mut lab_index = HashMap::new();
        for test in self.lab_tests {
            if test.test_id.is_empty() {
                warn!("Dropping lab test with empty test id");
                continue;
            }
            if lab_index.contains_key(&test.test_id) {
                warn!("Duplicate lab test {}, keeping first row", test.test_id);
                continue;
            }
            lab_index.insert(test.test_id.clone(), lab_tests.len());
            lab_tests.push(test);
        }

        let mut bands: HashMap<String, Vec<ReferenceBand>> = HashMap::new();
        for band in self.bands {
            if !lab_index.contains_key(&band.test_id) {
                warn!("Dropping reference band for unknown test {}", band.test_id);
                continue;
            }
            if band.age_min > band.age_max {
                warn!(
                    "Dropping reference band for {} with inverted age span {}-{}",
                    band.test_id, band.age_min, band.age_max
                );
                continue;
            }
            bands.entry(band.test_id.clone()).or_default().push(band);
        }

        ReferenceSnapshot {
            version,
            loaded_at: Utc::now(),
            diagnoses: CodeTable::build(diagnoses, "diagnosis"),
            procedures: CodeTable::build(self.procedures, "procedure"),
            lab_tests,
            lab_index,
            bands,
            bundles: self.bundles,
        }
    }
}
