//! 快照加载
//!
//! 从数据目录读取 JSON 快照文件并构建完整快照：
//!
//! | 文件 | 内容 |
//! |------|------|
//! | `diagnoses.json` | ICD-10-CM 诊断码 |
//! | `procedures.json` | ICD-10-PCS 处置码 |
//! | `lab_tests.json` | 检验项目 (LOINC 对照) |
//! | `reference_bands.json` | 检验参考值 |
//! | `guidelines.json` | 诊疗指引 |
//!
//! 检验与指引文件缺失时可回退到内置数据；编码文件缺失时对应表为空。

use crate::records::*;
use crate::seed;
use crate::snapshot::{ReferenceSnapshot, SnapshotBuilder};
use medref_core::models::*;
use medref_core::{MedrefError, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const DIAGNOSES_FILE: &str = "diagnoses.json";
pub const PROCEDURES_FILE: &str = "procedures.json";
pub const LAB_TESTS_FILE: &str = "lab_tests.json";
pub const REFERENCE_BANDS_FILE: &str = "reference_bands.json";
pub const GUIDELINES_FILE: &str = "guidelines.json";

/// 快照加载器
#[derive(Debug, Clone)]
pub struct SnapshotLoader {
    data_dir: PathBuf,
    use_builtin_seed: bool,
}

impl SnapshotLoader {
    pub fn new(data_dir: impl Into<PathBuf>, use_builtin_seed: bool) -> Self {
        Self {
            data_dir: data_dir.into(),
            use_builtin_seed,
        }
    }

    /// 仅使用内置数据（无编码表）
    pub fn builtin() -> Self {
        Self::new(PathBuf::new(), true)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// 构建指定版本的完整快照
    ///
    /// 任一文件读取或解析失败都返回错误，不会产生部分快照。
    pub fn load(&self, version: u64) -> Result<ReferenceSnapshot> {
        info!("Loading reference snapshot v{} from {}", version, self.data_dir.display());

        let diagnoses: Vec<DiagnosisCode> = self
            .read_rows::<CodeRecord>(DIAGNOSES_FILE)?
            .unwrap_or_else(|| {
                warn!("{} not found, diagnosis table is empty", DIAGNOSES_FILE);
                Vec::new()
            })
            .into_iter()
            .map(DiagnosisCode::from)
            .collect();

        let procedures: Vec<ProcedureCode> = self
            .read_rows::<CodeRecord>(PROCEDURES_FILE)?
            .unwrap_or_else(|| {
                warn!("{} not found, procedure table is empty", PROCEDURES_FILE);
                Vec::new()
            })
            .into_iter()
            .map(ProcedureCode::from)
            .collect();

        let (lab_tests, bands) = self.load_lab_tables()?;

        let bundles: Vec<GuidelineBundle> = match self.read_rows::<GuidelineRecord>(GUIDELINES_FILE)? {
            Some(rows) => rows,
            None => self.seed_or_empty(GUIDELINES_FILE, seed::guidelines),
        }
        .into_iter()
        .map(GuidelineRecord::into_bundle)
        .collect();

        let snapshot = SnapshotBuilder::new()
            .diagnoses(diagnoses)
            .procedures(procedures)
            .lab_tests(lab_tests)
            .reference_bands(bands)
            .bundles(bundles)
            .build(version);

        info!("Reference snapshot built: {:?}", snapshot.info());
        Ok(snapshot)
    }

    /// 检验项目和参考值成对加载：项目来自内置数据时，参考值也来自内置数据
    fn load_lab_tables(&self) -> Result<(Vec<LabTestDefinition>, Vec<ReferenceBand>)> {
        match self.read_rows::<LabTestRecord>(LAB_TESTS_FILE)? {
            Some(rows) => {
                let tests = rows.into_iter().map(LabTestDefinition::from).collect();
                let bands = self
                    .read_rows::<ReferenceBandRecord>(REFERENCE_BANDS_FILE)?
                    .unwrap_or_else(|| {
                        warn!("{} not found, no reference bands loaded", REFERENCE_BANDS_FILE);
                        Vec::new()
                    })
                    .into_iter()
                    .map(ReferenceBand::from)
                    .collect();
                Ok((tests, bands))
            }
            None => Ok((
                self.seed_or_empty(LAB_TESTS_FILE, seed::lab_tests),
                self.seed_or_empty(REFERENCE_BANDS_FILE, seed::reference_bands),
            )),
        }
    }

    fn seed_or_empty<T>(&self, file: &str, seed: fn() -> Vec<T>) -> Vec<T> {
        if self.use_builtin_seed {
            debug!("{} not found, using built-in data", file);
            seed()
        } else {
            warn!("{} not found and built-in data disabled", file);
            Vec::new()
        }
    }

    /// 读取 JSON 数组文件；文件不存在返回 `None`
    fn read_rows<T: DeserializeOwned>(&self, file: &str) -> Result<Option<Vec<T>>> {
        if self.data_dir.as_os_str().is_empty() {
            return Ok(None);
        }
        let path = self.data_dir.join(file);
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path).map_err(|e| MedrefError::SnapshotLoad {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let rows: Vec<T> = serde_json::from_str(&content).map_err(|e| MedrefError::SnapshotLoad {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        debug!("Read {} rows from {}", rows.len(), path.display());
        Ok(Some(rows))
    }
}
