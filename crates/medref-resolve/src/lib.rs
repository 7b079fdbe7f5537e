//! # MedRef 解析引擎
//!
//! 三个相互独立的解析组件，均只持有存储句柄，每次调用读取当前快照：
//! - 编码层级解析：ICD-10 下级、同类与相邻编码
//! - 检验参考值解析：按年龄/性别选择参考值并判读检验结果
//! - 诊疗指引组装：完整指引与五阶段临床路径

pub mod code_hierarchy;
pub mod guideline;
pub mod lab_reference;
pub mod pathway;

// 重新导出主要类型
pub use code_hierarchy::{
    CodeHierarchyResolver, CodeKind, CodeSearch, CodeSummary, CrossReference, HierarchyLimits,
    NearbyCode, NearbyCodes, RelatedCodes, Relation,
};
pub use guideline::{
    CompleteGuideline, GoalList, GuidelineAssembler, GuidelineSearch, GuidelineSummary,
    MedicationList, TestList,
};
pub use lab_reference::{
    BatchClassification, BatchEntry, LabCategories, LabOutcome, LabReferenceResolver,
    LabTestSearch, ResolvedBand, ResultStatus, ValueClassification,
};
pub use pathway::{ClinicalPathway, PathwayPhase, PathwayRules, PathwayStep};
