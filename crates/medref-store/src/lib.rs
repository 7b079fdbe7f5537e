//! # MedRef 参考数据存储
//!
//! 负责诊断码、处置码、检验项目与参考值、诊疗指引四类参考数据的装载和只读访问。
//! 数据以不可变快照的形式发布，刷新时整体替换。

pub mod loader;
pub mod records;
pub mod seed;
pub mod snapshot;
pub mod store;

// 重新导出主要类型
pub use loader::SnapshotLoader;
pub use snapshot::{CodeTable, ReferenceSnapshot, SnapshotBuilder, SnapshotInfo};
pub use store::ReferenceStore;
