//! # MedRef Core
//!
//! 医学编码与参考值解析系统的核心模块，提供基础数据结构、错误定义和通用工具。

pub mod error;
pub mod models;
pub mod outcome;
pub mod utils;

pub use error::{MedrefError, Result};
pub use models::*;
pub use outcome::{NotFound, Resolved};
