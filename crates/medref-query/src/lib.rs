//! # MedRef 查询门面
//!
//! 把命名操作分发到对应的解析组件，并把结果整形为统一的响应信封：
//! `{ "status": "ok" | "not_found" | "no_applicable_range" | "error", "op", "data", "error" }`

pub mod facade;

pub use facade::{ErrorBody, QueryFacade, QueryRequest, QueryResponse, ResponseStatus};
