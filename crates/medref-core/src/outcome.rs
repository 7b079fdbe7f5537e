//! 查询结果封装
//!
//! 数据缺失是合法的终态结果，不是错误。

use serde::{Deserialize, Serialize};

/// 未找到结果：回显原始查询，附带可选的建议
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotFound {
    pub query: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl NotFound {
    pub fn new(query: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// 找到 / 未找到
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Resolved<T> {
    Found(T),
    NotFound(NotFound),
}

impl<T> Resolved<T> {
    pub fn is_found(&self) -> bool {
        matches!(self, Resolved::Found(_))
    }

    pub fn found(self) -> Option<T> {
        match self {
            Resolved::Found(value) => Some(value),
            Resolved::NotFound(_) => None,
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Resolved<U> {
        match self {
            Resolved::Found(value) => Resolved::Found(f(value)),
            Resolved::NotFound(nf) => Resolved::NotFound(nf),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Item {
        code: String,
    }

    #[test]
    fn test_resolved_serialization_is_tagged() {
        let found = Resolved::Found(Item { code: "E11".to_string() });
        assert_eq!(
            serde_json::to_value(&found).unwrap(),
            json!({"status": "found", "code": "E11"})
        );

        let missing: Resolved<Item> = Resolved::NotFound(NotFound::new("Z99", "Diagnosis not found"));
        assert_eq!(
            serde_json::to_value(&missing).unwrap(),
            json!({"status": "not_found", "query": "Z99", "message": "Diagnosis not found"})
        );
    }

    #[test]
    fn test_resolved_map() {
        let found = Resolved::Found(2).map(|v| v * 10);
        assert_eq!(found.found(), Some(20));
    }
}
