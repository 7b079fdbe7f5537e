//! 通用工具函数

/// ICD 类别：编码前3个字符（不足3个字符时取整个编码）
pub fn icd_category(code: &str) -> &str {
    match code.char_indices().nth(3) {
        Some((idx, _)) => &code[..idx],
        None => code,
    }
}

/// 同类查询使用的类别：含 `.` 时取第一段，否则取前3个字符
pub fn sibling_category(code: &str) -> &str {
    match code.split_once('.') {
        Some((head, _)) => head,
        None => icd_category(code),
    }
}

/// 子串匹配（ASCII 不区分大小写），语义同 SQL `LIKE '%keyword%'`
pub fn contains_keyword(haystack: &str, keyword: &str) -> bool {
    if keyword.is_empty() {
        return true;
    }
    haystack
        .to_ascii_lowercase()
        .contains(&keyword.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_icd_category() {
        assert_eq!(icd_category("E11.9"), "E11");
        assert_eq!(icd_category("I10"), "I10");
        assert_eq!(icd_category("E1"), "E1");
        assert_eq!(icd_category(""), "");
    }

    #[test]
    fn test_sibling_category() {
        assert_eq!(sibling_category("E11.9"), "E11");
        assert_eq!(sibling_category("E11"), "E11");
        assert_eq!(sibling_category("E1.2"), "E1");
        assert_eq!(sibling_category("E1122"), "E11");
    }

    #[test]
    fn test_contains_keyword() {
        assert!(contains_keyword("Type 2 diabetes", "DIABETES"));
        assert!(contains_keyword("第二型糖尿病", "糖尿病"));
        assert!(!contains_keyword("Hypertension", "diabetes"));
        assert!(contains_keyword("anything", ""));
    }
}
