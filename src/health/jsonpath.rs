//! JSON路径表达式
//!
//! 基于 `serde_json_path`（RFC 9535）：支持递归下降 `$..key`、过滤器
//! `[?(@.id==1)]`、负下标、切片和通配符。校验只使用按文档顺序的第一个匹配

use serde_json::Value;
pub use serde_json_path::ParseError as JsonPathError;

/// 已编译的JSON路径，保留原始表达式作为详情键
#[derive(Debug, Clone)]
pub struct JsonPath {
    source: String,
    compiled: serde_json_path::JsonPath,
}

impl JsonPath {
    /// 解析路径表达式
    pub fn parse(source: &str) -> Result<Self, JsonPathError> {
        Ok(Self {
            source: source.to_string(),
            compiled: serde_json_path::JsonPath::parse(source)?,
        })
    }

    /// 按文档顺序返回全部匹配
    pub fn find<'a>(&self, root: &'a Value) -> Vec<&'a Value> {
        self.compiled.query(root).all()
    }

    /// 第一个匹配
    pub fn first<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        self.compiled.query(root).first()
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

/// JSON 值相等：两侧都是数字时按数值比较，`1` 与 `1.0` 视为相等
pub fn values_equal(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => a == b,
            _ => match (a.as_u64(), b.as_u64()) {
                (Some(a), Some(b)) => a == b,
                _ => a.as_f64().zip(b.as_f64()).is_some_and(|(a, b)| a == b),
            },
        },
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(a, b)| values_equal(a, b))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(key, a)| b.get(key).is_some_and(|b| values_equal(a, b)))
        }
        _ => actual == expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_and_find_keys() {
        let doc = json!({"ok": true, "data": {"status": "up", "nodes": [{"id": 1}, {"id": 2}]}});

        let path = JsonPath::parse("$.ok").unwrap();
        assert_eq!(path.first(&doc), Some(&json!(true)));

        let path = JsonPath::parse("$.data.status").unwrap();
        assert_eq!(path.first(&doc), Some(&json!("up")));

        let path = JsonPath::parse("$['data'][\"nodes\"][1].id").unwrap();
        assert_eq!(path.first(&doc), Some(&json!(2)));
        assert_eq!(path.as_str(), "$['data'][\"nodes\"][1].id");
    }

    #[test]
    fn test_wildcard_returns_document_order() {
        let doc = json!({"nodes": [{"id": 1}, {"id": 2}, {"name": "x"}]});
        let path = JsonPath::parse("$.nodes[*].id").unwrap();
        assert_eq!(path.find(&doc), vec![&json!(1), &json!(2)]);

        let path = JsonPath::parse("$.nodes.*.id").unwrap();
        assert_eq!(path.first(&doc), Some(&json!(1)));
    }

    #[test]
    fn test_recursive_descent_filters_and_slices() {
        let doc = json!({
            "service": {"status": "up"},
            "items": [{"id": 1, "ok": true}, {"id": 2, "ok": false}, {"id": 3, "ok": false}]
        });

        let path = JsonPath::parse("$..status").unwrap();
        assert_eq!(path.first(&doc), Some(&json!("up")));

        let path = JsonPath::parse("$.items[?(@.id==1)].ok").unwrap();
        assert_eq!(path.first(&doc), Some(&json!(true)));

        let path = JsonPath::parse("$.items[-1].id").unwrap();
        assert_eq!(path.first(&doc), Some(&json!(3)));

        let path = JsonPath::parse("$.items[0:2].id").unwrap();
        assert_eq!(path.find(&doc), vec![&json!(1), &json!(2)]);
    }

    #[test]
    fn test_root_path_matches_document() {
        let doc = json!([1, 2]);
        let path = JsonPath::parse("$").unwrap();
        assert_eq!(path.first(&doc), Some(&doc));
    }

    #[test]
    fn test_missing_match() {
        let doc = json!({"ok": true});
        assert!(JsonPath::parse("$.missing").unwrap().first(&doc).is_none());
        assert!(JsonPath::parse("$.ok.deeper").unwrap().first(&doc).is_none());
        assert!(JsonPath::parse("$[0]").unwrap().first(&doc).is_none());
    }

    #[test]
    fn test_invalid_paths() {
        assert!(JsonPath::parse("ok").is_err());
        assert!(JsonPath::parse("$.").is_err());
        assert!(JsonPath::parse("$['open").is_err());
        assert!(JsonPath::parse("$[0").is_err());
    }

    #[test]
    fn test_numbers_compare_by_value() {
        assert!(values_equal(&json!(1), &json!(1.0)));
        assert!(values_equal(&json!({"n": [2]}), &json!({"n": [2.0]})));
        assert!(!values_equal(&json!(1), &json!(1.5)));
        assert!(!values_equal(&json!(1), &json!("1")));
        assert!(values_equal(&json!(u64::MAX), &json!(u64::MAX)));
    }
}
