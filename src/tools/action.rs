//! 工具入参解码
//!
//! 每个工具的入参是带 "action" 判别字段的标签联合（serde tag 枚举），schema 封闭：
//! 未知 action 按约定返回字面量文本 `Unknown action: <a>`（不是错误也不是崩溃），
//! 已知 action 下的未知字段则拒绝。serde 不支持在内部标签枚举上用 deny_unknown_fields，
//! 因此封闭性由这里的字段白名单检查保证，而不是交给反序列化。

use serde::de::DeserializeOwned;
use serde_json::Value;

/// action 名 -> 该 action 允许的字段集（"action" 本身恒为合法）
pub type ActionTable = &'static [(&'static str, &'static [&'static str])];

/// 入参解码结果
pub enum DecodedAction<T> {
    /// 合法 action 且字段齐全
    Op(T),
    /// action 字段存在但不在工具的 action 集内
    Unknown(String),
    /// 缺 action 字段、带未知字段，或字段不满足变体要求
    Invalid(String),
}

/// 解码工具入参：校验 action 在表内、对象键都在该 action 的字段集内，再整体反序列化
pub fn decode_action<T: DeserializeOwned>(args: Value, actions: ActionTable) -> DecodedAction<T> {
    let obj = match args.as_object() {
        Some(obj) => obj,
        None => return DecodedAction::Invalid("arguments must be a JSON object".to_string()),
    };
    let action = match obj.get("action").and_then(|v| v.as_str()) {
        Some(a) if !a.is_empty() => a.to_string(),
        _ => return DecodedAction::Invalid("missing required field: action".to_string()),
    };
    let fields = match actions.iter().find(|(name, _)| *name == action) {
        Some((_, fields)) => *fields,
        None => return DecodedAction::Unknown(action),
    };
    for key in obj.keys() {
        if key != "action" && !fields.contains(&key.as_str()) {
            return DecodedAction::Invalid(format!(
                "unknown field '{}' for action '{}'",
                key, action
            ));
        }
    }
    match serde_json::from_value::<T>(args) {
        Ok(op) => DecodedAction::Op(op),
        Err(e) => DecodedAction::Invalid(format!("invalid arguments for '{}': {}", action, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    #[serde(tag = "action", rename_all = "snake_case")]
    enum TestAction {
        Append { file_name: String },
        ListContents,
    }

    const KNOWN: ActionTable = &[("append", &["file_name"]), ("list_contents", &[])];

    #[test]
    fn test_decode_valid_action() {
        let args = serde_json::json!({"action": "append", "file_name": "a.md"});
        match decode_action::<TestAction>(args, KNOWN) {
            DecodedAction::Op(TestAction::Append { file_name }) => assert_eq!(file_name, "a.md"),
            _ => panic!("expected Op"),
        }
    }

    #[test]
    fn test_decode_unknown_action() {
        let args = serde_json::json!({"action": "foo"});
        match decode_action::<TestAction>(args, KNOWN) {
            DecodedAction::Unknown(a) => assert_eq!(a, "foo"),
            _ => panic!("expected Unknown"),
        }
    }

    #[test]
    fn test_decode_unknown_field_rejected() {
        // schema 封闭：已知 action 下多余字段是 Invalid，不是静默忽略
        let args = serde_json::json!({
            "action": "append", "file_name": "a.md", "bogus_field": 123
        });
        match decode_action::<TestAction>(args, KNOWN) {
            DecodedAction::Invalid(e) => assert!(e.contains("bogus_field")),
            _ => panic!("expected Invalid"),
        }
    }

    #[test]
    fn test_decode_missing_fields_invalid() {
        let args = serde_json::json!({"action": "append"});
        assert!(matches!(
            decode_action::<TestAction>(args, KNOWN),
            DecodedAction::Invalid(_)
        ));
        let args = serde_json::json!({"no_action": true});
        assert!(matches!(
            decode_action::<TestAction>(args, KNOWN),
            DecodedAction::Invalid(_)
        ));
        let args = serde_json::json!(["not", "an", "object"]);
        assert!(matches!(
            decode_action::<TestAction>(args, KNOWN),
            DecodedAction::Invalid(_)
        ));
    }
}
