use log::debug;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::RefreshError;
use crate::types::{Snapshot, UserTraffic};

/// 把快照对象内容解码为按用户划分的上下行字节数
///
/// 只有整份文档不可用时才失败：不是合法JSON、顶层不是对象、或 `users` 不是对象。
/// 缺少 `users` 字段得到空快照。单个用户的字段无法转换时该字段记为0，不影响其他用户。
pub fn parse(raw: &[u8]) -> Result<Snapshot, RefreshError> {
    let payload: Value = serde_json::from_slice(raw)?;

    let Value::Object(mut root) = payload else {
        return Err(RefreshError::Decode("顶层不是JSON对象".to_string()));
    };

    let users = match root.remove("users") {
        None | Some(Value::Null) => return Ok(Snapshot::default()),
        Some(Value::Object(users)) => users,
        Some(other) => {
            return Err(RefreshError::Decode(format!(
                "users字段应为对象，实际为{}",
                json_type(&other)
            )))
        }
    };

    let users = users
        .into_iter()
        .map(|(user, entry)| {
            let traffic = decode_entry(&user, &entry);
            (user, traffic)
        })
        .collect::<BTreeMap<_, _>>();

    Ok(Snapshot { users })
}

fn decode_entry(user: &str, entry: &Value) -> UserTraffic {
    let Value::Object(fields) = entry else {
        debug!("用户 {} 的记录不是对象 ({})，记为0", user, json_type(entry));
        return UserTraffic::default();
    };

    let field = |name: &str| match fields.get(name) {
        None => 0,
        Some(value) => coerce_bytes(value).unwrap_or_else(|| {
            debug!("用户 {} 的 {} 字段无效: {}，记为0", user, name, value);
            0
        }),
    };

    UserTraffic::new(field("up"), field("down"))
}

/// 转换为非负整数：整数原样、非负有限小数截断、十进制整数字符串解析
fn coerce_bytes(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => {
            if let Some(v) = n.as_u64() {
                return Some(v);
            }
            if n.is_i64() {
                return None;
            }
            let f = n.as_f64()?;
            if f.is_finite() && f >= 0.0 && f < u64::MAX as f64 {
                Some(f.trunc() as u64)
            } else {
                None
            }
        }
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
