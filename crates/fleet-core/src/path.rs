//! A path evaluator over `serde_json::Value`, plus the typed coercion layer
//! keyed by [`crate::capability::ParameterType`].
//!
//! The upstream source leans on runtime-typed dictionaries to navigate
//! nested JSON by arbitrary paths. Here that becomes a *path evaluator*
//! over a JSON value type plus a typed coercion layer — no reflection
//! needed.

use crate::capability::ParameterType;
use crate::error::FleetError;
use serde_json::Value;

/// One step of a parsed `parameter_path`: either an object key or an array index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// Parse a dotted/indexed path like `valves[0].state` or `switch:0.in_mode`
/// into its segments. A `:` inside a key (`switch:0`) is part of the key,
/// not a separator — only `.` splits segments, and `[n]` suffixes on a key
/// become trailing index segments.
pub fn parse_path(path: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    for part in path.split('.') {
        if part.is_empty() {
            continue;
        }
        let mut rest = part;
        // Pull the bare key off the front, before any `[...]` suffixes.
        if let Some(bracket_pos) = rest.find('[') {
            let key = &rest[..bracket_pos];
            if !key.is_empty() {
                segments.push(Segment::Key(key.to_string()));
            }
            rest = &rest[bracket_pos..];
            while let Some(stripped) = rest.strip_prefix('[') {
                if let Some(end) = stripped.find(']') {
                    if let Ok(idx) = stripped[..end].parse::<usize>() {
                        segments.push(Segment::Index(idx));
                    }
                    rest = &stripped[end + 1..];
                } else {
                    break;
                }
            }
        } else {
            segments.push(Segment::Key(rest.to_string()));
        }
    }
    segments
}

/// Descend `path` into `root`, returning `error_kind = path-missing` when an
/// intermediate key or index doesn't exist (read path).
pub fn get_path<'a>(root: &'a Value, path: &str) -> Result<&'a Value, FleetError> {
    let segments = parse_path(path);
    let mut current = root;
    for segment in &segments {
        current = match (segment, current) {
            (Segment::Key(key), Value::Object(map)) => map
                .get(key)
                .ok_or_else(|| FleetError::PathMissing(path.to_string()))?,
            (Segment::Index(idx), Value::Array(arr)) => arr
                .get(*idx)
                .ok_or_else(|| FleetError::PathMissing(path.to_string()))?,
            _ => return Err(FleetError::PathMissing(path.to_string())),
        };
    }
    Ok(current)
}

/// Set `value` at `path` within `root`, creating intermediate objects/arrays
/// as needed. Used to build the nested `params` object for a Gen2+ write
/// (write path).
pub fn set_path(root: &mut Value, path: &str, value: Value) {
    let segments = parse_path(path);
    set_at(root, &segments, value);
}

fn set_at(current: &mut Value, segments: &[Segment], value: Value) {
    let Some((head, tail)) = segments.split_first() else {
        *current = value;
        return;
    };
    match head {
        Segment::Key(key) => {
            if !current.is_object() {
                *current = Value::Object(serde_json::Map::new());
            }
            let map = current.as_object_mut().expect("just coerced to object");
            let entry = map.entry(key.clone()).or_insert(Value::Null);
            set_at(entry, tail, value);
        }
        Segment::Index(idx) => {
            if !current.is_array() {
                *current = Value::Array(Vec::new());
            }
            let arr = current.as_array_mut().expect("just coerced to array");
            while arr.len() <= *idx {
                arr.push(Value::Null);
            }
            set_at(&mut arr[*idx], tail, value);
        }
    }
}

/// The last segment of a path, used as the query-parameter key for Gen1
/// writes when the descriptor carries no override.
pub fn last_key(path: &str) -> Option<String> {
    parse_path(path).into_iter().rev().find_map(|s| match s {
        Segment::Key(k) => Some(k),
        Segment::Index(_) => None,
    })
}

/// Coerce a JSON leaf to the declared [`ParameterType`]. A literal `null`
/// leaf always coerces to `Value::Null` regardless of declared type — the
/// Engine treats a nullable descriptor's `null` leaf as `value = null`
///.
pub fn coerce(leaf: &Value, ty: ParameterType) -> Result<Value, FleetError> {
    if leaf.is_null() {
        return Ok(Value::Null);
    }
    let ok = match ty {
        ParameterType::Boolean => leaf.is_boolean(),
        ParameterType::Integer => leaf.is_i64() || leaf.is_u64(),
        ParameterType::Float => leaf.is_number(),
        ParameterType::String | ParameterType::Enum => leaf.is_string(),
        ParameterType::Object => leaf.is_object(),
        ParameterType::Array => leaf.is_array(),
        ParameterType::Null => leaf.is_null(),
    };
    if ok {
        Ok(leaf.clone())
    } else {
        Err(FleetError::TypeMismatch {
            expected: format!("{ty:?}"),
            actual: describe_json_type(leaf).to_string(),
        })
    }
}

fn describe_json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Encode a value as a Gen1 query-string literal. Booleans serialize as the
/// lowercase literal strings `true`/`false`, never `on`/`off` — this is a
/// load-bearing detail.
pub fn encode_gen1_query_value(value: &Value) -> Result<String, FleetError> {
    match value {
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::String(s) => Ok(s.clone()),
        Value::Null => Ok("null".to_string()),
        other => Err(FleetError::TypeMismatch {
            expected: "scalar".to_string(),
            actual: describe_json_type(other).to_string(),
        }),
    }
}

/// Reject a Gen1 boolean write spelled as the string `"on"`/`"off"` *before*
/// it goes on the wire — the coercion layer owns this, not the device
/// (boundary behavior).
pub fn reject_on_off_literal(value: &Value) -> Result<(), FleetError> {
    if let Value::String(s) = value {
        if s.eq_ignore_ascii_case("on") || s.eq_ignore_ascii_case("off") {
            return Err(FleetError::TypeMismatch {
                expected: "boolean (true/false)".to_string(),
                actual: format!("string literal {s:?}"),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_dotted_and_indexed_path() {
        assert_eq!(
            parse_path("valves[0].state"),
            vec![
                Segment::Key("valves".to_string()),
                Segment::Index(0),
                Segment::Key("state".to_string()),
            ]
        );
    }

    #[test]
    fn keeps_colon_inside_a_single_key() {
        assert_eq!(
            parse_path("switch:0.in_mode"),
            vec![
                Segment::Key("switch:0".to_string()),
                Segment::Key("in_mode".to_string()),
            ]
        );
    }

    #[test]
    fn get_path_descends_nested_structures() {
        let root = json!({"valves": [{"state": "open"}]});
        assert_eq!(get_path(&root, "valves[0].state").unwrap(), &json!("open"));
    }

    #[test]
    fn get_path_reports_missing_intermediate_key() {
        let root = json!({"mqtt": {}});
        let err = get_path(&root, "mqtt.enable").unwrap_err();
        assert_eq!(err.kind(), "path-missing");
    }

    #[test]
    fn set_path_builds_nested_objects() {
        let mut root = json!({});
        set_path(&mut root, "config.device.eco_mode", json!(true));
        assert_eq!(root, json!({"config": {"device": {"eco_mode": true}}}));
    }

    #[test]
    fn null_leaf_coerces_regardless_of_declared_type() {
        assert_eq!(coerce(&Value::Null, ParameterType::Boolean).unwrap(), Value::Null);
    }

    #[test]
    fn rejects_on_off_string_literals_for_booleans() {
        assert!(reject_on_off_literal(&json!("on")).is_err());
        assert!(reject_on_off_literal(&json!("off")).is_err());
        assert!(reject_on_off_literal(&json!(true)).is_ok());
    }

    #[test]
    fn gen1_boolean_encodes_as_lowercase_literal() {
        assert_eq!(encode_gen1_query_value(&json!(true)).unwrap(), "true");
        assert_eq!(encode_gen1_query_value(&json!(false)).unwrap(), "false");
    }
}
