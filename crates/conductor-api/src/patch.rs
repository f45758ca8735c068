use conductor_core::ConductorError;
use serde::Deserialize;
use serde_json::Value;

/// One JSON-Patch (RFC 6902) operation, restricted to the subset the node
/// PATCH endpoint accepts (spec.md §6): `add`, `replace`, `remove` against
/// a node's public fields.
#[derive(Debug, Deserialize)]
pub struct PatchOp {
    pub op: String,
    pub path: String,
    #[serde(default)]
    pub value: Value,
}

/// Internal attributes no PATCH may target, regardless of op (spec.md §6).
const FORBIDDEN_PREFIXES: &[&str] = &[
    "/power_state",
    "/target_power_state",
    "/provision_state",
    "/target_provision_state",
    "/provision_updated_at",
    "/last_error",
    "/reservation",
    "/console_enabled",
    "/id",
    "/uuid",
    "/created_at",
    "/updated_at",
];

pub fn reject_internal_paths(patch: &[PatchOp]) -> Result<(), ConductorError> {
    for op in patch {
        if FORBIDDEN_PREFIXES.iter().any(|p| op.path == *p || op.path.starts_with(&format!("{p}/"))) {
            return Err(ConductorError::PatchError(format!(
                "path '{}' targets an internal attribute",
                op.path
            )));
        }
    }
    Ok(())
}

/// Apply `patch` to `target` in place. Paths are RFC 6901 JSON pointers.
pub fn apply(target: &mut Value, patch: &[PatchOp]) -> Result<(), ConductorError> {
    for op in patch {
        let (parent_path, key) = split_pointer(&op.path)
            .ok_or_else(|| ConductorError::PatchError(format!("invalid path: {}", op.path)))?;

        let parent = if parent_path.is_empty() {
            target as &mut Value
        } else {
            target
                .pointer_mut(&parent_path)
                .ok_or_else(|| ConductorError::PatchError(format!("no such path: {}", parent_path)))?
        };

        match op.op.as_str() {
            "add" | "replace" => match parent {
                Value::Object(map) => {
                    map.insert(key, op.value.clone());
                }
                Value::Array(arr) => {
                    if key == "-" {
                        arr.push(op.value.clone());
                    } else {
                        let idx: usize = key
                            .parse()
                            .map_err(|_| ConductorError::PatchError(format!("invalid array index: {key}")))?;
                        if idx > arr.len() {
                            return Err(ConductorError::PatchError(format!("array index out of bounds: {idx}")));
                        }
                        if idx == arr.len() {
                            arr.push(op.value.clone());
                        } else {
                            arr[idx] = op.value.clone();
                        }
                    }
                }
                _ => return Err(ConductorError::PatchError(format!("cannot set into path: {}", op.path))),
            },
            "remove" => match parent {
                Value::Object(map) => {
                    map.remove(&key);
                }
                Value::Array(arr) => {
                    let idx: usize = key
                        .parse()
                        .map_err(|_| ConductorError::PatchError(format!("invalid array index: {key}")))?;
                    if idx < arr.len() {
                        arr.remove(idx);
                    }
                }
                _ => return Err(ConductorError::PatchError(format!("cannot remove path: {}", op.path))),
            },
            other => return Err(ConductorError::PatchError(format!("unsupported patch op: {other}"))),
        }
    }
    Ok(())
}

/// Split a JSON pointer into (parent pointer, final segment), unescaping
/// `~1`/`~0` in the final segment only (parent lookups go through
/// `Value::pointer_mut`, which does its own unescaping).
fn split_pointer(path: &str) -> Option<(String, String)> {
    if !path.starts_with('/') {
        return None;
    }
    let idx = path.rfind('/')?;
    let parent = path[..idx].to_string();
    let last = path[idx + 1..].replace("~1", "/").replace("~0", "~");
    Some((parent, last))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rejects_internal_attribute_path() {
        let patch = vec![PatchOp { op: "replace".into(), path: "/power_state".into(), value: json!("on") }];
        assert!(reject_internal_paths(&patch).is_err());
    }

    #[test]
    fn allows_public_attribute_path() {
        let patch = vec![PatchOp { op: "replace".into(), path: "/name".into(), value: json!("rack-42") }];
        assert!(reject_internal_paths(&patch).is_ok());
    }

    #[test]
    fn replace_sets_top_level_field() {
        let mut target = json!({ "name": "old", "extra": {} });
        let patch = vec![PatchOp { op: "replace".into(), path: "/name".into(), value: json!("new") }];
        apply(&mut target, &patch).unwrap();
        assert_eq!(target["name"], json!("new"));
    }

    #[test]
    fn add_inserts_nested_extra_key() {
        let mut target = json!({ "extra": {} });
        let patch = vec![PatchOp { op: "add".into(), path: "/extra/foo".into(), value: json!("bar") }];
        apply(&mut target, &patch).unwrap();
        assert_eq!(target["extra"]["foo"], json!("bar"));
    }

    #[test]
    fn remove_deletes_key() {
        let mut target = json!({ "extra": { "foo": "bar" } });
        let patch = vec![PatchOp { op: "remove".into(), path: "/extra/foo".into(), value: Value::Null }];
        apply(&mut target, &patch).unwrap();
        assert!(target["extra"].as_object().unwrap().get("foo").is_none());
    }
}
