//! JSON patch operations (the RFC 6902 subset the store accepts).

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOp {
    Add { path: String, value: Value },
    Replace { path: String, value: Value },
    Remove { path: String },
}

impl PatchOp {
    pub fn add(path: impl Into<String>, value: Value) -> Self {
        PatchOp::Add {
            path: path.into(),
            value,
        }
    }

    pub fn replace(path: impl Into<String>, value: Value) -> Self {
        PatchOp::Replace {
            path: path.into(),
            value,
        }
    }

    pub fn remove(path: impl Into<String>) -> Self {
        PatchOp::Remove { path: path.into() }
    }

    pub fn path(&self) -> &str {
        match self {
            PatchOp::Add { path, .. } | PatchOp::Replace { path, .. } | PatchOp::Remove { path } => {
                path
            }
        }
    }
}

/// Applies `ops` to `target` in order. On error `target` may be partially
/// patched; callers patch a clone.
pub fn apply_patch(target: &mut Value, ops: &[PatchOp]) -> Result<()> {
    for op in ops {
        apply_one(target, op)?;
    }
    Ok(())
}

fn apply_one(target: &mut Value, op: &PatchOp) -> Result<()> {
    let (parent_tokens, last) = split_pointer(op.path())?;
    let Some(last) = last else {
        // Whole-document operation
        return match op {
            PatchOp::Add { value, .. } | PatchOp::Replace { value, .. } => {
                *target = value.clone();
                Ok(())
            }
            PatchOp::Remove { .. } => bail!("cannot remove the document root"),
        };
    };

    let mut parent = &mut *target;
    for token in &parent_tokens {
        parent = match parent {
            Value::Object(map) => map
                .get_mut(token.as_str())
                .ok_or_else(|| anyhow!("path not found: {}", op.path()))?,
            Value::Array(items) => {
                let index = parse_index(token, items.len())?;
                items
                    .get_mut(index)
                    .ok_or_else(|| anyhow!("path not found: {}", op.path()))?
            }
            _ => bail!("path not found: {}", op.path()),
        };
    }

    match (parent, op) {
        (Value::Object(map), PatchOp::Add { value, .. }) => {
            map.insert(last, value.clone());
        }
        (Value::Object(map), PatchOp::Replace { value, .. }) => {
            let slot = map
                .get_mut(last.as_str())
                .ok_or_else(|| anyhow!("path not found: {}", op.path()))?;
            *slot = value.clone();
        }
        (Value::Object(map), PatchOp::Remove { .. }) => {
            map.remove(last.as_str())
                .ok_or_else(|| anyhow!("path not found: {}", op.path()))?;
        }
        (Value::Array(items), PatchOp::Add { value, .. }) => {
            if last == "-" {
                items.push(value.clone());
            } else {
                let index = parse_index(&last, items.len() + 1)?;
                items.insert(index, value.clone());
            }
        }
        (Value::Array(items), PatchOp::Replace { value, .. }) => {
            let index = parse_index(&last, items.len())?;
            items[index] = value.clone();
        }
        (Value::Array(items), PatchOp::Remove { .. }) => {
            let index = parse_index(&last, items.len())?;
            items.remove(index);
        }
        _ => bail!("path not found: {}", op.path()),
    }

    Ok(())
}

/// Splits a JSON pointer into its parent tokens and final token.
fn split_pointer(pointer: &str) -> Result<(Vec<String>, Option<String>)> {
    if pointer.is_empty() {
        return Ok((Vec::new(), None));
    }
    let Some(rest) = pointer.strip_prefix('/') else {
        bail!("invalid JSON pointer: {:?}", pointer);
    };

    let mut tokens: Vec<String> = rest
        .split('/')
        .map(|token| token.replace("~1", "/").replace("~0", "~"))
        .collect();
    let last = tokens.pop();
    Ok((tokens, last))
}

fn parse_index(token: &str, len: usize) -> Result<usize> {
    let index: usize = token
        .parse()
        .map_err(|_| anyhow!("invalid array index: {:?}", token))?;
    if index >= len {
        bail!("array index out of bounds: {}", index);
    }
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn replace_and_add_nested_fields() {
        let mut doc = json!({ "active": true, "data": { "count": 1 } });
        apply_patch(
            &mut doc,
            &[
                PatchOp::replace("/active", json!(false)),
                PatchOp::add("/data/status", json!("open")),
            ],
        )
        .unwrap();
        assert_eq!(
            doc,
            json!({ "active": false, "data": { "count": 1, "status": "open" } })
        );
    }

    #[test]
    fn array_operations() {
        let mut doc = json!({ "markers": ["a", "b"] });
        apply_patch(
            &mut doc,
            &[
                PatchOp::add("/markers/-", json!("c")),
                PatchOp::remove("/markers/0"),
                PatchOp::replace("/markers/1", json!("z")),
            ],
        )
        .unwrap();
        assert_eq!(doc, json!({ "markers": ["b", "z"] }));
    }

    #[test]
    fn escaped_tokens() {
        let mut doc = json!({ "links": {} });
        apply_patch(&mut doc, &[PatchOp::add("/links/a~1b", json!(1))]).unwrap();
        assert_eq!(doc, json!({ "links": { "a/b": 1 } }));
    }

    #[test]
    fn missing_paths_fail() {
        let mut doc = json!({ "data": {} });
        assert!(apply_patch(&mut doc, &[PatchOp::replace("/data/nope", json!(1))]).is_err());
        assert!(apply_patch(&mut doc, &[PatchOp::remove("/nope")]).is_err());
        assert!(apply_patch(&mut doc, &[PatchOp::add("no-slash", json!(1))]).is_err());
    }

    #[test]
    fn serializes_with_op_tag() {
        let op = PatchOp::replace("/active", json!(false));
        assert_eq!(
            serde_json::to_value(&op).unwrap(),
            json!({ "op": "replace", "path": "/active", "value": false })
        );
    }
}
