use serde_json::{Map, Value};
use shopsignal_core::types::{PatchKind, PatchOp};

/// Apply one operation to `doc` in place.
pub fn apply(doc: &mut Value, op: &PatchOp) {
    if op.is_root() {
        if op.op == PatchKind::Append {
            merge_root(doc, &op.value);
        }
        return;
    }

    // Leading segment is the empty string before the first '/'.
    let parts: Vec<&str> = op.path.split('/').skip(1).collect();
    let Some((last, walk)) = parts.split_last() else {
        return;
    };

    let mut parent = doc;
    for (i, seg) in walk.iter().enumerate() {
        parent = match descend(parent, seg, parts[i + 1]) {
            Some(child) => child,
            None => return,
        };
    }

    match op.op {
        PatchKind::Add | PatchKind::Replace => assign(parent, last, op.value.clone()),
        PatchKind::Append => append(parent, last, &op.value),
        PatchKind::Remove => remove(parent, last),
        PatchKind::Truncate => truncate(parent, last, &op.value),
        PatchKind::Unknown => {}
    }
}

/// Apply a sequence of operations in order.
pub fn apply_all<'a>(doc: &mut Value, ops: impl IntoIterator<Item = &'a PatchOp>) {
    for op in ops {
        apply(doc, op);
    }
}

fn merge_root(doc: &mut Value, incoming: &Value) {
    if let (Value::Object(root), Value::Object(fields)) = (doc, incoming) {
        for (k, v) in fields {
            root.insert(k.clone(), v.clone());
        }
    }
}

fn is_index(seg: &str) -> bool {
    !seg.is_empty() && seg.bytes().all(|b| b.is_ascii_digit())
}

fn container_for(next: &str) -> Value {
    if is_index(next) {
        Value::Array(Vec::new())
    } else {
        Value::Object(Map::new())
    }
}

/// Step into `seg`, creating the container on first write. Scalars and nulls
/// under an object key stop the walk.
fn descend<'a>(parent: &'a mut Value, seg: &str, next: &str) -> Option<&'a mut Value> {
    let child = match parent {
        Value::Object(map) => map
            .entry(seg.to_string())
            .or_insert_with(|| container_for(next)),
        Value::Array(items) => {
            if !is_index(seg) {
                return None;
            }
            let idx: usize = seg.parse().ok()?;
            // Padding nulls stand in for holes and are filled like missing slots.
            if items.get(idx).map_or(true, Value::is_null)
                && !set_index(items, idx, container_for(next))
            {
                return None;
            }
            &mut items[idx]
        }
        _ => return None,
    };
    if child.is_object() || child.is_array() {
        Some(child)
    } else {
        None
    }
}

/// Largest run of padding nulls a single write may create. Indices further
/// past the end are dropped.
pub const MAX_INDEX_GAP: usize = 1024;

fn set_index(items: &mut Vec<Value>, idx: usize, value: Value) -> bool {
    if idx < items.len() {
        items[idx] = value;
        return true;
    }
    if idx - items.len() > MAX_INDEX_GAP {
        return false;
    }
    items.resize(idx, Value::Null);
    items.push(value);
    true
}

fn slot_mut<'a>(parent: &'a mut Value, key: &str) -> Option<&'a mut Value> {
    match parent {
        Value::Object(map) => map.get_mut(key),
        Value::Array(items) if is_index(key) => items.get_mut(key.parse::<usize>().ok()?),
        _ => None,
    }
}

fn assign(parent: &mut Value, key: &str, value: Value) {
    match parent {
        Value::Object(map) => {
            map.insert(key.to_string(), value);
        }
        Value::Array(items) if is_index(key) => {
            if let Ok(idx) = key.parse::<usize>() {
                set_index(items, idx, value);
            }
        }
        _ => {}
    }
}

fn append(parent: &mut Value, key: &str, value: &Value) {
    let merged = match slot_mut(parent, key) {
        Some(Value::Array(items)) => {
            match value {
                Value::Array(more) => items.extend(more.iter().cloned()),
                other => items.push(other.clone()),
            }
            true
        }
        Some(Value::String(text)) => {
            match value {
                Value::String(s) => text.push_str(s),
                other => text.push_str(&other.to_string()),
            }
            true
        }
        _ => false,
    };
    if !merged {
        assign(parent, key, value.clone());
    }
}

fn remove(parent: &mut Value, key: &str) {
    match parent {
        Value::Array(items) => {
            if let Ok(idx) = key.parse::<usize>() {
                if idx < items.len() {
                    items.remove(idx);
                }
            }
        }
        Value::Object(map) => {
            map.remove(key);
        }
        _ => {}
    }
}

fn truncate(parent: &mut Value, key: &str, value: &Value) {
    let Some(len) = whole_number(value) else {
        return;
    };
    if let Some(Value::Array(items)) = slot_mut(parent, key) {
        if len < items.len() {
            items.truncate(len);
        }
    }
}

fn whole_number(value: &Value) -> Option<usize> {
    if let Some(n) = value.as_u64() {
        return usize::try_from(n).ok();
    }
    let f = value.as_f64()?;
    (f >= 0.0 && f.fract() == 0.0).then_some(f as usize)
}
