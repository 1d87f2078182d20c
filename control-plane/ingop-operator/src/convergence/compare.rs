use std::collections::BTreeMap;

use ingop_store::{DesiredState, ManagedResource};
use serde_json::{Map, Number, Value};

/// Which part of the spec body the desired computation owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecOwnership {
    /// Spec is written on create and never compared afterwards.
    None,
    Whole,
    /// Only these top-level keys of the spec body.
    Fields(Vec<&'static str>),
}

/// Parts of an object the desired computation owns. Everything else on the
/// current object belongs to other writers and is carried through updates.
///
/// Owned labels and annotations are the keys present in the desired
/// metadata; other keys are left alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldOwnership {
    pub spec: SpecOwnership,
    pub labels: bool,
    pub annotations: bool,
}

impl FieldOwnership {
    pub fn create_only() -> Self {
        Self {
            spec: SpecOwnership::None,
            labels: false,
            annotations: false,
        }
    }

    pub fn whole_spec() -> Self {
        Self {
            spec: SpecOwnership::Whole,
            labels: false,
            annotations: false,
        }
    }

    pub fn spec_fields(keys: &[&'static str]) -> Self {
        Self {
            spec: SpecOwnership::Fields(keys.to_vec()),
            labels: false,
            annotations: false,
        }
    }

    pub fn labels_only() -> Self {
        Self {
            spec: SpecOwnership::None,
            labels: true,
            annotations: false,
        }
    }
}

fn is_empty(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::Object(m) => m.is_empty(),
        Value::Array(a) => a.is_empty(),
        _ => false,
    }
}

/// Structural equality where `null`, `{}`, `[]` and a missing key are all the
/// same, at any depth. Numbers compare by value, so `2` equals `2.0`.
pub fn equate_empty(a: &Value, b: &Value) -> bool {
    if is_empty(a) && is_empty(b) {
        return true;
    }
    match (a, b) {
        (Value::Object(x), Value::Object(y)) => {
            x.iter().all(|(k, v)| equate_empty(v, y.get(k).unwrap_or(&Value::Null)))
                && y.iter()
                    .filter(|(k, _)| !x.contains_key(*k))
                    .all(|(_, v)| is_empty(v))
        }
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len()
                && x.iter().zip(y).all(|(l, r)| equate_empty(l, r))
        }
        (Value::Number(x), Value::Number(y)) => numbers_equal(x, y),
        _ => a == b,
    }
}

/// Integers compare exactly; only when a float is involved do both sides
/// go through `f64`.
fn numbers_equal(x: &Number, y: &Number) -> bool {
    let int = |n: &Number| {
        n.as_i64()
            .map(i128::from)
            .or_else(|| n.as_u64().map(i128::from))
    };
    match (int(x), int(y)) {
        (Some(l), Some(r)) => l == r,
        _ => match (x.as_f64(), y.as_f64()) {
            (Some(l), Some(r)) => l == r,
            _ => x == y,
        },
    }
}

fn field<'a>(v: &'a Value, key: &str) -> &'a Value {
    v.get(key).unwrap_or(&Value::Null)
}

/// Compare the just-fetched `current` with `desired` over the owned fields.
///
/// Returns `None` when nothing owned differs. Otherwise returns a copy of
/// `current` (resource version, status and unowned fields included) with
/// the owned fields replaced by their desired values.
pub fn compare(
    current: &ManagedResource,
    desired: &DesiredState,
    ownership: &FieldOwnership,
) -> Option<ManagedResource> {
    let mut merged = current.clone();
    let mut changed = false;

    match &ownership.spec {
        SpecOwnership::None => {}
        SpecOwnership::Whole => {
            if !equate_empty(&current.spec, &desired.spec) {
                merged.spec = desired.spec.clone();
                changed = true;
            }
        }
        SpecOwnership::Fields(keys) => {
            for key in keys {
                let want = field(&desired.spec, key);
                if equate_empty(field(&current.spec, key), want) {
                    continue;
                }
                if !merged.spec.is_object() {
                    merged.spec = Value::Object(Map::new());
                }
                if let Value::Object(spec) = &mut merged.spec {
                    if want.is_null() {
                        spec.remove(*key);
                    } else {
                        spec.insert((*key).to_string(), want.clone());
                    }
                }
                changed = true;
            }
        }
    }

    if ownership.labels {
        changed |= overlay(&mut merged.metadata.labels, &desired.metadata.labels);
    }
    if ownership.annotations {
        changed |= overlay(
            &mut merged.metadata.annotations,
            &desired.metadata.annotations,
        );
    }

    changed.then_some(merged)
}

fn overlay(
    target: &mut BTreeMap<String, String>,
    owned: &BTreeMap<String, String>,
) -> bool {
    let mut changed = false;
    for (k, v) in owned {
        if target.get(k) != Some(v) {
            target.insert(k.clone(), v.clone());
            changed = true;
        }
    }
    changed
}

fn writable_view(obj: &ManagedResource) -> Value {
    serde_json::json!({
        "metadata": {
            "labels": obj.metadata.labels,
            "annotations": obj.metadata.annotations,
        },
        "spec": obj.spec,
    })
}

/// Path-based list of differences between the writable parts of two
/// objects, one change per line, empty when they are equal-up-to-empty.
///
/// Take it against the copy fetched before the write: the store may default
/// fields on write, so the returned object is not a fair baseline.
pub fn diff(before: &ManagedResource, after: &ManagedResource) -> String {
    let mut lines = Vec::new();
    diff_values("", &writable_view(before), &writable_view(after), &mut lines);
    lines.join("\n")
}

fn render(v: &Value) -> String {
    if v.is_null() {
        "<unset>".to_string()
    } else {
        v.to_string()
    }
}

fn diff_values(path: &str, a: &Value, b: &Value, out: &mut Vec<String>) {
    if equate_empty(a, b) {
        return;
    }
    if let (Value::Object(x), Value::Object(y)) = (a, b) {
        let keys: std::collections::BTreeSet<&String> =
            x.keys().chain(y.keys()).collect();
        for k in keys {
            let sub = if path.is_empty() {
                k.clone()
            } else {
                format!("{path}.{k}")
            };
            diff_values(
                &sub,
                x.get(k).unwrap_or(&Value::Null),
                y.get(k).unwrap_or(&Value::Null),
                out,
            );
        }
        return;
    }
    out.push(format!("{path}: {} -> {}", render(a), render(b)));
}
