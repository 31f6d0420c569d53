//! Schemaless document helpers shared by both storage backends.
//!
//! Records travel between the store and its backends as plain JSON objects.
//! Typed records (`UserRecord`, `GroupRecord`) are decoded from a document
//! only after [`backfill`] has repaired it against the record's defaults, and
//! every mutation is expressed as a [`Patch`] so the JSON file and the
//! database apply exactly the same field operations.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::errors::ModelError;

/// A stored record: one JSON object.
pub type Document = serde_json::Map<String, Value>;

/// The two record kinds the store knows about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Collection {
    Users,
    Groups,
}

impl Collection {
    /// Key in the JSON file and table name in the database.
    pub fn name(&self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Groups => "groups",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Location of a field inside a document, as a sequence of object keys.
///
/// The dotted form (`settings.adminOnly`) is accepted by [`FieldPath::parse`];
/// keys that themselves contain dots (participant ids do) must be built with
/// [`FieldPath::new`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    pub fn new<I, S>(segments: I) -> Result<Self, ModelError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() {
            return Err(ModelError::Validation("field path must not be empty".into()));
        }
        if segments.iter().any(|s| s.is_empty()) {
            return Err(ModelError::Validation("field path segments must not be empty".into()));
        }
        Ok(Self(segments))
    }

    /// Single top-level field with a name known to be non-empty.
    pub(crate) fn top(name: &str) -> Self {
        Self(vec![name.to_string()])
    }

    /// `parent.key` where both names are known to be non-empty.
    pub(crate) fn nested(parent: &str, key: &str) -> Self {
        Self(vec![parent.to_string(), key.to_string()])
    }

    pub fn parse(dotted: &str) -> Result<Self, ModelError> {
        Self::new(dotted.split('.'))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Top-level field name.
    pub fn root(&self) -> &str {
        &self.0[0]
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

/// A single field operation.
#[derive(Clone, Debug, PartialEq)]
pub enum Op {
    /// Replace the value at the path.
    Set(Value),
    /// Add to the number at the path; a missing or non-numeric value counts as zero.
    Inc(i64),
}

#[derive(Clone, Debug, PartialEq)]
pub struct PatchOp {
    pub path: FieldPath,
    pub op: Op,
}

/// Ordered list of field operations applied to one document.
///
/// Intermediate objects along a path are created when missing, and replaced
/// when they hold a non-object value. Sibling fields are never touched.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Patch {
    ops: Vec<PatchOp>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, path: FieldPath, value: impl Into<Value>) -> Self {
        self.ops.push(PatchOp { path, op: Op::Set(value.into()) });
        self
    }

    pub fn inc(mut self, path: FieldPath, delta: i64) -> Self {
        self.ops.push(PatchOp { path, op: Op::Inc(delta) });
        self
    }

    /// One `set` per top-level key of `fields`, in key order.
    pub fn from_fields(fields: Document) -> Self {
        let ops = fields
            .into_iter()
            .map(|(key, value)| PatchOp { path: FieldPath::top(&key), op: Op::Set(value) })
            .collect();
        Self { ops }
    }

    pub fn ops(&self) -> &[PatchOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Apply every operation to `doc` in order.
    pub fn apply(&self, doc: &mut Document) {
        for op in &self.ops {
            apply_at(doc, op.path.segments(), &op.op);
        }
    }

    /// Wire form consumed by the `doc_apply` SQL function:
    /// `[{"path": [...], "set": v} | {"path": [...], "inc": n}, ...]`.
    pub fn to_json(&self) -> Value {
        Value::Array(
            self.ops
                .iter()
                .map(|op| match &op.op {
                    Op::Set(v) => json!({ "path": op.path, "set": v }),
                    Op::Inc(n) => json!({ "path": op.path, "inc": n }),
                })
                .collect(),
        )
    }
}

fn apply_at(doc: &mut Document, path: &[String], op: &Op) {
    match path {
        [] => {}
        [leaf] => {
            let next = match op {
                Op::Set(v) => v.clone(),
                Op::Inc(delta) => add(doc.get(leaf), *delta),
            };
            doc.insert(leaf.clone(), next);
        }
        [head, rest @ ..] => {
            let child = doc.entry(head.clone()).or_insert_with(|| Value::Object(Document::new()));
            if let Value::Object(map) = &mut *child {
                apply_at(map, rest, op);
                return;
            }
            let mut map = Document::new();
            apply_at(&mut map, rest, op);
            *child = Value::Object(map);
        }
    }
}

fn add(current: Option<&Value>, delta: i64) -> Value {
    match current {
        Some(Value::Number(n)) => match n.as_i64() {
            Some(i) => Value::from(i.saturating_add(delta)),
            None => Value::from(n.as_f64().unwrap_or(0.0) + delta as f64),
        },
        _ => Value::from(delta),
    }
}

/// Outcome of [`backfill`].
#[derive(Debug, Default)]
pub struct Backfilled {
    pub doc: Document,
    /// Dotted paths whose stored value had the wrong shape and were reset.
    pub repaired: Vec<String>,
}

/// Overlay `stored` onto `defaults`.
///
/// Fields missing from `stored` take the default; fields whose JSON kind does
/// not match the default's are reset to the default and reported; nested
/// objects are merged recursively; fields unknown to the defaults are kept.
pub fn backfill(defaults: &Document, stored: &Document) -> Backfilled {
    let mut out = Backfilled::default();
    backfill_into(defaults, stored, "", &mut out);
    out
}

fn backfill_into(defaults: &Document, stored: &Document, prefix: &str, out: &mut Backfilled) {
    let doc = &mut out.doc;
    let mut repaired = Vec::new();
    for (key, default) in defaults {
        let value = match (default, stored.get(key)) {
            (_, None) => default.clone(),
            (Value::Object(d), Some(Value::Object(s))) => {
                let mut nested = Backfilled::default();
                backfill_into(d, s, &format!("{prefix}{key}."), &mut nested);
                repaired.extend(nested.repaired);
                Value::Object(nested.doc)
            }
            (_, Some(s)) => match coerce(default, s) {
                Some(v) => v,
                None => {
                    repaired.push(format!("{prefix}{key}"));
                    default.clone()
                }
            },
        };
        doc.insert(key.clone(), value);
    }
    for (key, value) in stored {
        if !defaults.contains_key(key) {
            doc.insert(key.clone(), value.clone());
        }
    }
    out.repaired.extend(repaired);
}

/// `Some(value)` when `stored` may stand in for `default`.
fn coerce(default: &Value, stored: &Value) -> Option<Value> {
    match (default, stored) {
        // Nullable text fields: lastDailyReward, welcomeMessage.
        (Value::Null, Value::Null | Value::String(_)) => Some(stored.clone()),
        (Value::Bool(_), Value::Bool(_)) => Some(stored.clone()),
        (Value::String(_), Value::String(_)) => Some(stored.clone()),
        (Value::Array(_), Value::Array(_)) => Some(stored.clone()),
        (Value::Number(d), Value::Number(s)) => {
            if d.is_f64() || s.is_i64() {
                Some(stored.clone())
            } else if let Some(u) = s.as_u64() {
                Some(Value::from(i64::try_from(u).unwrap_or(i64::MAX)))
            } else {
                // Integer field holding a float, e.g. a fractional coin balance.
                s.as_f64().map(|f| Value::from(f.trunc() as i64))
            }
        }
        _ => None,
    }
}

/// Numeric value used for sorting; anything that is not a JSON number sorts as zero.
pub fn sort_key(value: Option<&Value>) -> f64 {
    value.and_then(Value::as_f64).unwrap_or(0.0)
}

/// Equality used by list filters. Numbers compare by value so `5` matches `5.0`.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}
