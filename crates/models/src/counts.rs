use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Per-member message counter of a group.
///
/// Written as a plain JSON object (`{"<memberId>": n}`). On read it also
/// accepts the entry-list encoding some deployments produced
/// (`[{"id": "...", "count": n}]` or `[["...", n]]`), so callers get the same
/// get/set/iterate behaviour whichever backend wrote the record. Entries that
/// carry no usable number are dropped.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct MessageCounts(BTreeMap<String, i64>);

impl MessageCounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count for `member`; zero when never seen.
    pub fn get(&self, member: &str) -> i64 {
        self.0.get(member).copied().unwrap_or(0)
    }

    pub fn set(&mut self, member: impl Into<String>, count: i64) {
        self.0.insert(member.into(), count);
    }

    /// Adds `delta` and returns the new count.
    pub fn increment(&mut self, member: &str, delta: i64) -> i64 {
        let slot = self.0.entry(member.to_string()).or_insert(0);
        *slot = slot.saturating_add(delta);
        *slot
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Members ordered by count, highest first; ties by member id.
    pub fn ranked(&self) -> Vec<(&str, i64)> {
        let mut all: Vec<_> = self.iter().collect();
        all.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        all
    }
}

impl<'de> Deserialize<'de> for MessageCounts {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        let mut counts = MessageCounts::new();
        match raw {
            Value::Object(map) => {
                for (member, n) in map {
                    if let Some(n) = as_count(&n) {
                        counts.set(member, n);
                    }
                }
            }
            Value::Array(entries) => {
                for entry in entries {
                    if let Some((member, n)) = entry_pair(&entry) {
                        counts.set(member, n);
                    }
                }
            }
            _ => {}
        }
        Ok(counts)
    }
}

fn as_count(v: &Value) -> Option<i64> {
    v.as_i64().or_else(|| v.as_f64().map(|f| f.trunc() as i64))
}

fn entry_pair(entry: &Value) -> Option<(String, i64)> {
    match entry {
        Value::Object(obj) => {
            let member = obj.get("id").or_else(|| obj.get("key"))?.as_str()?;
            let n = obj.get("count").or_else(|| obj.get("value")).and_then(as_count)?;
            Some((member.to_string(), n))
        }
        Value::Array(pair) if pair.len() == 2 => Some((pair[0].as_str()?.to_string(), as_count(&pair[1])?)),
        _ => None,
    }
}
