// Ordered, case-insensitive key -> tagged-value map, modelled after
// celix::Properties / celix_properties_t. Insertion order is preserved for
// iteration; setting a key replaces its value and tag outright.

use std::fmt;

use crate::error::Result;
use crate::version::Version;

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    String(String),
    Long(i64),
    Double(f64),
    Bool(bool),
    Version(Version),
    /// Multi-valued string set, used internally for `objectClass` when a
    /// registration exposes more than one interface name.
    Set(Vec<String>),
}

impl PropertyValue {
    fn as_string(&self) -> String {
        match self {
            PropertyValue::String(s) => s.clone(),
            PropertyValue::Long(n) => n.to_string(),
            PropertyValue::Double(d) => d.to_string(),
            PropertyValue::Bool(b) => b.to_string(),
            PropertyValue::Version(v) => v.to_string(),
            PropertyValue::Set(items) => items.join(","),
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_string())
    }
}

fn normalize_key(key: &str) -> String {
    key.to_ascii_lowercase()
}

/// Ordered map from case-insensitive key to tagged value. Iteration replays
/// insertion order; re-setting an existing key keeps its original slot.
#[derive(Debug, Clone, Default)]
pub struct Properties {
    order: Vec<String>,
    values: std::collections::HashMap<String, (String, PropertyValue)>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: PropertyValue) {
        let key = key.into();
        let norm = normalize_key(&key);
        if !self.values.contains_key(&norm) {
            self.order.push(norm.clone());
        }
        self.values.insert(norm, (key, value));
    }

    pub fn set_string(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.set(key, PropertyValue::String(value.into()));
    }

    pub fn set_long(&mut self, key: impl Into<String>, value: i64) {
        self.set(key, PropertyValue::Long(value));
    }

    pub fn set_bool(&mut self, key: impl Into<String>, value: bool) {
        self.set(key, PropertyValue::Bool(value));
    }

    pub fn remove(&mut self, key: &str) -> Option<PropertyValue> {
        let norm = normalize_key(key);
        if let Some((_, value)) = self.values.remove(&norm) {
            self.order.retain(|k| k != &norm);
            Some(value)
        } else {
            None
        }
    }

    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.values.get(&normalize_key(key)).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(&normalize_key(key))
    }

    pub fn get_string(&self, key: &str, default: &str) -> String {
        self.get(key).map(|v| v.as_string()).unwrap_or_else(|| default.to_string())
    }

    pub fn get_long(&self, key: &str, default: i64) -> i64 {
        match self.get(key) {
            Some(PropertyValue::Long(n)) => *n,
            Some(PropertyValue::String(s)) => s.trim().parse().unwrap_or(default),
            Some(PropertyValue::Double(d)) => *d as i64,
            Some(PropertyValue::Bool(b)) => {
                if *b {
                    1
                } else {
                    0
                }
            }
            _ => default,
        }
    }

    pub fn get_double(&self, key: &str, default: f64) -> f64 {
        match self.get(key) {
            Some(PropertyValue::Double(d)) => *d,
            Some(PropertyValue::Long(n)) => *n as f64,
            Some(PropertyValue::String(s)) => s.trim().parse().unwrap_or(default),
            _ => default,
        }
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some(PropertyValue::Bool(b)) => *b,
            Some(PropertyValue::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" => false,
                _ => default,
            },
            Some(PropertyValue::Long(n)) => *n != 0,
            _ => default,
        }
    }

    pub fn get_version(&self, key: &str, default: Version) -> Version {
        match self.get(key) {
            Some(PropertyValue::Version(v)) => v.clone(),
            Some(PropertyValue::String(s)) => s.parse().unwrap_or(default),
            _ => default,
        }
    }

    /// Iterate entries in insertion order, yielding the original-case key.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.order.iter().map(move |norm| {
            let (orig, value) = &self.values[norm];
            (orig.as_str(), value)
        })
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Structured diagnostic dump, used in `debug!`/`info!` log lines instead
    /// of `Debug` formatting so property maps read the same in logs as in
    /// anything else that inspects them as JSON.
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (key, value) in self.iter() {
            let json_value = match value {
                PropertyValue::String(s) => serde_json::Value::String(s.clone()),
                PropertyValue::Long(n) => serde_json::Value::from(*n),
                PropertyValue::Double(d) => serde_json::Number::from_f64(*d)
                    .map(serde_json::Value::Number)
                    .unwrap_or(serde_json::Value::Null),
                PropertyValue::Bool(b) => serde_json::Value::Bool(*b),
                PropertyValue::Version(v) => serde_json::Value::String(v.to_string()),
                PropertyValue::Set(items) => {
                    serde_json::Value::Array(items.iter().cloned().map(serde_json::Value::String).collect())
                }
            };
            map.insert(key.to_string(), json_value);
        }
        serde_json::Value::Object(map)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.to_json())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_insertion_order() {
        let mut p = Properties::new();
        p.set_string("b", "2");
        p.set_string("a", "1");
        p.set_string("b", "overwritten");
        let keys: Vec<&str> = p.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(p.get_string("b", ""), "overwritten");
    }

    #[test]
    fn keys_are_case_insensitive() {
        let mut p = Properties::new();
        p.set_string("Service.Ranking", "5");
        assert_eq!(p.get_long("service.ranking", 0), 5);
    }

    #[test]
    fn coercion_falls_back_to_default() {
        let mut p = Properties::new();
        p.set_string("n", "not-a-number");
        assert_eq!(p.get_long("n", 42), 42);
    }

    #[test]
    fn bool_coercion_recognizes_common_spellings() {
        let mut p = Properties::new();
        p.set_string("clean", "Yes");
        assert!(p.get_bool("clean", false));
    }
}
