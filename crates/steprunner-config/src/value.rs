//! Configuration values with provenance.
//!
//! Raw configuration documents are converted leaf-by-leaf into [`ConfigNode`]
//! trees whose leaves are [`ConfigValue`]s. Each leaf remembers the document it
//! came from and where inside that document it lives, which is what decryptors
//! need to decrypt it and what error messages use to point at it.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::{ConfigResult, DecryptorRegistry};

/// A mapping of configuration keys to nodes, in document order.
pub type ConfigMap = IndexMap<String, ConfigNode>;

/// Where a configuration value was read from.
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// A YAML or JSON file on disk.
    File(PathBuf),
    /// An in-memory document.
    Document(Arc<Value>),
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::File(path) => write!(f, "{}", path.display()),
            ConfigSource::Document(_) => write!(f, "<in-memory document>"),
        }
    }
}

/// One step of a path into a configuration document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathPart {
    Key(String),
    Index(usize),
}

impl From<&str> for PathPart {
    fn from(key: &str) -> Self {
        PathPart::Key(key.to_string())
    }
}

impl From<usize> for PathPart {
    fn from(index: usize) -> Self {
        PathPart::Index(index)
    }
}

/// A scalar configuration value and where it came from.
///
/// Equality compares only the value; provenance is for diagnostics and
/// decryption.
#[derive(Debug, Clone)]
pub struct ConfigValue {
    raw: Value,
    source: ConfigSource,
    path_parts: Vec<PathPart>,
}

impl ConfigValue {
    pub fn new(raw: Value, source: ConfigSource, path_parts: Vec<PathPart>) -> Self {
        Self {
            raw,
            source,
            path_parts,
        }
    }

    /// The value as written in its source, never decrypted.
    pub fn raw_value(&self) -> &Value {
        &self.raw
    }

    pub fn source(&self) -> &ConfigSource {
        &self.source
    }

    pub fn path_parts(&self) -> &[PathPart] {
        &self.path_parts
    }

    /// Dotted path of this value inside its source, e.g. `a.b[0].c`.
    pub fn path(&self) -> String {
        let mut path = String::new();
        for part in &self.path_parts {
            match part {
                PathPart::Key(key) => {
                    if !path.is_empty() {
                        path.push('.');
                    }
                    path.push_str(key);
                }
                PathPart::Index(index) => path.push_str(&format!("[{index}]")),
            }
        }
        path
    }

    /// The resolved value. Strings claimed by a registered decryptor come back
    /// decrypted; everything else is returned unchanged.
    pub fn value(&self, decryptors: &DecryptorRegistry) -> ConfigResult<Value> {
        if self.raw.is_string() {
            if let Some(decrypted) = decryptors.decrypt(self)? {
                return Ok(Value::String(decrypted));
            }
        }
        Ok(self.raw.clone())
    }
}

impl PartialEq for ConfigValue {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.raw {
            Value::String(s) => f.write_str(s),
            other => write!(f, "{other}"),
        }
    }
}

/// A configuration tree whose leaves are [`ConfigValue`]s.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigNode {
    Value(ConfigValue),
    Sequence(Vec<ConfigNode>),
    Mapping(ConfigMap),
}

impl ConfigNode {
    /// Wrap every leaf of `value` as a [`ConfigValue`] rooted at `path_parts`
    /// inside `source`.
    pub fn from_value(value: &Value, source: &ConfigSource, path_parts: &[PathPart]) -> Self {
        match value {
            Value::Object(map) => ConfigNode::Mapping(map_from_value(map, source, path_parts)),
            Value::Array(items) => ConfigNode::Sequence(
                items
                    .iter()
                    .enumerate()
                    .map(|(index, item)| {
                        ConfigNode::from_value(item, source, &child_path(path_parts, index.into()))
                    })
                    .collect(),
            ),
            scalar => ConfigNode::Value(ConfigValue::new(
                scalar.clone(),
                source.clone(),
                path_parts.to_vec(),
            )),
        }
    }

    /// Plain data form of the tree with every leaf resolved (and decrypted).
    pub fn to_value(&self, decryptors: &DecryptorRegistry) -> ConfigResult<Value> {
        Ok(match self {
            ConfigNode::Value(value) => value.value(decryptors)?,
            ConfigNode::Sequence(items) => Value::Array(
                items
                    .iter()
                    .map(|item| item.to_value(decryptors))
                    .collect::<ConfigResult<_>>()?,
            ),
            ConfigNode::Mapping(map) => Value::Object(map_to_value(map, decryptors)?),
        })
    }

    /// Plain data form of the tree without decrypting anything.
    pub fn to_raw_value(&self) -> Value {
        match self {
            ConfigNode::Value(value) => value.raw_value().clone(),
            ConfigNode::Sequence(items) => {
                Value::Array(items.iter().map(ConfigNode::to_raw_value).collect())
            }
            ConfigNode::Mapping(map) => Value::Object(
                map.iter()
                    .map(|(key, node)| (key.clone(), node.to_raw_value()))
                    .collect(),
            ),
        }
    }

    pub fn as_config_value(&self) -> Option<&ConfigValue> {
        match self {
            ConfigNode::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&ConfigMap> {
        match self {
            ConfigNode::Mapping(map) => Some(map),
            _ => None,
        }
    }
}

impl From<ConfigValue> for ConfigNode {
    fn from(value: ConfigValue) -> Self {
        ConfigNode::Value(value)
    }
}

/// Convert a JSON object into a [`ConfigMap`] rooted at `path_parts`.
pub fn map_from_value(
    map: &Map<String, Value>,
    source: &ConfigSource,
    path_parts: &[PathPart],
) -> ConfigMap {
    map.iter()
        .map(|(key, value)| {
            let path = child_path(path_parts, key.as_str().into());
            (key.clone(), ConfigNode::from_value(value, source, &path))
        })
        .collect()
}

/// Resolve every leaf of a [`ConfigMap`] into a plain JSON object.
pub fn map_to_value(
    map: &ConfigMap,
    decryptors: &DecryptorRegistry,
) -> ConfigResult<Map<String, Value>> {
    map.iter()
        .map(|(key, node)| -> ConfigResult<(String, Value)> {
            Ok((key.clone(), node.to_value(decryptors)?))
        })
        .collect()
}

/// Wrap a plain mapping (implementer defaults, overrides) as its own source.
pub(crate) fn map_from_plain(values: &IndexMap<String, Value>) -> ConfigMap {
    let document: Map<String, Value> = values
        .iter()
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    let source = ConfigSource::Document(Arc::new(Value::Object(document.clone())));
    map_from_value(&document, &source, &[])
}

pub(crate) fn child_path(parent: &[PathPart], part: PathPart) -> Vec<PathPart> {
    let mut path = parent.to_vec();
    path.push(part);
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document(value: &Value) -> ConfigSource {
        ConfigSource::Document(Arc::new(value.clone()))
    }

    #[test]
    fn test_round_trip_preserves_data() {
        let raw = json!({
            "a": "one",
            "b": [1, 2, {"c": true, "d": null}],
            "e": {"f": {"g": 1.5}},
            "h": []
        });

        let node = ConfigNode::from_value(&raw, &document(&raw), &[]);
        assert_eq!(node.to_value(&DecryptorRegistry::new()).unwrap(), raw);
        assert_eq!(node.to_raw_value(), raw);
    }

    #[test]
    fn test_leaves_record_their_path() {
        let raw = json!({"outer": {"list": ["x", {"inner": "y"}]}});
        let node = ConfigNode::from_value(&raw, &document(&raw), &[PathPart::from("root")]);

        let list = match &node.as_mapping().unwrap()["outer"].as_mapping().unwrap()["list"] {
            ConfigNode::Sequence(items) => items.clone(),
            other => panic!("expected sequence, got {other:?}"),
        };
        let first = list[0].as_config_value().unwrap();
        assert_eq!(first.path(), "root.outer.list[0]");

        let inner = list[1].as_mapping().unwrap()["inner"].as_config_value().unwrap();
        assert_eq!(inner.path(), "root.outer.list[1].inner");
        assert_eq!(
            inner.path_parts(),
            &[
                PathPart::Key("root".into()),
                PathPart::Key("outer".into()),
                PathPart::Key("list".into()),
                PathPart::Index(1),
                PathPart::Key("inner".into()),
            ]
        );
    }

    #[test]
    fn test_equality_ignores_provenance() {
        let a = ConfigValue::new(json!("same"), ConfigSource::File("a.yml".into()), vec!["x".into()]);
        let b = ConfigValue::new(json!("same"), document(&json!({})), vec!["y".into(), 0usize.into()]);
        let c = ConfigValue::new(json!("other"), ConfigSource::File("a.yml".into()), vec!["x".into()]);

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_value_without_decryptors_is_raw() {
        let value = ConfigValue::new(json!("ENC[secret]"), ConfigSource::File("f.yml".into()), vec![]);
        assert_eq!(
            value.value(&DecryptorRegistry::new()).unwrap(),
            json!("ENC[secret]")
        );
    }

    #[test]
    fn test_display() {
        let text = ConfigValue::new(json!("hello"), document(&json!({})), vec![]);
        let number = ConfigValue::new(json!(42), document(&json!({})), vec![]);
        assert_eq!(text.to_string(), "hello");
        assert_eq!(number.to_string(), "42");
        assert_eq!(ConfigSource::File("/tmp/c.yml".into()).to_string(), "/tmp/c.yml");
    }

    #[test]
    fn test_map_from_plain() {
        let mut plain = IndexMap::new();
        plain.insert("key".to_string(), json!("value"));
        plain.insert("list".to_string(), json!(["a"]));

        let map = map_from_plain(&plain);
        assert_eq!(map["key"].to_raw_value(), json!("value"));
        assert_eq!(map["list"].to_raw_value(), json!(["a"]));
        assert_eq!(map["key"].as_config_value().unwrap().path(), "key");
    }
}
