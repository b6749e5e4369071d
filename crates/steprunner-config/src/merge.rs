//! Deep merge with conflict detection.

use crate::{ConfigError, ConfigMap, ConfigNode, ConfigResult};

/// Merge `source` into `dest` in place.
///
/// Mappings present on both sides are merged recursively and equal values are
/// left alone. Any other key present on both sides is a conflict: it is
/// overwritten when `overwrite_duplicate_keys` is set, otherwise the merge
/// fails with [`ConfigError::MergeConflict`] naming the dotted key path from
/// the merge root. A failed merge may leave `dest` partially updated.
pub fn deep_merge(
    dest: &mut ConfigMap,
    source: ConfigMap,
    overwrite_duplicate_keys: bool,
) -> ConfigResult<()> {
    merge_at(dest, source, overwrite_duplicate_keys, &mut Vec::new())
}

/// [`deep_merge`] for a mapping that lives under `prefix` in a larger tree,
/// so conflict paths start at `prefix`.
pub(crate) fn deep_merge_under(
    prefix: &str,
    dest: &mut ConfigMap,
    source: ConfigMap,
    overwrite_duplicate_keys: bool,
) -> ConfigResult<()> {
    merge_at(dest, source, overwrite_duplicate_keys, &mut vec![prefix.to_string()])
}

fn merge_at(
    dest: &mut ConfigMap,
    source: ConfigMap,
    overwrite_duplicate_keys: bool,
    path: &mut Vec<String>,
) -> ConfigResult<()> {
    for (key, incoming) in source {
        match dest.get_mut(&key) {
            None => {
                dest.insert(key, incoming);
            }
            Some(existing) => match (existing, incoming) {
                (ConfigNode::Mapping(existing), ConfigNode::Mapping(incoming)) => {
                    path.push(key);
                    merge_at(existing, incoming, overwrite_duplicate_keys, path)?;
                    path.pop();
                }
                (existing, incoming) if *existing == incoming => {}
                (existing, incoming) if overwrite_duplicate_keys => {
                    *existing = incoming;
                }
                _ => {
                    path.push(key);
                    return Err(ConfigError::MergeConflict {
                        path: path.join("."),
                    });
                }
            },
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConfigSource;
    use crate::value::map_from_value;
    use serde_json::{Value, json};
    use std::sync::Arc;

    fn map(value: Value) -> ConfigMap {
        let source = ConfigSource::Document(Arc::new(value.clone()));
        map_from_value(value.as_object().unwrap(), &source, &[])
    }

    fn raw(map: &ConfigMap) -> Value {
        ConfigNode::Mapping(map.clone()).to_raw_value()
    }

    #[test]
    fn test_conflict_on_different_values() {
        let mut dest = map(json!({"a": 1}));
        let err = deep_merge(&mut dest, map(json!({"a": 2})), false).unwrap_err();
        assert_eq!(err.to_string(), "Conflict at a");
    }

    #[test]
    fn test_overwrite_on_different_values() {
        let mut dest = map(json!({"a": 1}));
        deep_merge(&mut dest, map(json!({"a": 2})), true).unwrap();
        assert_eq!(raw(&dest), json!({"a": 2}));
    }

    #[test]
    fn test_nested_mappings_merge() {
        let mut dest = map(json!({"a": {"b": 1}}));
        deep_merge(&mut dest, map(json!({"a": {"c": 2}})), false).unwrap();
        assert_eq!(raw(&dest), json!({"a": {"b": 1, "c": 2}}));
    }

    #[test]
    fn test_equal_values_are_not_conflicts() {
        let mut dest = map(json!({"a": "same", "l": [1, 2]}));
        deep_merge(&mut dest, map(json!({"a": "same", "l": [1, 2], "n": true})), false).unwrap();
        assert_eq!(raw(&dest), json!({"a": "same", "l": [1, 2], "n": true}));
    }

    #[test]
    fn test_conflict_path_is_dotted_from_merge_root() {
        let mut dest = map(json!({"outer": {"middle": {"leaf": "x"}}}));
        let err = deep_merge(
            &mut dest,
            map(json!({"outer": {"middle": {"leaf": "y"}}})),
            false,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MergeConflict { ref path } if path == "outer.middle.leaf"
        ));
    }

    #[test]
    fn test_mapping_against_scalar_conflicts() {
        let mut dest = map(json!({"a": {"b": 1}}));
        let err = deep_merge(&mut dest, map(json!({"a": "flat"})), false).unwrap_err();
        assert_eq!(err.to_string(), "Conflict at a");

        deep_merge(&mut dest, map(json!({"a": "flat"})), true).unwrap();
        assert_eq!(raw(&dest), json!({"a": "flat"}));
    }

    #[test]
    fn test_conflict_path_includes_prefix() {
        let mut dest = map(json!({"url": "a", "nested": {"k": 1}}));
        let err = deep_merge_under("dev", &mut dest, map(json!({"nested": {"k": 2}})), false)
            .unwrap_err();
        assert_eq!(err.to_string(), "Conflict at dev.nested.k");

        deep_merge_under("dev", &mut dest, map(json!({"url": "a", "extra": true})), false).unwrap();
        assert_eq!(raw(&dest), json!({"url": "a", "nested": {"k": 1}, "extra": true}));
    }

    #[test]
    fn test_lists_are_not_merged() {
        let mut dest = map(json!({"l": [1]}));
        let err = deep_merge(&mut dest, map(json!({"l": [2]})), false).unwrap_err();
        assert_eq!(err.to_string(), "Conflict at l");
    }
}
