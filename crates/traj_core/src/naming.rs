//! Dotted path helpers and the run-scoped result namespace.

use std::collections::BTreeMap;

use crate::error::StructuralError;
use crate::value::Value;

pub const SEPARATOR: char = '.';

/// Top-level group holding one subgroup per completed run.
pub const RUNS_GROUP: &str = "runs";

/// Name of the group holding run `index`'s results, e.g. `run_00000003`.
pub fn run_name(index: usize) -> String {
    format!("run_{index:08}")
}

pub fn parse_run_name(name: &str) -> Option<usize> {
    let digits = name.strip_prefix("run_")?;
    if digits.len() < 8 || !digits.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Full path of run `index`'s namespace, e.g. `runs.run_00000003`.
pub fn run_prefix(index: usize) -> String {
    format!("{RUNS_GROUP}{SEPARATOR}{}", run_name(index))
}

/// Full path of a result added as `path` during run `index`.
pub fn run_scoped_path(index: usize, path: &str) -> String {
    join(&run_prefix(index), path)
}

/// Splits `runs.run_00000003.z` into `(3, "z")`.
pub fn split_run_scoped(full_path: &str) -> Option<(usize, &str)> {
    let rest = full_path.strip_prefix(RUNS_GROUP)?.strip_prefix(SEPARATOR)?;
    let (run, path) = rest.split_once(SEPARATOR)?;
    Some((parse_run_name(run)?, path))
}

/// Run index owning `full_path`, when it lives in (or is) a run namespace.
pub fn owning_run(full_path: &str) -> Option<usize> {
    let rest = full_path.strip_prefix(RUNS_GROUP)?.strip_prefix(SEPARATOR)?;
    let run = rest.split(SEPARATOR).next()?;
    parse_run_name(run)
}

pub fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}{SEPARATOR}{name}")
    }
}

/// Parent path; the root's children have the empty string as parent.
pub fn parent_of(path: &str) -> &str {
    path.rsplit_once(SEPARATOR)
        .map(|(parent, _)| parent)
        .unwrap_or("")
}

pub fn leaf_of(path: &str) -> &str {
    path.rsplit_once(SEPARATOR)
        .map(|(_, leaf)| leaf)
        .unwrap_or(path)
}

/// `true` when `ancestor` equals `path` or is one of its segment prefixes.
pub fn is_within(path: &str, ancestor: &str) -> bool {
    if ancestor.is_empty() || path == ancestor {
        return true;
    }
    path.len() > ancestor.len()
        && path.starts_with(ancestor)
        && path.as_bytes()[ancestor.len()] == SEPARATOR as u8
}

/// `true` when the trailing segments of `path` equal the segments of `suffix`.
pub fn ends_with_segments(path: &str, suffix: &str) -> bool {
    if path == suffix {
        return true;
    }
    path.len() > suffix.len()
        && path.ends_with(suffix)
        && path.as_bytes()[path.len() - suffix.len() - 1] == SEPARATOR as u8
}

/// Rejects empty paths and empty or non-identifier segments.
pub fn validate_path(path: &str) -> Result<(), StructuralError> {
    if path.is_empty() {
        return Err(StructuralError::InvalidName {
            path: path.to_string(),
            name: String::new(),
        });
    }
    for segment in path.split(SEPARATOR) {
        let valid = !segment.is_empty()
            && segment
                .chars()
                .all(|c| c.is_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StructuralError::InvalidName {
                path: path.to_string(),
                name: segment.to_string(),
            });
        }
    }
    Ok(())
}

/// Rejects user paths that would land in the run namespace.
pub fn reject_reserved(path: &str) -> Result<(), StructuralError> {
    if path.split(SEPARATOR).next() == Some(RUNS_GROUP) {
        return Err(StructuralError::ReservedName(path.to_string()));
    }
    Ok(())
}

/// Flattens nested mappings into dotted keys: `{a: {b: 1}}` becomes `{"a.b": 1}`.
pub fn flatten_mapping(nested: &BTreeMap<String, Value>) -> BTreeMap<String, Value> {
    let mut flat = BTreeMap::new();
    flatten_into(&mut flat, "", nested);
    flat
}

fn flatten_into(flat: &mut BTreeMap<String, Value>, prefix: &str, nested: &BTreeMap<String, Value>) {
    for (key, value) in nested {
        let path = join(prefix, key);
        match value {
            Value::Mapping(inner) if !inner.is_empty() => flatten_into(flat, &path, inner),
            other => {
                flat.insert(path, other.clone());
            }
        }
    }
}

/// Inverse of [`flatten_mapping`]. A key that is both a leaf and a prefix keeps the nested form.
pub fn nest_mapping(flat: &BTreeMap<String, Value>) -> BTreeMap<String, Value> {
    let mut nested = BTreeMap::new();
    for (key, value) in flat {
        let mut segments: Vec<&str> = key.split(SEPARATOR).collect();
        let Some(last) = segments.pop() else {
            continue;
        };
        let mut cursor = &mut nested;
        for segment in segments {
            let entry = cursor
                .entry(segment.to_string())
                .or_insert_with(|| Value::Mapping(BTreeMap::new()));
            if !matches!(entry, Value::Mapping(_)) {
                *entry = Value::Mapping(BTreeMap::new());
            }
            let Value::Mapping(inner) = entry else {
                unreachable!("entry was just replaced by a mapping");
            };
            cursor = inner;
        }
        cursor.entry(last.to_string()).or_insert_with(|| value.clone());
    }
    nested
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_names_round_trip_through_paths() {
        assert_eq!(run_name(3), "run_00000003");
        assert_eq!(run_scoped_path(3, "stats.z"), "runs.run_00000003.stats.z");
        assert_eq!(
            split_run_scoped("runs.run_00000003.stats.z"),
            Some((3, "stats.z"))
        );
        assert_eq!(owning_run("runs.run_00000012"), Some(12));
        assert_eq!(owning_run("results.z"), None);
        assert_eq!(parse_run_name("run_3"), None);
    }

    #[test]
    fn segment_matching_ignores_partial_names() {
        assert!(ends_with_segments("group1.x", "x"));
        assert!(!ends_with_segments("group1.xx", "x"));
        assert!(!ends_with_segments("group1.ax", "x"));
        assert!(is_within("a.b.c", "a.b"));
        assert!(!is_within("a.bc", "a.b"));
        assert!(is_within("a.b", ""));
    }

    #[test]
    fn validate_path_rejects_empty_segments() {
        assert!(validate_path("a.b").is_ok());
        assert!(validate_path("a..b").is_err());
        assert!(validate_path("a b").is_err());
        assert!(validate_path("").is_err());
        assert!(reject_reserved("runs.x").is_err());
        assert!(reject_reserved("runsx.y").is_ok());
    }

    #[test]
    fn flatten_and_nest_are_inverse() {
        let mut inner = BTreeMap::new();
        inner.insert("b".to_string(), Value::from(1));
        inner.insert("c".to_string(), Value::from("x"));
        let mut nested = BTreeMap::new();
        nested.insert("a".to_string(), Value::Mapping(inner));
        nested.insert("d".to_string(), Value::from(2.5));

        let flat = flatten_mapping(&nested);
        assert_eq!(flat.get("a.b"), Some(&Value::from(1)));
        assert_eq!(flat.get("d"), Some(&Value::from(2.5)));
        assert_eq!(nest_mapping(&flat), nested);
    }
}
