//! Field-level merge over JSON snapshots
//!
//! Fields are addressed by dot-notation leaf paths over the union of both
//! snapshots. A field absent on one side is "no value", never an error, and
//! is never silently dropped from the merged result.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::collections::BTreeSet;

use crate::models::ConflictField;

/// Epoch values at or above this are already milliseconds, not seconds
const EPOCH_MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// Which snapshot a per-field override takes its value from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeSide {
    Client,
    Server,
}

/// Per-field overrides for [`merge`], keyed by dot-notation leaf path
pub type MergeOverrides = BTreeMap<String, MergeSide>;

/// Merge two snapshots field by field
///
/// For every leaf path in the union of both sides: equal values are adopted
/// as-is, a field present on only one side keeps that side's value, fields
/// named like modification stamps take the later of the two parsed times,
/// and any remaining disagreement defaults to the server copy unless an
/// override picks the client. The result is deterministic for given inputs.
#[must_use]
pub fn merge(client: &Value, server: &Value, overrides: &MergeOverrides) -> Value {
    let mut merged = Value::Object(Map::new());
    for path in field_union(client, server) {
        let chosen = choose_field(
            &path,
            value_at(client, &path),
            value_at(server, &path),
            overrides.get(&path).copied(),
        );
        if let Some(value) = chosen {
            set_at(&mut merged, &path, value);
        }
    }
    merged
}

/// Side-by-side field view of two snapshots, for manual review
#[must_use]
pub fn conflict_fields(client: &Value, server: &Value) -> Vec<ConflictField> {
    field_union(client, server)
        .into_iter()
        .map(|path| {
            let client_value = value_at(client, &path).cloned();
            let server_value = value_at(server, &path).cloned();
            ConflictField {
                path,
                client: client_value,
                server: server_value,
            }
        })
        .collect()
}

/// Latest modification stamp carried by a snapshot, if any
///
/// Scans leaf fields whose name looks like a modified/updated stamp and
/// returns the maximum parsed time in Unix ms.
pub(crate) fn last_modified_ms(value: &Value) -> Option<i64> {
    let mut paths = BTreeSet::new();
    collect_paths("", value, &mut paths);
    paths
        .iter()
        .filter(|path| is_modified_field(last_segment(path)))
        .filter_map(|path| value_at(value, path).and_then(parse_timestamp_ms))
        .max()
}

fn choose_field(
    path: &str,
    client: Option<&Value>,
    server: Option<&Value>,
    override_side: Option<MergeSide>,
) -> Option<Value> {
    match (client, server) {
        (None, None) => None,
        (Some(value), None) | (None, Some(value)) => Some(value.clone()),
        (Some(client_value), Some(server_value)) => {
            if client_value == server_value {
                return Some(server_value.clone());
            }
            if is_modified_field(last_segment(path)) {
                if let (Some(client_ms), Some(server_ms)) = (
                    parse_timestamp_ms(client_value),
                    parse_timestamp_ms(server_value),
                ) {
                    return Some(if client_ms > server_ms {
                        client_value.clone()
                    } else {
                        server_value.clone()
                    });
                }
            }
            Some(match override_side {
                Some(MergeSide::Client) => client_value.clone(),
                Some(MergeSide::Server) | None => server_value.clone(),
            })
        }
    }
}

/// Union of both snapshots' leaf paths, sorted
///
/// A path shadowed by a shorter member of the union (the shapes disagree,
/// e.g. an object on one side and a scalar on the other) is dropped; the
/// shared prefix is then compared as one whole-value field.
fn field_union(client: &Value, server: &Value) -> Vec<String> {
    let mut all = BTreeSet::new();
    collect_paths("", client, &mut all);
    collect_paths("", server, &mut all);

    all.iter()
        .filter(|path| !all.iter().any(|other| shadows(other, path)))
        .cloned()
        .collect()
}

fn collect_paths(prefix: &str, value: &Value, out: &mut BTreeSet<String>) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                collect_paths(&path, child, out);
            }
        }
        _ => {
            out.insert(prefix.to_string());
        }
    }
}

fn shadows(prefix: &str, path: &str) -> bool {
    if prefix == path {
        return false;
    }
    if prefix.is_empty() {
        return true;
    }
    path.len() > prefix.len()
        && path.starts_with(prefix)
        && path.as_bytes()[prefix.len()] == b'.'
}

fn value_at<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    let mut current = value;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn set_at(target: &mut Value, path: &str, new_value: Value) {
    if path.is_empty() {
        *target = new_value;
        return;
    }
    let (head, rest) = match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    let Some(map) = target.as_object_mut() else {
        return;
    };
    match rest {
        None => {
            map.insert(head.to_string(), new_value);
        }
        Some(rest) => {
            let child = map
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            set_at(child, rest, new_value);
        }
    }
}

fn last_segment(path: &str) -> &str {
    path.rsplit('.').next().unwrap_or(path)
}

fn is_modified_field(name: &str) -> bool {
    let lowered = name.to_ascii_lowercase();
    lowered.contains("modifi") || lowered.contains("updat")
}

/// Parse a field value as a point in time, returning Unix ms
///
/// Accepts RFC 3339 strings, bare `YYYY-MM-DD` dates, and epoch numbers in
/// either seconds or milliseconds.
fn parse_timestamp_ms(value: &Value) -> Option<i64> {
    match value {
        Value::String(text) => {
            if let Ok(parsed) = chrono::DateTime::parse_from_rfc3339(text) {
                return Some(parsed.timestamp_millis());
            }
            let date = chrono::NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()?;
            let midnight = date.and_hms_opt(0, 0, 0)?;
            Some(midnight.and_utc().timestamp_millis())
        }
        Value::Number(number) => {
            let raw = number
                .as_i64()
                .or_else(|| number.as_u64().and_then(|u| i64::try_from(u).ok()))?;
            if raw.abs() >= EPOCH_MILLIS_THRESHOLD {
                Some(raw)
            } else {
                Some(raw.saturating_mul(1000))
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_merge_keeps_one_sided_fields() {
        let client = json!({"sketchNotes": "porch damage", "rooms": 7});
        let server = json!({"rooms": 7, "inspector": "m.diaz"});

        let merged = merge(&client, &server, &MergeOverrides::new());
        assert_eq!(
            merged,
            json!({"sketchNotes": "porch damage", "rooms": 7, "inspector": "m.diaz"})
        );
    }

    #[test]
    fn test_merge_prefers_server_on_disagreement() {
        let client = json!({"estimatedValue": 300_000});
        let server = json!({"estimatedValue": 310_000});

        let merged = merge(&client, &server, &MergeOverrides::new());
        assert_eq!(merged, json!({"estimatedValue": 310_000}));
    }

    #[test]
    fn test_merge_override_picks_client() {
        let client = json!({"estimatedValue": 300_000, "rooms": 7});
        let server = json!({"estimatedValue": 310_000, "rooms": 8});

        let mut overrides = MergeOverrides::new();
        overrides.insert("estimatedValue".to_string(), MergeSide::Client);

        let merged = merge(&client, &server, &overrides);
        assert_eq!(merged, json!({"estimatedValue": 300_000, "rooms": 8}));
    }

    #[test]
    fn test_merge_timestamp_field_takes_later_side() {
        let client = json!({"updatedAt": "2024-01-02", "note": "x"});
        let server = json!({"updatedAt": "2024-01-01", "note": "x"});

        let merged = merge(&client, &server, &MergeOverrides::new());
        assert_eq!(merged["updatedAt"], json!("2024-01-02"));
    }

    #[test]
    fn test_merge_nested_fields_use_dot_paths() {
        let client = json!({"address": {"street": "12 Elm", "unit": "B"}});
        let server = json!({"address": {"street": "12 Elm St"}});

        let merged = merge(&client, &server, &MergeOverrides::new());
        assert_eq!(
            merged,
            json!({"address": {"street": "12 Elm St", "unit": "B"}})
        );
    }

    #[test]
    fn test_merge_shape_mismatch_compares_whole_subtree() {
        let client = json!({"roof": {"material": "slate"}});
        let server = json!({"roof": "slate"});

        let merged = merge(&client, &server, &MergeOverrides::new());
        assert_eq!(merged, json!({"roof": "slate"}));
    }

    #[test]
    fn test_merge_arrays_are_single_values() {
        let client = json!({"photos": ["a.jpg", "b.jpg"]});
        let server = json!({"photos": ["a.jpg"]});

        let merged = merge(&client, &server, &MergeOverrides::new());
        assert_eq!(merged, json!({"photos": ["a.jpg"]}));
    }

    #[test]
    fn test_merge_is_deterministic() {
        let client = json!({"b": 1, "a": {"y": 2, "x": 3}});
        let server = json!({"a": {"x": 4}, "c": 5});

        let first = merge(&client, &server, &MergeOverrides::new());
        let second = merge(&client, &server, &MergeOverrides::new());
        assert_eq!(first, second);
    }

    #[test]
    fn test_conflict_fields_lists_union_sorted() {
        let client = json!({"rooms": 7, "sketch": "s1"});
        let server = json!({"rooms": 8, "inspector": "m.diaz"});

        let fields = conflict_fields(&client, &server);
        let paths: Vec<&str> = fields.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["inspector", "rooms", "sketch"]);

        let rooms = &fields[1];
        assert_eq!(rooms.client, Some(json!(7)));
        assert_eq!(rooms.server, Some(json!(8)));

        let sketch = &fields[2];
        assert_eq!(sketch.client, Some(json!("s1")));
        assert_eq!(sketch.server, None);
    }

    #[test]
    fn test_last_modified_ms_prefers_latest_stamp() {
        let snapshot = json!({
            "updatedAt": "2024-01-01T00:00:00Z",
            "meta": {"lastModified": "2024-02-01T00:00:00Z"}
        });
        let expected = chrono::DateTime::parse_from_rfc3339("2024-02-01T00:00:00Z")
            .unwrap()
            .timestamp_millis();
        assert_eq!(last_modified_ms(&snapshot), Some(expected));
    }

    #[test]
    fn test_last_modified_ms_absent_without_stamp_fields() {
        assert_eq!(last_modified_ms(&json!({"rooms": 7})), None);
        assert_eq!(last_modified_ms(&json!({"updatedAt": "not a date"})), None);
    }

    #[test]
    fn test_parse_timestamp_ms_formats() {
        assert_eq!(
            parse_timestamp_ms(&json!("2024-01-02")),
            Some(1_704_153_600_000)
        );
        assert_eq!(
            parse_timestamp_ms(&json!("2024-01-02T00:00:00Z")),
            Some(1_704_153_600_000)
        );
        // Epoch seconds are scaled up, epoch milliseconds pass through
        assert_eq!(
            parse_timestamp_ms(&json!(1_704_153_600)),
            Some(1_704_153_600_000)
        );
        assert_eq!(
            parse_timestamp_ms(&json!(1_704_153_600_000_i64)),
            Some(1_704_153_600_000)
        );
        assert_eq!(parse_timestamp_ms(&json!(true)), None);
    }

    #[test]
    fn test_is_modified_field_matches_names() {
        assert!(is_modified_field("updatedAt"));
        assert!(is_modified_field("updated_at"));
        assert!(is_modified_field("lastModified"));
        assert!(is_modified_field("DATE_MODIFIED"));
        assert!(!is_modified_field("createdAt"));
        assert!(!is_modified_field("estimatedValue"));
    }
}
