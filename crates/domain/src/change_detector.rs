//! Change detector.
//!
//! Diffs two JSON-object snapshots of a CVE document and produces the
//! `ModificationHistoryEntry` records the upsert engine appends on update. Operates on
//! `serde_json::Value` rather than the typed `Cve` struct so it can be
//! reused for any document shape (comments, users) that wants an audit
//! trail in the same format.

use cve_core::{ChangeAction, ChangeRecord, DetailType};
use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::HashMap;

const DEFAULT_IGNORE_FIELDS: &[&str] = &["last_modified_at", "last_modified_by"];
const SCALAR_TRUNCATE_LEN: usize = 100;

static FIELD_LABELS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("title", "제목"),
        ("description", "설명"),
        ("status", "상태"),
        ("assigned_to", "담당자"),
        ("severity", "심각도"),
        ("pocs", "PoC"),
        ("snort_rules", "Snort 규칙"),
        ("references", "참조 문서"),
        ("username", "사용자명"),
        ("email", "이메일"),
        ("is_active", "활성 상태"),
        ("is_admin", "관리자 여부"),
        ("full_name", "이름"),
        ("comment", "댓글"),
        ("notes", "메모"),
    ])
});

fn field_label(field: &str) -> String {
    FIELD_LABELS
        .get(field)
        .map(|s| s.to_string())
        .unwrap_or_else(|| field.to_string())
}

/// Diffs `old` against `new`, both JSON objects, skipping `ignore_fields`
/// (falls back to [`DEFAULT_IGNORE_FIELDS`] when empty).
pub fn detect_changes(old: &Value, new: &Value, ignore_fields: &[&str]) -> Vec<ChangeRecord> {
    let ignore: &[&str] = if ignore_fields.is_empty() {
        DEFAULT_IGNORE_FIELDS
    } else {
        ignore_fields
    };

    let empty = serde_json::Map::new();
    let old_map = old.as_object().unwrap_or(&empty);
    let new_map = new.as_object().unwrap_or(&empty);

    let mut keys: Vec<&String> = old_map.keys().chain(new_map.keys()).collect();
    keys.sort();
    keys.dedup();

    let mut changes = Vec::new();
    for key in keys {
        if ignore.contains(&key.as_str()) {
            continue;
        }

        match (old_map.get(key), new_map.get(key)) {
            (None, Some(new_value)) => changes.push(ChangeRecord {
                field: key.clone(),
                field_label: field_label(key),
                action: ChangeAction::Add,
                detail_type: DetailType::Detailed,
                before: None,
                after: Some(truncate(new_value)),
                summary: format!("{} 추가됨", field_label(key)),
            }),
            (Some(old_value), None) => changes.push(ChangeRecord {
                field: key.clone(),
                field_label: field_label(key),
                action: ChangeAction::Delete,
                detail_type: DetailType::Detailed,
                before: Some(truncate(old_value)),
                after: None,
                summary: format!("{} 삭제됨", field_label(key)),
            }),
            (Some(old_value), Some(new_value)) if old_value != new_value => {
                if let (Some(old_list), Some(new_list)) =
                    (old_value.as_array(), new_value.as_array())
                {
                    if let Some(record) = detect_list_change(key, old_list, new_list) {
                        changes.push(record);
                    }
                } else {
                    changes.push(ChangeRecord {
                        field: key.clone(),
                        field_label: field_label(key),
                        action: ChangeAction::Edit,
                        detail_type: DetailType::Detailed,
                        before: Some(truncate(old_value)),
                        after: Some(truncate(new_value)),
                        summary: format!(
                            "{} 변경: '{}' → '{}'",
                            field_label(key),
                            truncate(old_value),
                            truncate(new_value)
                        ),
                    });
                }
            }
            _ => {}
        }
    }
    changes
}

struct ListDiff {
    added: usize,
    removed: usize,
    modified: usize,
}

/// Items are identified by `id`, or (for references/PoCs) `url`, or (for
/// Snort rules) `sid`. An item without any identifiable key never matches
/// across snapshots, so it is always counted as added/removed rather than
/// compared in place.
fn item_key(item: &Value) -> Option<String> {
    let obj = item.as_object()?;
    for key in ["id", "url", "sid"] {
        if let Some(value) = obj.get(key) {
            return Some(value.to_string());
        }
    }
    None
}

fn diff_list(old: &[Value], new: &[Value]) -> ListDiff {
    let mut old_by_key: HashMap<String, &Value> = HashMap::new();
    let mut new_by_key: HashMap<String, &Value> = HashMap::new();
    for item in old {
        if let Some(key) = item_key(item) {
            old_by_key.insert(key, item);
        }
    }
    for item in new {
        if let Some(key) = item_key(item) {
            new_by_key.insert(key, item);
        }
    }

    let mut added = 0;
    let mut modified = 0;
    for (key, new_item) in &new_by_key {
        match old_by_key.get(key) {
            None => added += 1,
            Some(old_item) if *old_item != *new_item => modified += 1,
            _ => {}
        }
    }
    let removed = old_by_key
        .keys()
        .filter(|key| !new_by_key.contains_key(*key))
        .count();

    ListDiff { added, removed, modified }
}

fn detect_list_change(field: &str, old: &[Value], new: &[Value]) -> Option<ChangeRecord> {
    let diff = diff_list(old, new);
    if diff.added == 0 && diff.removed == 0 && diff.modified == 0 {
        return None;
    }

    let mut parts = Vec::new();
    if diff.added > 0 {
        parts.push(format!("{}개 추가", diff.added));
    }
    if diff.removed > 0 {
        parts.push(format!("{}개 삭제", diff.removed));
    }
    if diff.modified > 0 {
        parts.push(format!("{}개 수정", diff.modified));
    }

    Some(ChangeRecord {
        field: field.to_string(),
        field_label: field_label(field),
        action: ChangeAction::Edit,
        detail_type: DetailType::Simple,
        before: Some(format!("{} items", old.len())),
        after: Some(format!("{} items", new.len())),
        summary: format!("{} {}", field_label(field), parts.join(", ")),
    })
}

fn truncate(value: &Value) -> String {
    let rendered = match value {
        Value::String(s) => s.clone(),
        Value::Null => return "없음".to_string(),
        other => other.to_string(),
    };
    if rendered.chars().count() > SCALAR_TRUNCATE_LEN {
        let truncated: String = rendered.chars().take(SCALAR_TRUNCATE_LEN).collect();
        format!("{truncated}...")
    } else {
        rendered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn edit_on_status_uses_korean_label() {
        let old = json!({"status": "new", "last_modified_at": "t0"});
        let new = json!({"status": "analyzing", "last_modified_at": "t1"});
        let changes = detect_changes(&old, &new, &[]);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].field, "status");
        assert_eq!(changes[0].field_label, "상태");
        assert_eq!(changes[0].action, ChangeAction::Edit);
        assert_eq!(changes[0].detail_type, DetailType::Detailed);
    }

    #[test]
    fn ignored_fields_produce_no_changes() {
        let old = json!({"last_modified_at": "t0", "last_modified_by": "a"});
        let new = json!({"last_modified_at": "t1", "last_modified_by": "b"});
        assert!(detect_changes(&old, &new, &[]).is_empty());
    }

    #[test]
    fn added_field_is_add_action() {
        let old = json!({});
        let new = json!({"notes": "hello"});
        let changes = detect_changes(&old, &new, &[]);
        assert_eq!(changes[0].action, ChangeAction::Add);
    }

    #[test]
    fn list_diff_produces_simple_summary() {
        let old = json!({"references": [{"url": "a"}, {"url": "b"}]});
        let new = json!({"references": [{"url": "a"}, {"url": "c"}]});
        let changes = detect_changes(&old, &new, &[]);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].detail_type, DetailType::Simple);
        assert!(changes[0].summary.contains("추가"));
        assert!(changes[0].summary.contains("삭제"));
    }

    #[test]
    fn unknown_field_falls_back_to_raw_key() {
        let old = json!({"custom_field": "a"});
        let new = json!({"custom_field": "b"});
        let changes = detect_changes(&old, &new, &[]);
        assert_eq!(changes[0].field_label, "custom_field");
    }

    #[test]
    fn long_scalar_is_truncated_with_ellipsis() {
        let long = "x".repeat(150);
        let old = json!({"description": "short"});
        let new = json!({"description": long});
        let changes = detect_changes(&old, &new, &[]);
        let after = changes[0].after.as_ref().unwrap();
        assert!(after.ends_with("..."));
        assert_eq!(after.chars().count(), SCALAR_TRUNCATE_LEN + 3);
    }
}
