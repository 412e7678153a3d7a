use super::*;

fn oid(c: char) -> String {
    c.to_string().repeat(40)
}

#[test]
fn parses_modified_entry() {
    let line = format!(
        ":100644 100644 {} {} M\tsrc/lib.rs\n",
        oid('a'),
        oid('b')
    );
    let entries = parse_diff_tree_summary(line.as_bytes()).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].delta_type, DeltaType::Modified);
    assert_eq!(entries[0].old_path, Some(b"src/lib.rs".to_vec()));
    assert_eq!(entries[0].new_path, Some(b"src/lib.rs".to_vec()));
    assert_eq!(entries[0].similarity, None);
}

#[test]
fn parses_rename_entry_with_similarity() {
    let line = format!(
        ":100644 100644 {} {} R90\told.rs\tnew.rs\n",
        oid('a'),
        oid('b')
    );
    let entries = parse_diff_tree_summary(line.as_bytes()).unwrap();
    assert_eq!(entries[0].delta_type, DeltaType::Renamed);
    assert_eq!(entries[0].similarity, Some(90));
    assert_eq!(entries[0].old_path, Some(b"old.rs".to_vec()));
    assert_eq!(entries[0].new_path, Some(b"new.rs".to_vec()));
}

#[test]
fn parses_added_entry() {
    let zero = "0".repeat(40);
    let line = format!(":000000 100644 {} {} A\tnew_file.rs\n", zero, oid('c'));
    let entries = parse_diff_tree_summary(line.as_bytes()).unwrap();
    assert_eq!(entries[0].delta_type, DeltaType::Added);
    assert!(entries[0].old_oid.is_zero());
    assert_eq!(entries[0].old_path, None);
    assert_eq!(entries[0].new_path, Some(b"new_file.rs".to_vec()));
}

#[test]
fn parses_deleted_entry_with_null_new_path() {
    let zero = "0".repeat(40);
    let line = format!(":100644 000000 {} {} D\told_file.rs\n", oid('d'), zero);
    let entries = parse_diff_tree_summary(line.as_bytes()).unwrap();
    assert_eq!(entries[0].delta_type, DeltaType::Deleted);
    assert_eq!(entries[0].old_path, Some(b"old_file.rs".to_vec()));
    assert_eq!(entries[0].new_path, None);
}

#[test]
fn multiple_entries_and_blank_lines() {
    let body = format!(
        ":100644 100644 {} {} M\ta.rs\n\n:100644 100644 {} {} D\tb.rs\n",
        oid('1'),
        oid('2'),
        oid('3'),
        oid('4'),
    );
    let entries = parse_diff_tree_summary(body.as_bytes()).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].delta_type, DeltaType::Deleted);
}

#[test]
fn malformed_line_is_rejected() {
    let err = parse_diff_tree_summary(b"not a diff-tree line\n").unwrap_err();
    assert!(matches!(err, Error::MalformedTreeDiff { .. }));
}

#[test]
fn missing_status_byte_is_rejected() {
    let line = format!(":100644 100644 {} {} \tpath.rs\n", oid('a'), oid('b'));
    let err = parse_diff_tree_summary(line.as_bytes()).unwrap_err();
    assert!(matches!(err, Error::MalformedTreeDiff { .. }));
}
