// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    present = { Some("abc"), Some("abc") },
    missing = { None, None },
    empty = { Some(""), None },
    undefined = { Some("undefined"), None },
    null = { Some("null"), None },
)]
fn usable_filters_sentinels(input: Option<&str>, expected: Option<&str>) {
    assert_eq!(usable(input.map(str::to_owned)), expected.map(str::to_owned));
}

#[test]
fn authorization_defaults_to_bearer() {
    let store = MemoryStore::new();
    store.set(ACCESS_TOKEN, "tok");
    assert_eq!(authorization_value(&store).as_deref(), Some("bearer tok"));

    store.set(TOKEN_TYPE, "Bearer");
    assert_eq!(authorization_value(&store).as_deref(), Some("Bearer tok"));
}

#[test]
fn authorization_omitted_for_sentinel_token() {
    let store = MemoryStore::new();
    store.set(ACCESS_TOKEN, "undefined");
    assert_eq!(authorization_value(&store), None);
    store.set(ACCESS_TOKEN, "null");
    assert_eq!(authorization_value(&store), None);
}

#[test]
fn store_tokens_rotates_both_values() {
    let store = MemoryStore::new();
    store.set(ACCESS_TOKEN, "old-access");
    store.set(REFRESH_TOKEN, "old-refresh");

    let pair = TokenPair {
        access_token: "new-access".into(),
        refresh_token: "new-refresh".into(),
        token_type: None,
    };
    store_tokens(&store, &pair);

    assert_eq!(store.get(ACCESS_TOKEN).as_deref(), Some("new-access"));
    assert_eq!(store.get(REFRESH_TOKEN).as_deref(), Some("new-refresh"));
    assert_eq!(store.get(TOKEN_TYPE), None);
}

#[test]
fn file_store_survives_reopen() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("session.json");

    let store = FileStore::open(&path)?;
    store.set(ACCESS_TOKEN, "a1");
    store.set(USER_EMAIL, "ops@example.com");
    drop(store);

    let reopened = FileStore::open(&path)?;
    assert_eq!(reopened.get(ACCESS_TOKEN).as_deref(), Some("a1"));
    assert_eq!(reopened.get(USER_EMAIL).as_deref(), Some("ops@example.com"));
    Ok(())
}

#[test]
fn file_store_clear_removes_everything_on_disk() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("nested/session.json");

    let store = FileStore::open(&path)?;
    store.set(ACCESS_TOKEN, "a1");
    store.set(REFRESH_TOKEN, "r1");
    store.clear();

    let reopened = FileStore::open(&path)?;
    assert_eq!(reopened.get(ACCESS_TOKEN), None);
    assert_eq!(reopened.get(REFRESH_TOKEN), None);
    let on_disk: BTreeMap<String, String> =
        serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    assert!(on_disk.is_empty());
    Ok(())
}

#[test]
fn file_store_writes_leave_only_the_store_file() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("session.json");

    let store = FileStore::open(&path)?;
    store.set(ACCESS_TOKEN, "a1");
    store.set(ACCESS_TOKEN, "a2");
    store.remove(ACCESS_TOKEN);

    let names: Vec<String> = std::fs::read_dir(dir.path())?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["session.json".to_owned()]);
    Ok(())
}
