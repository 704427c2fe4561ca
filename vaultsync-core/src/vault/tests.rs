use super::*;
use crate::crypto::fingerprint;

fn vault_with_entry() -> (VaultSnapshot, PasswordEntry) {
    let mut vault = VaultSnapshot::new("0xabc");
    let entry = vault
        .add(NewEntry::new("example.com", "u", "p"))
        .unwrap();
    (vault, entry)
}

#[test]
fn test_new_vault_is_empty() {
    let vault = VaultSnapshot::new("0xabc");
    assert_eq!(vault.owner_id(), "0xabc");
    assert_eq!(vault.total_entries(), 0);
    assert!(vault.entries().is_empty());
    assert!(!vault.is_locked);
    assert!(vault.last_synced_blob_id.is_none());
    assert_eq!(vault.created_at(), vault.updated_at());
}

#[test]
fn test_vault_add_and_get_entry() {
    let (vault, entry) = vault_with_entry();

    assert_eq!(vault.total_entries(), 1);
    let retrieved = vault.get(&entry.id).unwrap();
    assert_eq!(retrieved.domain, "example.com");
    assert_eq!(retrieved.username, "u");
    assert_eq!(retrieved.password, "p");
    assert_eq!(retrieved.password_hash, fingerprint("p"));
    assert_eq!(retrieved.usage_count, 0);
    assert!(retrieved.last_used.is_none());
}

#[test]
fn test_add_rejects_invalid_input_without_mutation() {
    let (mut vault, _) = vault_with_entry();
    let before = vault.clone();

    let result = vault.add(NewEntry::new("", "u", "p"));
    assert!(matches!(result, Err(VaultSyncError::Validation(_))));
    assert_eq!(vault, before);
}

#[test]
fn test_unique_entry_ids() {
    let mut vault = VaultSnapshot::new("0xabc");
    for i in 0..200 {
        vault
            .add(NewEntry::new(format!("site{}.com", i), "u", "p"))
            .unwrap();
    }

    let ids: HashSet<_> = vault.entries().iter().map(|e| e.id).collect();
    assert_eq!(ids.len(), 200);
    assert_eq!(vault.total_entries(), 200);
    assert!(vault.check_integrity().is_ok());
}

#[test]
fn test_updated_at_strictly_increases() {
    let mut vault = VaultSnapshot::new("0xabc");
    let mut last = vault.updated_at();

    let entry = vault.add(NewEntry::new("a.com", "u", "p")).unwrap();
    assert!(vault.updated_at() > last);
    last = vault.updated_at();

    vault.record_usage(&entry.id).unwrap();
    assert!(vault.updated_at() > last);
    last = vault.updated_at();

    vault
        .update(
            &entry.id,
            EntryPatch {
                favorite: Some(true),
                ..Default::default()
            },
        )
        .unwrap();
    assert!(vault.updated_at() > last);
    last = vault.updated_at();

    vault.delete(&entry.id).unwrap();
    assert!(vault.updated_at() > last);
    assert!(vault.created_at() <= vault.updated_at());
}

#[test]
fn test_update_entry() {
    let (mut vault, entry) = vault_with_entry();

    let updated = vault
        .update(
            &entry.id,
            EntryPatch {
                password: Some("new-secret".into()),
                category: Some("work".into()),
                ..Default::default()
            },
        )
        .unwrap();

    assert_eq!(updated.id, entry.id);
    assert_eq!(updated.password, "new-secret");
    assert_eq!(updated.password_hash, fingerprint("new-secret"));
    assert_eq!(updated.category.as_deref(), Some("work"));
    assert_eq!(updated.created_at, entry.created_at);
    assert!(updated.updated_at > entry.updated_at);
    assert_eq!(vault.get(&entry.id), Some(&updated));
}

#[test]
fn test_update_missing_entry() {
    let mut vault = VaultSnapshot::new("0xabc");
    let result = vault.update(
        &Uuid::new_v4(),
        EntryPatch {
            favorite: Some(true),
            ..Default::default()
        },
    );
    assert!(matches!(result, Err(VaultSyncError::NotFound(_))));
}

#[test]
fn test_empty_patch_rejected() {
    let (mut vault, entry) = vault_with_entry();
    let before = vault.updated_at();
    assert!(matches!(
        vault.update(&entry.id, EntryPatch::default()),
        Err(VaultSyncError::Validation(_))
    ));
    assert_eq!(vault.updated_at(), before);
}

#[test]
fn test_delete_entry() {
    let (mut vault, entry) = vault_with_entry();

    let removed = vault.delete(&entry.id).unwrap();
    assert_eq!(removed.id, entry.id);
    assert_eq!(vault.total_entries(), 0);
    assert!(vault.get(&entry.id).is_none());

    assert!(matches!(
        vault.delete(&entry.id),
        Err(VaultSyncError::NotFound(_))
    ));
}

#[test]
fn test_record_usage() {
    let (mut vault, entry) = vault_with_entry();

    vault.record_usage(&entry.id).unwrap();
    let used = vault.record_usage(&entry.id).unwrap();

    assert_eq!(used.usage_count, 2);
    assert!(used.last_used.is_some());
    assert_eq!(vault.get(&entry.id).unwrap().usage_count, 2);
}

#[test]
fn test_locked_operations_fail() {
    let (mut vault, entry) = vault_with_entry();
    vault.is_locked = true;

    assert!(matches!(
        vault.add(NewEntry::new("b.com", "u", "p")),
        Err(VaultSyncError::VaultLocked)
    ));
    assert!(matches!(
        vault.record_usage(&entry.id),
        Err(VaultSyncError::VaultLocked)
    ));
    assert!(matches!(
        vault.delete(&entry.id),
        Err(VaultSyncError::VaultLocked)
    ));
    assert_eq!(vault.total_entries(), 1);
}

#[test]
fn test_search_entries() {
    let mut vault = VaultSnapshot::new("0xabc");
    vault
        .add(NewEntry::new("github.com", "octocat", "p").category("Dev"))
        .unwrap();
    vault
        .add(NewEntry::new("mail.example.com", "alice", "p").notes("Personal GitHub backup codes"))
        .unwrap();
    vault.add(NewEntry::new("bank.com", "alice", "p")).unwrap();

    assert_eq!(vault.search("GITHUB").len(), 2);
    assert_eq!(vault.search("alice").len(), 2);
    assert_eq!(vault.search("dev").len(), 1);
    assert_eq!(vault.search("nothing-matches").len(), 0);
    assert_eq!(vault.search("  ").len(), 3);
}

#[test]
fn test_check_integrity_detects_duplicates() {
    let (vault, _) = vault_with_entry();
    let mut json: serde_json::Value = serde_json::to_value(&vault).unwrap();
    let first = json["entries"][0].clone();
    json["entries"].as_array_mut().unwrap().push(first);

    let corrupted: VaultSnapshot = serde_json::from_value(json).unwrap();
    assert!(matches!(
        corrupted.check_integrity(),
        Err(VaultSyncError::Integrity(_))
    ));
}

#[test]
fn test_snapshot_json_roundtrip() {
    let (mut vault, _) = vault_with_entry();
    vault.last_synced_blob_id = Some(BlobId::new("abc123"));

    let json = serde_json::to_string(&vault).unwrap();
    assert!(json.contains("\"lastSyncedBlobId\":\"abc123\""));
    let restored: VaultSnapshot = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, vault);
}

#[test]
fn test_unsynced_changes_tracking() {
    let (mut vault, entry) = vault_with_entry();
    assert!(vault.has_unsynced_changes());

    let published = vault.updated_at();
    vault.mark_synced(BlobId::new("b1"), published);
    assert!(!vault.has_unsynced_changes());

    vault.record_usage(&entry.id).unwrap();
    assert!(vault.has_unsynced_changes());

    // A sync that captured an older version leaves the newer change pending
    vault.mark_synced(BlobId::new("b2"), published);
    assert!(vault.has_unsynced_changes());
    assert_eq!(vault.last_synced_blob_id, Some(BlobId::new("b2")));
}
