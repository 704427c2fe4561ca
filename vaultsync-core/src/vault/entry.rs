//! Password entries and the validated input shapes that create or patch them.

use crate::crypto::fingerprint;
use crate::{Result, VaultSyncError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

pub const MAX_DOMAIN_LEN: usize = 253;
pub const MAX_USERNAME_LEN: usize = 256;
pub const MAX_PASSWORD_LEN: usize = 4096;
pub const MAX_CATEGORY_LEN: usize = 64;
pub const MAX_NOTES_LEN: usize = 10_000;
pub const MAX_WHITELISTED_DEVICES: usize = 64;
pub const MAX_DEVICE_ID_LEN: usize = 128;

/// A password entry
///
/// The plaintext `password` only ever exists inside a decrypted snapshot.
/// `password_hash` is a SHA-256 fingerprint for reuse/breach checks.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordEntry {
    pub id: Uuid,
    pub domain: String,
    pub username: String,
    pub password: String,
    pub password_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub favorite: bool,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub last_used: Option<DateTime<Utc>>,
    #[serde(default)]
    pub usage_count: u64,
    /// Advisory only, not cryptographically enforced
    #[serde(default)]
    pub device_whitelist: BTreeSet<String>,
}

impl std::fmt::Debug for PasswordEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordEntry")
            .field("id", &self.id)
            .field("domain", &self.domain)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("category", &self.category)
            .field("favorite", &self.favorite)
            .field("updated_at", &self.updated_at)
            .field("usage_count", &self.usage_count)
            .finish_non_exhaustive()
    }
}

impl PasswordEntry {
    /// Build a fresh entry from validated input
    pub(crate) fn create(id: Uuid, input: ValidEntry, now: DateTime<Utc>) -> Self {
        let password_hash = fingerprint(&input.password);
        Self {
            id,
            domain: input.domain,
            username: input.username,
            password: input.password,
            password_hash,
            category: input.category,
            notes: input.notes,
            favorite: input.favorite,
            created_at: now,
            updated_at: now,
            last_used: None,
            usage_count: 0,
            device_whitelist: input.device_whitelist,
        }
    }

    /// Whether the entry matches a lowercase search needle
    pub(crate) fn matches(&self, needle: &str) -> bool {
        let contains = |field: &str| field.to_lowercase().contains(needle);
        contains(&self.domain)
            || contains(&self.username)
            || self.category.as_deref().is_some_and(contains)
            || self.notes.as_deref().is_some_and(contains)
    }

    /// Whether a device may use this entry (an empty whitelist allows all)
    pub fn allows_device(&self, device_id: &str) -> bool {
        self.device_whitelist.is_empty() || self.device_whitelist.contains(device_id)
    }
}

/// Input for a new entry
///
/// Unknown fields are rejected at deserialization time.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewEntry {
    pub domain: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub favorite: bool,
    #[serde(default)]
    pub device_whitelist: Vec<String>,
}

impl NewEntry {
    pub fn new(
        domain: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            domain: domain.into(),
            username: username.into(),
            password: password.into(),
            ..Default::default()
        }
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn favorite(mut self, favorite: bool) -> Self {
        self.favorite = favorite;
        self
    }

    pub fn allow_device(mut self, device_id: impl Into<String>) -> Self {
        self.device_whitelist.push(device_id.into());
        self
    }

    /// Validate and normalize the input
    pub(crate) fn validate(self) -> Result<ValidEntry> {
        Ok(ValidEntry {
            domain: normalize_domain(&self.domain)?,
            username: required("username", &self.username, MAX_USERNAME_LEN)?,
            password: password(&self.password)?,
            category: optional("category", self.category.as_deref(), MAX_CATEGORY_LEN)?,
            notes: optional("notes", self.notes.as_deref(), MAX_NOTES_LEN)?,
            favorite: self.favorite,
            device_whitelist: whitelist(&self.device_whitelist)?,
        })
    }
}

impl std::fmt::Debug for NewEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewEntry")
            .field("domain", &self.domain)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish_non_exhaustive()
    }
}

/// Partial update for an existing entry
///
/// `None` leaves a field untouched. For `category` and `notes` an empty
/// string clears the field.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EntryPatch {
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub favorite: Option<bool>,
    #[serde(default)]
    pub device_whitelist: Option<Vec<String>>,
}

impl std::fmt::Debug for EntryPatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryPatch")
            .field("domain", &self.domain)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

impl EntryPatch {
    pub fn is_empty(&self) -> bool {
        self.domain.is_none()
            && self.username.is_none()
            && self.password.is_none()
            && self.category.is_none()
            && self.notes.is_none()
            && self.favorite.is_none()
            && self.device_whitelist.is_none()
    }

    /// Validate the whole patch, then apply it
    ///
    /// Nothing is written to `entry` unless every field validates.
    pub(crate) fn apply(self, entry: &mut PasswordEntry, now: DateTime<Utc>) -> Result<()> {
        if self.is_empty() {
            return Err(VaultSyncError::Validation("patch is empty".to_string()));
        }

        let domain = self.domain.as_deref().map(normalize_domain).transpose()?;
        let username = self
            .username
            .as_deref()
            .map(|u| required("username", u, MAX_USERNAME_LEN))
            .transpose()?;
        let new_password = self.password.as_deref().map(password).transpose()?;
        let category = self
            .category
            .as_deref()
            .map(|c| optional("category", Some(c), MAX_CATEGORY_LEN))
            .transpose()?;
        let notes = self
            .notes
            .as_deref()
            .map(|n| optional("notes", Some(n), MAX_NOTES_LEN))
            .transpose()?;
        let devices = self.device_whitelist.as_deref().map(whitelist).transpose()?;

        if let Some(domain) = domain {
            entry.domain = domain;
        }
        if let Some(username) = username {
            entry.username = username;
        }
        if let Some(password) = new_password {
            entry.password_hash = fingerprint(&password);
            entry.password = password;
        }
        if let Some(category) = category {
            entry.category = category;
        }
        if let Some(notes) = notes {
            entry.notes = notes;
        }
        if let Some(favorite) = self.favorite {
            entry.favorite = favorite;
        }
        if let Some(devices) = devices {
            entry.device_whitelist = devices;
        }
        entry.updated_at = now;
        Ok(())
    }
}

/// Input that passed validation
pub(crate) struct ValidEntry {
    domain: String,
    username: String,
    password: String,
    category: Option<String>,
    notes: Option<String>,
    favorite: bool,
    device_whitelist: BTreeSet<String>,
}

/// Trim, lowercase, and strip scheme, credentials, path and port from a domain
pub fn normalize_domain(raw: &str) -> Result<String> {
    let mut domain = raw.trim().to_lowercase();
    if let Some(pos) = domain.find("://") {
        domain = domain[pos + 3..].to_string();
    }
    if let Some(pos) = domain.find(['/', '?', '#']) {
        domain.truncate(pos);
    }
    if let Some(pos) = domain.rfind('@') {
        domain = domain[pos + 1..].to_string();
    }
    if let Some(pos) = domain.rfind(':') {
        if domain[pos + 1..].chars().all(|c| c.is_ascii_digit()) {
            domain.truncate(pos);
        }
    }
    let domain = domain.trim_end_matches('.').to_string();

    if domain.is_empty() {
        return Err(VaultSyncError::Validation("domain is required".to_string()));
    }
    if domain.len() > MAX_DOMAIN_LEN {
        return Err(VaultSyncError::Validation(format!(
            "domain exceeds {} characters",
            MAX_DOMAIN_LEN
        )));
    }
    if domain.chars().any(char::is_whitespace) {
        return Err(VaultSyncError::Validation(
            "domain must not contain whitespace".to_string(),
        ));
    }
    Ok(domain)
}

fn required(field: &str, value: &str, max: usize) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(VaultSyncError::Validation(format!("{} is required", field)));
    }
    if value.chars().count() > max {
        return Err(VaultSyncError::Validation(format!(
            "{} exceeds {} characters",
            field, max
        )));
    }
    Ok(value.to_string())
}

// Passwords are kept verbatim: surrounding whitespace may be significant.
fn password(value: &str) -> Result<String> {
    if value.trim().is_empty() {
        return Err(VaultSyncError::Validation("password is required".to_string()));
    }
    if value.chars().count() > MAX_PASSWORD_LEN {
        return Err(VaultSyncError::Validation(format!(
            "password exceeds {} characters",
            MAX_PASSWORD_LEN
        )));
    }
    Ok(value.to_string())
}

fn optional(field: &str, value: Option<&str>, max: usize) -> Result<Option<String>> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) if v.chars().count() > max => Err(VaultSyncError::Validation(format!(
            "{} exceeds {} characters",
            field, max
        ))),
        Some(v) => Ok(Some(v.to_string())),
    }
}

fn whitelist(devices: &[String]) -> Result<BTreeSet<String>> {
    if devices.len() > MAX_WHITELISTED_DEVICES {
        return Err(VaultSyncError::Validation(format!(
            "at most {} whitelisted devices",
            MAX_WHITELISTED_DEVICES
        )));
    }
    devices
        .iter()
        .map(|d| required("device id", d, MAX_DEVICE_ID_LEN))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_domain_variants() {
        assert_eq!(normalize_domain("example.com").unwrap(), "example.com");
        assert_eq!(normalize_domain("  Example.COM ").unwrap(), "example.com");
        assert_eq!(
            normalize_domain("https://login.example.com/path?q=1").unwrap(),
            "login.example.com"
        );
        assert_eq!(normalize_domain("http://user@host.io:8443/").unwrap(), "host.io");
        assert_eq!(normalize_domain("example.com.").unwrap(), "example.com");
    }

    #[test]
    fn normalize_domain_rejects_bad_input() {
        assert!(normalize_domain("").is_err());
        assert!(normalize_domain("https://").is_err());
        assert!(normalize_domain("exa mple.com").is_err());
        assert!(normalize_domain(&"a".repeat(300)).is_err());
    }

    #[test]
    fn new_entry_rejects_unknown_fields() {
        let json = r#"{"domain":"a.com","username":"u","password":"p","extra":1}"#;
        assert!(serde_json::from_str::<NewEntry>(json).is_err());

        let json = r#"{"domain":"a.com","username":"u","password":"p","category":"work"}"#;
        let input: NewEntry = serde_json::from_str(json).unwrap();
        assert_eq!(input.category.as_deref(), Some("work"));
    }

    #[test]
    fn patch_rejects_wrong_types() {
        assert!(serde_json::from_str::<EntryPatch>(r#"{"favorite":"yes"}"#).is_err());
        assert!(serde_json::from_str::<EntryPatch>(r#"{"notes":{"a":1}}"#).is_err());
    }

    #[test]
    fn validate_requires_fields() {
        assert!(NewEntry::new("a.com", "", "p").validate().is_err());
        assert!(NewEntry::new("a.com", "u", "   ").validate().is_err());
        assert!(NewEntry::new("", "u", "p").validate().is_err());
        assert!(NewEntry::new("a.com", "u", "p").validate().is_ok());
    }

    #[test]
    fn validate_whitelist() {
        let ok = NewEntry::new("a.com", "u", "p")
            .allow_device("laptop")
            .allow_device("laptop")
            .validate()
            .unwrap();
        assert_eq!(ok.device_whitelist.len(), 1);

        assert!(NewEntry::new("a.com", "u", "p")
            .allow_device("  ")
            .validate()
            .is_err());
    }

    #[test]
    fn password_kept_verbatim_and_fingerprinted() {
        let now = Utc::now();
        let valid = NewEntry::new("a.com", "u", " spaced ").validate().unwrap();
        let entry = PasswordEntry::create(Uuid::new_v4(), valid, now);
        assert_eq!(entry.password, " spaced ");
        assert_eq!(entry.password_hash, fingerprint(" spaced "));
    }

    #[test]
    fn debug_redacts_password() {
        let entry = PasswordEntry::create(
            Uuid::new_v4(),
            NewEntry::new("a.com", "u", "topsecret").validate().unwrap(),
            Utc::now(),
        );
        assert!(!format!("{:?}", entry).contains("topsecret"));
        assert!(!format!("{:?}", NewEntry::new("a.com", "u", "topsecret")).contains("topsecret"));
    }

    #[test]
    fn failed_patch_leaves_entry_untouched() {
        let now = Utc::now();
        let mut entry = PasswordEntry::create(
            Uuid::new_v4(),
            NewEntry::new("a.com", "u", "p").validate().unwrap(),
            now,
        );
        let before = entry.clone();

        let patch = EntryPatch {
            username: Some("new-user".into()),
            domain: Some("".into()),
            ..Default::default()
        };
        assert!(patch.apply(&mut entry, now).is_err());
        assert_eq!(entry, before);
    }

    #[test]
    fn empty_string_clears_optional_fields() {
        let now = Utc::now();
        let mut entry = PasswordEntry::create(
            Uuid::new_v4(),
            NewEntry::new("a.com", "u", "p").notes("n").category("c").validate().unwrap(),
            now,
        );
        let patch = EntryPatch {
            notes: Some(String::new()),
            ..Default::default()
        };
        patch.apply(&mut entry, now).unwrap();
        assert_eq!(entry.notes, None);
        assert_eq!(entry.category.as_deref(), Some("c"));
    }

    #[test]
    fn device_whitelist_is_advisory_filter() {
        let entry = PasswordEntry::create(
            Uuid::new_v4(),
            NewEntry::new("a.com", "u", "p").allow_device("phone").validate().unwrap(),
            Utc::now(),
        );
        assert!(entry.allows_device("phone"));
        assert!(!entry.allows_device("laptop"));
    }
}
