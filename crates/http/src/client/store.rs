//! Token persistence
//!
//! The client never touches ambient storage directly; it is handed a
//! [`TokenStore`] and reads, overwrites or clears the pair through it.

use chrono::{DateTime, TimeZone, Utc};
use hms_core::{CoreError, CoreResult, StoredToken, TokenSet};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Fixed keys the token pair is persisted under
pub struct StorageKeys;

impl StorageKeys {
    pub const ACCESS_TOKEN: &'static str = "access_token";
    pub const ACCESS_TOKEN_EXPIRES_AT: &'static str = "access_token_expires_at";
    pub const REFRESH_TOKEN: &'static str = "refresh_token";
    pub const REFRESH_TOKEN_EXPIRES_AT: &'static str = "refresh_token_expires_at";
    pub const ACCESS_TOKEN_ISSUED_AT: &'static str = "access_token_issued_at";
    pub const REFRESH_TOKEN_ISSUED_AT: &'static str = "refresh_token_issued_at";
}

/// Keys of one token in the persisted map
struct TokenKeys {
    value: &'static str,
    expires_at: &'static str,
    issued_at: &'static str,
}

const ACCESS_KEYS: TokenKeys = TokenKeys {
    value: StorageKeys::ACCESS_TOKEN,
    expires_at: StorageKeys::ACCESS_TOKEN_EXPIRES_AT,
    issued_at: StorageKeys::ACCESS_TOKEN_ISSUED_AT,
};

const REFRESH_KEYS: TokenKeys = TokenKeys {
    value: StorageKeys::REFRESH_TOKEN,
    expires_at: StorageKeys::REFRESH_TOKEN_EXPIRES_AT,
    issued_at: StorageKeys::REFRESH_TOKEN_ISSUED_AT,
};

/// Storage for the access/refresh token pair. Writes are last-write-wins.
pub trait TokenStore: Send + Sync {
    fn get(&self) -> CoreResult<TokenSet>;
    fn set(&self, tokens: &TokenSet) -> CoreResult<()>;
    fn clear(&self) -> CoreResult<()>;
}

/// In-process token store
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: RwLock<TokenSet>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens(tokens: TokenSet) -> Self {
        Self {
            tokens: RwLock::new(tokens),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self) -> CoreResult<TokenSet> {
        self.tokens
            .read()
            .map(|tokens| tokens.clone())
            .map_err(|_| CoreError::storage_error("token lock poisoned"))
    }

    fn set(&self, tokens: &TokenSet) -> CoreResult<()> {
        let mut guard = self
            .tokens
            .write()
            .map_err(|_| CoreError::storage_error("token lock poisoned"))?;
        *guard = tokens.clone();
        Ok(())
    }

    fn clear(&self) -> CoreResult<()> {
        self.set(&TokenSet::default())
    }
}

/// Token store backed by a JSON file of string values under [`StorageKeys`].
///
/// Timestamps are Unix epoch milliseconds. A missing file reads as an empty set.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> CoreResult<BTreeMap<String, String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_entries(&self, entries: &BTreeMap<String, String>) -> CoreResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(entries)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, content)?;
        restrict_permissions(&tmp)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self) -> CoreResult<TokenSet> {
        let entries = self.read_entries()?;
        Ok(TokenSet {
            access: read_token(&entries, &ACCESS_KEYS),
            refresh: read_token(&entries, &REFRESH_KEYS),
        })
    }

    fn set(&self, tokens: &TokenSet) -> CoreResult<()> {
        let mut entries = BTreeMap::new();
        if let Some(access) = &tokens.access {
            write_token(&mut entries, access, &ACCESS_KEYS);
        }
        if let Some(refresh) = &tokens.refresh {
            write_token(&mut entries, refresh, &REFRESH_KEYS);
        }
        self.write_entries(&entries)
    }

    fn clear(&self) -> CoreResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn read_token(entries: &BTreeMap<String, String>, keys: &TokenKeys) -> Option<StoredToken> {
    let value = entries.get(keys.value).filter(|v| !v.is_empty())?;
    // A token without a readable expiry is treated as already expired
    let expires_at = read_millis(entries, keys.expires_at).unwrap_or(DateTime::<Utc>::MIN_UTC);
    Some(StoredToken {
        value: value.clone(),
        expires_at,
        issued_at: read_millis(entries, keys.issued_at),
    })
}

fn read_millis(entries: &BTreeMap<String, String>, key: &str) -> Option<DateTime<Utc>> {
    entries
        .get(key)
        .and_then(|ms| ms.parse::<i64>().ok())
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
}

fn write_token(entries: &mut BTreeMap<String, String>, token: &StoredToken, keys: &TokenKeys) {
    entries.insert(keys.value.to_string(), token.value.clone());
    entries.insert(
        keys.expires_at.to_string(),
        token.expires_at.timestamp_millis().to_string(),
    );
    if let Some(issued_at) = token.issued_at {
        entries.insert(
            keys.issued_at.to_string(),
            issued_at.timestamp_millis().to_string(),
        );
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

// Mock implementation for testing
#[cfg(test)]
pub mod mock {
    use super::*;
    use mockall::mock;

    mock! {
        pub TokenStore {}

        impl TokenStore for TokenStore {
            fn get(&self) -> CoreResult<TokenSet>;
            fn set(&self, tokens: &TokenSet) -> CoreResult<()>;
            fn clear(&self) -> CoreResult<()>;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn sample() -> TokenSet {
        let now = Utc.timestamp_millis_opt(1_760_000_000_123).unwrap();
        TokenSet {
            access: StoredToken::issued("A", now, 900),
            refresh: StoredToken::issued("R", now, 86_400),
        }
    }

    #[test]
    fn memory_store_overwrites_and_clears() {
        let store = MemoryTokenStore::new();
        assert!(store.get().unwrap().is_empty());

        store.set(&sample()).unwrap();
        assert_eq!(store.get().unwrap(), sample());

        store.clear().unwrap();
        assert!(store.get().unwrap().is_empty());
    }

    #[test]
    fn file_store_persists_under_fixed_keys() {
        let dir = TempDir::new().unwrap();
        let store = FileTokenStore::new(dir.path().join("state").join("tokens.json"));

        store.set(&sample()).unwrap();

        let raw: BTreeMap<String, String> =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw[StorageKeys::ACCESS_TOKEN], "A");
        assert_eq!(raw[StorageKeys::REFRESH_TOKEN], "R");
        assert_eq!(raw[StorageKeys::ACCESS_TOKEN_EXPIRES_AT], "1760000900123");
        assert_eq!(raw[StorageKeys::ACCESS_TOKEN_ISSUED_AT], "1760000000123");

        let reopened = FileTokenStore::new(store.path());
        assert_eq!(reopened.get().unwrap(), sample());
    }

    #[test]
    fn file_store_missing_file_is_empty_and_clear_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = FileTokenStore::new(dir.path().join("tokens.json"));

        assert!(store.get().unwrap().is_empty());
        store.clear().unwrap();

        store.set(&sample()).unwrap();
        store.clear().unwrap();
        assert!(!store.path().exists());
        assert!(store.get().unwrap().is_empty());
    }

    #[test]
    fn file_store_token_without_expiry_reads_as_expired() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tokens.json");
        std::fs::write(&path, r#"{"access_token":"A"}"#).unwrap();

        let tokens = FileTokenStore::new(&path).get().unwrap();
        let access = tokens.access.unwrap();
        assert_eq!(access.value, "A");
        assert!(access.is_expired_at(Utc::now(), Duration::zero()));
        assert!(access.issued_at.is_none());
        assert!(tokens.refresh.is_none());
    }

    #[test]
    fn file_store_rejects_corrupt_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tokens.json");
        std::fs::write(&path, "not json").unwrap();

        let err = FileTokenStore::new(&path).get().unwrap_err();
        assert!(matches!(err, CoreError::Serialization { .. }));
    }
}
