use std::fmt;
use std::marker::PhantomData;

use serde::Serialize;

/// A context key bound to the value type stored under it.
///
/// Agents that agree on a key agree on its type; reading through a typed key
/// can only produce the declared type or nothing.
pub struct ContextKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ContextKey<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T: Serialize> ContextKey<T> {
    /// A `(key, value)` pair ready to insert into a context-update map.
    pub fn entry(&self, value: T) -> (String, serde_json::Value) {
        (
            self.name.to_string(),
            serde_json::to_value(value).unwrap_or(serde_json::Value::Null),
        )
    }
}

impl<T> Clone for ContextKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ContextKey<T> {}

impl<T> fmt::Debug for ContextKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ContextKey").field(&self.name).finish()
    }
}

impl<T> fmt::Display for ContextKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Set by `resume_with_input`.
pub const USER_INPUT: ContextKey<String> = ContextKey::new("user_input");

// File operations
pub const OPERATION: ContextKey<String> = ContextKey::new("operation");
pub const PENDING_OPERATION: ContextKey<String> = ContextKey::new("pending_operation");
pub const SOURCE_PATH: ContextKey<String> = ContextKey::new("source_path");
pub const DEST_PATH: ContextKey<String> = ContextKey::new("dest_path");
pub const BACKUP_PATH: ContextKey<String> = ContextKey::new("backup_path");

// Setup / diagnostics
pub const SETUP_STATUS: ContextKey<String> = ContextKey::new("setup_status");
pub const DIAGNOSTIC_STATUS: ContextKey<String> = ContextKey::new("diagnostic_status");
pub const ISSUES: ContextKey<Vec<String>> = ContextKey::new("issues");
pub const ISSUE_COUNT: ContextKey<u64> = ContextKey::new("issue_count");
pub const HEALED_COUNT: ContextKey<u64> = ContextKey::new("healed_count");

// Network operations
pub const URL: ContextKey<String> = ContextKey::new("url");
pub const DOWNLOADED_PATH: ContextKey<String> = ContextKey::new("downloaded_path");
pub const EXPECTED_CHECKSUM: ContextKey<String> = ContextKey::new("expected_checksum");

// Package operations
pub const PACKAGE: ContextKey<String> = ContextKey::new("package");
pub const INDEX_REFRESHED: ContextKey<bool> = ContextKey::new("index_refreshed");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_serializes_value() {
        let (k, v) = ISSUES.entry(vec!["a".to_string()]);
        assert_eq!(k, "issues");
        assert_eq!(v, serde_json::json!(["a"]));

        let (k, v) = INDEX_REFRESHED.entry(true);
        assert_eq!(k, "index_refreshed");
        assert_eq!(v, serde_json::json!(true));
    }

    #[test]
    fn test_display_is_name() {
        assert_eq!(BACKUP_PATH.to_string(), "backup_path");
        assert_eq!(format!("{:?}", URL), "ContextKey(\"url\")");
    }
}
