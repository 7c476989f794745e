//! Per-connection options for statement analysis.

use serde::Deserialize;

use crate::cache::DEFAULT_RECYCLE_THRESHOLD;
use crate::lexer::DEFAULT_MAX_TOKEN_LEN;

/// Options that shape how statements on a connection are scanned.
///
/// Every field has a default, so a partial JSON or TOML document
/// deserializes:
///
/// ```rust
/// use sqlscan_core::ConnectionOptions;
///
/// let options = ConnectionOptions::default()
///     .client_encoding("SJIS")
///     .bare_alias_compat(true);
/// assert_eq!(options.client_encoding.as_deref(), Some("SJIS"));
/// assert_eq!(options.cache_recycle_threshold, 128);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConnectionOptions {
    /// Explicit client encoding name. When absent the server is asked,
    /// then the process locale.
    pub client_encoding: Option<String>,
    /// `\` escapes inside every `'...'` literal, not only `E'...'`.
    pub backslash_escapes: bool,
    /// Accept select-list aliases written without `AS` and produce a
    /// rewritten statement with the `AS` made explicit.
    pub bare_alias_compat: bool,
    /// Metadata cache size past which unreferenced entries are recycled.
    pub cache_recycle_threshold: usize,
    /// Token buffer bound; longer tokens are truncated.
    pub max_token_len: usize,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            client_encoding: None,
            backslash_escapes: false,
            bare_alias_compat: false,
            cache_recycle_threshold: DEFAULT_RECYCLE_THRESHOLD,
            max_token_len: DEFAULT_MAX_TOKEN_LEN,
        }
    }
}

impl ConnectionOptions {
    /// Sets the client encoding name.
    #[must_use]
    pub fn client_encoding(mut self, name: impl Into<String>) -> Self {
        self.client_encoding = Some(name.into());
        self
    }

    /// Enables backslash escapes in plain string literals.
    #[must_use]
    pub const fn backslash_escapes(mut self, enabled: bool) -> Self {
        self.backslash_escapes = enabled;
        self
    }

    /// Enables alias-without-AS compatibility mode.
    #[must_use]
    pub const fn bare_alias_compat(mut self, enabled: bool) -> Self {
        self.bare_alias_compat = enabled;
        self
    }

    /// Sets the metadata cache recycle threshold.
    #[must_use]
    pub const fn cache_recycle_threshold(mut self, threshold: usize) -> Self {
        self.cache_recycle_threshold = threshold;
        self
    }

    /// Sets the token buffer bound.
    #[must_use]
    pub const fn max_token_len(mut self, len: usize) -> Self {
        self.max_token_len = len;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ConnectionOptions::default();
        assert_eq!(options.client_encoding, None);
        assert!(!options.backslash_escapes);
        assert!(!options.bare_alias_compat);
        assert_eq!(options.cache_recycle_threshold, 128);
        assert_eq!(options.max_token_len, 256);
    }

    #[test]
    fn test_partial_deserialize() {
        let options: ConnectionOptions =
            serde_json::from_str(r#"{"client_encoding": "EUC_JP", "max_token_len": 64}"#).unwrap();
        assert_eq!(options.client_encoding.as_deref(), Some("EUC_JP"));
        assert_eq!(options.max_token_len, 64);
        assert_eq!(options.cache_recycle_threshold, 128);
    }

    #[test]
    fn test_builder() {
        let options = ConnectionOptions::default()
            .backslash_escapes(true)
            .cache_recycle_threshold(4);
        assert!(options.backslash_escapes);
        assert_eq!(options.cache_recycle_threshold, 4);
    }
}
