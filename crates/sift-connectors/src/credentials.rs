//! Resolution of search API credentials.

use std::fmt;

use crate::error::SearchError;

/// A resolved `{api_key, cx}` pair. `cx` identifies the search engine.
#[derive(Clone, PartialEq, Eq)]
pub struct SearchCredentials {
    pub api_key: String,
    pub cx: String,
}

impl fmt::Debug for SearchCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchCredentials")
            .field("api_key", &"<redacted>")
            .field("cx", &self.cx)
            .finish()
    }
}

impl SearchCredentials {
    pub fn new(api_key: impl Into<String>, cx: impl Into<String>) -> Result<Self, SearchError> {
        let api_key = api_key.into();
        let cx = cx.into();
        if api_key.trim().is_empty() {
            return Err(SearchError::Config(
                "search credentials require an API key".to_string(),
            ));
        }
        if cx.trim().is_empty() {
            return Err(SearchError::Config(
                "search credentials require a search engine id (cx)".to_string(),
            ));
        }
        Ok(Self { api_key, cx })
    }
}

/// Source of credentials, consulted once per table function call.
pub trait CredentialResolver: Send + Sync + fmt::Debug {
    fn resolve(&self) -> Result<SearchCredentials, SearchError>;
}

/// Reads `GOOGLE_SEARCH_API_KEY` and `GOOGLE_SEARCH_CX`.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvCredentials;

const MISSING_CREDENTIALS_HELP: &str = "No search credentials found. Set:\n\n\
     \x20 GOOGLE_SEARCH_API_KEY=YOUR_API_KEY\n\
     \x20 GOOGLE_SEARCH_CX=YOUR_SEARCH_ENGINE_ID\n\n\
     Get API key: https://developers.google.com/custom-search/v1/introduction\n\
     Create cx:   https://programmablesearchengine.google.com/controlpanel/all";

impl CredentialResolver for EnvCredentials {
    fn resolve(&self) -> Result<SearchCredentials, SearchError> {
        let api_key = std::env::var("GOOGLE_SEARCH_API_KEY").unwrap_or_default();
        let cx = std::env::var("GOOGLE_SEARCH_CX").unwrap_or_default();
        if api_key.is_empty() && cx.is_empty() {
            return Err(SearchError::Config(MISSING_CREDENTIALS_HELP.to_string()));
        }
        SearchCredentials::new(api_key, cx)
    }
}

/// Fixed credentials, for embedding and tests.
#[derive(Debug, Clone)]
pub struct StaticCredentials(pub SearchCredentials);

impl CredentialResolver for StaticCredentials {
    fn resolve(&self) -> Result<SearchCredentials, SearchError> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_env() {
        unsafe {
            std::env::remove_var("GOOGLE_SEARCH_API_KEY");
            std::env::remove_var("GOOGLE_SEARCH_CX");
        }
    }

    #[test]
    fn test_debug_redacts_key() {
        let creds = SearchCredentials::new("secret-key", "engine-1").unwrap();
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("secret-key"));
        assert!(debug.contains("engine-1"));
    }

    #[test]
    fn test_empty_values_rejected() {
        assert!(SearchCredentials::new("", "cx").unwrap_err().is_config());
        assert!(SearchCredentials::new("key", " ").unwrap_err().is_config());
    }

    #[test]
    fn test_env_missing_gives_guidance() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env();

        let err = EnvCredentials.resolve().unwrap_err();
        assert!(err.to_string().contains("GOOGLE_SEARCH_API_KEY"));
    }

    #[test]
    fn test_env_partial_is_error() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env();

        unsafe { std::env::set_var("GOOGLE_SEARCH_API_KEY", "k") };
        let err = EnvCredentials.resolve().unwrap_err();
        assert!(err.to_string().contains("cx"));

        clear_env();
    }

    #[test]
    fn test_env_resolves() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env();

        unsafe {
            std::env::set_var("GOOGLE_SEARCH_API_KEY", "k");
            std::env::set_var("GOOGLE_SEARCH_CX", "c");
        }
        let creds = EnvCredentials.resolve().unwrap();
        assert_eq!(creds.api_key, "k");
        assert_eq!(creds.cx, "c");

        clear_env();
    }
}
