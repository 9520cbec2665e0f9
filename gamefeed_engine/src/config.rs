use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::search::DEFAULT_SIGIL;

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub api: ApiConfig,
    pub search: SearchConfig,
    pub drafts: DraftConfig,
    pub paths: FeedPaths,
}

impl FeedConfig {
    pub fn from_env() -> Result<Self> {
        let paths = match env::var("GAMEFEED_DATA_DIR") {
            Ok(raw) if !raw.trim().is_empty() => FeedPaths::from_base_dir(raw.trim()),
            _ => FeedPaths::discover()?,
        };
        Ok(Self {
            api: ApiConfig::from_env(),
            search: SearchConfig::from_env(),
            drafts: DraftConfig::from_env(),
            paths,
        })
    }

    /// Defaults everywhere, with data kept under `base`.
    pub fn with_base_dir<P: AsRef<Path>>(base: P) -> Self {
        Self {
            api: ApiConfig::default(),
            search: SearchConfig::default(),
            drafts: DraftConfig::default(),
            paths: FeedPaths::from_base_dir(base),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub request_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl ApiConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let base_url = env::var("GAMEFEED_API_URL")
            .ok()
            .filter(|raw| !raw.trim().is_empty())
            .unwrap_or(defaults.base_url);
        let request_timeout = env_u64("GAMEFEED_REQUEST_TIMEOUT_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.request_timeout);
        Self {
            base_url,
            request_timeout,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub debounce: Duration,
    pub user_sigil: char,
    pub catalog_min_chars: usize,
    pub user_min_chars: usize,
    pub cache_ttl: Duration,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
            user_sigil: DEFAULT_SIGIL,
            catalog_min_chars: 2,
            user_min_chars: 1,
            cache_ttl: Duration::from_secs(30 * 60),
        }
    }
}

impl SearchConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let debounce = env_u64("GAMEFEED_SEARCH_DEBOUNCE_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.debounce);
        // Only a single-character sigil makes sense as a prefix.
        let user_sigil = env::var("GAMEFEED_USER_SIGIL")
            .ok()
            .and_then(|raw| {
                let mut chars = raw.trim().chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Some(c),
                    _ => None,
                }
            })
            .unwrap_or(defaults.user_sigil);
        let cache_ttl = env_u64("GAMEFEED_SEARCH_CACHE_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.cache_ttl);
        Self {
            debounce,
            user_sigil,
            cache_ttl,
            ..defaults
        }
    }
}

#[derive(Debug, Clone)]
pub struct DraftConfig {
    pub idle_delay: Duration,
    pub ttl: Duration,
}

impl Default for DraftConfig {
    fn default() -> Self {
        Self {
            idle_delay: Duration::from_millis(2000),
            ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl DraftConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let idle_delay = env_u64("GAMEFEED_DRAFT_IDLE_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.idle_delay);
        let ttl = env_u64("GAMEFEED_DRAFT_TTL_HOURS")
            .map(|hours| Duration::from_secs(hours * 60 * 60))
            .unwrap_or(defaults.ttl);
        Self { idle_delay, ttl }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FeedPaths {
    pub base: PathBuf,
    pub store_path: PathBuf,
}

impl FeedPaths {
    pub fn discover() -> Result<Self> {
        let base = dirs::data_dir()
            .ok_or_else(|| anyhow!("no user data directory on this platform"))?
            .join("gamefeed");
        Ok(Self::from_base_dir(base))
    }

    pub fn from_base_dir<P: AsRef<Path>>(base: P) -> Self {
        let base = base.as_ref().to_path_buf();
        let store_path = base.join("store.json");
        Self { base, store_path }
    }
}

fn env_u64(name: &str) -> Option<u64> {
    env::var(name).ok().and_then(|raw| raw.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = FeedConfig::with_base_dir("/tmp/gamefeed-test");
        assert_eq!(config.api.request_timeout, Duration::from_secs(10));
        assert_eq!(config.search.debounce, Duration::from_millis(500));
        assert_eq!(config.search.user_sigil, '@');
        assert_eq!(config.search.catalog_min_chars, 2);
        assert_eq!(config.search.user_min_chars, 1);
        assert_eq!(config.drafts.idle_delay, Duration::from_secs(2));
        assert_eq!(config.drafts.ttl, Duration::from_secs(86_400));
        assert_eq!(
            config.paths.store_path,
            PathBuf::from("/tmp/gamefeed-test/store.json")
        );
    }
}
