use std::env;
#[cfg(test)]
use std::sync::Mutex;
use std::time::Duration;

pub const DEFAULT_SERVER: &str = "http://127.0.0.1:5000";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_HINT_EXPIRY: Duration = Duration::from_secs(6);

/// Lightbox client configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Generation service base URL
    pub server: String,
    /// Fixed status poll cadence
    pub poll_interval: Duration,
    /// How long the multi-item hint stays visible before expiring on its own
    pub hint_expiry: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let server = env::var("LIGHTBOX_SERVER").unwrap_or_else(|_| DEFAULT_SERVER.to_string());
        let poll_interval = duration_ms_var("LIGHTBOX_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL);
        let hint_expiry = duration_ms_var("LIGHTBOX_HINT_EXPIRY_MS", DEFAULT_HINT_EXPIRY);
        Self {
            server,
            poll_interval,
            hint_expiry,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            hint_expiry: DEFAULT_HINT_EXPIRY,
        }
    }
}

fn duration_ms_var(var: &str, default: Duration) -> Duration {
    env::var(var)
        .ok()
        .and_then(|raw| raw.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::LazyLock;

    // Mutex to ensure environment variable tests don't run in parallel
    static ENV_MUTEX: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server, DEFAULT_SERVER);
        assert_eq!(config.poll_interval, Duration::from_millis(500));
        assert_eq!(config.hint_expiry, Duration::from_secs(6));
    }

    #[test]
    fn test_config_from_env_default() {
        let _lock = ENV_MUTEX.lock().unwrap();

        unsafe {
            env::remove_var("LIGHTBOX_SERVER");
            env::remove_var("LIGHTBOX_POLL_INTERVAL_MS");
            env::remove_var("LIGHTBOX_HINT_EXPIRY_MS");
        }
        let config = Config::from_env();
        assert_eq!(config.server, DEFAULT_SERVER);
        assert_eq!(config.poll_interval, DEFAULT_POLL_INTERVAL);
    }

    #[test]
    fn test_config_from_env_custom() {
        let _lock = ENV_MUTEX.lock().unwrap();

        let original = env::var("LIGHTBOX_POLL_INTERVAL_MS").ok();
        unsafe {
            env::set_var("LIGHTBOX_POLL_INTERVAL_MS", "250");
        }
        let config = Config::from_env();
        assert_eq!(config.poll_interval, Duration::from_millis(250));

        unsafe {
            if let Some(orig) = original {
                env::set_var("LIGHTBOX_POLL_INTERVAL_MS", orig);
            } else {
                env::remove_var("LIGHTBOX_POLL_INTERVAL_MS");
            }
        }
    }

    #[test]
    fn test_unparseable_interval_falls_back() {
        let _lock = ENV_MUTEX.lock().unwrap();

        unsafe {
            env::set_var("LIGHTBOX_POLL_INTERVAL_MS", "soon");
        }
        let config = Config::from_env();
        assert_eq!(config.poll_interval, DEFAULT_POLL_INTERVAL);
        unsafe {
            env::remove_var("LIGHTBOX_POLL_INTERVAL_MS");
        }
    }
}
