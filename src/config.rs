use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BIND: &str = "127.0.0.1:8080";
pub const DEFAULT_UPSTREAM_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Where chat-completion requests are forwarded and with which credential.
/// Resolved once at startup and handed to the forwarder at construction; no
/// ambient environment lookups happen after that.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    /// `None` leaves the upstream call unbounded.
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub bind: String,
    pub static_root: PathBuf,
    pub upstream: UpstreamConfig,
}

impl ProxyConfig {
    pub fn from_env() -> Self {
        let bind = non_empty_env("HEICBRIDGE_BIND").unwrap_or_else(|| String::from(DEFAULT_BIND));
        let static_root = non_empty_env("HEICBRIDGE_STATIC_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        let endpoint = non_empty_env("HEICBRIDGE_UPSTREAM_URL")
            .unwrap_or_else(|| String::from(DEFAULT_UPSTREAM_URL));
        let api_key = non_empty_env("OPENAI_API_KEY");
        let timeout = non_empty_env("HEICBRIDGE_UPSTREAM_TIMEOUT_SECS")
            .and_then(|raw| raw.parse::<u64>().ok())
            .map(Duration::from_secs);

        Self {
            bind,
            static_root,
            upstream: UpstreamConfig {
                endpoint,
                api_key,
                timeout,
            },
        }
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use std::sync::{Mutex, OnceLock};

    use pretty_assertions::assert_eq;

    use super::*;

    // Env vars are process-global; serialize tests that touch them.
    fn env_lock() -> &'static Mutex<()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
    }

    fn with_env(vars: &[(&str, Option<&str>)], run: impl FnOnce()) {
        let _guard = env_lock().lock().expect("env lock should not be poisoned");
        let previous = vars
            .iter()
            .map(|(name, _)| (*name, std::env::var(name).ok()))
            .collect::<Vec<_>>();
        for (name, value) in vars {
            match value {
                Some(value) => unsafe { std::env::set_var(name, value) },
                None => unsafe { std::env::remove_var(name) },
            }
        }
        run();
        for (name, value) in previous {
            match value {
                Some(value) => unsafe { std::env::set_var(name, value) },
                None => unsafe { std::env::remove_var(name) },
            }
        }
    }

    const ALL_VARS: [&str; 5] = [
        "HEICBRIDGE_BIND",
        "HEICBRIDGE_STATIC_ROOT",
        "HEICBRIDGE_UPSTREAM_URL",
        "OPENAI_API_KEY",
        "HEICBRIDGE_UPSTREAM_TIMEOUT_SECS",
    ];

    fn cleared() -> Vec<(&'static str, Option<&'static str>)> {
        ALL_VARS.iter().map(|name| (*name, None)).collect()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        with_env(cleared().as_slice(), || {
            let config = ProxyConfig::from_env();
            assert_eq!(config.bind, DEFAULT_BIND);
            assert_eq!(config.static_root, PathBuf::from("."));
            assert_eq!(config.upstream.endpoint, DEFAULT_UPSTREAM_URL);
            assert_eq!(config.upstream.api_key, None);
            assert_eq!(config.upstream.timeout, None);
        });
    }

    #[test]
    fn environment_overrides_are_honored() {
        let mut vars = cleared();
        vars[0].1 = Some("0.0.0.0:9000");
        vars[1].1 = Some("/srv/static");
        vars[2].1 = Some("https://upstream.example/v1/chat/completions");
        vars[3].1 = Some("sk-live");
        vars[4].1 = Some("120");
        with_env(vars.as_slice(), || {
            let config = ProxyConfig::from_env();
            assert_eq!(config.bind, "0.0.0.0:9000");
            assert_eq!(config.static_root, PathBuf::from("/srv/static"));
            assert_eq!(
                config.upstream.endpoint,
                "https://upstream.example/v1/chat/completions"
            );
            assert_eq!(config.upstream.api_key.as_deref(), Some("sk-live"));
            assert_eq!(config.upstream.timeout, Some(Duration::from_secs(120)));
        });
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let mut vars = cleared();
        vars[0].1 = Some("   ");
        vars[3].1 = Some("");
        with_env(vars.as_slice(), || {
            let config = ProxyConfig::from_env();
            assert_eq!(config.bind, DEFAULT_BIND);
            assert_eq!(config.upstream.api_key, None);
        });
    }

    #[test]
    fn unparseable_timeout_is_ignored() {
        let mut vars = cleared();
        vars[4].1 = Some("soon");
        with_env(vars.as_slice(), || {
            let config = ProxyConfig::from_env();
            assert_eq!(config.upstream.timeout, None);
        });
    }
}
