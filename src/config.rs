//! Configuration surface: [`HttpNetworkConfig`] (front-object options) and
//! [`SenderOptions`] (per-sender options), translated from the upstream
//! functional-options pattern (`WithUserAgent`, ...) into Rust's idiomatic
//! consuming builder.
use std::collections::HashSet;
use std::time::Duration;

pub const DEFAULT_MAX_BLOCK_SIZE: u64 = 2 << 20; // 2 MiB
pub const DEFAULT_IDLE_CONN_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_IDLE_CONNS: usize = 100;
pub const DEFAULT_SUPPORTS_HAVE: bool = false;
pub const DEFAULT_INSECURE_SKIP_VERIFY: bool = false;

pub const DEFAULT_MAX_RETRIES: u32 = 1;
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_SEND_ERROR_BACKOFF: Duration = Duration::from_secs(1);

const MIN_SEND_TIMEOUT: Duration = Duration::from_secs(1);
const MIN_SEND_ERROR_BACKOFF: Duration = Duration::from_millis(50);

fn default_user_agent() -> String {
    format!("{}@{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

/// Configuration for [`crate::network::HttpNetwork`].
#[derive(Debug, Clone)]
pub struct HttpNetworkConfig {
    pub user_agent: String,
    pub max_block_size: u64,
    pub idle_conn_timeout: Duration,
    pub max_idle_conns: usize,
    pub supports_have: bool,
    pub insecure_skip_verify: bool,
    pub allowlist: HashSet<String>,
}

impl Default for HttpNetworkConfig {
    fn default() -> Self {
        HttpNetworkConfig {
            user_agent: default_user_agent(),
            max_block_size: DEFAULT_MAX_BLOCK_SIZE,
            idle_conn_timeout: DEFAULT_IDLE_CONN_TIMEOUT,
            max_idle_conns: DEFAULT_MAX_IDLE_CONNS,
            supports_have: DEFAULT_SUPPORTS_HAVE,
            insecure_skip_verify: DEFAULT_INSECURE_SKIP_VERIFY,
            allowlist: HashSet::new(),
        }
    }
}

impl HttpNetworkConfig {
    pub fn with_user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = agent.into();
        self
    }

    pub fn with_max_block_size(mut self, size: u64) -> Self {
        self.max_block_size = size;
        self
    }

    pub fn with_idle_conn_timeout(mut self, t: Duration) -> Self {
        self.idle_conn_timeout = t;
        self
    }

    pub fn with_max_idle_conns(mut self, n: usize) -> Self {
        self.max_idle_conns = n;
        self
    }

    pub fn with_supports_have(mut self, b: bool) -> Self {
        self.supports_have = b;
        self
    }

    pub fn with_insecure_skip_verify(mut self, b: bool) -> Self {
        self.insecure_skip_verify = b;
        self
    }

    /// Restricts outbound connections to the given hostnames. An empty
    /// allowlist (the default) permits all hosts.
    pub fn with_allowlist(mut self, hosts: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.allowlist = hosts.into_iter().map(Into::into).collect();
        self
    }
}

/// Per-[`crate::sender::MessageSender`] options, with floors applied the
/// same way the upstream `setSenderOpts` does: a value at or below the
/// floor falls back to the default rather than erroring.
#[derive(Debug, Clone, Copy)]
pub struct SenderOptions {
    pub max_retries: u32,
    pub send_timeout: Duration,
    pub send_error_backoff: Duration,
}

impl Default for SenderOptions {
    fn default() -> Self {
        SenderOptions {
            max_retries: DEFAULT_MAX_RETRIES,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            send_error_backoff: DEFAULT_SEND_ERROR_BACKOFF,
        }
    }
}

impl SenderOptions {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        // Zero means "apply default"; the Go source treats <=0 the same way.
        self.max_retries = if max_retries > 0 { max_retries } else { DEFAULT_MAX_RETRIES };
        self
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = if timeout > MIN_SEND_TIMEOUT { timeout } else { DEFAULT_SEND_TIMEOUT };
        self
    }

    pub fn with_send_error_backoff(mut self, backoff: Duration) -> Self {
        self.send_error_backoff = if backoff > MIN_SEND_ERROR_BACKOFF {
            backoff
        } else {
            DEFAULT_SEND_ERROR_BACKOFF
        };
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sender_options_floor_to_defaults() {
        let opts = SenderOptions::default()
            .with_max_retries(0)
            .with_send_timeout(Duration::from_millis(1))
            .with_send_error_backoff(Duration::from_millis(1));
        assert_eq!(opts.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(opts.send_timeout, DEFAULT_SEND_TIMEOUT);
        assert_eq!(opts.send_error_backoff, DEFAULT_SEND_ERROR_BACKOFF);
    }

    #[test]
    fn sender_options_respect_values_above_floor() {
        let opts = SenderOptions::default()
            .with_max_retries(3)
            .with_send_timeout(Duration::from_secs(30))
            .with_send_error_backoff(Duration::from_secs(2));
        assert_eq!(opts.max_retries, 3);
        assert_eq!(opts.send_timeout, Duration::from_secs(30));
        assert_eq!(opts.send_error_backoff, Duration::from_secs(2));
    }

    #[test]
    fn network_config_default_matches_spec() {
        let cfg = HttpNetworkConfig::default();
        assert_eq!(cfg.max_block_size, DEFAULT_MAX_BLOCK_SIZE);
        assert_eq!(cfg.idle_conn_timeout, DEFAULT_IDLE_CONN_TIMEOUT);
        assert_eq!(cfg.max_idle_conns, DEFAULT_MAX_IDLE_CONNS);
        assert!(!cfg.supports_have);
        assert!(!cfg.insecure_skip_verify);
        assert!(cfg.allowlist.is_empty());
    }
}
