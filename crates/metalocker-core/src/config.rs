//! Wallet-wide configuration. No hidden singletons (spec.md §9): every
//! value a caller might want to override on a per-process or per-test basis
//! lives here instead of as a `const` buried in the module that uses it.
use std::time::Duration;

/// Default polling fallback for [`crate::wallet::SubmitFuture::wait`] when
/// the notification bus is unavailable (spec.md §6).
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default clock-skew tolerance for [`crate::lease::AccessToken::verify`]
/// (spec.md §4.5).
pub const DEFAULT_MAX_TOKEN_DISTANCE_SECONDS: i64 = 300;

#[derive(Clone, Debug)]
pub struct WalletConfig {
    /// DID method this wallet mints identities under, e.g. `"piprate"`.
    pub did_method: String,
    pub confirmation_timeout: Duration,
    pub poll_interval: Duration,
    pub max_token_distance_seconds: i64,
}

impl Default for WalletConfig {
    fn default() -> Self {
        WalletConfig {
            did_method: "piprate".to_string(),
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_token_distance_seconds: DEFAULT_MAX_TOKEN_DISTANCE_SECONDS,
        }
    }
}

#[test]
fn test_default_config() {
    let cfg = WalletConfig::default();
    assert_eq!(cfg.did_method, "piprate");
    assert_eq!(cfg.poll_interval, Duration::from_secs(1));
}
