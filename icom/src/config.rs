//! Process-wide configuration defaults.
//!
//! Values are read by a link only when it is created, so changing them never
//! affects links that already exist.

use std::fmt;
use std::str::FromStr;
use std::sync::RwLock;
use std::time::Duration;

use crate::error::{IcomError, Result};

/// Default for both timeouts: one second.
pub const DEFAULT_TIMEOUT_USEC: u64 = 1_000_000;

/// Keys of the configuration store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    /// Receive timeout applied to links created with the `timeout` flag.
    TimeoutRcvUsec,
    /// Send timeout applied to links created with the `timeout` flag.
    TimeoutSndUsec,
}

impl ConfigKey {
    pub fn name(self) -> &'static str {
        match self {
            ConfigKey::TimeoutRcvUsec => "timeout_rcv_usec",
            ConfigKey::TimeoutSndUsec => "timeout_snd_usec",
        }
    }
}

impl FromStr for ConfigKey {
    type Err = IcomError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "timeout_rcv_usec" => Ok(ConfigKey::TimeoutRcvUsec),
            "timeout_snd_usec" => Ok(ConfigKey::TimeoutSndUsec),
            other => Err(IcomError::Lookup(other.to_string())),
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

struct Store {
    timeout_rcv_usec: u64,
    timeout_snd_usec: u64,
}

static STORE: RwLock<Store> = RwLock::new(Store {
    timeout_rcv_usec: DEFAULT_TIMEOUT_USEC,
    timeout_snd_usec: DEFAULT_TIMEOUT_USEC,
});

/// Current value for `key`.
pub fn get(key: ConfigKey) -> u64 {
    // A poisoned lock still holds plain integers.
    let store = STORE.read().unwrap_or_else(|e| e.into_inner());
    match key {
        ConfigKey::TimeoutRcvUsec => store.timeout_rcv_usec,
        ConfigKey::TimeoutSndUsec => store.timeout_snd_usec,
    }
}

/// Replace the value for `key`; zero is rejected.
pub fn set(key: ConfigKey, value: u64) -> Result<()> {
    if value == 0 {
        return Err(IcomError::InvalidArgument(format!("{key} must be non-zero")));
    }
    let mut store = STORE.write().unwrap_or_else(|e| e.into_inner());
    match key {
        ConfigKey::TimeoutRcvUsec => store.timeout_rcv_usec = value,
        ConfigKey::TimeoutSndUsec => store.timeout_snd_usec = value,
    }
    log::debug!("config {key} = {value}");
    Ok(())
}

/// Timeouts applied by links created with the `timeout` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub recv: Duration,
    pub send: Duration,
}

impl Timeouts {
    /// Snapshot of the current process-wide defaults.
    pub fn from_defaults() -> Self {
        Self {
            recv: Duration::from_micros(get(ConfigKey::TimeoutRcvUsec)),
            send: Duration::from_micros(get(ConfigKey::TimeoutSndUsec)),
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::from_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_parse_from_names() {
        assert_eq!(
            "timeout_rcv_usec".parse::<ConfigKey>().unwrap(),
            ConfigKey::TimeoutRcvUsec
        );
        assert_eq!(
            "timeout_snd_usec".parse::<ConfigKey>().unwrap(),
            ConfigKey::TimeoutSndUsec
        );
        assert!(matches!(
            "timeout".parse::<ConfigKey>(),
            Err(IcomError::Lookup(_))
        ));
    }

    #[test]
    fn zero_is_rejected_and_value_kept() {
        let before = get(ConfigKey::TimeoutSndUsec);
        assert!(matches!(
            set(ConfigKey::TimeoutSndUsec, 0),
            Err(IcomError::InvalidArgument(_))
        ));
        assert_eq!(get(ConfigKey::TimeoutSndUsec), before);
    }

    // The only test that writes the store; others read it.
    #[test]
    fn set_then_get_and_snapshot() {
        let before = get(ConfigKey::TimeoutRcvUsec);
        set(ConfigKey::TimeoutRcvUsec, 250_000).unwrap();
        assert_eq!(get(ConfigKey::TimeoutRcvUsec), 250_000);
        assert_eq!(Timeouts::from_defaults().recv, Duration::from_millis(250));
        set(ConfigKey::TimeoutRcvUsec, before).unwrap();
    }
}
