//! Environment variable utilities
//!
//! Used by `ExecutorConfig::from_env` and the logging setup.
//!
//! ```ignore
//! use corun_core::env::{env_get, env_get_bool, env_get_opt};
//!
//! let capacity: usize = env_get("CORUN_QUEUE_CAPACITY", 16);
//! let flush = env_get_bool("CORUN_FLUSH_LOG", false);
//! let stack: Option<usize> = env_get_opt("CORUN_STACK_SIZE");
//! ```

use std::str::FromStr;

/// Parse `key` as `T`, falling back to `default` when unset or unparsable
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Read `key` as a boolean flag
///
/// "1", "true", "yes" and "on" (any case) are true, any other value is
/// false. An unset variable yields `default`.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => parse_flag(&val),
        Err(_) => default,
    }
}

/// Parse `key` as `T`, `None` when unset, empty or unparsable
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse().ok())
}

pub(crate) fn parse_flag(val: &str) -> bool {
    matches!(
        val.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_get_default() {
        let val: usize = env_get("__CORUN_TEST_UNSET__", 42);
        assert_eq!(val, 42);
    }

    #[test]
    fn test_env_get_parses_and_trims() {
        std::env::set_var("__CORUN_TEST_NUM__", " 123 ");
        let val: usize = env_get("__CORUN_TEST_NUM__", 0);
        assert_eq!(val, 123);
        std::env::remove_var("__CORUN_TEST_NUM__");
    }

    #[test]
    fn test_env_get_invalid_falls_back() {
        std::env::set_var("__CORUN_TEST_INVALID__", "sixteen");
        let val: usize = env_get("__CORUN_TEST_INVALID__", 16);
        assert_eq!(val, 16);
        std::env::remove_var("__CORUN_TEST_INVALID__");
    }

    #[test]
    fn test_env_get_opt_empty_is_none() {
        std::env::set_var("__CORUN_TEST_EMPTY__", "");
        let val: Option<usize> = env_get_opt("__CORUN_TEST_EMPTY__");
        assert!(val.is_none());
        std::env::remove_var("__CORUN_TEST_EMPTY__");
    }

    #[test]
    fn test_flag_variants() {
        for on in ["1", "true", "TRUE", "yes", "On"] {
            assert!(parse_flag(on), "{} should be on", on);
        }
        for off in ["0", "false", "no", "garbage", ""] {
            assert!(!parse_flag(off), "{} should be off", off);
        }
        assert!(env_get_bool("__CORUN_TEST_UNSET__", true));
    }
}
