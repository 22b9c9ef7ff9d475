// Environment variable loading

use crate::{ConfigError, Result};
use std::collections::HashMap;
use std::env;
use std::str::FromStr;

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Environment variable loader.
///
/// Reads through a lookup function rather than `std::env` directly, so the
/// same code path can be fed a fixed map in tests.
pub struct EnvLoader {
    lookup: Lookup,
}

impl EnvLoader {
    /// Loader over the process environment.
    pub fn new() -> Self {
        Self {
            lookup: Box::new(|key| env::var(key).ok()),
        }
    }

    /// Loader over a fixed set of variables.
    pub fn from_map(vars: HashMap<String, String>) -> Self {
        Self {
            lookup: Box::new(move |key| vars.get(key).cloned()),
        }
    }

    /// Load a variable; empty values count as unset.
    pub fn var(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.trim().is_empty())
    }

    /// Load a variable that must be present.
    pub fn require(&self, key: &str) -> Result<String> {
        self.var(key)
            .ok_or_else(|| ConfigError::Missing(key.to_string()))
    }

    /// Load the first variable that is set, in the given precedence order.
    ///
    /// Returns the name of the variable that matched alongside its value.
    pub fn first_of(&self, keys: &[&str]) -> Option<(String, String)> {
        keys.iter()
            .find_map(|key| self.var(key).map(|value| (key.to_string(), value)))
    }

    /// Load and parse a variable, falling back to `default` when unset.
    pub fn parse_or<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.var(key) {
            Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
                key: key.to_string(),
                message: e.to_string(),
            }),
            None => Ok(default),
        }
    }
}

impl Default for EnvLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loader(pairs: &[(&str, &str)]) -> EnvLoader {
        EnvLoader::from_map(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_empty_value_is_unset() {
        let env = loader(&[("PORT", "  ")]);
        assert_eq!(env.var("PORT"), None);
        assert_eq!(env.require("PORT"), Err(ConfigError::Missing("PORT".into())));
    }

    #[test]
    fn test_first_of_respects_order() {
        let env = loader(&[("B", "second"), ("C", "third")]);
        assert_eq!(
            env.first_of(&["A", "B", "C"]),
            Some(("B".to_string(), "second".to_string()))
        );
        assert_eq!(env.first_of(&["X", "Y"]), None);
    }

    #[test]
    fn test_parse_or() {
        let env = loader(&[("PORT", "8080"), ("BAD", "eighty")]);
        assert_eq!(env.parse_or("PORT", 3000u16).unwrap(), 8080);
        assert_eq!(env.parse_or("MISSING", 3000u16).unwrap(), 3000);
        assert!(matches!(
            env.parse_or("BAD", 3000u16),
            Err(ConfigError::Invalid { key, .. }) if key == "BAD"
        ));
    }

    #[test]
    fn test_process_env_loader_reads_path() {
        // PATH is set on any sane system
        let env = EnvLoader::new();
        if std::env::var("PATH").is_ok() {
            assert!(env.var("PATH").is_some());
        }
    }
}
