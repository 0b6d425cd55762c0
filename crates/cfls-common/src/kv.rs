//! Parsing for `key=value` lists given on the command line or in the environment

use std::collections::BTreeMap;
use thiserror::Error;

/// Error raised for a malformed `key=value` entry
#[derive(Error, Debug, PartialEq, Eq)]
pub enum KvError {
    #[error("entry `{0}` is missing '='")]
    MissingSeparator(String),

    #[error("entry `{0}` has an empty key")]
    EmptyKey(String),
}

/// Parse a comma separated list of `key=value` pairs.
///
/// Whitespace around keys and values is trimmed and empty entries are ignored,
/// so `""` and `"a=1,"` are both accepted. A repeated key keeps its last value.
/// Values may themselves contain `=`.
pub fn parse_pairs(input: &str) -> Result<BTreeMap<String, String>, KvError> {
    let mut pairs = BTreeMap::new();

    for entry in input.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (key, value) = entry
            .split_once('=')
            .ok_or_else(|| KvError::MissingSeparator(entry.to_string()))?;

        let key = key.trim();
        if key.is_empty() {
            return Err(KvError::EmptyKey(entry.to_string()));
        }

        pairs.insert(key.to_string(), value.trim().to_string());
    }

    Ok(pairs)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pairs() {
        let pairs = parse_pairs("env=prod, team = edge ,tier=a=b").unwrap();
        assert_eq!(pairs.len(), 3);
        assert_eq!(pairs["env"], "prod");
        assert_eq!(pairs["team"], "edge");
        assert_eq!(pairs["tier"], "a=b");
    }

    #[test]
    fn test_parse_pairs_empty() {
        assert!(parse_pairs("").unwrap().is_empty());
        assert!(parse_pairs(" , ").unwrap().is_empty());
    }

    #[test]
    fn test_parse_pairs_last_value_wins() {
        let pairs = parse_pairs("a=1,a=2").unwrap();
        assert_eq!(pairs["a"], "2");
    }

    #[test]
    fn test_parse_pairs_errors() {
        assert_eq!(
            parse_pairs("novalue"),
            Err(KvError::MissingSeparator("novalue".to_string()))
        );
        assert_eq!(parse_pairs("=x"), Err(KvError::EmptyKey("=x".to_string())));
    }
}
