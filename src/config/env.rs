//! Environment variable helpers.

use std::str::FromStr;

use super::ConfigError;

/// Read a variable, treating unset and blank values the same.
pub(super) fn var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Read the first non-blank variable among `names`.
pub(super) fn first_var(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| var(name))
}

/// Read and parse a variable.
pub(super) fn parse_var<T>(name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    var(name)
        .map(|raw| {
            raw.parse::<T>().map_err(|e| ConfigError::Invalid {
                field: name,
                reason: format!("'{raw}': {e}"),
            })
        })
        .transpose()
}
