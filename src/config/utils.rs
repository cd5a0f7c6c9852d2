use std::env;
use std::fmt::Display;
use std::str::FromStr;

/// Parse a boolean value from a string, supporting multiple formats
///
/// Accepts: "true", "false", "1", "0", "yes", "no" (case insensitive)
pub fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// Reads and parses an environment variable.
///
/// Unset or blank variables yield `Ok(None)`; present but unparsable values
/// are an error naming the variable.
pub fn env_parse<T>(name: &str) -> Result<Option<T>, String>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| format!("Invalid {name} environment variable: {e}")),
        _ => Ok(None),
    }
}

/// Reads a boolean environment variable via [`parse_bool`].
pub fn env_bool(name: &str) -> Result<Option<bool>, String> {
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => parse_bool(&raw)
            .map(Some)
            .ok_or_else(|| format!("Invalid {name} environment variable: {raw}")),
        _ => Ok(None),
    }
}

/// Reads a non-blank string environment variable.
pub fn env_string(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}
