//! Sanitization of free-text user input.
//!
//! Server names, world seeds, and owner names are embedded into hostnames,
//! provisioning parameters, and the proxy routing table, so anything that is
//! not a plain ASCII letter or digit is stripped before storage or use.

/// Strip every character that is not an ASCII letter or digit.
///
/// Total and idempotent; empty input yields an empty token.
pub fn sanitize(input: &str) -> String {
    input.chars().filter(char::is_ascii_alphanumeric).collect()
}

/// Normalize an enumeration-like field (gamemode, difficulty) to a token of
/// ASCII lowercase letters only.
pub fn normalize_enum(input: &str) -> String {
    input
        .to_ascii_lowercase()
        .chars()
        .filter(char::is_ascii_lowercase)
        .collect()
}
