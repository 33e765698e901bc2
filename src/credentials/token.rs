//! Token name → credential name mapping.

/// Credential name of the internal software token.
pub const INTERNAL_TOKEN_NAME: &str = "internal";

/// Long form under which the internal token is sometimes reported.
pub const INTERNAL_TOKEN_FULL_NAME: &str = "Internal Key Storage Token";

/// `None` for the internal token (however it is spelled), the trimmed name otherwise.
pub fn normalize_token(token: &str) -> Option<&str> {
    let token = token.trim();
    if token.is_empty()
        || token.eq_ignore_ascii_case(INTERNAL_TOKEN_NAME)
        || token.eq_ignore_ascii_case(INTERNAL_TOKEN_FULL_NAME)
    {
        return None;
    }
    Some(token)
}

/// Name under which a token's password is stored.
///
/// The internal token maps to [`INTERNAL_TOKEN_NAME`]; a hardware token `T`
/// maps to `hardware-T`.
pub fn credential_name_for_token(token: &str) -> String {
    match normalize_token(token) {
        None => INTERNAL_TOKEN_NAME.to_string(),
        Some(token) => format!("hardware-{}", token),
    }
}
