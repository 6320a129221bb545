/// Characters kept visible at each end of a masked secret
const MASK_VISIBLE: usize = 4;

/// Placeholder for keys that have no value
pub const NOT_SET: &str = "(not set)";

/// Hide the middle of a secret, keeping a few characters at each end so
/// two tokens can still be told apart
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= MASK_VISIBLE * 3 {
        return "*".repeat(chars.len().max(4));
    }
    let head: String = chars[..MASK_VISIBLE].iter().collect();
    let tail: String = chars[chars.len() - MASK_VISIBLE..].iter().collect();
    format!("{}...{} ({} chars)", head, tail, chars.len())
}

/// Format a cached value for display
pub fn display_value(value: Option<&str>, secret: bool, reveal: bool) -> String {
    match value {
        None => NOT_SET.to_string(),
        Some(v) if secret && !reveal => mask_secret(v),
        Some(v) => v.to_string(),
    }
}
