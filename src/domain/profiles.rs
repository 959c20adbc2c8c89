//! Profile path handling.

/// Normalize a profile path segment into a lookup username.
///
/// A single leading `@` is accepted and stripped. Provider usernames are
/// case-insensitive, so the result is lowercased. Returns `None` when nothing
/// usable remains.
pub fn normalize_username(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let name = trimmed.strip_prefix('@').unwrap_or(trimmed).trim();
    if name.is_empty() || name.contains('/') || name.contains('@') {
        return None;
    }
    Some(name.to_lowercase())
}
