/// Truncate a string to a maximum character count (UTF-8 safe), adding
/// "..." when truncated. Used for prompt previews in the debug log.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    let char_count = s.chars().count();
    if char_count <= max_chars {
        return s.to_string();
    }
    let truncated: String = s.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", truncated)
}
