//! Bounded text rendering for decision messages.
//!
//! Hosts paste these strings into a terminal or an agent transcript, so lines
//! and lists are capped rather than dumped whole.

/// Collapse newlines/extra whitespace and bound length for display.
pub fn compact_line(input: &str, max_chars: usize) -> String {
    let collapsed = input.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut chars = collapsed.chars();
    let preview: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", preview)
    } else {
        preview
    }
}

/// Render up to `max_items` paths as a bullet list, noting how many were left out.
pub fn bullet_list(items: &[String], max_items: usize) -> String {
    let mut lines: Vec<String> = items
        .iter()
        .take(max_items)
        .map(|item| format!("  - {}", item))
        .collect();
    if items.len() > max_items {
        lines.push(format!("  (+{} more)", items.len() - max_items));
    }
    lines.join("\n")
}

/// Truncate at a char boundary no later than `max_bytes`.
pub fn truncate_bytes(input: &str, max_bytes: usize) -> &str {
    if input.len() <= max_bytes {
        return input;
    }
    let mut end = max_bytes;
    while !input.is_char_boundary(end) {
        end -= 1;
    }
    &input[..end]
}
