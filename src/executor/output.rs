//! Output trimming for error messages and logs.

/// Trim command output for inclusion in error messages.
///
/// Keeps at most `max_lines` lines, shortens long lines, and caps the total
/// length so a noisy package manager cannot flood the log.
pub fn sanitize_output(output: &str, max_lines: usize) -> String {
    const MAX_LINE_LENGTH: usize = 200;
    const MAX_TOTAL_LENGTH: usize = 1000;

    let mut result = String::new();

    for line in output.lines().take(max_lines) {
        let truncated = match line.char_indices().nth(MAX_LINE_LENGTH) {
            Some((idx, _)) => format!("{}...", &line[..idx]),
            None => line.to_string(),
        };

        if result.len() + truncated.len() > MAX_TOTAL_LENGTH {
            result.push_str("...[truncated]");
            return result;
        }

        if !result.is_empty() {
            result.push('\n');
        }
        result.push_str(&truncated);
    }

    if output.lines().count() > max_lines {
        result.push_str("\n...[additional output truncated]");
    }

    result
}
