//! Pre-processing: repair Markdown table fences before conversion.
//!
//! ## Why is this necessary?
//!
//! GFM only recognises a table when the header row starts a new block. A table
//! written directly under a paragraph line
//!
//! ```text
//! Quarterly results
//! | Q | Revenue |
//! |---|---------|
//! ```
//!
//! is parsed as paragraph continuation text and comes out as a run of pipes.
//! People paste Markdown like this all the time (chat exports, LLM output), so
//! we insert the missing blank line instead of asking them to.
//!
//! The pass is a single left-to-right scan over lines: no backtracking, no
//! regexes, and it never touches lines that are not table rows.

/// Insert a blank line before every table block that directly follows text.
///
/// A line is a table row when, after trimming, it starts with `|`. A blank line
/// is inserted before such a row when
///
/// 1. it is not the first line,
/// 2. the previous *input* line is non-blank and not itself a table row, and
/// 3. the last line already emitted is not blank.
///
/// Lines are split on `\n` and re-joined with `\n`; nothing else changes.
/// Applying the function twice gives the same result as applying it once.
pub fn normalize_tables(input: &str) -> String {
    let lines: Vec<&str> = input.split('\n').collect();
    let mut result: Vec<&str> = Vec::with_capacity(lines.len() + 8);

    for (i, line) in lines.iter().enumerate() {
        if i > 0 && is_table_line(line) {
            let prev = lines[i - 1].trim();
            let starts_block = !prev.is_empty() && !prev.starts_with('|');
            let last_emitted_blank = result.last().is_none_or(|l| l.trim().is_empty());
            if starts_block && !last_emitted_blank {
                result.push("");
            }
        }
        result.push(line);
    }

    result.join("\n")
}

/// `true` when the trimmed line starts with a pipe.
fn is_table_line(line: &str) -> bool {
    line.trim_start().starts_with('|')
}

// ── Tests ────────────────────────────────────────────────────────────────────
