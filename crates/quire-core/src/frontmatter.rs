//! Front-matter parsing and writing.
//!
//! A stored document is an optional `key: value` header followed by the
//! raw body:
//! ```text
//! ---
//! id: 5f0c3a7e9b1d4c2a8e6f0b1c2d3e4f5a
//! index.leaves: true
//! ---
//! Body text, byte for byte.
//! ```

use std::collections::HashMap;

use tracing::warn;

use crate::document::Document;
use crate::metadata;

/// Front-matter delimiter line.
pub const DELIMITER: &str = "---";

/// Split a stored document into its metadata pairs and body.
///
/// Returns `None` for the metadata when the first line is not exactly the
/// delimiter, in which case the body is the whole text. A header that is
/// never closed is treated the same way.
pub fn split_frontmatter(text: &str) -> (Option<HashMap<String, String>>, &str) {
    let Some((first, mut rest)) = next_line(text) else {
        return (None, text);
    };
    if first != DELIMITER {
        return (None, text);
    }

    let mut fields = HashMap::new();
    while let Some((line, after)) = next_line(rest) {
        rest = after;
        let line = line.trim();
        if line == DELIMITER {
            return (Some(fields), rest);
        }
        if line.is_empty() {
            continue;
        }
        match line.split_once(':') {
            Some((key, value)) => {
                fields.insert(key.trim().to_lowercase(), value.trim().to_string());
            }
            None => warn!(line, "skipping front-matter line without ':'"),
        }
    }

    warn!("front matter has no closing delimiter, reading as plain body");
    (None, text)
}

/// Pop one line, without its terminator. `None` once `text` is exhausted.
fn next_line(text: &str) -> Option<(&str, &str)> {
    if text.is_empty() {
        return None;
    }
    let (line, rest) = match text.find('\n') {
        Some(pos) => (&text[..pos], &text[pos + 1..]),
        None => (text, ""),
    };
    Some((line.strip_suffix('\r').unwrap_or(line), rest))
}

/// Apply the header of `text` to `doc` through the metadata registry.
/// Returns whether a header was present.
pub fn read_metadata(doc: &mut Document, text: &str) -> bool {
    match split_frontmatter(text).0 {
        Some(fields) => {
            metadata::apply(doc, &fields);
            true
        }
        None => false,
    }
}

/// Assign the body of `text` to `doc`. An empty body leaves the current
/// content untouched.
pub fn read_document(doc: &mut Document, text: &str) {
    let (_, body) = split_frontmatter(text);
    if !body.is_empty() {
        doc.content = Some(body.to_string());
    }
}

/// Render `fields` and an optional body. The header is emitted only when
/// there is something to put in or after it.
pub fn write_frontmatter(fields: &[(&str, String)], body: Option<&str>) -> String {
    let body = body.unwrap_or_default();
    let mut output = String::with_capacity(body.len() + 16 * (fields.len() + 2));
    if !fields.is_empty() || !body.is_empty() {
        output.push_str(DELIMITER);
        output.push('\n');
        for (key, value) in fields {
            output.push_str(key);
            output.push_str(": ");
            output.push_str(value);
            output.push('\n');
        }
        output.push_str(DELIMITER);
        output.push('\n');
    }
    output.push_str(body);
    output
}
