//! Schema qualifier rewriting for generated statements.

use regex::{Captures, Regex};

use crate::core::identifier::validate_identifier;
use crate::error::{CloneError, Result};

/// Replaces `source.`, `[source].` and `"source".` qualifiers with the
/// target schema in the same quoting style.
///
/// Matching is case-insensitive and anchored at an identifier boundary, so
/// `xdbo.t` or `sales.dbo_archive` are left alone. Single-quoted string
/// literals are copied through untouched; quotes inside bracketed or
/// double-quoted identifiers do not start a literal.
#[derive(Debug, Clone)]
pub struct SchemaRewriter {
    pattern: Regex,
    target: String,
}

impl SchemaRewriter {
    pub fn new(source: &str, target: &str) -> Result<Self> {
        validate_identifier(source)?;
        validate_identifier(target)?;

        let bracketed = regex::escape(&source.replace(']', "]]"));
        let quoted = regex::escape(&source.replace('"', "\"\""));
        let bare = regex::escape(source);
        let pattern = format!(
            r#"(?i)(^|[^\w"\]\[.@#$])(\[{}\]|"{}"|{})\."#,
            bracketed, quoted, bare
        );
        let pattern = Regex::new(&pattern)
            .map_err(|e| CloneError::config(format!("Invalid schema pattern: {}", e)))?;

        Ok(Self {
            pattern,
            target: target.to_string(),
        })
    }

    pub fn rewrite(&self, sql: &str) -> String {
        let mut out = String::with_capacity(sql.len());
        for (segment, is_literal) in split_literals(sql) {
            if is_literal {
                out.push_str(segment);
            } else {
                out.push_str(&self.pattern.replace_all(segment, |caps: &Captures| {
                    format!("{}{}.", &caps[1], self.requote(&caps[2]))
                }));
            }
        }
        out
    }

    fn requote(&self, matched: &str) -> String {
        if matched.starts_with('[') {
            format!("[{}]", self.target.replace(']', "]]"))
        } else if matched.starts_with('"') {
            format!("\"{}\"", self.target.replace('"', "\"\""))
        } else {
            self.target.clone()
        }
    }
}

/// Split `sql` into code and single-quoted literal segments.
///
/// Bracketed and double-quoted identifiers stay inside code segments, so a
/// quote within `[O'Brien]` does not open a literal. A literal runs to its
/// closing quote, or to the end of input when unterminated.
fn split_literals(sql: &str) -> Vec<(&str, bool)> {
    let bytes = sql.as_bytes();
    let mut segments = Vec::new();
    let mut start = 0;
    let mut idx = 0;

    while idx < bytes.len() {
        match bytes[idx] {
            b'[' => idx = skip_delimited(bytes, idx, b']'),
            b'"' => idx = skip_delimited(bytes, idx, b'"'),
            b'\'' => {
                if start < idx {
                    segments.push((&sql[start..idx], false));
                }
                let end = skip_delimited(bytes, idx, b'\'');
                segments.push((&sql[idx..end], true));
                start = end;
                idx = end;
            }
            _ => idx += 1,
        }
    }

    if start < sql.len() {
        segments.push((&sql[start..], false));
    }
    segments
}

/// Index just past the span opened at `open`. A doubled `close` is an
/// escaped delimiter.
fn skip_delimited(bytes: &[u8], open: usize, close: u8) -> usize {
    let mut idx = open + 1;
    while idx < bytes.len() {
        if bytes[idx] == close {
            if bytes.get(idx + 1) == Some(&close) {
                idx += 2;
                continue;
            }
            return idx + 1;
        }
        idx += 1;
    }
    bytes.len()
}
