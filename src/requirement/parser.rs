//! Specifier grammar and requirement-list filtering.
//!
//! A specifier is one of:
//!
//! ```text
//! [-e] <absolute URI>
//! [-e] <local path starting with /, ./, ../ or ~/>
//! [-e] <name> [(== | >=) <version>] [# comment]
//! ```
//!
//! Requirement files additionally support backslash line continuation, blank
//! lines and `#` comment lines; see [`filter_requirement_lines`].

use super::{Requirement, SourceLocation};
use crate::core::{FileOperation, FileResultExt, RobustusError};
use anyhow::{Context, Result};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

fn named_specifier_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"^([A-Za-z0-9_][A-Za-z0-9_.\-]*)\s*(?:(==|>=)\s*([^\s#=<>]+))?\s*(?:#.*)?$")
            .expect("specifier regex is valid")
    })
}

fn trailing_comment_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"\s+#.*$").expect("comment regex is valid"))
}

/// Parses one specifier into a [`Requirement`].
///
/// # Errors
///
/// [`RobustusError::MalformedSpecifier`] when the text is empty, matches
/// neither grammar, has a comparator with no version, or repeats a comparator.
///
/// # Examples
///
/// ```
/// use robustus::requirement::parse;
///
/// let numpy = parse("numpy>=1.7.1").unwrap();
/// assert_eq!(numpy.name(), Some("numpy"));
/// assert_eq!(numpy.version(), Some("1.7.1"));
/// assert!(numpy.allows_greater_version());
/// assert_eq!(numpy.freeze(), "numpy>=1.7.1");
/// ```
pub fn parse(text: &str) -> Result<Requirement, RobustusError> {
    let mut specifier = text.trim();
    let mut editable = false;
    if let Some(rest) = specifier.strip_prefix("-e") {
        editable = true;
        specifier = rest.trim_start();
    }

    let malformed = || RobustusError::MalformedSpecifier {
        specifier: specifier.to_string(),
    };
    if specifier.is_empty() {
        return Err(malformed());
    }

    let without_comment = trailing_comment_regex().replace(specifier, "");

    if let Some(source) = SourceLocation::parse_url(&without_comment) {
        return Ok(Requirement::from_source(source).with_editable(editable));
    }

    if is_local_path(&without_comment) {
        return Ok(
            Requirement::from_source(SourceLocation::local(without_comment.trim()))
                .with_editable(editable),
        );
    }

    let captures = named_specifier_regex().captures(specifier).ok_or_else(malformed)?;
    let name = &captures[1];
    let version = captures.get(3).map(|m| m.as_str());
    let allow_greater = captures.get(2).is_some_and(|m| m.as_str() == ">=");

    Ok(Requirement::named(name, version)
        .with_editable(editable)
        .with_allow_greater_version(allow_greater))
}

fn is_local_path(text: &str) -> bool {
    text == "."
        || text == ".."
        || ["/", "./", "../", "~/"].iter().any(|prefix| text.starts_with(prefix))
}

/// Turns raw requirement-file lines into logical specifier lines.
///
/// Every physical line is trimmed. A line ending in `\` is joined with the
/// next one (backslash removed). Logical lines that are empty or start with
/// `#` are dropped.
///
/// ```
/// use robustus::requirement::filter_requirement_lines;
///
/// let lines = filter_requirement_lines(["aa\\", "\tbba\\", "\tcc", "# note", "", "dd"]);
/// assert_eq!(lines, vec!["aabbacc", "dd"]);
/// ```
pub fn filter_requirement_lines<I, S>(lines: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut logical = Vec::new();
    let mut pending = String::new();

    for line in lines {
        let line = line.as_ref().trim();
        if let Some(head) = line.strip_suffix('\\') {
            pending.push_str(head);
            continue;
        }
        pending.push_str(line);
        push_logical_line(&mut logical, std::mem::take(&mut pending));
    }
    push_logical_line(&mut logical, pending);

    logical
}

fn push_logical_line(out: &mut Vec<String>, line: String) {
    let line = line.trim();
    if !line.is_empty() && !line.starts_with('#') {
        out.push(line.to_string());
    }
}

/// Filters `lines` and parses every logical line.
///
/// Stops at the first malformed line.
pub fn parse_lines<I, S>(lines: I) -> Result<Vec<Requirement>, RobustusError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    filter_requirement_lines(lines).iter().map(|line| parse(line)).collect()
}

/// Reads and parses a requirement file.
///
/// Parse failures name the file and the logical line that failed.
pub async fn read_requirement_file(path: &Path) -> Result<Vec<Requirement>> {
    let content = tokio::fs::read_to_string(path).await.with_file_context(
        FileOperation::Read,
        path,
        "requirement list",
    )?;

    filter_requirement_lines(content.lines())
        .iter()
        .enumerate()
        .map(|(index, line)| {
            parse(line).with_context(|| {
                format!("in {} (requirement {}: {line})", path.display(), index + 1)
            })
        })
        .collect()
}
