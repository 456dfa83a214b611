//! Action protocol parser.
//!
//! Generated text is read line by line. Each line becomes a token
//! (`EXPLANATION:` header, `FILE:` marker, fence, or plain text), and file
//! edits are pulled from "header line, then fenced block" pairs. Three
//! header grammars are tried in order:
//!
//! 1. `FILE: <path>` markers (markdown emphasis and quotes tolerated)
//! 2. a line holding only `` `<path>` ``
//! 3. an imperative line such as `Create a file called 'app.py':`
//!
//! The first grammar yielding any edit wins. Parsing never fails; text
//! without edits produces an empty directive.

use regex::Regex;

use crate::types::{ActionDirective, FileEdit};

const FENCE: &str = "```";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token<'a> {
    /// `EXPLANATION:` plus whatever follows on the same line
    Explanation(&'a str),
    FileMarker(String),
    BarePath(String),
    Imperative(String),
    /// Fence line; `true` for a bare closing fence
    Fence(bool),
    Text,
}

/// Parse generated text into an [`ActionDirective`].
pub fn parse_actions(text: &str) -> ActionDirective {
    let lines: Vec<&str> = text.lines().collect();
    let imperative = Regex::new(
        r#"(?i)\b(?:create|update|write|make)\b.*?\b(?:called|named)\s+['"`]([^'"`\s]+)['"`]"#,
    )
    .ok();
    let tokens: Vec<Token<'_>> = lines
        .iter()
        .map(|line| tokenize(line, imperative.as_ref()))
        .collect();

    let grammars: [fn(&Token<'_>) -> Option<String>; 3] = [
        |t| match t {
            Token::FileMarker(path) => Some(path.clone()),
            _ => None,
        },
        |t| match t {
            Token::BarePath(path) => Some(path.clone()),
            _ => None,
        },
        |t| match t {
            Token::Imperative(path) => Some(path.clone()),
            _ => None,
        },
    ];

    let file_edits = grammars
        .iter()
        .map(|header| collect_blocks(&lines, &tokens, header))
        .find(|edits| !edits.is_empty())
        .unwrap_or_default();

    ActionDirective {
        explanation: explanation(&lines, &tokens),
        file_edits,
    }
}

fn tokenize<'a>(line: &'a str, imperative: Option<&Regex>) -> Token<'a> {
    let trimmed = line.trim();
    if trimmed.starts_with(FENCE) {
        return Token::Fence(trimmed == FENCE);
    }

    let body = strip_markup(trimmed);
    if let Some(rest) = strip_keyword(body, "EXPLANATION:") {
        return Token::Explanation(rest.trim_start_matches('*').trim());
    }
    if let Some(rest) = strip_keyword(body, "FILE:") {
        if let Some(path) = clean_path(rest) {
            return Token::FileMarker(path);
        }
    }
    if let Some(path) = bare_path(trimmed) {
        return Token::BarePath(path);
    }
    if let Some(path) = imperative
        .and_then(|re| re.captures(trimmed))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
    {
        return Token::Imperative(path);
    }

    Token::Text
}

/// Drop leading heading, emphasis, list and quote markers.
fn strip_markup(line: &str) -> &str {
    line.trim_start_matches(|c: char| matches!(c, '#' | '*' | '-' | '>' | '_') || c.is_whitespace())
}

/// Case-insensitive prefix match returning the remainder.
fn strip_keyword<'a>(text: &'a str, keyword: &str) -> Option<&'a str> {
    let head = text.get(..keyword.len())?;
    head.eq_ignore_ascii_case(keyword)
        .then(|| &text[keyword.len()..])
}

fn clean_path(raw: &str) -> Option<String> {
    let path = raw
        .trim()
        .trim_matches(|c: char| matches!(c, '*' | '_'))
        .trim()
        .trim_matches(|c: char| matches!(c, '"' | '\'' | '`'))
        .trim();
    (!path.is_empty()).then(|| path.to_string())
}

/// A line holding only `` `path` `` where the path has a dot and no spaces.
fn bare_path(line: &str) -> Option<String> {
    let line = line.strip_suffix(':').unwrap_or(line);
    let inner = line.strip_prefix('`')?.strip_suffix('`')?;
    let valid = inner.contains('.')
        && !inner.contains('`')
        && !inner.chars().any(char::is_whitespace);
    valid.then(|| inner.to_string())
}

/// Pull every "header, then fenced block" pair accepted by `header`.
fn collect_blocks(
    lines: &[&str],
    tokens: &[Token<'_>],
    header: &fn(&Token<'_>) -> Option<String>,
) -> Vec<FileEdit> {
    let mut edits = Vec::new();
    let mut i = 0;

    while i < tokens.len() {
        if matches!(tokens[i], Token::Fence(_)) {
            // Code outside a header block is skipped whole
            i = closing_fence(tokens, i + 1) + 1;
            continue;
        }

        let Some(path) = header(&tokens[i]) else {
            i += 1;
            continue;
        };

        let mut open = i + 1;
        while open < tokens.len() && lines[open].trim().is_empty() {
            open += 1;
        }
        if !matches!(tokens.get(open), Some(Token::Fence(_))) {
            i += 1;
            continue;
        }

        let close = closing_fence(tokens, open + 1);
        let content = lines
            .get(open + 1..close)
            .unwrap_or_default()
            .join("\n");
        edits.push(FileEdit::new(path, content.trim()));
        i = close + 1;
    }

    edits
}

/// Index of the next bare fence at or after `from`, or the end of input.
fn closing_fence(tokens: &[Token<'_>], from: usize) -> usize {
    (from..tokens.len())
        .find(|&idx| tokens[idx] == Token::Fence(true))
        .unwrap_or(tokens.len())
}

/// Text from the `EXPLANATION:` header up to the first `FILE:` marker.
fn explanation(lines: &[&str], tokens: &[Token<'_>]) -> String {
    let Some(start) = tokens
        .iter()
        .position(|t| matches!(t, Token::Explanation(_)))
    else {
        return String::new();
    };

    let end = tokens[start + 1..]
        .iter()
        .position(|t| matches!(t, Token::FileMarker(_)))
        .map(|offset| start + 1 + offset)
        .unwrap_or(tokens.len());

    let mut parts = Vec::new();
    if let Token::Explanation(first) = &tokens[start] {
        parts.push(*first);
    }
    parts.extend(&lines[start + 1..end]);

    parts.join("\n").trim().to_string()
}
