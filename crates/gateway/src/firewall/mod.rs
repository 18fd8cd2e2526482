//! The input firewall.
//!
//! Pure checks over query strings, bodies, `WHERE` fragments and full SQL
//! text. The validation middlewares and the `lumen` CLI both call into here.
//!
//! Detection works on tokens, not substrings: `updated_at`, `'DROP TABLE'`
//! and `"delete"` are an identifier, a string literal and a quoted
//! identifier, and none of them trip a keyword rule.

pub mod lexer;

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use self::lexer::{LexError, Token, TokenKind, tokenize};

/// Why the firewall refused some input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Query parameter name is not identifier-like.
    #[error("invalid parameter name '{0}'")]
    ParamName(String),
    /// Query parameter value holds a character outside the allowed set.
    #[error("parameter '{name}' contains a disallowed character")]
    ParamCharacter {
        /// Parameter name.
        name: String,
    },
    /// Query parameter value holds a blocked sequence.
    #[error("parameter '{name}' contains '{pattern}'")]
    ParamPattern {
        /// Parameter name.
        name: String,
        /// Sequence found.
        pattern: &'static str,
    },
    /// Declared JSON body does not parse.
    #[error("malformed JSON body")]
    MalformedJson,
    /// Body with a content type the API does not accept.
    #[error("unsupported content type '{0}'")]
    UnsupportedContentType(String),
    /// Tokenizer failure.
    #[error(transparent)]
    Lex(#[from] LexError),
    /// `;` in a `WHERE` fragment.
    #[error("statement terminator in filter")]
    StatementTerminator,
    /// Comment in a `WHERE` fragment.
    #[error("comment in filter")]
    Comment,
    /// Keyword that has no business in the checked input.
    #[error("keyword {0} not allowed")]
    Keyword(String),
    /// `<script>` markup.
    #[error("script tag not allowed")]
    ScriptTag,
}

/// Keywords that may not appear bare in a `WHERE` fragment. `SELECT` covers
/// subqueries.
const WHERE_FORBIDDEN: &[&str] = &[
    "DROP", "ALTER", "TRUNCATE", "GRANT", "REVOKE", "INSERT", "UPDATE", "DELETE", "UNION", "SELECT",
];

/// Words that invoke dynamic or shell execution.
const EXECUTION_WORDS: &[&str] = &["EXEC", "EXECUTE", "SP_EXECUTESQL", "XP_CMDSHELL"];

/// Objects `DROP` may not target.
const DROP_TARGETS: &[&str] = &["DATABASE", "TABLE", "SCHEMA"];

/// Sequences refused in any query-string value.
const VALUE_PATTERNS: &[&str] = &["--", "/*", "*/", "javascript:"];

/// Punctuation allowed in query-string values.
const VALUE_PUNCTUATION: &str = "_-.,:@/+=()*!?%#~[]";

/// Longest accepted parameter name.
const MAX_PARAM_NAME: usize = 128;

static SCRIPT_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<\s*/?\s*script\b").expect("Invalid regex"));

/// Parameters the value check skips because a dedicated check owns them.
const VALUE_EXEMPT: &[&str] = &["where"];

fn is_param_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.len() <= MAX_PARAM_NAME
        && chars.all(|c| c.is_ascii_alphanumeric() || "_.-[]".contains(c))
}

fn is_value_char(c: char) -> bool {
    c.is_alphanumeric() || c == ' ' || VALUE_PUNCTUATION.contains(c)
}

/// Check decoded query-string pairs.
///
/// # Errors
///
/// Returns the first offending parameter.
pub fn check_query_params<'a, I>(pairs: I) -> Result<(), ValidationError>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    for (name, value) in pairs {
        if !is_param_name(name) {
            return Err(ValidationError::ParamName(name.to_string()));
        }
        if VALUE_EXEMPT.contains(&name) {
            continue;
        }
        if !value.chars().all(is_value_char) {
            return Err(ValidationError::ParamCharacter {
                name: name.to_string(),
            });
        }
        let lowered = value.to_ascii_lowercase();
        if let Some(pattern) = VALUE_PATTERNS.iter().find(|p| lowered.contains(*p)) {
            return Err(ValidationError::ParamPattern {
                name: name.to_string(),
                pattern: *pattern,
            });
        }
    }
    Ok(())
}

/// Media type of a `Content-Type` value, lower-cased, parameters dropped.
#[must_use]
pub fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Whether `essence` is JSON (`application/json` or `*/*+json`).
#[must_use]
pub fn is_json(essence: &str) -> bool {
    essence == "application/json" || essence.ends_with("+json")
}

/// Whether `essence` is an HTML form post.
#[must_use]
pub fn is_form(essence: &str) -> bool {
    essence == "application/x-www-form-urlencoded"
}

/// Check a buffered request body against its declared type.
///
/// # Errors
///
/// Returns `MalformedJson` or `UnsupportedContentType`.
pub fn check_body(content_type: Option<&str>, body: &[u8]) -> Result<(), ValidationError> {
    if body.is_empty() {
        return Ok(());
    }
    let essence = content_type.map(essence).unwrap_or_default();
    if is_json(&essence) {
        serde_json::from_slice::<serde::de::IgnoredAny>(body)
            .map(|_| ())
            .map_err(|_| ValidationError::MalformedJson)
    } else if is_form(&essence) {
        Ok(())
    } else {
        Err(ValidationError::UnsupportedContentType(essence))
    }
}

/// Check a `WHERE` fragment taken from the query string.
///
/// # Errors
///
/// Returns the first rule the fragment breaks.
pub fn check_where_clause(fragment: &str) -> Result<(), ValidationError> {
    for token in tokenize(fragment)? {
        match token.kind {
            TokenKind::Semicolon => return Err(ValidationError::StatementTerminator),
            TokenKind::Comment => return Err(ValidationError::Comment),
            TokenKind::Word => {
                if let Some(keyword) = WHERE_FORBIDDEN.iter().find(|k| token.is_keyword(k)) {
                    return Err(ValidationError::Keyword((*keyword).to_string()));
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// Collapse whitespace runs to single spaces.
#[must_use]
pub fn normalize_whitespace(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Check a full SQL submission and return its normalized text.
///
/// Multiple statements are fine; dynamic execution, `DROP DATABASE`,
/// `DROP TABLE`, `DROP SCHEMA`, `TRUNCATE` and script markup are not.
///
/// # Errors
///
/// Returns the first rule the query breaks.
pub fn check_sql_query(sql: &str) -> Result<String, ValidationError> {
    if SCRIPT_TAG.is_match(sql) {
        return Err(ValidationError::ScriptTag);
    }

    // Tokenize the original text: line comments end at newlines.
    let tokens = tokenize(sql)?;
    let mut code = tokens.iter().filter(|t| t.kind != TokenKind::Comment).peekable();
    while let Some(token) = code.next() {
        if token.kind != TokenKind::Word {
            continue;
        }
        if let Some(word) = EXECUTION_WORDS.iter().find(|w| token.is_keyword(w)) {
            return Err(ValidationError::Keyword((*word).to_string()));
        }
        if token.is_keyword("TRUNCATE") {
            return Err(ValidationError::Keyword("TRUNCATE".to_string()));
        }
        if token.is_keyword("DROP") {
            let target = code
                .peek()
                .and_then(|next: &&Token<'_>| DROP_TARGETS.iter().find(|k| next.is_keyword(k)));
            if let Some(target) = target {
                return Err(ValidationError::Keyword(format!("DROP {target}")));
            }
        }
    }
    Ok(normalize_whitespace(sql))
}
