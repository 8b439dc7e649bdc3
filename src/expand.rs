//! Second pass over tokens: quote stripping, escapes and `$NAME` expansion.
//!
//! | token form | escapes | `$NAME` |
//! |------------|---------|---------|
//! | `"..."`    | yes     | yes     |
//! | `'...'`    | yes     | no      |
//! | bare       | no      | yes     |

use crate::env::Environment;
use regex::{Captures, Regex};
use std::sync::LazyLock;

static VAR_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)").expect("variable reference pattern is valid")
});

/// Characters a backslash may escape in quoted words.
const ESCAPABLE: [char; 6] = ['$', '\'', '"', '\\', 'n', '`'];

/// Produces the final text of one token.
pub fn expand_word(token: &str, env: &Environment) -> String {
    if let Some(inner) = strip_quotes(token, '"') {
        substitute_vars(&unescape(inner), env)
    } else if let Some(inner) = strip_quotes(token, '\'') {
        unescape(inner)
    } else {
        substitute_vars(token, env)
    }
}

fn strip_quotes(token: &str, quote: char) -> Option<&str> {
    if token.len() >= 2 {
        token.strip_prefix(quote)?.strip_suffix(quote)
    } else {
        None
    }
}

/// Removes the backslash before escapable characters; any other backslash
/// is kept along with the character after it.
pub fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some(next) if ESCAPABLE.contains(&next) => out.push(next),
            Some(next) => {
                out.push('\\');
                out.push(next);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Replaces every `$NAME` with the variable's value, or nothing when unset.
pub fn substitute_vars(text: &str, env: &Environment) -> String {
    VAR_REFERENCE
        .replace_all(text, |caps: &Captures| env.get_var(&caps[1]).unwrap_or_default())
        .into_owned()
}
