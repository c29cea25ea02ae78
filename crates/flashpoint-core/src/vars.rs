//! Review-app variable substitution.
//!
//! Environment values and scripts may reference the names and URLs of every
//! review app created in the same run:
//!
//! - `$REVIEW_APP_NAMES[i]` → the i-th review app name
//! - `$REVIEW_APP_URLS[i]`  → `https://<name>.herokuapp.com`
//!
//! Indices are 0-based positions in the project's `apps` list. Substitution is
//! a single textual pass per index with no escaping and no re-scanning of the
//! inserted text. Anything that is not an in-range token is left alone.

use crate::paths;
use regex::Regex;
use std::sync::OnceLock;

pub const NAMES_TOKEN: &str = "$REVIEW_APP_NAMES";
pub const URLS_TOKEN: &str = "$REVIEW_APP_URLS";

/// Substitute every in-range review-app token in `text`.
pub fn evaluate(text: &str, review_app_names: &[String]) -> String {
    let mut value = text.to_string();
    for (i, name) in review_app_names.iter().enumerate() {
        let names_token = format!("{NAMES_TOKEN}[{i}]");
        value = value.replace(&names_token, name);

        let urls_token = format!("{URLS_TOKEN}[{i}]");
        value = value.replace(&urls_token, &paths::app_url(name));
    }
    value
}

static TOKEN_RE: OnceLock<Regex> = OnceLock::new();

fn token_re() -> &'static Regex {
    TOKEN_RE.get_or_init(|| {
        Regex::new(r"\$REVIEW_APP_(?:NAMES|URLS)\[(\d+)\]").expect("token regex is valid")
    })
}

/// Indices referenced by well-formed tokens in `text`, in order of appearance.
pub fn referenced_indices(text: &str) -> Vec<usize> {
    token_re()
        .captures_iter(text)
        .filter_map(|c| c.get(1)?.as_str().parse().ok())
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
