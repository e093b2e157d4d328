//! Environment variable interpolation for config files.
//!
//! Credentials are usually kept out of the YAML file and referenced as
//! variables instead. Supported forms:
//! - `$VAR` or `${VAR}`: value of VAR, an error if it is unset
//! - `${VAR:-fallback}`: fallback when VAR is unset or empty
//! - `${VAR-fallback}`: fallback only when VAR is unset
//! - `$$`: a literal `$`
//!
//! Interpolation runs once while the file is loaded. Nothing downstream of
//! [`Config`](super::Config) reads the process environment.

use regex::{Captures, Regex};
use std::sync::LazyLock;

static VARIABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        \$\$
        |
        \$\{ (?P<braced>[A-Za-z_][A-Za-z0-9_]*) (?: (?P<op>:?-) (?P<fallback>[^}]*) )? \}
        |
        \$(?P<bare>[A-Za-z_][A-Za-z0-9_]*)
        ",
    )
    .expect("variable pattern is valid")
});

/// Outcome of expanding a document.
///
/// Every problem is collected so a single load reports all missing variables.
#[derive(Debug, Default)]
pub struct Expansion {
    pub text: String,
    pub errors: Vec<String>,
}

impl Expansion {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Expand variables in `input` using the process environment.
pub fn interpolate(input: &str) -> Expansion {
    interpolate_with(input, |name| std::env::var(name).ok())
}

/// Expand variables in `input` using `lookup` to resolve names.
pub fn interpolate_with<F>(input: &str, lookup: F) -> Expansion
where
    F: Fn(&str) -> Option<String>,
{
    let mut errors = Vec::new();

    let text = VARIABLE
        .replace_all(input, |caps: &Captures| {
            let matched = &caps[0];
            if matched == "$$" {
                return "$".to_string();
            }

            let Some(name) = caps.name("braced").or_else(|| caps.name("bare")) else {
                return matched.to_string();
            };
            let name = name.as_str();
            let op = caps.name("op").map(|m| m.as_str());
            let fallback = caps.name("fallback").map(|m| m.as_str());

            match (lookup(name), fallback) {
                (Some(value), _) if value.contains(['\n', '\r']) => {
                    errors.push(format!(
                        "environment variable '{name}' contains newlines, which is not allowed"
                    ));
                    matched.to_string()
                }
                (Some(value), Some(fallback)) if value.is_empty() && op == Some(":-") => {
                    fallback.to_string()
                }
                (Some(value), _) => value,
                (None, Some(fallback)) => fallback.to_string(),
                (None, None) => {
                    errors.push(format!("environment variable '{name}' is not set"));
                    matched.to_string()
                }
            }
        })
        .into_owned();

    Expansion { text, errors }
}
