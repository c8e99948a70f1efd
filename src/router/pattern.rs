//! Compilation of path templates into matchers.
//!
//! | Template            | Kind      | Matches                                  |
//! |---------------------|-----------|------------------------------------------|
//! | `/about`            | exact     | `/about` only                            |
//! | `/users/{id}`       | pattern   | `/users/42`, `/users/42/`                |
//! | `/posts/{page?}/`   | pattern   | `/posts/`, `/posts//`, `/posts/3/`       |
//! | static `/assets`    | prefix    | anything starting with `/assets`         |
//!
//! A placeholder is a path segment written `/{name}` or `/{name?}`. It
//! captures one or more characters other than `/`, `?` and `#`; the `?` form
//! may also capture nothing, and the slashes around it then collapse. A
//! slash that ends the template (or a placeholder at the very end) is
//! optional in the request path. Patterns are anchored at both ends.

use regex::Regex;

use super::RouteError;
use crate::static_files::strip_mount;

/// Compiled form of a route's path.
#[derive(Debug, Clone)]
pub(crate) enum Matcher {
    /// Literal template, compared by string equality.
    Exact(String),
    /// Static route prefix, compared with `starts_with`.
    Prefix(String),
    /// Template with placeholders.
    Pattern { regex: Regex, names: Vec<String> },
}

impl Matcher {
    /// Compiles a template registered with a dynamic handler.
    ///
    /// Templates without placeholders become [`Matcher::Exact`].
    pub(crate) fn compile(template: &str) -> Result<Self, RouteError> {
        let mut source = String::with_capacity(template.len() + 16);
        source.push('^');
        let mut names = Vec::new();

        let mut rest = template;
        while let Some(c) = rest.chars().next() {
            if let Some((name, optional, after)) = placeholder(rest) {
                if !is_identifier(name) {
                    return Err(RouteError::InvalidPlaceholder {
                        template: template.to_owned(),
                        name: name.to_owned(),
                    });
                }
                source.push_str(if optional { "/?" } else { "/" });
                source.push_str("(?P<");
                source.push_str(name);
                source.push_str(">[^/?#]+)");
                if optional {
                    source.push('?');
                }
                rest = after;
                if rest.is_empty() || rest == "/" {
                    source.push_str("/?");
                    rest = "";
                }
                names.push(name.to_owned());
                continue;
            }

            let mut buf = [0u8; 4];
            source.push_str(&regex::escape(c.encode_utf8(&mut buf)));
            rest = &rest[c.len_utf8()..];
        }

        if names.is_empty() {
            return Ok(Matcher::Exact(template.to_owned()));
        }

        source.push('$');
        let regex = Regex::new(&source).map_err(|source| RouteError::Pattern {
            template: template.to_owned(),
            source,
        })?;
        Ok(Matcher::Pattern { regex, names })
    }

    /// Builds the prefix matcher of a static route, dropping one trailing slash.
    pub(crate) fn prefix(prefix: &str) -> Self {
        Matcher::Prefix(normalize_prefix(prefix).to_owned())
    }

    /// Tests `path`, returning the raw captures on success.
    ///
    /// Exact and prefix matches capture nothing. A placeholder that matched
    /// the empty string is reported with an empty value.
    pub(crate) fn captures(&self, path: &str) -> Option<Vec<(&str, String)>> {
        match self {
            Matcher::Exact(literal) => (literal == path).then(Vec::new),
            Matcher::Prefix(prefix) => strip_mount(path, prefix).map(|_| Vec::new()),
            Matcher::Pattern { regex, names } => {
                let caps = regex.captures(path)?;
                Some(
                    names
                        .iter()
                        .map(|name| {
                            let value = caps.name(name).map_or("", |m| m.as_str());
                            (name.as_str(), value.to_owned())
                        })
                        .collect(),
                )
            }
        }
    }
}

/// Removes a single trailing slash from a static prefix.
pub(crate) fn normalize_prefix(prefix: &str) -> &str {
    prefix.strip_suffix('/').unwrap_or(prefix)
}

// Recognizes `/{name}` or `/{name?}` at the start of `input`.
fn placeholder(input: &str) -> Option<(&str, bool, &str)> {
    let inner = input.strip_prefix("/{")?;
    let close = inner.find('}')?;
    let token = &inner[..close];
    let after = &inner[close + 1..];
    match token.strip_suffix('?') {
        Some(name) => Some((name, true, after)),
        None => Some((token, false, after)),
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {
            chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
        }
        _ => false,
    }
}
