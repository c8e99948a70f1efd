//! Route registration and lookup.
//!
//! Routes are registered on a [`Router`] by a user-supplied callback and
//! frozen into a [`RouteTable`]. Each HTTP method has its own ordered bucket;
//! routes registered with [`Router::any`] go into a wildcard bucket that is
//! consulted only after every route of the request's own method has failed.
//!
//! Within a bucket the first registered route that matches wins, even when a
//! later one would match "more specifically". Registering the same method and
//! path twice keeps both; the earlier one shadows the later.
//!
//! ```rust
//! use gaga::router::Router;
//!
//! let mut router = Router::new();
//! router.get("/", |_ctx| "home");
//! router
//!     .get("/users/{id}", |ctx| format!("user {}", ctx.param("id").unwrap_or("")))
//!     .where_param("id", r"^\d+$");
//! router
//!     .get("/posts/{page?}", |ctx| format!("page {}", ctx.param("page").unwrap_or("")))
//!     .default_param("page", "1");
//! router.static_files("/assets/", "./public");
//!
//! let table = router.into_table();
//! assert_eq!(table.len(), 4);
//! ```

mod pattern;

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use regex::Regex;
use thiserror::Error;
use tracing::warn;

use crate::context::{Context, Parameters};
use crate::http::Method;
use crate::static_files::{MimeTypes, ServedFile, StaticFiles};

use pattern::Matcher;

/// Errors raised while compiling a route. They are logged at registration
/// and turn the route into one that never matches.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("invalid placeholder `{{{name}}}` in route `{template}`")]
    InvalidPlaceholder { template: String, name: String },

    #[error("route `{template}` does not compile: {source}")]
    Pattern {
        template: String,
        #[source]
        source: regex::Error,
    },

    #[error("validator for `{name}` does not compile: {source}")]
    Validator {
        name: String,
        #[source]
        source: regex::Error,
    },
}

/// What a handler produced.
#[derive(Debug)]
pub enum Outcome {
    /// A response body.
    Body(String),
    /// A file to stream as the body; its length is the content length.
    File(ServedFile),
    /// Nothing to serve here; the dispatcher falls back to not-found.
    NotFound,
}

impl From<String> for Outcome {
    fn from(body: String) -> Self {
        Outcome::Body(body)
    }
}

impl From<&'static str> for Outcome {
    fn from(body: &'static str) -> Self {
        Outcome::Body(body.to_owned())
    }
}

/// Type-erased handler shared between the route table and in-flight requests.
pub type Handler = Arc<dyn Fn(&mut Context) -> Outcome + Send + Sync + 'static>;

/// Erases a handler closure into a [`Handler`].
pub fn handler<H, R>(h: H) -> Handler
where
    H: Fn(&mut Context) -> R + Send + Sync + 'static,
    R: Into<Outcome>,
{
    Arc::new(move |ctx: &mut Context| -> Outcome { h(ctx).into() })
}

#[derive(Debug, Clone)]
enum Validator {
    Valid(Regex),
    // Rejects every non-empty capture.
    Invalid,
}

impl Validator {
    fn accepts(&self, value: &str) -> bool {
        match self {
            Validator::Valid(re) => re.is_match(value),
            Validator::Invalid => false,
        }
    }
}

/// A single registered route.
pub struct Route {
    template: String,
    matcher: Option<Matcher>,
    handler: Handler,
    is_static: bool,
    validators: HashMap<String, Validator>,
    defaults: HashMap<String, String>,
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("template", &self.template)
            .field("is_static", &self.is_static)
            .field("compiled", &self.matcher.is_some())
            .finish_non_exhaustive()
    }
}

impl Route {
    fn dynamic(template: &str, handler: Handler) -> Self {
        let matcher = match Matcher::compile(template) {
            Ok(m) => Some(m),
            Err(e) => {
                warn!(error = %e, "route will never match");
                None
            }
        };
        Self {
            template: template.to_owned(),
            matcher,
            handler,
            is_static: false,
            validators: HashMap::new(),
            defaults: HashMap::new(),
        }
    }

    fn prefix(prefix: &str, handler: Handler) -> Self {
        Self {
            template: pattern::normalize_prefix(prefix).to_owned(),
            matcher: Some(Matcher::prefix(prefix)),
            handler,
            is_static: true,
            validators: HashMap::new(),
            defaults: HashMap::new(),
        }
    }

    /// Requires a non-empty `name` capture to match `pattern`.
    ///
    /// The expression is searched within the value, so anchor it (`^\d+$`)
    /// to constrain the whole segment. A failing capture rejects this route
    /// only; the lookup goes on with the next candidate.
    pub fn where_param(&mut self, name: &str, pattern: &str) -> &mut Self {
        let validator = match Regex::new(pattern) {
            Ok(re) => Validator::Valid(re),
            Err(source) => {
                let e = RouteError::Validator {
                    name: name.to_owned(),
                    source,
                };
                warn!(route = %self.template, error = %e, "parameter can never validate");
                Validator::Invalid
            }
        };
        self.validators.insert(name.to_owned(), validator);
        self
    }

    /// Value used for `name` when its optional placeholder captured nothing.
    pub fn default_param(&mut self, name: &str, value: &str) -> &mut Self {
        self.defaults.insert(name.to_owned(), value.to_owned());
        self
    }

    /// The template as registered; static prefixes without their trailing slash.
    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn is_static(&self) -> bool {
        self.is_static
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    /// Matches `path`, applying validators and defaults.
    pub fn matches(&self, path: &str) -> Option<Parameters> {
        let captures = self.matcher.as_ref()?.captures(path)?;
        let mut params = Parameters::new();
        for (name, value) in captures {
            if value.is_empty() {
                match self.defaults.get(name) {
                    Some(default) => params.insert(name, default.as_str()),
                    None => params.insert(name, ""),
                }
                continue;
            }
            if let Some(validator) = self.validators.get(name) {
                if !validator.accepts(&value) {
                    return None;
                }
            }
            params.insert(name, value);
        }
        Some(params)
    }
}

/// Builder handed to the registration callback.
pub struct Router {
    buckets: HashMap<Method, Vec<Route>>,
    any: Vec<Route>,
    mime: Arc<MimeTypes>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    pub fn new() -> Self {
        Self::with_mime_types(Arc::new(MimeTypes::default()))
    }

    /// A router whose static routes resolve content types with `mime`.
    pub fn with_mime_types(mime: Arc<MimeTypes>) -> Self {
        Self {
            buckets: HashMap::new(),
            any: Vec::new(),
            mime,
        }
    }

    /// Registers `h` for `method` requests matching `path`.
    pub fn route<H, R>(&mut self, method: Method, path: &str, h: H) -> &mut Route
    where
        H: Fn(&mut Context) -> R + Send + Sync + 'static,
        R: Into<Outcome>,
    {
        let bucket = self.buckets.entry(method).or_default();
        bucket.push(Route::dynamic(path, handler(h)));
        let last = bucket.len() - 1;
        &mut bucket[last]
    }

    pub fn get<H, R>(&mut self, path: &str, h: H) -> &mut Route
    where
        H: Fn(&mut Context) -> R + Send + Sync + 'static,
        R: Into<Outcome>,
    {
        self.route(Method::Get, path, h)
    }

    pub fn post<H, R>(&mut self, path: &str, h: H) -> &mut Route
    where
        H: Fn(&mut Context) -> R + Send + Sync + 'static,
        R: Into<Outcome>,
    {
        self.route(Method::Post, path, h)
    }

    pub fn put<H, R>(&mut self, path: &str, h: H) -> &mut Route
    where
        H: Fn(&mut Context) -> R + Send + Sync + 'static,
        R: Into<Outcome>,
    {
        self.route(Method::Put, path, h)
    }

    pub fn delete<H, R>(&mut self, path: &str, h: H) -> &mut Route
    where
        H: Fn(&mut Context) -> R + Send + Sync + 'static,
        R: Into<Outcome>,
    {
        self.route(Method::Delete, path, h)
    }

    pub fn patch<H, R>(&mut self, path: &str, h: H) -> &mut Route
    where
        H: Fn(&mut Context) -> R + Send + Sync + 'static,
        R: Into<Outcome>,
    {
        self.route(Method::Patch, path, h)
    }

    pub fn options<H, R>(&mut self, path: &str, h: H) -> &mut Route
    where
        H: Fn(&mut Context) -> R + Send + Sync + 'static,
        R: Into<Outcome>,
    {
        self.route(Method::Options, path, h)
    }

    pub fn head<H, R>(&mut self, path: &str, h: H) -> &mut Route
    where
        H: Fn(&mut Context) -> R + Send + Sync + 'static,
        R: Into<Outcome>,
    {
        self.route(Method::Head, path, h)
    }

    pub fn trace<H, R>(&mut self, path: &str, h: H) -> &mut Route
    where
        H: Fn(&mut Context) -> R + Send + Sync + 'static,
        R: Into<Outcome>,
    {
        self.route(Method::Trace, path, h)
    }

    /// Registers `h` for every method, behind all method-specific routes.
    pub fn any<H, R>(&mut self, path: &str, h: H) -> &mut Route
    where
        H: Fn(&mut Context) -> R + Send + Sync + 'static,
        R: Into<Outcome>,
    {
        self.any.push(Route::dynamic(path, handler(h)));
        let last = self.any.len() - 1;
        &mut self.any[last]
    }

    /// Serves files under `dir` for `GET` requests whose path starts with `prefix`.
    pub fn static_files(&mut self, prefix: &str, dir: impl Into<PathBuf>) {
        let files = Arc::new(StaticFiles::new(prefix, dir, Arc::clone(&self.mime)));
        let h: Handler = Arc::new(move |ctx: &mut Context| files.serve(ctx));
        self.buckets
            .entry(Method::Get)
            .or_default()
            .push(Route::prefix(prefix, h));
    }

    /// Freezes the registrations.
    pub fn into_table(self) -> RouteTable {
        RouteTable {
            buckets: self.buckets,
            any: self.any,
        }
    }
}

/// Immutable snapshot of every registered route.
#[derive(Default)]
pub struct RouteTable {
    buckets: HashMap<Method, Vec<Route>>,
    any: Vec<Route>,
}

impl RouteTable {
    /// Runs `generate` against a fresh [`Router`] and freezes the result.
    pub fn build<F>(mime: Arc<MimeTypes>, generate: F) -> Self
    where
        F: FnOnce(&mut Router),
    {
        let mut router = Router::with_mime_types(mime);
        generate(&mut router);
        let table = router.into_table();
        tracing::debug!(routes = table.len(), "route table built");
        table
    }

    /// Total number of routes across all buckets.
    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum::<usize>() + self.any.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Candidate routes for `method`, in the order they are tried.
    pub fn candidates<'a>(&'a self, method: &Method) -> impl Iterator<Item = &'a Route> + 'a {
        self.buckets
            .get(method)
            .into_iter()
            .flatten()
            .chain(self.any.iter())
    }

    /// First route matching `method` and `path`, with its parameters.
    pub fn find(&self, method: &Method, path: &str) -> Option<(&Route, Parameters)> {
        self.candidates(method)
            .find_map(|route| route.matches(path).map(|params| (route, params)))
    }
}

impl fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteTable")
            .field("buckets", &self.buckets)
            .field("any", &self.any)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Request;

    fn context(method: &str, path: &str) -> Context {
        let raw = format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        let (req, _) = Request::parse(raw.as_bytes()).unwrap();
        Context::new(req, "127.0.0.1:9000".parse().unwrap())
    }

    // Runs the winning handler and returns its body, or None when nothing matched.
    fn call(table: &RouteTable, method: &str, path: &str) -> Option<String> {
        let mut ctx = context(method, path);
        let (route, params) = table.find(ctx.method(), ctx.path())?;
        ctx.set_params(params);
        match (route.handler())(&mut ctx) {
            Outcome::Body(body) => Some(body),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    fn table(generate: impl FnOnce(&mut Router)) -> RouteTable {
        RouteTable::build(Arc::new(MimeTypes::default()), generate)
    }

    #[test]
    fn empty_table() {
        let t = table(|_| {});
        assert!(t.is_empty());
        assert!(t.find(&Method::Get, "/").is_none());
    }

    #[test]
    fn exact_route_registered_first_wins_over_pattern() {
        let t = table(|r| {
            r.get("/users/me", |_ctx| "exact");
            r.get("/users/{id}", |_ctx| "pattern");
        });
        assert_eq!(call(&t, "GET", "/users/me").as_deref(), Some("exact"));
        assert_eq!(call(&t, "GET", "/users/42").as_deref(), Some("pattern"));
    }

    #[test]
    fn earlier_pattern_shadows_later_exact_route() {
        let t = table(|r| {
            r.get("/users/{id}", |_ctx| "pattern");
            r.get("/users/me", |_ctx| "exact");
        });
        assert_eq!(call(&t, "GET", "/users/me").as_deref(), Some("pattern"));
    }

    #[test]
    fn duplicate_registration_keeps_both_and_first_wins() {
        let t = table(|r| {
            r.get("/path", |_ctx| "first");
            r.get("/path", |_ctx| "second");
        });
        assert_eq!(t.len(), 2);
        assert_eq!(call(&t, "GET", "/path").as_deref(), Some("first"));
    }

    #[test]
    fn path_params_are_extracted() {
        let t = table(|r| {
            r.get("/{id}", |ctx| ctx.param("id").unwrap_or("?").to_owned());
        });
        assert_eq!(call(&t, "GET", "/123").as_deref(), Some("123"));
        assert_eq!(call(&t, "GET", "/123/extra"), None);
    }

    #[test]
    fn failing_validator_falls_through_to_next_candidate() {
        let t = table(|r| {
            r.get("/{id}", |_ctx| "numeric").where_param("id", r"^\d+$");
            r.get("/{slug}", |_ctx| "slug");
        });
        assert_eq!(call(&t, "GET", "/42").as_deref(), Some("numeric"));
        assert_eq!(call(&t, "GET", "/abc").as_deref(), Some("slug"));
    }

    #[test]
    fn failing_validator_with_no_other_candidate_is_a_miss() {
        let t = table(|r| {
            r.get("/{id}", |_ctx| "numeric").where_param("id", r"^\d+$");
        });
        assert_eq!(call(&t, "GET", "/abc"), None);
    }

    #[test]
    fn validators_search_within_the_value() {
        let t = table(|r| {
            r.get("/{id}", |_ctx| "hit").where_param("id", r"\d+");
        });
        assert_eq!(call(&t, "GET", "/a1").as_deref(), Some("hit"));
        assert_eq!(call(&t, "GET", "/ab"), None);
    }

    #[test]
    fn malformed_validator_rejects_only_that_route() {
        let t = table(|r| {
            r.get("/{id}", |_ctx| "broken").where_param("id", "(unclosed");
            r.get("/{id}", |_ctx| "fallback");
        });
        assert_eq!(call(&t, "GET", "/1").as_deref(), Some("fallback"));
    }

    #[test]
    fn optional_param_without_default_is_empty() {
        let t = table(|r| {
            r.get("/{id?}", |ctx| format!("[{}]", ctx.param("id").unwrap_or("missing")));
        });
        assert_eq!(call(&t, "GET", "/").as_deref(), Some("[]"));
    }

    #[test]
    fn optional_param_uses_default_and_skips_validation() {
        let t = table(|r| {
            r.get("/{id?}", |ctx| ctx.param("id").unwrap_or("missing").to_owned())
                .where_param("id", r"^\d+$")
                .default_param("id", "none");
        });
        assert_eq!(call(&t, "GET", "/").as_deref(), Some("none"));
        assert_eq!(call(&t, "GET", "/5").as_deref(), Some("5"));
        assert_eq!(call(&t, "GET", "/x"), None);
    }

    #[test]
    fn wildcard_bucket_is_tried_after_method_bucket() {
        let t = table(|r| {
            r.any("/thing", |_ctx| "any");
            r.post("/thing", |_ctx| "post");
        });
        assert_eq!(call(&t, "POST", "/thing").as_deref(), Some("post"));
        assert_eq!(call(&t, "DELETE", "/thing").as_deref(), Some("any"));
        assert_eq!(call(&t, "PURGE", "/thing").as_deref(), Some("any"));
    }

    #[test]
    fn method_buckets_are_separate() {
        let t = table(|r| {
            r.put("/r", |_ctx| "put");
            r.delete("/r", |_ctx| "delete");
            r.patch("/r", |_ctx| "patch");
            r.options("/r", |_ctx| "options");
            r.head("/r", |_ctx| "head");
            r.trace("/r", |_ctx| "trace");
        });
        for (method, body) in [
            ("PUT", "put"),
            ("DELETE", "delete"),
            ("PATCH", "patch"),
            ("OPTIONS", "options"),
            ("HEAD", "head"),
            ("TRACE", "trace"),
        ] {
            assert_eq!(call(&t, method, "/r").as_deref(), Some(body));
        }
        assert_eq!(call(&t, "GET", "/r"), None);
    }

    #[test]
    fn invalid_template_never_matches() {
        let t = table(|r| {
            r.get("/{9lives}", |_ctx| "never");
        });
        assert_eq!(t.len(), 1);
        assert_eq!(call(&t, "GET", "/cat"), None);
    }

    #[test]
    fn matching_ignores_the_query_string() {
        let t = table(|r| {
            r.get("/search", |ctx| ctx.query("q").as_text().unwrap_or("").to_owned());
        });
        assert_eq!(call(&t, "GET", "/search?q=rust").as_deref(), Some("rust"));
    }

    #[test]
    fn static_route_matches_by_prefix_on_get_only() {
        let t = table(|r| r.static_files("/static/", "./does-not-matter"));
        let (route, params) = t.find(&Method::Get, "/static/app.js").unwrap();
        assert!(route.is_static());
        assert_eq!(route.template(), "/static");
        assert!(params.is_empty());
        assert!(t.find(&Method::Post, "/static/app.js").is_none());
        assert!(t.find(&Method::Get, "/elsewhere").is_none());
    }
}
