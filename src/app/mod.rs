//! The application: route table, not-found handler, and request dispatch.
//!
//! Each request goes through the same steps:
//!
//! 1. **Routing** — the request is wrapped in a [`Context`] and looked up in
//!    the current [`RouteTable`] snapshot.
//! 2. **Matched / not found** — on a match the status becomes `200` and the
//!    route's handler runs. Otherwise, or when the handler itself reports
//!    not-found (a static route without a file), the not-found handler runs
//!    with status `404`, or the literal body `404 page not found` is used.
//! 3. **Responding** — the content type is resolved, compression is
//!    negotiated, and the wire [`Response`] is assembled.
//! 4. **Logged** — one [`AccessLog`] line is emitted.
//!
//! A panicking handler yields a `500` for that request only.

mod access_log;

use std::io::{self, Write};
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::{error, warn};

use crate::compression::{self, Encoding, Negotiation};
use crate::config::Config;
use crate::context::Context;
use crate::http::{Method, Request, Response, StatusCode};
use crate::router::{Handler, Outcome, RouteTable, Router, handler};
use crate::server::{Server, ServerError};
use crate::static_files::{MimeTypes, ServedFile};

pub use access_log::AccessLog;

/// Body used when nothing matched and no not-found handler is installed.
pub const NOT_FOUND_BODY: &str = "404 page not found";
/// Body used when a handler panicked or a file could not be read.
pub const INTERNAL_ERROR_BODY: &str = "500 internal server error";
/// Content type used when the handler did not set one.
pub const DEFAULT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

type RouteGenerator = Arc<dyn Fn(&mut Router) + Send + Sync + 'static>;

// Body produced by the routing step.
enum Produced {
    Text(String),
    File(ServedFile),
}

impl Produced {
    fn len(&self) -> u64 {
        match self {
            Produced::Text(body) => body.len() as u64,
            Produced::File(file) => file.len(),
        }
    }

    fn write_to<W: Write>(&mut self, out: &mut W) -> io::Result<()> {
        match self {
            Produced::Text(body) => out.write_all(body.as_bytes()),
            Produced::File(file) => io::copy(&mut file.reader()?, out).map(|_| ()),
        }
    }

    fn into_plain(self) -> io::Result<Vec<u8>> {
        match self {
            Produced::Text(body) => Ok(body.into_bytes()),
            Produced::File(mut file) => {
                let mut buf = Vec::with_capacity(usize::try_from(file.len()).unwrap_or(0));
                io::copy(&mut file.reader()?, &mut buf)?;
                Ok(buf)
            }
        }
    }
}

/// A web application.
///
/// ```rust,no_run
/// use gaga::{App, Config, StatusCode};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let app = App::new(Config::default(), |r| {
///         r.get("/", |_ctx| "home");
///         r.get("/hello/{name?}", |ctx| format!("hello {}", ctx.param("name").unwrap_or("")))
///             .default_param("name", "world");
///         r.static_files("/static/", "./static");
///     })
///     .not_found(|ctx| {
///         ctx.set_status(StatusCode::NotFound);
///         format!("nothing at {}", ctx.path())
///     });
///     app.serve().await?;
///     Ok(())
/// }
/// ```
pub struct App {
    config: Config,
    mime: Arc<MimeTypes>,
    generator: RouteGenerator,
    routes: ArcSwap<RouteTable>,
    not_found: Option<Handler>,
}

impl App {
    /// Creates the app and builds its route table once with `generator`.
    pub fn new<G>(config: Config, generator: G) -> Self
    where
        G: Fn(&mut Router) + Send + Sync + 'static,
    {
        let mime = Arc::new(MimeTypes::default());
        let generator: RouteGenerator = Arc::new(generator);
        let table = RouteTable::build(Arc::clone(&mime), |r| generator(r));
        Self {
            config,
            mime,
            generator,
            routes: ArcSwap::from_pointee(table),
            not_found: None,
        }
    }

    /// Replaces the content type table used by static routes and rebuilds
    /// the routes with it.
    #[must_use]
    pub fn mime_types(mut self, mime: MimeTypes) -> Self {
        self.mime = Arc::new(mime);
        self.reload();
        self
    }

    /// Installs the handler used when no route matches.
    ///
    /// The response status starts at `404`; the handler may change it.
    #[must_use]
    pub fn not_found<H, R>(mut self, h: H) -> Self
    where
        H: Fn(&mut Context) -> R + Send + Sync + 'static,
        R: Into<String>,
    {
        self.not_found = Some(handler(move |ctx: &mut Context| Outcome::Body(h(ctx).into())));
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The current route table snapshot.
    pub fn routes(&self) -> Arc<RouteTable> {
        self.routes.load_full()
    }

    /// Re-runs the registration callback and publishes the new table.
    ///
    /// Requests already in flight finish against the table they started with.
    pub fn reload(&self) {
        let generator = Arc::clone(&self.generator);
        let table = RouteTable::build(Arc::clone(&self.mime), |r| generator(r));
        self.routes.store(Arc::new(table));
    }

    /// Handles one request from `peer` and returns the response to write.
    pub fn dispatch(&self, request: Request, peer: SocketAddr) -> Response {
        let table = self.routes.load_full();

        let keep_alive = request.is_keep_alive();
        let head_only = *request.method() == Method::Head;
        let mut log = AccessLog {
            peer,
            method: request.method().to_string(),
            uri: request.uri(),
            protocol: request.protocol(),
            status: 0,
            content_length: 0,
            request_type: header_or_empty(&request, "content-type"),
            response_type: String::new(),
            user_agent: header_or_empty(&request, "user-agent"),
        };
        let accept_encoding = request
            .headers()
            .get("accept-encoding")
            .map(str::to_owned);

        let mut ctx = Context::new(request, peer);
        let routed = panic::catch_unwind(AssertUnwindSafe(|| self.route(&table, &mut ctx)));
        let produced = match routed {
            Ok(produced) => produced,
            Err(_) => {
                error!(peer = %peer, uri = %log.uri, "handler panicked");
                let head = ctx.response_mut();
                head.status = StatusCode::InternalServerError;
                head.headers.remove("content-type");
                Produced::Text(INTERNAL_ERROR_BODY.to_owned())
            }
        };

        let response = self.respond(&ctx, produced, accept_encoding.as_deref(), &mut log);
        log.emit();
        response.keep_alive(keep_alive).head_only(head_only)
    }

    // ROUTING -> MATCHED | NOT_FOUND
    fn route(&self, table: &RouteTable, ctx: &mut Context) -> Produced {
        if let Some((route, params)) = table.find(ctx.method(), ctx.path()) {
            ctx.set_params(params);
            ctx.set_status(StatusCode::Ok);
            match (route.handler())(ctx) {
                Outcome::Body(body) => return Produced::Text(body),
                Outcome::File(file) => return Produced::File(file),
                Outcome::NotFound => {}
            }
        }

        ctx.set_status(StatusCode::NotFound);
        match &self.not_found {
            Some(h) => match h(ctx) {
                Outcome::Body(body) => Produced::Text(body),
                Outcome::File(file) => Produced::File(file),
                Outcome::NotFound => Produced::Text(NOT_FOUND_BODY.to_owned()),
            },
            None => Produced::Text(NOT_FOUND_BODY.to_owned()),
        }
    }

    // RESPONDING
    fn respond(
        &self,
        ctx: &Context,
        produced: Produced,
        accept_encoding: Option<&str>,
        log: &mut AccessLog,
    ) -> Response {
        let length = produced.len();
        let mut headers = ctx.response().headers.clone();
        let mut status = ctx.response().status;

        let response_type = headers
            .get("content-type")
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_owned();
        headers.set("Content-Type", response_type.as_str());

        let negotiation = compression::negotiate(&self.config.compression, length, accept_encoding);
        if negotiation.varies() {
            headers.insert("Vary", "Accept-Encoding");
        }

        let body = match encode_body(produced, negotiation, length, compress) {
            Ok((body, Some(encoding))) => {
                headers.set("Content-Encoding", encoding.as_str());
                body
            }
            Ok((body, None)) => body,
            Err(e) => {
                error!(uri = %log.uri, error = %e, "failed to produce response body");
                status = StatusCode::InternalServerError;
                headers.set("Content-Type", DEFAULT_CONTENT_TYPE);
                headers.remove("content-encoding");
                INTERNAL_ERROR_BODY.as_bytes().to_vec()
            }
        };

        log.status = status.as_u16();
        log.content_length = length;
        log.response_type = headers
            .get("content-type")
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_owned();

        Response::new(status).headers_from(headers).body_bytes(body)
    }

    /// Binds `config.server` and serves until the listener fails.
    ///
    /// Dispatch runs on the blocking pool, so handlers may do blocking I/O.
    pub async fn serve(self) -> Result<(), ServerError> {
        let server = Server::bind(self.config.server.address()).await?;
        let app = Arc::new(self);
        server
            .run(move |request, peer| {
                let app = Arc::clone(&app);
                async move {
                    match tokio::task::spawn_blocking(move || app.dispatch(request, peer)).await {
                        Ok(response) => response,
                        Err(e) => {
                            error!(peer = %peer, error = %e, "dispatch task failed");
                            Response::new(StatusCode::InternalServerError)
                                .body(INTERNAL_ERROR_BODY)
                                .keep_alive(false)
                        }
                    }
                }
            })
            .await
    }
}

fn compress(encoding: Encoding, capacity: usize, produced: &mut Produced) -> io::Result<Vec<u8>> {
    compression::encode(encoding, capacity, |w| produced.write_to(w))
}

// Runs `compressor` when negotiation picked an encoding; a failing
// compressor falls back to the plain body.
fn encode_body<C>(
    mut produced: Produced,
    negotiation: Negotiation,
    length: u64,
    compressor: C,
) -> io::Result<(Vec<u8>, Option<Encoding>)>
where
    C: FnOnce(Encoding, usize, &mut Produced) -> io::Result<Vec<u8>>,
{
    if let Some(encoding) = negotiation.encoding() {
        let capacity = usize::try_from(length / 2).unwrap_or(0);
        match compressor(encoding, capacity, &mut produced) {
            Ok(body) => return Ok((body, Some(encoding))),
            Err(e) => {
                warn!(
                    encoding = encoding.as_str(),
                    error = %e,
                    "compression failed, sending uncompressed"
                );
            }
        }
    }
    produced.into_plain().map(|body| (body, None))
}

fn header_or_empty(request: &Request, name: &str) -> String {
    request.headers().get(name).unwrap_or_default().to_owned()
}
