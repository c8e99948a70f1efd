//! # gaga
//!
//! A minimal async HTTP/1.1 web framework: ordered pattern routing with
//! validated path parameters, static file serving and negotiated gzip /
//! deflate response compression.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gaga::{App, Config};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.compression.enabled = true;
//!
//!     let app = App::new(config, |r| {
//!         r.get("/", |_ctx| "Hello, World!");
//!         r.get("/users/{id}", |ctx| format!("user #{}", ctx.param("id").unwrap_or("")))
//!             .where_param("id", r"^\d+$");
//!         r.static_files("/static/", "./static");
//!     });
//!     app.serve().await?;
//!     Ok(())
//! }
//! ```

pub mod app;
pub mod compression;
pub mod config;
pub mod context;
pub mod http;
pub mod router;
pub mod server;
pub mod static_files;

pub use app::App;
pub use config::Config;
pub use context::{Context, Value};
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use router::{Outcome, Route, RouteTable, Router};
pub use server::{Server, ServerError};
