//! Serving files from a directory tree under a URL prefix.
//!
//! A request for `{prefix}/css/site.css` resolves to `{dir}/css/site.css`.
//! The prefix only matches whole path segments, so `/staticapp.js` is not
//! under `/static`. A path that resolves to a directory serves that
//! directory's `index.html`; without a trailing slash the client is first
//! redirected (`301`) to the slash form so relative links in the index page
//! resolve against the directory. Directories are never listed. Anything that
//! cannot be served, including attempts to climb out of `dir` with `..`,
//! reports not-found to the dispatcher like an unmatched route would.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read, Seek};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::context::Context;
use crate::http::StatusCode;
use crate::router::Outcome;

const INDEX_FILE: &str = "index.html";
const FALLBACK_MIME: &str = "application/octet-stream";

/// Strips a mount `prefix` (already normalized) from `path`, provided the
/// prefix ends on a segment boundary.
pub(crate) fn strip_mount<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = path.strip_prefix(prefix)?;
    (rest.is_empty() || rest.starts_with('/')).then_some(rest)
}

#[derive(Debug, Error)]
pub enum StaticError {
    #[error("no file for `{0}`")]
    NotFound(String),

    #[error("path `{0}` escapes the static directory")]
    Forbidden(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// File extension to content type table.
///
/// Built once before the app starts and shared read-only afterwards.
///
/// ```
/// use std::path::Path;
/// use gaga::static_files::MimeTypes;
///
/// let mime = MimeTypes::default().with("webmanifest", "application/manifest+json");
/// assert_eq!(mime.lookup(Path::new("app.JS")), "application/javascript");
/// assert_eq!(mime.lookup(Path::new("site.webmanifest")), "application/manifest+json");
/// assert_eq!(mime.lookup(Path::new("blob.bin")), "application/octet-stream");
/// ```
#[derive(Debug, Clone)]
pub struct MimeTypes {
    by_extension: HashMap<String, String>,
}

impl Default for MimeTypes {
    fn default() -> Self {
        let seeded = [
            ("js", "application/javascript"),
            ("json", "application/json"),
            ("html", "text/html"),
            ("htm", "text/html"),
            ("css", "text/css"),
            ("jpg", "image/jpeg"),
            ("jpeg", "image/jpeg"),
            ("png", "image/png"),
            ("gif", "image/gif"),
            ("svg", "image/svg+xml"),
            ("ico", "image/x-icon"),
            ("txt", "text/plain; charset=utf-8"),
            ("wasm", "application/wasm"),
        ];
        Self {
            by_extension: seeded
                .into_iter()
                .map(|(ext, mime)| (ext.to_owned(), mime.to_owned()))
                .collect(),
        }
    }
}

impl MimeTypes {
    /// An empty table; every lookup yields `application/octet-stream`.
    pub fn empty() -> Self {
        Self {
            by_extension: HashMap::new(),
        }
    }

    /// Adds or replaces a mapping. The extension is given without its dot.
    #[must_use]
    pub fn with(mut self, extension: &str, mime: &str) -> Self {
        self.by_extension.insert(
            extension.trim_start_matches('.').to_ascii_lowercase(),
            mime.to_owned(),
        );
        self
    }

    pub fn lookup(&self, path: &Path) -> &str {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| self.by_extension.get(&ext.to_ascii_lowercase()))
            .map_or(FALLBACK_MIME, String::as_str)
    }
}

/// An opened file chosen to answer a request.
#[derive(Debug)]
pub struct ServedFile {
    file: File,
    len: u64,
    path: PathBuf,
}

impl ServedFile {
    pub fn open(path: PathBuf) -> Result<Self, StaticError> {
        let file = File::open(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StaticError::NotFound(path.display().to_string()),
            _ => StaticError::Io(e),
        })?;
        let metadata = file.metadata()?;
        if !metadata.is_file() {
            return Err(StaticError::NotFound(path.display().to_string()));
        }
        Ok(Self {
            file,
            len: metadata.len(),
            path,
        })
    }

    /// Length reported by the filesystem.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reader positioned at the start of the file.
    pub fn reader(&mut self) -> io::Result<impl Read + '_> {
        self.file.rewind()?;
        Ok((&self.file).take(self.len))
    }
}

/// A directory mounted under a URL prefix.
#[derive(Debug)]
pub struct StaticFiles {
    prefix: String,
    dir: PathBuf,
    mime: Arc<MimeTypes>,
}

impl StaticFiles {
    /// `prefix` loses one trailing slash, so `/static/` and `/static` are the same mount.
    pub fn new(prefix: &str, dir: impl Into<PathBuf>, mime: Arc<MimeTypes>) -> Self {
        Self {
            prefix: prefix.strip_suffix('/').unwrap_or(prefix).to_owned(),
            dir: dir.into(),
            mime,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Maps a request path onto the filesystem.
    ///
    /// Only plain path components are followed; a directory resolves to its
    /// `index.html`. The result is not checked for existence.
    pub fn resolve(&self, request_path: &str) -> Result<PathBuf, StaticError> {
        let mut resolved = self.locate(request_path)?;
        if resolved.is_dir() {
            resolved.push(INDEX_FILE);
        }
        Ok(resolved)
    }

    fn locate(&self, request_path: &str) -> Result<PathBuf, StaticError> {
        let rest = strip_mount(request_path, &self.prefix)
            .ok_or_else(|| StaticError::NotFound(request_path.to_owned()))?;

        let mut resolved = self.dir.clone();
        for component in Path::new(rest.trim_start_matches('/')).components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                _ => return Err(StaticError::Forbidden(request_path.to_owned())),
            }
        }
        Ok(resolved)
    }

    /// Where to send a request for a directory that lacks its trailing slash.
    pub fn directory_redirect(&self, request_path: &str) -> Option<String> {
        if request_path.ends_with('/') {
            return None;
        }
        self.locate(request_path)
            .is_ok_and(|path| path.is_dir())
            .then(|| format!("{request_path}/"))
    }

    /// Opens the file for `request_path`.
    pub fn open(&self, request_path: &str) -> Result<ServedFile, StaticError> {
        ServedFile::open(self.resolve(request_path)?)
    }

    /// Handler body of a static route: sets the content type and hands the
    /// file to the dispatcher, or reports not-found.
    pub fn serve(&self, ctx: &mut Context) -> Outcome {
        if let Some(mut location) = self.directory_redirect(ctx.path()) {
            if let Some(query) = ctx.request().query_string() {
                location = format!("{location}?{query}");
            }
            ctx.set_status(StatusCode::MovedPermanently);
            ctx.set_header("Location", location);
            return Outcome::Body(String::new());
        }
        match self.open(ctx.path()) {
            Ok(file) => {
                let mime = self.mime.lookup(file.path()).to_owned();
                ctx.set_content_type(mime);
                Outcome::File(file)
            }
            Err(StaticError::Io(e)) => {
                warn!(path = %ctx.path(), error = %e, "static file unreadable");
                Outcome::NotFound
            }
            Err(e) => {
                debug!(error = %e, "static file not served");
                Outcome::NotFound
            }
        }
    }
}
