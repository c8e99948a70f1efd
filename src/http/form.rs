//! Decoding of query strings and request bodies into named values.
//!
//! Two body encodings are understood: `application/x-www-form-urlencoded`
//! and `multipart/form-data`. Anything malformed decodes to no values; a bad
//! form never turns into an error response.

use bytes::Bytes;

/// A file part of a `multipart/form-data` body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl UploadedFile {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Values decoded from a request body.
#[derive(Debug, Default, Clone)]
pub struct FormData {
    pub fields: Vec<(String, String)>,
    pub files: Vec<(String, UploadedFile)>,
}

/// Decodes `a=1&b=two%20words` into ordered key/value pairs.
pub fn parse_urlencoded(input: &str) -> Vec<(String, String)> {
    match serde_urlencoded::from_str::<Vec<(String, String)>>(input) {
        Ok(pairs) => pairs,
        Err(e) => {
            tracing::debug!(error = %e, "ignoring malformed urlencoded data");
            Vec::new()
        }
    }
}

/// Decodes `body` according to its `Content-Type`.
pub fn parse_body(content_type: Option<&str>, body: &Bytes) -> FormData {
    let Some(content_type) = content_type else {
        return FormData::default();
    };
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    match mime.as_str() {
        "application/x-www-form-urlencoded" => FormData {
            fields: std::str::from_utf8(body)
                .map(parse_urlencoded)
                .unwrap_or_default(),
            files: Vec::new(),
        },
        "multipart/form-data" => match header_param(content_type, "boundary") {
            Some(boundary) => parse_multipart(body, &boundary),
            None => FormData::default(),
        },
        _ => FormData::default(),
    }
}

// Extracts `name=value` (optionally quoted) from a `;`-separated header value.
fn header_param(header: &str, name: &str) -> Option<String> {
    header.split(';').skip(1).find_map(|part| {
        let (key, value) = part.trim().split_once('=')?;
        if key.trim().eq_ignore_ascii_case(name) {
            Some(value.trim().trim_matches('"').to_owned())
        } else {
            None
        }
    })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn parse_multipart(body: &Bytes, boundary: &str) -> FormData {
    let mut form = FormData::default();
    let delimiter = format!("--{boundary}");
    let delimiter = delimiter.as_bytes();

    let Some(first) = find(body, delimiter) else {
        return form;
    };
    let mut rest = body.slice(first + delimiter.len()..);

    loop {
        // `--` right after a delimiter closes the body.
        if rest.starts_with(b"--") {
            break;
        }
        if !rest.starts_with(b"\r\n") {
            break;
        }
        rest = rest.slice(2..);

        let Some(head_end) = find(&rest, b"\r\n\r\n") else {
            break;
        };
        let Ok(head) = std::str::from_utf8(&rest[..head_end]) else {
            break;
        };

        let mut name = None;
        let mut filename = None;
        let mut part_type = None;
        for line in head.split("\r\n") {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            if key.trim().eq_ignore_ascii_case("content-disposition") {
                name = header_param(value, "name");
                filename = header_param(value, "filename");
            } else if key.trim().eq_ignore_ascii_case("content-type") {
                part_type = Some(value.trim().to_owned());
            }
        }

        let content = rest.slice(head_end + 4..);
        let mut closing = Vec::with_capacity(delimiter.len() + 2);
        closing.extend_from_slice(b"\r\n");
        closing.extend_from_slice(delimiter);
        let Some(end) = find(&content, &closing) else {
            break;
        };
        let data = content.slice(..end);

        match (name, filename) {
            (Some(name), Some(filename)) => form.files.push((
                name,
                UploadedFile {
                    filename,
                    content_type: part_type,
                    data,
                },
            )),
            (Some(name), None) => {
                form.fields
                    .push((name, String::from_utf8_lossy(&data).into_owned()));
            }
            _ => {}
        }

        rest = content.slice(end + closing.len()..);
    }

    form
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urlencoded_body() {
        let body = Bytes::from_static(b"name=Ada+Lovelace&lang=en%2Dgb");
        let form = parse_body(Some("application/x-www-form-urlencoded"), &body);
        assert_eq!(
            form.fields,
            vec![
                ("name".to_owned(), "Ada Lovelace".to_owned()),
                ("lang".to_owned(), "en-gb".to_owned()),
            ]
        );
        assert!(form.files.is_empty());
    }

    #[test]
    fn unknown_content_type_yields_nothing() {
        let body = Bytes::from_static(b"{\"a\":1}");
        let form = parse_body(Some("application/json"), &body);
        assert!(form.fields.is_empty());
        assert!(parse_body(None, &body).fields.is_empty());
    }

    #[test]
    fn multipart_fields_and_files() {
        let body = Bytes::from_static(
            b"--XyZ\r\n\
Content-Disposition: form-data; name=\"title\"\r\n\
\r\n\
holiday\r\n\
--XyZ\r\n\
Content-Disposition: form-data; name=\"photo\"; filename=\"beach.png\"\r\n\
Content-Type: image/png\r\n\
\r\n\
\x89PNG\r\n\
--XyZ--\r\n",
        );
        let form = parse_body(Some("multipart/form-data; boundary=XyZ"), &body);
        assert_eq!(form.fields, vec![("title".to_owned(), "holiday".to_owned())]);
        assert_eq!(form.files.len(), 1);
        let (name, file) = &form.files[0];
        assert_eq!(name, "photo");
        assert_eq!(file.filename, "beach.png");
        assert_eq!(file.content_type.as_deref(), Some("image/png"));
        assert_eq!(&file.data[..], b"\x89PNG");
    }

    #[test]
    fn multipart_without_boundary_is_ignored() {
        let body = Bytes::from_static(b"--a\r\n\r\n");
        let form = parse_body(Some("multipart/form-data"), &body);
        assert!(form.fields.is_empty());
        assert!(form.files.is_empty());
    }
}
