//! Form bodies: `application/x-www-form-urlencoded` and `multipart/form-data`.
//!
//! Multipart part headers are parsed with [`httparse::parse_headers`], the same
//! parser the request line and message headers go through.

use bytes::Bytes;
use thiserror::Error;

use super::MediaType;

/// Maximum number of headers accepted per multipart part.
const MAX_PART_HEADERS: usize = 16;

/// Errors raised while decoding a multipart body.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MultipartError {
    #[error("multipart content type is missing the boundary parameter")]
    MissingBoundary,

    #[error("multipart body does not start with the declared boundary")]
    MissingDelimiter,

    #[error("multipart body is truncated: closing boundary not found")]
    Truncated,

    #[error("malformed multipart part headers: {0}")]
    Headers(String),

    #[error("multipart part without a Content-Disposition name")]
    MissingName,

    #[error("multipart field {name:?} is not valid UTF-8")]
    InvalidUtf8 { name: String },
}

/// A file uploaded through a `multipart/form-data` part that carried a `filename`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartFile {
    field_name: String,
    original_filename: String,
    content_type: Option<MediaType>,
    data: Bytes,
}

impl MultipartFile {
    /// Creates a file part directly (mostly useful in tests).
    pub fn new(
        field_name: impl Into<String>,
        original_filename: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            field_name: field_name.into(),
            original_filename: original_filename.into(),
            content_type: None,
            data: data.into(),
        }
    }

    /// The form field name the file was submitted under.
    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    /// The client-supplied file name.
    pub fn original_filename(&self) -> &str {
        &self.original_filename
    }

    /// The part's declared content type, if any.
    pub fn content_type(&self) -> Option<&MediaType> {
        self.content_type.as_ref()
    }

    /// The file contents.
    pub fn bytes(&self) -> &Bytes {
        &self.data
    }

    /// Size of the file contents in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Decoded form body: plain fields in submission order plus uploaded files.
#[derive(Debug, Clone, Default)]
pub struct FormData {
    fields: Vec<(String, String)>,
    files: Vec<MultipartFile>,
}

impl FormData {
    /// Decodes an `application/x-www-form-urlencoded` body.
    pub fn from_urlencoded(body: &[u8]) -> Self {
        let text = String::from_utf8_lossy(body);
        Self {
            fields: decode_pairs(&text),
            files: Vec::new(),
        }
    }

    /// Decodes a `multipart/form-data` body delimited by `boundary`.
    ///
    /// # Errors
    ///
    /// Returns a [`MultipartError`] if the body is not framed by the boundary,
    /// a part's headers are malformed, or a part lacks a field name.
    pub fn from_multipart(body: &Bytes, boundary: &str) -> Result<Self, MultipartError> {
        let delimiter = format!("--{boundary}");
        let delimiter = delimiter.as_bytes();
        let mut form = FormData::default();

        let first = find(body, delimiter, 0).ok_or(MultipartError::MissingDelimiter)?;
        let mut cursor = first + delimiter.len();

        loop {
            if body[cursor..].starts_with(b"--") {
                return Ok(form);
            }
            cursor = skip_line_break(body, cursor);

            // Each part ends right before "\r\n--boundary".
            let mut closing = Vec::with_capacity(delimiter.len() + 2);
            closing.extend_from_slice(b"\r\n");
            closing.extend_from_slice(delimiter);
            let end = find(body, &closing, cursor).ok_or(MultipartError::Truncated)?;

            form.push_part(body.slice(cursor..end))?;
            cursor = end + closing.len();
            if cursor >= body.len() {
                return Err(MultipartError::Truncated);
            }
        }
    }

    /// Every value submitted for `name`, in submission order.
    pub fn field_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.fields
            .iter()
            .filter(move |(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Every file submitted under `name`, in submission order.
    pub fn files<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a MultipartFile> + 'a {
        self.files.iter().filter(move |f| f.field_name == name)
    }

    /// The first file submitted under `name`.
    pub fn file(&self, name: &str) -> Option<&MultipartFile> {
        self.files.iter().find(|f| f.field_name == name)
    }

    /// Number of plain fields plus files.
    pub fn len(&self) -> usize {
        self.fields.len() + self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.files.is_empty()
    }

    fn push_part(&mut self, part: Bytes) -> Result<(), MultipartError> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_PART_HEADERS];
        let (offset, parsed) = match httparse::parse_headers(&part, &mut headers) {
            Ok(httparse::Status::Complete(done)) => done,
            Ok(httparse::Status::Partial) => {
                return Err(MultipartError::Headers("incomplete part headers".into()));
            }
            Err(e) => return Err(MultipartError::Headers(e.to_string())),
        };

        let mut name = None;
        let mut filename = None;
        let mut content_type = None;
        for header in parsed {
            let value = String::from_utf8_lossy(header.value);
            if header.name.eq_ignore_ascii_case("content-disposition") {
                for (key, val) in disposition_params(&value) {
                    match key.as_str() {
                        "name" => name = Some(val),
                        "filename" => filename = Some(val),
                        _ => {}
                    }
                }
            } else if header.name.eq_ignore_ascii_case("content-type") {
                content_type = value.parse().ok();
            }
        }

        let name = name.ok_or(MultipartError::MissingName)?;
        let data = part.slice(offset..);
        match filename {
            Some(original_filename) => self.files.push(MultipartFile {
                field_name: name,
                original_filename,
                content_type,
                data,
            }),
            None => {
                let value = String::from_utf8(data.to_vec())
                    .map_err(|_| MultipartError::InvalidUtf8 { name: name.clone() })?;
                self.fields.push((name, value));
            }
        }
        Ok(())
    }
}

/// Splits `key=value&key2=value2`, decoding `+` and percent escapes.
/// Undecodable escapes are kept verbatim.
pub(crate) fn decode_pairs(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_component(key), decode_component(value))
        })
        .collect()
}

fn decode_component(raw: &str) -> String {
    let plus_decoded = raw.replace('+', " ");
    match urlencoding::decode(&plus_decoded) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => plus_decoded,
    }
}

// `form-data; name="foo"; filename="foo.tab"` → [("name","foo"), ("filename","foo.tab")]
fn disposition_params(value: &str) -> Vec<(String, String)> {
    value
        .split(';')
        .skip(1)
        .filter_map(|p| {
            let (k, v) = p.split_once('=')?;
            Some((
                k.trim().to_ascii_lowercase(),
                v.trim().trim_matches('"').to_owned(),
            ))
        })
        .collect()
}

fn skip_line_break(body: &[u8], at: usize) -> usize {
    if body[at..].starts_with(b"\r\n") {
        at + 2
    } else if body[at..].starts_with(b"\n") {
        at + 1
    } else {
        at
    }
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() || needle.is_empty() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    const TWO_FILES: &str = "-----1234\r\n\
        Content-Disposition: form-data; name=\"foo\"; filename=\"foo.tab\"\r\n\
        Content-Type: text/whatever\r\n\
        \r\n\
        happy\n\
        \r\n\
        -----1234\r\n\
        Content-Disposition: form-data; name=\"foo\"; filename=\"foo1.tab\"\r\n\
        \r\n\
        value2\r\n\
        -----1234--\r\n";

    #[test]
    fn files_keep_submission_order() {
        let form = FormData::from_multipart(&body(TWO_FILES), "---1234").unwrap();
        let names: Vec<_> = form.files("foo").map(|f| f.original_filename()).collect();
        assert_eq!(names, vec!["foo.tab", "foo1.tab"]);

        let first = form.file("foo").unwrap();
        assert_eq!(first.bytes().as_ref(), b"happy\n");
        assert_eq!(first.content_type().map(MediaType::essence).as_deref(), Some("text/whatever"));
    }

    #[test]
    fn plain_fields_are_text() {
        let raw = "-----1234\r\n\
            Content-Disposition: form-data; name=\"foo\"; filename=\"foo.tab\"\r\n\
            \r\n\
            happy\r\n\
            -----1234\r\n\
            Content-Disposition: form-data; name=\"baz\"\r\n\
            \r\n\
            value2\r\n\
            -----1234--\r\n";
        let form = FormData::from_multipart(&body(raw), "---1234").unwrap();
        assert_eq!(form.field_values("baz").collect::<Vec<_>>(), vec!["value2"]);
        assert_eq!(form.files("foo").count(), 1);
        assert!(form.file("baz").is_none());
        assert_eq!(form.len(), 2);
    }

    #[test]
    fn missing_closing_boundary() {
        let raw = "--b\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nvalue";
        assert_eq!(
            FormData::from_multipart(&body(raw), "b").unwrap_err(),
            MultipartError::Truncated
        );
    }

    #[test]
    fn part_without_name() {
        let raw = "--b\r\nContent-Type: text/plain\r\n\r\nvalue\r\n--b--";
        assert_eq!(
            FormData::from_multipart(&body(raw), "b").unwrap_err(),
            MultipartError::MissingName
        );
    }

    #[test]
    fn urlencoded_decoding() {
        let form = FormData::from_urlencoded(b"name=J%C3%B6rg+Smith&tag=a&tag=b&empty=");
        assert_eq!(form.field_values("name").collect::<Vec<_>>(), vec!["Jörg Smith"]);
        assert_eq!(form.field_values("tag").collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(form.field_values("empty").collect::<Vec<_>>(), vec![""]);
    }
}
