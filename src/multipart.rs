use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::Path;

use uuid::Uuid;

use crate::error::BridgeError;

/// Form field that carries the uploaded file on every file endpoint.
pub const FILE_FIELD: &str = "file_data";

/// Escapes a header parameter value: `\` becomes `\\` and `"` becomes `\"`.
pub fn escape_quotes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            _ => out.push(c),
        }
    }
    out
}

fn random_boundary() -> String {
    let mut boundary = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
    boundary.truncate(60);
    boundary
}

/// Writes a multipart/form-data body part by part into `W`.
pub struct MultipartWriter<W: Write> {
    inner: W,
    boundary: String,
    has_parts: bool,
}

impl<W: Write> MultipartWriter<W> {
    pub fn new(inner: W) -> Self {
        Self::with_boundary(inner, random_boundary())
    }

    pub fn with_boundary(inner: W, boundary: impl Into<String>) -> Self {
        Self {
            inner,
            boundary: boundary.into(),
            has_parts: false,
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn form_data_content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Starts a new part with the given headers and returns the writer for its content.
    pub fn create_part(&mut self, headers: &[(&str, String)]) -> io::Result<&mut W> {
        if self.has_parts {
            write!(self.inner, "\r\n--{}\r\n", self.boundary)?;
        } else {
            write!(self.inner, "--{}\r\n", self.boundary)?;
        }
        self.has_parts = true;
        for (name, value) in headers {
            write!(self.inner, "{}: {}\r\n", name, value)?;
        }
        self.inner.write_all(b"\r\n")?;
        Ok(&mut self.inner)
    }

    pub fn create_form_file(
        &mut self,
        fieldname: &str,
        filename: &str,
        content_type: &str,
    ) -> io::Result<&mut W> {
        let disposition = format!(
            r#"form-data; name="{}"; filename="{}""#,
            escape_quotes(fieldname),
            escape_quotes(filename)
        );
        self.create_part(&[
            ("Content-Disposition", disposition),
            ("Content-Type", content_type.to_string()),
        ])
    }

    pub fn write_field(&mut self, name: &str, value: &str) -> io::Result<()> {
        let disposition = format!(r#"form-data; name="{}""#, escape_quotes(name));
        let part = self.create_part(&[("Content-Disposition", disposition)])?;
        part.write_all(value.as_bytes())
    }

    /// Writes the closing boundary and hands back the underlying writer.
    pub fn finish(mut self) -> io::Result<W> {
        if self.has_parts {
            write!(self.inner, "\r\n--{}--\r\n", self.boundary)?;
        } else {
            write!(self.inner, "--{}--\r\n", self.boundary)?;
        }
        Ok(self.inner)
    }
}

/// Builds a multipart body holding the file at `path` under `file_data`
/// followed by every entry of `fields`. Returns the body and its content type.
pub async fn create_file_request_body(
    path: impl AsRef<Path>,
    content_type: &str,
    fields: &BTreeMap<String, String>,
) -> Result<(Vec<u8>, String), BridgeError> {
    let path = path.as_ref();
    let io_err = |source| BridgeError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut file = tokio::fs::File::open(path).await.map_err(io_err)?;

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut writer = MultipartWriter::new(Vec::new());
    let ct = writer.form_data_content_type();
    let part = writer
        .create_form_file(FILE_FIELD, &filename, content_type)
        .map_err(io_err)?;
    tokio::io::copy(&mut file, part).await.map_err(io_err)?;
    drop(file);

    for (key, value) in fields {
        writer.write_field(key, value).map_err(io_err)?;
    }

    let body = writer.finish().map_err(io_err)?;
    log::debug!(
        "built multipart body for {} ({} bytes, {} extra fields)",
        path.display(),
        body.len(),
        fields.len()
    );
    Ok((body, ct))
}
