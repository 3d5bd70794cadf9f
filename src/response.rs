use colored::Colorize;
use mime::Mime;
use reqwest::{header, Response, StatusCode};
use serde::de::DeserializeOwned;
use syntect::parsing::SyntaxReference;
use syntect::{
    easy::HighlightLines,
    highlighting::ThemeSet,
    parsing::SyntaxSet,
    util::{as_24_bit_terminal_escaped, LinesWithEndings},
};

use crate::error::BridgeError;

/// Coarse classification of a response status, used for colored diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    Handled,
    ServerError,
    Unknown,
}

impl StatusClass {
    pub fn of(status: StatusCode) -> Self {
        match status.as_u16() {
            200..=204 => StatusClass::Success,
            400 | 401 | 403 | 404 => StatusClass::Handled,
            500 => StatusClass::ServerError,
            _ => StatusClass::Unknown,
        }
    }
}

/// True iff the status is one of 200, 201, 202, 203 or 204.
pub fn is_ok_status(status: StatusCode) -> bool {
    StatusClass::of(status) == StatusClass::Success
}

/// A single HTTP response. Body accessors consume the wrapper, so the body
/// stream can be read at most once; dropping it releases the body.
#[derive(Debug)]
pub struct ParsedResponse {
    response: Response,
}

impl ParsedResponse {
    pub fn new(response: Response) -> Self {
        Self { response }
    }

    pub fn status(&self) -> StatusCode {
        self.response.status()
    }

    pub fn ok(&self) -> bool {
        is_ok_status(self.status())
    }

    pub fn status_class(&self) -> StatusClass {
        StatusClass::of(self.status())
    }

    pub fn content_type(&self) -> Option<Mime> {
        self.response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
    }

    pub fn print_status(&self) {
        let status = self.status().to_string();
        match self.status_class() {
            StatusClass::Success => println!("{}", status.green()),
            StatusClass::Handled => println!("{}", status.yellow()),
            StatusClass::ServerError => println!("{}", status.red()),
            StatusClass::Unknown => println!("{}", status),
        }
    }

    /// Reads the whole body as text.
    pub async fn plain(self) -> Result<String, BridgeError> {
        self.response.text().await.map_err(BridgeError::Body)
    }

    /// Decodes the body as JSON into `T`.
    pub async fn decode_json<T: DeserializeOwned>(self) -> Result<T, BridgeError> {
        let bytes = self.response.bytes().await.map_err(BridgeError::Body)?;
        serde_json::from_slice(&bytes).map_err(BridgeError::Decode)
    }

    /// Releases the response without reading its body.
    pub fn close(self) {}
}

pub fn print_body(m: Option<Mime>, body: &str) {
    match m {
        Some(v) if v.essence_str() == mime::APPLICATION_JSON.essence_str() => {
            let pretty = jsonxf::pretty_print(body).unwrap_or_else(|_| body.to_string());
            print_syntect(&pretty, "json");
            println!();
        }
        Some(v) if v.essence_str() == mime::TEXT_HTML.essence_str() => print_syntect(body, "html"),
        _ => println!("{}", body),
    }
}

pub fn print_syntect(s: &str, ext: &str) {
    let ps = SyntaxSet::load_defaults_newlines();
    let ts = ThemeSet::load_defaults();

    let syntax: &SyntaxReference = ps
        .find_syntax_by_extension(ext)
        .unwrap_or_else(|| ps.find_syntax_plain_text());

    let mut h = HighlightLines::new(syntax, &ts.themes["base16-ocean.dark"]);

    for line in LinesWithEndings::from(s) {
        match h.highlight_line(line, &ps) {
            Ok(ranges) => print!("{}", as_24_bit_terminal_escaped(&ranges[..], true)),
            Err(_) => print!("{}", line),
        }
    }
}
