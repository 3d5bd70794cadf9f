use std::collections::BTreeMap;
use std::path::Path;

use colored::Colorize;
use reqwest::header::{HeaderValue, CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, Method, Request, Url};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::auth::{apply_modifiers, RequestModifier};
use crate::client::{self, Transport};
use crate::connection::Connection;
use crate::error::BridgeError;
use crate::multipart::create_file_request_body;
use crate::response::ParsedResponse;

/// JSON object used as a request body.
pub type JsonMap = Map<String, Value>;

/// Builds requests against the connection's base URL, runs them through the
/// given modifiers and dispatches them on `T`.
pub struct Bridge<'a, T = Client> {
    transport: T,
    connection: &'a Connection,
    verbose: bool,
}

impl<'a, T: Transport> Bridge<'a, T> {
    pub fn new(transport: T, connection: &'a Connection) -> Self {
        Self {
            transport,
            connection,
            verbose: false,
        }
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Whether requests and statuses are echoed as they are played.
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    pub fn connection(&self) -> &'a Connection {
        self.connection
    }

    fn url(&self, path: &str) -> Result<Url, BridgeError> {
        let raw = format!("{}{}", self.connection.url, path);
        Url::parse(&raw).map_err(|e| BridgeError::InvalidUrl {
            url: raw.clone(),
            reason: e.to_string(),
        })
    }

    fn new_request(&self, method: Method, path: &str) -> Result<Request, BridgeError> {
        let mut request = Request::new(method, self.url(path)?);
        request
            .headers_mut()
            .insert(USER_AGENT, HeaderValue::from_static(client::USER_AGENT));
        Ok(request)
    }

    /// Creates a request whose body, when `data` is given, is its JSON encoding.
    pub fn build_data_request(
        &self,
        method: Method,
        path: &str,
        data: Option<&JsonMap>,
    ) -> Result<Request, BridgeError> {
        let mut request = self.new_request(method, path)?;
        if let Some(data) = data {
            let payload = serde_json::to_vec(data).map_err(BridgeError::Encode)?;
            request
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            *request.body_mut() = Some(payload.into());
        }
        Ok(request)
    }

    /// Sends the request and wraps the response.
    pub async fn play_request(&self, request: Request) -> Result<ParsedResponse, BridgeError> {
        if self.verbose {
            println!("{}", format_request(&request).cyan());
        }
        log::debug!("{} {}", request.method(), request.url());

        let resp = self
            .transport
            .execute(request)
            .await
            .map_err(BridgeError::Unreachable)?;
        let rp = ParsedResponse::new(resp);
        if self.verbose {
            rp.print_status();
        }
        Ok(rp)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        data: Option<&JsonMap>,
        modifiers: &[&dyn RequestModifier],
    ) -> Result<ParsedResponse, BridgeError> {
        let mut request = self.build_data_request(method, path, data)?;
        apply_modifiers(&mut request, modifiers)?;
        self.play_request(request).await
    }

    pub async fn get(
        &self,
        path: &str,
        modifiers: &[&dyn RequestModifier],
    ) -> Result<ParsedResponse, BridgeError> {
        self.send(Method::GET, path, None, modifiers).await
    }

    pub async fn post(
        &self,
        path: &str,
        data: Option<&JsonMap>,
        modifiers: &[&dyn RequestModifier],
    ) -> Result<ParsedResponse, BridgeError> {
        self.send(Method::POST, path, data, modifiers).await
    }

    pub async fn put(
        &self,
        path: &str,
        data: Option<&JsonMap>,
        modifiers: &[&dyn RequestModifier],
    ) -> Result<ParsedResponse, BridgeError> {
        self.send(Method::PUT, path, data, modifiers).await
    }

    pub async fn patch(
        &self,
        path: &str,
        data: Option<&JsonMap>,
        modifiers: &[&dyn RequestModifier],
    ) -> Result<ParsedResponse, BridgeError> {
        self.send(Method::PATCH, path, data, modifiers).await
    }

    pub async fn delete(
        &self,
        path: &str,
        modifiers: &[&dyn RequestModifier],
    ) -> Result<ParsedResponse, BridgeError> {
        self.send(Method::DELETE, path, None, modifiers).await
    }

    pub async fn upload(
        &self,
        path: &str,
        filename: impl AsRef<Path>,
        content_type: &str,
        modifiers: &[&dyn RequestModifier],
    ) -> Result<ParsedResponse, BridgeError> {
        self.upload_with_parameters(path, filename, content_type, &BTreeMap::new(), modifiers)
            .await
    }

    /// POSTs `filename` as `file_data` plus `params` as extra form fields.
    /// The body is built before anything is sent, so a missing file never
    /// reaches the transport.
    pub async fn upload_with_parameters(
        &self,
        path: &str,
        filename: impl AsRef<Path>,
        content_type: &str,
        params: &BTreeMap<String, String>,
        modifiers: &[&dyn RequestModifier],
    ) -> Result<ParsedResponse, BridgeError> {
        let (body, ct) = create_file_request_body(filename, content_type, params).await?;

        let mut request = self.new_request(Method::POST, path)?;
        request
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_str(&ct)?);
        *request.body_mut() = Some(body.into());

        apply_modifiers(&mut request, modifiers)?;
        self.play_request(request).await
    }
}

/// Converts any serializable value into a JSON object usable as a request body.
pub fn to_map<S: Serialize>(value: &S) -> Result<JsonMap, BridgeError> {
    match serde_json::to_value(value).map_err(BridgeError::Encode)? {
        Value::Object(map) => Ok(map),
        other => Err(BridgeError::Encode(<serde_json::Error as serde::ser::Error>::custom(format!(
            "expected a JSON object, got {}",
            other
        )))),
    }
}

fn mask(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() > 20 {
        let head: String = chars[..10].iter().collect();
        let tail: String = chars[chars.len() - 5..].iter().collect();
        format!("{}...{}", head, tail)
    } else {
        value.to_string()
    }
}

/// Renders a request the way it goes on the wire: request line, host,
/// headers and, for POST, the body.
pub fn format_request(request: &Request) -> String {
    let url = request.url();
    let mut lines = vec![format!(
        "{} {} {:?}",
        request.method(),
        url,
        request.version()
    )];

    let host = match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{}:{}", host, port),
        (Some(host), None) => host.to_string(),
        _ => String::new(),
    };
    lines.push(format!("Host: {}", host));

    for (name, value) in request.headers() {
        let value = String::from_utf8_lossy(value.as_bytes());
        if *name == reqwest::header::AUTHORIZATION {
            lines.push(format!("{}: {}", name, mask(&value)));
        } else {
            lines.push(format!("{}: {}", name, value));
        }
    }

    if *request.method() == Method::POST {
        lines.push(String::new());
        let is_multipart = request
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("multipart/"));
        match request.body().and_then(|b| b.as_bytes()) {
            Some(bytes) if is_multipart => {
                lines.push(format!("<multipart body, {} bytes>", bytes.len()))
            }
            Some(bytes) => match serde_json::from_slice::<Value>(bytes) {
                Ok(json) => lines.push(
                    serde_json::to_string_pretty(&json)
                        .unwrap_or_else(|_| String::from_utf8_lossy(bytes).into_owned()),
                ),
                Err(_) => lines.push(String::from_utf8_lossy(bytes).into_owned()),
            },
            None => {}
        }
    }

    lines.join("\n")
}
