use std::future::Future;

use anyhow::Result;
use reqwest::{header, Client, Request, Response};

/// Value sent as `User-Agent` on every request.
pub const USER_AGENT: &str = "Infomark-Cli";

/// Sends a fully built request and yields the raw response.
pub trait Transport {
    fn execute(&self, request: Request) -> impl Future<Output = reqwest::Result<Response>>;
}

impl Transport for Client {
    fn execute(&self, request: Request) -> impl Future<Output = reqwest::Result<Response>> {
        Client::execute(self, request)
    }
}

impl<T: Transport + ?Sized> Transport for &T {
    fn execute(&self, request: Request) -> impl Future<Output = reqwest::Result<Response>> {
        (**self).execute(request)
    }
}

pub fn build_client() -> Result<Client> {
    let mut headers = header::HeaderMap::new();
    headers.insert(header::USER_AGENT, header::HeaderValue::from_static(USER_AGENT));

    Ok(Client::builder().default_headers(headers).build()?)
}
