use colored::Colorize;
use reqwest::Request;
use serde_json::Value;

use crate::auth::{set_bearer, AuthResponse, RequestModifier};
use crate::client::Transport;
use crate::error::BridgeError;
use crate::request::{Bridge, JsonMap};

pub const EMAIL_ENV: &str = "INFOMARK_EMAIL";
pub const URL_ENV: &str = "INFOMARK_URL";
pub const PASSWORD_ENV: &str = "INFOMARK_PASSWORD";

pub const LOGIN_PATH: &str = "/api/v1/auth/token";

/// Where the negotiator looks for values it does not hold yet.
pub trait CredentialSource {
    fn var(&self, key: &str) -> Option<String>;

    fn read_line(&mut self, prompt: &str) -> Result<String, BridgeError>;

    /// Reads a secret without echoing it.
    fn read_password(&mut self, prompt: &str) -> Result<String, BridgeError>;

    fn notice(&mut self, message: &str) {
        eprintln!("{}", message.yellow());
    }
}

/// Process environment plus interactive terminal prompts.
#[derive(Debug, Default, Clone, Copy)]
pub struct Terminal;

impl CredentialSource for Terminal {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }

    fn read_line(&mut self, prompt: &str) -> Result<String, BridgeError> {
        dialoguer::Input::<String>::new()
            .with_prompt(prompt)
            .interact_text()
            .map_err(BridgeError::Prompt)
    }

    fn read_password(&mut self, prompt: &str) -> Result<String, BridgeError> {
        dialoguer::Password::new()
            .with_prompt(prompt)
            .interact()
            .map_err(BridgeError::Prompt)
    }
}

/// Target service, operator identity and the bearer token obtained for it.
/// Every field is resolved lazily and at most once; nothing is persisted.
#[derive(Debug, Clone, Default)]
pub struct Connection {
    pub email: String,
    pub url: String,
    pub credentials: AuthResponse,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Connection {
    /// Seeds the connection with values given on the command line.
    pub fn new(url: Option<String>, email: Option<String>) -> Self {
        Self {
            email: non_empty(email).unwrap_or_default(),
            url: non_empty(url)
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_default(),
            credentials: AuthResponse::default(),
        }
    }

    pub fn token(&self) -> &str {
        &self.credentials.access.token
    }

    pub fn is_authenticated(&self) -> bool {
        !self.token().is_empty()
    }

    pub fn require_email(&mut self, source: &mut impl CredentialSource) -> Result<(), BridgeError> {
        if !self.email.is_empty() {
            return Ok(());
        }
        self.email = match non_empty(source.var(EMAIL_ENV)) {
            Some(email) => email,
            None => {
                source.notice(&format!(
                    "No email is given, you might want to add your email to the environment variable \"{}\"",
                    EMAIL_ENV
                ));
                source.read_line("Enter Email")?.trim().to_string()
            }
        };
        Ok(())
    }

    pub fn require_url(&mut self, source: &mut impl CredentialSource) -> Result<(), BridgeError> {
        if !self.url.is_empty() {
            return Ok(());
        }
        let url = match non_empty(source.var(URL_ENV)) {
            Some(url) => url,
            None => {
                source.notice(&format!(
                    "No url is given, you might want to add the endpoint url to the environment variable \"{}\"",
                    URL_ENV
                ));
                source.read_line("Enter URL")?.trim().to_string()
            }
        };
        self.url = url.trim_end_matches('/').to_string();
        Ok(())
    }

    /// Makes sure a token is held, logging in once if it is not.
    ///
    /// A rejected login is not an error here: the token stays empty and the
    /// next authenticated call is the one that fails.
    pub async fn require_credentials<T: Transport>(
        &mut self,
        transport: T,
        source: &mut impl CredentialSource,
    ) -> Result<(), BridgeError> {
        self.require_email(source)?;
        self.require_url(source)?;

        if self.is_authenticated() {
            return Ok(());
        }

        let password = match source.var(PASSWORD_ENV).filter(|p| !p.is_empty()) {
            Some(password) => password,
            None => {
                source.notice(&format!(
                    "No password is given, you might want to add the password to the environment variable \"{}\"",
                    PASSWORD_ENV
                ));
                source.read_password("Enter Password")?.trim().to_string()
            }
        };

        let login = Connection {
            url: self.url.clone(),
            ..Connection::default()
        };
        let bridge = Bridge::new(transport, &login);

        let mut body = JsonMap::new();
        body.insert("email".into(), Value::String(self.email.clone()));
        body.insert("plain_password".into(), Value::String(password));

        let w = bridge.post(LOGIN_PATH, Some(&body), &[]).await?;
        if w.ok() {
            self.credentials = w.decode_json().await?;
            log::debug!("logged in as {}", self.email);
        } else {
            log::warn!(
                "login as {} was rejected ({}), continuing without a token",
                self.email,
                w.status()
            );
        }
        Ok(())
    }
}

impl RequestModifier for Connection {
    fn modify(&self, request: &mut Request) -> Result<(), BridgeError> {
        set_bearer(request, self.token())
    }
}
