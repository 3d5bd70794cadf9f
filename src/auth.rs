use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::Request;
use serde::{Deserialize, Serialize};

use crate::error::BridgeError;

/// Body returned by the login endpoint: `{"access": {"token": "..."}}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthResponse {
    pub access: AccessToken,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessToken {
    pub token: String,
}

/// Mutates an outgoing request before it is dispatched.
pub trait RequestModifier {
    fn modify(&self, request: &mut Request) -> Result<(), BridgeError>;
}

impl<F> RequestModifier for F
where
    F: Fn(&mut Request) -> Result<(), BridgeError>,
{
    fn modify(&self, request: &mut Request) -> Result<(), BridgeError> {
        self(request)
    }
}

/// Applies every modifier in the given order.
pub fn apply_modifiers(
    request: &mut Request,
    modifiers: &[&dyn RequestModifier],
) -> Result<(), BridgeError> {
    for modifier in modifiers {
        modifier.modify(request)?;
    }
    Ok(())
}

/// Sets `Authorization: Bearer <token>`, replacing any previous value.
pub fn set_bearer(request: &mut Request, token: &str) -> Result<(), BridgeError> {
    let mut value = HeaderValue::from_str(&format!("Bearer {}", token))?;
    value.set_sensitive(true);
    request.headers_mut().insert(AUTHORIZATION, value);
    Ok(())
}
