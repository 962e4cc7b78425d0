use std::fmt;

use log::debug;
use reqwest::StatusCode;
use structures::{AuthResponse, LoginRequest};

use crate::{constants::APIKEY_HEADER, errors::BucketError};

/// Account used to obtain upload tokens from the identity provider.
#[derive(Clone)]
pub struct Credentials {
    pub api_url: String,
    pub email: String,
    pub password: String,
    pub anon_key: String,
}

impl Credentials {
    /// Performs one password-grant login and returns the bearer token.
    ///
    /// Tokens are never cached: every upload asks for a fresh one.
    pub async fn fetch_token(&self, http: &reqwest::Client) -> Result<String, BucketError> {
        let request = LoginRequest {
            email: self.email.clone(),
            password: self.password.clone(),
        };

        let response = http
            .post(&self.api_url)
            .header(APIKEY_HEADER, &self.anon_key)
            .json(&request)
            .send()
            .await
            .map_err(BucketError::LoginTransport)?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(BucketError::LoginTransport)?;

        if status != StatusCode::OK {
            return Err(BucketError::LoginRejected { status, body });
        }

        let parsed: AuthResponse =
            serde_json::from_str(&body).map_err(BucketError::LoginResponse)?;
        debug!("obtained {} token for user {}", parsed.token_type, parsed.user.id);

        Ok(parsed.access_token)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_url", &self.api_url)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("anon_key", &"<redacted>")
            .finish()
    }
}
