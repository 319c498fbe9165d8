//! Session establishment: login, registration and logout.

use crate::{
    backend::{ApiBackend, ApiRequest},
    client::ApiClient,
    response::{ErrorBody, RawResponse},
    session::{Session, SessionError, SessionToken},
    types::{Credentials, TokenResponse},
};
use thiserror::Error;
use tracing::{error, info};
use validator::Validate;

const LOGIN_CONNECTION_ERROR: &str = "Could not connect to server";
const LOGIN_INVALID_RESPONSE: &str = "Invalid server response";
const LOGIN_FAILED: &str = "Login failed";
const REGISTER_CONNECTION_ERROR: &str = "Network error. Please try again.";
const REGISTER_INVALID_RESPONSE: &str = "Unexpected server response.";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    Connection(&'static str),

    #[error("{0}")]
    InvalidResponse(&'static str),

    #[error("{0}")]
    Rejected(String),

    #[error("{0}")]
    Invalid(String),

    #[error(transparent)]
    Session(#[from] SessionError),
}

#[derive(Debug, PartialEq)]
pub enum Registration {
    /// The server issued a token right away; it is stored.
    LoggedIn(SessionToken),
    LoginRequired,
}

pub struct AuthFlow<B: ApiBackend> {
    client: ApiClient<B>,
    session: Session,
}

impl<B: ApiBackend> AuthFlow<B> {
    pub fn new(client: ApiClient<B>, session: Session) -> Self {
        Self { client, session }
    }

    /// Returns the stored token, if any, without contacting the server.
    pub fn enter(&self) -> Result<Option<SessionToken>, AuthError> {
        let token = self.session.token()?;
        if token.is_some() {
            info!("Existing session found, skipping login");
        }
        Ok(token)
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<SessionToken, AuthError> {
        let raw = self
            .submit("/auth/login", credentials, LOGIN_CONNECTION_ERROR)
            .await?;
        let body = raw
            .json_value()
            .map_err(|_| AuthError::InvalidResponse(LOGIN_INVALID_RESPONSE))?;

        if !raw.is_success() {
            let error_body: ErrorBody = serde_json::from_value(body).unwrap_or_default();
            return Err(AuthError::Rejected(
                error_body
                    .detail_message()
                    .unwrap_or_else(|| LOGIN_FAILED.into()),
            ));
        }

        let TokenResponse { access_token } = serde_json::from_value(body)
            .map_err(|_| AuthError::InvalidResponse(LOGIN_INVALID_RESPONSE))?;
        let token = SessionToken::new(access_token);
        self.session.store_token(&token)?;
        info!(email = %credentials.email, "Logged in");
        Ok(token)
    }

    pub async fn register(&self, credentials: &Credentials) -> Result<Registration, AuthError> {
        let raw = self
            .submit("/auth/register", credentials, REGISTER_CONNECTION_ERROR)
            .await?;
        let body = raw
            .json_value()
            .map_err(|_| AuthError::InvalidResponse(REGISTER_INVALID_RESPONSE))?;

        if !raw.is_success() {
            let error_body: ErrorBody = serde_json::from_value(body).unwrap_or_default();
            return Err(AuthError::Rejected(
                error_body
                    .detail_message()
                    .unwrap_or_else(|| format!("Register failed ({})", raw.status)),
            ));
        }

        info!(email = %credentials.email, "Registered");
        match serde_json::from_value::<TokenResponse>(body) {
            Ok(TokenResponse { access_token }) => {
                let token = SessionToken::new(access_token);
                self.session.store_token(&token)?;
                Ok(Registration::LoggedIn(token))
            }
            Err(_) => Ok(Registration::LoginRequired),
        }
    }

    pub fn logout(&self) -> Result<(), AuthError> {
        self.session.clear()?;
        info!("Logged out");
        Ok(())
    }

    async fn submit(
        &self,
        path: &str,
        credentials: &Credentials,
        connection_error: &'static str,
    ) -> Result<RawResponse, AuthError> {
        credentials
            .validate()
            .map_err(|err| AuthError::Invalid(err.to_string()))?;
        let request = ApiRequest::post(self.client.endpoint(path))
            .json(credentials)
            .map_err(|err| AuthError::Invalid(err.to_string()))?;

        self.client.backend().send(request).await.map_err(|err| {
            error!(?err, path, "Authentication request could not be sent");
            AuthError::Connection(connection_error)
        })
    }
}
