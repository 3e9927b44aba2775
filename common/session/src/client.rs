use std::sync::Arc;

use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Client, Method, Request, Response, StatusCode};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{AuthError, AuthResult};
use crate::gateway::AuthGateway;

/// Outbound HTTP client that injects the bearer token and reacts to
/// authorization failures with exactly one refresh-and-retry.
#[derive(Clone)]
pub struct AuthenticatedClient {
    http: Client,
    gateway: Arc<AuthGateway>,
}

impl AuthenticatedClient {
    pub fn new(gateway: Arc<AuthGateway>) -> Self {
        Self {
            http: Client::new(),
            gateway,
        }
    }

    pub fn with_client(http: Client, gateway: Arc<AuthGateway>) -> Self {
        Self { http, gateway }
    }

    pub async fn get(&self, url: &str) -> AuthResult<Response> {
        let request = self
            .http
            .request(Method::GET, url)
            .build()
            .map_err(|err| AuthError::Network(err.to_string()))?;
        self.execute(request).await
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
    ) -> AuthResult<Response> {
        let request = self
            .http
            .request(Method::POST, url)
            .json(body)
            .build()
            .map_err(|err| AuthError::Network(err.to_string()))?;
        self.execute(request).await
    }

    /// Sends the request with the bearer token attached (omitted
    /// entirely when no live token exists). On an unexpected `401` —
    /// one the local expiry check did not predict — refreshes once and
    /// retries once; a second `401` clears the session and is surfaced
    /// unmodified. A failed refresh on this path clears the session and
    /// returns [`AuthError::SignInRequired`].
    pub async fn execute(&self, mut request: Request) -> AuthResult<Response> {
        let expired_locally = self.gateway.store().is_expired();
        let retry_request = request.try_clone();

        if !expired_locally {
            if let Some(pair) = self.gateway.store().load() {
                attach_bearer(&mut request, &pair.access_token);
            }
        }

        let response = self
            .http
            .execute(request)
            .await
            .map_err(|err| AuthError::Network(err.to_string()))?;

        if response.status() != StatusCode::UNAUTHORIZED || expired_locally {
            return Ok(response);
        }

        // The server disagrees with our own view of the session. Requests
        // with non-cloneable (streaming) bodies cannot be replayed.
        let Some(mut retry) = retry_request else {
            return Ok(response);
        };

        match self.gateway.refresh().await {
            Ok(signed) => {
                debug!("retrying request after refresh");
                attach_bearer(&mut retry, &signed.pair.access_token);
                let second = self
                    .http
                    .execute(retry)
                    .await
                    .map_err(|err| AuthError::Network(err.to_string()))?;
                if second.status() == StatusCode::UNAUTHORIZED {
                    warn!("request rejected again after refresh; clearing session");
                    self.gateway.clear_session();
                }
                Ok(second)
            }
            Err(err) => {
                warn!(error = %err, "refresh after authorization failure failed; sign-in required");
                self.gateway.clear_session();
                Err(AuthError::SignInRequired)
            }
        }
    }
}

/// Never sends an empty or malformed Authorization header.
fn attach_bearer(request: &mut Request, token: &str) {
    if token.is_empty() {
        return;
    }
    if let Ok(value) = HeaderValue::from_str(&format!("Bearer {token}")) {
        request.headers_mut().insert(AUTHORIZATION, value);
    }
}
