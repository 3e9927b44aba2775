use async_trait::async_trait;
use portal_token::Role;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::error::{AuthError, AuthResult};

/// Session opened at the external authority by a successful credential
/// check. The authority's session is the ultimate trust boundary; the
/// local token pair only mirrors it.
#[derive(Debug, Clone, Deserialize)]
pub struct ExternalSession {
    pub subject_id: String,
    pub session_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    pub role: Role,
    pub display_name: String,
    #[serde(default)]
    pub organization_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Organization {
    pub display_name: String,
}

/// The remote identity system of record, consumed through narrow calls.
#[async_trait]
pub trait IdentityAuthority: Send + Sync {
    async fn validate_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> AuthResult<ExternalSession>;

    async fn lookup_profile(&self, subject_id: &str) -> AuthResult<Profile>;

    async fn lookup_organization(&self, organization_id: &str) -> AuthResult<Organization>;

    async fn invalidate_session(&self) -> AuthResult<()>;
}

/// HTTP client for the identity authority.
#[derive(Clone)]
pub struct HttpIdentityAuthority {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct RejectionBody {
    message: String,
}

impl HttpIdentityAuthority {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: trim_trailing_slash(base_url.into()),
        }
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: trim_trailing_slash(base_url.into()),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> AuthResult<T> {
        let response = self
            .client
            .get(format!("{}{path}", self.base_url))
            .send()
            .await
            .map_err(|err| AuthError::Network(err.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::Authority(response.status().as_u16()));
        }

        response
            .json()
            .await
            .map_err(|err| AuthError::AuthorityDecode(err.to_string()))
    }
}

#[async_trait]
impl IdentityAuthority for HttpIdentityAuthority {
    async fn validate_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> AuthResult<ExternalSession> {
        let response = self
            .client
            .post(format!("{}/auth/login", self.base_url))
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(|err| AuthError::Network(err.to_string()))?;

        match response.status() {
            status if status.is_success() => response
                .json()
                .await
                .map_err(|err| AuthError::AuthorityDecode(err.to_string())),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                let message = response
                    .json::<RejectionBody>()
                    .await
                    .map(|body| body.message)
                    .unwrap_or_else(|_| "Invalid credentials. Please try again.".to_string());
                Err(AuthError::CredentialRejected(message))
            }
            status => Err(AuthError::Authority(status.as_u16())),
        }
    }

    async fn lookup_profile(&self, subject_id: &str) -> AuthResult<Profile> {
        self.get_json(&format!("/profiles/{subject_id}")).await
    }

    async fn lookup_organization(&self, organization_id: &str) -> AuthResult<Organization> {
        self.get_json(&format!("/organizations/{organization_id}"))
            .await
    }

    async fn invalidate_session(&self) -> AuthResult<()> {
        let response = self
            .client
            .post(format!("{}/auth/logout", self.base_url))
            .send()
            .await
            .map_err(|err| AuthError::Network(err.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::Authority(response.status().as_u16()));
        }
        Ok(())
    }
}

fn trim_trailing_slash(mut url: String) -> String {
    while url.ends_with('/') {
        url.pop();
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[tokio::test]
    async fn validate_credentials_returns_external_session() {
        let server = MockServer::start();
        let _mock = server.mock(|when, then| {
            when.method(POST)
                .path("/auth/login")
                .json_body(serde_json::json!({
                    "email": "alice@example.com",
                    "password": "hunter2"
                }));
            then.status(200)
                .header("content-type", "application/json")
                .json_body(serde_json::json!({
                    "subject_id": "user-1",
                    "session_token": "ext-session"
                }));
        });

        let authority = HttpIdentityAuthority::new(server.base_url());
        let session = authority
            .validate_credentials("alice@example.com", "hunter2")
            .await
            .expect("session");
        assert_eq!(session.subject_id, "user-1");
        assert_eq!(session.session_token, "ext-session");
    }

    #[tokio::test]
    async fn rejected_credentials_carry_the_authority_message() {
        let server = MockServer::start();
        let _mock = server.mock(|when, then| {
            when.method(POST).path("/auth/login");
            then.status(401)
                .header("content-type", "application/json")
                .json_body(serde_json::json!({ "message": "Bad password" }));
        });

        let authority = HttpIdentityAuthority::new(server.base_url());
        let err = authority
            .validate_credentials("alice@example.com", "wrong")
            .await
            .expect_err("should reject");
        assert!(matches!(err, AuthError::CredentialRejected(message) if message == "Bad password"));
    }

    #[tokio::test]
    async fn profile_and_organization_lookups() {
        let server = MockServer::start();
        let _profile = server.mock(|when, then| {
            when.method(GET).path("/profiles/user-1");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(serde_json::json!({
                    "role": "organization",
                    "display_name": "Alice",
                    "organization_id": "org-1"
                }));
        });
        let _org = server.mock(|when, then| {
            when.method(GET).path("/organizations/org-1");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(serde_json::json!({ "display_name": "Acme" }));
        });

        let authority = HttpIdentityAuthority::new(server.base_url());
        let profile = authority.lookup_profile("user-1").await.expect("profile");
        assert_eq!(profile.role, Role::Organization);
        assert_eq!(profile.organization_id.as_deref(), Some("org-1"));

        let organization = authority
            .lookup_organization("org-1")
            .await
            .expect("organization");
        assert_eq!(organization.display_name, "Acme");
    }

    #[tokio::test]
    async fn non_success_lookup_maps_to_authority_error() {
        let server = MockServer::start();
        let _mock = server.mock(|when, then| {
            when.method(GET).path("/profiles/missing");
            then.status(404);
        });

        let authority = HttpIdentityAuthority::new(server.base_url());
        let err = authority
            .lookup_profile("missing")
            .await
            .expect_err("should fail");
        assert!(matches!(err, AuthError::Authority(404)));
    }

    #[tokio::test]
    async fn invalidate_session_hits_logout() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/auth/logout");
            then.status(204);
        });

        let authority = HttpIdentityAuthority::new(format!("{}/", server.base_url()));
        authority.invalidate_session().await.expect("logout");
        mock.assert();
    }
}
