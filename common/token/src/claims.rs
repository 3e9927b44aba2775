use serde::{Deserialize, Serialize};

use crate::error::{TokenError, TokenResult};

/// Portal roles, in descending order of privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Administrator,
    Organization,
    Member,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Administrator => "administrator",
            Role::Organization => "organization",
            Role::Member => "member",
        }
    }

    /// The landing route a signed-in user of this role is sent to.
    pub fn default_route(&self) -> &'static str {
        match self {
            Role::Administrator => "/admin",
            Role::Organization => "/organization",
            Role::Member => "/member",
        }
    }

    pub fn parse(value: &str) -> Option<Role> {
        match value {
            "administrator" => Some(Role::Administrator),
            "organization" => Some(Role::Organization),
            "member" => Some(Role::Member),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-supplied base claims, before the token service stamps the
/// bookkeeping fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub subject_id: String,
    pub email: String,
    pub role: Role,
    pub display_name: String,
    pub organization_id: Option<String>,
    pub organization_name: Option<String>,
}

/// Full access-token payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Claims {
    #[serde(rename = "sub")]
    pub subject_id: String,
    pub email: String,
    pub role: Role,
    #[serde(rename = "name")]
    pub display_name: String,
    #[serde(rename = "org_id", skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    #[serde(rename = "org_name", skip_serializing_if = "Option::is_none")]
    pub organization_name: Option<String>,
    #[serde(rename = "iat")]
    pub issued_at: i64,
    #[serde(rename = "exp")]
    pub expires_at: i64,
    #[serde(rename = "iss")]
    pub issuer: String,
    #[serde(rename = "aud")]
    pub audience: String,
    pub jti: String,
}

impl Claims {
    pub fn identity(&self) -> Identity {
        Identity {
            subject_id: self.subject_id.clone(),
            email: self.email.clone(),
            role: self.role,
            display_name: self.display_name.clone(),
            organization_id: self.organization_id.clone(),
            organization_name: self.organization_name.clone(),
        }
    }
}

/// Refresh-token payload: subject and email only, plus the stamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshClaims {
    #[serde(rename = "sub")]
    pub subject_id: String,
    pub email: String,
    #[serde(rename = "iat")]
    pub issued_at: i64,
    #[serde(rename = "exp")]
    pub expires_at: i64,
    #[serde(rename = "iss")]
    pub issuer: String,
    #[serde(rename = "aud")]
    pub audience: String,
    pub jti: String,
}

#[derive(Debug, Deserialize)]
struct ClaimsRepr {
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    org_id: Option<String>,
    #[serde(default)]
    org_name: Option<String>,
    #[serde(default)]
    iat: Option<i64>,
    #[serde(default)]
    exp: Option<i64>,
    #[serde(default)]
    iss: Option<String>,
    #[serde(default)]
    aud: Option<String>,
    #[serde(default)]
    jti: Option<String>,
}

fn required(value: Option<String>, claim: &'static str) -> TokenResult<String> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(TokenError::MissingClaim(claim)),
    }
}

impl TryFrom<ClaimsRepr> for Claims {
    type Error = TokenError;

    fn try_from(value: ClaimsRepr) -> TokenResult<Self> {
        let subject_id = required(value.sub, "sub")?;
        let email = required(value.email, "email")?;
        let role_raw = required(value.role, "role")?;
        let role =
            Role::parse(&role_raw).ok_or(TokenError::InvalidClaim("role", role_raw.clone()))?;
        let display_name = required(value.name, "name")?;
        let issued_at = value.iat.ok_or(TokenError::MissingClaim("iat"))?;
        let expires_at = value.exp.ok_or(TokenError::MissingClaim("exp"))?;
        if expires_at <= issued_at {
            return Err(TokenError::InvalidClaim("exp", expires_at.to_string()));
        }

        Ok(Self {
            subject_id,
            email,
            role,
            display_name,
            organization_id: value.org_id,
            organization_name: value.org_name,
            issued_at,
            expires_at,
            issuer: value.iss.ok_or(TokenError::MissingClaim("iss"))?,
            audience: value.aud.ok_or(TokenError::MissingClaim("aud"))?,
            jti: value.jti.unwrap_or_default(),
        })
    }
}

impl TryFrom<serde_json::Value> for Claims {
    type Error = TokenError;

    fn try_from(value: serde_json::Value) -> TokenResult<Self> {
        let repr: ClaimsRepr = serde_json::from_value(value)
            .map_err(|err| TokenError::InvalidJson(err.to_string()))?;
        Claims::try_from(repr)
    }
}

#[derive(Debug, Deserialize)]
struct RefreshClaimsRepr {
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    iat: Option<i64>,
    #[serde(default)]
    exp: Option<i64>,
    #[serde(default)]
    iss: Option<String>,
    #[serde(default)]
    aud: Option<String>,
    #[serde(default)]
    jti: Option<String>,
}

impl TryFrom<RefreshClaimsRepr> for RefreshClaims {
    type Error = TokenError;

    fn try_from(value: RefreshClaimsRepr) -> TokenResult<Self> {
        let subject_id = required(value.sub, "sub")?;
        let email = required(value.email, "email")?;
        let issued_at = value.iat.ok_or(TokenError::MissingClaim("iat"))?;
        let expires_at = value.exp.ok_or(TokenError::MissingClaim("exp"))?;
        if expires_at <= issued_at {
            return Err(TokenError::InvalidClaim("exp", expires_at.to_string()));
        }

        Ok(Self {
            subject_id,
            email,
            issued_at,
            expires_at,
            issuer: value.iss.ok_or(TokenError::MissingClaim("iss"))?,
            audience: value.aud.ok_or(TokenError::MissingClaim("aud"))?,
            jti: value.jti.unwrap_or_default(),
        })
    }
}

impl TryFrom<serde_json::Value> for RefreshClaims {
    type Error = TokenError;

    fn try_from(value: serde_json::Value) -> TokenResult<Self> {
        let repr: RefreshClaimsRepr = serde_json::from_value(value)
            .map_err(|err| TokenError::InvalidJson(err.to_string()))?;
        RefreshClaims::try_from(repr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> serde_json::Value {
        serde_json::json!({
            "sub": "user-1",
            "email": "alice@example.com",
            "role": "member",
            "name": "Alice",
            "iat": 1_700_000_000,
            "exp": 1_700_086_400,
            "iss": "ops-portal",
            "aud": "ops-portal-client",
            "jti": "jti-1"
        })
    }

    #[test]
    fn accepts_complete_payload() {
        let claims = Claims::try_from(payload()).expect("claims");
        assert_eq!(claims.subject_id, "user-1");
        assert_eq!(claims.role, Role::Member);
        assert_eq!(claims.organization_id, None);
    }

    #[test]
    fn optional_org_claims_are_not_required() {
        let mut value = payload();
        value["org_id"] = serde_json::json!("org-1");
        value["org_name"] = serde_json::json!("Acme");
        let claims = Claims::try_from(value).expect("claims");
        assert_eq!(claims.organization_id.as_deref(), Some("org-1"));
        assert_eq!(claims.organization_name.as_deref(), Some("Acme"));
    }

    #[test]
    fn reports_first_missing_required_claim() {
        for claim in ["sub", "email", "role", "name"] {
            let mut value = payload();
            value.as_object_mut().expect("object").remove(claim);
            let err = Claims::try_from(value).expect_err("should reject");
            assert!(matches!(err, TokenError::MissingClaim(name) if name == claim));
        }
    }

    #[test]
    fn rejects_unknown_role() {
        let mut value = payload();
        value["role"] = serde_json::json!("superuser");
        let err = Claims::try_from(value).expect_err("should reject");
        assert!(matches!(err, TokenError::InvalidClaim("role", _)));
    }

    #[test]
    fn rejects_expiry_not_after_issuance() {
        let mut value = payload();
        value["exp"] = value["iat"].clone();
        let err = Claims::try_from(value).expect_err("should reject");
        assert!(matches!(err, TokenError::InvalidClaim("exp", _)));
    }

    #[test]
    fn refresh_claims_require_only_subject_and_email() {
        let value = serde_json::json!({
            "sub": "user-1",
            "email": "alice@example.com",
            "iat": 1_700_000_000,
            "exp": 1_700_604_800,
            "iss": "ops-portal",
            "aud": "ops-portal-client"
        });
        let claims = RefreshClaims::try_from(value).expect("refresh claims");
        assert_eq!(claims.subject_id, "user-1");
        assert_eq!(claims.jti, "");
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&Role::Administrator).expect("json"),
            "\"administrator\""
        );
        assert_eq!(Role::parse("organization"), Some(Role::Organization));
        assert_eq!(Role::parse("Administrator"), None);
    }
}
