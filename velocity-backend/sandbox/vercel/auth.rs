use jsonwebtoken::{DecodingKey, Validation};
use serde::Deserialize;

use crate::sandbox::error::SandboxError;
use crate::sandbox::types::VercelCredentials;

/// Resolved request scope: bearer token plus the team/project it acts for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VercelAuth {
    pub token: String,
    pub team_id: String,
    pub project_id: String,
}

/// Claims Vercel puts in the OIDC token issued to a project.
#[derive(Debug, Deserialize)]
struct OidcClaims {
    owner_id: String,
    project_id: String,
}

impl VercelAuth {
    /// Exactly one credential shape must be configured.
    pub fn resolve(credentials: Option<&VercelCredentials>) -> Result<Self, SandboxError> {
        match credentials {
            Some(VercelCredentials::Team {
                team_id,
                project_id,
                token,
            }) => Ok(Self {
                token: token.clone(),
                team_id: team_id.clone(),
                project_id: project_id.clone(),
            }),
            Some(VercelCredentials::Oidc { token }) => Self::from_oidc(token),
            None => Err(SandboxError::NotConfigured(
                "set VERCEL_TOKEN, VERCEL_TEAM_ID and VERCEL_PROJECT_ID, or VERCEL_OIDC_TOKEN".into(),
            )),
        }
    }

    /// The token is only forwarded to the API, which verifies it, so the
    /// signature is not checked here.
    fn from_oidc(token: &str) -> Result<Self, SandboxError> {
        let mut validation = Validation::default();
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let data = jsonwebtoken::decode::<OidcClaims>(token, &DecodingKey::from_secret(&[]), &validation)
            .map_err(|e| SandboxError::NotConfigured(format!("invalid VERCEL_OIDC_TOKEN: {e}")))?;

        Ok(Self {
            token: token.to_string(),
            team_id: data.claims.owner_id,
            project_id: data.claims.project_id,
        })
    }
}
