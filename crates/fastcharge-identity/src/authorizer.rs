use std::collections::BTreeMap;

use crate::verifier::TokenVerifier;

pub const ANONYMOUS_PRINCIPAL_ID: &str = "anonymousUser";

/// Outcome of authorizing one inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizerDecision {
    Allow {
        principal_id: String,
        context: BTreeMap<String, String>,
    },
    Deny,
}

impl AuthorizerDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow { .. })
    }

    pub fn principal_id(&self) -> &str {
        match self {
            Self::Allow { principal_id, .. } => principal_id,
            Self::Deny => ANONYMOUS_PRINCIPAL_ID,
        }
    }

    /// Key/value context forwarded to downstream handlers.
    pub fn context(&self) -> BTreeMap<String, String> {
        match self {
            Self::Allow { context, .. } => context.clone(),
            Self::Deny => BTreeMap::from([("anonymousUser".to_string(), "true".to_string())]),
        }
    }
}

/// Authorizes a request from its raw `authorization` header value.
///
/// Accepts either a bare id token or `Bearer <token>`.
pub fn authorize_request(verifier: &TokenVerifier, authorization: Option<&str>) -> AuthorizerDecision {
    let Some(token) = authorization
        .map(str::trim)
        .map(|value| value.strip_prefix("Bearer ").unwrap_or(value).trim())
        .filter(|value| !value.is_empty())
    else {
        return AuthorizerDecision::Deny;
    };

    match verifier.verify(token) {
        Ok(identity) => {
            let principal_id = identity
                .subject
                .clone()
                .unwrap_or_else(|| identity.email.clone());
            let context = BTreeMap::from([
                ("userId".to_string(), principal_id.clone()),
                ("userEmail".to_string(), identity.email),
                ("anonymousUser".to_string(), "false".to_string()),
            ]);
            AuthorizerDecision::Allow {
                principal_id,
                context,
            }
        }
        Err(_) => AuthorizerDecision::Deny,
    }
}
