use serde::Deserialize;

use crate::cache::CredentialCache;
use crate::error::{ProxyError, Result};

/// Query parameters accepted by `/stream`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamParams {
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub pass: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
}

/// A request that passed the gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizedRequest {
    pub user: String,
    pub path: String,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Check parameters first, then credentials against the current snapshot.
///
/// Missing parameters never touch the credential cache. Unknown users and wrong
/// passwords produce the same error.
pub fn validate(params: &StreamParams, cache: &CredentialCache) -> Result<AuthorizedRequest> {
    let (Some(user), Some(pass), Some(path)) = (
        non_empty(&params.user),
        non_empty(&params.pass),
        non_empty(&params.path),
    ) else {
        return Err(ProxyError::BadRequest);
    };

    if !cache.get().verify(user, pass) {
        tracing::debug!(user = %user, "Credential check failed");
        return Err(ProxyError::Forbidden);
    }

    Ok(AuthorizedRequest {
        user: user.to_string(),
        path: path.to_string(),
    })
}
