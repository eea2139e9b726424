//! Author lookup.

use log::{info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::api::{ApiRequest, XClient};
use crate::error::{XApiError, XApiResult};
use crate::tokens::AuthSession;

/// An X account, resolved from a handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: String,
    #[serde(rename = "username")]
    pub handle: String,
    #[serde(rename = "name", default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserLookupResponse {
    data: Option<Author>,
}

/// Normalizes a user-supplied handle: trims it, strips one leading `@` and
/// checks it against the X handle format (1 to 15 of `A-Z a-z 0-9 _`).
pub fn normalize_handle(raw: &str) -> XApiResult<String> {
    let trimmed = raw.trim();
    let handle = trimmed.strip_prefix('@').unwrap_or(trimmed);

    let pattern = Regex::new(r"^[A-Za-z0-9_]{1,15}$")
        .map_err(|e| XApiError::InvalidInput(format!("handle pattern: {}", e)))?;
    if pattern.is_match(handle) {
        Ok(handle.to_string())
    } else {
        Err(XApiError::InvalidInput(format!(
            "'{}' is not a valid X handle",
            raw.trim()
        )))
    }
}

impl XClient {
    /// Resolves `handle` to an [`Author`]. `Ok(None)` means the account does not exist.
    pub async fn lookup_author(&self, handle: &str) -> XApiResult<Option<Author>> {
        let handle = normalize_handle(handle)?;
        let mut session = self.read_session().await?;
        self.lookup_author_with(&mut session, &handle).await
    }

    pub(crate) async fn lookup_author_with(
        &self,
        session: &mut AuthSession,
        handle: &str,
    ) -> XApiResult<Option<Author>> {
        info!("Looking up user by username: {}", handle);

        let request = ApiRequest::get(format!("/users/by/username/{}", handle));
        let body = self
            .send_authorized(session, &request, "lookup_user")
            .await?;
        let response: UserLookupResponse = serde_json::from_str(&body)?;

        match response.data {
            Some(author) => {
                info!("Found user {} (@{})", author.id, author.handle);
                Ok(Some(author))
            }
            None => {
                warn!("User {} not found", handle);
                Ok(None)
            }
        }
    }
}
