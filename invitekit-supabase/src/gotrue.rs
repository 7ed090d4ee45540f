use std::sync::Arc;

use async_trait::async_trait;
use invitekit_core::{
    CoachIdentity, IdentityAccount, IdentityAdmin, InviteError, NewIdentityAccount,
    TokenIntrospector,
};
use serde::Deserialize;
use serde_json::json;

use crate::SupabaseConfig;

/// The subset of a GoTrue user object this service reads. The same shape
/// comes back from `/user` and `/admin/users`.
#[derive(Debug, Deserialize)]
struct GoTrueUser {
    id: String,
    email: Option<String>,
}

/// GoTrue error body. The field name shifted across versions, so every
/// known spelling is tried.
#[derive(Debug, Default, Deserialize)]
struct GoTrueErrorBody {
    msg: Option<String>,
    message: Option<String>,
    error_description: Option<String>,
}

impl GoTrueErrorBody {
    fn into_message(self) -> String {
        self.msg
            .or(self.message)
            .or(self.error_description)
            .unwrap_or_else(|| "unknown identity provider error".to_string())
    }
}

/// Map a failed account-creation message to the flow error.
///
/// GoTrue reports a duplicate email with "A user with this email address
/// has already been registered"; everything else is surfaced verbatim.
fn map_create_error(message: String) -> InviteError {
    if message.contains("already been registered") {
        InviteError::EmailTaken
    } else {
        InviteError::Provider(message)
    }
}

/// Identity-provider adapter over the GoTrue HTTP API.
///
/// Implements [`TokenIntrospector`] (read-only `/user` check carrying the
/// caller's token) and [`IdentityAdmin`] (service-role `/admin/users`).
#[derive(Clone)]
pub struct GoTrueAdmin {
    http: reqwest::Client,
    config: Arc<SupabaseConfig>,
}

impl GoTrueAdmin {
    /// Create an adapter sharing the given HTTP client and config.
    pub fn new(http: reqwest::Client, config: Arc<SupabaseConfig>) -> Self {
        Self { http, config }
    }

    async fn error_message(response: reqwest::Response) -> String {
        response
            .json::<GoTrueErrorBody>()
            .await
            .unwrap_or_default()
            .into_message()
    }
}

#[async_trait]
impl TokenIntrospector for GoTrueAdmin {
    async fn introspect(&self, token: &str) -> Result<CoachIdentity, InviteError> {
        let response = self
            .http
            .get(self.config.auth_url("user"))
            .header("apikey", self.config.service_role_key())
            .bearer_auth(token)
            .send()
            .await
            .map_err(|err| InviteError::Provider(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let user: GoTrueUser = response
                .json()
                .await
                .map_err(|err| InviteError::Provider(err.to_string()))?;
            Ok(CoachIdentity {
                id: user.id,
                email: user.email,
            })
        } else if status.is_client_error() {
            Err(InviteError::InvalidToken)
        } else {
            Err(InviteError::Provider(Self::error_message(response).await))
        }
    }
}

#[async_trait]
impl IdentityAdmin for GoTrueAdmin {
    async fn create_account(
        &self,
        account: NewIdentityAccount,
    ) -> Result<IdentityAccount, InviteError> {
        let body = json!({
            "email": account.email,
            "password": account.password,
            "email_confirm": account.email_confirmed,
            "user_metadata": account.metadata,
        });
        let response = self
            .http
            .post(self.config.auth_url("admin/users"))
            .header("apikey", self.config.service_role_key())
            .bearer_auth(self.config.service_role_key())
            .json(&body)
            .send()
            .await
            .map_err(|err| InviteError::Provider(err.to_string()))?;

        if response.status().is_success() {
            let user: GoTrueUser = response
                .json()
                .await
                .map_err(|err| InviteError::Provider(err.to_string()))?;
            Ok(IdentityAccount {
                id: user.id,
                email: user.email.unwrap_or(account.email),
            })
        } else {
            Err(map_create_error(Self::error_message(response).await))
        }
    }

    async fn delete_account(&self, account_id: &str) -> Result<(), InviteError> {
        let response = self
            .http
            .delete(self.config.auth_url(&format!("admin/users/{account_id}")))
            .header("apikey", self.config.service_role_key())
            .bearer_auth(self.config.service_role_key())
            .send()
            .await
            .map_err(|err| InviteError::Provider(err.to_string()))?;

        if response.status().is_success() {
            log::debug!("deleted identity account {account_id}");
            Ok(())
        } else {
            Err(InviteError::Provider(Self::error_message(response).await))
        }
    }
}
