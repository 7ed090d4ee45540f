use std::sync::Arc;

use async_trait::async_trait;
use invitekit_core::{ClientRecord, ClientStore, InviteError};
use serde_json::json;

use crate::SupabaseConfig;

/// `Accept` value asking PostgREST for exactly one object instead of an
/// array. Anything but a single matching row answers 406.
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

/// Client-record store over the PostgREST HTTP API.
#[derive(Clone)]
pub struct PostgrestClientStore {
    http: reqwest::Client,
    config: Arc<SupabaseConfig>,
    table: String,
}

impl PostgrestClientStore {
    /// Store reading the default `clients` table.
    pub fn new(http: reqwest::Client, config: Arc<SupabaseConfig>) -> Self {
        Self::with_table(http, config, "clients")
    }

    /// Store reading a custom table with the same column layout.
    pub fn with_table(
        http: reqwest::Client,
        config: Arc<SupabaseConfig>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            http,
            config,
            table: table.into(),
        }
    }

    fn table_url(&self) -> String {
        self.config.rest_url(&self.table)
    }
}

#[async_trait]
impl ClientStore for PostgrestClientStore {
    async fn find_client(&self, client_id: &str) -> Result<Option<ClientRecord>, InviteError> {
        let response = self
            .http
            .get(self.table_url())
            .query(&[
                ("id", format!("eq.{client_id}")),
                ("select", "id,coach_id,email,auth_user_id".to_string()),
            ])
            .header("apikey", self.config.service_role_key())
            .bearer_auth(self.config.service_role_key())
            .header(reqwest::header::ACCEPT, SINGLE_OBJECT)
            .send()
            .await
            .map_err(|err| InviteError::Store(err.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_ACCEPTABLE {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(InviteError::Store(format!(
                "client lookup answered {}",
                response.status()
            )));
        }
        let record: ClientRecord = response
            .json()
            .await
            .map_err(|err| InviteError::Store(err.to_string()))?;
        Ok(Some(record))
    }

    async fn link_auth_user(
        &self,
        client_id: &str,
        auth_user_id: &str,
    ) -> Result<bool, InviteError> {
        // The `auth_user_id=is.null` filter makes this a conditional
        // update: a row that was linked since our read no longer matches,
        // and the representation comes back empty.
        let response = self
            .http
            .patch(self.table_url())
            .query(&[
                ("id", format!("eq.{client_id}")),
                ("auth_user_id", "is.null".to_string()),
            ])
            .header("apikey", self.config.service_role_key())
            .bearer_auth(self.config.service_role_key())
            .header("Prefer", "return=representation")
            .json(&json!({ "auth_user_id": auth_user_id }))
            .send()
            .await
            .map_err(|err| InviteError::Store(err.to_string()))?;

        if !response.status().is_success() {
            return Err(InviteError::Store(format!(
                "linking update answered {}",
                response.status()
            )));
        }
        let rows: Vec<serde_json::Value> = response
            .json()
            .await
            .map_err(|err| InviteError::Store(err.to_string()))?;
        Ok(!rows.is_empty())
    }
}
