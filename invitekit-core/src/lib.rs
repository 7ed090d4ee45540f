//! # Invitekit Core
//!
//! `invitekit-core` provides the domain types, error taxonomy and the
//! provisioning flow for the invitekit client-invitation service. The remote
//! collaborators (identity provider, client-record store) sit behind traits
//! so the flow can be exercised against fakes in tests.

#![warn(missing_docs)]

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Errors that can occur while provisioning a client login.
pub mod error;

/// The client-invitation flow orchestration.
pub mod invite;

/// Temporary password generation.
pub mod password;

pub use error::InviteError;
pub use invite::{InviteFlow, InviteOutcome, InviteRequest};
pub use password::{generate_temp_password, PASSWORD_ALPHABET, TEMP_PASSWORD_LEN};

/// The authenticated coach resolved from a bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoachIdentity {
    /// Identity-provider account id of the coach.
    pub id: String,
    /// Email on the coach account, if the provider exposes one.
    pub email: Option<String>,
}

/// A coach's client as stored in the backing data store.
///
/// The row exists before an invitation ever runs. This crate never creates
/// or deletes it; the only mutation is the one-time write of
/// `auth_user_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientRecord {
    /// Unique id of the client row.
    pub id: String,
    /// Id of the owning coach account.
    pub coach_id: String,
    /// Contact address on file.
    pub email: String,
    /// Linked identity-provider account, once the client can log in.
    pub auth_user_id: Option<String>,
}

/// Fixed-shape metadata attached to every provisioned identity account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountMetadata {
    /// Always `"client"` for accounts created by this service.
    pub role: String,
    /// Display name shown in the client portal.
    pub name: String,
    /// Back-reference to the client row this account was provisioned for.
    pub client_id: String,
}

impl AccountMetadata {
    /// Metadata for a client-portal account.
    pub fn client(name: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            role: "client".to_string(),
            name: name.into(),
            client_id: client_id.into(),
        }
    }
}

/// Request to create an identity-provider account.
#[derive(Debug, Clone, Serialize)]
pub struct NewIdentityAccount {
    /// Normalized (trimmed, lower-cased) login email.
    pub email: String,
    /// Temporary password the client signs in with once.
    pub password: String,
    /// Whether the account starts pre-confirmed (no verification email).
    pub email_confirmed: bool,
    /// Role, name and client linkage metadata.
    pub metadata: AccountMetadata,
}

/// An account that exists in the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityAccount {
    /// Provider-assigned account id.
    pub id: String,
    /// Login email as stored by the provider.
    pub email: String,
}

/// Resolves a bearer token to the coach identity it belongs to.
#[async_trait]
pub trait TokenIntrospector: Send + Sync {
    /// Validate `token` against the identity provider.
    ///
    /// Fails with [`InviteError::InvalidToken`] when the provider does not
    /// recognize the token. Read-only.
    async fn introspect(&self, token: &str) -> Result<CoachIdentity, InviteError>;
}

/// Read and link access to the client-record store.
#[async_trait]
pub trait ClientStore: Send + Sync {
    /// Load a client row by id. `Ok(None)` when the row does not exist.
    async fn find_client(&self, client_id: &str) -> Result<Option<ClientRecord>, InviteError>;

    /// Write `auth_user_id` onto the row, but only if it is still unset.
    ///
    /// Returns `true` when a row was claimed, `false` when no unlinked row
    /// matched (the row vanished, or a concurrent invitation linked it
    /// first). The conditional update is what closes the read-then-write
    /// race between two invitations for the same client.
    async fn link_auth_user(
        &self,
        client_id: &str,
        auth_user_id: &str,
    ) -> Result<bool, InviteError>;
}

/// Privileged account management on the identity provider.
#[async_trait]
pub trait IdentityAdmin: Send + Sync {
    /// Create a new account. Fails with [`InviteError::EmailTaken`] when
    /// the email is already registered.
    async fn create_account(
        &self,
        account: NewIdentityAccount,
    ) -> Result<IdentityAccount, InviteError>;

    /// Delete an account. Only invoked as the compensating action when the
    /// linkage write fails after an account was created.
    async fn delete_account(&self, account_id: &str) -> Result<(), InviteError>;
}
