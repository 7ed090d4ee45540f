use thiserror::Error;

/// Errors produced by the client-invitation flow.
///
/// The `Display` strings are the user-facing messages that end up in the
/// JSON `error` field, so they are worded for the coach, not the operator.
#[derive(Debug, Error)]
pub enum InviteError {
    /// The request carried no bearer credential.
    #[error("Missing authorization header")]
    MissingToken,
    /// The bearer credential was rejected by the identity provider.
    #[error("Invalid or expired token")]
    InvalidToken,
    /// The request body is missing required fields.
    #[error("clientId and email are required")]
    MissingFields,
    /// The referenced client row does not exist.
    #[error("Client not found")]
    ClientNotFound,
    /// The caller is not the owner of the referenced client.
    #[error("You don't own this client")]
    NotClientOwner,
    /// The client is already linked to a login.
    #[error("Client already has login credentials")]
    AlreadyLinked,
    /// The email is already registered with the identity provider.
    #[error("This email is already registered")]
    EmailTaken,
    /// Writing the linkage failed after the account was created.
    #[error("Failed to link account to client")]
    LinkFailed,
    /// Any other identity-provider error, surfaced verbatim.
    #[error("{0}")]
    Provider(String),
    /// Any other data-store error.
    #[error("Database error: {0}")]
    Store(String),
}
