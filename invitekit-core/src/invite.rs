use std::sync::Arc;

use serde::Deserialize;

use crate::error::InviteError;
use crate::password::generate_temp_password;
use crate::{AccountMetadata, ClientStore, IdentityAdmin, NewIdentityAccount, TokenIntrospector};

/// Body of an invitation request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteRequest {
    /// Id of the client row to provision a login for.
    #[serde(default)]
    pub client_id: String,
    /// Login email for the new account.
    #[serde(default)]
    pub email: String,
    /// Optional display name; defaults to the local part of the email.
    #[serde(default)]
    pub name: Option<String>,
}

/// Result of a successful invitation.
#[derive(Debug, Clone)]
pub struct InviteOutcome {
    /// Id of the identity account that was created and linked.
    pub auth_user_id: String,
    /// The temporary password, transmitted to the caller exactly once and
    /// never stored outside the identity provider.
    pub temp_password: String,
}

/// Orchestrates the client-invitation flow.
///
/// The flow runs five ordered steps, each awaited before the next because
/// every step consumes the previous step's output: authenticate the coach,
/// validate ownership of the client row, generate a temporary password,
/// create the identity account, and link the account onto the row. If the
/// linkage write fails after the account exists, the flow deletes the
/// account again so a client row can never reference a dead account.
pub struct InviteFlow {
    introspector: Arc<dyn TokenIntrospector>,
    store: Arc<dyn ClientStore>,
    accounts: Arc<dyn IdentityAdmin>,
}

impl InviteFlow {
    /// Create a flow over the given collaborators.
    pub fn new(
        introspector: Arc<dyn TokenIntrospector>,
        store: Arc<dyn ClientStore>,
        accounts: Arc<dyn IdentityAdmin>,
    ) -> Self {
        Self {
            introspector,
            store,
            accounts,
        }
    }

    /// Provision login credentials for a client.
    ///
    /// `bearer` is the token from the `Authorization` header, if any.
    pub async fn invite(
        &self,
        bearer: Option<&str>,
        request: InviteRequest,
    ) -> Result<InviteOutcome, InviteError> {
        let token = match bearer {
            Some(token) if !token.trim().is_empty() => token,
            _ => return Err(InviteError::MissingToken),
        };
        let coach = self.introspector.introspect(token).await?;

        let client_id = request.client_id.trim();
        let email = request.email.trim();
        if client_id.is_empty() || email.is_empty() {
            return Err(InviteError::MissingFields);
        }

        let record = self
            .store
            .find_client(client_id)
            .await?
            .ok_or(InviteError::ClientNotFound)?;
        if record.coach_id != coach.id {
            return Err(InviteError::NotClientOwner);
        }
        if record.auth_user_id.is_some() {
            return Err(InviteError::AlreadyLinked);
        }

        let email = email.to_lowercase();
        let display_name = match request
            .name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
        {
            Some(name) => name.to_string(),
            None => email.split('@').next().unwrap_or(&email).to_string(),
        };

        let temp_password = generate_temp_password();
        let account = self
            .accounts
            .create_account(NewIdentityAccount {
                email,
                password: temp_password.clone(),
                email_confirmed: true,
                metadata: AccountMetadata::client(display_name, client_id),
            })
            .await?;

        let linked = match self.store.link_auth_user(client_id, &account.id).await {
            Ok(linked) => linked,
            Err(err) => {
                log::error!("linking client {client_id} to account {} failed: {err}", account.id);
                self.compensate(&account.id).await;
                return Err(InviteError::LinkFailed);
            }
        };
        if !linked {
            // No unlinked row matched: a concurrent invitation claimed the
            // client between our null-check and the conditional update.
            self.compensate(&account.id).await;
            return Err(InviteError::AlreadyLinked);
        }

        Ok(InviteOutcome {
            auth_user_id: account.id,
            temp_password,
        })
    }

    /// Delete the account created earlier in the same request.
    async fn compensate(&self, account_id: &str) {
        if let Err(err) = self.accounts.delete_account(account_id).await {
            // The account is now orphaned; leave both ids in the log for
            // the reconciliation sweep.
            log::error!("compensating delete of account {account_id} failed: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ClientRecord, CoachIdentity, IdentityAccount, PASSWORD_ALPHABET, TEMP_PASSWORD_LEN};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const COACH_TOKEN: &str = "coach-token";
    const COACH_ID: &str = "coach-1";
    const ACCOUNT_ID: &str = "acct-1";

    struct FakeIntrospector {
        calls: AtomicUsize,
    }

    impl FakeIntrospector {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TokenIntrospector for FakeIntrospector {
        async fn introspect(&self, token: &str) -> Result<CoachIdentity, InviteError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if token == COACH_TOKEN {
                Ok(CoachIdentity {
                    id: COACH_ID.to_string(),
                    email: Some("coach@example.com".to_string()),
                })
            } else {
                Err(InviteError::InvalidToken)
            }
        }
    }

    #[derive(Default)]
    struct FakeStore {
        record: Mutex<Option<ClientRecord>>,
        find_calls: AtomicUsize,
        link_calls: AtomicUsize,
        fail_link: bool,
        lose_race: bool,
    }

    impl FakeStore {
        fn with_record(record: ClientRecord) -> Self {
            Self {
                record: Mutex::new(Some(record)),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl ClientStore for FakeStore {
        async fn find_client(&self, client_id: &str) -> Result<Option<ClientRecord>, InviteError> {
            self.find_calls.fetch_add(1, Ordering::SeqCst);
            let record = self.record.lock().unwrap();
            Ok(record.as_ref().filter(|r| r.id == client_id).cloned())
        }

        async fn link_auth_user(
            &self,
            client_id: &str,
            auth_user_id: &str,
        ) -> Result<bool, InviteError> {
            self.link_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_link {
                return Err(InviteError::Store("connection reset".to_string()));
            }
            if self.lose_race {
                return Ok(false);
            }
            let mut record = self.record.lock().unwrap();
            match record.as_mut() {
                Some(r) if r.id == client_id && r.auth_user_id.is_none() => {
                    r.auth_user_id = Some(auth_user_id.to_string());
                    Ok(true)
                }
                _ => Ok(false),
            }
        }
    }

    #[derive(Default)]
    struct FakeAccounts {
        email_taken: bool,
        created: Mutex<Vec<NewIdentityAccount>>,
        deleted: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl IdentityAdmin for FakeAccounts {
        async fn create_account(
            &self,
            account: NewIdentityAccount,
        ) -> Result<IdentityAccount, InviteError> {
            if self.email_taken {
                return Err(InviteError::EmailTaken);
            }
            let email = account.email.clone();
            self.created.lock().unwrap().push(account);
            Ok(IdentityAccount {
                id: ACCOUNT_ID.to_string(),
                email,
            })
        }

        async fn delete_account(&self, account_id: &str) -> Result<(), InviteError> {
            self.deleted.lock().unwrap().push(account_id.to_string());
            Ok(())
        }
    }

    fn unlinked_client() -> ClientRecord {
        ClientRecord {
            id: "c1".to_string(),
            coach_id: COACH_ID.to_string(),
            email: "jane@example.com".to_string(),
            auth_user_id: None,
        }
    }

    fn request(client_id: &str, email: &str, name: Option<&str>) -> InviteRequest {
        InviteRequest {
            client_id: client_id.to_string(),
            email: email.to_string(),
            name: name.map(str::to_string),
        }
    }

    fn flow_over(
        store: FakeStore,
        accounts: FakeAccounts,
    ) -> (InviteFlow, Arc<FakeIntrospector>, Arc<FakeStore>, Arc<FakeAccounts>) {
        let introspector = Arc::new(FakeIntrospector::new());
        let store = Arc::new(store);
        let accounts = Arc::new(accounts);
        let flow = InviteFlow::new(introspector.clone(), store.clone(), accounts.clone());
        (flow, introspector, store, accounts)
    }

    #[tokio::test]
    async fn missing_token_is_rejected_before_any_remote_call() {
        let (flow, introspector, store, _) =
            flow_over(FakeStore::with_record(unlinked_client()), FakeAccounts::default());

        let err = flow
            .invite(None, request("c1", "jane@example.com", None))
            .await
            .unwrap_err();

        assert!(matches!(err, InviteError::MissingToken));
        assert_eq!(introspector.calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.find_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn blank_token_counts_as_missing() {
        let (flow, _, _, _) =
            flow_over(FakeStore::with_record(unlinked_client()), FakeAccounts::default());

        let err = flow
            .invite(Some("   "), request("c1", "jane@example.com", None))
            .await
            .unwrap_err();

        assert!(matches!(err, InviteError::MissingToken));
    }

    #[tokio::test]
    async fn unrecognized_token_is_unauthenticated() {
        let (flow, _, store, _) =
            flow_over(FakeStore::with_record(unlinked_client()), FakeAccounts::default());

        let err = flow
            .invite(Some("stale-token"), request("c1", "jane@example.com", None))
            .await
            .unwrap_err();

        assert!(matches!(err, InviteError::InvalidToken));
        assert_eq!(store.find_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn blank_fields_fail_before_data_access() {
        let (flow, _, store, _) =
            flow_over(FakeStore::with_record(unlinked_client()), FakeAccounts::default());

        let err = flow
            .invite(Some(COACH_TOKEN), request("  ", "jane@example.com", None))
            .await
            .unwrap_err();
        assert!(matches!(err, InviteError::MissingFields));

        let err = flow
            .invite(Some(COACH_TOKEN), request("c1", "", None))
            .await
            .unwrap_err();
        assert!(matches!(err, InviteError::MissingFields));

        assert_eq!(store.find_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_client_is_not_found() {
        let (flow, _, _, accounts) = flow_over(FakeStore::default(), FakeAccounts::default());

        let err = flow
            .invite(Some(COACH_TOKEN), request("ghost", "jane@example.com", None))
            .await
            .unwrap_err();

        assert!(matches!(err, InviteError::ClientNotFound));
        assert!(accounts.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn foreign_client_is_forbidden_and_creates_nothing() {
        let mut record = unlinked_client();
        record.coach_id = "coach-2".to_string();
        let (flow, _, _, accounts) =
            flow_over(FakeStore::with_record(record), FakeAccounts::default());

        let err = flow
            .invite(Some(COACH_TOKEN), request("c1", "jane@example.com", None))
            .await
            .unwrap_err();

        assert!(matches!(err, InviteError::NotClientOwner));
        assert!(accounts.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn linked_client_is_rejected_and_creates_nothing() {
        let mut record = unlinked_client();
        record.auth_user_id = Some("existing-acct".to_string());
        let (flow, _, _, accounts) =
            flow_over(FakeStore::with_record(record), FakeAccounts::default());

        let err = flow
            .invite(Some(COACH_TOKEN), request("c1", "jane@example.com", None))
            .await
            .unwrap_err();

        assert!(matches!(err, InviteError::AlreadyLinked));
        assert!(accounts.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn successful_invite_normalizes_email_and_links_the_account() {
        let (flow, _, store, accounts) =
            flow_over(FakeStore::with_record(unlinked_client()), FakeAccounts::default());

        let outcome = flow
            .invite(
                Some(COACH_TOKEN),
                request("c1", "  Jane@Example.Com ", Some("Jane")),
            )
            .await
            .unwrap();

        assert_eq!(outcome.auth_user_id, ACCOUNT_ID);
        assert_eq!(outcome.temp_password.len(), TEMP_PASSWORD_LEN);
        assert!(outcome
            .temp_password
            .bytes()
            .all(|b| PASSWORD_ALPHABET.contains(&b)));

        let created = accounts.created.lock().unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].email, "jane@example.com");
        assert_eq!(created[0].password, outcome.temp_password);
        assert!(created[0].email_confirmed);
        assert_eq!(created[0].metadata.role, "client");
        assert_eq!(created[0].metadata.name, "Jane");
        assert_eq!(created[0].metadata.client_id, "c1");

        let record = store.record.lock().unwrap();
        assert_eq!(
            record.as_ref().unwrap().auth_user_id.as_deref(),
            Some(ACCOUNT_ID)
        );
    }

    #[tokio::test]
    async fn display_name_falls_back_to_the_email_local_part() {
        let (flow, _, _, accounts) =
            flow_over(FakeStore::with_record(unlinked_client()), FakeAccounts::default());

        flow.invite(Some(COACH_TOKEN), request("c1", "Jane@Example.Com", None))
            .await
            .unwrap();

        let created = accounts.created.lock().unwrap();
        assert_eq!(created[0].metadata.name, "jane");
    }

    #[tokio::test]
    async fn second_invite_for_the_same_client_conflicts() {
        let (flow, _, _, accounts) =
            flow_over(FakeStore::with_record(unlinked_client()), FakeAccounts::default());

        flow.invite(Some(COACH_TOKEN), request("c1", "jane@example.com", None))
            .await
            .unwrap();
        let err = flow
            .invite(Some(COACH_TOKEN), request("c1", "jane@example.com", None))
            .await
            .unwrap_err();

        assert!(matches!(err, InviteError::AlreadyLinked));
        assert_eq!(accounts.created.lock().unwrap().len(), 1);
        assert!(accounts.deleted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn taken_email_surfaces_the_provider_conflict() {
        let (flow, _, _, _) = flow_over(
            FakeStore::with_record(unlinked_client()),
            FakeAccounts {
                email_taken: true,
                ..FakeAccounts::default()
            },
        );

        let err = flow
            .invite(Some(COACH_TOKEN), request("c1", "jane@example.com", None))
            .await
            .unwrap_err();

        assert!(matches!(err, InviteError::EmailTaken));
    }

    #[tokio::test]
    async fn failed_linkage_deletes_the_created_account() {
        let (flow, _, store, accounts) = flow_over(
            FakeStore {
                record: Mutex::new(Some(unlinked_client())),
                fail_link: true,
                ..FakeStore::default()
            },
            FakeAccounts::default(),
        );

        let err = flow
            .invite(Some(COACH_TOKEN), request("c1", "jane@example.com", None))
            .await
            .unwrap_err();

        assert!(matches!(err, InviteError::LinkFailed));
        assert_eq!(store.link_calls.load(Ordering::SeqCst), 1);
        assert_eq!(*accounts.deleted.lock().unwrap(), vec![ACCOUNT_ID.to_string()]);
    }

    #[tokio::test]
    async fn losing_the_linkage_race_rolls_back_and_conflicts() {
        let (flow, _, _, accounts) = flow_over(
            FakeStore {
                record: Mutex::new(Some(unlinked_client())),
                lose_race: true,
                ..FakeStore::default()
            },
            FakeAccounts::default(),
        );

        let err = flow
            .invite(Some(COACH_TOKEN), request("c1", "jane@example.com", None))
            .await
            .unwrap_err();

        assert!(matches!(err, InviteError::AlreadyLinked));
        assert_eq!(*accounts.deleted.lock().unwrap(), vec![ACCOUNT_ID.to_string()]);
    }
}
