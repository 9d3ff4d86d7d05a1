//! The session manager: sole owner of the signed-in identity.
//!
//! State transitions are `Anonymous -> Authenticated` on login, register
//! or federated success, and back on logout or an unrecoverable restore.
//! Observers follow along through `subscribe()`.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{watch, Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};
use tracing::{debug, error, info, warn};

use crate::api::{ApiClient, ApiError};
use crate::models::{Ack, ApiEnvelope, AuthPayload, User};
use crate::storage::{KeyValueStore, StorageError};

use super::error::{self as messages, Fallback};
use super::{AuthError, BackendExchange, Credentials, FederatedExchange, ProviderResponse, Session};

/// Profile-tier key holding the serialized `Session`
pub const SESSION_KEY: &str = "user";

/// Secret-tier key holding the serialized `Credentials`
pub const CREDENTIALS_KEY: &str = "credentials";

/// Attempts per storage write during a commit
const COMMIT_WRITE_ATTEMPTS: u32 = 2;

/// Both storage tiers plus the in-memory view they back.
///
/// Methods here block on the keychain and the filesystem, so the manager
/// runs them on the blocking pool. Memory is published from inside the same
/// call, which keeps it in step with disk even if the caller is cancelled.
struct SessionStore {
    profile: Arc<dyn KeyValueStore>,
    secrets: Arc<dyn KeyValueStore>,
    state: watch::Sender<Option<Session>>,
    credentials: Mutex<Option<Credentials>>,
    // Serializes tier I/O; a cancelled caller's commit may still be running
    io: Mutex<()>,
}

impl SessionStore {
    fn credentials(&self) -> MutexGuard<'_, Option<Credentials>> {
        self.credentials
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, session: Option<Session>, credentials: Option<Credentials>) -> bool {
        *self.credentials() = credentials;
        self.state.send_replace(session).is_some()
    }

    /// Persist both tiers, then publish. A failed profile write rolls the
    /// secret tier back to what it held before, leaving memory untouched.
    fn commit(&self, session: Session, credentials: Credentials) -> Result<Session, AuthError> {
        let session_json = serde_json::to_string(&session).map_err(StorageError::from)?;
        let credentials_json = serde_json::to_string(&credentials).map_err(StorageError::from)?;

        // Rollback target must be known before anything is written
        let previous = self.secrets.get(CREDENTIALS_KEY).map_err(|e| {
            warn!(error = %e, "Could not read previous credentials, nothing written");
            e
        })?;

        write_with_retry(self.secrets.as_ref(), CREDENTIALS_KEY, &credentials_json)?;

        if let Err(e) = write_with_retry(self.profile.as_ref(), SESSION_KEY, &session_json) {
            warn!(error = %e, "Failed to persist session profile, rolling back credentials");
            let rollback = match previous {
                Some(ref old) => self.secrets.set(CREDENTIALS_KEY, old),
                None => self.secrets.remove(CREDENTIALS_KEY),
            };
            if let Err(rollback_err) = rollback {
                warn!(error = %rollback_err, "Credential rollback failed");
            }
            return Err(e.into());
        }

        self.publish(Some(session.clone()), Some(credentials));
        info!(user_id = %session.user_id, federated = session.federated, "Session committed");
        Ok(session)
    }

    fn save_profile(&self, session: Session) -> Result<Session, AuthError> {
        let json = serde_json::to_string(&session).map_err(StorageError::from)?;
        write_with_retry(self.profile.as_ref(), SESSION_KEY, &json)?;
        self.state.send_replace(Some(session.clone()));
        Ok(session)
    }

    fn read_persisted(&self) -> Result<Option<(Session, Credentials)>, StorageError> {
        let profile = self.profile.get(SESSION_KEY)?;
        let secret = self.secrets.get(CREDENTIALS_KEY)?;

        match (profile, secret) {
            (None, None) => Ok(None),
            (Some(profile), Some(secret)) => {
                let mut session: Session = serde_json::from_str(&profile)?;
                let credentials: Credentials = serde_json::from_str(&secret)?;
                if session.federated != credentials.is_federated() {
                    debug!("Stored federated flag disagrees with credentials; using credentials");
                }
                session.federated = credentials.is_federated();
                Ok(Some((session, credentials)))
            }
            (Some(_), None) => Err(StorageError::Inconsistent(
                "profile present without credentials".to_string(),
            )),
            (None, Some(_)) => Err(StorageError::Inconsistent(
                "credentials present without profile".to_string(),
            )),
        }
    }

    fn restore(&self) -> Option<Session> {
        match self.read_persisted() {
            Ok(Some((session, credentials))) => {
                self.publish(Some(session.clone()), Some(credentials));
                info!(user_id = %session.user_id, "Session restored");
                Some(session)
            }
            Ok(None) => {
                self.publish(None, None);
                debug!("No stored session");
                None
            }
            Err(e) => {
                warn!(error = %e, "Failed to restore session, signing out");
                self.clear_tiers();
                self.publish(None, None);
                None
            }
        }
    }

    /// Drop memory and both tiers. Returns the credentials that were held
    /// and whether anyone was signed in.
    fn sign_out(&self) -> (Option<Credentials>, bool) {
        let credentials = self.credentials().take();
        let was_authenticated = self.publish(None, None);
        self.clear_tiers();
        (credentials, was_authenticated)
    }

    /// Best-effort removal of both tiers
    fn clear_tiers(&self) {
        if let Err(e) = self.secrets.remove(CREDENTIALS_KEY) {
            warn!(error = %e, "Failed to clear stored credentials");
        }
        if let Err(e) = self.profile.remove(SESSION_KEY) {
            warn!(error = %e, "Failed to clear stored profile");
        }
    }
}

pub struct SessionManager {
    api: ApiClient,
    federation: Arc<dyn FederatedExchange>,
    store: Arc<SessionStore>,
    // Held for the whole of an auth operation; a second caller gets `Busy`
    gate: AsyncMutex<()>,
}

impl SessionManager {
    /// Create an anonymous manager. Call `restore_session` before use.
    pub fn new(
        api: ApiClient,
        profile: Arc<dyn KeyValueStore>,
        secrets: Arc<dyn KeyValueStore>,
    ) -> Self {
        let federation = Arc::new(BackendExchange::new(api.clone()));
        let (state, _) = watch::channel(None);
        Self {
            api,
            federation,
            store: Arc::new(SessionStore {
                profile,
                secrets,
                state,
                credentials: Mutex::new(None),
                io: Mutex::new(()),
            }),
            gate: AsyncMutex::new(()),
        }
    }

    /// Replace the default backend exchange for federated sign-in
    pub fn with_federation(mut self, federation: Arc<dyn FederatedExchange>) -> Self {
        self.federation = federation;
        self
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    pub fn current(&self) -> Option<Session> {
        self.store.state.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.store.state.borrow().is_some()
    }

    /// Receive every session change; the current value is available immediately
    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.store.state.subscribe()
    }

    pub fn access_token(&self) -> Option<String> {
        self.store
            .credentials()
            .as_ref()
            .and_then(|c| c.access_token.clone())
    }

    /// API client carrying the current bearer token, if there is one
    pub fn authorized_client(&self) -> ApiClient {
        match self.access_token() {
            Some(token) => self.api.with_token(token),
            None => self.api.clone(),
        }
    }

    fn begin(&self) -> Result<AsyncMutexGuard<'_, ()>, AuthError> {
        self.gate.try_lock().map_err(|_| {
            warn!("Rejected concurrent authentication request");
            AuthError::Busy
        })
    }

    /// Run keychain and file I/O off the async workers
    async fn with_store<T, F>(&self, f: F) -> Result<T, AuthError>
    where
        F: FnOnce(&SessionStore) -> Result<T, AuthError> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || {
            let _io = store.io.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            f(&store)
        })
            .await
            .map_err(|e| AuthError::Storage(StorageError::Unavailable(format!("storage task failed: {e}"))))?
    }

    async fn commit(&self, session: Session, credentials: Credentials) -> Result<Session, AuthError> {
        self.with_store(move |store| store.commit(session, credentials)).await
    }

    // =========================================================================
    // Local credential endpoints
    // =========================================================================

    pub async fn login(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let _guard = self.begin()?;
        debug!("Logging in with email and password");
        let response = self.api.login(email, password).await;
        self.establish(response, messages::LOGIN).await
    }

    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<Session, AuthError> {
        let _guard = self.begin()?;
        debug!("Registering new account");
        let response = self.api.register(name, email, password).await;
        self.establish(response, messages::REGISTER).await
    }

    /// Turn a login/register response into a committed session
    async fn establish(
        &self,
        response: Result<ApiEnvelope<AuthPayload>, ApiError>,
        fallback: Fallback,
    ) -> Result<Session, AuthError> {
        let payload = Self::accepted(response, fallback)?;
        let user = payload
            .user
            .ok_or_else(|| AuthError::Validation(fallback.invalid.to_string()))?;

        let credentials = Credentials::local(payload.access_token, payload.refresh_token);
        self.commit(Session::from_user(&user, false), credentials).await
    }

    /// Unwrap a successful envelope's `data`, mapping every failure shape
    fn accepted<T>(
        response: Result<ApiEnvelope<T>, ApiError>,
        fallback: Fallback,
    ) -> Result<T, AuthError> {
        let envelope = response.map_err(|e| {
            error!(error = %e, "{}", fallback.failed);
            AuthError::from_api(&e, fallback)
        })?;
        if envelope.is_rejected() {
            let message = envelope.message.unwrap_or_else(|| fallback.failed.to_string());
            error!(%message, "Request rejected by server");
            return Err(AuthError::Network(message));
        }
        envelope
            .data
            .ok_or_else(|| AuthError::Validation(fallback.invalid.to_string()))
    }

    fn acknowledge<T>(
        response: Result<ApiEnvelope<T>, ApiError>,
        fallback: Fallback,
    ) -> Result<Ack, AuthError> {
        let envelope = response.map_err(|e| {
            error!(error = %e, "{}", fallback.failed);
            AuthError::from_api(&e, fallback)
        })?;
        if envelope.is_rejected() {
            return Err(AuthError::Network(
                envelope.message.unwrap_or_else(|| fallback.failed.to_string()),
            ));
        }
        Ok(Ack {
            message: envelope.message,
        })
    }

    // =========================================================================
    // Password reset
    // =========================================================================

    /// Ask for a reset link by email. No local state changes.
    pub async fn request_password_reset(&self, email: &str) -> Result<Ack, AuthError> {
        let _guard = self.begin()?;
        let response = self.api.forgot_password(email).await;
        let ack = Self::acknowledge(response, messages::RESET_LINK)?;
        info!("Password reset link requested");
        Ok(ack)
    }

    /// Set a new password using the token from a reset link.
    /// No local state changes; the caller sends the user back to login.
    pub async fn confirm_password_reset(
        &self,
        token: &str,
        new_password: &str,
        confirm_password: &str,
    ) -> Result<Ack, AuthError> {
        let _guard = self.begin()?;
        let response = self
            .api
            .reset_password(token, new_password, confirm_password)
            .await;
        let ack = Self::acknowledge(response, messages::RESET_PASSWORD)?;
        info!("Password reset confirmed");
        Ok(ack)
    }

    // =========================================================================
    // Federated sign-in
    // =========================================================================

    /// Populate the session from a provider's callback, bypassing the local
    /// credential endpoints.
    pub async fn complete_federated_login(&self, response: ProviderResponse) -> Result<Session, AuthError> {
        let _guard = self.begin()?;
        let identity = self.federation.exchange_federated_token(&response).await?;
        let credentials = Credentials::federated(
            response.provider,
            identity.access_token,
            identity.refresh_token,
        );
        self.commit(Session::from_user(&identity.user, true), credentials)
            .await
    }

    // =========================================================================
    // Token refresh and profile updates
    // =========================================================================

    /// Trade the stored refresh token for a new access token
    pub async fn refresh_credentials(&self) -> Result<Credentials, AuthError> {
        let _guard = self.begin()?;

        let current = self
            .store
            .credentials()
            .clone()
            .ok_or_else(|| AuthError::Validation("No refresh token found".to_string()))?;
        if current.is_federated() {
            return Err(AuthError::Validation(
                "Federated sessions are refreshed by their identity provider".to_string(),
            ));
        }
        let refresh_token = current
            .refresh_token
            .clone()
            .ok_or_else(|| AuthError::Validation("No refresh token found".to_string()))?;

        let response = self.api.refresh_token(&refresh_token).await;
        let payload = Self::accepted(response, messages::REFRESH)?;
        let access_token = payload
            .access_token
            .ok_or_else(|| AuthError::Validation(messages::REFRESH.invalid.to_string()))?;

        let mut session = self
            .current()
            .ok_or_else(|| AuthError::Validation("No active session".to_string()))?;
        if let Some(ref user) = payload.user {
            if !session.apply_profile(user) {
                warn!("Refresh response carried a different user; ignoring profile");
            }
        }

        let refreshed = current.rotated(access_token, payload.refresh_token);
        self.commit(session, refreshed.clone()).await?;
        debug!("Access token refreshed");
        Ok(refreshed)
    }

    /// Refresh profile fields after an authenticated call returned the user.
    /// Returns the updated session, or `None` when anonymous or for another user.
    pub async fn update_profile(&self, user: &User) -> Result<Option<Session>, AuthError> {
        let _guard = self.begin()?;

        let Some(mut session) = self.current() else {
            return Ok(None);
        };
        if !session.apply_profile(user) {
            debug!("Profile update for a different user ignored");
            return Ok(None);
        }

        let session = self.with_store(move |store| store.save_profile(session)).await?;
        Ok(Some(session))
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Load the persisted session at start-up.
    /// Read errors and half-written state clear everything and yield `None`.
    pub async fn restore_session(&self) -> Option<Session> {
        let _guard = self.gate.lock().await;

        match self.with_store(|store| Ok(store.restore())).await {
            Ok(session) => session,
            Err(e) => {
                error!(error = %e, "Session restore did not run");
                None
            }
        }
    }

    /// Sign out. Never fails: local state is cleared first, then the server
    /// is told (for local sessions holding a bearer token).
    pub async fn logout(&self) {
        let _guard = self.gate.lock().await;

        let (credentials, was_authenticated) = match self.with_store(|store| Ok(store.sign_out())).await {
            Ok(outcome) => outcome,
            Err(e) => {
                // The blocking pool is gone; clear memory here so nothing stays signed in
                error!(error = %e, "Storage cleanup did not run");
                let credentials = self.store.credentials().take();
                (credentials, self.store.state.send_replace(None).is_some())
            }
        };

        let token = credentials
            .filter(|c| !c.is_federated())
            .and_then(|c| c.access_token);
        if let Some(token) = token {
            if let Err(e) = self.api.with_token(token).logout().await {
                warn!(error = %e, "Server-side logout failed");
            }
        }

        if was_authenticated {
            info!("Logged out");
        } else {
            debug!("Logout with no active session");
        }
    }
}

fn write_with_retry(store: &dyn KeyValueStore, key: &str, value: &str) -> Result<(), StorageError> {
    let mut attempt = 1;
    loop {
        match store.set(key, value) {
            Ok(()) => return Ok(()),
            Err(e) if attempt < COMMIT_WRITE_ATTEMPTS => {
                debug!(key, attempt, error = %e, "Storage write failed, retrying");
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
