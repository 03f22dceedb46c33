//! Simulated bearer-token authentication.
//!
//! Credentials are never checked against anything: a login succeeds for any
//! well-formed email and non-empty password. What the service does keep is
//! the token bookkeeping a real backend would do, so the REST surface and
//! the client behave consistently.
//!
//! In-process use ([`AuthService::new`]) also remembers the current login
//! under the auth-token and current-user keys. The REST backend
//! ([`AuthService::for_backend`]) only keeps sessions.

use rand::Rng;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{Error, Result, ValidationErrorBuilder};
use crate::models::{
    email_in_use, AuthResponse, LoginRequest, ProfileUpdate, RegisterRequest, Role, User,
};
use crate::services::oauth::OAuthProfile;
use crate::storage::{Storage, StorageKey};
use crate::validation::{validate_email, validate_name, validate_password};

/// Token hash to user id
type Sessions = BTreeMap<String, String>;

#[derive(Clone)]
pub struct AuthService {
    storage: Storage,
    delay: Duration,
    remember_login: bool,
}

/// Generate a random token
fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();
    hex::encode(bytes)
}

/// Hash a token for storage
fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// "maria.lopez_88" -> "Maria Lopez 88"
fn name_from_email(email: &str) -> String {
    let local = email.split('@').next().unwrap_or(email);
    local
        .split(['.', '_', '-', '+'])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

impl AuthService {
    pub fn new(storage: Storage, delay: Duration) -> Self {
        Self {
            storage,
            delay,
            remember_login: true,
        }
    }

    pub fn for_backend(storage: Storage, delay: Duration) -> Self {
        Self {
            storage,
            delay,
            remember_login: false,
        }
    }

    async fn simulate_latency(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }

    fn users(&self) -> Result<Vec<User>> {
        Ok(self.storage.get_or_default(&StorageKey::Users)?)
    }

    fn sessions(&self) -> Result<Sessions> {
        Ok(self.storage.get_or_default(&StorageKey::Sessions)?)
    }

    /// Record a session for `user` and make it the current login.
    ///
    /// Callers hold the storage lock. When logins are remembered, the session
    /// of the previously stored token is revoked in the same write.
    fn issue_token(&self, user: &User) -> Result<String> {
        let token = generate_token();
        let mut sessions = self.sessions()?;
        if self.remember_login {
            if let Some(previous) = self.token()? {
                sessions.remove(&hash_token(&previous));
            }
        }
        sessions.insert(hash_token(&token), user.id.clone());
        self.storage.set(&StorageKey::Sessions, &sessions)?;
        if self.remember_login {
            self.storage.set(&StorageKey::AuthToken, &token)?;
            self.storage.set(&StorageKey::CurrentUser, user)?;
        }
        Ok(token)
    }

    pub async fn login(&self, request: LoginRequest) -> Result<AuthResponse> {
        let mut errors = ValidationErrorBuilder::new();
        if let Err(msg) = validate_email(&request.email) {
            errors.add("email", msg);
        }
        if request.password.is_empty() {
            errors.add("password", "Password is required");
        }
        errors.finish()?;

        self.simulate_latency().await;
        let response = self.sign_in(request.email.trim())?;
        info!(user_id = %response.user.id, email = %response.user.email, "User logged in");
        Ok(response)
    }

    fn sign_in(&self, email: &str) -> Result<AuthResponse> {
        let _guard = self.storage.lock();
        let mut users = self.users()?;
        let user = match users.iter().find(|u| u.email.eq_ignore_ascii_case(email)) {
            Some(user) => user.clone(),
            None => {
                let user = User::new(name_from_email(email), email, Role::Student);
                users.push(user.clone());
                self.storage.set(&StorageKey::Users, &users)?;
                user
            }
        };
        let token = self.issue_token(&user)?;
        Ok(AuthResponse { token, user })
    }

    pub async fn register(&self, request: RegisterRequest) -> Result<AuthResponse> {
        let mut errors = ValidationErrorBuilder::new();
        if let Err(msg) = validate_name(&request.name) {
            errors.add("name", msg);
        }
        if let Err(msg) = validate_email(&request.email) {
            errors.add("email", msg);
        }
        if let Err(msg) = validate_password(&request.password) {
            errors.add("password", msg);
        }
        if request.password != request.password_confirmation {
            errors.add("password_confirmation", "Passwords do not match");
        }
        if request.role == Some(Role::Admin) {
            errors.add("role", "Admin accounts can only be granted by an administrator");
        }
        errors.finish()?;

        self.simulate_latency().await;

        let user = User::new(
            request.name.trim(),
            request.email.trim(),
            request.role.unwrap_or_default(),
        );
        let response = self.create_account(user)?;
        info!(
            user_id = %response.user.id,
            email = %response.user.email,
            role = %response.user.role,
            "User registered"
        );
        Ok(response)
    }

    fn create_account(&self, user: User) -> Result<AuthResponse> {
        let _guard = self.storage.lock();
        let mut users = self.users()?;
        if email_in_use(&users, &user.email, None) {
            return Err(Error::Conflict(format!(
                "An account for {} already exists",
                user.email
            )));
        }
        users.push(user.clone());
        self.storage.set(&StorageKey::Users, &users)?;
        let token = self.issue_token(&user)?;
        Ok(AuthResponse { token, user })
    }

    /// Sign in with a profile returned by the OAuth provider, creating the
    /// user on first sight of the email
    pub async fn complete_oauth(&self, profile: OAuthProfile) -> Result<AuthResponse> {
        self.simulate_latency().await;
        let response = self.link_oauth(&profile)?;
        info!(user_id = %response.user.id, provider = %profile.provider, "OAuth login completed");
        Ok(response)
    }

    fn link_oauth(&self, profile: &OAuthProfile) -> Result<AuthResponse> {
        let _guard = self.storage.lock();
        let mut users = self.users()?;
        let user = match users
            .iter_mut()
            .find(|u| u.email.eq_ignore_ascii_case(&profile.email))
        {
            Some(existing) => {
                existing.avatar_url = Some(profile.avatar_url.clone());
                existing.provider = Some(profile.provider);
                existing.updated_at = chrono::Utc::now();
                existing.clone()
            }
            None => {
                let mut user = User::new(&profile.name, &profile.email, Role::Student);
                user.avatar_url = Some(profile.avatar_url.clone());
                user.provider = Some(profile.provider);
                users.push(user.clone());
                user
            }
        };
        self.storage.set(&StorageKey::Users, &users)?;
        let token = self.issue_token(&user)?;
        Ok(AuthResponse { token, user })
    }

    /// Drop the session behind `token`
    pub async fn revoke(&self, token: &str) -> Result<()> {
        self.simulate_latency().await;
        let _guard = self.storage.lock();
        let mut sessions = self.sessions()?;
        if sessions.remove(&hash_token(token)).is_some() {
            self.storage.set(&StorageKey::Sessions, &sessions)?;
        }
        Ok(())
    }

    /// End the current login: revoke its session and forget the stored token.
    ///
    /// The stored token and user are cleared even when the revoke fails; the
    /// revoke error is still returned.
    pub async fn logout(&self) -> Result<()> {
        let revoked = match self.token()? {
            Some(token) => self.revoke(&token).await,
            None => Ok(()),
        };
        self.storage.remove(&StorageKey::AuthToken)?;
        self.storage.remove(&StorageKey::CurrentUser)?;
        if let Err(e) = &revoked {
            warn!(error = %e, "Failed to revoke session, local login cleared anyway");
        }
        revoked?;
        info!("User logged out");
        Ok(())
    }

    pub fn token(&self) -> Result<Option<String>> {
        Ok(self.storage.get(&StorageKey::AuthToken)?)
    }

    pub fn current_user(&self) -> Result<Option<User>> {
        Ok(self.storage.get(&StorageKey::CurrentUser)?)
    }

    pub fn is_authenticated(&self) -> Result<bool> {
        Ok(self.token()?.is_some())
    }

    /// Resolve a bearer token to its user
    pub fn user_for_token(&self, token: &str) -> Result<User> {
        let sessions = self.sessions()?;
        let user_id = sessions
            .get(&hash_token(token))
            .ok_or_else(|| Error::Unauthorized("Invalid or expired token".to_string()))?;
        self.users()?
            .into_iter()
            .find(|u| &u.id == user_id)
            .ok_or_else(|| {
                warn!(%user_id, "Session refers to a deleted user");
                Error::Unauthorized("Invalid or expired token".to_string())
            })
    }

    pub async fn update_profile(&self, token: &str, update: ProfileUpdate) -> Result<User> {
        let mut errors = ValidationErrorBuilder::new();
        if let Some(name) = &update.name {
            if let Err(msg) = validate_name(name) {
                errors.add("name", msg);
            }
        }
        if let Some(email) = &update.email {
            if let Err(msg) = validate_email(email) {
                errors.add("email", msg);
            }
        }
        errors.finish()?;

        let user_id = self.user_for_token(token)?.id;
        self.simulate_latency().await;

        let updated = self.apply_profile(&user_id, update)?;
        info!(user_id = %updated.id, "Profile updated");
        Ok(updated)
    }

    fn apply_profile(&self, user_id: &str, update: ProfileUpdate) -> Result<User> {
        let _guard = self.storage.lock();
        let mut users = self.users()?;
        if let Some(email) = &update.email {
            if email_in_use(&users, email, Some(user_id)) {
                return Err(Error::Conflict(format!(
                    "An account for {} already exists",
                    email.trim()
                )));
            }
        }
        let user = users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or_else(|| Error::not_found("User"))?;
        if let Some(name) = update.name {
            user.name = name.trim().to_string();
        }
        if let Some(email) = update.email {
            user.email = email.trim().to_string();
        }
        if let Some(avatar_url) = update.avatar_url {
            user.avatar_url = Some(avatar_url);
        }
        if let Some(target_band) = update.target_band {
            user.target_band = Some(target_band);
        }
        user.updated_at = chrono::Utc::now();
        let updated = user.clone();
        self.storage.set(&StorageKey::Users, &users)?;

        if self.current_user()?.is_some_and(|u| u.id == updated.id) {
            self.storage.set(&StorageKey::CurrentUser, &updated)?;
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OAuthProvider;
    use crate::scoring::BandScore;
    use crate::storage::{KeyValueStore, MemoryStore, StorageError};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    /// Backend that can refuse writes to the sessions key
    #[derive(Default)]
    struct SessionsFailStore {
        inner: MemoryStore,
        failing: AtomicBool,
    }

    impl KeyValueStore for SessionsFailStore {
        fn read(&self, key: &str) -> std::result::Result<Option<String>, StorageError> {
            self.inner.read(key)
        }

        fn write(&self, key: &str, value: &str) -> std::result::Result<(), StorageError> {
            if self.failing.load(Ordering::SeqCst) && key == StorageKey::Sessions.as_string() {
                return Err(StorageError::Io(std::io::Error::other("disk full")));
            }
            self.inner.write(key, value)
        }

        fn remove(&self, key: &str) -> std::result::Result<(), StorageError> {
            self.inner.remove(key)
        }
    }

    fn service() -> AuthService {
        AuthService::new(Storage::in_memory(), Duration::ZERO)
    }

    fn registration() -> RegisterRequest {
        RegisterRequest {
            name: "Priya Sharma".to_string(),
            email: "priya@example.com".to_string(),
            password: "band-seven-plus".to_string(),
            password_confirmation: "band-seven-plus".to_string(),
            role: None,
        }
    }

    #[test]
    fn test_name_from_email() {
        assert_eq!(name_from_email("maria.lopez_88@example.com"), "Maria Lopez 88");
        assert_eq!(name_from_email("kim@example.com"), "Kim");
    }

    #[tokio::test]
    async fn test_register_stores_user_and_token() {
        let auth = service();
        let response = auth.register(registration()).await.unwrap();

        assert_eq!(response.user.role, Role::Student);
        assert_eq!(response.token.len(), 64);
        assert_eq!(auth.token().unwrap(), Some(response.token.clone()));
        assert_eq!(auth.current_user().unwrap(), Some(response.user.clone()));
        assert_eq!(auth.user_for_token(&response.token).unwrap(), response.user);
    }

    #[tokio::test]
    async fn test_register_rejects_duplicate_email() {
        let auth = service();
        auth.register(registration()).await.unwrap();

        let mut again = registration();
        again.email = "PRIYA@example.com".to_string();
        let err = auth.register(again).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn test_register_validation() {
        let auth = service();
        let err = auth
            .register(RegisterRequest {
                name: "".to_string(),
                email: "not-an-email".to_string(),
                password: "short".to_string(),
                password_confirmation: "different".to_string(),
                role: None,
            })
            .await
            .unwrap_err();

        match err {
            Error::Validation(errors) => {
                assert_eq!(errors.len(), 4);
                assert_eq!(errors.field("password_confirmation"), ["Passwords do not match"]);
            }
            other => panic!("Expected validation error, got {:?}", other),
        }
        assert!(!auth.is_authenticated().unwrap());
    }

    #[tokio::test]
    async fn test_login_reuses_registered_user() {
        let auth = service();
        let registered = auth.register(registration()).await.unwrap();
        auth.logout().await.unwrap();

        let response = auth
            .login(LoginRequest {
                email: "PRIYA@example.com".to_string(),
                password: "anything".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(response.user.id, registered.user.id);
        assert_ne!(response.token, registered.token);
    }

    #[tokio::test]
    async fn test_login_fabricates_unknown_user() {
        let auth = service();
        let response = auth
            .login(LoginRequest {
                email: "chen.wei@example.com".to_string(),
                password: "x".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(response.user.name, "Chen Wei");
        assert_eq!(auth.user_for_token(&response.token).unwrap().id, response.user.id);
    }

    #[tokio::test]
    async fn test_login_requires_fields() {
        let auth = service();
        let result = auth
            .login(LoginRequest {
                email: "".to_string(),
                password: "".to_string(),
            })
            .await;
        tokio_test::assert_err!(&result);
        assert!(matches!(result, Err(Error::Validation(ref e)) if e.len() == 2));
    }

    #[tokio::test]
    async fn test_logout_revokes_token() {
        let auth = service();
        let response = auth.register(registration()).await.unwrap();

        auth.logout().await.unwrap();

        assert!(auth.token().unwrap().is_none());
        assert!(auth.current_user().unwrap().is_none());
        assert!(matches!(
            auth.user_for_token(&response.token),
            Err(Error::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_update_profile() {
        let auth = service();
        let response = auth.register(registration()).await.unwrap();

        let updated = auth
            .update_profile(
                &response.token,
                ProfileUpdate {
                    name: Some("Priya S.".to_string()),
                    target_band: Some(BandScore::try_from(7.5).unwrap()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.name, "Priya S.");
        assert_eq!(updated.email, "priya@example.com");
        assert_eq!(auth.current_user().unwrap().unwrap().name, "Priya S.");

        let bad = auth
            .update_profile(
                &response.token,
                ProfileUpdate {
                    email: Some("nope".to_string()),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(bad, Err(Error::Validation(_))));

        let unknown = auth.update_profile("bogus", ProfileUpdate::default()).await;
        assert!(matches!(unknown, Err(Error::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_backend_keeps_only_sessions() {
        let auth = AuthService::for_backend(Storage::in_memory(), Duration::ZERO);
        let response = auth.register(registration()).await.unwrap();

        assert!(auth.token().unwrap().is_none());
        assert!(auth.current_user().unwrap().is_none());
        assert_eq!(auth.user_for_token(&response.token).unwrap().id, response.user.id);

        auth.revoke(&response.token).await.unwrap();
        assert!(auth.user_for_token(&response.token).is_err());
    }

    #[tokio::test]
    async fn test_oauth_creates_then_reuses_user() {
        let auth = service();
        let profile = OAuthProfile {
            provider: OAuthProvider::Google,
            provider_id: "google_1".to_string(),
            name: "Emma Wilson".to_string(),
            email: "emma.wilson@gmail.com".to_string(),
            avatar_url: "https://example.com/a.png".to_string(),
        };

        let first = auth.complete_oauth(profile.clone()).await.unwrap();
        let second = auth.complete_oauth(profile).await.unwrap();

        assert_eq!(first.user.id, second.user.id);
        assert_eq!(second.user.provider, Some(OAuthProvider::Google));
        assert_eq!(auth.users().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_register_rejects_admin_role() {
        let auth = service();
        let mut request = registration();
        request.role = Some(Role::Admin);

        match auth.register(request).await {
            Err(Error::Validation(errors)) => assert_eq!(errors.field("role").len(), 1),
            other => panic!("Expected validation error, got {:?}", other),
        }
        assert!(auth.users().unwrap().is_empty());

        let mut request = registration();
        request.role = Some(Role::Teacher);
        assert_eq!(auth.register(request).await.unwrap().user.role, Role::Teacher);
    }

    #[tokio::test]
    async fn test_update_profile_rejects_taken_email() {
        let auth = AuthService::for_backend(Storage::in_memory(), Duration::ZERO);
        auth.register(registration()).await.unwrap();
        let mut other = registration();
        other.name = "Omar Haddad".to_string();
        other.email = "omar@example.com".to_string();
        let omar = auth.register(other).await.unwrap();

        let err = auth
            .update_profile(
                &omar.token,
                ProfileUpdate {
                    email: Some("PRIYA@example.com".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert_eq!(auth.user_for_token(&omar.token).unwrap().email, "omar@example.com");

        // Keeping your own address in a different case is fine
        let same = auth
            .update_profile(
                &omar.token,
                ProfileUpdate {
                    email: Some("Omar@example.com".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(same.email, "Omar@example.com");
    }

    #[tokio::test]
    async fn test_new_login_revokes_previous_token() {
        let auth = service();
        let login = || LoginRequest {
            email: "priya@example.com".to_string(),
            password: "secret".to_string(),
        };
        let first = auth.login(login()).await.unwrap();
        let second = auth.login(login()).await.unwrap();

        assert!(matches!(
            auth.user_for_token(&first.token),
            Err(Error::Unauthorized(_))
        ));
        assert!(auth.user_for_token(&second.token).is_ok());

        auth.logout().await.unwrap();
        assert!(auth.sessions().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_logout_clears_token_when_revoke_fails() {
        let backend = Arc::new(SessionsFailStore::default());
        let auth = AuthService::new(Storage::new(backend.clone()), Duration::ZERO);
        auth.register(registration()).await.unwrap();

        backend.failing.store(true, Ordering::SeqCst);
        let err = auth.logout().await.unwrap_err();

        assert!(matches!(err, Error::Storage(_)));
        assert!(auth.token().unwrap().is_none());
        assert!(auth.current_user().unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_registrations_keep_every_session() {
        let storage = Storage::in_memory();
        let auth = AuthService::for_backend(storage.clone(), Duration::ZERO);

        let handles: Vec<_> = (0..200)
            .map(|i| {
                let auth = auth.clone();
                tokio::spawn(async move {
                    auth.register(RegisterRequest {
                        name: format!("Student {i}"),
                        email: format!("student{i}@example.com"),
                        password: "password123".to_string(),
                        password_confirmation: "password123".to_string(),
                        role: None,
                    })
                    .await
                })
            })
            .collect();

        let mut tokens = Vec::new();
        for handle in handles {
            tokens.push(handle.await.unwrap().unwrap().token);
        }

        for token in &tokens {
            assert!(auth.user_for_token(token).is_ok());
        }
        let users: Vec<User> = storage.get_or_default(&StorageKey::Users).unwrap();
        assert_eq!(users.len(), 200);
        assert_eq!(auth.sessions().unwrap().len(), 200);
    }
}
