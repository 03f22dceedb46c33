pub mod auth;
pub mod client;
pub mod error;

pub use client::ApiClient;

use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Public routes
    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/register", post(auth::register));

    // Bearer token checked by the extractor in each handler
    let user_routes = Router::new()
        .route("/logout", post(auth::logout))
        .route("/user", get(auth::current_user))
        .route("/user/profile", put(auth::update_profile));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", auth_routes.merge(user_routes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, MockConfig};
    use crate::error::Error;
    use crate::models::{LoginRequest, ProfileUpdate, RegisterRequest, Role};
    use crate::scoring::BandScore;
    use crate::storage::{Storage, StorageKey};

    async fn spawn_server() -> (String, Storage) {
        let mut config = Config::default();
        config.mock = MockConfig::instant();
        let server_storage = Storage::in_memory();
        let state = Arc::new(AppState::new(config, server_storage.clone()));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, create_router(state)).await.unwrap();
        });
        (format!("http://{}/api", addr), server_storage)
    }

    #[tokio::test]
    async fn test_register_profile_logout_flow() {
        let (base_url, server_storage) = spawn_server().await;
        let client_storage = Storage::in_memory();
        let client = ApiClient::new(base_url, client_storage.clone()).unwrap();

        let auth = client
            .register(&RegisterRequest {
                name: "Amara Okafor".to_string(),
                email: "amara@example.com".to_string(),
                password: "password123".to_string(),
                password_confirmation: "password123".to_string(),
                role: Some(Role::Student),
            })
            .await
            .unwrap();
        assert_eq!(client.token().unwrap().as_deref(), Some(auth.token.as_str()));

        let me = client.user().await.unwrap();
        assert_eq!(me.email, "amara@example.com");

        let updated = client
            .update_profile(&ProfileUpdate {
                target_band: Some(BandScore::try_from(7.5).unwrap()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(updated.target_band, Some(BandScore::try_from(7.5).unwrap()));

        // The server never writes the client-side login keys
        let server_token: Option<String> = server_storage.get(&StorageKey::AuthToken).unwrap();
        assert!(server_token.is_none());

        client.logout().await.unwrap();
        assert!(client.token().unwrap().is_none());
        let cached: Option<crate::models::User> =
            client_storage.get(&StorageKey::CurrentUser).unwrap();
        assert!(cached.is_none());

        // The revoked token no longer authenticates
        client_storage
            .set(&StorageKey::AuthToken, &auth.token)
            .unwrap();
        assert!(matches!(client.user().await, Err(Error::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_validation_errors_reach_the_client() {
        let (base_url, _) = spawn_server().await;
        let client = ApiClient::new(base_url, Storage::in_memory()).unwrap();

        let err = client
            .login(&LoginRequest {
                email: "not-an-email".to_string(),
                password: String::new(),
            })
            .await
            .unwrap_err();
        match err {
            Error::Validation(errors) => {
                assert!(!errors.field("email").is_empty());
                assert!(!errors.field("password").is_empty());
            }
            other => panic!("Expected validation error, got {:?}", other),
        }
        assert!(client.token().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_token_is_unauthorized() {
        let (base_url, _) = spawn_server().await;
        let client = ApiClient::new(base_url, Storage::in_memory()).unwrap();
        assert!(matches!(client.user().await, Err(Error::Unauthorized(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_clients_share_one_server_state() {
        let (base_url, server_storage) = spawn_server().await;

        let tasks: Vec<_> = (0..20)
            .map(|i| {
                let base_url = base_url.clone();
                tokio::spawn(async move {
                    let client = ApiClient::new(base_url, Storage::in_memory()).unwrap();
                    client
                        .register(&RegisterRequest {
                            name: format!("Student {i}"),
                            email: format!("student{i}@example.com"),
                            password: "password123".to_string(),
                            password_confirmation: "password123".to_string(),
                            role: None,
                        })
                        .await
                        .unwrap();
                    client.user().await.unwrap()
                })
            })
            .collect();

        for (i, task) in tasks.into_iter().enumerate() {
            let me = task.await.unwrap();
            assert_eq!(me.email, format!("student{i}@example.com"));
        }

        let users: Vec<crate::models::User> =
            server_storage.get_or_default(&StorageKey::Users).unwrap();
        assert_eq!(users.len(), 20);
    }
}
