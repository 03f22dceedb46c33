//! Simulated OAuth provider sign-in.
//!
//! Stands in for a real provider integration: after a delay it hands back a
//! fabricated identity drawn at random from a small name pool. Two calls for
//! the same person can return different identities.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

use crate::models::OAuthProvider;

const NAME_POOL: [(&str, &str); 6] = [
    ("Alex", "Johnson"),
    ("Priya", "Sharma"),
    ("Wei", "Chen"),
    ("Fatima", "Rahman"),
    ("Lucas", "Oliveira"),
    ("Emma", "Wilson"),
];

const AVATAR_BASE_URL: &str = "https://api.dicebear.com/7.x/initials/svg";

/// Identity returned by a provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthProfile {
    pub provider: OAuthProvider,
    pub provider_id: String,
    pub name: String,
    pub email: String,
    pub avatar_url: String,
}

pub struct OAuthService {
    delay: Duration,
    rng: Mutex<StdRng>,
}

impl OAuthService {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Deterministic identities, for tests and demos
    pub fn with_seed(delay: Duration, seed: u64) -> Self {
        Self {
            delay,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub async fn mock_login(&self, provider: OAuthProvider) -> OAuthProfile {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let (first, last, suffix, provider_id) = {
            let mut rng = self.rng.lock();
            let (first, last) = NAME_POOL[rng.random_range(0..NAME_POOL.len())];
            let suffix: u16 = rng.random_range(100..1000);
            let provider_id: u32 = rng.random();
            (first, last, suffix, provider_id)
        };

        let profile = OAuthProfile {
            provider,
            provider_id: format!("{provider}_{provider_id}"),
            name: format!("{first} {last}"),
            email: format!(
                "{}.{}{}@{}",
                first.to_lowercase(),
                last.to_lowercase(),
                suffix,
                provider.mail_domain()
            ),
            avatar_url: format!("{AVATAR_BASE_URL}?seed={first}%20{last}"),
        };
        info!(%provider, email = %profile.email, "Mock OAuth login");
        profile
    }
}
