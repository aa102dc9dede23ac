//! Credential boundary.
//!
//! A session must be signed in before it accepts files. [`StaticCredentials`]
//! knows a single administrator account.

use crate::error::DigitizerError;
use crate::model::User;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, warn};

/// Checks an identifier/secret pair and returns the matching profile.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn login(&self, identifier: &str, secret: &str) -> Result<User, DigitizerError>;

    async fn logout(&self) {}
}

/// Built-in administrator account.
#[derive(Debug, Clone)]
pub struct StaticCredentials {
    login_delay: Duration,
    logout_delay: Duration,
}

const ADMIN_IDENTIFIERS: [&str; 2] = ["admin", "admin@uae-piping.ae"];
const ADMIN_SECRET: &str = "password123";

impl StaticCredentials {
    pub fn new(login_delay: Duration, logout_delay: Duration) -> Self {
        Self {
            login_delay,
            logout_delay,
        }
    }

    /// No simulated round trip.
    pub fn instant() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    pub fn admin_profile() -> User {
        User {
            id: "usr_admin_001".into(),
            name: "System Administrator".into(),
            email: "admin@uae-piping.ae".into(),
            role: "Super Admin".into(),
            avatar_url: Some(
                "https://ui-avatars.com/api/?name=System+Admin&background=1e40af&color=fff".into(),
            ),
        }
    }
}

impl Default for StaticCredentials {
    fn default() -> Self {
        Self::new(Duration::from_millis(1000), Duration::from_millis(500))
    }
}

#[async_trait]
impl CredentialVerifier for StaticCredentials {
    async fn login(&self, identifier: &str, secret: &str) -> Result<User, DigitizerError> {
        if !self.login_delay.is_zero() {
            tokio::time::sleep(self.login_delay).await;
        }
        if ADMIN_IDENTIFIERS.contains(&identifier.trim()) && secret == ADMIN_SECRET {
            let user = Self::admin_profile();
            info!(user = %user.id, "signed in");
            Ok(user)
        } else {
            warn!(identifier, "rejected credentials");
            Err(DigitizerError::AuthenticationFailed)
        }
    }

    async fn logout(&self) {
        if !self.logout_delay.is_zero() {
            tokio::time::sleep(self.logout_delay).await;
        }
    }
}
