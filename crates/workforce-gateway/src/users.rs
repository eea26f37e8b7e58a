use std::collections::HashMap;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const DEMO_EMAIL: &str = "demo@workforce.ai";
pub const DEMO_PASSWORD: &str = "demo1234";
pub const DEMO_ORG: &str = "Acme Corporation";
pub const DEFAULT_ORG: &str = "My Company";

/// User identity as exposed in auth responses and token claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicUser {
    pub id: String,
    pub email: String,
    pub org: String,
    pub role: String,
}

#[derive(Debug, Clone)]
struct UserRecord {
    user: PublicUser,
    salt: String,
    password_digest: Vec<u8>,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum UserError {
    #[error("Email already registered")]
    EmailTaken,
}

/// In-memory user directory keyed by lower-cased email.
#[derive(Default)]
pub struct UserDirectory {
    by_email: HashMap<String, UserRecord>,
}

fn digest(salt: &str, password: &str) -> Option<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(salt.as_bytes()).ok()?;
    mac.update(password.as_bytes());
    Some(mac)
}

impl UserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        email: &str,
        password: &str,
        org: Option<&str>,
    ) -> Result<PublicUser, UserError> {
        let email = email.trim().to_lowercase();
        if self.by_email.contains_key(&email) {
            return Err(UserError::EmailTaken);
        }
        Ok(self.insert(email, password, org))
    }

    fn insert(&mut self, email: String, password: &str, org: Option<&str>) -> PublicUser {
        let salt = uuid::Uuid::new_v4().simple().to_string();
        let password_digest = digest(&salt, password)
            .map(|mac| mac.finalize().into_bytes().to_vec())
            .unwrap_or_default();
        let user = PublicUser {
            id: uuid::Uuid::new_v4().simple().to_string(),
            email: email.clone(),
            org: org
                .filter(|o| !o.trim().is_empty())
                .unwrap_or(DEFAULT_ORG)
                .to_string(),
            role: "admin".to_string(),
        };
        self.by_email.insert(
            email,
            UserRecord {
                user: user.clone(),
                salt,
                password_digest,
            },
        );
        user
    }

    /// Check credentials. The digest comparison is constant-time.
    pub fn authenticate(&self, email: &str, password: &str) -> Option<PublicUser> {
        let record = self.by_email.get(&email.trim().to_lowercase())?;
        let mac = digest(&record.salt, password)?;
        mac.verify_slice(&record.password_digest).ok()?;
        Some(record.user.clone())
    }

    pub fn get(&self, id: &str) -> Option<PublicUser> {
        self.by_email
            .values()
            .find(|r| r.user.id == id)
            .map(|r| r.user.clone())
    }

    /// Return the demo user, creating it on first use.
    pub fn ensure_demo_user(&mut self) -> PublicUser {
        match self.by_email.get(DEMO_EMAIL) {
            Some(record) => record.user.clone(),
            None => self.insert(DEMO_EMAIL.to_string(), DEMO_PASSWORD, Some(DEMO_ORG)),
        }
    }

    pub fn len(&self) -> usize {
        self.by_email.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_email.is_empty()
    }
}
