use std::collections::HashMap;

use sha2::{Digest, Sha256};

/// In-memory user registry. Passwords are held as SHA-256 digests and
/// compared without short-circuiting.
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    users: HashMap<String, [u8; 32]>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user, replacing any existing password.
    pub fn insert(&mut self, user: impl Into<String>, password: &str) {
        self.users.insert(user.into(), digest(password));
    }

    /// Check a username/password pair. An unknown user and a wrong
    /// password are indistinguishable to the caller.
    pub fn verify(&self, user: &str, password: &str) -> bool {
        let presented = digest(password);
        match self.users.get(user) {
            Some(expected) => constant_time_compare(expected, &presented),
            None => {
                // Burn the same comparison for unknown users so both
                // rejections cost the same.
                let _ = constant_time_compare(&presented, &[0u8; 32]);
                false
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }
}

fn digest(password: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.finalize().into()
}

/// Compare digests without bailing at the first differing byte.
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
