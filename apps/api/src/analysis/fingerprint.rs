//! Content fingerprint used as the analysis cache key.
//!
//! Composition:
//! - no job description: `sha256_hex(file_bytes)`
//! - with job description: `sha256_hex(sha256_hex(file_bytes) + job_description)`
//!
//! Both forms are 64 lowercase hex characters.

use std::fmt;

use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Derives the fingerprint from the exact upload bytes and the exact
    /// job-description text. An empty job description counts as absent.
    pub fn compute(file_bytes: &[u8], job_description: Option<&str>) -> Self {
        let file_hash = sha256_hex(file_bytes);
        match job_description.filter(|jd| !jd.is_empty()) {
            Some(jd) => {
                let mut hasher = Sha256::new();
                hasher.update(file_hash.as_bytes());
                hasher.update(jd.as_bytes());
                Self(format!("{:x}", hasher.finalize()))
            }
            None => Self(file_hash),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}
