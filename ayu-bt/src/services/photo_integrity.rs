//! Photo integrity binder
//!
//! Produces the content hash that binds a verification result to the exact
//! photo bytes that were classified. The algorithm is chosen by configuration;
//! an algorithm this build does not provide is a hard failure, never a
//! silent fallback.

use sha2::{Digest, Sha256};

use super::leaf_verifier::VerificationError;

/// Hash algorithms the binder knows how to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha256,
}

impl HashAlgorithm {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().replace('-', "").as_str() {
            "sha256" => Some(HashAlgorithm::Sha256),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PhotoIntegrityBinder {
    /// Configured name, kept for error reporting
    algorithm_name: String,
    algorithm: Option<HashAlgorithm>,
}

impl PhotoIntegrityBinder {
    pub fn new(algorithm_name: &str) -> Self {
        let algorithm = HashAlgorithm::from_name(algorithm_name);
        if algorithm.is_none() {
            tracing::warn!(
                algorithm = algorithm_name,
                "Unsupported photo hash algorithm; verification and finalization will fail"
            );
        }
        Self {
            algorithm_name: algorithm_name.to_string(),
            algorithm,
        }
    }

    /// Lowercase hex digest of the raw photo bytes
    pub fn content_hash(&self, photo: &[u8]) -> Result<String, VerificationError> {
        match self.algorithm {
            Some(HashAlgorithm::Sha256) => Ok(format!("{:x}", Sha256::digest(photo))),
            None => Err(VerificationError::UnsupportedCryptoBackend(
                self.algorithm_name.clone(),
            )),
        }
    }
}

impl Default for PhotoIntegrityBinder {
    fn default() -> Self {
        Self::new("sha256")
    }
}
