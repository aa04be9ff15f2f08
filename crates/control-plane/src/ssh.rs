//! OpenSSH key handling: authorized-key normalization and Ed25519 generation.

use std::str::FromStr;

use rand::rngs::OsRng;
use ssh_key::authorized_keys::Entry;
use ssh_key::private::{Ed25519Keypair, KeypairData};
use ssh_key::{Algorithm, LineEnding, PrivateKey, PublicKey};
use thiserror::Error;

/// Errors from parsing or producing SSH keys.
#[derive(Debug, Error)]
pub enum SshKeyError {
    #[error("unsupported key algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error(transparent)]
    Key(#[from] ssh_key::Error),
}

/// Freshly generated key pair.
#[derive(Debug, Clone)]
pub struct GeneratedKey {
    /// Canonical `ssh-ed25519 <base64>` line.
    pub public_key: String,
    /// PEM encoded `OPENSSH PRIVATE KEY`.
    pub private_key: String,
}

/// Parse an authorized-key line and re-serialize it as `<algorithm> <base64>`.
///
/// Leading options and the trailing comment are dropped. The key data must
/// decode completely and match the algorithm named on the line.
pub fn normalize_public_key(line: &str) -> Result<String, SshKeyError> {
    let entry = Entry::from_str(line.trim())?;
    let key_data = entry.public_key().key_data().clone();
    if let Algorithm::Other(name) = key_data.algorithm() {
        return Err(SshKeyError::UnsupportedAlgorithm(name.as_str().to_owned()));
    }
    Ok(PublicKey::new(key_data, "").to_openssh()?)
}

/// Generate an Ed25519 key pair in OpenSSH formats.
pub fn generate_ed25519(comment: &str) -> Result<GeneratedKey, SshKeyError> {
    let keypair = KeypairData::from(Ed25519Keypair::random(&mut OsRng));
    let private = PrivateKey::new(keypair, comment)?;
    let private_key = private.to_openssh(LineEnding::LF)?.as_str().to_owned();
    let public_key = PublicKey::new(private.public_key().key_data().clone(), "").to_openssh()?;

    Ok(GeneratedKey {
        public_key,
        private_key,
    })
}
