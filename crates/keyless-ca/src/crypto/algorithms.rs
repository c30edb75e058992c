use std::fmt;

use crate::crypto::keys::PublicKey;
use crate::error::ConfigError;

/// Key algorithm with its discriminating parameter (curve or modulus size).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    EcdsaP256,
    EcdsaP384,
    EcdsaP521,
    Rsa(usize),
    Ed25519,
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyKind::EcdsaP256 => write!(f, "ecdsa-p256"),
            KeyKind::EcdsaP384 => write!(f, "ecdsa-p384"),
            KeyKind::EcdsaP521 => write!(f, "ecdsa-p521"),
            KeyKind::Rsa(bits) => write!(f, "rsa-{}", bits),
            KeyKind::Ed25519 => write!(f, "ed25519"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashKind {
    Sha256,
    Sha384,
    Sha512,
    /// Ed25519 signs the message directly.
    None,
}

/// One allow-listed `(key algorithm, parameter, hash)` triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AlgorithmEntry {
    pub key: KeyKind,
    pub hash: HashKind,
}

/// The allow-list of client signing algorithms, checked before any token
/// verification work is done.
#[derive(Debug, Clone)]
pub struct AlgorithmRegistry {
    allowed: Vec<AlgorithmEntry>,
}

impl Default for AlgorithmRegistry {
    fn default() -> Self {
        AlgorithmRegistry {
            allowed: vec![
                AlgorithmEntry { key: KeyKind::EcdsaP256, hash: HashKind::Sha256 },
                AlgorithmEntry { key: KeyKind::EcdsaP384, hash: HashKind::Sha384 },
                AlgorithmEntry { key: KeyKind::EcdsaP521, hash: HashKind::Sha512 },
                AlgorithmEntry { key: KeyKind::Rsa(2048), hash: HashKind::Sha256 },
                AlgorithmEntry { key: KeyKind::Rsa(3072), hash: HashKind::Sha256 },
                AlgorithmEntry { key: KeyKind::Rsa(4096), hash: HashKind::Sha256 },
                AlgorithmEntry { key: KeyKind::Ed25519, hash: HashKind::None },
            ],
        }
    }
}

impl AlgorithmRegistry {
    /// Build a registry from configured algorithm names. Unknown names are a
    /// configuration error surfaced at startup.
    pub fn from_names(names: &[String]) -> Result<Self, ConfigError> {
        let mut allowed = Vec::with_capacity(names.len());
        for name in names {
            let entry = match name.as_str() {
                "ecdsa-p256-sha256" => AlgorithmEntry { key: KeyKind::EcdsaP256, hash: HashKind::Sha256 },
                "ecdsa-p384-sha384" => AlgorithmEntry { key: KeyKind::EcdsaP384, hash: HashKind::Sha384 },
                "ecdsa-p521-sha512" => AlgorithmEntry { key: KeyKind::EcdsaP521, hash: HashKind::Sha512 },
                "rsa-2048-sha256" => AlgorithmEntry { key: KeyKind::Rsa(2048), hash: HashKind::Sha256 },
                "rsa-3072-sha256" => AlgorithmEntry { key: KeyKind::Rsa(3072), hash: HashKind::Sha256 },
                "rsa-4096-sha256" => AlgorithmEntry { key: KeyKind::Rsa(4096), hash: HashKind::Sha256 },
                "ed25519" => AlgorithmEntry { key: KeyKind::Ed25519, hash: HashKind::None },
                other => {
                    return Err(ConfigError::Invalid(format!("unknown algorithm {}", other)))
                }
            };
            allowed.push(entry);
        }
        if allowed.is_empty() {
            return Err(ConfigError::Invalid(
                "algorithm allow-list must not be empty".to_string(),
            ));
        }
        Ok(AlgorithmRegistry { allowed })
    }

    /// Match the presented key against the allow-list by exact triple.
    pub fn lookup(&self, key: &PublicKey) -> Option<AlgorithmEntry> {
        let kind = key.kind();
        self.allowed.iter().copied().find(|entry| entry.key == kind)
    }
}
