use der::asn1::ObjectIdentifier;
use der::Decode;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::traits::PublicKeyParts;
use sha2::{Digest, Sha256, Sha384, Sha512};
use signature::hazmat::PrehashVerifier;
use signature::Verifier;
use x509_cert::spki::SubjectPublicKeyInfoRef;

use crate::crypto::algorithms::{HashKind, KeyKind};
use crate::error::KeyError;

const ID_EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");
const ID_RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
const ID_ED25519: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.101.112");

const ID_SECP256R1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.3.1.7");
const ID_SECP384R1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.132.0.34");
const ID_SECP521R1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.132.0.35");

/// A requester's public key, parsed from a SubjectPublicKeyInfo.
///
/// Signature verification hashes with the digest the caller passes in; for
/// client material that is the algorithm registry entry's pairing.
pub enum PublicKey {
    EcdsaP256(p256::ecdsa::VerifyingKey),
    EcdsaP384(p384::ecdsa::VerifyingKey),
    EcdsaP521(p521::ecdsa::VerifyingKey),
    Rsa(rsa::RsaPublicKey),
    Ed25519(ed25519_dalek::VerifyingKey),
}

impl PublicKey {
    pub fn from_spki_der(der: &[u8]) -> Result<Self, KeyError> {
        let spki = SubjectPublicKeyInfoRef::from_der(der)
            .map_err(|e| KeyError::ParseError(e.to_string()))?;
        let raw = spki
            .subject_public_key
            .as_bytes()
            .ok_or_else(|| KeyError::ParseError("public key has unused bits".to_string()))?;

        let algorithm = spki.algorithm.oid;
        if algorithm == ID_EC_PUBLIC_KEY {
            let curve = spki
                .algorithm
                .parameters_oid()
                .map_err(|e| KeyError::ParseError(e.to_string()))?;
            if curve == ID_SECP256R1 {
                p256::ecdsa::VerifyingKey::from_sec1_bytes(raw)
                    .map(PublicKey::EcdsaP256)
                    .map_err(|e| KeyError::ParseError(e.to_string()))
            } else if curve == ID_SECP384R1 {
                p384::ecdsa::VerifyingKey::from_sec1_bytes(raw)
                    .map(PublicKey::EcdsaP384)
                    .map_err(|e| KeyError::ParseError(e.to_string()))
            } else if curve == ID_SECP521R1 {
                p521::ecdsa::VerifyingKey::from_sec1_bytes(raw)
                    .map(PublicKey::EcdsaP521)
                    .map_err(|e| KeyError::ParseError(e.to_string()))
            } else {
                Err(KeyError::UnsupportedKey(format!("ec curve {}", curve)))
            }
        } else if algorithm == ID_RSA_ENCRYPTION {
            rsa::RsaPublicKey::from_pkcs1_der(raw)
                .map(PublicKey::Rsa)
                .map_err(|e| KeyError::ParseError(e.to_string()))
        } else if algorithm == ID_ED25519 {
            let bytes: [u8; 32] = raw
                .try_into()
                .map_err(|_| KeyError::ParseError("ed25519 key must be 32 bytes".to_string()))?;
            ed25519_dalek::VerifyingKey::from_bytes(&bytes)
                .map(PublicKey::Ed25519)
                .map_err(|e| KeyError::ParseError(e.to_string()))
        } else {
            Err(KeyError::UnsupportedKey(format!("algorithm {}", algorithm)))
        }
    }

    /// Parse a PEM `PUBLIC KEY` block, returning the key and its DER bytes.
    pub fn from_pem(pem_str: &str) -> Result<(Self, Vec<u8>), KeyError> {
        let block = pem::parse(pem_str.as_bytes()).map_err(|e| KeyError::ParseError(e.to_string()))?;
        if block.tag() != "PUBLIC KEY" {
            return Err(KeyError::ParseError(format!(
                "expected PUBLIC KEY tag, got {}",
                block.tag()
            )));
        }
        let der = block.into_contents();
        let key = Self::from_spki_der(&der)?;
        Ok((key, der))
    }

    pub fn kind(&self) -> KeyKind {
        match self {
            PublicKey::EcdsaP256(_) => KeyKind::EcdsaP256,
            PublicKey::EcdsaP384(_) => KeyKind::EcdsaP384,
            PublicKey::EcdsaP521(_) => KeyKind::EcdsaP521,
            PublicKey::Rsa(key) => KeyKind::Rsa(key.size() * 8),
            PublicKey::Ed25519(_) => KeyKind::Ed25519,
        }
    }

    /// Verify `signature` over `message`, hashing with the digest the
    /// caller selected (the algorithm registry entry for client material,
    /// the declared algorithm for log signatures). ECDSA signatures are
    /// ASN.1 DER, RSA is PKCS#1 v1.5, Ed25519 is the pure 64-byte form and
    /// takes no digest.
    pub fn verify(
        &self,
        hash: HashKind,
        message: &[u8],
        signature: &[u8],
    ) -> Result<(), KeyError> {
        match self {
            PublicKey::EcdsaP256(key) => {
                let sig = p256::ecdsa::Signature::from_der(signature)
                    .map_err(|e| KeyError::ParseError(e.to_string()))?;
                key.verify_prehash(&digest(hash, message)?, &sig)
                    .map_err(|e| KeyError::VerificationFailed(e.to_string()))
            }
            PublicKey::EcdsaP384(key) => {
                let sig = p384::ecdsa::Signature::from_der(signature)
                    .map_err(|e| KeyError::ParseError(e.to_string()))?;
                key.verify_prehash(&digest(hash, message)?, &sig)
                    .map_err(|e| KeyError::VerificationFailed(e.to_string()))
            }
            PublicKey::EcdsaP521(key) => {
                let sig = p521::ecdsa::Signature::from_der(signature)
                    .map_err(|e| KeyError::ParseError(e.to_string()))?;
                key.verify_prehash(&digest(hash, message)?, &sig)
                    .map_err(|e| KeyError::VerificationFailed(e.to_string()))
            }
            PublicKey::Rsa(key) => {
                let sig = rsa::pkcs1v15::Signature::try_from(signature)
                    .map_err(|e| KeyError::ParseError(e.to_string()))?;
                match hash {
                    HashKind::Sha256 => rsa::pkcs1v15::VerifyingKey::<Sha256>::new(key.clone())
                        .verify(message, &sig),
                    HashKind::Sha384 => rsa::pkcs1v15::VerifyingKey::<Sha384>::new(key.clone())
                        .verify(message, &sig),
                    HashKind::Sha512 => rsa::pkcs1v15::VerifyingKey::<Sha512>::new(key.clone())
                        .verify(message, &sig),
                    HashKind::None => {
                        return Err(KeyError::VerificationFailed(
                            "rsa signatures require a digest".to_string(),
                        ))
                    }
                }
                .map_err(|e| KeyError::VerificationFailed(e.to_string()))
            }
            PublicKey::Ed25519(key) => {
                if hash != HashKind::None {
                    return Err(KeyError::VerificationFailed(
                        "ed25519 signs the message directly".to_string(),
                    ));
                }
                let sig = ed25519_dalek::Signature::from_slice(signature)
                    .map_err(|e| KeyError::ParseError(e.to_string()))?;
                key.verify(message, &sig)
                    .map_err(|e| KeyError::VerificationFailed(e.to_string()))
            }
        }
    }
}

fn digest(hash: HashKind, message: &[u8]) -> Result<Vec<u8>, KeyError> {
    match hash {
        HashKind::Sha256 => Ok(Sha256::digest(message).to_vec()),
        HashKind::Sha384 => Ok(Sha384::digest(message).to_vec()),
        HashKind::Sha512 => Ok(Sha512::digest(message).to_vec()),
        HashKind::None => Err(KeyError::VerificationFailed(
            "this key type requires a digest".to_string(),
        )),
    }
}
