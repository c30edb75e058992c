use der::asn1::{Null, ObjectIdentifier};
use der::Any;
use pkcs8::DecodePrivateKey;
use sha2::Sha256;
use signature::{Keypair, SignatureEncoding, Signer};
use x509_cert::spki::AlgorithmIdentifierOwned;

use crate::error::CaError;

const ECDSA_WITH_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2");
const ECDSA_WITH_SHA384: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.3");
const SHA256_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");

/// A CA private key held in process memory. Signs TBS bytes with the digest
/// matching the key algorithm.
pub enum KeySigner {
    EcdsaP256(p256::ecdsa::SigningKey),
    EcdsaP384(p384::ecdsa::SigningKey),
    Rsa(rsa::pkcs1v15::SigningKey<Sha256>),
}

impl KeySigner {
    pub fn generate_p256() -> Self {
        KeySigner::EcdsaP256(p256::ecdsa::SigningKey::random(&mut rand::rngs::OsRng))
    }

    /// Load a PKCS#8 PEM private key, decrypting it when a password is
    /// configured. P-256, P-384 and RSA keys are accepted.
    pub fn from_pkcs8_pem(pem_text: &str, password: Option<&str>) -> Result<Self, CaError> {
        match password {
            Some(password) => {
                if let Ok(key) =
                    p256::ecdsa::SigningKey::from_pkcs8_encrypted_pem(pem_text, password)
                {
                    return Ok(KeySigner::EcdsaP256(key));
                }
                if let Ok(key) =
                    p384::ecdsa::SigningKey::from_pkcs8_encrypted_pem(pem_text, password)
                {
                    return Ok(KeySigner::EcdsaP384(key));
                }
                rsa::RsaPrivateKey::from_pkcs8_encrypted_pem(pem_text, password)
                    .map(|key| KeySigner::Rsa(rsa::pkcs1v15::SigningKey::new(key)))
                    .map_err(|e| CaError::BadConfig(format!("cannot decrypt ca key: {}", e)))
            }
            None => {
                if let Ok(key) = p256::ecdsa::SigningKey::from_pkcs8_pem(pem_text) {
                    return Ok(KeySigner::EcdsaP256(key));
                }
                if let Ok(key) = p384::ecdsa::SigningKey::from_pkcs8_pem(pem_text) {
                    return Ok(KeySigner::EcdsaP384(key));
                }
                rsa::RsaPrivateKey::from_pkcs8_pem(pem_text)
                    .map(|key| KeySigner::Rsa(rsa::pkcs1v15::SigningKey::new(key)))
                    .map_err(|e| CaError::BadConfig(format!("cannot parse ca key: {}", e)))
            }
        }
    }

    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>, CaError> {
        match self {
            KeySigner::EcdsaP256(key) => {
                let signature: p256::ecdsa::DerSignature = key
                    .try_sign(message)
                    .map_err(|e| CaError::SignFailed(e.to_string()))?;
                Ok(signature.as_bytes().to_vec())
            }
            KeySigner::EcdsaP384(key) => {
                let signature: p384::ecdsa::DerSignature = key
                    .try_sign(message)
                    .map_err(|e| CaError::SignFailed(e.to_string()))?;
                Ok(signature.as_bytes().to_vec())
            }
            KeySigner::Rsa(key) => {
                let signature: rsa::pkcs1v15::Signature = key
                    .try_sign(message)
                    .map_err(|e| CaError::SignFailed(e.to_string()))?;
                Ok(signature.to_vec())
            }
        }
    }

    pub fn signature_algorithm(&self) -> Result<AlgorithmIdentifierOwned, CaError> {
        match self {
            KeySigner::EcdsaP256(_) => Ok(AlgorithmIdentifierOwned {
                oid: ECDSA_WITH_SHA256,
                parameters: None,
            }),
            KeySigner::EcdsaP384(_) => Ok(AlgorithmIdentifierOwned {
                oid: ECDSA_WITH_SHA384,
                parameters: None,
            }),
            KeySigner::Rsa(_) => Ok(AlgorithmIdentifierOwned {
                oid: SHA256_WITH_RSA,
                parameters: Some(
                    Any::encode_from(&Null)
                        .map_err(|e| CaError::SignFailed(e.to_string()))?,
                ),
            }),
        }
    }

    /// DER SubjectPublicKeyInfo of the signing key.
    pub fn public_key_der(&self) -> Result<Vec<u8>, CaError> {
        use pkcs8::EncodePublicKey;
        let doc = match self {
            KeySigner::EcdsaP256(key) => key.verifying_key().to_public_key_der(),
            KeySigner::EcdsaP384(key) => key.verifying_key().to_public_key_der(),
            KeySigner::Rsa(key) => key.verifying_key().to_public_key_der(),
        };
        doc.map(|doc| doc.as_bytes().to_vec())
            .map_err(|e| CaError::BadConfig(e.to_string()))
    }
}
