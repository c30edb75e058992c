use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use async_trait::async_trait;
use der::{Decode, Encode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::ca::{CertificateAuthority, CodeSigningCertificate, IssuingIdentity, KeySigner};
use crate::error::CaError;

struct SigningMaterial {
    signer: KeySigner,
    chain: Vec<Vec<u8>>,
    identity: IssuingIdentity,
}

/// CA whose key and chain live on disk.
///
/// The private key is PKCS#8 PEM, optionally encrypted; the chain file holds
/// the issuing certificate first and the root last. When watching is
/// enabled, edits to either file atomically swap the signing material:
/// in-flight requests finish against the material they loaded.
pub struct FileCa {
    key_path: PathBuf,
    chain_path: PathBuf,
    password: Option<String>,
    material: Arc<ArcSwap<SigningMaterial>>,
    watcher: Mutex<Option<RecommendedWatcher>>,
}

impl FileCa {
    pub fn new(
        key_path: impl Into<PathBuf>,
        chain_path: impl Into<PathBuf>,
        password: Option<String>,
        watch: bool,
    ) -> Result<Self, CaError> {
        let key_path = key_path.into();
        let chain_path = chain_path.into();
        let material = Arc::new(ArcSwap::from_pointee(load_material(
            &key_path,
            &chain_path,
            password.as_deref(),
        )?));

        let ca = FileCa {
            key_path,
            chain_path,
            password,
            material,
            watcher: Mutex::new(None),
        };
        if watch {
            ca.start_watcher()?;
        }
        Ok(ca)
    }

    /// Re-read key and chain from disk and swap them in. Keeps the current
    /// material when the new files do not form a usable CA.
    pub fn reload(&self) -> Result<(), CaError> {
        let material = load_material(
            &self.key_path,
            &self.chain_path,
            self.password.as_deref(),
        )?;
        self.material.store(Arc::new(material));
        tracing::info!(key = %self.key_path.display(), "ca signing material reloaded");
        Ok(())
    }

    fn start_watcher(&self) -> Result<(), CaError> {
        let material = Arc::clone(&self.material);
        let key_path = self.key_path.clone();
        let chain_path = self.chain_path.clone();
        let password = self.password.clone();

        let mut watcher = RecommendedWatcher::new(
            move |result: notify::Result<Event>| {
                let Ok(event) = result else { return };
                if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                    return;
                }
                match load_material(&key_path, &chain_path, password.as_deref()) {
                    Ok(new_material) => {
                        material.store(Arc::new(new_material));
                        tracing::info!("ca signing material reloaded");
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "ca reload failed, keeping current material");
                    }
                }
            },
            notify::Config::default(),
        )
        .map_err(|e| CaError::BadConfig(e.to_string()))?;

        for path in [&self.key_path, &self.chain_path] {
            watcher
                .watch(path, RecursiveMode::NonRecursive)
                .map_err(|e| CaError::BadConfig(e.to_string()))?;
        }
        *self.watcher.lock().unwrap_or_else(|e| e.into_inner()) = Some(watcher);
        Ok(())
    }
}

fn load_material(
    key_path: &Path,
    chain_path: &Path,
    password: Option<&str>,
) -> Result<SigningMaterial, CaError> {
    let key_pem = std::fs::read_to_string(key_path)
        .map_err(|e| CaError::Unavailable(format!("read {}: {}", key_path.display(), e)))?;
    let signer = KeySigner::from_pkcs8_pem(&key_pem, password)?;

    let chain_pem = std::fs::read_to_string(chain_path)
        .map_err(|e| CaError::Unavailable(format!("read {}: {}", chain_path.display(), e)))?;
    let blocks = pem::parse_many(chain_pem.as_bytes())
        .map_err(|e| CaError::BadConfig(e.to_string()))?;
    let chain: Vec<Vec<u8>> = blocks
        .into_iter()
        .filter(|b| b.tag() == "CERTIFICATE")
        .map(pem::Pem::into_contents)
        .collect();
    if chain.is_empty() {
        return Err(CaError::BadConfig(format!(
            "no certificates in {}",
            chain_path.display()
        )));
    }

    let issuing_cert = x509_cert::Certificate::from_der(&chain[0])
        .map_err(|e| CaError::BadConfig(e.to_string()))?;
    let ca_spki_der = issuing_cert
        .tbs_certificate
        .subject_public_key_info
        .to_der()
        .map_err(|e| CaError::BadConfig(e.to_string()))?;
    if ca_spki_der != signer.public_key_der()? {
        return Err(CaError::BadConfig(
            "private key does not match the issuing certificate".to_string(),
        ));
    }
    let issuer_name_der = issuing_cert
        .tbs_certificate
        .subject
        .to_der()
        .map_err(|e| CaError::BadConfig(e.to_string()))?;
    let signature_algorithm = signer.signature_algorithm()?;

    Ok(SigningMaterial {
        signer,
        chain,
        identity: IssuingIdentity { issuer_name_der, ca_spki_der, signature_algorithm },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkcs8::EncodePrivateKey;
    use x509_cert::name::RdnSequence;

    fn write_ca_files(dir: &Path) -> (PathBuf, PathBuf) {
        let key = p256::ecdsa::SigningKey::random(&mut rand::rngs::OsRng);
        let key_pem = key.to_pkcs8_pem(pkcs8::LineEnding::LF).unwrap().to_string();

        let signer = KeySigner::from_pkcs8_pem(&key_pem, None).unwrap();
        let spki = signer.public_key_der().unwrap();
        let name = RdnSequence::encode_from_string("CN=file ca test root").unwrap();
        let root_der = crate::ca::ephemeral::self_signed_root(&signer, &name, &spki).unwrap();

        let key_path = dir.join("key.pem");
        let chain_path = dir.join("chain.pem");
        std::fs::write(&key_path, key_pem).unwrap();
        std::fs::write(&chain_path, crate::ca::der_to_pem(&root_der)).unwrap();
        (key_path, chain_path)
    }

    #[tokio::test]
    async fn test_load_and_sign() {
        let dir = tempfile::tempdir().unwrap();
        let (key_path, chain_path) = write_ca_files(dir.path());

        let ca = FileCa::new(&key_path, &chain_path, None, false).unwrap();
        let identity = ca.issuing_identity().unwrap();
        assert!(!identity.issuer_name_der.is_empty());

        let signed = ca.create_certificate(b"tbs bytes").await.unwrap();
        assert!(!signed.signature.is_empty());
        assert_eq!(ca.trust_bundle().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reload_swaps_material() {
        let dir = tempfile::tempdir().unwrap();
        let (key_path, chain_path) = write_ca_files(dir.path());

        let ca = FileCa::new(&key_path, &chain_path, None, false).unwrap();
        let before = ca.issuing_identity().unwrap().ca_spki_der;

        // Replace key and chain on disk with fresh material.
        write_ca_files(dir.path());
        ca.reload().unwrap();
        let after = ca.issuing_identity().unwrap().ca_spki_der;
        assert_ne!(before, after);
    }

    #[tokio::test]
    async fn test_mismatched_key_and_chain_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (_, chain_path) = write_ca_files(dir.path());

        // A different key than the one the chain certifies
        let other = p256::ecdsa::SigningKey::random(&mut rand::rngs::OsRng);
        let other_path = dir.path().join("other.pem");
        std::fs::write(
            &other_path,
            other.to_pkcs8_pem(pkcs8::LineEnding::LF).unwrap().as_bytes(),
        )
        .unwrap();

        let result = FileCa::new(&other_path, &chain_path, None, false);
        assert!(matches!(result, Err(CaError::BadConfig(_))));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let (key_path, chain_path) = write_ca_files(dir.path());
        let ca = FileCa::new(&key_path, &chain_path, None, true).unwrap();
        ca.close().await;
        ca.close().await;
    }
}

#[async_trait]
impl CertificateAuthority for FileCa {
    fn issuing_identity(&self) -> Result<IssuingIdentity, CaError> {
        Ok(self.material.load().identity.clone())
    }

    async fn create_certificate(&self, tbs_der: &[u8]) -> Result<CodeSigningCertificate, CaError> {
        let material = self.material.load();
        let signature = material.signer.sign(tbs_der)?;
        Ok(CodeSigningCertificate {
            tbs_der: tbs_der.to_vec(),
            signature,
            signature_algorithm: material.identity.signature_algorithm.clone(),
        })
    }

    async fn trust_bundle(&self) -> Result<Vec<Vec<u8>>, CaError> {
        Ok(self.material.load().chain.clone())
    }

    async fn root(&self) -> Result<Vec<u8>, CaError> {
        let material = self.material.load();
        material
            .chain
            .last()
            .cloned()
            .ok_or_else(|| CaError::BadConfig("empty chain".to_string()))
    }

    async fn close(&self) {
        // Dropping the watcher stops file events; repeated calls are no-ops.
        *self.watcher.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}
