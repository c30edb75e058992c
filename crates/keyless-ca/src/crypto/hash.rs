use sha2::{Digest, Sha256};

pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Key identifier per RFC 7093 method 1: leftmost 160 bits of the SHA-256
/// digest of the subjectPublicKey BIT STRING content.
pub fn key_identifier(public_key_bits: &[u8]) -> [u8; 20] {
    let digest = sha256(public_key_bits);
    let mut id = [0u8; 20];
    id.copy_from_slice(&digest[..20]);
    id
}

pub fn hex_encode(bytes: &[u8]) -> String {
    hex::encode(bytes)
}
