pub mod bootstrap;
pub mod env;
pub mod error;
pub mod ids;
pub mod language;
pub mod limits;
pub mod record;

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256, used for code bodies and stored payloads alike.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::sha256_hex;

    #[test]
    fn sha256_hex_matches_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
