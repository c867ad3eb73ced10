//! Long-term key files.
//!
//! A key file is JSON holding the hex-encoded public element and, for
//! own-key files, the hex-encoded secret exponent. The `.pub` companion
//! carries only the public element; it is the file peers hand each other
//! out-of-band and trust on first use.

use std::fs;
use std::io;
use std::path::Path;

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::dh::DhKeyPair;
use crate::error::ChannelError;

#[derive(Serialize, Deserialize)]
struct KeyFile {
    public: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    secret: Option<String>,
}

/// Write `dir/name` (public + secret) and `dir/name.pub` (public only).
pub fn write_keypair(dir: &Path, name: &str, key: &DhKeyPair) -> Result<(), ChannelError> {
    let public = hex::encode(key.public().to_bytes_be());

    let mut secret_bytes = key.secret().to_bytes_be();
    let full = KeyFile {
        public: public.clone(),
        secret: Some(hex::encode(&secret_bytes)),
    };
    secret_bytes.zeroize();

    let path = dir.join(name);
    fs::write(&path, to_json(&path, &full)?)?;

    let public_only = KeyFile {
        public,
        secret: None,
    };
    let pub_path = dir.join(format!("{name}.pub"));
    fs::write(&pub_path, to_json(&pub_path, &public_only)?)?;

    tracing::info!(file = %path.display(), "wrote long-term key pair");
    Ok(())
}

/// Load a keypair from an own-key file. The secret must be present.
pub fn load_keypair(path: &Path) -> Result<DhKeyPair, ChannelError> {
    let record = read_record(path)?;
    let secret_hex = record
        .secret
        .as_deref()
        .ok_or_else(|| key_file_error(path, "no secret in key file"))?;
    let secret = decode_uint(path, secret_hex)?;
    let public = decode_uint(path, &record.public)?;
    Ok(DhKeyPair::from_parts(secret, public))
}

/// Load the public element from a key file of either kind.
pub fn load_public(path: &Path) -> Result<BigUint, ChannelError> {
    let record = read_record(path)?;
    decode_uint(path, &record.public)
}

/// Short hex digest of a public element, for log lines.
pub fn fingerprint(public: &BigUint) -> String {
    let digest = Sha256::digest(public.to_bytes_be());
    hex::encode(&digest[..4])
}

fn read_record(path: &Path) -> Result<KeyFile, ChannelError> {
    let data = fs::read_to_string(path)?;
    serde_json::from_str(&data).map_err(|e| key_file_error(path, &e.to_string()))
}

fn decode_uint(path: &Path, hex_str: &str) -> Result<BigUint, ChannelError> {
    let bytes = hex::decode(hex_str).map_err(|e| key_file_error(path, &e.to_string()))?;
    Ok(BigUint::from_bytes_be(&bytes))
}

fn to_json(path: &Path, record: &KeyFile) -> Result<String, ChannelError> {
    serde_json::to_string_pretty(record).map_err(|e| key_file_error(path, &e.to_string()))
}

fn key_file_error(path: &Path, msg: &str) -> ChannelError {
    ChannelError::Io(io::Error::new(
        io::ErrorKind::InvalidData,
        format!("{}: {msg}", path.display()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dh::testing::small_group;

    #[test]
    fn keypair_roundtrips_through_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let kp = DhKeyPair::generate(&small_group());
        write_keypair(dir.path(), "server_long_term_key", &kp).unwrap();

        let loaded = load_keypair(&dir.path().join("server_long_term_key")).unwrap();
        assert_eq!(loaded.public(), kp.public());
        assert_eq!(loaded.secret(), kp.secret());
    }

    #[test]
    fn pub_file_has_no_secret() {
        let dir = tempfile::tempdir().unwrap();
        let kp = DhKeyPair::generate(&small_group());
        write_keypair(dir.path(), "client_long_term_key", &kp).unwrap();

        let pub_path = dir.path().join("client_long_term_key.pub");
        assert_eq!(load_public(&pub_path).unwrap(), *kp.public());
        assert!(load_keypair(&pub_path).is_err());
        assert!(!fs::read_to_string(&pub_path).unwrap().contains("secret"));
    }

    #[test]
    fn missing_file_is_io() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_keypair(&dir.path().join("nope")).unwrap_err(),
            ChannelError::Io(_)
        ));
    }

    #[test]
    fn malformed_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage");
        fs::write(&path, "not json").unwrap();
        assert!(load_public(&path).is_err());

        fs::write(&path, r#"{"public": "zz"}"#).unwrap();
        assert!(load_public(&path).is_err());
    }

    #[test]
    fn fingerprint_is_stable_and_short() {
        let kp = DhKeyPair::generate(&small_group());
        let fp = fingerprint(kp.public());
        assert_eq!(fp.len(), 8);
        assert_eq!(fp, fingerprint(kp.public()));
    }
}
