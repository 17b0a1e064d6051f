use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use tracing::{debug, info};

use super::pubkey;
use crate::error::AdbError;

const KEY_BITS: usize = 2048;
const PRIVATE_KEY_FILE: &str = "adbkey";
const PUBLIC_KEY_FILE: &str = "adbkey.pub";
const LOCK_FILE: &str = ".adbkey.lock";

/// Persisted RSA identity used to answer device AUTH challenges.
///
/// The private half lives at `<dir>/adbkey` (PEM, mode 0600), the public
/// half at `<dir>/adbkey.pub` in the single-line format device allowlists
/// expect. Loading is idempotent: an existing key is never overwritten.
pub struct KeyStore {
    private_key: RsaPrivateKey,
    public_key: RsaPublicKey,
    comment: String,
}

impl KeyStore {
    /// Load the key pair from `dir`, generating and persisting a fresh one
    /// on first use. Generation is guarded by an advisory file lock so
    /// concurrent first runs do not race.
    pub fn load_or_generate(dir: &Path) -> Result<Self, AdbError> {
        let private_path = dir.join(PRIVATE_KEY_FILE);
        if private_path.exists() {
            return Self::load(&private_path);
        }

        fs::create_dir_all(dir)?;
        let lock = File::create(dir.join(LOCK_FILE))?;
        lock.lock_exclusive()?;

        // Another process may have generated the key while we waited.
        let result = if private_path.exists() {
            Self::load(&private_path)
        } else {
            Self::generate(dir, &private_path)
        };
        let _ = FileExt::unlock(&lock);
        result
    }

    fn load(private_path: &Path) -> Result<Self, AdbError> {
        let pem = fs::read_to_string(private_path)?;
        let private_key = RsaPrivateKey::from_pkcs8_pem(&pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(&pem))
            .map_err(|e| AdbError::KeyStore(format!("failed to parse {:?}: {}", private_path, e)))?;
        let public_key = RsaPublicKey::from(&private_key);
        debug!("loaded RSA key from {:?}", private_path);
        Ok(Self {
            private_key,
            public_key,
            comment: default_comment(),
        })
    }

    fn generate(dir: &Path, private_path: &Path) -> Result<Self, AdbError> {
        info!("generating {}-bit RSA key pair in {:?}", KEY_BITS, dir);
        let mut rng = rsa::rand_core::OsRng;
        let private_key = RsaPrivateKey::new(&mut rng, KEY_BITS)?;
        let public_key = RsaPublicKey::from(&private_key);
        let comment = default_comment();

        let pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| AdbError::KeyStore(e.to_string()))?;
        write_atomic(private_path, pem.as_bytes(), 0o600)?;

        let line = pubkey::encode_line(&public_key, &comment)?;
        write_atomic(&dir.join(PUBLIC_KEY_FILE), format!("{}\n", line).as_bytes(), 0o644)?;

        Ok(Self {
            private_key,
            public_key,
            comment,
        })
    }

    /// Sign a 20-byte AUTH token. The token is treated as a SHA-1 digest and
    /// wrapped in a PKCS#1 v1.5 DigestInfo, matching what the daemon
    /// verifies; it is not hashed again.
    pub fn sign(&self, token: &[u8]) -> Result<Vec<u8>, AdbError> {
        Ok(self.private_key.sign(Pkcs1v15Sign::new::<Sha1>(), token)?)
    }

    /// The `adbkey.pub` line: base64 blob, space, comment.
    pub fn public_key_line(&self) -> Result<String, AdbError> {
        pubkey::encode_line(&self.public_key, &self.comment)
    }

    /// AUTH(RSAPUBLICKEY) payload: the public-key line plus a NUL.
    pub fn auth_payload(&self) -> Result<Vec<u8>, AdbError> {
        let mut payload = self.public_key_line()?.into_bytes();
        payload.push(0);
        Ok(payload)
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }
}

fn default_comment() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
    format!("{}@{}", user, host)
}

/// Write via a sibling temp file and rename, so a crash never leaves a
/// truncated key on disk.
fn write_atomic(path: &Path, contents: &[u8], mode: u32) -> Result<(), AdbError> {
    let tmp_path = temp_sibling(path);
    {
        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(mode);
        }
        #[cfg(not(unix))]
        let _ = mode;
        let mut file = options.open(&tmp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_generate_and_reload() {
        let dir = tempdir().unwrap();
        let store = KeyStore::load_or_generate(dir.path()).unwrap();

        let private_path = dir.path().join(PRIVATE_KEY_FILE);
        let public_path = dir.path().join(PUBLIC_KEY_FILE);
        assert!(private_path.exists());
        assert!(public_path.exists());

        // Second invocation reads the same key instead of regenerating.
        let reloaded = KeyStore::load_or_generate(dir.path()).unwrap();
        use rsa::traits::PublicKeyParts;
        assert_eq!(store.public_key().n(), reloaded.public_key().n());
    }

    #[test]
    #[cfg(unix)]
    fn test_key_file_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        KeyStore::load_or_generate(dir.path()).unwrap();

        let private_mode = fs::metadata(dir.path().join(PRIVATE_KEY_FILE))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(private_mode & 0o777, 0o600);

        let public_mode = fs::metadata(dir.path().join(PUBLIC_KEY_FILE))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(public_mode & 0o777, 0o644);
    }

    #[test]
    fn test_sign_verifies_against_public_key() {
        let dir = tempdir().unwrap();
        let store = KeyStore::load_or_generate(dir.path()).unwrap();

        let token = [0xa5u8; 20];
        let signature = store.sign(&token).unwrap();
        assert_eq!(signature.len(), 256);

        store
            .public_key()
            .verify(Pkcs1v15Sign::new::<Sha1>(), &token, &signature)
            .unwrap();
    }

    #[test]
    fn test_sign_rejects_wrong_token_size() {
        let dir = tempdir().unwrap();
        let store = KeyStore::load_or_generate(dir.path()).unwrap();
        assert!(store.sign(&[0u8; 19]).is_err());
    }

    #[test]
    fn test_auth_payload_nul_terminated() {
        let dir = tempdir().unwrap();
        let store = KeyStore::load_or_generate(dir.path()).unwrap();
        let payload = store.auth_payload().unwrap();
        assert_eq!(*payload.last().unwrap(), 0);
        let line = std::str::from_utf8(&payload[..payload.len() - 1]).unwrap();
        assert!(line.contains(' '));
    }
}
