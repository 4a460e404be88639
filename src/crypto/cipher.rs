//! AES-256-GCM encryption of credential tokens and signing secrets at rest.

// crates.io
use aes_gcm::{
	Aes256Gcm, Nonce,
	aead::{Aead, KeyInit},
};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use sha2::{Digest, Sha256};
// self
use crate::_prelude::*;

const NONCE_SIZE: usize = 12;
const TAG_SIZE: usize = 16;

/// Encryption contract used before any secret touches a store.
pub trait Encryptor
where
	Self: Send + Sync,
{
	/// Encrypts `plaintext` into an opaque, storable string.
	fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError>;

	/// Reverses [`Encryptor::encrypt`].
	fn decrypt(&self, ciphertext: &str) -> Result<String, CryptoError>;
}

/// Errors raised while sealing or opening secrets.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum CryptoError {
	/// The configured key material is unusable.
	#[error("Encryption key is invalid: {reason}.")]
	InvalidKey {
		/// Why the key was rejected.
		reason: String,
	},
	/// Sealing the plaintext failed.
	#[error("Encryption failed.")]
	Encrypt,
	/// Authentication failed; wrong key or tampered data.
	#[error("Decryption failed (wrong key or corrupted data).")]
	Decrypt,
	/// The stored value is not a ciphertext produced by this crate.
	#[error("Ciphertext is malformed: {reason}.")]
	Malformed {
		/// Why the value was rejected.
		reason: String,
	},
	/// The blocking worker running the cipher did not finish.
	#[error("Cipher worker was interrupted: {reason}.")]
	Interrupted {
		/// Runtime-supplied reason.
		reason: String,
	},
}

/// AES-256-GCM [`Encryptor`] keyed by the SHA-256 digest of an application secret.
///
/// Each value gets a fresh random 96-bit nonce; the stored form is
/// `base64(nonce || ciphertext || tag)`.
#[derive(Clone)]
pub struct AesGcmEncryptor {
	cipher: Aes256Gcm,
}
impl AesGcmEncryptor {
	/// Derives the cipher key from `secret`.
	pub fn new(secret: &str) -> Result<Self, CryptoError> {
		if secret.is_empty() {
			return Err(CryptoError::InvalidKey { reason: "secret must not be empty".into() });
		}

		let key = Sha256::digest(secret.as_bytes());
		let cipher = Aes256Gcm::new_from_slice(&key)
			.map_err(|e| CryptoError::InvalidKey { reason: e.to_string() })?;

		Ok(Self { cipher })
	}
}
impl Encryptor for AesGcmEncryptor {
	fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
		let nonce: [u8; NONCE_SIZE] = rand::random();
		let sealed = self
			.cipher
			.encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
			.map_err(|_| CryptoError::Encrypt)?;
		let mut buf = Vec::with_capacity(NONCE_SIZE + sealed.len());

		buf.extend_from_slice(&nonce);
		buf.extend_from_slice(&sealed);

		Ok(BASE64.encode(buf))
	}

	fn decrypt(&self, ciphertext: &str) -> Result<String, CryptoError> {
		let bytes = BASE64
			.decode(ciphertext)
			.map_err(|e| CryptoError::Malformed { reason: e.to_string() })?;

		if bytes.len() < NONCE_SIZE + TAG_SIZE {
			return Err(CryptoError::Malformed {
				reason: format!("expected at least {} bytes, got {}", NONCE_SIZE + TAG_SIZE, bytes.len()),
			});
		}

		let (nonce, sealed) = bytes.split_at(NONCE_SIZE);
		let plaintext =
			self.cipher.decrypt(Nonce::from_slice(nonce), sealed).map_err(|_| CryptoError::Decrypt)?;

		String::from_utf8(plaintext).map_err(|e| CryptoError::Malformed { reason: e.to_string() })
	}
}
impl Debug for AesGcmEncryptor {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("AesGcmEncryptor(..)")
	}
}
