//! HS256 signing and verification shared with the document server.

// crates.io
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use serde_json::Value;
// self
use crate::_prelude::*;

/// Signs and verifies JSON payloads with a tenant-specific shared secret.
pub trait Signer
where
	Self: Send + Sync,
{
	/// Produces a compact token carrying `claims`.
	fn sign(&self, secret: &str, claims: &Value) -> Result<String>;

	/// Verifies `token` and returns its claims.
	fn verify(&self, secret: &str, token: &str) -> Result<Value>;
}
impl dyn Signer + '_ {
	/// Serializes `payload` and signs it.
	pub fn sign_json<T>(&self, secret: &str, payload: &T) -> Result<String>
	where
		T: Serialize,
	{
		let claims = serde_json::to_value(payload)
			.map_err(|e| Error::Signature { reason: format!("payload is not serializable: {e}") })?;

		self.sign(secret, &claims)
	}

	/// Verifies `token` and decodes its claims into `T`.
	pub fn verify_json<T>(&self, secret: &str, token: &str) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let claims = self.verify(secret, token)?;

		serde_path_to_error::deserialize(claims).map_err(|e| Error::Signature {
			reason: format!("claims do not match at `{}`: {}", e.path(), e.inner()),
		})
	}
}

/// [`Signer`] backed by `jsonwebtoken` using HMAC-SHA256.
#[derive(Clone, Debug, Default)]
pub struct JwtSigner;
impl Signer for JwtSigner {
	fn sign(&self, secret: &str, claims: &Value) -> Result<String> {
		if secret.is_empty() {
			return Err(Error::Signature { reason: "signing secret is empty".into() });
		}

		jsonwebtoken::encode(
			&Header::new(Algorithm::HS256),
			claims,
			&EncodingKey::from_secret(secret.as_bytes()),
		)
		.map_err(|e| Error::Signature { reason: e.to_string() })
	}

	fn verify(&self, secret: &str, token: &str) -> Result<Value> {
		if secret.is_empty() {
			return Err(Error::Signature { reason: "verification secret is empty".into() });
		}
		if token.trim().is_empty() {
			return Err(Error::Signature { reason: "token is empty".into() });
		}

		let mut validation = Validation::new(Algorithm::HS256);

		validation.required_spec_claims.clear();
		validation.validate_aud = false;

		jsonwebtoken::decode::<Value>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
			.map(|data| data.claims)
			.map_err(|e| Error::Signature { reason: e.to_string() })
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[derive(Debug, PartialEq, Serialize, Deserialize)]
	struct Payload {
		key: String,
		status: u8,
	}

	#[test]
	fn signed_payload_verifies_with_same_secret() {
		let signer: &dyn Signer = &JwtSigner;
		let payload = Payload { key: "doc-1".into(), status: 2 };
		let token = signer.sign_json("doc-secret", &payload).expect("Signing should succeed.");
		let decoded: Payload =
			signer.verify_json("doc-secret", &token).expect("Verification should succeed.");

		assert_eq!(decoded, payload);
	}

	#[test]
	fn wrong_secret_is_rejected() {
		let signer: &dyn Signer = &JwtSigner;
		let token = signer
			.sign_json("doc-secret", &Payload { key: "doc-1".into(), status: 2 })
			.expect("Signing should succeed.");

		assert!(matches!(
			signer.verify_json::<Payload>("other-secret", &token),
			Err(Error::Signature { .. })
		));
	}

	#[test]
	fn empty_inputs_are_rejected() {
		assert!(JwtSigner.sign("", &Value::Null).is_err());
		assert!(JwtSigner.verify("secret", "  ").is_err());
	}

	#[test]
	fn mismatched_claims_report_path() {
		let signer: &dyn Signer = &JwtSigner;
		let token = signer
			.sign_json("doc-secret", &serde_json::json!({ "key": "doc-1", "status": "two" }))
			.expect("Signing should succeed.");
		let err = signer
			.verify_json::<Payload>("doc-secret", &token)
			.expect_err("Type mismatch should be reported.");

		assert!(err.to_string().contains("status"), "Unexpected error: {err}.");
	}
}
