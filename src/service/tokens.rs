//! Encrypted CRUD over per-user CRM credentials.

// self
use crate::{
	_prelude::*,
	auth::{Credential, Secret, UserKey},
	context,
	crypto::{CryptoError, Encryptor},
	store::{CredentialStore, StoredCredential},
};

const ENTITY: &str = "credential";

#[derive(Clone, Copy, Debug)]
enum CipherOp {
	Seal,
	Open,
}

/// Encrypts credentials on the way into the store and decrypts them on the way out.
///
/// Access and refresh tokens are processed concurrently; both must finish before
/// the outcome is decided, so a failure in one never leaves the other running.
#[derive(Clone)]
pub struct TokenService {
	store: Arc<dyn CredentialStore>,
	encryptor: Arc<dyn Encryptor>,
}
impl TokenService {
	/// Creates a service over the provided store and encryptor.
	pub fn new(store: Arc<dyn CredentialStore>, encryptor: Arc<dyn Encryptor>) -> Self {
		Self { store, encryptor }
	}

	/// Validates, encrypts, and inserts a new credential.
	pub async fn create(&self, ctx: &Context, credential: Credential) -> Result<()> {
		tracing::debug!(user = %credential.id, "validating credential");

		credential.validate()?;

		let record = self.seal(ctx, &credential).await?;

		tracing::debug!(user = %credential.id, "persisting credential");

		ctx.run(async { self.store.insert(record).await.map_err(|e| e.into_error(ENTITY)) }).await
	}

	/// Fetches and decrypts the credential for `id`.
	pub async fn get(&self, ctx: &Context, id: &str) -> Result<Credential> {
		let id = UserKey::new(id.trim())?;

		tracing::debug!(user = %id, "fetching credential");

		let record = ctx
			.run(async { self.store.fetch(&id).await.map_err(Error::from) })
			.await?
			.ok_or_else(|| Error::NotFound { entity: ENTITY, id: id.to_string() })?;
		let (access_token, refresh_token) = self
			.apply_pair(ctx, CipherOp::Open, record.access_token.clone(), record.refresh_token.clone())
			.await?;

		Ok(Credential {
			id: record.id,
			access_token: Secret::new(access_token),
			refresh_token: Secret::new(refresh_token),
			token_type: record.token_type,
			scope: record.scope,
			api_domain: record.api_domain,
			expires_at: record.expires_at,
		})
	}

	/// Validates, encrypts, and upserts a credential, returning what was persisted.
	pub async fn update(&self, ctx: &Context, credential: Credential) -> Result<Credential> {
		tracing::debug!(user = %credential.id, "validating credential update");

		credential.validate()?;

		let record = self.seal(ctx, &credential).await?;

		ctx.run(async { self.store.upsert(record).await.map_err(Error::from) }).await?;

		tracing::debug!(user = %credential.id, "credential updated");

		Ok(credential)
	}

	/// Removes the credential for `id`.
	pub async fn delete(&self, ctx: &Context, id: &str) -> Result<()> {
		let id = UserKey::new(id.trim())?;

		tracing::debug!(user = %id, "deleting credential");

		ctx.run(async { self.store.delete(&id).await.map_err(|e| e.into_error(ENTITY)) }).await
	}

	async fn seal(&self, ctx: &Context, credential: &Credential) -> Result<StoredCredential> {
		let (access_token, refresh_token) = self
			.apply_pair(
				ctx,
				CipherOp::Seal,
				credential.access_token.expose().to_owned(),
				credential.refresh_token.expose().to_owned(),
			)
			.await?;

		Ok(StoredCredential {
			id: credential.id.clone(),
			access_token,
			refresh_token,
			token_type: credential.token_type.clone(),
			scope: credential.scope.clone(),
			api_domain: credential.api_domain.clone(),
			expires_at: credential.expires_at,
		})
	}

	async fn apply_pair(
		&self,
		ctx: &Context,
		op: CipherOp,
		first: String,
		second: String,
	) -> Result<(String, String)> {
		let (first, second) =
			tokio::join!(ctx.run(self.apply(op, first)), ctx.run(self.apply(op, second)));

		context::settle(ctx, first, second)
	}

	async fn apply(&self, op: CipherOp, input: String) -> Result<String> {
		let encryptor = self.encryptor.clone();

		tokio::task::spawn_blocking(move || match op {
			CipherOp::Seal => encryptor.encrypt(&input),
			CipherOp::Open => encryptor.decrypt(&input),
		})
		.await
		.map_err(|e| CryptoError::Interrupted { reason: e.to_string() })?
		.map_err(Error::from)
	}
}
impl Debug for TokenService {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("TokenService(..)")
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{crypto::AesGcmEncryptor, store::MemoryStore};

	fn service() -> (TokenService, Arc<MemoryStore>) {
		let store = Arc::new(MemoryStore::default());
		let encryptor =
			Arc::new(AesGcmEncryptor::new("client-secret").expect("Key derivation should succeed."));

		(TokenService::new(store.clone(), encryptor), store)
	}

	fn credential(id: &str) -> Credential {
		Credential::builder(UserKey::new(id).expect("User key fixture should be valid."))
			.access_token("access-plain")
			.refresh_token("refresh-plain")
			.scope("ZohoCRM.modules.ALL")
			.api_domain("https://acme.crm.example")
			.expires_in(Duration::hours(1))
			.build()
			.expect("Credential fixture should build.")
	}

	#[tokio::test]
	async fn stored_tokens_are_ciphertext() {
		let (service, store) = service();
		let ctx = Context::background();

		service.create(&ctx, credential("42@7700")).await.expect("Create should succeed.");

		let id = UserKey::new("42@7700").expect("User key fixture should be valid.");
		let stored = CredentialStore::fetch(store.as_ref(), &id)
			.await
			.expect("Store fetch should succeed.")
			.expect("Record should be stored.");

		assert_ne!(stored.access_token, "access-plain");
		assert_ne!(stored.refresh_token, "refresh-plain");

		let fetched = service.get(&ctx, "42@7700").await.expect("Get should succeed.");

		assert_eq!(fetched.access_token.expose(), "access-plain");
		assert_eq!(fetched.refresh_token.expose(), "refresh-plain");
	}

	#[tokio::test]
	async fn blank_ids_are_rejected() {
		let (service, _) = service();
		let ctx = Context::background();

		assert!(matches!(service.get(&ctx, "   ").await, Err(Error::Validation { .. })));
		assert!(matches!(service.delete(&ctx, "").await, Err(Error::Validation { .. })));
	}

	#[tokio::test]
	async fn missing_records_are_not_found() {
		let (service, _) = service();
		let ctx = Context::background();

		assert!(matches!(
			service.get(&ctx, "nobody@1").await,
			Err(Error::NotFound { entity: "credential", .. })
		));
		assert!(matches!(
			service.delete(&ctx, "nobody@1").await,
			Err(Error::NotFound { entity: "credential", .. })
		));
	}

	#[tokio::test]
	async fn cancelled_context_persists_nothing() {
		let (service, store) = service();
		let ctx = Context::background();

		ctx.cancel();

		assert!(matches!(service.create(&ctx, credential("42@7700")).await, Err(Error::Cancelled)));
		assert_eq!(store.credential_count(), 0);
	}
}
