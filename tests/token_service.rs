// self
use docbridge_core::{
	_preludet::*,
	auth::Secret,
	store::{CredentialStore, MemoryStore},
	service::TokenService,
};

fn service() -> (TokenService, Arc<MemoryStore>) {
	let store = Arc::new(MemoryStore::default());

	(TokenService::new(store.clone(), test_encryptor()), store)
}

#[tokio::test]
async fn create_then_get_round_trips_plaintext() {
	let (service, store) = service();
	let ctx = Context::background();
	let id = user_key();

	service
		.create(&ctx, credential(&id, "access-plain", Duration::hours(1)))
		.await
		.expect("Create should succeed.");

	let stored = CredentialStore::fetch(store.as_ref(), &id)
		.await
		.expect("Store fetch should succeed.")
		.expect("Record should be stored.");

	assert_ne!(stored.access_token, "access-plain");
	assert_ne!(stored.refresh_token, "refresh-original");

	let fetched = service.get(&ctx, &format!(" {id} ")).await.expect("Get should succeed.");

	assert_eq!(fetched.access_token.expose(), "access-plain");
	assert_eq!(fetched.refresh_token.expose(), "refresh-original");
	assert_eq!(fetched.api_domain, "https://www.zohoapis.example.com");
}

#[tokio::test]
async fn duplicate_create_is_a_validation_error() {
	let (service, _) = service();
	let ctx = Context::background();
	let id = user_key();

	service
		.create(&ctx, credential(&id, "access-1", Duration::hours(1)))
		.await
		.expect("First create should succeed.");

	let err = service
		.create(&ctx, credential(&id, "access-2", Duration::hours(1)))
		.await
		.expect_err("Second create should fail.");

	assert!(matches!(err, Error::Validation { .. }));
}

#[tokio::test]
async fn update_upserts_and_returns_persisted_credential() {
	let (service, _) = service();
	let ctx = Context::background();
	let id = user_key();
	let updated = service
		.update(&ctx, credential(&id, "access-upserted", Duration::hours(1)))
		.await
		.expect("Update should upsert a missing credential.");

	assert_eq!(updated.access_token.expose(), "access-upserted");

	let fetched = service.get(&ctx, &id).await.expect("Get should succeed.");

	assert_eq!(fetched.access_token.expose(), "access-upserted");
}

#[tokio::test]
async fn invalid_credentials_never_reach_the_store() {
	let (service, store) = service();
	let ctx = Context::background();
	let mut invalid = credential(&user_key(), "access", Duration::hours(1));

	invalid.refresh_token = Secret::new("   ");

	let err = service.create(&ctx, invalid).await.expect_err("Blank refresh token should fail.");

	assert!(matches!(err, Error::Validation { .. }));
	assert_eq!(store.credential_count(), 0);
}

#[tokio::test]
async fn credentials_without_scope_or_type_never_reach_the_store() {
	let (service, store) = service();
	let ctx = Context::background();
	let mut no_scope = credential(&user_key(), "access", Duration::hours(1));

	no_scope.scope = String::new();

	let err = service.update(&ctx, no_scope).await.expect_err("Blank scope should fail.");

	assert!(matches!(err, Error::Validation { field: "scope", .. }), "Unexpected error {err:?}.");

	let mut no_type = credential(&user_key(), "access", Duration::hours(1));

	no_type.token_type = " ".into();

	let err = service.create(&ctx, no_type).await.expect_err("Blank token type should fail.");

	assert!(
		matches!(err, Error::Validation { field: "token_type", .. }),
		"Unexpected error {err:?}."
	);
	assert_eq!(store.credential_count(), 0);
}

#[tokio::test]
async fn delete_reports_missing_records() {
	let (service, _) = service();
	let ctx = Context::background();
	let id = user_key();

	service
		.create(&ctx, credential(&id, "access", Duration::hours(1)))
		.await
		.expect("Create should succeed.");
	service.delete(&ctx, &id).await.expect("Delete should succeed.");

	let err = service.delete(&ctx, &id).await.expect_err("Second delete should fail.");

	assert!(matches!(err, Error::NotFound { entity: "credential", .. }));
	assert!(matches!(service.get(&ctx, &id).await, Err(Error::NotFound { .. })));
}
