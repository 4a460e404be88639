// std
use std::sync::atomic::{AtomicBool, Ordering};
// crates.io
use time::macros;
// self
use docbridge_core::{
	_preludet::*,
	auth::{Secret, TenantId},
	config::DemoServerConfig,
	error::ConfigError,
	service::SettingsService,
	settings::{DemoPolicy, Settings},
	store::{MemoryStore, SettingsStore},
};

fn service() -> (SettingsService, Arc<MemoryStore>) {
	let store = Arc::new(MemoryStore::default());

	(SettingsService::new(store.clone(), test_encryptor(), StdDuration::from_secs(60)), store)
}

fn tenant() -> TenantId {
	TenantId::new(TENANT).expect("Tenant fixture should be valid.")
}

fn demo_server() -> DemoServerConfig {
	DemoServerConfig {
		address: "https://demo.example.com".into(),
		secret: Secret::new("demo-secret"),
		header: "AuthorizationJwt".into(),
	}
}

#[tokio::test]
async fn reads_are_served_from_cache_until_a_write() {
	let (service, store) = service();
	let ctx = Context::background();

	service.create(&ctx, doc_server_settings()).await.expect("Create should succeed.");
	service.get(&ctx, TENANT).await.expect("First get should fill the cache.");

	let mut record = SettingsStore::fetch(store.as_ref(), &tenant())
		.await
		.expect("Store fetch should succeed.")
		.expect("Record should be stored.");

	record.address = Some("https://elsewhere.example.com/".into());

	SettingsStore::upsert(store.as_ref(), record).await.expect("Direct upsert should succeed.");

	let cached = service.get(&ctx, TENANT).await.expect("Cached get should succeed.");

	assert_eq!(cached.address.as_deref(), Some("https://docs.example.com/"));

	service
		.update(
			&ctx,
			Settings::new(tenant()).with_doc_server(
				"https://fresh.example.com",
				Secret::new(DOC_SECRET),
				"AuthorizationJwt",
			),
		)
		.await
		.expect("Update should succeed.");

	let fresh = service.get(&ctx, TENANT).await.expect("Get after update should succeed.");

	assert_eq!(fresh.address.as_deref(), Some("https://fresh.example.com/"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn readers_racing_an_update_never_see_the_old_value_afterwards() {
	let (service, _) = service();
	let service = Arc::new(service);
	let updated = Arc::new(AtomicBool::new(false));
	let ctx = Context::background();

	service.create(&ctx, doc_server_settings()).await.expect("Create should succeed.");

	let readers = (0..8)
		.map(|_| {
			let service = service.clone();
			let updated = updated.clone();

			tokio::spawn(async move {
				let ctx = Context::background();
				let mut checked = 0;

				while checked < 50 {
					let after_update = updated.load(Ordering::SeqCst);
					let settings = service.get(&ctx, TENANT).await.expect("Get should succeed.");

					if after_update {
						assert_eq!(settings.address.as_deref(), Some("https://fresh.example.com/"));

						checked += 1;
					}

					tokio::task::yield_now().await;
				}
			})
		})
		.collect::<Vec<_>>();

	tokio::time::sleep(StdDuration::from_millis(5)).await;
	service
		.update(
			&ctx,
			Settings::new(tenant()).with_doc_server(
				"https://fresh.example.com",
				Secret::new(DOC_SECRET),
				"AuthorizationJwt",
			),
		)
		.await
		.expect("Update should succeed.");
	updated.store(true, Ordering::SeqCst);

	for reader in readers {
		reader.await.expect("Reader should not panic.");
	}
}

#[tokio::test]
async fn partial_doc_server_settings_are_rejected() {
	let (service, store) = service();
	let mut settings = Settings::new(tenant());

	settings.address = Some("https://docs.example.com".into());

	let err = service
		.create(&Context::background(), settings)
		.await
		.expect_err("Address without secret and header should fail.");

	assert!(matches!(err, Error::Validation { field: "settings", .. }));
	assert_eq!(store.settings_count(), 0);
}

#[tokio::test]
async fn missing_tenants_are_not_found() {
	let (service, _) = service();
	let ctx = Context::background();

	assert!(matches!(service.get(&ctx, TENANT).await, Err(Error::NotFound { .. })));
	assert!(matches!(service.delete(&ctx, TENANT).await, Err(Error::NotFound { .. })));
}

#[test]
fn demo_policy_substitutes_during_the_trial() {
	let window = Duration::days(30);
	let policy = DemoPolicy::new(window, Some(&demo_server())).expect("Policy should build.");
	let started = macros::datetime!(2025-01-01 00:00 UTC);
	let mut settings = doc_server_settings().with_demo(true);

	settings.demo_started = Some(started);

	let during = policy
		.resolve(&settings, started + Duration::days(3))
		.expect("Demo server should resolve during the trial.");

	assert_eq!(during.address, "https://demo.example.com/");
	assert_eq!(during.secret.expose(), "demo-secret");

	let after = policy
		.resolve(&settings, started + window)
		.expect("Own server should resolve after the trial.");

	assert_eq!(after.address, "https://docs.example.com");
	assert_eq!(after.secret.expose(), DOC_SECRET);
}

#[test]
fn demo_policy_fails_closed() {
	let window = Duration::days(30);
	let now = macros::datetime!(2025-01-10 00:00 UTC);
	let unconfigured = DemoPolicy::new(window, None).expect("Policy should build.");
	let trial = Settings::new(tenant()).with_demo(true);
	let err = unconfigured.resolve(&trial, now).expect_err("Missing demo server should fail.");

	assert!(matches!(err, Error::Config(ConfigError::MissingDemoServer)));

	let configured = DemoPolicy::new(window, Some(&demo_server())).expect("Policy should build.");
	let mut expired = Settings::new(tenant()).with_demo(true);

	expired.demo_started = Some(now - Duration::days(31));

	let err = configured.resolve(&expired, now).expect_err("Expired trial without server should fail.");

	assert!(matches!(err, Error::NoSettings { .. }));
}
