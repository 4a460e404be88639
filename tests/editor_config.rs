// crates.io
use serde_json::Value;
// self
use docbridge_core::{
	_preludet::*,
	auth::{Secret, TenantId},
	config::DemoServerConfig,
	crypto::{JwtSigner, Signer},
	flows::BuildConfigRequest,
	settings::Settings,
};

const IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) Mobile/15E148";

fn request(filename: &str) -> BuildConfigRequest {
	BuildConfigRequest {
		user: USER.into(),
		tenant: TENANT.into(),
		deal_id: "deal-9".into(),
		file_id: "file-1".into(),
		filename: filename.into(),
		doc_key: "file-1-rev-3".into(),
		user_agent: IPHONE.into(),
	}
}

async fn seeded(harness: &TestBridge) {
	seed_credential(&harness.bridge, "access-fresh", Duration::hours(1)).await;
	seed_settings(&harness.bridge, doc_server_settings()).await;
}

#[tokio::test]
async fn builds_a_signed_config() {
	let harness = default_test_bridge();

	seeded(&harness).await;

	let config = harness
		.bridge
		.editor()
		.build_config(&Context::background(), request(r"reports/q3 plan.docx"))
		.await
		.expect("Config should build.");

	assert_eq!(config.document.file_type, "docx");
	assert_eq!(config.document.title, "reports:q3 plan.docx");
	assert_eq!(config.document.key, "file-1-rev-3");
	assert_eq!(config.document.url, harness.files.download_url().as_str());
	assert!(config.document.permissions.edit);
	assert_eq!(config.document_type, "word");
	assert_eq!(config.device, "mobile");
	assert_eq!(config.server_url, "https://docs.example.com/");
	assert_eq!(config.editor_config.user.id, "42@7700");
	assert_eq!(config.editor_config.user.name, "Ada Lovelace");
	assert_eq!(config.editor_config.lang, "de");
	assert_eq!(config.editor_config.region, "de-AT");
	assert_eq!(harness.identity.tokens(), vec!["access-fresh".to_owned()]);

	let callback =
		Url::parse(&config.editor_config.callback_url).expect("Callback URL should parse.");
	let query = callback.query_pairs().into_owned().collect::<HashMap<_, _>>();

	assert_eq!(callback.path(), "/callback");
	assert_eq!(query.get("cid").map(String::as_str), Some(TENANT));
	assert_eq!(query.get("did").map(String::as_str), Some("deal-9"));
	assert_eq!(query.get("fid").map(String::as_str), Some("file-1"));
	assert_eq!(query.get("filename").map(String::as_str), Some("reports:q3 plan.docx"));

	let now = OffsetDateTime::now_utc().unix_timestamp();

	assert!(config.exp > now && config.exp <= now + 240);

	let token = config.token.clone().expect("Config should be signed.");
	let signer: Arc<dyn Signer> = Arc::new(JwtSigner);
	let claims: Value =
		signer.verify_json(DOC_SECRET, &token).expect("Token should verify with the tenant secret.");

	assert_eq!(claims["document"]["key"], "file-1-rev-3");
	assert_eq!(claims["editorConfig"]["user"]["id"], "42@7700");
	assert!(claims.get("token").is_none());
	assert!(signer.verify_json::<Value>("other-secret", &token).is_err());
}

#[tokio::test]
async fn read_only_formats_disable_editing() {
	let harness = default_test_bridge();

	seeded(&harness).await;

	let config = harness
		.bridge
		.editor()
		.build_config(&Context::background(), request("scan.pdf"))
		.await
		.expect("Config should build.");

	assert!(!config.document.permissions.edit);
	assert!(config.document.permissions.download);
}

#[tokio::test]
async fn unsupported_formats_fail_before_any_lookup() {
	let harness = default_test_bridge();

	seeded(&harness).await;

	let err = harness
		.bridge
		.editor()
		.build_config(&Context::background(), request("archive.zip"))
		.await
		.expect_err("Unknown extension should fail.");

	assert!(matches!(err, Error::UnsupportedFormat { ref extension } if extension == "zip"));
	assert!(harness.identity.tokens().is_empty());
	assert_eq!(harness.refresh.calls(), 0);
}

#[tokio::test]
async fn missing_settings_fail_with_no_settings() {
	let harness = default_test_bridge();

	seed_credential(&harness.bridge, "access-fresh", Duration::hours(1)).await;

	let err = harness
		.bridge
		.editor()
		.build_config(&Context::background(), request("notes.docx"))
		.await
		.expect_err("Missing settings should fail.");

	assert!(matches!(err, Error::NoSettings { .. }));
}

#[tokio::test]
async fn identity_failures_are_reported_without_a_partial_config() {
	let harness = build_test_bridge(
		test_config(),
		FakeRefreshProvider::default(),
		FakeIdentity::default().failing(Error::Unauthorized { reason: "token revoked".into() }),
		FakeFiles::default(),
	);

	seeded(&harness).await;

	let err = harness
		.bridge
		.editor()
		.build_config(&Context::background(), request("notes.docx"))
		.await
		.expect_err("Identity failure should fail the build.");

	assert!(matches!(err, Error::Unauthorized { .. }));
}

#[tokio::test]
async fn slow_branches_hit_the_fanout_deadline() {
	let mut config = test_config();

	config.editor.fanout_timeout_ms = 30;

	let harness = build_test_bridge(
		config,
		FakeRefreshProvider::default(),
		FakeIdentity::default().with_delay(StdDuration::from_secs(2)),
		FakeFiles::default(),
	);

	seeded(&harness).await;

	let err = harness
		.bridge
		.editor()
		.build_config(&Context::background(), request("notes.docx"))
		.await
		.expect_err("Slow identity lookup should time out.");

	assert!(matches!(err, Error::DeadlineExceeded), "Unexpected error {err:?}.");
}

#[tokio::test]
async fn missing_locale_falls_back_to_defaults() {
	let harness = build_test_bridge(
		test_config(),
		FakeRefreshProvider::default(),
		FakeIdentity::default().with_locale(None, Some("")),
		FakeFiles::default(),
	);

	seeded(&harness).await;

	let config = harness
		.bridge
		.editor()
		.build_config(&Context::background(), request("budget.xlsx"))
		.await
		.expect("Config should build.");

	assert_eq!(config.document_type, "cell");
	assert_eq!(config.editor_config.lang, "en");
	assert_eq!(config.editor_config.region, "en-US");
}

#[tokio::test]
async fn demo_tenants_use_the_operator_server() {
	let mut config = test_config();

	config.demo = Some(DemoServerConfig {
		address: "https://demo.example.com".into(),
		secret: Secret::new("demo-secret"),
		header: "AuthorizationJwt".into(),
	});

	let harness = build_test_bridge(
		config,
		FakeRefreshProvider::default(),
		FakeIdentity::default(),
		FakeFiles::default(),
	);

	seed_credential(&harness.bridge, "access-fresh", Duration::hours(1)).await;
	seed_settings(
		&harness.bridge,
		Settings::new(TenantId::new(TENANT).expect("Tenant fixture should be valid.")).with_demo(true),
	)
	.await;

	let built = harness
		.bridge
		.editor()
		.build_config(&Context::background(), request("slides.pptx"))
		.await
		.expect("Demo config should build.");

	assert_eq!(built.server_url, "https://demo.example.com/");

	let signer: Arc<dyn Signer> = Arc::new(JwtSigner);

	assert!(
		signer
			.verify_json::<Value>("demo-secret", built.token.as_deref().unwrap_or_default())
			.is_ok()
	);
}
