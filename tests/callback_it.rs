// crates.io
use serde_json::json;
// self
use docbridge_core::{
	_preludet::*,
	crypto::{JwtSigner, Signer},
	flows::{CallbackBody, CallbackOutcome, CallbackQuery, CallbackResponse},
};

fn query() -> CallbackQuery {
	CallbackQuery {
		cid: TENANT.into(),
		did: "deal-9".into(),
		fid: "file-1".into(),
		filename: "q3 plan.docx".into(),
	}
}

fn signed(secret: &str, claims: serde_json::Value) -> CallbackBody {
	let signer: Arc<dyn Signer> = Arc::new(JwtSigner);

	CallbackBody { token: signer.sign_json(secret, &claims).expect("Claims should sign.") }
}

fn save_claims(status: i64) -> serde_json::Value {
	json!({
		"key": "file-1-rev-3",
		"status": status,
		"url": "https://docs.example.com/cache/q3.docx",
		"users": ["42@7700"],
	})
}

async fn seeded(files: FakeFiles) -> TestBridge {
	let harness =
		build_test_bridge(test_config(), FakeRefreshProvider::default(), FakeIdentity::default(), files);

	seed_settings(&harness.bridge, doc_server_settings()).await;

	harness
}

#[tokio::test]
async fn save_statuses_enqueue_an_upload() {
	for status in [2, 6] {
		let harness = seeded(FakeFiles::default()).await;
		let result = harness
			.bridge
			.callbacks()
			.handle(&Context::background(), query(), signed(DOC_SECRET, save_claims(status)))
			.await;

		assert_eq!(CallbackResponse::for_result(&result), (200, CallbackResponse { error: 0 }));

		let Ok(CallbackOutcome::Enqueued(job)) = result else {
			panic!("Status {status} should enqueue an upload.");
		};

		assert_eq!(job.user, "42@7700");
		assert_eq!(job.deal_id, "deal-9");
		assert_eq!(job.file_id, "file-1");
		assert_eq!(job.filename, "q3 plan.docx");
		assert_eq!(job.url.as_str(), "https://docs.example.com/cache/q3.docx");
		assert_eq!(harness.queue.pending(&harness.bridge.config().upload.topic), 1);
	}
}

#[tokio::test]
async fn other_statuses_are_acknowledged_without_work() {
	let harness = seeded(FakeFiles::default()).await;
	let outcome = harness
		.bridge
		.callbacks()
		.handle(
			&Context::background(),
			query(),
			signed(DOC_SECRET, json!({ "key": "file-1-rev-3", "status": 1, "users": ["42@7700"] })),
		)
		.await
		.expect("Editing status should be accepted.");

	assert_eq!(outcome, CallbackOutcome::Ignored { status: 1 });
	assert_eq!(harness.queue.pending(&harness.bridge.config().upload.topic), 0);
}

#[tokio::test]
async fn forged_tokens_are_rejected() {
	let harness = seeded(FakeFiles::default()).await;
	let result = harness
		.bridge
		.callbacks()
		.handle(&Context::background(), query(), signed("attacker-secret", save_claims(2)))
		.await;

	assert!(matches!(result, Err(Error::Signature { .. })), "Unexpected result {result:?}.");
	assert_eq!(CallbackResponse::for_result(&result), (403, CallbackResponse { error: 1 }));
	assert_eq!(harness.queue.pending(&harness.bridge.config().upload.topic), 0);
}

#[tokio::test]
async fn save_callbacks_without_url_are_invalid() {
	let harness = seeded(FakeFiles::default()).await;
	let err = harness
		.bridge
		.callbacks()
		.handle(
			&Context::background(),
			query(),
			signed(DOC_SECRET, json!({ "key": "file-1-rev-3", "status": 2, "users": ["42@7700"] })),
		)
		.await
		.expect_err("Save without url should fail.");

	assert!(matches!(err, Error::Validation { field: "url", .. }));
}

#[tokio::test]
async fn incomplete_queries_are_rejected_before_verification() {
	let harness = seeded(FakeFiles::default()).await;
	let err = harness
		.bridge
		.callbacks()
		.handle(
			&Context::background(),
			CallbackQuery { fid: String::new(), ..query() },
			signed(DOC_SECRET, save_claims(2)),
		)
		.await
		.expect_err("Missing file id should fail.");

	assert!(matches!(err, Error::Validation { field: "fid", .. }));
}

#[tokio::test]
async fn oversized_saves_are_reported_to_the_document_server() {
	let harness = seeded(FakeFiles::default().reporting_size(25_000_000)).await;
	let result = harness
		.bridge
		.callbacks()
		.handle(&Context::background(), query(), signed(DOC_SECRET, save_claims(2)))
		.await;

	assert!(matches!(result, Err(Error::FileTooLarge { .. })));
	assert_eq!(CallbackResponse::for_result(&result), (400, CallbackResponse { error: 1 }));
	assert_eq!(harness.queue.pending(&harness.bridge.config().upload.topic), 0);
}

#[tokio::test]
async fn unknown_tenants_have_no_settings() {
	let harness = default_test_bridge();
	let err = harness
		.bridge
		.callbacks()
		.handle(&Context::background(), query(), signed(DOC_SECRET, save_claims(2)))
		.await
		.expect_err("Tenant without settings should fail.");

	assert!(matches!(err, Error::NoSettings { .. }));
}
