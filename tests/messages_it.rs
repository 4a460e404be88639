// crates.io
use serde_json::json;
// self
use docbridge_core::{
	_preludet::*,
	message::{CREDENTIAL_TOPIC, LIFECYCLE_TOPIC, SETTINGS_TOPIC},
	queue::QueueError,
};

fn bytes(value: serde_json::Value) -> Vec<u8> {
	serde_json::to_vec(&value).expect("Fixture should serialize.")
}

#[tokio::test]
async fn credential_upserts_and_deletes_reach_the_store() {
	let harness = default_test_bridge();
	let ctx = Context::background();
	let expires = OffsetDateTime::now_utc().unix_timestamp() + 3_600;

	harness
		.bridge
		.messages()
		.dispatch(
			&ctx,
			CREDENTIAL_TOPIC,
			&bytes(json!({
				"type": "upsert",
				"user": "42@7700",
				"access_token": "access-from-queue",
				"refresh_token": "refresh-from-queue",
				"token_type": "Bearer",
				"scope": "ZohoCRM.modules.ALL",
				"api_domain": "https://www.zohoapis.example.com",
				"expires_at_unix": expires,
			})),
		)
		.await
		.expect("Upsert should apply.");

	let stored = harness.bridge.tokens().get(&ctx, "42@7700").await.expect("Credential should exist.");

	assert_eq!(stored.access_token.expose(), "access-from-queue");
	assert_eq!(stored.expires_at.unix_timestamp(), expires);
	assert_eq!(harness.store.credential_count(), 1);

	harness
		.bridge
		.messages()
		.dispatch(&ctx, CREDENTIAL_TOPIC, &bytes(json!({ "type": "delete", "user": "42@7700" })))
		.await
		.expect("Delete should apply.");

	assert_eq!(harness.store.credential_count(), 0);
}

#[tokio::test]
async fn settings_upserts_replace_the_cached_copy() {
	let harness = default_test_bridge();
	let ctx = Context::background();

	seed_settings(&harness.bridge, doc_server_settings()).await;
	harness.bridge.settings().get(&ctx, TENANT).await.expect("Get should warm the cache.");
	harness
		.bridge
		.messages()
		.dispatch(
			&ctx,
			SETTINGS_TOPIC,
			&bytes(json!({
				"type": "upsert",
				"tenant": TENANT,
				"address": "https://moved.example.com",
				"secret": "moved-secret",
				"header": "Authorization",
			})),
		)
		.await
		.expect("Settings upsert should apply.");

	let settings = harness.bridge.settings().get(&ctx, TENANT).await.expect("Settings should exist.");

	assert_eq!(settings.address.as_deref(), Some("https://moved.example.com/"));
	assert_eq!(settings.header.as_deref(), Some("Authorization"));
	assert!(!settings.demo_enabled);
}

#[tokio::test]
async fn uninstall_is_idempotent() {
	let harness = default_test_bridge();
	let ctx = Context::background();
	let uninstall = bytes(json!({ "type": "uninstall", "user": USER, "tenant": TENANT }));

	seed_credential(&harness.bridge, "access-fresh", Duration::hours(1)).await;
	seed_settings(&harness.bridge, doc_server_settings()).await;

	for _ in 0..2 {
		harness
			.bridge
			.messages()
			.dispatch(&ctx, LIFECYCLE_TOPIC, &uninstall)
			.await
			.expect("Uninstall should succeed every time.");
	}

	assert_eq!(harness.store.credential_count(), 0);
	assert_eq!(harness.store.settings_count(), 0);
}

#[tokio::test]
async fn unknown_topics_and_bad_payloads_touch_nothing() {
	let harness = default_test_bridge();
	let ctx = Context::background();
	let err = harness
		.bridge
		.messages()
		.dispatch(&ctx, "docbridge-unknown", b"{}")
		.await
		.expect_err("Unknown topic should fail.");

	assert!(matches!(err, Error::Queue(QueueError::UnknownTopic { .. })));

	let err = harness
		.bridge
		.messages()
		.dispatch(
			&ctx,
			CREDENTIAL_TOPIC,
			&bytes(json!({ "type": "upsert", "user": "42@7700", "expires_at_unix": "soon" })),
		)
		.await
		.expect_err("Malformed payload should fail.");

	assert!(matches!(err, Error::Queue(QueueError::Decode { .. })), "Unexpected error {err:?}.");
	assert_eq!(harness.store.credential_count(), 0);
}

#[tokio::test]
async fn credential_upserts_require_a_scope() {
	let harness = default_test_bridge();
	let err = harness
		.bridge
		.messages()
		.dispatch(
			&Context::background(),
			CREDENTIAL_TOPIC,
			&bytes(json!({
				"type": "upsert",
				"user": "42@7700",
				"access_token": "access-from-queue",
				"refresh_token": "refresh-from-queue",
				"token_type": "Bearer",
				"api_domain": "https://www.zohoapis.example.com",
				"expires_at_unix": OffsetDateTime::now_utc().unix_timestamp() + 3_600,
			})),
		)
		.await
		.expect_err("Upsert without scope should fail.");

	assert!(matches!(err, Error::Queue(QueueError::Decode { .. })), "Unexpected error {err:?}.");
	assert_eq!(harness.store.credential_count(), 0);
}

#[tokio::test]
async fn deleting_missing_records_reports_not_found() {
	let harness = default_test_bridge();
	let err = harness
		.bridge
		.messages()
		.dispatch(
			&Context::background(),
			SETTINGS_TOPIC,
			&bytes(json!({ "type": "delete", "tenant": TENANT })),
		)
		.await
		.expect_err("Missing settings should fail.");

	assert!(matches!(err, Error::NotFound { .. }));
}
