#![cfg(feature = "reqwest")]

// crates.io
use bytes::Bytes;
use httpmock::prelude::*;
// self
use docbridge_core::{
	_preludet::*,
	auth::Credential,
	http::CrmHttpClient,
	provider::{FileTransfer, IdentityLookup, UploadTarget},
};

fn credential_for(server: &MockServer) -> Credential {
	let mut credential = credential(&user_key(), "access-fresh", Duration::hours(1));

	credential.api_domain = server.base_url();

	credential
}

fn client() -> CrmHttpClient {
	CrmHttpClient::new().expect("CRM client should build.")
}

#[tokio::test]
async fn identity_lookup_reads_the_profile() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/v1/users/me").header("authorization", "Bearer access-fresh");
			then.status(200).header("content-type", "application/json").body(
				"{\"data\":{\"id\":42,\"company_id\":7700,\"name\":\"Ada Lovelace\",\"email\":\"ada@example.com\",\"language\":{\"language_code\":\"de\",\"country_code\":\"AT\"}}}",
			);
		})
		.await;
	let identity = client()
		.lookup(&Context::background(), &credential_for(&server))
		.await
		.expect("Lookup should succeed.");

	mock.assert_async().await;

	assert_eq!(identity.id, "42");
	assert_eq!(identity.tenant, "7700");
	assert_eq!(identity.name, "Ada Lovelace");
	assert_eq!(identity.language.as_deref(), Some("de"));
	assert_eq!(identity.country.as_deref(), Some("AT"));
}

#[tokio::test]
async fn rejected_tokens_are_unauthorized() {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(GET).path("/api/v1/users/me");
			then.status(401);
		})
		.await;

	let err = client()
		.lookup(&Context::background(), &credential_for(&server))
		.await
		.expect_err("Rejected token should fail.");

	assert!(matches!(err, Error::Unauthorized { .. }), "Unexpected error {err:?}.");
}

#[tokio::test]
async fn malformed_profiles_name_the_failing_field() {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(GET).path("/api/v1/users/me");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"data\":{\"id\":\"forty-two\",\"company_id\":7700,\"name\":\"Ada\"}}");
		})
		.await;

	let err = client()
		.lookup(&Context::background(), &credential_for(&server))
		.await
		.expect_err("Malformed profile should fail.");

	assert!(err.to_string().contains("data.id"), "Unexpected error {err}.");
}

#[tokio::test]
async fn download_urls_come_from_the_redirect() {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(GET).path("/api/v1/files/file-1/download");
			then.status(302).header("location", "https://files.example.com/dl/file-1?sig=abc");
		})
		.await;

	let url = client()
		.resolve_download_url(&Context::background(), &credential_for(&server), "file-1")
		.await
		.expect("Download URL should resolve.");

	assert_eq!(url.as_str(), "https://files.example.com/dl/file-1?sig=abc");
}

#[tokio::test]
async fn missing_redirects_are_malformed_responses() {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(GET).path("/api/v1/files/file-1/download");
			then.status(200);
		})
		.await;

	let err = client()
		.resolve_download_url(&Context::background(), &credential_for(&server), "file-1")
		.await
		.expect_err("Response without Location should fail.");

	assert!(err.is_retryable(), "Unexpected error {err:?}.");
}

#[tokio::test]
async fn downloads_return_the_body() {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(GET).path("/dl/file-1");
			then.status(200).body("edited document");
		})
		.await;

	let url = Url::parse(&server.url("/dl/file-1")).expect("Mock URL should parse.");
	let body = client()
		.download(&Context::background(), &url, 1_024)
		.await
		.expect("Download should succeed.");

	assert_eq!(&body[..], b"edited document");
}

#[tokio::test]
async fn downloads_stop_once_the_limit_is_passed() {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(GET).path("/dl/file-1");
			then.status(200).body(vec![b'x'; 4_096]);
		})
		.await;

	let url = Url::parse(&server.url("/dl/file-1")).expect("Mock URL should parse.");
	let err = client()
		.download(&Context::background(), &url, 1_024)
		.await
		.expect_err("Oversized download should fail.");

	assert!(matches!(err, Error::FileTooLarge { limit: 1_024, .. }), "Unexpected error {err:?}.");
	assert!(!err.is_retryable());
}

#[tokio::test]
async fn uploads_rename_then_attach() {
	let server = MockServer::start_async().await;
	let rename = server
		.mock_async(|when, then| {
			when.method(PUT)
				.path("/api/v1/files/file-1")
				.header("authorization", "Bearer access-fresh")
				.body_includes("name=q3-plan.docx");
			then.status(200);
		})
		.await;
	let attach = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/api/v1/files")
				.header("authorization", "Bearer access-fresh")
				.body_includes("edited document")
				.body_includes("deal-9");
			then.status(201);
		})
		.await;
	let target = UploadTarget {
		deal_id: "deal-9".into(),
		file_id: "file-1".into(),
		filename: "q3-plan.docx".into(),
	};

	client()
		.upload(
			&Context::background(),
			&credential_for(&server),
			Bytes::from_static(b"edited document"),
			&target,
		)
		.await
		.expect("Upload should succeed.");

	rename.assert_async().await;
	attach.assert_async().await;
}

#[tokio::test]
async fn failed_renames_skip_the_attach() {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(PUT).path("/api/v1/files/file-1");
			then.status(503);
		})
		.await;

	let attach = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/v1/files");
			then.status(201);
		})
		.await;
	let target = UploadTarget {
		deal_id: "deal-9".into(),
		file_id: "file-1".into(),
		filename: "q3-plan.docx".into(),
	};
	let err = client()
		.upload(
			&Context::background(),
			&credential_for(&server),
			Bytes::from_static(b"edited document"),
			&target,
		)
		.await
		.expect_err("Failed rename should fail the upload.");

	assert!(err.is_retryable(), "Unexpected error {err:?}.");

	attach.assert_calls_async(0).await;
}
