//! Collaborator contracts for the CRM and the document server.
//!
//! `strategy` classifies provider failures into the crate's error taxonomy without
//! tying callers to any HTTP client. The traits below are the seams the flows
//! depend on; [`crate::oauth`] and [`crate::http`] provide reqwest-backed versions.

pub mod strategy;

pub use strategy::*;

// crates.io
use bytes::Bytes;
// self
use crate::{
	_prelude::*,
	auth::{Credential, Secret, TokenSet},
};

/// Boxed future returned by provider operations.
pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Exchanges a refresh token for a new token set.
pub trait TokenRefreshProvider
where
	Self: Send + Sync,
{
	/// Performs the refresh; must reject a blank token without any network call.
	fn refresh<'a>(
		&'a self,
		ctx: &'a Context,
		refresh_token: &'a Secret,
	) -> ProviderFuture<'a, TokenSet>;
}

/// Looks up the CRM profile behind a credential.
pub trait IdentityLookup
where
	Self: Send + Sync,
{
	/// Returns the profile of the user owning `credential`.
	fn lookup<'a>(
		&'a self,
		ctx: &'a Context,
		credential: &'a Credential,
	) -> ProviderFuture<'a, UserIdentity>;
}

/// Moves file bytes between the CRM and the document server.
pub trait FileTransfer
where
	Self: Send + Sync,
{
	/// Resolves a URL the document server can download `file_id` from.
	fn resolve_download_url<'a>(
		&'a self,
		ctx: &'a Context,
		credential: &'a Credential,
		file_id: &'a str,
	) -> ProviderFuture<'a, Url>;

	/// Returns the size reported for `url` without downloading the body.
	fn probe_size<'a>(&'a self, ctx: &'a Context, url: &'a Url) -> ProviderFuture<'a, u64>;

	/// Downloads the file at `url`, failing with [`Error::FileTooLarge`] as soon as more
	/// than `limit` bytes arrive.
	fn download<'a>(
		&'a self,
		ctx: &'a Context,
		url: &'a Url,
		limit: u64,
	) -> ProviderFuture<'a, Bytes>;

	/// Stores `file` in the CRM as described by `target`.
	fn upload<'a>(
		&'a self,
		ctx: &'a Context,
		credential: &'a Credential,
		file: Bytes,
		target: &'a UploadTarget,
	) -> ProviderFuture<'a, ()>;
}

/// CRM profile of the user opening a document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
	/// CRM user id.
	pub id: String,
	/// CRM company id.
	pub tenant: String,
	/// Display name.
	pub name: String,
	/// Email address.
	pub email: String,
	/// Two-letter language code, when the profile has one.
	pub language: Option<String>,
	/// Two-letter country code, when the profile has one.
	pub country: Option<String>,
}

/// Where a saved document goes in the CRM.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadTarget {
	/// Deal the file is attached to.
	pub deal_id: String,
	/// Existing CRM file the upload replaces.
	pub file_id: String,
	/// Name the file is stored under.
	pub filename: String,
}
