//! Create-or-patch reconciliation of single resources.

use std::fmt;

use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, instrument};

use super::{
	api::{ApiError, ResourceApi},
	locator::is_needle_in_haystack,
	ResourceKind, ResourceScope,
};

/// Errors that can occur while reconciling a resource.
#[derive(Debug, Error)]
pub enum UpsertError {
	#[error("listing namespaces")]
	ListNamespaces(#[source] Box<ApiError>),

	#[error("creating namespace `{name}`")]
	CreateNamespace {
		name: String,
		#[source]
		source: Box<ApiError>,
	},

	#[error("listing {kind} resources in `{namespace}`")]
	List {
		kind: ResourceKind,
		namespace: String,
		#[source]
		source: Box<ApiError>,
	},

	#[error("creating {kind}/{name}")]
	Create {
		kind: ResourceKind,
		name: String,
		#[source]
		source: Box<ApiError>,
	},

	#[error("patching {kind}/{name}")]
	Patch {
		kind: ResourceKind,
		name: String,
		#[source]
		source: Box<ApiError>,
	},
}

/// What a reconciliation did to the live object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
	Created,
	Patched,
	/// Only reported for namespaces, which are never patched.
	AlreadyExists,
}

impl fmt::Display for UpsertOutcome {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			UpsertOutcome::Created => write!(f, "created"),
			UpsertOutcome::Patched => write!(f, "patched"),
			UpsertOutcome::AlreadyExists => write!(f, "unchanged"),
		}
	}
}

/// Engine reconciling desired bodies against the live cluster.
pub struct UpsertEngine<A> {
	api: A,
}

impl<A: ResourceApi> UpsertEngine<A> {
	pub fn new(api: A) -> Self {
		Self { api }
	}

	/// Get a reference to the underlying transport.
	pub fn api(&self) -> &A {
		&self.api
	}

	/// Create the namespace `name` unless the cluster already lists it.
	#[instrument(skip(self))]
	pub async fn ensure_namespace(&self, name: &str) -> Result<UpsertOutcome, UpsertError> {
		let namespaces = self
			.api
			.list(ResourceKind::Namespace, None)
			.await
			.map_err(|e| UpsertError::ListNamespaces(Box::new(e)))?;

		if is_needle_in_haystack(name, &namespaces) {
			debug!("namespace already exists");
			return Ok(UpsertOutcome::AlreadyExists);
		}

		let body = json!({
			"apiVersion": "v1",
			"kind": "Namespace",
			"metadata": { "name": name },
		});
		self.api
			.create(ResourceKind::Namespace, None, &body)
			.await
			.map_err(|e| UpsertError::CreateNamespace {
				name: name.to_string(),
				source: Box::new(e),
			})?;

		info!("created namespace");
		Ok(UpsertOutcome::Created)
	}

	/// Reconcile one resource: patch it when the listing contains `name`,
	/// create it otherwise.
	///
	/// Namespaced kinds bootstrap `namespace` first. Transport errors are
	/// returned as-is, nothing is retried.
	#[instrument(skip(self, body))]
	pub async fn upsert(
		&self,
		kind: ResourceKind,
		name: &str,
		namespace: &str,
		body: &Value,
	) -> Result<UpsertOutcome, UpsertError> {
		let scoped_namespace = match kind.scope() {
			ResourceScope::Namespaced => {
				self.ensure_namespace(namespace).await?;
				Some(namespace)
			}
			ResourceScope::ClusterWide => None,
		};

		let existing = self
			.api
			.list(kind, scoped_namespace)
			.await
			.map_err(|e| UpsertError::List {
				kind,
				namespace: namespace.to_string(),
				source: Box::new(e),
			})?;

		if is_needle_in_haystack(name, &existing) {
			self.api
				.patch(kind, name, scoped_namespace, body)
				.await
				.map_err(|e| UpsertError::Patch {
					kind,
					name: name.to_string(),
					source: Box::new(e),
				})?;

			info!("patched existing resource");
			Ok(UpsertOutcome::Patched)
		} else {
			self.api
				.create(kind, scoped_namespace, body)
				.await
				.map_err(|e| UpsertError::Create {
					kind,
					name: name.to_string(),
					source: Box::new(e),
				})?;

			info!("created resource");
			Ok(UpsertOutcome::Created)
		}
	}
}
