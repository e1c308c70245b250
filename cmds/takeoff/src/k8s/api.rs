//! Uniform list/create/patch access to the resource kinds a deploy touches.

use std::future::Future;

use kube::{
	api::{Api, DynamicObject, ListParams, Patch, PatchParams, PostParams},
	Client,
};
use serde_json::Value;
use thiserror::Error;

use super::{ResourceKind, ResourceScope};

/// Errors raised by the cluster transport.
#[derive(Debug, Error)]
pub enum ApiError {
	#[error(transparent)]
	Kube(#[from] kube::Error),

	#[error("desired {kind} body is not a valid Kubernetes object")]
	InvalidBody {
		kind: ResourceKind,
		#[source]
		source: serde_json::Error,
	},

	#[error("encoding {kind} listing")]
	Listing {
		kind: ResourceKind,
		#[source]
		source: serde_json::Error,
	},
}

/// Cluster calls the reconciliation engine is built on.
///
/// `namespace` is ignored for cluster-wide kinds. Implementations must not
/// retry: every call maps to exactly one request.
pub trait ResourceApi {
	/// List resources of `kind`, returning the raw listing with an `items` array.
	fn list(
		&self,
		kind: ResourceKind,
		namespace: Option<&str>,
	) -> impl Future<Output = Result<Value, ApiError>> + Send;

	fn create(
		&self,
		kind: ResourceKind,
		namespace: Option<&str>,
		body: &Value,
	) -> impl Future<Output = Result<(), ApiError>> + Send;

	fn patch(
		&self,
		kind: ResourceKind,
		name: &str,
		namespace: Option<&str>,
		body: &Value,
	) -> impl Future<Output = Result<(), ApiError>> + Send;
}

/// [`ResourceApi`] backed by a live cluster.
#[derive(Clone)]
pub struct KubeResourceApi {
	client: Client,
}

impl KubeResourceApi {
	pub fn new(client: Client) -> Self {
		Self { client }
	}

	fn dynamic_api(&self, kind: ResourceKind, namespace: Option<&str>) -> Api<DynamicObject> {
		let ar = kind.api_resource();
		match (kind.scope(), namespace) {
			(ResourceScope::Namespaced, Some(ns)) => {
				Api::namespaced_with(self.client.clone(), ns, &ar)
			}
			_ => Api::all_with(self.client.clone(), &ar),
		}
	}
}

impl ResourceApi for KubeResourceApi {
	async fn list(&self, kind: ResourceKind, namespace: Option<&str>) -> Result<Value, ApiError> {
		let list = self
			.dynamic_api(kind, namespace)
			.list(&ListParams::default())
			.await?;

		let items = list
			.items
			.iter()
			.map(serde_json::to_value)
			.collect::<Result<Vec<_>, _>>()
			.map_err(|source| ApiError::Listing { kind, source })?;

		Ok(serde_json::json!({ "items": items }))
	}

	async fn create(
		&self,
		kind: ResourceKind,
		namespace: Option<&str>,
		body: &Value,
	) -> Result<(), ApiError> {
		let obj: DynamicObject = serde_json::from_value(body.clone())
			.map_err(|source| ApiError::InvalidBody { kind, source })?;

		self.dynamic_api(kind, namespace)
			.create(&PostParams::default(), &obj)
			.await?;
		Ok(())
	}

	async fn patch(
		&self,
		kind: ResourceKind,
		name: &str,
		namespace: Option<&str>,
		body: &Value,
	) -> Result<(), ApiError> {
		self.dynamic_api(kind, namespace)
			.patch(name, &PatchParams::default(), &Patch::Strategic(body))
			.await?;
		Ok(())
	}
}
