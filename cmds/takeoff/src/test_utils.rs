//! Common test utilities.

use std::{collections::BTreeMap, sync::Mutex};

use serde_json::{json, Value};

use crate::k8s::{
	api::{ApiError, ResourceApi},
	ResourceKind, ResourceScope,
};

/// A call received by [`RecordingApi`].
#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
	List {
		kind: ResourceKind,
		namespace: Option<String>,
	},
	Create {
		kind: ResourceKind,
		namespace: Option<String>,
		body: Value,
	},
	Patch {
		kind: ResourceKind,
		name: String,
		namespace: Option<String>,
		body: Value,
	},
}

impl ApiCall {
	pub fn kind(&self) -> ResourceKind {
		match self {
			ApiCall::List { kind, .. } | ApiCall::Create { kind, .. } | ApiCall::Patch { kind, .. } => {
				*kind
			}
		}
	}
}

type StoreKey = (ResourceKind, Option<String>);

/// An in-memory cluster for testing.
///
/// Records every call in order and keeps created resources, so later list
/// calls see them.
#[derive(Default)]
pub struct RecordingApi {
	resources: Mutex<BTreeMap<String, (StoreKey, Vec<String>)>>,
	calls: Mutex<Vec<ApiCall>>,
	rejected: Vec<ResourceKind>,
}

fn store_key(kind: ResourceKind, namespace: Option<&str>) -> StoreKey {
	match kind.scope() {
		ResourceScope::Namespaced => (kind, namespace.map(str::to_string)),
		ResourceScope::ClusterWide => (kind, None),
	}
}

fn store_id((kind, namespace): &StoreKey) -> String {
	format!("{}/{}", kind, namespace.as_deref().unwrap_or(""))
}

impl RecordingApi {
	pub fn new() -> Self {
		Self::default()
	}

	/// Builder-style method to pre-populate a namespace.
	pub fn with_namespace(self, name: &str) -> Self {
		self.with_resource(ResourceKind::Namespace, None, name)
	}

	/// Builder-style method to pre-populate a resource.
	pub fn with_resource(self, kind: ResourceKind, namespace: Option<&str>, name: &str) -> Self {
		self.insert(store_key(kind, namespace), name.to_string());
		self
	}

	/// Builder-style method making every create of `kind` fail.
	pub fn rejecting_creates_of(mut self, kind: ResourceKind) -> Self {
		self.rejected.push(kind);
		self
	}

	fn insert(&self, key: StoreKey, name: String) {
		let mut resources = self.resources.lock().unwrap();
		resources
			.entry(store_id(&key))
			.or_insert_with(|| (key, Vec::new()))
			.1
			.push(name);
	}

	/// All calls received so far, in order.
	pub fn calls(&self) -> Vec<ApiCall> {
		self.calls.lock().unwrap().clone()
	}

	pub fn creates(&self, kind: ResourceKind) -> usize {
		self.calls()
			.iter()
			.filter(|call| matches!(call, ApiCall::Create { kind: k, .. } if *k == kind))
			.count()
	}

	pub fn patches(&self, kind: ResourceKind) -> usize {
		self.calls()
			.iter()
			.filter(|call| matches!(call, ApiCall::Patch { kind: k, .. } if *k == kind))
			.count()
	}

	fn record(&self, call: ApiCall) {
		self.calls.lock().unwrap().push(call);
	}
}

impl ResourceApi for RecordingApi {
	async fn list(&self, kind: ResourceKind, namespace: Option<&str>) -> Result<Value, ApiError> {
		self.record(ApiCall::List {
			kind,
			namespace: namespace.map(str::to_string),
		});

		let key = store_key(kind, namespace);
		let resources = self.resources.lock().unwrap();
		let items: Vec<_> = resources
			.get(&store_id(&key))
			.map(|(_, names)| names.as_slice())
			.unwrap_or_default()
			.iter()
			.map(|name| json!({ "metadata": { "name": name } }))
			.collect();

		Ok(json!({ "items": items }))
	}

	async fn create(
		&self,
		kind: ResourceKind,
		namespace: Option<&str>,
		body: &Value,
	) -> Result<(), ApiError> {
		self.record(ApiCall::Create {
			kind,
			namespace: namespace.map(str::to_string),
			body: body.clone(),
		});

		if self.rejected.contains(&kind) {
			let source = serde_json::from_str::<Value>("").unwrap_err();
			return Err(ApiError::InvalidBody { kind, source });
		}
		if let Some(name) = body.pointer("/metadata/name").and_then(Value::as_str) {
			self.insert(store_key(kind, namespace), name.to_string());
		}
		Ok(())
	}

	async fn patch(
		&self,
		kind: ResourceKind,
		name: &str,
		namespace: Option<&str>,
		body: &Value,
	) -> Result<(), ApiError> {
		self.record(ApiCall::Patch {
			kind,
			name: name.to_string(),
			namespace: namespace.map(str::to_string),
			body: body.clone(),
		});
		Ok(())
	}
}
