//! HTTP-based mock Kubernetes server using wiremock.
//!
//! The server keeps created and patched objects in memory and answers list,
//! create and patch calls for the kinds in [`crate::catalog::CATALOG`] with
//! the status codes a real API server uses.

use std::{
	collections::HashMap,
	sync::{Arc, RwLock},
};

use bon::Builder;
use kube::config::{
	AuthInfo, Cluster, Context, Kubeconfig, NamedAuthInfo, NamedCluster, NamedContext,
};
use serde_json::{json, Value};
use tracing::{debug, trace};
use wiremock::{
	matchers::{method, path, path_regex},
	Mock, MockServer, Request, ResponseTemplate,
};

use super::{
	catalog::path_for_manifest,
	helpers::{merge_json, strip_strategic_merge_directives},
};

/// Type alias for the shared mutable resources map, keyed by
/// (collection path, name).
pub type SharedResources = Arc<RwLock<HashMap<(String, String), Value>>>;

/// A request the server answered with an error instead of its usual response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectedFailure {
	pub method: String,
	pub path: String,
	pub status: u16,
}

impl InjectedFailure {
	/// Fail every `method` request to exactly `path` with a 500.
	pub fn new(method: &str, path: &str) -> Self {
		Self {
			method: method.to_string(),
			path: path.to_string(),
			status: 500,
		}
	}

	pub fn with_status(self, status: u16) -> Self {
		Self { status, ..self }
	}
}

/// A mock Kubernetes server exposed over HTTP.
#[derive(Builder)]
pub struct HttpMockK8sServer {
	/// Objects present before the first request, as raw manifests.
	#[builder(default)]
	resources: Vec<Value>,
	#[builder(default)]
	failures: Vec<InjectedFailure>,
}

/// A running HTTP mock server instance.
pub struct RunningHttpMockK8sServer {
	server: MockServer,
	resources: SharedResources,
}

/// Method and path of a request the server received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedRequest {
	pub method: String,
	pub path: String,
}

impl HttpMockK8sServer {
	/// Start the mock server with all configured resources.
	pub async fn start(self) -> RunningHttpMockK8sServer {
		let server = MockServer::start().await;

		debug!(uri = %server.uri(), "Started mock K8s server");

		let mut resources: HashMap<(String, String), Value> = HashMap::new();
		for manifest in self.resources {
			if let Some(key) = path_for_manifest(&manifest) {
				trace!(api_path = %key.0, name = %key.1, "Registered resource");
				resources.insert(key, manifest);
			}
		}

		let ns_key = ("/api/v1/namespaces".to_string(), "default".to_string());
		resources.entry(ns_key).or_insert_with(|| {
			json!({
				"apiVersion": "v1",
				"kind": "Namespace",
				"metadata": {
					"name": "default"
				}
			})
		});

		let shared_resources = Arc::new(RwLock::new(resources));

		mount_version(&server).await;
		mount_failures(&server, &self.failures).await;
		mount_resources(&server, &shared_resources).await;

		RunningHttpMockK8sServer {
			server,
			resources: shared_resources,
		}
	}
}

impl RunningHttpMockK8sServer {
	/// Get the server's URI (e.g., "http://127.0.0.1:12345").
	pub fn uri(&self) -> String {
		self.server.uri()
	}

	/// Create a Kubeconfig pointing to this mock server.
	pub fn kubeconfig(&self) -> Kubeconfig {
		self.kubeconfig_with_context("mock-context")
	}

	/// Create a Kubeconfig pointing to this mock server with a custom context name.
	pub fn kubeconfig_with_context(&self, context_name: &str) -> Kubeconfig {
		let cluster_name = "mock-cluster";
		let user_name = "mock-user";

		Kubeconfig {
			clusters: vec![NamedCluster {
				name: cluster_name.to_string(),
				cluster: Some(Cluster {
					server: Some(self.uri()),
					insecure_skip_tls_verify: Some(true),
					..Default::default()
				}),
			}],
			contexts: vec![NamedContext {
				name: context_name.to_string(),
				context: Some(Context {
					cluster: cluster_name.to_string(),
					user: Some(user_name.to_string()),
					namespace: Some("default".to_string()),
					..Default::default()
				}),
			}],
			auth_infos: vec![NamedAuthInfo {
				name: user_name.to_string(),
				auth_info: Some(AuthInfo::default()),
			}],
			current_context: Some(context_name.to_string()),
			..Default::default()
		}
	}

	/// Object stored under `collection_path` and `name`, if any.
	pub fn resource(&self, collection_path: &str, name: &str) -> Option<Value> {
		let resources = self.resources.read().ok()?;
		resources
			.get(&(collection_path.to_string(), name.to_string()))
			.cloned()
	}

	/// Every request received so far, in order.
	pub async fn received_requests(&self) -> Vec<ReceivedRequest> {
		self.server
			.received_requests()
			.await
			.unwrap_or_default()
			.iter()
			.map(|req| ReceivedRequest {
				method: req.method.to_string(),
				path: req.url.path().to_string(),
			})
			.collect()
	}

	/// Number of `method` requests received for exactly `path`.
	pub async fn count(&self, method: &str, path: &str) -> usize {
		self.received_requests()
			.await
			.iter()
			.filter(|req| req.method == method && req.path == path)
			.count()
	}

	/// Number of `method` requests received for any path.
	pub async fn count_method(&self, method: &str) -> usize {
		self.received_requests()
			.await
			.iter()
			.filter(|req| req.method == method)
			.count()
	}
}

fn status_body(code: u16, reason: &str, message: String) -> Value {
	json!({
		"kind": "Status",
		"apiVersion": "v1",
		"metadata": {},
		"status": "Failure",
		"message": message,
		"reason": reason,
		"code": code
	})
}

async fn mount_version(server: &MockServer) {
	Mock::given(method("GET"))
		.and(path("/version"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({
			"major": "1",
			"minor": "28",
			"gitVersion": "v1.28.0",
			"gitCommit": "fake",
			"gitTreeState": "clean",
			"buildDate": "2024-01-01T00:00:00Z",
			"goVersion": "go1.21.0",
			"compiler": "gc",
			"platform": "linux/amd64"
		})))
		.mount(server)
		.await;
}

/// Failures take priority over the resource handlers.
async fn mount_failures(server: &MockServer, failures: &[InjectedFailure]) {
	for failure in failures {
		Mock::given(method(failure.method.as_str()))
			.and(path(failure.path.as_str()))
			.respond_with(
				ResponseTemplate::new(failure.status).set_body_json(status_body(
					failure.status,
					"InternalError",
					format!("injected failure for {} {}", failure.method, failure.path),
				)),
			)
			.with_priority(1)
			.mount(server)
			.await;
	}
}

async fn mount_resources(server: &MockServer, resources: &SharedResources) {
	let patch_resources = Arc::clone(resources);
	let post_resources = Arc::clone(resources);
	let get_resources = Arc::clone(resources);

	// PATCH merges the request body into the stored object
	Mock::given(method("PATCH"))
		.and(path_regex(r"^/api(s)?/.*"))
		.respond_with(move |req: &Request| {
			let (api_path, name) = parse_resource_path(req.url.path());
			let patch: Value = serde_json::from_slice(&req.body).unwrap_or(Value::Null);

			let mut resources = patch_resources.write().unwrap();
			let Some(existing) = resources.get(&(api_path.clone(), name.clone())) else {
				return ResponseTemplate::new(404).set_body_json(status_body(
					404,
					"NotFound",
					format!("{name} not found"),
				));
			};

			let result = strip_strategic_merge_directives(merge_json(existing.clone(), patch));
			resources.insert((api_path, name), result.clone());

			ResponseTemplate::new(200).set_body_json(result)
		})
		.mount(server)
		.await;

	// POST creates, refusing names that already exist
	Mock::given(method("POST"))
		.and(path_regex(r"^/api(s)?/.*"))
		.respond_with(move |req: &Request| {
			let api_path = req.url.path().to_string();
			let body: Value = serde_json::from_slice(&req.body).unwrap_or(Value::Null);

			let Some(name) = body.pointer("/metadata/name").and_then(Value::as_str) else {
				return ResponseTemplate::new(422).set_body_json(status_body(
					422,
					"Invalid",
					"metadata.name: Required value".to_string(),
				));
			};

			let mut resources = post_resources.write().unwrap();
			let key = (api_path, name.to_string());
			if resources.contains_key(&key) {
				return ResponseTemplate::new(409).set_body_json(status_body(
					409,
					"AlreadyExists",
					format!("{name} already exists"),
				));
			}
			resources.insert(key, body.clone());

			ResponseTemplate::new(201).set_body_json(body)
		})
		.mount(server)
		.await;

	// GET answers single objects and lists
	Mock::given(method("GET"))
		.and(path_regex(r"^/api(s)?/.*"))
		.respond_with(move |req: &Request| {
			let path_str = req.url.path();
			let resources = get_resources.read().unwrap();

			let (api_path, name) = parse_resource_path(path_str);
			if let Some(resource) = resources.get(&(api_path, name)) {
				return ResponseTemplate::new(200).set_body_json(resource.clone());
			}

			let items: Vec<_> = resources
				.iter()
				.filter(|((res_api_path, _), _)| {
					res_api_path == path_str
						|| extract_cluster_wide_path(res_api_path).as_deref() == Some(path_str)
				})
				.map(|(_, v)| v.clone())
				.collect();

			ResponseTemplate::new(200).set_body_json(json!({
				"kind": "List",
				"apiVersion": "v1",
				"metadata": {"resourceVersion": "1"},
				"items": items
			}))
		})
		.mount(server)
		.await;
}

/// Split a Kubernetes API path into (collection path, resource name).
///
/// Examples:
/// - `/api/v1/namespaces/dev/secrets/acr-auth` -> (`/api/v1/namespaces/dev/secrets`, `acr-auth`)
/// - `/api/v1/namespaces/dev` -> (`/api/v1/namespaces`, `dev`)
fn parse_resource_path(path: &str) -> (String, String) {
	let path = path.trim_end_matches('/');
	if let Some(last_slash) = path.rfind('/') {
		let api_path = &path[..last_slash];
		let name = &path[last_slash + 1..];
		(api_path.to_string(), name.to_string())
	} else {
		(path.to_string(), String::new())
	}
}

/// Extract a cluster-wide path from a namespaced API path.
///
/// Examples:
/// - `/api/v1/namespaces/dev/secrets` -> Some(`/api/v1/secrets`)
/// - `/api/v1/namespaces` -> None
fn extract_cluster_wide_path(path: &str) -> Option<String> {
	let ns_idx = path.find("/namespaces/")?;
	let before_ns = &path[..ns_idx];
	let after_ns = &path[ns_idx + "/namespaces/".len()..];
	let slash_idx = after_ns.find('/')?;
	Some(format!("{}{}", before_ns, &after_ns[slash_idx..]))
}
