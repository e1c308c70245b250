//! Resource kinds the mock server knows how to address.

/// A kind served by the mock, with the data needed to build its API path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockKind {
	pub api_version: &'static str,
	pub kind: &'static str,
	pub plural: &'static str,
	pub namespaced: bool,
}

/// Every kind the mock server can hold.
pub const CATALOG: &[MockKind] = &[
	MockKind {
		api_version: "v1",
		kind: "Namespace",
		plural: "namespaces",
		namespaced: false,
	},
	MockKind {
		api_version: "v1",
		kind: "Secret",
		plural: "secrets",
		namespaced: true,
	},
	MockKind {
		api_version: "v1",
		kind: "Service",
		plural: "services",
		namespaced: true,
	},
	MockKind {
		api_version: "apps/v1",
		kind: "Deployment",
		plural: "deployments",
		namespaced: true,
	},
];

impl MockKind {
	/// Look up a kind by its `apiVersion` and `kind`.
	pub fn find(api_version: &str, kind: &str) -> Option<&'static MockKind> {
		CATALOG
			.iter()
			.find(|k| k.api_version == api_version && k.kind == kind)
	}

	/// Collection path of this kind, e.g. `/apis/apps/v1/namespaces/dev/deployments`.
	///
	/// Namespaced kinds without a namespace land in `default`.
	pub fn collection_path(&self, namespace: Option<&str>) -> String {
		let prefix = if self.api_version.contains('/') {
			format!("/apis/{}", self.api_version)
		} else {
			format!("/api/{}", self.api_version)
		};

		if self.namespaced {
			format!(
				"{}/namespaces/{}/{}",
				prefix,
				namespace.unwrap_or("default"),
				self.plural
			)
		} else {
			format!("{}/{}", prefix, self.plural)
		}
	}
}

/// Derive `(collection path, name)` for a manifest.
pub fn path_for_manifest(manifest: &serde_json::Value) -> Option<(String, String)> {
	let api_version = manifest.get("apiVersion")?.as_str()?;
	let kind = manifest.get("kind")?.as_str()?;
	let name = manifest.pointer("/metadata/name")?.as_str()?.to_string();
	let namespace = manifest
		.pointer("/metadata/namespace")
		.and_then(|n| n.as_str());

	let kind = MockKind::find(api_version, kind)?;
	Some((kind.collection_path(namespace), name))
}
