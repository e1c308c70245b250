//! Deployment and service bodies rendered from templates.
//!
//! Templates use Go text/template syntax and render to YAML, e.g.
//!
//! ```yaml
//! metadata:
//!   name: {{ .application_name }}
//! spec:
//!   template:
//!     spec:
//!       containers:
//!         - image: {{ .image }}
//! ```

use std::{
	collections::HashMap,
	fs,
	path::{Path, PathBuf},
};

use gtmpl::{Context, Template, Value as TemplateValue};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::instrument;

use super::{
	api::ResourceApi,
	upsert::{UpsertEngine, UpsertError, UpsertOutcome},
	ResourceIdentity, ResourceKind,
};
use crate::{config::DeployConfig, context::RunContext};

#[derive(Debug, Error)]
pub enum ComposeError {
	#[error("reading template {}", path.display())]
	Read {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("rendering template {}: {message}", path.display())]
	Template { path: PathBuf, message: String },

	#[error("template {} did not render to valid YAML", path.display())]
	Yaml {
		path: PathBuf,
		#[source]
		source: serde_yaml::Error,
	},

	#[error("template {} must render to a mapping", path.display())]
	NotAMapping { path: PathBuf },
}

/// Builds and reconciles the deployment and service of one application.
pub struct Composer<'a> {
	ctx: &'a RunContext,
	config: &'a DeployConfig,
	namespace: String,
}

impl<'a> Composer<'a> {
	pub fn new(ctx: &'a RunContext, config: &'a DeployConfig) -> Self {
		Self {
			ctx,
			config,
			namespace: config.namespace(ctx.environment()),
		}
	}

	pub fn namespace(&self) -> &str {
		&self.namespace
	}

	/// Image reference of the version being deployed.
	pub fn image(&self) -> String {
		format!(
			"{}/{}:{}",
			self.config.registry(),
			self.ctx.application_name(),
			self.ctx.version().version()
		)
	}

	/// Values available to templates.
	pub fn template_values(&self) -> HashMap<String, TemplateValue> {
		let version = self.ctx.version();
		let service_ip = self
			.config
			.service_ip(self.ctx.environment())
			.map(|ip| ip.to_string())
			.unwrap_or_default();

		[
			("application_name", self.ctx.application_name().to_string()),
			("version", version.version().to_string()),
			("branch", version.branch().to_string()),
			("env", self.ctx.environment().tag().to_string()),
			("namespace", self.namespace.clone()),
			("image", self.image()),
			("service_ip", service_ip),
			(
				"build_id",
				self.ctx.build_id().unwrap_or_default().to_string(),
			),
		]
		.into_iter()
		.map(|(key, value)| (key.to_string(), TemplateValue::String(value)))
		.collect()
	}

	pub fn render_deployment(&self) -> Result<Value, ComposeError> {
		self.render_file(self.config.deployment_config_path())
	}

	pub fn render_service(&self) -> Result<Value, ComposeError> {
		self.render_file(self.config.service_config_path())
	}

	fn render_file(&self, path: &Path) -> Result<Value, ComposeError> {
		let source = fs::read_to_string(path).map_err(|source| ComposeError::Read {
			path: path.to_path_buf(),
			source,
		})?;
		render_body(path, &source, self.template_values())
	}

	/// Reconcile the deployment, always named after the application.
	///
	/// The body's `metadata.name` is set to that name before it is sent.
	#[instrument(skip_all, fields(namespace = %self.namespace))]
	pub async fn upsert_deployment<A: ResourceApi>(
		&self,
		engine: &UpsertEngine<A>,
		mut body: Value,
	) -> Result<(ResourceIdentity, UpsertOutcome), UpsertError> {
		let identity = ResourceIdentity::namespaced(
			ResourceKind::Deployment,
			self.ctx.application_name(),
			&self.namespace,
		);
		set_name(&mut body, &identity.name);
		let outcome = engine
			.upsert(identity.kind, &identity.name, &self.namespace, &body)
			.await?;
		Ok((identity, outcome))
	}

	/// Reconcile the service under the name its body declares, or
	/// `{application_name}-service` when it declares none. The fallback
	/// name is written into the body so the created object carries it.
	#[instrument(skip_all, fields(namespace = %self.namespace))]
	pub async fn upsert_service<A: ResourceApi>(
		&self,
		engine: &UpsertEngine<A>,
		mut body: Value,
	) -> Result<(ResourceIdentity, UpsertOutcome), UpsertError> {
		let name = body
			.pointer("/metadata/name")
			.and_then(Value::as_str)
			.map_or_else(
				|| format!("{}-service", self.ctx.application_name()),
				str::to_string,
			);
		set_name(&mut body, &name);
		let identity = ResourceIdentity::namespaced(ResourceKind::Service, name, &self.namespace);
		let outcome = engine
			.upsert(identity.kind, &identity.name, &self.namespace, &body)
			.await?;
		Ok((identity, outcome))
	}
}

/// Set `metadata.name` of a mapping body, creating `metadata` when absent.
fn set_name(body: &mut Value, name: &str) {
	let Value::Object(map) = body else {
		return;
	};
	let metadata = map.entry("metadata").or_insert_with(|| json!({}));
	if !metadata.is_object() {
		*metadata = json!({});
	}
	metadata["name"] = json!(name);
}

/// Render `source` with `values` and parse the result as a YAML mapping.
pub fn render_body(
	path: &Path,
	source: &str,
	values: HashMap<String, TemplateValue>,
) -> Result<Value, ComposeError> {
	let template_error = |message: String| ComposeError::Template {
		path: path.to_path_buf(),
		message,
	};

	let mut tmpl = Template::default();
	tmpl.parse(source)
		.map_err(|e| template_error(format!("{:?}", e)))?;
	let rendered = tmpl
		.render(&Context::from(TemplateValue::Map(values)))
		.map_err(|e| template_error(format!("{:?}", e)))?;

	let body: Value = serde_yaml::from_str(&rendered).map_err(|source| ComposeError::Yaml {
		path: path.to_path_buf(),
		source,
	})?;
	if !body.is_object() {
		return Err(ComposeError::NotAMapping {
			path: path.to_path_buf(),
		});
	}
	Ok(body)
}
