//! Desired bodies for secrets synthesized from credentials.

use std::{collections::BTreeMap, io};

use base64::{engine::general_purpose::STANDARD, Engine};
use k8s_openapi::{
	api::core::v1::Secret as SecretResource,
	apimachinery::pkg::apis::meta::v1::ObjectMeta,
	ByteString,
};
use serde::Serialize;

use crate::credentials::{RegistryCredentials, Secret};

/// Secret type of plain application secrets.
pub const OPAQUE_SECRET_TYPE: &str = "Opaque";

/// Secret type of registry pull credentials.
pub const DOCKER_CONFIG_JSON_TYPE: &str = "kubernetes.io/dockerconfigjson";

/// Data key holding the docker config of a registry secret.
pub const DOCKER_CONFIG_JSON_KEY: &str = ".dockerconfigjson";

/// One registry secret exists per namespace, shared by every application in it.
pub const REGISTRY_SECRET_NAME: &str = "acr-auth";

/// Name of the secret carrying an application's vault secrets.
pub fn application_secret_name(application_name: &str) -> String {
	format!("{application_name}-secret")
}

/// Build the `Opaque` secret holding `secrets` for an application.
///
/// Only `metadata.name`, `type` and `data` are set. Values are stored as raw
/// bytes and base64-encoded on serialization. When keys repeat, the last
/// value wins.
pub fn build_secret_body(application_name: &str, secrets: &[Secret]) -> SecretResource {
	let data: BTreeMap<_, _> = secrets
		.iter()
		.map(|secret| (secret.key.clone(), ByteString(secret.value.clone())))
		.collect();

	sparse_secret(
		application_secret_name(application_name),
		OPAQUE_SECRET_TYPE,
		data,
	)
}

/// Build the `acr-auth` pull secret for a container registry.
pub fn build_registry_secret_body(
	credentials: &RegistryCredentials,
) -> Result<SecretResource, serde_json::Error> {
	let data = BTreeMap::from([(
		DOCKER_CONFIG_JSON_KEY.to_string(),
		ByteString(docker_config_json(credentials)?),
	)]);

	Ok(sparse_secret(
		REGISTRY_SECRET_NAME.to_string(),
		DOCKER_CONFIG_JSON_TYPE,
		data,
	))
}

fn sparse_secret(
	name: String,
	type_: &str,
	data: BTreeMap<String, ByteString>,
) -> SecretResource {
	SecretResource {
		metadata: ObjectMeta {
			name: Some(name),
			..ObjectMeta::default()
		},
		type_: Some(type_.to_string()),
		data: Some(data),
		..SecretResource::default()
	}
}

#[derive(Serialize)]
struct DockerConfig<'a> {
	auths: BTreeMap<&'a str, DockerAuth<'a>>,
}

#[derive(Serialize)]
struct DockerAuth<'a> {
	username: &'a str,
	password: &'a str,
	auth: String,
}

/// Serialize the docker config for `credentials`.
///
/// Keys keep their declaration order and separators are `", "` and `": "`,
/// which is the byte form the pull secrets already on the clusters use.
fn docker_config_json(credentials: &RegistryCredentials) -> Result<Vec<u8>, serde_json::Error> {
	let auth = STANDARD.encode(format!(
		"{}:{}",
		credentials.username, credentials.password
	));
	let config = DockerConfig {
		auths: BTreeMap::from([(
			credentials.registry.as_str(),
			DockerAuth {
				username: &credentials.username,
				password: &credentials.password,
				auth,
			},
		)]),
	};

	let mut out = Vec::new();
	let mut serializer = serde_json::Serializer::with_formatter(&mut out, SpacedFormatter);
	config.serialize(&mut serializer)?;
	Ok(out)
}

/// Compact JSON with a space after every `,` and `:`.
struct SpacedFormatter;

impl serde_json::ser::Formatter for SpacedFormatter {
	fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
	where
		W: ?Sized + io::Write,
	{
		if first {
			Ok(())
		} else {
			writer.write_all(b", ")
		}
	}

	fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
	where
		W: ?Sized + io::Write,
	{
		if first {
			Ok(())
		} else {
			writer.write_all(b", ")
		}
	}

	fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
	where
		W: ?Sized + io::Write,
	{
		writer.write_all(b": ")
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	fn registry_credentials() -> RegistryCredentials {
		RegistryCredentials {
			registry: "my-registry".to_string(),
			username: "my-username".to_string(),
			password: "my-password".to_string(),
		}
	}

	#[test]
	fn test_create_secrets_body() {
		let body = build_secret_body("my_little_pony", &[Secret::new("jack", "the-ripper")]);

		assert_eq!(
			serde_json::to_value(&body).unwrap(),
			json!({
				"apiVersion": "v1",
				"kind": "Secret",
				"data": { "jack": "dGhlLXJpcHBlcg==" },
				"metadata": { "name": "my_little_pony-secret" },
				"type": "Opaque",
			})
		);
	}

	#[test]
	fn test_secret_body_leaves_other_fields_unset() {
		let body = build_secret_body("my_little_pony", &[Secret::new("jack", "the-ripper")]);

		assert_eq!(
			body.metadata,
			ObjectMeta {
				name: Some("my_little_pony-secret".to_string()),
				..ObjectMeta::default()
			}
		);
		assert_eq!(body.string_data, None);
		assert_eq!(body.immutable, None);
	}

	#[test]
	fn test_secret_values_are_raw_bytes() {
		let body = build_secret_body(
			"app",
			&[Secret::new("binary", vec![0u8, 159, 146, 150]), Secret::new("text", "é")],
		);

		let data = body.data.unwrap();
		assert_eq!(data["binary"], ByteString(vec![0, 159, 146, 150]));
		assert_eq!(data["text"], ByteString("é".as_bytes().to_vec()));
	}

	#[test]
	fn test_duplicate_secret_keys_keep_last_value() {
		let body = build_secret_body("app", &[Secret::new("key", "first"), Secret::new("key", "second")]);

		assert_eq!(
			body.data.unwrap(),
			BTreeMap::from([("key".to_string(), ByteString(b"second".to_vec()))])
		);
	}

	#[test]
	fn test_empty_secret_list() {
		let body = build_secret_body("app", &[]);
		assert_eq!(body.data, Some(BTreeMap::new()));
		assert_eq!(body.metadata.name.as_deref(), Some("app-secret"));
	}

	#[test]
	fn test_docker_config_json_bytes() {
		assert_eq!(
			String::from_utf8(docker_config_json(&registry_credentials()).unwrap()).unwrap(),
			r#"{"auths": {"my-registry": {"username": "my-username", "password": "my-password", "auth": "bXktdXNlcm5hbWU6bXktcGFzc3dvcmQ="}}}"#
		);
	}

	#[test]
	fn test_create_docker_registry_secret_body() {
		let body = build_registry_secret_body(&registry_credentials()).unwrap();

		assert_eq!(
			serde_json::to_value(&body).unwrap(),
			json!({
				"apiVersion": "v1",
				"kind": "Secret",
				"data": {
					".dockerconfigjson": "eyJhdXRocyI6IHsibXktcmVnaXN0cnkiOiB7InVzZXJuYW1lIjogIm15LXVzZXJuYW1lIiwgInBhc3N3b3JkIjogIm15LXBhc3N3b3JkIiwgImF1dGgiOiAiYlhrdGRYTmxjbTVoYldVNmJYa3RjR0Z6YzNkdmNtUT0ifX19"
				},
				"metadata": { "name": "acr-auth" },
				"type": "kubernetes.io/dockerconfigjson",
			})
		);
	}

	#[test]
	fn test_registry_docker_config_decodes() {
		let body = build_registry_secret_body(&registry_credentials()).unwrap();
		let encoded = &body.data.unwrap()[DOCKER_CONFIG_JSON_KEY];

		let decoded: serde_json::Value = serde_json::from_slice(&encoded.0).unwrap();
		assert_eq!(
			decoded,
			json!({
				"auths": {
					"my-registry": {
						"username": "my-username",
						"password": "my-password",
						"auth": STANDARD.encode("my-username:my-password"),
					}
				}
			})
		);
	}
}
