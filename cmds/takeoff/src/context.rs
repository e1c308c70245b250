//! Run context: what is being deployed, and where.

use std::{fmt, str::FromStr};

use bon::Builder;
use thiserror::Error;

/// A DTAP environment tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Environment {
	Dev,
	Test,
	Acceptance,
	Production,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown environment `{0}`, expected one of: dev, tst, acp, prd")]
pub struct UnknownEnvironment(pub String);

impl Environment {
	/// Short tag used in names, namespaces and vault paths.
	pub fn tag(self) -> &'static str {
		match self {
			Environment::Dev => "dev",
			Environment::Test => "tst",
			Environment::Acceptance => "acp",
			Environment::Production => "prd",
		}
	}
}

impl FromStr for Environment {
	type Err = UnknownEnvironment;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_lowercase().as_str() {
			"dev" | "development" => Ok(Environment::Dev),
			"tst" | "test" => Ok(Environment::Test),
			"acp" | "acceptance" => Ok(Environment::Acceptance),
			"prd" | "prod" | "production" => Ok(Environment::Production),
			_ => Err(UnknownEnvironment(s.to_string())),
		}
	}
}

impl fmt::Display for Environment {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.tag())
	}
}

/// Version being deployed, created once per pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationVersion {
	environment: Environment,
	version: String,
	branch: String,
}

impl ApplicationVersion {
	pub fn new(
		environment: Environment,
		version: impl Into<String>,
		branch: impl Into<String>,
	) -> Self {
		Self {
			environment,
			version: version.into(),
			branch: branch.into(),
		}
	}

	pub fn environment(&self) -> Environment {
		self.environment
	}

	pub fn version(&self) -> &str {
		&self.version
	}

	pub fn branch(&self) -> &str {
		&self.branch
	}
}

/// Immutable inputs threaded through one deploy run.
#[derive(Debug, Clone, Builder)]
pub struct RunContext {
	#[builder(into)]
	application_name: String,
	#[builder(into)]
	build_id: Option<String>,
	version: ApplicationVersion,
}

impl RunContext {
	pub fn application_name(&self) -> &str {
		&self.application_name
	}

	pub fn build_id(&self) -> Option<&str> {
		self.build_id.as_deref()
	}

	pub fn version(&self) -> &ApplicationVersion {
		&self.version
	}

	pub fn environment(&self) -> Environment {
		self.version.environment
	}
}
