use std::process::Command;

fn main() {
	println!("cargo:rerun-if-changed=.git/HEAD");
	println!("cargo:rerun-if-changed=.git/refs/");

	// Pipelines stamp releases through the package version; local builds use git.
	let version = match env!("CARGO_PKG_VERSION") {
		"0.1.0" => git_describe().unwrap_or_else(|| "0.1.0".to_string()),
		released => released.to_string(),
	};
	println!("cargo:rustc-env=TAKEOFF_VERSION={}", version);
}

/// `1.2.3` on a tagged commit (leading `v` stripped), the short commit hash otherwise.
fn git_describe() -> Option<String> {
	let output = Command::new("git")
		.args(["describe", "--tags", "--always", "--exact-match"])
		.output()
		.ok()
		.filter(|output| output.status.success())
		.or_else(|| {
			Command::new("git")
				.args(["rev-parse", "--short", "HEAD"])
				.output()
				.ok()
				.filter(|output| output.status.success())
		})?;

	let described = String::from_utf8(output.stdout).ok()?;
	let described = described.trim();
	Some(described.strip_prefix('v').unwrap_or(described).to_string())
}
