pub mod commands;
pub mod config;
pub mod context;
pub mod credentials;
pub mod k8s;
pub mod kubeconfig;
pub mod telemetry;
#[cfg(test)]
pub mod test_utils;
