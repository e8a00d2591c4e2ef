//! Controller settings read from the environment

use anyhow::{bail, Context, Result};
use federation_cluster::ResolverConfig;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(30);

/// How long startup waits for the identity provider to sync
pub const PROVIDER_SYNC_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Debug)]
pub struct ControllerConfig {
    /// Namespace the control plane runs in
    pub namespace: String,
    /// Registered name of the identity provider, empty for none
    pub identity_provider: String,
    pub identity_provider_config: Option<PathBuf>,
    pub federation_kubeconfig: Option<PathBuf>,
    pub host_kubeconfig: Option<PathBuf>,
    pub sync_interval: Duration,
    /// Kinds to propagate, `None` for every registered kind
    pub kinds: Option<Vec<String>>,
    pub log_format: LogFormat,
}

impl ControllerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let namespace = match var("POD_NAMESPACE") {
            Some(ns) => ns,
            None => bail!("POD_NAMESPACE environment variable is not set"),
        };

        let sync_interval = match var("FEDERATION_SYNC_INTERVAL_SECS") {
            Some(secs) => {
                let secs: u64 = secs
                    .trim()
                    .parse()
                    .with_context(|| format!("invalid FEDERATION_SYNC_INTERVAL_SECS {:?}", secs))?;
                if secs == 0 {
                    bail!("FEDERATION_SYNC_INTERVAL_SECS must be positive");
                }
                Duration::from_secs(secs)
            }
            None => DEFAULT_SYNC_INTERVAL,
        };

        let kinds = var("FEDERATION_KINDS").map(|kinds| {
            kinds
                .split(',')
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect()
        });

        let log_format = match var("FEDERATION_LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Ok(Self {
            namespace,
            identity_provider: var("FEDERATION_IDENTITY_PROVIDER").unwrap_or_default(),
            identity_provider_config: var("FEDERATION_IDENTITY_PROVIDER_CONFIG").map(PathBuf::from),
            federation_kubeconfig: var("FEDERATION_KUBECONFIG").map(PathBuf::from),
            host_kubeconfig: var("HOST_KUBECONFIG").map(PathBuf::from),
            sync_interval,
            kinds,
            log_format,
        })
    }

    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig::new(self.namespace.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<ControllerConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ControllerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[("POD_NAMESPACE", "federation-system")]).unwrap();
        assert_eq!(config.namespace, "federation-system");
        assert_eq!(config.identity_provider, "");
        assert_eq!(config.sync_interval, Duration::from_secs(30));
        assert_eq!(config.kinds, None);
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(config.host_kubeconfig.is_none());
        assert_eq!(config.resolver_config().namespace, "federation-system");
    }

    #[test]
    fn test_namespace_required() {
        assert!(config(&[]).is_err());
        assert!(config(&[("POD_NAMESPACE", " ")]).is_err());
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("POD_NAMESPACE", "fed"),
            ("FEDERATION_IDENTITY_PROVIDER", "usercluster"),
            ("FEDERATION_IDENTITY_PROVIDER_CONFIG", "/etc/federation/identity.json"),
            ("FEDERATION_SYNC_INTERVAL_SECS", "5"),
            ("FEDERATION_KINDS", "Job, deployment,,"),
            ("FEDERATION_LOG_FORMAT", "json"),
        ])
        .unwrap();
        assert_eq!(config.identity_provider, "usercluster");
        assert_eq!(
            config.identity_provider_config,
            Some(PathBuf::from("/etc/federation/identity.json"))
        );
        assert_eq!(config.sync_interval, Duration::from_secs(5));
        assert_eq!(
            config.kinds,
            Some(vec!["job".to_string(), "deployment".to_string()])
        );
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_invalid_interval() {
        assert!(config(&[("POD_NAMESPACE", "fed"), ("FEDERATION_SYNC_INTERVAL_SECS", "soon")]).is_err());
        assert!(config(&[("POD_NAMESPACE", "fed"), ("FEDERATION_SYNC_INTERVAL_SECS", "0")]).is_err());
    }
}
