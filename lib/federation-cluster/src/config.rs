//! Client configuration for member clusters

use federation_api::ImpersonatingUser;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Client;
use std::fmt;
use std::io::BufReader;
use std::sync::Arc;
use std::time::Duration;

use crate::client::ClusterClient;
use crate::rate_limit::RateLimiter;
use crate::store::PollSettings;
use crate::{ConnectionError, Result};

/// Client-side request ceiling against any member cluster API server
pub const KUBE_API_QPS: f32 = 20.0;
pub const KUBE_API_BURST: u32 = 30;

pub const SECRET_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const SECRET_TIMEOUT: Duration = Duration::from_secs(60);

/// Settings shared by every connection the resolver builds
#[derive(Clone, Debug)]
pub struct ResolverConfig {
    /// Namespace holding cluster secrets that don't name one
    pub namespace: String,
    pub poll: PollSettings,
    pub qps: f32,
    pub burst: u32,
}

impl ResolverConfig {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            poll: PollSettings {
                interval: SECRET_POLL_INTERVAL,
                timeout: SECRET_TIMEOUT,
            },
            qps: KUBE_API_QPS,
            burst: KUBE_API_BURST,
        }
    }

    /// Build from `POD_NAMESPACE`, the namespace the control plane runs in
    pub fn from_env() -> Result<Self> {
        match std::env::var("POD_NAMESPACE") {
            Ok(ns) if !ns.is_empty() => Ok(Self::new(ns)),
            _ => Err(ConnectionError::InvalidConfiguration(
                "POD_NAMESPACE environment variable is not set".to_string(),
            )),
        }
    }
}

/// How a client authenticates to a member cluster
#[derive(Clone)]
pub enum ClientAuth {
    /// No credentials, server certificate not verified
    Anonymous,
    /// Service account token, trusting `ca_data` (PEM)
    BearerToken { token: String, ca_data: Vec<u8> },
    /// Everything taken from a stored kubeconfig except the server address
    Kubeconfig(Box<Kubeconfig>),
}

impl fmt::Debug for ClientAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientAuth::Anonymous => f.write_str("Anonymous"),
            ClientAuth::BearerToken { .. } => f.write_str("BearerToken(<redacted>)"),
            ClientAuth::Kubeconfig(_) => f.write_str("Kubeconfig(<redacted>)"),
        }
    }
}

/// Resolved connection settings for one member cluster
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Server address chosen for this host
    pub host: String,
    pub auth: ClientAuth,
    pub impersonate: Option<ImpersonatingUser>,
    pub qps: f32,
    pub burst: u32,
}

impl ClientConfig {
    /// True for the degraded-trust path without credentials
    pub fn is_anonymous(&self) -> bool {
        matches!(self.auth, ClientAuth::Anonymous)
    }

    /// Translate into a kube client configuration
    pub async fn to_kube_config(&self) -> Result<kube::Config> {
        let cluster_url = parse_server_url(&self.host)?;

        let mut config = match &self.auth {
            ClientAuth::Anonymous => {
                let mut config = kube::Config::new(cluster_url);
                config.accept_invalid_certs = true;
                config
            }
            ClientAuth::BearerToken { token, ca_data } => {
                let mut config = kube::Config::new(cluster_url);
                config.root_cert = Some(pem_to_der(ca_data)?);
                config.auth_info = serde_json::from_value(serde_json::json!({ "token": token }))
                    .map_err(|e| {
                        ConnectionError::InvalidConfiguration(format!("bearer token: {}", e))
                    })?;
                config
            }
            ClientAuth::Kubeconfig(kubeconfig) => {
                let mut config = kube::Config::from_custom_kubeconfig(
                    kubeconfig.as_ref().clone(),
                    &KubeConfigOptions::default(),
                )
                .await?;
                config.cluster_url = cluster_url;
                config
            }
        };

        if let Some(user) = &self.impersonate {
            config.auth_info.impersonate = Some(user.username.clone());
            if !user.groups.is_empty() {
                config.auth_info.impersonate_groups = Some(user.groups.clone());
            }
        }

        Ok(config)
    }

    /// Create a client for the cluster with a limiter of its own
    pub async fn connect(&self, cluster_name: &str) -> Result<ClusterClient> {
        self.connect_with_limiter(cluster_name, Arc::new(RateLimiter::new(self.qps, self.burst)))
            .await
    }

    /// Create a client for the cluster throttled by `limiter`
    pub async fn connect_with_limiter(
        &self,
        cluster_name: &str,
        limiter: Arc<RateLimiter>,
    ) -> Result<ClusterClient> {
        let config = self.to_kube_config().await?;
        let client = Client::try_from(config)?;
        Ok(ClusterClient::with_limiter(cluster_name, client, limiter))
    }
}

/// Server addresses may be bare "host:port"; those are served over https
fn parse_server_url(host: &str) -> Result<http::Uri> {
    let url = if host.contains("://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    };
    url.parse::<http::Uri>().map_err(|e| {
        ConnectionError::InvalidConfiguration(format!("invalid server address {:?}: {}", host, e))
    })
}

fn pem_to_der(pem: &[u8]) -> Result<Vec<Vec<u8>>> {
    let mut reader = BufReader::new(pem);
    let certs = rustls_pemfile::certs(&mut reader)
        .map(|cert| cert.map(|c| c.as_ref().to_vec()))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| {
            ConnectionError::InvalidConfiguration(format!("failed to parse CA certificate: {}", e))
        })?;

    if certs.is_empty() {
        return Err(ConnectionError::InvalidConfiguration(
            "no certificates found in CA data".to_string(),
        ));
    }
    Ok(certs)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const TEST_CA_PEM: &str =
        "-----BEGIN CERTIFICATE-----\nAQID\n-----END CERTIFICATE-----\n";

    fn config(auth: ClientAuth) -> ClientConfig {
        ClientConfig {
            host: "10.1.1.1:6443".to_string(),
            auth,
            impersonate: None,
            qps: KUBE_API_QPS,
            burst: KUBE_API_BURST,
        }
    }

    #[test]
    fn test_parse_server_url() {
        let uri = parse_server_url("10.1.1.1:6443").unwrap();
        assert_eq!(uri.scheme_str(), Some("https"));
        assert_eq!(uri.host(), Some("10.1.1.1"));
        assert_eq!(uri.port_u16(), Some(6443));

        let uri = parse_server_url("http://api.example:8080").unwrap();
        assert_eq!(uri.scheme_str(), Some("http"));
    }

    #[test]
    fn test_pem_to_der() {
        assert_eq!(pem_to_der(TEST_CA_PEM.as_bytes()).unwrap(), vec![vec![1u8, 2, 3]]);
        assert!(pem_to_der(b"not a pem").is_err());
    }

    #[tokio::test]
    async fn test_anonymous_config() {
        let kube_config = config(ClientAuth::Anonymous).to_kube_config().await.unwrap();
        assert!(kube_config.accept_invalid_certs);
        assert!(kube_config.root_cert.is_none());
    }

    #[tokio::test]
    async fn test_bearer_token_config() {
        let mut client_config = config(ClientAuth::BearerToken {
            token: "abc".to_string(),
            ca_data: TEST_CA_PEM.as_bytes().to_vec(),
        });
        client_config.impersonate = Some(ImpersonatingUser {
            username: "alice".to_string(),
            groups: vec!["dev".to_string()],
            ..Default::default()
        });

        let kube_config = client_config.to_kube_config().await.unwrap();
        assert!(!kube_config.accept_invalid_certs);
        assert_eq!(kube_config.root_cert, Some(vec![vec![1u8, 2, 3]]));
        assert!(kube_config.auth_info.token.is_some());
        assert_eq!(kube_config.auth_info.impersonate.as_deref(), Some("alice"));
        assert_eq!(kube_config.auth_info.impersonate_groups, Some(vec!["dev".to_string()]));
    }

    #[tokio::test]
    async fn test_kubeconfig_server_is_overridden() {
        let kubeconfig = Kubeconfig::from_yaml(
            r#"
apiVersion: v1
kind: Config
clusters:
- name: member
  cluster:
    server: https://stale.example:443
    insecure-skip-tls-verify: true
users:
- name: fed
  user:
    token: abc
contexts:
- name: member
  context:
    cluster: member
    user: fed
current-context: member
"#,
        )
        .unwrap();

        let kube_config = config(ClientAuth::Kubeconfig(Box::new(kubeconfig)))
            .to_kube_config()
            .await
            .unwrap();
        assert_eq!(kube_config.cluster_url.host(), Some("10.1.1.1"));
        assert_eq!(kube_config.cluster_url.port_u16(), Some(6443));
    }

    #[test]
    fn test_debug_hides_token() {
        let c = config(ClientAuth::BearerToken {
            token: "very-secret".to_string(),
            ca_data: vec![],
        });
        assert!(!format!("{:?}", c).contains("very-secret"));
    }
}
