use std::collections::BTreeMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as Base64Engine;
use base64::Engine;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::api::{Api, Patch, PatchParams};

use crate::config;

pub const CHECKOUT_SECRET_NAME: &str = "marketplace-checkout-data";
pub const COMPLIANCE_CONFIG_NAME: &str = "marketplace-compliance-output";
pub const COMPLIANCE_CONFIG_KEY: &str = "config.json";
pub const NOTIFICATION_CONFIG_NAME: &str = "marketplace-compliance-notification";
pub const SETTINGS_CONFIG_NAME: &str = "server-settings";

const FIELD_MANAGER: &str = "marketplace-adapter";

/// Cluster-side persistence and reporting surface for the reconciler.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Raw key/value bag of the persisted checkout secret. A missing secret
    /// is an empty bag, not an error.
    async fn get_checkout_secret(&self) -> Result<BTreeMap<String, Vec<u8>>>;

    async fn update_checkout_secret(&self, data: BTreeMap<String, String>) -> Result<()>;

    /// Publish the serialized compliance document.
    async fn update_compliance_document(&self, document: Vec<u8>) -> Result<()>;

    /// Push the user-facing compliance notification.
    async fn update_user_notification(&self, in_compliance: bool, message: &str) -> Result<()>;

    async fn get_hostname(&self) -> Result<String>;

    async fn get_product_version(&self) -> Result<String>;
}

pub struct KubeClusterClient {
    client: kube::Client,
    namespace: String,
}

impl KubeClusterClient {
    /// Build against the in-cluster credentials of the running pod.
    pub async fn new() -> Result<Self> {
        let client = kube::Client::try_default()
            .await
            .context("failed to build in-cluster kubernetes client")?;
        Ok(Self::with_client(client, config::K8S_NAMESPACE.clone()))
    }

    pub fn with_client(client: kube::Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    fn secrets(&self) -> Api<Secret> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn config_maps(&self) -> Api<ConfigMap> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    async fn apply_config_map(&self, name: &str, data: serde_json::Value) -> Result<()> {
        let patch = serde_json::json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": { "name": name },
            "data": data,
        });
        self.config_maps()
            .patch(name, &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Apply(&patch))
            .await
            .with_context(|| format!("failed to apply config map {name}"))?;
        Ok(())
    }

    async fn read_setting(&self, key: &str) -> Result<String> {
        let settings = self
            .config_maps()
            .get(SETTINGS_CONFIG_NAME)
            .await
            .with_context(|| format!("failed to read {SETTINGS_CONFIG_NAME}"))?;
        settings
            .data
            .unwrap_or_default()
            .remove(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .with_context(|| format!("{SETTINGS_CONFIG_NAME} carries no {key}"))
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn get_checkout_secret(&self) -> Result<BTreeMap<String, Vec<u8>>> {
        match self.secrets().get(CHECKOUT_SECRET_NAME).await {
            Ok(secret) => Ok(secret
                .data
                .unwrap_or_default()
                .into_iter()
                .map(|(key, value)| (key, value.0))
                .collect()),
            Err(kube::Error::Api(response)) if response.code == 404 => Ok(BTreeMap::new()),
            Err(err) => Err(err).context("failed to read checkout secret"),
        }
    }

    async fn update_checkout_secret(&self, data: BTreeMap<String, String>) -> Result<()> {
        let encoded: BTreeMap<String, String> = data
            .into_iter()
            .map(|(key, value)| (key, Base64Engine.encode(value)))
            .collect();
        let patch = serde_json::json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "metadata": { "name": CHECKOUT_SECRET_NAME },
            "type": "Opaque",
            "data": encoded,
        });
        self.secrets()
            .patch(
                CHECKOUT_SECRET_NAME,
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(&patch),
            )
            .await
            .context("failed to apply checkout secret")?;
        Ok(())
    }

    async fn update_compliance_document(&self, document: Vec<u8>) -> Result<()> {
        let document =
            String::from_utf8(document).context("compliance document is not valid utf-8")?;
        self.apply_config_map(
            COMPLIANCE_CONFIG_NAME,
            serde_json::json!({ COMPLIANCE_CONFIG_KEY: document }),
        )
        .await
    }

    async fn update_user_notification(&self, in_compliance: bool, message: &str) -> Result<()> {
        self.apply_config_map(
            NOTIFICATION_CONFIG_NAME,
            serde_json::json!({
                "inCompliance": in_compliance.to_string(),
                "message": message,
            }),
        )
        .await
    }

    async fn get_hostname(&self) -> Result<String> {
        self.read_setting("hostname").await
    }

    async fn get_product_version(&self) -> Result<String> {
        self.read_setting("version").await
    }
}
