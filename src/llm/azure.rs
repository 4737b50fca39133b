// Azure OpenAI caller and shared deployment client.
//
// Routing follows the deployment-based layout:
//   {endpoint}/openai/deployments/{deployment}{path}?api-version={version}
// Authentication is either an Azure AD bearer token or the `api-key` header.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::credential::{AzureCliCredential, TokenProvider, COGNITIVE_SERVICES_SCOPE};
use super::{first_choice_content, send_json, ChatProvider};
use crate::config::env::{get_azure_config_from, AzureConfig};
use crate::config::Env;
use crate::error::Result;

const PROVIDER: &str = "Azure";

/// How requests to an Azure OpenAI resource are authenticated.
#[derive(Clone)]
pub enum AzureAuth {
    /// Fetch a fresh Azure AD token for every request.
    Bearer(Arc<dyn TokenProvider>),
    ApiKey(String),
}

/// Build the deployment-scoped URL for an Azure OpenAI operation.
pub fn deployment_url(endpoint: &str, deployment: &str, path: &str, api_version: &str) -> String {
    format!(
        "{}/openai/deployments/{}{}?api-version={}",
        endpoint.trim_end_matches('/'),
        deployment.trim().trim_matches('/'),
        path,
        api_version.trim()
    )
}

/// One Azure OpenAI resource: endpoint, API version and credentials.
#[derive(Clone)]
pub struct AzureClient {
    http: reqwest::Client,
    endpoint: String,
    api_version: String,
    auth: AzureAuth,
}

impl AzureClient {
    pub fn new(endpoint: &str, api_version: &str, auth: AzureAuth) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(300))
                .build()?,
            endpoint: endpoint.to_string(),
            api_version: api_version.to_string(),
            auth,
        })
    }

    /// POST `body` to `path` under `deployment` and return the decoded JSON.
    pub async fn post(&self, deployment: &str, path: &str, body: &Value) -> Result<Value> {
        let url = deployment_url(&self.endpoint, deployment, path, &self.api_version);
        let req = self.http.post(&url);
        let req = match &self.auth {
            AzureAuth::Bearer(provider) => {
                req.bearer_auth(provider.token(COGNITIVE_SERVICES_SCOPE).await?)
            }
            AzureAuth::ApiKey(key) => req.header("api-key", key),
        };
        send_json(PROVIDER, req, body).await
    }
}

/// Environment-driven Azure chat caller.
///
/// The `messages` array is forwarded exactly as received, without going
/// through the normalizer.
pub struct AzureCaller {
    credential: Arc<dyn TokenProvider>,
}

impl AzureCaller {
    pub fn new() -> Self {
        Self::with_credential(Arc::new(AzureCliCredential::new()))
    }

    pub fn with_credential(credential: Arc<dyn TokenProvider>) -> Self {
        Self { credential }
    }
}

impl Default for AzureCaller {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the request body; `messages` is passed through verbatim.
fn build_request_body(cfg: &AzureConfig, messages: &Value) -> Value {
    let raw = messages.get("messages").unwrap_or(messages);
    json!({
        "model": cfg.deployment_name,
        "messages": raw,
        "temperature": cfg.temperature,
    })
}

/// Issue one chat completion with an already resolved config.
pub async fn call_azure(
    cfg: &AzureConfig,
    credential: Arc<dyn TokenProvider>,
    messages: &Value,
) -> Result<String> {
    let client = AzureClient::new(
        &cfg.azure_endpoint,
        &cfg.api_version,
        AzureAuth::Bearer(credential),
    )?;
    let response = client
        .post(
            &cfg.deployment_name,
            "/chat/completions",
            &build_request_body(cfg, messages),
        )
        .await?;
    first_choice_content(PROVIDER, &response)
}

#[async_trait]
impl ChatProvider for AzureCaller {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn chat(&self, env: &dyn Env, messages: &Value) -> Result<String> {
        let cfg = get_azure_config_from(env);
        call_azure(&cfg, self.credential.clone(), messages).await
    }
}
