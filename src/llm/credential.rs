// Bearer tokens for Azure AD authenticated requests.
//
// AzureCliCredential shells out to `az account get-access-token`, the same
// source the Azure SDKs use for their CLI credential. Tokens are not cached:
// every call to `token` runs the CLI again.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{LlmError, Result};

pub const COGNITIVE_SERVICES_SCOPE: &str = "https://cognitiveservices.azure.com/.default";

const CLI_TIMEOUT: Duration = Duration::from_secs(30);

/// Supplies bearer tokens for a scope.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self, scope: &str) -> Result<String>;
}

/// Token provider backed by the Azure CLI login.
#[derive(Debug, Clone)]
pub struct AzureCliCredential {
    program: String,
    timeout: Duration,
}

impl Default for AzureCliCredential {
    fn default() -> Self {
        Self {
            program: if cfg!(windows) { "az.cmd" } else { "az" }.to_string(),
            timeout: CLI_TIMEOUT,
        }
    }
}

impl AzureCliCredential {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CliToken {
    access_token: String,
}

/// `--resource` takes the scope without its `/.default` suffix.
fn scope_to_resource(scope: &str) -> &str {
    scope.strip_suffix("/.default").unwrap_or(scope)
}

fn parse_cli_output(stdout: &[u8]) -> Result<String> {
    let token: CliToken = serde_json::from_slice(stdout)
        .map_err(|e| LlmError::Credential(format!("unexpected az output: {e}")))?;
    if token.access_token.is_empty() {
        return Err(LlmError::Credential("az returned an empty access token".into()));
    }
    Ok(token.access_token)
}

#[async_trait]
impl TokenProvider for AzureCliCredential {
    async fn token(&self, scope: &str) -> Result<String> {
        let child = tokio::process::Command::new(&self.program)
            .args(["account", "get-access-token", "--output", "json", "--resource"])
            .arg(scope_to_resource(scope))
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| LlmError::Credential(format!("failed to run {}: {e}", self.program)))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                LlmError::Credential(format!(
                    "az did not return a token within {}s",
                    self.timeout.as_secs()
                ))
            })??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(LlmError::Credential(format!(
                "az account get-access-token failed: {}",
                stderr.trim()
            )));
        }

        tracing::debug!(scope, "acquired Azure AD token from az CLI");
        parse_cli_output(&output.stdout)
    }
}

/// A fixed token, for pre-issued credentials and tests.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

#[async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self, _scope: &str) -> Result<String> {
        Ok(self.0.clone())
    }
}
