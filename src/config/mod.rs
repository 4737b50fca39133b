pub mod env;
pub mod schema;

pub use env::{
    get_azure_config, get_model_type, get_ollama_config, get_openai_config, use_openai_api_key,
    AzureConfig, Env, MapEnv, OllamaConfig, OpenAiConfig, ProcessEnv,
};
pub use schema::{AzureModelConfig, AzureOpenAiPoolConfig, CustomModelConfig, ModelPoolConfig, ModelType};

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Names a pool config file; a missing file behind it is an error.
pub const POOL_CONFIG_ENV: &str = "GLUE_LLM_POOL_CONFIG";

/// Load the model pool configuration, checking (in order):
/// 1. an explicit path
/// 2. `$GLUE_LLM_POOL_CONFIG`
/// 3. `~/.glue-llm/pool.yaml`
///
/// A missing file at the default location yields an empty pool config. A
/// missing file named by the argument or the variable is an error.
pub fn load_pool_config(explicit: Option<&Path>) -> Result<ModelPoolConfig> {
    load_pool_config_from(explicit, &ProcessEnv)
}

/// `load_pool_config` with variables (including `${VAR}` references in the
/// file) read from `env`.
pub fn load_pool_config_from(explicit: Option<&Path>, env: &dyn Env) -> Result<ModelPoolConfig> {
    load_with_default(explicit, env, default_config_path())
}

fn load_with_default(
    explicit: Option<&Path>,
    env: &dyn Env,
    default: Option<PathBuf>,
) -> Result<ModelPoolConfig> {
    if let Some(p) = explicit {
        return read_pool_config(p, env);
    }
    if let Some(p) = env_config_path(env) {
        return read_pool_config(&p, env);
    }

    match default {
        Some(p) if p.exists() => read_pool_config(&p, env),
        _ => {
            tracing::debug!("no pool config file found, using an empty pool");
            Ok(ModelPoolConfig::default())
        }
    }
}

fn read_pool_config(path: &Path, env: &dyn Env) -> Result<ModelPoolConfig> {
    tracing::info!(path = %path.display(), "loading pool config");
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading pool config from {}", path.display()))?;
    let mut cfg: ModelPoolConfig = serde_yaml::from_str(&raw)
        .with_context(|| format!("parsing pool config from {}", path.display()))?;
    resolve_env_vars(&mut cfg, env);
    cfg.validate()?;
    Ok(cfg)
}

fn env_config_path(env: &dyn Env) -> Option<PathBuf> {
    env.var(POOL_CONFIG_ENV)
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
}

fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".glue-llm").join("pool.yaml"))
}

/// Resolve `${ENV_VAR}` references in the Azure api_key field.
fn resolve_env_vars(config: &mut ModelPoolConfig, env: &dyn Env) {
    if let Some(az) = config.azure_open_ai.as_mut() {
        if let Some(ref key) = az.api_key {
            az.api_key = Some(substitute_env_vars(key, env));
        }
    }
}

/// Substitute `${VAR}` patterns with variable values in a single left to
/// right pass. Unset variables become the empty string; substituted text is
/// never expanded again.
fn substitute_env_vars(input: &str, env: &dyn Env) -> String {
    let mut result = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            break;
        };
        result.push_str(&rest[..start]);
        result.push_str(&env.var(&after[..end]).unwrap_or_default());
        rest = &after[end + 1..];
    }
    result.push_str(rest);
    result
}
