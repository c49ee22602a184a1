use config::{Config, Environment};
use serde::Deserialize;
use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use crate::agent::{AgentConfig, AgentMode};
use crate::errors::{to_env_var, ConfigError};
use crate::memory::HistoryPolicy;
use crate::providers::configs::{
    GeminiProviderConfig, OpenAiProviderConfig, ProviderConfig, GEMINI_HOST, GEMINI_MODEL,
    OPENAI_HOST, OPENAI_MODEL,
};
use crate::providers::factory::ProviderType;
use crate::session::SessionParams;

/// Environment variable the tool provider reads its database path from
pub const DATABASE_ENV: &str = "SQLMATE_DATABASE";

#[derive(Debug, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerSettings {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::InvalidValue {
                key: to_env_var("server.host"),
                message: e.to_string(),
            })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum ProviderSettings {
    Gemini {
        #[serde(default = "default_gemini_host")]
        host: String,
        #[serde(default)]
        api_key: Option<String>,
        #[serde(default = "default_gemini_model")]
        model: String,
        #[serde(default = "default_temperature")]
        temperature: Option<f32>,
        #[serde(default = "default_max_tokens")]
        max_tokens: Option<i32>,
    },
    OpenAi {
        #[serde(default = "default_openai_host")]
        host: String,
        #[serde(default)]
        api_key: Option<String>,
        #[serde(default = "default_openai_model")]
        model: String,
        #[serde(default = "default_temperature")]
        temperature: Option<f32>,
        #[serde(default = "default_max_tokens")]
        max_tokens: Option<i32>,
    },
}

impl ProviderSettings {
    pub fn provider_type(&self) -> ProviderType {
        match self {
            ProviderSettings::Gemini { .. } => ProviderType::Gemini,
            ProviderSettings::OpenAi { .. } => ProviderType::OpenAi,
        }
    }

    /// Resolve the API key, falling back to the vendor's usual variable, and
    /// convert to the provider config
    pub fn into_config(self) -> Result<ProviderConfig, ConfigError> {
        match self {
            ProviderSettings::Gemini {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            } => Ok(ProviderConfig::Gemini(GeminiProviderConfig {
                host,
                api_key: resolve_api_key(api_key, "GOOGLE_API_KEY")?,
                model,
                temperature,
                max_tokens,
            })),
            ProviderSettings::OpenAi {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            } => Ok(ProviderConfig::OpenAi(OpenAiProviderConfig {
                host,
                api_key: resolve_api_key(api_key, "OPENAI_API_KEY")?,
                model,
                temperature,
                max_tokens,
            })),
        }
    }
}

fn resolve_api_key(configured: Option<String>, fallback: &str) -> Result<String, ConfigError> {
    configured
        .or_else(|| env::var(fallback).ok())
        .filter(|key| !key.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingEnvVar {
            env_var: to_env_var("provider.api_key"),
        })
}

#[derive(Debug, Deserialize)]
pub struct ToolsSettings {
    #[serde(default = "default_tools_command")]
    pub command: String,
    /// Space separated extra arguments for the tool provider
    #[serde(default)]
    pub args: String,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ToolsSettings {
    fn default() -> Self {
        Self {
            command: default_tools_command(),
            args: String::new(),
            database: default_database(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ToolsSettings {
    pub fn session_params(&self) -> SessionParams {
        SessionParams::new(&self.command)
            .with_args(self.args.split_whitespace())
            .with_env(DATABASE_ENV, &self.database)
            .with_timeout(Duration::from_secs(self.timeout_secs))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AgentSettings {
    #[serde(default)]
    pub mode: AgentMode,
    #[serde(default)]
    pub max_tool_rounds: Option<usize>,
    #[serde(default)]
    pub history_window: Option<usize>,
}

impl AgentSettings {
    pub fn to_config(&self) -> Result<AgentConfig, ConfigError> {
        let mut config = AgentConfig::new(self.mode);
        if let Some(rounds) = self.max_tool_rounds {
            config = config.with_max_tool_rounds(rounds);
        }
        if let Some(max_messages) = self.history_window {
            // A zero window would hide the question from the model
            if max_messages == 0 {
                return Err(ConfigError::InvalidValue {
                    key: to_env_var("agent.history_window"),
                    message: "must be at least 1".to_string(),
                });
            }
            config = config.with_history(HistoryPolicy::Window { max_messages });
        }
        Ok(config)
    }
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    pub provider: ProviderSettings,
    #[serde(default)]
    pub tools: ToolsSettings,
    #[serde(default)]
    pub agent: AgentSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load_and_validate()
    }

    fn load_and_validate() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            .set_default("provider.type", ProviderType::Gemini.to_string())?
            .add_source(
                Environment::with_prefix("SQLMATE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let result: Result<Self, config::ConfigError> = config.try_deserialize();

        match result {
            Ok(settings) => Ok(settings),
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);

                // Missing fields surface as "missing field `name`"
                let error_str = err.to_string();
                if error_str.starts_with("missing field") {
                    let field = error_str
                        .trim_start_matches("missing field `")
                        .trim_end_matches('`');
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    })
                } else if let config::ConfigError::NotFound(field) = &err {
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    })
                } else {
                    Err(ConfigError::Other(err))
                }
            }
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_gemini_host() -> String {
    GEMINI_HOST.to_string()
}

fn default_gemini_model() -> String {
    GEMINI_MODEL.to_string()
}

fn default_openai_host() -> String {
    OPENAI_HOST.to_string()
}

fn default_openai_model() -> String {
    OPENAI_MODEL.to_string()
}

fn default_temperature() -> Option<f32> {
    Some(0.1)
}

fn default_max_tokens() -> Option<i32> {
    Some(8192)
}

fn default_tools_command() -> String {
    "sqlmate-tools".to_string()
}

fn default_database() -> String {
    "./database.db".to_string()
}

fn default_timeout_secs() -> u64 {
    15
}
