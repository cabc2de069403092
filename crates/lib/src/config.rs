//! Configuration types and loading.
//!
//! Config is loaded once from a JSON file (e.g. `~/.replybot/config.json`) and environment,
//! then handed to the gateway and client constructors. Credentials normally come from env.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Webhook server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Chat platform settings.
    #[serde(default)]
    pub channels: ChannelsConfig,

    /// Completion API settings (endpoint, model, prompt policy).
    #[serde(default)]
    pub completion: CompletionConfig,
}

/// Gateway bind, port, and callback path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// HTTP port (default 3000). Overridden by PORT env.
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1"). Use "0.0.0.0" when the platform must reach the host directly.
    #[serde(default = "default_gateway_bind")]
    pub bind: String,

    /// Path the chat platform POSTs webhook events to (default "/callback").
    #[serde(default = "default_callback_path")]
    pub callback_path: String,
}

fn default_gateway_port() -> u16 {
    3000
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_callback_path() -> String {
    "/callback".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
            callback_path: default_callback_path(),
        }
    }
}

/// Per-channel config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelsConfig {
    #[serde(default)]
    pub line: LineChannelConfig,
}

/// LINE Messaging API config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineChannelConfig {
    /// Long-lived channel access token. Overridden by LINE_CHANNEL_ACCESS_TOKEN env when set.
    #[serde(default)]
    pub channel_access_token: Option<String>,
    /// Channel secret used to verify X-Line-Signature. Overridden by LINE_CHANNEL_SECRET env when set.
    #[serde(default)]
    pub channel_secret: Option<String>,
    /// Messaging API base URL (default "https://api.line.me").
    #[serde(default = "default_line_api_base_url")]
    pub api_base_url: String,
}

fn default_line_api_base_url() -> String {
    "https://api.line.me".to_string()
}

impl Default for LineChannelConfig {
    fn default() -> Self {
        Self {
            channel_access_token: None,
            channel_secret: None,
            api_base_url: default_line_api_base_url(),
        }
    }
}

/// Completion API config. The prompt template and token bound are policy, not code.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionConfig {
    /// API key. Overridden by OPENAI_API_KEY env when set.
    #[serde(default)]
    pub api_key: Option<String>,
    /// OpenAI-compatible base URL including the version segment (default "https://api.openai.com/v1").
    #[serde(default = "default_completion_base_url")]
    pub base_url: String,
    /// Completion model id.
    #[serde(default = "default_completion_model")]
    pub model: String,
    /// Prompt template; `{text}` is replaced with the user's message. Without a placeholder the template is a prefix.
    #[serde(default = "default_prompt_template")]
    pub prompt_template: String,
    /// Upper bound on generated tokens per reply.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_completion_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_completion_model() -> String {
    "gpt-3.5-turbo-instruct".to_string()
}

fn default_prompt_template() -> String {
    "Q: {text}".to_string()
}

fn default_max_tokens() -> u32 {
    150
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_completion_base_url(),
            model: default_completion_model(),
            prompt_template: default_prompt_template(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Environment variables that override file values when set to a non-blank value.
pub const ENV_LINE_ACCESS_TOKEN: &str = "LINE_CHANNEL_ACCESS_TOKEN";
pub const ENV_LINE_CHANNEL_SECRET: &str = "LINE_CHANNEL_SECRET";
pub const ENV_COMPLETION_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_PORT: &str = "PORT";

fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

impl Config {
    /// Apply env overrides (LINE_CHANNEL_ACCESS_TOKEN, LINE_CHANNEL_SECRET, OPENAI_API_KEY, PORT).
    /// Called once by `load_config`; everything downstream reads the struct only.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup` (key -> raw value). Blank values, in the file or the lookup, become None.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| non_blank(lookup(key).as_deref());
        let line = &mut self.channels.line;
        line.channel_access_token =
            get(ENV_LINE_ACCESS_TOKEN).or_else(|| non_blank(line.channel_access_token.as_deref()));
        line.channel_secret =
            get(ENV_LINE_CHANNEL_SECRET).or_else(|| non_blank(line.channel_secret.as_deref()));
        self.completion.api_key = get(ENV_COMPLETION_API_KEY)
            .or_else(|| non_blank(self.completion.api_key.as_deref()));
        if let Some(p) = get(ENV_PORT) {
            match p.parse() {
                Ok(port) => self.gateway.port = port,
                Err(_) => log::warn!("config: ignoring invalid PORT value {:?}", p),
            }
        }
    }
}

/// LINE channel access token, if configured and not blank.
pub fn resolve_line_access_token(config: &Config) -> Option<String> {
    non_blank(config.channels.line.channel_access_token.as_deref())
}

/// LINE channel secret, if configured and not blank.
pub fn resolve_line_channel_secret(config: &Config) -> Option<String> {
    non_blank(config.channels.line.channel_secret.as_deref())
}

/// Completion API key, if configured and not blank.
pub fn resolve_completion_api_key(config: &Config) -> Option<String> {
    non_blank(config.completion.api_key.as_deref())
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("REPLYBOT_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".replybot").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the given path, REPLYBOT_CONFIG_PATH, or the default. Missing file => default config.
/// Env overrides are applied before returning. Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let mut config: Config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    config.apply_env_overrides();
    Ok((config, path))
}
