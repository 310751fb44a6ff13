use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{AgentError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_agent_name")]
    pub agent_name: String,

    /// System instruction placed at the head of every session history.
    /// Empty means the built-in file assistant prompt.
    #[serde(default)]
    pub instructions: String,

    /// Maximum number of model round-trips that end in tool calls within a
    /// single user turn.  0 = unlimited (the model decides when to stop).
    #[serde(default)]
    pub max_tool_turns: usize,

    /// Console inputs that end the session (matched case-insensitively).
    #[serde(default = "default_exit_words")]
    pub exit_words: Vec<String>,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub workspace: WorkspaceConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

// -- LLM -----------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    /// Model identifier sent with every request.
    /// Can be overridden with the `OPENAI_MODEL` env var.
    #[serde(default = "default_model")]
    pub model: String,

    /// Base URL of a Responses-compatible endpoint.
    /// Can be overridden with the `OPENAI_BASE_URL` env var.
    #[serde(default)]
    pub base_url: String,

    /// API key.  Prefer the `OPENAI_API_KEY` env var over storing it here.
    #[serde(default)]
    pub api_key: String,

    /// Request timeout in seconds (0 = client default of 300s).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Upper bound on generated tokens per response (0 = let the API decide).
    #[serde(default)]
    pub max_output_tokens: usize,
}

// -- Workspace -----------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct WorkspaceConfig {
    /// Directory tool paths are resolved against.
    /// Can be overridden with the `FILE_AGENT_WORKSPACE` env var.
    #[serde(default = "default_workspace_root")]
    pub root: String,

    /// Reject tool paths that resolve outside `root`.
    #[serde(default = "default_true")]
    pub confine: bool,
}

// -- Tools ---------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub edit: EditToolConfig,

    #[serde(default)]
    pub fetch_url: FetchUrlToolConfig,
}

/// How `edit_file` treats repeated occurrences of `previous_text`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplacePolicy {
    /// Replace every occurrence.
    #[default]
    All,
    /// Replace only the first occurrence.
    First,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EditToolConfig {
    #[serde(default)]
    pub replace: ReplacePolicy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FetchUrlToolConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Default truncation limit when the model does not pass `max_chars`.
    #[serde(default = "default_fetch_max_chars")]
    pub max_chars: usize,
}

// -- Server --------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Listen address for `--serve` mode.
    /// Can be overridden with the `FILE_AGENT_BIND` env var or `--bind`.
    #[serde(default = "default_bind")]
    pub bind: String,
}

// -- Defaults ------------------------------------------------------------

fn default_agent_name() -> String {
    "file-agent".to_string()
}
fn default_exit_words() -> Vec<String> {
    vec!["exit".to_string(), "quit".to_string(), "salir".to_string()]
}
fn default_model() -> String {
    "gpt-5-nano".to_string()
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_workspace_root() -> String {
    ".".to_string()
}
fn default_true() -> bool {
    true
}
fn default_fetch_max_chars() -> usize {
    50_000
}
fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

// -- Default impls -------------------------------------------------------

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: String::new(),
            api_key: String::new(),
            timeout_secs: default_timeout_secs(),
            max_output_tokens: 0,
        }
    }
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: default_workspace_root(),
            confine: true,
        }
    }
}

impl Default for FetchUrlToolConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_chars: default_fetch_max_chars(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            agent_name: default_agent_name(),
            instructions: String::new(),
            max_tool_turns: 0,
            exit_words: default_exit_words(),
            llm: LlmConfig::default(),
            workspace: WorkspaceConfig::default(),
            tools: ToolsConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

// -- Config impl ---------------------------------------------------------

impl Config {
    /// Load config from the given path, or the default XDG config location.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_config_path(),
        };

        let config = if config_path.exists() {
            info!("loading config from {}", config_path.display());
            let contents = std::fs::read_to_string(&config_path).map_err(AgentError::Io)?;
            toml::from_str(&contents)
                .map_err(|e| AgentError::Config(format!("parse error: {e}")))?
        } else {
            info!("no config file found, using defaults");
            Config::default()
        };

        Ok(config)
    }

    /// Returns the default config file path: `$XDG_CONFIG_HOME/file-agent/config.toml`
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("file-agent")
            .join("config.toml")
    }

    /// Workspace root, honoring the `FILE_AGENT_WORKSPACE` env var.
    pub fn workspace_root(&self) -> PathBuf {
        std::env::var("FILE_AGENT_WORKSPACE")
            .ok()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(&self.workspace.root))
    }

    /// Server listen address, honoring the `FILE_AGENT_BIND` env var.
    pub fn server_bind(&self) -> String {
        std::env::var("FILE_AGENT_BIND")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.server.bind.clone())
    }

    /// True if `input` is one of the configured exit words.
    pub fn is_exit_word(&self, input: &str) -> bool {
        let input = input.trim();
        self.exit_words.iter().any(|w| w.eq_ignore_ascii_case(input))
    }

    /// Generate the default config file contents.
    pub fn default_config_contents() -> &'static str {
        include_str!("../config.example.toml")
    }
}
