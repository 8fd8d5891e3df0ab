//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.reportbot/config.json`) and environment.
//! Endpoints and secrets may come from either; a non-empty environment variable wins.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Gateway server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Bot Framework connector settings.
    #[serde(default)]
    pub channels: ChannelsConfig,

    /// Where conversation records are kept between turns.
    #[serde(default)]
    pub storage: StorageConfig,

    /// File share holding the leader table, meetings document and session content.
    #[serde(default)]
    pub file_share: FileShareConfig,

    /// File names and column names inside the file share.
    #[serde(default)]
    pub reference: ReferenceConfig,

    /// Remote report-generation service.
    #[serde(default)]
    pub report_service: ReportServiceConfig,

    /// Text-rewrite (chat completion) service used for assistant editing.
    #[serde(default)]
    pub rewrite: RewriteConfig,

    /// Dialogue feature toggles.
    #[serde(default)]
    pub dialogue: DialogueSettings,
}

/// Gateway bind and port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for HTTP (default 3978, the Bot Framework emulator default).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
}

fn default_gateway_port() -> u16 {
    3978
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
        }
    }
}

/// True if the bind address is loopback (127.0.0.1, ::1, etc.).
pub fn is_loopback_bind(bind: &str) -> bool {
    let b = bind.trim();
    b == "127.0.0.1" || b == "::1" || b == "localhost"
}

/// Per-channel config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelsConfig {
    #[serde(default)]
    pub bot_framework: BotFrameworkChannelConfig,
}

/// Bot Framework connector channel config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotFrameworkChannelConfig {
    /// Pre-issued bearer token sent with outbound activities. Overridden by BOT_CONNECTOR_TOKEN env.
    /// Token acquisition is left to the deployment; without one, replies are sent unauthenticated
    /// (which is what the emulator expects).
    pub connector_token: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Records live in process memory and are lost on restart.
    #[default]
    Memory,
    /// Records are kept in a JSON file (see `StorageConfig::path`).
    File,
}

/// Conversation record storage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// JSON file for the file backend (default `conversations.json` next to the config file).
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileShareBackend {
    /// Azure Files REST API authenticated with a SAS token.
    #[default]
    Azure,
    /// A local directory laid out like the share (useful for development and tests).
    Local,
}

/// File share location. Files are addressed as `{directoryName}/{inputsDirectory}/{file}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileShareConfig {
    #[serde(default)]
    pub backend: FileShareBackend,
    /// Storage account name. Overridden by STORAGE_ACCOUNT_NAME env.
    pub storage_account_name: Option<String>,
    /// SAS token (with or without the leading `?`). Overridden by SAS_TOKEN env.
    pub sas_token: Option<String>,
    /// Share name. Overridden by FILE_SHARE_NAME env.
    pub share_name: Option<String>,
    /// Top-level directory inside the share. Overridden by DIRECTORY_NAME env.
    #[serde(default = "default_directory_name")]
    pub directory_name: String,
    /// Sub-directory of `directory_name` holding the input files.
    #[serde(default = "default_inputs_directory")]
    pub inputs_directory: String,
    /// Root directory for the local backend.
    pub local_root: Option<PathBuf>,
    /// Override for the Azure Files endpoint (default `https://{account}.file.core.windows.net`).
    pub endpoint: Option<String>,
}

fn default_directory_name() -> String {
    "reports".to_string()
}

fn default_inputs_directory() -> String {
    "inputs".to_string()
}

impl Default for FileShareConfig {
    fn default() -> Self {
        Self {
            backend: FileShareBackend::default(),
            storage_account_name: None,
            sas_token: None,
            share_name: None,
            directory_name: default_directory_name(),
            inputs_directory: default_inputs_directory(),
            local_root: None,
            endpoint: None,
        }
    }
}

impl FileShareConfig {
    /// Directory path (relative to the share root) that file names are resolved against.
    pub fn inputs_path(&self) -> String {
        let dir = self.directory_name.trim_matches('/');
        let inputs = self.inputs_directory.trim_matches('/');
        match (dir.is_empty(), inputs.is_empty()) {
            (true, true) => String::new(),
            (true, false) => inputs.to_string(),
            (false, true) => dir.to_string(),
            (false, false) => format!("{}/{}", dir, inputs),
        }
    }
}

/// Names of the reference files and of the spreadsheet columns the bot reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceConfig {
    #[serde(default = "default_leader_table_file")]
    pub leader_table_file: String,
    #[serde(default = "default_meetings_file")]
    pub meetings_file: String,
    #[serde(default = "default_session_content_file")]
    pub session_content_file: String,
    #[serde(default = "default_leader_column")]
    pub leader_column: String,
    #[serde(default = "default_new_member_column")]
    pub new_member_column: String,
    #[serde(default = "default_member_name_column")]
    pub member_name_column: String,
}

fn default_leader_table_file() -> String {
    "Tabla_de_Usuarios_Actualizada.xlsx".to_string()
}

fn default_meetings_file() -> String {
    "reuniones.json".to_string()
}

fn default_session_content_file() -> String {
    "contenido_sesion.txt".to_string()
}

fn default_leader_column() -> String {
    "Matricula Lider".to_string()
}

fn default_new_member_column() -> String {
    "Nuevo Miembro".to_string()
}

fn default_member_name_column() -> String {
    "Nombre".to_string()
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            leader_table_file: default_leader_table_file(),
            meetings_file: default_meetings_file(),
            session_content_file: default_session_content_file(),
            leader_column: default_leader_column(),
            new_member_column: default_new_member_column(),
            member_name_column: default_member_name_column(),
        }
    }
}

/// Report-generation service endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportServiceConfig {
    /// Full URL of the generation endpoint. Overridden by REPORT_SERVICE_URL (or AZURE_FUNCTION_URL) env.
    pub url: Option<String>,
    /// Token for the Authorization header. Overridden by REPORT_SERVICE_AUTH_TOKEN (or AZURE_FUNCTION_AUTH_TOKEN) env.
    pub auth_token: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RewriteAuth {
    /// `api-key: <key>` header (Azure OpenAI).
    #[default]
    ApiKey,
    /// `Authorization: Bearer <key>` header (OpenAI-compatible servers).
    Bearer,
}

/// Chat-completion endpoint used to rewrite session content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewriteConfig {
    /// Full chat-completions URL. Overridden by REWRITE_ENDPOINT env.
    pub endpoint: Option<String>,
    /// Overridden by REWRITE_API_KEY env.
    pub api_key: Option<String>,
    #[serde(default)]
    pub auth: RewriteAuth,
    /// Model name sent in the request body; Azure deployments ignore it.
    pub model: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
}

fn default_max_tokens() -> u32 {
    800
}

fn default_temperature() -> f32 {
    0.7
}

fn default_top_p() -> f32 {
    0.95
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            auth: RewriteAuth::default(),
            model: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
        }
    }
}

/// Shape of the first prompt a user sees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MenuShape {
    /// Greeting shows the main menu (generate / agenda / session content).
    #[default]
    Menu,
    /// Greeting asks for the quarter straight away.
    Direct,
}

/// Dialogue feature toggles. One controller covers every bot variant through these.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogueSettings {
    /// Overridden by SHOW_MENU env (true = menu, false = direct).
    #[serde(default)]
    pub menu: MenuShape,
    /// Look up the next meeting's agenda and allow editing it before generation.
    #[serde(default)]
    pub agenda_review: bool,
    /// Offer to revise the session content with the rewrite service.
    #[serde(default)]
    pub assistant_editing: bool,
    /// Skip leader selection and always use this id. Overridden by FIXED_LEADER_ID env.
    pub fixed_leader_id: Option<String>,
    /// Write confirmed agenda changes back to the meetings file.
    #[serde(default)]
    pub write_back_agenda: bool,
}

/// Non-empty, trimmed value of an environment variable.
fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

/// Env value when set, otherwise the trimmed, non-empty config value.
fn env_or_config(name: &str, configured: Option<&String>) -> Option<String> {
    env_any_or_config(&[name], configured)
}

/// First non-empty variable among `names`, in order, else the configured value.
fn env_any_or_config(names: &[&str], configured: Option<&String>) -> Option<String> {
    names.iter().find_map(|name| env_value(name)).or_else(|| {
        configured
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

/// Parse a boolean flag the way deployment scripts write them ("true", "1", "yes", ...).
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "si" | "sí" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Apply environment overrides for endpoints, secrets and the fixed-leader variant.
pub fn apply_env_overrides(config: &mut Config) {
    let share = &mut config.file_share;
    share.storage_account_name =
        env_or_config("STORAGE_ACCOUNT_NAME", share.storage_account_name.as_ref());
    share.sas_token = env_or_config("SAS_TOKEN", share.sas_token.as_ref());
    share.share_name = env_or_config("FILE_SHARE_NAME", share.share_name.as_ref());
    if let Some(dir) = env_value("DIRECTORY_NAME") {
        share.directory_name = dir;
    }

    // AZURE_FUNCTION_* are the names older deployments use.
    let report = &mut config.report_service;
    report.url = env_any_or_config(&["REPORT_SERVICE_URL", "AZURE_FUNCTION_URL"], report.url.as_ref());
    report.auth_token = env_any_or_config(
        &["REPORT_SERVICE_AUTH_TOKEN", "AZURE_FUNCTION_AUTH_TOKEN"],
        report.auth_token.as_ref(),
    );

    let rewrite = &mut config.rewrite;
    rewrite.endpoint = env_or_config("REWRITE_ENDPOINT", rewrite.endpoint.as_ref());
    rewrite.api_key = env_or_config("REWRITE_API_KEY", rewrite.api_key.as_ref());

    let dialogue = &mut config.dialogue;
    dialogue.fixed_leader_id = env_or_config("FIXED_LEADER_ID", dialogue.fixed_leader_id.as_ref());
    if let Some(show) = env_value("SHOW_MENU").and_then(|v| parse_flag(&v)) {
        dialogue.menu = if show { MenuShape::Menu } else { MenuShape::Direct };
    }

    let channels = &mut config.channels;
    channels.bot_framework.connector_token = env_or_config(
        "BOT_CONNECTOR_TOKEN",
        channels.bot_framework.connector_token.as_ref(),
    );
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("REPORTBOT_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".reportbot").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Directory containing the config file ("." when the path has no parent).
pub fn config_dir(config_path: &Path) -> &Path {
    config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Resolve a possibly relative path against the config file's directory.
fn resolve_against_config(path: &Path, config_path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        config_dir(config_path).join(path)
    }
}

/// JSON file used by the file storage backend.
pub fn resolve_storage_path(config: &Config, config_path: &Path) -> PathBuf {
    match &config.storage.path {
        Some(p) if !p.as_os_str().is_empty() => resolve_against_config(p, config_path),
        _ => config_dir(config_path).join("conversations.json"),
    }
}

/// Root directory for the local file-share backend (default `share` next to the config file).
pub fn resolve_local_share_root(config: &Config, config_path: &Path) -> PathBuf {
    match &config.file_share.local_root {
        Some(p) if !p.as_os_str().is_empty() => resolve_against_config(p, config_path),
        _ => config_dir(config_path).join("share"),
    }
}

/// Load config from the default path (or REPORTBOT_CONFIG_PATH). Missing file => default config.
/// Environment overrides are applied on top. Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let mut config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    apply_env_overrides(&mut config);
    Ok((config, path))
}
