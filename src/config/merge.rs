//! Merge environment variables with optional YAML overrides.

use super::env::{first_var, parse_var, var};
use super::yaml::YamlConfig;
use super::{
    ConfigError, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_SYSTEM_PROMPT,
    DEFAULT_TRANSCRIPT_DEDUP_TTL_MS, DEFAULT_WELCOME_GREETING, InterruptSensitivity,
    ServerConfig,
};
use crate::core::llm::openai::{OPENAI_DEFAULT_BASE_URL, OPENAI_DEFAULT_MODEL};

/// Environment variables naming the public host, in lookup order
const PUBLIC_HOST_VARS: &[&str] = &["NGROK_URL", "PUBLIC_HOST"];

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Build the final configuration: YAML value, else ENV value, else default.
pub(super) fn merge_config(yaml: Option<YamlConfig>) -> Result<ServerConfig, ConfigError> {
    let yaml = yaml.unwrap_or_default();
    let server = yaml.server.unwrap_or_default();
    let llm = yaml.llm.unwrap_or_default();
    let relay = yaml.relay.unwrap_or_default();
    let compliance = yaml.compliance.unwrap_or_default();

    let host = non_blank(server.host)
        .or_else(|| var("HOST"))
        .unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = match server.port {
        Some(port) => port,
        None => parse_var::<u16>("PORT")?.unwrap_or(DEFAULT_PORT),
    };

    let public_host = non_blank(server.public_host)
        .or_else(|| first_var(PUBLIC_HOST_VARS))
        .ok_or(ConfigError::Missing("NGROK_URL"))?;

    let openai_api_key = non_blank(llm.api_key)
        .or_else(|| var("OPENAI_API_KEY"))
        .ok_or(ConfigError::Missing("OPENAI_API_KEY"))?;

    let openai_model = non_blank(llm.model)
        .or_else(|| var("OPENAI_MODEL"))
        .unwrap_or_else(|| OPENAI_DEFAULT_MODEL.to_string());

    let openai_base_url = non_blank(llm.base_url)
        .or_else(|| var("OPENAI_BASE_URL"))
        .unwrap_or_else(|| OPENAI_DEFAULT_BASE_URL.to_string());

    let system_prompt = non_blank(relay.system_prompt)
        .or_else(|| var("SYSTEM_PROMPT"))
        .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());

    let welcome_greeting = non_blank(relay.welcome_greeting)
        .or_else(|| var("WELCOME_GREETING"))
        .unwrap_or_else(|| DEFAULT_WELCOME_GREETING.to_string());

    let interrupt_sensitivity = match non_blank(relay.interrupt_sensitivity) {
        Some(raw) => raw
            .parse::<InterruptSensitivity>()
            .map_err(|reason| ConfigError::Invalid {
                field: "interrupt_sensitivity",
                reason,
            })?,
        None => parse_var::<InterruptSensitivity>("INTERRUPT_SENSITIVITY")?.unwrap_or_default(),
    };

    let transcript_dedup_ttl_ms = match compliance.dedup_ttl_ms {
        Some(ttl) => ttl,
        None => parse_var::<u64>("TRANSCRIPT_DEDUP_TTL_MS")?
            .unwrap_or(DEFAULT_TRANSCRIPT_DEDUP_TTL_MS),
    };

    Ok(ServerConfig {
        host,
        port,
        public_host,
        openai_api_key,
        openai_model,
        openai_base_url,
        system_prompt,
        welcome_greeting,
        interrupt_sensitivity,
        transcript_dedup_ttl_ms,
    })
}
