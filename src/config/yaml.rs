use serde::Deserialize;
use std::path::Path;

use super::ConfigError;

/// Complete YAML configuration structure
///
/// This structure represents the full configuration that can be loaded from a YAML file.
/// All fields are optional to allow partial configuration. YAML values override
/// environment variables.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 8080
///   public_host: "abc123.ngrok.app"
///
/// llm:
///   api_key: "sk-..."
///   model: "gpt-4o-mini"
///   base_url: "https://api.openai.com/v1"
///
/// relay:
///   system_prompt: "You are a helpful voice assistant."
///   welcome_greeting: "Hi! How can I help?"
///   interrupt_sensitivity: "high"
///
/// compliance:
///   dedup_ttl_ms: 3000
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub llm: Option<LlmYaml>,
    pub relay: Option<RelayYaml>,
    pub compliance: Option<ComplianceYaml>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Public host name without scheme
    pub public_host: Option<String>,
}

/// Language model configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LlmYaml {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
}

/// Call behaviour configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RelayYaml {
    pub system_prompt: Option<String>,
    pub welcome_greeting: Option<String>,
    pub interrupt_sensitivity: Option<String>,
}

/// Compliance feed configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ComplianceYaml {
    pub dedup_ttl_ms: Option<u64>,
}

impl YamlConfig {
    /// Read and parse a YAML configuration file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_str(&contents)
    }

    /// Parse YAML configuration from a string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(contents)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_partial_yaml() {
        let config = YamlConfig::from_str(
            r#"
server:
  port: 3001
"#,
        )
        .unwrap();

        let server = config.server.unwrap();
        assert_eq!(server.port, Some(3001));
        assert!(server.host.is_none());
        assert!(config.llm.is_none());
    }

    #[test]
    fn test_parse_empty_yaml() {
        let config = YamlConfig::from_str("{}").unwrap();
        assert!(config.server.is_none());
        assert!(config.relay.is_none());
    }

    #[test]
    fn test_parse_full_yaml() {
        let config = YamlConfig::from_str(
            r#"
server:
  host: "127.0.0.1"
  port: 8080
  public_host: "abc.ngrok.app"
llm:
  api_key: "sk-yaml"
  model: "gpt-4o"
  base_url: "http://localhost:11434/v1"
relay:
  system_prompt: "Be brief."
  welcome_greeting: "Hello!"
  interrupt_sensitivity: "medium"
compliance:
  dedup_ttl_ms: 500
"#,
        )
        .unwrap();

        assert_eq!(config.llm.as_ref().unwrap().model.as_deref(), Some("gpt-4o"));
        assert_eq!(
            config.relay.as_ref().unwrap().interrupt_sensitivity.as_deref(),
            Some("medium")
        );
        assert_eq!(config.compliance.unwrap().dedup_ttl_ms, Some(500));
    }
}
