use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub trust_service: TrustServiceConfig,
    #[serde(default)]
    pub operator: OperatorConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrustServiceConfig {
    /// Base URL, e.g. `http://192.168.3.210:8001`
    pub url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl TrustServiceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_timeout_secs() -> u64 {
    10
}

/// Who is asking for the PIN. There is deliberately no default role.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OperatorConfig {
    pub role: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScannerConfig {
    /// Live camera decoder; prints one decoded symbol per line on stdout
    #[serde(default = "default_camera_command")]
    pub camera_command: Vec<String>,
    /// Still-image decoder; the image path is appended as the last argument
    #[serde(default = "default_image_command")]
    pub image_command: Vec<String>,
    /// Reject QR payloads with missing fields instead of substituting "N/A"
    #[serde(default)]
    pub strict_payload: bool,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            camera_command: default_camera_command(),
            image_command: default_image_command(),
            strict_payload: false,
        }
    }
}

fn default_camera_command() -> Vec<String> {
    vec!["zbarcam".into(), "--raw".into(), "--nodisplay".into()]
}

fn default_image_command() -> Vec<String> {
    vec!["zbarimg".into(), "--raw".into(), "-q".into()]
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
    /// Where secret keys are persisted. In-memory only when unset.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file {:?}: {}", path, e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file: {}", e))?;
        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            trust_service: TrustServiceConfig {
                url: "http://127.0.0.1:8001".to_string(),
                timeout_secs: default_timeout_secs(),
            },
            operator: OperatorConfig::default(),
            scanner: ScannerConfig::default(),
            cache: CacheConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config = Config::parse(
            r#"
            [trust_service]
            url = "http://192.168.3.210:8001"
            timeout_secs = 3

            [operator]
            role = "technician"

            [scanner]
            camera_command = ["my-cam"]
            image_command = ["my-img", "--quiet"]
            strict_payload = true

            [cache]
            path = "/tmp/keys.json"

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.trust_service.url, "http://192.168.3.210:8001");
        assert_eq!(config.trust_service.timeout(), Duration::from_secs(3));
        assert_eq!(config.operator.role.as_deref(), Some("technician"));
        assert_eq!(config.scanner.camera_command, vec!["my-cam"]);
        assert!(config.scanner.strict_payload);
        assert_eq!(config.cache.path, Some(PathBuf::from("/tmp/keys.json")));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_optional_sections_fall_back_to_defaults() {
        let config = Config::parse(
            r#"
            [trust_service]
            url = "http://localhost:8001"

            [logging]
            level = "info"
            "#,
        )
        .unwrap();

        assert_eq!(config.trust_service.timeout_secs, 10);
        assert!(config.operator.role.is_none());
        assert_eq!(config.scanner.image_command[0], "zbarimg");
        assert!(!config.scanner.strict_payload);
        assert!(config.cache.path.is_none());
    }

    #[test]
    fn test_missing_trust_service_is_an_error() {
        assert!(Config::parse("[logging]\nlevel = \"info\"\n").is_err());
    }
}
