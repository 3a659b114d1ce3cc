use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub servers: ServersConfig,
    #[serde(default)]
    pub period: PeriodConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServersConfig {
    #[serde(default)]
    pub knowledge_repo: ServerEndpoint,
    #[serde(default)]
    pub data_repo: ServerEndpoint,
    #[serde(default)]
    pub evaluation: ServerEndpoint,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServerEndpoint {
    #[serde(default)]
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

impl ServerEndpoint {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            access_token: None,
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.base_url.trim().is_empty()
    }

    pub fn base(&self) -> String {
        format!("{}/", self.base_url.trim_end_matches('/'))
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base())
    }

    pub fn token(&self) -> Option<&str> {
        self.access_token
            .as_deref()
            .filter(|token| !token.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodConfig {
    #[serde(default = "default_period_start")]
    pub start: String,
    #[serde(default = "default_period_end")]
    pub end: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub knowledge_repo: Option<String>,
    pub data_repo: Option<String>,
    pub evaluation: Option<String>,
    pub access_token: Option<String>,
    pub period_start: Option<String>,
    pub period_end: Option<String>,
}

impl Config {
    pub fn default_path() -> PathBuf {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.join(".config/measure-probe/config.toml")
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(|p| p.to_path_buf())
            .unwrap_or_else(Self::default_path);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(&path)
            .with_context(|| format!("failed reading config: {}", path.display()))?;
        let parsed: Self = toml::from_str(&data)
            .with_context(|| format!("failed parsing TOML config: {}", path.display()))?;
        Ok(parsed)
    }

    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(url) = overrides.knowledge_repo {
            self.servers.knowledge_repo.base_url = url;
        }
        if let Some(url) = overrides.data_repo {
            self.servers.data_repo.base_url = url;
        }
        if let Some(url) = overrides.evaluation {
            self.servers.evaluation.base_url = url;
        }
        if let Some(token) = overrides.access_token {
            self.servers.knowledge_repo.access_token = Some(token.clone());
            self.servers.data_repo.access_token = Some(token.clone());
            self.servers.evaluation.access_token = Some(token);
        }
        if let Some(start) = overrides.period_start {
            self.period.start = start;
        }
        if let Some(end) = overrides.period_end {
            self.period.end = end;
        }
    }

    pub fn redacted(&self) -> Self {
        let mut masked = self.clone();
        for endpoint in [
            &mut masked.servers.knowledge_repo,
            &mut masked.servers.data_repo,
            &mut masked.servers.evaluation,
        ] {
            if endpoint.access_token.is_some() {
                endpoint.access_token = Some("***".to_string());
            }
        }
        masked
    }

    pub fn write_template(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed creating config directory: {}", parent.display())
            })?;
        }
        fs::write(path, Self::default_template())
            .with_context(|| format!("failed writing config template: {}", path.display()))
    }

    pub fn default_template() -> String {
        let template = r#"[servers.knowledge_repo]
base_url = "http://localhost:8080/fhir"
# access_token = ""

[servers.data_repo]
base_url = "http://localhost:8081/fhir"
# access_token = ""

[servers.evaluation]
base_url = "http://localhost:8082/fhir"
# access_token = ""

[period]
start = "2026-01-01"
end = "2026-12-31"

[fetch]
page_size = 200
"#;
        template.to_string()
    }
}

impl Default for PeriodConfig {
    fn default() -> Self {
        Self {
            start: default_period_start(),
            end: default_period_end(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

fn default_period_start() -> String {
    format!("{}-01-01", Utc::now().year())
}

fn default_period_end() -> String {
    format!("{}-12-31", Utc::now().year())
}

fn default_page_size() -> u32 {
    200
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_parses_into_config() {
        let config: Config =
            toml::from_str(&Config::default_template()).expect("template should parse");
        assert_eq!(
            config.servers.knowledge_repo.base_url,
            "http://localhost:8080/fhir"
        );
        assert_eq!(config.period.start, "2026-01-01");
        assert_eq!(config.fetch.page_size, 200);
    }

    #[test]
    fn empty_config_falls_back_to_defaults() {
        let config: Config = toml::from_str("").expect("empty config should parse");
        assert!(!config.servers.evaluation.is_configured());
        assert!(config.period.start.ends_with("-01-01"));
        assert_eq!(config.fetch.page_size, 200);
    }

    #[test]
    fn overrides_win_and_token_fans_out() {
        let mut config = Config::default();
        config.apply_overrides(ConfigOverrides {
            evaluation: Some("http://example.org/fhir".to_string()),
            access_token: Some("secret".to_string()),
            period_start: Some("2025-07-01".to_string()),
            ..ConfigOverrides::default()
        });
        assert_eq!(config.servers.evaluation.base_url, "http://example.org/fhir");
        assert_eq!(config.servers.knowledge_repo.token(), Some("secret"));
        assert_eq!(config.servers.data_repo.token(), Some("secret"));
        assert_eq!(config.period.start, "2025-07-01");
    }

    #[test]
    fn endpoint_urls_join_cleanly() {
        let plain = ServerEndpoint::new("http://localhost:8080/fhir");
        let slashed = ServerEndpoint::new("http://localhost:8080/fhir/");
        assert_eq!(plain.url("Measure?_count=10"), slashed.url("Measure?_count=10"));
        assert_eq!(
            plain.url("Measure?_count=10"),
            "http://localhost:8080/fhir/Measure?_count=10"
        );
    }

    #[test]
    fn blank_tokens_are_ignored_and_secrets_redacted() {
        let mut endpoint = ServerEndpoint::new("http://localhost:8080/fhir");
        endpoint.access_token = Some("  ".to_string());
        assert_eq!(endpoint.token(), None);

        let mut config = Config::default();
        config.servers.evaluation.access_token = Some("secret".to_string());
        let masked = config.redacted();
        assert_eq!(masked.servers.evaluation.access_token.as_deref(), Some("***"));
        assert_eq!(config.servers.evaluation.access_token.as_deref(), Some("secret"));
    }
}
