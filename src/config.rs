use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::fs;
use anyhow::{Context, Result};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub dataset: DatasetConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatasetConfig {
    pub url: String,
    pub path: Option<PathBuf>, // Local JSON file, takes precedence over `url`
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    pub port: u16,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)
            .with_context(|| "Failed to parse TOML configuration")?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_full_config() {
        let config = AppConfig::from_toml_str(
            r#"
            [dataset]
            url = "https://example.org/catasto.json"
            path = "data/catasto.json"

            [server]
            host = "0.0.0.0"
            port = 8080
            "#,
        )
        .unwrap();

        assert_eq!(config.dataset.url, "https://example.org/catasto.json");
        assert_eq!(config.dataset.path, Some(PathBuf::from("data/catasto.json")));
        assert_eq!(config.server.host, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn host_defaults_to_localhost() {
        let config = AppConfig::from_toml_str(
            r#"
            [dataset]
            url = "https://example.org/catasto.json"

            [server]
            port = 5000
            "#,
        )
        .unwrap();

        assert_eq!(config.server.host, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert!(config.dataset.path.is_none());
    }

    #[test]
    fn missing_section_is_an_error() {
        let err = AppConfig::from_toml_str("[server]\nport = 5000\n").unwrap_err();
        assert!(err.to_string().contains("Failed to parse TOML"));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[dataset]\nurl = \"http://localhost/data.json\"\n\n[server]\nport = 9000"
        )
        .unwrap();

        let config = AppConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = AppConfig::load_from_file(Path::new("/nonexistent/catasto.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
