use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::MonitorError;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default, rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default = "default_threads")]
    pub threads: usize,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub site: BTreeMap<String, SiteConfig>,
    #[serde(default)]
    pub search: Vec<SignatureConfig>,
    #[serde(default)]
    pub includes: Vec<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct NetworkConfig {
    /// Source IP for outbound connections. Bound per-connection at the HTTP layer.
    pub ip: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ArchiveConfig {
    /// Root directory for pasties that matched a signature.
    #[serde(default)]
    pub dir: String,
    /// Root directory for every downloaded pasty.
    #[serde(default, rename = "dir-all")]
    pub dir_all: String,
    #[serde(default)]
    pub save: bool,
    #[serde(default, rename = "save-all")]
    pub save_all: bool,
    #[serde(default)]
    pub compress: bool,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ProxyConfig {
    #[serde(default)]
    pub random: bool,
    pub file: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct UserAgentConfig {
    #[serde(default)]
    pub random: bool,
    pub file: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    #[serde(default)]
    pub queue: bool,
    #[serde(default = "default_redis_server")]
    pub server: String,
    #[serde(default = "default_redis_port")]
    pub port: u16,
    #[serde(default)]
    pub database: i64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            queue: false,
            server: default_redis_server(),
            port: default_redis_port(),
            database: 0,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DbConfig {
    pub sqlite3: Option<Sqlite3Config>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Sqlite3Config {
    #[serde(default)]
    pub enable: bool,
    pub file: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmailConfig {
    #[serde(default)]
    pub alert: bool,
    #[serde(default = "default_smtp_server")]
    pub server: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default = "default_subject")]
    pub subject: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            alert: false,
            server: default_smtp_server(),
            port: default_smtp_port(),
            from: String::new(),
            to: String::new(),
            subject: default_subject(),
            username: None,
            password: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SiteConfig {
    #[serde(default)]
    pub enable: bool,
    #[serde(rename = "download-url")]
    pub download_url: String,
    #[serde(rename = "archive-url")]
    pub archive_url: String,
    #[serde(rename = "archive-regex")]
    pub archive_regex: String,
    #[serde(rename = "update-min")]
    pub update_min: Option<u64>,
    #[serde(rename = "update-max")]
    pub update_max: Option<u64>,
    #[serde(rename = "pastie-classname")]
    pub pastie_classname: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SignatureConfig {
    pub search: String,
    pub description: Option<String>,
    pub exclude: Option<String>,
    pub count: Option<usize>,
    /// Extra recipients, comma separated.
    pub to: Option<String>,
    pub public: Option<bool>,
    #[serde(rename = "regex-flags")]
    pub regex_flags: Option<String>,
}

fn default_threads() -> usize {
    3
}

fn default_redis_server() -> String {
    "localhost".to_string()
}

fn default_redis_port() -> u16 {
    6379
}

fn default_smtp_server() -> String {
    "localhost".to_string()
}

fn default_smtp_port() -> u16 {
    25
}

fn default_subject() -> String {
    "pastewatch alert: {subject}".to_string()
}

impl AppConfig {
    /// Load a YAML config file, merging the top-level keys of every file
    /// listed under `includes` over the base mapping.
    pub fn load(path: &Path) -> Result<Self, MonitorError> {
        let text = fs::read_to_string(path).map_err(|e| {
            MonitorError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let mut root: serde_yaml::Value = serde_yaml::from_str(&text)
            .map_err(|e| MonitorError::Config(format!("{}: {}", path.display(), e)))?;

        let includes: Vec<String> = root
            .get("includes")
            .and_then(|v| v.as_sequence())
            .map(|seq| {
                seq.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        for include in &includes {
            let text = fs::read_to_string(include).map_err(|e| {
                MonitorError::Config(format!("cannot read include {}: {}", include, e))
            })?;
            let extra: serde_yaml::Value = serde_yaml::from_str(&text)
                .map_err(|e| MonitorError::Config(format!("{}: {}", include, e)))?;
            if let (Some(base), Some(extra)) = (root.as_mapping_mut(), extra.as_mapping()) {
                for (key, value) in extra {
                    base.insert(key.clone(), value.clone());
                }
            }
        }

        let config: AppConfig = serde_yaml::from_value(root)
            .map_err(|e| MonitorError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.threads == 0 {
            return Err(MonitorError::Config("threads must be at least 1".into()));
        }
        if self.archive.save && self.archive.dir.is_empty() {
            return Err(MonitorError::Config(
                "archive.save is enabled but archive.dir is not set".into(),
            ));
        }
        if self.archive.save_all && self.archive.dir_all.is_empty() {
            return Err(MonitorError::Config(
                "archive.save-all is enabled but archive.dir-all is not set".into(),
            ));
        }
        if self.proxy.random && self.proxy.file.is_none() {
            return Err(MonitorError::Config(
                "proxy.random is enabled but proxy.file is not set".into(),
            ));
        }
        if self.user_agent.random && self.user_agent.file.is_none() {
            return Err(MonitorError::Config(
                "user-agent.random is enabled but user-agent.file is not set".into(),
            ));
        }
        if self.email.alert {
            if self.email.from.is_empty() || self.email.to.is_empty() {
                return Err(MonitorError::Config(
                    "email.alert is enabled but email.from or email.to is not set".into(),
                ));
            }
        }
        for (name, site) in &self.site {
            if !site.enable {
                continue;
            }
            if !site.download_url.contains("{id}") {
                return Err(MonitorError::Config(format!(
                    "site {}: download-url has no {{id}} placeholder",
                    name
                )));
            }
            url::Url::parse(&site.archive_url).map_err(|e| {
                MonitorError::Config(format!("site {}: invalid archive-url: {}", name, e))
            })?;
            regex::Regex::new(&site.archive_regex).map_err(|e| {
                MonitorError::Config(format!("site {}: invalid archive-regex: {}", name, e))
            })?;
            if let (Some(min), Some(max)) = (site.update_min, site.update_max) {
                if min > max {
                    return Err(MonitorError::Config(format!(
                        "site {}: update-min exceeds update-max",
                        name
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn enabled_sites(&self) -> impl Iterator<Item = (&String, &SiteConfig)> {
        self.site.iter().filter(|(_, cfg)| cfg.enable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
archive:
  dir: alerts
  dir-all: archive
  save: true
  save-all: true
site:
  demo:
    enable: true
    download-url: "https://paste.example/raw/{id}"
    archive-url: "https://paste.example/archive"
    archive-regex: '<a href="/(\w{8})">'
search:
  - search: 'AKIA[0-9A-Z]{16}'
    description: aws-key
"#;

    #[test]
    fn test_parse_minimal_config() {
        let config: AppConfig = serde_yaml::from_str(MINIMAL).unwrap();
        config.validate().unwrap();
        assert_eq!(config.threads, 3);
        assert_eq!(config.site.len(), 1);
        let site = &config.site["demo"];
        assert!(site.enable);
        assert_eq!(site.download_url, "https://paste.example/raw/{id}");
        assert_eq!(config.search[0].description.as_deref(), Some("aws-key"));
    }

    #[test]
    fn test_missing_id_placeholder_rejected() {
        let broken = MINIMAL.replace("{id}", "nope");
        let config: AppConfig = serde_yaml::from_str(&broken).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_archive_regex_rejected() {
        let broken = MINIMAL.replace(r"(\w{8})", "([unclosed");
        let config: AppConfig = serde_yaml::from_str(&broken).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_includes_merge_overrides_top_level_keys() {
        let dir = std::env::temp_dir().join(format!("pastewatch-cfg-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let extra_path = dir.join("extra.yaml");
        let mut extra = std::fs::File::create(&extra_path).unwrap();
        write!(extra, "threads: 7\n").unwrap();

        let base_path = dir.join("base.yaml");
        let mut base = std::fs::File::create(&base_path).unwrap();
        write!(
            base,
            "{}\nincludes:\n  - {}\n",
            MINIMAL,
            extra_path.display()
        )
        .unwrap();

        let config = AppConfig::load(&base_path).unwrap();
        assert_eq!(config.threads, 7);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_email_alert_requires_addresses() {
        let mut config: AppConfig = serde_yaml::from_str(MINIMAL).unwrap();
        config.email.alert = true;
        assert!(config.validate().is_err());
        config.email.from = "monitor@example.org".into();
        config.email.to = "soc@example.org".into();
        config.validate().unwrap();
    }
}
