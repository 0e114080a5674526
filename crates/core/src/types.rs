use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::Regex;
use tracing::debug;

use crate::config::{AppConfig, SignatureConfig, SiteConfig};
use crate::error::MonitorError;

/// A monitored paste site. Immutable after configuration load.
#[derive(Debug)]
pub struct Site {
    pub name: String,
    /// URL template with an `{id}` placeholder.
    pub download_url: String,
    /// Index page listing recent pasty IDs.
    pub archive_url: String,
    /// Extracts pasty IDs from the index page body.
    pub id_regex: Regex,
    pub update_min: u64,
    pub update_max: u64,
    /// Body-decode strategy tag (`pastie-classname` in the config).
    pub decoder_tag: Option<String>,
    pub workers: usize,
    /// `<archive.dir>/<name>`, pasties that matched a signature.
    pub save_dir: PathBuf,
    /// `<archive.dir-all>/<name>`, every downloaded pasty.
    pub archive_dir: PathBuf,
    pub compress: bool,
}

impl Site {
    pub fn from_config(name: &str, cfg: &SiteConfig, app: &AppConfig) -> Result<Self, MonitorError> {
        let id_regex = Regex::new(&cfg.archive_regex).map_err(|e| {
            MonitorError::Config(format!("site {}: invalid archive-regex: {}", name, e))
        })?;
        Ok(Self {
            name: name.to_string(),
            download_url: cfg.download_url.clone(),
            archive_url: cfg.archive_url.clone(),
            id_regex,
            update_min: cfg.update_min.unwrap_or(10),
            update_max: cfg.update_max.unwrap_or(30),
            decoder_tag: cfg.pastie_classname.clone(),
            workers: app.threads,
            save_dir: Path::new(&app.archive.dir).join(name),
            archive_dir: Path::new(&app.archive.dir_all).join(name),
            compress: app.archive.compress,
        })
    }

    pub fn pasty_url(&self, id: &str) -> String {
        self.download_url.replace("{id}", id)
    }

    /// Archive filename for a pasty ID. Slashes would escape the date
    /// partition, so they are mapped to underscores.
    pub fn filename_for(&self, id: &str) -> String {
        let mut filename = id.replace('/', "_");
        if self.compress {
            filename.push_str(".gz");
        }
        filename
    }

    /// Extract pasty IDs from an index page, in page order. Uses the first
    /// capture group when the regex has one, the whole match otherwise.
    pub fn extract_ids(&self, html: &str) -> Vec<String> {
        self.id_regex
            .captures_iter(html)
            .filter_map(|caps| {
                caps.get(1)
                    .or_else(|| caps.get(0))
                    .map(|m| m.as_str().to_string())
            })
            .collect()
    }
}

/// A compiled search signature.
#[derive(Debug)]
pub struct Signature {
    pub search: Regex,
    pub exclude: Option<Regex>,
    /// Minimum number of non-overlapping `search` hits required.
    pub count: usize,
    pub description: Option<String>,
    /// Extra alert recipients for this signature.
    pub recipients: Vec<String>,
    pub public: bool,
    /// The raw search pattern, used as the label when there is no description.
    pub pattern: String,
}

impl Signature {
    pub fn compile(cfg: &SignatureConfig) -> Result<Self, MonitorError> {
        let flags = match &cfg.regex_flags {
            Some(flags) => {
                if let Some(bad) = flags.chars().find(|c| !"imsxU".contains(*c)) {
                    return Err(MonitorError::Config(format!(
                        "signature {:?}: unsupported regex flag {:?}",
                        cfg.search, bad
                    )));
                }
                flags.clone()
            }
            None => "i".to_string(),
        };
        let compile = |pattern: &str| -> Result<Regex, MonitorError> {
            Regex::new(&format!("(?{}){}", flags, pattern)).map_err(|e| {
                MonitorError::Config(format!("signature {:?}: {}", cfg.search, e))
            })
        };
        let search = compile(&cfg.search)?;
        let exclude = cfg.exclude.as_deref().map(compile).transpose()?;
        let recipients = cfg
            .to
            .as_deref()
            .map(|to| {
                to.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok(Self {
            search,
            exclude,
            count: cfg.count.unwrap_or(1),
            description: cfg.description.clone(),
            recipients,
            public: cfg.public.unwrap_or(false),
            pattern: cfg.search.clone(),
        })
    }

    pub fn label(&self) -> &str {
        self.description.as_deref().unwrap_or(&self.pattern)
    }
}

/// Render an ordered hit list as `[label, label]`, empty string for no hits.
pub fn matches_to_text(matches: &[Arc<Signature>]) -> String {
    if matches.is_empty() {
        return String::new();
    }
    let labels: Vec<&str> = matches.iter().map(|s| s.label()).collect();
    format!("[{}]", labels.join(", "))
}

/// One text snippet, owned by a single fetch worker between dequeue and
/// completion.
#[derive(Debug)]
pub struct Pasty {
    pub site: Arc<Site>,
    pub id: String,
    pub url: String,
    pub body: Option<String>,
    pub md5: Option<String>,
    pub matches: Vec<Arc<Signature>>,
    pub public: bool,
    pub local_path: Option<PathBuf>,
}

impl Pasty {
    pub fn new(site: Arc<Site>, id: String) -> Self {
        let url = site.pasty_url(&id);
        Self {
            site,
            id,
            url,
            body: None,
            md5: None,
            matches: Vec::new(),
            public: false,
            local_path: None,
        }
    }

    pub fn hash_body(&mut self) {
        if let Some(body) = &self.body {
            let digest = format!("{:x}", md5::compute(body.as_bytes()));
            debug!(site = %self.site.name, id = %self.id, md5 = %digest, "hashed pasty");
            self.md5 = Some(digest);
        }
    }

    /// Snapshot for the durable store.
    pub fn record(&self) -> PastyRecord {
        PastyRecord {
            site: self.site.name.clone(),
            id: self.id.clone(),
            md5: self.md5.clone().unwrap_or_default(),
            url: self.url.clone(),
            local_path: self
                .local_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            matches: matches_to_text(&self.matches),
        }
    }
}

/// Row shape of the durable catalog, keyed by `(site, id)`.
#[derive(Debug, Clone)]
pub struct PastyRecord {
    pub site: String,
    pub id: String,
    pub md5: String,
    pub url: String,
    pub local_path: String,
    pub matches: String,
}
