use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{Datelike, Local};
use flate2::write::GzEncoder;
use flate2::Compression;
use redis::AsyncCommands;
use tracing::{debug, warn};

use pastewatch_core::{MonitorError, Pasty};

/// External list that receives archived file paths.
const PASTES_LIST: &str = "pastes";

/// Writes pasty bodies into a date-partitioned tree:
/// `<root>/YYYY/MM/DD/<sanitized id>[.gz]`.
pub struct ArchiveWriter;

impl ArchiveWriter {
    /// Write the body under `root`, fsync it, and return the absolute path.
    /// Two workers racing on directory creation is fine; two workers racing
    /// on the same filename would be a dedup bug upstream, and the later
    /// write wins.
    pub fn write(pasty: &Pasty, root: &Path) -> Result<PathBuf, MonitorError> {
        let body = pasty
            .body
            .as_deref()
            .ok_or_else(|| MonitorError::Archive("pasty body not set".into()))?;

        let today = Local::now();
        let dir = root
            .join(format!("{:04}", today.year()))
            .join(format!("{:02}", today.month()))
            .join(format!("{:02}", today.day()));
        fs::create_dir_all(&dir)
            .map_err(|e| MonitorError::Archive(format!("{}: {}", dir.display(), e)))?;

        let path = dir.join(pasty.site.filename_for(&pasty.id));
        let map_err =
            |e: std::io::Error| MonitorError::Archive(format!("{}: {}", path.display(), e));

        let file = File::create(&path).map_err(map_err)?;
        let mut file = if pasty.site.compress {
            let mut encoder = GzEncoder::new(file, Compression::default());
            encoder.write_all(body.as_bytes()).map_err(map_err)?;
            encoder.finish().map_err(map_err)?
        } else {
            let mut file = file;
            file.write_all(body.as_bytes()).map_err(map_err)?;
            file
        };
        file.flush().map_err(map_err)?;
        file.sync_all().map_err(map_err)?;

        let absolute = path.canonicalize().unwrap_or(path);
        debug!(site = %pasty.site.name, id = %pasty.id, path = %absolute.display(), "archived pasty");
        Ok(absolute)
    }
}

/// Pushes archived file paths onto an external Redis list for downstream
/// consumers. Publish failures are logged and dropped.
pub struct PathPublisher {
    client: redis::Client,
}

impl PathPublisher {
    pub fn new(server: &str, port: u16, database: i64) -> Result<Self, MonitorError> {
        let url = format!("redis://{}:{}/{}", server, port, database);
        let client = redis::Client::open(url)
            .map_err(|e| MonitorError::Config(format!("redis: {}", e)))?;
        Ok(Self { client })
    }

    pub async fn publish(&self, path: &Path) {
        if let Err(e) = self.try_publish(path).await {
            warn!(path = %path.display(), error = %e, "failed to publish archive path to redis");
        }
    }

    async fn try_publish(&self, path: &Path) -> Result<(), redis::RedisError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.lpush::<_, _, ()>(PASTES_LIST, path.display().to_string())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pastewatch_core::config::AppConfig;
    use pastewatch_core::Site;
    use std::io::Read;
    use std::sync::Arc;

    fn site(compress: bool) -> Arc<Site> {
        let yaml = format!(
            r#"
archive:
  dir: alerts
  dir-all: archive
  compress: {}
site:
  demo:
    enable: true
    download-url: "https://paste.example/raw/{{id}}"
    archive-url: "https://paste.example/archive"
    archive-regex: '<a href="/(\w+)">'
"#,
            compress
        );
        let app: AppConfig = serde_yaml::from_str(&yaml).unwrap();
        Arc::new(Site::from_config("demo", &app.site["demo"], &app).unwrap())
    }

    fn pasty(site: Arc<Site>, id: &str, body: &str) -> Pasty {
        let mut pasty = Pasty::new(site, id.into());
        pasty.body = Some(body.into());
        pasty
    }

    fn date_dir(root: &Path) -> PathBuf {
        let today = Local::now();
        root.join(format!("{:04}", today.year()))
            .join(format!("{:02}", today.month()))
            .join(format!("{:02}", today.day()))
    }

    #[test]
    fn test_write_plain_body() {
        let root = tempfile::tempdir().unwrap();
        let path = ArchiveWriter::write(&pasty(site(false), "abc", "hello"), root.path()).unwrap();
        assert!(path.is_absolute());
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello");
        assert_eq!(
            path,
            date_dir(root.path()).join("abc").canonicalize().unwrap()
        );
    }

    #[test]
    fn test_write_compressed_body_roundtrips() {
        let root = tempfile::tempdir().unwrap();
        let path =
            ArchiveWriter::write(&pasty(site(true), "abc", "compress me"), root.path()).unwrap();
        assert!(path.to_string_lossy().ends_with("abc.gz"));
        let mut decoder = flate2::read::GzDecoder::new(File::open(&path).unwrap());
        let mut body = String::new();
        decoder.read_to_string(&mut body).unwrap();
        assert_eq!(body, "compress me");
    }

    #[test]
    fn test_rewrite_same_filename_keeps_later_content() {
        let root = tempfile::tempdir().unwrap();
        let site = site(false);
        ArchiveWriter::write(&pasty(site.clone(), "abc", "first"), root.path()).unwrap();
        let path = ArchiveWriter::write(&pasty(site, "abc", "second"), root.path()).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
        assert_eq!(fs::read_dir(path.parent().unwrap()).unwrap().count(), 1);
    }

    #[test]
    fn test_slashes_in_id_stay_inside_date_dir() {
        let root = tempfile::tempdir().unwrap();
        let path =
            ArchiveWriter::write(&pasty(site(false), "raw/abc", "x"), root.path()).unwrap();
        assert!(path.to_string_lossy().ends_with("raw_abc"));
        assert_eq!(path.parent().unwrap(), date_dir(root.path()).canonicalize().unwrap());
    }

    #[test]
    fn test_missing_body_is_an_error() {
        let root = tempfile::tempdir().unwrap();
        let empty = Pasty::new(site(false), "abc".into());
        assert!(ArchiveWriter::write(&empty, root.path()).is_err());
    }
}
