use std::path::{Path, PathBuf};

use clap::Parser;

#[derive(Parser)]
#[command(name = "pastewatch", about = "Paste-site monitor & signature alerter")]
pub struct Cli {
    /// Load configuration from file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Run in background as a daemon (NOT IMPLEMENTED)
    #[arg(short, long)]
    pub daemon: bool,

    /// Display statistics about the running workers (NOT IMPLEMENTED)
    #[arg(short, long)]
    pub stats: bool,

    /// Output more information
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Resolve the config file: `-c` wins, then `/etc/pastewatch.yaml`, then
    /// `./pastewatch.yaml`, then a `.yaml` next to the executable.
    pub fn config_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config {
            return Some(path.clone());
        }
        for candidate in ["/etc/pastewatch.yaml", "pastewatch.yaml"] {
            if Path::new(candidate).is_file() {
                return Some(PathBuf::from(candidate));
            }
        }
        if let Ok(exe) = std::env::current_exe() {
            let candidate = exe.with_extension("yaml");
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        None
    }
}
