use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::schema::ConvoyConfig;

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["convoy.toml", "convoy.yaml", "convoy.yml", "convoy.json"];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<ConvoyConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./convoy.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/convoy/convoy.{toml,yaml,yml,json}` (user-global)
///
/// Returns `ConvoyConfig::default()` if no config file is found.
pub fn discover_and_load() -> ConvoyConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    ConvoyConfig::default()
}

/// Find the first config file in standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    // Project-local
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    // User-global: ~/.config/convoy/
    if let Some(dirs) = directories::ProjectDirs::from("", "", "convoy") {
        let config_dir = dirs.config_dir();
        for name in CONFIG_FILENAMES {
            let p = config_dir.join(name);
            if p.exists() {
                return Some(p);
            }
        }
    }

    None
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<ConvoyConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn write_temp(name: &str, contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn loads_toml() {
        let (_dir, path) = write_temp(
            "convoy.toml",
            r#"
            [gateway]
            port = 9000

            [[channels]]
            id = "web-main"
            name = "Website"
            kind = "web"
            greeting = "Hello!"
            "#,
        );
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.gateway.port, 9000);
        assert_eq!(cfg.channels.len(), 1);
        assert_eq!(cfg.channels[0].greeting.as_deref(), Some("Hello!"));
    }

    #[test]
    fn loads_yaml() {
        let (_dir, path) = write_temp(
            "convoy.yaml",
            "gateway:\n  port: 9001\nqueue:\n  max_attempts: 7\n",
        );
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.gateway.port, 9001);
        assert_eq!(cfg.queue.max_attempts, 7);
    }

    #[test]
    fn loads_json() {
        let (_dir, path) = write_temp("convoy.json", r#"{"gateway": {"port": 9002}}"#);
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.gateway.port, 9002);
    }

    #[test]
    fn missing_file_errors() {
        assert!(load_config(Path::new("/nonexistent/convoy.toml")).is_err());
    }
}
