use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::{fs, io};

/// Persistent CLI configuration. Every field is optional so unspecified
/// values fall back to code defaults; CLI flags take precedence over all of
/// these.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub base_url: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub user_agent: Option<String>,
    pub proxy: Option<String>,
    pub accept_invalid_certs: Option<bool>,
    /// connect timeout in seconds (can be fractional)
    pub connect_timeout_secs: Option<f64>,
}

impl Config {
    /// Directory the config file is looked up in.
    pub fn default_dir() -> PathBuf {
        dirs::config_dir()
            .map(|mut path| {
                path.push("hubdl");
                path
            })
            .unwrap_or_else(|| PathBuf::from("/tmp/hubdl"))
    }

    /// Path to the config file inside the provided directory.
    pub fn config_path_for_dir<P: AsRef<Path>>(config_dir: P) -> PathBuf {
        let mut p = config_dir.as_ref().to_path_buf();
        p.push("config.toml");
        p
    }

    /// Load configuration from the given directory's `config.toml`.
    /// If the file does not exist, returns Ok(Default::default()).
    pub fn load_from_dir<P: AsRef<Path>>(config_dir: P) -> Result<Config, io::Error> {
        let path = Config::config_path_for_dir(config_dir);
        if !path.exists() {
            return Ok(Config::default());
        }
        let s = fs::read_to_string(&path)?;
        let cfg: Config =
            toml::from_str(&s).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(cfg)
    }

    /// Save configuration to `config_dir/config.toml`. Creates the parent
    /// directory if needed.
    pub fn save_to_dir<P: AsRef<Path>>(&self, config_dir: P) -> Result<(), io::Error> {
        let cfg_path = Config::config_path_for_dir(config_dir);
        if let Some(p) = cfg_path.parent() {
            fs::create_dir_all(p)?;
        }
        let s =
            toml::to_string_pretty(&self).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        fs::write(cfg_path, s)?;
        Ok(())
    }
}
