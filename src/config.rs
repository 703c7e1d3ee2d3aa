use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default = "default_routes")]
    pub routes: Vec<RouteConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_static_root")]
    pub static_root: PathBuf,
    #[serde(default = "default_index_file")]
    pub index_file: String,
    #[serde(default = "default_grace")]
    pub shutdown_grace_secs: u64,
    #[serde(default)]
    pub tls: TlsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TlsConfig {
    #[serde(default = "default_cert_path")]
    pub cert_path: PathBuf,
    #[serde(default = "default_key_path")]
    pub key_path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_entry_name")]
    pub entry_name: String,
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
    /// Per-request timeout. `0` disables it.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// One row of the route table: an axum path pattern and what answers it.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct RouteConfig {
    pub path: String,
    pub handler: RouteKind,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RouteKind {
    Lookup,
    PoolSummary,
    PriceTable,
    Health,
    Stats,
}

fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8501 }
fn default_static_root() -> PathBuf { PathBuf::from("www") }
fn default_index_file() -> String { "index.html".to_string() }
fn default_grace() -> u64 { 1 }
fn default_cert_path() -> PathBuf { PathBuf::from("bundle.crt") }
fn default_key_path() -> PathBuf { PathBuf::from("private.key") }
fn default_base_url() -> String { "https://u00.io:8488".to_string() }
fn default_entry_name() -> String { "data.json".to_string() }
fn default_refresh_interval() -> u64 { 1 }
fn default_request_timeout() -> u64 { 30 }

fn default_routes() -> Vec<RouteConfig> {
    [
        ("/data/:id", RouteKind::Lookup),
        ("/pool/:id", RouteKind::PoolSummary),
        ("/price/:id", RouteKind::PriceTable),
        ("/health", RouteKind::Health),
        ("/stats", RouteKind::Stats),
    ]
    .into_iter()
    .map(|(path, handler)| RouteConfig { path: path.to_string(), handler })
    .collect()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            static_root: default_static_root(),
            index_file: default_index_file(),
            shutdown_grace_secs: default_grace(),
            tls: TlsConfig::default(),
        }
    }
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            cert_path: default_cert_path(),
            key_path: default_key_path(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            entry_name: default_entry_name(),
            refresh_interval_secs: default_refresh_interval(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            source: SourceConfig::default(),
            routes: default_routes(),
        }
    }
}

/// Directory holding the running executable, falling back to the working
/// directory when it cannot be determined.
pub fn exe_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

impl Config {
    /// Loads `config.toml` from the executable's directory, then the working
    /// directory. No file at all means defaults relative to the executable.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let exe = exe_dir();
        let cwd = std::env::current_dir()?;
        Self::load_from(&[exe.clone(), cwd], &exe)
    }

    /// First `config.toml` found in `dirs` wins. Its relative paths resolve
    /// against the directory it was found in.
    pub fn load_from(dirs: &[PathBuf], default_base: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let found = dirs
            .iter()
            .map(|dir| (dir, dir.join("config.toml")))
            .find(|(_, path)| path.is_file());

        let (mut config, base) = match found {
            Some((dir, path)) => (Self::from_toml(&fs::read_to_string(&path)?)?, dir.as_path()),
            None => (Self::default(), default_base),
        };
        config.resolve_paths(base);
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.source.refresh_interval_secs == 0 {
            return Err("source.refresh_interval_secs must be positive".to_string());
        }

        let mut seen = HashSet::new();
        for route in &self.routes {
            if !route.path.starts_with('/') {
                return Err(format!("route path {:?} must start with '/'", route.path));
            }
            if !seen.insert(route.path.as_str()) {
                return Err(format!("duplicate route path {:?}", route.path));
            }
        }
        Ok(())
    }

    /// Makes relative filesystem paths relative to `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        for path in [
            &mut self.server.static_root,
            &mut self.server.tls.cert_path,
            &mut self.server.tls.key_path,
        ] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.source.refresh_interval_secs)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        match self.source.request_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.server.port, 8501);
        assert_eq!(config.source.entry_name, "data.json");
        assert_eq!(config.routes.len(), 5);
        assert_eq!(config.refresh_interval(), Duration::from_secs(1));
    }

    #[test]
    fn route_table_is_configurable() {
        let config = Config::from_toml(
            r#"
            [server]
            port = 9000

            [[routes]]
            path = "/price/:id"
            handler = "price_table"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(
            config.routes,
            vec![RouteConfig { path: "/price/:id".into(), handler: RouteKind::PriceTable }]
        );
    }

    #[test]
    fn rejects_bad_tables() {
        let dup = r#"
            [[routes]]
            path = "/a"
            handler = "health"
            [[routes]]
            path = "/a"
            handler = "stats"
        "#;
        assert!(Config::from_toml(dup).is_err());
        assert!(Config::from_toml("[[routes]]\npath = \"a\"\nhandler = \"health\"").is_err());
        assert!(Config::from_toml("[[routes]]\npath = \"/a\"\nhandler = \"nope\"").is_err());
        assert!(Config::from_toml("[source]\nrefresh_interval_secs = 0").is_err());
    }

    #[test]
    fn relative_paths_follow_base() {
        let mut config = Config::default();
        config.server.tls.key_path = PathBuf::from("/etc/key.pem");
        config.resolve_paths(Path::new("/opt/app"));
        assert_eq!(config.server.static_root, PathBuf::from("/opt/app/www"));
        assert_eq!(config.server.tls.cert_path, PathBuf::from("/opt/app/bundle.crt"));
        assert_eq!(config.server.tls.key_path, PathBuf::from("/etc/key.pem"));
    }

    #[test]
    fn paths_resolve_against_the_directory_holding_the_file() {
        let exe = tempfile::tempdir().unwrap();
        let cwd = tempfile::tempdir().unwrap();
        fs::write(cwd.path().join("config.toml"), "[server]\nstatic_root = \"public\"").unwrap();

        let dirs = [exe.path().to_path_buf(), cwd.path().to_path_buf()];
        let config = Config::load_from(&dirs, exe.path()).unwrap();
        assert_eq!(config.server.static_root, cwd.path().join("public"));
        assert_eq!(config.server.tls.cert_path, cwd.path().join("bundle.crt"));

        fs::write(exe.path().join("config.toml"), "").unwrap();
        let config = Config::load_from(&dirs, exe.path()).unwrap();
        assert_eq!(config.server.static_root, exe.path().join("www"));
    }

    #[test]
    fn no_file_resolves_against_default_base() {
        let empty = tempfile::tempdir().unwrap();
        let config = Config::load_from(&[empty.path().to_path_buf()], Path::new("/opt/app")).unwrap();
        assert_eq!(config.server.static_root, PathBuf::from("/opt/app/www"));
    }

    #[test]
    fn zero_timeout_disables_it() {
        let config = Config::from_toml("[source]\nrequest_timeout_secs = 0").unwrap();
        assert_eq!(config.request_timeout(), None);
    }
}
