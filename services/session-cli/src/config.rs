//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The password is read from TUTOR_PASSWORD or prompted for; it is never
//! stored in the TOML.

use common::Secret;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tutor_auth::{DEFAULT_BASE_URL, DEFAULT_PROFILE, Endpoints, LoginEncoding};
use tutor_session::ClientConfig;

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "tutor-session.toml";

/// Root configuration
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(skip)]
    pub password: Option<Secret<String>>,
}

/// Remote API settings
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub login_encoding: LoginEncoding,
    /// Per-deployment auth path overrides
    #[serde(default)]
    pub paths: AuthPaths,
}

/// Auth endpoint paths; unset entries keep the defaults.
#[derive(Debug, Default, Deserialize)]
pub struct AuthPaths {
    pub login: Option<String>,
    pub signup: Option<String>,
    pub me: Option<String>,
    pub refresh: Option<String>,
}

/// Local session persistence
#[derive(Debug, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_credential_path")]
    pub credential_path: PathBuf,
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_expiry_skew")]
    pub expiry_skew_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
            login_encoding: LoginEncoding::default(),
            paths: AuthPaths::default(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            credential_path: default_credential_path(),
            profile: default_profile(),
            expiry_skew_secs: default_expiry_skew(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.into()
}

fn default_timeout() -> u64 {
    30
}

fn default_profile() -> String {
    DEFAULT_PROFILE.into()
}

fn default_expiry_skew() -> u64 {
    30
}

/// `$HOME/.tutor-session/credentials.json`, or the working directory without HOME.
fn default_credential_path() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home)
            .join(".tutor-session")
            .join("credentials.json"),
        None => PathBuf::from("credentials.json"),
    }
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Defaults plus environment, for running without a config file.
    pub fn from_env() -> common::Result<Self> {
        Self::from_toml("")
    }

    fn from_toml(contents: &str) -> common::Result<Self> {
        let mut config: Config = toml::from_str(contents)?;

        if let Ok(url) = std::env::var("TUTOR_API_URL") {
            config.api.base_url = url;
        }
        config.password = Secret::from_env("TUTOR_PASSWORD");

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        if !self.api.base_url.starts_with("http://") && !self.api.base_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                self.api.base_url
            )));
        }

        if self.api.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if self.session.profile.trim().is_empty() {
            return Err(common::Error::Config("profile must not be empty".into()));
        }

        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    ///
    /// Returns the path and whether it was asked for explicitly; only an
    /// explicit path is required to exist.
    pub fn resolve_path(cli_path: Option<&str>) -> (PathBuf, bool) {
        if let Some(p) = cli_path {
            return (PathBuf::from(p), true);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return (PathBuf::from(p), true);
        }
        (PathBuf::from(DEFAULT_CONFIG_FILE), false)
    }

    /// Session client settings for this deployment.
    pub fn client_config(&self) -> ClientConfig {
        let mut endpoints = Endpoints::new(self.api.base_url.clone());
        let paths = &self.api.paths;
        if let Some(p) = &paths.login {
            endpoints.login = p.clone();
        }
        if let Some(p) = &paths.signup {
            endpoints.signup = p.clone();
        }
        if let Some(p) = &paths.me {
            endpoints.me = p.clone();
        }
        if let Some(p) = &paths.refresh {
            endpoints.refresh = p.clone();
        }

        ClientConfig {
            endpoints,
            timeout: Duration::from_secs(self.api.timeout_secs),
            login_encoding: self.api.login_encoding,
            expiry_skew: Duration::from_secs(self.session.expiry_skew_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Mutex to serialize tests that mutate environment variables, preventing
    /// data races when tests run in parallel.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// SAFETY: Callers must hold ENV_MUTEX to prevent concurrent env mutation.
    unsafe fn set_env(key: &str, val: &str) {
        unsafe { std::env::set_var(key, val) };
    }

    unsafe fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    fn clear_overlays() {
        unsafe {
            remove_env("TUTOR_API_URL");
            remove_env("TUTOR_PASSWORD");
        }
    }

    fn write_config(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("tutor-session.toml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn full_toml() -> &'static str {
        r#"
[api]
base_url = "https://tutor.example.com/api/v1"
timeout_secs = 10
login_encoding = "form"

[api.paths]
login = "/auth/token"

[session]
credential_path = "/tmp/tutor/credentials.json"
profile = "school_a"
expiry_skew_secs = 60
"#
    }

    #[test]
    fn load_full_config() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_overlays();
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&write_config(&dir, full_toml())).unwrap();

        assert_eq!(config.api.base_url, "https://tutor.example.com/api/v1");
        assert_eq!(config.api.timeout_secs, 10);
        assert_eq!(config.api.login_encoding, LoginEncoding::Form);
        assert_eq!(config.session.profile, "school_a");
        assert_eq!(
            config.session.credential_path,
            PathBuf::from("/tmp/tutor/credentials.json")
        );
        assert!(config.password.is_none());

        let client = config.client_config();
        assert_eq!(client.endpoints.login, "/auth/token");
        assert_eq!(client.endpoints.refresh, "/auth/refresh");
        assert_eq!(client.timeout, Duration::from_secs(10));
        assert_eq!(client.expiry_skew, Duration::from_secs(60));
    }

    #[test]
    fn empty_config_uses_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_overlays();
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&write_config(&dir, "")).unwrap();

        assert_eq!(config.api.base_url, "http://localhost:8000/api/v1");
        assert_eq!(config.api.timeout_secs, 30);
        assert_eq!(config.api.login_encoding, LoginEncoding::Json);
        assert_eq!(config.session.profile, "tutor_session");
        assert_eq!(config.session.expiry_skew_secs, 30);
        assert!(
            config
                .session
                .credential_path
                .ends_with("credentials.json")
        );
    }

    #[test]
    fn load_missing_file() {
        let result = Config::load(Path::new("/nonexistent/path/tutor-session.toml"));
        assert!(matches!(result, Err(common::Error::Io(_))));
    }

    #[test]
    fn load_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::load(&write_config(&dir, "not valid {{{{ toml"));
        assert!(matches!(result, Err(common::Error::Toml(_))));
    }

    #[test]
    fn unknown_login_encoding_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::load(&write_config(&dir, "[api]\nlogin_encoding = \"xml\"\n"));
        assert!(result.is_err());
    }

    #[test]
    fn base_url_must_be_http() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_overlays();
        let dir = tempfile::tempdir().unwrap();
        let result = Config::load(&write_config(&dir, "[api]\nbase_url = \"ftp://x\"\n"));
        match result {
            Err(common::Error::Config(msg)) => assert!(msg.contains("base_url")),
            other => panic!("expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_overlays();
        let dir = tempfile::tempdir().unwrap();
        let result = Config::load(&write_config(&dir, "[api]\ntimeout_secs = 0\n"));
        assert!(matches!(result, Err(common::Error::Config(ref m)) if m.contains("timeout_secs")));
    }

    #[test]
    fn empty_profile_is_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_overlays();
        let dir = tempfile::tempdir().unwrap();
        let result = Config::load(&write_config(&dir, "[session]\nprofile = \" \"\n"));
        assert!(matches!(result, Err(common::Error::Config(ref m)) if m.contains("profile")));
    }

    #[test]
    fn env_overrides_file() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, full_toml());

        unsafe {
            set_env("TUTOR_API_URL", "http://127.0.0.1:9000/api/v1");
            set_env("TUTOR_PASSWORD", "hunter2");
        }
        let config = Config::load(&path).unwrap();
        clear_overlays();

        assert_eq!(config.api.base_url, "http://127.0.0.1:9000/api/v1");
        assert_eq!(config.password.as_ref().unwrap().expose(), "hunter2");
        assert!(!format!("{config:?}").contains("hunter2"));
    }

    #[test]
    fn env_url_is_validated() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("TUTOR_API_URL", "localhost:8000") };
        let result = Config::from_env();
        clear_overlays();
        assert!(matches!(result, Err(common::Error::Config(_))));
    }

    #[test]
    fn resolve_path_cli_arg() {
        let (path, explicit) = Config::resolve_path(Some("/custom/path.toml"));
        assert_eq!(path, PathBuf::from("/custom/path.toml"));
        assert!(explicit);
    }

    #[test]
    fn resolve_path_env_var() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/env/path.toml") };
        let (path, explicit) = Config::resolve_path(None);
        assert_eq!(path, PathBuf::from("/env/path.toml"));
        assert!(explicit);
        unsafe { remove_env("CONFIG_PATH") };
    }

    #[test]
    fn resolve_path_default() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("CONFIG_PATH") };
        let (path, explicit) = Config::resolve_path(None);
        assert_eq!(path, PathBuf::from(DEFAULT_CONFIG_FILE));
        assert!(!explicit);
    }

    #[test]
    fn resolve_path_cli_overrides_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/env/should-lose.toml") };
        let (path, _) = Config::resolve_path(Some("/cli/wins.toml"));
        assert_eq!(
            path,
            PathBuf::from("/cli/wins.toml"),
            "CLI arg must take precedence over CONFIG_PATH env var"
        );
        unsafe { remove_env("CONFIG_PATH") };
    }
}
