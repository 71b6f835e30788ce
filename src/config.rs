use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Source of a configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

/// Where places and tags are stored remotely
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Local SQLite file standing in for the hosted store
    #[default]
    Sqlite,
    /// Cloud Firestore over REST
    Firestore,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Sqlite => write!(f, "sqlite"),
            Backend::Firestore => write!(f, "firestore"),
        }
    }
}

impl std::str::FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sqlite" => Ok(Backend::Sqlite),
            "firestore" => Ok(Backend::Firestore),
            other => Err(format!("unknown backend '{}'", other)),
        }
    }
}

/// Firestore connection settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FirestoreSettings {
    pub project_id: Option<String>,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Override for the REST endpoint (e.g. the local emulator)
    pub base_url: Option<String>,
    pub email: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
}

impl FirestoreSettings {
    /// Returns true if there is enough to sign in and reach a project
    pub fn is_configured(&self) -> bool {
        self.project_id.is_some()
            && self.api_key.is_some()
            && self.email.is_some()
            && self.password.is_some()
    }
}

/// Application configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Directory holding the SQLite database and the local cache
    pub data_dir: ConfigValue<PathBuf>,
    pub backend: ConfigValue<Backend>,
    /// Session user for the SQLite backend
    pub user_id: ConfigValue<String>,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
    pub firestore: FirestoreSettings,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    data_dir: Option<PathBuf>,
    backend: Option<Backend>,
    user_id: Option<String>,
    firestore: Option<FirestoreSettings>,
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut data_dir = ConfigValue::new(Self::default_data_dir(), ConfigSource::Default);
        let mut backend = ConfigValue::new(Backend::default(), ConfigSource::Default);
        let mut user_id = ConfigValue::new("local".to_string(), ConfigSource::Default);
        let mut config_file = None;
        let mut firestore = FirestoreSettings::default();

        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config_file = Some(path.clone());

            if let Some(dir) = file_config.data_dir {
                // Resolve relative paths against config file's directory
                let resolved = if dir.is_relative() {
                    path.parent().map(|p| p.join(&dir)).unwrap_or(dir)
                } else {
                    dir
                };
                data_dir = ConfigValue::new(resolved, ConfigSource::File);
            }
            if let Some(value) = file_config.backend {
                backend = ConfigValue::new(value, ConfigSource::File);
            }
            if let Some(user) = file_config.user_id {
                user_id = ConfigValue::new(user, ConfigSource::File);
            }
            if let Some(settings) = file_config.firestore {
                firestore = settings;
            }
        }

        if let Ok(dir) = std::env::var("LIEUX_DATA_DIR") {
            data_dir = ConfigValue::new(PathBuf::from(dir), ConfigSource::Environment);
        }
        if let Ok(value) = std::env::var("LIEUX_BACKEND") {
            let parsed = value
                .parse()
                .map_err(|_| ConfigError::InvalidValue("LIEUX_BACKEND".to_string(), value))?;
            backend = ConfigValue::new(parsed, ConfigSource::Environment);
        }
        if let Ok(user) = std::env::var("LIEUX_USER_ID") {
            user_id = ConfigValue::new(user, ConfigSource::Environment);
        }
        if let Ok(project) = std::env::var("LIEUX_FIRESTORE_PROJECT") {
            firestore.project_id = Some(project);
        }
        if let Ok(key) = std::env::var("LIEUX_FIRESTORE_API_KEY") {
            firestore.api_key = Some(key);
        }
        if let Ok(email) = std::env::var("LIEUX_EMAIL") {
            firestore.email = Some(email);
        }
        if let Ok(password) = std::env::var("LIEUX_PASSWORD") {
            firestore.password = Some(password);
        }

        Ok(Self {
            data_dir,
            backend,
            user_id,
            config_file,
            firestore,
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.value.join("lieux.db")
    }

    pub fn cache_path(&self) -> PathBuf {
        self.data_dir.value.join("cache.json")
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/lieux/
    /// - macOS: ~/Library/Application Support/lieux/
    /// - Windows: %APPDATA%/lieux/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("lieux")
    }

    /// Default data directory (platform-specific):
    /// - Linux: ~/.local/share/lieux/
    /// - macOS: ~/Library/Application Support/lieux/
    /// - Windows: %APPDATA%/lieux/
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("lieux")
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
    InvalidValue(String, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::InvalidValue(name, value) => {
                write!(f, "Invalid value for {}: '{}'", name, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("nonexistent.yaml");

        let config = Config::load(Some(config_path)).unwrap();
        assert!(config.data_dir.value.ends_with("lieux"));
        assert_eq!(config.data_dir.source, ConfigSource::Default);
        assert_eq!(config.backend.value, Backend::Sqlite);
        assert_eq!(config.user_id.value, "local");
        assert!(config.config_file.is_none());
        assert!(config.database_path().ends_with("lieux.db"));
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "data_dir: /custom/lieux").unwrap();
        writeln!(file, "backend: firestore").unwrap();
        writeln!(file, "firestore:").unwrap();
        writeln!(file, "  project_id: demo").unwrap();
        writeln!(file, "  api_key: key").unwrap();
        writeln!(file, "  email: a@b.c").unwrap();
        writeln!(file, "  password: secret").unwrap();

        let config = Config::load(Some(config_path.clone())).unwrap();
        assert_eq!(config.data_dir.value, PathBuf::from("/custom/lieux"));
        assert_eq!(config.data_dir.source, ConfigSource::File);
        assert_eq!(config.backend.value, Backend::Firestore);
        assert_eq!(config.backend.source, ConfigSource::File);
        assert_eq!(config.firestore.project_id.as_deref(), Some("demo"));
        assert!(config.firestore.is_configured());
        assert_eq!(config.config_file, Some(config_path));
    }

    #[test]
    fn test_relative_data_dir_resolves_against_config_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "data_dir: data").unwrap();

        let config = Config::load(Some(config_path)).unwrap();
        assert_eq!(config.data_dir.value, temp_dir.path().join("data"));
    }

    #[test]
    fn test_credentials_are_not_serialized() {
        let settings = FirestoreSettings {
            api_key: Some("AIzaKey".into()),
            email: Some("a@b.c".into()),
            password: Some("secret".into()),
            ..FirestoreSettings::default()
        };
        let json = serde_json::to_string(&settings).unwrap();
        assert!(!json.contains("secret"));
        assert!(!json.contains("AIzaKey"));
        assert!(json.contains("a@b.c"));
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("Firestore".parse::<Backend>(), Ok(Backend::Firestore));
        assert_eq!(" sqlite ".parse::<Backend>(), Ok(Backend::Sqlite));
        assert!("mongo".parse::<Backend>().is_err());
    }

    #[test]
    #[ignore] // Run with --ignored; env vars can pollute parallel tests
    fn test_env_var_overrides_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "user_id: fromfile").unwrap();

        std::env::set_var("LIEUX_USER_ID", "fromenv");

        let config = Config::load(Some(config_path)).unwrap();
        assert_eq!(config.user_id.value, "fromenv");
        assert_eq!(config.user_id.source, ConfigSource::Environment);

        std::env::remove_var("LIEUX_USER_ID");
    }

    #[test]
    fn test_invalid_yaml_error() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "invalid: yaml: content: [").unwrap();

        let result = Config::load(Some(config_path));
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_unknown_backend_in_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "backend: mongo").unwrap();

        assert!(Config::load(Some(config_path)).is_err());
    }
}
