use quizguard_shared::domain::{Child, Game, ThreatKeyword};
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path};

pub use quizguard_shared::auth::Role;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub children: Vec<Child>,
    pub games: Vec<Game>,
    /// Seed entries for the content-safety dictionary; admins extend it at
    /// runtime via the API.
    #[serde(default)]
    pub threat_keywords: Vec<ThreatKeyword>,
    pub jwt_secret: String,
    pub users: Vec<UserConfig>,
    /// IANA zone name used as the canonical reference time for the daily
    /// reset. Defaults to UTC.
    pub timezone: Option<String>,
    /// Minutes between alert-retention sweeps. Defaults to 60.
    pub alert_sweep_minutes: Option<u64>,
    pub dev_cors_origin: Option<String>,
    pub listen_port: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    pub username: String,
    pub password_hash: String, // bcrypt hash
    pub role: Role,
    /// Required when role == child: the child account this login acts for.
    pub child_id: Option<String>,
    /// For guardians: ids of the linked children.
    #[serde(default)]
    pub children: Vec<String>,
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Yaml(e) => write!(f, "YAML error: {}", e),
            ConfigError::Invalid(e) => write!(f, "invalid config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        ConfigError::Io(value)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(value: serde_yaml::Error) -> Self {
        ConfigError::Yaml(value)
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());
        Self::load_from_path(path)
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(&path)?;
        let cfg: AppConfig = serde_yaml::from_str(&text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for u in &self.users {
            match u.role {
                Role::Child => {
                    let Some(child_id) = u.child_id.as_deref() else {
                        return Err(ConfigError::Invalid(format!(
                            "child user {} missing child_id",
                            u.username
                        )));
                    };
                    if !self.children.iter().any(|c| c.id == child_id) {
                        return Err(ConfigError::Invalid(format!(
                            "child user {} bound to unknown child {}",
                            u.username, child_id
                        )));
                    }
                }
                Role::Guardian => {
                    for c in &u.children {
                        if !self.children.iter().any(|ch| &ch.id == c) {
                            return Err(ConfigError::Invalid(format!(
                                "guardian {} linked to unknown child {}",
                                u.username, c
                            )));
                        }
                    }
                }
                Role::Admin => {}
            }
        }
        Ok(())
    }

    /// Parse the configured reference zone; UTC when unset.
    pub fn reference_timezone(&self) -> Result<chrono_tz::Tz, ConfigError> {
        match self.timezone.as_deref() {
            None => Ok(chrono_tz::UTC),
            Some(name) => name
                .parse::<chrono_tz::Tz>()
                .map_err(|e| ConfigError::Invalid(format!("timezone {name}: {e}"))),
        }
    }

    /// Each child has at most one current guardian; the first configured
    /// guardian linked to the child wins.
    pub fn guardian_of(&self, child_id: &str) -> Option<&UserConfig> {
        self.users
            .iter()
            .find(|u| u.role == Role::Guardian && u.children.iter().any(|c| c == child_id))
    }

    pub fn is_guardian_of(&self, username: &str, child_id: &str) -> bool {
        self.users.iter().any(|u| {
            u.role == Role::Guardian
                && u.username == username
                && u.children.iter().any(|c| c == child_id)
        })
    }

    pub fn linked_children(&self, username: &str) -> Vec<String> {
        self.users
            .iter()
            .filter(|u| u.role == Role::Guardian && u.username == username)
            .flat_map(|u| u.children.iter().cloned())
            .collect()
    }
}
