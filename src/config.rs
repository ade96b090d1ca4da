use std::path::PathBuf;

use thiserror::Error;

const REQUIRED_KEYS: [&str; 4] = ["DEBUG", "GLEAN_INSTANCE", "GLEAN_API_TOKEN", "QUESTIONS_CSV"];

const TRUE_VALUES: [&str; 9] = [
    "true", "1", "t", "y", "yes", "yeah", "yup", "certainly", "uh-huh",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variables: {}", .0.join(", "))]
    Missing(Vec<&'static str>),
}

/// Flag values that take precedence over the environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub app_id: Option<String>,
    pub debug: Option<String>,
    pub questions_csv: Option<PathBuf>,
    pub user: Option<String>,
    pub verbose: bool,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub instance: String,
    pub api_token: String,
    pub questions_csv: PathBuf,
    pub app_id: Option<String>,
    pub act_as: Option<String>,
    pub debug: bool,
    pub verbose: bool,
}

impl Config {
    pub fn from_env(overrides: &Overrides) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok(), overrides)
    }

    /// Builds the config from an arbitrary variable source, reporting every
    /// missing required key at once.
    pub fn from_lookup<F>(lookup: F, overrides: &Overrides) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let missing: Vec<&'static str> = REQUIRED_KEYS
            .into_iter()
            .filter(|&key| lookup(key).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        let required = |key: &str| lookup(key).unwrap_or_default();
        let optional = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let debug = match &overrides.debug {
            Some(value) => is_truthy(value),
            None => is_truthy(&required("DEBUG")),
        };

        Ok(Self {
            instance: required("GLEAN_INSTANCE"),
            api_token: required("GLEAN_API_TOKEN"),
            questions_csv: overrides
                .questions_csv
                .clone()
                .unwrap_or_else(|| PathBuf::from(required("QUESTIONS_CSV"))),
            app_id: non_empty(&overrides.app_id).or_else(|| optional("GLEAN_AI_APP_ID")),
            act_as: non_empty(&overrides.user).or_else(|| optional("GLEAN_USER")),
            debug,
            verbose: overrides.verbose,
        })
    }

    pub fn api_host(&self) -> String {
        format!("{}-be.glean.com", self.instance)
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.clone().filter(|v| !v.is_empty())
}

/// Debug level as requested before the full config is validated, so logging
/// can be set up first.
pub fn debug_requested(overrides: &Overrides) -> bool {
    match &overrides.debug {
        Some(value) => is_truthy(value),
        None => std::env::var("DEBUG").map(|v| is_truthy(&v)).unwrap_or(false),
    }
}

pub fn is_truthy(value: &str) -> bool {
    let value = value.to_lowercase();
    TRUE_VALUES.contains(&value.as_str())
}
