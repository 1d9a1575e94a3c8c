use std::env;
use std::time::Duration;
use url::Url;

pub const DEFAULT_SPACE: &str = "shoaibramim/CLDD_ResNet50";
pub const DEFAULT_OPERATION: &str = "/predict";
pub const DEFAULT_API_PREFIX: &str = "/gradio_api";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value}")]
    InvalidNumber { name: &'static str, value: String },
    #[error("Invalid URL for {name}: {source}")]
    InvalidUrl {
        name: &'static str,
        #[source]
        source: url::ParseError,
    },
    #[error("Invalid space id {0}, expected owner/name")]
    InvalidSpace(String),
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn allows_any_origin(&self) -> bool {
        self.allowed_origins.iter().any(|origin| origin == "*")
    }
}

#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub space: String,
    pub base_url: Url,
    pub api_prefix: String,
    pub operation: String,
    pub timeout: Duration,
    pub token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub classifier: ClassifierConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from any variable source, empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let port = match get("PORT") {
            Some(value) => value
                .trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidNumber { name: "PORT", value })?,
            None => 8000,
        };

        let allowed_origins = get("CORS_ALLOWED_ORIGINS")
            .map(|value| {
                value
                    .split(',')
                    .map(|origin| origin.trim().to_string())
                    .filter(|origin| !origin.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|origins| !origins.is_empty())
            .unwrap_or_else(|| vec!["*".to_string()]);

        let server = ServerConfig {
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            allowed_origins,
        };

        let space = get("CLASSIFIER_SPACE").unwrap_or_else(|| DEFAULT_SPACE.to_string());
        let base_url = match get("CLASSIFIER_BASE_URL") {
            Some(value) => Url::parse(value.trim()).map_err(|source| ConfigError::InvalidUrl {
                name: "CLASSIFIER_BASE_URL",
                source,
            })?,
            None => space_url(&space)?,
        };

        let timeout_secs = match get("CLASSIFIER_TIMEOUT_SECS") {
            Some(value) => value.trim().parse::<u64>().map_err(|_| ConfigError::InvalidNumber {
                name: "CLASSIFIER_TIMEOUT_SECS",
                value,
            })?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        let classifier = ClassifierConfig {
            space,
            base_url,
            api_prefix: normalize_path(
                &get("CLASSIFIER_API_PREFIX").unwrap_or_else(|| DEFAULT_API_PREFIX.to_string()),
            ),
            operation: normalize_path(
                &get("CLASSIFIER_OPERATION").unwrap_or_else(|| DEFAULT_OPERATION.to_string()),
            ),
            timeout: Duration::from_secs(timeout_secs),
            token: get("HF_TOKEN"),
        };

        Ok(Self { server, classifier })
    }
}

/// Hugging Face serves a space `owner/name` from `https://owner-name.hf.space`.
pub fn space_url(space: &str) -> Result<Url, ConfigError> {
    let (owner, name) = space
        .split_once('/')
        .filter(|(owner, name)| !owner.is_empty() && !name.is_empty() && !name.contains('/'))
        .ok_or_else(|| ConfigError::InvalidSpace(space.to_string()))?;

    let subdomain = format!("{}-{}", owner, name)
        .to_lowercase()
        .replace(['_', '.'], "-");

    Url::parse(&format!("https://{}.hf.space", subdomain)).map_err(|source| {
        ConfigError::InvalidUrl {
            name: "CLASSIFIER_SPACE",
            source,
        }
    })
}

/// Leading slash, no trailing slash. An empty path stays empty.
fn normalize_path(path: &str) -> String {
    let trimmed = path.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}
