/*
 * Responsibility
 * - 環境変数の読み込み (OAuth / tools / server)
 * - 設定値のバリデーション (不足・placeholder・parse 不可なら起動失敗)
 * - 値の取得元を差し替えられるようにする (from_lookup: tests / CLI 用)
 */
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use jsonwebtoken::Algorithm;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    fn parse(raw: Option<String>) -> Self {
        match raw
            .unwrap_or_else(|| "development".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing configuration: {}", key),
            ConfigError::Invalid(key) => write!(f, "invalid configuration: {}", key),
        }
    }
}

impl std::error::Error for ConfigError {}

/// OAuth / JWT settings shared by the validator, the middleware and the token client.
#[derive(Clone)]
pub struct AuthConfig {
    pub issuer: String,
    pub audience: String,
    pub jwks_url: Url,
    pub token_url: Url,
    pub client_id: String,
    pub client_secret: String,
    pub algorithms: Vec<Algorithm>,
    pub token_expiry_margin: Duration,
    pub http_timeout: Duration,
    // None: refresh only on kid miss
    pub jwks_ttl: Option<Duration>,
    pub exempt_paths: Vec<String>,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // client_secret は出さない
        f.debug_struct("AuthConfig")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("jwks_url", &self.jwks_url.as_str())
            .field("token_url", &self.token_url.as_str())
            .field("client_id", &self.client_id)
            .field("algorithms", &self.algorithms)
            .field("token_expiry_margin", &self.token_expiry_margin)
            .field("http_timeout", &self.http_timeout)
            .field("jwks_ttl", &self.jwks_ttl)
            .field("exempt_paths", &self.exempt_paths)
            .finish()
    }
}

#[derive(Clone)]
pub struct WeatherConfig {
    pub api_key: String,
    pub base_url: Url,
    pub timeout: Duration,
}

impl fmt::Debug for WeatherConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeatherConfig")
            .field("base_url", &self.base_url.as_str())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct FilesConfig {
    pub allowed_paths: Vec<PathBuf>,
    pub max_file_size_bytes: u64,
    // lower-case, leading dot
    pub allowed_extensions: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub app_env: AppEnv,
    pub database_url: String,
    pub cors_allowed_origins: Vec<String>,
    pub request_timeout: Duration,
    pub max_request_body_bytes: usize,

    pub auth: AuthConfig,
    pub weather: WeatherConfig,
    pub files: FilesConfig,
}

pub const DEFAULT_EXEMPT_PATHS: &[&str] = &["/health", "/docs", "/openapi.json"];
const DEFAULT_WEATHER_BASE_URL: &str = "https://api.openweathermap.org/data/2.5";
const DEFAULT_FILE_EXTENSIONS: &str = ".txt,.json,.csv,.md";

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port: u16 = parse_or(&lookup, "PORT", 8000)?;
        let addr = SocketAddr::from_str(&format!("0.0.0.0:{}", port))
            .map_err(|_| ConfigError::Invalid("PORT"))?;

        let app_env = AppEnv::parse(lookup("APP_ENV"));

        let database_url =
            optional(&lookup, "DATABASE_URL").unwrap_or_else(|| "sqlite://mcp_server.db".into());

        let cors_allowed_origins = list(&lookup, "CORS_ORIGINS");

        let request_timeout = Duration::from_secs(parse_or(&lookup, "REQUEST_TIMEOUT_SECONDS", 30)?);
        let max_request_body_bytes = parse_or(&lookup, "MAX_REQUEST_BODY_BYTES", 1024 * 1024)?;

        Ok(Self {
            addr,
            app_env,
            database_url,
            cors_allowed_origins,
            request_timeout,
            max_request_body_bytes,
            auth: AuthConfig::from_lookup(&lookup)?,
            weather: WeatherConfig::from_lookup(&lookup)?,
            files: FilesConfig::from_lookup(&lookup)?,
        })
    }
}

impl AuthConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(&|key: &str| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let issuer = required(lookup, "OAUTH_ISSUER")?;
        let audience = required(lookup, "OAUTH_AUDIENCE")?;
        let jwks_url = url(lookup, "OAUTH_JWKS_URL")?;
        let token_url = url(lookup, "OAUTH_TOKEN_URL")?;
        let client_id = required(lookup, "OAUTH_CLIENT_ID")?;
        let client_secret = required(lookup, "OAUTH_CLIENT_SECRET")?;

        let algorithms = match optional(lookup, "OAUTH_ALGORITHMS") {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| Algorithm::from_str(s).map_err(|_| ConfigError::Invalid("OAUTH_ALGORITHMS")))
                .collect::<Result<Vec<_>, _>>()?,
            None => vec![Algorithm::RS256],
        };
        if algorithms.is_empty() {
            return Err(ConfigError::Invalid("OAUTH_ALGORITHMS"));
        }

        let token_expiry_margin =
            Duration::from_secs(parse_or(lookup, "OAUTH_TOKEN_EXPIRY_MARGIN_SECONDS", 60)?);
        let http_timeout = Duration::from_secs(parse_or(lookup, "OAUTH_HTTP_TIMEOUT_SECONDS", 5)?);
        if http_timeout.is_zero() {
            return Err(ConfigError::Invalid("OAUTH_HTTP_TIMEOUT_SECONDS"));
        }

        let jwks_ttl = match parse_or::<u64, _>(lookup, "OAUTH_JWKS_TTL_SECONDS", 0)? {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        let exempt_paths = match optional(lookup, "AUTH_EXEMPT_PATHS") {
            Some(_) => list(lookup, "AUTH_EXEMPT_PATHS"),
            None => DEFAULT_EXEMPT_PATHS.iter().map(|s| s.to_string()).collect(),
        };

        Ok(Self {
            issuer,
            audience,
            jwks_url,
            token_url,
            client_id,
            client_secret,
            algorithms,
            token_expiry_margin,
            http_timeout,
            jwks_ttl,
            exempt_paths,
        })
    }
}

impl WeatherConfig {
    fn from_lookup<F>(lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = required(lookup, "OPENWEATHER_API_KEY")?;
        let base_url = match optional(lookup, "OPENWEATHER_BASE_URL") {
            Some(_) => url(lookup, "OPENWEATHER_BASE_URL")?,
            None => Url::parse(DEFAULT_WEATHER_BASE_URL)
                .map_err(|_| ConfigError::Invalid("OPENWEATHER_BASE_URL"))?,
        };
        let timeout = Duration::from_secs(parse_or(lookup, "OPENWEATHER_TIMEOUT_SECONDS", 10)?);

        Ok(Self {
            api_key,
            base_url,
            timeout,
        })
    }
}

impl FilesConfig {
    fn from_lookup<F>(lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        required(lookup, "ALLOWED_FILE_PATHS")?;
        let allowed_paths: Vec<PathBuf> = list(lookup, "ALLOWED_FILE_PATHS")
            .into_iter()
            .map(PathBuf::from)
            .collect();
        if allowed_paths.is_empty() {
            return Err(ConfigError::Missing("ALLOWED_FILE_PATHS"));
        }

        let max_mb: u64 = parse_or(lookup, "MAX_FILE_SIZE_MB", 10)?;
        if max_mb == 0 {
            return Err(ConfigError::Invalid("MAX_FILE_SIZE_MB"));
        }

        let raw_ext = optional(lookup, "ALLOWED_FILE_EXTENSIONS")
            .unwrap_or_else(|| DEFAULT_FILE_EXTENSIONS.to_string());
        let allowed_extensions = raw_ext
            .split(',')
            .map(|s| s.trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .map(|s| if s.starts_with('.') { s } else { format!(".{s}") })
            .collect();

        Ok(Self {
            allowed_paths,
            max_file_size_bytes: max_mb * 1024 * 1024,
            allowed_extensions,
        })
    }
}

fn optional<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// `.env.example` の "your_..." がそのまま残っているケースも未設定扱い
fn required<F>(lookup: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    optional(lookup, key)
        .filter(|v| !v.starts_with("your_"))
        .ok_or(ConfigError::Missing(key))
}

fn url<F>(lookup: &F, key: &'static str) -> Result<Url, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = required(lookup, key)?;
    let parsed = Url::parse(&raw).map_err(|_| ConfigError::Invalid(key))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        _ => Err(ConfigError::Invalid(key)),
    }
}

fn parse_or<T, F>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match optional(lookup, key) {
        Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid(key)),
        None => Ok(default),
    }
}

fn list<F>(lookup: &F, key: &str) -> Vec<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn base_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("OAUTH_ISSUER", "https://tenant.example.com/"),
            ("OAUTH_AUDIENCE", "https://mcp.example.com"),
            ("OAUTH_JWKS_URL", "https://tenant.example.com/.well-known/jwks.json"),
            ("OAUTH_TOKEN_URL", "https://tenant.example.com/oauth/token"),
            ("OAUTH_CLIENT_ID", "client-123"),
            ("OAUTH_CLIENT_SECRET", "s3cret"),
            ("OPENWEATHER_API_KEY", "weather-key"),
            ("ALLOWED_FILE_PATHS", "/tmp/a, /tmp/b"),
        ])
    }

    fn load(env: &HashMap<&'static str, &'static str>) -> Result<Config, ConfigError> {
        Config::from_lookup(|k| env.get(k).map(|v| v.to_string()))
    }

    #[test]
    fn loads_defaults() {
        let config = load(&base_env()).unwrap();

        assert_eq!(config.addr.port(), 8000);
        assert_eq!(config.app_env, AppEnv::Development);
        assert_eq!(config.auth.algorithms, vec![Algorithm::RS256]);
        assert_eq!(config.auth.token_expiry_margin, Duration::from_secs(60));
        assert_eq!(config.auth.jwks_ttl, None);
        assert_eq!(
            config.auth.exempt_paths,
            vec!["/health", "/docs", "/openapi.json"]
        );
        assert_eq!(
            config.files.allowed_paths,
            vec![PathBuf::from("/tmp/a"), PathBuf::from("/tmp/b")]
        );
        assert_eq!(config.files.max_file_size_bytes, 10 * 1024 * 1024);
        assert_eq!(
            config.files.allowed_extensions,
            vec![".txt", ".json", ".csv", ".md"]
        );
        assert_eq!(
            config.weather.base_url.as_str(),
            "https://api.openweathermap.org/data/2.5"
        );
    }

    #[test]
    fn every_oauth_setting_is_required() {
        for key in [
            "OAUTH_ISSUER",
            "OAUTH_AUDIENCE",
            "OAUTH_JWKS_URL",
            "OAUTH_TOKEN_URL",
            "OAUTH_CLIENT_ID",
            "OAUTH_CLIENT_SECRET",
        ] {
            let mut env = base_env();
            env.remove(key);
            assert_eq!(load(&env).unwrap_err(), ConfigError::Missing(key), "{key}");
        }
    }

    #[test]
    fn placeholder_values_count_as_missing() {
        let mut env = base_env();
        env.insert("OAUTH_CLIENT_SECRET", "your_client_secret");
        assert_eq!(
            load(&env).unwrap_err(),
            ConfigError::Missing("OAUTH_CLIENT_SECRET")
        );
    }

    #[test]
    fn rejects_unparsable_values() {
        let mut env = base_env();
        env.insert("OAUTH_JWKS_URL", "not a url");
        assert_eq!(load(&env).unwrap_err(), ConfigError::Invalid("OAUTH_JWKS_URL"));

        let mut env = base_env();
        env.insert("OAUTH_ALGORITHMS", "RS256,XX999");
        assert_eq!(
            load(&env).unwrap_err(),
            ConfigError::Invalid("OAUTH_ALGORITHMS")
        );

        let mut env = base_env();
        env.insert("PORT", "eighty");
        assert_eq!(load(&env).unwrap_err(), ConfigError::Invalid("PORT"));
    }

    #[test]
    fn parses_overrides() {
        let mut env = base_env();
        env.insert("APP_ENV", "prod");
        env.insert("OAUTH_ALGORITHMS", "RS256, EdDSA");
        env.insert("OAUTH_JWKS_TTL_SECONDS", "600");
        env.insert("AUTH_EXEMPT_PATHS", "/health");
        env.insert("ALLOWED_FILE_EXTENSIONS", "TXT,.Log");

        let config = load(&env).unwrap();

        assert!(config.app_env.is_production());
        assert_eq!(
            config.auth.algorithms,
            vec![Algorithm::RS256, Algorithm::EdDSA]
        );
        assert_eq!(config.auth.jwks_ttl, Some(Duration::from_secs(600)));
        assert_eq!(config.auth.exempt_paths, vec!["/health"]);
        assert_eq!(config.files.allowed_extensions, vec![".txt", ".log"]);
    }

    #[test]
    fn debug_output_hides_secrets() {
        let config = load(&base_env()).unwrap();
        let printed = format!("{:?}", config);
        assert!(!printed.contains("s3cret"));
        assert!(!printed.contains("weather-key"));
    }
}
