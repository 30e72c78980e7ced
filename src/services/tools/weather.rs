//! `weather` tool: current conditions from an OpenWeatherMap-compatible API.

use std::time::Duration;

use chrono::Utc;
use reqwest::{StatusCode, header::RETRY_AFTER};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use url::Url;

use super::ToolError;
use crate::config::WeatherConfig;

const API: &str = "OpenWeatherMap";
const FORBIDDEN_PATTERNS: &[&str] = &[
    "--", ";", "/*", "*/", "xp_", "sp_", "exec", "execute", "drop", "delete",
];

#[derive(Debug, Deserialize)]
pub struct WeatherArgs {
    pub city: String,
}

pub struct WeatherClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: String,
    timeout: Duration,
}

impl std::fmt::Debug for WeatherClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeatherClient")
            .field("base_url", &self.base_url.as_str())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl WeatherClient {
    pub fn new(config: &WeatherConfig, http: reqwest::Client) -> Self {
        Self {
            http,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            timeout: config.timeout,
        }
    }

    pub async fn current(&self, args: WeatherArgs) -> Result<Value, ToolError> {
        let city = validate_city(&args.city)?;
        let endpoint = format!("{}/weather", self.base_url.as_str().trim_end_matches('/'));

        let started = std::time::Instant::now();
        let result = self
            .http
            .get(&endpoint)
            .query(&[("q", city.as_str()), ("appid", self.api_key.as_str()), ("units", "metric")])
            .timeout(self.timeout)
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                tracing::warn!(api = API, city = %city, "weather request timed out");
                return Err(ToolError::ApiTimeout {
                    api: API,
                    seconds: self.timeout.as_secs(),
                });
            }
            Err(e) => {
                // the request URL carries the API key
                let e = e.without_url();
                tracing::warn!(api = API, error = %e, "weather request failed");
                return Err(ToolError::Network(format!(
                    "Connection error: {}",
                    truncate(&e.to_string(), 100)
                )));
            }
        };

        let status = response.status();
        tracing::info!(
            api = API,
            status = status.as_u16(),
            duration_ms = started.elapsed().as_millis() as u64,
            "weather api call"
        );

        match status {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => return Err(ToolError::CityNotFound(city)),
            StatusCode::UNAUTHORIZED => return Err(ToolError::ApiAuthentication { api: API }),
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse().ok());
                return Err(ToolError::ApiRateLimit {
                    api: API,
                    retry_after,
                });
            }
            other => {
                return Err(ToolError::Network(format!(
                    "{API} API error: {}",
                    other.as_u16()
                )));
            }
        }

        let body: Value = response.json().await.map_err(|e| {
            let e = e.without_url();
            tracing::warn!(api = API, error = %e, "unreadable weather response");
            ToolError::Network(format!("{API} API returned an unreadable response"))
        })?;

        Ok(report(&body, &city))
    }
}

fn validate_city(raw: &str) -> Result<String, ToolError> {
    let invalid = |city: &str, reason| ToolError::InvalidCity {
        city: city.to_string(),
        reason,
    };

    let city = raw.trim();
    if city.is_empty() {
        return Err(invalid("", "City name cannot be empty"));
    }

    let chars = city.chars().count();
    if chars < 2 {
        return Err(invalid(city, "City name too short (minimum 2 characters)"));
    }
    if chars > 100 {
        return Err(invalid(city, "City name too long (maximum 100 characters)"));
    }

    // letters (any script), digits, whitespace, '-', '\'', '_'
    let allowed = |c: char| c.is_alphanumeric() || c.is_whitespace() || matches!(c, '-' | '\'' | '_');
    if !city.chars().all(allowed) {
        return Err(invalid(
            city,
            "City name contains invalid characters (only letters, spaces, hyphens, apostrophes allowed)",
        ));
    }

    let lowered = city.to_lowercase();
    if FORBIDDEN_PATTERNS.iter().any(|p| lowered.contains(p)) {
        return Err(invalid(city, "City name contains forbidden pattern"));
    }

    Ok(city.to_string())
}

fn report(body: &Value, requested: &str) -> Value {
    let main = &body["main"];
    let weather = &body["weather"][0];
    let number = |v: &Value| v.as_f64().unwrap_or(0.0);
    let round1 = |v: f64| (v * 10.0).round() / 10.0;

    let mut out = Map::new();
    out.insert("city".into(), json!(body["name"].as_str().unwrap_or(requested)));
    out.insert(
        "country".into(),
        json!(body["sys"]["country"].as_str().unwrap_or("Unknown")),
    );
    out.insert("temperature_celsius".into(), json!(round1(number(&main["temp"]))));
    out.insert("feels_like_celsius".into(), json!(round1(number(&main["feels_like"]))));
    out.insert("humidity_percent".into(), json!(main["humidity"].as_i64().unwrap_or(0)));
    out.insert(
        "description".into(),
        json!(weather["description"].as_str().unwrap_or("Unknown")),
    );
    out.insert("weather_main".into(), json!(weather["main"].as_str().unwrap_or("Unknown")));
    out.insert("wind_speed_ms".into(), json!(round1(number(&body["wind"]["speed"]))));
    out.insert("pressure_hpa".into(), json!(main["pressure"].as_i64().unwrap_or(0)));
    out.insert("timestamp".into(), json!(Utc::now().to_rfc3339()));
    out.insert("api_timestamp".into(), json!(body["dt"].as_i64().unwrap_or(0)));

    if let Some(clouds) = body.get("clouds") {
        out.insert("cloudiness_percent".into(), json!(clouds["all"].as_i64().unwrap_or(0)));
    }
    if let Some(visibility) = body.get("visibility") {
        out.insert("visibility_meters".into(), visibility.clone());
    }

    Value::Object(out)
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
