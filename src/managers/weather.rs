//! Weather manager: live Open-Meteo fetches behind a short cache.
//!
//! Snapshots are never persisted — a reading has a short validity window
//! and is refetched once the cache entry ages out. Fetches are bounded by
//! a request timeout and one retry so a slow upstream can never stall the
//! session loop.

use crate::config::WeatherConfig;
use crate::error::{AssistantError, Result};
use crate::managers::with_one_retry;
use chrono::{DateTime, Timelike, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// One forecast step.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastEntry {
    /// Display time, e.g. `3PM`.
    pub time: String,
    pub temperature_c: f64,
    pub weather_code: i64,
}

/// Current conditions plus a short forecast.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherSnapshot {
    pub latitude: f64,
    pub longitude: f64,
    pub observed_at: DateTime<Utc>,
    pub temperature_c: f64,
    pub weather_code: i64,
    pub is_day: bool,
    pub high_c: f64,
    pub low_c: f64,
    pub forecast: Vec<ForecastEntry>,
}

/// Cache key: coordinates rounded to ~100 m.
fn cache_key(latitude: f64, longitude: f64) -> (i64, i64) {
    ((latitude * 1000.0) as i64, (longitude * 1000.0) as i64)
}

/// Fetches weather from an Open-Meteo compatible API.
pub struct WeatherManager {
    client: reqwest::Client,
    config: WeatherConfig,
    cache: Mutex<HashMap<(i64, i64), (Instant, WeatherSnapshot)>>,
}

impl WeatherManager {
    /// Create a weather manager.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &WeatherConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| AssistantError::Http(e.to_string()))?;
        Ok(Self {
            client,
            config: config.clone(),
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// Fetch conditions for the configured home location, serving from
    /// the cache inside the validity window.
    ///
    /// # Errors
    ///
    /// Returns a transient error on timeout or transport failure after
    /// the bounded retry.
    pub async fn fetch(&self) -> Result<WeatherSnapshot> {
        self.fetch_at(self.config.latitude, self.config.longitude)
            .await
    }

    /// Fetch conditions for explicit coordinates.
    ///
    /// # Errors
    ///
    /// As [`WeatherManager::fetch`].
    pub async fn fetch_at(&self, latitude: f64, longitude: f64) -> Result<WeatherSnapshot> {
        let key = cache_key(latitude, longitude);
        let ttl = Duration::from_secs(self.config.cache_ttl_secs);
        {
            let cache = self.lock_cache();
            if let Some((fetched, snapshot)) = cache.get(&key) {
                if fetched.elapsed() < ttl {
                    return Ok(snapshot.clone());
                }
            }
        }

        let snapshot = with_one_retry(|| self.request(latitude, longitude)).await?;
        self.lock_cache()
            .insert(key, (Instant::now(), snapshot.clone()));
        Ok(snapshot)
    }

    fn lock_cache(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<(i64, i64), (Instant, WeatherSnapshot)>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn request(&self, latitude: f64, longitude: f64) -> Result<WeatherSnapshot> {
        let response = self
            .client
            .get(&self.config.api_url)
            .query(&[
                ("latitude", latitude.to_string()),
                ("longitude", longitude.to_string()),
                ("current", "temperature_2m,weather_code,is_day".to_owned()),
                ("hourly", "temperature_2m,weather_code".to_owned()),
                ("temperature_unit", "celsius".to_owned()),
                ("timezone", "auto".to_owned()),
                ("forecast_days", "1".to_owned()),
            ])
            .send()
            .await
            .map_err(map_transport)?
            .error_for_status()
            .map_err(|e| AssistantError::Http(e.to_string()))?;

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AssistantError::Http(format!("malformed weather response: {e}")))?;

        Ok(parse_snapshot(&data, latitude, longitude))
    }
}

fn map_transport(e: reqwest::Error) -> AssistantError {
    if e.is_timeout() {
        AssistantError::Timeout(format!("weather: {e}"))
    } else {
        AssistantError::Http(format!("weather: {e}"))
    }
}

/// Convert the Open-Meteo payload into a snapshot. Missing fields fall
/// back to zeros rather than failing the whole read.
fn parse_snapshot(data: &serde_json::Value, latitude: f64, longitude: f64) -> WeatherSnapshot {
    let current = &data["current"];
    let hourly = &data["hourly"];

    let times: Vec<&str> = hourly["time"]
        .as_array()
        .map(|a| a.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();
    let temps: Vec<f64> = hourly["temperature_2m"]
        .as_array()
        .map(|a| a.iter().filter_map(serde_json::Value::as_f64).collect())
        .unwrap_or_default();
    let codes: Vec<i64> = hourly["weather_code"]
        .as_array()
        .map(|a| a.iter().filter_map(serde_json::Value::as_i64).collect())
        .unwrap_or_default();

    // Two-hour-step forecast starting from the current hour.
    let now_hour = chrono::Local::now().hour() as usize;
    let mut forecast = Vec::new();
    let mut i = now_hour;
    while i < times.len() && forecast.len() < 4 {
        let display = chrono::NaiveDateTime::parse_from_str(times[i], "%Y-%m-%dT%H:%M")
            .map(|t| {
                t.format("%I%p")
                    .to_string()
                    .trim_start_matches('0')
                    .to_owned()
            })
            .unwrap_or_else(|_| times[i].to_owned());
        forecast.push(ForecastEntry {
            time: display,
            temperature_c: temps.get(i).copied().unwrap_or_default(),
            weather_code: codes.get(i).copied().unwrap_or_default(),
        });
        i += 2;
    }

    let high_c = temps.iter().copied().fold(f64::MIN, f64::max);
    let low_c = temps.iter().copied().fold(f64::MAX, f64::min);

    WeatherSnapshot {
        latitude,
        longitude,
        observed_at: Utc::now(),
        temperature_c: current["temperature_2m"].as_f64().unwrap_or_default(),
        weather_code: current["weather_code"].as_i64().unwrap_or_default(),
        is_day: current["is_day"].as_i64().unwrap_or(1) != 0,
        high_c: if temps.is_empty() { 0.0 } else { high_c },
        low_c: if temps.is_empty() { 0.0 } else { low_c },
        forecast,
    }
}
