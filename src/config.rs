use std::time::Duration;

use crate::feed::DEFAULT_PAGE_SIZE;
use crate::pipeline::{MissingLocationPolicy, DEFAULT_RADIUS_KM};

/// Hosted backend endpoint and public (anon) key.
#[derive(Debug, Clone, PartialEq)]
pub struct SupabaseCredentials {
    pub url: String,
    pub anon_key: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// `None` runs the service in offline mode.
    pub supabase: Option<SupabaseCredentials>,
    pub port: u16,
    pub page_size: u32,
    pub default_radius_km: f64,
    pub missing_location: MissingLocationPolicy,
    /// Enables the per-volunteer variant of the "mine" filter.
    pub volunteer_name: Option<String>,
    pub geolocation_url: Option<String>,
    pub geolocation_timeout_ms: u64,
    pub realtime_poll_interval_ms: u64,
    pub backend_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            supabase: None,
            port: 3000,
            page_size: DEFAULT_PAGE_SIZE,
            default_radius_km: DEFAULT_RADIUS_KM,
            missing_location: MissingLocationPolicy::Include,
            volunteer_name: None,
            geolocation_url: None,
            geolocation_timeout_ms: 3000,
            realtime_poll_interval_ms: 2000,
            backend_timeout_secs: 30,
        }
    }
}

fn non_empty_var(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> anyhow::Result<T> {
    match non_empty_var(&[name]) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| anyhow::anyhow!("{} has an invalid value: {}", name, raw)),
    }
}

fn validate_http_url(name: &str, url: String) -> anyhow::Result<String> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        anyhow::bail!("{} must start with http:// or https://", name);
    }
    url::Url::parse(&url).map_err(|e| anyhow::anyhow!("{} is not a valid URL: {}", name, e))?;
    Ok(url.trim_end_matches('/').to_string())
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let url = non_empty_var(&["SUPABASE_URL", "NEXT_PUBLIC_SUPABASE_URL"]);
        let anon_key = non_empty_var(&["SUPABASE_ANON_KEY", "NEXT_PUBLIC_SUPABASE_ANON_KEY"]);
        let supabase = match (url, anon_key) {
            (Some(url), Some(anon_key)) => Some(SupabaseCredentials {
                url: validate_http_url("SUPABASE_URL", url)?,
                anon_key,
            }),
            (None, None) => None,
            (Some(_), None) | (None, Some(_)) => {
                tracing::warn!(
                    "Only one of SUPABASE_URL / SUPABASE_ANON_KEY is set; running offline"
                );
                None
            }
        };

        let config = Self {
            supabase,
            port: parse_var("PORT", 3000u16)
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            page_size: parse_var("FEED_PAGE_SIZE", DEFAULT_PAGE_SIZE).and_then(|size| {
                if size == 0 {
                    anyhow::bail!("FEED_PAGE_SIZE must be at least 1");
                }
                Ok(size)
            })?,
            default_radius_km: parse_var("FEED_DEFAULT_RADIUS_KM", DEFAULT_RADIUS_KM).and_then(
                |radius: f64| {
                    if !radius.is_finite() || radius < 0.0 {
                        anyhow::bail!("FEED_DEFAULT_RADIUS_KM must be a non-negative number");
                    }
                    Ok(radius)
                },
            )?,
            missing_location: match non_empty_var(&["FEED_MISSING_LOCATION"]) {
                None => MissingLocationPolicy::Include,
                Some(raw) => raw
                    .parse()
                    .map_err(|e: String| anyhow::anyhow!("FEED_MISSING_LOCATION: {}", e))?,
            },
            volunteer_name: non_empty_var(&["VOLUNTEER_NAME"]),
            geolocation_url: non_empty_var(&["GEOLOCATION_URL"])
                .map(|url| validate_http_url("GEOLOCATION_URL", url))
                .transpose()?,
            geolocation_timeout_ms: parse_var("GEOLOCATION_TIMEOUT_MS", 3000u64)?,
            realtime_poll_interval_ms: parse_var("REALTIME_POLL_INTERVAL_MS", 2000u64)?,
            backend_timeout_secs: parse_var("BACKEND_TIMEOUT_SECS", 30u64)?,
        };

        // Log configuration (without the anon key)
        match config.supabase {
            Some(ref creds) => tracing::info!("Supabase backend configured: {}", creds.url),
            None => tracing::warn!("Supabase credentials missing; starting in offline mode"),
        }
        tracing::debug!("Server Port: {}", config.port);
        tracing::debug!(
            "Feed page size {}, default radius {} km, missing location {:?}",
            config.page_size,
            config.default_radius_km,
            config.missing_location
        );

        Ok(config)
    }

    pub fn is_offline(&self) -> bool {
        self.supabase.is_none()
    }

    pub fn geolocation_timeout(&self) -> Duration {
        Duration::from_millis(self.geolocation_timeout_ms)
    }

    pub fn realtime_poll_interval(&self) -> Duration {
        Duration::from_millis(self.realtime_poll_interval_ms.max(100))
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.backend_timeout_secs.max(1))
    }
}
