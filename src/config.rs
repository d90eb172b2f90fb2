use config::{Config, ConfigError, Environment, File};
use serde::{de, Deserialize, Deserializer};
use std::time::Duration;

/// Service configuration. Every section has working defaults so the binary
/// starts with no config file at all; `BEACON__`-prefixed environment
/// variables override file values.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct BeaconConfig {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub startup: StartupConfig,
    #[serde(default)]
    pub modules: Vec<ModuleSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventsConfig {
    /// Broadcast channel capacity for change events.
    #[serde(default = "default_event_buffer")]
    pub buffer: usize,
    /// Interval between system-state frames on the SSE feed.
    #[serde(
        default = "default_system_period",
        deserialize_with = "humantime_duration"
    )]
    pub system_period: Duration,
    /// SSE keep-alive comment interval.
    #[serde(default = "default_keepalive", deserialize_with = "humantime_duration")]
    pub keepalive: Duration,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            buffer: default_event_buffer(),
            system_period: default_system_period(),
            keepalive: default_keepalive(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GateConfig {
    /// Retry-After hint attached to gated 503 responses.
    #[serde(default = "default_retry_after", deserialize_with = "humantime_duration")]
    pub retry_after: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            retry_after: default_retry_after(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StartupConfig {
    /// How long the startup announcer waits for full system readiness before
    /// logging a warning.
    #[serde(
        default = "default_ready_timeout",
        deserialize_with = "humantime_duration"
    )]
    pub ready_timeout: Duration,
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            ready_timeout: default_ready_timeout(),
        }
    }
}

/// A module known at startup, registered with the tracker before the server
/// accepts traffic. Modules report their own state transitions afterwards.
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleSpec {
    pub name: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub endpoints: Vec<String>,
}

impl BeaconConfig {
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder =
            Config::builder().add_source(File::with_name("config/local").required(false));

        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path));
        }

        builder
            .add_source(Environment::with_prefix("BEACON").separator("__"))
            .build()?
            .try_deserialize()
    }
}

fn humantime_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    humantime::parse_duration(&raw).map_err(de::Error::custom)
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_event_buffer() -> usize {
    64
}

fn default_system_period() -> Duration {
    Duration::from_secs(5)
}

fn default_keepalive() -> Duration {
    Duration::from_secs(15)
}

fn default_retry_after() -> Duration {
    Duration::from_secs(2)
}

fn default_ready_timeout() -> Duration {
    Duration::from_secs(30)
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    #[test]
    fn defaults_apply_with_an_empty_source() {
        let parsed: BeaconConfig = Config::builder()
            .add_source(File::from_str("{}", FileFormat::Yaml))
            .build()
            .expect("build config")
            .try_deserialize()
            .expect("deserialize config");

        assert_eq!(parsed.http.port, 8080);
        assert_eq!(parsed.events.buffer, 64);
        assert_eq!(parsed.gate.retry_after, Duration::from_secs(2));
        assert!(parsed.modules.is_empty());
    }

    #[test]
    fn yaml_config_parses_modules_and_durations() {
        let raw = r#"
http:
  host: 0.0.0.0
  port: 9090
events:
  system_period: 2s
  keepalive: 30s
gate:
  retry_after: 500ms
modules:
  - name: NewsModule
    endpoints:
      - /api/news/latest
      - /api/news/search
  - name: AiModule
    depends_on:
      - NewsModule
    endpoints:
      - /api/ai/assist
"#;

        let parsed: BeaconConfig = Config::builder()
            .add_source(File::from_str(raw, FileFormat::Yaml))
            .build()
            .expect("build config")
            .try_deserialize()
            .expect("deserialize config");

        assert_eq!(parsed.http.host, "0.0.0.0");
        assert_eq!(parsed.http.port, 9090);
        assert_eq!(parsed.events.system_period, Duration::from_secs(2));
        assert_eq!(parsed.gate.retry_after, Duration::from_millis(500));
        assert_eq!(parsed.modules.len(), 2);
        assert_eq!(parsed.modules[0].endpoints.len(), 2);
        assert_eq!(parsed.modules[1].depends_on, vec!["NewsModule".to_string()]);
    }
}
