use std::{
    env, fs,
    net::{IpAddr, SocketAddr},
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, messaging::throttled::ThrottleConfig, Result};

pub const DEFAULT_TWILIO_API_BASE: &str = "https://api.twilio.com";

/// Smallest accepted `TRIAL_DELAY_SECS`.
pub const MIN_TRIAL_DELAY_SECS: u64 = 60;

/// Which SMS transport the service talks to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SmsTransport {
    Twilio {
        account_sid: String,
        auth_token: String,
        from_number: String,
    },
    /// Log and keep sent messages in memory instead of calling a carrier.
    DryRun,
}

/// Typed configuration read from the environment (and an optional `.env`).
#[derive(Clone, Debug)]
pub struct Config {
    // HTTP
    pub host: IpAddr,
    pub port: u16,

    // Storage; `None` keeps everything in memory.
    pub database_path: Option<PathBuf>,

    // SMS
    pub sms_transport: SmsTransport,
    pub twilio_api_base: String,
    pub sms_timeout: Duration,
    pub sms_global_min_interval: Duration,
    pub sms_per_number_min_interval: Duration,

    // Manual reminder triggers
    pub trial_endpoints: bool,
    pub trial_delay: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any key lookup. `load` uses the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);

        let host = match vars.str("HOST") {
            Some(h) => h
                .parse::<IpAddr>()
                .map_err(|_| Error::Config(format!("HOST is not an IP address: {h}")))?,
            None => IpAddr::from([0, 0, 0, 0]),
        };
        let port = vars.parse::<u16>("PORT").unwrap_or(8080);

        let database_path = vars.str("DATABASE_PATH").map(PathBuf::from);

        let twilio_sid = vars.str("TWILIO_SID");
        let transport = vars
            .str("SMS_TRANSPORT")
            .map(|s| s.to_lowercase())
            .unwrap_or_else(|| {
                if twilio_sid.is_some() {
                    "twilio".to_string()
                } else {
                    "dry-run".to_string()
                }
            });

        let sms_transport = match transport.as_str() {
            "twilio" => {
                let required = |key: &str| {
                    vars.str(key).ok_or_else(|| {
                        Error::Config(format!("{key} environment variable is required"))
                    })
                };
                SmsTransport::Twilio {
                    account_sid: required("TWILIO_SID")?,
                    auth_token: required("TWILIO_TOKEN")?,
                    from_number: required("TWILIO_NUMBER")?,
                }
            }
            "dry-run" | "dry_run" | "dryrun" => SmsTransport::DryRun,
            other => {
                return Err(Error::Config(format!("unknown SMS_TRANSPORT: {other}")));
            }
        };

        let twilio_api_base = vars
            .str("TWILIO_API_BASE")
            .unwrap_or_else(|| DEFAULT_TWILIO_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();
        let sms_timeout = Duration::from_millis(vars.parse::<u64>("SMS_TIMEOUT_MS").unwrap_or(10_000));

        let throttle = ThrottleConfig::default();
        let sms_global_min_interval = vars
            .parse::<u64>("SMS_GLOBAL_MIN_INTERVAL_MS")
            .map(Duration::from_millis)
            .unwrap_or(throttle.global_min_interval);
        let sms_per_number_min_interval = vars
            .parse::<u64>("SMS_PER_NUMBER_MIN_INTERVAL_MS")
            .map(Duration::from_millis)
            .unwrap_or(throttle.per_number_min_interval);

        let trial_endpoints = vars.bool("TRIAL_ENDPOINTS").unwrap_or(true);
        let trial_delay_secs = vars.parse::<u64>("TRIAL_DELAY_SECS").unwrap_or(60);
        // Trial fire times are truncated to the minute; anything shorter can land in the past.
        if trial_delay_secs < MIN_TRIAL_DELAY_SECS {
            return Err(Error::Config(format!(
                "TRIAL_DELAY_SECS must be at least {MIN_TRIAL_DELAY_SECS}, got {trial_delay_secs}"
            )));
        }
        let trial_delay = Duration::from_secs(trial_delay_secs);

        Ok(Self {
            host,
            port,
            database_path,
            sms_transport,
            twilio_api_base,
            sms_timeout,
            sms_global_min_interval,
            sms_per_number_min_interval,
            trial_endpoints,
            trial_delay,
        })
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn throttle(&self) -> ThrottleConfig {
        ThrottleConfig {
            global_min_interval: self.sms_global_min_interval,
            per_number_min_interval: self.sms_per_number_min_interval,
        }
    }
}

struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Trimmed, non-empty value.
    fn str(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    fn parse<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        self.str(key).and_then(|s| s.parse::<T>().ok())
    }

    fn bool(&self, key: &str) -> Option<bool> {
        self.str(key).map(|s| {
            matches!(
                s.to_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() || env::var_os(key).is_some() {
            continue;
        }

        let mut val = v.trim();
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = &val[1..val.len() - 1];
        }

        env::set_var(key, val);
    }
}
