use envconfig::Envconfig;
use std::time::Duration;

use crate::retry::Backoff;

#[derive(Envconfig, Clone, Debug)]
pub struct OperatorConfig {
    #[envconfig(from = "INGOP_PROFILE", default = "dev")]
    pub profile: String,

    /// Namespace the operator runs in; the default IngressController and
    /// the trusted CA config map live here.
    #[envconfig(from = "INGOP_NAMESPACE", default = "openshift-ingress-operator")]
    pub namespace: String,

    /// Periodic driver interval in seconds.
    /// Env: INGOP_RECONCILE_INTERVAL_SECS
    #[envconfig(from = "INGOP_RECONCILE_INTERVAL_SECS", default = "60")]
    pub reconcile_interval_secs: u64,

    /// How long a tick waits for the read side to report ready.
    #[envconfig(from = "INGOP_CACHE_SYNC_TIMEOUT_SECS", default = "30")]
    pub cache_sync_timeout_secs: u64,

    #[envconfig(nested)]
    pub retry: RetryConfig,

    #[envconfig(nested)]
    pub logging: LoggingConfig,

    #[envconfig(nested)]
    pub features: FeaturesConfig,
}

#[derive(Envconfig, Clone, Debug)]
pub struct RetryConfig {
    /// Maximum attempts of a conflicted write, including the first.
    #[envconfig(from = "INGOP_RETRY_STEPS", default = "4")]
    pub steps: u32,
    #[envconfig(from = "INGOP_RETRY_INITIAL_MS", default = "10")]
    pub initial_ms: u64,
    #[envconfig(from = "INGOP_RETRY_FACTOR", default = "5.0")]
    pub factor: f64,
    #[envconfig(from = "INGOP_RETRY_JITTER", default = "0.1")]
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            steps: 4,
            initial_ms: 10,
            factor: 5.0,
            jitter: 0.1,
        }
    }
}

#[derive(Envconfig, Clone, Debug)]
pub struct LoggingConfig {
    /// JSON log lines; profile default when unset.
    /// Env: INGOP_LOG_JSON
    #[envconfig(from = "INGOP_LOG_JSON")]
    pub json: Option<bool>,
    /// Base filter directive used at the Normal verbosity.
    #[envconfig(from = "INGOP_LOG_DEFAULT", default = "info")]
    pub default_directive: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            json: None,
            default_directive: "info".to_string(),
        }
    }
}

#[derive(Envconfig, Clone, Debug)]
pub struct FeaturesConfig {
    /// If Some, env explicitly set; otherwise, profile defaults apply
    #[envconfig(from = "INGOP_FEATURES_GATEWAY_API")]
    pub gateway_api: Option<bool>,
    #[envconfig(from = "INGOP_FEATURES_TRUSTED_CA", default = "true")]
    pub trusted_ca: bool,
    /// Publish convergence events as Kubernetes Events as well as logs.
    #[envconfig(from = "INGOP_EVENTS_KUBE")]
    pub kube_events: Option<bool>,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            gateway_api: None,
            trusted_ca: true,
            kube_events: None,
        }
    }
}

impl RetryConfig {
    /// Non-finite or negative factor and jitter fall back to no growth and
    /// no jitter; jitter is capped at 100%.
    pub fn backoff(&self) -> Backoff {
        let factor = if self.factor.is_finite() { self.factor.max(1.0) } else { 1.0 };
        let jitter = if self.jitter.is_finite() { self.jitter.clamp(0.0, 1.0) } else { 0.0 };
        Backoff {
            steps: self.steps,
            duration: Duration::from_millis(self.initial_ms),
            factor,
            jitter,
            cap: None,
        }
    }
}

impl OperatorConfig {
    /// Apply profile → defaults mapping, while respecting explicit env overrides.
    ///
    /// - dev: json logs off, gateway API off, kube events off
    /// - prod: json logs on, gateway API on, kube events on
    pub fn apply_profile_defaults(mut self) -> Self {
        let (def_json, def_gateway, def_events) = match self.profile.as_str() {
            "prod" | "production" => (true, true, true),
            _ /* dev */ => (false, false, false),
        };

        if self.logging.json.is_none() {
            self.logging.json = Some(def_json);
        }
        if self.features.gateway_api.is_none() {
            self.features.gateway_api = Some(def_gateway);
        }
        if self.features.kube_events.is_none() {
            self.features.kube_events = Some(def_events);
        }

        self
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }

    pub fn cache_sync_timeout(&self) -> Duration {
        Duration::from_secs(self.cache_sync_timeout_secs)
    }

    pub fn gateway_api_enabled(&self) -> bool {
        self.features.gateway_api.unwrap_or(false)
    }

    pub fn kube_events_enabled(&self) -> bool {
        self.features.kube_events.unwrap_or(false)
    }
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            profile: "dev".to_string(),
            namespace: "openshift-ingress-operator".to_string(),
            reconcile_interval_secs: 60,
            cache_sync_timeout_secs: 30,
            retry: RetryConfig::default(),
            logging: LoggingConfig::default(),
            features: FeaturesConfig::default(),
        }
    }
}
