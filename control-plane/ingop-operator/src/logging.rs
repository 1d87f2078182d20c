use tracing_subscriber::{
    EnvFilter, Layer, Registry, layer::SubscriberExt, reload,
    util::SubscriberInitExt,
};

use crate::config::LoggingConfig;
use crate::loglevel::{LevelSink, OperatorLogLevel};

/// Targets raised by the Debug and Trace levels; TraceAll raises everything.
pub const OPERATOR_TARGETS: &[&str] =
    &["ingop_operator", "ingop_store", "ingress_operator"];

/// Filter directives for `level`, on top of `base`, with `extra` (usually
/// `RUST_LOG`) appended so operators can still pin individual targets.
pub fn filter_directives(
    level: OperatorLogLevel,
    base: &str,
    extra: Option<&str>,
) -> String {
    let raise = |lvl: &str| {
        let targets: Vec<String> =
            OPERATOR_TARGETS.iter().map(|t| format!("{t}={lvl}")).collect();
        format!("{base},{}", targets.join(","))
    };
    let mut directives = match level {
        OperatorLogLevel::Normal => base.to_string(),
        OperatorLogLevel::Debug => raise("debug"),
        OperatorLogLevel::Trace => raise("trace"),
        OperatorLogLevel::TraceAll => "trace".to_string(),
    };
    if let Some(extra) = extra.map(str::trim).filter(|s| !s.is_empty()) {
        directives.push(',');
        directives.push_str(extra);
    }
    directives
}

fn build_filter(directives: &str) -> EnvFilter {
    EnvFilter::builder().parse_lossy(directives)
}

/// Handle to the installed filter; swaps it in place at runtime.
#[derive(Clone)]
pub struct FilterHandle {
    handle: reload::Handle<EnvFilter, Registry>,
    base: String,
    extra: Option<String>,
}

impl FilterHandle {
    pub fn set_level(&self, level: OperatorLogLevel) -> Result<(), reload::Error> {
        let directives = filter_directives(level, &self.base, self.extra.as_deref());
        self.handle.reload(build_filter(&directives))
    }
}

impl LevelSink for FilterHandle {
    fn apply(&self, level: OperatorLogLevel) -> Result<(), reload::Error> {
        self.set_level(level)
    }
}

/// Install the global subscriber at `Normal` verbosity. A second call
/// leaves the first subscriber in place and returns a handle that is not
/// attached to it.
pub fn init_tracing(cfg: &LoggingConfig) -> FilterHandle {
    let extra = std::env::var("RUST_LOG").ok();
    let directives = filter_directives(
        OperatorLogLevel::Normal,
        &cfg.default_directive,
        extra.as_deref(),
    );
    let (filter, handle) = reload::Layer::new(build_filter(&directives));

    let fmt_layer = if cfg.json.unwrap_or(false) {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();

    FilterHandle {
        handle,
        base: cfg.default_directive.clone(),
        extra,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_is_base_only() {
        assert_eq!(filter_directives(OperatorLogLevel::Normal, "info", None), "info");
    }

    #[test]
    fn debug_and_trace_raise_operator_targets() {
        let d = filter_directives(OperatorLogLevel::Debug, "info", None);
        assert!(d.starts_with("info,"));
        assert!(d.contains("ingop_operator=debug"));
        assert!(d.contains("ingop_store=debug"));
        let t = filter_directives(OperatorLogLevel::Trace, "warn", None);
        assert!(t.starts_with("warn,"));
        assert!(t.contains("ingop_operator=trace"));
    }

    #[test]
    fn trace_all_raises_everything_and_extra_is_appended() {
        assert_eq!(
            filter_directives(OperatorLogLevel::TraceAll, "info", Some("kube=warn")),
            "trace,kube=warn"
        );
        assert_eq!(filter_directives(OperatorLogLevel::Normal, "info", Some("  ")), "info");
    }

    #[test]
    fn reload_handle_applies_levels() {
        let (_layer, handle) = reload::Layer::<EnvFilter, Registry>::new(build_filter("info"));
        let fh = FilterHandle {
            handle,
            base: "info".into(),
            extra: None,
        };
        // The layer is still alive, so reloading succeeds.
        assert!(fh.set_level(OperatorLogLevel::Trace).is_ok());
        assert!(fh.apply(OperatorLogLevel::Normal).is_ok());
    }

    #[test]
    fn detached_handle_reports_reload_failure() {
        let (layer, handle) = reload::Layer::<EnvFilter, Registry>::new(build_filter("info"));
        drop(layer);
        let fh = FilterHandle {
            handle,
            base: "info".into(),
            extra: None,
        };
        assert!(fh.apply(OperatorLogLevel::Debug).is_err());
    }
}
