use once_cell::sync::OnceCell;
use tracing_subscriber::{
    fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
    EnvFilter,
};

static FILE_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

/// Rolling file output, enabled with `HISCORE_LOG_ROLL=1`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RollSettings {
    pub dir: String,
    pub prefix: String,
    pub rotation: Rotation,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rotation {
    Minutely,
    Hourly,
    Daily,
}

impl Rotation {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "hourly" => Rotation::Hourly,
            "minutely" => Rotation::Minutely,
            _ => Rotation::Daily,
        }
    }
}

impl RollSettings {
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Option<Self> {
        if get("HISCORE_LOG_ROLL").as_deref() != Some("1") {
            return None;
        }
        Some(Self {
            dir: get("HISCORE_LOG_DIR").unwrap_or_else(|| "logs".to_string()),
            prefix: get("HISCORE_LOG_PREFIX").unwrap_or_else(|| "hiscore".into()),
            rotation: Rotation::parse(&get("HISCORE_LOG_ROTATION").unwrap_or_default()),
        })
    }
}

/// Installs the global subscriber; console output goes to stderr.
/// `RUST_LOG` controls the filter (default `info`). Later calls are no-ops.
pub fn init() {
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = fmt::layer().with_writer(std::io::stderr);
    let registry = tracing_subscriber::registry().with(console.with_filter(filter()));

    let Some(roll) = RollSettings::from_env() else {
        let _ = registry.try_init();
        return;
    };
    if std::fs::create_dir_all(&roll.dir).is_err() {
        eprintln!("failed to create log directory {}", roll.dir);
    }
    let writer = match roll.rotation {
        Rotation::Hourly => tracing_appender::rolling::hourly(&roll.dir, &roll.prefix),
        Rotation::Minutely => tracing_appender::rolling::minutely(&roll.dir, &roll.prefix),
        Rotation::Daily => tracing_appender::rolling::daily(&roll.dir, &roll.prefix),
    };
    let (nb, guard) = tracing_appender::non_blocking(writer);
    let _ = FILE_GUARD.set(guard);
    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(nb)
        .with_filter(filter());
    let _ = registry.with(file_layer).try_init();
}
