//! Quiet-mode aware progress messages. With QUARRY_QUIET=1 only warnings and
//! errors get through.

#[macro_export]
macro_rules! info_log {
    ($($arg:tt)*) => {{
        if !$crate::log::is_quiet() {
            tracing::info!($($arg)*);
        }
    }};
}

pub fn is_quiet() -> bool {
    quarry_core::config::ObservabilityConfig::from_env().quiet
}
