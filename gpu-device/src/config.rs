//! Startup configuration, read once from the environment rather
//! than threaded through call sites or re-read per submission.

use std::env;

fn env_flag(name: &str) -> bool {
    match env::var(name) {
        Ok(value) => !matches!(value.as_str(), "" | "0" | "false"),
        Err(_) => false,
    }
}

fn env_u32(name: &str, default: u32) -> u32 {
    env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_f64(name: &str, default: f64) -> f64 {
    env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Read once at process startup. Everything below has a working default, so a bare
/// `Config::from_env()` with no environment set up at all is a valid configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub validation: bool,
    pub preferred_adapter_index: Option<u32>,
    pub shared_memory_path_prefix: String,
    pub graphics_pipe_count: u32,
    pub compute_pipe_count: u32,
    pub vblank_rate_hz: f64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            validation: false,
            preferred_adapter_index: None,
            shared_memory_path_prefix: "rpcsx-gpu-cmds".to_string(),
            graphics_pipe_count: 2,
            compute_pipe_count: 2,
            vblank_rate_hz: gpu_present::DEFAULT_VBLANK_HZ,
        }
    }
}

impl Config {
    /// Reads `GPU_VALIDATION`, `GPU_ADAPTER_INDEX`, `GPU_SHM_PATH`,
    /// `GPU_GRAPHICS_PIPES`, `GPU_COMPUTE_PIPES`, `GPU_VBLANK_HZ`; log filtering is left
    /// to `env_logger`'s own `RUST_LOG`/`GPU_LOG` conventions, initialized separately by
    /// the binary that embeds this crate (`gpu-cli`, the test harness, or a consuming
    /// kernel shim), not by the library itself.
    pub fn from_env() -> Self {
        let defaults = Config::default();
        Config {
            validation: env_flag("GPU_VALIDATION"),
            preferred_adapter_index: env::var("GPU_ADAPTER_INDEX").ok().and_then(|v| v.parse().ok()),
            shared_memory_path_prefix: env::var("GPU_SHM_PATH").unwrap_or(defaults.shared_memory_path_prefix),
            graphics_pipe_count: env_u32("GPU_GRAPHICS_PIPES", defaults.graphics_pipe_count),
            compute_pipe_count: env_u32("GPU_COMPUTE_PIPES", defaults.compute_pipe_count),
            vblank_rate_hz: env_f64("GPU_VBLANK_HZ", defaults.vblank_rate_hz),
        }
    }

    pub fn instance_config(&self) -> gpu_hal::InstanceConfig {
        gpu_hal::InstanceConfig { validation: self.validation, preferred_gpu_index: self.preferred_adapter_index }
    }
}

/// Initializes `env_logger` from `RUST_LOG`/`GPU_LOG`, whichever is set, falling back to
/// `info`. Idempotent: a second call is a harmless no-op, matching `env_logger::try_init`.
pub fn init_logging() {
    let mut builder = env_logger::Builder::new();
    let filter = std::env::var("GPU_LOG").or_else(|_| std::env::var("RUST_LOG")).unwrap_or_else(|_| "info".into());
    builder.parse_filters(&filter);
    let _ = builder.try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable_with_no_environment() {
        let config = Config::default();
        assert_eq!(config.graphics_pipe_count, 2);
        assert!((config.vblank_rate_hz - 59.94).abs() < 0.01);
    }
}
