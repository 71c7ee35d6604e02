//! Runtime configuration.
//!
//! Environment overrides are read once at start: `REZI_COLOR_MODE` forces
//! the color level, `REZI_FPS_CAP` overrides the frame cap, and
//! `REZI_IO_MODE` selects the backend I/O flavor for benches.

use rezi_core::terminal::ColorMode;

/// Runtime configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct RuntimeConfig {
    /// Maximum frames per second. Configurable, never baked in.
    pub fps_cap: u32,
    /// Resize coalescing window in milliseconds.
    pub resize_coalesce_ms: u64,
    /// Pending frame queue depth under backpressure.
    pub max_pending_frames: usize,
    /// Forced color mode, if any.
    pub color_mode_override: Option<ColorMode>,
    /// Backend I/O mode selector (benchmarks).
    pub io_mode: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            fps_cap: 60,
            resize_coalesce_ms: 25,
            max_pending_frames: 3,
            color_mode_override: None,
            io_mode: None,
        }
    }
}

impl RuntimeConfig {
    /// Apply environment variable overrides to this configuration.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(level) = std::env::var("REZI_COLOR_MODE") {
            if let Some(mode) = level.parse::<u8>().ok().and_then(ColorMode::from_level) {
                self.color_mode_override = Some(mode);
            }
        }
        if let Ok(cap) = std::env::var("REZI_FPS_CAP") {
            if let Ok(cap) = cap.parse::<u32>() {
                if cap > 0 {
                    self.fps_cap = cap;
                }
            }
        }
        if let Ok(mode) = std::env::var("REZI_IO_MODE") {
            if !mode.is_empty() {
                self.io_mode = Some(mode);
            }
        }
        self
    }

    /// Minimum interval between frames implied by the fps cap.
    pub fn frame_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / f64::from(self.fps_cap.max(1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.fps_cap, 60);
        assert_eq!(config.max_pending_frames, 3);
        assert!(config.resize_coalesce_ms >= 10 && config.resize_coalesce_ms <= 80);
    }

    #[test]
    fn frame_interval_from_cap() {
        let config = RuntimeConfig {
            fps_cap: 50,
            ..Default::default()
        };
        assert_eq!(config.frame_interval(), std::time::Duration::from_millis(20));
    }
}
