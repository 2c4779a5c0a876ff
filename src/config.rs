use std::{path::Path, time::Duration};

use crate::{
    foundation::error::{MatrixError, MatrixResult},
    schedule::parse_trigger,
    scroll_canvas::{DEFAULT_SCROLL_INTERVAL, ScrollDirection},
};

pub const DEFAULT_HTTP_PORT: u16 = 8080;

#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
/// Top-level runtime configuration, read from a JSON file.
///
/// Zero values mean "use the default"; [`Config::defaults`] fills them in.
pub struct Config {
    /// Port of the HTTP control surface.
    #[serde(default)]
    pub http_listen_port: u16,
    #[serde(default)]
    pub hardware_config: Option<HardwareConfig>,
    /// Daily "HH:MM" times at which the screen turns off.
    #[serde(default)]
    pub screen_off_times: Vec<String>,
    /// Daily "HH:MM" times at which the screen turns back on.
    #[serde(default)]
    pub screen_on_times: Vec<String>,
    /// Render boards through a scrolling canvas instead of the static one.
    #[serde(default)]
    pub scroll_mode: bool,
    /// Milliseconds per scroll step.
    #[serde(default)]
    pub scroll_interval_ms: u64,
    #[serde(default)]
    pub scroll_direction: ScrollDirection,
    #[serde(default)]
    pub pacing: Pacing,
}

#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
/// Panel wiring and timing. Only geometry and brightness matter to the virtual devices;
/// the rest is carried for hardware drivers.
pub struct HardwareConfig {
    #[serde(default)]
    pub rows: usize,
    #[serde(default)]
    pub cols: usize,
    /// Percent, 1..=100.
    #[serde(default)]
    pub brightness: u8,
    #[serde(default)]
    pub hardware_mapping: String,
    #[serde(default)]
    pub chain_length: usize,
    #[serde(default)]
    pub parallel: usize,
    #[serde(default)]
    pub pwm_bits: u8,
    #[serde(default)]
    pub pwm_lsb_nanoseconds: u32,
}

impl HardwareConfig {
    /// Display size in pixels: chained panels extend the width, parallel chains the height.
    pub fn geometry(&self) -> (usize, usize) {
        (
            self.cols * self.chain_length.max(1),
            self.rows * self.parallel.max(1),
        )
    }
}

#[derive(Clone, Copy, Debug, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
/// Timing of the board rotation loop.
pub struct Pacing {
    /// Warn when a single board render runs longer than this.
    pub watchdog_secs: u64,
    /// Renders that return faster than this are followed by `pause_ms`.
    pub min_render_ms: u64,
    pub pause_ms: u64,
    /// Sleep between checks while the screen is off or every board is disabled.
    pub idle_poll_ms: u64,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            watchdog_secs: 5 * 60,
            min_render_ms: 2_000,
            pause_ms: 5_000,
            idle_poll_ms: 1_000,
        }
    }
}

impl Pacing {
    pub fn watchdog(&self) -> Duration {
        Duration::from_secs(self.watchdog_secs)
    }

    pub fn min_render(&self) -> Duration {
        Duration::from_millis(self.min_render_ms)
    }

    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_ms)
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }
}

impl Config {
    pub fn load(path: &Path) -> MatrixResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| MatrixError::config(format!("read '{}': {e}", path.display())))?;
        let mut cfg: Config = serde_json::from_str(&raw)
            .map_err(|e| MatrixError::config(format!("parse '{}': {e}", path.display())))?;
        cfg.defaults();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Replace zero values with defaults. 32-column panels are not supported and are
    /// bumped to 64; full brightness is toned down to 60.
    pub fn defaults(&mut self) {
        if self.http_listen_port == 0 {
            self.http_listen_port = DEFAULT_HTTP_PORT;
        }
        if self.scroll_interval_ms == 0 {
            self.scroll_interval_ms = DEFAULT_SCROLL_INTERVAL.as_millis() as u64;
        }

        let hw = self.hardware_config.get_or_insert_with(HardwareConfig::default);
        if hw.rows == 0 {
            hw.rows = 32;
        }
        if hw.cols == 32 || hw.cols == 0 {
            hw.cols = 64;
        }
        if hw.brightness == 0 || hw.brightness == 100 {
            hw.brightness = 60;
        }
        if hw.hardware_mapping.is_empty() {
            hw.hardware_mapping = "adafruit-hat-pwm".to_string();
        }
        if hw.chain_length == 0 {
            hw.chain_length = 1;
        }
        if hw.parallel == 0 {
            hw.parallel = 1;
        }
        if hw.pwm_bits == 0 {
            hw.pwm_bits = 11;
        }
        if hw.pwm_lsb_nanoseconds == 0 {
            hw.pwm_lsb_nanoseconds = 130;
        }
    }

    pub fn validate(&self) -> MatrixResult<()> {
        for t in self.screen_off_times.iter().chain(&self.screen_on_times) {
            parse_trigger(t)?;
        }
        if let Some(hw) = &self.hardware_config {
            if hw.rows == 0 || hw.cols == 0 {
                return Err(MatrixError::validation("matrix rows/cols must be > 0"));
            }
            if hw.brightness > 100 {
                return Err(MatrixError::validation(format!(
                    "brightness {} is not a percentage",
                    hw.brightness
                )));
            }
        }
        if self.pacing.idle_poll_ms == 0 {
            return Err(MatrixError::validation("pacing.idlePollMs must be > 0"));
        }
        Ok(())
    }

    pub fn hardware(&self) -> HardwareConfig {
        self.hardware_config.clone().unwrap_or_default()
    }

    pub fn scroll_interval(&self) -> Duration {
        Duration::from_millis(self.scroll_interval_ms)
    }
}
