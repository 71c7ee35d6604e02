//! Terminal backend contract.
//!
//! A backend executes drawlists against a terminal and surfaces raw input
//! bytes. The runtime drives it through [`Backend`]: `start`, frame
//! submission, byte polling, and `stop`. Every operation after `stop` fails
//! with a stopped error, and buffer ownership transfers to the caller on
//! poll.

pub mod crossterm_backend;
pub mod test_backend;

pub use crossterm_backend::CrosstermBackend;
pub use test_backend::TestBackend;

use crate::error::Result;

/// Color capability level, `0..=3`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ColorMode {
    /// No color.
    None = 0,
    /// 16 ANSI colors.
    Basic16 = 1,
    /// 256-color palette.
    Extended256 = 2,
    /// 24-bit true color.
    TrueColor = 3,
}

impl ColorMode {
    /// Parse a `0..=3` level.
    pub const fn from_level(level: u8) -> Option<ColorMode> {
        match level {
            0 => Some(ColorMode::None),
            1 => Some(ColorMode::Basic16),
            2 => Some(ColorMode::Extended256),
            3 => Some(ColorMode::TrueColor),
            _ => None,
        }
    }
}

/// Capabilities reported by a terminal backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TerminalCaps {
    /// Color support level.
    pub color_mode: ColorMode,
    /// Mouse reporting available.
    pub supports_mouse: bool,
    /// Bracketed paste available.
    pub supports_bracketed_paste: bool,
    /// Focus in/out reporting available.
    pub supports_focus_events: bool,
    /// OSC 52 clipboard writes available.
    pub supports_osc52: bool,
    /// Synchronized update (mode 2026) available.
    pub supports_sync_update: bool,
    /// Scroll regions available.
    pub supports_scroll_region: bool,
    /// Cursor shape control available.
    pub supports_cursor_shape: bool,
    /// The output stream can report writability.
    pub supports_output_wait_writable: bool,
    /// Underline style variants available.
    pub supports_underline_styles: bool,
    /// Colored underlines available.
    pub supports_colored_underlines: bool,
    /// Hyperlink escapes available.
    pub supports_hyperlinks: bool,
    /// Bitmask of supported SGR attributes.
    pub sgr_attrs_supported: u32,
}

impl Default for TerminalCaps {
    fn default() -> Self {
        Self {
            color_mode: ColorMode::TrueColor,
            supports_mouse: true,
            supports_bracketed_paste: true,
            supports_focus_events: true,
            supports_osc52: false,
            supports_sync_update: false,
            supports_scroll_region: false,
            supports_cursor_shape: true,
            supports_output_wait_writable: false,
            supports_underline_styles: false,
            supports_colored_underlines: false,
            supports_hyperlinks: false,
            sgr_attrs_supported: 0xff,
        }
    }
}

/// A polled batch of raw input bytes.
///
/// Ownership of the buffer transfers to the caller; dropping it releases
/// the backend's buffer slot.
#[derive(Debug, Default)]
pub struct PolledBytes {
    /// The raw bytes read from the terminal.
    pub bytes: Vec<u8>,
}

/// Abstraction over terminal backends.
pub trait Backend {
    /// Start the backend (enter raw mode, begin reading input).
    fn start(&mut self) -> Result<()>;

    /// Stop the backend. Pending and future operations fail with a stopped
    /// error. Events already enqueued are not lost until `dispose`.
    fn stop(&mut self) -> Result<()>;

    /// Release all resources. The backend cannot be restarted afterwards.
    fn dispose(&mut self);

    /// Submit a drawlist and wait for the frame to complete.
    ///
    /// Returns `Ok(true)` when the output stream drained, `Ok(false)` when
    /// the frame was accepted but the stream reports backpressure.
    fn request_frame(&mut self, drawlist: &[u8]) -> Result<bool>;

    /// Poll for buffered input bytes. Returns `None` when nothing arrived.
    fn poll_events(&mut self) -> Result<Option<PolledBytes>>;

    /// Whether the output stream has drained and can accept another frame.
    fn poll_drained(&mut self) -> bool {
        true
    }

    /// Enqueue an application-defined event into the input stream.
    fn post_user_event(&mut self, tag: u32, payload: Vec<u8>) -> Result<()>;

    /// Drain application events posted since the last call, in post order.
    fn take_user_events(&mut self) -> Vec<(u32, Vec<u8>)>;

    /// The terminal's capabilities.
    fn caps(&self) -> &TerminalCaps;

    /// Current terminal size as (cols, rows).
    fn size(&self) -> Result<(u16, u16)>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_mode_levels() {
        assert_eq!(ColorMode::from_level(0), Some(ColorMode::None));
        assert_eq!(ColorMode::from_level(3), Some(ColorMode::TrueColor));
        assert_eq!(ColorMode::from_level(4), None);
    }

    #[test]
    fn default_caps_are_conservative() {
        let caps = TerminalCaps::default();
        assert!(caps.supports_mouse);
        assert!(!caps.supports_hyperlinks);
    }
}
