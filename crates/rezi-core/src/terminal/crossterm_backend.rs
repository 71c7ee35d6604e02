//! Crossterm-based terminal backend.
//!
//! Enters raw mode and the alternate screen, spawns a reader thread that
//! forwards stdin bytes over a channel, and executes drawlists by
//! translating commands into ANSI output. User events are injected into the
//! same channel so the runtime consumes one FIFO stream.

use std::io::{self, Read, Write};
use std::sync::mpsc;
use std::thread;

use crossterm::{
    event::{
        DisableBracketedPaste, DisableFocusChange, DisableMouseCapture, EnableBracketedPaste,
        EnableFocusChange, EnableMouseCapture,
    },
    execute,
    terminal::{self, EnterAlternateScreen, LeaveAlternateScreen},
};

use crate::drawlist::{DrawCommand, parse_drawlist};
use crate::error::{Result, ReziCoreError};

use super::{Backend, ColorMode, PolledBytes, TerminalCaps};

enum Inbound {
    Bytes(Vec<u8>),
    User(u32, Vec<u8>),
}

/// Terminal backend using crossterm for real terminal I/O.
pub struct CrosstermBackend {
    caps: TerminalCaps,
    running: bool,
    disposed: bool,
    rx: Option<mpsc::Receiver<Inbound>>,
    user_tx: Option<mpsc::Sender<Inbound>>,
    pending_users: Vec<(u32, Vec<u8>)>,
}

impl CrosstermBackend {
    /// Create a new crossterm backend, detecting capabilities.
    pub fn new() -> Self {
        Self {
            caps: detect_caps(),
            running: false,
            disposed: false,
            rx: None,
            user_tx: None,
            pending_users: Vec::new(),
        }
    }

    fn check_running(&self) -> Result<()> {
        if self.disposed {
            return Err(ReziCoreError::InvalidState("backend disposed".into()));
        }
        if !self.running {
            return Err(ReziCoreError::Stopped);
        }
        Ok(())
    }
}

impl Default for CrosstermBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for CrosstermBackend {
    fn start(&mut self) -> Result<()> {
        if self.disposed {
            return Err(ReziCoreError::InvalidState("backend disposed".into()));
        }
        if self.running {
            return Ok(());
        }
        terminal::enable_raw_mode()?;
        execute!(
            io::stdout(),
            EnterAlternateScreen,
            EnableMouseCapture,
            EnableBracketedPaste,
            EnableFocusChange
        )?;

        let (tx, rx) = mpsc::channel();
        let reader_tx = tx.clone();
        // The reader thread owns stdin; byte buffers transfer to the runtime
        // through the channel.
        thread::spawn(move || {
            let mut stdin = io::stdin();
            let mut chunk = [0u8; 4096];
            loop {
                match stdin.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => {
                        if reader_tx.send(Inbound::Bytes(chunk[..n].to_vec())).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        });

        self.rx = Some(rx);
        self.user_tx = Some(tx);
        self.running = true;
        tracing::debug!("crossterm backend started");
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if !self.running {
            return Ok(());
        }
        self.running = false;
        self.rx = None;
        self.user_tx = None;
        execute!(
            io::stdout(),
            DisableFocusChange,
            DisableBracketedPaste,
            DisableMouseCapture,
            LeaveAlternateScreen
        )?;
        terminal::disable_raw_mode()?;
        Ok(())
    }

    fn dispose(&mut self) {
        let _ = self.stop();
        self.disposed = true;
    }

    fn request_frame(&mut self, drawlist: &[u8]) -> Result<bool> {
        self.check_running()?;
        let parsed = parse_drawlist(drawlist)?;
        let mut out = String::new();
        execute_commands(&parsed, &mut out);
        let mut stdout = io::stdout();
        stdout.write_all(out.as_bytes())?;
        stdout.flush()?;
        Ok(true)
    }

    fn poll_events(&mut self) -> Result<Option<PolledBytes>> {
        self.check_running()?;
        let Some(rx) = &self.rx else {
            return Err(ReziCoreError::Stopped);
        };
        loop {
            match rx.try_recv() {
                Ok(Inbound::Bytes(bytes)) => return Ok(Some(PolledBytes { bytes })),
                Ok(Inbound::User(tag, payload)) => {
                    self.pending_users.push((tag, payload));
                }
                Err(mpsc::TryRecvError::Empty) => return Ok(None),
                Err(mpsc::TryRecvError::Disconnected) => return Err(ReziCoreError::Stopped),
            }
        }
    }

    fn post_user_event(&mut self, tag: u32, payload: Vec<u8>) -> Result<()> {
        self.check_running()?;
        let Some(tx) = &self.user_tx else {
            return Err(ReziCoreError::Stopped);
        };
        tx.send(Inbound::User(tag, payload))
            .map_err(|_| ReziCoreError::Stopped)
    }

    fn take_user_events(&mut self) -> Vec<(u32, Vec<u8>)> {
        std::mem::take(&mut self.pending_users)
    }

    fn caps(&self) -> &TerminalCaps {
        &self.caps
    }

    fn size(&self) -> Result<(u16, u16)> {
        Ok(terminal::size()?)
    }
}

impl Drop for CrosstermBackend {
    fn drop(&mut self) {
        if self.running {
            let _ = self.stop();
        }
    }
}

/// Translate drawlist commands into ANSI escape output.
fn execute_commands(parsed: &crate::drawlist::Drawlist, out: &mut String) {
    use std::fmt::Write as _;

    for command in &parsed.commands {
        match command {
            DrawCommand::Clear => out.push_str("\x1b[2J\x1b[H"),
            DrawCommand::FillRect { x, y, w, h, style } => {
                if *w <= 0 || *h <= 0 {
                    continue;
                }
                let _ = write!(
                    out,
                    "\x1b[48;2;{};{};{}m",
                    (style.bg >> 16) & 0xff,
                    (style.bg >> 8) & 0xff,
                    style.bg & 0xff
                );
                let blank = " ".repeat(*w as usize);
                for row in 0..*h {
                    let _ = write!(out, "\x1b[{};{}H{}", y + row + 1, x + 1, blank);
                }
                out.push_str("\x1b[0m");
            }
            DrawCommand::DrawText {
                x,
                y,
                string_index,
                byte_off,
                byte_len,
                style,
            } => {
                let Some(text) = parsed.strings.get(*string_index as usize) else {
                    continue;
                };
                let start = *byte_off as usize;
                let end = start + *byte_len as usize;
                let Some(span) = text.get(start..end) else {
                    continue;
                };
                let _ = write!(
                    out,
                    "\x1b[{};{}H\x1b[38;2;{};{};{}m{}\x1b[0m",
                    y + 1,
                    x + 1,
                    (style.fg >> 16) & 0xff,
                    (style.fg >> 8) & 0xff,
                    style.fg & 0xff,
                    span
                );
            }
            // Clipping is enforced by the renderer's geometry; the ANSI
            // translation draws what it is given.
            DrawCommand::PushClip { .. } | DrawCommand::PopClip => {}
            DrawCommand::DrawTextRun { x, y, blob_index } => {
                let Some(blob) = parsed.blobs.get(*blob_index as usize) else {
                    continue;
                };
                let Ok(segments) = crate::drawlist::parse_text_run(blob) else {
                    continue;
                };
                let _ = write!(out, "\x1b[{};{}H", y + 1, x + 1);
                for seg in segments {
                    let Some(text) = parsed.strings.get(seg.string_index as usize) else {
                        continue;
                    };
                    let start = seg.byte_off as usize;
                    let Some(span) = text.get(start..start + seg.byte_len as usize) else {
                        continue;
                    };
                    let _ = write!(
                        out,
                        "\x1b[38;2;{};{};{}m{}",
                        (seg.style.fg >> 16) & 0xff,
                        (seg.style.fg >> 8) & 0xff,
                        seg.style.fg & 0xff,
                        span
                    );
                }
                out.push_str("\x1b[0m");
            }
        }
    }
}

/// Detect capabilities from the environment.
fn detect_caps() -> TerminalCaps {
    TerminalCaps {
        color_mode: detect_color_mode(),
        ..TerminalCaps::default()
    }
}

/// Detect the color level from environment variables.
fn detect_color_mode() -> ColorMode {
    if let Ok(ct) = std::env::var("COLORTERM") {
        if ct == "truecolor" || ct == "24bit" {
            return ColorMode::TrueColor;
        }
    }
    if let Ok(term) = std::env::var("TERM") {
        if term.contains("256color") {
            return ColorMode::Extended256;
        }
    }
    if std::env::var("NO_COLOR").is_ok() {
        return ColorMode::None;
    }
    ColorMode::Basic16
}
