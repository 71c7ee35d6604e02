//! The streaming ANSI/CSI decoder.

use crate::event::{Event, KeyAction, KeyCode, KeyEvent, Modifiers, MouseEvent, MouseKind};

use super::{EventParseError, InputLimits, ParseErrorCode};

const ESC: u8 = 0x1b;

/// Result of attempting to decode one item from the front of the buffer.
enum Step {
    /// Nothing to decode yet; wait for more bytes.
    Incomplete,
    /// Decoded `consumed` bytes into zero or more events.
    Done { events: Vec<Event>, consumed: usize },
    /// The front of the buffer violates the grammar.
    Malformed { consumed: usize, detail: String },
}

/// Streaming decoder of terminal input bytes.
#[derive(Debug)]
pub struct InputParser {
    buf: Vec<u8>,
    limits: InputLimits,
    /// Active bracketed-paste accumulation.
    paste: Option<Vec<u8>>,
    /// The active paste exceeded the cap and will be dropped.
    paste_overflow: bool,
}

impl Default for InputParser {
    fn default() -> Self {
        Self::new()
    }
}

impl InputParser {
    /// Create a parser with default limits.
    pub fn new() -> Self {
        Self::with_limits(InputLimits::default())
    }

    /// Create a parser with explicit limits.
    pub fn with_limits(limits: InputLimits) -> Self {
        Self {
            buf: Vec::new(),
            limits,
            paste: None,
            paste_overflow: false,
        }
    }

    /// Whether undecoded bytes are pending (split escape or UTF-8 tail).
    pub fn has_pending(&self) -> bool {
        !self.buf.is_empty() || self.paste.is_some()
    }

    /// Feed a chunk of bytes, returning the events decoded so far.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Event> {
        self.buf.extend_from_slice(bytes);
        let mut events = Vec::new();
        self.drain(&mut events);
        events
    }

    /// Flush pending bytes that will never complete: an incomplete escape
    /// becomes `Escape` followed by the buffered text codepoints, in order.
    pub fn flush(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        // Paste bodies keep accumulating across polls; only non-paste
        // pending bytes are flushed.
        if self.paste.is_none() {
            let pending = std::mem::take(&mut self.buf);
            flush_as_text(&pending, &mut events);
        }
        events
    }

    fn drain(&mut self, events: &mut Vec<Event>) {
        loop {
            if self.paste.is_some() {
                if !self.drain_paste(events) {
                    return;
                }
                continue;
            }
            if self.buf.is_empty() {
                return;
            }
            match decode_one(&self.buf) {
                Step::Incomplete => {
                    // A pending escape that outgrows the bound falls back to
                    // Escape-then-text rather than wedging the stream.
                    if self.buf[0] == ESC && self.buf.len() > self.limits.max_escape_bytes {
                        let pending = std::mem::take(&mut self.buf);
                        flush_as_text(&pending, events);
                        continue;
                    }
                    return;
                }
                Step::Done { events: mut got, consumed } => {
                    self.buf.drain(..consumed);
                    if got.len() == 1 {
                        if let Some(Event::Paste { bytes }) = got.first() {
                            if bytes.is_empty() {
                                // Paste start marker: enter paste mode.
                                self.paste = Some(Vec::new());
                                self.paste_overflow = false;
                                continue;
                            }
                        }
                    }
                    events.append(&mut got);
                }
                Step::Malformed { consumed, .. } => {
                    // Streaming mode skips undecodable bytes.
                    self.buf.drain(..consumed.max(1));
                }
            }
        }
    }

    /// Accumulate paste bytes until the `ESC [ 201 ~` terminator.
    /// Returns false when more input is needed.
    fn drain_paste(&mut self, events: &mut Vec<Event>) -> bool {
        const END: &[u8] = b"\x1b[201~";
        let (terminator, safe_len) = find_terminator(&self.buf, END);
        let Some(body) = self.paste.as_mut() else {
            return false;
        };

        let take = terminator.unwrap_or(safe_len);
        if take > 0 {
            if !self.paste_overflow {
                if body.len() + take > self.limits.max_paste_bytes {
                    self.paste_overflow = true;
                    body.clear();
                } else {
                    body.extend_from_slice(&self.buf[..take]);
                }
            }
            self.buf.drain(..take);
        }

        match terminator {
            Some(_) => {
                self.buf.drain(..END.len());
                let body = self.paste.take().unwrap_or_default();
                // An oversized paste is dropped whole; the stream continues.
                if !self.paste_overflow {
                    events.push(Event::Paste { bytes: body });
                }
                self.paste_overflow = false;
                true
            }
            None => false,
        }
    }
}

/// Find `needle` in `haystack`; also report how many leading bytes are safe
/// to consume without eating a partial needle prefix at the tail.
fn find_terminator(haystack: &[u8], needle: &[u8]) -> (Option<usize>, usize) {
    if let Some(pos) = haystack
        .windows(needle.len())
        .position(|w| w == needle)
    {
        return (Some(pos), pos);
    }
    // Keep the longest needle prefix that ends the buffer.
    let mut keep = 0;
    for plen in (1..needle.len()).rev() {
        if haystack.len() >= plen && haystack.ends_with(&needle[..plen]) {
            keep = plen;
            break;
        }
    }
    (None, haystack.len() - keep)
}

/// Flush bytes as `Escape` keys and text, preserving order.
fn flush_as_text(bytes: &[u8], events: &mut Vec<Event>) {
    let mut pos = 0;
    while pos < bytes.len() {
        let b = bytes[pos];
        if b == ESC {
            events.push(Event::Key(KeyEvent::plain(KeyCode::Escape)));
            pos += 1;
            continue;
        }
        match decode_utf8(&bytes[pos..]) {
            Some((cp, len)) => {
                if let Some(event) = text_or_control(cp) {
                    events.push(event);
                }
                pos += len;
            }
            None => pos += 1,
        }
    }
}

/// Strict one-shot decoding of a byte batch.
///
/// Unlike the streaming parser, truncated or malformed sequences are
/// reported as errors with their byte offset.
pub fn parse_event_batch(bytes: &[u8]) -> Result<Vec<Event>, EventParseError> {
    let mut events = Vec::new();
    let mut pos = 0;
    let mut paste_start: Option<usize> = None;
    while pos < bytes.len() {
        if let Some(start) = paste_start {
            const END: &[u8] = b"\x1b[201~";
            match bytes[start..].windows(END.len()).position(|w| w == END) {
                Some(rel) => {
                    events.push(Event::Paste {
                        bytes: bytes[start..start + rel].to_vec(),
                    });
                    pos = start + rel + END.len();
                    paste_start = None;
                    continue;
                }
                None => {
                    return Err(EventParseError {
                        code: ParseErrorCode::Truncated,
                        offset: start,
                        detail: "unterminated bracketed paste".into(),
                    });
                }
            }
        }
        match decode_one(&bytes[pos..]) {
            Step::Incomplete => {
                return Err(EventParseError {
                    code: ParseErrorCode::Truncated,
                    offset: pos,
                    detail: "batch ends inside a sequence".into(),
                });
            }
            Step::Done { events: got, consumed } => {
                let is_paste_start =
                    matches!(got.first(), Some(Event::Paste { bytes }) if bytes.is_empty())
                        && got.len() == 1;
                pos += consumed;
                if is_paste_start {
                    paste_start = Some(pos);
                } else {
                    events.extend(got);
                }
            }
            Step::Malformed { detail, .. } => {
                let code = if bytes[pos] == ESC {
                    ParseErrorCode::Malformed
                } else {
                    ParseErrorCode::InvalidUtf8
                };
                return Err(EventParseError {
                    code,
                    offset: pos,
                    detail,
                });
            }
        }
    }
    Ok(events)
}

/// Decode one item from the front of `buf`.
fn decode_one(buf: &[u8]) -> Step {
    let Some(&first) = buf.first() else {
        return Step::Incomplete;
    };
    if first == ESC {
        return decode_escape(buf);
    }
    if first < 0x20 || first == 0x7f {
        let events = control_event(first).into_iter().collect();
        return Step::Done {
            events,
            consumed: 1,
        };
    }
    match decode_utf8(buf) {
        Some((cp, len)) => Step::Done {
            events: text_or_control(cp).into_iter().collect(),
            consumed: len,
        },
        None => {
            if utf8_possibly_incomplete(buf) {
                Step::Incomplete
            } else {
                Step::Malformed {
                    consumed: 1,
                    detail: "invalid UTF-8".into(),
                }
            }
        }
    }
}

fn decode_escape(buf: &[u8]) -> Step {
    match buf.get(1) {
        None => Step::Incomplete,
        Some(b'[') => decode_csi(buf),
        Some(b'O') => decode_ss3(buf),
        Some(&ESC) => {
            // ESC ESC: the first is a bare Escape.
            Step::Done {
                events: vec![Event::Key(KeyEvent::plain(KeyCode::Escape))],
                consumed: 1,
            }
        }
        Some(_) => {
            // Alt-prefixed byte: normalized as Escape then the payload.
            Step::Done {
                events: vec![Event::Key(KeyEvent::plain(KeyCode::Escape))],
                consumed: 1,
            }
        }
    }
}

fn decode_ss3(buf: &[u8]) -> Step {
    let Some(&final_byte) = buf.get(2) else {
        return Step::Incomplete;
    };
    let code = match final_byte {
        b'P' => KeyCode::F(1),
        b'Q' => KeyCode::F(2),
        b'R' => KeyCode::F(3),
        b'S' => KeyCode::F(4),
        b'A' => KeyCode::Up,
        b'B' => KeyCode::Down,
        b'C' => KeyCode::Right,
        b'D' => KeyCode::Left,
        b'H' => KeyCode::Home,
        b'F' => KeyCode::End,
        other => {
            return Step::Malformed {
                consumed: 3,
                detail: format!("unknown SS3 final byte {other:#04x}"),
            };
        }
    };
    Step::Done {
        events: vec![Event::Key(KeyEvent::plain(code))],
        consumed: 3,
    }
}

fn decode_csi(buf: &[u8]) -> Step {
    // ESC [ params… final, final in 0x40..=0x7e.
    let mut end = 2;
    loop {
        let Some(&b) = buf.get(end) else {
            return Step::Incomplete;
        };
        if (0x40..=0x7e).contains(&b) {
            break;
        }
        if !(b'0'..=b'9').contains(&b) && !matches!(b, b';' | b':' | b'<' | b'?' | b'=' | b'>') {
            return Step::Malformed {
                consumed: end + 1,
                detail: format!("unexpected byte {b:#04x} in CSI parameters"),
            };
        }
        end += 1;
    }
    let final_byte = buf[end];
    let params = &buf[2..end];
    let consumed = end + 1;

    let done = |events: Vec<Event>| Step::Done { events, consumed };
    let malformed = |detail: String| Step::Malformed { consumed, detail };

    // SGR mouse: ESC [ < b ; x ; y (M|m)
    if params.first() == Some(&b'<') {
        return match decode_sgr_mouse(&params[1..], final_byte) {
            Ok(event) => done(vec![Event::Mouse(event)]),
            Err(detail) => malformed(detail),
        };
    }

    match final_byte {
        b'A' | b'B' | b'C' | b'D' | b'H' | b'F' => {
            let code = match final_byte {
                b'A' => KeyCode::Up,
                b'B' => KeyCode::Down,
                b'C' => KeyCode::Right,
                b'D' => KeyCode::Left,
                b'H' => KeyCode::Home,
                _ => KeyCode::End,
            };
            let fields = parse_params(params);
            let modifiers = fields
                .get(1)
                .and_then(|f| f.first().copied())
                .map_or(Modifiers::NONE, |m| decode_kitty_mods(m.saturating_sub(1)));
            done(vec![Event::Key(KeyEvent::new(code, modifiers))])
        }
        b'Z' => done(vec![Event::Key(KeyEvent::new(
            KeyCode::Tab,
            Modifiers::SHIFT,
        ))]),
        b'I' => done(vec![Event::Key(KeyEvent::plain(KeyCode::FocusIn))]),
        b'O' => done(vec![Event::Key(KeyEvent::plain(KeyCode::FocusOut))]),
        b'~' => {
            let fields = parse_params(params);
            let Some(&num) = fields.first().and_then(|f| f.first()) else {
                return malformed("tilde sequence without parameter".into());
            };
            let modifiers = fields
                .get(1)
                .and_then(|f| f.first().copied())
                .map_or(Modifiers::NONE, |m| decode_kitty_mods(m.saturating_sub(1)));
            let code = match num {
                1 | 7 => Some(KeyCode::Home),
                2 => Some(KeyCode::Insert),
                3 => Some(KeyCode::Delete),
                4 | 8 => Some(KeyCode::End),
                5 => Some(KeyCode::PageUp),
                6 => Some(KeyCode::PageDown),
                11..=15 => Some(KeyCode::F((num - 10) as u8)),
                17..=21 => Some(KeyCode::F((num - 11) as u8)),
                23 | 24 => Some(KeyCode::F((num - 12) as u8)),
                // Paste start is signalled to the caller as an empty Paste.
                200 => {
                    return done(vec![Event::Paste { bytes: Vec::new() }]);
                }
                // A stray paste terminator decodes to nothing.
                201 => return done(Vec::new()),
                _ => None,
            };
            match code {
                Some(code) => done(vec![Event::Key(KeyEvent::new(code, modifiers))]),
                None => malformed(format!("unknown tilde parameter {num}")),
            }
        }
        b'u' => {
            let fields = parse_params(params);
            let Some(&cp) = fields.first().and_then(|f| f.first()) else {
                return malformed("CSI-u without codepoint".into());
            };
            let Some(ch) = char::from_u32(cp) else {
                return malformed(format!("CSI-u codepoint {cp} out of range"));
            };
            let mods_field = fields.get(1);
            let raw_mods = mods_field
                .and_then(|f| f.first().copied())
                .unwrap_or(1)
                .saturating_sub(1);
            let action = match mods_field.and_then(|f| f.get(1).copied()) {
                Some(3) => KeyAction::Up,
                _ => KeyAction::Down,
            };
            done(csi_u_events(ch, raw_mods, action))
        }
        other => malformed(format!("unknown CSI final byte {other:#04x}")),
    }
}

/// Events for a CSI-u key, honoring the Alt/Meta prefix shapes.
fn csi_u_events(ch: char, raw_mods: u32, action: KeyAction) -> Vec<Event> {
    let alt = raw_mods & 2 != 0;
    let meta = raw_mods & 8 != 0;
    let mut modifiers = Modifiers::NONE;
    if raw_mods & 1 != 0 {
        modifiers = modifiers | Modifiers::SHIFT;
    }
    if raw_mods & 4 != 0 {
        modifiers = modifiers | Modifiers::CTRL;
    }

    let printable = !ch.is_control() && !modifiers.contains(Modifiers::CTRL);

    if (alt || meta) && action == KeyAction::Down {
        // Alt/Meta payloads keep the legacy prefix shape: Escape first,
        // then the payload as text when printable, else as a modified key.
        let held = if alt { Modifiers::ALT } else { Modifiers::META };
        let mut events = vec![Event::Key(KeyEvent::plain(KeyCode::Escape))];
        if printable {
            events.push(Event::Text { codepoint: ch });
        } else {
            events.push(Event::Key(KeyEvent::new(
                key_code_for(ch),
                modifiers | held,
            )));
        }
        return events;
    }

    if alt {
        modifiers = modifiers | Modifiers::ALT;
    }
    if meta {
        modifiers = modifiers | Modifiers::META;
    }

    if modifiers.contains(Modifiers::CTRL) && ch.is_ascii_alphabetic() {
        // Ctrl+letter reports the uppercase letter, with no text event.
        let mut event = KeyEvent::new(KeyCode::Char(ch.to_ascii_uppercase()), modifiers);
        event.action = action;
        return vec![Event::Key(event)];
    }

    if modifiers.is_empty() && action == KeyAction::Down && printable {
        return vec![Event::Text { codepoint: ch }];
    }
    let mut event = KeyEvent::new(key_code_for(ch), modifiers);
    event.action = action;
    vec![Event::Key(event)]
}

fn key_code_for(ch: char) -> KeyCode {
    match ch {
        '\r' | '\n' => KeyCode::Enter,
        '\t' => KeyCode::Tab,
        '\x1b' => KeyCode::Escape,
        '\x7f' | '\x08' => KeyCode::Backspace,
        other => KeyCode::Char(other),
    }
}

fn decode_sgr_mouse(params: &[u8], final_byte: u8) -> Result<MouseEvent, String> {
    if final_byte != b'M' && final_byte != b'm' {
        return Err(format!("bad SGR mouse final byte {final_byte:#04x}"));
    }
    let fields = parse_params(params);
    if fields.len() != 3 {
        return Err(format!("SGR mouse expects 3 parameters, got {}", fields.len()));
    }
    let b = *fields[0].first().unwrap_or(&0);
    let x = *fields[1].first().unwrap_or(&1) as i32;
    let y = *fields[2].first().unwrap_or(&1) as i32;
    if x < 1 || y < 1 {
        return Err("SGR mouse coordinates are one-based".into());
    }

    let mut modifiers = Modifiers::NONE;
    if b & 4 != 0 {
        modifiers = modifiers | Modifiers::SHIFT;
    }
    if b & 8 != 0 {
        modifiers = modifiers | Modifiers::ALT;
    }
    if b & 16 != 0 {
        modifiers = modifiers | Modifiers::CTRL;
    }

    let wheel = b & 64 != 0;
    let motion = b & 32 != 0;
    let button_bits = b & 3;
    let buttons = match button_bits {
        0 => 1,
        1 => 2,
        2 => 4,
        _ => 0,
    } as u8;

    let (kind, wheel_y, buttons) = if wheel {
        let dy = if button_bits & 1 == 0 { -1 } else { 1 };
        (MouseKind::Wheel, dy, 0)
    } else if motion {
        (MouseKind::Move, 0, buttons)
    } else if final_byte == b'm' {
        (MouseKind::Up, 0, buttons)
    } else {
        (MouseKind::Down, 0, buttons)
    };

    Ok(MouseEvent {
        kind,
        x: x - 1,
        y: y - 1,
        buttons,
        wheel_x: 0,
        wheel_y,
        modifiers,
    })
}

/// Split `params` on `;`, each field further split on `:`.
fn parse_params(params: &[u8]) -> Vec<Vec<u32>> {
    if params.is_empty() {
        return Vec::new();
    }
    params
        .split(|&b| b == b';')
        .map(|field| {
            field
                .split(|&b| b == b':')
                .map(|digits| {
                    digits
                        .iter()
                        .fold(0u32, |acc, &d| {
                            acc.saturating_mul(10)
                                .saturating_add(u32::from(d.saturating_sub(b'0')))
                        })
                })
                .collect()
        })
        .collect()
}

fn decode_kitty_mods(bits: u32) -> Modifiers {
    let mut mods = Modifiers::NONE;
    if bits & 1 != 0 {
        mods = mods | Modifiers::SHIFT;
    }
    if bits & 2 != 0 {
        mods = mods | Modifiers::ALT;
    }
    if bits & 4 != 0 {
        mods = mods | Modifiers::CTRL;
    }
    if bits & 8 != 0 {
        mods = mods | Modifiers::META;
    }
    mods
}

fn control_event(byte: u8) -> Option<Event> {
    let event = match byte {
        b'\r' | b'\n' => Event::Key(KeyEvent::plain(KeyCode::Enter)),
        b'\t' => Event::Key(KeyEvent::plain(KeyCode::Tab)),
        0x7f | 0x08 => Event::Key(KeyEvent::plain(KeyCode::Backspace)),
        0x00 => return None,
        // Ctrl+letter: the uppercase letter with CTRL, no text event.
        0x01..=0x1a => Event::Key(KeyEvent::new(
            KeyCode::Char((b'A' + byte - 1) as char),
            Modifiers::CTRL,
        )),
        _ => return None,
    };
    Some(event)
}

fn text_or_control(cp: char) -> Option<Event> {
    if cp.is_control() {
        return match cp {
            '\r' | '\n' => Some(Event::Key(KeyEvent::plain(KeyCode::Enter))),
            '\t' => Some(Event::Key(KeyEvent::plain(KeyCode::Tab))),
            _ => None,
        };
    }
    Some(Event::Text { codepoint: cp })
}

/// Decode one UTF-8 codepoint from the front of `buf`.
fn decode_utf8(buf: &[u8]) -> Option<(char, usize)> {
    let len = utf8_len(*buf.first()?)?;
    let slice = buf.get(..len)?;
    let text = std::str::from_utf8(slice).ok()?;
    let cp = text.chars().next()?;
    Some((cp, len))
}

fn utf8_len(first: u8) -> Option<usize> {
    match first {
        0x00..=0x7f => Some(1),
        0xc0..=0xdf => Some(2),
        0xe0..=0xef => Some(3),
        0xf0..=0xf7 => Some(4),
        _ => None,
    }
}

/// Whether the front of the buffer could be a split multi-byte codepoint.
fn utf8_possibly_incomplete(buf: &[u8]) -> bool {
    let Some(&first) = buf.first() else {
        return false;
    };
    let Some(len) = utf8_len(first) else {
        return false;
    };
    if buf.len() >= len {
        // Full length available but it failed to decode: truly invalid.
        return false;
    }
    // All present continuation bytes must look like continuations.
    buf[1..].iter().all(|&b| (0x80..=0xbf).contains(&b))
}
