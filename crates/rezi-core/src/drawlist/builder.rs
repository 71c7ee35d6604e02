//! The drawlist builder.
//!
//! Commands append to a growing byte buffer; strings intern by value; blobs
//! store pre-aligned byte payloads. Every write first checks the configured
//! caps against the projected total size. On the first failure the builder
//! latches the error: subsequent operations are silent no-ops and `build`
//! returns the latched error. `reset` clears everything and re-enables the
//! builder.

use std::collections::HashMap;

use super::{
    DrawlistError, DrawlistLimits, HEADER_SIZE, MAGIC, PackedStyle, TextRunSegment, VERSION,
    align4, opcode,
};

/// Builds a ZRDL v1 drawlist.
#[derive(Debug)]
pub struct DrawlistBuilder {
    limits: DrawlistLimits,
    cmd: Vec<u8>,
    cmd_count: u32,
    strings: Vec<Vec<u8>>,
    string_index: HashMap<String, u32>,
    string_bytes: u32,
    blobs: Vec<Vec<u8>>,
    blob_bytes: u32,
    clip_depth: u32,
    error: Option<DrawlistError>,
}

impl Default for DrawlistBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DrawlistBuilder {
    /// Create a builder with default limits.
    pub fn new() -> Self {
        Self::with_limits(DrawlistLimits::default())
    }

    /// Create a builder with explicit limits.
    pub fn with_limits(limits: DrawlistLimits) -> Self {
        Self {
            limits,
            cmd: Vec::new(),
            cmd_count: 0,
            strings: Vec::new(),
            string_index: HashMap::new(),
            string_bytes: 0,
            blobs: Vec::new(),
            blob_bytes: 0,
            clip_depth: 0,
            error: None,
        }
    }

    /// The first error, if the builder has failed.
    pub fn error(&self) -> Option<&DrawlistError> {
        self.error.as_ref()
    }

    /// Whether the builder is in the failed state.
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// Number of commands emitted so far.
    pub fn cmd_count(&self) -> u32 {
        self.cmd_count
    }

    /// Number of interned strings.
    pub fn string_count(&self) -> u32 {
        self.strings.len() as u32
    }

    /// Clear all state and re-enable the builder.
    pub fn reset(&mut self) {
        self.cmd.clear();
        self.cmd_count = 0;
        self.strings.clear();
        self.string_index.clear();
        self.string_bytes = 0;
        self.blobs.clear();
        self.blob_bytes = 0;
        self.clip_depth = 0;
        self.error = None;
    }

    fn fail(&mut self, error: DrawlistError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    fn projected_total(&self, extra_cmd: u32, extra_string: u32, extra_blob: u32) -> u32 {
        let cmd_bytes = self.cmd.len() as u32 + extra_cmd;
        let strings = self.strings.len() as u32 + u32::from(extra_string > 0);
        let blobs = self.blobs.len() as u32 + u32::from(extra_blob > 0);
        HEADER_SIZE
            + align4(cmd_bytes)
            + strings * 8
            + align4(self.string_bytes + extra_string)
            + blobs * 8
            + self.blob_bytes
            + extra_blob
    }

    fn check_cmd_caps(&mut self, size: u32) -> bool {
        if self.error.is_some() {
            return false;
        }
        if self.cmd_count >= self.limits.max_cmd_count {
            self.fail(DrawlistError::TooLarge(format!(
                "command count exceeds {}",
                self.limits.max_cmd_count
            )));
            return false;
        }
        if self.projected_total(size, 0, 0) > self.limits.max_total_bytes {
            self.fail(DrawlistError::TooLarge(format!(
                "drawlist exceeds {} bytes",
                self.limits.max_total_bytes
            )));
            return false;
        }
        true
    }

    fn push_cmd_header(&mut self, op: u16, size: u32) {
        self.cmd.extend_from_slice(&op.to_le_bytes());
        self.cmd.extend_from_slice(&0u16.to_le_bytes());
        self.cmd.extend_from_slice(&size.to_le_bytes());
        self.cmd_count += 1;
    }

    fn push_i32(&mut self, v: i32) {
        self.cmd.extend_from_slice(&v.to_le_bytes());
    }

    fn push_u32(&mut self, v: u32) {
        self.cmd.extend_from_slice(&v.to_le_bytes());
    }

    fn push_style(&mut self, style: PackedStyle) {
        self.push_u32(style.fg);
        self.push_u32(style.bg);
        self.push_u32(style.attrs);
        self.push_u32(0);
    }

    /// Intern a string, returning its index.
    fn intern(&mut self, text: &str) -> Option<u32> {
        if let Some(&idx) = self.string_index.get(text) {
            return Some(idx);
        }
        if self.strings.len() as u32 >= self.limits.max_strings {
            self.fail(DrawlistError::TooLarge(format!(
                "string count exceeds {}",
                self.limits.max_strings
            )));
            return None;
        }
        let bytes = text.as_bytes();
        let len = bytes.len() as u32;
        if self.string_bytes + len > self.limits.max_string_bytes {
            self.fail(DrawlistError::TooLarge(format!(
                "string bytes exceed {}",
                self.limits.max_string_bytes
            )));
            return None;
        }
        if self.projected_total(0, len.max(1), 0) > self.limits.max_total_bytes {
            self.fail(DrawlistError::TooLarge(format!(
                "drawlist exceeds {} bytes",
                self.limits.max_total_bytes
            )));
            return None;
        }
        let idx = self.strings.len() as u32;
        self.strings.push(bytes.to_vec());
        self.string_bytes += len;
        self.string_index.insert(text.to_owned(), idx);
        Some(idx)
    }

    /// Emit a Clear command.
    pub fn clear(&mut self) {
        if !self.check_cmd_caps(8) {
            return;
        }
        self.push_cmd_header(opcode::CLEAR, 8);
    }

    /// Clear and fill the whole `width`×`height` surface with a style.
    pub fn clear_to(&mut self, width: i32, height: i32, style: PackedStyle) {
        self.clear();
        self.fill_rect(0, 0, width, height, style);
    }

    /// Emit a FillRect command.
    pub fn fill_rect(&mut self, x: i32, y: i32, w: i32, h: i32, style: PackedStyle) {
        if self.error.is_some() {
            return;
        }
        if w < 0 || h < 0 {
            self.fail(DrawlistError::BadParams(format!(
                "fill_rect: negative extent {w}x{h}"
            )));
            return;
        }
        if !self.check_cmd_caps(40) {
            return;
        }
        self.push_cmd_header(opcode::FILL_RECT, 40);
        self.push_i32(x);
        self.push_i32(y);
        self.push_i32(w);
        self.push_i32(h);
        self.push_style(style);
    }

    /// Emit a DrawText command for an interned string.
    pub fn draw_text(&mut self, x: i32, y: i32, text: &str, style: PackedStyle) {
        if self.error.is_some() {
            return;
        }
        let Some(index) = self.intern(text) else {
            return;
        };
        if !self.check_cmd_caps(48) {
            return;
        }
        let byte_len = text.len() as u32;
        self.push_cmd_header(opcode::DRAW_TEXT, 48);
        self.push_i32(x);
        self.push_i32(y);
        self.push_u32(index);
        self.push_u32(0); // byte offset
        self.push_u32(byte_len);
        self.push_style(style);
        self.push_u32(0); // reserved
    }

    /// Emit a PushClip command.
    pub fn push_clip(&mut self, x: i32, y: i32, w: i32, h: i32) {
        if self.error.is_some() {
            return;
        }
        if w < 0 || h < 0 {
            self.fail(DrawlistError::BadParams(format!(
                "push_clip: negative extent {w}x{h}"
            )));
            return;
        }
        if !self.check_cmd_caps(24) {
            return;
        }
        self.push_cmd_header(opcode::PUSH_CLIP, 24);
        self.push_i32(x);
        self.push_i32(y);
        self.push_i32(w);
        self.push_i32(h);
        self.clip_depth += 1;
    }

    /// Emit a PopClip command.
    pub fn pop_clip(&mut self) {
        if self.error.is_some() {
            return;
        }
        if self.clip_depth == 0 {
            self.fail(DrawlistError::BadParams("pop_clip without push_clip".into()));
            return;
        }
        if !self.check_cmd_caps(8) {
            return;
        }
        self.push_cmd_header(opcode::POP_CLIP, 8);
        self.clip_depth -= 1;
    }

    /// Add a raw blob. The payload is padded to 4-byte alignment.
    /// Returns the blob index, or `None` after a failure.
    pub fn add_blob(&mut self, bytes: &[u8]) -> Option<u32> {
        if self.error.is_some() {
            return None;
        }
        if self.blobs.len() as u32 >= self.limits.max_blobs {
            self.fail(DrawlistError::TooLarge(format!(
                "blob count exceeds {}",
                self.limits.max_blobs
            )));
            return None;
        }
        let padded = align4(bytes.len() as u32);
        if self.blob_bytes + padded > self.limits.max_blob_bytes {
            self.fail(DrawlistError::TooLarge(format!(
                "blob bytes exceed {}",
                self.limits.max_blob_bytes
            )));
            return None;
        }
        if self.projected_total(0, 0, padded) > self.limits.max_total_bytes {
            self.fail(DrawlistError::TooLarge(format!(
                "drawlist exceeds {} bytes",
                self.limits.max_total_bytes
            )));
            return None;
        }
        let mut stored = bytes.to_vec();
        stored.resize(padded as usize, 0);
        let idx = self.blobs.len() as u32;
        self.blobs.push(stored);
        self.blob_bytes += padded;
        Some(idx)
    }

    /// Build and add a text-run blob from styled segments.
    /// Returns the blob index, or `None` after a failure.
    pub fn add_text_run_blob(&mut self, segments: &[(PackedStyle, &str)]) -> Option<u32> {
        if self.error.is_some() {
            return None;
        }
        if segments.is_empty() {
            self.fail(DrawlistError::BadParams(
                "text run needs at least one segment".into(),
            ));
            return None;
        }
        let mut records: Vec<TextRunSegment> = Vec::with_capacity(segments.len());
        for (style, text) in segments {
            let index = self.intern(text)?;
            records.push(TextRunSegment {
                style: *style,
                string_index: index,
                byte_off: 0,
                byte_len: text.len() as u32,
            });
        }
        let mut blob = Vec::with_capacity(4 + records.len() * 28);
        blob.extend_from_slice(&(records.len() as u32).to_le_bytes());
        for seg in &records {
            blob.extend_from_slice(&seg.style.fg.to_le_bytes());
            blob.extend_from_slice(&seg.style.bg.to_le_bytes());
            blob.extend_from_slice(&seg.style.attrs.to_le_bytes());
            blob.extend_from_slice(&0u32.to_le_bytes());
            blob.extend_from_slice(&seg.string_index.to_le_bytes());
            blob.extend_from_slice(&seg.byte_off.to_le_bytes());
            blob.extend_from_slice(&seg.byte_len.to_le_bytes());
        }
        self.add_blob(&blob)
    }

    /// Emit a DrawTextRun command referencing a blob.
    pub fn draw_text_run(&mut self, x: i32, y: i32, blob_index: u32) {
        if self.error.is_some() {
            return;
        }
        if blob_index as usize >= self.blobs.len() {
            self.fail(DrawlistError::BadParams(format!(
                "draw_text_run: blob index {blob_index} out of range"
            )));
            return;
        }
        if !self.check_cmd_caps(24) {
            return;
        }
        self.push_cmd_header(opcode::DRAW_TEXT_RUN, 24);
        self.push_i32(x);
        self.push_i32(y);
        self.push_u32(blob_index);
        self.push_u32(0); // reserved
    }

    /// Assemble the final byte buffer.
    ///
    /// Fails with the latched error if any operation failed since the last
    /// `reset`.
    pub fn build(&self) -> Result<Vec<u8>, DrawlistError> {
        if let Some(error) = &self.error {
            return Err(error.clone());
        }

        let cmd_bytes = align4(self.cmd.len() as u32);
        debug_assert_eq!(cmd_bytes as usize, self.cmd.len());

        let cmd_offset = if self.cmd_count > 0 { HEADER_SIZE } else { 0 };
        let strings_count = self.strings.len() as u32;
        let strings_span_offset = if strings_count > 0 {
            HEADER_SIZE + cmd_bytes
        } else {
            0
        };
        let strings_bytes_len = align4(self.string_bytes);
        let strings_bytes_offset = if strings_count > 0 {
            strings_span_offset + strings_count * 8
        } else {
            0
        };
        let blobs_count = self.blobs.len() as u32;
        let after_strings = HEADER_SIZE + cmd_bytes + strings_count * 8 + strings_bytes_len;
        let blobs_span_offset = if blobs_count > 0 { after_strings } else { 0 };
        let blobs_bytes_len = self.blob_bytes;
        let blobs_bytes_offset = if blobs_count > 0 {
            after_strings + blobs_count * 8
        } else {
            0
        };
        let total_size = after_strings + blobs_count * 8 + blobs_bytes_len;

        if total_size > self.limits.max_total_bytes {
            return Err(DrawlistError::TooLarge(format!(
                "drawlist exceeds {} bytes",
                self.limits.max_total_bytes
            )));
        }

        let mut out = Vec::with_capacity(total_size as usize);
        let mut header = [0u8; HEADER_SIZE as usize];
        let fields: [(usize, u32); 16] = [
            (0, MAGIC),
            (4, VERSION),
            (8, HEADER_SIZE),
            (12, total_size),
            (16, cmd_offset),
            (20, cmd_bytes),
            (24, self.cmd_count),
            (28, strings_span_offset),
            (32, strings_count),
            (36, strings_bytes_offset),
            (40, strings_bytes_len),
            (44, blobs_span_offset),
            (48, blobs_count),
            (52, blobs_bytes_offset),
            (56, blobs_bytes_len),
            (60, 0),
        ];
        for (offset, value) in fields {
            header[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
        }
        out.extend_from_slice(&header);
        out.extend_from_slice(&self.cmd);

        if strings_count > 0 {
            let mut run = 0u32;
            for s in &self.strings {
                out.extend_from_slice(&run.to_le_bytes());
                out.extend_from_slice(&(s.len() as u32).to_le_bytes());
                run += s.len() as u32;
            }
            for s in &self.strings {
                out.extend_from_slice(s);
            }
            // Pad the concatenated bytes to alignment.
            for _ in self.string_bytes..strings_bytes_len {
                out.push(0);
            }
        }

        if blobs_count > 0 {
            let mut run = 0u32;
            for b in &self.blobs {
                out.extend_from_slice(&run.to_le_bytes());
                out.extend_from_slice(&(b.len() as u32).to_le_bytes());
                run += b.len() as u32;
            }
            for b in &self.blobs {
                out.extend_from_slice(b);
            }
        }

        if out.len() != total_size as usize {
            return Err(DrawlistError::Internal(format!(
                "assembled {} bytes, expected {total_size}",
                out.len()
            )));
        }
        Ok(out)
    }
}
