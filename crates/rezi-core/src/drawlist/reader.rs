//! Strict drawlist parsing.
//!
//! Re-parses a built drawlist into commands, strings, and blobs, validating
//! the header, alignment, table bounds, and UTF-8 along the way. Used by
//! round-trip tests and by tooling that inspects cached frames.

use super::{
    CMD_HEADER_SIZE, DrawCommand, DrawlistError, HEADER_SIZE, MAGIC, PackedStyle, TextRunSegment,
    VERSION, command_size, opcode,
};

/// A decoded drawlist.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Drawlist {
    /// Commands in stream order.
    pub commands: Vec<DrawCommand>,
    /// Interned strings.
    pub strings: Vec<String>,
    /// Blob payloads (still padded to alignment).
    pub blobs: Vec<Vec<u8>>,
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn at(bytes: &'a [u8], pos: usize) -> Self {
        Self { bytes, pos }
    }

    fn u16(&mut self) -> Result<u16, DrawlistError> {
        let s = self
            .bytes
            .get(self.pos..self.pos + 2)
            .ok_or_else(|| DrawlistError::Format("truncated u16".into()))?;
        self.pos += 2;
        Ok(u16::from_le_bytes([s[0], s[1]]))
    }

    fn u32(&mut self) -> Result<u32, DrawlistError> {
        let s = self
            .bytes
            .get(self.pos..self.pos + 4)
            .ok_or_else(|| DrawlistError::Format("truncated u32".into()))?;
        self.pos += 4;
        Ok(u32::from_le_bytes([s[0], s[1], s[2], s[3]]))
    }

    fn i32(&mut self) -> Result<i32, DrawlistError> {
        Ok(self.u32()? as i32)
    }

    fn style(&mut self) -> Result<PackedStyle, DrawlistError> {
        let fg = self.u32()?;
        let bg = self.u32()?;
        let attrs = self.u32()?;
        let _reserved = self.u32()?;
        Ok(PackedStyle { fg, bg, attrs })
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> Result<u32, DrawlistError> {
    bytes
        .get(offset..offset + 4)
        .map(|s| u32::from_le_bytes([s[0], s[1], s[2], s[3]]))
        .ok_or_else(|| DrawlistError::Format(format!("header truncated at {offset}")))
}

/// Parse and validate a ZRDL v1 drawlist.
pub fn parse_drawlist(bytes: &[u8]) -> Result<Drawlist, DrawlistError> {
    if bytes.len() < HEADER_SIZE as usize {
        return Err(DrawlistError::Format(format!(
            "{} bytes is smaller than the {HEADER_SIZE}-byte header",
            bytes.len()
        )));
    }
    let magic = read_u32(bytes, 0)?;
    if magic != MAGIC {
        return Err(DrawlistError::Format(format!("bad magic {magic:#010x}")));
    }
    let version = read_u32(bytes, 4)?;
    if version != VERSION {
        return Err(DrawlistError::Format(format!("unsupported version {version}")));
    }
    let header_size = read_u32(bytes, 8)?;
    if header_size != HEADER_SIZE {
        return Err(DrawlistError::Format(format!("bad header size {header_size}")));
    }
    let total_size = read_u32(bytes, 12)?;
    if total_size as usize != bytes.len() {
        return Err(DrawlistError::Format(format!(
            "total size {total_size} does not match buffer length {}",
            bytes.len()
        )));
    }
    if total_size % 4 != 0 {
        return Err(DrawlistError::Format("total size not 4-byte aligned".into()));
    }
    let cmd_offset = read_u32(bytes, 16)?;
    let cmd_bytes = read_u32(bytes, 20)?;
    let cmd_count = read_u32(bytes, 24)?;
    let strings_span_offset = read_u32(bytes, 28)?;
    let strings_count = read_u32(bytes, 32)?;
    let strings_bytes_offset = read_u32(bytes, 36)?;
    let strings_bytes_len = read_u32(bytes, 40)?;
    let blobs_span_offset = read_u32(bytes, 44)?;
    let blobs_count = read_u32(bytes, 48)?;
    let blobs_bytes_offset = read_u32(bytes, 52)?;
    let blobs_bytes_len = read_u32(bytes, 56)?;
    let reserved = read_u32(bytes, 60)?;
    if reserved != 0 {
        return Err(DrawlistError::Format("reserved0 must be zero".into()));
    }

    if cmd_count > 0 && cmd_offset != HEADER_SIZE {
        return Err(DrawlistError::Format(format!("bad cmd offset {cmd_offset}")));
    }
    if cmd_count == 0 && cmd_offset != 0 {
        return Err(DrawlistError::Format(
            "cmd offset must be zero when empty".into(),
        ));
    }
    if cmd_offset % 4 != 0 || cmd_bytes % 4 != 0 {
        return Err(DrawlistError::Format("command stream not aligned".into()));
    }
    check_range(bytes, cmd_offset, u64::from(cmd_bytes), "command stream")?;
    check_range(bytes, strings_span_offset, u64::from(strings_count) * 8, "string spans")?;
    check_range(bytes, strings_bytes_offset, u64::from(strings_bytes_len), "string bytes")?;
    check_range(bytes, blobs_span_offset, u64::from(blobs_count) * 8, "blob spans")?;
    check_range(bytes, blobs_bytes_offset, u64::from(blobs_bytes_len), "blob bytes")?;
    if strings_bytes_len % 4 != 0 {
        return Err(DrawlistError::Format("string bytes not aligned".into()));
    }
    if blobs_bytes_len % 4 != 0 {
        return Err(DrawlistError::Format("blob bytes not aligned".into()));
    }

    // Strings table.
    let strings = read_spans(
        bytes,
        strings_span_offset,
        strings_count,
        strings_bytes_offset,
        strings_bytes_len,
        "string",
    )?
    .into_iter()
    .map(|raw| {
        String::from_utf8(raw).map_err(|_| DrawlistError::Format("string is not UTF-8".into()))
    })
    .collect::<Result<Vec<_>, _>>()?;

    // Blobs table.
    let blobs = read_spans(
        bytes,
        blobs_span_offset,
        blobs_count,
        blobs_bytes_offset,
        blobs_bytes_len,
        "blob",
    )?;
    for blob in &blobs {
        if blob.len() % 4 != 0 {
            return Err(DrawlistError::Format("blob length not aligned".into()));
        }
    }

    // Command stream.
    let mut commands = Vec::with_capacity(cmd_count as usize);
    let mut cursor = Cursor::at(bytes, cmd_offset as usize);
    let cmd_end = (cmd_offset + cmd_bytes) as usize;
    for _ in 0..cmd_count {
        if cursor.pos + CMD_HEADER_SIZE as usize > cmd_end {
            return Err(DrawlistError::Format("command stream truncated".into()));
        }
        let op = cursor.u16()?;
        let flags = cursor.u16()?;
        let size = cursor.u32()?;
        if flags != 0 {
            return Err(DrawlistError::Format(format!("nonzero flags {flags:#x}")));
        }
        let expected = command_size(op)
            .ok_or_else(|| DrawlistError::Format(format!("unknown opcode {op}")))?;
        if size != expected {
            return Err(DrawlistError::Format(format!(
                "opcode {op} declares size {size}, expected {expected}"
            )));
        }
        let payload_end = cursor.pos - CMD_HEADER_SIZE as usize + size as usize;
        if payload_end > cmd_end {
            return Err(DrawlistError::Format("command overruns stream".into()));
        }
        let command = match op {
            opcode::CLEAR => DrawCommand::Clear,
            opcode::POP_CLIP => DrawCommand::PopClip,
            opcode::FILL_RECT => {
                let x = cursor.i32()?;
                let y = cursor.i32()?;
                let w = cursor.i32()?;
                let h = cursor.i32()?;
                let style = cursor.style()?;
                DrawCommand::FillRect { x, y, w, h, style }
            }
            opcode::DRAW_TEXT => {
                let x = cursor.i32()?;
                let y = cursor.i32()?;
                let string_index = cursor.u32()?;
                let byte_off = cursor.u32()?;
                let byte_len = cursor.u32()?;
                let style = cursor.style()?;
                let _reserved = cursor.u32()?;
                let text = strings.get(string_index as usize).ok_or_else(|| {
                    DrawlistError::Format(format!("string index {string_index} out of range"))
                })?;
                if u64::from(byte_off) + u64::from(byte_len) > text.len() as u64 {
                    return Err(DrawlistError::Format("text span out of range".into()));
                }
                DrawCommand::DrawText {
                    x,
                    y,
                    string_index,
                    byte_off,
                    byte_len,
                    style,
                }
            }
            opcode::PUSH_CLIP => {
                let x = cursor.i32()?;
                let y = cursor.i32()?;
                let w = cursor.i32()?;
                let h = cursor.i32()?;
                DrawCommand::PushClip { x, y, w, h }
            }
            opcode::DRAW_TEXT_RUN => {
                let x = cursor.i32()?;
                let y = cursor.i32()?;
                let blob_index = cursor.u32()?;
                let _reserved = cursor.u32()?;
                if blob_index as usize >= blobs.len() {
                    return Err(DrawlistError::Format(format!(
                        "blob index {blob_index} out of range"
                    )));
                }
                DrawCommand::DrawTextRun { x, y, blob_index }
            }
            _ => unreachable!("validated above"),
        };
        cursor.pos = payload_end;
        commands.push(command);
    }
    if cursor.pos != cmd_end {
        return Err(DrawlistError::Format("trailing bytes in command stream".into()));
    }

    Ok(Drawlist {
        commands,
        strings,
        blobs,
    })
}

/// Parse a text-run blob into segments.
pub fn parse_text_run(blob: &[u8]) -> Result<Vec<TextRunSegment>, DrawlistError> {
    let mut cursor = Cursor::at(blob, 0);
    let count = cursor.u32()? as usize;
    let needed = 4 + count * 28;
    if blob.len() < needed {
        return Err(DrawlistError::Format(format!(
            "text run declares {count} segments but blob is {} bytes",
            blob.len()
        )));
    }
    let mut segments = Vec::with_capacity(count);
    for _ in 0..count {
        let style = cursor.style()?;
        let string_index = cursor.u32()?;
        let byte_off = cursor.u32()?;
        let byte_len = cursor.u32()?;
        segments.push(TextRunSegment {
            style,
            string_index,
            byte_off,
            byte_len,
        });
    }
    Ok(segments)
}

fn check_range(bytes: &[u8], offset: u32, len: u64, what: &str) -> Result<(), DrawlistError> {
    if len == 0 {
        return Ok(());
    }
    let end = u64::from(offset) + len;
    if offset < HEADER_SIZE || end > bytes.len() as u64 {
        return Err(DrawlistError::Format(format!("{what} out of range")));
    }
    Ok(())
}

fn read_spans(
    bytes: &[u8],
    span_offset: u32,
    count: u32,
    bytes_offset: u32,
    bytes_len: u32,
    what: &str,
) -> Result<Vec<Vec<u8>>, DrawlistError> {
    let mut out = Vec::with_capacity(count as usize);
    let mut cursor = Cursor::at(bytes, span_offset as usize);
    for i in 0..count {
        let offset = cursor.u32()?;
        let len = cursor.u32()?;
        let end = offset as u64 + len as u64;
        if end > bytes_len as u64 {
            return Err(DrawlistError::Format(format!(
                "{what} span {i} out of range"
            )));
        }
        let start = (bytes_offset + offset) as usize;
        let data = bytes
            .get(start..start + len as usize)
            .ok_or_else(|| DrawlistError::Format(format!("{what} span {i} out of range")))?;
        out.push(data.to_vec());
    }
    Ok(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::drawlist::{DrawlistBuilder, pack_rgb};

    #[test]
    fn round_trip_recovers_commands() {
        let mut builder = DrawlistBuilder::new();
        builder.clear();
        builder.fill_rect(0, 0, 4, 2, PackedStyle::fg(pack_rgb(255, 0, 0)));
        builder.draw_text(1, 1, "hi", PackedStyle::default());
        let bytes = builder.build().unwrap();

        let parsed = parse_drawlist(&bytes).unwrap();
        assert_eq!(parsed.commands.len(), 3);
        assert_eq!(parsed.commands[0], DrawCommand::Clear);
        assert_eq!(
            parsed.commands[1],
            DrawCommand::FillRect {
                x: 0,
                y: 0,
                w: 4,
                h: 2,
                style: PackedStyle::fg(0x00ff_0000),
            }
        );
        assert_eq!(parsed.strings, vec!["hi".to_owned()]);
    }

    #[test]
    fn reparse_is_stable() {
        let mut builder = DrawlistBuilder::new();
        builder.push_clip(1, 1, 10, 5);
        builder.draw_text(2, 2, "nested", PackedStyle::default());
        builder.pop_clip();
        let bytes = builder.build().unwrap();
        let first = parse_drawlist(&bytes).unwrap();
        let second = parse_drawlist(&bytes).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn text_run_round_trip() {
        let mut builder = DrawlistBuilder::new();
        let red = PackedStyle::fg(pack_rgb(255, 0, 0));
        let idx = builder
            .add_text_run_blob(&[(red, "ab"), (PackedStyle::default(), "cd")])
            .unwrap();
        builder.draw_text_run(3, 4, idx);
        let bytes = builder.build().unwrap();

        let parsed = parse_drawlist(&bytes).unwrap();
        assert_eq!(
            parsed.commands,
            vec![DrawCommand::DrawTextRun {
                x: 3,
                y: 4,
                blob_index: 0
            }]
        );
        let segments = parse_text_run(&parsed.blobs[0]).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].style, red);
        assert_eq!(segments[0].byte_len, 2);
        assert_eq!(
            parsed.strings[segments[1].string_index as usize],
            "cd".to_owned()
        );
    }

    #[test]
    fn bad_magic_rejected() {
        let mut builder = DrawlistBuilder::new();
        builder.clear();
        let mut bytes = builder.build().unwrap();
        bytes[0] = b'X';
        assert!(matches!(
            parse_drawlist(&bytes),
            Err(DrawlistError::Format(_))
        ));
    }

    #[test]
    fn wrong_version_rejected() {
        let mut builder = DrawlistBuilder::new();
        builder.clear();
        let mut bytes = builder.build().unwrap();
        bytes[4] = 2;
        assert!(matches!(
            parse_drawlist(&bytes),
            Err(DrawlistError::Format(_))
        ));
    }

    #[test]
    fn truncated_buffer_rejected() {
        let mut builder = DrawlistBuilder::new();
        builder.clear();
        let bytes = builder.build().unwrap();
        assert!(parse_drawlist(&bytes[..bytes.len() - 4]).is_err());
    }

    #[test]
    fn unknown_opcode_rejected() {
        let mut builder = DrawlistBuilder::new();
        builder.clear();
        let mut bytes = builder.build().unwrap();
        bytes[64] = 99; // overwrite the opcode of the first command
        assert!(matches!(
            parse_drawlist(&bytes),
            Err(DrawlistError::Format(_))
        ));
    }

    #[test]
    fn header_offsets_are_aligned() {
        let mut builder = DrawlistBuilder::new();
        builder.draw_text(0, 0, "abc", PackedStyle::default());
        let bytes = builder.build().unwrap();
        for field in [12usize, 16, 20, 28, 36, 40, 44, 52, 56] {
            let v = u32::from_le_bytes(bytes[field..field + 4].try_into().unwrap());
            assert_eq!(v % 4, 0, "field at {field} is unaligned: {v}");
        }
    }
}
