//! `.MsgText` compiler: parses the `CTRL=`/`MESSAGES=`/`ERRORS=`/`COMMON=`
//! source grammar and emits the binary message catalogue plus the two
//! generated C++ id headers.

use std::path::Path;

use byteorder::{WriteBytesExt, LE};

use crate::error::{BuildError, Result};
use crate::linespool::{EmptyMacroContext, LineSpooler};

/// Disjoint numeric ranges each message category must fall within.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgCategory {
    Common,
    Err,
    Msg,
}

impl MsgCategory {
    fn range(self) -> std::ops::RangeInclusive<u32> {
        match self {
            MsgCategory::Common => 1..=999,
            MsgCategory::Err => 1_000..=8_999,
            MsgCategory::Msg => 9_000..=u32::MAX,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MsgEntry {
    pub name: String,
    pub id: u32,
    pub text: String,
    pub category: MsgCategory,
}

#[derive(Debug, Default)]
pub struct MsgTextSource {
    pub err_prefix: String,
    pub msg_prefix: String,
    pub entries: Vec<MsgEntry>,
}

/// Parses a whole `.MsgText` file.
pub fn parse_msgtext(path: &Path) -> Result<MsgTextSource> {
    let mut spooler = LineSpooler::open(path, true)?;
    spooler.disable_macros();
    let ctx = EmptyMacroContext;
    let mut source = MsgTextSource::default();

    while let Some(line) = spooler.read_line(&ctx)? {
        if line.eq_ignore_ascii_case("CTRL=") {
            parse_ctrl(&mut spooler, &mut source)?;
        } else if let Some(category) = block_category(&line) {
            let terminator = match category {
                MsgCategory::Common => "END COMMON",
                MsgCategory::Err => "END ERRORS",
                MsgCategory::Msg => "END MESSAGES",
            };
            parse_entries(&mut spooler, category, terminator, &mut source, path)?;
        } else {
            return Err(BuildError::FileFormat {
                path: path.to_path_buf(),
                line: spooler.current_line_number(),
                message: format!("unexpected top-level line '{line}'"),
            });
        }
    }
    Ok(source)
}

fn block_category(line: &str) -> Option<MsgCategory> {
    if line.eq_ignore_ascii_case("MESSAGES=") {
        Some(MsgCategory::Msg)
    } else if line.eq_ignore_ascii_case("ERRORS=") {
        Some(MsgCategory::Err)
    } else if line.eq_ignore_ascii_case("COMMON=") {
        Some(MsgCategory::Common)
    } else {
        None
    }
}

fn parse_ctrl(spooler: &mut LineSpooler, source: &mut MsgTextSource) -> Result<()> {
    let ctx = EmptyMacroContext;
    while let Some(line) = spooler.read_line(&ctx)? {
        if line.eq_ignore_ascii_case("END CTRL") {
            return Ok(());
        }
        if let Some(v) = line.strip_prefix("ErrPref=") {
            source.err_prefix = v.trim().to_string();
        } else if let Some(v) = line.strip_prefix("MsgPref=") {
            source.msg_prefix = v.trim().to_string();
        }
    }
    Err(BuildError::UnexpectedEof {
        path: std::path::PathBuf::new(),
    })
}

fn parse_entries(
    spooler: &mut LineSpooler,
    category: MsgCategory,
    terminator: &str,
    source: &mut MsgTextSource,
    path: &Path,
) -> Result<()> {
    let ctx = EmptyMacroContext;
    let mut pending: Option<(String, u32, String)> = None;

    loop {
        let Some(raw) = spooler.read_line(&ctx)? else {
            return Err(BuildError::UnexpectedEof { path: path.to_path_buf() });
        };

        if pending.is_none() && raw.eq_ignore_ascii_case(terminator) {
            return Ok(());
        }

        let continuation = raw.ends_with('\\');
        let body = raw.strip_suffix('\\').unwrap_or(&raw);

        if let Some((name, id, mut text)) = pending.take() {
            text.push_str(&unescape(body));
            if continuation {
                pending = Some((name, id, text));
                continue;
            }
            push_entry(source, category, name, id, text, path, spooler)?;
            continue;
        }

        let mut parts = body.splitn(3, char::is_whitespace);
        let name = parts.next().unwrap_or("").to_string();
        let rest = parts.next().unwrap_or("");
        let id: u32 = rest.trim().parse().map_err(|_| BuildError::FileFormat {
            path: path.to_path_buf(),
            line: spooler.current_line_number(),
            message: format!("expected numeric id for '{name}'"),
        })?;
        let text_part = body
            .trim_start()
            .splitn(3, char::is_whitespace)
            .nth(2)
            .unwrap_or("")
            .to_string();
        let text_part = strip_quotes(&text_part);

        if continuation {
            pending = Some((name, id, unescape(&text_part)));
            continue;
        }
        push_entry(source, category, name, id, unescape(&text_part), path, spooler)?;
    }
}

fn push_entry(
    source: &mut MsgTextSource,
    category: MsgCategory,
    name: String,
    id: u32,
    text: String,
    path: &Path,
    spooler: &LineSpooler,
) -> Result<()> {
    if !category.range().contains(&id) {
        return Err(BuildError::IndexError(format!(
            "{}: id {id} for '{name}' is outside the {category:?} range ({}..={})",
            path.display(),
            category.range().start(),
            category.range().end()
        )));
    }
    let _ = spooler;
    source.entries.push(MsgEntry { name, id, text, category });
    Ok(())
}

fn strip_quotes(text: &str) -> String {
    let trimmed = text.trim_end();
    if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        trimmed[1..trimmed.len() - 1].to_string()
    } else {
        trimmed.to_string()
    }
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('r') => out.push('\r'),
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('\\') => out.push('\\'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Writes the little-endian binary message catalogue: record count, then
/// one `{id, textOffsetBytes, textCharsIncludingNul}` record per entry, then
/// the concatenated NUL-terminated wide-character text.
pub fn write_catalogue(out_path: &Path, entries: &[MsgEntry]) -> Result<()> {
    let mut buf = Vec::new();
    buf.write_u32::<LE>(entries.len() as u32).unwrap();

    let mut text_blob: Vec<u16> = Vec::new();
    let mut offsets = Vec::with_capacity(entries.len());
    for entry in entries {
        let start = (text_blob.len() * 2) as u32;
        let mut units: Vec<u16> = entry.text.encode_utf16().collect();
        units.push(0);
        offsets.push((start, units.len() as u16));
        text_blob.extend_from_slice(&units);
    }

    for (entry, (offset, char_count)) in entries.iter().zip(offsets.iter()) {
        buf.write_u32::<LE>(entry.id).unwrap();
        buf.write_u32::<LE>(*offset).unwrap();
        buf.write_u16::<LE>(*char_count).unwrap();
    }
    for unit in &text_blob {
        buf.write_u16::<LE>(*unit).unwrap();
    }

    std::fs::write(out_path, &buf).map_err(|source| BuildError::CreateError {
        path: out_path.to_path_buf(),
        source,
    })
}

/// Reads a catalogue back, mainly for round-trip tests.
pub fn read_catalogue(bytes: &[u8]) -> Vec<(u32, String)> {
    use byteorder::ReadBytesExt;
    let mut cursor = std::io::Cursor::new(bytes);
    let count = cursor.read_u32::<LE>().unwrap();
    let mut records = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let id = cursor.read_u32::<LE>().unwrap();
        let offset = cursor.read_u32::<LE>().unwrap();
        let chars = cursor.read_u16::<LE>().unwrap();
        records.push((id, offset, chars));
    }
    let text_start = cursor.position() as usize;
    let mut out = Vec::with_capacity(records.len());
    for (id, offset, chars) in records {
        let start = text_start + offset as usize;
        let units: Vec<u16> = bytes[start..start + (chars as usize * 2)]
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        let text: String = String::from_utf16_lossy(&units[..units.len().saturating_sub(1)]);
        out.push((id, text));
    }
    out
}

/// Emits `namespace prefix { const tCIDLib::TMsgId name = id; ... }` headers
/// for one category, writing to a temp file and atomically replacing the
/// target only if content changed.
pub fn write_id_header(out_path: &Path, namespace: &str, entries: &[&MsgEntry]) -> Result<()> {
    let mut content = String::new();
    content.push_str("// Generated. Do not edit.\n#pragma once\n\n");
    content.push_str(&format!("namespace {namespace}\n{{\n"));
    for entry in entries {
        content.push_str(&format!(
            "    const tCIDLib::TMsgId {} = {};\n",
            entry.name, entry.id
        ));
    }
    content.push_str("}\n");

    crate::util::replace_if_changed(out_path, content.as_bytes()).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn scenario_c_message_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.MsgText");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "CTRL=").unwrap();
        writeln!(f, "ErrPref=errFoo").unwrap();
        writeln!(f, "MsgPref=msgFoo").unwrap();
        writeln!(f, "END CTRL").unwrap();
        writeln!(f, "MESSAGES=").unwrap();
        writeln!(f, "midGreet 17000 Hello, world\\n").unwrap();
        writeln!(f, "END MESSAGES").unwrap();
        drop(f);

        let source = parse_msgtext(&path).unwrap();
        assert_eq!(source.entries.len(), 1);
        assert_eq!(source.entries[0].id, 17000);
        assert_eq!(source.entries[0].text, "Hello, world\n");

        let out = dir.path().join("test.CatMsgs");
        write_catalogue(&out, &source.entries).unwrap();
        let bytes = std::fs::read(&out).unwrap();
        let records = read_catalogue(&bytes);
        assert_eq!(records, vec![(17000, "Hello, world\n".to_string())]);
    }

    #[test]
    fn id_outside_category_range_is_index_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.MsgText");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "CTRL=").unwrap();
        writeln!(f, "END CTRL").unwrap();
        writeln!(f, "MESSAGES=").unwrap();
        writeln!(f, "bogus 500 not a msg id").unwrap();
        writeln!(f, "END MESSAGES").unwrap();
        drop(f);

        let err = parse_msgtext(&path).unwrap_err();
        assert!(matches!(err, BuildError::IndexError(_)));
    }

    #[test]
    fn continuation_lines_are_joined() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.MsgText");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "CTRL=").unwrap();
        writeln!(f, "END CTRL").unwrap();
        writeln!(f, "MESSAGES=").unwrap();
        writeln!(f, "midLong 9001 part one \\").unwrap();
        writeln!(f, "part two").unwrap();
        writeln!(f, "END MESSAGES").unwrap();
        drop(f);

        let source = parse_msgtext(&path).unwrap();
        assert_eq!(source.entries[0].text, "part one part two");
    }
}
