//! Line-oriented file reader with encoding detection, CR/LF normalisation,
//! comment/whitespace stripping, and `$(NAME)` macro expansion.

use std::path::{Path, PathBuf};

use crate::error::{BuildError, Result};

/// Hard cap on expansion fixpoint passes; hitting it means runaway recursion.
const MAX_EXPANSION_PASSES: u32 = 64;

/// Supplies the macro values a spooler substitutes into `$(NAME)` references.
///
/// Resolution order: implicit macros, then the ALLPROJECTS macro list
/// (last-definition-wins), then the process environment.
pub trait MacroContext {
    fn implicit(&self, name: &str) -> Option<String>;
    fn project_macro(&self, name: &str) -> Option<String>;
}

/// A context with no macros beyond environment variables; useful for callers
/// that only need plain line reading (the file-dependency analyser disables
/// expansion entirely and never needs one).
pub struct EmptyMacroContext;

impl MacroContext for EmptyMacroContext {
    fn implicit(&self, _name: &str) -> Option<String> {
        None
    }
    fn project_macro(&self, _name: &str) -> Option<String> {
        None
    }
}

pub struct LineSpooler {
    path: PathBuf,
    lines: Vec<String>,
    cursor: usize,
    strip_whitespace: bool,
    expand_macros: bool,
}

impl LineSpooler {
    pub fn open(path: impl AsRef<Path>, strip_whitespace: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let bytes = std::fs::read(&path).map_err(|source| BuildError::OpenError {
            path: path.clone(),
            source,
        })?;
        let text = decode(&bytes);
        let lines = split_normalized(&text);
        Ok(Self {
            path,
            lines,
            cursor: 0,
            strip_whitespace,
            expand_macros: true,
        })
    }

    /// Disables macro expansion for all subsequent reads; used by the
    /// file-dependency analyser, which spoofs preprocessor directives that
    /// must not be touched.
    pub fn disable_macros(&mut self) {
        self.expand_macros = false;
    }

    pub fn current_line_number(&self) -> u32 {
        self.cursor as u32
    }

    pub fn at_eof(&self) -> bool {
        self.cursor >= self.lines.len()
    }

    /// Reads the next line, returning `None` at end of file. Honours
    /// whitespace-stripping/comment-skipping and macro expansion per the
    /// spooler's configuration.
    pub fn read_line(&mut self, ctx: &dyn MacroContext) -> Result<Option<String>> {
        loop {
            if self.cursor >= self.lines.len() {
                return Ok(None);
            }
            let raw = self.lines[self.cursor].clone();
            self.cursor += 1;

            let line = if self.strip_whitespace {
                let trimmed = raw.trim().to_string();
                if trimmed.is_empty() || trimmed.starts_with(';') {
                    continue;
                }
                trimmed
            } else {
                raw
            };

            if self.expand_macros {
                return Ok(Some(self.expand(&line, ctx)?));
            }
            return Ok(Some(line));
        }
    }

    fn expand(&self, line: &str, ctx: &dyn MacroContext) -> Result<String> {
        let mut current = line.to_string();
        for _ in 0..MAX_EXPANSION_PASSES {
            let (next, changed) = expand_once(&current, ctx, &self.path, self.cursor as u32)?;
            if !changed {
                return Ok(next);
            }
            current = next;
        }
        Err(BuildError::FileFormat {
            path: self.path.clone(),
            line: self.cursor as u32,
            message: "macro expansion exceeded 64 passes, suspected recursion".to_string(),
        })
    }
}

fn expand_once(
    line: &str,
    ctx: &dyn MacroContext,
    path: &Path,
    line_no: u32,
) -> Result<(String, bool)> {
    let mut out = String::with_capacity(line.len());
    let mut changed = false;
    let chars: Vec<char> = line.chars().collect();
    let mut ci = 0usize;

    while ci < chars.len() {
        let c = chars[ci];
        if c == '$' && ci + 1 < chars.len() && chars[ci + 1] == '$' {
            out.push('$');
            ci += 2;
            changed = true;
            continue;
        }
        if c == '$' && ci + 1 < chars.len() && chars[ci + 1] == '(' {
            if let Some(close) = chars[ci + 2..].iter().position(|&ch| ch == ')') {
                let name: String = chars[ci + 2..ci + 2 + close].iter().collect();
                if name == "ProjDir" {
                    out.push_str("$(ProjDir)");
                } else {
                    let resolved = ctx
                        .implicit(&name)
                        .or_else(|| ctx.project_macro(&name))
                        .or_else(|| std::env::var(&name).ok())
                        .ok_or_else(|| BuildError::FileFormat {
                            path: path.to_path_buf(),
                            line: line_no,
                            message: format!("undefined macro '{name}'"),
                        })?;
                    out.push_str(&resolved);
                    changed = true;
                }
                ci += 2 + close + 1;
                continue;
            }
        }
        out.push(c);
        ci += 1;
    }
    Ok((out, changed))
}

fn decode(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFF && bytes[1] == 0xFE {
        let (text, _, _) = encoding_rs::UTF_16LE.decode(&bytes[2..]);
        text.into_owned()
    } else if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let (text, _, _) = encoding_rs::UTF_16BE.decode(&bytes[2..]);
        text.into_owned()
    } else {
        let (text, _, _) = encoding_rs::UTF_8.decode(bytes);
        text.into_owned()
    }
}

fn split_normalized(text: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                lines.push(std::mem::take(&mut current));
            }
            '\n' => lines.push(std::mem::take(&mut current)),
            other => current.push(other),
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    struct TestCtx {
        implicit: Vec<(&'static str, &'static str)>,
        project: Vec<(&'static str, &'static str)>,
    }

    impl MacroContext for TestCtx {
        fn implicit(&self, name: &str) -> Option<String> {
            self.implicit
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, v)| v.to_string())
        }
        fn project_macro(&self, name: &str) -> Option<String> {
            self.project
                .iter()
                .rev()
                .find(|(n, _)| *n == name)
                .map(|(_, v)| v.to_string())
        }
    }

    fn write_temp(contents: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents).unwrap();
        f
    }

    #[test]
    fn strips_comments_and_blank_lines() {
        let f = write_temp(b"one\n; a comment\n\ntwo\n");
        let mut spooler = LineSpooler::open(f.path(), true).unwrap();
        let ctx = EmptyMacroContext;
        assert_eq!(spooler.read_line(&ctx).unwrap().as_deref(), Some("one"));
        assert_eq!(spooler.read_line(&ctx).unwrap().as_deref(), Some("two"));
        assert_eq!(spooler.read_line(&ctx).unwrap(), None);
    }

    #[test]
    fn normalizes_crlf_and_bare_cr() {
        let f = write_temp(b"a\r\nb\rc\n");
        let mut spooler = LineSpooler::open(f.path(), false).unwrap();
        let ctx = EmptyMacroContext;
        assert_eq!(spooler.read_line(&ctx).unwrap().as_deref(), Some("a"));
        assert_eq!(spooler.read_line(&ctx).unwrap().as_deref(), Some("b"));
        assert_eq!(spooler.read_line(&ctx).unwrap().as_deref(), Some("c"));
    }

    #[test]
    fn expands_project_macro_with_last_wins_override() {
        let f = write_temp(b"value=$(Foo)\n");
        let mut spooler = LineSpooler::open(f.path(), false).unwrap();
        let ctx = TestCtx {
            implicit: vec![],
            project: vec![("Foo", "first"), ("Foo", "second")],
        };
        assert_eq!(
            spooler.read_line(&ctx).unwrap().as_deref(),
            Some("value=second")
        );
    }

    #[test]
    fn scenario_b_chained_macro_expansion() {
        let f = write_temp(b"value=$(X) world\n");
        let mut spooler = LineSpooler::open(f.path(), false).unwrap();
        let ctx = TestCtx {
            implicit: vec![],
            project: vec![("X", "$(Y)"), ("Y", "hello")],
        };
        assert_eq!(
            spooler.read_line(&ctx).unwrap().as_deref(),
            Some("value=hello world")
        );
    }

    #[test]
    fn escaped_dollar_is_literal() {
        let f = write_temp(b"price=$$5\n");
        let mut spooler = LineSpooler::open(f.path(), false).unwrap();
        let ctx = EmptyMacroContext;
        assert_eq!(
            spooler.read_line(&ctx).unwrap().as_deref(),
            Some("price=$5")
        );
    }

    #[test]
    fn projdir_is_deferred() {
        let f = write_temp(b"path=$(ProjDir)/foo\n");
        let mut spooler = LineSpooler::open(f.path(), false).unwrap();
        let ctx = EmptyMacroContext;
        assert_eq!(
            spooler.read_line(&ctx).unwrap().as_deref(),
            Some("path=$(ProjDir)/foo")
        );
    }

    #[test]
    fn unresolved_macro_is_file_format_error() {
        let f = write_temp(b"value=$(NoSuchMacro)\n");
        let mut spooler = LineSpooler::open(f.path(), false).unwrap();
        let ctx = EmptyMacroContext;
        assert!(spooler.read_line(&ctx).is_err());
    }

    #[test]
    fn utf16_le_bom_is_decoded() {
        let mut bytes = vec![0xFF, 0xFE];
        for c in "hello".encode_utf16() {
            bytes.extend_from_slice(&c.to_le_bytes());
        }
        bytes.extend_from_slice(&0x000Au16.to_le_bytes());
        let f = write_temp(&bytes);
        let mut spooler = LineSpooler::open(f.path(), false).unwrap();
        let ctx = EmptyMacroContext;
        assert_eq!(spooler.read_line(&ctx).unwrap().as_deref(), Some("hello"));
    }
}
