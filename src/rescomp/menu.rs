//! Menu resource parsing and binary emission. Menu items nest arbitrarily
//! via `SUBMENU=`/`END SUBMENU`; the emitted form embeds next-sibling
//! offsets so a runtime reader can walk the tree linearly without an index.

use std::collections::HashMap;

use byteorder::{WriteBytesExt, LE};

use crate::blockparser::{parse_block, FieldDescriptor, FieldType};
use crate::error::{BuildError, Result};
use crate::linespool::{EmptyMacroContext, LineSpooler};

/// Hard cap on the accumulated emitted menu bytes.
pub const SCRATCH_CAP: usize = 16 * 1024;

#[derive(Debug, Clone)]
pub enum MenuNode {
    Item {
        symbol_name: String,
        id: u32,
        text_sym: String,
        text_msg_id: u32,
    },
    SubMenu {
        symbol_name: String,
        id: u32,
        text_msg_id: u32,
        children: Vec<MenuNode>,
    },
    Separator,
}

fn resolve_text_sym(sym: &str, msg_ids: &HashMap<String, u32>) -> Result<u32> {
    msg_ids.get(sym).copied().ok_or_else(|| {
        BuildError::NotFound(format!("TEXTSYM '{sym}' is not defined in the message table"))
    })
}

#[derive(Debug, Clone)]
pub struct Menu {
    pub symbol_name: String,
    pub id: u32,
    pub items: Vec<MenuNode>,
}

pub fn parse_menu(spooler: &mut LineSpooler, msg_ids: &HashMap<String, u32>) -> Result<Menu> {
    let ctx = EmptyMacroContext;
    let descriptors = vec![FieldDescriptor::new("SYMBOL", FieldType::Text, 1, 1)];
    let (name, id) = {
        let line = spooler
            .read_line(&ctx)?
            .ok_or_else(|| BuildError::UnexpectedEof { path: std::path::PathBuf::new() })?;
        if !line.eq_ignore_ascii_case("SYMBOL=") {
            return Err(BuildError::FileFormat {
                path: std::path::PathBuf::new(),
                line: spooler.current_line_number(),
                message: "MENU block must open with SYMBOL=".to_string(),
            });
        }
        parse_symbol_line(spooler)?
    };
    let _ = &descriptors;

    let items = parse_menu_items(spooler, "END MENU", msg_ids)?;
    Ok(Menu {
        symbol_name: name,
        id,
        items,
    })
}

fn parse_symbol_line(spooler: &mut LineSpooler) -> Result<(String, u32)> {
    let ctx = EmptyMacroContext;
    let line = spooler
        .read_line(&ctx)?
        .ok_or_else(|| BuildError::UnexpectedEof { path: std::path::PathBuf::new() })?;
    let mut parts = line.split_whitespace();
    let name = parts.next().ok_or_else(|| BuildError::FileFormat {
        path: std::path::PathBuf::new(),
        line: spooler.current_line_number(),
        message: "SYMBOL requires a name and an id".to_string(),
    })?;
    let id: u32 = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| BuildError::FileFormat {
            path: std::path::PathBuf::new(),
            line: spooler.current_line_number(),
            message: "SYMBOL id must be a cardinal".to_string(),
        })?;
    Ok((name.to_string(), id))
}

fn parse_menu_items(
    spooler: &mut LineSpooler,
    terminator: &str,
    msg_ids: &HashMap<String, u32>,
) -> Result<Vec<MenuNode>> {
    let ctx = EmptyMacroContext;
    let mut nodes = Vec::new();
    loop {
        let Some(line) = spooler.read_line(&ctx)? else {
            return Err(BuildError::UnexpectedEof { path: std::path::PathBuf::new() });
        };
        if line.eq_ignore_ascii_case(terminator) {
            return Ok(nodes);
        } else if line.eq_ignore_ascii_case("SEPARATOR") {
            nodes.push(MenuNode::Separator);
        } else if line.eq_ignore_ascii_case("ITEM=") {
            let descriptors = vec![
                FieldDescriptor::new("SYMBOL", FieldType::Text, 1, 1),
                FieldDescriptor::new("TEXTSYM", FieldType::CppName, 1, 1),
            ];
            let block = parse_block(spooler, &ctx, &descriptors, "END ITEM")?;
            let symbol = block.values(block.index_of("SYMBOL").unwrap());
            if symbol.len() != 2 {
                return Err(BuildError::FileFormat {
                    path: std::path::PathBuf::new(),
                    line: spooler.current_line_number(),
                    message: "ITEM SYMBOL requires a name and an id".to_string(),
                });
            }
            let id: u32 = symbol[1].parse().map_err(|_| BuildError::FileFormat {
                path: std::path::PathBuf::new(),
                line: spooler.current_line_number(),
                message: "ITEM SYMBOL id must be a cardinal".to_string(),
            })?;
            let text_sym = block.first_value(block.index_of("TEXTSYM").unwrap()).unwrap().to_string();
            let text_msg_id = resolve_text_sym(&text_sym, msg_ids)?;
            nodes.push(MenuNode::Item {
                symbol_name: symbol[0].clone(),
                id,
                text_sym,
                text_msg_id,
            });
        } else if line.eq_ignore_ascii_case("SUBMENU=") {
            let (name, id) = parse_symbol_line(spooler)?;
            let text_sym = read_textsym_line(spooler)?;
            let text_msg_id = resolve_text_sym(&text_sym, msg_ids)?;
            let children = parse_menu_items(spooler, "END SUBMENU", msg_ids)?;
            nodes.push(MenuNode::SubMenu {
                symbol_name: name,
                id,
                text_msg_id,
                children,
            });
        } else {
            return Err(BuildError::FileFormat {
                path: std::path::PathBuf::new(),
                line: spooler.current_line_number(),
                message: format!("unexpected menu line '{line}'"),
            });
        }
    }
}

/// Reads a `TEXTSYM=name` line, as sub-menus carry their title's text symbol
/// on its own line rather than through the block parser.
fn read_textsym_line(spooler: &mut LineSpooler) -> Result<String> {
    let ctx = EmptyMacroContext;
    let line = spooler
        .read_line(&ctx)?
        .ok_or_else(|| BuildError::UnexpectedEof { path: std::path::PathBuf::new() })?;
    strip_ci_prefix(&line, "TEXTSYM=")
        .map(str::to_string)
        .ok_or_else(|| BuildError::FileFormat {
            path: std::path::PathBuf::new(),
            line: spooler.current_line_number(),
            message: "expected TEXTSYM= in sub-menu definition".to_string(),
        })
}

fn strip_ci_prefix<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    if line.len() >= prefix.len() && line[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&line[prefix.len()..])
    } else {
        None
    }
}

struct Scratch {
    buf: Vec<u8>,
}

impl Scratch {
    fn new() -> Self {
        Self { buf: Vec::new() }
    }

    fn check(&self) -> Result<()> {
        if self.buf.len() > SCRATCH_CAP {
            return Err(BuildError::Full(format!(
                "menu scratch buffer exceeded {SCRATCH_CAP} bytes"
            )));
        }
        Ok(())
    }
}

/// Emits the whole menu tree into a single contiguous buffer capped at
/// [`SCRATCH_CAP`] bytes, patching each sub-menu's next-sibling offset and
/// item count after its children are written.
pub fn emit_menu(menu: &Menu) -> Result<Vec<u8>> {
    let mut scratch = Scratch::new();
    emit_nodes(&mut scratch, &menu.items)?;
    Ok(scratch.buf)
}

const TAG_ITEM: u8 = 0;
const TAG_SUBMENU: u8 = 1;
const TAG_SEPARATOR: u8 = 2;

fn emit_nodes(scratch: &mut Scratch, nodes: &[MenuNode]) -> Result<()> {
    for node in nodes {
        match node {
            MenuNode::Item { id, text_msg_id, .. } => {
                scratch.buf.write_u8(TAG_ITEM).unwrap();
                scratch.buf.write_u32::<LE>(*id).unwrap();
                scratch.buf.write_u32::<LE>(*text_msg_id).unwrap();
                scratch.check()?;
            }
            MenuNode::Separator => {
                scratch.buf.write_u8(TAG_SEPARATOR).unwrap();
                scratch.check()?;
            }
            MenuNode::SubMenu { id, text_msg_id, children, .. } => {
                scratch.buf.write_u8(TAG_SUBMENU).unwrap();
                scratch.buf.write_u32::<LE>(*id).unwrap();
                scratch.buf.write_u32::<LE>(*text_msg_id).unwrap();
                let patch_pos = scratch.buf.len();
                scratch.buf.write_u32::<LE>(0).unwrap(); // next-sibling offset, patched below
                scratch.buf.write_u32::<LE>(children.len() as u32).unwrap();
                scratch.check()?;
                emit_nodes(scratch, children)?;
                let next_sibling = scratch.buf.len() as u32;
                scratch.buf[patch_pos..patch_pos + 4].copy_from_slice(&next_sibling.to_le_bytes());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn spooler_for(contents: &str) -> LineSpooler {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        LineSpooler::open(f.path(), true).unwrap()
    }

    fn msg_ids() -> HashMap<String, u32> {
        let mut m = HashMap::new();
        m.insert("midOpen".to_string(), 100);
        m.insert("midFile".to_string(), 101);
        m
    }

    #[test]
    fn parses_flat_menu_with_item_and_separator() {
        let mut spooler = spooler_for(
            "SYMBOL=\nmenuMain 1\nITEM=\nSYMBOL=mniOpen 10\nTEXTSYM=midOpen\nEND ITEM\nSEPARATOR\nEND MENU\n",
        );
        let menu = parse_menu(&mut spooler, &msg_ids()).unwrap();
        assert_eq!(menu.symbol_name, "menuMain");
        assert_eq!(menu.items.len(), 2);
        assert!(matches!(
            menu.items[0],
            MenuNode::Item { text_msg_id: 100, .. }
        ));
        assert!(matches!(menu.items[1], MenuNode::Separator));
    }

    #[test]
    fn undefined_textsym_is_not_found() {
        let mut spooler = spooler_for(
            "SYMBOL=\nmenuMain 1\nITEM=\nSYMBOL=mniOpen 10\nTEXTSYM=midNope\nEND ITEM\nEND MENU\n",
        );
        let err = parse_menu(&mut spooler, &msg_ids()).unwrap_err();
        assert!(matches!(err, BuildError::NotFound(_)));
    }

    #[test]
    fn nested_submenu_roundtrips_through_emit() {
        let mut spooler = spooler_for(
            "SYMBOL=\nmenuMain 1\nSUBMENU=\nmenuFile 2\nTEXTSYM=midFile\nITEM=\nSYMBOL=mniOpen 10\nTEXTSYM=midOpen\nEND ITEM\nEND SUBMENU\nEND MENU\n",
        );
        let menu = parse_menu(&mut spooler, &msg_ids()).unwrap();
        let bytes = emit_menu(&menu).unwrap();
        assert!(!bytes.is_empty());
        assert!(matches!(
            menu.items[0],
            MenuNode::SubMenu { text_msg_id: 101, .. }
        ));
    }

    #[test]
    fn oversized_menu_fails_with_full() {
        let mut items = Vec::new();
        for i in 0..SCRATCH_CAP {
            items.push(MenuNode::Item {
                symbol_name: format!("mni{i}"),
                id: i as u32,
                text_sym: "midX".to_string(),
                text_msg_id: 42,
            });
        }
        let menu = Menu {
            symbol_name: "menuBig".to_string(),
            id: 1,
            items,
        };
        assert!(matches!(emit_menu(&menu), Err(BuildError::Full(_))));
    }
}
