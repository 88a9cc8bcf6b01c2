//! Top-level `.CIDRC` parser: reads `DIALOG=`/`MENU=` blocks and emits the
//! chunked binary resource file plus the generated symbol header.

use std::collections::HashMap;
use std::path::Path;

use byteorder::{WriteBytesExt, LE};

use crate::error::{BuildError, Result};
use crate::linespool::{EmptyMacroContext, LineSpooler};
use crate::rescomp::dialog::{self, Dialog};
use crate::rescomp::menu::{self, Menu};

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    Dialog = 0,
    Menu = 1,
}

#[derive(Debug)]
pub struct CidrcSource {
    pub dialogs: Vec<Dialog>,
    pub menus: Vec<Menu>,
}

/// Parses a whole `.CIDRC` file. `msg_ids` is the already-compiled message
/// table, used to validate `TEXTSYM` references against known ids.
pub fn parse_cidrc(path: &Path, msg_ids: &HashMap<String, u32>) -> Result<CidrcSource> {
    let mut spooler = LineSpooler::open(path, true)?;
    let ctx = EmptyMacroContext;
    let mut source = CidrcSource {
        dialogs: Vec::new(),
        menus: Vec::new(),
    };
    let mut seen_ids = std::collections::HashSet::new();

    while let Some(line) = spooler.read_line(&ctx)? {
        if line.eq_ignore_ascii_case("DIALOG=") {
            let d = dialog::parse_dialog(&mut spooler, msg_ids)?;
            if !seen_ids.insert(d.id) {
                return Err(BuildError::AlreadyExists(format!(
                    "duplicate resource id {} in {}",
                    d.id,
                    path.display()
                )));
            }
            source.dialogs.push(d);
        } else if line.eq_ignore_ascii_case("MENU=") {
            let m = menu::parse_menu(&mut spooler, msg_ids)?;
            if !seen_ids.insert(m.id) {
                return Err(BuildError::AlreadyExists(format!(
                    "duplicate resource id {} in {}",
                    m.id,
                    path.display()
                )));
            }
            source.menus.push(m);
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

struct ResourceItem {
    id: u32,
    res_type: ResourceType,
    payload: Vec<u8>,
}

/// Writes the chunked binary resource file: header, index, then payloads.
pub fn write_resource_file(out_path: &Path, source: &CidrcSource) -> Result<()> {
    let mut items = Vec::new();
    for d in &source.dialogs {
        items.push(ResourceItem {
            id: d.id,
            res_type: ResourceType::Dialog,
            payload: dialog::emit_dialog(d),
        });
    }
    for m in &source.menus {
        items.push(ResourceItem {
            id: m.id,
            res_type: ResourceType::Menu,
            payload: menu::emit_menu(m)?,
        });
    }

    let mut buf = Vec::new();
    buf.write_u32::<LE>(FORMAT_VERSION).unwrap();
    buf.write_u32::<LE>(items.len() as u32).unwrap();

    let header_size = 8;
    let index_size = items.len() * (4 + 1 + 4 + 4);
    let mut offset = (header_size + index_size) as u32;
    let mut index_bytes = Vec::new();
    for item in &items {
        index_bytes.write_u32::<LE>(item.id).unwrap();
        index_bytes.write_u8(item.res_type as u8).unwrap();
        index_bytes.write_u32::<LE>(offset).unwrap();
        index_bytes.write_u32::<LE>(item.payload.len() as u32).unwrap();
        offset += item.payload.len() as u32;
    }
    buf.extend_from_slice(&index_bytes);
    for item in &items {
        buf.extend_from_slice(&item.payload);
    }

    std::fs::write(out_path, &buf).map_err(|source| BuildError::CreateError {
        path: out_path.to_path_buf(),
        source,
    })
}

/// Collects every `SYMBOL=` declaration across dialogs (and their widgets)
/// and menus (and their items) for generated-header emission.
pub fn collect_symbols(source: &CidrcSource) -> Vec<(String, u32)> {
    let mut symbols = Vec::new();
    for d in &source.dialogs {
        symbols.push((d.symbol_name.clone(), d.id));
        for w in &d.widgets {
            if let Some(name) = &w.symbol_name {
                symbols.push((name.clone(), w.id));
            }
        }
    }
    for m in &source.menus {
        symbols.push((m.symbol_name.clone(), m.id));
        collect_menu_symbols(&m.items, &mut symbols);
    }
    symbols
}

fn collect_menu_symbols(nodes: &[menu::MenuNode], out: &mut Vec<(String, u32)>) {
    for node in nodes {
        match node {
            menu::MenuNode::Item { symbol_name, id, .. } => out.push((symbol_name.clone(), *id)),
            menu::MenuNode::SubMenu {
                symbol_name,
                id,
                children,
                ..
            } => {
                out.push((symbol_name.clone(), *id));
                collect_menu_symbols(children, out);
            }
            menu::MenuNode::Separator => {}
        }
    }
}

/// Writes `constexpr tCIDLib::TResId name = id;` for every collected symbol,
/// under `namespace` -- atomically replacing the header only if changed.
pub fn write_symbol_header(out_path: &Path, namespace: &str, symbols: &[(String, u32)]) -> Result<()> {
    let mut content = String::new();
    content.push_str("// Generated. Do not edit.\n#pragma once\n\n");
    content.push_str(&format!("namespace {namespace}\n{{\n"));
    for (name, id) in symbols {
        content.push_str(&format!("    constexpr tCIDLib::TResId {name} = {id};\n"));
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
    fn scenario_e_single_button_dialog() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.CIDRC");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "DIALOG=").unwrap();
        writeln!(f, "INFO=").unwrap();
        writeln!(f, "SYMBOL=ridMain 1000").unwrap();
        writeln!(f, "AREA=0 0 200 100").unwrap();
        writeln!(f, "THEME=MainWnd").unwrap();
        writeln!(f, "END INFO").unwrap();
        writeln!(f, "PUSHBUTTON=").unwrap();
        writeln!(f, "SYMBOL=bnOK IdOk").unwrap();
        writeln!(f, "AREA=60 70 80 20").unwrap();
        writeln!(f, "TEXTSYM=midOK").unwrap();
        writeln!(f, "END PUSHBUTTON").unwrap();
        writeln!(f, "END DIALOG").unwrap();
        drop(f);

        let mut msg_ids = HashMap::new();
        msg_ids.insert("midOK".to_string(), 17001u32);

        let source = parse_cidrc(&path, &msg_ids).unwrap();
        assert_eq!(source.dialogs.len(), 1);
        let dialog = &source.dialogs[0];
        assert_eq!(dialog.id, 1000);
        assert_eq!(dialog.widgets.len(), 1);
        assert_eq!(dialog.widgets[0].id, 1); // IdOk
        assert_eq!(dialog.widgets[0].text_msg_id, 17001); // midText = message id of midOK

        let out = dir.path().join("test.CidRes");
        write_resource_file(&out, &source).unwrap();
        let bytes = std::fs::read(&out).unwrap();
        assert_eq!(u32::from_le_bytes(bytes[0..4].try_into().unwrap()), 1);
        assert_eq!(u32::from_le_bytes(bytes[4..8].try_into().unwrap()), 1);
        let res_id = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
        assert_eq!(res_id, 1000);
    }

    #[test]
    fn duplicate_resource_ids_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.CIDRC");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "DIALOG=").unwrap();
        writeln!(f, "INFO=").unwrap();
        writeln!(f, "SYMBOL=ridA 1000").unwrap();
        writeln!(f, "AREA=0 0 1 1").unwrap();
        writeln!(f, "THEME=None").unwrap();
        writeln!(f, "END INFO").unwrap();
        writeln!(f, "END DIALOG").unwrap();
        writeln!(f, "DIALOG=").unwrap();
        writeln!(f, "INFO=").unwrap();
        writeln!(f, "SYMBOL=ridB 1000").unwrap();
        writeln!(f, "AREA=0 0 1 1").unwrap();
        writeln!(f, "THEME=None").unwrap();
        writeln!(f, "END INFO").unwrap();
        writeln!(f, "END DIALOG").unwrap();
        drop(f);

        let err = parse_cidrc(&path, &HashMap::new()).unwrap_err();
        assert!(matches!(err, BuildError::AlreadyExists(_)));
    }
}
