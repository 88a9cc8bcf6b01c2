//! Dialog resource parsing and binary emission.

use std::collections::HashMap;

use bitflags::bitflags;
use byteorder::{WriteBytesExt, LE};

use crate::blockparser::{parse_block, FieldDescriptor, FieldType};
use crate::error::{BuildError, Result};
use crate::linespool::{EmptyMacroContext, LineSpooler};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DialogFlags: u8 {
        const SIZEABLE     = 0b0001;
        const USE_ORIGIN   = 0b0010;
        const SCREEN_ORIGIN = 0b0100;
        const SET_FGN      = 0b1000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct WidgetFlags: u8 {
        const INIT_FOCUS = 0b01;
        const DISABLED   = 0b10;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogTheme {
    MainWnd,
    DialogBox,
    None,
}

impl DialogTheme {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "MainWnd" => Some(Self::MainWnd),
            "DialogBox" => Some(Self::DialogBox),
            "None" => Some(Self::None),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Area {
    pub x: i32,
    pub y: i32,
    pub cx: u32,
    pub cy: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorType {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    TopFull,
    BottomFull,
    LeftFull,
    RightFull,
}

impl AnchorType {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "TopLeft" => Some(Self::TopLeft),
            "TopRight" => Some(Self::TopRight),
            "BottomLeft" => Some(Self::BottomLeft),
            "BottomRight" => Some(Self::BottomRight),
            "TopFull" => Some(Self::TopFull),
            "BottomFull" => Some(Self::BottomFull),
            "LeftFull" => Some(Self::LeftFull),
            "RightFull" => Some(Self::RightFull),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DialogWidget {
    pub widget_type: String,
    pub symbol_name: Option<String>,
    pub id: u32,
    pub area: Area,
    pub text_sym: Option<String>,
    pub flyover_sym: Option<String>,
    pub cue_sym: Option<String>,
    pub text_msg_id: u32,
    pub flyover_msg_id: u32,
    pub cue_msg_id: u32,
    pub hints: String,
    pub flags: WidgetFlags,
    pub image: String,
    pub anchor: Option<AnchorType>,
}

#[derive(Debug, Clone)]
pub struct Dialog {
    pub symbol_name: String,
    pub id: u32,
    pub area: Area,
    pub theme: DialogTheme,
    pub text_sym: Option<String>,
    pub title_msg_id: u32,
    pub flags: DialogFlags,
    pub widgets: Vec<DialogWidget>,
}

/// Sentinel stored in place of a message id when no symbol was given,
/// matching `kCIDLib::c4MaxCard`.
pub const NO_MSG_ID: u32 = u32::MAX;

/// Resolves an optional `TEXTSYM`/`FLYOVERSYM`/`CUESYM` name to its numeric
/// message id. A missing symbol yields [`NO_MSG_ID`]; a symbol that doesn't
/// resolve against the message table is a `NotFound` error.
fn resolve_msg_sym(sym: &Option<String>, msg_ids: &HashMap<String, u32>) -> Result<u32> {
    match sym {
        None => Ok(NO_MSG_ID),
        Some(name) => msg_ids.get(name).copied().ok_or_else(|| {
            BuildError::NotFound(format!("'{name}' is not defined in the message table"))
        }),
    }
}

fn well_known_id(name: &str) -> Option<u32> {
    match name {
        "IdOk" => Some(1),
        "IdCancel" => Some(2),
        _ => None,
    }
}

fn parse_area(raw: &[String]) -> Result<Area> {
    if raw.len() != 4 {
        return Err(BuildError::FileFormat {
            path: std::path::PathBuf::new(),
            line: 0,
            message: "AREA requires exactly 4 values (x y cx cy)".to_string(),
        });
    }
    let parse_i32 = |s: &str| s.parse::<i32>();
    let parse_u32 = |s: &str| s.parse::<u32>();
    Ok(Area {
        x: parse_i32(&raw[0]).map_err(|_| bad_area())?,
        y: parse_i32(&raw[1]).map_err(|_| bad_area())?,
        cx: parse_u32(&raw[2]).map_err(|_| bad_area())?,
        cy: parse_u32(&raw[3]).map_err(|_| bad_area())?,
    })
}

fn bad_area() -> BuildError {
    BuildError::FileFormat {
        path: std::path::PathBuf::new(),
        line: 0,
        message: "AREA values must be integers (x, y) and cardinals (cx, cy)".to_string(),
    }
}

/// Parses one `DIALOG=` block, including all of its child widget blocks, up
/// to `END DIALOG`.
pub fn parse_dialog(
    spooler: &mut LineSpooler,
    msg_ids: &HashMap<String, u32>,
) -> Result<Dialog> {
    let ctx = EmptyMacroContext;
    let line = spooler
        .read_line(&ctx)?
        .ok_or_else(|| BuildError::UnexpectedEof { path: std::path::PathBuf::new() })?;
    if !line.eq_ignore_ascii_case("INFO=") {
        return Err(BuildError::FileFormat {
            path: std::path::PathBuf::new(),
            line: spooler.current_line_number(),
            message: "DIALOG block must open with INFO=".to_string(),
        });
    }

    let descriptors = vec![
        FieldDescriptor::new("SYMBOL", FieldType::Text, 1, 1),
        FieldDescriptor::new("AREA", FieldType::Text, 1, 1),
        FieldDescriptor::new("THEME", FieldType::Alpha, 1, 1),
        FieldDescriptor::new("TEXTSYM", FieldType::CppName, 0, 1),
        FieldDescriptor::new("FLAGS", FieldType::Alpha, 0, 1),
    ];
    let block = parse_block(spooler, &ctx, &descriptors, "END INFO")?;

    let symbol_values: Vec<String> = block
        .values(block.index_of("SYMBOL").unwrap())
        .to_vec();
    if symbol_values.len() != 2 {
        return Err(BuildError::FileFormat {
            path: std::path::PathBuf::new(),
            line: spooler.current_line_number(),
            message: "SYMBOL requires a name and a cardinal id".to_string(),
        });
    }
    let symbol_name = symbol_values[0].clone();
    let id: u32 = symbol_values[1]
        .parse()
        .map_err(|_| BuildError::FileFormat {
            path: std::path::PathBuf::new(),
            line: spooler.current_line_number(),
            message: "SYMBOL id must be a cardinal".to_string(),
        })?;

    let area = parse_area(block.values(block.index_of("AREA").unwrap()))?;
    let theme_raw = block.first_value(block.index_of("THEME").unwrap()).unwrap();
    let theme = DialogTheme::parse(theme_raw).ok_or_else(|| BuildError::FileFormat {
        path: std::path::PathBuf::new(),
        line: spooler.current_line_number(),
        message: format!("unknown THEME '{theme_raw}'"),
    })?;
    let text_sym = block.index_of("TEXTSYM").and_then(|i| block.first_value(i)).map(str::to_string);
    let title_msg_id = resolve_msg_sym(&text_sym, msg_ids)?;

    let mut flags = DialogFlags::empty();
    if let Some(i) = block.index_of("FLAGS") {
        for tok in block.values(i) {
            flags |= match tok.as_str() {
                "Sizeable" => DialogFlags::SIZEABLE,
                "UseOrigin" => DialogFlags::USE_ORIGIN,
                "ScreenOrigin" => DialogFlags::SCREEN_ORIGIN,
                "SetFgn" => DialogFlags::SET_FGN,
                other => {
                    return Err(BuildError::FileFormat {
                        path: std::path::PathBuf::new(),
                        line: spooler.current_line_number(),
                        message: format!("unknown dialog FLAGS token '{other}'"),
                    })
                }
            };
        }
    }

    let mut dialog = Dialog {
        symbol_name,
        id,
        area,
        theme,
        text_sym,
        title_msg_id,
        flags,
        widgets: Vec::new(),
    };

    let mut saw_init_focus = false;
    loop {
        let Some(line) = spooler.read_line(&ctx)? else {
            return Err(BuildError::UnexpectedEof { path: std::path::PathBuf::new() });
        };
        if line.eq_ignore_ascii_case("END DIALOG") {
            break;
        }
        let Some(widget_type) = line.strip_suffix('=') else {
            return Err(BuildError::FileFormat {
                path: std::path::PathBuf::new(),
                line: spooler.current_line_number(),
                message: format!("expected a widget block, got '{line}'"),
            });
        };
        let widget = parse_widget(spooler, widget_type, msg_ids)?;
        if widget.flags.contains(WidgetFlags::INIT_FOCUS) {
            if saw_init_focus {
                return Err(BuildError::FileFormat {
                    path: std::path::PathBuf::new(),
                    line: spooler.current_line_number(),
                    message: "InitFocus may appear on at most one widget per dialog".to_string(),
                });
            }
            saw_init_focus = true;
        }
        dialog.widgets.push(widget);
    }

    Ok(dialog)
}

fn parse_widget(
    spooler: &mut LineSpooler,
    widget_type: &str,
    msg_ids: &HashMap<String, u32>,
) -> Result<DialogWidget> {
    let ctx = EmptyMacroContext;
    let terminator = format!("END {}", widget_type.to_ascii_uppercase());
    let descriptors = vec![
        FieldDescriptor::new("SYMBOL", FieldType::Text, 0, 2),
        FieldDescriptor::new("AREA", FieldType::Text, 1, 1),
        FieldDescriptor::new("TEXTSYM", FieldType::CppName, 0, 1),
        FieldDescriptor::new("FLYOVERSYM", FieldType::CppName, 0, 1),
        FieldDescriptor::new("CUESYM", FieldType::CppName, 0, 1),
        FieldDescriptor::new("HINTS", FieldType::Text, 0, 1),
        FieldDescriptor::new("FLAGS", FieldType::Alpha, 0, 2),
        FieldDescriptor::new("IMAGE", FieldType::Text, 0, 1),
        FieldDescriptor::new("ANCHOR", FieldType::Alpha, 0, 1),
    ];
    let block = parse_block(spooler, &ctx, &descriptors, &terminator)?;

    let (symbol_name, id) = if let Some(i) = block.index_of("SYMBOL") {
        let values = block.values(i);
        match values.len() {
            0 => (None, 0),
            2 => {
                let name = values[0].clone();
                let id = well_known_id(&values[1])
                    .or_else(|| values[1].parse().ok())
                    .ok_or_else(|| BuildError::FileFormat {
                        path: std::path::PathBuf::new(),
                        line: spooler.current_line_number(),
                        message: format!("invalid widget id '{}'", values[1]),
                    })?;
                (Some(name), id)
            }
            _ => {
                return Err(BuildError::FileFormat {
                    path: std::path::PathBuf::new(),
                    line: spooler.current_line_number(),
                    message: "SYMBOL requires a name and an id".to_string(),
                })
            }
        }
    } else {
        (None, 0)
    };

    let area = parse_area(block.values(block.index_of("AREA").unwrap()))?;
    let text_sym = block.index_of("TEXTSYM").and_then(|i| block.first_value(i)).map(str::to_string);
    let text_msg_id = resolve_msg_sym(&text_sym, msg_ids)?;
    let flyover_sym = block.index_of("FLYOVERSYM").and_then(|i| block.first_value(i)).map(str::to_string);
    let flyover_msg_id = resolve_msg_sym(&flyover_sym, msg_ids)?;
    let cue_sym = block.index_of("CUESYM").and_then(|i| block.first_value(i)).map(str::to_string);
    let cue_msg_id = resolve_msg_sym(&cue_sym, msg_ids)?;
    let hints = block.index_of("HINTS").and_then(|i| block.first_value(i)).unwrap_or("").to_string();
    let image = block.index_of("IMAGE").and_then(|i| block.first_value(i)).unwrap_or("").to_string();
    let anchor = block
        .index_of("ANCHOR")
        .and_then(|i| block.first_value(i))
        .map(|v| {
            AnchorType::parse(v).ok_or_else(|| BuildError::FileFormat {
                path: std::path::PathBuf::new(),
                line: spooler.current_line_number(),
                message: format!("unknown ANCHOR '{v}'"),
            })
        })
        .transpose()?;

    let mut flags = WidgetFlags::empty();
    if let Some(i) = block.index_of("FLAGS") {
        for tok in block.values(i) {
            flags |= match tok.as_str() {
                "InitFocus" => WidgetFlags::INIT_FOCUS,
                "Disabled" => WidgetFlags::DISABLED,
                other => {
                    return Err(BuildError::FileFormat {
                        path: std::path::PathBuf::new(),
                        line: spooler.current_line_number(),
                        message: format!("unknown widget FLAGS token '{other}'"),
                    })
                }
            };
        }
    }

    Ok(DialogWidget {
        widget_type: widget_type.to_string(),
        symbol_name,
        id,
        area,
        text_sym,
        flyover_sym,
        cue_sym,
        text_msg_id,
        flyover_msg_id,
        cue_msg_id,
        hints,
        flags,
        image,
        anchor,
    })
}

fn write_wide_nt(buf: &mut Vec<u8>, text: &str) {
    let units: Vec<u16> = text.encode_utf16().collect();
    buf.write_u16::<LE>(units.len() as u16 + 1).unwrap();
    for u in units {
        buf.write_u16::<LE>(u).unwrap();
    }
    buf.write_u16::<LE>(0).unwrap();
}

/// Serialises a dialog into its binary payload: fixed header, then each
/// child widget record followed by its three variable-length NUL-terminated
/// strings (hints, widget-type tag, image).
pub fn emit_dialog(dialog: &Dialog) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.write_u32::<LE>(dialog.id).unwrap();
    buf.write_i32::<LE>(dialog.area.x).unwrap();
    buf.write_i32::<LE>(dialog.area.y).unwrap();
    buf.write_u32::<LE>(dialog.area.cx).unwrap();
    buf.write_u32::<LE>(dialog.area.cy).unwrap();
    buf.write_u8(dialog.theme as u8).unwrap();
    buf.write_u8(dialog.flags.bits()).unwrap();
    buf.write_u32::<LE>(dialog.title_msg_id).unwrap();
    buf.write_u32::<LE>(dialog.widgets.len() as u32).unwrap();

    for widget in &dialog.widgets {
        buf.write_u32::<LE>(widget.id).unwrap();
        buf.write_i32::<LE>(widget.area.x).unwrap();
        buf.write_i32::<LE>(widget.area.y).unwrap();
        buf.write_u32::<LE>(widget.area.cx).unwrap();
        buf.write_u32::<LE>(widget.area.cy).unwrap();
        buf.write_u8(widget.flags.bits()).unwrap();
        buf.write_u32::<LE>(widget.text_msg_id).unwrap();
        buf.write_u32::<LE>(widget.flyover_msg_id).unwrap();
        buf.write_u32::<LE>(widget.cue_msg_id).unwrap();
        write_wide_nt(&mut buf, &widget.hints);
        write_wide_nt(&mut buf, &widget.widget_type);
        write_wide_nt(&mut buf, &widget.image);
    }
    buf
}
