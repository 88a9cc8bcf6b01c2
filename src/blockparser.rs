//! Declarative, type-checked parser for `KEY= ... END KEY` blocks.
//!
//! Every higher-level block format in the project file (`SETTINGS`,
//! `DEFINES`, `LIBS`, and so on) is an instance of this same engine: a fixed
//! set of field descriptors, each with an arity and a value type, driven off
//! a [`LineSpooler`].

use crate::error::{BuildError, Result};
use crate::linespool::{LineSpooler, MacroContext};

/// Type tag applied to every value stored against a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Cardinal,
    Integer,
    Boolean,
    Alpha,
    AlphaNum,
    Alphas,
    CppName,
}

impl FieldType {
    fn validate(self, value: &str) -> bool {
        match self {
            FieldType::Text => !value.is_empty(),
            FieldType::Cardinal => !value.is_empty() && value.chars().all(|c| c.is_ascii_digit()),
            FieldType::Integer => {
                let stripped = value.strip_prefix(['+', '-']).unwrap_or(value);
                !stripped.is_empty() && stripped.chars().all(|c| c.is_ascii_digit())
            }
            FieldType::Boolean => matches!(
                value.to_ascii_lowercase().as_str(),
                "yes" | "no" | "true" | "false"
            ),
            FieldType::Alpha => !value.is_empty() && value.chars().all(|c| c.is_ascii_alphabetic()),
            FieldType::AlphaNum => {
                !value.is_empty() && value.chars().all(|c| c.is_ascii_alphanumeric())
            }
            FieldType::Alphas => {
                !value.is_empty()
                    && value
                        .split_whitespace()
                        .all(|tok| !tok.is_empty() && tok.chars().all(|c| c.is_ascii_alphabetic()))
            }
            FieldType::CppName => {
                let mut chars = value.chars();
                match chars.next() {
                    Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
                    _ => return false,
                }
                chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
            }
        }
    }
}

/// Describes one recognised `FIELDNAME=` key within a block.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub name: String,
    pub field_type: FieldType,
    pub min: usize,
    pub max: usize,
}

impl FieldDescriptor {
    pub fn new(name: &str, field_type: FieldType, min: usize, max: usize) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            min,
            max,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct FieldValues {
    values: Vec<String>,
    lines: Vec<u32>,
}

/// The result of parsing a block: for each descriptor index, the values
/// found and the line number each was found on.
pub struct ParsedBlock {
    descriptors: Vec<FieldDescriptor>,
    found: Vec<FieldValues>,
}

impl ParsedBlock {
    pub fn values(&self, index: usize) -> &[String] {
        &self.found[index].values
    }

    pub fn first_value(&self, index: usize) -> Option<&str> {
        self.found[index].values.first().map(String::as_str)
    }

    pub fn line_for(&self, index: usize, occurrence: usize) -> Option<u32> {
        self.found[index].lines.get(occurrence).copied()
    }

    pub fn index_of(&self, field_name: &str) -> Option<usize> {
        self.descriptors
            .iter()
            .position(|d| d.name.eq_ignore_ascii_case(field_name))
    }

    pub fn count(&self, index: usize) -> usize {
        self.found[index].values.len()
    }
}

/// Parses one block of lines from `spooler` up to (and consuming) the line
/// exactly equal to `terminator`, distributing values among `descriptors`
/// by matching each line's `FIELDNAME=` prefix.
pub fn parse_block(
    spooler: &mut LineSpooler,
    ctx: &dyn MacroContext,
    descriptors: &[FieldDescriptor],
    terminator: &str,
) -> Result<ParsedBlock> {
    let mut found: Vec<FieldValues> = vec![FieldValues::default(); descriptors.len()];

    loop {
        let line_no = spooler.current_line_number();
        let line = spooler
            .read_line(ctx)?
            .ok_or_else(|| BuildError::FileFormat {
                path: std::path::PathBuf::new(),
                line: line_no,
                message: format!("unexpected end of file, expected '{terminator}'"),
            })?;

        if line == terminator {
            break;
        }

        let Some(eq_pos) = line.find('=') else {
            return Err(BuildError::FileFormat {
                path: std::path::PathBuf::new(),
                line: spooler.current_line_number(),
                message: format!("expected 'FIELD=value', got '{line}'"),
            });
        };
        let field_name = line[..eq_pos].trim();
        let rest = line[eq_pos + 1..].trim();

        let Some(desc_idx) = descriptors
            .iter()
            .position(|d| d.name.eq_ignore_ascii_case(field_name))
        else {
            return Err(BuildError::FileFormat {
                path: std::path::PathBuf::new(),
                line: spooler.current_line_number(),
                message: format!("unrecognized field '{field_name}'"),
            });
        };
        let descriptor = &descriptors[desc_idx];

        for token in rest.split([',', ' ', '\t']).filter(|t| !t.is_empty()) {
            if !descriptor.field_type.validate(token) {
                return Err(BuildError::FileFormat {
                    path: std::path::PathBuf::new(),
                    line: spooler.current_line_number(),
                    message: format!(
                        "value '{token}' for field '{field_name}' is not a valid {:?}",
                        descriptor.field_type
                    ),
                });
            }
            found[desc_idx].values.push(token.to_string());
            found[desc_idx].lines.push(spooler.current_line_number());
        }

        if found[desc_idx].values.len() > descriptor.max {
            return Err(BuildError::FileFormat {
                path: std::path::PathBuf::new(),
                line: spooler.current_line_number(),
                message: format!(
                    "field '{field_name}' occurs more than the maximum of {}",
                    descriptor.max
                ),
            });
        }
    }

    for (idx, descriptor) in descriptors.iter().enumerate() {
        if found[idx].values.len() < descriptor.min {
            return Err(BuildError::FileFormat {
                path: std::path::PathBuf::new(),
                line: spooler.current_line_number(),
                message: format!(
                    "field '{}' requires at least {} value(s), found {}",
                    descriptor.name,
                    descriptor.min,
                    found[idx].values.len()
                ),
            });
        }
    }

    Ok(ParsedBlock {
        descriptors: descriptors.to_vec(),
        found,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linespool::EmptyMacroContext;
    use std::io::Write;

    fn spooler_for(contents: &str) -> LineSpooler {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        LineSpooler::open(f.path(), true).unwrap()
    }

    #[test]
    fn parses_cardinal_and_text_fields() {
        let mut spooler = spooler_for("BASE=100\nNAME=Foo\nEND INFO\n");
        let descriptors = vec![
            FieldDescriptor::new("BASE", FieldType::Cardinal, 0, 1),
            FieldDescriptor::new("NAME", FieldType::Text, 1, 1),
        ];
        let ctx = EmptyMacroContext;
        let block = parse_block(&mut spooler, &ctx, &descriptors, "END INFO").unwrap();
        assert_eq!(block.first_value(0), Some("100"));
        assert_eq!(block.first_value(1), Some("Foo"));
    }

    #[test]
    fn missing_required_field_is_file_format_error() {
        let mut spooler = spooler_for("BASE=100\nEND INFO\n");
        let descriptors = vec![
            FieldDescriptor::new("BASE", FieldType::Cardinal, 0, 1),
            FieldDescriptor::new("NAME", FieldType::Text, 1, 1),
        ];
        let ctx = EmptyMacroContext;
        assert!(parse_block(&mut spooler, &ctx, &descriptors, "END INFO").is_err());
    }

    #[test]
    fn exceeding_max_arity_fails() {
        let mut spooler = spooler_for("LIB=a,b,c\nEND LIBS\n");
        let descriptors = vec![FieldDescriptor::new("LIB", FieldType::Alpha, 0, 2)];
        let ctx = EmptyMacroContext;
        assert!(parse_block(&mut spooler, &ctx, &descriptors, "END LIBS").is_err());
    }

    #[test]
    fn boolean_accepts_case_insensitive_yes_no() {
        let mut spooler = spooler_for("FLAG=Yes\nEND SETTINGS\n");
        let descriptors = vec![FieldDescriptor::new("FLAG", FieldType::Boolean, 0, 1)];
        let ctx = EmptyMacroContext;
        let block = parse_block(&mut spooler, &ctx, &descriptors, "END SETTINGS").unwrap();
        assert_eq!(block.first_value(0), Some("Yes"));
    }

    #[test]
    fn cppname_rejects_leading_digit() {
        let mut spooler = spooler_for("EXPORT=1Foo\nEND SETTINGS\n");
        let descriptors = vec![FieldDescriptor::new("EXPORT", FieldType::CppName, 0, 1)];
        let ctx = EmptyMacroContext;
        assert!(parse_block(&mut spooler, &ctx, &descriptors, "END SETTINGS").is_err());
    }

    #[test]
    fn unrecognized_field_fails() {
        let mut spooler = spooler_for("BOGUS=1\nEND INFO\n");
        let descriptors = vec![FieldDescriptor::new("BASE", FieldType::Cardinal, 0, 1)];
        let ctx = EmptyMacroContext;
        assert!(parse_block(&mut spooler, &ctx, &descriptors, "END INFO").is_err());
    }
}
