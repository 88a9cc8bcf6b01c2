//! In-memory project model: the parsed, resolved representation of one
//! `PROJECT=` block from the master project file.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::SystemTime;

use bitflags::bitflags;

/// What kind of build artifact a project produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectType {
    Executable,
    Service,
    SharedLib,
    SharedObj,
    StaticLib,
    FileCopy,
    Group,
}

impl ProjectType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Exe" => Some(Self::Executable),
            "Service" => Some(Self::Service),
            "SharedLib" => Some(Self::SharedLib),
            "SharedObj" => Some(Self::SharedObj),
            "StaticLib" => Some(Self::StaticLib),
            "FileCopy" => Some(Self::FileCopy),
            "Group" => Some(Self::Group),
            _ => None,
        }
    }

    /// Group projects aggregate dependencies only; they own no source files.
    pub fn has_sources(self) -> bool {
        !matches!(self, Self::Group | Self::FileCopy)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayType {
    #[default]
    None,
    Console,
    Gui,
}

impl DisplayType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Console" => Some(Self::Console),
            "GUI" => Some(Self::Gui),
            _ => None,
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ProjectFlags: u16 {
        const SAMPLE           = 0b0000_0001;
        const HAS_MSG_FILE     = 0b0000_0010;
        const HAS_RES_FILE     = 0b0000_0100;
        const NEEDS_ADMIN      = 0b0000_1000;
        const HAS_PLATFORM_DIR = 0b0001_0000;
        const PURE_CPP         = 0b0010_0000;
        const USES_SYS_LIBS    = 0b0100_0000;
        const VARARGS          = 0b1000_0000;
        const VERSIONED        = 0b1_0000_0000;
    }
}

/// One `/Mapping=…` generation request parsed from an `IDLFILE=` block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdlGenFlags {
    pub client: bool,
    pub server: bool,
    pub globals: bool,
    pub csharp: bool,
    pub typescript: bool,
}

#[derive(Debug, Clone)]
pub struct IdlEntry {
    pub source_file: String,
    pub name_ext: Option<String>,
    pub ts_path: Option<PathBuf>,
    pub r#gen: IdlGenFlags,
    pub mappings: Vec<String>,
}

/// One `FILECOPIES targetPath=` block: a destination plus its source list.
#[derive(Debug, Clone)]
pub struct FileCopyBlock {
    pub target_path: String,
    pub sources: Vec<String>,
}

/// A timestamped source or header file discovered by directory enumeration.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub modified: SystemTime,
    pub size: u64,
}

#[derive(Debug, Clone, Default)]
pub struct PlatformGate {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl PlatformGate {
    /// `true` if this project/block applies to `platform`.
    pub fn applies(&self, platform: &str) -> bool {
        if !self.include.is_empty() && !self.include.iter().any(|p| p.eq_ignore_ascii_case(platform)) {
            return false;
        }
        if self.exclude.iter().any(|p| p.eq_ignore_ascii_case(platform)) {
            return false;
        }
        true
    }
}

#[derive(Debug, Clone, Default)]
pub struct PlatformGatedPaths {
    pub gate: PlatformGate,
    pub paths: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PlatformGatedOptions {
    pub gate: PlatformGate,
    pub options: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct Project {
    pub name: String,
    pub directory: String,
    pub project_type: ProjectType,
    pub display_type: DisplayType,
    pub platform_gate: PlatformGate,
    pub flags: ProjectFlags,
    pub base_address: u32,
    pub export_keyword: Option<String>,
    pub dependencies: Vec<String>,
    pub extlibs: Vec<String>,
    pub extra_include_paths: Vec<PlatformGatedPaths>,
    pub defines: BTreeMap<String, String>,
    pub macros: BTreeMap<String, String>,
    pub idl_entries: Vec<IdlEntry>,
    pub file_copies: Vec<FileCopyBlock>,
    pub custom_commands: Vec<String>,
    pub platform_options: Vec<PlatformGatedOptions>,

    /// Filled in after construction, once the graph has been built.
    pub graph_index: Option<usize>,
    pub cpp_files: Vec<SourceFile>,
    pub hpp_files: Vec<SourceFile>,
}

impl Project {
    pub fn new(name: impl Into<String>, project_type: ProjectType) -> Self {
        let name = name.into();
        Self {
            directory: name.clone(),
            name,
            project_type,
            display_type: DisplayType::default(),
            platform_gate: PlatformGate::default(),
            flags: ProjectFlags::empty(),
            base_address: 0,
            export_keyword: None,
            dependencies: Vec::new(),
            extlibs: Vec::new(),
            extra_include_paths: Vec::new(),
            defines: BTreeMap::new(),
            macros: BTreeMap::new(),
            idl_entries: Vec::new(),
            file_copies: Vec::new(),
            custom_commands: Vec::new(),
            platform_options: Vec::new(),
            graph_index: None,
            cpp_files: Vec::new(),
            hpp_files: Vec::new(),
        }
    }

    pub fn included_for_platform(&self, platform: &str) -> bool {
        self.platform_gate.applies(platform)
    }

    /// Rescans `root/<directory>` for `.cpp`/`.hpp` files, sorted
    /// case-insensitively by name for deterministic build order.
    pub fn refresh_file_lists(&mut self, root: &std::path::Path) -> crate::error::Result<()> {
        self.cpp_files.clear();
        self.hpp_files.clear();
        if !self.project_type.has_sources() {
            return Ok(());
        }
        let dir = root.join(&self.directory);
        let mut entries: Vec<_> = walkdir::WalkDir::new(&dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .collect();
        entries.sort_by(|a, b| {
            a.file_name()
                .to_string_lossy()
                .to_ascii_lowercase()
                .cmp(&b.file_name().to_string_lossy().to_ascii_lowercase())
        });
        for entry in entries {
            let path = entry.path();
            let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
                continue;
            };
            let meta = entry
                .metadata()
                .map_err(|err| crate::error::BuildError::QueryError {
                    path: path.to_path_buf(),
                    source: err.into(),
                })?;
            let file = SourceFile {
                name: entry.file_name().to_string_lossy().into_owned(),
                modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                size: meta.len(),
            };
            if ext.eq_ignore_ascii_case("cpp") {
                self.cpp_files.push(file);
            } else if ext.eq_ignore_ascii_case("hpp") {
                self.hpp_files.push(file);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_gate_empty_include_means_all_platforms() {
        let gate = PlatformGate::default();
        assert!(gate.applies("Win32"));
    }

    #[test]
    fn platform_gate_nonempty_include_restricts() {
        let gate = PlatformGate {
            include: vec!["Win32".into()],
            exclude: vec![],
        };
        assert!(gate.applies("Win32"));
        assert!(!gate.applies("Linux"));
    }

    #[test]
    fn platform_gate_exclude_wins_over_default_inclusion() {
        let gate = PlatformGate {
            include: vec![],
            exclude: vec!["Linux".into()],
        };
        assert!(gate.applies("Win32"));
        assert!(!gate.applies("Linux"));
    }

    #[test]
    fn group_projects_have_no_sources() {
        assert!(!ProjectType::Group.has_sources());
        assert!(ProjectType::Executable.has_sources());
    }
}
