//! Top-level project-file parser: `ALLPROJECTS=` / `PROJECT=` blocks, the
//! owning collection of every parsed [`Project`], and the dependency graph
//! built from their declared `DEPENDS=` lists.

use std::collections::BTreeMap;
use std::path::Path;

use crate::blockparser::{parse_block, FieldDescriptor, FieldType};
use crate::error::{BuildError, Result};
use crate::graph::DependGraph;
use crate::linespool::{LineSpooler, MacroContext};
use crate::project::{
    DisplayType, FileCopyBlock, IdlEntry, IdlGenFlags, PlatformGate, PlatformGatedOptions,
    PlatformGatedPaths, Project, ProjectFlags, ProjectType,
};

/// Global state accumulated while walking `ALLPROJECTS=`: library names,
/// search paths, the macro list, and IDL argument mappings.
#[derive(Debug, Clone, Default)]
pub struct GlobalSettings {
    pub ext_libs: Vec<String>,
    pub ext_lib_paths: Vec<String>,
    pub ext_include_paths: Vec<String>,
    pub macros: Vec<(String, String)>,
    pub idl_mappings: Vec<String>,
}

/// Implicit macros plus the project file's own macro list, used to resolve
/// `$(NAME)` while parsing the master file itself.
pub struct ProjectListContext<'a> {
    pub implicit: BTreeMap<&'static str, String>,
    pub globals: &'a GlobalSettings,
}

impl<'a> MacroContext for ProjectListContext<'a> {
    fn implicit(&self, name: &str) -> Option<String> {
        self.implicit.get(name).cloned()
    }
    fn project_macro(&self, name: &str) -> Option<String> {
        self.globals
            .macros
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
    }
}

pub struct ProjectList {
    pub globals: GlobalSettings,
    pub graph: DependGraph,
    projects: Vec<Project>,
}

impl ProjectList {
    pub fn new() -> Self {
        Self {
            globals: GlobalSettings::default(),
            graph: DependGraph::new(),
            projects: Vec::new(),
        }
    }

    pub fn project(&self, name: &str) -> Option<&Project> {
        self.projects
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn project_mut(&mut self, name: &str) -> Option<&mut Project> {
        self.projects
            .iter_mut()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    pub fn projects_mut(&mut self) -> &mut [Project] {
        &mut self.projects
    }

    /// Parses the whole master project file, builds the graph from declared
    /// dependencies, and runs cycle detection.
    pub fn parse(&mut self, path: &Path, platform: &str, implicit: BTreeMap<&'static str, String>) -> Result<()> {
        let mut spooler = LineSpooler::open(path, true)?;

        loop {
            let line_no = spooler.current_line_number();
            let ctx = ProjectListContext {
                implicit: implicit.clone(),
                globals: &self.globals,
            };
            let Some(line) = spooler.read_line(&ctx)? else {
                break;
            };

            if line.eq_ignore_ascii_case("ALLPROJECTS=") {
                self.parse_all_projects(&mut spooler, &implicit)?;
            } else if let Some(rest) = strip_ci_prefix(&line, "PROJECT=") {
                self.parse_project(&mut spooler, &implicit, rest, platform, path)?;
            } else {
                return Err(BuildError::FileFormat {
                    path: path.to_path_buf(),
                    line: line_no,
                    message: format!("unexpected top-level line '{line}'"),
                });
            }
        }

        for project in &self.projects {
            let idx = self.graph.add_node(&project.name)?;
            let _ = idx;
        }
        for project in &self.projects {
            for dep in &project.dependencies {
                self.graph.add_edge(&project.name, dep)?;
            }
        }
        for project in &mut self.projects {
            project.graph_index = self.graph.index_of(&project.name);
        }

        if self.graph.detect_cycles() {
            return Err(BuildError::DependError(
                "circular dependency detected among projects".to_string(),
            ));
        }

        Ok(())
    }

    fn parse_all_projects(
        &mut self,
        spooler: &mut LineSpooler,
        implicit: &BTreeMap<&'static str, String>,
    ) -> Result<()> {
        loop {
            let ctx = ProjectListContext {
                implicit: implicit.clone(),
                globals: &self.globals,
            };
            let Some(line) = spooler.read_line(&ctx)? else {
                return Err(BuildError::UnexpectedEof {
                    path: std::path::PathBuf::new(),
                });
            };
            if line.eq_ignore_ascii_case("END ALLPROJECTS") {
                return Ok(());
            } else if line.eq_ignore_ascii_case("EXTLIBS=") {
                self.globals.ext_libs.extend(read_value_list(spooler, implicit, &self.globals, "END EXTLIBS")?);
            } else if line.eq_ignore_ascii_case("EXTLIBPATHS=") {
                self.globals
                    .ext_lib_paths
                    .extend(read_value_list(spooler, implicit, &self.globals, "END EXTLIBPATHS")?);
            } else if line.eq_ignore_ascii_case("EXTINCLUDEPATHS=") {
                self.globals
                    .ext_include_paths
                    .extend(read_value_list(spooler, implicit, &self.globals, "END EXTINCLUDEPATHS")?);
            } else if line.eq_ignore_ascii_case("MACROS=") {
                for kv in read_value_list(spooler, implicit, &self.globals, "END MACROS")? {
                    if let Some((k, v)) = kv.split_once('=') {
                        self.globals.macros.push((k.to_string(), v.to_string()));
                    }
                }
            } else if line.eq_ignore_ascii_case("IDLMAPPINGS=") {
                for kv in read_value_list(spooler, implicit, &self.globals, "END IDLMAPPINGS")? {
                    self.globals.idl_mappings.push(format!("/Mapping={kv}"));
                }
            } else {
                return Err(BuildError::FileFormat {
                    path: std::path::PathBuf::new(),
                    line: spooler.current_line_number(),
                    message: format!("unrecognized ALLPROJECTS block '{line}'"),
                });
            }
        }
    }

    fn parse_project(
        &mut self,
        spooler: &mut LineSpooler,
        implicit: &BTreeMap<&'static str, String>,
        header: &str,
        platform: &str,
        path: &Path,
    ) -> Result<()> {
        let (name, gate) = parse_project_header(header);
        if self.project(&name).is_some() {
            return Err(BuildError::AlreadyExists(format!(
                "project '{name}' already declared"
            )));
        }

        if !gate.applies(platform) {
            // Excluded: consume the body without building the project.
            loop {
                let ctx = ProjectListContext {
                    implicit: implicit.clone(),
                    globals: &self.globals,
                };
                let Some(line) = spooler.read_line(&ctx)? else {
                    return Err(BuildError::UnexpectedEof { path: path.to_path_buf() });
                };
                if line.eq_ignore_ascii_case("END PROJECT") {
                    return Ok(());
                }
            }
        }

        let mut project = Project::new(&name, ProjectType::Executable);
        project.platform_gate = gate;

        loop {
            let ctx = ProjectListContext {
                implicit: implicit.clone(),
                globals: &self.globals,
            };
            let Some(line) = spooler.read_line(&ctx)? else {
                return Err(BuildError::UnexpectedEof { path: path.to_path_buf() });
            };

            if line.eq_ignore_ascii_case("END PROJECT") {
                break;
            } else if line.eq_ignore_ascii_case("SETTINGS=") {
                self.parse_settings(spooler, implicit, &mut project)?;
            } else if line.eq_ignore_ascii_case("DEFINES=") {
                for kv in read_value_list(spooler, implicit, &self.globals, "END DEFINES")? {
                    if let Some((k, v)) = kv.split_once('=') {
                        project.defines.insert(k.to_string(), v.to_string());
                    }
                }
            } else if line.eq_ignore_ascii_case("DEPENDS=") {
                project
                    .dependencies
                    .extend(read_value_list(spooler, implicit, &self.globals, "END DEPENDS")?);
            } else if line.eq_ignore_ascii_case("EXTLIBS=") {
                project
                    .extlibs
                    .extend(read_value_list(spooler, implicit, &self.globals, "END EXTLIBS")?);
            } else if let Some(suffix) = strip_ci_prefix(&line, "INCLUDEPATHS") {
                let gate = parse_bracket_gate(suffix);
                let paths = read_value_list(spooler, implicit, &self.globals, "END INCLUDEPATHS")?;
                project.extra_include_paths.push(PlatformGatedPaths { gate, paths });
            } else if let Some(suffix) = strip_ci_prefix(&line, "OPTIONS") {
                let gate = parse_bracket_gate(suffix);
                let mut options = BTreeMap::new();
                for kv in read_value_list(spooler, implicit, &self.globals, "END OPTIONS")? {
                    if let Some((k, v)) = kv.split_once('=') {
                        options.insert(k.to_string(), v.to_string());
                    }
                }
                project.platform_options.push(PlatformGatedOptions { gate, options });
            } else if line.eq_ignore_ascii_case("CUSTCMDS=") {
                project
                    .custom_commands
                    .extend(read_value_list(spooler, implicit, &self.globals, "END CUSTCMDS")?);
            } else if let Some(target) = strip_ci_prefix(&line, "FILECOPIES") {
                let target_path = target.trim().trim_start_matches('=').trim().to_string();
                let sources = read_value_list(spooler, implicit, &self.globals, "END FILECOPIES")?;
                project.file_copies.push(FileCopyBlock { target_path, sources });
            } else if line.eq_ignore_ascii_case("IDLFILE=") {
                project.idl_entries.push(self.parse_idl_entry(spooler, implicit)?);
            } else {
                return Err(BuildError::FileFormat {
                    path: path.to_path_buf(),
                    line: spooler.current_line_number(),
                    message: format!("unrecognized project block '{line}'"),
                });
            }
        }

        self.projects.push(project);
        Ok(())
    }

    fn parse_settings(
        &self,
        spooler: &mut LineSpooler,
        implicit: &BTreeMap<&'static str, String>,
        project: &mut Project,
    ) -> Result<()> {
        let descriptors = vec![
            FieldDescriptor::new("MSGFILE", FieldType::Boolean, 0, 1),
            FieldDescriptor::new("RESFILE", FieldType::Boolean, 0, 1),
            FieldDescriptor::new("VERSIONED", FieldType::Boolean, 0, 1),
            FieldDescriptor::new("SAMPLE", FieldType::Boolean, 0, 1),
            FieldDescriptor::new("USESYSLIBS", FieldType::Boolean, 0, 1),
            FieldDescriptor::new("VARARGS", FieldType::Boolean, 0, 1),
            FieldDescriptor::new("NEEDSADMIN", FieldType::Boolean, 0, 1),
            FieldDescriptor::new("PURECPP", FieldType::Boolean, 0, 1),
            FieldDescriptor::new("PLATFORMDIR", FieldType::Boolean, 0, 1),
            FieldDescriptor::new("BASE", FieldType::Cardinal, 0, 1),
            FieldDescriptor::new("TYPE", FieldType::Alpha, 0, 1),
            FieldDescriptor::new("DISPLAY", FieldType::Alpha, 0, 1),
            FieldDescriptor::new("DIRECTORY", FieldType::Text, 0, 1),
            FieldDescriptor::new("EXPORT", FieldType::CppName, 0, 1),
        ];
        let ctx = ProjectListContext {
            implicit: implicit.clone(),
            globals: &self.globals,
        };
        let block = parse_block(spooler, &ctx, &descriptors, "END SETTINGS")?;

        let flag_field = |name: &str, flag: ProjectFlags, project: &mut Project| {
            if let Some(idx) = block.index_of(name) {
                if let Some(v) = block.first_value(idx) {
                    if is_true(v) {
                        project.flags.insert(flag);
                    }
                }
            }
        };
        flag_field("MSGFILE", ProjectFlags::HAS_MSG_FILE, project);
        flag_field("RESFILE", ProjectFlags::HAS_RES_FILE, project);
        flag_field("VERSIONED", ProjectFlags::VERSIONED, project);
        flag_field("SAMPLE", ProjectFlags::SAMPLE, project);
        flag_field("USESYSLIBS", ProjectFlags::USES_SYS_LIBS, project);
        flag_field("VARARGS", ProjectFlags::VARARGS, project);
        flag_field("NEEDSADMIN", ProjectFlags::NEEDS_ADMIN, project);
        flag_field("PURECPP", ProjectFlags::PURE_CPP, project);
        flag_field("PLATFORMDIR", ProjectFlags::HAS_PLATFORM_DIR, project);

        if let Some(idx) = block.index_of("BASE") {
            if let Some(v) = block.first_value(idx) {
                project.base_address = v.parse().unwrap_or(0);
            }
        }
        if let Some(idx) = block.index_of("TYPE") {
            if let Some(v) = block.first_value(idx) {
                project.project_type = ProjectType::parse(v).ok_or_else(|| BuildError::FileFormat {
                    path: std::path::PathBuf::new(),
                    line: spooler.current_line_number(),
                    message: format!("unknown project TYPE '{v}'"),
                })?;
            }
        }
        if let Some(idx) = block.index_of("DISPLAY") {
            if let Some(v) = block.first_value(idx) {
                project.display_type = DisplayType::parse(v).ok_or_else(|| BuildError::FileFormat {
                    path: std::path::PathBuf::new(),
                    line: spooler.current_line_number(),
                    message: format!("unknown DISPLAY value '{v}'"),
                })?;
            }
        }
        if let Some(idx) = block.index_of("DIRECTORY") {
            if let Some(v) = block.first_value(idx) {
                project.directory = v.to_string();
            }
        }
        if let Some(idx) = block.index_of("EXPORT") {
            project.export_keyword = block.first_value(idx).map(str::to_string);
        }
        Ok(())
    }

    fn parse_idl_entry(
        &self,
        spooler: &mut LineSpooler,
        implicit: &BTreeMap<&'static str, String>,
    ) -> Result<IdlEntry> {
        let mut source_file = None;
        let mut name_ext = None;
        let mut ts_path = None;
        let mut r#gen = IdlGenFlags {
            client: false,
            server: false,
            globals: false,
            csharp: false,
            typescript: false,
        };
        let mut mappings = Vec::new();

        loop {
            let ctx = ProjectListContext {
                implicit: implicit.clone(),
                globals: &self.globals,
            };
            let Some(line) = spooler.read_line(&ctx)? else {
                return Err(BuildError::UnexpectedEof { path: std::path::PathBuf::new() });
            };
            if line.eq_ignore_ascii_case("END IDLFILE") {
                break;
            }
            let Some(eq) = line.find('=') else { continue };
            let key = line[..eq].trim().to_ascii_uppercase();
            let value = line[eq + 1..].trim();
            match key.as_str() {
                "SRCFILE" => source_file = Some(value.to_string()),
                "NAMEEXT" => name_ext = Some(value.to_string()),
                "TSPATH" => ts_path = Some(std::path::PathBuf::from(value)),
                "GEN" => {
                    for tag in value.split(',').map(str::trim) {
                        match tag.to_ascii_uppercase().as_str() {
                            "CLIENT" => r#gen.client = true,
                            "SERVER" => r#gen.server = true,
                            "GLOBALS" => r#gen.globals = true,
                            "CSHARP" => r#gen.csharp = true,
                            "TYPESCRIPT" => r#gen.typescript = true,
                            other => {
                                return Err(BuildError::FileFormat {
                                    path: std::path::PathBuf::new(),
                                    line: spooler.current_line_number(),
                                    message: format!("unknown IDL GEN target '{other}'"),
                                })
                            }
                        }
                    }
                }
                "MAPPING" => mappings.push(format!("/Mapping={value}")),
                _ => {
                    return Err(BuildError::FileFormat {
                        path: std::path::PathBuf::new(),
                        line: spooler.current_line_number(),
                        message: format!("unrecognized IDLFILE key '{key}'"),
                    })
                }
            }
        }

        let source_file = source_file.ok_or_else(|| BuildError::FileFormat {
            path: std::path::PathBuf::new(),
            line: spooler.current_line_number(),
            message: "IDLFILE block missing SRCFILE".to_string(),
        })?;
        if r#gen.globals && name_ext.is_none() {
            return Err(BuildError::FileFormat {
                path: std::path::PathBuf::new(),
                line: spooler.current_line_number(),
                message: "NAMEEXT is mandatory when GLOBALS is generated".to_string(),
            });
        }

        Ok(IdlEntry {
            source_file,
            name_ext,
            ts_path,
            r#gen,
            mappings,
        })
    }
}

impl Default for ProjectList {
    fn default() -> Self {
        Self::new()
    }
}

fn is_true(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "yes" | "true")
}

fn strip_ci_prefix<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    if line.len() >= prefix.len() && line[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&line[prefix.len()..])
    } else {
        None
    }
}

/// Reads comma/whitespace-separated value lines up to `terminator`, applying
/// no type constraint (every line's leading `FIELD=` is already consumed by
/// the caller for list-style blocks like `EXTLIBS=`).
fn read_value_list(
    spooler: &mut LineSpooler,
    implicit: &BTreeMap<&'static str, String>,
    globals: &GlobalSettings,
    terminator: &str,
) -> Result<Vec<String>> {
    let mut values = Vec::new();
    loop {
        let ctx = ProjectListContext {
            implicit: implicit.clone(),
            globals,
        };
        let Some(line) = spooler.read_line(&ctx)? else {
            return Err(BuildError::UnexpectedEof { path: std::path::PathBuf::new() });
        };
        if line.eq_ignore_ascii_case(terminator) {
            return Ok(values);
        }
        values.push(line);
    }
}

/// Parses `name [incl1 incl2, excl1 excl2]` from a `PROJECT=` header.
fn parse_project_header(header: &str) -> (String, PlatformGate) {
    let header = header.trim();
    if let Some(bracket) = header.find('[') {
        let name = header[..bracket].trim().to_string();
        let inner = header[bracket + 1..].trim_end_matches(']').trim();
        let mut parts = inner.splitn(2, ',');
        let include = parts
            .next()
            .unwrap_or("")
            .split_whitespace()
            .map(str::to_string)
            .collect();
        let exclude = parts
            .next()
            .unwrap_or("")
            .split_whitespace()
            .map(str::to_string)
            .collect();
        (name, PlatformGate { include, exclude })
    } else {
        (header.to_string(), PlatformGate::default())
    }
}

fn parse_bracket_gate(suffix: &str) -> PlatformGate {
    let suffix = suffix.trim();
    if let Some(start) = suffix.find('[') {
        let inner = suffix[start + 1..].split(']').next().unwrap_or("");
        let mut parts = inner.splitn(2, ',');
        let include = parts
            .next()
            .unwrap_or("")
            .split_whitespace()
            .map(str::to_string)
            .collect();
        let exclude = parts
            .next()
            .unwrap_or("")
            .split_whitespace()
            .map(str::to_string)
            .collect();
        PlatformGate { include, exclude }
    } else {
        PlatformGate::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn parses_header_with_platform_brackets() {
        let (name, gate) = parse_project_header("Foo [Win32 Linux, MacOS]");
        assert_eq!(name, "Foo");
        assert_eq!(gate.include, vec!["Win32", "Linux"]);
        assert_eq!(gate.exclude, vec!["MacOS"]);
    }

    #[test]
    fn two_project_minimal_graph() {
        let src = "PROJECT=A\nEND PROJECT\nPROJECT=B\nDEPENDS=\nA\nEND DEPENDS\nEND PROJECT\n";
        let f = write_temp(src);
        let mut list = ProjectList::new();
        list.parse(f.path(), "Win32", BTreeMap::new()).unwrap();
        assert_eq!(list.projects().len(), 2);
        assert!(list.project("A").is_some());
        assert!(list.graph.has_edge(
            list.graph.index_of("B").unwrap(),
            list.graph.index_of("A").unwrap()
        ).unwrap());
    }

    #[test]
    fn self_dependency_fails_with_depend_error() {
        let src = "PROJECT=A\nDEPENDS=\nA\nEND DEPENDS\nEND PROJECT\n";
        let f = write_temp(src);
        let mut list = ProjectList::new();
        let err = list.parse(f.path(), "Win32", BTreeMap::new()).unwrap_err();
        assert!(matches!(err, BuildError::DependError(_)));
    }

    #[test]
    fn platform_excluded_project_is_not_constructed() {
        let src = "PROJECT=A [Linux,]\nDEPENDS=\nBogus\nEND DEPENDS\nEND PROJECT\n";
        let f = write_temp(src);
        let mut list = ProjectList::new();
        list.parse(f.path(), "Win32", BTreeMap::new()).unwrap();
        assert!(list.project("A").is_none());
    }

    #[test]
    fn duplicate_project_name_is_rejected() {
        let src = "PROJECT=A\nEND PROJECT\nPROJECT=A\nEND PROJECT\n";
        let f = write_temp(src);
        let mut list = ProjectList::new();
        assert!(list.parse(f.path(), "Win32", BTreeMap::new()).is_err());
    }
}
