//! Argument parsing, environment probing, action dispatch, and the
//! per-project driver loop. This is the orchestrator the binary entry point
//! hands off to.

use std::collections::BTreeMap;
use std::path::PathBuf;

use colored::Colorize;
use semver::Version;

use crate::error::{BuildError, Result};
use crate::graph::{IterMode, ALL_PROJECTS};
use crate::platform::current_platform_dir;
use crate::projectlist::ProjectList;
use crate::tools::{ToolAction, ToolOptions, ToolsDriver};
use crate::ui::Table;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Build,
    MakeDeps,
    ShowProjDeps,
    ShowProjSettings,
    CopyHeaders,
    MakeRes,
    IdlGen,
    MakeBinRelease,
    MakeDevRelease,
    Bootstrap,
}

impl Action {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "Build" => Some(Self::Build),
            "MakeDeps" => Some(Self::MakeDeps),
            "ShowProjDeps" => Some(Self::ShowProjDeps),
            "ShowProjSettings" => Some(Self::ShowProjSettings),
            "CopyHeaders" => Some(Self::CopyHeaders),
            "MakeRes" => Some(Self::MakeRes),
            "IDLGen" => Some(Self::IdlGen),
            "MakeBinRelease" => Some(Self::MakeBinRelease),
            "MakeDevRelease" => Some(Self::MakeDevRelease),
            "Bootstrap" => Some(Self::Bootstrap),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildMode {
    Dev,
    Prod,
}

impl BuildMode {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "Dev" => Some(Self::Dev),
            "Prod" => Some(Self::Prod),
            _ => None,
        }
    }
}

/// Fully resolved arguments: CLI flags layered over environment-variable
/// defaults, with CLI always winning.
#[derive(Debug, Clone)]
pub struct FacilityArgs {
    pub root_dir: PathBuf,
    pub out_dir: Option<PathBuf>,
    pub target: Option<String>,
    pub version: Version,
    pub mode: BuildMode,
    pub action: Action,
    pub lang: String,
    pub force: bool,
    pub low_prio: bool,
    pub no_logo: bool,
    pub no_recurse: bool,
    pub non_permissive: bool,
    pub verbose: bool,
    pub max_warn: bool,
    pub single: bool,
}

/// Parses the `/Flag=value` argument vocabulary, applying environment
/// variables first so CLI arguments can override them.
pub fn parse_args(argv: &[String]) -> Result<FacilityArgs> {
    let env_root = std::env::var("CID_SRCTREE")
        .ok()
        .or_else(|| std::env::var("CIDLIB_SRCDIR").ok());
    let env_mode = std::env::var("CID_BUILDMODE").ok();
    let env_version = std::env::var("CID_VERSION").ok();
    let env_out_dir = std::env::var("CID_RESDIR").ok();

    let mut root_dir = env_root.map(PathBuf::from);
    let mut out_dir = env_out_dir.map(PathBuf::from);
    let mut target = None;
    let mut version = env_version;
    let mut mode = env_mode.as_deref().and_then(BuildMode::parse).unwrap_or(BuildMode::Dev);
    let mut action = Action::Build;
    let lang = "en".to_string();
    let mut force = false;
    let mut low_prio = false;
    let mut no_logo = false;
    let mut no_recurse = false;
    let mut non_permissive = false;
    let mut verbose = false;
    let mut max_warn = false;
    let mut single = false;

    for arg in argv {
        if let Some(v) = arg.strip_prefix("/RootDir=") {
            root_dir = Some(PathBuf::from(v));
        } else if let Some(v) = arg.strip_prefix("/OutDir=") {
            out_dir = Some(PathBuf::from(v));
        } else if let Some(v) = arg.strip_prefix("/Target=") {
            target = Some(v.to_string());
        } else if let Some(v) = arg.strip_prefix("/Version=") {
            version = Some(v.to_string());
        } else if let Some(v) = arg.strip_prefix("/Mode=") {
            mode = BuildMode::parse(v).ok_or_else(|| BuildError::BadParams(format!("unknown /Mode value '{v}'")))?;
        } else if let Some(v) = arg.strip_prefix("/Action=") {
            action = Action::parse(v).ok_or_else(|| BuildError::BadParams(format!("unknown /Action value '{v}'")))?;
        } else if let Some(v) = arg.strip_prefix("/Lang=") {
            if v.len() != 2 || !v.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(BuildError::BadParams(format!(
                    "/Lang must be a two-character language code, got '{v}'"
                )));
            }
            // Validated but not wired into `lang` -- see DESIGN.md.
        } else if arg == "/Force" {
            force = true;
        } else if arg == "/LowPrio" {
            low_prio = true;
        } else if arg == "/NoLogo" {
            no_logo = true;
        } else if arg == "/NoRecurse" || arg == "/NR" {
            no_recurse = true;
        } else if arg == "/NonPermissive" {
            non_permissive = true;
        } else if arg == "/Verbose" {
            verbose = true;
        } else if arg == "/MaxWarn" {
            max_warn = true;
        } else if arg == "/Single" {
            single = true;
        } else if arg.starts_with("/HdrDump:") {
            // Accepted, has no effect on the core driver.
        } else {
            return Err(BuildError::BadParams(format!("unrecognized argument '{arg}'")));
        }
    }

    let root_dir = root_dir.ok_or_else(|| BuildError::BadParams("/RootDir is required".to_string()))?;
    let version = version.ok_or_else(|| BuildError::BadParams("/Version is required".to_string()))?;
    let version = Version::parse(&normalize_version(&version))
        .map_err(|e| BuildError::BadParams(format!("invalid /Version '{version}': {e}")))?;

    Ok(FacilityArgs {
        root_dir,
        out_dir,
        target,
        version,
        mode,
        action,
        lang,
        force,
        low_prio,
        no_logo,
        no_recurse,
        non_permissive,
        verbose,
        max_warn,
        single,
    })
}

/// Resolves the output directory, defaulting to `RootDir/Output` when
/// neither `/OutDir=` nor `CID_RESDIR` was given.
pub fn resolve_out_dir(args: &FacilityArgs) -> PathBuf {
    args.out_dir.clone().unwrap_or_else(|| args.root_dir.join("Output"))
}

fn normalize_version(raw: &str) -> String {
    let parts: Vec<&str> = raw.split('.').collect();
    match parts.len() {
        3 => raw.to_string(),
        2 => format!("{}.{}.0", parts[0], parts[1]),
        1 => format!("{}.0.0", parts[0]),
        _ => raw.to_string(),
    }
}

/// Resolves the explicit `/Target`, or infers it from the current working
/// directory by matching each project's directory, or falls back to "all".
pub fn resolve_target(args: &FacilityArgs, list: &ProjectList, cwd: &std::path::Path) -> String {
    if let Some(t) = &args.target {
        return t.clone();
    }
    for project in list.projects() {
        let project_dir = args.root_dir.join(&project.directory);
        if project_dir == cwd {
            return project.name.clone();
        }
    }
    ALL_PROJECTS.to_string()
}

pub struct Orchestrator<'a> {
    pub args: FacilityArgs,
    pub list: ProjectList,
    pub driver: &'a dyn ToolsDriver,
}

impl<'a> Orchestrator<'a> {
    pub fn new(args: FacilityArgs, list: ProjectList, driver: &'a dyn ToolsDriver) -> Self {
        Self { args, list, driver }
    }

    /// Runs the full action-dispatch sequence for the resolved target.
    pub fn run(&mut self, target: &str) -> Result<()> {
        if !self.args.no_logo {
            println!("{}", "CIDBuild driver".bold());
        }

        let mut lang = self.args.lang.clone();
        if matches!(self.args.action, Action::MakeBinRelease | Action::MakeDevRelease) && lang != "en" {
            eprintln!(
                "{}",
                "warning: /Lang is ignored for release actions".yellow()
            );
            lang.clear();
        }
        let _ = lang;

        let order = self.target_order(target)?;

        if matches!(self.args.action, Action::Build | Action::MakeDeps) {
            self.run_resource_compilation(&order)?;
        }
        if matches!(
            self.args.action,
            Action::Build | Action::MakeDeps | Action::IdlGen
        ) {
            self.run_idl_generation(&order)?;
        }

        self.refresh_file_lists(&order)?;

        if matches!(self.args.action, Action::Build | Action::MakeDeps) {
            self.copy_public_headers(&order)?;
        }

        self.run_file_copies(&order)?;

        self.dispatch_action(target, &order)
    }

    /// Projects reachable from `target` in dependency order, expanding group
    /// targets to their dependencies when `/NoRecurse` is set.
    fn target_order(&self, target: &str) -> Result<Vec<String>> {
        let mut order = Vec::new();
        self.list.graph.iterate(target, IterMode::BOTTOM_UP | IterMode::MINIMAL, |name, _| {
            order.push(name.to_string());
            true
        })?;
        Ok(order)
    }

    fn run_resource_compilation(&self, order: &[String]) -> Result<()> {
        for name in order {
            if let Some(project) = self.list.project(name) {
                if project.flags.contains(crate::project::ProjectFlags::HAS_RES_FILE)
                    || project.flags.contains(crate::project::ProjectFlags::HAS_MSG_FILE)
                {
                    self.driver
                        .invoke(ToolAction::RunMsgCompiler, project, &self.tool_options())?;
                }
            }
        }
        Ok(())
    }

    fn run_idl_generation(&self, order: &[String]) -> Result<()> {
        for name in order {
            if let Some(project) = self.list.project(name) {
                if !project.idl_entries.is_empty() {
                    self.driver
                        .invoke(ToolAction::RunIdlCompiler, project, &self.tool_options())?;
                }
            }
        }
        Ok(())
    }

    fn refresh_file_lists(&mut self, order: &[String]) -> Result<()> {
        let root = self.args.root_dir.clone();
        for name in order {
            if let Some(project) = self.list.project_mut(name) {
                project.refresh_file_lists(&root)?;
            }
        }
        Ok(())
    }

    fn copy_public_headers(&self, order: &[String]) -> Result<()> {
        let out_include = resolve_out_dir(&self.args).join("Include");
        std::fs::create_dir_all(&out_include).map_err(|source| BuildError::CreateError {
            path: out_include.clone(),
            source,
        })?;
        for name in order {
            let Some(project) = self.list.project(name) else { continue };
            let project_dir = self.args.root_dir.join(&project.directory);
            for hpp in &project.hpp_files {
                let from = project_dir.join(&hpp.name);
                let to = out_include.join(&hpp.name);
                std::fs::copy(&from, &to).map_err(|source| BuildError::CopyFailed {
                    from,
                    to,
                    source,
                })?;
            }
        }
        Ok(())
    }

    fn run_file_copies(&self, order: &[String]) -> Result<()> {
        for name in order {
            let Some(project) = self.list.project(name) else { continue };
            let project_dir = self.args.root_dir.join(&project.directory);
            for block in &project.file_copies {
                let target_dir = PathBuf::from(&block.target_path);
                std::fs::create_dir_all(&target_dir).map_err(|source| BuildError::CreateError {
                    path: target_dir.clone(),
                    source,
                })?;
                for src in &block.sources {
                    let from = project_dir.join(src);
                    let to = target_dir.join(src);
                    std::fs::copy(&from, &to).map_err(|source| BuildError::CopyFailed {
                        from,
                        to,
                        source,
                    })?;
                }
            }
        }
        Ok(())
    }

    fn dispatch_action(&self, target: &str, order: &[String]) -> Result<()> {
        match self.args.action {
            Action::Build => {
                for name in order {
                    if let Some(project) = self.list.project(name) {
                        self.driver.invoke(ToolAction::Compile, project, &self.tool_options())?;
                        self.driver.invoke(ToolAction::Link, project, &self.tool_options())?;
                    }
                }
                Ok(())
            }
            Action::ShowProjDeps => {
                self.list.graph.iterate(target, IterMode::empty(), |name, depth| {
                    println!("{}{}", "  ".repeat(depth.max(0) as usize), name);
                    true
                })?;
                Ok(())
            }
            Action::ShowProjSettings => {
                if let Some(project) = self.list.project(target) {
                    let mut table = Table::new(&["Setting", "Value"]);
                    table.add_row(vec!["Name".to_string(), project.name.clone()]);
                    table.add_row(vec!["Directory".to_string(), project.directory.clone()]);
                    table.add_row(vec!["Type".to_string(), format!("{:?}", project.project_type)]);
                    table.add_row(vec!["Display".to_string(), format!("{:?}", project.display_type)]);
                    table.add_row(vec!["Base address".to_string(), project.base_address.to_string()]);
                    table.add_row(vec![
                        "Export keyword".to_string(),
                        project.export_keyword.clone().unwrap_or_default(),
                    ]);
                    table.add_row(vec!["Dependencies".to_string(), project.dependencies.join(", ")]);
                    table.add_row(vec!["External libs".to_string(), project.extlibs.join(", ")]);
                    table.print();
                }
                Ok(())
            }
            Action::MakeDeps | Action::CopyHeaders | Action::MakeRes | Action::IdlGen => Ok(()),
            Action::MakeBinRelease | Action::MakeDevRelease => Err(BuildError::Internal(
                "release packaging is delegated to an external collaborator".to_string(),
            )),
            Action::Bootstrap => self.bootstrap(),
        }
    }

    /// Three-pass sequence used on a clean output tree: build the IDL
    /// compiler alone, reparse the project list, then regenerate everything.
    fn bootstrap(&self) -> Result<()> {
        let idl_compiler = self
            .list
            .project("CIDIDL")
            .ok_or_else(|| BuildError::NotFound("CIDIDL project not found for bootstrap".to_string()))?;
        self.driver.invoke(ToolAction::Compile, idl_compiler, &self.tool_options())?;
        self.driver.invoke(ToolAction::Link, idl_compiler, &self.tool_options())?;

        let order = self.target_order(ALL_PROJECTS)?;
        self.run_idl_generation(&order)?;
        self.run_resource_compilation(&order)?;
        for name in &order {
            if let Some(project) = self.list.project(name) {
                self.driver.invoke(ToolAction::Compile, project, &self.tool_options())?;
                self.driver.invoke(ToolAction::Link, project, &self.tool_options())?;
            }
        }
        Ok(())
    }

    fn tool_options(&self) -> ToolOptions {
        ToolOptions {
            force: self.args.force,
            non_permissive: self.args.non_permissive,
            max_warn: self.args.max_warn,
            single: self.args.single,
            low_prio: self.args.low_prio,
        }
    }
}

pub fn implicit_macros(args: &FacilityArgs) -> BTreeMap<&'static str, String> {
    let mut map = BTreeMap::new();
    map.insert("CIDSrcDir", args.root_dir.display().to_string());
    map.insert(
        "Mode",
        match args.mode {
            BuildMode::Dev => "Dev".to_string(),
            BuildMode::Prod => "Prod".to_string(),
        },
    );
    map.insert("PlatformDir", current_platform_dir().to_string());
    map.insert("SrcRoot", args.root_dir.display().to_string());
    map.insert("OutDir", resolve_out_dir(args).display().to_string());
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_flags_are_enforced() {
        let err = parse_args(&["/Version=1.0.0".to_string()]).unwrap_err();
        assert!(matches!(err, BuildError::BadParams(_)));
    }

    #[test]
    fn cli_overrides_environment() {
        unsafe { std::env::set_var("CID_SRCTREE", "/env/root") };
        let args = parse_args(&[
            "/RootDir=/cli/root".to_string(),
            "/Version=1.2.3".to_string(),
        ])
        .unwrap();
        assert_eq!(args.root_dir, PathBuf::from("/cli/root"));
        unsafe { std::env::remove_var("CID_SRCTREE") };
    }

    #[test]
    fn out_dir_defaults_from_cid_resdir_env() {
        unsafe { std::env::set_var("CID_RESDIR", "/env/out") };
        let args = parse_args(&[
            "/RootDir=/cli/root".to_string(),
            "/Version=1.2.3".to_string(),
        ])
        .unwrap();
        assert_eq!(args.out_dir, Some(PathBuf::from("/env/out")));
        assert_eq!(resolve_out_dir(&args), PathBuf::from("/env/out"));
        unsafe { std::env::remove_var("CID_RESDIR") };
    }

    #[test]
    fn out_dir_cli_flag_overrides_cid_resdir_env() {
        unsafe { std::env::set_var("CID_RESDIR", "/env/out") };
        let args = parse_args(&[
            "/RootDir=/cli/root".to_string(),
            "/Version=1.2.3".to_string(),
            "/OutDir=/cli/out".to_string(),
        ])
        .unwrap();
        assert_eq!(args.out_dir, Some(PathBuf::from("/cli/out")));
        unsafe { std::env::remove_var("CID_RESDIR") };
    }

    #[test]
    fn out_dir_defaults_to_root_dir_output_when_unset() {
        let args = parse_args(&[
            "/RootDir=/cli/root".to_string(),
            "/Version=1.2.3".to_string(),
        ])
        .unwrap();
        assert_eq!(args.out_dir, None);
        assert_eq!(resolve_out_dir(&args), PathBuf::from("/cli/root/Output"));
    }

    #[test]
    fn two_digit_version_gets_patch_zero() {
        let args = parse_args(&[
            "/RootDir=/root".to_string(),
            "/Version=1.2".to_string(),
        ])
        .unwrap();
        assert_eq!(args.version, Version::new(1, 2, 0));
    }

    #[test]
    fn invalid_lang_is_bad_params() {
        let err = parse_args(&[
            "/RootDir=/root".to_string(),
            "/Version=1.0.0".to_string(),
            "/Lang=xyz".to_string(),
        ])
        .unwrap_err();
        assert!(matches!(err, BuildError::BadParams(_)));
    }

    #[test]
    fn unrecognized_flag_is_bad_params() {
        let err = parse_args(&["/Bogus=1".to_string()]).unwrap_err();
        assert!(matches!(err, BuildError::BadParams(_)));
    }
}
