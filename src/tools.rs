//! Abstract contract for invoking the platform toolchain. The orchestrator
//! only ever talks to this trait; concrete compiler/linker/IDL-compiler
//! invocation is platform-specific and lives behind it.

use std::path::Path;

use crate::error::{BuildError, Result};
use crate::project::Project;

/// One thing the orchestrator can ask a tools driver to do for a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolAction {
    Compile,
    Link,
    RunIdlCompiler,
    RunMsgCompiler,
}

/// Knobs threaded through from CLI flags that affect how invocations are
/// built, independent of what's being invoked.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToolOptions {
    pub force: bool,
    pub non_permissive: bool,
    pub max_warn: bool,
    pub single: bool,
    pub low_prio: bool,
}

/// The seam the orchestrator drives; a concrete implementation knows how to
/// spawn `cl.exe`/`clang++`/`g++`/an IDL compiler binary and report results.
pub trait ToolsDriver {
    fn invoke(&self, action: ToolAction, project: &Project, options: &ToolOptions) -> Result<()>;

    /// Builds the argument vector for an IDL-compiler invocation; split out
    /// so the orchestrator can construct it from project + global mappings
    /// without needing to know the compiler's actual command-line shape.
    fn build_idl_args(&self, project: &Project, mappings: &[String]) -> Vec<String> {
        let mut args = vec![format!("/Project={}", project.name)];
        args.extend(mappings.iter().cloned());
        args
    }
}

/// A driver that never actually spawns a process; used by tests and by
/// dry-run diagnostic actions (`ShowProjDeps`, `ShowProjSettings`) that never
/// need real tool invocation.
#[derive(Default)]
pub struct NullToolsDriver {
    pub invocations: std::cell::RefCell<Vec<(ToolAction, String)>>,
}

impl ToolsDriver for NullToolsDriver {
    fn invoke(&self, action: ToolAction, project: &Project, _options: &ToolOptions) -> Result<()> {
        self.invocations
            .borrow_mut()
            .push((action, project.name.clone()));
        Ok(())
    }
}

/// Spawns an external tool binary and maps a non-zero exit to `BuildError`.
pub fn run_external(program: &Path, args: &[String]) -> Result<()> {
    let status = std::process::Command::new(program)
        .args(args)
        .status()
        .map_err(|source| BuildError::CreateError {
            path: program.to_path_buf(),
            source,
        })?;
    if !status.success() {
        return Err(BuildError::BuildError(format!(
            "{} exited with {:?}",
            program.display(),
            status.code()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::ProjectType;

    #[test]
    fn null_driver_records_invocations() {
        let driver = NullToolsDriver::default();
        let project = Project::new("Foo", ProjectType::Executable);
        driver
            .invoke(ToolAction::Compile, &project, &ToolOptions::default())
            .unwrap();
        assert_eq!(driver.invocations.borrow().len(), 1);
    }

    #[test]
    fn idl_args_include_project_name_and_mappings() {
        let driver = NullToolsDriver::default();
        let project = Project::new("Foo", ProjectType::Executable);
        let args = driver.build_idl_args(&project, &["/Mapping=a=b".to_string()]);
        assert_eq!(args[0], "/Project=Foo");
        assert_eq!(args[1], "/Mapping=a=b");
    }
}
