//! # cppbld CLI entry point
//!
//! Thin wrapper around [`cppbld::facility`]: parse the `/Flag=value`
//! argument vocabulary, load the project description file at the resolved
//! root, and drive the orchestrator for the resolved target.

use std::process::ExitCode;

use colored::Colorize;

use cppbld::facility::{self, Orchestrator};
use cppbld::platform::current_platform_dir;
use cppbld::projectlist::ProjectList;
use cppbld::tools::NullToolsDriver;

#[cfg(windows)]
#[link(name = "kernel32")]
unsafe extern "system" {
    fn SetConsoleOutputCP(wCodePageID: u32) -> i32;
    fn SetConsoleCP(wCodePageID: u32) -> i32;
}

#[cfg(windows)]
fn enable_windows_utf8_console() {
    unsafe {
        SetConsoleOutputCP(65001);
        SetConsoleCP(65001);
    }
}

#[cfg(not(windows))]
fn enable_windows_utf8_console() {}

const PROJECT_LIST_NAME: &str = "ProjectList.txt";

fn main() -> ExitCode {
    enable_windows_utf8_console();

    let argv: Vec<String> = std::env::args().skip(1).collect();
    match run(&argv) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{} {}", "error:".red().bold(), message);
            ExitCode::FAILURE
        }
    }
}

/// Parses arguments, loads the project list rooted at `/RootDir`, and drives
/// the orchestrator for the resolved target. The concrete compiler/linker is
/// never invoked here -- spawning `cl.exe`/`clang++`/`g++` is delegated to a
/// real `ToolsDriver` implementation supplied by the embedding environment;
/// this binary wires up [`NullToolsDriver`] so the full dependency-order
/// pipeline (resource compilation, IDL generation, header copying, file
/// copies) still runs and can be inspected with `/Action=ShowProjDeps` or
/// `/Action=ShowProjSettings`.
fn run(argv: &[String]) -> Result<(), String> {
    let args = facility::parse_args(argv).map_err(|e| e.to_string())?;

    let implicit = facility::implicit_macros(&args);
    let mut list = ProjectList::new();
    let list_path = args.root_dir.join(PROJECT_LIST_NAME);
    list.parse(&list_path, current_platform_dir(), implicit)
        .map_err(|e| e.to_string())?;

    let cwd = std::env::current_dir().map_err(|e| e.to_string())?;
    let target = facility::resolve_target(&args, &list, &cwd);

    let driver = NullToolsDriver::default();
    let mut orchestrator = Orchestrator::new(args, list, &driver);
    orchestrator.run(&target).map_err(|e| e.to_string())
}
