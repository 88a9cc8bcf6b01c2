//! # cppbld - a portable, self-hosting C++ build driver
//!
//! cppbld reads a textual project-description file describing a tree of
//! interdependent C/C++ projects, builds a dependency graph from it, and
//! orchestrates build-related actions over that graph: compiling embedded
//! message catalogs, generating IDL-derived source, compiling a UI resource
//! format, copying public headers, computing per-project file dependencies,
//! and invoking the platform toolchain in dependency order.
//!
//! ## Module organization
//!
//! - [`graph`] - dependency graph: adjacency matrix, cycle detection, traversal
//! - [`blockparser`] - declarative parser for `KEY= ... END KEY` blocks
//! - [`linespool`] - line reader with encoding detection and macro expansion
//! - [`project`] - in-memory project model
//! - [`projectlist`] - master project file parser, owns every `Project`
//! - [`filedepend`] - miniature preprocessor for `.Depend` generation
//! - [`rescomp`] - `.MsgText` / `.CIDRC` resource compiler
//! - [`facility`] - argument parsing, environment probing, action dispatch
//! - [`tools`] - abstract tools-driver contract

/// Declarative, type-checked parser for named-field blocks.
pub mod blockparser;

/// Typed error kinds shared by every stage of the build driver.
pub mod error;

/// Argument parsing, environment probing, action dispatch.
pub mod facility;

/// Miniature C/C++ preprocessor for per-project file dependencies.
pub mod filedepend;

/// Adjacency-matrix dependency graph with cycle detection and traversal.
pub mod graph;

/// Line reader with encoding detection, CR/LF normalisation, macro expansion.
pub mod linespool;

/// Current-platform naming for project/include-path gating.
pub mod platform;

/// In-memory project model.
pub mod project;

/// Master project file parser and project/graph ownership.
pub mod projectlist;

/// `.MsgText` / `.CIDRC` resource compiler.
pub mod rescomp;

/// Abstract tools-driver contract for compiler/linker/IDL invocation.
pub mod tools;

/// Terminal UI utilities (tables) used for diagnostic output.
pub mod ui;

/// Small shared helpers (content-diff-gated file replace).
pub mod util;
