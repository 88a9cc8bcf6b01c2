//! Miniature C/C++ preprocessor used purely to extract `#include`
//! relationships for incremental-build dependency tracking. It understands
//! just enough of the preprocessor grammar to gate `#include` behind
//! `#ifdef`/`#ifndef`/`#if defined`/`#else`/`#endif`.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::error::{BuildError, Result};
use crate::linespool::{EmptyMacroContext, LineSpooler};

/// Per-header bookkeeping, cached for the lifetime of one analyser instance
/// so that a header shared by many `.cpp` files is only resolved once.
#[derive(Debug, Clone, Default)]
struct HeaderInfo {
    resolved_path: Option<PathBuf>,
    direct_includes: Vec<IncludeRef>,
    searched: bool,
}

#[derive(Debug, Clone)]
struct IncludeRef {
    name: String,
    angled: bool,
}

/// Where to look for a project's headers, in resolution order.
pub struct IncludeSearchPath {
    pub project_includes: Vec<PathBuf>,
    pub output_includes: Vec<PathBuf>,
}

pub struct FileDependAnalyser {
    cache: HashMap<String, HeaderInfo>,
    defined: HashSet<String>,
}

impl FileDependAnalyser {
    pub fn new(seed_defines: impl IntoIterator<Item = String>) -> Self {
        Self {
            cache: HashMap::new(),
            defined: seed_defines.into_iter().collect(),
        }
    }

    /// Computes the transitive closure of headers reachable from `cpp_path`
    /// and writes one line per unique header to `out`.
    pub fn closure_for_cpp(
        &mut self,
        cpp_path: &Path,
        search: &IncludeSearchPath,
    ) -> Result<Vec<String>> {
        let directs = self.parse_includes(cpp_path, search)?;
        let mut closure = BTreeSet::new();
        let mut stack: Vec<IncludeRef> = directs;
        let mut guard = HashSet::new();

        while let Some(inc) = stack.pop() {
            if !guard.insert(inc.name.clone()) {
                continue;
            }
            let Some(resolved) = self.resolve(&inc, cpp_path.parent(), search) else {
                continue;
            };
            closure.insert(inc.name.clone());
            let nested = self.header_includes(&resolved, search)?;
            for n in nested {
                if !guard.contains(&n.name) {
                    stack.push(n);
                }
            }
        }

        Ok(closure.into_iter().collect())
    }

    fn header_includes(&mut self, path: &Path, search: &IncludeSearchPath) -> Result<Vec<IncludeRef>> {
        let key = path.to_string_lossy().into_owned();
        if let Some(info) = self.cache.get(&key) {
            if info.searched {
                return Ok(info.direct_includes.clone());
            }
        }
        let includes = self.parse_includes(path, search)?;
        let entry = self.cache.entry(key).or_default();
        entry.resolved_path = Some(path.to_path_buf());
        entry.direct_includes = includes.clone();
        entry.searched = true;
        Ok(includes)
    }

    /// Runs the conditional-gated scan of one file, returning its directly
    /// included files (not yet resolved to paths).
    fn parse_includes(&mut self, path: &Path, _search: &IncludeSearchPath) -> Result<Vec<IncludeRef>> {
        let mut spooler = LineSpooler::open(path, false)?;
        spooler.disable_macros();
        let ctx = EmptyMacroContext;

        let mut active_stack: Vec<bool> = Vec::new();
        let mut includes = Vec::new();

        while let Some(line) = spooler.read_line(&ctx)? {
            let trimmed = line.trim();
            let active = active_stack.iter().all(|&b| b);

            if let Some(rest) = trimmed.strip_prefix("#define") {
                if active {
                    self.defined.insert(rest.trim().split_whitespace().next().unwrap_or("").to_string());
                }
            } else if let Some(rest) = trimmed.strip_prefix("#undef") {
                if active {
                    self.defined.remove(rest.trim());
                }
            } else if let Some(rest) = trimmed.strip_prefix("#ifdef") {
                let name = rest.trim();
                active_stack.push(self.defined.contains(name));
            } else if let Some(rest) = trimmed.strip_prefix("#ifndef") {
                let name = rest.trim();
                active_stack.push(!self.defined.contains(name));
            } else if let Some(rest) = trimmed.strip_prefix("#if") {
                let rest = rest.trim();
                if let Some(name) = rest.strip_prefix("defined(").and_then(|s| s.strip_suffix(')')) {
                    active_stack.push(self.defined.contains(name.trim()));
                } else if let Some(name) = rest.strip_prefix("defined ") {
                    active_stack.push(self.defined.contains(name.trim()));
                } else {
                    active_stack.push(false);
                }
            } else if trimmed.starts_with("#else") {
                if let Some(last) = active_stack.last_mut() {
                    *last = !*last;
                }
            } else if trimmed.starts_with("#endif") {
                active_stack.pop();
            } else if let Some(rest) = trimmed.strip_prefix("#include") {
                if active {
                    if let Some(inc) = parse_include_target(rest.trim()) {
                        includes.push(inc);
                    }
                }
            }
        }

        Ok(includes)
    }

    fn resolve(
        &self,
        inc: &IncludeRef,
        current_dir: Option<&Path>,
        search: &IncludeSearchPath,
    ) -> Option<PathBuf> {
        if !inc.angled {
            if let Some(dir) = current_dir {
                let candidate = dir.join(&inc.name);
                if candidate.is_file() {
                    return Some(candidate);
                }
            }
        }
        for dir in search
            .project_includes
            .iter()
            .chain(search.output_includes.iter())
        {
            let candidate = dir.join(&inc.name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        None
    }
}

fn parse_include_target(rest: &str) -> Option<IncludeRef> {
    if let Some(inner) = rest.strip_prefix('"').and_then(|s| s.split('"').next()) {
        return Some(IncludeRef {
            name: inner.to_string(),
            angled: false,
        });
    }
    if let Some(after) = rest.strip_prefix('<') {
        if let Some(inner) = after.split('>').next() {
            return Some(IncludeRef {
                name: inner.to_string(),
                angled: true,
            });
        }
    }
    None
}

/// Writes the `.Depend` artifact: one `cppFile:` header line per `.cpp`,
/// followed by its sorted transitive closure, one header per line.
pub fn write_depend_file(
    out_path: &Path,
    closures: &[(String, Vec<String>)],
) -> Result<()> {
    use std::io::Write;
    let mut out = std::fs::File::create(out_path).map_err(|source| BuildError::CreateError {
        path: out_path.to_path_buf(),
        source,
    })?;
    for (cpp, headers) in closures {
        writeln!(out, "{cpp}:").map_err(|source| BuildError::CreateError {
            path: out_path.to_path_buf(),
            source,
        })?;
        for header in headers {
            writeln!(out, "    {header}").map_err(|source| BuildError::CreateError {
                path: out_path.to_path_buf(),
                source,
            })?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn finds_direct_include_in_same_directory() {
        let dir = tempdir().unwrap();
        std::fs::File::create(dir.path().join("foo.hpp")).unwrap();
        let mut cpp = std::fs::File::create(dir.path().join("main.cpp")).unwrap();
        writeln!(cpp, "#include \"foo.hpp\"").unwrap();

        let mut analyser = FileDependAnalyser::new(Vec::new());
        let search = IncludeSearchPath {
            project_includes: vec![],
            output_includes: vec![],
        };
        let closure = analyser
            .closure_for_cpp(&dir.path().join("main.cpp"), &search)
            .unwrap();
        assert_eq!(closure, vec!["foo.hpp".to_string()]);
    }

    #[test]
    fn ifdef_gates_include() {
        let dir = tempdir().unwrap();
        std::fs::File::create(dir.path().join("a.hpp")).unwrap();
        let mut cpp = std::fs::File::create(dir.path().join("main.cpp")).unwrap();
        writeln!(cpp, "#ifdef NOT_DEFINED").unwrap();
        writeln!(cpp, "#include \"a.hpp\"").unwrap();
        writeln!(cpp, "#endif").unwrap();

        let mut analyser = FileDependAnalyser::new(Vec::new());
        let search = IncludeSearchPath {
            project_includes: vec![],
            output_includes: vec![],
        };
        let closure = analyser
            .closure_for_cpp(&dir.path().join("main.cpp"), &search)
            .unwrap();
        assert!(closure.is_empty());
    }

    #[test]
    fn transitive_includes_are_collected() {
        let dir = tempdir().unwrap();
        std::fs::File::create(dir.path().join("c.hpp")).unwrap();
        let mut b = std::fs::File::create(dir.path().join("b.hpp")).unwrap();
        writeln!(b, "#include \"c.hpp\"").unwrap();
        let mut cpp = std::fs::File::create(dir.path().join("main.cpp")).unwrap();
        writeln!(cpp, "#include \"b.hpp\"").unwrap();

        let mut analyser = FileDependAnalyser::new(Vec::new());
        let search = IncludeSearchPath {
            project_includes: vec![],
            output_includes: vec![],
        };
        let closure = analyser
            .closure_for_cpp(&dir.path().join("main.cpp"), &search)
            .unwrap();
        assert_eq!(closure, vec!["b.hpp".to_string(), "c.hpp".to_string()]);
    }

    #[test]
    fn cyclic_includes_do_not_infinite_loop() {
        let dir = tempdir().unwrap();
        let mut a = std::fs::File::create(dir.path().join("a.hpp")).unwrap();
        writeln!(a, "#include \"b.hpp\"").unwrap();
        let mut b = std::fs::File::create(dir.path().join("b.hpp")).unwrap();
        writeln!(b, "#include \"a.hpp\"").unwrap();
        let mut cpp = std::fs::File::create(dir.path().join("main.cpp")).unwrap();
        writeln!(cpp, "#include \"a.hpp\"").unwrap();

        let mut analyser = FileDependAnalyser::new(Vec::new());
        let search = IncludeSearchPath {
            project_includes: vec![],
            output_includes: vec![],
        };
        let closure = analyser
            .closure_for_cpp(&dir.path().join("main.cpp"), &search)
            .unwrap();
        assert_eq!(closure, vec!["a.hpp".to_string(), "b.hpp".to_string()]);
    }
}
