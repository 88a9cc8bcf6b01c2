//! Resource compiler: drives the `.MsgText` and `.CIDRC` pipelines for one
//! project, gated by an up-to-date (mtime) check.

pub mod cidrc;
pub mod dialog;
pub mod menu;
pub mod msgtext;

use std::collections::HashMap;
use std::path::Path;

use crate::error::Result;

/// Paths involved in compiling one project's resources.
pub struct ResourcePaths<'a> {
    pub msg_text: &'a Path,
    pub cidrc: &'a Path,
    pub catalogue_out: &'a Path,
    pub resource_out: &'a Path,
    pub err_header_out: &'a Path,
    pub msg_header_out: &'a Path,
    pub res_header_out: &'a Path,
    pub res_namespace: &'a str,
}

/// `true` if every target exists and is newer than both sources; `force`
/// always returns `false` (forcing a rebuild).
pub fn up_to_date(sources: &[&Path], targets: &[&Path], force: bool) -> bool {
    if force {
        return false;
    }
    let Some(newest_source) = sources.iter().filter_map(|p| mtime(p)).max() else {
        return false;
    };
    for target in targets {
        match mtime(target) {
            Some(t) if t >= newest_source => continue,
            _ => return false,
        }
    }
    true
}

fn mtime(path: &Path) -> Option<std::time::SystemTime> {
    std::fs::metadata(path).ok()?.modified().ok()
}

/// Runs both sub-pipelines for one project if out of date (or forced),
/// returning `true` if anything was actually regenerated.
pub fn compile_project_resources(paths: &ResourcePaths, force: bool) -> Result<bool> {
    let sources = [paths.msg_text, paths.cidrc];
    let targets = [
        paths.catalogue_out,
        paths.resource_out,
        paths.err_header_out,
        paths.msg_header_out,
        paths.res_header_out,
    ];
    if up_to_date(&sources, &targets, force) {
        return Ok(false);
    }

    let msg_source = msgtext::parse_msgtext(paths.msg_text)?;
    msgtext::write_catalogue(paths.catalogue_out, &msg_source.entries)?;

    let err_entries: Vec<_> = msg_source
        .entries
        .iter()
        .filter(|e| matches!(e.category, msgtext::MsgCategory::Err))
        .collect();
    let msg_entries: Vec<_> = msg_source
        .entries
        .iter()
        .filter(|e| !matches!(e.category, msgtext::MsgCategory::Err))
        .collect();
    msgtext::write_id_header(paths.err_header_out, &msg_source.err_prefix, &err_entries)?;
    msgtext::write_id_header(paths.msg_header_out, &msg_source.msg_prefix, &msg_entries)?;

    let mut msg_ids: HashMap<String, u32> = HashMap::new();
    for entry in &msg_source.entries {
        msg_ids.insert(entry.name.clone(), entry.id);
    }

    let res_source = cidrc::parse_cidrc(paths.cidrc, &msg_ids)?;
    cidrc::write_resource_file(paths.resource_out, &res_source)?;
    let symbols = cidrc::collect_symbols(&res_source);
    cidrc::write_symbol_header(paths.res_header_out, paths.res_namespace, &symbols)?;

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn force_always_reports_out_of_date() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("a.MsgText");
        std::fs::write(&source, "x").unwrap();
        let target = dir.path().join("a.CatMsgs");
        std::fs::write(&target, "y").unwrap();
        assert!(!up_to_date(&[&source], &[&target], true));
    }

    #[test]
    fn missing_target_is_out_of_date() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("a.MsgText");
        std::fs::write(&source, "x").unwrap();
        let target = dir.path().join("missing.CatMsgs");
        assert!(!up_to_date(&[&source], &[&target], false));
    }
}
