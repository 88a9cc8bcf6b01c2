//! Current-platform naming, used by project/include-path gating.

/// The platform directory token used to gate `PROJECT=`/`OPTIONS=`/
/// `INCLUDEPATHS=` blocks and to resolve per-platform sub-directories.
pub fn current_platform_dir() -> &'static str {
    if cfg!(target_os = "windows") {
        "Win32"
    } else if cfg!(target_os = "macos") {
        "MacOS"
    } else {
        "Linux"
    }
}
