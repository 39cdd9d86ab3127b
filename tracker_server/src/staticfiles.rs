//! `collect-static`: gather source assets into `STATIC_ROOT`.

use std::fs;
use std::path::Path;

use anyhow::Context;
use walkdir::WalkDir;

use crate::config::StaticConfig;

/// Create the log, media and static root directories.
pub fn ensure_runtime_dirs(statics: &StaticConfig) -> anyhow::Result<()> {
    for dir in statics.runtime_dirs() {
        fs::create_dir_all(dir)
            .with_context(|| format!("creating directory {}", dir.display()))?;
    }
    Ok(())
}

/// Copy every file under each source directory into `static_root`,
/// preserving relative paths. Later source directories win on clashes.
/// Missing source directories are skipped with a warning.
pub fn collect_static(statics: &StaticConfig) -> anyhow::Result<usize> {
    ensure_runtime_dirs(statics)?;

    let mut copied = 0;
    for source in &statics.staticfiles_dirs {
        if !source.is_dir() {
            tracing::warn!(dir = %source.display(), "Static source directory not found, skipping");
            continue;
        }
        copied += copy_tree(source, &statics.static_root)?;
    }

    tracing::info!(
        copied,
        static_root = %statics.static_root.display(),
        "Static files collected"
    );
    Ok(copied)
}

fn copy_tree(source: &Path, destination: &Path) -> anyhow::Result<usize> {
    let mut copied = 0;
    for entry in WalkDir::new(source).follow_links(true) {
        let entry = entry.with_context(|| format!("walking {}", source.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry.path().strip_prefix(source)?;
        let target = destination.join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }
        fs::copy(entry.path(), &target)
            .with_context(|| format!("copying {}", entry.path().display()))?;
        tracing::debug!(file = %relative.display(), "Copied static file");
        copied += 1;
    }
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn layout(root: &Path, sources: &[&str]) -> StaticConfig {
        StaticConfig {
            static_root: root.join("staticfiles"),
            staticfiles_dirs: sources.iter().map(|s| root.join(s)).collect(),
            media_root: root.join("media"),
            log_dir: root.join("logs"),
        }
    }

    fn write(path: PathBuf, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_collect_copies_nested_files() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path().join("assets/css/tracker.css"), "body {}");
        write(tmp.path().join("assets/img/logo.svg"), "<svg/>");

        let statics = layout(tmp.path(), &["assets"]);
        assert_eq!(collect_static(&statics).unwrap(), 2);

        let css = fs::read_to_string(tmp.path().join("staticfiles/css/tracker.css")).unwrap();
        assert_eq!(css, "body {}");
        assert!(tmp.path().join("staticfiles/img/logo.svg").is_file());
        assert!(tmp.path().join("media").is_dir());
        assert!(tmp.path().join("logs").is_dir());
    }

    #[test]
    fn test_later_source_overrides_earlier() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path().join("base/site.css"), "base");
        write(tmp.path().join("theme/site.css"), "theme");

        let statics = layout(tmp.path(), &["base", "theme"]);
        assert_eq!(collect_static(&statics).unwrap(), 2);
        let css = fs::read_to_string(tmp.path().join("staticfiles/site.css")).unwrap();
        assert_eq!(css, "theme");
    }

    #[test]
    fn test_missing_source_is_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let statics = layout(tmp.path(), &["does-not-exist"]);
        assert_eq!(collect_static(&statics).unwrap(), 0);
        assert!(tmp.path().join("staticfiles").is_dir());
    }
}
