//! JSON result export with archive rotation.

use crate::metrics::TestResult;
use anyhow::{Context, Result};
use std::path::Path;

/// Write the result as pretty-printed JSON named after the test mode
/// (e.g. `results/constant.json`). An existing file for the same mode is
/// rotated into an `archive/` subdirectory with a timestamp suffix.
pub fn export(result: &TestResult, output_dir: &Path, mode: &str) -> Result<()> {
    std::fs::create_dir_all(output_dir).context("create output dir")?;

    let output_path = output_dir.join(format!("{mode}.json"));
    rotate_existing(&output_path).context("rotate existing")?;

    let data = serde_json::to_vec_pretty(result).context("serialize result")?;
    std::fs::write(&output_path, data).context("write result")?;

    Ok(())
}

fn rotate_existing(path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }

    let parent = path.parent().context("output path has no parent")?;
    let archive_dir = parent.join("archive");
    std::fs::create_dir_all(&archive_dir).context("create archive dir")?;

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .context("output path has no file stem")?;
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let archive_path = archive_dir.join(format!("{stem}_{timestamp}.json"));

    std::fs::rename(path, archive_path).context("move old result to archive")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::TestResult;

    #[test]
    fn export_writes_a_mode_named_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = TestResult::default();

        export(&result, dir.path(), "constant").unwrap();

        let path = dir.path().join("constant.json");
        assert!(path.exists());

        let parsed: TestResult =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(parsed.global.throughput.total_requests, 0);
    }

    #[test]
    fn existing_results_are_rotated_to_archive() {
        let dir = tempfile::tempdir().unwrap();
        let result = TestResult::default();

        export(&result, dir.path(), "spike").unwrap();
        export(&result, dir.path(), "spike").unwrap();

        assert!(dir.path().join("spike.json").exists());

        let archive: Vec<_> = std::fs::read_dir(dir.path().join("archive"))
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();
        assert_eq!(archive.len(), 1);
        let archived = archive[0].file_name();
        let name = archived.to_string_lossy();
        assert!(name.starts_with("spike_"), "unexpected archive name {name}");
        assert!(name.ends_with(".json"));
    }

    #[test]
    fn modes_do_not_rotate_each_other() {
        let dir = tempfile::tempdir().unwrap();
        let result = TestResult::default();

        export(&result, dir.path(), "constant").unwrap();
        export(&result, dir.path(), "soak").unwrap();

        assert!(dir.path().join("constant.json").exists());
        assert!(dir.path().join("soak.json").exists());
        assert!(!dir.path().join("archive").exists());
    }
}
