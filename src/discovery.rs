// THEORY:
// Pair discovery turns an input directory into a list of `PairTask`s purely by
// file naming convention. Discovery never opens images and never checks that
// the counterpart exists; a missing counterpart is reported per pair by the
// pipeline as a skip, so it shows up in the batch summary. Tasks are sorted by
// base name so the round-robin partitioning of a batch is reproducible.

use crate::config::BatchConfig;
use crate::error::Result;
use crate::pipeline::{PairTask, PipelineKind};
use std::path::{Path, PathBuf};

/// Base name of a thermal primary (`{base}_Z.JPG` by default).
fn thermal_base<'a>(file_name: &'a str, batch: &BatchConfig) -> Option<&'a str> {
    file_name.strip_suffix(batch.thermal_primary_suffix.as_str())
}

/// Base name of a change "before" frame. Files carrying the after marker are
/// never primaries.
fn change_base<'a>(file_name: &'a str, batch: &BatchConfig) -> Option<&'a str> {
    if file_name.contains(batch.change_after_marker.as_str()) {
        return None;
    }
    file_name.strip_suffix(batch.change_extension.as_str())
}

fn file_names(input_dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(input_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}

/// Every primary in `input_dir` with the path its counterpart must have.
pub fn discover_pairs(
    kind: PipelineKind,
    input_dir: &Path,
    output_dir: &Path,
    batch: &BatchConfig,
) -> Result<Vec<PairTask>> {
    let mut tasks: Vec<PairTask> = file_names(input_dir)?
        .iter()
        .filter_map(|name| {
            let (base, secondary_name) = match kind {
                PipelineKind::Thermal => {
                    let base = thermal_base(name, batch)?;
                    (base, format!("{base}{}", batch.thermal_secondary_suffix))
                }
                PipelineKind::Change => {
                    let base = change_base(name, batch)?;
                    (base, format!("{base}{}{}", batch.change_after_marker, batch.change_extension))
                }
            };
            if base.is_empty() {
                return None;
            }
            Some(PairTask {
                base_name: base.to_string(),
                primary: input_dir.join(name),
                secondary: input_dir.join(secondary_name),
                output_dir: PathBuf::from(output_dir),
            })
        })
        .collect();
    tasks.sort_by(|a, b| a.base_name.cmp(&b.base_name));
    Ok(tasks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, names: &[&str]) {
        for name in names {
            std::fs::write(dir.join(name), b"").unwrap();
        }
    }

    #[test]
    fn thermal_pairs_follow_suffix_convention() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), &["B_Z.JPG", "B_T.JPG", "A_Z.JPG", "A_T.JPG", "C_T.JPG", "notes.txt"]);
        let tasks = discover_pairs(PipelineKind::Thermal, dir.path(), Path::new("out"), &BatchConfig::default()).unwrap();
        let bases: Vec<&str> = tasks.iter().map(|t| t.base_name.as_str()).collect();
        assert_eq!(bases, ["A", "B"]);
        assert_eq!(tasks[0].secondary, dir.path().join("A_T.JPG"));
        assert_eq!(tasks[0].output_dir, PathBuf::from("out"));
    }

    #[test]
    fn change_after_frames_are_never_primaries() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), &["site1.jpg", "site1~2.jpg", "site2.jpg", "site3~2.jpg"]);
        let tasks = discover_pairs(PipelineKind::Change, dir.path(), Path::new("out"), &BatchConfig::default()).unwrap();
        let bases: Vec<&str> = tasks.iter().map(|t| t.base_name.as_str()).collect();
        assert_eq!(bases, ["site1", "site2"]);
        assert_eq!(tasks[1].secondary, dir.path().join("site2~2.jpg"));
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(discover_pairs(PipelineKind::Change, &missing, dir.path(), &BatchConfig::default()).is_err());
    }
}
