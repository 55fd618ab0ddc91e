//! File sets carried in tool payloads and their materialization on disk.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use serde_json::Value;
use tempfile::NamedTempFile;

use crate::core::types::Payload;

/// Relative file name to UTF-8 contents, sorted by name.
pub type FileSet = BTreeMap<String, String>;

/// Read `files` from a tool input.
///
/// An explicit `files` object in the payload wins. Otherwise the files
/// produced by an earlier `code_generate` step are used, so a plan can chain
/// generation into validation or tests without repeating the code.
pub fn files_from_input(input: &Payload) -> Result<FileSet> {
    let source = match input.get("files") {
        Some(files) => files,
        None => match input
            .get("context")
            .and_then(|context| context.get("code_generate"))
            .and_then(|generated| generated.get("files"))
        {
            Some(files) => files,
            None => return Ok(FileSet::new()),
        },
    };
    parse_files(source)
}

fn parse_files(value: &Value) -> Result<FileSet> {
    let object = value
        .as_object()
        .ok_or_else(|| anyhow!("'files' must be an object of name to contents"))?;
    object
        .iter()
        .map(|(name, contents)| {
            let contents = contents
                .as_str()
                .ok_or_else(|| anyhow!("files['{name}'] must be a string"))?;
            Ok((name.clone(), contents.to_string()))
        })
        .collect()
}

/// Validate that `name` is a relative path that stays inside its root.
pub fn safe_relative_path(name: &str) -> Result<PathBuf> {
    let path = Path::new(name);
    if name.trim().is_empty() {
        bail!("empty file name");
    }
    for component in path.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir => bail!("file name '{name}' escapes its directory"),
            Component::RootDir | Component::Prefix(_) => {
                bail!("file name '{name}' must be relative")
            }
        }
    }
    Ok(path.to_path_buf())
}

/// Write every file under `root`, creating parent directories.
pub fn materialize(root: &Path, files: &FileSet) -> Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(files.len());
    for (name, contents) in files {
        let path = root.join(safe_relative_path(name)?);
        write_atomic(&path, contents.as_bytes())?;
        written.push(path);
    }
    Ok(written)
}

/// Write `contents` to a temp file next to `path`, then rename it into place.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let mut tmp = NamedTempFile::new_in(parent)
        .with_context(|| format!("create temp file in {}", parent.display()))?;
    tmp.write_all(contents)
        .with_context(|| format!("write temp file for {}", path.display()))?;
    tmp.persist(path)
        .map_err(|err| err.error)
        .with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}
