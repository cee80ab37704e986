use crate::error::{MarcusError, Result};
use std::path::{Component, Path, PathBuf};

/// Where an artifact of each type lands under `project_root/docs/` (spec.md
/// §6). Anything not in the table falls back to `artifacts/`.
fn subdirectory_for(artifact_type: &str) -> &'static str {
    match artifact_type {
        "api" => "api",
        "design" => "design",
        "specification" | "spec" => "specification",
        "decision" => "decisions",
        _ => "artifacts",
    }
}

fn has_escaping_component(path: &Path) -> bool {
    path.components()
        .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
}

/// Writes an agent-produced artifact under `project_root/docs/<type>/` and
/// returns the path written. `project_root` must be absolute; `filename`
/// must not escape the artifact directory (spec.md §6 "the core never
/// writes outside the supplied project_root").
pub async fn log_artifact(
    project_root: &Path,
    filename: &str,
    content: &str,
    artifact_type: &str,
) -> Result<PathBuf> {
    if !project_root.is_absolute() {
        return Err(MarcusError::Validation(
            "project_root must be an absolute path".to_string(),
        ));
    }

    let filename_path = Path::new(filename);
    if filename.is_empty() || has_escaping_component(filename_path) {
        return Err(MarcusError::Validation(
            "filename must be relative and cannot escape the artifact directory".to_string(),
        ));
    }

    let dir = project_root.join("docs").join(subdirectory_for(artifact_type));
    tokio::fs::create_dir_all(&dir).await?;

    let path = dir.join(filename_path);
    if !path.starts_with(&dir) {
        return Err(MarcusError::Validation(
            "resolved artifact path escapes its directory".to_string(),
        ));
    }

    tokio::fs::write(&path, content).await?;
    tracing::info!(path = %path.display(), artifact_type, "artifact written");
    Ok(path)
}
