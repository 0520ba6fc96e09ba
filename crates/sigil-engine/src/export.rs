use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sigil_contracts::artifact::Artifact;

/// Writes the artifact's image to `dir/{id}.{ext}` and returns the path.
/// The extension follows the image MIME type, `png` when unknown.
pub fn export_artifact(artifact: &Artifact, dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let path = dir.join(format!("{}.{}", artifact.id(), artifact.image().extension()));
    fs::write(&path, artifact.image().bytes())
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}
