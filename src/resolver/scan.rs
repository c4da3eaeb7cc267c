use std::path::Path;

use super::normalize::AUDIO_EXTENSIONS;

/// Walk `dir` recursively and return every playable file, relative to `dir`,
/// using `/` separators and sorted.
///
/// A missing directory is an empty library, not an error; the folder is often
/// created after the engine is installed. Read failures inside an existing
/// directory are reported.
pub fn scan_audio_files(dir: &Path) -> anyhow::Result<Vec<String>> {
    if !dir.exists() {
        tracing::warn!("audio dir does not exist: {}", dir.display());
        return Ok(Vec::new());
    }

    let mut out = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(path) = stack.pop() {
        let rd = std::fs::read_dir(&path)
            .map_err(|e| anyhow::anyhow!("failed to read_dir({}): {e}", path.display()))?;
        for ent in rd {
            let ent = ent.map_err(|e| anyhow::anyhow!("failed to read_dir entry: {e}"))?;
            let p = ent.path();
            if p.is_dir() {
                stack.push(p);
                continue;
            }
            if !p.is_file() {
                continue;
            }

            let Some(ext) = p.extension().and_then(|e| e.to_str()) else {
                continue;
            };
            let ext_lc = ext.to_ascii_lowercase();
            if !AUDIO_EXTENSIONS.contains(&ext_lc.as_str()) {
                continue;
            }

            let Ok(rel) = p.strip_prefix(dir) else {
                continue;
            };
            let rel = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            out.push(rel);
        }
    }

    out.sort();
    Ok(out)
}
