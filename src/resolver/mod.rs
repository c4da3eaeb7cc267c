// --- Audio resolver ---------------------------------------------------------
//
// Maps what the show-control device reports (a sequence name, sometimes an
// explicit media file) to an asset in the audio folder. Lookups run against an
// immutable snapshot of the mapping table and the folder listing; the snapshot
// is only rebuilt on an explicit reload so the poll loop never touches disk.

mod normalize;
mod scan;

use std::{collections::HashMap, path::PathBuf, sync::Arc};

use parking_lot::RwLock;
use serde::Serialize;

use crate::mapping::MappingStore;

pub use normalize::{normalize_name, strip_sequence_extension, AUDIO_EXTENSIONS};
pub use scan::scan_audio_files;

#[derive(Debug, Clone)]
struct Asset {
    /// Path relative to the audio dir, `/`-separated.
    path: String,
    file_name: String,
    normalized: String,
}

impl Asset {
    fn new(path: String) -> Self {
        let file_name = path.rsplit('/').next().unwrap_or(&path).to_string();
        let normalized = normalize_name(&file_name);
        Self {
            path,
            file_name,
            normalized,
        }
    }
}

/// Point-in-time view of the mapping table and the on-disk asset list.
#[derive(Debug, Clone, Default)]
pub struct ResolverSnapshot {
    assets: Vec<Asset>,
    mapping: HashMap<String, String>,
}

impl ResolverSnapshot {
    pub fn new(files: Vec<String>, mapping: HashMap<String, String>) -> Self {
        Self {
            assets: files.into_iter().map(Asset::new).collect(),
            mapping,
        }
    }

    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.assets.iter().map(|a| a.path.as_str())
    }

    pub fn file_count(&self) -> usize {
        self.assets.len()
    }

    pub fn mapping_count(&self) -> usize {
        self.mapping.len()
    }

    /// Resolve a sequence to a playable asset.
    ///
    /// Precedence: explicit media name present on disk, then the mapping table
    /// (verbatim, then normalized), then an exact normalized name match, then a
    /// partial normalized match. `None` means "no audio", never an error.
    pub fn resolve(&self, sequence: &str, explicit_media: Option<&str>) -> Option<String> {
        if let Some(media) = explicit_media.map(str::trim).filter(|m| !m.is_empty()) {
            if let Some(asset) = self.find_verbatim(media) {
                return Some(asset.path.clone());
            }
        }

        let sequence = sequence.trim();
        if sequence.is_empty() {
            return None;
        }

        if let Some(mapped) = self.mapped_file(sequence) {
            if let Some(asset) = self.find_verbatim(mapped) {
                return Some(asset.path.clone());
            }
            if let Some(asset) = self.find_exact(&normalize_name(mapped)) {
                return Some(asset.path.clone());
            }
            tracing::debug!("mapping for {sequence:?} points at missing file {mapped:?}");
        }

        let wanted = normalize_name(sequence);
        if wanted.is_empty() {
            return None;
        }
        if let Some(asset) = self.find_exact(&wanted) {
            return Some(asset.path.clone());
        }
        self.find_partial(&wanted).map(|a| a.path.clone())
    }

    fn mapped_file(&self, sequence: &str) -> Option<&str> {
        self.mapping
            .get(sequence)
            .or_else(|| strip_sequence_extension(sequence).and_then(|s| self.mapping.get(s)))
            .map(String::as_str)
    }

    fn find_verbatim(&self, name: &str) -> Option<&Asset> {
        self.assets
            .iter()
            .find(|a| a.path == name)
            .or_else(|| self.assets.iter().find(|a| a.file_name == name))
    }

    fn find_exact(&self, normalized: &str) -> Option<&Asset> {
        if normalized.is_empty() {
            return None;
        }
        self.assets.iter().find(|a| a.normalized == normalized)
    }

    fn find_partial(&self, normalized: &str) -> Option<&Asset> {
        self.assets.iter().find(|a| {
            !a.normalized.is_empty()
                && (a.normalized.contains(normalized) || normalized.contains(a.normalized.as_str()))
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReloadSummary {
    pub files: usize,
    pub mappings: usize,
}

/// Owns the current [`ResolverSnapshot`] and knows how to rebuild it.
pub struct AudioResolver {
    audio_dir: PathBuf,
    store: MappingStore,
    snapshot: RwLock<Arc<ResolverSnapshot>>,
}

impl AudioResolver {
    /// Empty resolver; call [`AudioResolver::reload`] before first use.
    pub fn new(audio_dir: PathBuf, store: MappingStore) -> Self {
        Self {
            audio_dir,
            store,
            snapshot: RwLock::new(Arc::new(ResolverSnapshot::default())),
        }
    }

    pub fn audio_dir(&self) -> &std::path::Path {
        &self.audio_dir
    }

    pub fn store(&self) -> &MappingStore {
        &self.store
    }

    pub fn snapshot(&self) -> Arc<ResolverSnapshot> {
        self.snapshot.read().clone()
    }

    pub fn resolve(&self, sequence: &str, explicit_media: Option<&str>) -> Option<String> {
        self.snapshot().resolve(sequence, explicit_media)
    }

    /// Re-scan the audio folder and re-read the mapping table.
    ///
    /// On failure the previous snapshot stays in place.
    pub async fn reload(&self) -> anyhow::Result<ReloadSummary> {
        let dir = self.audio_dir.clone();
        let files = tokio::task::spawn_blocking(move || scan_audio_files(&dir)).await??;
        let mapping = self.store.load_all().await?;

        let next = ResolverSnapshot::new(files, mapping);
        let summary = ReloadSummary {
            files: next.file_count(),
            mappings: next.mapping_count(),
        };
        *self.snapshot.write() = Arc::new(next);

        tracing::info!(
            "resolver reloaded: {} audio files, {} mappings",
            summary.files,
            summary.mappings
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(files: &[&str], mapping: &[(&str, &str)]) -> ResolverSnapshot {
        ResolverSnapshot::new(
            files.iter().map(|f| f.to_string()).collect(),
            mapping
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn explicit_media_wins_over_mapping_and_name_match() {
        let snap = snapshot(
            &["Carol.mp3", "carol-remix.mp3", "Other.mp3"],
            &[("Carol.seq", "Other.mp3")],
        );
        assert_eq!(
            snap.resolve("Carol.seq", Some("carol-remix.mp3")).as_deref(),
            Some("carol-remix.mp3")
        );
    }

    #[test]
    fn explicit_media_missing_on_disk_falls_through() {
        let snap = snapshot(&["Carol.mp3"], &[]);
        assert_eq!(snap.resolve("Carol.fseq", Some("gone.mp3")).as_deref(), Some("Carol.mp3"));
    }

    #[test]
    fn mapping_is_used_with_and_without_sequence_extension() {
        let snap = snapshot(&["bells.mp3", "Jingle Bells.mp3"], &[("Jingle", "bells.mp3")]);
        assert_eq!(snap.resolve("Jingle", None).as_deref(), Some("bells.mp3"));
        assert_eq!(snap.resolve("Jingle.fseq", None).as_deref(), Some("bells.mp3"));
    }

    #[test]
    fn stale_mapping_value_retries_with_normalized_name() {
        let snap = snapshot(&["Rockin_Around.mp3"], &[("Rock", "rockin' around.MP3")]);
        assert_eq!(snap.resolve("Rock", None).as_deref(), Some("Rockin_Around.mp3"));
    }

    #[test]
    fn exact_normalized_match_beats_partial() {
        let snap = snapshot(&["carol of the bells extended.mp3", "Carol_Of_The_Bells.mp3"], &[]);
        assert_eq!(
            snap.resolve("Carol Of The Bells.fseq", None).as_deref(),
            Some("Carol_Of_The_Bells.mp3")
        );
    }

    #[test]
    fn partial_match_in_either_direction() {
        let snap = snapshot(&["Wizards in Winter (TSO).mp3"], &[]);
        assert_eq!(
            snap.resolve("Wizards in Winter.fseq", None).as_deref(),
            Some("Wizards in Winter (TSO).mp3")
        );

        let snap = snapshot(&["Sandman.mp3"], &[]);
        assert_eq!(snap.resolve("Mr Sandman 2024.fseq", None).as_deref(), Some("Sandman.mp3"));
    }

    #[test]
    fn no_match_is_none() {
        let snap = snapshot(&["carol.mp3"], &[]);
        assert_eq!(snap.resolve("Thriller.fseq", None), None);
        assert_eq!(snap.resolve("", None), None);
        assert_eq!(ResolverSnapshot::default().resolve("anything", Some("x.mp3")), None);
    }

    #[test]
    fn nested_assets_resolve_by_file_name() {
        let snap = snapshot(&["2024/carol.mp3"], &[]);
        assert_eq!(snap.resolve("x", Some("carol.mp3")).as_deref(), Some("2024/carol.mp3"));
        assert_eq!(snap.resolve("Carol.fseq", None).as_deref(), Some("2024/carol.mp3"));
    }

    #[tokio::test]
    async fn reload_picks_up_new_files_and_mappings() {
        let root = std::env::temp_dir().join(format!("showsync-resolver-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&root).unwrap();
        let store = MappingStore::new(root.join("test.db"));
        let resolver = AudioResolver::new(root.clone(), store.clone());

        assert_eq!(resolver.resolve("Intro.fseq", None), None);

        std::fs::write(root.join("welcome.mp3"), b"").unwrap();
        store.upsert("Intro", "welcome.mp3").await.unwrap();

        // Not visible until the reload signal.
        assert_eq!(resolver.resolve("Intro.fseq", None), None);

        let summary = resolver.reload().await.unwrap();
        assert_eq!(summary.files, 1);
        assert_eq!(summary.mappings, 1);
        assert_eq!(resolver.resolve("Intro.fseq", None).as_deref(), Some("welcome.mp3"));

        std::fs::remove_dir_all(&root).unwrap();
    }
}
