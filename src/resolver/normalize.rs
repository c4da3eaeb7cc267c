/// Extensions the show-control device or the asset folder may carry.
pub const AUDIO_EXTENSIONS: [&str; 7] = ["mp3", "wav", "ogg", "m4a", "flac", "aac", "opus"];
pub const SEQUENCE_EXTENSIONS: [&str; 2] = ["fseq", "seq"];

/// Canonical comparison form of a sequence or asset name.
///
/// Lowercases, drops apostrophes, treats `_` and `-` as spaces, collapses
/// whitespace runs and removes one trailing known audio/sequence extension.
pub fn normalize_name(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    let stem = strip_known_extension(&lowered);

    let mapped: String = stem
        .chars()
        .filter(|c| !matches!(c, '\'' | '\u{2019}' | '`'))
        .map(|c| if c == '_' || c == '-' { ' ' } else { c })
        .collect();

    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Strip a trailing `.fseq` / `.seq` from a sequence identifier, keeping its case.
pub fn strip_sequence_extension(name: &str) -> Option<&str> {
    let (stem, ext) = name.rsplit_once('.')?;
    SEQUENCE_EXTENSIONS
        .iter()
        .any(|e| ext.eq_ignore_ascii_case(e))
        .then_some(stem)
}

fn strip_known_extension(lowered: &str) -> &str {
    match lowered.rsplit_once('.') {
        Some((stem, ext))
            if AUDIO_EXTENSIONS.contains(&ext) || SEQUENCE_EXTENSIONS.contains(&ext) =>
        {
            stem
        }
        _ => lowered,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_punctuation_case_and_extensions() {
        assert_eq!(normalize_name("Carol_of-the  Bells.fseq"), "carol of the bells");
        assert_eq!(normalize_name("Rockin' Around.MP3"), "rockin around");
        assert_eq!(normalize_name("  Feliz__Navidad  "), "feliz navidad");
        assert_eq!(normalize_name("It\u{2019}s Time.mp3"), "its time");
    }

    #[test]
    fn unknown_extension_is_kept() {
        assert_eq!(normalize_name("Mr. Sandman"), "mr. sandman");
        assert_eq!(normalize_name("track.txt"), "track.txt");
    }

    #[test]
    fn strips_only_sequence_extensions() {
        assert_eq!(strip_sequence_extension("Carol.FSEQ"), Some("Carol"));
        assert_eq!(strip_sequence_extension("Carol.seq"), Some("Carol"));
        assert_eq!(strip_sequence_extension("carol.mp3"), None);
        assert_eq!(strip_sequence_extension("Carol"), None);
    }
}
