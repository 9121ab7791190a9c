//! Input resolution
//!
//! Turns the configured input entries into the list of sources a run
//! processes. A plain entry is one of:
//! - a file path (kept even if missing, so its pairs report `LOAD_FAILED`)
//! - a directory, scanned recursively for audio files
//! - a pattern with `*` / `?` in its last component
//!
//! Scans never descend into the output directory, so a rerun does not pick
//! up files written by an earlier one. Combined entries become one source
//! each, after the sorted, de-duplicated files.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use log::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::engine::{is_audio_file, AudioBuffer, AudioCodec};
use crate::error::{PipelineError, Result};
use crate::pipeline::config::{CombineMethod, CombinedSpec, InputEntry};

/// Something a run loads audio from
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    File(PathBuf),
    Combined(CombinedSource),
}

impl Source {
    /// Stem used in output file names
    pub fn stem(&self) -> String {
        match self {
            Source::File(path) => path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "output".to_string()),
            Source::Combined(combined) => combined.name.clone(),
        }
    }

    /// How the source appears in the run report
    pub fn label(&self) -> PathBuf {
        match self {
            Source::File(path) => path.clone(),
            Source::Combined(combined) => PathBuf::from(&combined.name),
        }
    }

    /// Files read to produce this source
    pub fn files(&self) -> Vec<&Path> {
        match self {
            Source::File(path) => vec![path.as_path()],
            Source::Combined(combined) => combined
                .mix
                .iter()
                .chain(combined.concat.iter())
                .map(PathBuf::as_path)
                .collect(),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::File(path) => write!(f, "{}", path.display()),
            Source::Combined(combined) => write!(f, "{} (combined)", combined.name),
        }
    }
}

/// A combined entry with its member files resolved
#[derive(Debug, Clone, PartialEq)]
pub struct CombinedSource {
    pub name: String,
    pub mix: Vec<PathBuf>,
    pub concat: Vec<PathBuf>,
    pub combine: CombineMethod,
}

impl CombinedSource {
    fn resolve(spec: &CombinedSpec, base_dir: &Path) -> Self {
        let join = |files: &[String]| -> Vec<PathBuf> {
            files.iter().map(|f| base_dir.join(f)).collect()
        };
        Self {
            name: spec.name.clone(),
            mix: join(&spec.mix),
            concat: join(&spec.concat),
            combine: spec.combine,
        }
    }

    /// Load every member and render the combined audio
    ///
    /// # Errors
    /// The first member that fails to load, or a member whose sample rate
    /// or channel layout cannot be combined with the rest
    pub fn build(&self, codec: &dyn AudioCodec) -> Result<AudioBuffer> {
        let mixed = self.fold(&self.mix, codec, AudioBuffer::overlay)?;
        let joined = self.fold(&self.concat, codec, AudioBuffer::append)?;

        let buffer = match (mixed, joined) {
            (Some(mut mixed), Some(joined)) => {
                let result = match self.combine {
                    CombineMethod::Overlay => mixed.overlay(&joined),
                    CombineMethod::Concatenate => mixed.append(&joined),
                };
                result.map_err(|e| self.member_error(&self.name, e))?;
                mixed
            }
            (Some(only), None) | (None, Some(only)) => only,
            (None, None) => {
                return Err(PipelineError::config(format!(
                    "combined source '{}' lists no files",
                    self.name
                )))
            }
        };

        info!(
            "Built combined source '{}' ({} file(s), {:.0} ms)",
            self.name,
            self.mix.len() + self.concat.len(),
            buffer.duration_ms()
        );
        Ok(buffer)
    }

    fn fold(
        &self,
        files: &[PathBuf],
        codec: &dyn AudioCodec,
        join: fn(&mut AudioBuffer, &AudioBuffer) -> Result<()>,
    ) -> Result<Option<AudioBuffer>> {
        let mut acc: Option<AudioBuffer> = None;
        for file in files {
            let buffer = codec.load(file)?;
            acc = Some(match acc.take() {
                Some(mut acc) => {
                    join(&mut acc, &buffer).map_err(|e| self.member_error(file, e))?;
                    acc
                }
                None => buffer,
            });
        }
        Ok(acc)
    }

    /// Point an in-memory combining error at the member that caused it
    fn member_error(&self, member: impl AsRef<Path>, error: PipelineError) -> PipelineError {
        match error {
            PipelineError::Codec { reason, source, .. } => PipelineError::Codec {
                path: member.as_ref().to_path_buf(),
                reason: format!("cannot combine into '{}': {}", self.name, reason),
                source,
            },
            other => other,
        }
    }
}

/// Resolve input entries against `base_dir`, skipping anything under
/// `output_dir`
///
/// # Errors
/// `Config` if nothing matched at all
pub fn resolve_inputs(
    entries: &[InputEntry],
    base_dir: &Path,
    output_dir: &Path,
) -> Result<Vec<Source>> {
    let excluded = Excluded::new(output_dir);
    let mut files = BTreeSet::new();
    let mut combined = Vec::new();

    for entry in entries {
        let entry = match entry {
            InputEntry::Path(entry) => entry,
            InputEntry::Combined(spec) => {
                combined.push(CombinedSource::resolve(spec, base_dir));
                continue;
            }
        };
        let path = base_dir.join(entry);
        let before = files.len();

        if is_pattern(entry) {
            expand_pattern(&path, &excluded, &mut files)?;
        } else if path.is_dir() {
            scan_directory(&path, &excluded, &mut files);
        } else {
            if !path.exists() {
                warn!("Input {} does not exist", path.display());
            }
            files.insert(path);
        }

        if files.len() == before {
            warn!("Input entry '{}' matched no new files", entry);
        }
    }

    if files.is_empty() && combined.is_empty() {
        return Err(PipelineError::config(format!(
            "no input files matched in {}",
            base_dir.display()
        )));
    }

    debug!(
        "Resolved {} input file(s) and {} combined source(s)",
        files.len(),
        combined.len()
    );
    Ok(files
        .into_iter()
        .map(Source::File)
        .chain(combined.into_iter().map(Source::Combined))
        .collect())
}

/// Lexical form of a path with `.` components dropped and `..` applied
fn normalized(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    out
}

/// Best-effort identity of a file path for equality checks
///
/// Canonical when the file exists, else its canonical parent plus the file
/// name, else the lexical form.
pub fn path_identity(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    match (parent.canonicalize(), path.file_name()) {
        (Ok(parent), Some(name)) => parent.join(name),
        _ => normalized(path),
    }
}

/// The output directory, in both lexical and canonical form
struct Excluded {
    lexical: PathBuf,
    canonical: Option<PathBuf>,
}

impl Excluded {
    fn new(output_dir: &Path) -> Self {
        Self {
            lexical: normalized(output_dir),
            canonical: output_dir.canonicalize().ok(),
        }
    }

    fn contains(&self, path: &Path) -> bool {
        if path.is_absolute() == self.lexical.is_absolute()
            && normalized(path).starts_with(&self.lexical)
        {
            return true;
        }
        match (&self.canonical, path.canonicalize()) {
            (Some(dir), Ok(path)) => path.starts_with(dir),
            _ => false,
        }
    }

    fn keep(&self, entry: &DirEntry) -> bool {
        if entry.file_type().is_dir() && self.contains(entry.path()) {
            debug!("Not scanning output directory {}", entry.path().display());
            return false;
        }
        true
    }
}

fn is_pattern(entry: &str) -> bool {
    entry.contains(['*', '?'])
}

fn scan_directory(dir: &Path, excluded: &Excluded, files: &mut BTreeSet<PathBuf>) {
    if excluded.contains(dir) {
        warn!("Input directory {} is inside the output directory", dir.display());
        return;
    }

    let walker = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_entry(|entry| excluded.keep(entry));
    for entry in walker {
        match entry {
            Ok(entry) if entry.file_type().is_file() && is_audio_file(entry.path()) => {
                files.insert(entry.into_path());
            }
            Ok(_) => {}
            Err(e) => warn!("Skipping unreadable entry under {}: {}", dir.display(), e),
        }
    }
}

fn expand_pattern(path: &Path, excluded: &Excluded, files: &mut BTreeSet<PathBuf>) -> Result<()> {
    let pattern = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            PipelineError::config(format!("invalid input pattern {}", path.display()))
        })?;

    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    if is_pattern(&parent.to_string_lossy()) {
        return Err(PipelineError::config(format!(
            "wildcards are only supported in the file name: {}",
            path.display()
        )));
    }
    if !parent.is_dir() {
        warn!("Pattern directory {} does not exist", parent.display());
        return Ok(());
    }
    if excluded.contains(parent) {
        warn!("Pattern directory {} is inside the output directory", parent.display());
        return Ok(());
    }

    for entry in WalkDir::new(parent).min_depth(1).max_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry under {}: {}", parent.display(), e);
                continue;
            }
        };
        let matched = entry
            .file_name()
            .to_str()
            .map(|name| wildcard_match(pattern, name))
            .unwrap_or(false);
        if matched && entry.file_type().is_file() {
            files.insert(entry.into_path());
        }
    }

    Ok(())
}

/// Match `name` against a pattern where `*` is any run and `?` any single char
pub fn wildcard_match(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();

    let (mut p, mut n) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while n < name.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, n));
                p += 1;
            }
            Some(&c) if c == '?' || c == name[n] => {
                p += 1;
                n += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    n = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use test_case::test_case;

    #[test_case("*.wav", "voice.wav", true)]
    #[test_case("*.wav", "voice.mp3", false)]
    #[test_case("voice_??.wav", "voice_01.wav", true)]
    #[test_case("voice_??.wav", "voice_1.wav", false)]
    #[test_case("*", "", true)]
    #[test_case("a*b*c", "aXXbYYc", true)]
    #[test_case("a*b*c", "aXXbYY", false)]
    fn test_wildcard_match(pattern: &str, name: &str, expected: bool) {
        assert_eq!(wildcard_match(pattern, name), expected);
    }

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"").unwrap();
    }

    fn entries(paths: &[&str]) -> Vec<InputEntry> {
        paths.iter().map(|p| InputEntry::from(*p)).collect()
    }

    fn relative_files(sources: &[Source], root: &Path) -> Vec<PathBuf> {
        sources
            .iter()
            .map(|s| match s {
                Source::File(path) => path.strip_prefix(root).unwrap().to_path_buf(),
                other => panic!("expected a file, got {}", other),
            })
            .collect()
    }

    #[test]
    fn test_resolves_files_dirs_and_patterns() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("a.wav"));
        touch(&dir.path().join("b.wav"));
        touch(&dir.path().join("notes.txt"));
        touch(&dir.path().join("set/c.flac"));
        touch(&dir.path().join("set/deep/d.wav"));
        touch(&dir.path().join("set/readme.md"));

        let sources = resolve_inputs(
            &entries(&["*.wav", "set", "a.wav"]),
            dir.path(),
            &dir.path().join("output"),
        )
        .unwrap();

        assert_eq!(
            relative_files(&sources, dir.path()),
            vec![
                PathBuf::from("a.wav"),
                PathBuf::from("b.wav"),
                PathBuf::from("set/c.flac"),
                PathBuf::from("set/deep/d.wav"),
            ]
        );
    }

    #[test]
    fn test_scans_skip_output_directory() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("voice.wav"));
        touch(&dir.path().join("output/voice_loud.wav"));
        touch(&dir.path().join("output/nested/voice_soft.wav"));

        for output_dir in [dir.path().join("output"), dir.path().join("./output/")] {
            for entry in [".", "output/*.wav"] {
                let found = resolve_inputs(&entries(&[entry, "voice.wav"]), dir.path(), &output_dir)
                    .unwrap();
                assert_eq!(
                    relative_files(&found, dir.path()),
                    vec![PathBuf::from("voice.wav")],
                    "entry {:?}",
                    entry
                );
            }
        }
    }

    #[test]
    fn test_input_dir_inside_output_dir_matches_nothing() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("a.wav"));

        let err = resolve_inputs(&entries(&["."]), dir.path(), dir.path()).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_combined_entries_follow_files() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("z.wav"));

        let combined = CombinedSpec {
            name: "duet".to_string(),
            mix: vec!["a.wav".to_string(), "b.wav".to_string()],
            concat: Vec::new(),
            combine: CombineMethod::Concatenate,
        };
        let sources = resolve_inputs(
            &[InputEntry::Combined(combined), InputEntry::from("z.wav")],
            dir.path(),
            &dir.path().join("output"),
        )
        .unwrap();

        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0], Source::File(dir.path().join("z.wav")));
        assert_eq!(sources[1].stem(), "duet");
        assert_eq!(sources[1].label(), PathBuf::from("duet"));
        let members: Vec<PathBuf> = sources[1].files().iter().map(|p| p.to_path_buf()).collect();
        assert_eq!(members, vec![dir.path().join("a.wav"), dir.path().join("b.wav")]);
    }

    #[test]
    fn test_missing_explicit_file_is_kept() {
        let dir = TempDir::new().unwrap();
        let sources =
            resolve_inputs(&entries(&["ghost.wav"]), dir.path(), &dir.path().join("out")).unwrap();
        assert_eq!(sources, vec![Source::File(dir.path().join("ghost.wav"))]);
    }

    #[test]
    fn test_nothing_matched_is_config_error() {
        let dir = TempDir::new().unwrap();
        let err =
            resolve_inputs(&entries(&["*.wav"]), dir.path(), &dir.path().join("out")).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_wildcard_in_directory_is_rejected() {
        let dir = TempDir::new().unwrap();
        let err =
            resolve_inputs(&entries(&["*/a.wav"]), dir.path(), &dir.path().join("out")).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_path_identity_sees_through_dot_segments() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("a.wav"));
        fs::create_dir(dir.path().join("sub")).unwrap();

        assert_eq!(
            path_identity(&dir.path().join("./a.wav")),
            path_identity(&dir.path().join("sub/../a.wav"))
        );
        // Not yet written
        assert_eq!(
            path_identity(&dir.path().join("./b.wav")),
            path_identity(&dir.path().join("b.wav"))
        );
    }

    #[test]
    fn test_normalized_paths() {
        assert_eq!(normalized(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
        assert_eq!(normalized(Path::new("./out/")), PathBuf::from("out"));
        assert_eq!(normalized(Path::new("../x")), PathBuf::from("../x"));
    }

    /// Codec that serves fixed buffers by file name
    struct MemoryCodec(Vec<(&'static str, AudioBuffer)>);

    impl AudioCodec for MemoryCodec {
        fn load(&self, path: &Path) -> Result<AudioBuffer> {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            self.0
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, b)| b.clone())
                .ok_or_else(|| PipelineError::codec(path, "no such buffer"))
        }

        fn save(&self, _buffer: &AudioBuffer, path: &Path) -> Result<()> {
            Err(PipelineError::codec(path, "read-only"))
        }
    }

    fn constant(value: f32, len: usize) -> AudioBuffer {
        AudioBuffer::from_channels(vec![vec![value; len]], 1000).unwrap()
    }

    fn combined(mix: &[&str], concat: &[&str], combine: CombineMethod) -> CombinedSource {
        let paths =
            |names: &[&str]| -> Vec<PathBuf> { names.iter().map(PathBuf::from).collect() };
        CombinedSource {
            name: "mixdown".to_string(),
            mix: paths(mix),
            concat: paths(concat),
            combine,
        }
    }

    #[test]
    fn test_build_mix_then_concatenate() {
        let codec = MemoryCodec(vec![
            ("bed.wav", constant(0.25, 4)),
            ("voice.wav", constant(0.5, 2)),
            ("outro.wav", constant(0.125, 3)),
        ]);

        let out = combined(&["bed.wav", "voice.wav"], &["outro.wav"], CombineMethod::Concatenate)
            .build(&codec)
            .unwrap();
        assert_eq!(out.channel(0), &[0.75, 0.75, 0.25, 0.25, 0.125, 0.125, 0.125]);

        let layered = combined(&["bed.wav"], &["voice.wav", "outro.wav"], CombineMethod::Overlay)
            .build(&codec)
            .unwrap();
        assert_eq!(layered.channel(0), &[0.75, 0.75, 0.375, 0.375]);
    }

    #[test]
    fn test_build_reports_the_offending_member() {
        let codec = MemoryCodec(vec![
            ("a.wav", constant(0.25, 4)),
            ("fast.wav", AudioBuffer::from_channels(vec![vec![0.5; 4]], 2000).unwrap()),
        ]);

        let err = combined(&[], &["a.wav", "fast.wav"], CombineMethod::Concatenate)
            .build(&codec)
            .unwrap_err();
        match err {
            PipelineError::Codec { path, .. } => assert_eq!(path, PathBuf::from("fast.wav")),
            other => panic!("expected codec error, got {:?}", other),
        }

        let missing = combined(&["a.wav", "gone.wav"], &[], CombineMethod::Overlay)
            .build(&codec)
            .unwrap_err();
        assert_eq!(missing.error_code(), "CODEC_ERROR");
    }
}
