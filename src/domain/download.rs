use std::path::PathBuf;

use uuid::Uuid;

/// Extraction limits taken from process configuration, never from the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadConstraints {
    pub max_duration_secs: Option<u64>,
    pub format: Option<String>,
    pub format_sort: Vec<String>,
}

/// Filename stem that identifies one download slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotStem(String);

impl SlotStem {
    /// Fresh, unique stem for a single request.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// True when `stem` has the shape of a generated slot stem.
    pub fn is_slot_stem(stem: &str) -> bool {
        Uuid::parse_str(stem).is_ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for SlotStem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if Self::is_slot_stem(s) {
            Ok(SlotStem(s.to_string()))
        } else {
            Err(format!("Not a slot stem: {}", s))
        }
    }
}

impl std::fmt::Display for SlotStem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Video,
    Thumbnail,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Video => "video",
            ArtifactKind::Thumbnail => "thumbnail",
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A file produced by the extraction backend for a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub kind: ArtifactKind,
}

impl Artifact {
    pub fn new(path: PathBuf, kind: ArtifactKind) -> Self {
        Self { path, kind }
    }
}
