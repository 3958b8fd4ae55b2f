pub mod feed;
pub mod download;

pub use feed::{Entry, EntryKind};
pub use download::{Artifact, ArtifactKind, DownloadConstraints, SlotStem};
