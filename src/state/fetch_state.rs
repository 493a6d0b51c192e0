/// Download state definitions for tracking a package fetch
///
/// A fetch walks the states in declaration order and may drop to `Failed`
/// from any non-terminal state.
use std::fmt;

/// Represents the current state of a package fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchState {
    // ===== Active States =====
    /// Browser is loading the listing page
    NavigatingToItem,

    /// Waiting for the download trigger to render
    AwaitingDownloadButton,

    /// Download trigger was clicked
    Downloading,

    /// Waiting for the archive to land in the download directory
    AwaitingArtifact,

    /// Extracting the archive next to itself
    Unpacking,

    /// Waiting for the unpacked directory to show up in a listing
    AwaitingDirectory,

    // ===== Terminal States =====
    /// Unpacked directory is ready for analysis
    Done,

    /// Fetch ended with a failure reason
    Failed,
}

impl FetchState {
    /// Returns true if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// The state that follows this one on the success path
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::NavigatingToItem => Some(Self::AwaitingDownloadButton),
            Self::AwaitingDownloadButton => Some(Self::Downloading),
            Self::Downloading => Some(Self::AwaitingArtifact),
            Self::AwaitingArtifact => Some(Self::Unpacking),
            Self::Unpacking => Some(Self::AwaitingDirectory),
            Self::AwaitingDirectory => Some(Self::Done),
            Self::Done | Self::Failed => None,
        }
    }

    /// Returns true if moving from this state to `to` is allowed
    pub fn can_transition_to(&self, to: FetchState) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == Self::Failed || self.next() == Some(to)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NavigatingToItem => "navigating_to_item",
            Self::AwaitingDownloadButton => "awaiting_download_button",
            Self::Downloading => "downloading",
            Self::AwaitingArtifact => "awaiting_artifact",
            Self::Unpacking => "unpacking",
            Self::AwaitingDirectory => "awaiting_directory",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for FetchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
