use thiserror::Error;

use repnet_serde::SerdeErr;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TagError {
    /// More tags than a net index can address
    #[error("{count} tags do not fit the net index range (max {max})")]
    TooManyTags { count: usize, max: usize },

    /// An index outside the table arrived on the wire
    #[error("Tag net index {index} is outside the table of {len} tags")]
    InvalidNetIndex { index: u32, len: usize },

    /// A replay referenced an index before exporting its name
    #[error("Replay tag index {index} was never exported")]
    UnresolvedExport { index: u32 },

    /// The export header describes an impossible index layout
    #[error("Replay tag export header has {first_segment_bits} first segment bits of {total_bits}")]
    BadExportHeader {
        first_segment_bits: u32,
        total_bits: u32,
    },

    #[error(transparent)]
    Serde(#[from] SerdeErr),
}
