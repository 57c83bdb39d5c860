use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DemoHeaderError {
    /// The file does not start with the demo magic
    #[error("Not a demo file: magic {found:#010x}, expected {expected:#010x}")]
    BadMagic { found: u32, expected: u32 },

    /// Recorded by a version too old to play back
    #[error("Demo version {version} is older than the oldest supported version {min}")]
    VersionTooOld { version: u32, min: u32 },

    /// Recorded by a newer build
    #[error("Demo version {version} is newer than this build supports ({max})")]
    VersionTooNew { version: u32, max: u32 },

    /// The archive ended before the header did
    #[error("Demo header truncated reading {field}: {needed} bytes needed, {remaining} left")]
    Truncated {
        field: &'static str,
        needed: usize,
        remaining: usize,
    },

    /// A string has an invalid length or encoding
    #[error("Corrupt string in demo header field {field}")]
    CorruptString { field: &'static str },

    /// An array claims more entries than the archive can hold
    #[error("Demo header field {field} claims {count} entries")]
    CorruptArray { field: &'static str, count: i32 },
}
