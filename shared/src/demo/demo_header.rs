use bytes::{Buf, BufMut};
use log::{debug, error};

use super::{
    archive::{ArchiveReadExt, ArchiveWriteExt},
    error::DemoHeaderError,
};

pub const NETWORK_DEMO_MAGIC: u32 = 0x2CF5_A13D;

// Demo format versions the reader branches on
pub const HISTORY_EXTRA_VERSION: u32 = 5;
pub const HISTORY_MULTIPLE_LEVELS: u32 = 6;
pub const HISTORY_DELETED_STARTUP_ACTORS: u32 = 8;

pub const NETWORK_DEMO_VERSION: u32 = HISTORY_DELETED_STARTUP_ACTORS;
pub const MIN_NETWORK_DEMO_VERSION: u32 = HISTORY_EXTRA_VERSION;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LevelNameAndTime {
    pub level_name: String,
    /// Demo time the level became current, in milliseconds.
    pub level_change_time_ms: u32,
}

impl LevelNameAndTime {
    pub fn new(level_name: &str, level_change_time_ms: u32) -> Self {
        Self {
            level_name: level_name.to_string(),
            level_change_time_ms,
        }
    }
}

/// Header at the start of every recorded demo stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkDemoHeader {
    pub magic: u32,
    pub version: u32,
    pub network_checksum: u32,
    pub engine_network_protocol_version: u32,
    pub game_network_protocol_version: u32,
    pub changelist: u32,
    pub level_names_and_times: Vec<LevelNameAndTime>,
    /// Opaque strings the game attaches to its recordings.
    pub game_specific_data: Vec<String>,
}

impl Default for NetworkDemoHeader {
    fn default() -> Self {
        Self {
            magic: NETWORK_DEMO_MAGIC,
            version: NETWORK_DEMO_VERSION,
            network_checksum: 0,
            engine_network_protocol_version: 0,
            game_network_protocol_version: 0,
            changelist: 0,
            level_names_and_times: Vec::new(),
            game_specific_data: Vec::new(),
        }
    }
}

impl NetworkDemoHeader {
    /// Writes the header in the layout of `self.version`. Older layouts keep
    /// only what they can express: version 6 drops the level change times,
    /// earlier versions keep the first level name only.
    pub fn write(&self, buf: &mut impl BufMut) {
        buf.put_u32_le(self.magic);
        buf.put_u32_le(self.version);
        buf.put_u32_le(self.network_checksum);
        buf.put_u32_le(self.engine_network_protocol_version);
        buf.put_u32_le(self.game_network_protocol_version);
        buf.put_u32_le(self.changelist);

        if self.version < HISTORY_MULTIPLE_LEVELS {
            let level_name = self
                .level_names_and_times
                .first()
                .map_or("", |level| level.level_name.as_str());
            buf.put_archive_string(level_name);
        } else if self.version == HISTORY_MULTIPLE_LEVELS {
            buf.put_archive_count(self.level_names_and_times.len());
            for level in &self.level_names_and_times {
                buf.put_archive_string(&level.level_name);
            }
        } else {
            buf.put_archive_count(self.level_names_and_times.len());
            for level in &self.level_names_and_times {
                buf.put_archive_string(&level.level_name);
                buf.put_u32_le(level.level_change_time_ms);
            }
        }

        buf.put_archive_count(self.game_specific_data.len());
        for entry in &self.game_specific_data {
            buf.put_archive_string(entry);
        }
    }

    /// Reads a header, rejecting foreign files and versions that cannot be
    /// played back.
    pub fn read(buf: &mut impl Buf) -> Result<Self, DemoHeaderError> {
        let result = Self::read_inner(buf);
        if let Err(err) = &result {
            error!("Failed to read demo header: {}", err);
        }
        result
    }

    fn read_inner(buf: &mut impl Buf) -> Result<Self, DemoHeaderError> {
        let magic = buf.try_get_u32_archive("magic")?;
        if magic != NETWORK_DEMO_MAGIC {
            return Err(DemoHeaderError::BadMagic {
                found: magic,
                expected: NETWORK_DEMO_MAGIC,
            });
        }
        let version = buf.try_get_u32_archive("version")?;
        if version < MIN_NETWORK_DEMO_VERSION {
            return Err(DemoHeaderError::VersionTooOld {
                version,
                min: MIN_NETWORK_DEMO_VERSION,
            });
        }
        if version > NETWORK_DEMO_VERSION {
            return Err(DemoHeaderError::VersionTooNew {
                version,
                max: NETWORK_DEMO_VERSION,
            });
        }

        let network_checksum = buf.try_get_u32_archive("network_checksum")?;
        let engine_network_protocol_version = buf.try_get_u32_archive("engine_network_protocol_version")?;
        let game_network_protocol_version = buf.try_get_u32_archive("game_network_protocol_version")?;
        let changelist = buf.try_get_u32_archive("changelist")?;

        let level_names_and_times = if version < HISTORY_MULTIPLE_LEVELS {
            let level_name = buf.try_get_archive_string("level_name")?;
            vec![LevelNameAndTime::new(&level_name, 0)]
        } else if version == HISTORY_MULTIPLE_LEVELS {
            let count = buf.try_get_archive_count("level_names", 4)?;
            (0..count)
                .map(|_| {
                    buf.try_get_archive_string("level_names")
                        .map(|name| LevelNameAndTime::new(&name, 0))
                })
                .collect::<Result<_, _>>()?
        } else {
            let count = buf.try_get_archive_count("level_names_and_times", 8)?;
            let mut levels = Vec::with_capacity(count);
            for _ in 0..count {
                let level_name = buf.try_get_archive_string("level_names_and_times")?;
                let level_change_time_ms = buf.try_get_u32_archive("level_names_and_times")?;
                levels.push(LevelNameAndTime {
                    level_name,
                    level_change_time_ms,
                });
            }
            levels
        };

        let count = buf.try_get_archive_count("game_specific_data", 4)?;
        let game_specific_data = (0..count)
            .map(|_| buf.try_get_archive_string("game_specific_data"))
            .collect::<Result<_, _>>()?;

        debug!(
            "read demo header version {} with {} levels",
            version,
            level_names_and_times.len()
        );
        Ok(Self {
            magic,
            version,
            network_checksum,
            engine_network_protocol_version,
            game_network_protocol_version,
            changelist,
            level_names_and_times,
            game_specific_data,
        })
    }
}

/// Writes the startup actors deleted before a checkpoint. Demos older than
/// `HISTORY_DELETED_STARTUP_ACTORS` carry no list.
pub fn write_deleted_startup_actors(buf: &mut impl BufMut, version: u32, actors: &[String]) {
    if version < HISTORY_DELETED_STARTUP_ACTORS {
        return;
    }
    buf.put_archive_count(actors.len());
    for actor in actors {
        buf.put_archive_string(actor);
    }
}

pub fn read_deleted_startup_actors(buf: &mut impl Buf, version: u32) -> Result<Vec<String>, DemoHeaderError> {
    if version < HISTORY_DELETED_STARTUP_ACTORS {
        return Ok(Vec::new());
    }
    let count = buf.try_get_archive_count("deleted_startup_actors", 4)?;
    (0..count)
        .map(|_| buf.try_get_archive_string("deleted_startup_actors"))
        .collect()
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::*;

    fn header(version: u32) -> NetworkDemoHeader {
        NetworkDemoHeader {
            version,
            network_checksum: 0xDEAD_BEEF,
            engine_network_protocol_version: 2,
            game_network_protocol_version: 3,
            changelist: 4242,
            level_names_and_times: vec![
                LevelNameAndTime::new("Lobby", 0),
                LevelNameAndTime::new("Arena", 95_000),
            ],
            game_specific_data: vec!["mode=ctf".to_string()],
            ..Default::default()
        }
    }

    fn reread(header: &NetworkDemoHeader) -> Result<NetworkDemoHeader, DemoHeaderError> {
        let mut buf = BytesMut::new();
        header.write(&mut buf);
        NetworkDemoHeader::read(&mut buf.freeze())
    }

    #[test]
    fn current_version_keeps_level_times() {
        let original = header(NETWORK_DEMO_VERSION);
        assert_eq!(reread(&original).unwrap(), original);
    }

    #[test]
    fn version_six_drops_level_times() {
        let read = reread(&header(HISTORY_MULTIPLE_LEVELS)).unwrap();
        assert_eq!(
            read.level_names_and_times,
            vec![LevelNameAndTime::new("Lobby", 0), LevelNameAndTime::new("Arena", 0)]
        );
    }

    #[test]
    fn version_five_keeps_first_level_only() {
        let read = reread(&header(HISTORY_EXTRA_VERSION)).unwrap();
        assert_eq!(read.level_names_and_times, vec![LevelNameAndTime::new("Lobby", 0)]);
    }

    #[test]
    fn old_versions_and_foreign_files_are_rejected() {
        assert!(matches!(
            reread(&header(HISTORY_EXTRA_VERSION - 1)),
            Err(DemoHeaderError::VersionTooOld { version: 4, min: 5 })
        ));

        let mut buf = BytesMut::new();
        buf.put_u32_le(0x1234_5678);
        assert!(matches!(
            NetworkDemoHeader::read(&mut buf.freeze()),
            Err(DemoHeaderError::BadMagic { found: 0x1234_5678, .. })
        ));
    }

    #[test]
    fn truncated_header_reports_field() {
        let mut buf = BytesMut::new();
        header(NETWORK_DEMO_VERSION).write(&mut buf);
        let mut truncated = buf.freeze().slice(..14);

        assert!(matches!(
            NetworkDemoHeader::read(&mut truncated),
            Err(DemoHeaderError::Truncated { field: "engine_network_protocol_version", .. })
        ));
    }

    #[test]
    fn deleted_startup_actors_exist_from_version_eight() {
        let actors = vec!["Door_3".to_string(), "Crate_17".to_string()];

        let mut buf = BytesMut::new();
        write_deleted_startup_actors(&mut buf, HISTORY_DELETED_STARTUP_ACTORS - 1, &actors);
        assert!(buf.is_empty());

        write_deleted_startup_actors(&mut buf, HISTORY_DELETED_STARTUP_ACTORS, &actors);
        let read = read_deleted_startup_actors(&mut buf.freeze(), HISTORY_DELETED_STARTUP_ACTORS).unwrap();
        assert_eq!(read, actors);
    }
}
