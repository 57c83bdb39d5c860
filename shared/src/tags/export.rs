use std::collections::{HashMap, HashSet};

use log::trace;

use repnet_serde::{BitReader, BitWrite};

use super::{
    error::TagError,
    gameplay_tag::GameplayTag,
    packed::{read_tag_net_index_packed, write_tag_net_index_packed},
    tag_table::TagNetIndexTable,
};

const HEADER_FIELD_BITS: u32 = 5;

/// Records tags into a replay stream. The first time a net index appears
/// its name travels with it, so playback never consults the index table of
/// the build doing the playback.
#[derive(Debug)]
pub struct TagExportWriter {
    true_bit_num: u32,
    first_segment_bits: u32,
    invalid_index: u32,
    exported: HashSet<u32>,
}

impl TagExportWriter {
    pub fn new(table: &TagNetIndexTable) -> Self {
        Self {
            true_bit_num: table.true_bit_num(),
            first_segment_bits: table.first_segment_bits(),
            invalid_index: u32::from(table.invalid_net_index()),
            exported: HashSet::new(),
        }
    }

    /// Index layout of the recording table. Written once at the start of
    /// the stream.
    pub fn write_header(&self, writer: &mut dyn BitWrite) {
        writer.write_u32(self.true_bit_num, HEADER_FIELD_BITS);
        writer.write_u32(self.first_segment_bits, HEADER_FIELD_BITS);
        writer.write_u32(self.invalid_index, self.true_bit_num);
    }

    pub fn write_tag(&mut self, writer: &mut dyn BitWrite, table: &TagNetIndexTable, tag: &GameplayTag) {
        let index = u32::from(table.net_index(tag));
        write_tag_net_index_packed(writer, index, self.first_segment_bits, self.true_bit_num);
        if index == self.invalid_index {
            return;
        }

        let first_use = self.exported.insert(index);
        writer.write_bit(first_use);
        if first_use {
            trace!("exporting tag {} as {}", tag, index);
            writer.write_string(tag.name());
        }
    }

    pub fn num_exported(&self) -> usize {
        self.exported.len()
    }
}

/// Plays back what `TagExportWriter` recorded.
#[derive(Debug)]
pub struct TagExportReader {
    true_bit_num: u32,
    first_segment_bits: u32,
    invalid_index: u32,
    exports: HashMap<u32, GameplayTag>,
}

impl TagExportReader {
    pub fn read_header(reader: &mut BitReader) -> Result<Self, TagError> {
        let true_bit_num = reader.read_u32(HEADER_FIELD_BITS)?;
        let first_segment_bits = reader.read_u32(HEADER_FIELD_BITS)?;
        if true_bit_num == 0 || true_bit_num > u16::BITS || first_segment_bits > true_bit_num {
            return Err(TagError::BadExportHeader {
                first_segment_bits,
                total_bits: true_bit_num,
            });
        }
        let invalid_index = reader.read_u32(true_bit_num)?;

        Ok(Self {
            true_bit_num,
            first_segment_bits,
            invalid_index,
            exports: HashMap::new(),
        })
    }

    /// Reads one tag. `None` for a tag the recording side could not index.
    pub fn read_tag(&mut self, reader: &mut BitReader) -> Result<Option<GameplayTag>, TagError> {
        let index = read_tag_net_index_packed(reader, self.first_segment_bits, self.true_bit_num)?;
        if index == self.invalid_index {
            return Ok(None);
        }

        if reader.read_bit()? {
            let tag = GameplayTag::new(&reader.read_string()?);
            self.exports.insert(index, tag.clone());
            return Ok(Some(tag));
        }

        self.exports
            .get(&index)
            .cloned()
            .map(Some)
            .ok_or(TagError::UnresolvedExport { index })
    }
}
