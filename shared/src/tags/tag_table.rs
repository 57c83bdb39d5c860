use std::collections::HashMap;

use log::{debug, warn};

use repnet_serde::{BitReader, BitWrite};

use super::{
    error::TagError,
    gameplay_tag::GameplayTag,
    packed::{read_tag_net_index_packed, write_tag_net_index_packed},
};

pub type TagNetIndex = u16;

/// Project settings for tag replication.
#[derive(Clone, Debug)]
pub struct TagNetConfig {
    /// Low bits of a net index sent before the "more" bit. Tags whose index
    /// fits cost `first_segment_bits + 1` bits.
    pub first_segment_bits: u32,
    /// Width of a container's tag count. Larger containers are clamped.
    pub num_bits_for_container_size: u32,
    /// Tags moved to the front of the table, in this order, so they get the
    /// smallest indices.
    pub commonly_replicated_tags: Vec<String>,
}

impl Default for TagNetConfig {
    fn default() -> Self {
        Self {
            first_segment_bits: 16,
            num_bits_for_container_size: 6,
            commonly_replicated_tags: Vec::new(),
        }
    }
}

/// Bijection between tag names and compact net indices. Both sides build
/// it from the same tag list and config, so indices agree without being
/// exchanged. The index equal to the tag count means "no tag".
#[derive(Clone, Debug)]
pub struct TagNetIndexTable {
    tags: Vec<GameplayTag>,
    index_of: HashMap<GameplayTag, TagNetIndex>,
    true_bit_num: u32,
    first_segment_bits: u32,
    num_bits_for_container_size: u32,
}

impl TagNetIndexTable {
    pub fn new<'a>(tags: impl IntoIterator<Item = &'a str>, config: &TagNetConfig) -> Result<Self, TagError> {
        let mut sorted: Vec<GameplayTag> = tags
            .into_iter()
            .filter(|name| !name.is_empty())
            .map(GameplayTag::new)
            .collect();
        sorted.sort();
        sorted.dedup();

        let max = usize::from(TagNetIndex::MAX);
        if sorted.len() >= max {
            return Err(TagError::TooManyTags {
                count: sorted.len(),
                max: max - 1,
            });
        }

        let mut front = Vec::new();
        for name in &config.commonly_replicated_tags {
            let tag = GameplayTag::new(name);
            match sorted.iter().position(|existing| *existing == tag) {
                Some(position) => front.push(sorted.remove(position)),
                None => warn!("Commonly replicated tag `{}` is not a known tag", name),
            }
        }
        front.append(&mut sorted);
        let tags = front;

        let index_of = tags
            .iter()
            .enumerate()
            .map(|(index, tag)| (tag.clone(), index as TagNetIndex))
            .collect();

        let invalid = tags.len() as u32;
        let true_bit_num = (u32::BITS - invalid.leading_zeros()).max(1);
        let first_segment_bits = config.first_segment_bits.min(true_bit_num);
        debug!(
            "tag net index table: {} tags, {} bits, first segment {}",
            tags.len(),
            true_bit_num,
            first_segment_bits
        );

        Ok(Self {
            tags,
            index_of,
            true_bit_num,
            first_segment_bits,
            num_bits_for_container_size: config.num_bits_for_container_size,
        })
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn invalid_net_index(&self) -> TagNetIndex {
        self.tags.len() as TagNetIndex
    }

    /// Bits of a flat net index.
    pub fn true_bit_num(&self) -> u32 {
        self.true_bit_num
    }

    pub fn first_segment_bits(&self) -> u32 {
        self.first_segment_bits
    }

    pub fn num_bits_for_container_size(&self) -> u32 {
        self.num_bits_for_container_size
    }

    /// Net index of `tag`, or the invalid index if the table lacks it.
    pub fn net_index(&self, tag: &GameplayTag) -> TagNetIndex {
        self.index_of
            .get(tag)
            .copied()
            .unwrap_or_else(|| self.invalid_net_index())
    }

    pub fn tag(&self, index: TagNetIndex) -> Option<&GameplayTag> {
        self.tags.get(usize::from(index))
    }

    pub fn tags(&self) -> &[GameplayTag] {
        &self.tags
    }

    pub fn write_net_index(&self, writer: &mut dyn BitWrite, index: TagNetIndex) {
        write_tag_net_index_packed(
            writer,
            u32::from(index),
            self.first_segment_bits,
            self.true_bit_num,
        );
    }

    pub fn read_net_index(&self, reader: &mut BitReader) -> Result<TagNetIndex, TagError> {
        let index = read_tag_net_index_packed(reader, self.first_segment_bits, self.true_bit_num)?;
        if index > u32::from(self.invalid_net_index()) {
            return Err(TagError::InvalidNetIndex {
                index,
                len: self.tags.len(),
            });
        }
        Ok(index as TagNetIndex)
    }

    /// Writes one tag. A tag the table does not know goes out as the invalid
    /// index, so the stream stays in sync.
    pub fn write_tag(&self, writer: &mut dyn BitWrite, tag: &GameplayTag) {
        self.write_net_index(writer, self.net_index(tag));
    }

    /// Reads one tag. `None` for the invalid index.
    pub fn read_tag(&self, reader: &mut BitReader) -> Result<Option<GameplayTag>, TagError> {
        let index = self.read_net_index(reader)?;
        Ok(self.tag(index).cloned())
    }
}
