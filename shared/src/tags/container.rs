use std::collections::HashSet;

use log::{error, warn};

use repnet_serde::{BitReader, BitWrite};

use super::{error::TagError, gameplay_tag::GameplayTag, tag_table::TagNetIndexTable};

/// Remembers which unknown tags were already reported, so a tag missing
/// from the table is logged once per owner rather than once per send.
#[derive(Default, Debug)]
pub struct TagWarnings {
    warned: HashSet<String>,
}

impl TagWarnings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true the first time `tag` is reported.
    fn report(&mut self, tag: &GameplayTag) -> bool {
        self.warned.insert(tag.name().to_string())
    }
}

/// An ordered set of tags.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GameplayTagContainer {
    tags: Vec<GameplayTag>,
}

impl GameplayTagContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `tag` unless it is invalid or already present.
    pub fn add(&mut self, tag: GameplayTag) {
        if tag.is_valid() && !self.tags.contains(&tag) {
            self.tags.push(tag);
        }
    }

    pub fn remove(&mut self, tag: &GameplayTag) -> bool {
        let before = self.tags.len();
        self.tags.retain(|existing| existing != tag);
        before != self.tags.len()
    }

    /// True if any held tag is `tag` or a descendant of it.
    pub fn has_tag(&self, tag: &GameplayTag) -> bool {
        self.tags.iter().any(|held| held.matches_tag(tag))
    }

    pub fn has_tag_exact(&self, tag: &GameplayTag) -> bool {
        self.tags.contains(tag)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GameplayTag> {
        self.tags.iter()
    }

    pub fn clear(&mut self) {
        self.tags.clear();
    }

    /// Writes the container: one bit set when empty, otherwise the tag count
    /// in the configured width followed by each packed net index. Tags past
    /// the largest count the width can hold are dropped with an error log.
    pub fn net_serialize(&self, writer: &mut dyn BitWrite, table: &TagNetIndexTable, warnings: &mut TagWarnings) {
        if self.tags.is_empty() {
            writer.write_bit(true);
            return;
        }
        writer.write_bit(false);

        let count_bits = table.num_bits_for_container_size();
        let max_count = (1u64 << count_bits) - 1;
        let mut count = self.tags.len() as u64;
        if count > max_count {
            error!(
                "Tag container has {} tags, only {} fit the {} bit count; the rest are not replicated",
                count, max_count, count_bits
            );
            count = max_count;
        }
        writer.write_u32(count as u32, count_bits);

        for tag in self.tags.iter().take(count as usize) {
            let index = table.net_index(tag);
            if index == table.invalid_net_index() && warnings.report(tag) {
                warn!("Tag `{}` is not in the net index table and replicates as no tag", tag);
            }
            table.write_net_index(writer, index);
        }
    }

    /// Reads what `net_serialize` wrote, replacing the current contents.
    /// Invalid indices are skipped.
    pub fn net_deserialize(&mut self, reader: &mut BitReader, table: &TagNetIndexTable) -> Result<(), TagError> {
        self.tags.clear();
        if reader.read_bit()? {
            return Ok(());
        }

        let count = reader.read_u32(table.num_bits_for_container_size())?;
        for _ in 0..count {
            let index = table.read_net_index(reader)?;
            match table.tag(index) {
                Some(tag) => self.add(tag.clone()),
                None => warn!("Received a tag container entry with no tag"),
            }
        }
        Ok(())
    }
}

impl FromIterator<GameplayTag> for GameplayTagContainer {
    fn from_iter<I: IntoIterator<Item = GameplayTag>>(iter: I) -> Self {
        let mut container = Self::new();
        for tag in iter {
            container.add(tag);
        }
        container
    }
}
