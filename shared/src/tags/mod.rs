mod container;
mod error;
mod export;
mod gameplay_tag;
mod packed;
mod tag_table;

pub use container::{GameplayTagContainer, TagWarnings};
pub use error::TagError;
pub use export::{TagExportReader, TagExportWriter};
pub use gameplay_tag::GameplayTag;
pub use packed::{read_tag_net_index_packed, tag_net_index_packed_bits, write_tag_net_index_packed};
pub use tag_table::{TagNetConfig, TagNetIndex, TagNetIndexTable};
