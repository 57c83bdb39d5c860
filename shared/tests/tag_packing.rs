/// Tests for the packed tag net index codec and tag container serialization

use proptest::prelude::*;

use repnet_shared::{
    read_tag_net_index_packed, tag_net_index_packed_bits, write_tag_net_index_packed, BitReader,
    BitWriter, GameplayTag, GameplayTagContainer, TagError, TagNetConfig, TagNetIndexTable,
    TagWarnings,
};

fn round_trip(value: u32, first_segment_bits: u32, total_bits: u32) -> (u32, u32) {
    let mut writer = BitWriter::unbounded();
    write_tag_net_index_packed(&mut writer, value, first_segment_bits, total_bits);
    let bits = writer.num_bits();
    let data = writer.to_bytes();
    let mut reader = BitReader::with_bits(&data, bits);
    let read = read_tag_net_index_packed(&mut reader, first_segment_bits, total_bits).unwrap();
    assert!(reader.at_end());
    (read, bits)
}

#[test]
fn every_index_round_trips_for_every_segment_split() {
    let total_bits = 10;
    for first_segment_bits in 0..=total_bits {
        for value in 0..(1u32 << total_bits) {
            let (read, bits) = round_trip(value, first_segment_bits, total_bits);
            assert_eq!(read, value, "first segment {}", first_segment_bits);
            assert_eq!(bits, tag_net_index_packed_bits(value, first_segment_bits, total_bits));
        }
    }
}

proptest! {
    #[test]
    fn packed_index_round_trips(total_bits in 1u32..=16, seed in any::<u32>(), split in any::<u32>()) {
        let value = seed & ((1u32 << total_bits) - 1);
        let first_segment_bits = split % (total_bits + 1);

        let (read, bits) = round_trip(value, first_segment_bits, total_bits);
        prop_assert_eq!(read, value);
        prop_assert!(bits <= total_bits + 1);
    }

    #[test]
    fn container_round_trips(picks in proptest::collection::vec(0usize..30, 0..12)) {
        let names: Vec<String> = (0..30).map(|i| format!("Root.Branch{}.Leaf", i)).collect();
        let table = TagNetIndexTable::new(names.iter().map(String::as_str), &TagNetConfig::default()).unwrap();
        let container: GameplayTagContainer = picks.iter().map(|pick| GameplayTag::new(&names[*pick])).collect();

        let mut writer = BitWriter::unbounded();
        container.net_serialize(&mut writer, &table, &mut TagWarnings::new());
        let bits = writer.num_bits();
        let data = writer.to_bytes();
        let mut reader = BitReader::with_bits(&data, bits);
        let mut received = GameplayTagContainer::new();
        received.net_deserialize(&mut reader, &table).unwrap();

        prop_assert_eq!(received, container);
    }
}

#[test]
fn empty_container_is_a_single_set_bit() {
    let table = TagNetIndexTable::new(["A.B"], &TagNetConfig::default()).unwrap();
    let mut writer = BitWriter::unbounded();
    GameplayTagContainer::new().net_serialize(&mut writer, &table, &mut TagWarnings::new());

    assert_eq!(writer.num_bits(), 1);
    let data = writer.to_bytes();
    assert_eq!(data, vec![1]);

    let mut received = GameplayTagContainer::new();
    received.add(GameplayTag::new("A.B"));
    received
        .net_deserialize(&mut BitReader::with_bits(&data, 1), &table)
        .unwrap();
    assert!(received.is_empty());
}

#[test]
fn commonly_replicated_tags_use_the_short_form() {
    let names: Vec<String> = (0..500).map(|i| format!("Tag.N{:03}", i)).collect();
    let config = TagNetConfig {
        first_segment_bits: 2,
        commonly_replicated_tags: vec!["Tag.N499".to_string()],
        ..Default::default()
    };
    let table = TagNetIndexTable::new(names.iter().map(String::as_str), &config).unwrap();

    let mut writer = BitWriter::unbounded();
    table.write_tag(&mut writer, &GameplayTag::new("Tag.N499"));
    assert_eq!(writer.num_bits(), 3);

    let mut writer = BitWriter::unbounded();
    table.write_tag(&mut writer, &GameplayTag::new("Tag.N250"));
    assert_eq!(writer.num_bits(), table.true_bit_num() + 1);
}

#[test]
fn truncated_container_fails_to_read() {
    let table = TagNetIndexTable::new(["A.B", "A.C"], &TagNetConfig::default()).unwrap();
    let data = [0b0000_0100u8];
    let mut received = GameplayTagContainer::new();
    let result = received.net_deserialize(&mut BitReader::with_bits(&data, 7), &table);
    assert!(matches!(result, Err(TagError::Serde(_))));
}
