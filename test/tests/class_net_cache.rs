/// Tests for the class net caches owned by the net driver
/// Covers cache reuse, clearing and independence of separate drivers

use std::sync::Arc;

use repnet_server::{DriverError, NetDriver, NetDriverConfig};
use repnet_shared::{ClassNetCacheError, ClassSchema, PropertySchema, StaticSchema};

fn schema() -> StaticSchema {
    StaticSchema::new()
        .with_class(
            ClassSchema::new("Actor", None)
                .with_property(PropertySchema::new("bReplicateMovement", "bool", 8))
                .with_property(PropertySchema::new("Role", "uint8", 9)),
        )
        .with_class(
            ClassSchema::new("Pawn", Some("Actor"))
                .with_property(PropertySchema::new("Health", "float", 40))
                .with_function("ClientRestart", 0x0100_0000, Vec::new()),
        )
}

#[test]
fn cache_is_built_once_per_driver() {
    let mut driver = NetDriver::new(NetDriverConfig::default());
    let schema = schema();

    let first = driver.class_net_cache(&schema, "Pawn").unwrap();
    let second = driver.class_net_cache(&schema, "Pawn").unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.fields_base(), 2);
    assert_eq!(first.max_index(), 4);
}

#[test]
fn cleared_cache_rebuilds_with_the_same_checksum() {
    let mut driver = NetDriver::new(NetDriverConfig::default());
    let schema = schema();
    let before = driver.class_net_cache(&schema, "Pawn").unwrap();

    driver.clear_class_net_cache();
    let after = driver.class_net_cache(&schema, "Pawn").unwrap();

    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(before.class_checksum(), after.class_checksum());
}

#[test]
fn separate_drivers_agree_on_checksums() {
    let mut server = NetDriver::new(NetDriverConfig::default());
    let mut recorder = NetDriver::new(NetDriverConfig::default());
    let schema = schema();

    let server_pawn = server.class_net_cache(&schema, "Pawn").unwrap();
    let recorder_pawn = recorder.class_net_cache(&schema, "Pawn").unwrap();

    assert_eq!(server_pawn.class_checksum(), recorder_pawn.class_checksum());
    assert_eq!(server_pawn.fields(), recorder_pawn.fields());
}

#[test]
fn unknown_class_is_an_error() {
    let mut driver = NetDriver::new(NetDriverConfig::default());
    let result = driver.class_net_cache(&schema(), "Vehicle");
    assert!(matches!(
        result,
        Err(DriverError::ClassNetCache(ClassNetCacheError::UnknownClass { .. }))
    ));
}

fn shuffled_schema(reverse: bool) -> StaticSchema {
    let mut actor = vec![
        PropertySchema::new("bReplicateMovement", "bool", 8),
        PropertySchema::new("Role", "uint8", 9),
        PropertySchema::new("Owner", "AActor*", 16),
    ];
    let mut pawn = vec![
        PropertySchema::new("Health", "float", 40),
        PropertySchema::new("Controller", "AController*", 48),
    ];
    if reverse {
        actor.reverse();
        pawn.reverse();
    }
    let actor = actor
        .into_iter()
        .fold(ClassSchema::new("Actor", None), ClassSchema::with_property);
    let pawn = pawn
        .into_iter()
        .fold(ClassSchema::new("Pawn", Some("Actor")), ClassSchema::with_property);
    StaticSchema::new().with_class(actor).with_class(pawn)
}

#[test]
fn declaration_order_does_not_change_class_checksums() {
    let mut declared = NetDriver::new(NetDriverConfig::default());
    let mut reversed = NetDriver::new(NetDriverConfig::default());
    let declared_schema = shuffled_schema(false);
    let reversed_schema = shuffled_schema(true);

    let declared_pawn = declared.class_net_cache(&declared_schema, "Pawn").unwrap();
    let reversed_pawn = reversed.class_net_cache(&reversed_schema, "Pawn").unwrap();

    assert_eq!(declared_pawn.class_checksum(), reversed_pawn.class_checksum());
    let declared_actor = declared_pawn.super_cache().unwrap();
    let reversed_actor = reversed_pawn.super_cache().unwrap();
    assert_eq!(declared_actor.class_checksum(), reversed_actor.class_checksum());
    assert_ne!(declared_pawn.class_checksum(), declared_actor.class_checksum());

    for name in ["Owner", "Health", "Controller"] {
        let declared_field = declared_pawn.get_from_name(name).unwrap();
        let reversed_field = reversed_pawn.get_from_name(name).unwrap();
        assert_eq!(declared_field.field_checksum, reversed_field.field_checksum, "{}", name);
    }
}

#[test]
fn super_class_layout_feeds_the_subclass_checksum() {
    let mut driver = NetDriver::new(NetDriverConfig::default());
    let base = driver.class_net_cache(&shuffled_schema(false), "Pawn").unwrap();

    let mut changed_schema = shuffled_schema(false);
    changed_schema.insert(
        ClassSchema::new("Actor", None)
            .with_property(PropertySchema::new("bReplicateMovement", "bool", 8))
            .with_property(PropertySchema::new("Role", "uint8", 9))
            .with_property(PropertySchema::new("Owner", "AActor*", 16))
            .with_property(PropertySchema::new("Instigator", "APawn*", 24)),
    );
    driver.clear_class_net_cache();
    let changed = driver.class_net_cache(&changed_schema, "Pawn").unwrap();

    assert_ne!(base.class_checksum(), changed.class_checksum());
    assert_eq!(changed.fields_base(), 4);
}
