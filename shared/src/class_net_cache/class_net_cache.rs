use std::{collections::HashMap, sync::Arc};

use super::schema::NetField;

/// Net index and checksum of one replicated field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldNetCache {
    pub name: String,
    pub field_net_index: u32,
    pub field_checksum: u32,
    pub is_function: bool,
}

/// Net indices and checksums of one class's replicated fields. Indices
/// continue where the superclass's stop, so a field keeps its index in
/// every subclass.
#[derive(Debug)]
pub struct ClassNetCache {
    class_name: String,
    super_cache: Option<Arc<ClassNetCache>>,
    fields_base: u32,
    fields: Vec<FieldNetCache>,
    field_checksum_map: HashMap<u32, usize>,
    class_checksum: u32,
}

impl ClassNetCache {
    pub(crate) fn new(
        class_name: String,
        super_cache: Option<Arc<ClassNetCache>>,
        net_fields: &[NetField],
    ) -> Self {
        let fields_base = super_cache.as_ref().map_or(0, |cache| cache.max_index());
        let fields = net_fields
            .iter()
            .enumerate()
            .map(|(offset, field)| FieldNetCache {
                name: field.name().to_string(),
                field_net_index: fields_base + offset as u32,
                field_checksum: 0,
                is_function: matches!(field, NetField::Function(_)),
            })
            .collect();
        let class_checksum = super_cache.as_ref().map_or(0, |cache| cache.class_checksum);
        Self {
            class_name,
            super_cache,
            fields_base,
            fields,
            field_checksum_map: HashMap::new(),
            class_checksum,
        }
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn super_cache(&self) -> Option<&Arc<ClassNetCache>> {
        self.super_cache.as_ref()
    }

    pub fn fields_base(&self) -> u32 {
        self.fields_base
    }

    /// One past the highest net index of this class.
    pub fn max_index(&self) -> u32 {
        self.fields_base + self.fields.len() as u32
    }

    /// Fields declared by this class itself.
    pub fn fields(&self) -> &[FieldNetCache] {
        &self.fields
    }

    pub fn class_checksum(&self) -> u32 {
        self.class_checksum
    }

    pub(crate) fn set_class_checksum(&mut self, checksum: u32) {
        self.class_checksum = checksum;
    }

    /// Stores `checksum` for the field at `position`. Returns `false` if
    /// another field of this class already has that checksum.
    pub(crate) fn set_field_checksum(&mut self, position: usize, checksum: u32) -> bool {
        let Some(field) = self.fields.get_mut(position) else {
            return true;
        };
        field.field_checksum = checksum;
        self.field_checksum_map.insert(checksum, position).is_none()
    }

    /// Field at `index`, searching up the superclass chain.
    pub fn get_from_index(&self, index: u32) -> Option<&FieldNetCache> {
        let mut cache = self;
        loop {
            if index >= cache.fields_base {
                return cache.fields.get((index - cache.fields_base) as usize);
            }
            cache = cache.super_cache.as_deref()?;
        }
    }

    /// Field with `checksum`, searching up the superclass chain.
    pub fn get_from_checksum(&self, checksum: u32) -> Option<&FieldNetCache> {
        let mut cache = self;
        loop {
            if let Some(position) = cache.field_checksum_map.get(&checksum) {
                return cache.fields.get(*position);
            }
            cache = cache.super_cache.as_deref()?;
        }
    }

    pub fn get_from_name(&self, name: &str) -> Option<&FieldNetCache> {
        let mut cache = self;
        loop {
            if let Some(field) = cache.fields.iter().find(|field| field.name == name) {
                return Some(field);
            }
            cache = cache.super_cache.as_deref()?;
        }
    }
}
