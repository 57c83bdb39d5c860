use std::{collections::HashMap, sync::Arc};

use log::{debug, error};

use super::{
    checksum::{compare_properties, function_checksum, property_checksum},
    class_net_cache::ClassNetCache,
    error::ClassNetCacheError,
    schema::{NetField, PropertySchema, SchemaProvider},
};

/// Lazily built net caches, one per class. A cache is never rebuilt until
/// `clear` is called, which must happen whenever class layouts change.
#[derive(Debug, Default)]
pub struct ClassNetCacheRegistry {
    caches: HashMap<String, Arc<ClassNetCache>>,
}

impl ClassNetCacheRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.caches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.caches.is_empty()
    }

    pub fn clear(&mut self) {
        debug!("clearing {} class net caches", self.caches.len());
        self.caches.clear();
    }

    /// Returns the cache of `class`, building it (and its superclasses'
    /// caches) on first use.
    pub fn get_class_net_cache(
        &mut self,
        provider: &dyn SchemaProvider,
        class: &str,
    ) -> Result<Arc<ClassNetCache>, ClassNetCacheError> {
        self.get_or_build(provider, class, &mut Vec::new())
    }

    fn get_or_build(
        &mut self,
        provider: &dyn SchemaProvider,
        class: &str,
        visiting: &mut Vec<String>,
    ) -> Result<Arc<ClassNetCache>, ClassNetCacheError> {
        if let Some(cache) = self.caches.get(class) {
            return Ok(cache.clone());
        }
        if visiting.iter().any(|name| name == class) {
            return Err(ClassNetCacheError::InheritanceCycle {
                class: class.to_string(),
            });
        }
        let schema = provider
            .class_schema(class)
            .ok_or_else(|| ClassNetCacheError::UnknownClass {
                class: class.to_string(),
            })?;

        visiting.push(class.to_string());
        let super_cache = match &schema.super_class {
            Some(super_class) => Some(self.get_or_build(provider, super_class, visiting)?),
            None => None,
        };
        visiting.pop();

        let mut cache = ClassNetCache::new(class.to_string(), super_cache, &schema.net_fields);

        let mut properties: Vec<(usize, &PropertySchema)> = schema
            .net_fields
            .iter()
            .enumerate()
            .filter_map(|(position, field)| match field {
                NetField::Property(property) => Some((position, property)),
                NetField::Function(_) => None,
            })
            .collect();
        properties.sort_by(|(_, a), (_, b)| compare_properties(a, b));

        let mut class_checksum = cache.class_checksum();
        for (position, property) in properties {
            let field_checksum = property_checksum(property, 0, false);
            if !cache.set_field_checksum(position, field_checksum) {
                error!(
                    "Duplicate field checksum {:#010x} for `{}` in class `{}`",
                    field_checksum, property.name, class
                );
            }
            class_checksum = property_checksum(property, class_checksum, true);
        }
        cache.set_class_checksum(class_checksum);

        for (position, field) in schema.net_fields.iter().enumerate() {
            if let NetField::Function(function) = field {
                let field_checksum = function_checksum(function, 0);
                if !cache.set_field_checksum(position, field_checksum) {
                    error!(
                        "Duplicate field checksum {:#010x} for `{}` in class `{}`",
                        field_checksum, function.name, class
                    );
                }
            }
        }

        debug!(
            "built net cache for `{}`: {} fields from index {}, checksum {:#010x}",
            class,
            cache.fields().len(),
            cache.fields_base(),
            cache.class_checksum()
        );
        let cache = Arc::new(cache);
        self.caches.insert(class.to_string(), cache.clone());
        Ok(cache)
    }
}
