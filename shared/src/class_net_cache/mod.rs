mod checksum;
mod class_net_cache;
mod error;
mod registry;
mod schema;

pub use checksum::{compare_properties, function_checksum, property_checksum, sort_properties};
pub use class_net_cache::{ClassNetCache, FieldNetCache};
pub use error::ClassNetCacheError;
pub use registry::ClassNetCacheRegistry;
pub use schema::{ClassSchema, FunctionSchema, NestedSchema, NetField, PropertySchema, SchemaProvider, StaticSchema};
