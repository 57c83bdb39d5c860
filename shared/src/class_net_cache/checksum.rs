use std::cmp::Ordering;

use crc32fast::Hasher;

use super::schema::{FunctionSchema, NestedSchema, PropertySchema};

/// Folds the lower-cased `text` into `checksum`.
fn fold_str(text: &str, checksum: u32) -> u32 {
    let mut hasher = Hasher::new_with_initial(checksum);
    hasher.update(text.to_lowercase().as_bytes());
    hasher.finalize()
}

/// Offset order, ties broken by name.
pub fn compare_properties(a: &PropertySchema, b: &PropertySchema) -> Ordering {
    a.offset
        .cmp(&b.offset)
        .then_with(|| a.name.cmp(&b.name))
}

pub fn sort_properties(properties: &mut [&PropertySchema]) {
    properties.sort_by(|a, b| compare_properties(a, b));
}

/// Checksum of a property's name, type and array dimension. With
/// `include_children`, array elements and struct members (in offset order)
/// are folded in too.
pub fn property_checksum(property: &PropertySchema, checksum: u32, include_children: bool) -> u32 {
    let mut checksum = fold_str(&property.name, checksum);
    checksum = fold_str(&property.cpp_type, checksum);
    checksum = fold_str(&property.array_dim.to_string(), checksum);

    if !include_children {
        return checksum;
    }

    match &property.nested {
        NestedSchema::None => checksum,
        NestedSchema::Array(inner) => property_checksum(inner, checksum, include_children),
        NestedSchema::Struct {
            struct_name,
            fields,
        } => {
            checksum = fold_str(struct_name, checksum);
            let mut members: Vec<&PropertySchema> =
                fields.iter().filter(|field| !field.rep_skip).collect();
            sort_properties(&mut members);
            members
                .into_iter()
                .fold(checksum, |checksum, member| {
                    property_checksum(member, checksum, include_children)
                })
        }
    }
}

/// Checksum of a function's name, flags and parameters, the parameters in
/// offset order.
pub fn function_checksum(function: &FunctionSchema, checksum: u32) -> u32 {
    let mut checksum = fold_str(&function.name, checksum);
    checksum = fold_str(&function.flags.to_string(), checksum);
    let mut params: Vec<&PropertySchema> = function.params.iter().collect();
    sort_properties(&mut params);
    params
        .into_iter()
        .fold(checksum, |checksum, param| property_checksum(param, checksum, true))
}
