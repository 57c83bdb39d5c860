use std::collections::HashMap;

/// Structural description of one replicated property, as reported by the
/// host's reflection system.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PropertySchema {
    pub name: String,
    /// Type as spelled in the host language, e.g. `float` or `TArray<int32>`.
    pub cpp_type: String,
    pub array_dim: u32,
    /// Memory offset inside the owning class or struct.
    pub offset: u32,
    /// Excluded from struct checksums.
    pub rep_skip: bool,
    pub nested: NestedSchema,
}

/// What a property is built from, for checksum purposes.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum NestedSchema {
    #[default]
    None,
    /// Dynamic array; the inner property describes one element.
    Array(Box<PropertySchema>),
    Struct {
        struct_name: String,
        fields: Vec<PropertySchema>,
    },
}

impl PropertySchema {
    pub fn new(name: &str, cpp_type: &str, offset: u32) -> Self {
        Self {
            name: name.to_string(),
            cpp_type: cpp_type.to_string(),
            array_dim: 1,
            offset,
            rep_skip: false,
            nested: NestedSchema::None,
        }
    }

    pub fn with_array_dim(mut self, array_dim: u32) -> Self {
        self.array_dim = array_dim;
        self
    }

    pub fn with_rep_skip(mut self) -> Self {
        self.rep_skip = true;
        self
    }

    pub fn with_array_inner(mut self, inner: PropertySchema) -> Self {
        self.nested = NestedSchema::Array(Box::new(inner));
        self
    }

    pub fn with_struct(mut self, struct_name: &str, fields: Vec<PropertySchema>) -> Self {
        self.nested = NestedSchema::Struct {
            struct_name: struct_name.to_string(),
            fields,
        };
        self
    }
}

/// A replicated function (remote call).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionSchema {
    pub name: String,
    pub flags: u32,
    /// Parameters, excluding the return value.
    pub params: Vec<PropertySchema>,
}

impl FunctionSchema {
    pub fn new(name: &str, flags: u32, params: Vec<PropertySchema>) -> Self {
        Self {
            name: name.to_string(),
            flags,
            params,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NetField {
    Property(PropertySchema),
    Function(FunctionSchema),
}

impl NetField {
    pub fn name(&self) -> &str {
        match self {
            NetField::Property(property) => &property.name,
            NetField::Function(function) => &function.name,
        }
    }
}

/// The net fields a class declares itself, in declaration order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassSchema {
    pub name: String,
    pub super_class: Option<String>,
    pub net_fields: Vec<NetField>,
}

impl ClassSchema {
    pub fn new(name: &str, super_class: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            super_class: super_class.map(str::to_string),
            net_fields: Vec::new(),
        }
    }

    pub fn with_property(mut self, property: PropertySchema) -> Self {
        self.net_fields.push(NetField::Property(property));
        self
    }

    pub fn with_function(mut self, name: &str, flags: u32, params: Vec<PropertySchema>) -> Self {
        self.net_fields
            .push(NetField::Function(FunctionSchema::new(name, flags, params)));
        self
    }
}

/// Source of class layouts for checksum computation.
pub trait SchemaProvider {
    fn class_schema(&self, class: &str) -> Option<&ClassSchema>;
}

/// A `SchemaProvider` over a fixed set of classes.
#[derive(Clone, Debug, Default)]
pub struct StaticSchema {
    classes: HashMap<String, ClassSchema>,
}

impl StaticSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, class: ClassSchema) {
        self.classes.insert(class.name.clone(), class);
    }

    pub fn with_class(mut self, class: ClassSchema) -> Self {
        self.insert(class);
        self
    }
}

impl SchemaProvider for StaticSchema {
    fn class_schema(&self, class: &str) -> Option<&ClassSchema> {
        self.classes.get(class)
    }
}
