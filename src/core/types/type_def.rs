//! Decoded type and field definitions
//!
//! Both types are immutable once built. A field refers to its declaring type
//! by name only; the catalog resolves the name back to the definition.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a type definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    Class,
    Struct,
    Enum,
    Interface,
}

impl TypeKind {
    /// Decodes the low two bits of a type row's flags column
    pub fn from_flags(flags: u32) -> Self {
        match flags & 0b11 {
            0 => TypeKind::Class,
            1 => TypeKind::Struct,
            2 => TypeKind::Enum,
            _ => TypeKind::Interface,
        }
    }

    /// Encodes the kind into the flags column
    pub fn to_flags(self) -> u32 {
        match self {
            TypeKind::Class => 0,
            TypeKind::Struct => 1,
            TypeKind::Enum => 2,
            TypeKind::Interface => 3,
        }
    }
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TypeKind::Class => "Class",
            TypeKind::Struct => "Struct",
            TypeKind::Enum => "Enum",
            TypeKind::Interface => "Interface",
        };
        f.write_str(name)
    }
}

/// A field of a decoded type
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDefinition {
    name: String,
    declaring_type: String,
    offset: u64,
    offset_hex: String,
    field_type: Option<String>,
    is_static: bool,
    has_value: bool,
}

impl FieldDefinition {
    /// Creates a field; the hexadecimal offset text is derived here and nowhere else
    pub fn new(name: String, declaring_type: String, offset: u64) -> Self {
        FieldDefinition {
            name,
            declaring_type,
            offset,
            offset_hex: format!("0x{:X}", offset),
            field_type: None,
            is_static: false,
            has_value: false,
        }
    }

    pub fn with_field_type(mut self, field_type: Option<String>) -> Self {
        self.field_type = field_type;
        self
    }

    pub fn with_flags(mut self, is_static: bool, has_value: bool) -> Self {
        self.is_static = is_static;
        self.has_value = has_value;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Full name of the declaring type; resolve it with `TypeCatalog::declaring_type`
    pub fn declaring_type(&self) -> &str {
        &self.declaring_type
    }

    /// Byte offset as stored in the field row
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Cached `0x`-prefixed uppercase hex rendering of `offset`
    pub fn offset_hex(&self) -> &str {
        &self.offset_hex
    }

    pub fn field_type(&self) -> Option<&str> {
        self.field_type.as_deref()
    }

    pub fn is_static(&self) -> bool {
        self.is_static
    }

    pub fn has_value(&self) -> bool {
        self.has_value
    }
}

/// A decoded type with its ordered fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeDefinition {
    full_name: String,
    name: String,
    namespace: Option<String>,
    kind: TypeKind,
    parent: Option<String>,
    fields: Vec<FieldDefinition>,
    source_module: String,
}

impl TypeDefinition {
    /// Builds a definition; the full name is `namespace.name` or just `name`
    pub fn new(
        namespace: Option<String>,
        name: String,
        kind: TypeKind,
        source_module: String,
    ) -> Self {
        let full_name = match &namespace {
            Some(ns) if !ns.is_empty() => format!("{}.{}", ns, name),
            _ => name.clone(),
        };
        TypeDefinition {
            full_name,
            name,
            namespace: namespace.filter(|ns| !ns.is_empty()),
            kind,
            parent: None,
            fields: Vec::new(),
            source_module,
        }
    }

    pub fn with_fields(mut self, fields: Vec<FieldDefinition>) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_parent(mut self, parent: Option<String>) -> Self {
        self.parent = parent;
        self
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    /// Full name of the base type, if any
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn fields(&self) -> &[FieldDefinition] {
        &self.fields
    }

    pub fn source_module(&self) -> &str {
        &self.source_module
    }

    /// Case-sensitive exact lookup of a field by name
    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_name_composition() {
        let td = TypeDefinition::new(
            Some("Game.Player".into()),
            "Health".into(),
            TypeKind::Class,
            "Assembly-CSharp".into(),
        );
        assert_eq!(td.full_name(), "Game.Player.Health");
        assert_eq!(td.namespace(), Some("Game.Player"));

        let global = TypeDefinition::new(
            Some(String::new()),
            "Bootstrap".into(),
            TypeKind::Struct,
            "m".into(),
        );
        assert_eq!(global.full_name(), "Bootstrap");
        assert_eq!(global.namespace(), None);
    }

    #[test]
    fn test_offset_hex_is_derived() {
        let field = FieldDefinition::new("m_Health".into(), "Game.Player".into(), 0x1C);
        assert_eq!(field.offset(), 0x1C);
        assert_eq!(field.offset_hex(), "0x1C");

        let zero = FieldDefinition::new("a".into(), "T".into(), 0);
        assert_eq!(zero.offset_hex(), "0x0");
    }

    #[test]
    fn test_field_lookup_is_case_sensitive() {
        let td = TypeDefinition::new(None, "T".into(), TypeKind::Class, "m".into()).with_fields(
            vec![FieldDefinition::new("Value".into(), "T".into(), 8)],
        );
        assert!(td.field("Value").is_some());
        assert!(td.field("value").is_none());
    }

    #[test]
    fn test_kind_flags() {
        for kind in [
            TypeKind::Class,
            TypeKind::Struct,
            TypeKind::Enum,
            TypeKind::Interface,
        ] {
            assert_eq!(TypeKind::from_flags(kind.to_flags()), kind);
        }
        assert_eq!(TypeKind::from_flags(0xFFFF_FFF1), TypeKind::Struct);
        assert_eq!(TypeKind::Interface.to_string(), "Interface");
    }
}
