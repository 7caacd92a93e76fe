//! Type catalog
//!
//! The catalog is the immutable result of a scan: every decoded type keyed
//! by full name, plus read-only queries over it. It is built once through
//! `CatalogBuilder` and can then be shared between threads without locking.

pub mod builder;
pub mod diff;
pub mod glob;
pub mod pattern;
pub mod stats;

pub use builder::CatalogBuilder;
pub use diff::{CatalogDiff, FieldDiff, TypeDiff};
pub use glob::GlobPattern;
pub use pattern::NamePattern;
pub use stats::CatalogStats;

use crate::core::types::{FieldDefinition, TypeDefinition, TypeKind};
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;

/// Catalog query and construction errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Type not found: {0}")]
    TypeNotFound(String),

    #[error("Field {field} not found in type {type_name}")]
    FieldNotFound { type_name: String, field: String },

    #[error("Duplicate type name: {0}")]
    DuplicateTypeName(String),

    #[error("Invalid search pattern: {0}")]
    InvalidPattern(String),
}

/// Immutable, name-indexed collection of decoded types
#[derive(Debug, Clone, Serialize)]
pub struct TypeCatalog {
    module_name: String,
    /// Sorted by full name
    types: Vec<TypeDefinition>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

/// A field together with the type declaring it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldHit<'a> {
    pub type_def: &'a TypeDefinition,
    pub field: &'a FieldDefinition,
}

impl TypeCatalog {
    fn from_parts(
        module_name: String,
        types: Vec<TypeDefinition>,
        index: HashMap<String, usize>,
    ) -> Self {
        TypeCatalog {
            module_name,
            types,
            index,
        }
    }

    /// Module the types were decoded from
    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// All types in full-name order
    pub fn iter(&self) -> std::slice::Iter<'_, TypeDefinition> {
        self.types.iter()
    }

    /// Exact lookup by full name
    pub fn lookup(&self, full_name: &str) -> Result<&TypeDefinition, CatalogError> {
        self.index
            .get(full_name)
            .map(|&i| &self.types[i])
            .ok_or_else(|| CatalogError::TypeNotFound(full_name.to_string()))
    }

    /// Types whose full name matches a case-sensitive glob pattern
    pub fn search(&self, pattern: &str) -> Search<'_> {
        self.search_with(GlobPattern::new(pattern))
    }

    /// Types whose full name matches a glob or regex pattern
    pub fn search_with(&self, pattern: impl Into<NamePattern>) -> Search<'_> {
        Search {
            types: self.types.iter(),
            pattern: pattern.into(),
        }
    }

    /// Types whose full name matches a regular expression anywhere
    pub fn search_regex(&self, pattern: &str) -> Result<Search<'_>, CatalogError> {
        Ok(self.search_with(NamePattern::regex(pattern)?))
    }

    /// Field of a type by exact, case-sensitive name
    pub fn get_field(
        &self,
        full_name: &str,
        field_name: &str,
    ) -> Result<&FieldDefinition, CatalogError> {
        self.lookup(full_name)?
            .field(field_name)
            .ok_or_else(|| CatalogError::FieldNotFound {
                type_name: full_name.to_string(),
                field: field_name.to_string(),
            })
    }

    /// The type a field belongs to
    pub fn declaring_type(&self, field: &FieldDefinition) -> Result<&TypeDefinition, CatalogError> {
        self.lookup(field.declaring_type())
    }

    /// Base type of `full_name`; `None` when it has none or the base was not decoded
    pub fn parent_of(&self, full_name: &str) -> Result<Option<&TypeDefinition>, CatalogError> {
        let type_def = self.lookup(full_name)?;
        Ok(type_def
            .parent()
            .and_then(|parent| self.lookup(parent).ok()))
    }

    /// Fields, across all types, whose name matches `pattern`
    pub fn search_fields(&self, pattern: &str) -> Vec<FieldHit<'_>> {
        self.search_fields_with(pattern)
    }

    pub fn search_fields_with(&self, pattern: impl Into<NamePattern>) -> Vec<FieldHit<'_>> {
        let pattern = pattern.into();
        self.field_hits()
            .filter(|hit| pattern.matches(hit.field.name()))
            .collect()
    }

    /// Fields with `min <= offset <= max`, ordered by offset
    pub fn fields_in_offset_range(&self, min: u64, max: u64) -> Vec<FieldHit<'_>> {
        let mut hits: Vec<FieldHit<'_>> = self
            .field_hits()
            .filter(|hit| (min..=max).contains(&hit.field.offset()))
            .collect();
        hits.sort_by_key(|hit| hit.field.offset());
        hits
    }

    pub fn types_by_kind(&self, kind: TypeKind) -> impl Iterator<Item = &TypeDefinition> + '_ {
        self.types.iter().filter(move |t| t.kind() == kind)
    }

    /// Total number of fields over all types
    pub fn field_count(&self) -> usize {
        self.types.iter().map(|t| t.fields().len()).sum()
    }

    /// What changed from `self` to `other`
    pub fn compare(&self, other: &TypeCatalog) -> CatalogDiff {
        diff::compare(self, other)
    }

    pub fn stats(&self) -> CatalogStats {
        stats::collect(self)
    }

    fn field_hits(&self) -> impl Iterator<Item = FieldHit<'_>> + '_ {
        self.types.iter().flat_map(|type_def| {
            type_def
                .fields()
                .iter()
                .map(move |field| FieldHit { type_def, field })
        })
    }
}

impl<'a> IntoIterator for &'a TypeCatalog {
    type Item = &'a TypeDefinition;
    type IntoIter = std::slice::Iter<'a, TypeDefinition>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Lazy result of `TypeCatalog::search`
#[derive(Debug, Clone)]
pub struct Search<'a> {
    types: std::slice::Iter<'a, TypeDefinition>,
    pattern: NamePattern,
}

impl<'a> Search<'a> {
    pub fn pattern(&self) -> &NamePattern {
        &self.pattern
    }
}

impl<'a> Iterator for Search<'a> {
    type Item = &'a TypeDefinition;

    fn next(&mut self) -> Option<Self::Item> {
        let pattern = &self.pattern;
        self.types.find(|t| pattern.matches(t.full_name()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, self.types.size_hint().1)
    }
}

impl std::iter::FusedIterator for Search<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn field(name: &str, owner: &str, offset: u64, field_type: &str) -> FieldDefinition {
        FieldDefinition::new(name.to_string(), owner.to_string(), offset)
            .with_field_type(Some(field_type.to_string()))
    }

    fn sample() -> TypeCatalog {
        let player = TypeDefinition::new(
            Some("Game".to_string()),
            "Player".to_string(),
            TypeKind::Class,
            "Assembly-CSharp".to_string(),
        )
        .with_fields(vec![
            field("m_Health", "Game.Player", 0x18, "System.Single"),
            field("m_Name", "Game.Player", 0x20, "System.String"),
        ]);
        let boss = TypeDefinition::new(
            Some("Game".to_string()),
            "Boss".to_string(),
            TypeKind::Class,
            "Assembly-CSharp".to_string(),
        )
        .with_parent(Some("Game.Player".to_string()))
        .with_fields(vec![field("m_Phase", "Game.Boss", 0x28, "System.Int32")]);
        let orphan = TypeDefinition::new(
            None,
            "Orphan".to_string(),
            TypeKind::Class,
            "Assembly-CSharp".to_string(),
        )
        .with_parent(Some("Missing.Base".to_string()));
        let vector = TypeDefinition::new(
            None,
            "Vector3".to_string(),
            TypeKind::Struct,
            "Assembly-CSharp".to_string(),
        )
        .with_fields(vec![
            field("x", "Vector3", 0, "System.Single"),
            field("y", "Vector3", 4, "System.Single"),
            field("z", "Vector3", 8, "System.Single"),
        ]);

        let mut builder = CatalogBuilder::new("Assembly-CSharp");
        for t in [player, boss, orphan, vector] {
            builder.insert(t).unwrap();
        }
        builder.finish()
    }

    #[test]
    fn test_lookup() {
        let catalog = sample();
        assert_eq!(catalog.len(), 4);
        assert_eq!(catalog.lookup("Game.Player").unwrap().name(), "Player");
        assert_eq!(
            catalog.lookup("Game.Nobody").unwrap_err(),
            CatalogError::TypeNotFound("Game.Nobody".to_string())
        );
        assert!(catalog.lookup("game.player").is_err());
    }

    #[test]
    fn test_search() {
        let catalog = sample();
        assert_eq!(catalog.search("*").count(), catalog.len());
        let game: Vec<&str> = catalog.search("Game.*").map(|t| t.full_name()).collect();
        assert_eq!(game, vec!["Game.Boss", "Game.Player"]);
        assert_eq!(catalog.search("NoSuchPrefix*").count(), 0);
        assert_eq!(catalog.search("game.*").count(), 0);
        assert_eq!(
            catalog
                .search_with(GlobPattern::new("game.*").case_insensitive())
                .count(),
            2
        );
    }

    #[test]
    fn test_regex_search() {
        let catalog = sample();
        let found: Vec<&str> = catalog
            .search_regex(r"^Game\.(Boss|Player)$")
            .unwrap()
            .map(|t| t.full_name())
            .collect();
        assert_eq!(found, vec!["Game.Boss", "Game.Player"]);
        assert_eq!(catalog.search_regex("Vector").unwrap().count(), 1);
        assert!(matches!(
            catalog.search_regex("[unclosed"),
            Err(CatalogError::InvalidPattern(_))
        ));

        let fields = catalog.search_fields_with(NamePattern::regex("^[xyz]$").unwrap());
        assert_eq!(fields.len(), 3);
    }

    #[test]
    fn test_compare_and_stats() {
        let catalog = sample();
        assert!(catalog.compare(&catalog).is_empty());

        let mut builder = CatalogBuilder::new("Assembly-CSharp");
        builder.insert(catalog.lookup("Vector3").unwrap().clone()).unwrap();
        let smaller = builder.finish();
        let diff = catalog.compare(&smaller);
        assert_eq!(diff.only_in_first, vec!["Game.Boss", "Game.Player", "Orphan"]);
        assert!(diff.only_in_second.is_empty());

        let stats = catalog.stats();
        assert_eq!(stats.total_types, 4);
        assert_eq!(stats.total_fields, catalog.field_count());
        assert_eq!(stats.structs, 1);
    }

    #[test]
    fn test_get_field() {
        let catalog = sample();
        let health = catalog.get_field("Game.Player", "m_Health").unwrap();
        assert_eq!(health.offset(), 0x18);
        assert_eq!(health.offset_hex(), "0x18");
        assert_eq!(
            catalog.get_field("Game.Player", "m_health").unwrap_err(),
            CatalogError::FieldNotFound {
                type_name: "Game.Player".to_string(),
                field: "m_health".to_string(),
            }
        );
        assert!(matches!(
            catalog.get_field("Game.Nobody", "m_Health"),
            Err(CatalogError::TypeNotFound(_))
        ));
    }

    #[test]
    fn test_back_references() {
        let catalog = sample();
        let phase = catalog.get_field("Game.Boss", "m_Phase").unwrap();
        assert_eq!(catalog.declaring_type(phase).unwrap().full_name(), "Game.Boss");
        assert_eq!(
            catalog.parent_of("Game.Boss").unwrap().map(|t| t.full_name()),
            Some("Game.Player")
        );
        assert_eq!(catalog.parent_of("Game.Player").unwrap(), None);
        assert_eq!(catalog.parent_of("Orphan").unwrap(), None);
        assert!(catalog.parent_of("Nobody").is_err());
    }

    #[test]
    fn test_field_queries() {
        let catalog = sample();
        let names: Vec<&str> = catalog
            .search_fields("m_*")
            .iter()
            .map(|hit| hit.field.name())
            .collect();
        assert_eq!(names, vec!["m_Phase", "m_Health", "m_Name"]);

        let in_range: Vec<(&str, u64)> = catalog
            .fields_in_offset_range(0x4, 0x20)
            .iter()
            .map(|hit| (hit.type_def.full_name(), hit.field.offset()))
            .collect();
        assert_eq!(
            in_range,
            vec![("Vector3", 4), ("Vector3", 8), ("Game.Player", 0x18), ("Game.Player", 0x20)]
        );
        assert_eq!(catalog.field_count(), 6);
    }

    #[test]
    fn test_types_by_kind() {
        let catalog = sample();
        let structs: Vec<&str> = catalog
            .types_by_kind(TypeKind::Struct)
            .map(|t| t.full_name())
            .collect();
        assert_eq!(structs, vec!["Vector3"]);
        assert_eq!(catalog.types_by_kind(TypeKind::Enum).count(), 0);
    }

    #[test]
    fn test_serializes_types() {
        let catalog = sample();
        let json = serde_json::to_value(&catalog).unwrap();
        assert_eq!(json["module_name"], "Assembly-CSharp");
        assert_eq!(json["types"].as_array().unwrap().len(), 4);
        assert_eq!(json["types"][0]["full_name"], "Game.Boss");
        assert!(json.get("index").is_none());
    }
}
