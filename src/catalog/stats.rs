//! Summary statistics over a catalog

use super::TypeCatalog;
use crate::core::types::TypeKind;
use serde::Serialize;
use std::collections::HashMap;

/// Namespace prefixes counted as platform rather than game types
const SYSTEM_PREFIXES: [&str; 4] = ["System.", "UnityEngine.", "Microsoft.", "Mono."];

/// Entries kept in each ranked list
const TOP_ENTRIES: usize = 20;

/// Types with more fields than this are listed as complex
const COMPLEX_TYPE_FIELDS: usize = 50;

/// Result of `TypeCatalog::stats`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogStats {
    pub total_types: usize,
    pub classes: usize,
    pub structs: usize,
    pub interfaces: usize,
    pub enums: usize,
    pub total_fields: usize,
    pub static_fields: usize,
    pub constant_fields: usize,
    /// Type with the most fields; ties go to the first name in order
    pub largest_type: Option<(String, usize)>,
    pub average_fields_per_type: f64,
    pub empty_types: Vec<String>,
    /// Types with more than 50 fields, most fields first
    pub complex_types: Vec<(String, usize)>,
    /// Most populated namespaces, `<global>` for types without one
    pub top_namespaces: Vec<(String, usize)>,
    /// Most used field types
    pub common_field_types: Vec<(String, usize)>,
    pub system_types: usize,
    pub user_types: usize,
}

pub(super) fn collect(catalog: &TypeCatalog) -> CatalogStats {
    let mut kinds: HashMap<TypeKind, usize> = HashMap::new();
    let mut namespaces: HashMap<&str, usize> = HashMap::new();
    let mut field_types: HashMap<&str, usize> = HashMap::new();
    let mut largest: Option<(&str, usize)> = None;
    let mut empty_types = Vec::new();
    let mut complex_types = Vec::new();
    let (mut total_fields, mut static_fields, mut constant_fields) = (0, 0, 0);
    let mut system_types = 0;

    for type_def in catalog {
        *kinds.entry(type_def.kind()).or_default() += 1;
        *namespaces
            .entry(type_def.namespace().unwrap_or("<global>"))
            .or_default() += 1;

        let name = type_def.full_name();
        if SYSTEM_PREFIXES.iter().any(|prefix| name.starts_with(prefix)) {
            system_types += 1;
        }

        let fields = type_def.fields();
        if fields.is_empty() {
            empty_types.push(name.to_string());
        }
        if fields.len() > COMPLEX_TYPE_FIELDS {
            complex_types.push((name.to_string(), fields.len()));
        }
        if largest.map_or(true, |(_, most)| fields.len() > most) {
            largest = Some((name, fields.len()));
        }

        total_fields += fields.len();
        for field in fields {
            if field.is_static() {
                static_fields += 1;
            }
            if field.has_value() {
                constant_fields += 1;
            }
            if let Some(field_type) = field.field_type() {
                *field_types.entry(field_type).or_default() += 1;
            }
        }
    }

    complex_types.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    let total_types = catalog.len();
    let kind_count = |kind| kinds.get(&kind).copied().unwrap_or(0);

    CatalogStats {
        total_types,
        classes: kind_count(TypeKind::Class),
        structs: kind_count(TypeKind::Struct),
        interfaces: kind_count(TypeKind::Interface),
        enums: kind_count(TypeKind::Enum),
        total_fields,
        static_fields,
        constant_fields,
        largest_type: largest.map(|(name, count)| (name.to_string(), count)),
        average_fields_per_type: if total_types == 0 {
            0.0
        } else {
            total_fields as f64 / total_types as f64
        },
        empty_types,
        complex_types,
        top_namespaces: ranked(namespaces),
        common_field_types: ranked(field_types),
        system_types,
        user_types: total_types - system_types,
    }
}

/// Highest counts first, names breaking ties
fn ranked(counts: HashMap<&str, usize>) -> Vec<(String, usize)> {
    let mut entries: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(name, count)| (name.to_string(), count))
        .collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    entries.truncate(TOP_ENTRIES);
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogBuilder;
    use crate::core::types::{FieldDefinition, TypeDefinition};
    use pretty_assertions::assert_eq;

    fn def(namespace: &str, name: &str, kind: TypeKind, fields: usize) -> TypeDefinition {
        let ns = Some(namespace.to_string()).filter(|n| !n.is_empty());
        let def = TypeDefinition::new(ns, name.to_string(), kind, "A".to_string());
        let owner = def.full_name().to_string();
        let fields = (0..fields)
            .map(|i| {
                FieldDefinition::new(format!("f{}", i), owner.clone(), i as u64 * 4)
                    .with_field_type(Some("System.Int32".to_string()))
            })
            .collect();
        def.with_fields(fields)
    }

    #[test]
    fn test_empty_catalog() {
        let stats = collect(&CatalogBuilder::new("A").finish());
        assert_eq!(stats.total_types, 0);
        assert_eq!(stats.average_fields_per_type, 0.0);
        assert_eq!(stats.largest_type, None);
        assert!(stats.top_namespaces.is_empty());
    }

    #[test]
    fn test_counts() {
        let mut builder = CatalogBuilder::new("A");
        let team = def("Game", "Team", TypeKind::Enum, 1).with_fields(vec![
            FieldDefinition::new("value__".to_string(), "Game.Team".to_string(), 0)
                .with_field_type(Some("System.Int32".to_string())),
            FieldDefinition::new("Red".to_string(), "Game.Team".to_string(), 0)
                .with_field_type(Some("Game.Team".to_string()))
                .with_flags(true, true),
        ]);
        for t in [
            def("Game", "Player", TypeKind::Class, 3),
            def("Game", "Boss", TypeKind::Class, 3),
            def("UnityEngine", "Vector3", TypeKind::Struct, 3),
            def("", "IDamageable", TypeKind::Interface, 0),
            def("Game", "Huge", TypeKind::Class, 51),
            team,
        ] {
            builder.insert(t).unwrap();
        }
        let stats = collect(&builder.finish());

        assert_eq!(stats.total_types, 6);
        assert_eq!((stats.classes, stats.structs, stats.interfaces, stats.enums), (3, 1, 1, 1));
        assert_eq!(stats.total_fields, 62);
        assert_eq!(stats.static_fields, 1);
        assert_eq!(stats.constant_fields, 1);
        assert_eq!(stats.largest_type, Some(("Game.Huge".to_string(), 51)));
        assert_eq!(stats.complex_types, vec![("Game.Huge".to_string(), 51)]);
        assert_eq!(stats.empty_types, vec!["IDamageable".to_string()]);
        assert_eq!(stats.system_types, 1);
        assert_eq!(stats.user_types, 5);
        assert_eq!(
            stats.top_namespaces,
            vec![
                ("Game".to_string(), 4),
                ("<global>".to_string(), 1),
                ("UnityEngine".to_string(), 1),
            ]
        );
        assert_eq!(stats.common_field_types[0], ("System.Int32".to_string(), 61));
        assert!((stats.average_fields_per_type - 62.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_largest_tie_goes_to_first_name() {
        let mut builder = CatalogBuilder::new("A");
        builder.insert(def("B", "T", TypeKind::Class, 2)).unwrap();
        builder.insert(def("A", "T", TypeKind::Class, 2)).unwrap();
        let stats = collect(&builder.finish());
        assert_eq!(stats.largest_type, Some(("A.T".to_string(), 2)));
    }
}
