//! Differences between two catalogs of the same module
//!
//! Typical use is comparing the layout of two builds of one target: types
//! that appeared or vanished, and per-field offset or type changes in the
//! types both builds share.

use super::TypeCatalog;
use crate::core::types::{FieldDefinition, TypeDefinition};
use serde::Serialize;
use std::collections::BTreeMap;

/// Result of `TypeCatalog::compare`; every list is in name order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CatalogDiff {
    pub only_in_first: Vec<String>,
    pub only_in_second: Vec<String>,
    pub modified: Vec<TypeDiff>,
}

impl CatalogDiff {
    pub fn is_empty(&self) -> bool {
        self.only_in_first.is_empty() && self.only_in_second.is_empty() && self.modified.is_empty()
    }
}

/// Changes to one type present in both catalogs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeDiff {
    pub type_name: String,
    /// `(first, second)` when the field counts differ
    pub field_count: Option<(usize, usize)>,
    pub fields_only_in_first: Vec<String>,
    pub fields_only_in_second: Vec<String>,
    pub modified_fields: Vec<FieldDiff>,
}

impl TypeDiff {
    pub fn has_differences(&self) -> bool {
        self.field_count.is_some()
            || !self.fields_only_in_first.is_empty()
            || !self.fields_only_in_second.is_empty()
            || !self.modified_fields.is_empty()
    }
}

/// A field whose offset or type changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDiff {
    pub field_name: String,
    pub offset: (u64, u64),
    pub field_type: (Option<String>, Option<String>),
}

impl FieldDiff {
    pub fn offset_changed(&self) -> bool {
        self.offset.0 != self.offset.1
    }

    pub fn type_changed(&self) -> bool {
        self.field_type.0 != self.field_type.1
    }
}

pub(super) fn compare(first: &TypeCatalog, second: &TypeCatalog) -> CatalogDiff {
    let mut diff = CatalogDiff::default();

    for type_def in first {
        match second.lookup(type_def.full_name()) {
            Ok(other) => {
                let type_diff = compare_types(type_def, other);
                if type_diff.has_differences() {
                    diff.modified.push(type_diff);
                }
            }
            Err(_) => diff.only_in_first.push(type_def.full_name().to_string()),
        }
    }
    diff.only_in_second = second
        .iter()
        .filter(|t| first.lookup(t.full_name()).is_err())
        .map(|t| t.full_name().to_string())
        .collect();

    diff
}

/// Fields by name; repeated names keep the lowest offset
fn fields_by_name(type_def: &TypeDefinition) -> BTreeMap<&str, &FieldDefinition> {
    let mut fields: BTreeMap<&str, &FieldDefinition> = BTreeMap::new();
    for field in type_def.fields() {
        fields
            .entry(field.name())
            .and_modify(|kept| {
                if field.offset() < kept.offset() {
                    *kept = field;
                }
            })
            .or_insert(field);
    }
    fields
}

fn compare_types(first: &TypeDefinition, second: &TypeDefinition) -> TypeDiff {
    let count = (first.fields().len(), second.fields().len());
    let fields1 = fields_by_name(first);
    let fields2 = fields_by_name(second);

    let fields_only_in_first = fields1
        .keys()
        .filter(|name| !fields2.contains_key(*name))
        .map(|name| name.to_string())
        .collect();
    let fields_only_in_second = fields2
        .keys()
        .filter(|name| !fields1.contains_key(*name))
        .map(|name| name.to_string())
        .collect();

    let modified_fields = fields1
        .iter()
        .filter_map(|(name, a)| {
            let b = fields2.get(name)?;
            if a.offset() == b.offset() && a.field_type() == b.field_type() {
                return None;
            }
            Some(FieldDiff {
                field_name: name.to_string(),
                offset: (a.offset(), b.offset()),
                field_type: (
                    a.field_type().map(str::to_string),
                    b.field_type().map(str::to_string),
                ),
            })
        })
        .collect();

    TypeDiff {
        type_name: first.full_name().to_string(),
        field_count: (count.0 != count.1).then_some(count),
        fields_only_in_first,
        fields_only_in_second,
        modified_fields,
    }
}
