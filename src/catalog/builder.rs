//! Construction of a `TypeCatalog`

use super::{CatalogError, TypeCatalog};
use crate::core::types::TypeDefinition;
use rayon::prelude::*;
use std::collections::HashMap;

/// Collects decoded types; the only way to make a `TypeCatalog`
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    module_name: String,
    types: Vec<TypeDefinition>,
    index: HashMap<String, usize>,
}

impl CatalogBuilder {
    pub fn new(module_name: impl Into<String>) -> Self {
        CatalogBuilder {
            module_name: module_name.into(),
            types: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn with_capacity(module_name: impl Into<String>, capacity: usize) -> Self {
        CatalogBuilder {
            module_name: module_name.into(),
            types: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
        }
    }

    /// Add a type. A name already present is rejected and the first
    /// definition is kept.
    pub fn insert(&mut self, definition: TypeDefinition) -> Result<(), CatalogError> {
        if self.index.contains_key(definition.full_name()) {
            return Err(CatalogError::DuplicateTypeName(
                definition.full_name().to_string(),
            ));
        }
        self.index
            .insert(definition.full_name().to_string(), self.types.len());
        self.types.push(definition);
        Ok(())
    }

    pub fn contains(&self, full_name: &str) -> bool {
        self.index.contains_key(full_name)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Sort by full name and freeze
    pub fn finish(self) -> TypeCatalog {
        let mut types = self.types;
        types.par_sort_unstable_by(|a, b| a.full_name().cmp(b.full_name()));
        let index = types
            .iter()
            .enumerate()
            .map(|(i, t)| (t.full_name().to_string(), i))
            .collect();
        TypeCatalog::from_parts(self.module_name, types, index)
    }
}
