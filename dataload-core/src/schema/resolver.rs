// dataload-core/src/schema/resolver.rs

//! Column selection and name de-duplication.

use std::collections::HashSet;

use crate::error::{ReaderError, Result};

/// Filters applied to the raw header before any renaming.
///
/// An empty set does not filter. When both sets are non-empty a column must
/// be listed in both to be kept.
#[derive(Debug, Clone, Default)]
pub struct ColumnSelection {
    pub names: HashSet<String>,
    pub indices: HashSet<usize>,
}

impl ColumnSelection {
    pub fn keeps(&self, index: usize, name: &str) -> bool {
        (self.indices.is_empty() || self.indices.contains(&index))
            && (self.names.is_empty() || self.names.contains(name))
    }
}

/// Returns the positions of the raw columns kept by `selection`, in their
/// original order.
pub fn select_columns(raw: &[String], selection: &ColumnSelection) -> Vec<usize> {
    raw.iter()
        .enumerate()
        .filter(|(i, name)| selection.keeps(*i, name))
        .map(|(i, _)| i)
        .collect()
}

/// Produces unique names for `candidates`, preserving their order.
///
/// Without `dedupe` a repeated name is a schema error. With it, a name that
/// was already emitted is replaced by the first of `name_1`, `name_2`, ...
/// that has not been emitted yet, so suffixed names present in the input
/// are disambiguated further (`foo_1` becomes `foo_1_1`).
pub fn resolve_names(candidates: &[String], dedupe: bool) -> Result<Vec<String>> {
    let mut used: HashSet<String> = HashSet::with_capacity(candidates.len());
    let mut resolved = Vec::with_capacity(candidates.len());

    for name in candidates {
        if !used.contains(name) {
            used.insert(name.clone());
            resolved.push(name.clone());
            continue;
        }

        if !dedupe {
            return Err(ReaderError::schema(format!(
                "the dataset contains more than one column with the name '{name}'"
            )));
        }

        let mut suffix = 1usize;
        let unique = loop {
            let suffixed = format!("{name}_{suffix}");
            if !used.contains(&suffixed) {
                break suffixed;
            }
            suffix += 1;
        };
        used.insert(unique.clone());
        resolved.push(unique);
    }

    Ok(resolved)
}
