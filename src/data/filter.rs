use std::collections::{BTreeMap, BTreeSet};

use super::model::{Factor, Level, MammalDataset};

// ---------------------------------------------------------------------------
// Filter predicate: which levels are selected per factor
// ---------------------------------------------------------------------------

/// Per-factor selection state: maps factor → set of selected levels.
/// An absent factor means "no filter"; an empty set hides everything.
pub type FilterState = BTreeMap<Factor, BTreeSet<Level>>;

/// Initialise a [`FilterState`] with every level selected (show everything).
pub fn init_filter_state(dataset: &MammalDataset) -> FilterState {
    dataset.levels.clone()
}

/// Return indices of mammals that pass all active filters.
///
/// A mammal passes a factor filter when:
/// * The factor is not present in `filters` → passes (no constraint)
/// * The selected set is empty → fails
/// * The mammal's level (possibly missing) is in the selected set → passes
pub fn filtered_indices(dataset: &MammalDataset, filters: &FilterState) -> Vec<usize> {
    dataset
        .mammals
        .iter()
        .enumerate()
        .filter(|(_, m)| {
            filters.iter().all(|(factor, selected)| {
                if selected.is_empty() {
                    return false;
                }
                // Every level selected → no effective filter
                if dataset
                    .levels
                    .get(factor)
                    .is_some_and(|all| selected.len() == all.len())
                {
                    return true;
                }
                selected.contains(&m.level(*factor).map(str::to_string))
            })
        })
        .map(|(i, _)| i)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::loader::load_builtin;

    #[test]
    fn everything_visible_initially() {
        let ds = load_builtin().unwrap();
        let filters = init_filter_state(&ds);
        assert_eq!(filtered_indices(&ds, &filters).len(), ds.len());
    }

    #[test]
    fn selecting_one_diet() {
        let ds = load_builtin().unwrap();
        let mut filters = init_filter_state(&ds);
        filters.insert(
            Factor::Vore,
            BTreeSet::from([Some("insecti".to_string())]),
        );
        let idx = filtered_indices(&ds, &filters);
        assert_eq!(idx.len(), 5);
        assert!(idx
            .iter()
            .all(|&i| ds.mammals[i].vore.as_deref() == Some("insecti")));
    }

    #[test]
    fn missing_level_is_selectable() {
        let ds = load_builtin().unwrap();
        let mut filters = init_filter_state(&ds);
        filters.insert(Factor::Vore, BTreeSet::from([None]));
        let idx = filtered_indices(&ds, &filters);
        assert_eq!(idx.len(), 7);
        assert!(idx.iter().all(|&i| ds.mammals[i].vore.is_none()));
    }

    #[test]
    fn empty_selection_hides_everything() {
        let ds = load_builtin().unwrap();
        let mut filters = init_filter_state(&ds);
        filters.insert(Factor::Order, BTreeSet::new());
        assert!(filtered_indices(&ds, &filters).is_empty());
    }
}
