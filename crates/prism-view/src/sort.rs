//! Sort engine.
//!
//! An ordered list of [`SortDescription`]s forms a multi-key comparator:
//! items compare by the first key, ties break by the second, and so on.
//! Final ties preserve the filtered pre-sort order (the sort is stable).

use std::cmp::Ordering;

use crate::descriptions::SortDescription;
use crate::item::ViewItem;

/// The view's comparator chain.
pub(crate) struct SortState<T> {
    descriptions: Vec<SortDescription<T>>,
}

impl<T: ViewItem> SortState<T> {
    pub(crate) fn new() -> Self {
        Self {
            descriptions: Vec::new(),
        }
    }

    pub(crate) fn descriptions(&self) -> &[SortDescription<T>] {
        &self.descriptions
    }

    pub(crate) fn set(&mut self, descriptions: Vec<SortDescription<T>>) {
        self.descriptions = descriptions;
    }

    pub(crate) fn push(&mut self, description: SortDescription<T>) {
        self.descriptions.push(description);
    }

    pub(crate) fn remove(&mut self, index: usize) -> Option<SortDescription<T>> {
        if index < self.descriptions.len() {
            Some(self.descriptions.remove(index))
        } else {
            None
        }
    }

    pub(crate) fn clear(&mut self) {
        self.descriptions.clear();
    }

    pub(crate) fn is_active(&self) -> bool {
        !self.descriptions.is_empty()
    }

    /// Compares two items through the comparator chain.
    pub(crate) fn compare(&self, a: &T, b: &T) -> Ordering {
        for description in &self.descriptions {
            let ordering = description.compare(a, b);
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }

    /// Stable-sorts a sequence in place. A no-op with no descriptions.
    pub(crate) fn apply(&self, items: &mut [T]) {
        if self.is_active() {
            items.sort_by(|a, b| self.compare(a, b));
        }
    }

    /// Upper-bound insertion position for `item` in an already-sorted
    /// sequence: equal keys keep insertion order.
    ///
    /// With no descriptions this returns `items.len()` (append).
    pub(crate) fn insertion_index(&self, items: &[T], item: &T) -> usize {
        if !self.is_active() {
            return items.len();
        }
        items.partition_point(|existing| self.compare(existing, item) != Ordering::Greater)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::SortDirection;

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        group: &'static str,
        value: i32,
    }

    impl ViewItem for Row {}

    fn by_group() -> SortDescription<Row> {
        SortDescription::ascending("group", |row: &Row| row.group.into())
    }

    fn by_value(direction: SortDirection) -> SortDescription<Row> {
        SortDescription::new("value", direction, |row: &Row| row.value.into())
    }

    #[test]
    fn single_key_ascending_and_descending() {
        let mut sort = SortState::new();
        sort.set(vec![by_value(SortDirection::Ascending)]);

        let mut values: Vec<Row> = [3, 1, 9, 7, 5]
            .iter()
            .map(|&value| Row { group: "a", value })
            .collect();
        sort.apply(&mut values);
        let sorted: Vec<i32> = values.iter().map(|row| row.value).collect();
        assert_eq!(sorted, vec![1, 3, 5, 7, 9]);

        sort.set(vec![by_value(SortDirection::Descending)]);
        sort.apply(&mut values);
        let sorted: Vec<i32> = values.iter().map(|row| row.value).collect();
        assert_eq!(sorted, vec![9, 7, 5, 3, 1]);
    }

    #[test]
    fn ties_break_by_later_keys_then_input_order() {
        let mut sort = SortState::new();
        sort.set(vec![by_group(), by_value(SortDirection::Ascending)]);

        let mut rows = vec![
            Row { group: "b", value: 2 },
            Row { group: "a", value: 9 },
            Row { group: "b", value: 1 },
            Row { group: "a", value: 9 },
        ];
        sort.apply(&mut rows);

        assert_eq!(rows[0], Row { group: "a", value: 9 });
        assert_eq!(rows[1], Row { group: "a", value: 9 });
        assert_eq!(rows[2], Row { group: "b", value: 1 });
        assert_eq!(rows[3], Row { group: "b", value: 2 });
    }

    #[test]
    fn empty_chain_is_a_no_op() {
        let sort = SortState::new();
        let mut rows = vec![
            Row { group: "z", value: 3 },
            Row { group: "a", value: 1 },
        ];
        let original = rows.clone();
        sort.apply(&mut rows);
        assert_eq!(rows, original);
    }

    #[test]
    fn insertion_index_is_upper_bound() {
        let mut sort = SortState::new();
        sort.set(vec![by_value(SortDirection::Ascending)]);

        let rows: Vec<Row> = [1, 3, 3, 5]
            .iter()
            .map(|&value| Row { group: "a", value })
            .collect();

        // Equal keys land after existing ones.
        assert_eq!(sort.insertion_index(&rows, &Row { group: "a", value: 3 }), 3);
        assert_eq!(sort.insertion_index(&rows, &Row { group: "a", value: 0 }), 0);
        assert_eq!(sort.insertion_index(&rows, &Row { group: "a", value: 9 }), 4);
    }

    #[test]
    fn insertion_index_appends_without_sort() {
        let sort = SortState::new();
        let rows = vec![Row { group: "a", value: 2 }];
        assert_eq!(sort.insertion_index(&rows, &Row { group: "a", value: 1 }), 1);
    }
}
