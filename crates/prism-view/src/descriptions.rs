//! Sort and group descriptions.
//!
//! A description pairs a diagnostic property name with a cached key-selector
//! closure. The selector is resolved once at construction; the engine never
//! looks properties up by string at sort/group time.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::key::{KeyValue, SortDirection};

/// Type alias for a key-selector function.
pub type KeySelector<T> = Arc<dyn Fn(&T) -> KeyValue + Send + Sync>;

/// Describes one level of sorting: a keyed property and a direction.
///
/// # Example
///
/// ```
/// use prism_view::SortDescription;
///
/// #[derive(Clone, PartialEq)]
/// struct Person { name: String, age: u32 }
///
/// let by_age = SortDescription::descending("age", |p: &Person| p.age.into());
/// assert_eq!(by_age.property(), "age");
/// ```
#[derive(Clone)]
pub struct SortDescription<T> {
    property: String,
    direction: SortDirection,
    key: KeySelector<T>,
}

impl<T> SortDescription<T> {
    /// Creates a sort description with an explicit direction.
    pub fn new<F>(property: impl Into<String>, direction: SortDirection, key: F) -> Self
    where
        F: Fn(&T) -> KeyValue + Send + Sync + 'static,
    {
        Self {
            property: property.into(),
            direction,
            key: Arc::new(key),
        }
    }

    /// Creates an ascending sort description.
    pub fn ascending<F>(property: impl Into<String>, key: F) -> Self
    where
        F: Fn(&T) -> KeyValue + Send + Sync + 'static,
    {
        Self::new(property, SortDirection::Ascending, key)
    }

    /// Creates a descending sort description.
    pub fn descending<F>(property: impl Into<String>, key: F) -> Self
    where
        F: Fn(&T) -> KeyValue + Send + Sync + 'static,
    {
        Self::new(property, SortDirection::Descending, key)
    }

    /// The diagnostic property name.
    pub fn property(&self) -> &str {
        &self.property
    }

    /// The sort direction.
    pub fn direction(&self) -> SortDirection {
        self.direction
    }

    /// Extracts the sort key of an item.
    pub fn key_of(&self, item: &T) -> KeyValue {
        (self.key)(item)
    }

    /// Compares two items by this description's key and direction.
    pub fn compare(&self, a: &T, b: &T) -> Ordering {
        self.direction
            .apply(self.key_of(a).compare(&self.key_of(b)))
    }
}

impl<T> fmt::Debug for SortDescription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SortDescription")
            .field("property", &self.property)
            .field("direction", &self.direction)
            .finish_non_exhaustive()
    }
}

/// Describes one level of grouping: a keyed property whose values partition
/// the items.
#[derive(Clone)]
pub struct GroupDescription<T> {
    property: String,
    key: KeySelector<T>,
}

impl<T> GroupDescription<T> {
    /// Creates a group description from a key selector.
    pub fn new<F>(property: impl Into<String>, key: F) -> Self
    where
        F: Fn(&T) -> KeyValue + Send + Sync + 'static,
    {
        Self {
            property: property.into(),
            key: Arc::new(key),
        }
    }

    /// The diagnostic property name.
    pub fn property(&self) -> &str {
        &self.property
    }

    /// Extracts the group key of an item.
    pub fn key_of(&self, item: &T) -> KeyValue {
        (self.key)(item)
    }
}

impl<T> fmt::Debug for GroupDescription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupDescription")
            .field("property", &self.property)
            .finish_non_exhaustive()
    }
}
