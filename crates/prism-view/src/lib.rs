//! Observable collection views: filter, sort, group, and page a source
//! collection without copying or reordering it.
//!
//! The central type is [`CollectionView`], a live, windowed presentation
//! of a [`CollectionSource`]. The pipeline runs in a fixed order -
//! snapshot, filter, sort, group, page - and the result is observed
//! through [`ViewSignals`]: page-relative collection changes, property
//! changes, currency events, page changes, and group changes.
//!
//! Sources opt into capabilities by trait: [`Indexable`] random access,
//! [`ChangeNotifying`] granular change streams, [`ListMutable`] mutation,
//! and [`ServerPageable`] source-driven paging. [`VecSource`] implements
//! all but the last and is the usual in-memory backing store.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use prism_view::{CollectionView, GroupDescription, SortDescription, VecSource};
//!
//! #[derive(Clone, PartialEq)]
//! struct Fruit {
//!     name: &'static str,
//!     size: i32,
//! }
//!
//! impl prism_view::ViewItem for Fruit {}
//!
//! let source = Arc::new(VecSource::new(vec![
//!     Fruit { name: "Orange", size: 4 },
//!     Fruit { name: "Apple", size: 3 },
//!     Fruit { name: "Apple", size: 5 },
//! ]));
//! let view = CollectionView::new(source);
//!
//! view.set_sort_descriptions(vec![SortDescription::ascending("size", |f: &Fruit| {
//!     f.size.into()
//! })])?;
//! view.set_group_descriptions(vec![GroupDescription::new("name", |f: &Fruit| {
//!     f.name.into()
//! })])?;
//!
//! let groups = view.groups().unwrap();
//! assert_eq!(groups.len(), 2);
//! assert_eq!(groups[0].item_count, 2); // Apple
//! # Ok::<(), prism_view::ViewError>(())
//! ```

mod currency;
mod descriptions;
mod error;
mod filter;
mod group;
mod item;
mod key;
mod notify;
mod pager;
mod snapshot;
mod sort;
mod source;
mod transaction;
mod vec_source;
mod view;

pub use descriptions::{GroupDescription, KeySelector, SortDescription};
pub use error::{ViewError, ViewResult};
pub use filter::FilterFn;
pub use group::{GroupChange, GroupView};
pub use item::ViewItem;
pub use key::{KeyValue, SortDirection};
pub use notify::{CollectionChange, CurrentChanging, ViewProperty, ViewSignals};
pub use source::{
    ChangeNotifying, CollectionSource, Indexable, ListMutable, PageReady, PageRequest,
    ServerPageable, SourceChange,
};
pub use vec_source::VecSource;
pub use view::{CollectionView, RefreshDeferral};
