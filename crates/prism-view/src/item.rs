//! The per-item contract consumed by the view engine.
//!
//! [`ViewItem`] replaces the reflection-based item handling of classic
//! binding frameworks with explicit, structurally-checked hooks: blank
//! construction for `add_new`, the begin/end/cancel edit protocol, and
//! in-place restore for manager-captured rollback.
//!
//! Plain data types (integers, strings, simple structs) get value identity
//! and need no hooks. Editable records are typically handle types, for
//! example an `Arc<RwLock<Fields>>` wrapper with an identity field, and opt
//! into the hooks they support.

/// Contract for items hosted by a [`crate::CollectionView`].
///
/// Every method except the supertrait bounds has a default, so plain data
/// types implement the trait with an empty block.
///
/// # Example
///
/// ```
/// use prism_view::ViewItem;
///
/// #[derive(Clone, PartialEq)]
/// struct Task {
///     id: u64,
///     title: String,
/// }
///
/// impl ViewItem for Task {}
/// ```
pub trait ViewItem: Clone + PartialEq + Send + Sync + 'static {
    /// Creates a blank instance for `add_new`.
    ///
    /// Returning `None` (the default) means the type has no parameterless
    /// construction and `can_add_new` is false.
    fn create_new() -> Option<Self> {
        None
    }

    /// Whether this value is the reserved new-item placeholder.
    ///
    /// Placeholder values may be handed to callers but are never editable or
    /// removable like normal items.
    fn is_placeholder(&self) -> bool {
        false
    }

    /// Whether the item manages its own edit transaction.
    ///
    /// When true, the engine delegates rollback to
    /// [`begin_edit`](Self::begin_edit) / [`end_edit`](Self::end_edit) /
    /// [`cancel_edit`](Self::cancel_edit) and captures nothing itself.
    fn has_edit_protocol(&self) -> bool {
        false
    }

    /// Begin-edit hook, invoked when an add or edit transaction opens.
    fn begin_edit(&self) {}

    /// End-edit hook, invoked on commit.
    fn end_edit(&self) {}

    /// Cancel-edit hook, invoked when the transaction is canceled.
    fn cancel_edit(&self) {}

    /// Whether [`restore_from`](Self::restore_from) can roll this item back.
    fn supports_restore(&self) -> bool {
        false
    }

    /// Copies field values from `original` back into this item.
    ///
    /// Used to roll back a canceled edit when the item does not manage its
    /// own edit transaction. Only called when
    /// [`supports_restore`](Self::supports_restore) is true.
    fn restore_from(&self, original: &Self) {
        let _ = original;
    }
}

macro_rules! impl_view_item_for_default {
    ($($ty:ty),* $(,)?) => {
        $(
            impl ViewItem for $ty {
                fn create_new() -> Option<Self> {
                    Some(<$ty>::default())
                }
            }
        )*
    };
}

impl_view_item_for_default!(i32, i64, u32, u64, usize, bool, char, String);
