//! End-to-end pipeline scenarios against an observable in-memory source.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};

use prism_view::{
    CollectionChange, CollectionView, GroupDescription, GroupView, SortDescription, VecSource,
    ViewItem,
};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// An editable record with handle identity: clones share fields, equality
/// is by id.
#[derive(Clone, Debug)]
struct Rec {
    id: u64,
    fields: Arc<RwLock<(String, i32)>>,
}

impl Rec {
    fn new(category: &str, value: i32) -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::SeqCst),
            fields: Arc::new(RwLock::new((category.to_string(), value))),
        }
    }

    fn category(&self) -> String {
        self.fields.read().0.clone()
    }

    fn value(&self) -> i32 {
        self.fields.read().1
    }

    fn set(&self, category: &str, value: i32) {
        *self.fields.write() = (category.to_string(), value);
    }
}

impl PartialEq for Rec {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl ViewItem for Rec {
    fn create_new() -> Option<Self> {
        Some(Rec::new("", 0))
    }
}

fn by_value() -> SortDescription<Rec> {
    SortDescription::ascending("value", |rec: &Rec| rec.value().into())
}

fn by_category() -> GroupDescription<Rec> {
    GroupDescription::new("category", |rec: &Rec| rec.category().into())
}

fn int_view(items: Vec<i32>) -> (Arc<VecSource<i32>>, Arc<CollectionView<i32>>) {
    let source = Arc::new(VecSource::new(items));
    let view = CollectionView::new(source.clone());
    (source, view)
}

#[test]
fn untransformed_view_mirrors_the_source() {
    let (_source, view) = int_view(vec![1, 3, 5]);
    assert_eq!(view.count(), 3);
    assert_eq!(view.item_at(1).unwrap(), 3);
    assert_eq!(view.index_of(&5), Some(2));
}

#[test]
fn filter_halves_a_hundred_item_source() {
    let items: Vec<i32> = (0..100).map(|i| i % 10).collect();
    let (_source, view) = int_view(items);
    view.set_filter(|n: &i32| *n >= 5).unwrap();

    assert_eq!(view.count(), 50);
    assert_eq!(view.item_count(), 50);
    assert!(view.items().iter().all(|n| *n >= 5));
}

#[test]
fn sort_by_keyed_property_both_directions() {
    let records: Vec<Rec> = [3, 1, 9, 7, 5]
        .iter()
        .map(|&value| Rec::new("x", value))
        .collect();
    let source = Arc::new(VecSource::new(records));
    let view = CollectionView::new(source);

    view.set_sort_descriptions(vec![by_value()]).unwrap();
    let values: Vec<i32> = view.items().iter().map(Rec::value).collect();
    assert_eq!(values, vec![1, 3, 5, 7, 9]);

    view.set_sort_descriptions(vec![SortDescription::descending("value", |rec: &Rec| {
        rec.value().into()
    })])
    .unwrap();
    let values: Vec<i32> = view.items().iter().map(Rec::value).collect();
    assert_eq!(values, vec![9, 7, 5, 3, 1]);

    // Clearing the chain restores filtered pre-sort order.
    view.clear_sort_descriptions().unwrap();
    let values: Vec<i32> = view.items().iter().map(Rec::value).collect();
    assert_eq!(values, vec![3, 1, 9, 7, 5]);
}

#[test]
fn grouping_without_sort_preserves_first_seen_order() {
    let source = Arc::new(VecSource::new(vec![
        "Apple".to_string(),
        "Orange".to_string(),
        "Orange".to_string(),
        "Apple".to_string(),
        "Orange".to_string(),
    ]));
    let view = CollectionView::new(source);
    view.set_group_descriptions(vec![GroupDescription::new("value", |s: &String| {
        s.as_str().into()
    })])
    .unwrap();

    let groups = view.groups().unwrap();
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].key, "Apple".into());
    assert_eq!(groups[0].item_count, 2);
    assert_eq!(groups[1].key, "Orange".into());
    assert_eq!(groups[1].item_count, 3);
    // The flattened view walks groups in first-seen order.
    assert_eq!(
        view.items(),
        vec!["Apple", "Apple", "Orange", "Orange", "Orange"]
    );
}

#[test]
fn paging_windows_and_disabling_resets_the_index() {
    let (_source, view) = int_view((1..=9).collect());
    view.set_page_size(3).unwrap();

    assert!(view.move_to_page(1).unwrap());
    assert_eq!(view.page_index(), 1);
    assert_eq!(view.count(), 3);
    // Items at source indices 3..=5.
    assert_eq!(view.items(), vec![4, 5, 6]);

    view.set_page_size(0).unwrap();
    assert_eq!(view.page_index(), -1);
    assert_eq!(view.count(), 9);
}

#[test]
fn add_new_relocates_to_its_pipeline_home_on_commit() {
    let a1 = Rec::new("A", 1);
    let a5 = Rec::new("A", 5);
    let b3 = Rec::new("B", 3);
    let b9 = Rec::new("B", 9);
    let source = Arc::new(VecSource::new(vec![
        a1.clone(),
        a5.clone(),
        b3.clone(),
        b9.clone(),
    ]));
    let view = CollectionView::new(source);
    view.set_sort_descriptions(vec![by_value()]).unwrap();
    view.set_group_descriptions(vec![by_category()]).unwrap();
    view.set_page_size(2).unwrap();
    assert_eq!(view.items(), vec![a1.clone(), a5.clone()]);

    let log: Arc<Mutex<Vec<CollectionChange<Rec>>>> = Arc::new(Mutex::new(Vec::new()));
    let recv = log.clone();
    view.signals().collection_changed.connect(move |change| {
        recv.lock().push(change.clone());
    });

    // The provisional item lands on the current (full) page, displacing
    // its last item.
    let added = view.add_new().unwrap();
    assert_eq!(view.items(), vec![a1.clone(), added.clone()]);
    assert_eq!(view.current_item(), Some(added.clone()));
    {
        let log = log.lock();
        assert_eq!(
            log[0],
            CollectionChange::Remove {
                index: 1,
                item: a5.clone()
            }
        );
        assert_eq!(
            log[1],
            CollectionChange::Add {
                index: 1,
                item: added.clone()
            }
        );
    }
    log.lock().clear();

    added.set("B", 4);
    view.commit_new().unwrap();

    // Committed home: group B, sorted between 3 and 9, which is page 1.
    assert_eq!(view.items(), vec![a1.clone(), a5.clone()]);
    assert_eq!(view.item_count(), 5);
    {
        let log = log.lock();
        assert_eq!(
            log[0],
            CollectionChange::Remove {
                index: 1,
                item: added.clone()
            }
        );
        assert_eq!(
            log[1],
            CollectionChange::Add {
                index: 1,
                item: a5.clone()
            }
        );
    }

    assert!(view.move_to_page(1).unwrap());
    assert_eq!(view.items(), vec![b3.clone(), added.clone()]);

    let groups = view.groups().unwrap();
    assert_eq!(groups[0].item_count, 2); // A
    assert_eq!(groups[1].item_count, 3); // B
}

#[test]
fn page_counts_partition_the_logical_count() {
    let (_source, view) = int_view((0..10).collect());
    view.set_filter(|n: &i32| n % 3 != 0).unwrap(); // drops 0, 3, 6, 9
    view.set_page_size(4).unwrap();

    let mut total = 0;
    for page in 0..view.page_count() {
        assert!(view.move_to_page(page as isize).unwrap() || page == 0);
        let count = view.count();
        assert!(count <= view.page_size());
        total += count;
    }
    assert_eq!(total, view.item_count());
    assert_eq!(view.item_count(), 6);
}

#[test]
fn index_of_and_item_at_agree_within_the_page() {
    let (_source, view) = int_view(vec![7, 2, 9, 4, 1, 6]);
    view.set_sort_descriptions(vec![SortDescription::ascending("value", |n: &i32| {
        (*n).into()
    })])
    .unwrap();
    view.set_page_size(4).unwrap();

    for index in 0..view.count() {
        let item = view.item_at(index).unwrap();
        assert_eq!(view.index_of(&item), Some(index));
    }
    // Off-page and filtered-out items have no page index.
    assert_eq!(view.index_of(&9), None);
}

#[test]
fn nested_group_counts_sum_to_parents() {
    fn check(groups: &[GroupView<Rec>]) {
        for group in groups {
            if group.groups.is_empty() {
                assert_eq!(group.item_count, group.items.len());
            } else {
                let sum: usize = group.groups.iter().map(|child| child.item_count).sum();
                assert_eq!(group.item_count, sum);
                check(&group.groups);
            }
        }
    }

    let records = vec![
        Rec::new("A", 1),
        Rec::new("A", 8),
        Rec::new("B", 2),
        Rec::new("B", 9),
        Rec::new("B", 3),
    ];
    let source = Arc::new(VecSource::new(records));
    let view = CollectionView::new(source);
    view.set_group_descriptions(vec![
        by_category(),
        GroupDescription::new("band", |rec: &Rec| (rec.value() >= 5).into()),
    ])
    .unwrap();

    let groups = view.groups().unwrap();
    check(&groups);
    let total: usize = groups.iter().map(|group| group.item_count).sum();
    assert_eq!(total, view.item_count());
}

#[test]
fn pre_grouped_data_uses_run_boundaries() {
    let source = Arc::new(VecSource::new(vec![
        "A".to_string(),
        "A".to_string(),
        "B".to_string(),
        "A".to_string(),
    ]));
    let view = CollectionView::with_data_shape(source, false, true);
    view.set_group_descriptions(vec![GroupDescription::new("value", |s: &String| {
        s.as_str().into()
    })])
    .unwrap();

    // Ordered mode trusts the incoming order: the second A run is its own
    // group.
    let groups = view.groups().unwrap();
    assert_eq!(groups.len(), 3);
}

#[test]
fn currency_stays_within_page_bounds_under_churn() {
    let (source, view) = int_view((0..20).collect());
    view.set_page_size(5).unwrap();
    view.move_to_page(2).unwrap();
    view.move_current_to_last().unwrap();

    source.remove(12);
    source.push(42);
    source.remove(0);
    view.set_filter(|n: &i32| n % 2 == 0).unwrap();

    let count = view.count() as isize;
    let position = view.current_position();
    assert!((-1..=count).contains(&position));
    assert_eq!(view.is_current_before_first(), position == -1);
    assert_eq!(view.is_current_after_last(), count > 0 && position == count);
}

#[test]
fn filter_change_that_drops_the_current_item_degenerates_currency() {
    let (_source, view) = int_view(vec![1, 2, 3, 4]);
    view.move_current_to_position(3).unwrap();
    assert_eq!(view.current_item(), Some(4));

    let changed: Arc<Mutex<Vec<Option<i32>>>> = Arc::new(Mutex::new(Vec::new()));
    let recv = changed.clone();
    view.signals().current_changed.connect(move |item| {
        recv.lock().push(item.clone());
    });

    view.set_filter(|n: &i32| n % 2 == 1).unwrap();

    assert_eq!(view.items(), vec![1, 3]);
    // Degenerate move to the nearest surviving index, announced.
    assert_eq!(view.current_position(), 1);
    assert_eq!(view.current_item(), Some(3));
    assert_eq!(changed.lock().as_slice(), &[Some(3)]);
}

#[test]
fn group_notifications_follow_membership_changes() {
    use prism_view::GroupChange;

    let source = Arc::new(VecSource::new(vec![
        Rec::new("A", 1),
        Rec::new("B", 2),
    ]));
    let view = CollectionView::new(source.clone());
    view.set_group_descriptions(vec![by_category()]).unwrap();

    let log: Arc<Mutex<Vec<GroupChange>>> = Arc::new(Mutex::new(Vec::new()));
    let recv = log.clone();
    view.signals().group_changed.connect(move |change| {
        recv.lock().push(change.clone());
    });

    source.push(Rec::new("C", 3));
    assert!(log.lock().iter().any(|change| matches!(
        change,
        GroupChange::Added { index: 2, .. }
    )));

    log.lock().clear();
    let b = view
        .items()
        .into_iter()
        .find(|rec| rec.category() == "B")
        .unwrap();
    view.remove(&b).unwrap();
    assert!(log.lock().iter().any(|change| matches!(
        change,
        GroupChange::Removed { index: 1, .. }
    )));
    assert_eq!(view.groups().unwrap().len(), 2);
}

#[test]
fn edit_commit_moves_item_across_groups() {
    let a1 = Rec::new("A", 1);
    let b2 = Rec::new("B", 2);
    let source = Arc::new(VecSource::new(vec![a1.clone(), b2.clone()]));
    let view = CollectionView::new(source);
    view.set_sort_descriptions(vec![by_value()]).unwrap();
    view.set_group_descriptions(vec![by_category()]).unwrap();

    view.edit_item(&a1).unwrap();
    a1.set("B", 7);
    view.commit_edit().unwrap();

    let groups = view.groups().unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].key, "B".into());
    assert_eq!(groups[0].item_count, 2);
    let values: Vec<i32> = view.items().iter().map(Rec::value).collect();
    assert_eq!(values, vec![2, 7]);
}

#[test]
fn edit_cancel_restores_through_the_item_protocol() {
    /// A record that manages its own edit transaction.
    #[derive(Clone)]
    struct Proto {
        id: u64,
        value: Arc<RwLock<i32>>,
        saved: Arc<RwLock<Option<i32>>>,
    }

    impl PartialEq for Proto {
        fn eq(&self, other: &Self) -> bool {
            self.id == other.id
        }
    }

    impl ViewItem for Proto {
        fn has_edit_protocol(&self) -> bool {
            true
        }

        fn begin_edit(&self) {
            *self.saved.write() = Some(*self.value.read());
        }

        fn end_edit(&self) {
            *self.saved.write() = None;
        }

        fn cancel_edit(&self) {
            if let Some(saved) = self.saved.write().take() {
                *self.value.write() = saved;
            }
        }
    }

    let item = Proto {
        id: 1,
        value: Arc::new(RwLock::new(10)),
        saved: Arc::new(RwLock::new(None)),
    };
    let source = Arc::new(VecSource::new(vec![item.clone()]));
    let view = CollectionView::new(source);

    view.edit_item(&item).unwrap();
    *item.value.write() = 99;
    view.cancel_edit().unwrap();

    assert_eq!(*item.value.read(), 10);
    assert!(!view.is_editing_item());
}
