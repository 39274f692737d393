//! Materialized view cache.
//!
//! A [`Cache`] holds exactly the objects of its last-known authoritative list
//! that pass its active filter. It also remembers that full list, so a filter
//! change is computed locally without refetching from upstream.
//!
//! The cache is mutated only by the thread that owns it. Other threads read
//! through a [`CacheReader`], which copies out of the view under a read lock.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use crate::error::{ViewError, ViewResult};
use crate::event::Event;
use crate::filter::Filter;
use crate::object::{Object, ObjectKey};

type View<T> = Arc<RwLock<BTreeMap<ObjectKey, T>>>;

fn lock_err(context: &'static str) -> ViewError {
    ViewError::CacheRead {
        message: format!("poisoned lock: {context}"),
    }
}

/// Filtered, keyed store of objects plus the full list it was computed from.
#[derive(Debug)]
pub struct Cache<T> {
    filter: Filter<T>,
    known: BTreeMap<ObjectKey, T>,
    view: View<T>,
}

impl<T: Object> Cache<T> {
    /// Empty cache with the given filter.
    #[must_use]
    pub fn new(filter: Filter<T>) -> Self {
        Self {
            filter,
            known: BTreeMap::new(),
            view: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// Read handle sharing this cache's view.
    #[must_use]
    pub fn reader(&self) -> CacheReader<T> {
        CacheReader {
            view: Arc::clone(&self.view),
        }
    }

    /// Active filter.
    #[must_use]
    pub fn filter(&self) -> &Filter<T> {
        &self.filter
    }

    /// Size of the remembered authoritative list.
    #[must_use]
    pub fn known_len(&self) -> usize {
        self.known.len()
    }

    /// Replace the contents with the members of `list`. Emits nothing.
    pub fn sync(&mut self, list: Vec<T>) {
        self.known = list.into_iter().map(|o| (o.key(), o)).collect();
        let members: BTreeMap<ObjectKey, T> = self
            .known
            .iter()
            .filter(|(_, o)| self.filter.matches(o))
            .map(|(k, o)| (k.clone(), o.clone()))
            .collect();
        self.with_view(|view| *view = members);
    }

    /// Apply one authoritative event, returning the events it causes in
    /// this view.
    ///
    /// Objects that start or stop matching the filter surface as `Create`
    /// and `Delete`, exactly like objects that appear or disappear upstream.
    pub fn update(&mut self, evt: Event<T>) -> Vec<Event<T>> {
        let key = evt.key();
        let (obj, deleted) = match evt {
            Event::Create(o) | Event::Update(o) => {
                self.known.insert(key.clone(), o.clone());
                (o, false)
            }
            Event::Delete(o) => {
                self.known.remove(&key);
                (o, true)
            }
        };

        let keep = !deleted && self.filter.matches(&obj);

        self.with_view(|view| {
            if keep {
                match view.insert(key, obj.clone()) {
                    Some(_) => vec![Event::Update(obj)],
                    None => vec![Event::Create(obj)],
                }
            } else {
                match view.remove(&key) {
                    Some(_) => vec![Event::Delete(obj)],
                    None => Vec::new(),
                }
            }
        })
    }

    /// Replace the filter and full list, returning the minimal membership
    /// diff: deletes for keys that left, then creates for keys that
    /// entered, each ordered by key. Members whose membership did not
    /// change are refreshed silently.
    pub fn refilter(&mut self, list: Vec<T>, filter: Filter<T>) -> Vec<Event<T>> {
        self.filter = filter;
        self.known = list.into_iter().map(|o| (o.key(), o)).collect();

        let members: BTreeMap<ObjectKey, T> = self
            .known
            .iter()
            .filter(|(_, o)| self.filter.matches(o))
            .map(|(k, o)| (k.clone(), o.clone()))
            .collect();

        self.with_view(|view| {
            let mut events: Vec<Event<T>> = view
                .iter()
                .filter(|(k, _)| !members.contains_key(*k))
                .map(|(k, o)| Event::Delete(self.known.get(k).unwrap_or(o).clone()))
                .collect();
            events.extend(
                members
                    .iter()
                    .filter(|(k, _)| !view.contains_key(*k))
                    .map(|(_, o)| Event::Create(o.clone())),
            );
            *view = members;
            events
        })
    }

    fn with_view<R>(&self, f: impl FnOnce(&mut BTreeMap<ObjectKey, T>) -> R) -> R {
        // The owner is the only writer; recover a poisoned view rather than
        // lose it, readers keep reporting the poison.
        match self.view.write() {
            Ok(mut guard) => f(&mut *guard),
            Err(poisoned) => f(&mut *poisoned.into_inner()),
        }
    }
}

/// Thread-safe, read-only handle to a cache's view.
#[derive(Debug)]
pub struct CacheReader<T> {
    view: View<T>,
}

impl<T> Clone for CacheReader<T> {
    fn clone(&self) -> Self {
        Self {
            view: Arc::clone(&self.view),
        }
    }
}

impl<T: Object> CacheReader<T> {
    /// Snapshot of all members, ordered by key.
    ///
    /// # Errors
    /// Returns `CacheRead` if the view lock is poisoned.
    pub fn list(&self) -> ViewResult<Vec<T>> {
        let view = self.view.read().map_err(|_| lock_err("view"))?;
        Ok(view.values().cloned().collect())
    }

    /// Member by key.
    ///
    /// # Errors
    /// Returns `CacheRead` if the view lock is poisoned.
    pub fn get(&self, key: &ObjectKey) -> ViewResult<Option<T>> {
        let view = self.view.read().map_err(|_| lock_err("view"))?;
        Ok(view.get(key).cloned())
    }

    /// Number of members.
    ///
    /// # Errors
    /// Returns `CacheRead` if the view lock is poisoned.
    pub fn len(&self) -> ViewResult<usize> {
        let view = self.view.read().map_err(|_| lock_err("view"))?;
        Ok(view.len())
    }

    /// Whether the view is empty.
    ///
    /// # Errors
    /// Returns `CacheRead` if the view lock is poisoned.
    pub fn is_empty(&self) -> ViewResult<bool> {
        Ok(self.len()? == 0)
    }

    #[cfg(test)]
    pub(crate) fn poison(&self) {
        let view = Arc::clone(&self.view);
        let _ = std::thread::spawn(move || {
            let _guard = view.write();
            panic!("poisoning cache view");
        })
        .join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        name: String,
        value: u32,
    }

    impl Object for Item {
        fn key(&self) -> ObjectKey {
            ObjectKey::new("default", self.name.clone())
        }
    }

    fn item(name: &str, value: u32) -> Item {
        Item {
            name: name.to_string(),
            value,
        }
    }

    fn even() -> Filter<Item> {
        Filter::new("even", |i: &Item| i.value % 2 == 0)
    }

    fn names(list: &[Item]) -> Vec<String> {
        list.iter().map(|i| i.name.clone()).collect()
    }

    #[test]
    fn sync_keeps_only_members() {
        let mut cache = Cache::new(even());
        cache.sync(vec![item("a", 1), item("b", 2), item("c", 4)]);
        let reader = cache.reader();
        assert_eq!(names(&reader.list().unwrap()), vec!["b", "c"]);
        assert_eq!(cache.known_len(), 3);
        assert_eq!(reader.get(&item("b", 0).key()).unwrap(), Some(item("b", 2)));
        assert_eq!(reader.get(&item("a", 0).key()).unwrap(), None);
    }

    #[test]
    fn update_create_emits_only_for_members() {
        let mut cache = Cache::new(even());
        assert_eq!(cache.update(Event::Create(item("a", 2))), vec![Event::Create(item("a", 2))]);
        assert!(cache.update(Event::Create(item("b", 3))).is_empty());
        assert_eq!(cache.known_len(), 2);
    }

    #[test]
    fn update_transitions() {
        let mut cache = Cache::new(even());
        cache.sync(vec![item("a", 2), item("b", 3)]);

        // Present and still matching.
        assert_eq!(cache.update(Event::Update(item("a", 4))), vec![Event::Update(item("a", 4))]);
        // Newly matching.
        assert_eq!(cache.update(Event::Update(item("b", 6))), vec![Event::Create(item("b", 6))]);
        // Was present, no longer matches.
        assert_eq!(cache.update(Event::Update(item("a", 5))), vec![Event::Delete(item("a", 5))]);
        // Never matched.
        assert!(cache.update(Event::Update(item("a", 7))).is_empty());

        assert_eq!(names(&cache.reader().list().unwrap()), vec!["b"]);
    }

    #[test]
    fn update_delete_emits_iff_present() {
        let mut cache = Cache::new(even());
        cache.sync(vec![item("a", 2), item("b", 3)]);
        assert_eq!(cache.update(Event::Delete(item("a", 2))), vec![Event::Delete(item("a", 2))]);
        assert!(cache.update(Event::Delete(item("b", 3))).is_empty());
        assert!(cache.update(Event::Delete(item("zz", 2))).is_empty());
        assert!(cache.reader().is_empty().unwrap());
        assert_eq!(cache.known_len(), 0);
    }

    #[test]
    fn refilter_emits_deletes_then_creates() {
        let mut cache = Cache::new(even());
        let list = vec![item("a", 1), item("b", 2), item("c", 3), item("d", 4)];
        cache.sync(list.clone());

        let odd = Filter::new("odd", |i: &Item| i.value % 2 == 1);
        let events = cache.refilter(list, odd);
        assert_eq!(
            events,
            vec![
                Event::Delete(item("b", 2)),
                Event::Delete(item("d", 4)),
                Event::Create(item("a", 1)),
                Event::Create(item("c", 3)),
            ]
        );
        assert_eq!(cache.filter().description(), "odd");
    }

    #[test]
    fn refilter_unchanged_members_are_silent_but_refreshed() {
        let mut cache = Cache::new(Filter::all());
        cache.sync(vec![item("a", 1)]);
        let events = cache.refilter(vec![item("a", 9)], Filter::all());
        assert!(events.is_empty());
        assert_eq!(cache.reader().list().unwrap(), vec![item("a", 9)]);
    }

    #[test]
    fn poisoned_reader_reports_cache_read() {
        let cache = Cache::new(Filter::<Item>::all());
        let reader = cache.reader();
        reader.poison();
        assert!(matches!(reader.list(), Err(ViewError::CacheRead { .. })));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Sync(Vec<(u8, u32)>),
        Create(u8, u32),
        Update(u8, u32),
        Delete(u8),
        Refilter(u32),
    }

    fn op() -> impl Strategy<Value = Op> {
        let entry = (0u8..16, 0u32..100);
        prop_oneof![
            prop::collection::vec(entry.clone(), 0..16).prop_map(Op::Sync),
            entry.clone().prop_map(|(k, v)| Op::Create(k, v)),
            entry.prop_map(|(k, v)| Op::Update(k, v)),
            (0u8..16).prop_map(Op::Delete),
            (1u32..5).prop_map(Op::Refilter),
        ]
    }

    fn modulo(m: u32) -> Filter<Item> {
        Filter::new(format!("mod{m}"), move |i: &Item| i.value % m == 0)
    }

    fn key_of(k: u8) -> String {
        format!("k{k}")
    }

    proptest! {
        #[test]
        fn view_always_equals_filtered_known_list(ops in prop::collection::vec(op(), 1..40)) {
            let mut cache = Cache::new(modulo(2));
            let mut filter_mod = 2u32;
            let mut known: BTreeMap<String, u32> = BTreeMap::new();

            for op in ops {
                match op {
                    Op::Sync(entries) => {
                        known = entries.iter().map(|(k, v)| (key_of(*k), *v)).collect();
                        cache.sync(known.iter().map(|(k, v)| item(k, *v)).collect());
                    }
                    Op::Create(k, v) => {
                        known.insert(key_of(k), v);
                        cache.update(Event::Create(item(&key_of(k), v)));
                    }
                    Op::Update(k, v) => {
                        known.insert(key_of(k), v);
                        cache.update(Event::Update(item(&key_of(k), v)));
                    }
                    Op::Delete(k) => {
                        let v = known.remove(&key_of(k)).unwrap_or(0);
                        cache.update(Event::Delete(item(&key_of(k), v)));
                    }
                    Op::Refilter(m) => {
                        filter_mod = m;
                        cache.refilter(known.iter().map(|(k, v)| item(k, *v)).collect(), modulo(m));
                    }
                }

                let expected: Vec<Item> = known
                    .iter()
                    .filter(|(_, v)| *v % filter_mod == 0)
                    .map(|(k, v)| item(k, *v))
                    .collect();
                prop_assert_eq!(cache.reader().list().unwrap(), expected);
            }
        }

        #[test]
        fn refilter_diff_is_minimal(
            entries in prop::collection::btree_map(0u8..32, 0u32..100, 0..24),
            before in 1u32..5,
            after in 1u32..5,
        ) {
            let list: Vec<Item> = entries.iter().map(|(k, v)| item(&key_of(*k), *v)).collect();
            let mut cache = Cache::new(modulo(before));
            cache.sync(list.clone());

            let was: BTreeSet<String> = names(&cache.reader().list().unwrap()).into_iter().collect();
            let events = cache.refilter(list, modulo(after));
            let now: BTreeSet<String> = names(&cache.reader().list().unwrap()).into_iter().collect();

            let deleted: BTreeSet<String> = events
                .iter()
                .filter(|e| matches!(e, Event::Delete(_)))
                .map(|e| e.object().name.clone())
                .collect();
            let created: BTreeSet<String> = events
                .iter()
                .filter(|e| matches!(e, Event::Create(_)))
                .map(|e| e.object().name.clone())
                .collect();

            prop_assert!(events.iter().all(|e| !matches!(e, Event::Update(_))));
            prop_assert_eq!(deleted.len() + created.len(), events.len());
            prop_assert_eq!(deleted, was.difference(&now).cloned().collect::<BTreeSet<_>>());
            prop_assert_eq!(created, now.difference(&was).cloned().collect::<BTreeSet<_>>());
        }
    }
}
