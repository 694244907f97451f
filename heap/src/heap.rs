//! Stop-the-world mark-and-sweep heap.
//!
//! Objects live in an arena addressed by [`ObjectRef`] handles. Every
//! occupied slot is also a node of an intrusive doubly linked list rooted at
//! the heap's `header`, so a sweep visits exactly the allocated objects and
//! unlinks dead ones in O(1).
//!
//! The heap knows nothing about the VM. Consumers provide a
//! [`RootProvider`] to every allocation so a collection can run before the
//! new object is placed.

use object::{HeapObject, ObjectRef, Visitable};

/// Consumers implement this to provide GC roots.
///
/// Called when a collection starts. Every reference reported here, and
/// everything transitively reachable from it, survives the collection.
pub trait RootProvider {
    fn visit_roots(&self, visitor: &mut dyn FnMut(ObjectRef));
}

/// No roots at all: a collection with this provider frees everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRoots;

impl RootProvider for NoRoots {
    fn visit_roots(&self, _visitor: &mut dyn FnMut(ObjectRef)) {}
}

// ── Heap settings ─────────────────────────────────────────────────────

/// Threshold policy of the collector.
///
/// After every collection the next threshold is
/// `max(live_bytes * growth_factor, min_threshold)`, so the number of bytes
/// allocated between two collections is at least the live size.
#[derive(Debug, Clone)]
pub struct HeapSettings {
    /// Threshold before the first collection.
    pub initial_threshold: usize,
    /// Lower bound for every recomputed threshold.
    pub min_threshold: usize,
    /// Multiplier applied to the live size after a sweep. Must be >= 2.
    pub growth_factor: usize,
    /// Hard limit on live bytes. Exceeding it after a collection is fatal.
    pub max_heap_size: Option<usize>,
}

pub const HEAP_THRESHOLD_SIZE: usize = 1024 * 256;

impl Default for HeapSettings {
    fn default() -> Self {
        Self {
            initial_threshold: HEAP_THRESHOLD_SIZE,
            min_threshold: HEAP_THRESHOLD_SIZE,
            growth_factor: 2,
            max_heap_size: None,
        }
    }
}

impl HeapSettings {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.initial_threshold == 0 || self.min_threshold == 0 {
            return Err("thresholds must be > 0");
        }
        if self.growth_factor < 2 {
            return Err("growth_factor must be at least 2");
        }
        if let Some(limit) = self.max_heap_size {
            if limit < self.min_threshold {
                return Err("max_heap_size must not be below min_threshold");
            }
        }
        Ok(())
    }

    fn next_threshold(&self, live: usize) -> usize {
        live.saturating_mul(self.growth_factor)
            .max(self.min_threshold)
    }
}

// ── Statistics ────────────────────────────────────────────────────────

/// Outcome of a single collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GcStats {
    pub freed_objects: usize,
    pub freed_bytes: usize,
    pub live_objects: usize,
    pub live_bytes: usize,
    pub threshold: usize,
}

// ── Arena ─────────────────────────────────────────────────────────────

#[derive(Debug)]
struct Entry {
    generation: u32,
    object: Option<HeapObject>,
    size: usize,
    prev: Option<u32>,
    next: Option<u32>,
}

impl Entry {
    fn vacant() -> Self {
        Self {
            generation: 0,
            object: None,
            size: 0,
            prev: None,
            next: None,
        }
    }
}

#[derive(Debug)]
pub struct Heap {
    settings: HeapSettings,
    entries: Vec<Entry>,
    free: Vec<u32>,
    header: Option<u32>,
    current_heap_size: usize,
    current_threshold: usize,
    object_count: usize,
    collections: usize,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new(HeapSettings::default())
    }
}

impl Heap {
    pub fn new(settings: HeapSettings) -> Self {
        settings.validate().expect("invalid heap settings");
        let current_threshold = settings.initial_threshold;
        Self {
            settings,
            entries: Vec::new(),
            free: Vec::new(),
            header: None,
            current_heap_size: 0,
            current_threshold,
            object_count: 0,
            collections: 0,
        }
    }

    pub fn settings(&self) -> &HeapSettings {
        &self.settings
    }

    /// Live bytes currently accounted.
    pub fn current_heap_size(&self) -> usize {
        self.current_heap_size
    }

    /// Heap size above which the next allocation collects first.
    pub fn current_threshold(&self) -> usize {
        self.current_threshold
    }

    pub fn object_count(&self) -> usize {
        self.object_count
    }

    /// Number of collections run so far.
    pub fn collections(&self) -> usize {
        self.collections
    }

    // ── Allocation ────────────────────────────────────────────────────

    /// Places `object` on the heap.
    ///
    /// If the heap size exceeds the threshold, a full collection using
    /// `roots` runs first. `object` itself is not yet on the heap at that
    /// point, so anything it references must be reachable from `roots`.
    ///
    /// # Panics
    ///
    /// If a hard limit is configured and the object still does not fit
    /// after a collection.
    pub fn allocate(
        &mut self,
        object: HeapObject,
        roots: &dyn RootProvider,
    ) -> ObjectRef {
        let size = object.byte_size();
        self.make_room(size, roots);

        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.entries.push(Entry::vacant());
                (self.entries.len() - 1) as u32
            }
        };

        let old_header = self.header;
        let entry = &mut self.entries[index as usize];
        debug_assert!(entry.object.is_none(), "free slot still occupied");
        entry.object = Some(HeapObject { marked: false, ..object });
        entry.size = size;
        entry.prev = None;
        entry.next = old_header;
        let generation = entry.generation;

        if let Some(head) = old_header {
            self.entries[head as usize].prev = Some(index);
        }
        self.header = Some(index);

        self.current_heap_size += size;
        self.object_count += 1;

        ObjectRef::new(index, generation)
    }

    /// Collects if the threshold has been passed or `size` more bytes would
    /// break the hard limit, then panics if they still do not fit.
    fn make_room(&mut self, size: usize, roots: &dyn RootProvider) {
        if self.current_heap_size > self.current_threshold
            || self.exceeds_limit(size)
        {
            self.collect(roots);
        }
        if self.exceeds_limit(size) {
            panic!(
                "dvm heap exhausted: {} live bytes, {} requested",
                self.current_heap_size, size
            );
        }
    }

    #[inline]
    fn exceeds_limit(&self, size: usize) -> bool {
        self.settings
            .max_heap_size
            .is_some_and(|limit| self.current_heap_size + size > limit)
    }

    // ── Access ────────────────────────────────────────────────────────

    /// `None` if `r` refers to an object that has been collected.
    pub fn get(&self, r: ObjectRef) -> Option<&HeapObject> {
        let entry = self.entries.get(r.index())?;
        if entry.generation != r.generation() {
            return None;
        }
        entry.object.as_ref()
    }

    pub fn get_mut(&mut self, r: ObjectRef) -> Option<&mut HeapObject> {
        let entry = self.entries.get_mut(r.index())?;
        if entry.generation != r.generation() {
            return None;
        }
        entry.object.as_mut()
    }

    pub fn contains(&self, r: ObjectRef) -> bool {
        self.get(r).is_some()
    }

    /// Mutates an object and re-accounts its size afterwards.
    ///
    /// Use this for anything that may change an object's capacity, such as
    /// appending to an array. Growth counts like an allocation: past the
    /// threshold a collection runs with `roots`, so `r` must be reachable
    /// from them.
    ///
    /// # Panics
    ///
    /// If a hard limit is configured and the grown heap still exceeds it
    /// after a collection.
    pub fn update<R>(
        &mut self,
        r: ObjectRef,
        roots: &dyn RootProvider,
        f: impl FnOnce(&mut HeapObject) -> R,
    ) -> Option<R> {
        let entry = self.entries.get_mut(r.index())?;
        if entry.generation != r.generation() {
            return None;
        }
        let object = entry.object.as_mut()?;
        let result = f(object);
        let new_size = object.byte_size();
        let old_size = std::mem::replace(&mut entry.size, new_size);
        self.current_heap_size = self.current_heap_size - old_size + new_size;

        if new_size > old_size {
            self.make_room(0, roots);
        }
        Some(result)
    }

    /// Walks the object list from the most recently allocated object.
    pub fn objects(&self) -> Objects<'_> {
        Objects {
            heap: self,
            cursor: self.header,
        }
    }

    // ── Collection ────────────────────────────────────────────────────

    /// Runs a full mark-and-sweep collection.
    pub fn collect(&mut self, roots: &dyn RootProvider) -> GcStats {
        let marked = self.mark(roots);
        let (freed_objects, freed_bytes) = self.sweep();
        debug_assert_eq!(marked, self.object_count);

        self.current_threshold =
            self.settings.next_threshold(self.current_heap_size);
        self.collections += 1;

        let stats = GcStats {
            freed_objects,
            freed_bytes,
            live_objects: self.object_count,
            live_bytes: self.current_heap_size,
            threshold: self.current_threshold,
        };
        log::debug!(
            "gc #{}: freed {} objects ({} bytes), {} live ({} bytes), next threshold {}",
            self.collections,
            stats.freed_objects,
            stats.freed_bytes,
            stats.live_objects,
            stats.live_bytes,
            stats.threshold
        );
        stats
    }

    fn mark(&mut self, roots: &dyn RootProvider) -> usize {
        let mut worklist: Vec<ObjectRef> = Vec::new();
        roots.visit_roots(&mut |r| worklist.push(r));

        let mut marked = 0;
        while let Some(r) = worklist.pop() {
            let Some(object) = self.get_mut(r) else {
                debug_assert!(false, "root or edge to collected object {r:?}");
                continue;
            };
            if object.marked {
                continue;
            }
            object.marked = true;
            marked += 1;
            object.visit_edges(&mut |child| worklist.push(child));
        }
        marked
    }

    fn sweep(&mut self) -> (usize, usize) {
        let mut freed_objects = 0;
        let mut freed_bytes = 0;

        let mut cursor = self.header;
        while let Some(index) = cursor {
            let entry = &mut self.entries[index as usize];
            cursor = entry.next;

            if let Some(object) = entry.object.as_mut() {
                if object.marked {
                    object.marked = false;
                    continue;
                }
            }

            freed_bytes += self.release(index);
            freed_objects += 1;
        }

        (freed_objects, freed_bytes)
    }

    /// Unlinks and frees one slot, returning the bytes it accounted for.
    fn release(&mut self, index: u32) -> usize {
        let (prev, next) = {
            let entry = &self.entries[index as usize];
            (entry.prev, entry.next)
        };
        match prev {
            Some(p) => self.entries[p as usize].next = next,
            None => self.header = next,
        }
        if let Some(n) = next {
            self.entries[n as usize].prev = prev;
        }

        let entry = &mut self.entries[index as usize];
        let size = std::mem::take(&mut entry.size);
        entry.object = None;
        entry.prev = None;
        entry.next = None;
        entry.generation = entry.generation.wrapping_add(1);

        self.free.push(index);
        self.current_heap_size -= size;
        self.object_count -= 1;
        size
    }
}

/// Iterator over the intrusive object list.
pub struct Objects<'a> {
    heap: &'a Heap,
    cursor: Option<u32>,
}

impl<'a> Iterator for Objects<'a> {
    type Item = (ObjectRef, &'a HeapObject);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let index = self.cursor?;
            let entry = &self.heap.entries[index as usize];
            self.cursor = entry.next;
            if let Some(object) = entry.object.as_ref() {
                return Some((ObjectRef::new(index, entry.generation), object));
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use object::{DvmArray, DvmString, Value};

    /// A simple root provider that holds a list of references.
    struct TestRoots {
        roots: Vec<ObjectRef>,
    }

    impl TestRoots {
        fn new() -> Self {
            Self { roots: Vec::new() }
        }

        fn push(&mut self, r: ObjectRef) {
            self.roots.push(r);
        }
    }

    impl RootProvider for TestRoots {
        fn visit_roots(&self, visitor: &mut dyn FnMut(ObjectRef)) {
            for &root in &self.roots {
                visitor(root);
            }
        }
    }

    fn create_test_settings() -> HeapSettings {
        HeapSettings {
            initial_threshold: 1024,
            min_threshold: 1024,
            growth_factor: 2,
            max_heap_size: None,
        }
    }

    fn create_test_env() -> (Heap, TestRoots) {
        (Heap::new(create_test_settings()), TestRoots::new())
    }

    fn string(s: &str) -> HeapObject {
        HeapObject::string(DvmString::new(s))
    }

    fn object_array(elements: &[ObjectRef]) -> HeapObject {
        HeapObject::array(DvmArray::Object(
            elements.iter().copied().map(Some).collect(),
        ))
    }

    fn link(heap: &mut Heap, array: ObjectRef, index: i64, target: ObjectRef) {
        heap.get_mut(array)
            .and_then(HeapObject::as_array_mut)
            .unwrap()
            .set(index, Value::from(target))
            .unwrap();
    }

    #[test]
    fn settings_validation() {
        assert!(HeapSettings::default().validate().is_ok());
        let bad = HeapSettings {
            growth_factor: 1,
            ..HeapSettings::default()
        };
        assert!(bad.validate().is_err());
        let bad = HeapSettings {
            max_heap_size: Some(16),
            ..HeapSettings::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn allocation_accounts_size_and_prepends() {
        let (mut heap, roots) = create_test_env();
        let a = heap.allocate(string("a"), &roots);
        let b = heap.allocate(string("bb"), &roots);

        assert_eq!(
            heap.current_heap_size(),
            2 * HeapObject::HEADER_SIZE + 3
        );
        assert_eq!(heap.object_count(), 2);

        let order: Vec<ObjectRef> = heap.objects().map(|(r, _)| r).collect();
        assert_eq!(order, vec![b, a]);
    }

    #[test]
    fn collect_frees_unreachable() {
        let (mut heap, mut roots) = create_test_env();
        let _garbage = heap.allocate(string("garbage"), &roots);
        let keep = heap.allocate(string("keep"), &roots);
        roots.push(keep);

        let stats = heap.collect(&roots);

        assert_eq!(stats.freed_objects, 1);
        assert_eq!(stats.live_objects, 1);
        assert!(heap.contains(keep));
        assert_eq!(
            heap.current_heap_size(),
            heap.get(keep).unwrap().byte_size()
        );
    }

    #[test]
    fn collect_traces_object_arrays() {
        let (mut heap, mut roots) = create_test_env();
        let inner = heap.allocate(string("inside"), &roots);
        roots.push(inner);
        let outer = heap.allocate(object_array(&[inner]), &roots);
        roots.roots.clear();
        roots.push(outer);

        heap.collect(&roots);

        assert!(heap.contains(inner));
        assert!(heap.contains(outer));
        assert_eq!(heap.object_count(), 2);
    }

    #[test]
    fn live_size_equals_sum_of_marked_objects() {
        let (mut heap, mut roots) = create_test_env();
        let mut kept = Vec::new();
        for i in 0..20 {
            let r = heap.allocate(HeapObject::array(DvmArray::new_int(i)), &roots);
            if i % 3 == 0 {
                roots.push(r);
                kept.push(r);
            }
        }

        heap.collect(&roots);

        let expected: usize = kept
            .iter()
            .map(|&r| heap.get(r).unwrap().byte_size())
            .sum();
        assert_eq!(heap.current_heap_size(), expected);
        assert_eq!(heap.object_count(), kept.len());
        assert!(heap.objects().all(|(_, o)| !o.marked));
    }

    #[test]
    fn dropping_all_roots_empties_heap() {
        let (mut heap, roots) = create_test_env();
        for i in 0..50 {
            heap.allocate(string(&format!("s{i}")), &NoRoots);
        }
        heap.collect(&roots);

        assert_eq!(heap.current_heap_size(), 0);
        assert_eq!(heap.object_count(), 0);
        assert_eq!(heap.objects().count(), 0);
    }

    #[test]
    fn second_collection_changes_nothing() {
        let (mut heap, mut roots) = create_test_env();
        for i in 0..10 {
            let r = heap.allocate(HeapObject::array(DvmArray::new_double(i * 10)), &roots);
            if i % 2 == 0 {
                roots.push(r);
            }
        }

        let first = heap.collect(&roots);
        let second = heap.collect(&roots);

        assert_eq!(second.freed_objects, 0);
        assert_eq!(second.freed_bytes, 0);
        assert_eq!(second.live_bytes, first.live_bytes);
        assert_eq!(second.threshold, first.threshold);
    }

    #[test]
    fn cycle_without_root_is_collected() {
        let (mut heap, mut roots) = create_test_env();
        let a = heap.allocate(HeapObject::array(DvmArray::new_object(1)), &roots);
        roots.push(a);
        let b = heap.allocate(object_array(&[a]), &roots);
        link(&mut heap, a, 0, b);
        roots.roots.clear();

        let stats = heap.collect(&roots);

        assert_eq!(stats.freed_objects, 2);
        assert!(!heap.contains(a));
        assert!(!heap.contains(b));
        assert_eq!(heap.current_heap_size(), 0);
    }

    #[test]
    fn rooted_cycle_survives() {
        let (mut heap, mut roots) = create_test_env();
        let a = heap.allocate(HeapObject::array(DvmArray::new_object(1)), &roots);
        roots.push(a);
        let b = heap.allocate(object_array(&[a]), &roots);
        link(&mut heap, a, 0, b);

        heap.collect(&roots);

        assert!(heap.contains(a));
        assert!(heap.contains(b));
    }

    #[test]
    fn threshold_follows_live_size() {
        let (mut heap, mut roots) = create_test_env();
        let big = heap.allocate(HeapObject::array(DvmArray::new_int(1000)), &roots);
        roots.push(big);

        let stats = heap.collect(&roots);
        let live = heap.get(big).unwrap().byte_size();
        assert_eq!(stats.threshold, live * 2);

        roots.roots.clear();
        let stats = heap.collect(&roots);
        assert_eq!(stats.threshold, 1024);
    }

    #[test]
    fn allocation_over_threshold_collects_first() {
        let (mut heap, roots) = create_test_env();
        while heap.current_heap_size() <= heap.current_threshold() {
            heap.allocate(HeapObject::array(DvmArray::new_int(16)), &roots);
        }
        assert_eq!(heap.collections(), 0);

        let survivor = heap.allocate(string("after"), &roots);

        assert_eq!(heap.collections(), 1);
        assert_eq!(heap.object_count(), 1);
        assert!(heap.contains(survivor));
    }

    #[test]
    fn freed_slot_is_reused_with_new_generation() {
        let (mut heap, roots) = create_test_env();
        let old = heap.allocate(string("old"), &roots);
        heap.collect(&roots);
        let new = heap.allocate(string("new"), &roots);

        assert_eq!(old.index(), new.index());
        assert_ne!(old.generation(), new.generation());
        assert!(heap.get(old).is_none());
        assert_eq!(
            heap.get(new).and_then(HeapObject::as_string).map(|s| s.as_str()),
            Some("new")
        );
    }

    #[test]
    fn unlinking_middle_keeps_list_consistent() {
        let (mut heap, mut roots) = create_test_env();
        let a = heap.allocate(string("a"), &roots);
        let b = heap.allocate(string("b"), &roots);
        let c = heap.allocate(string("c"), &roots);
        roots.push(a);
        roots.push(c);

        heap.collect(&roots);

        let order: Vec<ObjectRef> = heap.objects().map(|(r, _)| r).collect();
        assert_eq!(order, vec![c, a]);
        assert!(!heap.contains(b));
    }

    #[test]
    fn update_reaccounts_growth() {
        let (mut heap, mut roots) = create_test_env();
        let r = heap.allocate(HeapObject::array(DvmArray::new_int(0)), &roots);
        roots.push(r);
        let before = heap.current_heap_size();

        heap.update(r, &roots, |o| {
            o.as_array_mut().unwrap().push(Value::Int(1));
        })
        .unwrap();

        let after = heap.current_heap_size();
        assert!(after > before);
        assert_eq!(after, heap.get(r).unwrap().byte_size());
    }

    #[test]
    fn growth_past_threshold_collects() {
        let (mut heap, mut roots) = create_test_env();
        let garbage = heap.allocate(string("garbage"), &roots);
        let r = heap.allocate(HeapObject::array(DvmArray::new_int(0)), &roots);
        roots.push(r);

        let mut n = 0;
        while heap.collections() == 0 {
            heap.update(r, &roots, |o| {
                o.as_array_mut().unwrap().push(Value::Int(n));
            })
            .unwrap();
            n += 1;
        }

        assert!(!heap.contains(garbage));
        assert_eq!(heap.object_count(), 1);
        assert_eq!(heap.current_heap_size(), heap.get(r).unwrap().byte_size());
        assert_eq!(
            heap.get(r).and_then(HeapObject::as_array).unwrap().size(),
            n as usize
        );
    }

    #[test]
    fn shrinking_update_does_not_collect() {
        let (mut heap, roots) = create_test_env();
        let r = heap.allocate(HeapObject::array(DvmArray::new_int(64)), &roots);
        heap.allocate(HeapObject::array(DvmArray::new_int(64)), &roots);
        while heap.current_heap_size() <= heap.current_threshold() {
            heap.allocate(HeapObject::array(DvmArray::new_int(16)), &roots);
        }

        heap.update(r, &roots, |o| {
            *o = HeapObject::array(DvmArray::new_int(0));
        })
        .unwrap();
        assert_eq!(heap.collections(), 0);
    }

    #[test]
    #[should_panic(expected = "dvm heap exhausted")]
    fn growth_past_hard_limit_is_fatal() {
        let settings = HeapSettings {
            max_heap_size: Some(4096),
            ..create_test_settings()
        };
        let mut heap = Heap::new(settings);
        let mut roots = TestRoots::new();
        let r = heap.allocate(HeapObject::array(DvmArray::new_int(0)), &roots);
        roots.push(r);
        for n in 0..100_000 {
            heap.update(r, &roots, |o| {
                o.as_array_mut().unwrap().push(Value::Int(n));
            });
        }
    }

    #[test]
    fn empty_strings_take_part_in_collection() {
        let (mut heap, mut roots) = create_test_env();
        let kept = heap.allocate(string(""), &roots);
        let dropped = heap.allocate(string(""), &roots);
        roots.push(kept);

        let stats = heap.collect(&roots);

        assert_eq!(stats.freed_objects, 1);
        assert_eq!(stats.freed_bytes, HeapObject::HEADER_SIZE);
        assert!(heap.contains(kept));
        assert!(!heap.contains(dropped));
        assert_eq!(
            heap.get(kept).and_then(HeapObject::as_string).map(|s| s.as_str()),
            Some("")
        );
        assert_eq!(heap.current_heap_size(), HeapObject::HEADER_SIZE);
    }

    #[test]
    #[should_panic(expected = "invalid heap settings")]
    fn invalid_settings_are_rejected() {
        Heap::new(HeapSettings {
            growth_factor: 0,
            ..create_test_settings()
        });
    }

    #[test]
    #[should_panic(expected = "dvm heap exhausted")]
    fn hard_limit_is_fatal() {
        let settings = HeapSettings {
            max_heap_size: Some(2048),
            ..create_test_settings()
        };
        let mut heap = Heap::new(settings);
        let mut roots = TestRoots::new();
        loop {
            let r = heap.allocate(HeapObject::array(DvmArray::new_int(32)), &roots);
            roots.push(r);
        }
    }
}
