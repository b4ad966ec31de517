//! The object heap: allocation, string interning and mark-sweep collection.
//!
//! Objects live in an arena of slots addressed by [`ObjRef`]. Each slot
//! carries a generation that is bumped when its object is freed; a handle
//! from an older generation is rejected by every accessor. Every
//! allocated slot is also threaded onto an intrusive singly linked list
//! (`head` → `next` → ...). The list decides whether an object exists; the
//! mark bit only decides whether it was reached during the current cycle.
//!
//! Collection is triggered from [`Heap::alloc`] when the running byte count
//! passes `next_gc` (or on every allocation in stress mode). The caller
//! supplies its roots through [`GcRoots`]. After tracing, unmarked strings
//! are dropped from the intern table before the sweep, so the table never
//! resurrects garbage.

use std::fmt;

use log::{debug, log_enabled, trace, Level};
use lox_common::{format_number, ObjRef, Value};

use crate::object::{
    trace_table, ObjBoundMethod, ObjClass, ObjClosure, ObjFunction, ObjInstance, ObjKind,
    ObjNative, ObjString, ObjUpvalue, Object,
};
use crate::table::{Key, Table};

/// Collector tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcConfig {
    /// Collect before every allocation.
    pub stress: bool,
    /// Byte count that triggers the first collection.
    pub initial_threshold: usize,
    /// After a collection the next threshold is live bytes times this.
    pub grow_factor: usize,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            stress: false,
            initial_threshold: 1024 * 1024,
            grow_factor: 2,
        }
    }
}

/// Anything that owns live references into the heap.
///
/// Implementors mark each root with [`Heap::mark_value`],
/// [`Heap::mark_object`] or [`Heap::mark_table`].
pub trait GcRoots {
    fn mark_roots(&self, heap: &mut Heap);
}

/// A root set with nothing in it.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRoots;

impl GcRoots for NoRoots {
    fn mark_roots(&self, _heap: &mut Heap) {}
}

#[derive(Debug)]
struct Slot {
    marked: bool,
    next: Option<ObjRef>,
    size: usize,
    object: Object,
}

#[derive(Debug)]
struct Entry {
    generation: u32,
    slot: Option<Slot>,
}

/// The live slot `r` names, if its generation still matches.
fn live_slot(entries: &[Entry], r: ObjRef) -> Option<&Slot> {
    match entries.get(r.index()) {
        Some(Entry {
            generation,
            slot: Some(slot),
        }) if *generation == r.generation() => Some(slot),
        _ => None,
    }
}

/// Collector-owned object storage.
#[derive(Debug)]
pub struct Heap {
    slots: Vec<Entry>,
    free: Vec<usize>,
    head: Option<ObjRef>,
    strings: Table,
    gray: Vec<ObjRef>,
    scratch: Vec<ObjRef>,
    bytes_allocated: usize,
    next_gc: usize,
    collections: usize,
    config: GcConfig,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new(GcConfig::default())
    }
}

impl Heap {
    pub fn new(config: GcConfig) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            strings: Table::new(),
            gray: Vec::new(),
            scratch: Vec::new(),
            bytes_allocated: 0,
            next_gc: config.initial_threshold,
            collections: 0,
            config,
        }
    }

    /// Bytes currently charged to live objects.
    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated
    }

    /// Byte count at which the next collection runs.
    pub fn next_gc(&self) -> usize {
        self.next_gc
    }

    /// Number of completed collections.
    pub fn collections(&self) -> usize {
        self.collections
    }

    /// Number of objects on the allocation list.
    pub fn object_count(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Number of strings in the intern table.
    pub fn interned_count(&self) -> usize {
        self.strings.len()
    }

    /// Whether `r` still names an allocated object.
    pub fn contains(&self, r: ObjRef) -> bool {
        live_slot(&self.slots, r).is_some()
    }

    // ---- Allocation ----

    /// Allocate `object`, collecting first if the heap is over budget.
    ///
    /// Handles held inside `object` are treated as roots for that
    /// collection, so callers may build an object from values they have
    /// already popped.
    pub fn alloc(&mut self, object: Object, roots: &dyn GcRoots) -> ObjRef {
        let size = object.size();
        self.bytes_allocated += size;

        if self.config.stress || self.bytes_allocated > self.next_gc {
            let mut pending = std::mem::take(&mut self.scratch);
            object.trace(&mut pending);
            for r in pending.drain(..) {
                self.mark_object(r);
            }
            self.scratch = pending;
            self.collect_garbage(roots);
        }

        let kind = object.kind();
        let slot = Slot {
            marked: false,
            next: self.head,
            size,
            object,
        };
        let r = match self.free.pop() {
            Some(index) => {
                let entry = &mut self.slots[index];
                entry.slot = Some(slot);
                ObjRef::new(index, entry.generation)
            }
            None => {
                self.slots.push(Entry {
                    generation: 0,
                    slot: Some(slot),
                });
                ObjRef::from_index(self.slots.len() - 1)
            }
        };
        self.head = Some(r);
        trace!("alloc {r} {size} bytes for {}", kind.name());
        r
    }

    /// Return the interned string with these contents, allocating it if
    /// needed.
    pub fn intern(&mut self, chars: &str, roots: &dyn GcRoots) -> ObjRef {
        let hash = crate::object::hash_string(chars);
        if let Some(existing) = self.find_interned(chars, hash) {
            return existing;
        }
        self.insert_string(ObjString::new(chars), roots)
    }

    /// Like [`Heap::intern`], but takes ownership of an already built
    /// buffer (the result of a concatenation, say).
    pub fn take_string(&mut self, chars: String, roots: &dyn GcRoots) -> ObjRef {
        let hash = crate::object::hash_string(&chars);
        if let Some(existing) = self.find_interned(&chars, hash) {
            return existing;
        }
        self.insert_string(ObjString::new(chars), roots)
    }

    fn find_interned(&self, chars: &str, hash: u32) -> Option<ObjRef> {
        let slots = &self.slots;
        self.strings.find_by(hash, |r| match live_slot(slots, r) {
            Some(Slot {
                object: Object::String(s),
                ..
            }) => &*s.chars == chars,
            _ => false,
        })
    }

    fn insert_string(&mut self, string: ObjString, roots: &dyn GcRoots) -> ObjRef {
        let hash = string.hash;
        let r = self.alloc(Object::String(string), roots);
        self.strings.set(Key::new(r, hash), Value::Nil);
        r
    }

    // ---- Access ----

    /// The object behind `r`.
    ///
    /// # Panics
    ///
    /// Panics if `r` has been freed, even when its slot now holds a newer
    /// object. A live program never holds such a handle; reaching this
    /// panic means a root was missed.
    pub fn get(&self, r: ObjRef) -> &Object {
        match live_slot(&self.slots, r) {
            Some(slot) => &slot.object,
            None => panic!("use of freed object {r}"),
        }
    }

    /// Mutable access to the object behind `r`. Panics like [`Heap::get`].
    pub fn get_mut(&mut self, r: ObjRef) -> &mut Object {
        match self.slot_mut(r) {
            Some(slot) => &mut slot.object,
            None => panic!("use of freed object {r}"),
        }
    }

    fn slot_mut(&mut self, r: ObjRef) -> Option<&mut Slot> {
        match self.slots.get_mut(r.index()) {
            Some(Entry {
                generation,
                slot: Some(slot),
            }) if *generation == r.generation() => Some(slot),
            _ => None,
        }
    }

    /// Type tag of the object a value refers to, if it refers to one.
    pub fn kind_of(&self, value: Value) -> Option<ObjKind> {
        value.as_obj().map(|r| self.get(r).kind())
    }

    pub fn is_string(&self, value: Value) -> bool {
        self.kind_of(value) == Some(ObjKind::String)
    }

    /// Table key for the interned string `r`.
    pub fn key(&self, r: ObjRef) -> Key {
        Key::new(r, self.string(r).hash)
    }

    pub fn string(&self, r: ObjRef) -> &ObjString {
        match self.get(r) {
            Object::String(s) => s,
            other => type_confusion(r, ObjKind::String, other),
        }
    }

    /// The contents of the string `r`.
    pub fn str(&self, r: ObjRef) -> &str {
        &self.string(r).chars
    }

    pub fn function(&self, r: ObjRef) -> &ObjFunction {
        match self.get(r) {
            Object::Function(f) => f,
            other => type_confusion(r, ObjKind::Function, other),
        }
    }

    pub fn native(&self, r: ObjRef) -> &ObjNative {
        match self.get(r) {
            Object::Native(n) => n,
            other => type_confusion(r, ObjKind::Native, other),
        }
    }

    pub fn closure(&self, r: ObjRef) -> &ObjClosure {
        match self.get(r) {
            Object::Closure(c) => c,
            other => type_confusion(r, ObjKind::Closure, other),
        }
    }

    pub fn upvalue(&self, r: ObjRef) -> &ObjUpvalue {
        match self.get(r) {
            Object::Upvalue(u) => u,
            other => type_confusion(r, ObjKind::Upvalue, other),
        }
    }

    pub fn upvalue_mut(&mut self, r: ObjRef) -> &mut ObjUpvalue {
        match self.get_mut(r) {
            Object::Upvalue(u) => u,
            other => type_confusion(r, ObjKind::Upvalue, other),
        }
    }

    pub fn class(&self, r: ObjRef) -> &ObjClass {
        match self.get(r) {
            Object::Class(c) => c,
            other => type_confusion(r, ObjKind::Class, other),
        }
    }

    fn class_mut(&mut self, r: ObjRef) -> &mut ObjClass {
        match self.get_mut(r) {
            Object::Class(c) => c,
            other => type_confusion(r, ObjKind::Class, other),
        }
    }

    pub fn instance(&self, r: ObjRef) -> &ObjInstance {
        match self.get(r) {
            Object::Instance(i) => i,
            other => type_confusion(r, ObjKind::Instance, other),
        }
    }

    fn instance_mut(&mut self, r: ObjRef) -> &mut ObjInstance {
        match self.get_mut(r) {
            Object::Instance(i) => i,
            other => type_confusion(r, ObjKind::Instance, other),
        }
    }

    pub fn bound_method(&self, r: ObjRef) -> &ObjBoundMethod {
        match self.get(r) {
            Object::BoundMethod(b) => b,
            other => type_confusion(r, ObjKind::BoundMethod, other),
        }
    }

    /// Name of a function for diagnostics: its own name, or `script`.
    pub fn function_name(&self, function: ObjRef) -> &str {
        match self.function(function).name {
            Some(name) => self.str(name),
            None => "script",
        }
    }

    // ---- Growth in place ----

    /// Set a field on an instance.
    pub fn set_field(&mut self, instance: ObjRef, key: Key, value: Value) {
        self.instance_mut(instance).fields.set(key, value);
        self.recharge(instance);
    }

    /// Define or replace a method on a class.
    pub fn set_method(&mut self, class: ObjRef, key: Key, method: Value) {
        self.class_mut(class).methods.set(key, method);
        self.recharge(class);
    }

    /// Copy every method of `superclass` into `subclass`, replacing
    /// methods of the same name.
    pub fn inherit_methods(&mut self, superclass: ObjRef, subclass: ObjRef) {
        let methods = self.class(superclass).methods.clone();
        methods.add_all(&mut self.class_mut(subclass).methods);
        self.recharge(subclass);
    }

    /// Re-measure an object whose tables may have grown and charge the
    /// difference. The next allocation sees the new total.
    fn recharge(&mut self, r: ObjRef) {
        let Some(slot) = self.slot_mut(r) else {
            return;
        };
        let size = slot.object.size();
        let old = std::mem::replace(&mut slot.size, size);
        self.bytes_allocated = self.bytes_allocated - old + size;
    }

    // ---- Collection ----

    /// Mark a value if it refers to an object.
    pub fn mark_value(&mut self, value: Value) {
        if let Value::Obj(r) = value {
            self.mark_object(r);
        }
    }

    /// Mark an object and queue it for tracing.
    pub fn mark_object(&mut self, r: ObjRef) {
        let Some(slot) = self.slot_mut(r) else {
            return;
        };
        if slot.marked {
            return;
        }
        slot.marked = true;
        self.gray.push(r);
    }

    /// Mark every key and value in a table.
    pub fn mark_table(&mut self, table: &Table) {
        let mut refs = std::mem::take(&mut self.scratch);
        trace_table(table, &mut refs);
        for r in refs.drain(..) {
            self.mark_object(r);
        }
        self.scratch = refs;
    }

    /// Run a full mark-sweep cycle.
    ///
    /// Normally reached through [`Heap::alloc`]; exposed so embedders and
    /// tests can force a cycle at a known point.
    pub fn collect_garbage(&mut self, roots: &dyn GcRoots) {
        let before = self.bytes_allocated;
        debug!("-- gc begin");

        roots.mark_roots(self);
        self.trace_references();
        let slots = &self.slots;
        self.strings
            .retain_keys(|r| live_slot(slots, r).is_some_and(|slot| slot.marked));
        self.sweep();

        self.next_gc = self.bytes_allocated * self.config.grow_factor;
        self.collections += 1;
        debug!(
            "-- gc end: collected {} bytes (from {} to {}) next at {}",
            before - self.bytes_allocated,
            before,
            self.bytes_allocated,
            self.next_gc
        );
    }

    fn trace_references(&mut self) {
        while let Some(r) = self.gray.pop() {
            self.blacken(r);
        }
    }

    fn blacken(&mut self, r: ObjRef) {
        let mut refs = std::mem::take(&mut self.scratch);
        if let Some(slot) = live_slot(&self.slots, r) {
            if log_enabled!(Level::Trace) {
                trace!("blacken {r} {}", slot.object.kind().name());
            }
            slot.object.trace(&mut refs);
        }
        for child in refs.drain(..) {
            self.mark_object(child);
        }
        self.scratch = refs;
    }

    fn sweep(&mut self) {
        let mut previous: Option<ObjRef> = None;
        let mut current = self.head;

        while let Some(r) = current {
            let Some(slot) = self.slot_mut(r) else {
                break;
            };
            let next = slot.next;
            if slot.marked {
                slot.marked = false;
                previous = Some(r);
            } else {
                match previous {
                    Some(p) => {
                        if let Some(prev_slot) = self.slot_mut(p) {
                            prev_slot.next = next;
                        }
                    }
                    None => self.head = next,
                }
                self.free_slot(r);
            }
            current = next;
        }
    }

    fn free_slot(&mut self, r: ObjRef) {
        let Some(entry) = self
            .slots
            .get_mut(r.index())
            .filter(|entry| entry.generation == r.generation())
        else {
            return;
        };
        let Some(slot) = entry.slot.take() else {
            return;
        };
        entry.generation = entry.generation.wrapping_add(1);
        trace!("free {r} {}", slot.object.kind().name());
        self.bytes_allocated -= slot.size;
        self.free.push(r.index());
    }

    // ---- Printing ----

    /// Display adapter printing `value` the way `print` does.
    pub fn display(&self, value: Value) -> ValueDisplay<'_> {
        ValueDisplay { heap: self, value }
    }
}

#[cold]
fn type_confusion(r: ObjRef, expected: ObjKind, found: &Object) -> ! {
    panic!(
        "object {r} is a {}, expected a {}",
        found.kind().name(),
        expected.name()
    )
}

/// Formats a value with heap access. See [`Heap::display`].
pub struct ValueDisplay<'a> {
    heap: &'a Heap,
    value: Value,
}

impl ValueDisplay<'_> {
    fn fmt_function(&self, f: &mut fmt::Formatter<'_>, function: ObjRef) -> fmt::Result {
        match self.heap.function(function).name {
            Some(name) => write!(f, "<fn {}>", self.heap.str(name)),
            None => write!(f, "<script>"),
        }
    }
}

impl fmt::Display for ValueDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = match self.value {
            Value::Nil => return write!(f, "nil"),
            Value::Bool(b) => return write!(f, "{b}"),
            Value::Number(n) => return write!(f, "{}", format_number(n)),
            Value::Obj(r) => r,
        };
        match self.heap.get(r) {
            Object::String(s) => write!(f, "{}", s.chars),
            Object::Function(_) => self.fmt_function(f, r),
            Object::Native(_) => write!(f, "<native fn>"),
            Object::Closure(c) => self.fmt_function(f, c.function),
            Object::Upvalue(_) => write!(f, "upvalue"),
            Object::Class(c) => write!(f, "{}", self.heap.str(c.name)),
            Object::Instance(i) => {
                let class = self.heap.class(i.class);
                write!(f, "{} instance", self.heap.str(class.name))
            }
            Object::BoundMethod(b) => {
                let function = self.heap.closure(b.method).function;
                self.fmt_function(f, function)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Roots held in plain vectors, for driving the collector directly.
    #[derive(Default)]
    struct TestRoots {
        values: Vec<Value>,
    }

    impl GcRoots for TestRoots {
        fn mark_roots(&self, heap: &mut Heap) {
            for &value in &self.values {
                heap.mark_value(value);
            }
        }
    }

    fn stress_heap() -> Heap {
        Heap::new(GcConfig {
            stress: true,
            ..GcConfig::default()
        })
    }

    #[test]
    fn intern_returns_same_handle() {
        let mut heap = Heap::default();
        let a = heap.intern("ab", &NoRoots);
        let b = heap.intern("ab", &NoRoots);
        let c = heap.take_string(String::from("ab"), &NoRoots);
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(heap.interned_count(), 1);
        assert_eq!(heap.str(a), "ab");
    }

    #[test]
    fn distinct_contents_distinct_handles() {
        let mut heap = Heap::default();
        let a = heap.intern("a", &NoRoots);
        let b = heap.intern("b", &NoRoots);
        assert_ne!(a, b);
        assert_eq!(heap.object_count(), 2);
    }

    #[test]
    fn unrooted_objects_are_swept() {
        let mut heap = Heap::default();
        let garbage = heap.intern("garbage", &NoRoots);
        let kept = heap.intern("kept", &NoRoots);
        let roots = TestRoots {
            values: vec![Value::Obj(kept)],
        };
        heap.collect_garbage(&roots);
        assert!(!heap.contains(garbage));
        assert!(heap.contains(kept));
        assert_eq!(heap.object_count(), 1);
        assert_eq!(heap.collections(), 1);
    }

    #[test]
    fn intern_table_is_weak() {
        let mut heap = Heap::default();
        heap.intern("temp", &NoRoots);
        heap.collect_garbage(&NoRoots);
        assert_eq!(heap.interned_count(), 0);
        // Re-interning after the sweep makes a fresh, valid string.
        let again = heap.intern("temp", &NoRoots);
        assert_eq!(heap.str(again), "temp");
    }

    #[test]
    fn reachability_is_transitive() {
        let mut heap = Heap::default();
        let name = heap.intern("Point", &NoRoots);
        let class = heap.alloc(Object::Class(ObjClass::new(name)), &NoRoots);
        let field = heap.intern("x", &NoRoots);
        let value = heap.intern("payload", &NoRoots);
        let instance = heap.alloc(Object::Instance(ObjInstance::new(class)), &NoRoots);
        let key = heap.key(field);
        heap.set_field(instance, key, Value::Obj(value));

        let roots = TestRoots {
            values: vec![Value::Obj(instance)],
        };
        heap.collect_garbage(&roots);
        for r in [name, class, field, value, instance] {
            assert!(heap.contains(r), "{r} should survive");
        }
    }

    #[test]
    fn cycles_are_collected() {
        let mut heap = Heap::default();
        let function = heap.alloc(Object::Function(ObjFunction::default()), &NoRoots);
        let upvalue = heap.alloc(Object::Upvalue(ObjUpvalue::open(0)), &NoRoots);
        let closure = heap.alloc(
            Object::Closure(ObjClosure {
                function,
                upvalues: vec![upvalue],
            }),
            &NoRoots,
        );
        // Close the upvalue over the closure itself.
        heap.upvalue_mut(upvalue).state = crate::UpvalueState::Closed(Value::Obj(closure));

        let roots = TestRoots {
            values: vec![Value::Obj(closure)],
        };
        heap.collect_garbage(&roots);
        assert_eq!(heap.object_count(), 3);

        heap.collect_garbage(&NoRoots);
        assert_eq!(heap.object_count(), 0);
        assert_eq!(heap.bytes_allocated(), 0);
    }

    #[test]
    fn pending_object_keeps_its_references() {
        let mut heap = stress_heap();
        let name = heap.intern("method", &NoRoots);
        // `name` is unrooted, but the function being allocated refers to
        // it, so the collection run by this allocation must keep it.
        let function = heap.alloc(
            Object::Function(ObjFunction {
                name: Some(name),
                ..ObjFunction::default()
            }),
            &NoRoots,
        );
        assert!(heap.contains(name));
        assert_eq!(heap.function_name(function), "method");
    }

    #[test]
    fn stress_mode_collects_on_every_allocation() {
        let mut heap = stress_heap();
        let mut roots = TestRoots::default();
        for i in 0..50 {
            let s = heap.take_string(format!("s{i}"), &roots);
            if i % 2 == 0 {
                roots.values.push(Value::Obj(s));
            }
        }
        assert_eq!(heap.collections(), 50);
        heap.collect_garbage(&roots);
        assert_eq!(heap.object_count(), 25);
        for value in &roots.values {
            let r = value.as_obj().unwrap();
            assert!(heap.str(r).starts_with('s'));
        }
    }

    #[test]
    fn threshold_grows_from_live_bytes() {
        let mut heap = Heap::new(GcConfig {
            stress: false,
            initial_threshold: 0,
            grow_factor: 3,
        });
        let kept = heap.intern("kept", &NoRoots);
        let roots = TestRoots {
            values: vec![Value::Obj(kept)],
        };
        heap.collect_garbage(&roots);
        assert_eq!(heap.next_gc(), heap.bytes_allocated() * 3);
    }

    #[test]
    fn freed_slots_are_reused() {
        let mut heap = Heap::default();
        let a = heap.intern("a", &NoRoots);
        heap.collect_garbage(&NoRoots);
        let b = heap.intern("b", &NoRoots);
        assert_eq!(a.index(), b.index());
        assert_ne!(a, b);
        assert_eq!(heap.str(b), "b");
        assert!(!heap.contains(a));
        assert!(heap.contains(b));
    }

    #[test]
    #[should_panic(expected = "use of freed object #0")]
    fn stale_handle_to_reused_slot_panics() {
        let mut heap = stress_heap();
        let first = heap.intern("first", &NoRoots);
        // The stress collection frees `first`, then its slot is reused.
        let second = heap.intern("second", &NoRoots);
        assert_eq!(first.index(), second.index());
        heap.str(first);
    }

    #[test]
    fn stale_handle_is_not_marked() {
        let mut heap = Heap::default();
        let a = heap.intern("a", &NoRoots);
        heap.collect_garbage(&NoRoots);
        let b = heap.intern("b", &NoRoots);
        // Rooting the stale handle must not keep the new occupant alive.
        let roots = TestRoots {
            values: vec![Value::Obj(a)],
        };
        heap.collect_garbage(&roots);
        assert!(!heap.contains(b));
        assert_eq!(heap.object_count(), 0);
    }

    #[test]
    fn table_growth_is_charged() {
        let mut heap = Heap::default();
        let name = heap.intern("Box", &NoRoots);
        let class = heap.alloc(Object::Class(ObjClass::new(name)), &NoRoots);
        let instance = heap.alloc(Object::Instance(ObjInstance::new(class)), &NoRoots);
        let before = heap.bytes_allocated();

        let field = heap.intern("width", &NoRoots);
        let after_intern = heap.bytes_allocated();
        let key = heap.key(field);
        heap.set_field(instance, key, Value::Number(1.0));
        assert!(heap.bytes_allocated() > after_intern);
        assert!(after_intern > before);

        let roots = TestRoots {
            values: vec![Value::Obj(instance)],
        };
        heap.collect_garbage(&roots);
        heap.collect_garbage(&NoRoots);
        assert_eq!(heap.bytes_allocated(), 0);
    }

    #[test]
    fn inherited_methods_are_copied_and_charged() {
        let mut heap = Heap::default();
        let base_name = heap.intern("Base", &NoRoots);
        let base = heap.alloc(Object::Class(ObjClass::new(base_name)), &NoRoots);
        let derived_name = heap.intern("Derived", &NoRoots);
        let derived = heap.alloc(Object::Class(ObjClass::new(derived_name)), &NoRoots);
        let method_name = heap.intern("greet", &NoRoots);
        let key = heap.key(method_name);
        heap.set_method(base, key, Value::Nil);

        let before = heap.bytes_allocated();
        heap.inherit_methods(base, derived);
        assert!(heap.bytes_allocated() > before);
        assert_eq!(heap.class(derived).methods.get(key), Some(Value::Nil));
    }

    #[test]
    #[should_panic(expected = "use of freed object")]
    fn freed_handle_panics() {
        let mut heap = Heap::default();
        let a = heap.intern("a", &NoRoots);
        heap.collect_garbage(&NoRoots);
        heap.get(a);
    }

    #[test]
    fn display_values() {
        let mut heap = Heap::default();
        assert_eq!(heap.display(Value::Nil).to_string(), "nil");
        assert_eq!(heap.display(Value::Bool(true)).to_string(), "true");
        assert_eq!(heap.display(Value::Number(2.5)).to_string(), "2.5");

        let s = heap.intern("hello", &NoRoots);
        assert_eq!(heap.display(Value::Obj(s)).to_string(), "hello");

        let script = heap.alloc(Object::Function(ObjFunction::default()), &NoRoots);
        assert_eq!(heap.display(Value::Obj(script)).to_string(), "<script>");

        let name = heap.intern("area", &NoRoots);
        let function = heap.alloc(
            Object::Function(ObjFunction {
                name: Some(name),
                ..ObjFunction::default()
            }),
            &NoRoots,
        );
        let closure = heap.alloc(
            Object::Closure(ObjClosure {
                function,
                upvalues: Vec::new(),
            }),
            &NoRoots,
        );
        assert_eq!(heap.display(Value::Obj(closure)).to_string(), "<fn area>");

        let class_name = heap.intern("Shape", &NoRoots);
        let class = heap.alloc(Object::Class(ObjClass::new(class_name)), &NoRoots);
        let instance = heap.alloc(Object::Instance(ObjInstance::new(class)), &NoRoots);
        assert_eq!(heap.display(Value::Obj(class)).to_string(), "Shape");
        assert_eq!(
            heap.display(Value::Obj(instance)).to_string(),
            "Shape instance"
        );

        let bound = heap.alloc(
            Object::BoundMethod(ObjBoundMethod {
                receiver: Value::Obj(instance),
                method: closure,
            }),
            &NoRoots,
        );
        assert_eq!(heap.display(Value::Obj(bound)).to_string(), "<fn area>");
    }
}
