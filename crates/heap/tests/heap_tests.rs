//! Integration tests for the Lox heap: interning, reachability and the
//! collection schedule.

use lox_common::{ObjRef, Value};
use lox_heap::{
    GcConfig, GcRoots, Heap, NoRoots, ObjClass, ObjClosure, ObjFunction, ObjInstance, ObjKind,
    ObjUpvalue, Object, Table, UpvalueState,
};

// ============================================================
// Helper functions
// ============================================================

/// A root set shaped like the VM's: a value stack plus a globals table.
#[derive(Default)]
struct Roots {
    stack: Vec<Value>,
    globals: Table,
}

impl GcRoots for Roots {
    fn mark_roots(&self, heap: &mut Heap) {
        for &value in &self.stack {
            heap.mark_value(value);
        }
        heap.mark_table(&self.globals);
    }
}

fn stressed() -> Heap {
    Heap::new(GcConfig {
        stress: true,
        ..GcConfig::default()
    })
}

fn named_function(heap: &mut Heap, name: &str, roots: &dyn GcRoots) -> ObjRef {
    let name = heap.intern(name, roots);
    heap.alloc(
        Object::Function(ObjFunction {
            name: Some(name),
            ..ObjFunction::default()
        }),
        roots,
    )
}

// ============================================================
// Interning
// ============================================================

#[test]
fn equal_contents_share_one_object() {
    let mut heap = Heap::default();
    let a = heap.intern("ab", &NoRoots);
    let b = heap.take_string(format!("{}{}", "a", "b"), &NoRoots);
    assert_eq!(a, b);
    assert_eq!(heap.object_count(), 1);
}

#[test]
fn empty_string_is_interned() {
    let mut heap = Heap::default();
    let a = heap.intern("", &NoRoots);
    let b = heap.intern("", &NoRoots);
    assert_eq!(a, b);
    assert!(heap.string(a).is_empty());
}

#[test]
fn interned_string_dies_when_unreferenced() {
    let mut heap = Heap::default();
    let mut roots = Roots::default();
    let s = heap.intern("short lived", &roots);
    roots.stack.push(Value::Obj(s));
    heap.collect_garbage(&roots);
    assert_eq!(heap.interned_count(), 1);

    roots.stack.clear();
    heap.collect_garbage(&roots);
    assert_eq!(heap.interned_count(), 0);
    assert!(!heap.contains(s));
}

// ============================================================
// Reachability
// ============================================================

#[test]
fn globals_keys_and_values_are_roots() {
    let mut heap = stressed();
    let mut roots = Roots::default();
    let name = heap.intern("answer", &roots);
    roots.stack.push(Value::Obj(name));
    let value = heap.intern("forty-two", &roots);
    let key = heap.key(name);
    roots.globals.set(key, Value::Obj(value));
    roots.stack.clear();

    heap.collect_garbage(&roots);
    assert_eq!(heap.str(name), "answer");
    assert_eq!(heap.str(value), "forty-two");
}

#[test]
fn class_methods_survive_through_instance() {
    let mut heap = stressed();
    let mut roots = Roots::default();

    let class_name = heap.intern("Counter", &roots);
    let class = heap.alloc(Object::Class(ObjClass::new(class_name)), &roots);
    roots.stack.push(Value::Obj(class));

    let function = named_function(&mut heap, "inc", &roots);
    roots.stack.push(Value::Obj(function));
    let closure = heap.alloc(
        Object::Closure(ObjClosure {
            function,
            upvalues: Vec::new(),
        }),
        &roots,
    );
    roots.stack.push(Value::Obj(closure));
    let method_name = heap.intern("inc", &roots);
    let key = heap.key(method_name);
    heap.set_method(class, key, Value::Obj(closure));

    let instance = heap.alloc(Object::Instance(ObjInstance::new(class)), &roots);
    roots.stack.clear();
    roots.stack.push(Value::Obj(instance));

    heap.collect_garbage(&roots);
    let class = heap.instance(instance).class;
    let method = heap.class(class).methods.get(key);
    assert_eq!(method, Some(Value::Obj(closure)));
    assert_eq!(heap.display(Value::Obj(closure)).to_string(), "<fn inc>");
}

#[test]
fn closed_upvalue_keeps_its_value() {
    let mut heap = stressed();
    let mut roots = Roots::default();
    let captured = heap.intern("captured", &roots);
    roots.stack.push(Value::Obj(captured));
    let upvalue = heap.alloc(Object::Upvalue(ObjUpvalue::open(0)), &roots);
    heap.upvalue_mut(upvalue).state = UpvalueState::Closed(Value::Obj(captured));
    roots.stack.clear();
    roots.stack.push(Value::Obj(upvalue));

    heap.collect_garbage(&roots);
    assert!(heap.contains(captured));
    assert_eq!(heap.kind_of(Value::Obj(captured)), Some(ObjKind::String));
}

#[test]
fn nothing_survives_without_roots() {
    let mut heap = Heap::default();
    for i in 0..20 {
        named_function(&mut heap, &format!("f{i}"), &NoRoots);
    }
    assert_eq!(heap.object_count(), 40);
    heap.collect_garbage(&NoRoots);
    assert_eq!(heap.object_count(), 0);
    assert_eq!(heap.bytes_allocated(), 0);
}

// ============================================================
// Schedule
// ============================================================

#[test]
fn no_collection_below_threshold() {
    let mut heap = Heap::default();
    for i in 0..10 {
        heap.take_string(format!("s{i}"), &NoRoots);
    }
    assert_eq!(heap.collections(), 0);
    assert_eq!(heap.object_count(), 10);
}

#[test]
fn crossing_threshold_triggers_collection() {
    let mut heap = Heap::new(GcConfig {
        stress: false,
        initial_threshold: 512,
        grow_factor: 2,
    });
    for i in 0..100 {
        heap.take_string(format!("garbage {i}"), &NoRoots);
    }
    assert!(heap.collections() > 0);
    assert!(heap.object_count() < 100);
}

#[test]
fn next_gc_is_live_bytes_times_factor() {
    let mut heap = Heap::default();
    let mut roots = Roots::default();
    for i in 0..5 {
        let s = heap.take_string(format!("live {i}"), &roots);
        roots.stack.push(Value::Obj(s));
    }
    heap.take_string(String::from("dead"), &roots);
    heap.collect_garbage(&roots);
    assert_eq!(heap.object_count(), 5);
    assert_eq!(heap.next_gc(), heap.bytes_allocated() * 2);
}
