//! Lox heap: objects, hash tables and the garbage collector.
//!
//! - [`Heap`]: arena of collector-owned objects with string interning and
//!   a mark-sweep collector
//! - [`Object`] and its variants: strings, functions, natives, closures,
//!   upvalues, classes, instances, bound methods
//! - [`Table`]: open-addressing hash table keyed by interned strings
//! - [`GcRoots`]: how owners of heap references expose them to the
//!   collector
//!
//! # Dependencies
//!
//! `log` for collector tracing; `lox-common` for values and chunks.

pub mod heap;
pub mod object;
pub mod table;

pub use heap::{GcConfig, GcRoots, Heap, NoRoots, ValueDisplay};
pub use object::{
    hash_string, NativeFn, ObjBoundMethod, ObjClass, ObjClosure, ObjFunction, ObjInstance,
    ObjKind, ObjNative, ObjString, ObjUpvalue, Object, UpvalueState,
};
pub use table::{Key, Table, TABLE_MAX_LOAD};

#[cfg(test)]
mod proptests {
    use super::*;
    use lox_common::{ObjRef, Value};
    use proptest::prelude::*;
    use std::collections::HashMap;

    #[derive(Debug, Clone)]
    enum Op {
        Set(usize, f64),
        Delete(usize),
    }

    fn arb_op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0usize..40, any::<i32>()).prop_map(|(k, v)| Op::Set(k, v as f64)),
            (0usize..40).prop_map(Op::Delete),
        ]
    }

    fn key(i: usize) -> Key {
        // Few distinct hashes so probe chains and tombstones get exercised.
        Key::new(ObjRef::from_index(i), (i % 5) as u32)
    }

    proptest! {
        /// The table agrees with a std HashMap under any mix of inserts and
        /// deletes.
        #[test]
        fn table_matches_model(ops in prop::collection::vec(arb_op(), 0..200)) {
            let mut table = Table::new();
            let mut model: HashMap<usize, f64> = HashMap::new();
            for op in &ops {
                match *op {
                    Op::Set(k, v) => {
                        let is_new = table.set(key(k), Value::Number(v));
                        prop_assert_eq!(is_new, model.insert(k, v).is_none());
                    }
                    Op::Delete(k) => {
                        prop_assert_eq!(table.delete(key(k)), model.remove(&k).is_some());
                    }
                }
            }
            prop_assert_eq!(table.len(), model.len());
            for k in 0..40 {
                prop_assert_eq!(table.get(key(k)), model.get(&k).map(|&v| Value::Number(v)));
            }
        }

        /// Interning is content-addressed.
        #[test]
        fn intern_is_content_addressed(words in prop::collection::vec("[a-c]{0,3}", 1..30)) {
            let mut heap = Heap::default();
            let refs: Vec<_> = words.iter().map(|w| heap.intern(w, &NoRoots)).collect();
            for (i, a) in words.iter().enumerate() {
                prop_assert_eq!(heap.str(refs[i]), a.as_str());
                for (j, b) in words.iter().enumerate() {
                    prop_assert_eq!(a == b, refs[i] == refs[j]);
                }
            }
        }
    }
}
