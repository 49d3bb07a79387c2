//! The typed-analysis index: the read-only oracle the emitter queries for
//! inferred return types, closure captures, property types and interface
//! vtable slots.
//!
//! The index is populated once by whole-program analysis and is then safe
//! for concurrent queries from per-unit emission jobs; the only interior
//! mutability is the array-type table, which interns under a lock.

pub mod types;

pub use types::{make_repo_type, ArrayTypeTable, Type};

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use vox_ir_data::{Class, Func, SString};

/// Per-class property-name to inferred-type map.
pub type PropMap = HashMap<SString, Type>;

type FuncKey = (Option<SString>, SString);

#[derive(Debug, Default)]
pub struct Index {
    return_types: HashMap<FuncKey, Type>,
    iface_vtable_slots: HashMap<SString, u32>,
    /// Keyed by closure class name; values in declaration order.
    closure_use_vars: HashMap<SString, Vec<Type>>,
    private_props: HashMap<SString, PropMap>,
    private_statics: HashMap<SString, PropMap>,
    public_statics: HashMap<(SString, SString), Type>,
    array_types: Mutex<ArrayTypeTable>,
}

impl Index {
    pub fn new() -> Index {
        Index::default()
    }

    // ---- population (done by analysis, before emission starts) ----

    pub fn record_return_type(&mut self, cls: Option<SString>, func: SString, ty: Type) {
        self.return_types.insert((cls, func), ty);
    }

    pub fn record_iface_vtable_slot(&mut self, cls: SString, slot: u32) {
        self.iface_vtable_slots.insert(cls, slot);
    }

    pub fn record_closure_use_vars(&mut self, cls: SString, vars: Vec<Type>) {
        self.closure_use_vars.insert(cls, vars);
    }

    pub fn record_private_prop(&mut self, cls: SString, prop: SString, ty: Type) {
        self.private_props.entry(cls).or_default().insert(prop, ty);
    }

    pub fn record_private_static(&mut self, cls: SString, prop: SString, ty: Type) {
        self.private_statics.entry(cls).or_default().insert(prop, ty);
    }

    pub fn record_public_static(&mut self, cls: SString, prop: SString, ty: Type) {
        self.public_statics.insert((cls, prop), ty);
    }

    // ---- queries (concurrent-safe) ----

    /// The inferred return type of `func`, before any cleanup for display.
    /// Unknown functions conservatively return any initialized cell.
    pub fn lookup_return_type_raw(&self, func: &Func) -> Type {
        self.return_types
            .get(&(func.cls_name.clone(), func.name.clone()))
            .cloned()
            .unwrap_or(Type::InitCell)
    }

    /// The array-type table, for interning specialized array types.
    pub fn array_table_builder(&self) -> MutexGuard<'_, ArrayTypeTable> {
        self.array_types.lock().expect("array-type table lock poisoned")
    }

    pub fn lookup_iface_vtable_slot(&self, cls: &Class) -> Option<u32> {
        self.iface_vtable_slots.get(&cls.name).copied()
    }

    /// Types of a closure's use-vars, in declaration order.
    pub fn lookup_closure_use_vars(&self, func: &Func) -> Vec<Type> {
        func.cls_name
            .as_ref()
            .and_then(|cls| self.closure_use_vars.get(cls))
            .cloned()
            .unwrap_or_default()
    }

    pub fn lookup_private_props(&self, cls: &Class) -> PropMap {
        self.private_props.get(&cls.name).cloned().unwrap_or_default()
    }

    pub fn lookup_private_statics(&self, cls: &Class) -> PropMap {
        self.private_statics.get(&cls.name).cloned().unwrap_or_default()
    }

    pub fn lookup_public_static(&self, cls: &Class, prop: &SString) -> Type {
        self.public_statics
            .get(&(cls.name.clone(), prop.clone()))
            .cloned()
            .unwrap_or(Type::Cell)
    }
}
