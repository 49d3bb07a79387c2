//! The unit emitter proper: byte stream, wire primitives and interning.

use std::collections::HashMap;

use vox_ir_data::{
    ArrayLit, ClassId, Hoistability, Idx, Op, RepoAuthType, SString, SrcLoc, TypeAlias, TypedValue,
};

use crate::func::FuncEmitter;
use crate::preclass::PreClassEmitter;
use crate::Offset;

/// Directives replayed at merge time when a unit is loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeableDef {
    TypeAlias(u32),
}

/// Accumulates one serialized unit: the opcode stream, literal tables,
/// source-location table and the per-function / per-class emitters.
pub struct UnitEmitter {
    hash: [u8; 16],
    pub filepath: Option<SString>,
    pub preload_priority: i32,
    pub is_hh_file: bool,
    pub use_strict_types: bool,
    pub use_strict_types_for_builtins: bool,

    /// Systemlib wart (see the driver): either the unit is merge-only with a
    /// fixed main return, or the sink must believe a return was seen.
    pub merge_only: bool,
    pub main_return: Option<TypedValue>,
    pub return_seen: bool,

    bc: Vec<u8>,

    litstrs: Vec<SString>,
    litstr_ids: HashMap<SString, u32>,
    arrays: Vec<ArrayLit>,
    array_ids: HashMap<ArrayLit, u32>,

    src_loc_tab: Vec<(Offset, SrcLoc)>,

    fes: Vec<FuncEmitter>,
    next_fe_id: u32,
    main_fe_id: Option<u32>,
    pces: Vec<PreClassEmitter>,

    type_aliases: Vec<TypeAlias>,
    mergeables: Vec<MergeableDef>,
}

impl UnitEmitter {
    pub fn new(hash: [u8; 16]) -> UnitEmitter {
        UnitEmitter {
            hash,
            filepath: None,
            preload_priority: 0,
            is_hh_file: false,
            use_strict_types: false,
            use_strict_types_for_builtins: false,
            merge_only: false,
            main_return: None,
            return_seen: false,
            bc: Vec::new(),
            litstrs: Vec::new(),
            litstr_ids: HashMap::new(),
            arrays: Vec::new(),
            array_ids: HashMap::new(),
            src_loc_tab: Vec::new(),
            fes: Vec::new(),
            next_fe_id: 0,
            main_fe_id: None,
            pces: Vec::new(),
            type_aliases: Vec::new(),
            mergeables: Vec::new(),
        }
    }

    pub fn hash(&self) -> [u8; 16] {
        self.hash
    }

    /// Mark the unit merge-only with a fixed pseudomain return value.
    pub fn set_merge_only_main(&mut self, tv: TypedValue) {
        self.merge_only = true;
        self.main_return = Some(tv);
    }

    pub fn set_return_seen(&mut self) {
        self.return_seen = true;
    }

    // ---- byte stream ----

    pub fn bc_pos(&self) -> Offset {
        self.bc.len() as Offset
    }

    pub fn bc(&self) -> &[u8] {
        &self.bc
    }

    pub fn emit_op(&mut self, op: Op) {
        self.bc.push(op as u8);
    }

    pub fn emit_byte(&mut self, b: u8) {
        self.bc.push(b);
    }

    pub fn emit_int32(&mut self, v: i32) {
        self.bc.extend_from_slice(&v.to_le_bytes());
    }

    pub fn emit_int64(&mut self, v: i64) {
        self.bc.extend_from_slice(&v.to_le_bytes());
    }

    pub fn emit_double(&mut self, v: f64) {
        self.bc.extend_from_slice(&v.to_le_bytes());
    }

    /// Variable-length unsigned int: one byte when the value fits in seven
    /// bits, otherwise four bytes with the high bit of the first byte set
    /// (seven low bits in the first byte, the rest little-endian behind it).
    pub fn emit_iva(&mut self, v: u32) {
        if v < 0x80 {
            self.bc.push(v as u8);
        } else {
            assert!(v < (1 << 31), "IVA immediate out of range: {v}");
            self.bc.push(0x80 | (v & 0x7f) as u8);
            let rest = v >> 7;
            self.bc.push(rest as u8);
            self.bc.push((rest >> 8) as u8);
            self.bc.push((rest >> 16) as u8);
        }
    }

    /// Back-patch a previously emitted 32-bit slot.
    pub fn patch_int32(&mut self, at: Offset, v: i32) {
        let at = at as usize;
        self.bc[at..at + 4].copy_from_slice(&v.to_le_bytes());
    }

    /// Serialize a repo-auth type at the current position.
    pub fn emit_rat(&mut self, rat: &RepoAuthType) {
        self.emit_byte(rat.tag() as u8);
        if let Some(name) = rat.class_name() {
            let id = self.merge_litstr(name);
            self.emit_int32(id as i32);
        } else if let Some(arr) = rat.array_type() {
            match arr {
                Some(id) => {
                    self.emit_byte(1);
                    self.emit_iva(id.get());
                }
                None => self.emit_byte(0),
            }
        }
    }

    // ---- interning ----

    pub fn merge_litstr(&mut self, s: &SString) -> u32 {
        if let Some(&id) = self.litstr_ids.get(s) {
            return id;
        }
        let id = self.litstrs.len() as u32;
        self.litstrs.push(s.clone());
        self.litstr_ids.insert(s.clone(), id);
        id
    }

    pub fn merge_array(&mut self, a: &ArrayLit) -> u32 {
        if let Some(&id) = self.array_ids.get(a) {
            return id;
        }
        let id = self.arrays.len() as u32;
        self.arrays.push(a.clone());
        self.array_ids.insert(a.clone(), id);
        id
    }

    pub fn litstrs(&self) -> &[SString] {
        &self.litstrs
    }

    pub fn arrays(&self) -> &[ArrayLit] {
        &self.arrays
    }

    // ---- source locations ----

    /// Record the source range covering the instruction at `off`. Consecutive
    /// records of the same range collapse into one.
    pub fn record_source_location(&mut self, loc: &SrcLoc, off: Offset) {
        if let Some((_, last)) = self.src_loc_tab.last() {
            if last == loc {
                return;
            }
        }
        self.src_loc_tab.push((off, *loc));
    }

    pub fn src_loc_tab(&self) -> &[(Offset, SrcLoc)] {
        &self.src_loc_tab
    }

    // ---- function emitters ----

    pub fn new_func_emitter(&mut self, name: SString) -> FuncEmitter {
        let id = self.next_fe_id;
        self.next_fe_id += 1;
        FuncEmitter::new(id, None, name)
    }

    pub fn new_method_emitter(&mut self, name: SString, pce: &PreClassEmitter) -> FuncEmitter {
        let id = self.next_fe_id;
        self.next_fe_id += 1;
        FuncEmitter::new(id, Some(pce.id()), name)
    }

    /// Create the pseudomain emitter, initialized at the current position.
    pub fn init_main(&mut self, line1: i32, line2: i32) -> FuncEmitter {
        assert!(self.main_fe_id.is_none(), "unit already has a pseudomain");
        let mut fe = self.new_func_emitter("".into());
        self.main_fe_id = Some(fe.id());
        fe.init(line1, line2, self.bc_pos(), vox_ir_data::Attr::NONE, true, None);
        fe
    }

    /// Take ownership of a finished function emitter. Functions must be
    /// recorded in creation order.
    pub fn record_function(&mut self, fe: FuncEmitter) {
        assert_eq!(
            fe.id() as usize,
            self.fes.len(),
            "function emitters must be recorded in creation order"
        );
        self.fes.push(fe);
    }

    pub fn fes(&self) -> &[FuncEmitter] {
        &self.fes
    }

    pub fn main_fe(&self) -> Option<&FuncEmitter> {
        self.main_fe_id.map(|id| &self.fes[id as usize])
    }

    // ---- pre-class emitters ----

    pub fn new_pre_class_emitter(
        &mut self,
        name: SString,
        hoistability: Hoistability,
    ) -> PreClassEmitter {
        PreClassEmitter::new(self.pces.len() as u32, name, hoistability)
    }

    pub fn record_pre_class(&mut self, pce: PreClassEmitter) {
        assert_eq!(
            pce.id() as usize,
            self.pces.len(),
            "pre-class emitters must be recorded in creation order"
        );
        self.pces.push(pce);
    }

    pub fn pce(&self, id: ClassId) -> &PreClassEmitter {
        &self.pces[id.index()]
    }

    pub fn pce_mut(&mut self, id: ClassId) -> &mut PreClassEmitter {
        &mut self.pces[id.index()]
    }

    pub fn pces(&self) -> &[PreClassEmitter] {
        &self.pces
    }

    // ---- type aliases ----

    pub fn add_type_alias(&mut self, alias: TypeAlias) -> u32 {
        let id = self.type_aliases.len() as u32;
        self.type_aliases.push(alias);
        id
    }

    pub fn push_mergeable_type_alias(&mut self, id: u32) {
        self.mergeables.push(MergeableDef::TypeAlias(id));
    }

    pub fn type_aliases(&self) -> &[TypeAlias] {
        &self.type_aliases
    }

    pub fn mergeables(&self) -> &[MergeableDef] {
        &self.mergeables
    }
}

impl std::fmt::Debug for UnitEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitEmitter")
            .field("filepath", &self.filepath)
            .field("bc_len", &self.bc.len())
            .field("funcs", &self.fes.len())
            .field("classes", &self.pces.len())
            .finish()
    }
}
