//! Data model for the optimized Vox IR.
//!
//! A [`Unit`] is the immutable output of the optimizer: a pseudomain, classes,
//! top-level functions and type aliases, plus the literal pools their
//! instructions reference. Functions hold a control-flow graph of [`Block`]s
//! keyed by dense [`BlockId`]s and an exception-region tree in an arena of
//! [`ExnNode`]s (parent links by id, never owning cycles).

pub mod builder;
pub mod bytecode;
pub mod cfg;
pub mod index;
pub mod rat;
pub mod show;

pub use crate::{
    bytecode::{Bytecode, ImmKind, LocalRange, MemberKey, MemberKeyPayload, Op},
    index::*,
    rat::{RatTag, RepoAuthType},
};

use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::BitOr;
use std::sync::Arc;

/// Interned-style shared string.
pub type SString = Arc<str>;

/// Attribute bit set shared by functions, classes, properties and constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Attr(pub u32);

impl Attr {
    pub const NONE: Attr = Attr(0);
    pub const PUBLIC: Attr = Attr(1 << 0);
    pub const PROTECTED: Attr = Attr(1 << 1);
    pub const PRIVATE: Attr = Attr(1 << 2);
    pub const STATIC: Attr = Attr(1 << 3);
    pub const ABSTRACT: Attr = Attr(1 << 4);
    pub const FINAL: Attr = Attr(1 << 5);
    pub const INTERFACE: Attr = Attr(1 << 6);
    pub const TRAIT: Attr = Attr(1 << 7);
    pub const ENUM: Attr = Attr(1 << 8);
    pub const BUILTIN: Attr = Attr(1 << 9);
    pub const PERSISTENT: Attr = Attr(1 << 10);
    pub const NO_OVERRIDE: Attr = Attr(1 << 11);
    pub const UNIQUE: Attr = Attr(1 << 12);

    pub fn contains(self, other: Attr) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Attr {
    type Output = Attr;
    fn bitor(self, rhs: Attr) -> Attr {
        Attr(self.0 | rhs.0)
    }
}

/// Runtime value category, used for builtin parameter and return hints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Null,
    Bool,
    Int,
    Dbl,
    Str,
    Arr,
    Obj,
    Res,
}

/// A constant runtime value. Doubles compare and hash by bit pattern so
/// values can key interning tables.
#[derive(Debug, Clone)]
pub enum TypedValue {
    Uninit,
    Null,
    Bool(bool),
    Int(i64),
    Dbl(f64),
    Str(SString),
    Arr(ArrayLit),
}

impl PartialEq for TypedValue {
    fn eq(&self, other: &Self) -> bool {
        use TypedValue as T;
        match (self, other) {
            (T::Uninit, T::Uninit) | (T::Null, T::Null) => true,
            (T::Bool(a), T::Bool(b)) => a == b,
            (T::Int(a), T::Int(b)) => a == b,
            (T::Dbl(a), T::Dbl(b)) => a.to_bits() == b.to_bits(),
            (T::Str(a), T::Str(b)) => a == b,
            (T::Arr(a), T::Arr(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for TypedValue {}

impl Hash for TypedValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        use TypedValue as T;
        std::mem::discriminant(self).hash(state);
        match self {
            T::Uninit | T::Null => {}
            T::Bool(b) => b.hash(state),
            T::Int(i) => i.hash(state),
            T::Dbl(d) => d.to_bits().hash(state),
            T::Str(s) => s.hash(state),
            T::Arr(a) => a.hash(state),
        }
    }
}

/// Key of an array-literal entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArrayKey {
    Int(i64),
    Str(SString),
}

/// An array literal: ordered key/value pairs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ArrayLit {
    pub entries: Vec<(ArrayKey, TypedValue)>,
}

/// A source range: start and one-past-end positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SrcLoc {
    pub start_line: i32,
    pub start_col: i32,
    pub past_line: i32,
    pub past_col: i32,
}

/// Declaration-site info carried by functions and classes.
#[derive(Debug, Clone, Default)]
pub struct SrcInfo {
    pub line_begin: i32,
    pub line_end: i32,
    pub doc_comment: Option<SString>,
}

/// A type annotation as written, plus resolution flags.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypeConstraint {
    pub name: Option<SString>,
    pub nullable: bool,
    pub extended_hint: bool,
    pub type_var: bool,
    pub soft: bool,
}

/// One instruction: an opcode with payload and an optional source location
/// index into [`Unit::src_locs`].
#[derive(Debug, Clone, PartialEq)]
pub struct Instr {
    pub bc: Bytecode,
    pub loc: Option<SrcLocId>,
}

impl Instr {
    pub fn new(bc: Bytecode) -> Instr {
        Instr { bc, loc: None }
    }
}

/// Which region of the emitted function a block belongs to. Main code is laid
/// out first; fault funclets follow it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Section {
    Main,
    Fault,
}

/// A basic block.
#[derive(Debug, Clone)]
pub struct Block {
    pub instrs: Vec<Instr>,
    pub section: Section,
    /// Successor reached when control runs off the end, if any.
    pub fallthrough: Option<BlockId>,
    /// The fall-through jump, when synthesized, skips the surprise check.
    pub fallthrough_ns: bool,
    /// Non-fallthrough, non-immediate exits (exceptional edges), kept for
    /// reachability and diagnostics.
    pub factored_exits: Vec<BlockId>,
    pub exn_node: Option<ExnNodeId>,
}

impl Default for Block {
    fn default() -> Block {
        Block {
            instrs: Vec::new(),
            section: Section::Main,
            fallthrough: None,
            fallthrough_ns: false,
            factored_exits: Vec::new(),
            exn_node: None,
        }
    }
}

/// Catch/fault payload of an exception-tree node.
#[derive(Debug, Clone)]
pub enum ExnInfo {
    Catch { catch_entry: BlockId, iter_id: Option<IterId>, it_ref: bool },
    Fault { fault_entry: BlockId, iter_id: Option<IterId>, it_ref: bool },
}

/// A node of the exception-region tree. `depth` equals the path length from
/// the root (root children are depth 1).
#[derive(Debug, Clone)]
pub struct ExnNode {
    pub parent: Option<ExnNodeId>,
    pub depth: u32,
    pub info: ExnInfo,
}

impl ExnNode {
    /// The handler entry block, regardless of catch/fault flavor.
    pub fn entry_block(&self) -> BlockId {
        match self.info {
            ExnInfo::Catch { catch_entry, .. } => catch_entry,
            ExnInfo::Fault { fault_entry, .. } => fault_entry,
        }
    }
}

/// A local variable slot. Killed locals survived DCE in name only and must
/// never be referenced by an emitted instruction.
#[derive(Debug, Clone, Default)]
pub struct Local {
    pub name: Option<SString>,
    pub killed: bool,
}

/// A declared parameter. The first `params.len()` locals of the function are
/// its parameters, in order.
#[derive(Debug, Clone, Default)]
pub struct Param {
    /// Entry block of the default-value initializer, if the parameter has a
    /// default.
    pub dv_entry_point: Option<BlockId>,
    pub type_constraint: TypeConstraint,
    pub user_type: Option<SString>,
    /// Source text of the default expression.
    pub php_code: Option<SString>,
    pub user_attributes: Vec<(SString, TypedValue)>,
    pub builtin_type: Option<DataType>,
    pub by_ref: bool,
    pub variadic: bool,
}

#[derive(Debug, Clone)]
pub struct StaticLocal {
    pub name: SString,
}

/// Info for builtin (natively implemented) functions.
#[derive(Debug, Clone)]
pub struct NativeInfo {
    pub return_type: Option<DataType>,
    pub dyn_call_wrapper_id: Option<u32>,
}

/// A function body ready for emission.
#[derive(Debug, Clone)]
pub struct Func {
    pub name: SString,
    /// Enclosing class, for methods. Diagnostics only.
    pub cls_name: Option<SString>,
    pub attrs: Attr,
    pub top: bool,
    pub src_info: SrcInfo,
    pub locals: IndexVec<LocalId, Local>,
    pub params: IndexVec<ParamId, Param>,
    pub static_locals: Vec<StaticLocal>,
    pub main_entry: BlockId,
    pub blocks: IndexVec<BlockId, Block>,
    pub exn_nodes: IndexVec<ExnNodeId, ExnNode>,
    pub num_iters: u32,
    pub num_cls_ref_slots: u32,
    pub user_attributes: Vec<(SString, TypedValue)>,
    pub return_user_type: Option<SString>,
    pub ret_type_constraint: TypeConstraint,
    pub original_filename: Option<SString>,
    pub native_info: Option<NativeInfo>,
    pub is_closure_body: bool,
    pub is_async: bool,
    pub is_generator: bool,
    pub is_pair_generator: bool,
    pub is_memoize_wrapper: bool,
}

impl Func {
    pub fn exn_node(&self, id: Option<ExnNodeId>) -> Option<&ExnNode> {
        id.map(|id| &self.exn_nodes[id])
    }
}

impl fmt::Display for Func {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cls_name {
            Some(cls) => write!(f, "{}::{}", cls, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// How a class declaration may be hoisted to the start of the unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hoistability {
    NotHoistable,
    Mergeable,
    MaybeHoistable,
    AlwaysHoistable,
    ClosureHoistable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequirementKind {
    Extends,
    Implements,
}

/// `insteadof` conflict resolution for trait methods.
#[derive(Debug, Clone)]
pub struct TraitPrecRule {
    pub method_name: SString,
    pub selected_trait: SString,
    pub other_traits: Vec<SString>,
}

/// `as` renaming for trait methods.
#[derive(Debug, Clone)]
pub struct TraitAliasRule {
    pub trait_name: Option<SString>,
    pub orig_method: SString,
    pub new_method: SString,
    pub modifiers: Attr,
}

/// A class constant. `val == None` means abstract.
#[derive(Debug, Clone)]
pub struct ClassConstant {
    pub name: SString,
    pub type_constraint: Option<SString>,
    pub val: Option<TypedValue>,
    /// Source text of the initializer expression.
    pub php_code: Option<SString>,
    pub is_type_const: bool,
}

#[derive(Debug, Clone)]
pub struct Prop {
    pub name: SString,
    pub attrs: Attr,
    pub type_constraint: Option<SString>,
    pub doc_comment: Option<SString>,
    pub val: TypedValue,
}

#[derive(Debug, Clone)]
pub struct Class {
    pub name: SString,
    pub parent_name: Option<SString>,
    pub attrs: Attr,
    pub hoistability: Hoistability,
    pub src_info: SrcInfo,
    pub user_attributes: Vec<(SString, TypedValue)>,
    pub interface_names: Vec<SString>,
    pub used_trait_names: Vec<SString>,
    pub requirements: Vec<(SString, RequirementKind)>,
    pub trait_prec_rules: Vec<TraitPrecRule>,
    pub trait_alias_rules: Vec<TraitAliasRule>,
    pub num_decl_methods: u32,
    pub constants: Vec<ClassConstant>,
    pub methods: Vec<Func>,
    pub properties: Vec<Prop>,
    pub enum_base_ty: Option<TypeConstraint>,
    pub is_closure: bool,
}

#[derive(Debug, Clone)]
pub struct TypeAlias {
    pub name: SString,
    pub value: SString,
    pub nullable: bool,
    pub attrs: Attr,
    pub user_attributes: Vec<(SString, TypedValue)>,
}

/// A whole compilation unit, as produced by the optimizer.
#[derive(Debug, Clone)]
pub struct Unit {
    pub filename: SString,
    /// Content hash of the source the unit was compiled from.
    pub hash: [u8; 16],
    pub preload_priority: i32,
    pub is_hh_file: bool,
    pub use_strict_types: bool,
    pub use_strict_types_for_builtins: bool,
    /// String pool referenced by instruction immediates.
    pub litstrs: IndexVec<StrId, SString>,
    /// Array-literal pool referenced by instruction immediates.
    pub arrays: IndexVec<ArrayId, ArrayLit>,
    pub src_locs: IndexVec<SrcLocId, SrcLoc>,
    pub pseudomain: Func,
    pub classes: IndexVec<ClassId, Class>,
    pub funcs: Vec<Func>,
    pub type_aliases: Vec<TypeAlias>,
}

/// Systemlib units get special merge treatment from the sink.
pub fn is_systemlib_part(unit: &Unit) -> bool {
    unit.filename.starts_with("/:systemlib")
}
