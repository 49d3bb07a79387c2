//! Per-function metadata emitter.

use vox_ir_data::{
    Attr, DataType, IndexVec, IterId, ParamId, RepoAuthType, SString, TypeConstraint, TypedValue,
};

use crate::{Offset, INVALID_OFFSET};

/// Finished parameter metadata.
#[derive(Debug, Clone, Default)]
pub struct ParamInfo {
    pub name: Option<SString>,
    pub type_constraint: TypeConstraint,
    pub user_type: Option<SString>,
    pub php_code: Option<SString>,
    pub user_attributes: Vec<(SString, TypedValue)>,
    pub builtin_type: Option<DataType>,
    pub by_ref: bool,
    pub variadic: bool,
    /// Entry offset of the parameter's default-value funclet, if any.
    pub funclet_off: Offset,
}

impl ParamInfo {
    pub fn new() -> ParamInfo {
        ParamInfo { funclet_off: INVALID_OFFSET, ..ParamInfo::default() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EhKind {
    Catch,
    Fault,
}

/// A runtime exception-handler table row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EhEnt {
    pub kind: EhKind,
    pub base: Offset,
    pub past: Offset,
    pub iter_id: Option<IterId>,
    pub it_ref: bool,
    pub handler: Offset,
    pub end: Offset,
    /// Index of the enclosing row in the finished table, or -1.
    pub parent_index: i32,
}

/// A frame-pointer-invocation table row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FpiEnt {
    pub fpush_off: Offset,
    pub fpi_end_off: Offset,
    /// Evaluation-stack depth at the push.
    pub fp_off: u32,
}

/// Accumulates one function's metadata while its bytecode is being written
/// into the owning unit emitter.
#[derive(Debug)]
pub struct FuncEmitter {
    id: u32,
    pce_id: Option<u32>,
    pub name: SString,

    pub attrs: Attr,
    pub top: bool,
    pub doc_comment: Option<SString>,
    pub line1: i32,
    pub line2: i32,
    pub base: Offset,
    pub past: Offset,

    pub params: IndexVec<ParamId, ParamInfo>,
    /// All locals in id order; parameters first, then named, then unnamed.
    locals: Vec<Option<SString>>,
    pub num_iterators: u32,
    pub num_cls_ref_slots: u32,
    pub static_vars: Vec<SString>,

    pub ehtab: Vec<EhEnt>,
    eh_tab_sorted: bool,
    pub fpitab: Vec<FpiEnt>,

    pub user_attributes: Vec<(SString, TypedValue)>,
    pub ret_user_type: Option<SString>,
    pub original_filename: Option<SString>,
    pub ret_type_constraint: TypeConstraint,

    pub is_closure_body: bool,
    pub is_async: bool,
    pub is_generator: bool,
    pub is_pair_generator: bool,
    pub is_native: bool,
    pub is_memoize_wrapper: bool,
    pub contains_calls: bool,

    pub repo_return_type: Option<RepoAuthType>,
    pub repo_awaited_return_type: Option<RepoAuthType>,
    pub hni_return_type: Option<DataType>,
    pub dyn_call_wrapper_id: Option<u32>,

    pub max_stack_cells: u32,
    finished: bool,
}

impl FuncEmitter {
    pub(crate) fn new(id: u32, pce_id: Option<u32>, name: SString) -> FuncEmitter {
        FuncEmitter {
            id,
            pce_id,
            name,
            attrs: Attr::NONE,
            top: false,
            doc_comment: None,
            line1: 0,
            line2: 0,
            base: INVALID_OFFSET,
            past: INVALID_OFFSET,
            params: IndexVec::new(),
            locals: Vec::new(),
            num_iterators: 0,
            num_cls_ref_slots: 0,
            static_vars: Vec::new(),
            ehtab: Vec::new(),
            eh_tab_sorted: false,
            fpitab: Vec::new(),
            user_attributes: Vec::new(),
            ret_user_type: None,
            original_filename: None,
            ret_type_constraint: TypeConstraint::default(),
            is_closure_body: false,
            is_async: false,
            is_generator: false,
            is_pair_generator: false,
            is_native: false,
            is_memoize_wrapper: false,
            contains_calls: false,
            repo_return_type: None,
            repo_awaited_return_type: None,
            hni_return_type: None,
            dyn_call_wrapper_id: None,
            max_stack_cells: 0,
            finished: false,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn pce_id(&self) -> Option<u32> {
        self.pce_id
    }

    pub fn init(
        &mut self,
        line1: i32,
        line2: i32,
        base: Offset,
        attrs: Attr,
        top: bool,
        doc_comment: Option<SString>,
    ) {
        self.line1 = line1;
        self.line2 = line2;
        self.base = base;
        self.attrs = attrs;
        self.top = top;
        self.doc_comment = doc_comment;
    }

    /// Register a parameter. Parameters occupy the leading local slots.
    pub fn append_param(&mut self, name: Option<SString>, info: ParamInfo) {
        assert_eq!(
            self.params.len(),
            self.locals.len(),
            "parameters must be appended before other locals"
        );
        self.locals.push(name.clone());
        self.params.push(ParamInfo { name, ..info });
    }

    /// Allocate the next local id for a named variable.
    pub fn alloc_var_id(&mut self, name: &SString) -> u32 {
        let id = self.locals.len() as u32;
        self.locals.push(Some(name.clone()));
        id
    }

    /// Allocate the next local id for an unnamed temporary.
    pub fn alloc_unnamed_local(&mut self) -> u32 {
        let id = self.locals.len() as u32;
        self.locals.push(None);
        id
    }

    pub fn lookup_var_id(&self, name: &SString) -> Option<u32> {
        self.locals
            .iter()
            .position(|l| l.as_ref() == Some(name))
            .map(|p| p as u32)
    }

    pub fn num_locals(&self) -> u32 {
        self.locals.len() as u32
    }

    pub fn set_num_iterators(&mut self, n: u32) {
        self.num_iterators = n;
    }

    pub fn set_num_cls_ref_slots(&mut self, n: u32) {
        self.num_cls_ref_slots = n;
    }

    /// Append a handler-table row; returns its index.
    pub fn add_eh_ent(&mut self, ent: EhEnt) -> usize {
        self.ehtab.push(ent);
        self.ehtab.len() - 1
    }

    /// The EH table was produced already runtime-sorted.
    pub fn set_eh_tab_is_sorted(&mut self) {
        self.eh_tab_sorted = true;
    }

    pub fn eh_tab_is_sorted(&self) -> bool {
        self.eh_tab_sorted
    }

    pub fn add_fpi_ent(&mut self, ent: FpiEnt) {
        self.fpitab.push(ent);
    }

    pub fn finish(&mut self, past: Offset) {
        assert!(!self.finished, "function emitter finished twice: {}", self.name);
        self.past = past;
        self.finished = true;
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}
