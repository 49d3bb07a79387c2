//! Convenience builders for constructing IR by hand, mostly in tests and
//! tools. The optimizer produces [`Unit`]s directly; nothing in the emission
//! pipeline depends on these.

use std::collections::HashMap;

use crate::bytecode::Bytecode;
use crate::index::{
    ArrayId, BlockId, ClassId, ExnNodeId, IndexVec, LocalId, SrcLocId, StrId,
};
use crate::{
    ArrayLit, Attr, Block, Class, ExnInfo, ExnNode, Func, Instr, Local, Param, Section, SrcInfo,
    SrcLoc, SString, StaticLocal, TypeAlias, TypeConstraint, Unit,
};

/// Builds one [`Func`] block by block.
pub struct FuncBuilder {
    func: Func,
}

impl FuncBuilder {
    pub fn new(name: &str) -> FuncBuilder {
        FuncBuilder {
            func: Func {
                name: name.into(),
                cls_name: None,
                attrs: Attr::NONE,
                top: true,
                src_info: SrcInfo::default(),
                locals: IndexVec::new(),
                params: IndexVec::new(),
                static_locals: Vec::new(),
                main_entry: BlockId::new(0),
                blocks: IndexVec::new(),
                exn_nodes: IndexVec::new(),
                num_iters: 0,
                num_cls_ref_slots: 0,
                user_attributes: Vec::new(),
                return_user_type: None,
                ret_type_constraint: TypeConstraint::default(),
                original_filename: None,
                native_info: None,
                is_closure_body: false,
                is_async: false,
                is_generator: false,
                is_pair_generator: false,
                is_memoize_wrapper: false,
            },
        }
    }

    pub fn cls_name(mut self, name: &str) -> FuncBuilder {
        self.func.cls_name = Some(name.into());
        self
    }

    pub fn func_mut(&mut self) -> &mut Func {
        &mut self.func
    }

    /// Append an empty block and return its id.
    pub fn block(&mut self) -> BlockId {
        self.func.blocks.push(Block::default())
    }

    pub fn block_mut(&mut self, bid: BlockId) -> &mut Block {
        &mut self.func.blocks[bid]
    }

    pub fn set_main_entry(&mut self, bid: BlockId) {
        self.func.main_entry = bid;
    }

    pub fn push_instr(&mut self, bid: BlockId, bc: Bytecode) {
        self.func.blocks[bid].instrs.push(Instr::new(bc));
    }

    pub fn push_instr_at(&mut self, bid: BlockId, bc: Bytecode, loc: SrcLocId) {
        self.func.blocks[bid].instrs.push(Instr { bc, loc: Some(loc) });
    }

    pub fn set_fallthrough(&mut self, bid: BlockId, target: BlockId) {
        self.func.blocks[bid].fallthrough = Some(target);
    }

    pub fn set_fallthrough_ns(&mut self, bid: BlockId, target: BlockId) {
        let b = &mut self.func.blocks[bid];
        b.fallthrough = Some(target);
        b.fallthrough_ns = true;
    }

    pub fn set_section(&mut self, bid: BlockId, section: Section) {
        self.func.blocks[bid].section = section;
    }

    pub fn add_factored_exit(&mut self, bid: BlockId, target: BlockId) {
        self.func.blocks[bid].factored_exits.push(target);
    }

    /// Add an exception node; depth is derived from the parent.
    pub fn add_exn_node(&mut self, parent: Option<ExnNodeId>, info: ExnInfo) -> ExnNodeId {
        let depth = match parent {
            Some(p) => self.func.exn_nodes[p].depth + 1,
            None => 1,
        };
        self.func.exn_nodes.push(ExnNode { parent, depth, info })
    }

    pub fn set_exn_node(&mut self, bid: BlockId, node: ExnNodeId) {
        self.func.blocks[bid].exn_node = Some(node);
    }

    /// Parameters claim the leading local slots, in declaration order.
    pub fn add_param(&mut self, name: Option<&str>, param: Param) -> LocalId {
        assert_eq!(
            self.func.params.len(),
            self.func.locals.len(),
            "parameters must be added before other locals"
        );
        self.func.params.push(param);
        self.func.locals.push(Local { name: name.map(Into::into), killed: false })
    }

    pub fn add_local(&mut self, name: Option<&str>, killed: bool) -> LocalId {
        self.func.locals.push(Local { name: name.map(Into::into), killed })
    }

    pub fn add_static_local(&mut self, name: &str) {
        self.func.static_locals.push(StaticLocal { name: name.into() });
    }

    pub fn set_num_iters(&mut self, n: u32) {
        self.func.num_iters = n;
    }

    pub fn set_num_cls_ref_slots(&mut self, n: u32) {
        self.func.num_cls_ref_slots = n;
    }

    pub fn build(self) -> Func {
        assert!(!self.func.blocks.is_empty(), "function has no blocks");
        self.func
    }
}

/// Builds one [`Unit`] with interned literal pools.
pub struct UnitBuilder {
    filename: SString,
    hash: [u8; 16],
    litstrs: IndexVec<StrId, SString>,
    litstr_ids: HashMap<SString, StrId>,
    arrays: IndexVec<ArrayId, ArrayLit>,
    src_locs: IndexVec<SrcLocId, SrcLoc>,
    pseudomain: Option<Func>,
    classes: IndexVec<ClassId, Class>,
    funcs: Vec<Func>,
    type_aliases: Vec<TypeAlias>,
}

impl UnitBuilder {
    pub fn new(filename: &str) -> UnitBuilder {
        UnitBuilder {
            filename: filename.into(),
            hash: [0; 16],
            litstrs: IndexVec::new(),
            litstr_ids: HashMap::new(),
            arrays: IndexVec::new(),
            src_locs: IndexVec::new(),
            pseudomain: None,
            classes: IndexVec::new(),
            funcs: Vec::new(),
            type_aliases: Vec::new(),
        }
    }

    pub fn hash(mut self, hash: [u8; 16]) -> UnitBuilder {
        self.hash = hash;
        self
    }

    pub fn litstr(&mut self, s: &str) -> StrId {
        let s: SString = s.into();
        if let Some(&id) = self.litstr_ids.get(&s) {
            return id;
        }
        let id = self.litstrs.push(s.clone());
        self.litstr_ids.insert(s, id);
        id
    }

    pub fn array(&mut self, a: ArrayLit) -> ArrayId {
        self.arrays.push(a)
    }

    pub fn src_loc(&mut self, loc: SrcLoc) -> SrcLocId {
        self.src_locs.push(loc)
    }

    pub fn set_pseudomain(&mut self, func: Func) {
        self.pseudomain = Some(func);
    }

    pub fn add_class(&mut self, cls: Class) -> ClassId {
        self.classes.push(cls)
    }

    pub fn add_func(&mut self, func: Func) {
        self.funcs.push(func);
    }

    pub fn add_type_alias(&mut self, alias: TypeAlias) {
        self.type_aliases.push(alias);
    }

    pub fn build(self) -> Unit {
        let pseudomain = self.pseudomain.unwrap_or_else(|| {
            let mut pm = FuncBuilder::new("");
            let b = pm.block();
            pm.push_instr(b, Bytecode::Int { val: 1 });
            pm.push_instr(b, Bytecode::RetC);
            pm.build()
        });
        Unit {
            filename: self.filename,
            hash: self.hash,
            preload_priority: 0,
            is_hh_file: false,
            use_strict_types: false,
            use_strict_types_for_builtins: false,
            litstrs: self.litstrs,
            arrays: self.arrays,
            src_locs: self.src_locs,
            pseudomain,
            classes: self.classes,
            funcs: self.funcs,
            type_aliases: self.type_aliases,
        }
    }
}
