//! Function-body serialization: per-instruction encoding, forward-jump
//! back-patching, and stack/FPI depth tracking by abstract interpretation.

use vox_ir_data::{
    Bytecode, BlockId, Func, IndexVec, Instr, LocalId, LocalRange, MemberKey, Unit,
};
use vox_unit::{FpiEnt, Offset, UnitEmitter, INVALID_OFFSET};

use crate::driver::EmitUnitState;
use crate::eh::common_parent;
use crate::order;

/// Compacted id a killed local maps to. Must never reach the stream.
pub(crate) const KILLED_LOCAL: u32 = u32::MAX;

/// A forward jump waiting for its target block's offset.
#[derive(Debug, Clone, Copy)]
pub(crate) struct JmpFixup {
    /// First byte of the branching opcode; offsets are relative to it.
    pub instr_off: Offset,
    /// Position of the placeholder immediate.
    pub jmp_immed_off: Offset,
}

/// Per-block bookkeeping while emitting a function.
#[derive(Debug)]
pub(crate) struct BlockInfo {
    /// Start offset of the block, once emitted.
    pub offset: Offset,
    /// Offset past the block's own instructions (synthesized fall-through
    /// jumps land after this).
    pub past: Offset,
    /// How many fault regions the jump at the end of this block leaves.
    pub regions_to_pop: u32,
    pub forward_jumps: Vec<JmpFixup>,
    /// Stack depth every branch into this block agrees on.
    pub expected_stack_depth: Option<u32>,
    /// FPI depth ditto; needed for regions ended by terminal instructions.
    pub expected_fpi_depth: Option<u32>,
}

impl Default for BlockInfo {
    fn default() -> BlockInfo {
        BlockInfo {
            offset: INVALID_OFFSET,
            past: INVALID_OFFSET,
            regions_to_pop: 0,
            forward_jumps: Vec::new(),
            expected_stack_depth: None,
            expected_fpi_depth: None,
        }
    }
}

/// Everything learned while serializing a function's body that the metadata
/// finalization still needs.
#[derive(Debug)]
pub(crate) struct EmitBcInfo {
    pub block_order: Vec<BlockId>,
    pub max_stack_depth: u32,
    pub max_fpi_depth: u32,
    pub contains_calls: bool,
    pub fpi_regions: Vec<FpiEnt>,
    pub block_info: IndexVec<BlockId, BlockInfo>,
}

pub(crate) fn emit_bytecode(
    state: &mut EmitUnitState<'_>,
    ue: &mut UnitEmitter,
    unit: &Unit,
    func: &Func,
) -> EmitBcInfo {
    BytecodeEmitter::new(state, ue, func).run(unit, func)
}

/// Compact out killed locals; the order of surviving ids matches the order
/// the metadata pass allocates them in.
fn build_local_map(func: &Func) -> IndexVec<LocalId, u32> {
    let mut next = 0u32;
    func.locals
        .iter()
        .map(|loc| {
            if loc.killed {
                KILLED_LOCAL
            } else {
                let id = next;
                next += 1;
                id
            }
        })
        .collect()
}

struct BytecodeEmitter<'a, 'i> {
    state: &'a mut EmitUnitState<'i>,
    ue: &'a mut UnitEmitter,

    local_map: IndexVec<LocalId, u32>,
    block_info: IndexVec<BlockId, BlockInfo>,

    cur_stack_depth: u32,
    max_stack_depth: u32,
    fpi_stack: Vec<FpiEnt>,
    max_fpi_depth: u32,
    fpi_regions: Vec<FpiEnt>,
    contains_calls: bool,

    /// Offset of the last emitted opcode.
    last_off: Offset,
}

impl<'a, 'i> BytecodeEmitter<'a, 'i> {
    fn new(
        state: &'a mut EmitUnitState<'i>,
        ue: &'a mut UnitEmitter,
        func: &Func,
    ) -> BytecodeEmitter<'a, 'i> {
        let block_info =
            (0..func.blocks.len()).map(|_| BlockInfo::default()).collect();
        BytecodeEmitter {
            state,
            ue,
            local_map: build_local_map(func),
            block_info,
            cur_stack_depth: 0,
            max_stack_depth: 0,
            fpi_stack: Vec::new(),
            max_fpi_depth: 0,
            fpi_regions: Vec::new(),
            contains_calls: false,
            last_off: 0,
        }
    }

    fn run(mut self, unit: &Unit, func: &Func) -> EmitBcInfo {
        let block_order = order::order_blocks(func);
        let rewrite_entry = order::is_single_nop(&func.blocks[block_order[0]]);

        for (idx, &bid) in block_order.iter().enumerate() {
            let offset = self.ue.bc_pos();
            self.block_info[bid].offset = offset;

            for fixup in std::mem::take(&mut self.block_info[bid].forward_jumps) {
                self.ue.patch_int32(
                    fixup.jmp_immed_off,
                    (offset as i64 - fixup.instr_off as i64) as i32,
                );
            }

            // A block nobody recorded a depth for is the function entry or
            // genuinely unreachable; either way it starts at zero.
            let info = &mut self.block_info[bid];
            self.cur_stack_depth = *info.expected_stack_depth.get_or_insert(0);
            let fpi_depth = *info.expected_fpi_depth.get_or_insert(0) as usize;

            // FPI regions ended by terminal instructions before this block's
            // targets are closed here.
            assert!(
                fpi_depth <= self.fpi_stack.len(),
                "FPI depth grew across a branch into block {bid} of {func}"
            );
            while fpi_depth < self.fpi_stack.len() {
                let off = self.last_off;
                self.end_fpi(off);
            }

            if idx == 0 && rewrite_entry {
                // A jump targets the block after this one; a plain Nop would
                // vanish and take the entry label with it.
                self.emit_inst(unit, func, &Instr::new(Bytecode::EntryNop));
            } else {
                for instr in &func.blocks[bid].instrs {
                    self.emit_inst(unit, func, instr);
                }
            }

            self.block_info[bid].past = self.ue.bc_pos();

            if let Some(ft) = func.blocks[bid].fallthrough {
                self.set_expected_depth(func, ft);
                if block_order.get(idx + 1) != Some(&ft) {
                    let jmp = if func.blocks[bid].fallthrough_ns {
                        Bytecode::JmpNS { target: ft }
                    } else {
                        Bytecode::Jmp { target: ft }
                    };
                    self.emit_inst(unit, func, &Instr::new(jmp));

                    // Jumping out of a fault region pops every region down
                    // to (not including) the common parent.
                    let parent = common_parent(
                        func,
                        func.blocks[ft].exn_node,
                        func.blocks[bid].exn_node,
                    );
                    self.block_info[bid].regions_to_pop =
                        match func.blocks[bid].exn_node {
                            Some(n) => {
                                func.exn_nodes[n].depth
                                    - parent.map_or(0, |p| func.exn_nodes[p].depth)
                            }
                            None => 0,
                        };
                }
            }
        }

        while !self.fpi_stack.is_empty() {
            let off = self.last_off;
            self.end_fpi(off);
        }

        EmitBcInfo {
            block_order,
            max_stack_depth: self.max_stack_depth,
            max_fpi_depth: self.max_fpi_depth,
            contains_calls: self.contains_calls,
            fpi_regions: self.fpi_regions,
            block_info: self.block_info,
        }
    }

    // ---- depth tracking ----

    fn pop(&mut self, n: u32, func: &Func, off: Offset) {
        assert!(
            self.cur_stack_depth >= n,
            "stack underflow at offset {off} in {func}"
        );
        self.cur_stack_depth -= n;
    }

    fn push(&mut self, n: u32) {
        self.cur_stack_depth += n;
        self.max_stack_depth = self.max_stack_depth.max(self.cur_stack_depth);
    }

    fn fpush(&mut self, start: Offset) {
        self.fpi_stack.push(FpiEnt {
            fpush_off: start,
            fpi_end_off: INVALID_OFFSET,
            fp_off: self.cur_stack_depth,
        });
        self.max_fpi_depth = self.max_fpi_depth.max(self.fpi_stack.len() as u32);
    }

    fn end_fpi(&mut self, off: Offset) {
        let mut fpi = self.fpi_stack.pop().expect("closing an FPI region with none open");
        fpi.fpi_end_off = off;
        self.fpi_regions.push(fpi);
    }

    /// Record (or check) the depth every branch into `target` must agree on.
    fn set_expected_depth(&mut self, func: &Func, target: BlockId) {
        let info = &mut self.block_info[target];
        match info.expected_stack_depth {
            Some(d) => assert_eq!(
                d, self.cur_stack_depth,
                "stack depth mismatch entering block {target} of {func}"
            ),
            None => info.expected_stack_depth = Some(self.cur_stack_depth),
        }
        let fpi = self.fpi_stack.len() as u32;
        match info.expected_fpi_depth {
            Some(d) => assert_eq!(
                d, fpi,
                "FPI depth mismatch entering block {target} of {func}"
            ),
            None => info.expected_fpi_depth = Some(fpi),
        }
    }

    // ---- locals ----

    fn map_local(&self, func: &Func, id: LocalId) -> u32 {
        let mapped = self.local_map[id];
        assert!(
            mapped != KILLED_LOCAL,
            "killed local {id} referenced by an instruction in {func}"
        );
        mapped
    }

    // ---- instruction encoding ----

    fn emit_inst(&mut self, unit: &Unit, func: &Func, instr: &Instr) {
        // Plain Nops produce no bytes (the entry rewrite relies on this).
        if matches!(instr.bc, Bytecode::Nop) {
            return;
        }

        let start = self.ue.bc_pos();
        self.last_off = start;

        match instr.bc {
            Bytecode::DefCls { id } => self.record_def_cls(func, id, start),
            Bytecode::DefClsNop { id } => self.record_def_cls(func, id, start),
            _ => {}
        }
        if instr.bc.is_ret() {
            assert_eq!(
                self.cur_stack_depth, 1,
                "return at offset {start} of {func} with stack depth != 1"
            );
        }

        self.ue.emit_op(instr.bc.op());
        self.pop(instr.bc.num_pops(), func, start);
        self.push(instr.bc.num_pushes());
        self.emit_immediates(unit, func, &instr.bc, start);

        if instr.bc.is_fpush() {
            self.fpush(start);
        }
        if instr.bc.is_fcall() {
            self.end_fpi(start);
            self.contains_calls = true;
        }
        if instr.bc.is_terminal() {
            // Whatever follows is unreachable until a jump target restores a
            // recorded depth.
            self.cur_stack_depth = 0;
        }

        if let Some(loc) = instr.loc {
            self.ue.record_source_location(&unit.src_locs[loc], start);
        }
    }

    fn record_def_cls(&mut self, func: &Func, id: vox_ir_data::ClassId, off: Offset) {
        let slot = &mut self.state.def_cls_map[id];
        assert_eq!(
            *slot, INVALID_OFFSET,
            "duplicate DefCls for {id} in {func}"
        );
        *slot = off;
    }

    fn emit_immediates(&mut self, unit: &Unit, func: &Func, bc: &Bytecode, start: Offset) {
        use Bytecode as B;
        match bc {
            B::Nop
            | B::EntryNop
            | B::PopC
            | B::Dup
            | B::Null
            | B::True
            | B::False
            | B::Add
            | B::Sub
            | B::Mul
            | B::Div
            | B::Mod
            | B::Concat
            | B::Same
            | B::Not
            | B::Print
            | B::This
            | B::RetC
            | B::RetV
            | B::Throw
            | B::Unwind
            | B::Catch => {}

            B::Int { val } => self.ue.emit_int64(*val),
            B::Double { val } => self.ue.emit_double(*val),
            B::String { id } => {
                let lit = self.ue.merge_litstr(&unit.litstrs[*id]);
                self.ue.emit_int32(lit as i32);
            }
            B::Array { id } => {
                let arr = self.ue.merge_array(&unit.arrays[*id]);
                self.ue.emit_int32(arr as i32);
            }
            B::NewStructArray { keys } => {
                self.ue.emit_int32(keys.len() as i32);
                for &key in keys {
                    let lit = self.ue.merge_litstr(&unit.litstrs[key]);
                    self.ue.emit_int32(lit as i32);
                }
            }
            B::ConcatN { count } => self.ue.emit_iva(*count),

            B::CGetL { loc } | B::SetL { loc } | B::PushL { loc } | B::UnsetL { loc } => {
                let mapped = self.map_local(func, *loc);
                self.ue.emit_iva(mapped);
            }
            B::IncDecL { loc, op } => {
                let mapped = self.map_local(func, *loc);
                self.ue.emit_iva(mapped);
                self.ue.emit_byte(op.as_byte());
            }
            B::StaticLocInit { loc, name } => {
                let mapped = self.map_local(func, *loc);
                self.ue.emit_iva(mapped);
                let lit = self.ue.merge_litstr(&unit.litstrs[*name]);
                self.ue.emit_int32(lit as i32);
            }

            B::Jmp { target } | B::JmpNS { target } | B::JmpZ { target } | B::JmpNZ { target } => {
                self.emit_branch(func, *target, start);
            }
            B::Switch { targets } => {
                self.ue.emit_int32(targets.len() as i32);
                for &t in targets {
                    self.emit_branch(func, t, start);
                }
            }
            B::SSwitch { cases } => self.emit_sswitch(unit, func, cases, start),

            B::Fatal { op } => self.ue.emit_byte(op.as_byte()),

            B::IterInit { iter, target } | B::IterNext { iter, target } => {
                self.ue.emit_iva(iter.get());
                self.emit_branch(func, *target, start);
            }
            B::IterFree { iter } => self.ue.emit_iva(iter.get()),
            B::IterBreak { target, iters } => {
                self.emit_branch(func, *target, start);
                self.ue.emit_int32(iters.len() as i32);
                for &(kind, id) in iters {
                    self.ue.emit_int32(kind.as_byte() as i32);
                    self.ue.emit_int32(id.get() as i32);
                }
            }

            B::FPushFunc { num_args } | B::FCall { num_args } => self.ue.emit_iva(*num_args),
            B::FPushFuncD { num_args, func: callee } => {
                self.ue.emit_iva(*num_args);
                let lit = self.ue.merge_litstr(&unit.litstrs[*callee]);
                self.ue.emit_int32(lit as i32);
            }
            B::FPushObjMethodD { num_args, method } => {
                self.ue.emit_iva(*num_args);
                let lit = self.ue.merge_litstr(&unit.litstrs[*method]);
                self.ue.emit_int32(lit as i32);
            }
            B::FCallD { num_args, cls, func: callee } => {
                self.ue.emit_iva(*num_args);
                let cls_lit = self.ue.merge_litstr(&unit.litstrs[*cls]);
                self.ue.emit_int32(cls_lit as i32);
                let func_lit = self.ue.merge_litstr(&unit.litstrs[*callee]);
                self.ue.emit_int32(func_lit as i32);
            }

            B::DefCls { id } | B::DefClsNop { id } => self.ue.emit_iva(id.get()),
            B::DefTypeAlias { id } => self.ue.emit_iva(*id),
            B::CreateCl { num_args, cls } => {
                self.ue.emit_iva(*num_args);
                self.ue.emit_iva(cls.get());
            }

            B::BaseL { loc, mode } => {
                let mapped = self.map_local(func, *loc);
                self.ue.emit_iva(mapped);
                self.ue.emit_byte(mode.as_byte());
            }
            B::Dim { mode, key } => {
                self.ue.emit_byte(mode.as_byte());
                self.emit_member_key(unit, func, key);
            }
            B::QueryM { n_discard, op, key } => {
                self.ue.emit_iva(*n_discard);
                self.ue.emit_byte(op.as_byte());
                self.emit_member_key(unit, func, key);
            }
            B::SetM { n_discard, key } => {
                self.ue.emit_iva(*n_discard);
                self.emit_member_key(unit, func, key);
            }

            B::MemoGet { locals } | B::MemoSet { locals } => {
                self.emit_local_range(func, locals);
            }

            B::AssertRATL { loc, rat } => {
                let mapped = self.map_local(func, *loc);
                self.ue.emit_iva(mapped);
                self.ue.emit_rat(rat);
            }
            B::AssertRATStk { slot, rat } => {
                self.ue.emit_iva(*slot);
                self.ue.emit_rat(rat);
            }

            B::ClsRefGetC { slot } | B::ClsRefName { slot } => self.ue.emit_iva(slot.get()),
        }
    }

    /// Emit a branch immediate: the target's relative offset if known, else
    /// a zero placeholder plus a fixup on the target block.
    fn emit_branch(&mut self, func: &Func, target: BlockId, start: Offset) {
        self.set_expected_depth(func, target);

        let info = &mut self.block_info[target];
        if info.offset != INVALID_OFFSET {
            let rel = (info.offset as i64 - start as i64) as i32;
            self.ue.emit_int32(rel);
        } else {
            info.forward_jumps.push(JmpFixup { instr_off: start, jmp_immed_off: self.ue.bc_pos() });
            self.ue.emit_int32(0);
        }
    }

    /// Non-default cases as (string, branch) pairs, then a -1 sentinel and
    /// the default branch. The ISA requires the sentinel even for a single
    /// case.
    fn emit_sswitch(
        &mut self,
        unit: &Unit,
        func: &Func,
        cases: &[(vox_ir_data::StrId, BlockId)],
        start: Offset,
    ) {
        assert!(!cases.is_empty(), "SSwitch with no cases in {func}");
        self.ue.emit_int32(cases.len() as i32);
        for &(s, target) in &cases[..cases.len() - 1] {
            let lit = self.ue.merge_litstr(&unit.litstrs[s]);
            self.ue.emit_int32(lit as i32);
            self.emit_branch(func, target, start);
        }
        self.ue.emit_int32(-1);
        self.emit_branch(func, cases[cases.len() - 1].1, start);
    }

    fn emit_member_key(&mut self, unit: &Unit, func: &Func, key: &MemberKey) {
        self.ue.emit_byte(key.tag());
        match key {
            MemberKey::EC(slot) | MemberKey::PC(slot) => self.ue.emit_iva(*slot),
            MemberKey::EL(loc) | MemberKey::PL(loc) => {
                let mapped = self.map_local(func, *loc);
                self.ue.emit_iva(mapped);
            }
            MemberKey::ET(s) | MemberKey::PT(s) | MemberKey::QT(s) => {
                let lit = self.ue.merge_litstr(&unit.litstrs[*s]);
                self.ue.emit_int32(lit as i32);
            }
            MemberKey::EI(v) => self.ue.emit_int64(*v),
            MemberKey::W => {}
        }
    }

    fn emit_local_range(&mut self, func: &Func, range: &LocalRange) {
        assert!(
            (range.first.get() as u64 + range.rest_count as u64) < func.locals.len() as u64,
            "local range past the end of the locals vector in {func}"
        );
        let first = self.map_local(func, range.first);
        let last = self.map_local(func, range.first + range.rest_count);
        assert_eq!(
            last - first,
            range.rest_count,
            "local range not contiguous after killed-local compaction in {func}"
        );
        self.ue.emit_iva(first);
        self.ue.emit_iva(range.rest_count);
    }
}
