//! Driving emission of a whole unit: pseudomain, classes, functions, type
//! aliases, and the final class-offset writeback.

use vox_analysis::{make_repo_type, Index, Type};
use vox_ir_data::{
    is_systemlib_part, Attr, Class, ClassId, Func, IndexVec, ParamId, RepoAuthType, TypeAlias,
    TypedValue, Unit,
};
use vox_unit::{
    cls_ref_count_to_cells, FuncEmitter, Offset, ParamInfo, PreProp, UnitEmitter, INVALID_OFFSET,
    INVALID_SLOT, NUM_ACT_REC_CELLS, NUM_ITER_CELLS,
};

use crate::bc::{self, EmitBcInfo};
use crate::eh;

/// Class-constant initializer method, synthesized by the front end.
const S_86CINIT: &str = "86cinit";
/// Closure bodies live in this method of their closure class.
const S_INVOKE: &str = "__invoke";

/// State threaded through one unit's emission: the analysis oracle and the
/// byte offset of each class's `DefCls` opcode.
pub(crate) struct EmitUnitState<'a> {
    pub index: &'a Index,
    pub def_cls_map: IndexVec<ClassId, Offset>,
}

/// Emit `unit` against `index`, producing the filled sink.
pub fn emit_unit(index: &Index, unit: &Unit) -> UnitEmitter {
    let mut ue = UnitEmitter::new(unit.hash);
    ue.filepath = Some(unit.filename.clone());
    ue.preload_priority = unit.preload_priority;
    ue.is_hh_file = unit.is_hh_file;
    ue.use_strict_types = unit.use_strict_types;
    ue.use_strict_types_for_builtins = unit.use_strict_types_for_builtins;

    let mut state = EmitUnitState {
        index,
        def_cls_map: (0..unit.classes.len()).map(|_| INVALID_OFFSET).collect(),
    };

    // Systemlib units must end up merge-only at runtime; every other unit
    // instead needs the sink to believe a return was seen, or its
    // hoistability bookkeeping breaks. A known sink wart.
    if is_systemlib_part(unit) {
        ue.set_merge_only_main(TypedValue::Int(1));
    } else {
        ue.set_return_seen();
    }

    emit_pseudomain(&mut state, &mut ue, unit);
    for cls in unit.classes.iter() {
        emit_class(&mut state, &mut ue, unit, cls);
    }
    for func in &unit.funcs {
        emit_func(&mut state, &mut ue, unit, func);
    }
    for alias in &unit.type_aliases {
        emit_typealias(&mut ue, alias);
    }

    // There is no DefCls offset for closures, or for non-top-level
    // declarations the optimizer removed.
    for (cid, &off) in state.def_cls_map.iter_enumerated() {
        if off != INVALID_OFFSET {
            ue.pce_mut(cid).set_offset(off);
        }
    }

    ue
}

fn emit_pseudomain(state: &mut EmitUnitState<'_>, ue: &mut UnitEmitter, unit: &Unit) {
    let pm = &unit.pseudomain;
    let mut fe = ue.init_main(pm.src_info.line_begin, pm.src_info.line_end);
    let info = bc::emit_bytecode(state, ue, unit, pm);
    emit_finish_func(state, ue, pm, &mut fe, &info);
    ue.record_function(fe);
}

fn emit_func(state: &mut EmitUnitState<'_>, ue: &mut UnitEmitter, unit: &Unit, func: &Func) {
    let mut fe = ue.new_func_emitter(func.name.clone());
    emit_init_func(&mut fe, ue, func);
    let info = bc::emit_bytecode(state, ue, unit, func);
    emit_finish_func(state, ue, func, &mut fe, &info);
    ue.record_function(fe);
}

fn emit_init_func(fe: &mut FuncEmitter, ue: &UnitEmitter, func: &Func) {
    fe.init(
        func.src_info.line_begin,
        func.src_info.line_end,
        ue.bc_pos(),
        func.attrs,
        func.top,
        func.src_info.doc_comment.clone(),
    );
}

fn emit_locals_and_params(fe: &mut FuncEmitter, func: &Func, info: &EmitBcInfo) {
    let mut id: u32 = 0;

    for (lid, loc) in func.locals.iter_enumerated() {
        if (lid.get() as usize) < func.params.len() {
            assert!(!loc.killed, "killed parameter local in {func}");
            let pid = ParamId::new(id);
            let param = &func.params[pid];
            let pinfo = ParamInfo {
                type_constraint: param.type_constraint.clone(),
                user_type: param.user_type.clone(),
                php_code: param.php_code.clone(),
                user_attributes: param.user_attributes.clone(),
                builtin_type: param.builtin_type,
                by_ref: param.by_ref,
                variadic: param.variadic,
                ..ParamInfo::new()
            };
            fe.append_param(loc.name.clone(), pinfo);
            if let Some(dv) = param.dv_entry_point {
                fe.params[pid].funclet_off = info.block_info[dv].offset;
            }
            id += 1;
        } else if !loc.killed {
            match &loc.name {
                Some(name) => {
                    let got = fe.alloc_var_id(name);
                    assert_eq!(got, id, "named local id drifted in {func}");
                }
                None => {
                    fe.alloc_unnamed_local();
                }
            }
            id += 1;
        }
    }
    assert_eq!(fe.num_locals(), id);

    fe.set_num_iterators(func.num_iters);
    fe.set_num_cls_ref_slots(func.num_cls_ref_slots);

    for sv in &func.static_locals {
        fe.static_vars.push(sv.name.clone());
    }
}

/// Merge the litstrs a repo-auth type references into the unit. Array
/// element types use global litstr ids through the array-type table, so only
/// object class names need merging.
fn merge_repo_auth_type(ue: &mut UnitEmitter, rat: &RepoAuthType) {
    if let Some(name) = rat.class_name() {
        ue.merge_litstr(name);
    }
}

pub(crate) fn emit_finish_func(
    state: &mut EmitUnitState<'_>,
    ue: &mut UnitEmitter,
    func: &Func,
    fe: &mut FuncEmitter,
    info: &EmitBcInfo,
) {
    if info.contains_calls {
        fe.contains_calls = true;
    }

    for &fpi in &info.fpi_regions {
        fe.add_fpi_ent(fpi);
    }

    emit_locals_and_params(fe, func, info);
    eh::emit_ehent_tree(fe, func, info);

    fe.user_attributes = func.user_attributes.clone();
    fe.ret_user_type = func.return_user_type.clone();
    fe.original_filename = func.original_filename.clone();
    fe.is_closure_body = func.is_closure_body;
    fe.is_async = func.is_async;
    fe.is_generator = func.is_generator;
    fe.is_pair_generator = func.is_pair_generator;
    fe.is_native = func.native_info.is_some();
    fe.is_memoize_wrapper = func.is_memoize_wrapper;

    let ret_ty = state.index.lookup_return_type_raw(func);
    if !ret_ty.is_bottom() {
        let rat = make_repo_type(&mut state.index.array_table_builder(), &ret_ty);
        merge_repo_auth_type(ue, &rat);
        fe.repo_return_type = Some(rat);
    }

    if ret_ty.is_specialized_wait_handle() {
        let awaited = ret_ty.wait_handle_inner();
        if !awaited.is_bottom() {
            let rat = make_repo_type(&mut state.index.array_table_builder(), awaited);
            merge_repo_auth_type(ue, &rat);
            fe.repo_awaited_return_type = Some(rat);
        }
    }

    if let Some(native) = &func.native_info {
        fe.hni_return_type = native.return_type;
        fe.dyn_call_wrapper_id = native.dyn_call_wrapper_id;
    }
    fe.ret_type_constraint = func.ret_type_constraint.clone();

    fe.max_stack_cells = info.max_stack_depth
        + fe.num_locals()
        + fe.num_iterators * NUM_ITER_CELLS
        + cls_ref_count_to_cells(fe.num_cls_ref_slots)
        + info.max_fpi_depth * NUM_ACT_REC_CELLS;

    fe.finish(ue.bc_pos());
}

fn emit_class(state: &mut EmitUnitState<'_>, ue: &mut UnitEmitter, unit: &Unit, cls: &Class) {
    let mut pce = ue.new_pre_class_emitter(cls.name.clone(), cls.hoistability);
    pce.init(
        cls.src_info.line_begin,
        cls.src_info.line_end,
        ue.bc_pos(),
        cls.attrs,
        cls.parent_name.clone().unwrap_or_else(|| "".into()),
        cls.src_info.doc_comment.clone(),
    );
    pce.set_user_attributes(cls.user_attributes.clone());

    for x in &cls.interface_names {
        pce.add_interface(x.clone());
    }
    for x in &cls.used_trait_names {
        pce.add_used_trait(x.clone());
    }
    for (name, kind) in &cls.requirements {
        pce.add_class_requirement(name.clone(), *kind);
    }
    for rule in &cls.trait_prec_rules {
        pce.add_trait_prec_rule(rule.clone());
    }
    for rule in &cls.trait_alias_rules {
        pce.add_trait_alias_rule(rule.clone());
    }
    pce.set_num_decl_methods(cls.num_decl_methods);

    pce.set_iface_vtable_slot(
        state.index.lookup_iface_vtable_slot(cls).unwrap_or(INVALID_SLOT),
    );

    // A constant with an Uninit value defers to the 86cinit initializer, so
    // that method must survive.
    let mut needs_86cinit = false;
    for cconst in &cls.constants {
        match &cconst.val {
            None => pce.add_abstract_constant(
                cconst.name.clone(),
                cconst.type_constraint.clone(),
                cconst.is_type_const,
            ),
            Some(val) => {
                needs_86cinit |= matches!(val, TypedValue::Uninit);
                pce.add_constant(
                    cconst.name.clone(),
                    cconst.type_constraint.clone(),
                    val.clone(),
                    cconst.php_code.clone(),
                    cconst.is_type_const,
                );
            }
        }
    }

    for m in &cls.methods {
        if !needs_86cinit && &*m.name == S_86CINIT {
            continue;
        }
        let mut fe = ue.new_method_emitter(m.name.clone(), &pce);
        emit_init_func(&mut fe, ue, m);
        pce.add_method(fe.id());
        let info = bc::emit_bytecode(state, ue, unit, m);
        emit_finish_func(state, ue, m, &mut fe, &info);
        ue.record_function(fe);
    }

    // For closures the use vars become the leading properties, in
    // declaration order.
    let use_vars = if cls.is_closure {
        let invoke = cls
            .methods
            .iter()
            .find(|m| &*m.name == S_INVOKE)
            .unwrap_or_else(|| panic!("closure class {} has no {}", cls.name, S_INVOKE));
        state.index.lookup_closure_use_vars(invoke)
    } else {
        Vec::new()
    };
    let mut uv_iter = use_vars.into_iter();

    let private_props = state.index.lookup_private_props(cls);
    let private_statics = state.index.lookup_private_statics(cls);

    for prop in &cls.properties {
        let attrs = prop.attrs;
        let prop_ty = if attrs.contains(Attr::PRIVATE) {
            if cls.is_closure {
                uv_iter.next().unwrap_or(Type::Cell)
            } else if attrs.contains(Attr::STATIC) {
                private_statics.get(&prop.name).cloned().unwrap_or(Type::Cell)
            } else {
                private_props.get(&prop.name).cloned().unwrap_or(Type::Cell)
            }
        } else if attrs.contains(Attr::PUBLIC) && attrs.contains(Attr::STATIC) {
            state.index.lookup_public_static(cls, &prop.name)
        } else {
            Type::Cell
        };

        // A value that could be a class reference gets no authoritative
        // type.
        let rat = if prop_ty.could_be_cls() {
            RepoAuthType::Cell
        } else {
            let rat = make_repo_type(&mut state.index.array_table_builder(), &prop_ty);
            merge_repo_auth_type(ue, &rat);
            rat
        };

        pce.add_property(PreProp {
            name: prop.name.clone(),
            attrs: prop.attrs,
            type_constraint: prop.type_constraint.clone(),
            doc_comment: prop.doc_comment.clone(),
            val: prop.val.clone(),
            repo_auth_type: rat,
        });
    }
    assert!(
        uv_iter.next().is_none(),
        "closure {} has fewer properties than use vars",
        cls.name
    );

    pce.set_enum_base_ty(cls.enum_base_ty.clone());
    ue.record_pre_class(pce);
}

fn emit_typealias(ue: &mut UnitEmitter, alias: &TypeAlias) {
    let id = ue.add_type_alias(alias.clone());
    ue.push_mergeable_type_alias(id);
}
