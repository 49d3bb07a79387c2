//! Per-class metadata emitter.

use vox_ir_data::{
    Attr, Hoistability, RepoAuthType, RequirementKind, SString, TraitAliasRule, TraitPrecRule,
    TypeConstraint, TypedValue,
};

use crate::{Offset, INVALID_OFFSET, INVALID_SLOT};

/// A class constant as recorded in the unit. Abstract constants have no
/// value.
#[derive(Debug, Clone)]
pub struct PreConst {
    pub name: SString,
    pub type_constraint: Option<SString>,
    pub val: Option<TypedValue>,
    pub php_code: Option<SString>,
    pub is_type_const: bool,
}

#[derive(Debug, Clone)]
pub struct PreProp {
    pub name: SString,
    pub attrs: Attr,
    pub type_constraint: Option<SString>,
    pub doc_comment: Option<SString>,
    pub val: TypedValue,
    pub repo_auth_type: RepoAuthType,
}

/// Accumulates one class's runtime declaration record.
#[derive(Debug)]
pub struct PreClassEmitter {
    id: u32,
    pub name: SString,
    pub hoistability: Hoistability,

    pub line1: i32,
    pub line2: i32,
    /// Byte offset of the class's `DefCls` opcode, patched in by the driver
    /// after all bytecode is emitted.
    pub offset: Offset,
    pub attrs: Attr,
    /// Empty string when the class has no parent.
    pub parent_name: SString,
    pub doc_comment: Option<SString>,
    pub user_attributes: Vec<(SString, TypedValue)>,

    pub interfaces: Vec<SString>,
    pub used_traits: Vec<SString>,
    pub requirements: Vec<(SString, RequirementKind)>,
    pub trait_prec_rules: Vec<TraitPrecRule>,
    pub trait_alias_rules: Vec<TraitAliasRule>,

    pub num_decl_methods: u32,
    pub iface_vtable_slot: u32,

    pub constants: Vec<PreConst>,
    /// Function-emitter ids of the class's methods, in emission order.
    pub methods: Vec<u32>,
    pub properties: Vec<PreProp>,
    pub enum_base_ty: Option<TypeConstraint>,
}

impl PreClassEmitter {
    pub(crate) fn new(id: u32, name: SString, hoistability: Hoistability) -> PreClassEmitter {
        PreClassEmitter {
            id,
            name,
            hoistability,
            line1: 0,
            line2: 0,
            offset: INVALID_OFFSET,
            attrs: Attr::NONE,
            parent_name: "".into(),
            doc_comment: None,
            user_attributes: Vec::new(),
            interfaces: Vec::new(),
            used_traits: Vec::new(),
            requirements: Vec::new(),
            trait_prec_rules: Vec::new(),
            trait_alias_rules: Vec::new(),
            num_decl_methods: 0,
            iface_vtable_slot: INVALID_SLOT,
            constants: Vec::new(),
            methods: Vec::new(),
            properties: Vec::new(),
            enum_base_ty: None,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    #[allow(clippy::too_many_arguments)]
    pub fn init(
        &mut self,
        line1: i32,
        line2: i32,
        offset: Offset,
        attrs: Attr,
        parent_name: SString,
        doc_comment: Option<SString>,
    ) {
        self.line1 = line1;
        self.line2 = line2;
        self.offset = offset;
        self.attrs = attrs;
        self.parent_name = parent_name;
        self.doc_comment = doc_comment;
    }

    pub fn set_offset(&mut self, off: Offset) {
        self.offset = off;
    }

    pub fn set_user_attributes(&mut self, attrs: Vec<(SString, TypedValue)>) {
        self.user_attributes = attrs;
    }

    pub fn add_interface(&mut self, name: SString) {
        self.interfaces.push(name);
    }

    pub fn add_used_trait(&mut self, name: SString) {
        self.used_traits.push(name);
    }

    pub fn add_class_requirement(&mut self, name: SString, kind: RequirementKind) {
        self.requirements.push((name, kind));
    }

    pub fn add_trait_prec_rule(&mut self, rule: TraitPrecRule) {
        self.trait_prec_rules.push(rule);
    }

    pub fn add_trait_alias_rule(&mut self, rule: TraitAliasRule) {
        self.trait_alias_rules.push(rule);
    }

    pub fn set_num_decl_methods(&mut self, n: u32) {
        self.num_decl_methods = n;
    }

    pub fn set_iface_vtable_slot(&mut self, slot: u32) {
        self.iface_vtable_slot = slot;
    }

    pub fn add_abstract_constant(
        &mut self,
        name: SString,
        type_constraint: Option<SString>,
        is_type_const: bool,
    ) {
        self.constants.push(PreConst {
            name,
            type_constraint,
            val: None,
            php_code: None,
            is_type_const,
        });
    }

    pub fn add_constant(
        &mut self,
        name: SString,
        type_constraint: Option<SString>,
        val: TypedValue,
        php_code: Option<SString>,
        is_type_const: bool,
    ) {
        self.constants.push(PreConst {
            name,
            type_constraint,
            val: Some(val),
            php_code,
            is_type_const,
        });
    }

    pub fn add_method(&mut self, fe_id: u32) {
        self.methods.push(fe_id);
    }

    pub fn add_property(&mut self, prop: PreProp) {
        self.properties.push(prop);
    }

    pub fn set_enum_base_ty(&mut self, ty: Option<TypeConstraint>) {
        self.enum_base_ty = ty;
    }
}
