//! The slice of the inference type lattice the emitter consults, and its
//! lowering to repo-auth types.

use std::collections::HashMap;

use vox_ir_data::{ArrayTypeId, Idx, RepoAuthType, SString};

/// Class name object types specialize to when all the analysis knows is
/// "some awaitable of T".
const WAIT_HANDLE_CLS: &str = "Awaitable";

/// An inferred type. This is the fragment of the analysis lattice that
/// survives to emission; `Opt` marks a nullable refinement and `WaitH` a
/// wait handle specialized on its awaited type.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Bottom,
    Uninit,
    InitNull,
    Bool,
    Int,
    Dbl,
    SStr,
    Str,
    SArr,
    /// Static array with known per-element types.
    SArrPacked(Vec<Type>),
    Arr,
    Obj,
    SubObj(SString),
    ExactObj(SString),
    Res,
    Cls,
    InitCell,
    Cell,
    WaitH(Box<Type>),
    Opt(Box<Type>),
}

impl Type {
    pub fn is_bottom(&self) -> bool {
        matches!(self, Type::Bottom)
    }

    /// Whether a value of this type could be a class reference. Such types
    /// get no repo-auth annotation.
    pub fn could_be_cls(&self) -> bool {
        matches!(self, Type::Cls | Type::Cell | Type::InitCell)
    }

    pub fn is_specialized_wait_handle(&self) -> bool {
        matches!(self, Type::WaitH(_))
    }

    /// The awaited type of a specialized wait handle.
    pub fn wait_handle_inner(&self) -> &Type {
        match self {
            Type::WaitH(inner) => inner,
            _ => panic!("wait_handle_inner on non-wait-handle type {self:?}"),
        }
    }
}

/// Interns packed array-element type lists; ids are global to a compilation,
/// not to any one unit.
#[derive(Debug, Default)]
pub struct ArrayTypeTable {
    packed: Vec<Vec<RepoAuthType>>,
    ids: HashMap<Vec<RepoAuthType>, ArrayTypeId>,
}

impl ArrayTypeTable {
    pub fn intern_packed(&mut self, elems: Vec<RepoAuthType>) -> ArrayTypeId {
        if let Some(&id) = self.ids.get(&elems) {
            return id;
        }
        let id = ArrayTypeId::from_usize(self.packed.len());
        self.packed.push(elems.clone());
        self.ids.insert(elems, id);
        id
    }

    pub fn packed(&self, id: ArrayTypeId) -> &[RepoAuthType] {
        &self.packed[id.index()]
    }

    pub fn len(&self) -> usize {
        self.packed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packed.is_empty()
    }
}

/// Lower an inferred type to the repo-auth type recorded in the unit.
pub fn make_repo_type(table: &mut ArrayTypeTable, ty: &Type) -> RepoAuthType {
    use Type as T;
    match ty {
        T::Bottom => panic!("cannot lower Bottom to a repo-auth type"),
        T::Uninit => RepoAuthType::Uninit,
        T::InitNull => RepoAuthType::InitNull,
        T::Bool => RepoAuthType::Bool,
        T::Int => RepoAuthType::Int,
        T::Dbl => RepoAuthType::Dbl,
        T::SStr => RepoAuthType::SStr,
        T::Str => RepoAuthType::Str,
        T::SArr => RepoAuthType::SArr(None),
        T::SArrPacked(elems) => {
            let rats = elems.iter().map(|e| make_repo_type(table, e)).collect();
            RepoAuthType::SArr(Some(table.intern_packed(rats)))
        }
        T::Arr => RepoAuthType::Arr(None),
        T::Obj => RepoAuthType::Obj,
        T::SubObj(name) => RepoAuthType::SubObj(name.clone()),
        T::ExactObj(name) => RepoAuthType::ExactObj(name.clone()),
        T::Res => RepoAuthType::Res,
        T::Cls => RepoAuthType::Cell,
        T::InitCell => RepoAuthType::InitCell,
        T::Cell => RepoAuthType::Cell,
        T::WaitH(_) => RepoAuthType::SubObj(WAIT_HANDLE_CLS.into()),
        T::Opt(inner) => match make_repo_type(table, inner) {
            RepoAuthType::Bool => RepoAuthType::OptBool,
            RepoAuthType::Int => RepoAuthType::OptInt,
            RepoAuthType::Dbl => RepoAuthType::OptDbl,
            RepoAuthType::SStr => RepoAuthType::OptSStr,
            RepoAuthType::Str => RepoAuthType::OptStr,
            RepoAuthType::Obj => RepoAuthType::OptObj,
            RepoAuthType::Res => RepoAuthType::OptRes,
            RepoAuthType::SArr(id) => RepoAuthType::OptSArr(id),
            RepoAuthType::Arr(id) => RepoAuthType::OptArr(id),
            RepoAuthType::SubObj(name) => RepoAuthType::OptSubObj(name),
            RepoAuthType::ExactObj(name) => RepoAuthType::OptExactObj(name),
            RepoAuthType::InitNull | RepoAuthType::Null => RepoAuthType::Null,
            // Nullability adds nothing to top-ish types.
            other => other,
        },
    }
}
