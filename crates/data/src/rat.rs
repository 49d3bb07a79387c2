//! Repo-auth types: compact type descriptions attached to bytecode locations
//! for the profile-guided AOT runtime.
//!
//! The wire codec lives with the unit sink; this module is only the model and
//! the tag table a stream walker needs to skip a serialized blob.

use crate::index::ArrayTypeId;
use crate::SString;

/// Tag byte for a serialized repo-auth type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RatTag {
    Uninit = 0,
    InitNull,
    Null,
    Bool,
    OptBool,
    Int,
    OptInt,
    Dbl,
    OptDbl,
    SStr,
    OptSStr,
    Str,
    OptStr,
    Obj,
    OptObj,
    Res,
    OptRes,
    UncArrKey,
    ArrKey,
    InitUnc,
    Unc,
    InitCell,
    Cell,
    InitGen,
    Gen,
    SArr,
    OptSArr,
    Arr,
    OptArr,
    SubObj,
    OptSubObj,
    ExactObj,
    OptExactObj,
}

const RAT_TAGS: &[RatTag] = &[
    RatTag::Uninit,
    RatTag::InitNull,
    RatTag::Null,
    RatTag::Bool,
    RatTag::OptBool,
    RatTag::Int,
    RatTag::OptInt,
    RatTag::Dbl,
    RatTag::OptDbl,
    RatTag::SStr,
    RatTag::OptSStr,
    RatTag::Str,
    RatTag::OptStr,
    RatTag::Obj,
    RatTag::OptObj,
    RatTag::Res,
    RatTag::OptRes,
    RatTag::UncArrKey,
    RatTag::ArrKey,
    RatTag::InitUnc,
    RatTag::Unc,
    RatTag::InitCell,
    RatTag::Cell,
    RatTag::InitGen,
    RatTag::Gen,
    RatTag::SArr,
    RatTag::OptSArr,
    RatTag::Arr,
    RatTag::OptArr,
    RatTag::SubObj,
    RatTag::OptSubObj,
    RatTag::ExactObj,
    RatTag::OptExactObj,
];

impl RatTag {
    pub fn from_byte(b: u8) -> Option<RatTag> {
        RAT_TAGS.get(b as usize).copied()
    }

    /// Tag is followed by a 32-bit interned class-name id.
    pub fn has_class_name(self) -> bool {
        matches!(self, RatTag::SubObj | RatTag::OptSubObj | RatTag::ExactObj | RatTag::OptExactObj)
    }

    /// Tag is followed by a presence byte and an optional array-type id.
    pub fn has_array_type(self) -> bool {
        matches!(self, RatTag::SArr | RatTag::OptSArr | RatTag::Arr | RatTag::OptArr)
    }
}

/// A repo-auth type. Array variants may carry a reference into the global
/// array-type table; object variants name a class.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RepoAuthType {
    Uninit,
    InitNull,
    Null,
    Bool,
    OptBool,
    Int,
    OptInt,
    Dbl,
    OptDbl,
    SStr,
    OptSStr,
    Str,
    OptStr,
    Obj,
    OptObj,
    Res,
    OptRes,
    UncArrKey,
    ArrKey,
    InitUnc,
    Unc,
    InitCell,
    Cell,
    InitGen,
    Gen,
    SArr(Option<ArrayTypeId>),
    OptSArr(Option<ArrayTypeId>),
    Arr(Option<ArrayTypeId>),
    OptArr(Option<ArrayTypeId>),
    SubObj(SString),
    OptSubObj(SString),
    ExactObj(SString),
    OptExactObj(SString),
}

impl RepoAuthType {
    pub fn tag(&self) -> RatTag {
        use RepoAuthType as R;
        match self {
            R::Uninit => RatTag::Uninit,
            R::InitNull => RatTag::InitNull,
            R::Null => RatTag::Null,
            R::Bool => RatTag::Bool,
            R::OptBool => RatTag::OptBool,
            R::Int => RatTag::Int,
            R::OptInt => RatTag::OptInt,
            R::Dbl => RatTag::Dbl,
            R::OptDbl => RatTag::OptDbl,
            R::SStr => RatTag::SStr,
            R::OptSStr => RatTag::OptSStr,
            R::Str => RatTag::Str,
            R::OptStr => RatTag::OptStr,
            R::Obj => RatTag::Obj,
            R::OptObj => RatTag::OptObj,
            R::Res => RatTag::Res,
            R::OptRes => RatTag::OptRes,
            R::UncArrKey => RatTag::UncArrKey,
            R::ArrKey => RatTag::ArrKey,
            R::InitUnc => RatTag::InitUnc,
            R::Unc => RatTag::Unc,
            R::InitCell => RatTag::InitCell,
            R::Cell => RatTag::Cell,
            R::InitGen => RatTag::InitGen,
            R::Gen => RatTag::Gen,
            R::SArr(_) => RatTag::SArr,
            R::OptSArr(_) => RatTag::OptSArr,
            R::Arr(_) => RatTag::Arr,
            R::OptArr(_) => RatTag::OptArr,
            R::SubObj(_) => RatTag::SubObj,
            R::OptSubObj(_) => RatTag::OptSubObj,
            R::ExactObj(_) => RatTag::ExactObj,
            R::OptExactObj(_) => RatTag::OptExactObj,
        }
    }

    /// The class name carried by the `*Obj` variants.
    pub fn class_name(&self) -> Option<&SString> {
        use RepoAuthType as R;
        match self {
            R::SubObj(name) | R::OptSubObj(name) | R::ExactObj(name) | R::OptExactObj(name) => {
                Some(name)
            }
            _ => None,
        }
    }

    /// The array-type table reference carried by the `*Arr` variants.
    pub fn array_type(&self) -> Option<Option<ArrayTypeId>> {
        use RepoAuthType as R;
        match self {
            R::SArr(id) | R::OptSArr(id) | R::Arr(id) | R::OptArr(id) => Some(*id),
            _ => None,
        }
    }
}
