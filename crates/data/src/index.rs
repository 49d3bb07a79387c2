//! Dense id types for the IR, backed by [`::index_vec`].
//!
//! Every id eventually serializes as an IVA immediate, so construction
//! enforces the 31-bit wire bound up front. Each type carries a short
//! display tag (`b0`, `$2`, `cls1`, ...) used by listings and panic
//! diagnostics.

pub use index_vec::{Idx, IdxRangeBounds, IdxSliceIndex, IndexSlice, IndexVec, index_vec};

/// Declares a dense id type: `newtype_index! { pub struct BlockId ["b"]; }`.
///
/// The representation is `NonZero<u32>` holding `raw + 1`, so `Option<Id>`
/// keeps the four-byte niche layout.
#[macro_export]
macro_rules! newtype_index {
    () => {};
    ($(#[$attr:meta])* $vis:vis struct $name:ident [$tag:literal]; $($rest:tt)*) => {
        $(#[$attr])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[repr(transparent)]
        $vis struct $name(std::num::NonZero<u32>);

        impl $name {
            /// Largest raw value; anything bigger would not survive the IVA
            /// wire encoding.
            $vis const MAX: u32 = (1 << 31) - 1;

            #[inline(always)]
            $vis const fn new(raw: u32) -> Self {
                assert!(raw <= Self::MAX, "id exceeds the IVA wire bound");
                match std::num::NonZero::new(raw + 1) {
                    Some(shifted) => Self(shifted),
                    None => unreachable!(),
                }
            }

            /// The raw value, as it goes into an IVA immediate.
            #[inline(always)]
            $vis const fn get(self) -> u32 {
                self.0.get() - 1
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}{}", $tag, self.get())
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}{}", $tag, self.get())
            }
        }

        impl $crate::index::Idx for $name {
            #[inline(always)]
            fn from_usize(value: usize) -> Self {
                match u32::try_from(value) {
                    Ok(raw) => Self::new(raw),
                    Err(_) => panic!("index {value} does not fit an id"),
                }
            }

            #[inline(always)]
            fn index(self) -> usize {
                self.get() as usize
            }
        }

        impl std::ops::Add<u32> for $name {
            type Output = Self;
            fn add(self, rhs: u32) -> Self {
                Self::new(self.get().checked_add(rhs).expect("id arithmetic overflowed"))
            }
        }

        impl std::ops::Sub for $name {
            type Output = u32;
            fn sub(self, rhs: Self) -> u32 {
                self.get().checked_sub(rhs.get()).expect("id distance underflowed")
            }
        }

        $crate::newtype_index!($($rest)*);
    };
}

newtype_index! {
    pub struct BlockId ["b"];
    pub struct LocalId ["$"];
    pub struct ParamId ["p"];
    pub struct IterId ["iter"];
    pub struct ClsRefSlot ["clsref"];
    pub struct ExnNodeId ["exn"];
    pub struct ClassId ["cls"];
    pub struct StrId ["str"];
    pub struct ArrayId ["arr"];
    pub struct SrcLocId ["loc"];
    pub struct ArrayTypeId ["arrty"];
}
