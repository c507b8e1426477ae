//! [`crate::traits::Archive`]/[`crate::traits::Serialize`] implementations
//! for primitives and the handful of standard-library types the
//! specification's scenarios require directly (`Option`, tuples).

use rancor::Fallible;

use crate::fingerprint::{Fingerprinted, Shape};
use crate::place::Place;
use crate::primitive::{
    ArchivedF32, ArchivedF64, ArchivedI16, ArchivedI32, ArchivedI64,
    ArchivedU16, ArchivedU32, ArchivedU64,
};
use crate::traits::{Archive, Deserialize, Serialize};

macro_rules! impl_primitive {
    ($native:ty, $archived:ty) => {
        impl Archive for $native {
            type Archived = $archived;
            type Resolver = ();

            fn resolve(&self, _resolver: (), out: Place<Self::Archived>) {
                unsafe {
                    out.write_unchecked(<$archived>::from(*self));
                }
            }
        }

        impl<S: Fallible + ?Sized> Serialize<S> for $native {
            fn serialize(&self, _serializer: &mut S) -> Result<(), S::Error> {
                Ok(())
            }
        }

        impl<D: Fallible + ?Sized> Deserialize<$native, D> for $archived {
            fn deserialize(&self, _deserializer: &mut D) -> Result<$native, D::Error> {
                Ok(self.to_native())
            }
        }

        impl Fingerprinted for $native {
            fn type_key() -> u64 {
                crate::checksum::fnv1a(
                    crate::checksum::FNV_OFFSET_BASIS_U64,
                    stringify!($native).as_bytes(),
                )
            }

            fn shape() -> Shape {
                Shape::Primitive(stringify!($native))
            }
        }
    };
}

impl_primitive!(i16, ArchivedI16);
impl_primitive!(i32, ArchivedI32);
impl_primitive!(i64, ArchivedI64);
impl_primitive!(u16, ArchivedU16);
impl_primitive!(u32, ArchivedU32);
impl_primitive!(u64, ArchivedU64);
impl_primitive!(f32, ArchivedF32);
impl_primitive!(f64, ArchivedF64);

impl Archive for u8 {
    type Archived = u8;
    type Resolver = ();

    fn resolve(&self, _resolver: (), out: Place<Self::Archived>) {
        unsafe {
            out.write_unchecked(*self);
        }
    }
}

impl<S: Fallible + ?Sized> Serialize<S> for u8 {
    fn serialize(&self, _serializer: &mut S) -> Result<(), S::Error> {
        Ok(())
    }
}

impl<D: Fallible + ?Sized> Deserialize<u8, D> for u8 {
    fn deserialize(&self, _deserializer: &mut D) -> Result<u8, D::Error> {
        Ok(*self)
    }
}

impl Fingerprinted for u8 {
    fn type_key() -> u64 {
        crate::checksum::fnv1a(crate::checksum::FNV_OFFSET_BASIS_U64, b"u8")
    }

    fn shape() -> Shape {
        Shape::Primitive("u8")
    }
}

impl Archive for i8 {
    type Archived = i8;
    type Resolver = ();

    fn resolve(&self, _resolver: (), out: Place<Self::Archived>) {
        unsafe {
            out.write_unchecked(*self);
        }
    }
}

impl<S: Fallible + ?Sized> Serialize<S> for i8 {
    fn serialize(&self, _serializer: &mut S) -> Result<(), S::Error> {
        Ok(())
    }
}

impl<D: Fallible + ?Sized> Deserialize<i8, D> for i8 {
    fn deserialize(&self, _deserializer: &mut D) -> Result<i8, D::Error> {
        Ok(*self)
    }
}

impl Fingerprinted for i8 {
    fn type_key() -> u64 {
        crate::checksum::fnv1a(crate::checksum::FNV_OFFSET_BASIS_U64, b"i8")
    }

    fn shape() -> Shape {
        Shape::Primitive("i8")
    }
}

impl Archive for bool {
    type Archived = bool;
    type Resolver = ();

    fn resolve(&self, _resolver: (), out: Place<Self::Archived>) {
        unsafe {
            out.write_unchecked(*self);
        }
    }
}

impl<S: Fallible + ?Sized> Serialize<S> for bool {
    fn serialize(&self, _serializer: &mut S) -> Result<(), S::Error> {
        Ok(())
    }
}

impl<D: Fallible + ?Sized> Deserialize<bool, D> for bool {
    fn deserialize(&self, _deserializer: &mut D) -> Result<bool, D::Error> {
        Ok(*self)
    }
}

impl Fingerprinted for bool {
    fn type_key() -> u64 {
        crate::checksum::fnv1a(crate::checksum::FNV_OFFSET_BASIS_U64, b"bool")
    }

    fn shape() -> Shape {
        Shape::Primitive("bool")
    }
}

/// The archived form of `Option<T>`: a one-byte discriminant followed
/// by `T::Archived` when present.
///
/// Laid out as an ordinary tagged enum rather than reusing one of
/// `T`'s own bit patterns as a niche, since containers in this format
/// already have a dedicated null sentinel ([`crate::rel_ptr::NULL_SENTINEL`])
/// for the common `Option<Box<T>>`/`Option<Vec<T>>` cases -- a separate
/// niche optimization for every other `T` would add complexity this
/// crate's scenarios don't call for.
#[repr(C, u8)]
pub enum ArchivedOption<T> {
    /// No value.
    None,
    /// A present value.
    Some(T),
}

unsafe impl<T> crate::traits::Portable for ArchivedOption<T> {}

impl<T> ArchivedOption<T> {
    /// Converts to a standard `Option<&T>`.
    pub fn as_ref(&self) -> Option<&T> {
        match self {
            ArchivedOption::None => None,
            ArchivedOption::Some(v) => Some(v),
        }
    }
}

/// Mirrors the layout `ArchivedOption::Some(T)` actually takes, so its
/// payload can be projected to a correctly-positioned [`Place`] instead
/// of assembled off to one side and moved in afterward (which would
/// silently discard whatever offset the compiler gives the payload
/// relative to the enum's start once the `T::Archived` itself holds a
/// self-relative pointer).
#[repr(C)]
struct SomeShape<T>(u8, T);

impl<T: Archive> Archive for Option<T> {
    type Archived = ArchivedOption<T::Archived>;
    type Resolver = Option<T::Resolver>;

    fn resolve(&self, resolver: Self::Resolver, out: Place<Self::Archived>) {
        match (self, resolver) {
            (Some(value), Some(resolver)) => {
                // SAFETY: `ArchivedOption<T::Archived>` and
                // `SomeShape<T::Archived>` agree on size/alignment for
                // the `Some` variant: both are a one-byte discriminant
                // followed by a `T::Archived` payload.
                let shape = unsafe { out.cast_unchecked::<SomeShape<T::Archived>>() };
                // SAFETY: `shape.ptr()` points at a valid `SomeShape`.
                let shape_ptr = shape.ptr();
                unsafe {
                    core::ptr::addr_of_mut!((*shape_ptr).0).write(1u8);
                }
                let payload_ptr = unsafe { core::ptr::addr_of_mut!((*shape_ptr).1) };
                // SAFETY: `payload_ptr` points at the `T::Archived` field
                // of the value `shape` addresses.
                let payload_place = unsafe { shape.field_unchecked(payload_ptr) };
                value.resolve(resolver, payload_place);
            }
            _ => unsafe {
                out.write_unchecked(ArchivedOption::None);
            },
        }
    }
}

impl<T: Serialize<S>, S: Fallible + ?Sized> Serialize<S> for Option<T> {
    fn serialize(&self, serializer: &mut S) -> Result<Self::Resolver, S::Error> {
        self.as_ref()
            .map(|value| value.serialize(serializer))
            .transpose()
    }
}

impl<T: Fingerprinted> Fingerprinted for Option<T> {
    fn type_key() -> u64 {
        crate::fingerprint::compose_type_key("option", T::type_key())
    }

    fn shape() -> Shape {
        Shape::Enum("Option")
    }

    fn fold(hash: u64, seen: &mut alloc::collections::BTreeSet<u64>) -> u64 {
        let key = Self::type_key();
        if !seen.insert(key) {
            return crate::checksum::fnv1a(hash, &key.to_le_bytes());
        }
        let h = crate::checksum::fnv1a(
            crate::checksum::fnv1a(hash, b"enum"),
            b"Option",
        );
        T::fold(h, seen)
    }
}

extern crate alloc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_as_ref_distinguishes_variants() {
        let some: ArchivedOption<u32> = ArchivedOption::Some(7);
        let none: ArchivedOption<u32> = ArchivedOption::None;
        assert_eq!(some.as_ref(), Some(&7));
        assert_eq!(none.as_ref(), None);
    }
}
