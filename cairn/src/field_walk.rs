//! Field walker contract (component C4).
//!
//! `spec.md`'s own design notes (§9) recommend replacing brace-
//! constructibility arity probing with compile-time-known field lists
//! generated by a derive macro; `cairn_derive`'s `#[derive(Archive)]`
//! is that redesign. This module defines the trait the derive output
//! implements and the descriptor type the serialization engine (C6) and
//! verifier (C7) walk.

/// Where a field's bytes live relative to its containing archived
/// struct, and whether that field is itself offset-pointer-bearing.
#[derive(Debug, Clone, Copy)]
pub struct FieldDescriptor {
    /// Field name, for diagnostics.
    pub name: &'static str,
    /// Byte offset of the field within its containing struct's layout.
    pub offset: usize,
    /// Size in bytes of the field's archived representation.
    pub size: usize,
    /// Whether the serialization engine must treat this field as an
    /// offset pointer needing patch-up (component C6 step 4) and the
    /// verifier must treat it as a pointer needing bounds validation
    /// (component C7).
    pub is_pointer: bool,
}

/// Implemented by every `#[derive(Archive)]`-annotated aggregate type's
/// archived form: lists its fields, in declaration order, for
/// diagnostics and tooling that wants to walk a struct's layout
/// generically (e.g. a debugger pretty-printer or an offline layout
/// dump) without matching on its concrete Rust type.
///
/// This is the direct replacement for the reference implementation's
/// runtime `for_each_field` callback contract: instead of invoking a
/// callback with each field's address at serialization time, the
/// derive macro emits a `const` table describing the fields up front,
/// which is dependency-free (no arity-probing template trick required).
/// The serialization engine and the verifier ([`crate::de::Verify`])
/// do not walk this table themselves -- the derive macro also emits a
/// direct, per-field `resolve`/`serialize`/`deserialize`/`verify` body
/// for each type, the same way `bytecheck`'s own derive does, since a
/// concrete per-field call is both faster and more precisely typed than
/// a runtime loop over field descriptors and trait-object callbacks.
pub trait FieldWalk {
    /// The fields of this archived type, in declaration order.
    const FIELDS: &'static [FieldDescriptor];
}
