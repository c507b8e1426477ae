//! Best-effort syntactic detection of which field types archive to an
//! offset pointer, for [`cairn::field_walk::FieldDescriptor::is_pointer`].
//!
//! This is necessarily a heuristic: the macro only sees field syntax,
//! not the resolved type, so it recognizes the container idents this
//! crate ships (`Box`, `Vec`, `String`, ...) by name rather than
//! querying an actual trait. A field naming one of the recognized
//! containers (directly, or through one level of `Option<_>`) is
//! marked pointer-bearing; anything else -- primitives, `bool`, and
//! user-defined aggregate types with their own `FieldWalk::FIELDS` --
//! is not, since a nested aggregate's pointer fields are reached by
//! walking *its* field table, not flagged on the parent's.
use syn::{GenericArgument, PathArguments, Type};

const POINTER_BEARING: &[&str] = &[
    "Box",
    "Vec",
    "String",
    "HashMap",
    "HashSet",
    "NestedVec",
    "NestedVec2",
    "RTree",
    "Bitset",
];

pub fn is_pointer_type(ty: &Type) -> bool {
    let Type::Path(type_path) = ty else {
        return false;
    };
    let Some(segment) = type_path.path.segments.last() else {
        return false;
    };
    let ident = segment.ident.to_string();

    if ident == "Option" {
        if let PathArguments::AngleBracketed(args) = &segment.arguments {
            return args.args.iter().any(|arg| {
                matches!(arg, GenericArgument::Type(inner) if is_pointer_type(inner))
            });
        }
        return false;
    }

    POINTER_BEARING.contains(&ident.as_str())
}
