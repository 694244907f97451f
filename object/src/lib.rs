mod array;
mod objects;
mod string;
mod value;
mod visitor;

pub use array::{ARRAY_MIN_ALLOC, ArrayType, DvmArray, IndexOutOfBounds};
pub use objects::{HeapObject, ObjectKind, ObjectRef, ObjectType};
pub use string::DvmString;
pub use value::Value;
pub use visitor::Visitable;
