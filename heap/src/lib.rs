mod heap;

pub use heap::*;
