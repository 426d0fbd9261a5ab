pub mod intrinsics;

pub use intrinsics::*;
