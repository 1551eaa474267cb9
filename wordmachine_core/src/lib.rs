pub mod engine;
pub mod error;
pub mod isa;
pub mod machine;
pub mod memory;
pub mod step;
