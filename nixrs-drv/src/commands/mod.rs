pub mod context;
pub mod hash_modulo;
pub mod placeholder;
pub mod show;
pub mod write;
