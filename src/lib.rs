pub mod builtin;
pub mod exec;
mod helper;
pub mod parser;
pub mod shell;

pub use helper::DynError;
