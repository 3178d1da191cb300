//! Forthic core - tokenizer, interpreter, and module system for the
//! Forthic language.
//!
//! Forthic is a stack-based, concatenative language. This crate implements
//! the language core: a positioned tokenizer, an async interpreter over a
//! data stack, a module/namespace system with import semantics, user-defined
//! and memoized words, a configurable literal-dispatch chain, and a
//! structured error model with call-site and definition-site locations.
//!
//! Standard library words are not part of this crate; hosts plug them in
//! through [`module::Module::add_module_word`] and
//! [`interpreter::Interpreter::register_module`].

pub mod errors;
pub mod interpreter;
pub mod literals;
pub mod module;
pub mod tokenizer;
pub mod utils;
pub mod values;
pub mod wire;

// Re-export commonly used types
pub use errors::{CodeLocation, ForthicError};
pub use interpreter::{dup_interpreter, Interpreter, RecoveryHandler, Stack};
pub use module::{Module, ModuleRef, Variable, Word, WordErrorHandler};
pub use tokenizer::{PositionedString, Token, TokenType, Tokenizer};
pub use values::Value;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::errors::{CodeLocation, ForthicError};
    pub use crate::interpreter::{dup_interpreter, Interpreter, RecoveryHandler, Stack};
    pub use crate::literals::LiteralHandler;
    pub use crate::module::{
        module_ref, DefinitionWord, ExecuteWord, Module, ModuleRef, ModuleWord, PushValueWord,
        Variable, Word, WordErrorHandler, WordFuture, WordHandler,
    };
    pub use crate::tokenizer::{PositionedString, Token, TokenType, Tokenizer};
    pub use crate::values::Value;
    pub use crate::wire::{from_wire, to_wire, WireError, WireValue};
}
