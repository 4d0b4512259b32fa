//! Per-method JVM bytecode emission.
//!
//! A [`CodeEmitter`] writes the instructions of one method body into a single
//! buffer, tracking the operand stack and local slots as it goes. Forward
//! branches are patched when their [`LabelId`] is placed; a method whose
//! branches do not fit in 16 bits is re-emitted in wide mode by
//! [`emit_method`]. The finished [`MethodCode`] carries the exception table
//! and the optional line number and local variable tables, ready for
//! [`write_code_attribute`].

#[macro_use]
mod macros;

pub mod binding;
pub mod buffer;
pub mod code_attribute;
pub mod constant_pool;
pub mod constants;
pub mod conversions;
pub mod debug;
pub mod emitter;
pub mod error;
pub mod inspect;
pub mod instructions;
pub mod label;
pub mod method;
pub mod opcodes;
pub mod options;
pub mod strings;
pub mod synthetic;
pub mod types;

pub use binding::{FieldBinding, LocalBinding, MethodBinding, ScopeId};
pub use code_attribute::write_code_attribute;
pub use constant_pool::{ConstantPool, ConstantPoolBuilder, CpInfo};
pub use emitter::{CodeEmitter, HandlerId, LocalId};
pub use error::{EmitError, Error, InspectError};
pub use label::LabelId;
pub use method::{MethodCode, MethodContext, emit_method};
pub use options::CodegenOptions;
pub use types::{Constant, ConversionCode, FieldType, TargetLevel, TypeId};
