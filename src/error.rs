use crate::label::LabelId;
use crate::types::TypeId;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("code emission error")]
    Emit(#[source] EmitError),
    #[error("bytecode inspection error")]
    Inspect(#[source] InspectError),
}

impl From<EmitError> for Error {
    fn from(value: EmitError) -> Self {
        Error::Emit(value)
    }
}

impl From<InspectError> for Error {
    fn from(value: InspectError) -> Self {
        Error::Inspect(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EmitError {
    /// A 16-bit branch offset overflowed; the method must be generated again in wide mode.
    #[error("branch offset does not fit in 16 bits, restart in wide mode")]
    NeedsWideRetry,
    #[error("branch offset {offset} at {site} does not fit its encoding")]
    BranchOffsetOverflow { site: usize, offset: i64 },
    #[error("type {type_id:?} is not supported by {operation}")]
    UnsupportedType {
        type_id: TypeId,
        operation: &'static str,
    },
    #[error("label {0:?} has pending branches but was never placed")]
    UnplacedLabel(LabelId),
    #[error("label {0:?} placed twice")]
    LabelPlacedTwice(LabelId),
    #[error("label {0:?} does not belong to this emitter")]
    UnknownLabel(LabelId),
    #[error("label {0:?} is not a case label")]
    ExpectedCaseLabel(LabelId),
    #[error("local variable {0} still has an open live range")]
    UnclosedLocal(String),
    #[error("method code length {0} exceeds 65535 bytes")]
    CodeTooLarge(usize),
    #[error("invalid descriptor {0}")]
    InvalidDescriptor(String),
    #[error("switch case {index} has no key in range, no label, or breaks ascending key order")]
    InvalidSwitchCase { index: usize },
    #[error("operand {value} of {operation} does not fit its encoding")]
    OperandOutOfRange { operation: &'static str, value: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InspectError {
    #[error("unexpected end of code at {0}")]
    UnexpectedEof(usize),
    #[error("invalid opcode 0x{opcode:02X} at offset {offset}")]
    InvalidOpcode { opcode: u8, offset: usize },
    #[error("invalid constant pool index {0}")]
    InvalidIndex(u16),
    #[error("invalid descriptor {0}")]
    InvalidDescriptor(String),
    #[error("stack underflow at {0}")]
    StackUnderflow(usize),
    #[error("inconsistent stack depth at {offset}: {existing} vs {incoming}")]
    InconsistentDepth {
        offset: usize,
        existing: u16,
        incoming: u16,
    },
    #[error("branch target {target} from {offset} is not an instruction boundary")]
    InvalidBranchTarget { offset: usize, target: i64 },
}
