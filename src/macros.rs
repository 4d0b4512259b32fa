/// Generates [`CodeEmitter`](crate::emitter::CodeEmitter) methods for
/// instructions that are a single opcode byte with a fixed stack effect.
///
/// Each entry reads `name => OPCODE, stack_delta;`.
macro_rules! simple_insns {
    ($($name:ident => $opcode:ident, $delta:expr;)*) => {
        impl crate::emitter::CodeEmitter<'_> {
            $(
                pub fn $name(&mut self) {
                    self.simple(crate::opcodes::$opcode, $delta);
                }
            )*
        }
    };
}

/// Like [`simple_insns!`] for instructions after which control never falls
/// through to the next one.
macro_rules! abrupt_insns {
    ($($name:ident => $opcode:ident, $delta:expr;)*) => {
        impl crate::emitter::CodeEmitter<'_> {
            $(
                pub fn $name(&mut self) {
                    self.simple(crate::opcodes::$opcode, $delta);
                    self.mark_abrupt();
                }
            )*
        }
    };
}

/// Generates conditional branch methods taking the target label.
macro_rules! branch_insns {
    ($($name:ident => $opcode:ident, $delta:expr;)*) => {
        impl crate::emitter::CodeEmitter<'_> {
            $(
                pub fn $name(&mut self, label: crate::label::LabelId) {
                    self.conditional_branch(crate::opcodes::$opcode, $delta, label);
                }
            )*
        }
    };
}
