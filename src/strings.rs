//! String concatenation through `StringBuilder` (or `StringBuffer` before 1.5).

use crate::constants::{
    APPEND, INIT, INTERN, JAVA_LANG_STRING, JAVA_LANG_STRING_BUFFER, JAVA_LANG_STRING_BUILDER,
    TO_STRING, VALUE_OF,
};
use crate::emitter::CodeEmitter;
use crate::opcodes;
use crate::types::{Constant, ConversionCode, TypeId};

/// One side of a `+` on strings.
pub enum ConcatOperand<'g> {
    Constant {
        value: Constant,
        source_start: usize,
    },
    /// A value produced by `generate`, which must push exactly one value of
    /// `type_id`.
    Value {
        type_id: TypeId,
        source_start: usize,
        generate: &'g mut dyn FnMut(&mut CodeEmitter<'_>),
    },
}

impl ConcatOperand<'_> {
    pub fn type_id(&self) -> TypeId {
        match self {
            ConcatOperand::Constant { value, .. } => value.type_id(),
            ConcatOperand::Value { type_id, .. } => *type_id,
        }
    }

    pub fn source_start(&self) -> usize {
        match self {
            ConcatOperand::Constant { source_start, .. } | ConcatOperand::Value { source_start, .. } => {
                *source_start
            }
        }
    }

    fn is_empty_string(&self) -> bool {
        matches!(self, ConcatOperand::Constant { value: Constant::String(value), .. } if value.is_empty())
    }
}

/// Parameter descriptor used by `append` and `String.valueOf` for a type.
fn append_parameter(type_id: TypeId, string_param: &'static str) -> &'static str {
    match type_id {
        TypeId::Int | TypeId::Byte | TypeId::Short => "I",
        TypeId::Long => "J",
        TypeId::Float => "F",
        TypeId::Double => "D",
        TypeId::Char => "C",
        TypeId::Boolean => "Z",
        TypeId::String | TypeId::Null => string_param,
        _ => "Ljava/lang/Object;",
    }
}

impl CodeEmitter<'_> {
    fn string_concatenation_class(&self) -> &'static str {
        if self.options().supports_boxing() {
            JAVA_LANG_STRING_BUILDER
        } else {
            JAVA_LANG_STRING_BUFFER
        }
    }

    /// `new StringBuilder`, without the `dup`.
    pub fn new_string_concatenation(&mut self) {
        let class = self.string_concatenation_class();
        self.new_(class);
    }

    pub fn invoke_string_concatenation_default_constructor(&mut self) {
        let class = self.string_concatenation_class();
        self.invoke(opcodes::INVOKESPECIAL, 0, 0, class, INIT, "()V");
    }

    pub fn invoke_string_concatenation_string_constructor(&mut self) {
        let class = self.string_concatenation_class();
        self.invoke(opcodes::INVOKESPECIAL, 1, 0, class, INIT, "(Ljava/lang/String;)V");
    }

    pub fn invoke_string_concatenation_append_for_type(&mut self, type_id: TypeId) {
        let class = self.string_concatenation_class();
        let parameter = append_parameter(type_id, "Ljava/lang/String;");
        let descriptor = format!("({parameter})L{class};");
        self.invoke(opcodes::INVOKEVIRTUAL, type_id.slots().max(1), 1, class, APPEND, &descriptor);
    }

    pub fn invoke_string_concatenation_to_string(&mut self) {
        let class = self.string_concatenation_class();
        self.invoke(opcodes::INVOKEVIRTUAL, 0, 1, class, TO_STRING, "()Ljava/lang/String;");
    }

    pub fn invoke_string_intern(&mut self) {
        self.invoke(opcodes::INVOKEVIRTUAL, 0, 1, JAVA_LANG_STRING, INTERN, "()Ljava/lang/String;");
    }

    /// `String.valueOf` for a value of `type_id`; references go through
    /// `valueOf(Object)` so that `null` becomes `"null"`.
    pub fn invoke_string_value_of(&mut self, type_id: TypeId) {
        let parameter = append_parameter(type_id, "Ljava/lang/Object;");
        let descriptor = format!("({parameter})Ljava/lang/String;");
        self.invoke(
            opcodes::INVOKESTATIC,
            type_id.slots().max(1),
            1,
            JAVA_LANG_STRING,
            VALUE_OF,
            &descriptor,
        );
    }

    fn generate_operand(&mut self, operand: &mut ConcatOperand<'_>) {
        match operand {
            ConcatOperand::Constant {
                value: Constant::String(value),
                ..
            } => {
                let value = value.clone();
                self.ldc_string(&value);
            }
            ConcatOperand::Constant { value, .. } => {
                let value = value.clone();
                self.generate_constant(&value, ConversionCode::NONE);
            }
            ConcatOperand::Value { generate, .. } => generate(self),
        }
    }

    /// Creates the builder initialized with the first operand.
    pub fn generate_string_concatenation_creation(&mut self, operand: &mut ConcatOperand<'_>) {
        self.new_string_concatenation();
        self.dup();
        match operand.type_id() {
            TypeId::Object | TypeId::Undefined => {
                self.invoke_string_concatenation_default_constructor();
                self.generate_operand(operand);
                self.invoke_string_concatenation_append_for_type(TypeId::Object);
                return;
            }
            TypeId::String | TypeId::Null => {
                if operand.is_empty_string() {
                    self.invoke_string_concatenation_default_constructor();
                    return;
                }
                let constant = matches!(operand, ConcatOperand::Constant { .. });
                self.generate_operand(operand);
                if !constant {
                    self.invoke_string_value_of(TypeId::Object);
                }
            }
            other => {
                self.generate_operand(operand);
                self.invoke_string_value_of(other);
            }
        }
        self.invoke_string_concatenation_string_constructor();
    }

    /// Appends an operand to the builder on top of the stack.
    pub fn generate_string_concatenation(&mut self, operand: &mut ConcatOperand<'_>) {
        if operand.is_empty_string() {
            return;
        }
        let type_id = operand.type_id();
        self.generate_operand(operand);
        self.invoke_string_concatenation_append_for_type(type_id);
    }

    /// `first + second` on strings. With no `first`, the left operand is
    /// already on the stack as a `String` that may be `null`.
    pub fn generate_string_concatenation_append(
        &mut self,
        first: Option<&mut ConcatOperand<'_>>,
        second: &mut ConcatOperand<'_>,
    ) {
        match first {
            None => {
                self.new_string_concatenation();
                self.dup_x1();
                self.swap();
                self.invoke_string_value_of(TypeId::Object);
                self.invoke_string_concatenation_string_constructor();
            }
            Some(first) => {
                let pc = self.position();
                self.generate_string_concatenation_creation(first);
                self.record_positions_from(pc, first.source_start(), false);
            }
        }
        let pc = self.position();
        self.generate_string_concatenation(second);
        self.record_positions_from(pc, second.source_start(), false);
        self.invoke_string_concatenation_to_string();
    }
}
