//! Constant loading and primitive conversions.

use crate::constants::{INIT, VALUE_OF};
use crate::emitter::CodeEmitter;
use crate::error::EmitError;
use crate::opcodes;
use crate::types::{Constant, ConversionCode, Operator, TypeId};

impl CodeEmitter<'_> {
    /// Pushes an `int` with the shortest encoding.
    pub fn generate_inlined_int(&mut self, value: i32) {
        match value {
            -1 => self.iconst_m1(),
            0 => self.iconst_0(),
            1 => self.iconst_1(),
            2 => self.iconst_2(),
            3 => self.iconst_3(),
            4 => self.iconst_4(),
            5 => self.iconst_5(),
            -128..=127 => self.bipush(value as i8),
            -32768..=32767 => self.sipush(value as i16),
            _ => self.ldc_int(value),
        }
    }

    pub fn generate_inlined_byte(&mut self, value: i8) {
        self.generate_inlined_int(value as i32);
    }

    pub fn generate_inlined_short(&mut self, value: i16) {
        self.generate_inlined_int(value as i32);
    }

    pub fn generate_inlined_char(&mut self, value: u16) {
        self.generate_inlined_int(value as i32);
    }

    pub fn generate_inlined_boolean(&mut self, value: bool) {
        if value {
            self.iconst_1();
        } else {
            self.iconst_0();
        }
    }

    pub fn generate_inlined_long(&mut self, value: i64) {
        match value {
            0 => self.lconst_0(),
            1 => self.lconst_1(),
            _ => self.ldc_long(value),
        }
    }

    /// `-0.0` is never folded into `fconst_0`.
    pub fn generate_inlined_float(&mut self, value: f32) {
        if value.to_bits() == 0 {
            self.fconst_0();
        } else if value == 1.0 {
            self.fconst_1();
        } else if value == 2.0 {
            self.fconst_2();
        } else {
            self.ldc_float(value);
        }
    }

    pub fn generate_inlined_double(&mut self, value: f64) {
        if value.to_bits() == 0 {
            self.dconst_0();
        } else if value == 1.0 {
            self.dconst_1();
        } else {
            self.ldc_double(value);
        }
    }

    /// Pushes `constant` converted to the runtime type of `conversion`, boxing
    /// it when asked to.
    pub fn generate_constant(&mut self, constant: &Constant, conversion: ConversionCode) {
        let target = conversion
            .runtime_type()
            .filter(|target| *target != TypeId::Undefined)
            .unwrap_or_else(|| constant.type_id());
        match target {
            TypeId::Boolean => self.generate_inlined_boolean(constant.boolean_value()),
            TypeId::Char => self.generate_inlined_char(constant.char_value()),
            TypeId::Byte => self.generate_inlined_byte(constant.byte_value()),
            TypeId::Short => self.generate_inlined_short(constant.short_value()),
            TypeId::Int => self.generate_inlined_int(constant.int_value()),
            TypeId::Long => self.generate_inlined_long(constant.long_value()),
            TypeId::Float => self.generate_inlined_float(constant.float_value()),
            TypeId::Double => self.generate_inlined_double(constant.double_value()),
            TypeId::String => self.ldc_string(&constant.string_value()),
            other => {
                return self.fail(EmitError::UnsupportedType {
                    type_id: other,
                    operation: "generate_constant",
                });
            }
        }
        if conversion.is_boxing() {
            self.generate_boxing_conversion(target);
        }
    }

    /// Converts the value on top of the stack as described by `conversion`:
    /// unboxing first, then the primitive widening or narrowing, then boxing.
    pub fn generate_implicit_conversion(&mut self, conversion: ConversionCode) {
        let compile = conversion.compile_type().unwrap_or(TypeId::Undefined);
        let runtime = conversion.runtime_type().unwrap_or(TypeId::Undefined);
        if conversion.is_unboxing() {
            self.generate_unboxing_conversion(compile);
        }
        use TypeId::*;
        match (compile, runtime) {
            (Float, Char) => {
                self.f2i();
                self.i2c();
            }
            (Double, Char) => {
                self.d2i();
                self.i2c();
            }
            (Int | Short | Byte, Char) => self.i2c(),
            (Long, Char) => {
                self.l2i();
                self.i2c();
            }
            (Char | Short | Int | Byte, Float) => self.i2f(),
            (Double, Float) => self.d2f(),
            (Long, Float) => self.l2f(),
            (Float, Byte) => {
                self.f2i();
                self.i2b();
            }
            (Double, Byte) => {
                self.d2i();
                self.i2b();
            }
            (Int | Short | Char, Byte) => self.i2b(),
            (Long, Byte) => {
                self.l2i();
                self.i2b();
            }
            (Byte | Char | Short | Int, Double) => self.i2d(),
            (Float, Double) => self.f2d(),
            (Long, Double) => self.l2d(),
            (Byte | Char | Int, Short) => self.i2s(),
            (Double, Short) => {
                self.d2i();
                self.i2s();
            }
            (Long, Short) => {
                self.l2i();
                self.i2s();
            }
            (Float, Short) => {
                self.f2i();
                self.i2s();
            }
            (Double, Int) => self.d2i(),
            (Float, Int) => self.f2i(),
            (Long, Int) => self.l2i(),
            (Int | Char | Byte | Short, Long) => self.i2l(),
            (Double, Long) => self.d2l(),
            (Float, Long) => self.f2l(),
            _ => {}
        }
        if conversion.is_boxing() {
            self.generate_boxing_conversion(runtime);
        }
    }

    /// Wraps the primitive on top of the stack: `Wrapper.valueOf` from 1.5 on,
    /// a constructor call before.
    pub fn generate_boxing_conversion(&mut self, unboxed: TypeId) {
        let (Some(wrapper), Some(descriptor)) = (unboxed.wrapper_class(), unboxed.primitive_descriptor())
        else {
            return self.fail(EmitError::UnsupportedType {
                type_id: unboxed,
                operation: "boxing",
            });
        };
        if unboxed == TypeId::Void {
            return self.fail(EmitError::UnsupportedType {
                type_id: unboxed,
                operation: "boxing",
            });
        }
        let slots = unboxed.slots();
        if self.options().supports_boxing() {
            let signature = format!("({descriptor})L{wrapper};");
            self.invoke(opcodes::INVOKESTATIC, slots, 1, wrapper, VALUE_OF, &signature);
        } else {
            self.new_(wrapper);
            if slots == 2 {
                self.dup_x2();
                self.dup_x2();
                self.pop();
            } else {
                self.dup_x1();
                self.swap();
            }
            let signature = format!("({descriptor})V");
            self.invoke(opcodes::INVOKESPECIAL, slots, 0, wrapper, INIT, &signature);
        }
    }

    /// Calls `xxxValue()` on the wrapper on top of the stack.
    pub fn generate_unboxing_conversion(&mut self, unboxed: TypeId) {
        let (Some(wrapper), Some(name), Some(descriptor)) = (
            unboxed.wrapper_class(),
            unboxed.primitive_name(),
            unboxed.primitive_descriptor(),
        ) else {
            return self.fail(EmitError::UnsupportedType {
                type_id: unboxed,
                operation: "unboxing",
            });
        };
        let selector = format!("{name}Value");
        let signature = format!("(){descriptor}");
        self.invoke(opcodes::INVOKEVIRTUAL, 0, unboxed.slots(), wrapper, &selector, &signature);
    }

    /// Pushes the `Class` object of a primitive type through `Wrapper.TYPE`.
    pub fn get_type_literal(&mut self, base_type: TypeId) {
        match base_type.wrapper_class() {
            Some(wrapper) => {
                self.field_insn(opcodes::GETSTATIC, wrapper, "TYPE", "Ljava/lang/Class;", 1)
            }
            None => self.fail(EmitError::UnsupportedType {
                type_id: base_type,
                operation: "get_type_literal",
            }),
        }
    }

    /// The arithmetic instruction for `operator` on operands of `type_id`.
    pub fn send_operator(&mut self, operator: Operator, type_id: TypeId) {
        use Operator::*;
        match type_id {
            t if t.is_int_like() => match operator {
                Plus => self.iadd(),
                Minus => self.isub(),
                Multiply => self.imul(),
                Divide => self.idiv(),
                Remainder => self.irem(),
                LeftShift => self.ishl(),
                RightShift => self.ishr(),
                UnsignedRightShift => self.iushr(),
                And => self.iand(),
                Or => self.ior(),
                Xor => self.ixor(),
            },
            TypeId::Long => match operator {
                Plus => self.ladd(),
                Minus => self.lsub(),
                Multiply => self.lmul(),
                Divide => self.ldiv(),
                Remainder => self.lrem(),
                LeftShift => self.lshl(),
                RightShift => self.lshr(),
                UnsignedRightShift => self.lushr(),
                And => self.land(),
                Or => self.lor(),
                Xor => self.lxor(),
            },
            TypeId::Float => match operator {
                Plus => self.fadd(),
                Minus => self.fsub(),
                Multiply => self.fmul(),
                Divide => self.fdiv(),
                Remainder => self.frem(),
                _ => self.unsupported_operator(type_id),
            },
            TypeId::Double => match operator {
                Plus => self.dadd(),
                Minus => self.dsub(),
                Multiply => self.dmul(),
                Divide => self.ddiv(),
                Remainder => self.drem(),
                _ => self.unsupported_operator(type_id),
            },
            _ => self.unsupported_operator(type_id),
        }
    }

    fn unsupported_operator(&mut self, type_id: TypeId) {
        self.fail(EmitError::UnsupportedType {
            type_id,
            operation: "send_operator",
        });
    }
}
