//! Instruction encoders of [`CodeEmitter`].
//!
//! Every encoder clears the labels pending at the current position, adjusts
//! the tracked stack depth and writes the opcode and its operands.

use crate::binding::{FieldBinding, MethodBinding};
use crate::constant_pool::{modified_utf8_len, split_modified_utf8};
use crate::emitter::{CodeEmitter, LocalId};
use crate::error::EmitError;
use crate::label::LabelId;
use crate::opcodes;
use crate::types::{FieldType, TypeId};

/// Longest modified UTF-8 encoding a `CONSTANT_Utf8` entry can hold.
const MAX_UTF8_LENGTH: usize = 65535;
/// Chunk size used when a string literal has to be split.
const STRING_CHUNK_LENGTH: usize = 65532;

simple_insns! {
    nop => NOP, 0;
    aconst_null => ACONST_NULL, 1;
    iconst_m1 => ICONST_M1, 1;
    iconst_0 => ICONST_0, 1;
    iconst_1 => ICONST_1, 1;
    iconst_2 => ICONST_2, 1;
    iconst_3 => ICONST_3, 1;
    iconst_4 => ICONST_4, 1;
    iconst_5 => ICONST_5, 1;
    lconst_0 => LCONST_0, 2;
    lconst_1 => LCONST_1, 2;
    fconst_0 => FCONST_0, 1;
    fconst_1 => FCONST_1, 1;
    fconst_2 => FCONST_2, 1;
    dconst_0 => DCONST_0, 2;
    dconst_1 => DCONST_1, 2;
    iaload => IALOAD, -1;
    laload => LALOAD, 0;
    faload => FALOAD, -1;
    daload => DALOAD, 0;
    aaload => AALOAD, -1;
    baload => BALOAD, -1;
    caload => CALOAD, -1;
    saload => SALOAD, -1;
    iastore => IASTORE, -3;
    lastore => LASTORE, -4;
    fastore => FASTORE, -3;
    dastore => DASTORE, -4;
    aastore => AASTORE, -3;
    bastore => BASTORE, -3;
    castore => CASTORE, -3;
    sastore => SASTORE, -3;
    pop => POP, -1;
    pop2 => POP2, -2;
    dup => DUP, 1;
    dup_x1 => DUP_X1, 1;
    dup_x2 => DUP_X2, 1;
    dup2 => DUP2, 2;
    dup2_x1 => DUP2_X1, 2;
    dup2_x2 => DUP2_X2, 2;
    swap => SWAP, 0;
    iadd => IADD, -1;
    ladd => LADD, -2;
    fadd => FADD, -1;
    dadd => DADD, -2;
    isub => ISUB, -1;
    lsub => LSUB, -2;
    fsub => FSUB, -1;
    dsub => DSUB, -2;
    imul => IMUL, -1;
    lmul => LMUL, -2;
    fmul => FMUL, -1;
    dmul => DMUL, -2;
    idiv => IDIV, -1;
    ldiv => LDIV, -2;
    fdiv => FDIV, -1;
    ddiv => DDIV, -2;
    irem => IREM, -1;
    lrem => LREM, -2;
    frem => FREM, -1;
    drem => DREM, -2;
    ineg => INEG, 0;
    lneg => LNEG, 0;
    fneg => FNEG, 0;
    dneg => DNEG, 0;
    ishl => ISHL, -1;
    lshl => LSHL, -1;
    ishr => ISHR, -1;
    lshr => LSHR, -1;
    iushr => IUSHR, -1;
    lushr => LUSHR, -1;
    iand => IAND, -1;
    land => LAND, -2;
    ior => IOR, -1;
    lor => LOR, -2;
    ixor => IXOR, -1;
    lxor => LXOR, -2;
    i2l => I2L, 1;
    i2f => I2F, 0;
    i2d => I2D, 1;
    l2i => L2I, -1;
    l2f => L2F, -1;
    l2d => L2D, 0;
    f2i => F2I, 0;
    f2l => F2L, 1;
    f2d => F2D, 1;
    d2i => D2I, -1;
    d2l => D2L, 0;
    d2f => D2F, -1;
    i2b => I2B, 0;
    i2c => I2C, 0;
    i2s => I2S, 0;
    lcmp => LCMP, -3;
    fcmpl => FCMPL, -1;
    fcmpg => FCMPG, -1;
    dcmpl => DCMPL, -3;
    dcmpg => DCMPG, -3;
    arraylength => ARRAYLENGTH, 0;
    monitorenter => MONITORENTER, -1;
    monitorexit => MONITOREXIT, -1;
}

abrupt_insns! {
    ireturn => IRETURN, -1;
    lreturn => LRETURN, -2;
    freturn => FRETURN, -1;
    dreturn => DRETURN, -2;
    areturn => ARETURN, -1;
    return_ => RETURN, 0;
    athrow => ATHROW, -1;
}

branch_insns! {
    ifeq => IFEQ, -1;
    ifne => IFNE, -1;
    iflt => IFLT, -1;
    ifge => IFGE, -1;
    ifgt => IFGT, -1;
    ifle => IFLE, -1;
    if_icmpeq => IF_ICMPEQ, -2;
    if_icmpne => IF_ICMPNE, -2;
    if_icmplt => IF_ICMPLT, -2;
    if_icmpge => IF_ICMPGE, -2;
    if_icmpgt => IF_ICMPGT, -2;
    if_icmple => IF_ICMPLE, -2;
    if_acmpeq => IF_ACMPEQ, -2;
    if_acmpne => IF_ACMPNE, -2;
    ifnull => IFNULL, -1;
    ifnonnull => IFNONNULL, -1;
}

impl CodeEmitter<'_> {
    /// Local variable access: `xload_<n>` for slots 0 to 3, the one-byte
    /// index form up to 255 and the `wide` form beyond.
    fn local_insn(&mut self, general: u8, fast_base: u8, index: u16, slots: u16, delta: i32) {
        self.begin_instruction();
        self.adjust_stack(delta);
        self.reserve_locals(index, slots);
        let buffer = self.buffer_mut();
        if index <= 3 {
            buffer.write_u1(fast_base + index as u8);
        } else if index <= 255 {
            buffer.write_u1(general);
            buffer.write_u1(index as u8);
        } else {
            buffer.write_u1(opcodes::WIDE);
            buffer.write_u1(general);
            buffer.write_u2(index);
        }
    }

    pub fn iload(&mut self, index: u16) {
        self.local_insn(opcodes::ILOAD, opcodes::ILOAD_0, index, 1, 1);
    }

    pub fn lload(&mut self, index: u16) {
        self.local_insn(opcodes::LLOAD, opcodes::LLOAD_0, index, 2, 2);
    }

    pub fn fload(&mut self, index: u16) {
        self.local_insn(opcodes::FLOAD, opcodes::FLOAD_0, index, 1, 1);
    }

    pub fn dload(&mut self, index: u16) {
        self.local_insn(opcodes::DLOAD, opcodes::DLOAD_0, index, 2, 2);
    }

    pub fn aload(&mut self, index: u16) {
        self.local_insn(opcodes::ALOAD, opcodes::ALOAD_0, index, 1, 1);
    }

    pub fn istore(&mut self, index: u16) {
        self.local_insn(opcodes::ISTORE, opcodes::ISTORE_0, index, 1, -1);
    }

    pub fn lstore(&mut self, index: u16) {
        self.local_insn(opcodes::LSTORE, opcodes::LSTORE_0, index, 2, -2);
    }

    pub fn fstore(&mut self, index: u16) {
        self.local_insn(opcodes::FSTORE, opcodes::FSTORE_0, index, 1, -1);
    }

    pub fn dstore(&mut self, index: u16) {
        self.local_insn(opcodes::DSTORE, opcodes::DSTORE_0, index, 2, -2);
    }

    pub fn astore(&mut self, index: u16) {
        self.local_insn(opcodes::ASTORE, opcodes::ASTORE_0, index, 1, -1);
    }

    /// Increment must fit in 16 bits; larger values need `iload`/`iadd`.
    pub fn iinc(&mut self, index: u16, value: i32) {
        let Ok(wide_value) = i16::try_from(value) else {
            return self.fail(EmitError::OperandOutOfRange {
                operation: "iinc",
                value: value as i64,
            });
        };
        self.begin_instruction();
        self.reserve_locals(index, 1);
        let buffer = self.buffer_mut();
        match i8::try_from(value) {
            Ok(narrow_value) if index <= 255 => {
                buffer.write_u1(opcodes::IINC);
                buffer.write_u1(index as u8);
                buffer.write_i1(narrow_value);
            }
            _ => {
                buffer.write_u1(opcodes::WIDE);
                buffer.write_u1(opcodes::IINC);
                buffer.write_u2(index);
                buffer.write_i2(wide_value);
            }
        }
    }

    pub fn ret(&mut self, index: u16) {
        self.begin_instruction();
        self.reserve_locals(index, 1);
        let buffer = self.buffer_mut();
        if index > 255 {
            buffer.write_u1(opcodes::WIDE);
            buffer.write_u1(opcodes::RET);
            buffer.write_u2(index);
        } else {
            buffer.write_u1(opcodes::RET);
            buffer.write_u1(index as u8);
        }
    }

    pub fn bipush(&mut self, value: i8) {
        self.begin_instruction();
        self.adjust_stack(1);
        self.buffer_mut().write_u1(opcodes::BIPUSH);
        self.buffer_mut().write_i1(value);
    }

    pub fn sipush(&mut self, value: i16) {
        self.begin_instruction();
        self.adjust_stack(1);
        self.buffer_mut().write_u1(opcodes::SIPUSH);
        self.buffer_mut().write_i2(value);
    }

    /// `ldc` for indexes that fit one byte, `ldc_w` otherwise.
    pub fn ldc_for_index(&mut self, index: u16) {
        self.begin_instruction();
        self.adjust_stack(1);
        let buffer = self.buffer_mut();
        if index > 255 {
            buffer.write_u1(opcodes::LDC_W);
            buffer.write_u2(index);
        } else {
            buffer.write_u1(opcodes::LDC);
            buffer.write_u1(index as u8);
        }
    }

    fn ldc2_w(&mut self, index: u16) {
        self.begin_instruction();
        self.adjust_stack(2);
        self.buffer_mut().write_u1(opcodes::LDC2_W);
        self.buffer_mut().write_u2(index);
    }

    pub fn ldc_int(&mut self, value: i32) {
        let index = self.pool().integer(value);
        self.ldc_for_index(index);
    }

    pub fn ldc_float(&mut self, value: f32) {
        let index = self.pool().float(value);
        self.ldc_for_index(index);
    }

    pub fn ldc_long(&mut self, value: i64) {
        let index = self.pool().long(value);
        self.ldc2_w(index);
    }

    pub fn ldc_double(&mut self, value: f64) {
        let index = self.pool().double(value);
        self.ldc2_w(index);
    }

    /// Pushes a `java.lang.Class` constant; needs a 1.5 target.
    pub fn ldc_class(&mut self, name: &str) {
        let index = self.pool().class(name);
        self.ldc_for_index(index);
    }

    /// Pushes a string literal. Literals too long for one constant pool entry
    /// are rebuilt at run time from chunks and interned.
    pub fn ldc_string(&mut self, value: &str) {
        if modified_utf8_len(value) <= MAX_UTF8_LENGTH {
            let index = self.pool().string(value);
            self.ldc_for_index(index);
            return;
        }
        let chunks = split_modified_utf8(value, STRING_CHUNK_LENGTH);
        log::trace!("splitting string literal into {} chunks", chunks.len());
        self.new_string_concatenation();
        self.dup();
        let mut chunks = chunks.iter();
        if let Some(first) = chunks.next() {
            let index = self.pool().string(first);
            self.ldc_for_index(index);
        }
        self.invoke_string_concatenation_string_constructor();
        for chunk in chunks {
            let index = self.pool().string(chunk);
            self.ldc_for_index(index);
            self.invoke_string_concatenation_append_for_type(TypeId::String);
        }
        self.invoke_string_concatenation_to_string();
        self.invoke_string_intern();
    }

    pub(crate) fn type_insn(&mut self, opcode: u8, delta: i32, name: &str) {
        let index = self.pool().class(name);
        self.begin_instruction();
        self.adjust_stack(delta);
        self.buffer_mut().write_u1(opcode);
        self.buffer_mut().write_u2(index);
    }

    pub fn new_(&mut self, class_name: &str) {
        self.type_insn(opcodes::NEW, 1, class_name);
    }

    pub fn checkcast(&mut self, name: &str) {
        self.type_insn(opcodes::CHECKCAST, 0, name);
    }

    /// Casts to the wrapper class of a primitive type.
    pub fn checkcast_for_base(&mut self, type_id: TypeId) {
        match type_id.wrapper_class() {
            Some(wrapper) => self.checkcast(wrapper),
            None => self.fail(EmitError::UnsupportedType {
                type_id,
                operation: "checkcast",
            }),
        }
    }

    pub fn instanceof(&mut self, name: &str) {
        self.type_insn(opcodes::INSTANCEOF, 0, name);
    }

    pub fn anewarray(&mut self, element_name: &str) {
        self.type_insn(opcodes::ANEWARRAY, 0, element_name);
    }

    /// `newarray` with one of the `T_*` array type codes.
    pub fn newarray(&mut self, array_type: u8) {
        self.begin_instruction();
        self.buffer_mut().write_u1(opcodes::NEWARRAY);
        self.buffer_mut().write_u1(array_type);
    }

    /// One-dimensional array of `element`.
    pub fn new_array(&mut self, element: &FieldType) {
        let array_type = match element {
            FieldType::Boolean => opcodes::T_BOOLEAN,
            FieldType::Char => opcodes::T_CHAR,
            FieldType::Float => opcodes::T_FLOAT,
            FieldType::Double => opcodes::T_DOUBLE,
            FieldType::Byte => opcodes::T_BYTE,
            FieldType::Short => opcodes::T_SHORT,
            FieldType::Int => opcodes::T_INT,
            FieldType::Long => opcodes::T_LONG,
            FieldType::Object(name) | FieldType::Array(name) => {
                let name = name.clone();
                return self.anewarray(&name);
            }
            FieldType::Void => {
                return self.fail(EmitError::UnsupportedType {
                    type_id: TypeId::Void,
                    operation: "new_array",
                });
            }
        };
        self.newarray(array_type);
    }

    pub fn multianewarray(&mut self, descriptor: &str, dimensions: u8) {
        self.type_insn(opcodes::MULTIANEWARRAY, 1 - dimensions as i32, descriptor);
        self.buffer_mut().write_u1(dimensions);
    }

    pub(crate) fn field_insn(
        &mut self,
        opcode: u8,
        owner: &str,
        name: &str,
        descriptor: &str,
        slots: u16,
    ) {
        let slots = slots as i32;
        let delta = match opcode {
            opcodes::GETFIELD => slots - 1,
            opcodes::GETSTATIC => slots,
            opcodes::PUTFIELD => -slots - 1,
            _ => -slots,
        };
        let index = self.pool().field_ref(owner, name, descriptor);
        self.begin_instruction();
        self.adjust_stack(delta);
        self.buffer_mut().write_u1(opcode);
        self.buffer_mut().write_u2(index);
    }

    pub fn getfield(&mut self, field: &FieldBinding) {
        self.field_insn(opcodes::GETFIELD, &field.owner, &field.name, &field.descriptor, field.slots());
    }

    pub fn getstatic(&mut self, field: &FieldBinding) {
        self.field_insn(opcodes::GETSTATIC, &field.owner, &field.name, &field.descriptor, field.slots());
    }

    pub fn putfield(&mut self, field: &FieldBinding) {
        self.field_insn(opcodes::PUTFIELD, &field.owner, &field.name, &field.descriptor, field.slots());
    }

    pub fn putstatic(&mut self, field: &FieldBinding) {
        self.field_insn(opcodes::PUTSTATIC, &field.owner, &field.name, &field.descriptor, field.slots());
    }

    /// Writes an invoke instruction. `arg_slots` excludes the receiver, which
    /// is accounted for here for every opcode but `invokestatic`.
    pub fn invoke(
        &mut self,
        opcode: u8,
        arg_slots: u16,
        return_slots: u16,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) {
        let index = if opcode == opcodes::INVOKEINTERFACE {
            self.pool().interface_method_ref(owner, name, descriptor)
        } else {
            self.pool().method_ref(owner, name, descriptor)
        };
        self.invoke_index(opcode, arg_slots, return_slots, index);
    }

    fn invoke_index(&mut self, opcode: u8, arg_slots: u16, return_slots: u16, index: u16) {
        self.begin_instruction();
        let mut arg_count = arg_slots as i32;
        let buffer = self.buffer_mut();
        buffer.write_u1(opcode);
        buffer.write_u2(index);
        match opcode {
            opcodes::INVOKEINTERFACE => {
                arg_count += 1;
                buffer.write_u1(arg_count as u8);
                buffer.write_u1(0);
            }
            opcodes::INVOKEVIRTUAL | opcodes::INVOKESPECIAL => arg_count += 1,
            _ => {}
        }
        self.adjust_stack(return_slots as i32 - arg_count);
    }

    fn invoke_binding(&mut self, opcode: u8, method: &MethodBinding) {
        let index = if opcode == opcodes::INVOKEINTERFACE || method.owner_is_interface {
            self.pool()
                .interface_method_ref(&method.owner, &method.name, &method.descriptor)
        } else {
            self.pool()
                .method_ref(&method.owner, &method.name, &method.descriptor)
        };
        self.invoke_index(opcode, method.argument_slots(), method.return_slots(), index);
    }

    pub fn invokevirtual(&mut self, method: &MethodBinding) {
        self.invoke_binding(opcodes::INVOKEVIRTUAL, method);
    }

    pub fn invokespecial(&mut self, method: &MethodBinding) {
        self.invoke_binding(opcodes::INVOKESPECIAL, method);
    }

    pub fn invokestatic(&mut self, method: &MethodBinding) {
        self.invoke_binding(opcodes::INVOKESTATIC, method);
    }

    pub fn invokeinterface(&mut self, method: &MethodBinding) {
        self.invoke_binding(opcodes::INVOKEINTERFACE, method);
    }

    pub fn jsr(&mut self, label: LabelId) {
        if self.is_wide_mode() {
            return self.jsr_w(label);
        }
        self.begin_instruction();
        self.buffer_mut().write_u1(opcodes::JSR);
        self.branch(label);
    }

    pub fn jsr_w(&mut self, label: LabelId) {
        self.begin_instruction();
        self.buffer_mut().write_u1(opcodes::JSR_W);
        self.branch_wide(label);
    }

    /// Opcode, then zero padding up to the next 4-byte boundary of the code.
    fn switch_header(&mut self, opcode: u8, default_label: LabelId, case_labels: &[LabelId]) -> usize {
        self.begin_instruction();
        self.adjust_stack(-1);
        let position = self.position();
        self.place_case_instruction(default_label, position);
        for label in case_labels {
            self.place_case_instruction(*label, position);
        }
        self.buffer_mut().write_u1(opcode);
        self.buffer_mut().write_zeros(3 - (position & 3));
        self.case_branch(default_label);
        position
    }

    /// `keys[sorted_indexes[i]]` must be ascending; `case_labels[i]` is the
    /// target of `keys[i]`. Values in `low..=high` without a key go to the
    /// default label.
    pub fn tableswitch(
        &mut self,
        default_label: LabelId,
        low: i32,
        high: i32,
        keys: &[i32],
        sorted_indexes: &[usize],
        case_labels: &[LabelId],
    ) {
        if !self.check_switch_cases(keys, sorted_indexes, case_labels, Some((low, high))) {
            return;
        }
        self.switch_header(opcodes::TABLESWITCH, default_label, case_labels);
        self.buffer_mut().write_i4(low);
        self.buffer_mut().write_i4(high);
        let mut next = 0;
        for value in low as i64..=high as i64 {
            let matching = sorted_indexes
                .get(next)
                .copied()
                .filter(|index| keys.get(*index).is_some_and(|key| *key as i64 == value));
            match matching.and_then(|index| case_labels.get(index)) {
                Some(label) => {
                    self.case_branch(*label);
                    next += 1;
                }
                None => self.case_branch(default_label),
            }
        }
    }

    /// Match-offset pairs are written in ascending key order.
    pub fn lookupswitch(
        &mut self,
        default_label: LabelId,
        keys: &[i32],
        sorted_indexes: &[usize],
        case_labels: &[LabelId],
    ) {
        if !self.check_switch_cases(keys, sorted_indexes, case_labels, None) {
            return;
        }
        self.switch_header(opcodes::LOOKUPSWITCH, default_label, case_labels);
        self.buffer_mut().write_i4(sorted_indexes.len() as i32);
        for &index in sorted_indexes {
            self.buffer_mut().write_i4(keys[index]);
            self.case_branch(case_labels[index]);
        }
    }

    /// Every sorted index must select a key and a label, keys must strictly
    /// ascend, and lie in `range` when given. Latches an error otherwise.
    fn check_switch_cases(
        &mut self,
        keys: &[i32],
        sorted_indexes: &[usize],
        case_labels: &[LabelId],
        range: Option<(i32, i32)>,
    ) -> bool {
        let mut previous: Option<i32> = None;
        for &index in sorted_indexes {
            let valid = index < case_labels.len()
                && keys.get(index).is_some_and(|&key| {
                    previous.is_none_or(|previous| previous < key)
                        && range.is_none_or(|(low, high)| (low..=high).contains(&key))
                });
            if !valid {
                self.fail(EmitError::InvalidSwitchCase { index });
                return false;
            }
            previous = Some(keys[index]);
        }
        true
    }

    /// Picks `tableswitch` when the key range is dense enough, `lookupswitch`
    /// otherwise.
    pub fn generate_switch(&mut self, default_label: LabelId, keys: &[i32], case_labels: &[LabelId]) {
        let sorted = sorted_key_indexes(keys);
        let (Some(&first), Some(&last)) = (sorted.first(), sorted.last()) else {
            return self.lookupswitch(default_label, keys, &sorted, case_labels);
        };
        let (low, high) = (keys[first], keys[last]);
        if (keys.len() as f64 * 2.5) as i64 > high as i64 - low as i64 {
            self.tableswitch(default_label, low, high, keys, &sorted, case_labels);
        } else {
            self.lookupswitch(default_label, keys, &sorted, case_labels);
        }
    }

    pub fn load(&mut self, type_id: TypeId, index: u16) {
        match type_id {
            TypeId::Long => self.lload(index),
            TypeId::Double => self.dload(index),
            TypeId::Float => self.fload(index),
            t if t.is_int_like() => self.iload(index),
            _ => self.aload(index),
        }
    }

    /// Stores the top of stack, keeping a copy when `value_required`.
    pub fn store(&mut self, type_id: TypeId, index: u16, value_required: bool) {
        match type_id {
            TypeId::Long => {
                if value_required {
                    self.dup2();
                }
                self.lstore(index);
            }
            TypeId::Double => {
                if value_required {
                    self.dup2();
                }
                self.dstore(index);
            }
            TypeId::Float => {
                if value_required {
                    self.dup();
                }
                self.fstore(index);
            }
            t if t.is_int_like() => {
                if value_required {
                    self.dup();
                }
                self.istore(index);
            }
            _ => {
                if value_required {
                    self.dup();
                }
                self.astore(index);
            }
        }
    }

    pub fn load_local(&mut self, id: LocalId) {
        if let Some((type_id, slot)) = self.local(id).map(|local| (local.type_id(), local.slot)) {
            self.load(type_id, slot);
        }
    }

    pub fn store_local(&mut self, id: LocalId, value_required: bool) {
        if let Some((type_id, slot)) = self.local(id).map(|local| (local.type_id(), local.slot)) {
            self.store(type_id, slot, value_required);
        }
    }

    pub fn array_at(&mut self, element: TypeId) {
        match element {
            TypeId::Int => self.iaload(),
            TypeId::Byte | TypeId::Boolean => self.baload(),
            TypeId::Short => self.saload(),
            TypeId::Char => self.caload(),
            TypeId::Long => self.laload(),
            TypeId::Float => self.faload(),
            TypeId::Double => self.daload(),
            _ => self.aaload(),
        }
    }

    pub fn array_at_put(&mut self, element: TypeId, value_required: bool) {
        let wide = matches!(element, TypeId::Long | TypeId::Double);
        if value_required {
            if wide {
                self.dup2_x2();
            } else {
                self.dup_x2();
            }
        }
        match element {
            TypeId::Int => self.iastore(),
            TypeId::Byte | TypeId::Boolean => self.bastore(),
            TypeId::Short => self.sastore(),
            TypeId::Char => self.castore(),
            TypeId::Long => self.lastore(),
            TypeId::Float => self.fastore(),
            TypeId::Double => self.dastore(),
            _ => self.aastore(),
        }
    }

    /// The return instruction matching a method's return type.
    pub fn return_for(&mut self, type_id: TypeId) {
        match type_id {
            TypeId::Void => self.return_(),
            TypeId::Long => self.lreturn(),
            TypeId::Double => self.dreturn(),
            TypeId::Float => self.freturn(),
            t if t.is_int_like() => self.ireturn(),
            _ => self.areturn(),
        }
    }

    /// Pops a value of the given type.
    pub fn pop_for(&mut self, type_id: TypeId) {
        match type_id.slots() {
            0 => {}
            2 => self.pop2(),
            _ => self.pop(),
        }
    }
}

/// Indexes of `keys` in ascending key order.
pub fn sorted_key_indexes(keys: &[i32]) -> Vec<usize> {
    let mut indexes: Vec<usize> = (0..keys.len()).collect();
    indexes.sort_by_key(|index| keys[*index]);
    indexes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constant_pool::{ConstantPool, ConstantPoolBuilder};
    use crate::inspect::{decode, replay_stack};
    use crate::options::CodegenOptions;

    fn new_emitter(pool: &mut ConstantPoolBuilder) -> CodeEmitter<'_> {
        CodeEmitter::new(pool, CodegenOptions::default())
    }

    #[test]
    fn test_local_slot_forms() {
        let mut pool = ConstantPoolBuilder::new();
        let mut e = new_emitter(&mut pool);
        e.iload(3);
        assert_eq!(e.code(), &[opcodes::ILOAD_3]);
        assert_eq!(e.max_locals(), 4);

        e.aload(200);
        assert_eq!(&e.code()[1..], &[opcodes::ALOAD, 200]);

        e.lload(256);
        assert_eq!(&e.code()[3..], &[opcodes::WIDE, opcodes::LLOAD, 0x01, 0x00]);
        assert_eq!(e.max_locals(), 258);

        e.istore(256);
        assert_eq!(&e.code()[7..], &[opcodes::WIDE, opcodes::ISTORE, 0x01, 0x00]);
        assert_eq!(e.stack_depth(), 3);
        assert_eq!(e.stack_max(), 4);
    }

    #[test]
    fn test_index_256_updates_max_locals() {
        let mut pool = ConstantPoolBuilder::new();
        let mut e = new_emitter(&mut pool);
        e.iconst_0();
        e.istore(256);
        assert_eq!(e.max_locals(), 257);
        assert_eq!(e.code()[1], opcodes::WIDE);
    }

    #[test]
    fn test_iinc_widening() {
        let mut pool = ConstantPoolBuilder::new();
        let mut e = new_emitter(&mut pool);
        e.iinc(1, -128);
        e.iinc(1, 128);
        e.iinc(300, 1);
        assert_eq!(
            e.code(),
            &[
                opcodes::IINC, 1, 0x80,
                opcodes::WIDE, opcodes::IINC, 0x00, 0x01, 0x00, 0x80,
                opcodes::WIDE, opcodes::IINC, 0x01, 0x2C, 0x00, 0x01,
            ]
        );
    }

    #[test]
    fn test_ldc_switches_to_wide_index() {
        let mut pool = ConstantPoolBuilder::new();
        for i in 0..300 {
            pool.integer(100_000 + i);
        }
        let mut e = new_emitter(&mut pool);
        e.ldc_int(100_000);
        e.ldc_int(100_299);
        e.ldc_long(7);
        assert_eq!(&e.code()[..2], &[opcodes::LDC, 1]);
        assert_eq!(&e.code()[2..5], &[opcodes::LDC_W, 0x01, 0x2C]);
        assert_eq!(e.code()[5], opcodes::LDC2_W);
        assert_eq!(e.stack_depth(), 4);
    }

    #[test]
    fn test_long_string_literal_is_split() {
        let mut pool = ConstantPoolBuilder::new();
        let text = "a".repeat(70000);
        let mut e = new_emitter(&mut pool);
        e.ldc_string(&text);
        let code = e.code().to_vec();
        assert_eq!(e.stack_depth(), 1);
        assert_eq!(e.stack_max(), 3);
        drop(e);

        let opcodes_seen: Vec<u8> = decode(&code).unwrap().iter().map(|insn| insn.opcode).collect();
        assert_eq!(
            opcodes_seen,
            vec![
                opcodes::NEW,
                opcodes::DUP,
                opcodes::LDC,
                opcodes::INVOKESPECIAL,
                opcodes::LDC,
                opcodes::INVOKEVIRTUAL,
                opcodes::INVOKEVIRTUAL,
                opcodes::INVOKEVIRTUAL,
            ]
        );
        let report = replay_stack(&code, pool.entries(), &[]).unwrap();
        assert_eq!(report.max_stack, 3);
    }

    #[test]
    fn test_lookupswitch_sorted_keys_and_padding() {
        let mut pool = ConstantPoolBuilder::new();
        let mut e = new_emitter(&mut pool);
        e.iload(0);
        let default_label = e.new_case_label();
        let cases = [e.new_case_label(), e.new_case_label(), e.new_case_label()];
        let keys = [5, 1, 3];
        let sorted = sorted_key_indexes(&keys);
        assert_eq!(sorted, vec![1, 2, 0]);
        e.lookupswitch(default_label, &keys, &sorted, &cases);
        assert_eq!(e.position(), 36);
        for (label, value) in cases.iter().zip([0, 1, 2]) {
            e.place(*label);
            e.generate_inlined_int(value);
            e.ireturn();
        }
        e.place(default_label);
        e.iconst_m1();
        e.ireturn();

        let mut expected = vec![opcodes::ILOAD_0, opcodes::LOOKUPSWITCH, 0, 0];
        for word in [41, 3, 1, 37, 3, 39, 5, 35] {
            expected.extend_from_slice(&i32::to_be_bytes(word));
        }
        assert_eq!(&e.code()[..36], expected.as_slice());
        let code = e.code().to_vec();
        drop(e);
        let report = replay_stack(&code, pool.entries(), &[]).unwrap();
        assert_eq!(report.max_stack, 1);
        assert!(report.return_depths.iter().all(|(_, depth)| *depth == 1));
    }

    #[test]
    fn test_tableswitch_fills_gaps_with_default() {
        let mut pool = ConstantPoolBuilder::new();
        let mut e = new_emitter(&mut pool);
        e.iconst_0();
        e.iconst_0();
        e.pop();
        let default_label = e.new_case_label();
        let cases = [e.new_case_label(), e.new_case_label(), e.new_case_label()];
        // Switch opcode at 3, no padding.
        e.generate_switch(default_label, &[3, 0, 1], &cases);
        assert_eq!(e.code()[3], opcodes::TABLESWITCH);
        assert_eq!(e.position(), 4 + 12 + 4 * 4);
        let end = e.new_label();
        for label in cases {
            e.place(label);
            e.goto_(end);
        }
        e.place(default_label);
        e.place(end);
        e.return_();
        let words: Vec<i32> = e.code()[4..32]
            .chunks(4)
            .map(|word| i32::from_be_bytes([word[0], word[1], word[2], word[3]]))
            .collect();
        // The last goto is removed, which moves the default label back to 38.
        // default, low, high, then 0 -> case 1, 1 -> case 2, 2 -> default, 3 -> case 0
        assert_eq!(words, vec![35, 0, 3, 32, 35, 35, 29]);
        assert_eq!(e.code().len(), 39);
    }

    #[test]
    fn test_invoke_and_field_stack_effects() {
        let mut pool = ConstantPoolBuilder::new();
        let mut e = new_emitter(&mut pool);
        let get_long = FieldBinding::new("a/B", "count", "J", 0).unwrap();
        e.aload(0);
        e.getfield(&get_long);
        assert_eq!(e.stack_depth(), 2);
        e.aload(0);
        e.dup_x2();
        e.pop();
        e.putfield(&get_long);
        assert_eq!(e.stack_depth(), 0);

        let method = MethodBinding::new("a/I", "m", "(JI)D", 0).unwrap();
        e.aload(0);
        e.lconst_0();
        e.iconst_0();
        e.invokeinterface(&method);
        assert_eq!(e.stack_depth(), 2);
        let code = e.code();
        let at = code.len() - 5;
        assert_eq!(code[at], opcodes::INVOKEINTERFACE);
        assert_eq!(&code[at + 3..], &[4, 0]);
    }

    #[test]
    fn test_return_marks_abrupt_completion() {
        let mut pool = ConstantPoolBuilder::new();
        let mut e = new_emitter(&mut pool);
        e.iconst_0();
        assert_eq!(e.last_abrupt_completion(), None);
        e.ireturn();
        assert_eq!(e.last_abrupt_completion(), Some(2));
    }

    #[test]
    fn test_iinc_rejects_increment_beyond_16_bits() {
        let mut pool = ConstantPoolBuilder::new();
        let mut e = new_emitter(&mut pool);
        e.iinc(1, -32768);
        assert_eq!(e.code(), &[opcodes::WIDE, opcodes::IINC, 0x00, 0x01, 0x80, 0x00]);
        assert!(e.error().is_none());
        e.iinc(1, 40000);
        assert_eq!(e.position(), 6);
        assert_eq!(
            e.error(),
            Some(&EmitError::OperandOutOfRange {
                operation: "iinc",
                value: 40000,
            })
        );
        assert!(e.finish().is_err());
    }

    #[test]
    fn test_lookupswitch_rejects_unknown_case_index() {
        let mut pool = ConstantPoolBuilder::new();
        let mut e = new_emitter(&mut pool);
        e.iload(0);
        let default_label = e.new_case_label();
        let cases = [e.new_case_label()];
        e.lookupswitch(default_label, &[1], &[0, 7], &cases);
        assert_eq!(e.error(), Some(&EmitError::InvalidSwitchCase { index: 7 }));
        assert_eq!(e.position(), 1);
        assert_eq!(e.finish().unwrap_err(), EmitError::InvalidSwitchCase { index: 7 });
    }

    #[test]
    fn test_lookupswitch_rejects_unsorted_keys() {
        let mut pool = ConstantPoolBuilder::new();
        let mut e = new_emitter(&mut pool);
        e.iload(0);
        let default_label = e.new_case_label();
        let cases = [e.new_case_label(), e.new_case_label()];
        e.lookupswitch(default_label, &[3, 1], &[0, 1], &cases);
        assert_eq!(e.error(), Some(&EmitError::InvalidSwitchCase { index: 1 }));
    }

    #[test]
    fn test_tableswitch_rejects_key_outside_range() {
        let mut pool = ConstantPoolBuilder::new();
        let mut e = new_emitter(&mut pool);
        e.iload(0);
        let default_label = e.new_case_label();
        let cases = [e.new_case_label(), e.new_case_label()];
        e.tableswitch(default_label, 0, 2, &[1, 5], &[0, 1], &cases);
        assert_eq!(e.error(), Some(&EmitError::InvalidSwitchCase { index: 1 }));
        assert_eq!(e.position(), 1);

        let mut pool = ConstantPoolBuilder::new();
        let mut e = new_emitter(&mut pool);
        e.iload(0);
        let default_label = e.new_case_label();
        let cases = [e.new_case_label()];
        e.tableswitch(default_label, 0, 2, &[1], &[0, 1], &cases);
        assert_eq!(e.error(), Some(&EmitError::InvalidSwitchCase { index: 1 }));
    }
}
