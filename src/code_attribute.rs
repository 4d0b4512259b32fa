//! Serialization of [`MethodCode`] as a class file `Code` attribute.

use crate::constant_pool::{ConstantPool, write_u2, write_u4};
use crate::method::{ExceptionTableEntry, LineNumber, LocalVariable, MethodCode};

enum CodeSubAttribute<'a> {
    LineNumberTable(&'a [LineNumber]),
    LocalVariableTable(&'a [LocalVariable]),
}

/// Returns the complete attribute: name index, length and body.
///
/// `LineNumberTable` and `LocalVariableTable` are nested only when the method
/// has entries for them, which is governed by the attribute flags the method
/// was emitted with.
pub fn write_code_attribute(method: &MethodCode, pool: &mut dyn ConstantPool) -> Vec<u8> {
    let name_index = pool.utf8("Code");
    let mut nested = Vec::new();
    if !method.line_numbers.is_empty() {
        nested.push(CodeSubAttribute::LineNumberTable(&method.line_numbers));
    }
    if !method.local_variables.is_empty() {
        nested.push(CodeSubAttribute::LocalVariableTable(&method.local_variables));
    }

    let mut info = Vec::new();
    write_u2(&mut info, method.max_stack);
    write_u2(&mut info, method.max_locals);
    write_u4(&mut info, method.code.len() as u32);
    info.extend_from_slice(&method.code);
    write_u2(&mut info, method.exception_table.len() as u16);
    for entry in &method.exception_table {
        write_exception_table_entry(&mut info, entry);
    }
    write_u2(&mut info, nested.len() as u16);
    for attribute in &nested {
        write_sub_attribute(&mut info, attribute, pool);
    }

    let mut out = Vec::with_capacity(info.len() + 6);
    write_attribute_with_info(&mut out, name_index, &info);
    out
}

fn write_sub_attribute(out: &mut Vec<u8>, attribute: &CodeSubAttribute<'_>, pool: &mut dyn ConstantPool) {
    match attribute {
        CodeSubAttribute::LineNumberTable(entries) => {
            let name_index = pool.utf8("LineNumberTable");
            let mut info = Vec::new();
            write_u2(&mut info, entries.len() as u16);
            for entry in entries.iter() {
                write_line_number(&mut info, entry);
            }
            write_attribute_with_info(out, name_index, &info);
        }
        CodeSubAttribute::LocalVariableTable(entries) => {
            let name_index = pool.utf8("LocalVariableTable");
            let mut info = Vec::new();
            write_u2(&mut info, entries.len() as u16);
            for entry in entries.iter() {
                write_local_variable(&mut info, entry);
            }
            write_attribute_with_info(out, name_index, &info);
        }
    }
}

fn write_attribute_with_info(out: &mut Vec<u8>, name_index: u16, info: &[u8]) {
    write_u2(out, name_index);
    write_u4(out, info.len() as u32);
    out.extend_from_slice(info);
}

fn write_exception_table_entry(out: &mut Vec<u8>, entry: &ExceptionTableEntry) {
    write_u2(out, entry.start_pc);
    write_u2(out, entry.end_pc);
    write_u2(out, entry.handler_pc);
    write_u2(out, entry.catch_type);
}

fn write_line_number(out: &mut Vec<u8>, entry: &LineNumber) {
    write_u2(out, entry.start_pc);
    write_u2(out, entry.line_number);
}

fn write_local_variable(out: &mut Vec<u8>, entry: &LocalVariable) {
    write_u2(out, entry.start_pc);
    write_u2(out, entry.length);
    write_u2(out, entry.name_index);
    write_u2(out, entry.descriptor_index);
    write_u2(out, entry.index);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constant_pool::{ConstantPoolBuilder, CpInfo, cp_utf8};
    use crate::opcodes;

    fn u2(bytes: &[u8], at: usize) -> u16 {
        u16::from_be_bytes([bytes[at], bytes[at + 1]])
    }

    fn u4(bytes: &[u8], at: usize) -> u32 {
        u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
    }

    #[test]
    fn test_plain_code_attribute() {
        let mut pool = ConstantPoolBuilder::new();
        let method = MethodCode {
            code: vec![opcodes::ICONST_0, opcodes::IRETURN],
            max_stack: 1,
            max_locals: 0,
            line_numbers: Vec::new(),
            local_variables: Vec::new(),
            exception_table: Vec::new(),
        };
        let bytes = write_code_attribute(&method, &mut pool);
        assert_eq!(cp_utf8(pool.entries(), u2(&bytes, 0)), Some("Code"));
        assert_eq!(u4(&bytes, 2) as usize, bytes.len() - 6);
        assert_eq!(&bytes[6..14], &[0, 1, 0, 0, 0, 0, 0, 2]);
        assert_eq!(&bytes[14..16], &[opcodes::ICONST_0, opcodes::IRETURN]);
        // No exception handlers, no nested attributes.
        assert_eq!(&bytes[16..], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_nested_tables_and_handlers() {
        let mut pool = ConstantPoolBuilder::new();
        let name = pool.utf8("x");
        let descriptor = pool.utf8("I");
        let method = MethodCode {
            code: vec![opcodes::ICONST_0, opcodes::ISTORE_0, opcodes::RETURN],
            max_stack: 1,
            max_locals: 1,
            line_numbers: vec![LineNumber {
                start_pc: 0,
                line_number: 7,
            }],
            local_variables: vec![LocalVariable {
                start_pc: 2,
                length: 1,
                name_index: name,
                descriptor_index: descriptor,
                index: 0,
            }],
            exception_table: vec![ExceptionTableEntry {
                start_pc: 0,
                end_pc: 2,
                handler_pc: 2,
                catch_type: 0,
            }],
        };
        let bytes = write_code_attribute(&method, &mut pool);
        let after_code = 14 + 3;
        assert_eq!(u2(&bytes, after_code), 1);
        assert_eq!(&bytes[after_code + 2..after_code + 10], &[0, 0, 0, 2, 0, 2, 0, 0]);
        let attributes = after_code + 10;
        assert_eq!(u2(&bytes, attributes), 2);

        let lines = attributes + 2;
        assert_eq!(cp_utf8(pool.entries(), u2(&bytes, lines)), Some("LineNumberTable"));
        assert_eq!(u4(&bytes, lines + 2), 6);
        assert_eq!(&bytes[lines + 6..lines + 12], &[0, 1, 0, 0, 0, 7]);

        let locals = lines + 12;
        assert_eq!(cp_utf8(pool.entries(), u2(&bytes, locals)), Some("LocalVariableTable"));
        assert_eq!(u4(&bytes, locals + 2), 12);
        assert_eq!(u2(&bytes, locals + 6), 1);
        assert_eq!(u2(&bytes, locals + 12), name);
        assert_eq!(locals + 18, bytes.len());
        assert!(pool.entries().contains(&CpInfo::Utf8("Code".to_string())));
    }
}
