use std::collections::HashMap;

/// A constant pool entry.
///
/// Long and double entries occupy two indexes; the second one holds
/// [`CpInfo::Unusable`], as does index 0.
#[derive(Debug, Clone, PartialEq)]
pub enum CpInfo {
    Unusable,
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class {
        name_index: u16,
    },
    String {
        string_index: u16,
    },
    Fieldref {
        class_index: u16,
        name_and_type_index: u16,
    },
    Methodref {
        class_index: u16,
        name_and_type_index: u16,
    },
    InterfaceMethodref {
        class_index: u16,
        name_and_type_index: u16,
    },
    NameAndType {
        name_index: u16,
        descriptor_index: u16,
    },
}

/// Interning interface used by the code emitter.
///
/// Implementations return a stable index for equal inputs.
pub trait ConstantPool {
    fn utf8(&mut self, value: &str) -> u16;
    fn class(&mut self, name: &str) -> u16;
    fn string(&mut self, value: &str) -> u16;
    fn integer(&mut self, value: i32) -> u16;
    fn float(&mut self, value: f32) -> u16;
    fn long(&mut self, value: i64) -> u16;
    fn double(&mut self, value: f64) -> u16;
    fn field_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> u16;
    fn method_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> u16;
    fn interface_method_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> u16;
}

/// A builder for the constant pool of a class.
///
/// Entries are deduplicated; numeric entries are keyed by their bit patterns so
/// that `-0.0` and `NaN` payloads stay distinct.
#[derive(Debug, Default)]
pub struct ConstantPoolBuilder {
    cp: Vec<CpInfo>,
    utf8: HashMap<String, u16>,
    class: HashMap<String, u16>,
    string: HashMap<String, u16>,
    integer: HashMap<i32, u16>,
    float: HashMap<u32, u16>,
    long: HashMap<i64, u16>,
    double: HashMap<u64, u16>,
    name_and_type: HashMap<(String, String), u16>,
    field_ref: HashMap<(String, String, String), u16>,
    method_ref: HashMap<(String, String, String), u16>,
    interface_method_ref: HashMap<(String, String, String), u16>,
}

impl ConstantPoolBuilder {
    pub fn new() -> Self {
        Self {
            cp: vec![CpInfo::Unusable],
            ..Default::default()
        }
    }

    pub fn entries(&self) -> &[CpInfo] {
        &self.cp
    }

    pub fn into_pool(self) -> Vec<CpInfo> {
        self.cp
    }

    pub fn name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let key = (name.to_string(), descriptor.to_string());
        if let Some(index) = self.name_and_type.get(&key) {
            return *index;
        }
        let name_index = self.utf8(name);
        let descriptor_index = self.utf8(descriptor);
        let index = self.push(CpInfo::NameAndType {
            name_index,
            descriptor_index,
        });
        self.name_and_type.insert(key, index);
        index
    }

    fn member_ref(&mut self, kind: MemberKind, owner: &str, name: &str, descriptor: &str) -> u16 {
        let key = (owner.to_string(), name.to_string(), descriptor.to_string());
        let cached = match kind {
            MemberKind::Field => self.field_ref.get(&key),
            MemberKind::Method => self.method_ref.get(&key),
            MemberKind::InterfaceMethod => self.interface_method_ref.get(&key),
        };
        if let Some(index) = cached {
            return *index;
        }
        let class_index = self.class(owner);
        let name_and_type_index = self.name_and_type(name, descriptor);
        let (entry, table) = match kind {
            MemberKind::Field => (
                CpInfo::Fieldref {
                    class_index,
                    name_and_type_index,
                },
                &mut self.field_ref,
            ),
            MemberKind::Method => (
                CpInfo::Methodref {
                    class_index,
                    name_and_type_index,
                },
                &mut self.method_ref,
            ),
            MemberKind::InterfaceMethod => (
                CpInfo::InterfaceMethodref {
                    class_index,
                    name_and_type_index,
                },
                &mut self.interface_method_ref,
            ),
        };
        let index = (self.cp.len()) as u16;
        table.insert(key, index);
        self.cp.push(entry);
        index
    }

    fn push(&mut self, entry: CpInfo) -> u16 {
        self.cp.push(entry);
        (self.cp.len() - 1) as u16
    }

    fn push_wide(&mut self, entry: CpInfo) -> u16 {
        let index = self.push(entry);
        self.cp.push(CpInfo::Unusable);
        index
    }
}

#[derive(Debug, Clone, Copy)]
enum MemberKind {
    Field,
    Method,
    InterfaceMethod,
}

impl ConstantPool for ConstantPoolBuilder {
    fn utf8(&mut self, value: &str) -> u16 {
        if let Some(index) = self.utf8.get(value) {
            return *index;
        }
        let index = self.push(CpInfo::Utf8(value.to_string()));
        self.utf8.insert(value.to_string(), index);
        index
    }

    fn class(&mut self, name: &str) -> u16 {
        if let Some(index) = self.class.get(name) {
            return *index;
        }
        let name_index = self.utf8(name);
        let index = self.push(CpInfo::Class { name_index });
        self.class.insert(name.to_string(), index);
        index
    }

    fn string(&mut self, value: &str) -> u16 {
        if let Some(index) = self.string.get(value) {
            return *index;
        }
        let string_index = self.utf8(value);
        let index = self.push(CpInfo::String { string_index });
        self.string.insert(value.to_string(), index);
        index
    }

    fn integer(&mut self, value: i32) -> u16 {
        if let Some(index) = self.integer.get(&value) {
            return *index;
        }
        let index = self.push(CpInfo::Integer(value));
        self.integer.insert(value, index);
        index
    }

    fn float(&mut self, value: f32) -> u16 {
        if let Some(index) = self.float.get(&value.to_bits()) {
            return *index;
        }
        let index = self.push(CpInfo::Float(value));
        self.float.insert(value.to_bits(), index);
        index
    }

    fn long(&mut self, value: i64) -> u16 {
        if let Some(index) = self.long.get(&value) {
            return *index;
        }
        let index = self.push_wide(CpInfo::Long(value));
        self.long.insert(value, index);
        index
    }

    fn double(&mut self, value: f64) -> u16 {
        if let Some(index) = self.double.get(&value.to_bits()) {
            return *index;
        }
        let index = self.push_wide(CpInfo::Double(value));
        self.double.insert(value.to_bits(), index);
        index
    }

    fn field_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        self.member_ref(MemberKind::Field, owner, name, descriptor)
    }

    fn method_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        self.member_ref(MemberKind::Method, owner, name, descriptor)
    }

    fn interface_method_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        self.member_ref(MemberKind::InterfaceMethod, owner, name, descriptor)
    }
}

/// Length in bytes of `value` encoded as modified UTF-8.
pub fn modified_utf8_len(value: &str) -> usize {
    value.encode_utf16().map(modified_unit_len).sum()
}

fn modified_unit_len(unit: u16) -> usize {
    match unit {
        0x0001..=0x007F => 1,
        0x0000 | 0x0080..=0x07FF => 2,
        _ => 3,
    }
}

/// Encodes `value` as modified UTF-8: NUL becomes two bytes and supplementary
/// characters are written as surrogate pairs.
pub fn encode_modified_utf8(value: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len());
    for unit in value.encode_utf16() {
        match modified_unit_len(unit) {
            1 => out.push(unit as u8),
            2 => {
                out.push(0xC0 | ((unit >> 6) & 0x1F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                out.push(0xE0 | ((unit >> 12) & 0x0F) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    out
}

/// Splits `value` into pieces whose modified UTF-8 encodings are at most
/// `limit` bytes each, never separating a surrogate pair.
pub fn split_modified_utf8(value: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;
    for ch in value.chars() {
        let mut units = [0u16; 2];
        let len: usize = ch
            .encode_utf16(&mut units)
            .iter()
            .map(|unit| modified_unit_len(*unit))
            .sum();
        if current_len + len > limit && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        current.push(ch);
        current_len += len;
    }
    if !current.is_empty() || chunks.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Serializes the pool: the `constant_pool_count` followed by every entry.
pub fn write_constant_pool(out: &mut Vec<u8>, cp: &[CpInfo]) {
    write_u2(out, cp.len() as u16);
    for entry in cp.iter().skip(1) {
        match entry {
            CpInfo::Unusable => {}
            CpInfo::Utf8(value) => {
                let bytes = encode_modified_utf8(value);
                write_u1(out, 1);
                write_u2(out, bytes.len() as u16);
                out.extend_from_slice(&bytes);
            }
            CpInfo::Integer(value) => {
                write_u1(out, 3);
                write_u4(out, *value as u32);
            }
            CpInfo::Float(value) => {
                write_u1(out, 4);
                write_u4(out, value.to_bits());
            }
            CpInfo::Long(value) => {
                write_u1(out, 5);
                write_u8(out, *value as u64);
            }
            CpInfo::Double(value) => {
                write_u1(out, 6);
                write_u8(out, value.to_bits());
            }
            CpInfo::Class { name_index } => {
                write_u1(out, 7);
                write_u2(out, *name_index);
            }
            CpInfo::String { string_index } => {
                write_u1(out, 8);
                write_u2(out, *string_index);
            }
            CpInfo::Fieldref {
                class_index,
                name_and_type_index,
            } => {
                write_u1(out, 9);
                write_u2(out, *class_index);
                write_u2(out, *name_and_type_index);
            }
            CpInfo::Methodref {
                class_index,
                name_and_type_index,
            } => {
                write_u1(out, 10);
                write_u2(out, *class_index);
                write_u2(out, *name_and_type_index);
            }
            CpInfo::InterfaceMethodref {
                class_index,
                name_and_type_index,
            } => {
                write_u1(out, 11);
                write_u2(out, *class_index);
                write_u2(out, *name_and_type_index);
            }
            CpInfo::NameAndType {
                name_index,
                descriptor_index,
            } => {
                write_u1(out, 12);
                write_u2(out, *name_index);
                write_u2(out, *descriptor_index);
            }
        }
    }
}

pub(crate) fn cp_utf8(cp: &[CpInfo], index: u16) -> Option<&str> {
    match cp.get(index as usize) {
        Some(CpInfo::Utf8(value)) => Some(value.as_str()),
        _ => None,
    }
}

pub(crate) fn cp_class_name(cp: &[CpInfo], index: u16) -> Option<&str> {
    match cp.get(index as usize) {
        Some(CpInfo::Class { name_index }) => cp_utf8(cp, *name_index),
        _ => None,
    }
}

/// Descriptor of the field or method referenced by a member ref entry.
pub(crate) fn cp_member_descriptor(cp: &[CpInfo], index: u16) -> Option<&str> {
    let name_and_type_index = match cp.get(index as usize)? {
        CpInfo::Fieldref {
            name_and_type_index,
            ..
        }
        | CpInfo::Methodref {
            name_and_type_index,
            ..
        }
        | CpInfo::InterfaceMethodref {
            name_and_type_index,
            ..
        } => *name_and_type_index,
        _ => return None,
    };
    match cp.get(name_and_type_index as usize)? {
        CpInfo::NameAndType {
            descriptor_index, ..
        } => cp_utf8(cp, *descriptor_index),
        _ => None,
    }
}

pub(crate) fn write_u1(out: &mut Vec<u8>, value: u8) {
    out.push(value);
}

pub(crate) fn write_u2(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

pub(crate) fn write_u4(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn write_u8(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_be_bytes());
}
