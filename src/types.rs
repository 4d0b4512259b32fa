use crate::error::EmitError;

/// Packed type ids used by conversion codes and typed instruction dispatch.
///
/// The numeric values fit in four bits so that a source and a target id can be
/// packed together into a [`ConversionCode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum TypeId {
    Undefined = 0,
    Object = 1,
    Char = 2,
    Byte = 3,
    Short = 4,
    Boolean = 5,
    Void = 6,
    Long = 7,
    Double = 8,
    Float = 9,
    Int = 10,
    String = 11,
    Null = 12,
}

impl TypeId {
    pub fn from_u8(value: u8) -> Option<TypeId> {
        let id = match value {
            0 => TypeId::Undefined,
            1 => TypeId::Object,
            2 => TypeId::Char,
            3 => TypeId::Byte,
            4 => TypeId::Short,
            5 => TypeId::Boolean,
            6 => TypeId::Void,
            7 => TypeId::Long,
            8 => TypeId::Double,
            9 => TypeId::Float,
            10 => TypeId::Int,
            11 => TypeId::String,
            12 => TypeId::Null,
            _ => return None,
        };
        Some(id)
    }

    /// Number of operand stack or local variable slots a value of this type occupies.
    pub fn slots(self) -> u16 {
        match self {
            TypeId::Void => 0,
            TypeId::Long | TypeId::Double => 2,
            _ => 1,
        }
    }

    pub fn is_primitive(self) -> bool {
        matches!(
            self,
            TypeId::Char
                | TypeId::Byte
                | TypeId::Short
                | TypeId::Boolean
                | TypeId::Long
                | TypeId::Double
                | TypeId::Float
                | TypeId::Int
        )
    }

    /// Types that live in an `int` slot on the operand stack.
    pub fn is_int_like(self) -> bool {
        matches!(
            self,
            TypeId::Int | TypeId::Char | TypeId::Byte | TypeId::Short | TypeId::Boolean
        )
    }

    /// Internal name of the wrapper class for a primitive (or `void`) type.
    pub fn wrapper_class(self) -> Option<&'static str> {
        let name = match self {
            TypeId::Boolean => "java/lang/Boolean",
            TypeId::Byte => "java/lang/Byte",
            TypeId::Char => "java/lang/Character",
            TypeId::Short => "java/lang/Short",
            TypeId::Int => "java/lang/Integer",
            TypeId::Long => "java/lang/Long",
            TypeId::Float => "java/lang/Float",
            TypeId::Double => "java/lang/Double",
            TypeId::Void => "java/lang/Void",
            _ => return None,
        };
        Some(name)
    }

    /// Field descriptor of a primitive type.
    pub fn primitive_descriptor(self) -> Option<&'static str> {
        let descriptor = match self {
            TypeId::Boolean => "Z",
            TypeId::Byte => "B",
            TypeId::Char => "C",
            TypeId::Short => "S",
            TypeId::Int => "I",
            TypeId::Long => "J",
            TypeId::Float => "F",
            TypeId::Double => "D",
            TypeId::Void => "V",
            _ => return None,
        };
        Some(descriptor)
    }

    /// Java source name of a primitive type, used for `xxxValue()` selectors.
    pub fn primitive_name(self) -> Option<&'static str> {
        let name = match self {
            TypeId::Boolean => "boolean",
            TypeId::Byte => "byte",
            TypeId::Char => "char",
            TypeId::Short => "short",
            TypeId::Int => "int",
            TypeId::Long => "long",
            TypeId::Float => "float",
            TypeId::Double => "double",
            _ => return None,
        };
        Some(name)
    }
}

/// A packed implicit conversion: `(runtime << 4) | compile`, plus boxing flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ConversionCode(pub u16);

impl ConversionCode {
    pub const BOXING: u16 = 0x200;
    pub const UNBOXING: u16 = 0x400;
    pub const COMPILE_TYPE_MASK: u16 = 0xF;
    pub const IMPLICIT_CONVERSION_MASK: u16 = 0xFF;

    pub const NONE: ConversionCode = ConversionCode(0);

    pub fn new(from: TypeId, to: TypeId) -> Self {
        ConversionCode(((to as u16) << 4) | from as u16)
    }

    /// Converts `from` to the primitive `to` and boxes the result.
    pub fn boxing(from: TypeId, to: TypeId) -> Self {
        ConversionCode(Self::new(from, to).0 | Self::BOXING)
    }

    /// Unboxes a wrapper of the primitive `unboxed` and converts it to `to`.
    pub fn unboxing(unboxed: TypeId, to: TypeId) -> Self {
        ConversionCode(Self::new(unboxed, to).0 | Self::UNBOXING)
    }

    pub fn compile_type(self) -> Option<TypeId> {
        TypeId::from_u8((self.0 & Self::COMPILE_TYPE_MASK) as u8)
    }

    pub fn runtime_type(self) -> Option<TypeId> {
        TypeId::from_u8(((self.0 & Self::IMPLICIT_CONVERSION_MASK) >> 4) as u8)
    }

    pub fn is_boxing(self) -> bool {
        self.0 & Self::BOXING != 0
    }

    pub fn is_unboxing(self) -> bool {
        self.0 & Self::UNBOXING != 0
    }
}

/// Class file target level; selects boxing and string concatenation strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum TargetLevel {
    Jdk1_1,
    Jdk1_2,
    Jdk1_3,
    Jdk1_4,
    Jdk1_5,
    Jdk1_6,
    Jdk1_7,
    #[default]
    Jdk1_8,
}

impl TargetLevel {
    pub fn major_version(self) -> u16 {
        match self {
            TargetLevel::Jdk1_1 => 45,
            TargetLevel::Jdk1_2 => 46,
            TargetLevel::Jdk1_3 => 47,
            TargetLevel::Jdk1_4 => 48,
            TargetLevel::Jdk1_5 => 49,
            TargetLevel::Jdk1_6 => 50,
            TargetLevel::Jdk1_7 => 51,
            TargetLevel::Jdk1_8 => 52,
        }
    }
}

/// A parsed JVM field type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Float,
    Long,
    Double,
    /// Internal class name, e.g. `java/lang/String`.
    Object(String),
    /// Full array descriptor, e.g. `[I` or `[Ljava/lang/String;`.
    Array(String),
    Void,
}

impl FieldType {
    pub fn parse(descriptor: &str) -> Result<FieldType, EmitError> {
        let mut chars = descriptor.chars().peekable();
        let field_type = parse_field_type(&mut chars, descriptor)?;
        if chars.next().is_some() {
            return Err(EmitError::InvalidDescriptor(descriptor.to_string()));
        }
        Ok(field_type)
    }

    /// Parses a method descriptor into its parameter types and return type.
    pub fn parse_method(descriptor: &str) -> Result<(Vec<FieldType>, FieldType), EmitError> {
        let mut chars = descriptor.chars().peekable();
        if chars.next() != Some('(') {
            return Err(EmitError::InvalidDescriptor(descriptor.to_string()));
        }
        let mut params = Vec::new();
        loop {
            match chars.peek() {
                Some(')') => {
                    chars.next();
                    break;
                }
                Some(_) => params.push(parse_field_type(&mut chars, descriptor)?),
                None => return Err(EmitError::InvalidDescriptor(descriptor.to_string())),
            }
        }
        let ret = match chars.peek() {
            Some('V') => {
                chars.next();
                FieldType::Void
            }
            _ => parse_field_type(&mut chars, descriptor)?,
        };
        if chars.next().is_some() {
            return Err(EmitError::InvalidDescriptor(descriptor.to_string()));
        }
        Ok((params, ret))
    }

    pub fn type_id(&self) -> TypeId {
        match self {
            FieldType::Boolean => TypeId::Boolean,
            FieldType::Byte => TypeId::Byte,
            FieldType::Char => TypeId::Char,
            FieldType::Short => TypeId::Short,
            FieldType::Int => TypeId::Int,
            FieldType::Float => TypeId::Float,
            FieldType::Long => TypeId::Long,
            FieldType::Double => TypeId::Double,
            FieldType::Object(name) if name == "java/lang/String" => TypeId::String,
            FieldType::Object(_) | FieldType::Array(_) => TypeId::Object,
            FieldType::Void => TypeId::Void,
        }
    }

    pub fn slots(&self) -> u16 {
        self.type_id().slots()
    }

    pub fn is_primitive(&self) -> bool {
        self.type_id().is_primitive()
    }

    pub fn descriptor(&self) -> String {
        match self {
            FieldType::Object(name) => format!("L{name};"),
            FieldType::Array(desc) => desc.clone(),
            other => other
                .type_id()
                .primitive_descriptor()
                .unwrap_or_default()
                .to_string(),
        }
    }

    /// Name used by `checkcast`, `anewarray` and class constants: the internal
    /// name for classes, the descriptor for arrays.
    pub fn internal_name(&self) -> Option<&str> {
        match self {
            FieldType::Object(name) => Some(name),
            FieldType::Array(desc) => Some(desc),
            _ => None,
        }
    }
}

fn parse_field_type<I>(
    chars: &mut std::iter::Peekable<I>,
    descriptor: &str,
) -> Result<FieldType, EmitError>
where
    I: Iterator<Item = char>,
{
    match chars.next() {
        Some('Z') => Ok(FieldType::Boolean),
        Some('B') => Ok(FieldType::Byte),
        Some('C') => Ok(FieldType::Char),
        Some('S') => Ok(FieldType::Short),
        Some('I') => Ok(FieldType::Int),
        Some('F') => Ok(FieldType::Float),
        Some('J') => Ok(FieldType::Long),
        Some('D') => Ok(FieldType::Double),
        Some('L') => {
            let mut name = String::new();
            for ch in chars.by_ref() {
                if ch == ';' {
                    return if name.is_empty() {
                        Err(EmitError::InvalidDescriptor(descriptor.to_string()))
                    } else {
                        Ok(FieldType::Object(name))
                    };
                }
                name.push(ch);
            }
            Err(EmitError::InvalidDescriptor(descriptor.to_string()))
        }
        Some('[') => {
            let inner = parse_field_type(chars, descriptor)?;
            if inner == FieldType::Void {
                return Err(EmitError::InvalidDescriptor(descriptor.to_string()));
            }
            Ok(FieldType::Array(format!("[{}", inner.descriptor())))
        }
        _ => Err(EmitError::InvalidDescriptor(descriptor.to_string())),
    }
}

/// A compile-time constant value.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Boolean(bool),
    Byte(i8),
    Char(u16),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
}

impl Constant {
    pub fn type_id(&self) -> TypeId {
        match self {
            Constant::Boolean(_) => TypeId::Boolean,
            Constant::Byte(_) => TypeId::Byte,
            Constant::Char(_) => TypeId::Char,
            Constant::Short(_) => TypeId::Short,
            Constant::Int(_) => TypeId::Int,
            Constant::Long(_) => TypeId::Long,
            Constant::Float(_) => TypeId::Float,
            Constant::Double(_) => TypeId::Double,
            Constant::String(_) => TypeId::String,
        }
    }

    pub fn int_value(&self) -> i32 {
        match self {
            Constant::Boolean(value) => *value as i32,
            Constant::Byte(value) => *value as i32,
            Constant::Char(value) => *value as i32,
            Constant::Short(value) => *value as i32,
            Constant::Int(value) => *value,
            Constant::Long(value) => *value as i32,
            Constant::Float(value) => *value as i32,
            Constant::Double(value) => *value as i32,
            Constant::String(_) => 0,
        }
    }

    pub fn long_value(&self) -> i64 {
        match self {
            Constant::Long(value) => *value,
            Constant::Float(value) => *value as i64,
            Constant::Double(value) => *value as i64,
            other => other.int_value() as i64,
        }
    }

    pub fn float_value(&self) -> f32 {
        match self {
            Constant::Long(value) => *value as f32,
            Constant::Float(value) => *value,
            Constant::Double(value) => *value as f32,
            other => other.int_value() as f32,
        }
    }

    pub fn double_value(&self) -> f64 {
        match self {
            Constant::Long(value) => *value as f64,
            Constant::Float(value) => *value as f64,
            Constant::Double(value) => *value,
            other => other.int_value() as f64,
        }
    }

    pub fn boolean_value(&self) -> bool {
        match self {
            Constant::Boolean(value) => *value,
            other => other.int_value() != 0,
        }
    }

    pub fn char_value(&self) -> u16 {
        self.int_value() as u16
    }

    pub fn short_value(&self) -> i16 {
        self.int_value() as i16
    }

    pub fn byte_value(&self) -> i8 {
        self.int_value() as i8
    }

    pub fn string_value(&self) -> String {
        match self {
            Constant::String(value) => value.clone(),
            Constant::Boolean(value) => value.to_string(),
            Constant::Char(value) => char::from_u32(*value as u32)
                .map(String::from)
                .unwrap_or_default(),
            Constant::Float(value) => format!("{value:?}"),
            Constant::Double(value) => format!("{value:?}"),
            Constant::Long(value) => value.to_string(),
            other => other.int_value().to_string(),
        }
    }
}

/// Binary operators dispatched by [`crate::emitter::CodeEmitter::send_operator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Plus,
    Minus,
    Multiply,
    Divide,
    Remainder,
    LeftShift,
    RightShift,
    UnsignedRightShift,
    And,
    Or,
    Xor,
}
