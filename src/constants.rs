//! Access flags and well-known runtime names referenced by generated code.

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_PRIVATE: u16 = 0x0002;
pub const ACC_PROTECTED: u16 = 0x0004;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_FINAL: u16 = 0x0010;
pub const ACC_SYNCHRONIZED: u16 = 0x0020;
pub const ACC_BRIDGE: u16 = 0x0040;
pub const ACC_VARARGS: u16 = 0x0080;
pub const ACC_NATIVE: u16 = 0x0100;
pub const ACC_INTERFACE: u16 = 0x0200;
pub const ACC_ABSTRACT: u16 = 0x0400;
pub const ACC_SYNTHETIC: u16 = 0x1000;
pub const ACC_ENUM: u16 = 0x4000;

pub const JAVA_LANG_OBJECT: &str = "java/lang/Object";
pub const JAVA_LANG_STRING: &str = "java/lang/String";
pub const JAVA_LANG_STRING_BUILDER: &str = "java/lang/StringBuilder";
pub const JAVA_LANG_STRING_BUFFER: &str = "java/lang/StringBuffer";
pub const JAVA_LANG_CLASS: &str = "java/lang/Class";
pub const JAVA_LANG_ENUM: &str = "java/lang/Enum";
pub const JAVA_LANG_SYSTEM: &str = "java/lang/System";
pub const JAVA_LANG_THROWABLE: &str = "java/lang/Throwable";
pub const JAVA_LANG_NO_CLASS_DEF_FOUND_ERROR: &str = "java/lang/NoClassDefFoundError";
pub const JAVA_LANG_CLASS_NOT_FOUND_EXCEPTION: &str = "java/lang/ClassNotFoundException";
pub const JAVA_LANG_NO_SUCH_FIELD_ERROR: &str = "java/lang/NoSuchFieldError";

pub const INIT: &str = "<init>";
pub const CLINIT: &str = "<clinit>";
pub const VALUE_OF: &str = "valueOf";
pub const VALUES: &str = "values";
pub const ORDINAL: &str = "ordinal";
pub const APPEND: &str = "append";
pub const TO_STRING: &str = "toString";
pub const INTERN: &str = "intern";
pub const ENUM_VALUES_FIELD: &str = "$VALUES";
