//! Resolved descriptions of the methods, fields and locals that generated code
//! refers to. Parameter lists come from the JVM descriptor, so synthetic
//! parameters (enum name and ordinal, outer instances) are already included.

use crate::constants::{ACC_PRIVATE, ACC_STATIC, INIT};
use crate::error::EmitError;
use crate::types::{FieldType, TypeId};

#[derive(Debug, Clone, PartialEq)]
pub struct MethodBinding {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
    pub access_flags: u16,
    pub parameters: Vec<FieldType>,
    pub return_type: FieldType,
    pub owner_is_interface: bool,
}

impl MethodBinding {
    pub fn new(
        owner: &str,
        name: &str,
        descriptor: &str,
        access_flags: u16,
    ) -> Result<Self, EmitError> {
        let (parameters, return_type) = FieldType::parse_method(descriptor)?;
        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            access_flags,
            parameters,
            return_type,
            owner_is_interface: false,
        })
    }

    pub fn with_interface_owner(mut self) -> Self {
        self.owner_is_interface = true;
        self
    }

    pub fn is_static(&self) -> bool {
        self.access_flags & ACC_STATIC != 0
    }

    pub fn is_private(&self) -> bool {
        self.access_flags & ACC_PRIVATE != 0
    }

    pub fn is_constructor(&self) -> bool {
        self.name == INIT
    }

    /// Operand stack slots taken by the arguments, excluding the receiver.
    pub fn argument_slots(&self) -> u16 {
        self.parameters.iter().map(FieldType::slots).sum()
    }

    pub fn return_slots(&self) -> u16 {
        self.return_type.slots()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldBinding {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
    pub access_flags: u16,
    pub field_type: FieldType,
}

impl FieldBinding {
    pub fn new(
        owner: &str,
        name: &str,
        descriptor: &str,
        access_flags: u16,
    ) -> Result<Self, EmitError> {
        let field_type = FieldType::parse(descriptor)?;
        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            access_flags,
            field_type,
        })
    }

    pub fn is_static(&self) -> bool {
        self.access_flags & ACC_STATIC != 0
    }

    pub fn type_id(&self) -> TypeId {
        self.field_type.type_id()
    }

    pub fn slots(&self) -> u16 {
        self.field_type.slots()
    }
}

/// Identifies a lexical scope for local variable live ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ScopeId(pub u32);

#[derive(Debug, Clone, PartialEq)]
pub struct LocalBinding {
    pub name: String,
    pub descriptor: String,
    pub field_type: FieldType,
    pub slot: u16,
    pub scope: ScopeId,
}

impl LocalBinding {
    pub fn new(name: &str, descriptor: &str, slot: u16, scope: ScopeId) -> Result<Self, EmitError> {
        let field_type = FieldType::parse(descriptor)?;
        Ok(Self {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            field_type,
            slot,
            scope,
        })
    }

    pub fn type_id(&self) -> TypeId {
        self.field_type.type_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::ACC_PUBLIC;

    #[test]
    fn test_method_binding_slots() {
        let method = MethodBinding::new("a/B", "m", "(JLjava/lang/Object;D)J", ACC_STATIC).unwrap();
        assert!(method.is_static());
        assert_eq!(method.argument_slots(), 5);
        assert_eq!(method.return_slots(), 2);

        let ctor = MethodBinding::new("a/B", "<init>", "()V", ACC_PUBLIC).unwrap();
        assert!(ctor.is_constructor());
        assert_eq!(ctor.return_slots(), 0);
    }

    #[test]
    fn test_bindings_reject_bad_descriptors() {
        assert!(MethodBinding::new("a/B", "m", "(Q)V", 0).is_err());
        assert!(FieldBinding::new("a/B", "f", "", 0).is_err());
        assert!(LocalBinding::new("x", "V", 1, ScopeId(0)).is_err());
    }

    #[test]
    fn test_field_binding_type() {
        let field = FieldBinding::new("a/B", "name", "Ljava/lang/String;", 0).unwrap();
        assert_eq!(field.type_id(), TypeId::String);
        assert!(!field.is_static());
        assert_eq!(field.slots(), 1);
    }
}
