//! Bodies of compiler-generated methods and class literal access.

use crate::binding::{FieldBinding, LocalBinding, MethodBinding, ScopeId};
use crate::constants::{
    ENUM_VALUES_FIELD, INIT, JAVA_LANG_CLASS, JAVA_LANG_CLASS_NOT_FOUND_EXCEPTION, JAVA_LANG_ENUM,
    JAVA_LANG_NO_CLASS_DEF_FOUND_ERROR, JAVA_LANG_NO_SUCH_FIELD_ERROR, JAVA_LANG_SYSTEM,
    JAVA_LANG_THROWABLE, ORDINAL, VALUE_OF, VALUES,
};
use crate::emitter::CodeEmitter;
use crate::error::EmitError;
use crate::opcodes;
use crate::types::{FieldType, TypeId};

/// Why a method accessor exists; decides how the target is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    /// Access to a private member from a nested class.
    Method,
    /// `Outer.super.m()` from a nested class: always `invokespecial`.
    SuperMethod,
    /// Bridge with erased parameter and return types; arguments are cast
    /// to the target's parameter types.
    Bridge,
}

/// An enum constant and its declaration index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumConstant {
    pub name: String,
    pub index: u32,
}

fn element_type(array: &FieldType) -> Result<FieldType, EmitError> {
    match array {
        FieldType::Array(descriptor) => FieldType::parse(&descriptor[1..]),
        other => Err(EmitError::InvalidDescriptor(other.descriptor())),
    }
}

/// Name handed to `Class.forName`: dots instead of slashes.
fn binary_name(field_type: &FieldType) -> String {
    match field_type {
        FieldType::Object(name) => name.replace('/', "."),
        other => other.descriptor().replace('/', "."),
    }
}

impl CodeEmitter<'_> {
    fn load_type(&mut self, field_type: &FieldType, slot: u16) {
        self.load(field_type.type_id(), slot);
    }

    fn checkcast_type(&mut self, field_type: &FieldType) {
        match field_type.internal_name() {
            Some(name) => {
                let name = name.to_string();
                self.checkcast(&name);
            }
            None => self.checkcast_for_base(field_type.type_id()),
        }
    }

    /// `static T access$0(Owner receiver)` returning the field's value.
    pub fn generate_synthetic_body_for_field_read_access(
        &mut self,
        accessor: &MethodBinding,
        field: &FieldBinding,
    ) {
        self.initialize_max_locals(Some(accessor));
        if field.is_static() {
            self.getstatic(field);
        } else {
            self.aload(0);
            self.getfield(field);
        }
        self.return_for(field.type_id());
    }

    pub fn generate_synthetic_body_for_field_write_access(
        &mut self,
        accessor: &MethodBinding,
        field: &FieldBinding,
    ) {
        self.initialize_max_locals(Some(accessor));
        if field.is_static() {
            self.load_type(&field.field_type, 0);
            self.putstatic(field);
        } else {
            self.aload(0);
            self.load_type(&field.field_type, 1);
            self.putfield(field);
        }
        self.return_();
    }

    /// Forwards every argument of the accessor constructor to `constructor`.
    ///
    /// The descriptor of `constructor` already lists the enum name and
    /// ordinal, enclosing instances and captured outer locals in order, so
    /// they are passed along like ordinary parameters. The trailing marker
    /// parameter of the accessor is not forwarded.
    pub fn generate_synthetic_body_for_constructor_access(
        &mut self,
        accessor: &MethodBinding,
        constructor: &MethodBinding,
    ) {
        self.initialize_max_locals(Some(accessor));
        self.aload(0);
        let mut slot = 1;
        for parameter in &constructor.parameters {
            self.load_type(parameter, slot);
            slot += parameter.slots();
        }
        self.invokespecial(constructor);
        self.return_();
    }

    pub fn generate_synthetic_body_for_method_access(
        &mut self,
        accessor: &MethodBinding,
        target: &MethodBinding,
        kind: AccessKind,
    ) {
        self.initialize_max_locals(Some(accessor));
        let mut slot = if target.is_static() {
            0
        } else {
            self.aload(0);
            1
        };
        for (i, parameter) in target.parameters.iter().enumerate() {
            match accessor.parameters.get(i).filter(|_| kind == AccessKind::Bridge) {
                Some(argument) => {
                    self.load_type(argument, slot);
                    if argument != parameter {
                        self.checkcast_type(parameter);
                    }
                }
                None => self.load_type(parameter, slot),
            }
            slot += parameter.slots();
        }
        if target.is_static() {
            self.invokestatic(target);
        } else if target.is_constructor() || target.is_private() || kind == AccessKind::SuperMethod {
            self.invokespecial(target);
        } else if target.owner_is_interface {
            self.invokeinterface(target);
        } else {
            self.invokevirtual(target);
        }
        match target.return_type.type_id() {
            TypeId::Object | TypeId::String => {
                if kind == AccessKind::Bridge && accessor.return_type != target.return_type {
                    self.checkcast_type(&accessor.return_type);
                }
                self.areturn();
            }
            other => self.return_for(other),
        }
    }

    /// `static E[] values()`: a copy of the `$VALUES` array.
    pub fn generate_synthetic_body_for_enum_values(&mut self, method: &MethodBinding, enum_class: &str) {
        self.initialize_max_locals(Some(method));
        let array_descriptor = method.return_type.descriptor();
        let element = match element_type(&method.return_type) {
            Ok(element) => element,
            Err(error) => return self.fail(error),
        };
        self.field_insn(opcodes::GETSTATIC, enum_class, ENUM_VALUES_FIELD, &array_descriptor, 1);
        self.dup();
        self.astore(0);
        self.iconst_0();
        self.aload(0);
        self.arraylength();
        self.dup();
        self.istore(1);
        self.new_array(&element);
        self.dup();
        self.astore(2);
        self.iconst_0();
        self.iload(1);
        self.invoke(
            opcodes::INVOKESTATIC,
            5,
            0,
            JAVA_LANG_SYSTEM,
            "arraycopy",
            "(Ljava/lang/Object;ILjava/lang/Object;II)V",
        );
        self.aload(2);
        self.areturn();
    }

    /// `static E valueOf(String name)` through `Enum.valueOf`.
    pub fn generate_synthetic_body_for_enum_value_of(&mut self, method: &MethodBinding, enum_class: &str) {
        self.initialize_max_locals(Some(method));
        self.ldc_class(enum_class);
        self.aload(0);
        self.invoke(
            opcodes::INVOKESTATIC,
            2,
            1,
            JAVA_LANG_ENUM,
            VALUE_OF,
            "(Ljava/lang/Class;Ljava/lang/String;)Ljava/lang/Enum;",
        );
        self.checkcast(enum_class);
        self.areturn();
    }

    /// `static int[] $SWITCH_TABLE$E()`: lazily builds the ordinal to case
    /// index map used by a switch on an enum from another compilation unit,
    /// and caches it in `table_field`.
    ///
    /// Each store is guarded by a `NoSuchFieldError` handler so constants
    /// removed after compilation are skipped.
    pub fn generate_synthetic_body_for_switch_table(
        &mut self,
        method: &MethodBinding,
        table_field: &FieldBinding,
        enum_class: &str,
        constants: &[EnumConstant],
    ) {
        self.initialize_max_locals(Some(method));
        let null_label = self.new_label();
        self.getstatic(table_field);
        self.dup();
        self.ifnull(null_label);
        self.areturn();
        self.push_on_stack(TypeId::Object);
        self.place(null_label);
        self.pop();

        let enum_descriptor = format!("L{enum_class};");
        let values_descriptor = format!("()[{enum_descriptor}");
        self.invoke(opcodes::INVOKESTATIC, 0, 1, enum_class, VALUES, &values_descriptor);
        self.arraylength();
        self.newarray(opcodes::T_INT);
        self.astore(0);
        let table = match LocalBinding::new(" tab", "[I", 0, ScopeId(0)) {
            Ok(binding) => self.record_local(binding),
            Err(error) => return self.fail(error),
        };
        self.add_visible_local(table);

        for constant in constants {
            let end_label = self.new_label();
            let handler = self.new_exception_handler(Some(JAVA_LANG_NO_SUCH_FIELD_ERROR));
            self.place_handler_start(handler);
            self.aload(0);
            self.field_insn(opcodes::GETSTATIC, enum_class, &constant.name, &enum_descriptor, 1);
            self.invoke(opcodes::INVOKEVIRTUAL, 0, 1, enum_class, ORDINAL, "()I");
            // Zero is the default of the int array and means "no case".
            self.generate_inlined_int(constant.index as i32 + 1);
            self.iastore();
            self.place_handler_end(handler);
            self.goto_(end_label);
            self.push_exception_on_stack();
            self.place_handler(handler);
            self.pop();
            self.place(end_label);
        }
        self.aload(0);
        self.dup();
        self.putstatic(table_field);
        self.areturn();
        self.remove_variable(table);
    }

    /// Pushes the `Class` object of `accessed`.
    ///
    /// Primitive types read `Wrapper.TYPE`. From 1.5 on this is an `ldc`;
    /// older targets call `Class.forName`, cache the result in `cache_field`
    /// when there is one, and turn a `ClassNotFoundException` into a
    /// `NoClassDefFoundError`.
    pub fn generate_class_literal_access_for_type(
        &mut self,
        accessed: &FieldType,
        cache_field: Option<&FieldBinding>,
    ) {
        if accessed.is_primitive() || *accessed == FieldType::Void {
            return self.get_type_literal(accessed.type_id());
        }
        if self.options().supports_boxing() {
            let name = accessed.internal_name().map(str::to_string).unwrap_or_else(|| accessed.descriptor());
            return self.ldc_class(&name);
        }

        let end_label = self.new_label();
        if let Some(cache) = cache_field {
            self.getstatic(cache);
            self.dup();
            self.ifnonnull(end_label);
            self.pop();
        }
        let handler = self.new_exception_handler(Some(JAVA_LANG_CLASS_NOT_FOUND_EXCEPTION));
        self.place_handler_start(handler);
        self.ldc_string(&binary_name(accessed));
        self.invoke(
            opcodes::INVOKESTATIC,
            1,
            1,
            JAVA_LANG_CLASS,
            "forName",
            "(Ljava/lang/String;)Ljava/lang/Class;",
        );
        self.place_handler_end(handler);
        if let Some(cache) = cache_field {
            self.dup();
            self.putstatic(cache);
        }
        self.goto_(end_label);

        let saved_depth = self.stack_depth();
        self.push_exception_on_stack();
        self.place_handler(handler);
        self.new_(JAVA_LANG_NO_CLASS_DEF_FOUND_ERROR);
        self.dup_x1();
        self.swap();
        self.invoke(
            opcodes::INVOKEVIRTUAL,
            0,
            1,
            JAVA_LANG_THROWABLE,
            "getMessage",
            "()Ljava/lang/String;",
        );
        self.invoke(
            opcodes::INVOKESPECIAL,
            1,
            0,
            JAVA_LANG_NO_CLASS_DEF_FOUND_ERROR,
            INIT,
            "(Ljava/lang/String;)V",
        );
        self.athrow();
        self.place(end_label);
        self.set_stack_depth(saved_depth);
    }
}
