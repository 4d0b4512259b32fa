use crate::binding::MethodBinding;
use crate::constant_pool::ConstantPool;
use crate::debug::LineMap;
use crate::emitter::CodeEmitter;
use crate::error::EmitError;
use crate::options::CodegenOptions;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionTableEntry {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    /// Class constant of the caught type, 0 for a catch-all.
    pub catch_type: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineNumber {
    pub start_pc: u16,
    pub line_number: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariable {
    pub start_pc: u16,
    pub length: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub index: u16,
}

/// Everything the `Code` attribute of one method is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodCode {
    pub code: Vec<u8>,
    pub max_stack: u16,
    pub max_locals: u16,
    pub line_numbers: Vec<LineNumber>,
    pub local_variables: Vec<LocalVariable>,
    pub exception_table: Vec<ExceptionTableEntry>,
}

/// Per-method inputs that survive a restart in wide mode.
#[derive(Debug, Clone, Default)]
pub struct MethodContext {
    pub binding: Option<MethodBinding>,
    pub line_map: Option<LineMap>,
}

impl MethodContext {
    pub fn new(binding: Option<MethodBinding>, line_map: Option<LineMap>) -> Self {
        Self { binding, line_map }
    }
}

/// Generates one method with `body`.
///
/// `body` is run once with 16-bit branch offsets; if any offset overflows, the
/// emitter is reset in wide mode and `body` runs a second time. Constant pool
/// entries interned by the first run are kept.
pub fn emit_method<F>(
    pool: &mut dyn ConstantPool,
    options: CodegenOptions,
    context: &MethodContext,
    mut body: F,
) -> Result<MethodCode, EmitError>
where
    F: FnMut(&mut CodeEmitter<'_>),
{
    let mut emitter = CodeEmitter::new(pool, options);
    emitter.set_line_map(context.line_map.clone());
    emitter.initialize_max_locals(context.binding.as_ref());
    body(&mut emitter);
    match emitter.finish() {
        Err(EmitError::NeedsWideRetry) => {
            log::debug!(
                "restarting {} in wide mode",
                context
                    .binding
                    .as_ref()
                    .map_or("<anonymous>", |method| method.name.as_str())
            );
            emitter.reset_in_wide_mode();
            emitter.initialize_max_locals(context.binding.as_ref());
            body(&mut emitter);
            emitter.finish()
        }
        result => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{LocalBinding, ScopeId};
    use crate::constant_pool::{ConstantPoolBuilder, CpInfo};
    use crate::constants::ACC_STATIC;
    use crate::inspect::replay_stack;
    use crate::opcodes;
    use crate::options::{ATTR_LINES, ATTR_VARS};
    use crate::types::TargetLevel;

    fn static_method(descriptor: &str) -> MethodContext {
        MethodContext::new(
            Some(MethodBinding::new("demo/Test", "run", descriptor, ACC_STATIC).unwrap()),
            None,
        )
    }

    #[test]
    fn test_if_else_scenario() {
        // static int f(boolean b) { if (b) return 1; else return 2; }
        let mut pool = ConstantPoolBuilder::new();
        let context = static_method("(Z)I");
        let method = emit_method(&mut pool, CodegenOptions::default(), &context, |e| {
            let else_label = e.new_label();
            let end_label = e.new_label();
            e.iload(0);
            e.ifeq(else_label);
            e.iconst_1();
            e.ireturn();
            e.goto_(end_label);
            e.place(else_label);
            e.iconst_2();
            e.ireturn();
            e.place(end_label);
        })
        .unwrap();
        assert_eq!(
            method.code,
            vec![
                opcodes::ILOAD_0,
                opcodes::IFEQ,
                0x00,
                0x05,
                opcodes::ICONST_1,
                opcodes::IRETURN,
                opcodes::ICONST_2,
                opcodes::IRETURN,
            ]
        );
        assert_eq!(method.max_stack, 1);
        assert_eq!(method.max_locals, 1);
    }

    #[test]
    fn test_wide_retry_for_long_forward_branch() {
        let mut pool = ConstantPoolBuilder::new();
        let context = static_method("()V");
        let mut runs = 0;
        let method = emit_method(&mut pool, CodegenOptions::default(), &context, |e| {
            runs += 1;
            let end = e.new_label();
            e.goto_(end);
            for _ in 0..40000 {
                e.nop();
            }
            e.place(end);
            e.return_();
        })
        .unwrap();
        assert_eq!(runs, 2);
        assert_eq!(method.code[0], opcodes::GOTO_W);
        assert_eq!(&method.code[1..5], &40005i32.to_be_bytes());
        assert_eq!(method.code.len(), 40006);
    }

    #[test]
    fn test_wide_retry_rewrites_conditional_branches() {
        let mut pool = ConstantPoolBuilder::new();
        let context = static_method("(I)V");
        let method = emit_method(&mut pool, CodegenOptions::default(), &context, |e| {
            let end = e.new_label();
            e.iload(0);
            e.ifeq(end);
            for _ in 0..33000 {
                e.nop();
            }
            e.place(end);
            e.return_();
        })
        .unwrap();
        // iload_0; ifne +8; goto_w end; ...
        assert_eq!(method.code[1], opcodes::IFNE);
        assert_eq!(&method.code[2..4], &8i16.to_be_bytes());
        assert_eq!(method.code[4], opcodes::GOTO_W);
        assert_eq!(&method.code[5..9], &(33000i32 + 5).to_be_bytes());
        let report = replay_stack(&method.code, pool.entries(), &[]).unwrap();
        assert_eq!(report.max_stack, 1);
    }

    #[test]
    fn test_short_method_stays_narrow() {
        let mut pool = ConstantPoolBuilder::new();
        let context = static_method("()V");
        let mut runs = 0;
        emit_method(&mut pool, CodegenOptions::default(), &context, |e| {
            runs += 1;
            let top = e.new_label();
            e.place(top);
            e.nop();
            e.goto_(top);
        })
        .unwrap();
        assert_eq!(runs, 1);
    }

    #[test]
    fn test_unplaced_label_is_reported() {
        let mut pool = ConstantPoolBuilder::new();
        let context = static_method("(I)V");
        let result = emit_method(&mut pool, CodegenOptions::default(), &context, |e| {
            let nowhere = e.new_label();
            e.iload(0);
            e.ifne(nowhere);
            e.return_();
        });
        assert!(matches!(result, Err(EmitError::UnplacedLabel(_))));
    }

    #[test]
    fn test_local_variable_table() {
        let mut pool = ConstantPoolBuilder::new();
        let context = static_method("()V");
        let options = CodegenOptions::new(TargetLevel::Jdk1_8, ATTR_LINES | ATTR_VARS);
        let method = emit_method(&mut pool, options, &context, |e| {
            let scope = ScopeId(1);
            let x = e.record_local(LocalBinding::new("x", "J", 0, scope).unwrap());
            let unused = e.record_local(LocalBinding::new("y", "I", 2, scope).unwrap());
            e.lconst_1();
            e.lstore(0);
            e.add_visible_local(x);
            e.add_visible_local(unused);
            e.remove_variable(unused);
            e.lload(0);
            e.pop2();
            e.exit_user_scope(scope);
            e.return_();
        })
        .unwrap();
        assert_eq!(method.max_locals, 3);
        assert_eq!(method.local_variables.len(), 1);
        let x = &method.local_variables[0];
        assert_eq!((x.start_pc, x.length, x.index), (2, 2, 0));
        assert_eq!(
            pool.entries()[x.name_index as usize],
            CpInfo::Utf8("x".to_string())
        );
    }

    #[test]
    fn test_unclosed_local_is_reported() {
        let mut pool = ConstantPoolBuilder::new();
        let context = static_method("()V");
        let options = CodegenOptions::new(TargetLevel::Jdk1_8, ATTR_VARS);
        let result = emit_method(&mut pool, options, &context, |e| {
            let x = e.record_local(LocalBinding::new("x", "I", 0, ScopeId(0)).unwrap());
            e.iconst_0();
            e.istore(0);
            e.add_visible_local(x);
            e.return_();
        });
        assert_eq!(result, Err(EmitError::UnclosedLocal("x".to_string())));
    }
}
