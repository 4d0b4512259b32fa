use crate::types::TargetLevel;

/// Maintain and emit the `LineNumberTable`.
pub const ATTR_LINES: u32 = 0x2;
/// Track local variable live ranges and emit the `LocalVariableTable`.
pub const ATTR_VARS: u32 = 0x4;

/// Code generation settings shared by every method of a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodegenOptions {
    pub target: TargetLevel,
    pub attributes: u32,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        Self {
            target: TargetLevel::default(),
            attributes: ATTR_LINES,
        }
    }
}

impl CodegenOptions {
    pub fn new(target: TargetLevel, attributes: u32) -> Self {
        Self { target, attributes }
    }

    pub fn generates_lines(&self) -> bool {
        self.attributes & ATTR_LINES != 0
    }

    pub fn generates_vars(&self) -> bool {
        self.attributes & ATTR_VARS != 0
    }

    /// Boxing through `valueOf` and `StringBuilder` concatenation need 1.5.
    pub fn supports_boxing(&self) -> bool {
        self.target >= TargetLevel::Jdk1_5
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_collects_lines_only() {
        let options = CodegenOptions::default();
        assert!(options.generates_lines());
        assert!(!options.generates_vars());
        assert!(options.supports_boxing());
        assert!(!CodegenOptions::new(TargetLevel::Jdk1_4, ATTR_VARS).supports_boxing());
    }
}
