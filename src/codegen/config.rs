//! Code generation configuration
//!
//! Settings for the Cranelift backend: optimization level, IR verification,
//! position independence and target selection.

use super::{CodegenError, CodegenResult};
use serde::Deserialize;
use std::path::Path;

/// Cranelift optimization level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptLevel {
    None,
    Speed,
    SpeedAndSize,
}

impl OptLevel {
    /// Value of Cranelift's `opt_level` setting
    pub fn as_setting(self) -> &'static str {
        match self {
            OptLevel::None => "none",
            OptLevel::Speed => "speed",
            OptLevel::SpeedAndSize => "speed_and_size",
        }
    }
}

/// Configuration for one code generation run
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CodegenConfig {
    /// Optimization level
    pub opt_level: OptLevel,
    /// Verify the IR of every function before it is compiled
    pub verifier: bool,
    /// Emit position independent code (object output only)
    pub is_pic: bool,
    /// Target triple; the host when absent
    pub target_triple: Option<String>,
    /// Name of the emitted object module
    pub module_name: String,
    /// Keep the textual IR of every generated function
    pub retain_ir: bool,
}

impl Default for CodegenConfig {
    fn default() -> Self {
        Self {
            opt_level: OptLevel::None,
            verifier: true,
            is_pic: false,
            target_triple: None,
            module_name: "tiger_program".to_string(),
            retain_ir: false,
        }
    }
}

impl CodegenConfig {
    pub fn builder() -> CodegenConfigBuilder {
        CodegenConfigBuilder::new()
    }

    /// Parse a configuration; missing keys take their default
    pub fn from_json(text: &str) -> CodegenResult<Self> {
        serde_json::from_str(text)
            .map_err(|e| CodegenError::Configuration(format!("invalid configuration: {}", e)))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> CodegenResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            CodegenError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }
}

/// Configuration builder
pub struct CodegenConfigBuilder {
    config: CodegenConfig,
}

impl CodegenConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: CodegenConfig::default(),
        }
    }

    pub fn opt_level(mut self, level: OptLevel) -> Self {
        self.config.opt_level = level;
        self
    }

    pub fn verifier(mut self, enable: bool) -> Self {
        self.config.verifier = enable;
        self
    }

    pub fn is_pic(mut self, enable: bool) -> Self {
        self.config.is_pic = enable;
        self
    }

    pub fn target_triple(mut self, triple: impl Into<String>) -> Self {
        self.config.target_triple = Some(triple.into());
        self
    }

    pub fn module_name(mut self, name: impl Into<String>) -> Self {
        self.config.module_name = name.into();
        self
    }

    pub fn retain_ir(mut self, enable: bool) -> Self {
        self.config.retain_ir = enable;
        self
    }

    pub fn build(self) -> CodegenConfig {
        self.config
    }
}

impl Default for CodegenConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
