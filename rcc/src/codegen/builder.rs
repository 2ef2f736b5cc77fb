//! Textual LLVM IR builders
//!
//! `ModuleBuilder` assembles the output sections (header, type
//! definitions, globals, declarations, functions); `FunctionBuilder`
//! owns a function's blocks and keeps value and label names unique by
//! suffixing numeric counters to hints.

use std::collections::HashMap;
use std::fmt::Write;

pub type BlockId = usize;

pub struct ModuleBuilder {
    module_id: String,
    data_layout: Option<String>,
    target_triple: Option<String>,
    type_defs: Vec<(String, String)>,
    globals: Vec<String>,
    declarations: Vec<String>,
    functions: Vec<FunctionBuilder>,
}

impl ModuleBuilder {
    pub fn new(module_id: impl Into<String>) -> Self {
        Self {
            module_id: module_id.into(),
            data_layout: None,
            target_triple: None,
            type_defs: Vec::new(),
            globals: Vec::new(),
            declarations: Vec::new(),
            functions: Vec::new(),
        }
    }

    pub fn set_data_layout(&mut self, layout: impl Into<String>) {
        self.data_layout = Some(layout.into());
    }

    pub fn set_target_triple(&mut self, triple: impl Into<String>) {
        self.target_triple = Some(triple.into());
    }

    pub fn set_type_definitions(&mut self, defs: Vec<(String, String)>) {
        self.type_defs = defs;
    }

    pub fn add_global(&mut self, declaration: impl Into<String>) {
        self.globals.push(declaration.into());
    }

    pub fn add_declaration(&mut self, declaration: impl Into<String>) {
        self.declarations.push(declaration.into());
    }

    pub fn add_function(&mut self, function: FunctionBuilder) {
        self.functions.push(function);
    }

    /// Assemble the module text
    pub fn finish(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "; ModuleID = '{}'", self.module_id);
        if let Some(layout) = &self.data_layout {
            let _ = writeln!(out, "target datalayout = \"{layout}\"");
        }
        if let Some(triple) = &self.target_triple {
            let _ = writeln!(out, "target triple = \"{triple}\"");
        }
        out.push('\n');

        for (name, body) in &self.type_defs {
            let _ = writeln!(out, "%{name} = type {body}");
        }
        if !self.type_defs.is_empty() {
            out.push('\n');
        }

        for global in &self.globals {
            let _ = writeln!(out, "{global}");
        }
        if !self.globals.is_empty() {
            out.push('\n');
        }

        for declaration in &self.declarations {
            let _ = writeln!(out, "{declaration}");
        }
        if !self.declarations.is_empty() {
            out.push('\n');
        }

        for (i, function) in self.functions.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            out.push_str(&function.finish());
        }

        out
    }
}

struct BlockData {
    label: String,
    lines: Vec<String>,
    terminated: bool,
}

pub struct FunctionBuilder {
    name: String,
    return_type: String,
    params: Vec<(String, String)>,
    blocks: Vec<BlockData>,
    value_name_counters: HashMap<String, usize>,
    block_name_counters: HashMap<String, usize>,
}

impl FunctionBuilder {
    /// `params` are `(type, name)` pairs; names include the `%` sigil
    pub fn new(
        name: impl Into<String>,
        return_type: impl Into<String>,
        params: Vec<(String, String)>,
    ) -> Self {
        Self {
            name: name.into(),
            return_type: return_type.into(),
            params,
            blocks: Vec::new(),
            value_name_counters: HashMap::new(),
            block_name_counters: HashMap::new(),
        }
    }

    /// Mint a unique `%name` from a hint
    pub fn allocate_value_name(&mut self, hint: &str) -> String {
        let hint = sanitize_name(hint);
        let hint = if hint.is_empty() { "tmp".to_string() } else { hint };
        let counter = self.value_name_counters.entry(hint.clone()).or_insert(0);
        let name = if *counter == 0 {
            format!("%{hint}")
        } else {
            format!("%{hint}.{counter}")
        };
        *counter += 1;
        name
    }

    /// Create a new block with a unique label derived from `label`
    pub fn create_block(&mut self, label: &str) -> BlockId {
        let label = sanitize_name(label);
        let counter = self.block_name_counters.entry(label.clone()).or_insert(0);
        let unique = if *counter == 0 {
            label
        } else {
            format!("{label}.{counter}")
        };
        *counter += 1;
        self.blocks.push(BlockData {
            label: unique,
            lines: Vec::new(),
            terminated: false,
        });
        self.blocks.len() - 1
    }

    pub fn block_label(&self, block: BlockId) -> &str {
        &self.blocks[block].label
    }

    pub fn is_terminated(&self, block: BlockId) -> bool {
        self.blocks[block].terminated
    }

    /// Emit `%dest = body` allocating the destination from `hint`
    pub fn inst(&mut self, block: BlockId, hint: &str, body: String) -> String {
        let dest = self.allocate_value_name(hint);
        self.push_line(block, format!("{dest} = {body}"));
        dest
    }

    /// Emit an instruction with no result
    pub fn inst_void(&mut self, block: BlockId, body: String) {
        self.push_line(block, body);
    }

    /// Emit the block terminator; terminating twice is a programmer error
    pub fn terminator(&mut self, block: BlockId, body: String) {
        assert!(
            !self.blocks[block].terminated,
            "block {} already terminated",
            self.blocks[block].label
        );
        self.push_line(block, body);
        self.blocks[block].terminated = true;
    }

    /// Prepend a line at the top of a block (entry allocas)
    pub fn prepend_line(&mut self, block: BlockId, line: String) {
        self.blocks[block].lines.insert(0, format!("  {line}"));
    }

    fn push_line(&mut self, block: BlockId, line: String) {
        assert!(
            !self.blocks[block].terminated,
            "appending to terminated block {}",
            self.blocks[block].label
        );
        self.blocks[block].lines.push(format!("  {line}"));
    }

    fn finish(&self) -> String {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|(ty, name)| format!("{ty} {name}"))
            .collect();
        let mut out = format!(
            "define {} @{}({}) {{\n",
            self.return_type,
            self.name,
            params.join(", ")
        );
        for block in &self.blocks {
            let _ = writeln!(out, "{}:", block.label);
            for line in &block.lines {
                let _ = writeln!(out, "{line}");
            }
        }
        out.push_str("}\n");
        out
    }
}

/// Keep only characters valid in unquoted LLVM identifiers
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '$' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_names_are_unique_per_hint() {
        let mut fb = FunctionBuilder::new("f", "i32", vec![]);
        assert_eq!(fb.allocate_value_name("x"), "%x");
        assert_eq!(fb.allocate_value_name("x"), "%x.1");
        assert_eq!(fb.allocate_value_name("x"), "%x.2");
        assert_eq!(fb.allocate_value_name("y"), "%y");
    }

    #[test]
    fn test_empty_hint_falls_back() {
        let mut fb = FunctionBuilder::new("f", "i32", vec![]);
        assert_eq!(fb.allocate_value_name(""), "%tmp");
    }

    #[test]
    fn test_block_labels_deduplicate() {
        let mut fb = FunctionBuilder::new("f", "void", vec![]);
        let a = fb.create_block("then");
        let b = fb.create_block("then");
        assert_eq!(fb.block_label(a), "then");
        assert_eq!(fb.block_label(b), "then.1");
    }

    #[test]
    #[should_panic(expected = "already terminated")]
    fn test_double_terminator_panics() {
        let mut fb = FunctionBuilder::new("f", "void", vec![]);
        let b = fb.create_block("entry");
        fb.terminator(b, "ret void".to_string());
        fb.terminator(b, "ret void".to_string());
    }

    #[test]
    fn test_function_rendering() {
        let mut fb = FunctionBuilder::new(
            "add",
            "i32",
            vec![("i32".to_string(), "%a".to_string()), ("i32".to_string(), "%b".to_string())],
        );
        let entry = fb.create_block("entry");
        let sum = fb.inst(entry, "sum", "add i32 %a, %b".to_string());
        fb.terminator(entry, format!("ret i32 {sum}"));

        let text = fb.finish();
        assert!(text.starts_with("define i32 @add(i32 %a, i32 %b) {\n"));
        assert!(text.contains("entry:\n"));
        assert!(text.contains("  %sum = add i32 %a, %b\n"));
        assert!(text.contains("  ret i32 %sum\n"));
        assert!(text.ends_with("}\n"));
    }

    #[test]
    fn test_module_section_order() {
        let mut mb = ModuleBuilder::new("rc-module");
        mb.set_type_definitions(vec![("__rc_unit".to_string(), "{}".to_string())]);
        mb.add_global("@.str.0 = private constant [3 x i8] c\"hi\\00\"".to_string());
        mb.add_declaration("declare void @print(i8*)".to_string());
        let text = mb.finish();

        let header = text.find("; ModuleID").unwrap();
        let types = text.find("%__rc_unit = type {}").unwrap();
        let globals = text.find("@.str.0").unwrap();
        let decls = text.find("declare void").unwrap();
        assert!(header < types && types < globals && globals < decls);
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("P.get"), "P.get");
        assert_eq!(sanitize_name("a b"), "a_b");
        assert_eq!(sanitize_name("x&y"), "x_y");
    }
}
