//! Static Analyzer
//!
//! Classifies every line of a source file and records the function and
//! block tables used for roll-ups. The analysis is a pure function of the
//! source text and is never revised from runtime data.
//!
//! Two passes:
//!
//! 1. the syntax tree marks statement start lines and `elseif` header lines
//!    (exactly the lines the interpreter reports), and records functions and
//!    blocks with their nesting; a block's index is the body id the parser
//!    gave it, the same id the interpreter reports on entry;
//! 2. the token stream classifies each line; comment and long string spans
//!    come from the lexer, so text that merely looks like code inside them
//!    never makes a line executable.

use crate::result::CovResult;
use crate::script::ast::{Block, Expr, ExprKind, FuncBody, Stmt, StmtKind, TableField};
use crate::script::{parse, Chunk, TokenKind};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// What a source line contains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineKind {
    /// At least one code token starts on this line
    Code,
    /// Only a `--` line comment
    Comment,
    /// Inside (or touched by) a `--[[ ]]` comment
    MultilineComment,
    /// Nothing but whitespace
    Blank,
    /// Inside a `[[ ]]` long string
    StringLiteral,
}

/// Per-line classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineClassification {
    /// Line kind from the token stream
    pub kind: LineKind,
    /// Statement or control header starts here and the line holds code
    pub executable: bool,
}

/// A function declaration or expression
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionInfo {
    /// Declared name, dotted path, or `<anonymous:LINE>`
    pub name: String,
    /// Line of the `function` keyword
    pub start_line: u32,
    /// Line of the closing `end`
    pub end_line: u32,
    /// Parameter names in order (`self` first for methods)
    pub params: Vec<String>,
    /// Takes `...`
    pub is_variadic: bool,
    /// First statement line of the body, `None` for an empty body
    pub entry_line: Option<u32>,
    /// Index of the body in [`FileAnalysis::blocks`]
    pub body_block: usize,
}

/// Kind of aggregation block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    /// One arm of an `if` (`if`, `elseif` or `else`)
    If,
    /// Body of `while` or `for`
    Loop,
    /// Body of a function
    FunctionBody,
}

/// A syntactic region used for branch roll-ups
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    /// Block kind
    pub kind: BlockKind,
    /// Header line (`if`/`elseif`/`else`, loop or `function` keyword)
    pub start_line: u32,
    /// Last line of the region
    pub end_line: u32,
    /// Index of the enclosing block in the block table
    pub parent: Option<usize>,
    /// First statement line of the body, `None` for an empty body
    pub entry_line: Option<u32>,
}

/// Analysis result for one file
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FileAnalysis {
    /// Number of lines in the file
    pub line_count: u32,
    /// One entry per line, index 0 is line 1
    pub lines: Vec<LineClassification>,
    /// Functions in source order
    pub functions: Vec<FunctionInfo>,
    /// Blocks indexed by body id, in source order; parents precede children
    pub blocks: Vec<BlockInfo>,
}

impl FileAnalysis {
    /// Classification of a 1-indexed line
    #[must_use]
    pub fn line(&self, line: u32) -> Option<&LineClassification> {
        line.checked_sub(1)
            .and_then(|i| self.lines.get(i as usize))
    }

    /// Whether a 1-indexed line reports execution
    #[must_use]
    pub fn is_executable(&self, line: u32) -> bool {
        self.line(line).is_some_and(|c| c.executable)
    }

    /// Executable lines in ascending order
    pub fn executable_lines(&self) -> impl Iterator<Item = u32> + '_ {
        self.lines
            .iter()
            .enumerate()
            .filter(|(_, c)| c.executable)
            .map(|(i, _)| i as u32 + 1)
    }

    /// Number of executable lines
    #[must_use]
    pub fn executable_count(&self) -> usize {
        self.lines.iter().filter(|c| c.executable).count()
    }
}

/// Stateless analyzer entry points
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticAnalyzer;

impl StaticAnalyzer {
    /// Parse and analyze source text
    pub fn analyze_source(source: &str) -> CovResult<FileAnalysis> {
        let chunk = parse(source)?;
        Ok(Self::analyze(&chunk))
    }

    /// Analyze an already parsed chunk
    #[must_use]
    pub fn analyze(chunk: &Chunk) -> FileAnalysis {
        let line_count = chunk.line_count;
        let mut walker = Walker::new(line_count);
        walker.block(&chunk.block);

        let kinds = classify_lines(chunk);
        let lines = kinds
            .into_iter()
            .zip(walker.marked)
            .map(|(kind, marked)| LineClassification {
                kind,
                executable: marked && kind == LineKind::Code,
            })
            .collect::<Vec<_>>();

        let analysis = FileAnalysis {
            line_count,
            lines,
            functions: walker.functions,
            blocks: walker.blocks.into_iter().flatten().collect(),
        };
        debug!(
            lines = line_count,
            executable = analysis.executable_count(),
            functions = analysis.functions.len(),
            blocks = analysis.blocks.len(),
            "analyzed source"
        );
        analysis
    }
}

/// Line kinds from the token stream
fn classify_lines(chunk: &Chunk) -> Vec<LineKind> {
    #[derive(Clone, Copy, Default)]
    struct Touch {
        code: bool,
        long_comment: bool,
        long_string: bool,
        comment: bool,
    }

    let count = chunk.line_count as usize;
    let mut touches = vec![Touch::default(); count];
    let mut touch = |from: u32, to: u32, apply: fn(&mut Touch)| {
        for line in from..=to {
            if let Some(t) = line.checked_sub(1).and_then(|i| touches.get_mut(i as usize)) {
                apply(t);
            }
        }
    };

    for token in &chunk.tokens {
        let span = token.span;
        match token.kind {
            TokenKind::Eof => {}
            TokenKind::LongComment => touch(span.line, span.end_line, |t| t.long_comment = true),
            TokenKind::LongStr(_) => touch(span.line, span.end_line, |t| t.long_string = true),
            TokenKind::Comment => touch(span.line, span.line, |t| t.comment = true),
            _ => touch(span.line, span.line, |t| t.code = true),
        }
    }

    touches
        .into_iter()
        .map(|t| {
            if t.code {
                LineKind::Code
            } else if t.long_comment {
                LineKind::MultilineComment
            } else if t.long_string {
                LineKind::StringLiteral
            } else if t.comment {
                LineKind::Comment
            } else {
                LineKind::Blank
            }
        })
        .collect()
}

struct Walker {
    marked: Vec<bool>,
    functions: Vec<FunctionInfo>,
    blocks: Vec<Option<BlockInfo>>,
    parents: Vec<usize>,
}

impl Walker {
    fn new(line_count: u32) -> Self {
        Self {
            marked: vec![false; line_count as usize],
            functions: Vec::new(),
            blocks: Vec::new(),
            parents: Vec::new(),
        }
    }

    fn mark(&mut self, line: u32) {
        if let Some(slot) = line.checked_sub(1).and_then(|i| self.marked.get_mut(i as usize)) {
            *slot = true;
        }
    }

    fn block(&mut self, block: &Block) {
        for stmt in &block.stmts {
            self.stmt(stmt);
        }
    }

    fn scoped(&mut self, kind: BlockKind, start_line: u32, end_line: u32, body: &Block) {
        let index = body.id.map_or(self.blocks.len(), |id| id as usize);
        if self.blocks.len() <= index {
            self.blocks.resize(index + 1, None);
        }
        self.blocks[index] = Some(BlockInfo {
            kind,
            start_line,
            end_line,
            parent: self.parents.last().copied(),
            entry_line: body.stmts.first().map(|s| s.span.line),
        });
        self.parents.push(index);
        self.block(body);
        let _ = self.parents.pop();
    }

    fn function(&mut self, name: String, func: &FuncBody) {
        let body_block = func.body.id.map_or(self.blocks.len(), |id| id as usize);
        self.functions.push(FunctionInfo {
            name,
            start_line: func.span.line,
            end_line: func.span.end_line,
            params: func.params.clone(),
            is_variadic: func.is_variadic,
            entry_line: func.body.stmts.first().map(|s| s.span.line),
            body_block,
        });
        self.scoped(BlockKind::FunctionBody, func.span.line, func.span.end_line, &func.body);
    }

    fn stmt(&mut self, stmt: &Stmt) {
        self.mark(stmt.span.line);
        match &stmt.kind {
            StmtKind::Local { values, .. } => self.exprs(values),
            StmtKind::LocalFunction { name, func } => self.function(name.clone(), func),
            StmtKind::Function { name, func } => self.function(name.display(), func),
            StmtKind::Assign { targets, values } => {
                self.exprs(targets);
                self.exprs(values);
            }
            StmtKind::Call(call) => self.expr(call),
            StmtKind::If { arms, else_arm } => {
                for (i, arm) in arms.iter().enumerate() {
                    if i > 0 {
                        self.mark(arm.line);
                    }
                    self.expr(&arm.cond);
                    let end_line = arms
                        .get(i + 1)
                        .map(|next| next.line)
                        .or_else(|| else_arm.as_ref().map(|e| e.line))
                        .unwrap_or(stmt.span.end_line);
                    self.scoped(BlockKind::If, arm.line, end_line, &arm.block);
                }
                if let Some(arm) = else_arm {
                    self.scoped(BlockKind::If, arm.line, stmt.span.end_line, &arm.block);
                }
            }
            StmtKind::While { cond, body } => {
                self.expr(cond);
                self.scoped(BlockKind::Loop, stmt.span.line, stmt.span.end_line, body);
            }
            StmtKind::NumericFor {
                start,
                limit,
                step,
                body,
                ..
            } => {
                self.expr(start);
                self.expr(limit);
                if let Some(step) = step {
                    self.expr(step);
                }
                self.scoped(BlockKind::Loop, stmt.span.line, stmt.span.end_line, body);
            }
            StmtKind::GenericFor { exprs, body, .. } => {
                self.exprs(exprs);
                self.scoped(BlockKind::Loop, stmt.span.line, stmt.span.end_line, body);
            }
            StmtKind::Do(block) => self.block(block),
            StmtKind::Return(values) => self.exprs(values),
            StmtKind::Break => {}
        }
    }

    fn exprs(&mut self, exprs: &[Expr]) {
        for expr in exprs {
            self.expr(expr);
        }
    }

    /// Expressions only matter for the function expressions they contain
    fn expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Function(func) => {
                self.function(format!("<anonymous:{}>", expr.span.line), func);
            }
            ExprKind::Index { obj, key } => {
                self.expr(obj);
                self.expr(key);
            }
            ExprKind::Call { callee, args } => {
                self.expr(callee);
                self.exprs(args);
            }
            ExprKind::Method { obj, args, .. } => {
                self.expr(obj);
                self.exprs(args);
            }
            ExprKind::Table(fields) => {
                for field in fields {
                    match field {
                        TableField::Positional(value) | TableField::Named(_, value) => {
                            self.expr(value);
                        }
                        TableField::Keyed(key, value) => {
                            self.expr(key);
                            self.expr(value);
                        }
                    }
                }
            }
            ExprKind::Binary { lhs, rhs, .. } => {
                self.expr(lhs);
                self.expr(rhs);
            }
            ExprKind::Unary { operand, .. } | ExprKind::Paren(operand) => self.expr(operand),
            ExprKind::Nil
            | ExprKind::True
            | ExprKind::False
            | ExprKind::Number(_)
            | ExprKind::Str(_)
            | ExprKind::Vararg
            | ExprKind::Name(_) => {}
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn analyze(src: &str) -> FileAnalysis {
        StaticAnalyzer::analyze_source(src).unwrap()
    }

    fn executable(src: &str) -> Vec<u32> {
        analyze(src).executable_lines().collect()
    }

    mod classification_tests {
        use super::*;

        #[test]
        fn test_kinds_per_line() {
            let src = "local a = 1\n\n-- note\n--[[ long\ncomment ]]\nlocal s = [[\ntext\n]]";
            let a = analyze(src);
            let kinds: Vec<LineKind> = a.lines.iter().map(|c| c.kind).collect();
            assert_eq!(
                kinds,
                vec![
                    LineKind::Code,
                    LineKind::Blank,
                    LineKind::Comment,
                    LineKind::MultilineComment,
                    LineKind::MultilineComment,
                    LineKind::Code,
                    LineKind::StringLiteral,
                    LineKind::StringLiteral,
                ]
            );
        }

        #[test]
        fn test_comment_enclosed_code_is_not_executable() {
            let src = "local x = 0\n--[[\nx = x + 1\nx = x + 1\n]]\nx = x + 2";
            let a = analyze(src);
            for line in 2..=5 {
                assert!(!a.is_executable(line), "line {line} must not be executable");
            }
            assert_eq!(executable(src), vec![1, 6]);
        }

        #[test]
        fn test_long_string_lines_are_not_executable() {
            let src = "local s = [[\nlocal y = 1\n]]\nprint(s)";
            assert_eq!(executable(src), vec![1, 4]);
            assert_eq!(analyze(src).line(2).unwrap().kind, LineKind::StringLiteral);
        }

        #[test]
        fn test_trailing_comment_keeps_line_code() {
            let src = "local a = 1 -- set a\n";
            let a = analyze(src);
            assert_eq!(a.line(1).unwrap().kind, LineKind::Code);
            assert!(a.is_executable(1));
        }

        #[test]
        fn test_continuation_lines_are_not_executable() {
            let src = "local t = {\n  1,\n  2,\n}\nprint(#t)";
            assert_eq!(executable(src), vec![1, 5]);
        }

        #[test]
        fn test_keyword_only_lines_are_not_executable() {
            let src = "if true then\n  print(1)\nelse\n  print(2)\nend";
            assert_eq!(executable(src), vec![1, 2, 4]);
        }

        #[test]
        fn test_elseif_header_is_executable() {
            let src = "local x = 1\nif x == 0 then\n  x = 1\nelseif x == 1 then\n  x = 2\nend";
            assert_eq!(executable(src), vec![1, 2, 3, 4, 5]);
        }

        #[test]
        fn test_empty_source() {
            let a = analyze("");
            assert_eq!(a.line_count, 0);
            assert_eq!(a.executable_count(), 0);
        }

        #[test]
        fn test_parse_error_is_typed() {
            let err = StaticAnalyzer::analyze_source("local = 1").unwrap_err();
            assert!(err.is_parse());
        }
    }

    mod function_tests {
        use super::*;

        #[test]
        fn test_two_parameter_function() {
            let src = "local function sum(a, b)\n  return a + b\nend\nsum(1, 2)";
            let a = analyze(src);
            assert_eq!(a.functions.len(), 1);
            let f = &a.functions[0];
            assert_eq!(f.name, "sum");
            assert_eq!(f.params, vec!["a", "b"]);
            assert!(!f.is_variadic);
            assert_eq!((f.start_line, f.end_line), (1, 3));
            assert_eq!(f.entry_line, Some(2));
            assert_eq!(executable(src), vec![1, 2, 4]);
        }

        #[test]
        fn test_function_names() {
            let src = "local M = {}\nfunction M.f() end\nfunction M:g(...) end\nlocal h = function() end";
            let a = analyze(src);
            let names: Vec<&str> = a.functions.iter().map(|f| f.name.as_str()).collect();
            assert_eq!(names, vec!["M.f", "M:g", "<anonymous:4>"]);
            assert_eq!(a.functions[1].params, vec!["self"]);
            assert!(a.functions[1].is_variadic);
            assert_eq!(a.functions[0].entry_line, None);
        }

        #[test]
        fn test_functions_in_call_arguments() {
            let src = "run(function()\n  return 1\nend)";
            let a = analyze(src);
            assert_eq!(a.functions.len(), 1);
            assert_eq!(a.functions[0].name, "<anonymous:1>");
            assert_eq!(executable(src), vec![1, 2]);
        }
    }

    mod block_tests {
        use super::*;

        #[test]
        fn test_if_arms_are_separate_blocks() {
            let src = "if a then\n  x = 1\nelseif b then\n  x = 2\nelse\n  x = 3\nend";
            let a = analyze(src);
            assert_eq!(a.blocks.len(), 3);
            assert!(a.blocks.iter().all(|b| b.kind == BlockKind::If));
            let ranges: Vec<(u32, u32, Option<u32>)> = a
                .blocks
                .iter()
                .map(|b| (b.start_line, b.end_line, b.entry_line))
                .collect();
            assert_eq!(ranges, vec![(1, 3, Some(2)), (3, 5, Some(4)), (5, 7, Some(6))]);
        }

        #[test]
        fn test_nesting_records_parents() {
            let src = "function f(n)\n  for i = 1, n do\n    if i > 2 then\n      break\n    end\n  end\nend";
            let a = analyze(src);
            let kinds: Vec<BlockKind> = a.blocks.iter().map(|b| b.kind).collect();
            assert_eq!(kinds, vec![BlockKind::FunctionBody, BlockKind::Loop, BlockKind::If]);
            assert_eq!(a.blocks[0].parent, None);
            assert_eq!(a.blocks[1].parent, Some(0));
            assert_eq!(a.blocks[2].parent, Some(1));
        }

        #[test]
        fn test_block_index_matches_body_id() {
            let src = "local f = function() end\nif g(function() end) then\nend\nfor i = 1, 2 do end";
            let chunk = parse(src).unwrap();
            let a = StaticAnalyzer::analyze(&chunk);
            assert_eq!(a.blocks.len(), chunk.body_count as usize);
            let kinds: Vec<BlockKind> = a.blocks.iter().map(|b| b.kind).collect();
            assert_eq!(
                kinds,
                vec![
                    BlockKind::FunctionBody,
                    BlockKind::FunctionBody,
                    BlockKind::If,
                    BlockKind::Loop
                ]
            );
            let bodies: Vec<usize> = a.functions.iter().map(|f| f.body_block).collect();
            assert_eq!(bodies, vec![0, 1]);
        }

        #[test]
        fn test_while_block() {
            let src = "local i = 0\nwhile i < 3 do\n  i = i + 1\nend";
            let a = analyze(src);
            assert_eq!(a.blocks.len(), 1);
            assert_eq!(a.blocks[0].kind, BlockKind::Loop);
            assert_eq!((a.blocks[0].start_line, a.blocks[0].end_line), (2, 4));
            assert_eq!(a.blocks[0].entry_line, Some(3));
        }
    }
}
