//! Instrumentation Transformer
//!
//! Rewrites source so that it reports its own execution through the
//! `__cov_track(file, line)` and `__cov_block(file, body)` builtins. Calls
//! are inserted inline, never on new lines, so every line number of the
//! rewritten text still refers to the original file:
//!
//! ```text
//! local x = f()          __cov_track(1, 1); local x = f()
//! while x > 0 do    ──►  while __cov_track(1, 2) and x > 0 do __cov_block(1, 0);
//! elseif y then          elseif __cov_track(1, 4) and y then __cov_block(1, 2);
//! ```
//!
//! `__cov_track` evaluates to `true`, so `true and cond` keeps the value of
//! every condition. Body calls go right after the opening `)`, `then`,
//! `else` or `do`, and body ids are assigned by the parser in source order,
//! so the rewritten text parses to the same ids. The insertion points
//! mirror the interpreter's native events, which makes both strategies
//! produce identical counts.

use super::ids::FileId;
use crate::result::InstrumentError;
use crate::script::ast::{Block, Expr, ExprKind, Stmt, StmtKind, TableField};
use crate::script::{line_count, parse, Builtin, Chunk};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tracing::debug;

/// Default hard limit on instrumented source size
pub const DEFAULT_MAX_INSTRUMENT_BYTES: usize = 4 * 1024 * 1024;

/// Source rewriter with a content-addressed cache
#[derive(Debug)]
pub struct Instrumenter {
    max_bytes: usize,
    cache_enabled: bool,
    cache: HashMap<[u8; 32], String>,
    hits: u64,
}

impl Default for Instrumenter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_INSTRUMENT_BYTES)
    }
}

impl Instrumenter {
    /// Create an instrumenter refusing sources over `max_bytes`
    #[must_use]
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            cache_enabled: true,
            cache: HashMap::new(),
            hits: 0,
        }
    }

    /// Enable or disable caching; disabling drops cached output
    pub fn set_cache_enabled(&mut self, enabled: bool) {
        self.cache_enabled = enabled;
        if !enabled {
            self.clear_cache();
        }
    }

    /// Whether rewrites are cached
    #[must_use]
    pub fn cache_enabled(&self) -> bool {
        self.cache_enabled
    }

    /// Drop every cached rewrite
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// Number of cached rewrites
    #[must_use]
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Cache hits since creation
    #[must_use]
    pub fn cache_hits(&self) -> u64 {
        self.hits
    }

    /// Size limit for instrumented sources
    #[must_use]
    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Rewrite `source` (already parsed as `chunk`) for file `file`
    pub fn instrument(
        &mut self,
        file: FileId,
        source: &str,
        chunk: &Chunk,
    ) -> Result<String, InstrumentError> {
        if source.len() > self.max_bytes {
            return Err(InstrumentError::FileTooLarge {
                size: source.len(),
                limit: self.max_bytes,
            });
        }

        let key = cache_key(file, source);
        if self.cache_enabled {
            if let Some(cached) = self.cache.get(&key) {
                self.hits += 1;
                debug!(%file, "instrumentation cache hit");
                return Ok(cached.clone());
            }
        }

        let mut collector = Insertions {
            file: file.as_u32(),
            points: Vec::new(),
        };
        collector.block(&chunk.block);
        let rewritten = apply(source, collector.points);
        verify(source, &rewritten)?;
        debug!(%file, bytes = rewritten.len(), "instrumented source");

        if self.cache_enabled {
            let _ = self.cache.insert(key, rewritten.clone());
        }
        Ok(rewritten)
    }
}

fn cache_key(file: FileId, source: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(file.as_u32().to_le_bytes());
    hasher.update(source.as_bytes());
    hasher.finalize().into()
}

/// The rewrite must parse and keep every line where it was
pub(crate) fn verify(original: &str, rewritten: &str) -> Result<(), InstrumentError> {
    let before = line_count(original);
    let after = line_count(rewritten);
    if before != after {
        return Err(InstrumentError::Reparse {
            message: format!("line count changed from {before} to {after}"),
        });
    }
    parse(rewritten).map_err(|e| InstrumentError::Reparse {
        message: e.to_string(),
    })?;
    Ok(())
}

fn apply(source: &str, mut points: Vec<(usize, String)>) -> String {
    points.sort_by_key(|(offset, _)| *offset);
    let extra: usize = points.iter().map(|(_, text)| text.len()).sum();
    let mut out = String::with_capacity(source.len() + extra);
    let mut last = 0;
    for (offset, text) in points {
        out.push_str(&source[last..offset]);
        out.push_str(&text);
        last = offset;
    }
    out.push_str(&source[last..]);
    out
}

struct Insertions {
    file: u32,
    points: Vec<(usize, String)>,
}

impl Insertions {
    fn statement(&mut self, offset: usize, line: u32) {
        self.points
            .push((offset, format!("{}({}, {line}); ", Builtin::TRACK_FN, self.file)));
    }

    fn condition(&mut self, cond: &Expr, line: u32) {
        self.points.push((
            cond.span.start,
            format!("{}({}, {line}) and ", Builtin::TRACK_FN, self.file),
        ));
    }

    /// Body entry goes first so it sorts ahead of a statement at `open`
    fn body(&mut self, block: &Block) {
        if let Some(id) = block.id {
            self.points.push((
                block.open,
                format!(" {}({}, {id});", Builtin::BLOCK_FN, self.file),
            ));
        }
        self.block(block);
    }

    fn block(&mut self, block: &Block) {
        for stmt in &block.stmts {
            self.stmt(stmt);
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        if !matches!(stmt.kind, StmtKind::While { .. }) {
            self.statement(stmt.span.start, stmt.span.line);
        }
        match &stmt.kind {
            StmtKind::Local { values, .. } => self.exprs(values),
            StmtKind::LocalFunction { func, .. } | StmtKind::Function { func, .. } => {
                self.body(&func.body);
            }
            StmtKind::Assign { targets, values } => {
                self.exprs(targets);
                self.exprs(values);
            }
            StmtKind::Call(call) => self.expr(call),
            StmtKind::If { arms, else_arm } => {
                for (i, arm) in arms.iter().enumerate() {
                    if i > 0 {
                        self.condition(&arm.cond, arm.line);
                    }
                    self.expr(&arm.cond);
                    self.body(&arm.block);
                }
                if let Some(arm) = else_arm {
                    self.body(&arm.block);
                }
            }
            StmtKind::While { cond, body } => {
                self.condition(cond, stmt.span.line);
                self.expr(cond);
                self.body(body);
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
                self.body(body);
            }
            StmtKind::GenericFor { exprs, body, .. } => {
                self.exprs(exprs);
                self.body(body);
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

    /// Only function bodies inside expressions hold statements
    fn expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Function(func) => self.body(&func.body),
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
            _ => {}
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn rewrite(src: &str) -> String {
        let chunk = parse(src).unwrap();
        Instrumenter::default()
            .instrument(FileId::new(1), src, &chunk)
            .unwrap()
    }

    mod rewrite_tests {
        use super::*;

        #[test]
        fn test_statements_get_prefixed_on_their_line() {
            let out = rewrite("local a = 1\nprint(a)\n");
            assert_eq!(out, "__cov_track(1, 1); local a = 1\n__cov_track(1, 2); print(a)\n");
        }

        #[test]
        fn test_while_and_elseif_conditions() {
            let src = "while x do\n  x = false\nend\nif a then\nelseif b then\nend";
            let out = rewrite(src);
            assert!(out.contains("while __cov_track(1, 1) and x do"));
            assert!(out.contains("elseif __cov_track(1, 5) and b then"));
            assert!(out.contains("__cov_track(1, 4); if a then"));
            assert!(!out.contains("__cov_track(1, 1); while"));
        }

        #[test]
        fn test_nested_function_bodies() {
            let src = "local f = function()\n  return 1\nend";
            let out = rewrite(src);
            assert!(out.contains("function() __cov_block(1, 0);\n  __cov_track(1, 2); return 1"));
        }

        #[test]
        fn test_one_line_bodies_get_entry_calls() {
            let src = "local function never() return 1 end\nif x then x = 0 else x = 1 end";
            let out = rewrite(src);
            assert_eq!(
                out,
                "__cov_track(1, 1); local function never() __cov_block(1, 0); \
                 __cov_track(1, 1); return 1 end\n\
                 __cov_track(1, 2); if x then __cov_block(1, 1); __cov_track(1, 2); x = 0 \
                 else __cov_block(1, 2); __cov_track(1, 2); x = 1 end"
            );
        }

        #[test]
        fn test_loop_bodies_and_do_blocks() {
            let src = "for i = 1, 2 do end\nwhile x do\nend\ndo\n  y = 1\nend";
            let out = rewrite(src);
            assert!(out.contains("for i = 1, 2 do __cov_block(1, 0); end"));
            assert!(out.contains("while __cov_track(1, 2) and x do __cov_block(1, 1);\nend"));
            assert!(!out.contains("__cov_block(1, 2)"));
            assert_eq!(parse(&out).unwrap().body_count, 2);
        }

        #[test]
        fn test_line_count_is_preserved() {
            let src = "-- header\n\nlocal t = {\n  1,\n  2,\n}\nfor i = 1, #t do\n  print(t[i])\nend\n";
            let out = rewrite(src);
            assert_eq!(line_count(&out), line_count(src));
            assert_eq!(out.lines().count(), src.lines().count());
            for (a, b) in src.lines().zip(out.lines()) {
                assert!(b.contains(a.trim()));
            }
        }

        #[test]
        fn test_comments_and_strings_untouched() {
            let src = "--[[ x = 1\ny = 2 ]]\nlocal s = [[\nz = 3\n]]";
            let out = rewrite(src);
            assert!(out.starts_with("--[[ x = 1\ny = 2 ]]\n__cov_track(1, 3); local s = [[\nz = 3\n]]"));
        }
    }

    mod failure_tests {
        use super::*;

        #[test]
        fn test_file_too_large() {
            let src = "local a = 1\n";
            let chunk = parse(src).unwrap();
            let err = Instrumenter::new(4)
                .instrument(FileId::new(1), src, &chunk)
                .unwrap_err();
            assert_eq!(
                err,
                InstrumentError::FileTooLarge {
                    size: src.len(),
                    limit: 4
                }
            );
        }

        #[test]
        fn test_verify_rejects_shifted_lines() {
            let err = verify("a()\nb()", "a()\n\nb()").unwrap_err();
            assert!(matches!(err, InstrumentError::Reparse { .. }));
        }

        #[test]
        fn test_verify_rejects_broken_rewrite() {
            let err = verify("a()", "a(").unwrap_err();
            assert!(matches!(err, InstrumentError::Reparse { .. }));
        }
    }

    mod cache_tests {
        use super::*;

        #[test]
        fn test_cache_hit_and_clear() {
            let src = "local a = 1";
            let chunk = parse(src).unwrap();
            let mut inst = Instrumenter::default();
            let first = inst.instrument(FileId::new(1), src, &chunk).unwrap();
            let second = inst.instrument(FileId::new(1), src, &chunk).unwrap();
            assert_eq!(first, second);
            assert_eq!(inst.cache_hits(), 1);
            assert_eq!(inst.cache_len(), 1);

            let other = inst.instrument(FileId::new(2), src, &chunk).unwrap();
            assert_ne!(first, other);
            assert_eq!(inst.cache_len(), 2);

            inst.clear_cache();
            assert_eq!(inst.cache_len(), 0);
        }

        #[test]
        fn test_disabled_cache_stores_nothing() {
            let src = "local a = 1";
            let chunk = parse(src).unwrap();
            let mut inst = Instrumenter::default();
            inst.set_cache_enabled(false);
            let _ = inst.instrument(FileId::new(1), src, &chunk).unwrap();
            let _ = inst.instrument(FileId::new(1), src, &chunk).unwrap();
            assert_eq!(inst.cache_len(), 0);
            assert_eq!(inst.cache_hits(), 0);
        }
    }
}
