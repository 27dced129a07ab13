//! Tree-walking interpreter with a per-line execution hook
//!
//! Line events follow one rule shared with the instrumentation transformer:
//! every executed statement reports its first line once, except `while`,
//! which reports its line on every condition check, and every evaluated
//! `elseif` condition reports the `elseif` line. Entering a function, loop
//! or `if` arm body reports the body id, once per call or iteration.
//!
//! Each script-level call costs a handful of native frames, so call depth is
//! capped at [`MAX_CALL_DEPTH`] and [`stack_size`] gives the native stack a
//! thread needs to reach that depth.

use super::ast::{BinOp, Block, Chunk, Expr, ExprKind, FuncBody, Stmt, StmtKind, TableField, UnOp};
use super::value::{format_number, Builtin, Closure, Scope, ScopeRef, Table, Value};
use crate::result::{CovError, CovResult};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

/// Hard limit on nested script calls, whatever the options ask for
pub const MAX_CALL_DEPTH: usize = 1_000;

/// Native stack reserved per script-level call
const STACK_PER_CALL: usize = 128 * 1024;

/// Native stack for the chunk itself and deeply nested expressions
const BASE_STACK: usize = 8 * 1024 * 1024;

/// Native stack size that runs `max_call_depth` nested calls without overflow
#[must_use]
pub const fn stack_size(max_call_depth: usize) -> usize {
    let depth = if max_call_depth < MAX_CALL_DEPTH {
        max_call_depth
    } else {
        MAX_CALL_DEPTH
    };
    BASE_STACK + depth * STACK_PER_CALL
}

/// Receives execution events from a running script
pub trait ExecutionHook {
    /// Native per-line callback; only fired when line events are enabled
    fn on_line(&mut self, line: u32);

    /// Native body-entry callback; only fired when line events are enabled
    fn on_block(&mut self, block: u32) {
        let _ = block;
    }

    /// `__cov_track(file, line)` called from instrumented source
    fn on_track(&mut self, file: u32, line: u32) {
        let _ = (file, line);
    }

    /// `__cov_block(file, block)` called from instrumented source
    fn on_track_block(&mut self, file: u32, block: u32) {
        let _ = (file, block);
    }

    /// An `assert` call at `line` passed
    fn on_assertion(&mut self, line: u32) {
        let _ = line;
    }
}

/// Hook that ignores every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHook;

impl ExecutionHook for NoopHook {
    fn on_line(&mut self, _line: u32) {}
}

/// Interpreter settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterpreterOptions {
    /// Fire `ExecutionHook::on_line` for each line event
    pub line_events: bool,
    /// Maximum nested function calls before a runtime error, capped at
    /// [`MAX_CALL_DEPTH`]
    pub max_call_depth: usize,
}

impl Default for InterpreterOptions {
    fn default() -> Self {
        Self {
            line_events: true,
            max_call_depth: 200,
        }
    }
}

enum Flow {
    Normal,
    Break,
    Return(Vec<Value>),
}

/// Tree-walking interpreter reporting to an [`ExecutionHook`]
pub struct Interpreter<'h> {
    hook: &'h mut dyn ExecutionHook,
    options: InterpreterOptions,
    globals: HashMap<String, Value>,
    output: Vec<String>,
    depth: usize,
}

impl fmt::Debug for Interpreter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interpreter")
            .field("options", &self.options)
            .field("globals", &self.globals.len())
            .field("output", &self.output.len())
            .finish_non_exhaustive()
    }
}

impl<'h> Interpreter<'h> {
    /// Interpreter with the builtins bound as globals
    pub fn new(hook: &'h mut dyn ExecutionHook, mut options: InterpreterOptions) -> Self {
        options.max_call_depth = options.max_call_depth.min(MAX_CALL_DEPTH);
        let globals = Builtin::GLOBALS
            .iter()
            .map(|b| (b.name().to_string(), Value::Builtin(*b)))
            .collect();
        Self {
            hook,
            options,
            globals,
            output: Vec::new(),
            depth: 0,
        }
    }

    /// Lines written by `print`
    #[must_use]
    pub fn output(&self) -> &[String] {
        &self.output
    }

    /// Hand over the lines written by `print`
    #[must_use]
    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.output)
    }

    /// Current value of a global
    #[must_use]
    pub fn global(&self, name: &str) -> Option<Value> {
        self.globals.get(name).cloned()
    }

    /// Execute a chunk as the main function
    pub fn run(&mut self, chunk: &Chunk) -> CovResult<Vec<Value>> {
        let scope = Scope::root();
        scope.borrow_mut().set_varargs(Vec::new());
        match self.exec_block(&chunk.block, &scope)? {
            Flow::Return(values) => Ok(values),
            Flow::Normal | Flow::Break => Ok(Vec::new()),
        }
    }

    /// Call a function value, e.g. a global defined by an earlier `run`
    pub fn call(&mut self, func: &Value, args: Vec<Value>) -> CovResult<Vec<Value>> {
        self.call_value(func, args, 0)
    }

    fn line_event(&mut self, line: u32) {
        if self.options.line_events {
            self.hook.on_line(line);
        }
    }

    fn exec_block(&mut self, block: &Block, parent: &ScopeRef) -> CovResult<Flow> {
        if let Some(id) = block.id {
            if self.options.line_events {
                self.hook.on_block(id);
            }
        }
        let scope = Scope::child(parent);
        for stmt in &block.stmts {
            match self.exec_stmt(stmt, &scope)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt, scope: &ScopeRef) -> CovResult<Flow> {
        let line = stmt.span.line;
        if !matches!(stmt.kind, StmtKind::While { .. }) {
            self.line_event(line);
        }

        match &stmt.kind {
            StmtKind::Local { names, values } => {
                let values = self.eval_list(values, scope, Some(names.len()))?;
                let mut s = scope.borrow_mut();
                for (name, value) in names.iter().zip(values) {
                    s.declare(name, value);
                }
            }
            StmtKind::LocalFunction { name, func } => {
                scope.borrow_mut().declare(name, Value::Nil);
                let closure = self.make_closure(name.clone(), func, scope);
                scope.borrow_mut().declare(name, closure);
            }
            StmtKind::Function { name, func } => {
                let closure = self.make_closure(name.display(), func, scope);
                let key = name.method.as_ref().or_else(|| name.path.last());
                if name.path.len() == 1 && name.method.is_none() {
                    self.assign_name(&name.path[0], closure, scope);
                } else if let Some(key) = key {
                    let mut target = self.lookup(&name.path[0], scope);
                    let last = if name.method.is_some() {
                        name.path.len()
                    } else {
                        name.path.len() - 1
                    };
                    for field in &name.path[1..last] {
                        target = self.index(&target, &Value::str(field), line)?;
                    }
                    self.set_index(&target, Value::str(key), closure, line)?;
                }
            }
            StmtKind::Assign { targets, values } => {
                let values = self.eval_list(values, scope, Some(targets.len()))?;
                for (target, value) in targets.iter().zip(values) {
                    self.assign(target, value, scope)?;
                }
            }
            StmtKind::Call(call) => {
                let _ = self.eval_call(call, scope)?;
            }
            StmtKind::If { arms, else_arm } => {
                for (i, arm) in arms.iter().enumerate() {
                    if i > 0 {
                        self.line_event(arm.line);
                    }
                    if self.eval(&arm.cond, scope)?.is_truthy() {
                        return self.exec_block(&arm.block, scope);
                    }
                }
                if let Some(arm) = else_arm {
                    return self.exec_block(&arm.block, scope);
                }
            }
            StmtKind::While { cond, body } => loop {
                self.line_event(line);
                if !self.eval(cond, scope)?.is_truthy() {
                    break;
                }
                match self.exec_block(body, scope)? {
                    Flow::Normal => {}
                    Flow::Break => break,
                    ret @ Flow::Return(_) => return Ok(ret),
                }
            },
            StmtKind::NumericFor {
                var,
                start,
                limit,
                step,
                body,
            } => {
                let number = |v: Value, what: &str| {
                    v.to_number().ok_or_else(|| {
                        CovError::runtime(line, format!("'for' {what} must be a number"))
                    })
                };
                let start = number(self.eval(start, scope)?, "initial value")?;
                let limit = number(self.eval(limit, scope)?, "limit")?;
                let step = match step {
                    Some(step) => number(self.eval(step, scope)?, "step")?,
                    None => 1.0,
                };
                if step == 0.0 {
                    return Err(CovError::runtime(line, "'for' step is zero"));
                }

                let mut i = start;
                while (step > 0.0 && i <= limit) || (step < 0.0 && i >= limit) {
                    let iter_scope = Scope::child(scope);
                    iter_scope.borrow_mut().declare(var, Value::Number(i));
                    match self.exec_block(body, &iter_scope)? {
                        Flow::Normal => {}
                        Flow::Break => break,
                        ret @ Flow::Return(_) => return Ok(ret),
                    }
                    i += step;
                }
            }
            StmtKind::GenericFor { names, exprs, body } => {
                let mut init = self.eval_list(exprs, scope, Some(3))?.into_iter();
                let func = init.next().unwrap_or_default();
                let state = init.next().unwrap_or_default();
                let mut control = init.next().unwrap_or_default();

                loop {
                    let results = self.call_value(&func, vec![state.clone(), control.clone()], line)?;
                    let first = results.first().cloned().unwrap_or_default();
                    if first.is_nil() {
                        break;
                    }
                    control = first;

                    let iter_scope = Scope::child(scope);
                    {
                        let mut s = iter_scope.borrow_mut();
                        for (i, name) in names.iter().enumerate() {
                            s.declare(name, results.get(i).cloned().unwrap_or_default());
                        }
                    }
                    match self.exec_block(body, &iter_scope)? {
                        Flow::Normal => {}
                        Flow::Break => break,
                        ret @ Flow::Return(_) => return Ok(ret),
                    }
                }
            }
            StmtKind::Do(block) => return self.exec_block(block, scope),
            StmtKind::Return(values) => {
                return Ok(Flow::Return(self.eval_list(values, scope, None)?));
            }
            StmtKind::Break => return Ok(Flow::Break),
        }
        Ok(Flow::Normal)
    }

    fn make_closure(&self, name: String, func: &Arc<FuncBody>, scope: &ScopeRef) -> Value {
        Value::Function(Rc::new(Closure {
            name,
            func: func.clone(),
            env: scope.clone(),
        }))
    }

    fn lookup(&self, name: &str, scope: &ScopeRef) -> Value {
        Scope::lookup(scope, name)
            .or_else(|| self.globals.get(name).cloned())
            .unwrap_or_default()
    }

    fn assign_name(&mut self, name: &str, value: Value, scope: &ScopeRef) {
        if !Scope::assign(scope, name, value.clone()) {
            let _ = self.globals.insert(name.to_string(), value);
        }
    }

    fn assign(&mut self, target: &Expr, value: Value, scope: &ScopeRef) -> CovResult<()> {
        match &target.kind {
            ExprKind::Name(name) => {
                self.assign_name(name, value, scope);
                Ok(())
            }
            ExprKind::Index { obj, key } => {
                let obj = self.eval(obj, scope)?;
                let key = self.eval(key, scope)?;
                self.set_index(&obj, key, value, target.span.line)
            }
            _ => Err(CovError::runtime(target.span.line, "cannot assign to expression")),
        }
    }

    fn index(&self, obj: &Value, key: &Value, line: u32) -> CovResult<Value> {
        match obj {
            Value::Table(t) => Ok(t.borrow().get(key)),
            other => Err(CovError::runtime(
                line,
                format!("attempt to index a {} value", other.type_name()),
            )),
        }
    }

    fn set_index(&self, obj: &Value, key: Value, value: Value, line: u32) -> CovResult<()> {
        match obj {
            Value::Table(t) => {
                if t.borrow_mut().set(key, value) {
                    Ok(())
                } else {
                    Err(CovError::runtime(line, "table index is nil or NaN"))
                }
            }
            other => Err(CovError::runtime(
                line,
                format!("attempt to index a {} value", other.type_name()),
            )),
        }
    }

    /// Evaluate an expression list, expanding a trailing multi-value expression
    fn eval_list(
        &mut self,
        exprs: &[Expr],
        scope: &ScopeRef,
        want: Option<usize>,
    ) -> CovResult<Vec<Value>> {
        let mut values = Vec::with_capacity(exprs.len());
        for (i, expr) in exprs.iter().enumerate() {
            if i + 1 == exprs.len() && expr.kind.is_multi() {
                values.extend(self.eval_multi(expr, scope)?);
            } else {
                values.push(self.eval(expr, scope)?);
            }
        }
        if let Some(n) = want {
            values.resize(n, Value::Nil);
        }
        Ok(values)
    }

    fn eval_multi(&mut self, expr: &Expr, scope: &ScopeRef) -> CovResult<Vec<Value>> {
        match &expr.kind {
            ExprKind::Call { .. } | ExprKind::Method { .. } => self.eval_call(expr, scope),
            ExprKind::Vararg => Ok(Scope::varargs(scope)
                .map(|v| v.to_vec())
                .unwrap_or_default()),
            _ => Ok(vec![self.eval(expr, scope)?]),
        }
    }

    fn eval_call(&mut self, expr: &Expr, scope: &ScopeRef) -> CovResult<Vec<Value>> {
        let line = expr.span.line;
        match &expr.kind {
            ExprKind::Call { callee, args } => {
                let func = self.eval(callee, scope)?;
                let args = self.eval_list(args, scope, None)?;
                self.call_value(&func, args, line)
            }
            ExprKind::Method { obj, name, args } => {
                let obj = self.eval(obj, scope)?;
                let func = self.index(&obj, &Value::str(name), line)?;
                let mut all = vec![obj];
                all.extend(self.eval_list(args, scope, None)?);
                self.call_value(&func, all, line)
            }
            _ => Ok(vec![self.eval(expr, scope)?]),
        }
    }

    fn eval(&mut self, expr: &Expr, scope: &ScopeRef) -> CovResult<Value> {
        let line = expr.span.line;
        let value = match &expr.kind {
            ExprKind::Nil => Value::Nil,
            ExprKind::True => Value::Bool(true),
            ExprKind::False => Value::Bool(false),
            ExprKind::Number(n) => Value::Number(*n),
            ExprKind::Str(s) => Value::Str(s.clone()),
            ExprKind::Vararg => Scope::varargs(scope)
                .and_then(|v| v.first().cloned())
                .unwrap_or_default(),
            ExprKind::Function(func) => {
                self.make_closure(format!("<anonymous:{line}>"), func, scope)
            }
            ExprKind::Name(name) => self.lookup(name, scope),
            ExprKind::Index { obj, key } => {
                let obj = self.eval(obj, scope)?;
                let key = self.eval(key, scope)?;
                self.index(&obj, &key, line)?
            }
            ExprKind::Call { .. } | ExprKind::Method { .. } => self
                .eval_call(expr, scope)?
                .into_iter()
                .next()
                .unwrap_or_default(),
            ExprKind::Table(fields) => self.eval_table(fields, scope)?,
            ExprKind::Binary { op, lhs, rhs } => match op {
                BinOp::And => {
                    let left = self.eval(lhs, scope)?;
                    if left.is_truthy() {
                        self.eval(rhs, scope)?
                    } else {
                        left
                    }
                }
                BinOp::Or => {
                    let left = self.eval(lhs, scope)?;
                    if left.is_truthy() {
                        left
                    } else {
                        self.eval(rhs, scope)?
                    }
                }
                _ => {
                    let left = self.eval(lhs, scope)?;
                    let right = self.eval(rhs, scope)?;
                    binary(*op, &left, &right, line)?
                }
            },
            ExprKind::Unary { op, operand } => {
                let value = self.eval(operand, scope)?;
                match op {
                    UnOp::Not => Value::Bool(!value.is_truthy()),
                    UnOp::Neg => match value.to_number() {
                        Some(n) => Value::Number(-n),
                        None => {
                            return Err(CovError::runtime(
                                line,
                                format!(
                                    "attempt to perform arithmetic on a {} value",
                                    value.type_name()
                                ),
                            ))
                        }
                    },
                    UnOp::Len => match &value {
                        Value::Str(s) => Value::Number(s.len() as f64),
                        Value::Table(t) => Value::Number(t.borrow().len() as f64),
                        other => {
                            return Err(CovError::runtime(
                                line,
                                format!("attempt to get length of a {} value", other.type_name()),
                            ))
                        }
                    },
                }
            }
            ExprKind::Paren(inner) => self.eval(inner, scope)?,
        };
        Ok(value)
    }

    fn eval_table(&mut self, fields: &[TableField], scope: &ScopeRef) -> CovResult<Value> {
        let mut table = Table::new();
        let mut next_index = 1.0;
        for (i, field) in fields.iter().enumerate() {
            match field {
                TableField::Positional(expr) if i + 1 == fields.len() && expr.kind.is_multi() => {
                    for value in self.eval_multi(expr, scope)? {
                        let _ = table.set(Value::Number(next_index), value);
                        next_index += 1.0;
                    }
                }
                TableField::Positional(expr) => {
                    let value = self.eval(expr, scope)?;
                    let _ = table.set(Value::Number(next_index), value);
                    next_index += 1.0;
                }
                TableField::Named(name, expr) => {
                    let value = self.eval(expr, scope)?;
                    let _ = table.set(Value::str(name), value);
                }
                TableField::Keyed(key, expr) => {
                    let key_value = self.eval(key, scope)?;
                    let value = self.eval(expr, scope)?;
                    if !table.set(key_value, value) {
                        return Err(CovError::runtime(key.span.line, "table index is nil or NaN"));
                    }
                }
            }
        }
        Ok(Value::Table(Rc::new(RefCell::new(table))))
    }

    fn call_value(&mut self, func: &Value, args: Vec<Value>, line: u32) -> CovResult<Vec<Value>> {
        match func {
            Value::Function(closure) => {
                if self.depth >= self.options.max_call_depth {
                    return Err(CovError::runtime(line, "stack overflow"));
                }
                let scope = Scope::child(&closure.env);
                {
                    let mut s = scope.borrow_mut();
                    let mut args = args.into_iter();
                    for param in &closure.func.params {
                        s.declare(param, args.next().unwrap_or_default());
                    }
                    let rest = if closure.func.is_variadic {
                        args.collect()
                    } else {
                        Vec::new()
                    };
                    s.set_varargs(rest);
                }

                self.depth += 1;
                let result = self.exec_block(&closure.func.body, &scope);
                self.depth -= 1;
                match result? {
                    Flow::Return(values) => Ok(values),
                    Flow::Normal | Flow::Break => Ok(Vec::new()),
                }
            }
            Value::Builtin(builtin) => self.call_builtin(*builtin, args, line),
            other => Err(CovError::runtime(
                line,
                format!("attempt to call a {} value", other.type_name()),
            )),
        }
    }

    fn call_builtin(&mut self, builtin: Builtin, args: Vec<Value>, line: u32) -> CovResult<Vec<Value>> {
        let arg = |i: usize| args.get(i).cloned().unwrap_or_default();
        let table_arg = |i: usize| match args.get(i) {
            Some(Value::Table(t)) => Ok(t.clone()),
            other => Err(CovError::runtime(
                line,
                format!(
                    "bad argument #{} to '{}' (table expected, got {})",
                    i + 1,
                    builtin.name(),
                    other.map_or("no value", Value::type_name)
                ),
            )),
        };

        let result = match builtin {
            Builtin::Print => {
                let text = args
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("\t");
                self.output.push(text);
                Vec::new()
            }
            Builtin::Assert => {
                if !arg(0).is_truthy() {
                    let message = match args.get(1) {
                        Some(m) if !m.is_nil() => m.to_string(),
                        _ => "assertion failed!".to_string(),
                    };
                    return Err(CovError::runtime(line, message));
                }
                self.hook.on_assertion(line);
                args
            }
            Builtin::Error => return Err(CovError::runtime(line, arg(0).to_string())),
            Builtin::ToString => vec![Value::str(&arg(0).to_string())],
            Builtin::ToNumber => vec![arg(0).to_number().map_or(Value::Nil, Value::Number)],
            Builtin::Type => vec![Value::str(arg(0).type_name())],
            Builtin::Pairs => {
                let t = table_arg(0)?;
                vec![Value::Builtin(Builtin::Next), Value::Table(t), Value::Nil]
            }
            Builtin::IPairs => {
                let t = table_arg(0)?;
                vec![
                    Value::Builtin(Builtin::IPairsIter),
                    Value::Table(t),
                    Value::Number(0.0),
                ]
            }
            Builtin::IPairsIter => {
                let t = table_arg(0)?;
                let i = arg(1).to_number().unwrap_or(0.0) + 1.0;
                let value = t.borrow().get(&Value::Number(i));
                if value.is_nil() {
                    vec![Value::Nil]
                } else {
                    vec![Value::Number(i), value]
                }
            }
            Builtin::Next => {
                let t = table_arg(0)?;
                let entry = t
                    .borrow()
                    .next(&arg(1))
                    .map_err(|message| CovError::runtime(line, message))?;
                match entry {
                    Some((k, v)) => vec![k, v],
                    None => vec![Value::Nil],
                }
            }
            Builtin::Select => match arg(0) {
                Value::Str(s) if &*s == "#" => vec![Value::Number((args.len() - 1) as f64)],
                n => {
                    let Some(n) = n.to_number().filter(|n| *n >= 1.0) else {
                        return Err(CovError::runtime(
                            line,
                            "bad argument #1 to 'select' (index out of range)",
                        ));
                    };
                    args.into_iter().skip(n as usize).collect()
                }
            },
            Builtin::CovTrack => {
                let file = arg(0).to_number().unwrap_or(0.0);
                let tracked = arg(1).to_number().unwrap_or(0.0);
                if file >= 0.0 && tracked >= 0.0 {
                    self.hook.on_track(file as u32, tracked as u32);
                }
                vec![Value::Bool(true)]
            }
            Builtin::CovBlock => {
                let file = arg(0).to_number().unwrap_or(-1.0);
                let block = arg(1).to_number().unwrap_or(-1.0);
                if file >= 0.0 && block >= 0.0 {
                    self.hook.on_track_block(file as u32, block as u32);
                }
                Vec::new()
            }
        };
        Ok(result)
    }
}

fn binary(op: BinOp, left: &Value, right: &Value, line: u32) -> CovResult<Value> {
    let value = match op {
        BinOp::Eq => Value::Bool(left.raw_eq(right)),
        BinOp::NotEq => Value::Bool(!left.raw_eq(right)),
        BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge => {
            let ordering = match (left, right) {
                (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
                (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
                _ => {
                    return Err(CovError::runtime(
                        line,
                        format!(
                            "attempt to compare {} with {}",
                            left.type_name(),
                            right.type_name()
                        ),
                    ))
                }
            };
            let result = ordering.is_some_and(|o| match op {
                BinOp::Lt => o.is_lt(),
                BinOp::Gt => o.is_gt(),
                BinOp::Le => o.is_le(),
                _ => o.is_ge(),
            });
            Value::Bool(result)
        }
        BinOp::Concat => {
            let piece = |v: &Value| match v {
                Value::Str(s) => Ok(s.to_string()),
                Value::Number(n) => Ok(format_number(*n)),
                other => Err(CovError::runtime(
                    line,
                    format!("attempt to concatenate a {} value", other.type_name()),
                )),
            };
            Value::str(&(piece(left)? + &piece(right)?))
        }
        BinOp::And if left.is_truthy() => right.clone(),
        BinOp::Or if !left.is_truthy() => right.clone(),
        BinOp::And | BinOp::Or => left.clone(),
        _ => {
            let (Some(a), Some(b)) = (left.to_number(), right.to_number()) else {
                let bad = if left.to_number().is_none() { left } else { right };
                return Err(CovError::runtime(
                    line,
                    format!("attempt to perform arithmetic on a {} value", bad.type_name()),
                ));
            };
            Value::Number(match op {
                BinOp::Add => a + b,
                BinOp::Sub => a - b,
                BinOp::Mul => a * b,
                BinOp::Div => a / b,
                BinOp::IDiv => (a / b).floor(),
                BinOp::Mod => a - (a / b).floor() * b,
                _ => a.powf(b),
            })
        }
    };
    Ok(value)
}
