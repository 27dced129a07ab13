//! Runtime values

use super::ast::FuncBody;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

/// Shared, mutable table
pub type TableRef = Rc<RefCell<Table>>;
/// Shared, mutable scope
pub type ScopeRef = Rc<RefCell<Scope>>;

/// A script value
#[derive(Clone, Default)]
pub enum Value {
    /// Absence of a value
    #[default]
    Nil,
    /// `true` or `false`
    Bool(bool),
    /// Double-precision number
    Number(f64),
    /// Immutable string
    Str(Arc<str>),
    /// Table, compared by identity
    Table(TableRef),
    /// Script function with its captured scope
    Function(Rc<Closure>),
    /// Host function
    Builtin(Builtin),
}

impl Value {
    /// Only `nil` and `false` are falsy
    #[must_use]
    pub const fn is_truthy(&self) -> bool {
        !matches!(self, Self::Nil | Self::Bool(false))
    }

    /// Whether this is `nil`
    #[must_use]
    pub const fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// Name reported by `type()`
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::Str(_) => "string",
            Self::Table(_) => "table",
            Self::Function(_) | Self::Builtin(_) => "function",
        }
    }

    /// Numeric view, converting numeric strings
    #[must_use]
    pub fn to_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Str(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// String value from a slice
    #[must_use]
    pub fn str(s: &str) -> Self {
        Self::Str(Arc::from(s))
    }

    /// Raw equality: by value for primitives, by identity for references
    #[must_use]
    pub fn raw_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Nil, Self::Nil) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Table(a), Self::Table(b)) => Rc::ptr_eq(a, b),
            (Self::Function(a), Self::Function(b)) => Rc::ptr_eq(a, b),
            (Self::Builtin(a), Self::Builtin(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => f.write_str("nil"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => f.write_str(&format_number(*n)),
            Self::Str(s) => f.write_str(s),
            Self::Table(t) => write!(f, "table: {:p}", Rc::as_ptr(t)),
            Self::Function(c) => write!(f, "function: {}", c.name),
            Self::Builtin(b) => write!(f, "builtin: {}", b.name()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => write!(f, "{s:?}"),
            other => write!(f, "{other}"),
        }
    }
}

/// Integral numbers print without a fractional part
#[must_use]
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// Hashable identity of a table key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Key {
    Bool(bool),
    Int(i64),
    Float(u64),
    Str(Arc<str>),
    Ref(usize),
}

impl Key {
    fn of(value: &Value) -> Option<Self> {
        let key = match value {
            Value::Nil => return None,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 9.0e15 => Self::Int(*n as i64),
            Value::Number(n) => Self::Float(n.to_bits()),
            Value::Str(s) => Self::Str(s.clone()),
            Value::Table(t) => Self::Ref(Rc::as_ptr(t) as *const () as usize),
            Value::Function(c) => Self::Ref(Rc::as_ptr(c) as *const () as usize),
            Value::Builtin(b) => Self::Str(Arc::from(format!("\u{0}builtin:{}", b.name()))),
        };
        Some(key)
    }
}

/// Insertion-ordered table; removed entries stay as nil slots so `next` stays stable
#[derive(Default)]
pub struct Table {
    slots: Vec<(Value, Value)>,
    index: HashMap<Key, usize>,
}

impl Table {
    /// Empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Field lookup; `nil` when absent
    #[must_use]
    pub fn get(&self, key: &Value) -> Value {
        Key::of(key)
            .and_then(|k| self.index.get(&k))
            .map(|&i| self.slots[i].1.clone())
            .unwrap_or(Value::Nil)
    }

    /// Set a field; returns false for a nil or NaN key
    pub fn set(&mut self, key: Value, value: Value) -> bool {
        if matches!(key, Value::Number(n) if n.is_nan()) {
            return false;
        }
        let Some(k) = Key::of(&key) else {
            return false;
        };
        if let Some(&i) = self.index.get(&k) {
            self.slots[i].1 = value;
        } else if !value.is_nil() {
            let _ = self.index.insert(k, self.slots.len());
            self.slots.push((key, value));
        }
        true
    }

    /// Border of the array part: largest n with t[1..=n] all non-nil
    #[must_use]
    pub fn len(&self) -> usize {
        let mut n = 0;
        while !self.get(&Value::Number((n + 1) as f64)).is_nil() {
            n += 1;
        }
        n
    }

    /// No non-nil field
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|(_, v)| v.is_nil())
    }

    /// Entry after `key` in insertion order, `None` key meaning start
    pub fn next(&self, key: &Value) -> Result<Option<(Value, Value)>, String> {
        let start = if key.is_nil() {
            0
        } else {
            match Key::of(key).and_then(|k| self.index.get(&k)) {
                Some(&i) => i + 1,
                None => return Err("invalid key to 'next'".to_string()),
            }
        };
        Ok(self.slots[start.min(self.slots.len())..]
            .iter()
            .find(|(_, v)| !v.is_nil())
            .cloned())
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.slots.iter().filter(|(_, v)| !v.is_nil()).map(|(k, v)| (k, v)))
            .finish()
    }
}

/// A function value created from a [`FuncBody`]
pub struct Closure {
    /// Name for error messages
    pub name: String,
    /// Parameters and body
    pub func: Arc<FuncBody>,
    /// Scope the function was defined in
    pub env: ScopeRef,
}

// The environment can point back at this closure, so it is left out
impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Closure")
            .field("name", &self.name)
            .field("params", &self.func.params)
            .finish_non_exhaustive()
    }
}

/// Host functions available to scripts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    /// `print(...)`, captured as output
    Print,
    /// `assert(v, msg)`
    Assert,
    /// `error(msg)`
    Error,
    /// `tostring(v)`
    ToString,
    /// `tonumber(v)`
    ToNumber,
    /// `type(v)`
    Type,
    /// `pairs(t)`
    Pairs,
    /// `ipairs(t)`
    IPairs,
    /// Iterator returned by `ipairs`
    IPairsIter,
    /// `next(t, k)`
    Next,
    /// `select(n, ...)`
    Select,
    /// `__cov_track(file, line)`
    CovTrack,
    /// `__cov_block(file, body)`
    CovBlock,
}

impl Builtin {
    /// Name of the line hook inserted by the transformer
    pub const TRACK_FN: &'static str = "__cov_track";
    /// Name of the body-entry hook inserted by the transformer
    pub const BLOCK_FN: &'static str = "__cov_block";

    /// Builtins bound as globals in every run
    pub const GLOBALS: [Self; 12] = [
        Self::Print,
        Self::Assert,
        Self::Error,
        Self::ToString,
        Self::ToNumber,
        Self::Type,
        Self::Pairs,
        Self::IPairs,
        Self::Next,
        Self::Select,
        Self::CovTrack,
        Self::CovBlock,
    ];

    /// Global name
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Print => "print",
            Self::Assert => "assert",
            Self::Error => "error",
            Self::ToString => "tostring",
            Self::ToNumber => "tonumber",
            Self::Type => "type",
            Self::Pairs => "pairs",
            Self::IPairs => "ipairs",
            Self::IPairsIter => "ipairs_iter",
            Self::Next => "next",
            Self::Select => "select",
            Self::CovTrack => Self::TRACK_FN,
            Self::CovBlock => Self::BLOCK_FN,
        }
    }
}

/// Lexical scope; closures keep their defining scope alive
#[derive(Debug, Default)]
pub struct Scope {
    vars: HashMap<String, Value>,
    parent: Option<ScopeRef>,
    varargs: Option<Rc<[Value]>>,
}

impl Scope {
    /// Global scope
    #[must_use]
    pub fn root() -> ScopeRef {
        Rc::new(RefCell::new(Self::default()))
    }

    /// Nested scope under `parent`
    #[must_use]
    pub fn child(parent: &ScopeRef) -> ScopeRef {
        Rc::new(RefCell::new(Self {
            vars: HashMap::new(),
            parent: Some(parent.clone()),
            varargs: None,
        }))
    }

    /// Values seen by `...` in this function scope
    pub fn set_varargs(&mut self, values: Vec<Value>) {
        self.varargs = Some(Rc::from(values));
    }

    /// Declare a local, shadowing outer ones
    pub fn declare(&mut self, name: &str, value: Value) {
        let _ = self.vars.insert(name.to_string(), value);
    }

    /// Look a local up through enclosing scopes
    #[must_use]
    pub fn lookup(scope: &ScopeRef, name: &str) -> Option<Value> {
        let mut current = scope.clone();
        loop {
            let parent = {
                let s = current.borrow();
                if let Some(v) = s.vars.get(name) {
                    return Some(v.clone());
                }
                s.parent.clone()
            };
            current = parent?;
        }
    }

    /// Assign to an existing local; returns false when no scope declares `name`
    pub fn assign(scope: &ScopeRef, name: &str, value: Value) -> bool {
        let mut current = scope.clone();
        loop {
            let parent = {
                let mut s = current.borrow_mut();
                if let Some(slot) = s.vars.get_mut(name) {
                    *slot = value;
                    return true;
                }
                s.parent.clone()
            };
            match parent {
                Some(p) => current = p,
                None => return false,
            }
        }
    }

    /// Varargs of the innermost enclosing variadic function
    #[must_use]
    pub fn varargs(scope: &ScopeRef) -> Option<Rc<[Value]>> {
        let mut current = scope.clone();
        loop {
            let parent = {
                let s = current.borrow();
                if let Some(v) = &s.varargs {
                    return Some(v.clone());
                }
                s.parent.clone()
            };
            current = parent?;
        }
    }
}
