//! Placeholder values for the exploratory render pass.
//!
//! During the lenient pass a recipe may reference names that only exist once the source
//! has been downloaded or the build environment created (`{{ data.version }}` from
//! `load_setup_py_data`, variables set by a later stage). Instead of failing, every such
//! reference resolves to a [`LenientValue`]: a placeholder that survives the operations the
//! template applies to it and renders as the empty string.
//!
//! # Operation contract
//!
//! The set of operations a placeholder supports is finite and enumerated by
//! [`Operation`]. Through [`LenientValue::apply`] and the `std::ops` impls every operation
//! returns a new placeholder. Attribute access extends the dotted name path
//! (`foo` → `foo.bar`); every other operation keeps the name. String conversion yields
//! `""`, integer conversion `0`, float conversion `0.0`, truthiness `false`, and iteration
//! an empty sequence.
//!
//! Inside templates the engine handles attribute access, indexing, calls, method calls,
//! iteration, truthiness and printing through the [`Object`] impl, and `'x' in data` is
//! false. Arithmetic, slicing and negation are evaluated by the engine itself and reject a
//! placeholder operand. The renderer recovers from those failures by replacing the failing expression
//! with [`SUBSTITUTE_NAME`], which the lenient context resolves to a fresh placeholder,
//! and rendering again. Ordering comparisons never fail in the engine: a placeholder
//! orders above numbers and strings, so `data > 1` is true and `data < 1` is false.
//!
//! Methods the engine cannot find on a value (`{}.group(1)`, `none.get('x')`) resolve to
//! a placeholder named after the method; see [`register_unknown_methods`].
//!
//! # Unresolved names
//!
//! Each placeholder records its name into the [`UnresolvedNameLog`] of the render pass that
//! created it. The log is created per pass and returned with that pass's output; there is
//! no process-wide state. Placeholders standing in for a replaced expression are not
//! recorded, since the names inside that expression already were.
//!
//! # Examples
//!
//! ```rust
//! use recipe_render::templating::lenient::{LenientValue, Operation, UnresolvedNameLog};
//!
//! let log = UnresolvedNameLog::new();
//! let data = LenientValue::new("data", log.clone());
//! let version = data.apply(Operation::Attr("version".into()));
//! assert_eq!(version.name(), "data.version");
//! assert_eq!(version.to_string(), "");
//! assert_eq!((version + 1).as_i64(), 0);
//! assert_eq!(log.names(), vec!["data", "data.version"]);
//! ```

use minijinja::value::{Enumerator, Object, ObjectRepr, Value};
use minijinja::{Environment, Error, State};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Identifier the renderer writes in place of an expression the engine could not evaluate.
pub const SUBSTITUTE_NAME: &str = "__unresolved__";

/// Render-scoped record of names that could not be resolved.
///
/// Cloning yields another handle to the same log.
#[derive(Debug, Clone, Default)]
pub struct UnresolvedNameLog {
    names: Arc<Mutex<BTreeSet<String>>>,
}

impl UnresolvedNameLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, name: &str) {
        self.names.lock().unwrap_or_else(PoisonError::into_inner).insert(name.to_string());
    }

    /// Recorded names in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.names.lock().unwrap_or_else(PoisonError::into_inner).iter().cloned().collect()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.lock().unwrap_or_else(PoisonError::into_inner).contains(name)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.lock().unwrap_or_else(PoisonError::into_inner).is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Rem,
    Pow,
    Concat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Lt,
    Le,
    Gt,
    Ge,
}

/// Every operation a placeholder accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// `value.member`
    Attr(String),
    /// `value[key]`, including slices
    Index,
    /// `value(...)`
    Call,
    Binary(BinaryOp),
    Unary(UnaryOp),
    Compare(CompareOp),
}

/// Placeholder for an unresolved template reference.
#[derive(Debug, Clone)]
pub struct LenientValue {
    name: String,
    log: UnresolvedNameLog,
    recorded: bool,
}

impl LenientValue {
    /// Create a placeholder for `name`, recording it in `log`.
    pub fn new(name: impl Into<String>, log: UnresolvedNameLog) -> Self {
        let name = name.into();
        log.record(&name);
        Self {
            name,
            log,
            recorded: true,
        }
    }

    /// Placeholder for a replaced expression. Neither it nor anything derived from it is
    /// recorded in `log`.
    #[must_use]
    pub fn substitute(log: UnresolvedNameLog) -> Self {
        Self {
            name: SUBSTITUTE_NAME.to_string(),
            log,
            recorded: false,
        }
    }

    fn derive(&self, name: String) -> Self {
        if self.recorded {
            Self::new(name, self.log.clone())
        } else {
            Self {
                name,
                log: self.log.clone(),
                recorded: false,
            }
        }
    }

    /// Dotted name path of the reference this placeholder stands for.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Apply one operation. Never fails.
    #[must_use]
    pub fn apply(&self, op: Operation) -> Self {
        match op {
            Operation::Attr(member) => self.derive(format!("{}.{member}", self.name)),
            Operation::Index
            | Operation::Call
            | Operation::Binary(_)
            | Operation::Unary(_)
            | Operation::Compare(_) => self.derive(self.name.clone()),
        }
    }

    #[must_use]
    pub const fn as_i64(&self) -> i64 {
        0
    }

    #[must_use]
    pub const fn as_f64(&self) -> f64 {
        0.0
    }

    #[must_use]
    pub const fn is_truthy(&self) -> bool {
        false
    }

    /// Wrap into an engine value.
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::from_object(self)
    }

    /// Whether an engine value is a placeholder.
    #[must_use]
    pub fn is_placeholder(value: &Value) -> bool {
        value.downcast_object_ref::<Self>().is_some()
    }
}

impl fmt::Display for LenientValue {
    fn fmt(&self, _f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Ok(())
    }
}

impl From<&LenientValue> for i64 {
    fn from(value: &LenientValue) -> Self {
        value.as_i64()
    }
}

impl From<&LenientValue> for f64 {
    fn from(value: &LenientValue) -> Self {
        value.as_f64()
    }
}

impl From<&LenientValue> for String {
    fn from(value: &LenientValue) -> Self {
        value.to_string()
    }
}

macro_rules! binary_ops {
    ($($trait:ident :: $method:ident => $op:expr),* $(,)?) => {
        $(
            impl<T> std::ops::$trait<T> for LenientValue {
                type Output = LenientValue;

                fn $method(self, _rhs: T) -> LenientValue {
                    self.apply(Operation::Binary($op))
                }
            }
        )*
    };
}

binary_ops! {
    Add::add => BinaryOp::Add,
    Sub::sub => BinaryOp::Sub,
    Mul::mul => BinaryOp::Mul,
    Div::div => BinaryOp::Div,
    Rem::rem => BinaryOp::Rem,
}

impl std::ops::Neg for LenientValue {
    type Output = LenientValue;

    fn neg(self) -> LenientValue {
        self.apply(Operation::Unary(UnaryOp::Neg))
    }
}

impl std::ops::Not for LenientValue {
    type Output = LenientValue;

    fn not(self) -> LenientValue {
        self.apply(Operation::Unary(UnaryOp::Not))
    }
}

impl Object for LenientValue {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Plain
    }

    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        let next = match key.as_str() {
            Some(member) => self.apply(Operation::Attr(member.to_string())),
            None => self.apply(Operation::Index),
        };
        Some(next.into_value())
    }

    fn enumerate(self: &Arc<Self>) -> Enumerator {
        Enumerator::Empty
    }

    fn is_true(self: &Arc<Self>) -> bool {
        self.is_truthy()
    }

    fn call(self: &Arc<Self>, _state: &State<'_, '_>, _args: &[Value]) -> Result<Value, Error> {
        Ok(self.apply(Operation::Call).into_value())
    }

    fn call_method(
        self: &Arc<Self>,
        _state: &State<'_, '_>,
        method: &str,
        _args: &[Value],
    ) -> Result<Value, Error> {
        Ok(self.apply(Operation::Attr(method.to_string())).apply(Operation::Call).into_value())
    }

    fn render(self: &Arc<Self>, _f: &mut fmt::Formatter<'_>) -> fmt::Result
    where
        Self: Sized + 'static,
    {
        Ok(())
    }
}

/// Resolve methods a value does not have to placeholders named after the method.
///
/// A callable stored under the method name on an object is still called.
pub fn register_unknown_methods(env: &mut Environment<'_>, log: &UnresolvedNameLog) {
    let log = log.clone();
    env.set_unknown_method_callback(move |state, value, method, args| {
        let member = value.as_object().and_then(|object| object.get_value(&Value::from(method)));
        if let Some(member) = member {
            if !LenientValue::is_placeholder(&member) {
                return member.call(state, args);
            }
        }
        Ok(LenientValue::new(method, log.clone()).into_value())
    });
}
