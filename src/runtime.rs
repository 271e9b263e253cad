use std::cell::RefCell;
use std::collections::HashMap;
use std::io;
use std::rc::Rc;

use thiserror::Error;

use crate::ast::Statement;

/// Flat binding environment handed to every `execute` call. There is no
/// lexical chain: each method invocation gets a fresh closure seeded with
/// `self` and the formal parameters.
pub type Closure = HashMap<String, Value>;

/// Capability supplying the stream `print` statements write to.
pub trait Context {
    fn output(&mut self) -> &mut dyn io::Write;
}

/// Context backed by process stdout.
pub struct StandardContext {
    stdout: io::Stdout,
}

impl StandardContext {
    pub fn new() -> Self {
        Self {
            stdout: io::stdout(),
        }
    }
}

impl Default for StandardContext {
    fn default() -> Self {
        Self::new()
    }
}

impl Context for StandardContext {
    fn output(&mut self) -> &mut dyn io::Write {
        &mut self.stdout
    }
}

/// Context capturing everything written through it, for assertions in tests.
#[derive(Default)]
pub struct CapturedContext {
    buffer: Vec<u8>,
}

impl CapturedContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.buffer).into_owned()
    }
}

impl Context for CapturedContext {
    fn output(&mut self) -> &mut dyn io::Write {
        &mut self.buffer
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("Variable '{name}' is not found")]
    UndefinedVariable { name: String },
    #[error("Field '{field}' is not found")]
    UndefinedField { field: String },
    #[error("Method not found: '{method}' with {arity} argument(s)")]
    MethodNotFound { method: String, arity: usize },
    #[error("Cannot call method '{method}' on {type_name}")]
    MethodCallOnNonInstance { method: String, type_name: String },
    #[error("Cannot access field '{field}' of {type_name}")]
    FieldAccessOnNonInstance { field: String, type_name: String },
    #[error("Cannot compare {lhs} and {rhs}")]
    CannotCompare { lhs: String, rhs: String },
    #[error("Cannot {operation} {lhs} and {rhs}")]
    InvalidOperands {
        operation: &'static str,
        lhs: String,
        rhs: String,
    },
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Return outside of a method body")]
    ReturnOutsideMethod,
    #[error("Failed to write program output: {message}")]
    Output { message: String },
}

/// Non-local exits threaded through the executor's error channel: either a
/// `return` travelling to the enclosing method body, or a fatal runtime
/// failure on its way to the program driver. Every composite node forwards
/// an interrupt unchanged; only `Statement::MethodBody` converts `Return`
/// back into an ordinary value.
#[derive(Debug, Clone, PartialEq)]
pub enum Interrupt {
    Return(Value),
    Failure(RuntimeError),
}

impl From<RuntimeError> for Interrupt {
    fn from(error: RuntimeError) -> Self {
        Interrupt::Failure(error)
    }
}

pub type ExecResult<T> = Result<T, Interrupt>;

/// A handle to a runtime value.
///
/// Shared ownership via `Rc` covers both the owning handle and the `self`
/// binding during a method call, which clones the instance's `Rc` and so
/// preserves identity without any non-owning escape hatch. Cycles built
/// through instance fields are never collected.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    None,
    Number(i64),
    String(String),
    Bool(bool),
    Class(Rc<Class>),
    Instance(Rc<RefCell<ClassInstance>>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Number(_) => "int",
            Value::String(_) => "str",
            Value::Bool(_) => "bool",
            Value::Class(_) => "type",
            Value::Instance(_) => "instance",
        }
    }

    /// Zero, the empty string, `False` and `None` are falsy; classes and
    /// instances are falsy as well.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Number(value) => *value != 0,
            Value::String(value) => !value.is_empty(),
            Value::Bool(value) => *value,
            Value::None | Value::Class(_) | Value::Instance(_) => false,
        }
    }

    /// Renders the value the way `print` shows it. Instances render through
    /// a zero-arity `__str__` when the class chain provides one, and
    /// otherwise as an address-like identity token.
    pub fn to_output(&self, context: &mut dyn Context) -> ExecResult<String> {
        match self {
            Value::None => Ok("None".to_string()),
            Value::Number(value) => Ok(value.to_string()),
            Value::String(value) => Ok(value.clone()),
            Value::Bool(value) => Ok(if *value { "True" } else { "False" }.to_string()),
            Value::Class(class) => Ok(format!("Class {}", class.name())),
            Value::Instance(instance) => {
                if instance.borrow().has_method("__str__", 0) {
                    let rendered = self.call_method("__str__", Vec::new(), context)?;
                    rendered.to_output(context)
                } else {
                    let name = instance.borrow().class().name().to_string();
                    Ok(format!("<{} object at {:p}>", name, Rc::as_ptr(instance)))
                }
            }
        }
    }

    /// Invokes `method` on a class instance. Resolution walks the parent
    /// chain by name and then checks the arity of whatever it found; the
    /// body runs in a fresh closure binding `self` and the formal
    /// parameters, in order.
    pub fn call_method(
        &self,
        method: &str,
        args: Vec<Value>,
        context: &mut dyn Context,
    ) -> ExecResult<Value> {
        let Value::Instance(instance) = self else {
            return Err(RuntimeError::MethodCallOnNonInstance {
                method: method.to_string(),
                type_name: self.type_name().to_string(),
            }
            .into());
        };

        let class = Rc::clone(instance.borrow().class());
        let resolved = class
            .find_method(method)
            .filter(|m| m.formal_params.len() == args.len());
        let Some(resolved) = resolved else {
            return Err(RuntimeError::MethodNotFound {
                method: method.to_string(),
                arity: args.len(),
            }
            .into());
        };

        let mut closure = Closure::new();
        closure.insert("self".to_string(), Value::Instance(Rc::clone(instance)));
        for (param, value) in resolved.formal_params.iter().zip(args) {
            closure.insert(param.clone(), value);
        }
        resolved.body.execute(&mut closure, context)
    }
}

/// A user-defined method: name, positional formal parameters and an owned
/// body. The parser wraps every body in `Statement::MethodBody` so that
/// `return` is caught at the right frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Method {
    pub name: String,
    pub formal_params: Vec<String>,
    pub body: Statement,
}

/// A user-defined class, immutable once constructed. Method resolution
/// finds the first name match on the single-parent chain; arity is checked
/// afterwards by the caller, so a same-name method on a subclass shadows
/// its parent even when the arity differs.
#[derive(Debug, Clone, PartialEq)]
pub struct Class {
    name: String,
    methods: HashMap<String, Method>,
    parent: Option<Rc<Class>>,
}

impl Class {
    pub fn new(name: String, methods: Vec<Method>, parent: Option<Rc<Class>>) -> Self {
        let methods = methods
            .into_iter()
            .map(|method| (method.name.clone(), method))
            .collect();
        Self {
            name,
            methods,
            parent,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// First method with this name on the chain, regardless of arity.
    pub fn find_method(&self, name: &str) -> Option<&Method> {
        if let Some(method) = self.methods.get(name) {
            return Some(method);
        }
        self.parent
            .as_deref()
            .and_then(|parent| parent.find_method(name))
    }
}

/// Instance of a user-defined class. Fields are created lazily on first
/// assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassInstance {
    class: Rc<Class>,
    fields: Closure,
}

impl ClassInstance {
    pub fn new(class: Rc<Class>) -> Self {
        Self {
            class,
            fields: Closure::new(),
        }
    }

    pub fn class(&self) -> &Rc<Class> {
        &self.class
    }

    pub fn fields(&self) -> &Closure {
        &self.fields
    }

    pub fn fields_mut(&mut self) -> &mut Closure {
        &mut self.fields
    }

    pub fn has_method(&self, method: &str, arity: usize) -> bool {
        self.class
            .find_method(method)
            .is_some_and(|m| m.formal_params.len() == arity)
    }
}

/// `==`: `None` equals `None`, same-case primitives compare by payload, and
/// an instance on the left delegates to an arity-1 `__eq__`.
pub fn equal(lhs: &Value, rhs: &Value, context: &mut dyn Context) -> ExecResult<bool> {
    match (lhs, rhs) {
        (Value::None, Value::None) => Ok(true),
        (Value::Number(l), Value::Number(r)) => Ok(l == r),
        (Value::String(l), Value::String(r)) => Ok(l == r),
        (Value::Bool(l), Value::Bool(r)) => Ok(l == r),
        (Value::Instance(instance), _) if instance.borrow().has_method("__eq__", 1) => {
            let verdict = lhs.call_method("__eq__", vec![rhs.clone()], context)?;
            Ok(verdict.is_truthy())
        }
        _ => Err(RuntimeError::CannotCompare {
            lhs: lhs.type_name().to_string(),
            rhs: rhs.type_name().to_string(),
        }
        .into()),
    }
}

/// `<`: same-case primitives order by payload (`False < True` for bools),
/// and an instance on the left delegates to an arity-1 `__lt__`. There is
/// no `None` ordering.
pub fn less(lhs: &Value, rhs: &Value, context: &mut dyn Context) -> ExecResult<bool> {
    match (lhs, rhs) {
        (Value::Number(l), Value::Number(r)) => Ok(l < r),
        (Value::String(l), Value::String(r)) => Ok(l < r),
        (Value::Bool(l), Value::Bool(r)) => Ok(l < r),
        (Value::Instance(instance), _) if instance.borrow().has_method("__lt__", 1) => {
            let verdict = lhs.call_method("__lt__", vec![rhs.clone()], context)?;
            Ok(verdict.is_truthy())
        }
        _ => Err(RuntimeError::CannotCompare {
            lhs: lhs.type_name().to_string(),
            rhs: rhs.type_name().to_string(),
        }
        .into()),
    }
}

pub fn not_equal(lhs: &Value, rhs: &Value, context: &mut dyn Context) -> ExecResult<bool> {
    Ok(!equal(lhs, rhs, context)?)
}

pub fn greater(lhs: &Value, rhs: &Value, context: &mut dyn Context) -> ExecResult<bool> {
    Ok(!less(lhs, rhs, context)? && !equal(lhs, rhs, context)?)
}

pub fn less_or_equal(lhs: &Value, rhs: &Value, context: &mut dyn Context) -> ExecResult<bool> {
    Ok(!greater(lhs, rhs, context)?)
}

pub fn greater_or_equal(lhs: &Value, rhs: &Value, context: &mut dyn Context) -> ExecResult<bool> {
    Ok(!less(lhs, rhs, context)?)
}
