use std::rc::Rc;

use crate::runtime::{Class, Value};

/// Which comparison primitive a [`Statement::Comparison`] applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Equal,
    NotEqual,
    Less,
    Greater,
    LessOrEqual,
    GreaterOrEqual,
}

/// A dotted access path: the root is looked up in the closure, every
/// trailing id in the fields of the instance reached so far.
#[derive(Debug, Clone, PartialEq)]
pub struct VariablePath {
    pub var_name: String,
    pub dotted_ids: Vec<String>,
}

impl VariablePath {
    pub fn new(var_name: &str) -> Self {
        Self {
            var_name: var_name.to_string(),
            dotted_ids: Vec::new(),
        }
    }

    pub fn dotted(var_name: &str, dotted_ids: &[&str]) -> Self {
        Self {
            var_name: var_name.to_string(),
            dotted_ids: dotted_ids.iter().map(|id| id.to_string()).collect(),
        }
    }
}

/// AST node. Every variant evaluates to a value; see `Statement::execute`
/// for the per-node contract. The surface parser owns node construction and
/// wraps every method body in [`Statement::MethodBody`].
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// Literal leaf.
    Constant(Value),
    /// Binds the evaluated right-hand side in the closure; yields it.
    Assignment { var: String, rv: Box<Statement> },
    /// Reads a variable or a dotted field chain.
    VariableValue(VariablePath),
    /// Writes each argument through the context stream, space-separated and
    /// newline-terminated.
    Print { args: Vec<Statement> },
    MethodCall {
        object: Box<Statement>,
        method: String,
        args: Vec<Statement>,
    },
    /// `str(x)`: renders the argument into a fresh string value.
    Stringify { argument: Box<Statement> },
    /// Numeric sum, string concatenation, or `__add__` dispatch.
    Add {
        lhs: Box<Statement>,
        rhs: Box<Statement>,
    },
    Sub {
        lhs: Box<Statement>,
        rhs: Box<Statement>,
    },
    Mult {
        lhs: Box<Statement>,
        rhs: Box<Statement>,
    },
    Div {
        lhs: Box<Statement>,
        rhs: Box<Statement>,
    },
    /// Statement sequence; yields `None`.
    Compound { statements: Vec<Statement> },
    /// Non-local transfer to the enclosing [`Statement::MethodBody`].
    Return { statement: Box<Statement> },
    /// Binds the class under its own name in the current closure.
    ClassDefinition { class: Rc<Class> },
    /// `path.field = rv` on a class instance.
    FieldAssignment {
        object: VariablePath,
        field_name: String,
        rv: Box<Statement>,
    },
    IfElse {
        condition: Box<Statement>,
        if_body: Box<Statement>,
        else_body: Option<Box<Statement>>,
    },
    /// Logical disjunction; both sides always run.
    Or {
        lhs: Box<Statement>,
        rhs: Box<Statement>,
    },
    /// Logical conjunction; both sides always run.
    And {
        lhs: Box<Statement>,
        rhs: Box<Statement>,
    },
    Not { argument: Box<Statement> },
    Comparison {
        comparator: Comparator,
        lhs: Box<Statement>,
        rhs: Box<Statement>,
    },
    /// Materializes a fresh instance, running a matching-arity `__init__`
    /// when the class chain provides one.
    NewInstance {
        class: Rc<Class>,
        args: Vec<Statement>,
    },
    /// Catch point for `return`; the outermost node of every method body.
    MethodBody { body: Box<Statement> },
}

impl Statement {
    /// Shorthand for reading a plain variable.
    pub fn variable(name: &str) -> Statement {
        Statement::VariableValue(VariablePath::new(name))
    }

    /// Shorthand for `print <name>`.
    pub fn print_variable(name: &str) -> Statement {
        Statement::Print {
            args: vec![Statement::variable(name)],
        }
    }
}
