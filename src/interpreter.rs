//! Tree-walking executor.
//!
//! Every node evaluates to a value against a caller-supplied [`Closure`] and
//! [`Context`]. `return` and runtime failures travel the same `Result` error
//! channel as an [`Interrupt`]; composite nodes forward interrupts with `?`
//! and only [`Statement::MethodBody`] turns a `Return` back into a value.

use std::cell::RefCell;
use std::io::Write as _;
use std::rc::Rc;

use crate::ast::{Comparator, Statement, VariablePath};
use crate::runtime::{
    self, ClassInstance, Closure, Context, ExecResult, Interrupt, RuntimeError, Value,
};

impl Statement {
    pub fn execute(&self, closure: &mut Closure, context: &mut dyn Context) -> ExecResult<Value> {
        match self {
            Statement::Constant(value) => Ok(value.clone()),

            Statement::Assignment { var, rv } => {
                let value = rv.execute(closure, context)?;
                closure.insert(var.clone(), value.clone());
                Ok(value)
            }

            Statement::VariableValue(path) => resolve_path(path, closure),

            Statement::Print { args } => {
                let mut rendered = Vec::with_capacity(args.len());
                for arg in args {
                    let value = arg.execute(closure, context)?;
                    rendered.push(value.to_output(context)?);
                }
                let line = rendered.join(" ");
                writeln!(context.output(), "{line}").map_err(|error| RuntimeError::Output {
                    message: error.to_string(),
                })?;
                Ok(Value::None)
            }

            Statement::MethodCall {
                object,
                method,
                args,
            } => {
                let receiver = object.execute(closure, context)?;
                if !matches!(receiver, Value::Instance(_)) {
                    return Err(RuntimeError::MethodCallOnNonInstance {
                        method: method.clone(),
                        type_name: receiver.type_name().to_string(),
                    }
                    .into());
                }
                let mut evaluated = Vec::with_capacity(args.len());
                for arg in args {
                    evaluated.push(arg.execute(closure, context)?);
                }
                receiver.call_method(method, evaluated, context)
            }

            Statement::Stringify { argument } => {
                let value = argument.execute(closure, context)?;
                Ok(Value::String(value.to_output(context)?))
            }

            Statement::Add { lhs, rhs } => {
                let lhs_value = lhs.execute(closure, context)?;
                let rhs_value = rhs.execute(closure, context)?;
                match (&lhs_value, &rhs_value) {
                    (Value::Number(l), Value::Number(r)) => Ok(Value::Number(l + r)),
                    (Value::String(l), Value::String(r)) => Ok(Value::String(format!("{l}{r}"))),
                    (Value::Instance(_), _) => {
                        lhs_value.call_method("__add__", vec![rhs_value.clone()], context)
                    }
                    _ => Err(invalid_operands("add", &lhs_value, &rhs_value)),
                }
            }

            Statement::Sub { lhs, rhs } => {
                let lhs_value = lhs.execute(closure, context)?;
                let rhs_value = rhs.execute(closure, context)?;
                match (&lhs_value, &rhs_value) {
                    (Value::Number(l), Value::Number(r)) => Ok(Value::Number(l - r)),
                    _ => Err(invalid_operands("subtract", &lhs_value, &rhs_value)),
                }
            }

            Statement::Mult { lhs, rhs } => {
                let lhs_value = lhs.execute(closure, context)?;
                let rhs_value = rhs.execute(closure, context)?;
                match (&lhs_value, &rhs_value) {
                    (Value::Number(l), Value::Number(r)) => Ok(Value::Number(l * r)),
                    _ => Err(invalid_operands("multiply", &lhs_value, &rhs_value)),
                }
            }

            Statement::Div { lhs, rhs } => {
                let lhs_value = lhs.execute(closure, context)?;
                let rhs_value = rhs.execute(closure, context)?;
                match (&lhs_value, &rhs_value) {
                    (Value::Number(_), Value::Number(0)) => Err(RuntimeError::DivisionByZero.into()),
                    (Value::Number(l), Value::Number(r)) => Ok(Value::Number(l / r)),
                    _ => Err(invalid_operands("divide", &lhs_value, &rhs_value)),
                }
            }

            Statement::Compound { statements } => {
                for statement in statements {
                    statement.execute(closure, context)?;
                }
                Ok(Value::None)
            }

            Statement::Return { statement } => {
                let value = statement.execute(closure, context)?;
                Err(Interrupt::Return(value))
            }

            Statement::ClassDefinition { class } => {
                let value = Value::Class(Rc::clone(class));
                closure.insert(class.name().to_string(), value.clone());
                Ok(value)
            }

            Statement::FieldAssignment {
                object,
                field_name,
                rv,
            } => {
                let target = resolve_path(object, closure)?;
                let Value::Instance(instance) = target else {
                    return Ok(Value::None);
                };
                let value = rv.execute(closure, context)?;
                instance
                    .borrow_mut()
                    .fields_mut()
                    .insert(field_name.clone(), value.clone());
                Ok(value)
            }

            Statement::IfElse {
                condition,
                if_body,
                else_body,
            } => {
                if condition.execute(closure, context)?.is_truthy() {
                    if_body.execute(closure, context)
                } else if let Some(else_body) = else_body {
                    else_body.execute(closure, context)
                } else {
                    Ok(Value::None)
                }
            }

            // `and`/`or` run both operands unconditionally in this dialect.
            Statement::Or { lhs, rhs } => {
                let lhs_true = lhs.execute(closure, context)?.is_truthy();
                let rhs_true = rhs.execute(closure, context)?.is_truthy();
                Ok(Value::Bool(lhs_true || rhs_true))
            }

            Statement::And { lhs, rhs } => {
                let lhs_true = lhs.execute(closure, context)?.is_truthy();
                let rhs_true = rhs.execute(closure, context)?.is_truthy();
                Ok(Value::Bool(lhs_true && rhs_true))
            }

            Statement::Not { argument } => {
                let truthy = argument.execute(closure, context)?.is_truthy();
                Ok(Value::Bool(!truthy))
            }

            Statement::Comparison {
                comparator,
                lhs,
                rhs,
            } => {
                let lhs_value = lhs.execute(closure, context)?;
                let rhs_value = rhs.execute(closure, context)?;
                let verdict = match comparator {
                    Comparator::Equal => runtime::equal(&lhs_value, &rhs_value, context)?,
                    Comparator::NotEqual => runtime::not_equal(&lhs_value, &rhs_value, context)?,
                    Comparator::Less => runtime::less(&lhs_value, &rhs_value, context)?,
                    Comparator::Greater => runtime::greater(&lhs_value, &rhs_value, context)?,
                    Comparator::LessOrEqual => {
                        runtime::less_or_equal(&lhs_value, &rhs_value, context)?
                    }
                    Comparator::GreaterOrEqual => {
                        runtime::greater_or_equal(&lhs_value, &rhs_value, context)?
                    }
                };
                Ok(Value::Bool(verdict))
            }

            Statement::NewInstance { class, args } => {
                let instance = Value::Instance(Rc::new(RefCell::new(ClassInstance::new(
                    Rc::clone(class),
                ))));
                let constructible = class
                    .find_method("__init__")
                    .is_some_and(|m| m.formal_params.len() == args.len());
                if constructible {
                    let mut evaluated = Vec::with_capacity(args.len());
                    for arg in args {
                        evaluated.push(arg.execute(closure, context)?);
                    }
                    instance.call_method("__init__", evaluated, context)?;
                }
                Ok(instance)
            }

            Statement::MethodBody { body } => match body.execute(closure, context) {
                Ok(_) => Ok(Value::None),
                Err(Interrupt::Return(value)) => Ok(value),
                Err(failure) => Err(failure),
            },
        }
    }
}

/// Runs a whole program the way the driver does: a fresh closure, and a
/// stray `return` surfaced as an error instead of an interrupt.
pub fn run_program(root: &Statement, context: &mut dyn Context) -> Result<Value, RuntimeError> {
    let mut closure = Closure::new();
    match root.execute(&mut closure, context) {
        Ok(value) => Ok(value),
        Err(Interrupt::Failure(error)) => Err(error),
        Err(Interrupt::Return(_)) => Err(RuntimeError::ReturnOutsideMethod),
    }
}

fn invalid_operands(operation: &'static str, lhs: &Value, rhs: &Value) -> Interrupt {
    RuntimeError::InvalidOperands {
        operation,
        lhs: lhs.type_name().to_string(),
        rhs: rhs.type_name().to_string(),
    }
    .into()
}

fn resolve_path(path: &VariablePath, closure: &Closure) -> ExecResult<Value> {
    let mut value = closure
        .get(&path.var_name)
        .cloned()
        .ok_or_else(|| RuntimeError::UndefinedVariable {
            name: path.var_name.clone(),
        })?;
    for field in &path.dotted_ids {
        let type_name = value.type_name();
        let Value::Instance(instance) = value else {
            return Err(RuntimeError::FieldAccessOnNonInstance {
                field: field.clone(),
                type_name: type_name.to_string(),
            }
            .into());
        };
        value = instance
            .borrow()
            .fields()
            .get(field)
            .cloned()
            .ok_or_else(|| RuntimeError::UndefinedField {
                field: field.clone(),
            })?;
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{CapturedContext, Class, Method};

    fn number(value: i64) -> Statement {
        Statement::Constant(Value::Number(value))
    }

    fn string(text: &str) -> Statement {
        Statement::Constant(Value::String(text.to_string()))
    }

    fn assign(var: &str, rv: Statement) -> Statement {
        Statement::Assignment {
            var: var.to_string(),
            rv: Box::new(rv),
        }
    }

    fn method(name: &str, formal_params: &[&str], body: Statement) -> Method {
        Method {
            name: name.to_string(),
            formal_params: formal_params.iter().map(|p| p.to_string()).collect(),
            body: Statement::MethodBody { body: Box::new(body) },
        }
    }

    fn run(statement: &Statement) -> (ExecResult<Value>, Closure, String) {
        let mut closure = Closure::new();
        let mut context = CapturedContext::new();
        let result = statement.execute(&mut closure, &mut context);
        let output = context.text();
        (result, closure, output)
    }

    #[test]
    fn assignment_stores_and_yields_the_value() {
        let (result, closure, _) = run(&assign("x", number(5)));
        assert_eq!(result.expect("execute"), Value::Number(5));
        assert_eq!(closure.get("x"), Some(&Value::Number(5)));
    }

    #[test]
    fn unknown_variable_reports_its_name() {
        let (result, _, _) = run(&Statement::variable("ghost"));
        let err = result.expect_err("must fail");
        let Interrupt::Failure(err) = err else {
            panic!("expected failure, got {err:?}");
        };
        assert_eq!(err.to_string(), "Variable 'ghost' is not found");
    }

    #[test]
    fn dotted_lookup_reads_instance_fields() {
        let class = Rc::new(Class::new("Box".to_string(), Vec::new(), None));
        let program = Statement::Compound {
            statements: vec![
                assign(
                    "b",
                    Statement::NewInstance {
                        class,
                        args: Vec::new(),
                    },
                ),
                Statement::FieldAssignment {
                    object: VariablePath::new("b"),
                    field_name: "inner".to_string(),
                    rv: Box::new(number(3)),
                },
                assign(
                    "got",
                    Statement::VariableValue(VariablePath::dotted("b", &["inner"])),
                ),
            ],
        };
        let (result, closure, _) = run(&program);
        result.expect("execute");
        assert_eq!(closure.get("got"), Some(&Value::Number(3)));
    }

    #[test]
    fn dotted_lookup_through_a_primitive_fails() {
        let program = Statement::Compound {
            statements: vec![
                assign("x", number(1)),
                Statement::VariableValue(VariablePath::dotted("x", &["field"])),
            ],
        };
        let (result, _, _) = run(&program);
        assert_eq!(
            result.expect_err("must fail"),
            Interrupt::Failure(RuntimeError::FieldAccessOnNonInstance {
                field: "field".to_string(),
                type_name: "int".to_string(),
            })
        );
    }

    #[test]
    fn print_joins_with_spaces_and_renders_none() {
        let program = Statement::Print {
            args: vec![number(1), string("two"), Statement::Constant(Value::None)],
        };
        let (result, _, output) = run(&program);
        assert_eq!(result.expect("execute"), Value::None);
        assert_eq!(output, "1 two None\n");
    }

    #[test]
    fn stringify_renders_any_value() {
        let (result, _, _) = run(&Statement::Stringify {
            argument: Box::new(number(12)),
        });
        assert_eq!(result.expect("execute"), Value::String("12".to_string()));

        let (result, _, _) = run(&Statement::Stringify {
            argument: Box::new(Statement::Constant(Value::None)),
        });
        assert_eq!(result.expect("execute"), Value::String("None".to_string()));
    }

    #[test]
    fn add_sums_numbers_and_concatenates_strings() {
        let (result, _, _) = run(&Statement::Add {
            lhs: Box::new(number(2)),
            rhs: Box::new(number(3)),
        });
        assert_eq!(result.expect("execute"), Value::Number(5));

        let (result, _, _) = run(&Statement::Add {
            lhs: Box::new(string("hi ")),
            rhs: Box::new(string("there")),
        });
        assert_eq!(
            result.expect("execute"),
            Value::String("hi there".to_string())
        );
    }

    #[test]
    fn add_dispatches_to_dunder_add_on_instances() {
        let class = Rc::new(Class::new(
            "Seven".to_string(),
            vec![method(
                "__add__",
                &["other"],
                Statement::Return {
                    statement: Box::new(Statement::Add {
                        lhs: Box::new(number(7)),
                        rhs: Box::new(Statement::variable("other")),
                    }),
                },
            )],
            None,
        ));
        let program = Statement::Add {
            lhs: Box::new(Statement::NewInstance {
                class,
                args: Vec::new(),
            }),
            rhs: Box::new(number(1)),
        };
        let (result, _, _) = run(&program);
        assert_eq!(result.expect("execute"), Value::Number(8));
    }

    #[test]
    fn add_rejects_mixed_operands() {
        let (result, _, _) = run(&Statement::Add {
            lhs: Box::new(number(1)),
            rhs: Box::new(string("x")),
        });
        assert_eq!(
            result.expect_err("must fail"),
            Interrupt::Failure(RuntimeError::InvalidOperands {
                operation: "add",
                lhs: "int".to_string(),
                rhs: "str".to_string(),
            })
        );
    }

    #[test]
    fn arithmetic_is_numeric_only() {
        let (result, _, _) = run(&Statement::Sub {
            lhs: Box::new(number(5)),
            rhs: Box::new(number(2)),
        });
        assert_eq!(result.expect("execute"), Value::Number(3));

        let (result, _, _) = run(&Statement::Mult {
            lhs: Box::new(number(4)),
            rhs: Box::new(number(6)),
        });
        assert_eq!(result.expect("execute"), Value::Number(24));

        let (result, _, _) = run(&Statement::Div {
            lhs: Box::new(number(9)),
            rhs: Box::new(number(3)),
        });
        assert_eq!(result.expect("execute"), Value::Number(3));

        let (result, _, _) = run(&Statement::Mult {
            lhs: Box::new(string("no")),
            rhs: Box::new(number(3)),
        });
        assert!(result.is_err());
    }

    #[test]
    fn division_by_zero_is_an_error() {
        let (result, _, _) = run(&Statement::Div {
            lhs: Box::new(number(1)),
            rhs: Box::new(number(0)),
        });
        assert_eq!(
            result.expect_err("must fail"),
            Interrupt::Failure(RuntimeError::DivisionByZero)
        );
    }

    #[test]
    fn compound_runs_in_order_and_yields_none() {
        let program = Statement::Compound {
            statements: vec![assign("x", number(1)), assign("y", Statement::variable("x"))],
        };
        let (result, closure, _) = run(&program);
        assert_eq!(result.expect("execute"), Value::None);
        assert_eq!(closure.get("y"), Some(&Value::Number(1)));
    }

    #[test]
    fn return_unwinds_through_nested_blocks() {
        let body = Statement::Compound {
            statements: vec![
                Statement::IfElse {
                    condition: Box::new(number(1)),
                    if_body: Box::new(Statement::Compound {
                        statements: vec![Statement::Return {
                            statement: Box::new(number(42)),
                        }],
                    }),
                    else_body: None,
                },
                assign("after", number(1)),
            ],
        };
        let program = Statement::MethodBody {
            body: Box::new(body),
        };
        let (result, closure, _) = run(&program);
        assert_eq!(result.expect("execute"), Value::Number(42));
        assert!(!closure.contains_key("after"));
    }

    #[test]
    fn method_body_without_return_yields_none() {
        let program = Statement::MethodBody {
            body: Box::new(assign("x", number(1))),
        };
        let (result, _, _) = run(&program);
        assert_eq!(result.expect("execute"), Value::None);
    }

    #[test]
    fn uncaught_return_surfaces_as_an_interrupt() {
        let program = Statement::Return {
            statement: Box::new(number(7)),
        };
        let (result, _, _) = run(&program);
        assert_eq!(
            result.expect_err("must interrupt"),
            Interrupt::Return(Value::Number(7))
        );

        let mut context = CapturedContext::new();
        assert_eq!(
            run_program(&program, &mut context).expect_err("must fail"),
            RuntimeError::ReturnOutsideMethod
        );
    }

    #[test]
    fn class_definition_binds_the_class_by_name() {
        let class = Rc::new(Class::new("Point".to_string(), Vec::new(), None));
        let (result, closure, _) = run(&Statement::ClassDefinition {
            class: Rc::clone(&class),
        });
        assert_eq!(result.expect("execute"), Value::Class(Rc::clone(&class)));
        assert!(matches!(closure.get("Point"), Some(Value::Class(_))));
    }

    #[test]
    fn field_assignment_on_a_primitive_is_a_silent_none() {
        let program = Statement::Compound {
            statements: vec![
                assign("x", number(1)),
                assign(
                    "result",
                    Statement::FieldAssignment {
                        object: VariablePath::new("x"),
                        field_name: "field".to_string(),
                        rv: Box::new(number(2)),
                    },
                ),
            ],
        };
        let (result, closure, _) = run(&program);
        result.expect("execute");
        assert_eq!(closure.get("result"), Some(&Value::None));
    }

    #[test]
    fn if_else_selects_by_truthiness() {
        let branch = |condition: Statement| Statement::IfElse {
            condition: Box::new(condition),
            if_body: Box::new(string("then")),
            else_body: Some(Box::new(string("else"))),
        };
        let (result, _, _) = run(&branch(number(1)));
        assert_eq!(result.expect("execute"), Value::String("then".to_string()));
        let (result, _, _) = run(&branch(string("")));
        assert_eq!(result.expect("execute"), Value::String("else".to_string()));

        let no_else = Statement::IfElse {
            condition: Box::new(number(0)),
            if_body: Box::new(string("then")),
            else_body: None,
        };
        let (result, _, _) = run(&no_else);
        assert_eq!(result.expect("execute"), Value::None);
    }

    #[test]
    fn and_and_or_always_evaluate_both_sides() {
        let program = Statement::And {
            lhs: Box::new(number(0)),
            rhs: Box::new(assign("hit", number(1))),
        };
        let (result, closure, _) = run(&program);
        assert_eq!(result.expect("execute"), Value::Bool(false));
        assert_eq!(closure.get("hit"), Some(&Value::Number(1)));

        let program = Statement::Or {
            lhs: Box::new(number(1)),
            rhs: Box::new(assign("hit", number(1))),
        };
        let (result, closure, _) = run(&program);
        assert_eq!(result.expect("execute"), Value::Bool(true));
        assert_eq!(closure.get("hit"), Some(&Value::Number(1)));
    }

    #[test]
    fn not_negates_truthiness() {
        let (result, _, _) = run(&Statement::Not {
            argument: Box::new(string("")),
        });
        assert_eq!(result.expect("execute"), Value::Bool(true));
    }

    #[test]
    fn comparisons_box_their_verdict() {
        let compare = |comparator, l: i64, r: i64| Statement::Comparison {
            comparator,
            lhs: Box::new(number(l)),
            rhs: Box::new(number(r)),
        };
        let cases = [
            (Comparator::Equal, 2, 2, true),
            (Comparator::NotEqual, 2, 3, true),
            (Comparator::Less, 2, 3, true),
            (Comparator::Greater, 2, 3, false),
            (Comparator::LessOrEqual, 3, 3, true),
            (Comparator::GreaterOrEqual, 2, 3, false),
        ];
        for (comparator, l, r, expected) in cases {
            let (result, _, _) = run(&compare(comparator, l, r));
            assert_eq!(result.expect("execute"), Value::Bool(expected), "{comparator:?}");
        }
    }

    #[test]
    fn new_instance_is_fresh_on_every_execution() {
        let class = Rc::new(Class::new("Cell".to_string(), Vec::new(), None));
        let node = Statement::NewInstance {
            class,
            args: Vec::new(),
        };
        let mut closure = Closure::new();
        let mut context = CapturedContext::new();
        let first = node.execute(&mut closure, &mut context).expect("execute");
        let second = node.execute(&mut closure, &mut context).expect("execute");
        let (Value::Instance(first), Value::Instance(second)) = (&first, &second) else {
            panic!("expected instances");
        };
        assert!(!Rc::ptr_eq(first, second));
    }

    #[test]
    fn new_instance_runs_a_matching_init() {
        let class = Rc::new(Class::new(
            "Pair".to_string(),
            vec![method(
                "__init__",
                &["a", "b"],
                Statement::Compound {
                    statements: vec![
                        Statement::FieldAssignment {
                            object: VariablePath::new("self"),
                            field_name: "a".to_string(),
                            rv: Box::new(Statement::variable("a")),
                        },
                        Statement::FieldAssignment {
                            object: VariablePath::new("self"),
                            field_name: "b".to_string(),
                            rv: Box::new(Statement::variable("b")),
                        },
                    ],
                },
            )],
            None,
        ));
        let node = Statement::NewInstance {
            class,
            args: vec![number(1), number(2)],
        };
        let (result, _, _) = run(&node);
        let Value::Instance(instance) = result.expect("execute") else {
            panic!("expected instance");
        };
        assert_eq!(instance.borrow().fields().get("a"), Some(&Value::Number(1)));
        assert_eq!(instance.borrow().fields().get("b"), Some(&Value::Number(2)));
    }

    #[test]
    fn new_instance_skips_arguments_without_a_matching_init() {
        // No two-argument __init__ exists, so the argument list is not even
        // evaluated.
        let class = Rc::new(Class::new("Bare".to_string(), Vec::new(), None));
        let node = Statement::NewInstance {
            class,
            args: vec![assign("hit", number(1)), number(2)],
        };
        let (result, closure, _) = run(&node);
        assert!(matches!(result.expect("execute"), Value::Instance(_)));
        assert!(!closure.contains_key("hit"));
    }

    #[test]
    fn method_call_on_a_primitive_is_an_explicit_error() {
        let program = Statement::MethodCall {
            object: Box::new(number(3)),
            method: "frob".to_string(),
            args: vec![assign("hit", number(1))],
        };
        let (result, closure, _) = run(&program);
        assert_eq!(
            result.expect_err("must fail"),
            Interrupt::Failure(RuntimeError::MethodCallOnNonInstance {
                method: "frob".to_string(),
                type_name: "int".to_string(),
            })
        );
        // The receiver check precedes argument evaluation.
        assert!(!closure.contains_key("hit"));
    }
}
