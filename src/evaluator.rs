use crate::error::EvaluationError;
use crate::expression::{BinaryOp, Expr, Expression, UnaryOp};
use crate::functions::FunctionName;
use crate::value::Value;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Where a bound name gets its value from for one row.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Binding<'a> {
    /// A raw field of the row.
    Field(&'a Value),
    /// Another calculation's cached result. `None` is the failure marker.
    Computed(Option<&'a Value>),
}

/// Variable bindings for a single row.
///
/// Computed columns shadow raw fields of the same name; a shadowed field is
/// never used as a fallback.
#[derive(Clone, Debug, Default)]
pub struct RowContext<'a> {
    bindings: HashMap<&'a str, Binding<'a>>,
}

impl<'a> RowContext<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        RowContext {
            bindings: HashMap::with_capacity(capacity),
        }
    }

    pub fn bind_field(&mut self, name: &'a str, value: &'a Value) {
        if let Some(Binding::Computed(_)) = self.bindings.get(name) {
            return;
        }
        self.bindings.insert(name, Binding::Field(value));
    }

    pub fn bind_computed(&mut self, name: &'a str, value: Option<&'a Value>) {
        self.bindings.insert(name, Binding::Computed(value));
    }

    pub fn lookup(&self, name: &str) -> Option<Binding<'a>> {
        self.bindings.get(name).copied()
    }
}

/// Evaluates expressions against one row's bindings.
pub struct Evaluator<'c, 'a> {
    context: &'c RowContext<'a>,
}

impl<'c, 'a> Evaluator<'c, 'a> {
    pub fn new(context: &'c RowContext<'a>) -> Self {
        Evaluator { context }
    }

    pub fn evaluate(&self, expression: &Expression) -> Result<Value, EvaluationError> {
        self.eval(expression.ast())
    }

    fn eval(&self, node: &Expr) -> Result<Value, EvaluationError> {
        match node {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Variable(name) => self.resolve(name),
            Expr::Unary { op, operand } => {
                let value = self.eval(operand)?;
                Ok(match op {
                    UnaryOp::Negate => Value::Number(-value.to_number()),
                    UnaryOp::Not => Value::Boolean(!value.is_truthy()),
                })
            }
            Expr::Binary { op, left, right } => self.eval_binary(*op, left, right),
            Expr::Call { name, args } => self.eval_call(name, args),
        }
    }

    fn resolve(&self, name: &str) -> Result<Value, EvaluationError> {
        match self.context.lookup(name) {
            Some(Binding::Field(value)) => Ok(value.clone()),
            Some(Binding::Computed(Some(value))) => Ok(value.clone()),
            Some(Binding::Computed(None)) => Err(EvaluationError::MissingResult(name.to_string())),
            None => Err(EvaluationError::UnknownVariable(name.to_string())),
        }
    }

    fn eval_binary(&self, op: BinaryOp, left: &Expr, right: &Expr) -> Result<Value, EvaluationError> {
        // Short-circuit before touching the right operand.
        match op {
            BinaryOp::And => {
                let truthy = self.eval(left)?.is_truthy() && self.eval(right)?.is_truthy();
                return Ok(Value::Boolean(truthy));
            }
            BinaryOp::Or => {
                let truthy = self.eval(left)?.is_truthy() || self.eval(right)?.is_truthy();
                return Ok(Value::Boolean(truthy));
            }
            _ => {}
        }

        let lhs = self.eval(left)?;
        let rhs = self.eval(right)?;
        let value = match op {
            BinaryOp::Add => {
                if lhs.is_non_numeric_text() || rhs.is_non_numeric_text() {
                    Value::Text(format!("{}{}", lhs.to_text(), rhs.to_text()))
                } else {
                    Value::Number(lhs.to_number() + rhs.to_number())
                }
            }
            BinaryOp::Subtract => Value::Number(lhs.to_number() - rhs.to_number()),
            BinaryOp::Multiply => Value::Number(lhs.to_number() * rhs.to_number()),
            BinaryOp::Divide => Value::Number(lhs.to_number() / rhs.to_number()),
            BinaryOp::Modulo => Value::Number(lhs.to_number() % rhs.to_number()),
            BinaryOp::Power => Value::Number(lhs.to_number().powf(rhs.to_number())),
            BinaryOp::Equal => Value::Boolean(lhs.loose_eq(&rhs)),
            BinaryOp::NotEqual => Value::Boolean(!lhs.loose_eq(&rhs)),
            BinaryOp::Less => compare(&lhs, &rhs, |o| o == Ordering::Less),
            BinaryOp::LessEqual => compare(&lhs, &rhs, |o| o != Ordering::Greater),
            BinaryOp::Greater => compare(&lhs, &rhs, |o| o == Ordering::Greater),
            BinaryOp::GreaterEqual => compare(&lhs, &rhs, |o| o != Ordering::Less),
            BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
        };
        Ok(value)
    }

    fn eval_call(&self, name: &str, args: &[Expr]) -> Result<Value, EvaluationError> {
        let function = FunctionName::from_name(name)
            .ok_or_else(|| EvaluationError::UnknownFunction(name.to_string()))?;
        function.check_arity(args.len())?;

        if function == FunctionName::If {
            let condition = self.eval(&args[0])?;
            return self.eval(&args[FunctionName::if_branch(&condition)]);
        }

        let values = args
            .iter()
            .map(|arg| self.eval(arg))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(function.call(&values))
    }
}

fn compare(lhs: &Value, rhs: &Value, accept: fn(Ordering) -> bool) -> Value {
    Value::Boolean(lhs.loose_cmp(rhs).is_some_and(accept))
}
