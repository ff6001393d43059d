//! Pure functions computing deterministic node values from their parents.

use crate::value::Value;
use dm_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Function of a deterministic node. Arguments are the parent values in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Function {
    /// `a + b`, element-wise with scalar broadcasting.
    Add,
    /// `a - b`
    Sub,
    /// `a * b`
    Mul,
    /// `a / b`
    Div,
    /// `exp(a)`
    Exp,
    /// `ln(a)`
    Ln,
    /// `sqrt(a)`
    Sqrt,
    /// `-a`
    Neg,
    /// Sum of all elements.
    Sum,
    /// Mean of all elements.
    Mean,
}

impl Function {
    /// Name used in messages and configuration.
    pub fn name(&self) -> &'static str {
        match self {
            Function::Add => "add",
            Function::Sub => "sub",
            Function::Mul => "mul",
            Function::Div => "div",
            Function::Exp => "exp",
            Function::Ln => "ln",
            Function::Sqrt => "sqrt",
            Function::Neg => "neg",
            Function::Sum => "sum",
            Function::Mean => "mean",
        }
    }

    /// Number of arguments.
    pub fn arity(&self) -> usize {
        match self {
            Function::Add | Function::Sub | Function::Mul | Function::Div => 2,
            _ => 1,
        }
    }

    /// Evaluate on the given arguments.
    pub fn evaluate(&self, args: &[&Value]) -> Result<Value> {
        if args.len() != self.arity() {
            return Err(Error::Validation(format!(
                "function '{}' takes {} argument(s), got {}",
                self.name(),
                self.arity(),
                args.len()
            )));
        }
        match self {
            Function::Add => binary(args[0], args[1], |a, b| a + b),
            Function::Sub => binary(args[0], args[1], |a, b| a - b),
            Function::Mul => binary(args[0], args[1], |a, b| a * b),
            Function::Div => binary(args[0], args[1], |a, b| a / b),
            Function::Exp => Ok(unary(args[0], f64::exp)),
            Function::Ln => Ok(unary(args[0], f64::ln)),
            Function::Sqrt => Ok(unary(args[0], f64::sqrt)),
            Function::Neg => Ok(unary(args[0], |x| -x)),
            Function::Sum => Ok(Value::Real(args[0].elements().iter().sum())),
            Function::Mean => {
                let xs = args[0].elements();
                if xs.is_empty() {
                    return Err(Error::Validation("mean of an empty vector".into()));
                }
                Ok(Value::Real(xs.iter().sum::<f64>() / xs.len() as f64))
            }
        }
    }
}

fn unary(a: &Value, f: impl Fn(f64) -> f64) -> Value {
    a.with_shape_of(a.elements().iter().map(|&x| f(x)).collect())
}

fn binary(a: &Value, b: &Value, f: impl Fn(f64, f64) -> f64) -> Result<Value> {
    match (a, b) {
        (Value::Real(x), Value::Real(y)) => Ok(Value::Real(f(*x, *y))),
        (Value::Vector(xs), Value::Real(y)) => Ok(Value::Vector(xs.iter().map(|&x| f(x, *y)).collect())),
        (Value::Real(x), Value::Vector(ys)) => Ok(Value::Vector(ys.iter().map(|&y| f(*x, y)).collect())),
        (Value::Vector(xs), Value::Vector(ys)) => {
            if xs.len() != ys.len() {
                return Err(Error::Validation(format!(
                    "vector length mismatch: {} vs {}",
                    xs.len(),
                    ys.len()
                )));
            }
            Ok(Value::Vector(xs.iter().zip(ys).map(|(&x, &y)| f(x, y)).collect()))
        }
    }
}

impl std::fmt::Display for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcasting() {
        let v = Value::from(vec![1.0, 2.0, 3.0]);
        let s = Value::from(10.0);
        assert_eq!(Function::Mul.evaluate(&[&v, &s]).unwrap(), Value::from(vec![10.0, 20.0, 30.0]));
        assert_eq!(Function::Sub.evaluate(&[&s, &v]).unwrap(), Value::from(vec![9.0, 8.0, 7.0]));
    }

    #[test]
    fn test_length_mismatch() {
        let a = Value::from(vec![1.0, 2.0]);
        let b = Value::from(vec![1.0]);
        assert!(Function::Add.evaluate(&[&a, &b]).is_err());
    }

    #[test]
    fn test_reductions() {
        let v = Value::from(vec![1.0, 2.0, 6.0]);
        assert_eq!(Function::Sum.evaluate(&[&v]).unwrap(), Value::Real(9.0));
        assert_eq!(Function::Mean.evaluate(&[&v]).unwrap(), Value::Real(3.0));
        assert!(Function::Mean.evaluate(&[&Value::Vector(vec![])]).is_err());
    }

    #[test]
    fn test_arity() {
        let a = Value::from(1.0);
        assert!(Function::Exp.evaluate(&[&a, &a]).is_err());
        assert!(Function::Add.evaluate(&[&a]).is_err());
        assert_eq!(Function::Neg.evaluate(&[&a]).unwrap(), Value::Real(-1.0));
    }
}
