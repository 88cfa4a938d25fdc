//! Statement and expression evaluation.
//!
//! Evaluation is written once, as boxed futures, and serves both calling
//! conventions: a synchronous routine never reaches a suspension point, so
//! its future completes on the first poll.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use stitch_parser::{AssignTarget, BinaryOp, Block, Expr, Statement, UnaryOp};

use crate::error::Error;
use crate::interpreter::Interpreter;
use crate::value::{BoxFuture, Function, Value};
use crate::Result;

/// Local variables of one routine activation.
#[derive(Debug, Default)]
pub(crate) struct Frame {
    locals: HashMap<String, Value>,
    captured: Arc<HashMap<String, Value>>,
}

impl Frame {
    pub(crate) fn new(captured: Arc<HashMap<String, Value>>) -> Self {
        Self {
            locals: HashMap::new(),
            captured,
        }
    }

    pub(crate) fn bind(&mut self, name: &str, value: Value) {
        self.locals.insert(name.to_string(), value);
    }
}

/// How a statement finished.
#[derive(Debug)]
pub(crate) enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

impl Interpreter {
    fn resolve(&self, frame: &Frame, name: &str) -> Result<Value> {
        frame
            .locals
            .get(name)
            .or_else(|| frame.captured.get(name))
            .or_else(|| self.unit_binding(name))
            .or_else(|| self.global(name))
            .cloned()
            .ok_or_else(|| Error::runtime(format!("name `{}` is not defined", name)))
    }

    pub(crate) fn eval_block<'a>(
        &'a self,
        frame: &'a mut Frame,
        block: &'a Block,
    ) -> BoxFuture<'a, Result<Flow>> {
        Box::pin(async move {
            for stmt in &block.statements {
                match self.eval_statement(frame, stmt).await? {
                    Flow::Normal => {}
                    other => return Ok(other),
                }
            }
            Ok(Flow::Normal)
        })
    }

    fn eval_statement<'a>(
        &'a self,
        frame: &'a mut Frame,
        stmt: &'a Statement,
    ) -> BoxFuture<'a, Result<Flow>> {
        Box::pin(async move {
            match stmt {
                Statement::Def(decl) => {
                    // Nested routines close over the enclosing locals by value
                    let mut captured = (*frame.captured).clone();
                    captured.extend(frame.locals.iter().map(|(k, v)| (k.clone(), v.clone())));
                    let func = Function {
                        decl: decl.clone(),
                        captured: Arc::new(captured),
                    };
                    frame.bind(&decl.name, Value::Function(Arc::new(func)));
                }
                Statement::Assign { target, op, value } => {
                    let rhs = self.eval_expr(frame, value).await?;
                    match target {
                        AssignTarget::Name(name) => {
                            let new = match op {
                                Some(op) => binary_op(*op, self.resolve(frame, name)?, rhs)?,
                                None => rhs,
                            };
                            frame.bind(name, new);
                        }
                        AssignTarget::Index { base, index } => {
                            let (root, mut path) = self.index_path(frame, base).await?;
                            path.push(self.eval_expr(frame, index).await?);
                            let mut slot = self.resolve(frame, &root)?;
                            let new = match op {
                                Some(op) => binary_op(*op, get_path(&slot, &path)?, rhs)?,
                                None => rhs,
                            };
                            set_path(&mut slot, &path, new)?;
                            frame.bind(&root, slot);
                        }
                    }
                }
                Statement::Expr(expr) => {
                    self.eval_expr(frame, expr).await?;
                }
                Statement::Return(expr) => {
                    let value = match expr {
                        Some(expr) => self.eval_expr(frame, expr).await?,
                        None => Value::Null,
                    };
                    return Ok(Flow::Return(value));
                }
                Statement::If {
                    branches,
                    else_block,
                } => {
                    for (condition, block) in branches {
                        if self.eval_expr(frame, condition).await?.to_bool() {
                            return self.eval_block(frame, block).await;
                        }
                    }
                    if let Some(block) = else_block {
                        return self.eval_block(frame, block).await;
                    }
                }
                Statement::While { condition, body } => {
                    while self.eval_expr(frame, condition).await?.to_bool() {
                        match self.eval_block(frame, body).await? {
                            Flow::Break => break,
                            Flow::Normal | Flow::Continue => {}
                            ret @ Flow::Return(_) => return Ok(ret),
                        }
                    }
                }
                Statement::ForIn { var, iter, body } => {
                    let items = match self.eval_expr(frame, iter).await? {
                        Value::Array(items) => items,
                        Value::String(s) => s.chars().map(|c| Value::String(c.to_string())).collect(),
                        Value::Object(map) => map.into_keys().map(Value::String).collect(),
                        other => {
                            return Err(Error::runtime(format!(
                                "cannot iterate over {}",
                                other.type_name()
                            )));
                        }
                    };
                    for item in items {
                        frame.bind(var, item);
                        match self.eval_block(frame, body).await? {
                            Flow::Break => break,
                            Flow::Normal | Flow::Continue => {}
                            ret @ Flow::Return(_) => return Ok(ret),
                        }
                    }
                }
                Statement::Break => return Ok(Flow::Break),
                Statement::Continue => return Ok(Flow::Continue),
                Statement::Pass => {}
                Statement::Raise(expr) => {
                    let value = self.eval_expr(frame, expr).await?;
                    return Err(Error::Exception(value));
                }
            }
            Ok(Flow::Normal)
        })
    }

    /// Split an assignment base like `m["a"][0]` into its root variable and
    /// the evaluated indices leading to the assigned slot.
    fn index_path<'a>(
        &'a self,
        frame: &'a Frame,
        base: &'a Expr,
    ) -> BoxFuture<'a, Result<(String, Vec<Value>)>> {
        Box::pin(async move {
            match base {
                Expr::Identifier(name) => Ok((name.clone(), Vec::new())),
                Expr::Index { base, index } => {
                    let (root, mut path) = self.index_path(frame, base).await?;
                    path.push(self.eval_expr(frame, index).await?);
                    Ok((root, path))
                }
                _ => Err(Error::runtime("cannot assign into this expression")),
            }
        })
    }

    pub(crate) fn eval_expr<'a>(
        &'a self,
        frame: &'a Frame,
        expr: &'a Expr,
    ) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            let value = match expr {
                Expr::Number(n) => Value::Number(*n),
                Expr::String(s) => Value::String(s.clone()),
                Expr::Boolean(b) => Value::Boolean(*b),
                Expr::Null => Value::Null,
                Expr::Identifier(name) => self.resolve(frame, name)?,
                Expr::List(items) => {
                    let mut values = Vec::with_capacity(items.len());
                    for item in items {
                        values.push(self.eval_expr(frame, item).await?);
                    }
                    Value::Array(values)
                }
                Expr::Map(entries) => {
                    let mut map = BTreeMap::new();
                    for (key, value) in entries {
                        let key = match self.eval_expr(frame, key).await? {
                            Value::String(s) => s,
                            other => {
                                return Err(Error::runtime(format!(
                                    "map keys must be strings, got {}",
                                    other.type_name()
                                )));
                            }
                        };
                        map.insert(key, self.eval_expr(frame, value).await?);
                    }
                    Value::Object(map)
                }
                Expr::Call { callee, args } => self.eval_call(frame, callee, args, false).await?,
                Expr::Await(inner) => match inner.as_ref() {
                    Expr::Call { callee, args } => self.eval_call(frame, callee, args, true).await?,
                    _ => return Err(Error::runtime("`await` expects a call")),
                },
                Expr::Index { base, index } => {
                    let base = self.eval_expr(frame, base).await?;
                    let index = self.eval_expr(frame, index).await?;
                    get_index(&base, &index)?
                }
                Expr::Unary { op, operand } => {
                    let operand = self.eval_expr(frame, operand).await?;
                    match op {
                        UnaryOp::Not => Value::Boolean(!operand.to_bool()),
                        UnaryOp::Neg => match operand {
                            Value::Number(n) => Value::Number(-n),
                            other => {
                                return Err(Error::runtime(format!(
                                    "cannot negate {}",
                                    other.type_name()
                                )));
                            }
                        },
                    }
                }
                Expr::Binary { op, left, right } => {
                    let left = self.eval_expr(frame, left).await?;
                    match op {
                        // Short-circuit, yielding the deciding operand
                        BinaryOp::And if !left.to_bool() => left,
                        BinaryOp::Or if left.to_bool() => left,
                        BinaryOp::And | BinaryOp::Or => self.eval_expr(frame, right).await?,
                        _ => {
                            let right = self.eval_expr(frame, right).await?;
                            binary_op(*op, left, right)?
                        }
                    }
                }
            };
            Ok(value)
        })
    }

    async fn eval_call(
        &self,
        frame: &Frame,
        callee: &Expr,
        args: &[Expr],
        awaited: bool,
    ) -> Result<Value> {
        let callee = self.eval_expr(frame, callee).await?;
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval_expr(frame, arg).await?);
        }

        let (name, is_async) = match &callee {
            Value::Function(func) => (func.name().to_string(), func.is_async()),
            Value::Native(native) => (native.name().to_string(), native.is_async()),
            other => {
                return Err(Error::runtime(format!(
                    "{} is not callable",
                    other.type_name()
                )));
            }
        };
        if is_async && !awaited {
            return Err(Error::runtime(format!(
                "async routine `{}` must be awaited",
                name
            )));
        }
        if !is_async && awaited {
            return Err(Error::runtime(format!(
                "`{}` is not an async routine and cannot be awaited",
                name
            )));
        }
        self.call(callee, values).await
    }
}

fn array_index(len: usize, index: &Value) -> Result<usize> {
    let Some(i) = index.as_integer() else {
        return Err(Error::runtime(format!(
            "list indices must be integers, got {}",
            index.to_string_value()
        )));
    };
    let resolved = if i < 0 { len as i64 + i } else { i };
    if resolved < 0 || resolved >= len as i64 {
        return Err(Error::runtime(format!("index {} out of range", i)));
    }
    Ok(resolved as usize)
}

fn get_index(base: &Value, index: &Value) -> Result<Value> {
    match (base, index) {
        (Value::Array(items), _) => Ok(items[array_index(items.len(), index)?].clone()),
        (Value::String(s), _) => {
            let chars: Vec<char> = s.chars().collect();
            let i = array_index(chars.len(), index)?;
            Ok(Value::String(chars[i].to_string()))
        }
        (Value::Object(map), Value::String(key)) => map
            .get(key)
            .cloned()
            .ok_or_else(|| Error::runtime(format!("key {:?} not found", key))),
        (base, index) => Err(Error::runtime(format!(
            "cannot index {} with {}",
            base.type_name(),
            index.type_name()
        ))),
    }
}

fn get_path(slot: &Value, path: &[Value]) -> Result<Value> {
    let mut current = slot.clone();
    for index in path {
        current = get_index(&current, index)?;
    }
    Ok(current)
}

fn set_path(slot: &mut Value, path: &[Value], new: Value) -> Result<()> {
    let Some((index, rest)) = path.split_first() else {
        *slot = new;
        return Ok(());
    };
    let child = match (slot, index) {
        (Value::Array(items), _) => {
            let i = array_index(items.len(), index)?;
            &mut items[i]
        }
        (Value::Object(map), Value::String(key)) => {
            if rest.is_empty() {
                map.insert(key.clone(), new);
                return Ok(());
            }
            map.get_mut(key)
                .ok_or_else(|| Error::runtime(format!("key {:?} not found", key)))?
        }
        (slot, index) => {
            return Err(Error::runtime(format!(
                "cannot assign into {} with {} index",
                slot.type_name(),
                index.type_name()
            )));
        }
    };
    set_path(child, rest, new)
}

pub(crate) fn binary_op(op: BinaryOp, left: Value, right: Value) -> Result<Value> {
    use Value::{Array, Boolean, Number};

    let value = match (op, left, right) {
        (BinaryOp::Add, Number(a), Number(b)) => Number(a + b),
        (BinaryOp::Add, Value::String(a), b) => Value::String(a + &b.to_string_value()),
        (BinaryOp::Add, a, Value::String(b)) => Value::String(a.to_string_value() + &b),
        (BinaryOp::Add, Array(mut a), Array(b)) => {
            a.extend(b);
            Array(a)
        }
        (BinaryOp::Sub, Number(a), Number(b)) => Number(a - b),
        (BinaryOp::Mul, Number(a), Number(b)) => Number(a * b),
        (BinaryOp::Div | BinaryOp::Mod, Number(_), Number(b)) if b == 0.0 => {
            return Err(Error::runtime("division by zero"));
        }
        (BinaryOp::Div, Number(a), Number(b)) => Number(a / b),
        (BinaryOp::Mod, Number(a), Number(b)) => Number(a % b),
        (BinaryOp::Eq, a, b) => Boolean(a == b),
        (BinaryOp::NotEq, a, b) => Boolean(a != b),
        (BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge, a, b) => {
            let ordering = match (&a, &b) {
                (Number(x), Number(y)) => x.partial_cmp(y),
                (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
                _ => None,
            };
            let Some(ordering) = ordering else {
                return Err(Error::runtime(format!(
                    "cannot compare {} and {}",
                    a.type_name(),
                    b.type_name()
                )));
            };
            Boolean(match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Le => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            })
        }
        (BinaryOp::And, a, b) => {
            if a.to_bool() {
                b
            } else {
                a
            }
        }
        (BinaryOp::Or, a, b) => {
            if a.to_bool() {
                a
            } else {
                b
            }
        }
        (op, a, b) => {
            return Err(Error::runtime(format!(
                "unsupported operand types for {}: {} and {}",
                op.symbol(),
                a.type_name(),
                b.type_name()
            )));
        }
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arithmetic() {
        assert_eq!(
            binary_op(BinaryOp::Add, Value::from(5i64), Value::from(6i64)).unwrap(),
            Value::from(11i64)
        );
        assert_eq!(
            binary_op(BinaryOp::Mod, Value::from(7i64), Value::from(3i64)).unwrap(),
            Value::from(1i64)
        );
        assert!(binary_op(BinaryOp::Div, Value::from(1i64), Value::from(0i64)).is_err());
    }

    #[test]
    fn test_string_concatenation_coerces() {
        assert_eq!(
            binary_op(BinaryOp::Add, Value::from("n="), Value::from(3i64)).unwrap(),
            Value::from("n=3")
        );
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(
            binary_op(BinaryOp::Le, Value::from("a"), Value::from("b")).unwrap(),
            Value::Boolean(true)
        );
        assert!(binary_op(BinaryOp::Lt, Value::from("a"), Value::from(1i64)).is_err());
    }

    #[test]
    fn test_negative_list_index() {
        let list = Value::Array(vec![Value::from(1i64), Value::from(2i64)]);
        assert_eq!(get_index(&list, &Value::from(-1i64)).unwrap(), Value::from(2i64));
        assert!(get_index(&list, &Value::from(2i64)).is_err());
    }

    #[test]
    fn test_set_path_nested() {
        let mut inner = BTreeMap::new();
        inner.insert("a".to_string(), Value::Array(vec![Value::from(1i64)]));
        let mut slot = Value::Object(inner);
        set_path(&mut slot, &[Value::from("a"), Value::from(0i64)], Value::from(9i64)).unwrap();
        set_path(&mut slot, &[Value::from("b")], Value::from(true)).unwrap();
        assert_eq!(
            get_path(&slot, &[Value::from("a"), Value::from(0i64)]).unwrap(),
            Value::from(9i64)
        );
        assert_eq!(get_path(&slot, &[Value::from("b")]).unwrap(), Value::Boolean(true));
    }
}
