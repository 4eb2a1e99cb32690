use std::io::Write;

use tracing::{debug, trace};

use crate::ast::*;
use crate::environment::Var;
use crate::error::{Error, Result, SourceLocation};
use crate::record::MAX_FIELDS;
use crate::value::{Value, compare_values};

use super::stmt::StmtResult;
use super::{Interpreter, MAX_CALL_DEPTH, cached_regex};

/// A resolved assignment target. Subscripts and field numbers are
/// evaluated once, so `a[i++] += 1` touches a single element.
#[derive(Debug, Clone)]
pub(crate) enum LValue {
    Var(String),
    Element(String, String),
    Field(usize),
}

impl<'a> Interpreter<'a> {
    /// Evaluate an expression. Runtime errors without a position get the
    /// position of the innermost expression that raised them.
    pub(crate) fn eval_expr<W: Write>(&mut self, expr: &Expr, output: &mut W) -> Result<Value> {
        self.eval_inner(expr, output)
            .map_err(|e| e.or_at(expr.location()))
    }

    /// Evaluate and convert to a string with CONVFMT
    pub(crate) fn eval_string<W: Write>(&mut self, expr: &Expr, output: &mut W) -> Result<String> {
        let value = self.eval_expr(expr, output)?;
        Ok(value.to_str(self.env.convfmt()).into_owned())
    }

    pub(crate) fn eval_number<W: Write>(&mut self, expr: &Expr, output: &mut W) -> Result<f64> {
        Ok(self.eval_expr(expr, output)?.to_number())
    }

    fn eval_inner<W: Write>(&mut self, expr: &Expr, output: &mut W) -> Result<Value> {
        match expr {
            Expr::Number(n, _) => Ok(Value::Number(*n)),

            Expr::String(s, _) => Ok(Value::from_string(s.clone())),

            // A regex used as a value matches against $0
            Expr::Regex(pattern, _) => {
                let ignore_case = self.env.ignore_case();
                let regex = cached_regex(&mut self.regex_cache, pattern, ignore_case)?;
                Ok(Value::from_bool(regex.is_match(self.env.record().text())))
            }

            Expr::Var(name, _) => self.env.get_var(name),

            Expr::Field(index, _) => {
                let index = self.field_index(index, output)?;
                Ok(self.env.get_field(index))
            }

            Expr::Element { array, indices, .. } => {
                let key = self.eval_key(indices, output)?;
                self.env.get_array_element(array, &key)
            }

            Expr::Binary {
                left, op, right, ..
            } => self.eval_binary(left, *op, right, output),

            Expr::Unary { op, operand, .. } => {
                let value = self.eval_expr(operand, output)?;
                Ok(match op {
                    UnaryOp::Neg => Value::Number(-value.to_number()),
                    UnaryOp::Pos => Value::Number(value.to_number()),
                    UnaryOp::Not => Value::from_bool(!value.is_truthy()),
                })
            }

            Expr::Assign {
                target, op, value, ..
            } => self.eval_assign(target, *op, value, output),

            Expr::PreIncrement(target, _) => self.increment(target, 1.0, true, output),
            Expr::PreDecrement(target, _) => self.increment(target, -1.0, true, output),
            Expr::PostIncrement(target, _) => self.increment(target, 1.0, false, output),
            Expr::PostDecrement(target, _) => self.increment(target, -1.0, false, output),

            Expr::Ternary {
                condition,
                if_true,
                if_false,
                ..
            } => {
                if self.eval_expr(condition, output)?.is_truthy() {
                    self.eval_expr(if_true, output)
                } else {
                    self.eval_expr(if_false, output)
                }
            }

            Expr::Call {
                name,
                args,
                location,
            } => self.call_function(name, args, *location, output),

            Expr::BuiltinCall {
                func,
                args,
                location,
            } => self.call_builtin(*func, args, *location, output),

            Expr::Contains { key, array, .. } => {
                let key = self.eval_key(key, output)?;
                Ok(Value::from_bool(self.env.array_contains(array, &key)?))
            }

            Expr::Match {
                expr,
                pattern,
                negated,
                ..
            } => {
                let text = self.eval_string(expr, output)?;
                let pattern = self.pattern_source(pattern, output)?;
                let matched = self.get_regex(&pattern)?.is_match(&text);
                Ok(Value::from_bool(matched != *negated))
            }

            Expr::Getline { target, file, .. } => {
                self.eval_getline(target.as_deref(), file.as_deref(), output)
            }

            Expr::Paren(inner, _) => self.eval_expr(inner, output),
        }
    }

    fn eval_binary<W: Write>(
        &mut self,
        left: &Expr,
        op: BinaryOp,
        right: &Expr,
        output: &mut W,
    ) -> Result<Value> {
        match op {
            BinaryOp::And => {
                let result = self.eval_expr(left, output)?.is_truthy()
                    && self.eval_expr(right, output)?.is_truthy();
                Ok(Value::from_bool(result))
            }
            BinaryOp::Or => {
                let result = self.eval_expr(left, output)?.is_truthy()
                    || self.eval_expr(right, output)?.is_truthy();
                Ok(Value::from_bool(result))
            }
            BinaryOp::Concat => {
                let mut joined = self.eval_string(left, output)?;
                joined.push_str(&self.eval_string(right, output)?);
                Ok(Value::from_string(joined))
            }
            BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge
            | BinaryOp::Eq
            | BinaryOp::Ne => {
                let l = self.eval_expr(left, output)?;
                let r = self.eval_expr(right, output)?;
                let ordering = compare_values(&l, &r);
                let result = match op {
                    BinaryOp::Lt => ordering.is_lt(),
                    BinaryOp::Le => ordering.is_le(),
                    BinaryOp::Gt => ordering.is_gt(),
                    BinaryOp::Ge => ordering.is_ge(),
                    BinaryOp::Eq => ordering.is_eq(),
                    _ => ordering.is_ne(),
                };
                Ok(Value::from_bool(result))
            }
            BinaryOp::Add
            | BinaryOp::Sub
            | BinaryOp::Mul
            | BinaryOp::Div
            | BinaryOp::Mod
            | BinaryOp::Pow => {
                let l = self.eval_number(left, output)?;
                let r = self.eval_number(right, output)?;
                arithmetic(op, l, r).map(Value::Number)
            }
        }
    }

    fn eval_assign<W: Write>(
        &mut self,
        target: &Expr,
        op: AssignOp,
        value: &Expr,
        output: &mut W,
    ) -> Result<Value> {
        let lvalue = self.resolve_lvalue(target, output)?;
        let rhs = self.eval_expr(value, output)?;
        let new_value = match compound_operator(op) {
            None => rhs,
            Some(bin) => {
                let current = self.read_lvalue(&lvalue)?.to_number();
                Value::Number(arithmetic(bin, current, rhs.to_number())?)
            }
        };
        self.write_lvalue(&lvalue, new_value.clone())?;
        Ok(new_value)
    }

    fn increment<W: Write>(
        &mut self,
        target: &Expr,
        delta: f64,
        prefix: bool,
        output: &mut W,
    ) -> Result<Value> {
        let lvalue = self.resolve_lvalue(target, output)?;
        let old = self.read_lvalue(&lvalue)?.to_number();
        let new = old + delta;
        self.write_lvalue(&lvalue, Value::Number(new))?;
        Ok(Value::Number(if prefix { new } else { old }))
    }

    pub(crate) fn resolve_lvalue<W: Write>(&mut self, expr: &Expr, output: &mut W) -> Result<LValue> {
        match expr {
            Expr::Var(name, _) => Ok(LValue::Var(name.clone())),
            Expr::Element { array, indices, .. } => {
                let key = self.eval_key(indices, output)?;
                Ok(LValue::Element(array.clone(), key))
            }
            Expr::Field(index, _) => Ok(LValue::Field(self.field_index(index, output)?)),
            Expr::Paren(inner, _) => self.resolve_lvalue(inner, output),
            other => Err(Error::runtime_at(
                "assignment target is not a variable, array element or field",
                other.location(),
            )),
        }
    }

    pub(crate) fn read_lvalue(&mut self, lvalue: &LValue) -> Result<Value> {
        match lvalue {
            LValue::Var(name) => self.env.get_var(name),
            LValue::Element(array, key) => self.env.get_array_element(array, key),
            LValue::Field(index) => Ok(self.env.get_field(*index)),
        }
    }

    pub(crate) fn write_lvalue(&mut self, lvalue: &LValue, value: Value) -> Result<()> {
        match lvalue {
            LValue::Var(name) => self.env.set_var(name, value),
            LValue::Element(array, key) => self.env.set_array_element(array, key.clone(), value),
            LValue::Field(index) => {
                let text = value.to_str(self.env.convfmt()).into_owned();
                self.env.set_field(*index, text);
                Ok(())
            }
        }
    }

    fn field_index<W: Write>(&mut self, expr: &Expr, output: &mut W) -> Result<usize> {
        let n = self.eval_number(expr, output)?;
        if n < 0.0 || n.is_nan() {
            return Err(Error::runtime(format!("attempt to access field {}", n)));
        }
        if n > MAX_FIELDS as f64 {
            return Err(Error::runtime(format!(
                "field index {} exceeds the limit of {}",
                n, MAX_FIELDS
            )));
        }
        Ok(n as usize)
    }

    /// Subscripts joined with SUBSEP
    fn eval_key<W: Write>(&mut self, indices: &[Expr], output: &mut W) -> Result<String> {
        let mut values = Vec::with_capacity(indices.len());
        for index in indices {
            values.push(self.eval_expr(index, output)?);
        }
        Ok(self.make_array_key(&values))
    }

    /// Source text of a regex operand: literal regexes as written, anything
    /// else by its string value
    pub(crate) fn pattern_source<W: Write>(&mut self, expr: &Expr, output: &mut W) -> Result<String> {
        match expr {
            Expr::Regex(pattern, _) => Ok(pattern.clone()),
            other => self.eval_string(other, output),
        }
    }

    fn call_function<W: Write>(
        &mut self,
        name: &str,
        args: &[Expr],
        location: SourceLocation,
        output: &mut W,
    ) -> Result<Value> {
        if let Some(&func) = self.functions.get(name) {
            return self.call_user_function(func, args, location, output);
        }

        if let Some(function) = self.externals.get(name).cloned() {
            let mut strings = Vec::with_capacity(args.len());
            for arg in args {
                strings.push(self.eval_string(arg, output)?);
            }
            trace!(function = name, args = strings.len(), "calling external function");
            return Ok(Value::from_string(function.call(&strings)));
        }

        Err(Error::name(name, location))
    }

    fn call_user_function<W: Write>(
        &mut self,
        func: &'a FunctionDef,
        args: &[Expr],
        location: SourceLocation,
        output: &mut W,
    ) -> Result<Value> {
        if args.len() > func.params.len() {
            return Err(Error::runtime_at(
                format!(
                    "function `{}` called with {} arguments but declares {} parameters",
                    func.name,
                    args.len(),
                    func.params.len()
                ),
                location,
            ));
        }
        if self.call_depth >= MAX_CALL_DEPTH {
            return Err(Error::runtime_at(
                format!("call depth limit of {} exceeded in `{}`", MAX_CALL_DEPTH, func.name),
                location,
            ));
        }

        // Arguments are evaluated in the caller's scope
        let mut bindings = Vec::with_capacity(func.params.len());
        let mut owned = Vec::new();
        for (i, param) in func.params.iter().enumerate() {
            let wants_array = func.is_array_param(i);
            let var = match args.get(i) {
                Some(Expr::Var(name, _)) if wants_array || self.env.is_array(name) => {
                    Var::Array(self.env.array_id(name)?)
                }
                Some(arg) if !wants_array => Var::Scalar(self.eval_expr(arg, output)?),
                None if !wants_array => Var::Scalar(Value::Uninitialized),
                _ => {
                    let id = self.env.new_array();
                    owned.push(id);
                    Var::Array(id)
                }
            };
            bindings.push((param.clone(), var));
        }

        self.env.push_scope(bindings, owned);
        self.call_depth += 1;
        let result = self.execute_block(&func.body, output);
        self.call_depth -= 1;
        self.env.pop_scope();

        match result? {
            StmtResult::Return(value) => Ok(value),
            signal @ (StmtResult::Next | StmtResult::NextFile | StmtResult::Exit(_)) => {
                self.pending = Some(signal);
                Ok(Value::Uninitialized)
            }
            _ => Ok(Value::Uninitialized),
        }
    }

    /// `getline [var] [< file]`: 1 on success, 0 at end of input, -1 when
    /// the file cannot be read
    fn eval_getline<W: Write>(
        &mut self,
        target: Option<&Expr>,
        file: Option<&Expr>,
        output: &mut W,
    ) -> Result<Value> {
        let lvalue = match target {
            Some(target) => Some(self.resolve_lvalue(target, output)?),
            None => None,
        };

        let record = match file {
            Some(file) => {
                let name = self.eval_string(file, output)?;
                match self.read_from_file(&name) {
                    Ok(record) => record,
                    Err(error) => {
                        debug!(file = %name, %error, "getline failed");
                        return Ok(Value::Number(-1.0));
                    }
                }
            }
            None => {
                let record = self.next_record()?;
                if record.is_some() {
                    self.env.nr += 1;
                    self.env.fnr += 1;
                }
                record
            }
        };

        let Some(record) = record else {
            return Ok(Value::Number(0.0));
        };
        match lvalue {
            Some(lvalue) => self.write_lvalue(&lvalue, Value::from_string(record))?,
            None => self.env.set_record(record),
        }
        Ok(Value::Number(1.0))
    }
}

fn compound_operator(op: AssignOp) -> Option<BinaryOp> {
    match op {
        AssignOp::Assign => None,
        AssignOp::AddAssign => Some(BinaryOp::Add),
        AssignOp::SubAssign => Some(BinaryOp::Sub),
        AssignOp::MulAssign => Some(BinaryOp::Mul),
        AssignOp::DivAssign => Some(BinaryOp::Div),
        AssignOp::ModAssign => Some(BinaryOp::Mod),
        AssignOp::PowAssign => Some(BinaryOp::Pow),
    }
}

fn arithmetic(op: BinaryOp, l: f64, r: f64) -> Result<f64> {
    match op {
        BinaryOp::Add => Ok(l + r),
        BinaryOp::Sub => Ok(l - r),
        BinaryOp::Mul => Ok(l * r),
        BinaryOp::Div if r == 0.0 => Err(Error::runtime("division by zero")),
        BinaryOp::Div => Ok(l / r),
        BinaryOp::Mod if r == 0.0 => Err(Error::runtime("division by zero in %")),
        BinaryOp::Mod => Ok(l % r),
        BinaryOp::Pow => Ok(l.powf(r)),
        other => Err(Error::runtime(format!("{:?} is not an arithmetic operator", other))),
    }
}
