use std::io::Write;

use crate::ast::*;
use crate::error::Result;
use crate::format::sprintf;
use crate::value::Value;

use super::Interpreter;

/// How a statement finished. Loops absorb `Break` and `Continue`, function
/// calls absorb `Return`, the record driver absorbs the rest.
#[derive(Debug, Clone)]
pub enum StmtResult {
    Normal,
    Break,
    Continue,
    Next,
    NextFile,
    Exit(i32),
    Return(Value),
}

/// What a loop should do after running its body once
enum LoopFlow {
    Continue,
    Break,
    Leave(StmtResult),
}

fn loop_flow(result: StmtResult) -> LoopFlow {
    match result {
        StmtResult::Normal | StmtResult::Continue => LoopFlow::Continue,
        StmtResult::Break => LoopFlow::Break,
        other => LoopFlow::Leave(other),
    }
}

impl<'a> Interpreter<'a> {
    pub(crate) fn execute_block<W: Write>(&mut self, block: &Block, output: &mut W) -> Result<StmtResult> {
        for stmt in &block.statements {
            match self.execute_stmt(stmt, output)? {
                StmtResult::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(StmtResult::Normal)
    }

    /// Run one statement. A `next`, `nextfile` or `exit` parked by a
    /// function called from it takes over the statement's own result.
    pub(crate) fn execute_stmt<W: Write>(&mut self, stmt: &Stmt, output: &mut W) -> Result<StmtResult> {
        let result = self.execute_inner(stmt, output)?;
        Ok(self.pending.take().unwrap_or(result))
    }

    fn execute_inner<W: Write>(&mut self, stmt: &Stmt, output: &mut W) -> Result<StmtResult> {
        match stmt {
            Stmt::Expr(expr) => {
                self.eval_expr(expr, output)?;
                Ok(StmtResult::Normal)
            }

            Stmt::Print { args, .. } => self.execute_print(args, output),

            Stmt::Printf { format, args, .. } => self.execute_printf(format, args, output),

            Stmt::If {
                condition,
                then_stmt,
                else_stmt,
                ..
            } => {
                let truthy = self.eval_expr(condition, output)?.is_truthy();
                if self.pending.is_some() {
                    return Ok(StmtResult::Normal);
                }
                if truthy {
                    self.execute_stmt(then_stmt, output)
                } else if let Some(else_stmt) = else_stmt {
                    self.execute_stmt(else_stmt, output)
                } else {
                    Ok(StmtResult::Normal)
                }
            }

            Stmt::While { condition, body, .. } => {
                while self.loop_condition(Some(condition), output)? {
                    match loop_flow(self.execute_stmt(body, output)?) {
                        LoopFlow::Continue => {}
                        LoopFlow::Break => break,
                        LoopFlow::Leave(result) => return Ok(result),
                    }
                }
                Ok(StmtResult::Normal)
            }

            Stmt::DoWhile { body, condition, .. } => {
                loop {
                    match loop_flow(self.execute_stmt(body, output)?) {
                        LoopFlow::Continue => {}
                        LoopFlow::Break => break,
                        LoopFlow::Leave(result) => return Ok(result),
                    }
                    if !self.loop_condition(Some(condition), output)? {
                        break;
                    }
                }
                Ok(StmtResult::Normal)
            }

            Stmt::For {
                init,
                condition,
                update,
                body,
                ..
            } => {
                if let Some(init) = init {
                    let result = self.execute_stmt(init, output)?;
                    if !matches!(result, StmtResult::Normal) {
                        return Ok(result);
                    }
                }
                while self.loop_condition(condition.as_ref(), output)? {
                    match loop_flow(self.execute_stmt(body, output)?) {
                        LoopFlow::Continue => {}
                        LoopFlow::Break => break,
                        LoopFlow::Leave(result) => return Ok(result),
                    }
                    if let Some(update) = update {
                        self.eval_expr(update, output)?;
                        if self.pending.is_some() {
                            break;
                        }
                    }
                }
                Ok(StmtResult::Normal)
            }

            Stmt::ForIn {
                var, array, body, ..
            } => {
                for key in self.env.array_keys(array)? {
                    self.env.set_var(var, Value::from_string(key))?;
                    match loop_flow(self.execute_stmt(body, output)?) {
                        LoopFlow::Continue => {}
                        LoopFlow::Break => break,
                        LoopFlow::Leave(result) => return Ok(result),
                    }
                }
                Ok(StmtResult::Normal)
            }

            Stmt::Block(block) => self.execute_block(block, output),

            Stmt::Break { .. } => Ok(StmtResult::Break),
            Stmt::Continue { .. } => Ok(StmtResult::Continue),
            Stmt::Next { .. } => Ok(StmtResult::Next),
            Stmt::NextFile { .. } => Ok(StmtResult::NextFile),

            Stmt::Exit { code, .. } => {
                let code = match code {
                    Some(expr) => self.eval_number(expr, output)? as i32,
                    None => self.exit_code,
                };
                Ok(StmtResult::Exit(code))
            }

            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(expr) => self.eval_expr(expr, output)?,
                    None => Value::Uninitialized,
                };
                Ok(StmtResult::Return(value))
            }

            Stmt::Delete { array, index, .. } => {
                if index.is_empty() {
                    self.env.clear_array(array)?;
                } else {
                    let mut values = Vec::with_capacity(index.len());
                    for expr in index {
                        values.push(self.eval_expr(expr, output)?);
                    }
                    let key = self.make_array_key(&values);
                    self.env.delete_array_element(array, &key)?;
                }
                Ok(StmtResult::Normal)
            }

            Stmt::Empty => Ok(StmtResult::Normal),
        }
    }

    /// A missing condition is true. A signal parked while evaluating the
    /// condition ends the loop so the enclosing statement can raise it.
    fn loop_condition<W: Write>(&mut self, condition: Option<&Expr>, output: &mut W) -> Result<bool> {
        let truthy = match condition {
            Some(condition) => self.eval_expr(condition, output)?.is_truthy(),
            None => true,
        };
        Ok(truthy && self.pending.is_none())
    }

    fn execute_print<W: Write>(&mut self, args: &[Expr], output: &mut W) -> Result<StmtResult> {
        if args.is_empty() {
            self.print_record(output)?;
            return Ok(StmtResult::Normal);
        }

        let mut line = String::new();
        for (i, arg) in args.iter().enumerate() {
            let value = self.eval_expr(arg, output)?;
            if i > 0 {
                line.push_str(self.env.ofs());
            }
            line.push_str(&value.to_str(self.env.ofmt()));
        }
        if self.pending.is_some() {
            return Ok(StmtResult::Normal);
        }
        line.push_str(self.env.ors());
        output.write_all(line.as_bytes())?;
        Ok(StmtResult::Normal)
    }

    fn execute_printf<W: Write>(&mut self, format: &Expr, args: &[Expr], output: &mut W) -> Result<StmtResult> {
        let format = self.eval_string(format, output)?;
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval_expr(arg, output)?);
        }
        if self.pending.is_some() {
            return Ok(StmtResult::Normal);
        }
        let text = sprintf(&format, &values, self.env.convfmt());
        output.write_all(text.as_bytes())?;
        Ok(StmtResult::Normal)
    }
}
