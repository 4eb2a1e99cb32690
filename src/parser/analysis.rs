//! Post-parse analysis: which function parameters are arrays.
//!
//! A parameter is an array parameter when the body subscripts it, tests
//! membership in it, iterates it, deletes from it, hands it to `split`,
//! `asort` or `asorti` as the target, or passes it on to another function's
//! array parameter. The last rule is resolved to a fixed point.

use std::collections::HashSet;

use crate::ast::*;

#[derive(Default)]
struct Usage {
    arrays: HashSet<String>,
    /// (argument variable name, callee, argument position)
    forwards: Vec<(String, String, usize)>,
}

pub fn resolve_array_params(program: &mut Program) {
    let usages: Vec<Usage> = program
        .functions
        .iter()
        .map(|f| {
            let mut usage = Usage::default();
            usage.block(&f.body);
            usage
        })
        .collect();

    for (function, usage) in program.functions.iter_mut().zip(&usages) {
        function.array_params = function
            .params
            .iter()
            .map(|p| usage.arrays.contains(p))
            .collect();
    }

    loop {
        let mut changed = false;
        for (idx, usage) in usages.iter().enumerate() {
            for (arg, callee, position) in &usage.forwards {
                let Some(param_idx) = program.functions[idx].param_index(arg) else {
                    continue;
                };
                if program.functions[idx].array_params[param_idx] {
                    continue;
                }
                let callee_takes_array = program
                    .function(callee)
                    .is_some_and(|f| f.is_array_param(*position));
                if callee_takes_array {
                    program.functions[idx].array_params[param_idx] = true;
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }
}

impl Usage {
    fn block(&mut self, block: &Block) {
        for stmt in &block.statements {
            self.stmt(stmt);
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Expr(expr) => self.expr(expr),
            Stmt::Print { args, .. } => args.iter().for_each(|a| self.expr(a)),
            Stmt::Printf { format, args, .. } => {
                self.expr(format);
                args.iter().for_each(|a| self.expr(a));
            }
            Stmt::If {
                condition,
                then_stmt,
                else_stmt,
                ..
            } => {
                self.expr(condition);
                self.stmt(then_stmt);
                if let Some(else_stmt) = else_stmt {
                    self.stmt(else_stmt);
                }
            }
            Stmt::While { condition, body, .. } | Stmt::DoWhile { body, condition, .. } => {
                self.expr(condition);
                self.stmt(body);
            }
            Stmt::For {
                init,
                condition,
                update,
                body,
                ..
            } => {
                if let Some(init) = init {
                    self.stmt(init);
                }
                if let Some(condition) = condition {
                    self.expr(condition);
                }
                if let Some(update) = update {
                    self.expr(update);
                }
                self.stmt(body);
            }
            Stmt::ForIn { array, body, .. } => {
                self.arrays.insert(array.clone());
                self.stmt(body);
            }
            Stmt::Block(block) => self.block(block),
            Stmt::Exit { code: Some(e), .. } | Stmt::Return { value: Some(e), .. } => self.expr(e),
            Stmt::Delete { array, index, .. } => {
                self.arrays.insert(array.clone());
                index.iter().for_each(|e| self.expr(e));
            }
            _ => {}
        }
    }

    fn expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Field(inner, _) | Expr::Paren(inner, _) => self.expr(inner),
            Expr::PreIncrement(inner, _)
            | Expr::PreDecrement(inner, _)
            | Expr::PostIncrement(inner, _)
            | Expr::PostDecrement(inner, _) => self.expr(inner),
            Expr::Element { array, indices, .. } => {
                self.arrays.insert(array.clone());
                indices.iter().for_each(|e| self.expr(e));
            }
            Expr::Contains { key, array, .. } => {
                self.arrays.insert(array.clone());
                key.iter().for_each(|e| self.expr(e));
            }
            Expr::Binary { left, right, .. } => {
                self.expr(left);
                self.expr(right);
            }
            Expr::Unary { operand, .. } => self.expr(operand),
            Expr::Assign { target, value, .. } => {
                self.expr(target);
                self.expr(value);
            }
            Expr::Ternary {
                condition,
                if_true,
                if_false,
                ..
            } => {
                self.expr(condition);
                self.expr(if_true);
                self.expr(if_false);
            }
            Expr::Match { expr, pattern, .. } => {
                self.expr(expr);
                self.expr(pattern);
            }
            Expr::Call { name, args, .. } => {
                for (position, arg) in args.iter().enumerate() {
                    if let Expr::Var(var, _) = arg {
                        self.forwards.push((var.clone(), name.clone(), position));
                    } else {
                        self.expr(arg);
                    }
                }
            }
            Expr::BuiltinCall { func, args, .. } => {
                let array_position = match func {
                    Builtin::Split => Some(1),
                    Builtin::Asort | Builtin::Asorti => Some(0),
                    _ => None,
                };
                for (position, arg) in args.iter().enumerate() {
                    match arg {
                        Expr::Var(var, _) if Some(position) == array_position => {
                            self.arrays.insert(var.clone());
                        }
                        _ => self.expr(arg),
                    }
                }
            }
            Expr::Getline { target, file, .. } => {
                if let Some(target) = target {
                    self.expr(target);
                }
                if let Some(file) = file {
                    self.expr(file);
                }
            }
            Expr::Number(..) | Expr::String(..) | Expr::Regex(..) | Expr::Var(..) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::parser::parse_program;

    fn array_params(source: &str, function: &str) -> Vec<bool> {
        let program = parse_program(source).unwrap();
        program.function(function).unwrap().array_params.clone()
    }

    #[test]
    fn test_direct_uses() {
        assert_eq!(
            array_params("function f(a, n) { a[1] = n }", "f"),
            vec![true, false]
        );
        assert_eq!(
            array_params("function f(a, k) { return k in a }", "f"),
            vec![true, false]
        );
        assert_eq!(
            array_params("function f(a) { for (k in a) delete a[k] }", "f"),
            vec![true]
        );
        assert_eq!(
            array_params("function f(s, parts) { return split(s, parts) }", "f"),
            vec![false, true]
        );
    }

    #[test]
    fn test_transitive_through_calls() {
        let source = "
            function outer(x, y) { return middle(y, x) }
            function middle(p, q) { return inner(p) + q }
            function inner(arr) { return length(arr) + arr[1] }
        ";
        assert_eq!(array_params(source, "inner"), vec![true]);
        assert_eq!(array_params(source, "middle"), vec![true, false]);
        assert_eq!(array_params(source, "outer"), vec![false, true]);
    }

    #[test]
    fn test_scalar_params() {
        assert_eq!(
            array_params("function f(a, b) { return a + b }", "f"),
            vec![false, false]
        );
    }
}
