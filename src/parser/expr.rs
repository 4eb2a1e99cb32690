//! Expression grammar, loosest binding first:
//!
//! ```text
//! assignment   = ternary [assign-op assignment]
//! ternary      = or ["?" assignment ":" assignment]
//! or, and      = left-associative || and &&
//! in           = relational {"in" NAME}
//! relational   = concat [(< <= > >= == != ~ !~) concat]
//! concat       = additive {additive}
//! additive     = multiplicative {(+ -) multiplicative}
//! multiplicative = unary {(* / %) unary}
//! unary        = (! - +) unary | power
//! power        = increment ["^" unary]
//! increment    = (++ --) increment | postfix
//! postfix      = field [++ --]
//! field        = "$" field | primary
//! ```

use crate::ast::*;
use crate::error::{Error, Result, SourceLocation};
use crate::lexer::TokenKind;

use super::Parser;

type Level = fn(&mut Parser) -> Result<Expr>;

const OR: &[(TokenKind, BinaryOp)] = &[(TokenKind::Or, BinaryOp::Or)];
const AND: &[(TokenKind, BinaryOp)] = &[(TokenKind::And, BinaryOp::And)];
const ADDITIVE: &[(TokenKind, BinaryOp)] = &[
    (TokenKind::Plus, BinaryOp::Add),
    (TokenKind::Minus, BinaryOp::Sub),
];
const MULTIPLICATIVE: &[(TokenKind, BinaryOp)] = &[
    (TokenKind::Star, BinaryOp::Mul),
    (TokenKind::Slash, BinaryOp::Div),
    (TokenKind::Percent, BinaryOp::Mod),
];

fn binary(left: Expr, op: BinaryOp, right: Expr, location: SourceLocation) -> Expr {
    Expr::Binary {
        left: Box::new(left),
        op,
        right: Box::new(right),
        location,
    }
}

impl Parser {
    pub(super) fn parse_expression(&mut self) -> Result<Expr> {
        self.parse_assignment()
    }

    pub(super) fn parse_expression_list(&mut self) -> Result<Vec<Expr>> {
        let mut list = vec![self.parse_expression()?];
        while self.match_token(&TokenKind::Comma) {
            self.skip_newlines();
            list.push(self.parse_expression()?);
        }
        Ok(list)
    }

    /// Subscript list after `[`, consuming the closing `]`
    pub(super) fn parse_subscripts(&mut self) -> Result<Vec<Expr>> {
        let indices = self.nested(Self::parse_expression_list)?;
        self.expect(&TokenKind::RightBracket)?;
        Ok(indices)
    }

    fn parse_assignment(&mut self) -> Result<Expr> {
        let target = self.parse_ternary()?;

        let location = self.current_location();
        let op = match self.peek_kind() {
            Some(TokenKind::Assign) => AssignOp::Assign,
            Some(TokenKind::PlusAssign) => AssignOp::AddAssign,
            Some(TokenKind::MinusAssign) => AssignOp::SubAssign,
            Some(TokenKind::StarAssign) => AssignOp::MulAssign,
            Some(TokenKind::SlashAssign) => AssignOp::DivAssign,
            Some(TokenKind::PercentAssign) => AssignOp::ModAssign,
            Some(TokenKind::CaretAssign) => AssignOp::PowAssign,
            _ => return Ok(target),
        };
        if !target.is_lvalue() {
            return Err(self.error_here("assignment to a non-lvalue"));
        }
        self.advance();
        self.skip_newlines();

        Ok(Expr::Assign {
            target: Box::new(target),
            op,
            value: Box::new(self.parse_assignment()?),
            location,
        })
    }

    fn parse_ternary(&mut self) -> Result<Expr> {
        let condition = self.parse_or()?;

        let location = self.current_location();
        if !self.match_token(&TokenKind::Question) {
            return Ok(condition);
        }
        // Both branches may be assignments
        self.skip_newlines();
        let if_true = self.parse_assignment()?;
        self.skip_newlines();
        self.expect(&TokenKind::Colon)?;
        self.skip_newlines();
        let if_false = self.parse_assignment()?;

        Ok(Expr::Ternary {
            condition: Box::new(condition),
            if_true: Box::new(if_true),
            if_false: Box::new(if_false),
            location,
        })
    }

    /// One left-associative level: `operand {op operand}`
    fn left_assoc(&mut self, operand: Level, ops: &[(TokenKind, BinaryOp)]) -> Result<Expr> {
        let mut expr = operand(self)?;
        loop {
            let location = self.current_location();
            let Some(&(_, op)) = ops.iter().find(|(kind, _)| self.check(kind)) else {
                return Ok(expr);
            };
            self.advance();
            if matches!(op, BinaryOp::And | BinaryOp::Or) {
                self.skip_newlines();
            }
            let right = operand(self)?;
            expr = binary(expr, op, right, location);
        }
    }

    fn parse_or(&mut self) -> Result<Expr> {
        self.left_assoc(Self::parse_and, OR)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        self.left_assoc(Self::parse_in, AND)
    }

    fn parse_in(&mut self) -> Result<Expr> {
        let mut expr = self.parse_relational()?;
        loop {
            let location = self.current_location();
            if !self.match_token(&TokenKind::In) {
                return Ok(expr);
            }
            expr = Expr::Contains {
                key: vec![expr],
                array: self.expect_identifier()?,
                location,
            };
        }
    }

    /// Comparison and match operators share one non-associative level. An
    /// unparenthesized `>` inside a print list is left for the redirection
    /// check.
    fn parse_relational(&mut self) -> Result<Expr> {
        let left = self.parse_concat()?;

        let location = self.current_location();
        let op = match self.peek_kind() {
            Some(TokenKind::Less) => Ok(BinaryOp::Lt),
            Some(TokenKind::LessEqual) => Ok(BinaryOp::Le),
            Some(TokenKind::Greater) if !self.in_print => Ok(BinaryOp::Gt),
            Some(TokenKind::GreaterEqual) => Ok(BinaryOp::Ge),
            Some(TokenKind::Equal) => Ok(BinaryOp::Eq),
            Some(TokenKind::NotEqual) => Ok(BinaryOp::Ne),
            Some(TokenKind::Match) => Err(false),
            Some(TokenKind::NotMatch) => Err(true),
            _ => return Ok(left),
        };
        self.advance();
        let right = self.parse_concat()?;

        Ok(match op {
            Ok(op) => binary(left, op, right, location),
            Err(negated) => Expr::Match {
                expr: Box::new(left),
                pattern: Box::new(right),
                negated,
                location,
            },
        })
    }

    fn parse_concat(&mut self) -> Result<Expr> {
        let mut expr = self.parse_additive()?;
        while self.can_start_concat_operand() {
            let location = expr.location();
            let right = self.parse_additive()?;
            expr = binary(expr, BinaryOp::Concat, right, location);
        }
        Ok(expr)
    }

    /// `-` and `+` are excluded so that `a - b` stays a subtraction
    fn can_start_concat_operand(&self) -> bool {
        matches!(
            self.peek_kind(),
            Some(
                TokenKind::Number(_)
                    | TokenKind::String(_)
                    | TokenKind::Identifier(_)
                    | TokenKind::FuncName(_)
                    | TokenKind::Builtin(_)
                    | TokenKind::Dollar
                    | TokenKind::LeftParen
                    | TokenKind::Not
                    | TokenKind::Increment
                    | TokenKind::Decrement
            )
        )
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        self.left_assoc(Self::parse_multiplicative, ADDITIVE)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        self.left_assoc(Self::parse_unary, MULTIPLICATIVE)
    }

    /// Looser than `^`: `-2^2` is `-(2^2)`
    fn parse_unary(&mut self) -> Result<Expr> {
        let location = self.current_location();
        let op = match self.peek_kind() {
            Some(TokenKind::Not) => UnaryOp::Not,
            Some(TokenKind::Minus) => UnaryOp::Neg,
            Some(TokenKind::Plus) => UnaryOp::Pos,
            _ => return self.parse_power(),
        };
        self.advance();

        Ok(Expr::Unary {
            op,
            operand: Box::new(self.parse_unary()?),
            location,
        })
    }

    /// Right-associative; the exponent may carry its own sign
    fn parse_power(&mut self) -> Result<Expr> {
        let base = self.parse_increment()?;
        let location = self.current_location();
        if !self.match_token(&TokenKind::Caret) {
            return Ok(base);
        }
        let exponent = self.parse_unary()?;
        Ok(binary(base, BinaryOp::Pow, exponent, location))
    }

    fn parse_increment(&mut self) -> Result<Expr> {
        let location = self.current_location();
        let (symbol, build): (&str, fn(Box<Expr>, SourceLocation) -> Expr) = match self.peek_kind() {
            Some(TokenKind::Increment) => ("++", Expr::PreIncrement),
            Some(TokenKind::Decrement) => ("--", Expr::PreDecrement),
            _ => return self.parse_postfix(),
        };
        self.advance();

        let operand = self.parse_increment()?;
        if !operand.is_lvalue() {
            let loc = operand.location();
            return Err(Error::syntax(
                format!("'{}' applied to a non-lvalue", symbol),
                loc.line,
                loc.column,
            ));
        }
        Ok(build(Box::new(operand), location))
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let operand = self.parse_field()?;
        if !operand.is_lvalue() {
            return Ok(operand);
        }

        let location = self.current_location();
        if self.match_token(&TokenKind::Increment) {
            Ok(Expr::PostIncrement(Box::new(operand), location))
        } else if self.match_token(&TokenKind::Decrement) {
            Ok(Expr::PostDecrement(Box::new(operand), location))
        } else {
            Ok(operand)
        }
    }

    /// `$` binds tighter than everything but grouping; `$-1` and `$++i` are
    /// accepted so the error surfaces at run time.
    pub(super) fn parse_field(&mut self) -> Result<Expr> {
        let location = self.current_location();
        if !self.match_token(&TokenKind::Dollar) {
            return self.parse_primary();
        }

        let index = match self.peek_kind() {
            Some(TokenKind::Increment | TokenKind::Decrement) => self.parse_increment()?,
            Some(TokenKind::Minus) => {
                let minus_location = self.current_location();
                self.advance();
                Expr::Unary {
                    op: UnaryOp::Neg,
                    operand: Box::new(self.parse_field()?),
                    location: minus_location,
                }
            }
            _ => self.parse_field()?,
        };
        Ok(Expr::Field(Box::new(index), location))
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let location = self.current_location();
        let Some(kind) = self.peek_kind().cloned() else {
            return Err(self.unexpected("expression"));
        };

        match kind {
            TokenKind::Minus | TokenKind::Plus | TokenKind::Not => return self.parse_unary(),
            TokenKind::Getline => {
                self.advance();
                return self.parse_getline(location);
            }
            TokenKind::LeftParen => {
                self.advance();
                return self.parse_group(location);
            }
            _ => {}
        }

        let expr = match kind {
            TokenKind::Number(n) => Expr::Number(n, location),
            TokenKind::String(s) => Expr::String(s, location),
            TokenKind::Regex(r) => Expr::Regex(r, location),
            TokenKind::Identifier(name) => {
                self.advance();
                if self.match_token(&TokenKind::LeftBracket) {
                    return Ok(Expr::Element {
                        array: name,
                        indices: self.parse_subscripts()?,
                        location,
                    });
                }
                return Ok(Expr::Var(name, location));
            }
            TokenKind::FuncName(name) => {
                self.advance();
                return Ok(Expr::Call {
                    name,
                    args: self.parse_call_args()?,
                    location,
                });
            }
            TokenKind::Builtin(func) => {
                self.advance();
                return self.parse_builtin_call(func, location);
            }
            _ => return Err(self.unexpected("expression")),
        };
        self.advance();
        Ok(expr)
    }

    /// Only `length` may appear without an argument list
    fn parse_builtin_call(&mut self, func: Builtin, location: SourceLocation) -> Result<Expr> {
        let args = if self.check(&TokenKind::LeftParen) {
            self.parse_call_args()?
        } else if func == Builtin::Length {
            Vec::new()
        } else {
            return Err(Error::syntax(
                format!("built-in function '{}' requires arguments", func.name()),
                location.line,
                location.column,
            ));
        };
        Ok(Expr::BuiltinCall {
            func,
            args,
            location,
        })
    }

    /// `(expr)` or `(a, b) in array`
    fn parse_group(&mut self, location: SourceLocation) -> Result<Expr> {
        let mut list = self.nested(Self::parse_expression_list)?;
        self.expect(&TokenKind::RightParen)?;

        if list.len() == 1 {
            return Ok(Expr::Paren(Box::new(list.remove(0)), location));
        }
        if !self.match_token(&TokenKind::In) {
            return Err(self.error_here("expected 'in' after parenthesized subscript list"));
        }
        Ok(Expr::Contains {
            key: list,
            array: self.expect_identifier()?,
            location,
        })
    }

    fn parse_call_args(&mut self) -> Result<Vec<Expr>> {
        self.expect(&TokenKind::LeftParen)?;
        if self.match_token(&TokenKind::RightParen) {
            return Ok(Vec::new());
        }
        let args = self.nested(Self::parse_expression_list)?;
        self.expect(&TokenKind::RightParen)?;
        Ok(args)
    }

    /// `getline [lvalue] [< file]`
    fn parse_getline(&mut self, location: SourceLocation) -> Result<Expr> {
        let target = match self.peek_kind() {
            Some(TokenKind::Identifier(_) | TokenKind::Dollar) => Some(Box::new(self.parse_field()?)),
            _ => None,
        };
        let file = if self.match_token(&TokenKind::Less) {
            Some(Box::new(self.parse_increment()?))
        } else {
            None
        };
        Ok(Expr::Getline {
            target,
            file,
            location,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::*;
    use crate::parser::parse_program;

    fn expr(source: &str) -> Expr {
        let program = parse_program(&format!("{{ {} }}", source)).unwrap();
        match &program.rules[0].action.as_ref().unwrap().statements[0] {
            Stmt::Expr(e) => e.clone(),
            other => panic!("expected expression statement, got {other:?}"),
        }
    }

    fn op_of(e: &Expr) -> BinaryOp {
        match e {
            Expr::Binary { op, .. } => *op,
            other => panic!("expected binary expression, got {other:?}"),
        }
    }

    #[test]
    fn test_left_associative_levels() {
        let Expr::Binary { left, op, .. } = expr("10 - 4 - 3") else {
            panic!("expected subtraction");
        };
        assert_eq!(op, BinaryOp::Sub);
        assert_eq!(op_of(&left), BinaryOp::Sub);

        let Expr::Binary { right, op, .. } = expr("1 + 2 * 3") else {
            panic!("expected addition");
        };
        assert_eq!(op, BinaryOp::Add);
        assert_eq!(op_of(&right), BinaryOp::Mul);
    }

    #[test]
    fn test_logical_operators_continue_across_newlines() {
        let e = expr("a &&\n b ||\n c");
        assert_eq!(op_of(&e), BinaryOp::Or);
    }

    #[test]
    fn test_match_operators() {
        assert!(matches!(expr("$1 ~ /x/"), Expr::Match { negated: false, .. }));
        assert!(matches!(expr("$1 !~ \"y\""), Expr::Match { negated: true, .. }));
    }

    #[test]
    fn test_in_after_comparison() {
        assert!(matches!(expr("k in seen"), Expr::Contains { ref key, .. } if key.len() == 1));
    }

    #[test]
    fn test_increment_forms() {
        assert!(matches!(expr("++x"), Expr::PreIncrement(..)));
        assert!(matches!(expr("a[1]--"), Expr::PostDecrement(..)));
        assert!(matches!(expr("$++i"), Expr::Field(ref inner, _) if matches!(**inner, Expr::PreIncrement(..))));
        assert!(parse_program("{ ++3 }").is_err());
    }

    #[test]
    fn test_ternary_is_right_associative() {
        let Expr::Ternary { if_false, .. } = expr("a ? 1 : b ? 2 : 3") else {
            panic!("expected ternary");
        };
        assert!(matches!(*if_false, Expr::Ternary { .. }));
    }

    #[test]
    fn test_compound_assignment_chains() {
        let Expr::Assign { op, value, .. } = expr("x += y = 2") else {
            panic!("expected assignment");
        };
        assert_eq!(op, AssignOp::AddAssign);
        assert!(matches!(*value, Expr::Assign { op: AssignOp::Assign, .. }));
    }
}
