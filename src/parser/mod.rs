pub mod analysis;
mod expr;

use crate::ast::*;
use crate::error::{Error, Result, SourceLocation};
use crate::lexer::{Lexer, Token, TokenKind};

/// Lex and parse `source` into a [`Program`], including the array-parameter
/// analysis of user functions.
pub fn parse_program(source: &str) -> Result<Program> {
    let tokens = Lexer::new(source).tokenize()?;
    Parser::new(tokens).parse()
}

/// Recursive-descent parser over a token stream. Statement structure is
/// handled here, the expression grammar in `expr.rs`.
pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    /// Inside an unparenthesized print/printf list, `>` is not a comparison
    in_print: bool,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            current: 0,
            in_print: false,
        }
    }

    /// Rules and function definitions, in any order, separated by newlines
    /// or semicolons
    pub fn parse(&mut self) -> Result<Program> {
        let mut program = Program::new();

        self.skip_terminators();

        while !self.is_at_end() {
            if self.check(&TokenKind::Function) {
                let function = self.parse_function()?;
                if program.function(&function.name).is_some() {
                    return Err(Error::syntax(
                        format!("function '{}' is already defined", function.name),
                        function.location.line,
                        function.location.column,
                    ));
                }
                program.functions.push(function);
            } else {
                program.rules.push(self.parse_rule()?);
            }
            self.skip_terminators();
        }

        analysis::resolve_array_params(&mut program);
        Ok(program)
    }

    fn parse_function(&mut self) -> Result<FunctionDef> {
        let location = self.current_location();
        self.expect(&TokenKind::Function)?;

        let name = match self.peek_kind() {
            Some(TokenKind::FuncName(name) | TokenKind::Identifier(name)) => {
                let name = name.clone();
                self.advance();
                name
            }
            Some(TokenKind::Builtin(b)) => {
                return Err(self.error_here(format!(
                    "cannot redefine built-in function '{}'",
                    b.name()
                )));
            }
            _ => return Err(self.unexpected("function name")),
        };
        self.expect(&TokenKind::LeftParen)?;

        let mut params: Vec<String> = Vec::new();
        if !self.check(&TokenKind::RightParen) {
            loop {
                let param = self.expect_identifier()?;
                if param == name || params.contains(&param) {
                    return Err(self.error_here(format!(
                        "invalid parameter '{}' in function '{}'",
                        param, name
                    )));
                }
                params.push(param);
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RightParen)?;
        self.skip_newlines();

        let body = self.parse_block()?;

        Ok(FunctionDef {
            array_params: vec![false; params.len()],
            name,
            params,
            body,
            location,
        })
    }

    fn parse_rule(&mut self) -> Result<Rule> {
        let location = self.current_location();
        let special = match self.peek_kind() {
            Some(TokenKind::Begin) => Some((Pattern::Begin, "BEGIN")),
            Some(TokenKind::End) => Some((Pattern::End, "END")),
            _ => None,
        };

        let pattern = match special {
            Some((pattern, keyword)) => {
                self.advance();
                self.skip_newlines();
                if !self.check(&TokenKind::LeftBrace) {
                    return Err(self.error_here(format!("{} requires an action block", keyword)));
                }
                Some(pattern)
            }
            None if self.check(&TokenKind::LeftBrace) => None,
            None => Some(self.parse_rule_pattern()?),
        };

        // The action must start on the same line as the pattern
        let action = if self.check(&TokenKind::LeftBrace) {
            Some(self.parse_block()?)
        } else {
            self.end_simple_statement()?;
            None
        };

        Ok(Rule {
            pattern,
            action,
            location,
        })
    }

    /// `expr`, `/re/` or a range `start, end`
    fn parse_rule_pattern(&mut self) -> Result<Pattern> {
        let start = self.parse_pattern()?;
        if !self.match_token(&TokenKind::Comma) {
            return Ok(start);
        }
        self.skip_newlines();
        let end = self.parse_pattern()?;
        Ok(Pattern::Range {
            start: Box::new(start),
            end: Box::new(end),
        })
    }

    fn parse_pattern(&mut self) -> Result<Pattern> {
        Ok(match self.parse_expression()? {
            Expr::Regex(re, _) => Pattern::Regex(re),
            expr => Pattern::Expr(expr),
        })
    }

    fn parse_block(&mut self) -> Result<Block> {
        let location = self.current_location();
        self.expect(&TokenKind::LeftBrace)?;
        self.skip_terminators();

        let mut statements = Vec::new();

        while !self.check(&TokenKind::RightBrace) {
            if self.is_at_end() {
                return Err(self.error_here("missing '}' at end of block"));
            }
            statements.push(self.parse_statement()?);
            self.skip_terminators();
        }

        self.expect(&TokenKind::RightBrace)?;

        Ok(Block::new(statements, location))
    }

    fn parse_statement(&mut self) -> Result<Stmt> {
        self.skip_newlines();
        let location = self.current_location();

        let compound = match self.peek_kind() {
            Some(TokenKind::Semicolon) => {
                self.advance();
                return Ok(Stmt::Empty);
            }
            Some(TokenKind::LeftBrace) => return Ok(Stmt::Block(self.parse_block()?)),
            Some(TokenKind::If) => Self::parse_if_statement,
            Some(TokenKind::While) => Self::parse_while_statement,
            Some(TokenKind::For) => Self::parse_for_statement,
            Some(TokenKind::Do) => Self::parse_do_while_statement,
            _ => {
                let stmt = self.parse_simple_statement(location)?;
                self.end_simple_statement()?;
                return Ok(stmt);
            }
        };
        self.advance();
        compound(self, location)
    }

    fn parse_simple_statement(&mut self, location: SourceLocation) -> Result<Stmt> {
        let Some(keyword) = self.peek_kind().cloned() else {
            return Err(self.unexpected("statement"));
        };
        let is_keyword = matches!(
            keyword,
            TokenKind::Break
                | TokenKind::Continue
                | TokenKind::Next
                | TokenKind::NextFile
                | TokenKind::Exit
                | TokenKind::Return
                | TokenKind::Delete
                | TokenKind::Print
                | TokenKind::Printf
        );
        if !is_keyword {
            return Ok(Stmt::Expr(self.parse_expression()?));
        }
        self.advance();

        Ok(match keyword {
            TokenKind::Break => Stmt::Break { location },
            TokenKind::Continue => Stmt::Continue { location },
            TokenKind::Next => Stmt::Next { location },
            TokenKind::NextFile => Stmt::NextFile { location },
            TokenKind::Exit => Stmt::Exit {
                code: self.parse_optional_expression()?,
                location,
            },
            TokenKind::Return => Stmt::Return {
                value: self.parse_optional_expression()?,
                location,
            },
            TokenKind::Delete => {
                let array = self.expect_identifier()?;
                let index = if self.match_token(&TokenKind::LeftBracket) {
                    self.parse_subscripts()?
                } else {
                    Vec::new()
                };
                Stmt::Delete {
                    array,
                    index,
                    location,
                }
            }
            TokenKind::Print => Stmt::Print {
                args: self.parse_print_args()?,
                location,
            },
            _ => {
                let mut args = self.parse_print_args()?;
                if args.is_empty() {
                    return Err(self.error_here("printf requires a format argument"));
                }
                let format = args.remove(0);
                Stmt::Printf {
                    format,
                    args,
                    location,
                }
            }
        })
    }

    fn parse_optional_expression(&mut self) -> Result<Option<Expr>> {
        if self.can_start_expression() {
            self.parse_expression().map(Some)
        } else {
            Ok(None)
        }
    }

    /// A simple statement ends at `;`, a newline, `}` or end of input
    fn end_simple_statement(&mut self) -> Result<()> {
        if self.match_token(&TokenKind::Semicolon) || self.match_token(&TokenKind::Newline) {
            return Ok(());
        }
        if self.check(&TokenKind::RightBrace) || self.is_at_end() {
            return Ok(());
        }
        Err(self.unexpected("end of statement"))
    }

    /// `( expr )` heading an if, while or do-while
    fn parse_condition(&mut self) -> Result<Expr> {
        self.expect(&TokenKind::LeftParen)?;
        let condition = self.nested(Self::parse_expression)?;
        self.expect(&TokenKind::RightParen)?;
        Ok(condition)
    }

    /// Loop body; a `;` right after the header is an empty body
    fn parse_loop_body(&mut self) -> Result<Box<Stmt>> {
        if self.match_token(&TokenKind::Semicolon) {
            return Ok(Box::new(Stmt::Empty));
        }
        self.skip_newlines();
        Ok(Box::new(self.parse_statement()?))
    }

    fn parse_if_statement(&mut self, location: SourceLocation) -> Result<Stmt> {
        let condition = self.parse_condition()?;
        self.skip_newlines();
        let then_stmt = Box::new(self.parse_statement()?);

        // `else` may follow the then-branch's terminator
        let before_else = self.current;
        self.skip_terminators();
        let else_stmt = if self.match_token(&TokenKind::Else) {
            self.skip_newlines();
            Some(Box::new(self.parse_statement()?))
        } else {
            self.current = before_else;
            None
        };

        Ok(Stmt::If {
            condition,
            then_stmt,
            else_stmt,
            location,
        })
    }

    fn parse_while_statement(&mut self, location: SourceLocation) -> Result<Stmt> {
        let condition = self.parse_condition()?;
        Ok(Stmt::While {
            condition,
            body: self.parse_loop_body()?,
            location,
        })
    }

    fn parse_do_while_statement(&mut self, location: SourceLocation) -> Result<Stmt> {
        self.skip_newlines();
        let body = Box::new(self.parse_statement()?);
        self.skip_terminators();
        self.expect(&TokenKind::While)?;
        let condition = self.parse_condition()?;
        self.end_simple_statement()?;

        Ok(Stmt::DoWhile {
            body,
            condition,
            location,
        })
    }

    fn parse_for_statement(&mut self, location: SourceLocation) -> Result<Stmt> {
        self.expect(&TokenKind::LeftParen)?;
        if let Some((var, array)) = self.try_for_in_header() {
            return Ok(Stmt::ForIn {
                var,
                array,
                body: self.parse_loop_body()?,
                location,
            });
        }

        let init = self
            .parse_for_clause(&TokenKind::Semicolon)?
            .map(|expr| Box::new(Stmt::Expr(expr)));
        let condition = self.parse_for_clause(&TokenKind::Semicolon)?;
        let update = self.parse_for_clause(&TokenKind::RightParen)?;

        Ok(Stmt::For {
            init,
            condition,
            update,
            body: self.parse_loop_body()?,
            location,
        })
    }

    /// `name in array )`; rewinds and returns `None` for a C-style header
    fn try_for_in_header(&mut self) -> Option<(String, String)> {
        let start = self.current;
        let header = self.for_in_header();
        if header.is_none() {
            self.current = start;
        }
        header
    }

    fn for_in_header(&mut self) -> Option<(String, String)> {
        let Some(TokenKind::Identifier(var)) = self.peek_kind().cloned() else {
            return None;
        };
        self.advance();
        if !self.match_token(&TokenKind::In) {
            return None;
        }
        let Some(TokenKind::Identifier(array)) = self.peek_kind().cloned() else {
            return None;
        };
        self.advance();
        self.match_token(&TokenKind::RightParen).then_some((var, array))
    }

    /// One optional clause of a C-style `for` header and its terminator
    fn parse_for_clause(&mut self, terminator: &TokenKind) -> Result<Option<Expr>> {
        let clause = if self.check(terminator) {
            None
        } else {
            Some(self.nested(Self::parse_expression)?)
        };
        self.expect(terminator)?;
        self.skip_newlines();
        Ok(clause)
    }

    /// Arguments of print/printf: `(a, b)`, `a, b` or nothing
    fn parse_print_args(&mut self) -> Result<Vec<Expr>> {
        if let Some(list) = self.try_parenthesized_print_list()? {
            self.reject_redirection()?;
            return Ok(list);
        }

        let mut args = Vec::new();
        if self.can_start_expression() {
            let saved = std::mem::replace(&mut self.in_print, true);
            let result = self.parse_expression_list();
            self.in_print = saved;
            args = result?;
        }

        self.reject_redirection()?;
        Ok(args)
    }

    /// `print (a, b)` where the closing paren ends the argument list.
    /// Anything else backtracks so `print (a)(b)` parses as a concatenation.
    fn try_parenthesized_print_list(&mut self) -> Result<Option<Vec<Expr>>> {
        if !self.check(&TokenKind::LeftParen) {
            return Ok(None);
        }
        let saved_pos = self.current;
        self.advance();

        let list = match self.nested(Self::parse_expression_list) {
            Ok(list) => list,
            Err(_) => {
                self.current = saved_pos;
                return Ok(None);
            }
        };

        if self.match_token(&TokenKind::RightParen) && self.at_print_end() {
            return Ok(Some(list));
        }

        self.current = saved_pos;
        Ok(None)
    }

    fn at_print_end(&self) -> bool {
        matches!(
            self.peek_kind(),
            None | Some(
                TokenKind::Semicolon
                    | TokenKind::Newline
                    | TokenKind::RightBrace
                    | TokenKind::Eof
                    | TokenKind::Greater
                    | TokenKind::Append
                    | TokenKind::Pipe
            )
        )
    }

    fn reject_redirection(&self) -> Result<()> {
        let symbol = match self.peek_kind() {
            Some(TokenKind::Greater) => ">",
            Some(TokenKind::Append) => ">>",
            Some(TokenKind::Pipe) => "|",
            _ => return Ok(()),
        };
        Err(self.error_here(format!(
            "output redirection '{}' is not supported",
            symbol
        )))
    }

    /// Run `f` with print context cleared, for parenthesized and bracketed
    /// sub-expressions where `>` is an ordinary comparison again.
    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let saved = std::mem::replace(&mut self.in_print, false);
        let result = f(self);
        self.in_print = saved;
        result
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.tokens.get(self.current).map(|t| &t.kind)
    }

    fn current_location(&self) -> SourceLocation {
        self.tokens
            .get(self.current)
            .or_else(|| self.tokens.last())
            .map(|t| t.location)
            .unwrap_or(SourceLocation::new(1, 1))
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek_kind(), None | Some(TokenKind::Eof))
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek_kind()
            .is_some_and(|k| std::mem::discriminant(k) == std::mem::discriminant(kind))
    }

    fn advance(&mut self) {
        if !self.is_at_end() {
            self.current += 1;
        }
    }

    fn match_token(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<()> {
        if self.check(kind) {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(&kind.describe()))
        }
    }

    fn expect_identifier(&mut self) -> Result<String> {
        if let Some(TokenKind::Identifier(name)) = self.peek_kind() {
            let name = name.clone();
            self.advance();
            Ok(name)
        } else {
            Err(self.unexpected("identifier"))
        }
    }

    fn error_here(&self, message: impl Into<String>) -> Error {
        let loc = self.current_location();
        Error::syntax(message, loc.line, loc.column)
    }

    fn unexpected(&self, expected: &str) -> Error {
        let found = self
            .peek_kind()
            .map(|k| k.describe())
            .unwrap_or_else(|| "end of input".to_string());
        self.error_here(format!("expected {}, found {}", expected, found))
    }

    fn skip_newlines(&mut self) {
        while self.match_token(&TokenKind::Newline) {}
    }

    fn skip_terminators(&mut self) {
        while self.match_token(&TokenKind::Newline) || self.match_token(&TokenKind::Semicolon) {}
    }

    fn can_start_expression(&self) -> bool {
        self.peek_kind().is_some_and(|k| k.can_start_expression())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn parse(source: &str) -> Result<Program> {
        parse_program(source)
    }

    fn first_stmt(source: &str) -> Stmt {
        let program = parse(source).unwrap();
        let action = program.rules[0].action.clone().unwrap();
        action.statements[0].clone()
    }

    #[test]
    fn test_simple_print() {
        let program = parse(r#"{ print "hello" }"#).unwrap();
        assert_eq!(program.rules.len(), 1);
        assert!(program.rules[0].pattern.is_none());
    }

    #[test]
    fn test_begin_end() {
        let program = parse(r#"BEGIN { x = 1 } END { print x }"#).unwrap();
        assert_eq!(program.rules.len(), 2);
        assert!(matches!(program.rules[0].pattern, Some(Pattern::Begin)));
        assert!(matches!(program.rules[1].pattern, Some(Pattern::End)));
    }

    #[test]
    fn test_begin_requires_action() {
        let err = parse("BEGIN\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Syntax);
        assert!(err.to_string().contains("BEGIN requires an action"));
    }

    #[test]
    fn test_regex_pattern() {
        let program = parse(r#"/foo/ { print }"#).unwrap();
        assert!(matches!(
            &program.rules[0].pattern,
            Some(Pattern::Regex(r)) if r == "foo"
        ));
    }

    #[test]
    fn test_pattern_without_action() {
        let program = parse("NR == 1\n$1 > 3").unwrap();
        assert_eq!(program.rules.len(), 2);
        assert!(program.rules.iter().all(|r| r.action.is_none()));
    }

    #[test]
    fn test_range_pattern() {
        let program = parse("/start/, /stop/ { print }").unwrap();
        assert!(matches!(
            &program.rules[0].pattern,
            Some(Pattern::Range { start, end })
                if matches!(**start, Pattern::Regex(_)) && matches!(**end, Pattern::Regex(_))
        ));
    }

    #[test]
    fn test_nested_braces_in_action() {
        let program = parse("{ if (x) { y = \"}\" } } END { print /}/ }").unwrap();
        assert_eq!(program.rules.len(), 2);
    }

    #[test]
    fn test_unary_minus_binds_looser_than_power() {
        let Stmt::Expr(expr) = first_stmt("{ -2^2 }") else {
            panic!("expected expression statement");
        };
        assert!(matches!(
            expr,
            Expr::Unary { op: UnaryOp::Neg, operand, .. }
                if matches!(*operand, Expr::Binary { op: BinaryOp::Pow, .. })
        ));
    }

    #[test]
    fn test_power_is_right_associative() {
        let Stmt::Expr(Expr::Binary { op, right, .. }) = first_stmt("{ 2^3^2 }") else {
            panic!("expected binary expression");
        };
        assert_eq!(op, BinaryOp::Pow);
        assert!(matches!(*right, Expr::Binary { op: BinaryOp::Pow, .. }));
    }

    #[test]
    fn test_concatenation_below_additive() {
        let Stmt::Expr(Expr::Binary { op, .. }) = first_stmt("{ 1 \" \" 2 + 3 }") else {
            panic!("expected binary expression");
        };
        assert_eq!(op, BinaryOp::Concat);
    }

    #[test]
    fn test_print_greater_is_rejected() {
        let err = parse(r#"{ print "x" > "out.txt" }"#).unwrap_err();
        assert!(err.to_string().contains("output redirection '>'"));
        let err = parse(r#"{ print "x" | "sort" }"#).unwrap_err();
        assert!(err.to_string().contains("'|'"));
    }

    #[test]
    fn test_print_comparison_in_parens() {
        let Stmt::Print { args, .. } = first_stmt("{ print (1 > 2) }") else {
            panic!("expected print");
        };
        assert_eq!(args.len(), 1);
    }

    #[test]
    fn test_print_grouped_list() {
        let Stmt::Print { args, .. } = first_stmt("{ print (1, 2) }") else {
            panic!("expected print");
        };
        assert_eq!(args.len(), 2);

        let Stmt::Print { args, .. } = first_stmt("{ print (1)(2) }") else {
            panic!("expected print");
        };
        assert_eq!(args.len(), 1);
    }

    #[test]
    fn test_multi_subscript_in() {
        let Stmt::Expr(expr) = first_stmt("{ (i, j) in arr }") else {
            panic!("expected expression");
        };
        assert!(matches!(expr, Expr::Contains { key, .. } if key.len() == 2));
    }

    #[test]
    fn test_assignment_to_non_lvalue() {
        let err = parse("{ 1 = 2 }").unwrap_err();
        assert!(err.to_string().contains("non-lvalue"));
    }

    #[test]
    fn test_statements_need_terminators() {
        assert!(parse("{ x = 1 y = 2 }").is_err());
        assert!(parse("{ x = 1; y = 2 }").is_ok());
        assert!(parse("{ x = 1\n y = 2 }").is_ok());
    }

    #[test]
    fn test_if_else_across_terminators() {
        let stmt = first_stmt("{ if (x) print \"a\"; else print \"b\" }");
        assert!(matches!(stmt, Stmt::If { else_stmt: Some(_), .. }));

        let program = parse("{ if (x) print \"a\"\n print \"b\" }").unwrap();
        let statements = &program.rules[0].action.as_ref().unwrap().statements;
        assert_eq!(statements.len(), 2);
    }

    #[test]
    fn test_loops() {
        assert!(matches!(first_stmt("{ for (k in a) print k }"), Stmt::ForIn { .. }));
        assert!(matches!(
            first_stmt("{ for (i = 0; i < 3; i++) print i }"),
            Stmt::For { init: Some(_), condition: Some(_), update: Some(_), .. }
        ));
        assert!(matches!(
            first_stmt("{ do { i++ } while (i < 3) }"),
            Stmt::DoWhile { .. }
        ));
        assert!(matches!(first_stmt("{ for (;;) break }"), Stmt::For { init: None, .. }));
    }

    #[test]
    fn test_getline_forms() {
        assert!(matches!(
            first_stmt("{ getline }"),
            Stmt::Expr(Expr::Getline { target: None, file: None, .. })
        ));
        assert!(matches!(
            first_stmt("{ getline line < \"f.txt\" }"),
            Stmt::Expr(Expr::Getline { target: Some(_), file: Some(_), .. })
        ));
        assert!(matches!(
            first_stmt("{ while ((getline line) > 0) n++ }"),
            Stmt::While { .. }
        ));
    }

    #[test]
    fn test_function_def() {
        let program = parse("function add(a, b) { return a + b }").unwrap();
        assert_eq!(program.functions.len(), 1);
        assert_eq!(program.functions[0].name, "add");
        assert_eq!(program.functions[0].params, vec!["a", "b"]);

        let program = parse("func f (x) { return x }").unwrap();
        assert_eq!(program.functions[0].name, "f");
    }

    #[test]
    fn test_function_errors() {
        assert!(parse("function f(a) { } function f(b) { }").is_err());
        assert!(parse("function length(s) { return 1 }").is_err());
        assert!(parse("function f(a, a) { }").is_err());
    }

    #[test]
    fn test_length_without_parens() {
        assert!(matches!(
            first_stmt("{ print length }"),
            Stmt::Print { args, .. }
                if matches!(args[0], Expr::BuiltinCall { func: Builtin::Length, ref args, .. } if args.is_empty())
        ));
        assert!(parse("{ x = substr }").is_err());
    }

    #[test]
    fn test_call_vs_concatenation() {
        assert!(matches!(
            first_stmt("{ foo(1) }"),
            Stmt::Expr(Expr::Call { .. })
        ));
        assert!(matches!(
            first_stmt("{ x = foo (1) }"),
            Stmt::Expr(Expr::Assign { value, .. })
                if matches!(*value, Expr::Binary { op: BinaryOp::Concat, .. })
        ));
    }

    #[test]
    fn test_rules_separated_by_semicolons() {
        let program = parse("BEGIN { x = 1 }; { print }; END { print x }").unwrap();
        assert_eq!(program.rules.len(), 3);
    }

    #[test]
    fn test_syntax_error_location() {
        let err = parse("{ print 1 }\n{ x = ) }").unwrap_err();
        let loc = err.location().unwrap();
        assert_eq!(loc.line, 2);
        assert!(err.to_string().contains("')'"));
    }

    #[test]
    fn test_unterminated_block() {
        let err = parse("{ print 1").unwrap_err();
        assert!(err.to_string().contains("missing '}'"));
    }
}
