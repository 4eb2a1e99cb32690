//! Syntax tree produced by [`crate::parser`] and walked by
//! [`crate::interpreter`]. Every node that can fail at run time carries the
//! [`SourceLocation`] it was parsed from.

use crate::error::SourceLocation;

/// Rules in source order plus the function definitions
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub rules: Vec<Rule>,
    pub functions: Vec<FunctionDef>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn function(&self, name: &str) -> Option<&FunctionDef> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// True when every rule is a BEGIN rule, so no input needs to be read
    pub fn only_begin(&self) -> bool {
        self.rules
            .iter()
            .all(|r| matches!(r.pattern, Some(Pattern::Begin)))
    }
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub pattern: Option<Pattern>,
    /// `None` means the default action, `print $0`
    pub action: Option<Block>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone)]
pub enum Pattern {
    Begin,
    End,
    /// Selects the record when truthy
    Expr(Expr),
    /// `/re/`, matched against `$0`
    Regex(String),
    /// `start, end`: on from a record matching `start` through the next one
    /// matching `end`
    Range {
        start: Box<Pattern>,
        end: Box<Pattern>,
    },
}

/// `function name(params) { body }`
#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<String>,
    /// Per parameter: whether the body uses it as an array.
    /// Filled in by [`crate::parser::analysis`] after parsing.
    pub array_params: Vec<bool>,
    pub body: Block,
    pub location: SourceLocation,
}

impl FunctionDef {
    pub fn param_index(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|p| p == name)
    }

    pub fn is_array_param(&self, index: usize) -> bool {
        self.array_params.get(index).copied().unwrap_or(false)
    }
}

#[derive(Debug, Clone)]
pub struct Block {
    pub statements: Vec<Stmt>,
    pub location: SourceLocation,
}

impl Block {
    pub fn new(statements: Vec<Stmt>, location: SourceLocation) -> Self {
        Self { statements, location }
    }
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Expr(Expr),

    /// With no arguments prints `$0`
    Print {
        args: Vec<Expr>,
        location: SourceLocation,
    },

    Printf {
        format: Expr,
        args: Vec<Expr>,
        location: SourceLocation,
    },

    If {
        condition: Expr,
        then_stmt: Box<Stmt>,
        else_stmt: Option<Box<Stmt>>,
        location: SourceLocation,
    },

    While {
        condition: Expr,
        body: Box<Stmt>,
        location: SourceLocation,
    },

    DoWhile {
        body: Box<Stmt>,
        condition: Expr,
        location: SourceLocation,
    },

    For {
        init: Option<Box<Stmt>>,
        condition: Option<Expr>,
        update: Option<Expr>,
        body: Box<Stmt>,
        location: SourceLocation,
    },

    /// `for (var in array)`
    ForIn {
        var: String,
        array: String,
        body: Box<Stmt>,
        location: SourceLocation,
    },

    Block(Block),

    Break { location: SourceLocation },

    Continue { location: SourceLocation },

    Next { location: SourceLocation },

    NextFile { location: SourceLocation },

    Exit {
        code: Option<Expr>,
        location: SourceLocation,
    },

    Return {
        value: Option<Expr>,
        location: SourceLocation,
    },

    /// An empty `index` clears the whole array
    Delete {
        array: String,
        index: Vec<Expr>,
        location: SourceLocation,
    },

    Empty,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Number(f64, SourceLocation),

    String(String, SourceLocation),

    /// Regex literal; as a value it matches against $0
    Regex(String, SourceLocation),

    Var(String, SourceLocation),

    /// `$expr`
    Field(Box<Expr>, SourceLocation),

    /// `arr[i]` or `arr[i, j]`; multiple subscripts are joined with SUBSEP
    Element {
        array: String,
        indices: Vec<Expr>,
        location: SourceLocation,
    },

    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
        location: SourceLocation,
    },

    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        location: SourceLocation,
    },

    Assign {
        target: Box<Expr>,
        op: AssignOp,
        value: Box<Expr>,
        location: SourceLocation,
    },

    PreIncrement(Box<Expr>, SourceLocation),

    PreDecrement(Box<Expr>, SourceLocation),

    PostIncrement(Box<Expr>, SourceLocation),

    PostDecrement(Box<Expr>, SourceLocation),

    Ternary {
        condition: Box<Expr>,
        if_true: Box<Expr>,
        if_false: Box<Expr>,
        location: SourceLocation,
    },

    /// User function first, then the external function table
    Call {
        name: String,
        args: Vec<Expr>,
        location: SourceLocation,
    },

    BuiltinCall {
        func: Builtin,
        args: Vec<Expr>,
        location: SourceLocation,
    },

    /// `(key) in array`
    Contains {
        key: Vec<Expr>,
        array: String,
        location: SourceLocation,
    },

    Match {
        expr: Box<Expr>,
        pattern: Box<Expr>,
        negated: bool,
        location: SourceLocation,
    },

    /// getline [lvalue] [< file]; evaluates to 1, 0 or -1
    Getline {
        target: Option<Box<Expr>>,
        file: Option<Box<Expr>>,
        location: SourceLocation,
    },

    /// `(expr)`
    Paren(Box<Expr>, SourceLocation),
}

impl Expr {
    pub fn location(&self) -> SourceLocation {
        match self {
            Expr::Number(_, loc)
            | Expr::String(_, loc)
            | Expr::Regex(_, loc)
            | Expr::Var(_, loc)
            | Expr::Field(_, loc)
            | Expr::Element { location: loc, .. }
            | Expr::Binary { location: loc, .. }
            | Expr::Unary { location: loc, .. }
            | Expr::Assign { location: loc, .. }
            | Expr::PreIncrement(_, loc)
            | Expr::PreDecrement(_, loc)
            | Expr::PostIncrement(_, loc)
            | Expr::PostDecrement(_, loc)
            | Expr::Ternary { location: loc, .. }
            | Expr::Call { location: loc, .. }
            | Expr::BuiltinCall { location: loc, .. }
            | Expr::Contains { location: loc, .. }
            | Expr::Match { location: loc, .. }
            | Expr::Getline { location: loc, .. }
            | Expr::Paren(_, loc) => *loc,
        }
    }

    /// Variable, array element or field reference (grouping is looked through)
    pub fn is_lvalue(&self) -> bool {
        match self {
            Expr::Var(..) | Expr::Element { .. } | Expr::Field(..) => true,
            Expr::Paren(inner, _) => inner.is_lvalue(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
    /// Juxtaposition: `a b`
    Concat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
}

/// `=` or a compound assignment such as `+=`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    ModAssign,
    PowAssign,
}

/// Declares [`Builtin`] from one `name => Variant(min, max)` table so that
/// lookup, naming and arity never drift apart.
macro_rules! builtins {
    ($($name:literal => $variant:ident($min:expr, $max:expr)),* $(,)?) => {
        /// Built-in functions, resolved at lex time
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum Builtin {
            $($variant),*
        }

        impl Builtin {
            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($name => Some(Builtin::$variant),)*
                    _ => None,
                }
            }

            pub fn name(&self) -> &'static str {
                match self {
                    $(Builtin::$variant => $name),*
                }
            }

            /// Accepted argument count, inclusive
            pub fn arity(&self) -> (usize, usize) {
                match self {
                    $(Builtin::$variant => ($min, $max)),*
                }
            }
        }
    };
}

builtins! {
    "length" => Length(0, 1),
    "substr" => Substr(2, 3),
    "index" => Index(2, 2),
    "split" => Split(2, 3),
    "sub" => Sub(2, 3),
    "gsub" => Gsub(2, 3),
    "match" => Match(2, 2),
    "sprintf" => Sprintf(1, usize::MAX),
    "tolower" => Tolower(1, 1),
    "toupper" => Toupper(1, 1),
    "sin" => Sin(1, 1),
    "cos" => Cos(1, 1),
    "atan2" => Atan2(2, 2),
    "exp" => Exp(1, 1),
    "log" => Log(1, 1),
    "sqrt" => Sqrt(1, 1),
    "int" => Int(1, 1),
    "rand" => Rand(0, 0),
    "srand" => Srand(0, 1),
    "asort" => Asort(1, 1),
    "asorti" => Asorti(1, 1),
    "fflush" => Fflush(0, 1),
    "close" => Close(1, 1),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_program;

    #[test]
    fn test_builtin_table() {
        assert_eq!(Builtin::from_name("gsub"), Some(Builtin::Gsub));
        assert_eq!(Builtin::Gsub.name(), "gsub");
        assert_eq!(Builtin::Substr.arity(), (2, 3));
        assert_eq!(Builtin::from_name("system"), None);
        assert_eq!(Builtin::from_name("ai_sentiment"), None);
    }

    #[test]
    fn test_only_begin() {
        assert!(parse_program("BEGIN { x = 1 } BEGIN { print x }").unwrap().only_begin());
        assert!(!parse_program("BEGIN { } END { }").unwrap().only_begin());
        assert!(!parse_program("function f() { } { f() }").unwrap().only_begin());
    }

    #[test]
    fn test_lvalue_through_parens() {
        let program = parse_program("{ (x) = 1 }").unwrap();
        let Some(action) = &program.rules[0].action else {
            panic!("expected an action");
        };
        let Stmt::Expr(Expr::Assign { target, .. }) = &action.statements[0] else {
            panic!("expected an assignment");
        };
        assert!(target.is_lvalue());
        assert!(!Expr::Number(1.0, target.location()).is_lvalue());
    }
}
