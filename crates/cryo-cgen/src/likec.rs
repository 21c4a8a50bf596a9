//! The C-like output tree.
//!
//! Nodes are freshly owned by the emitted function definition and carry an
//! optional back-reference to the IR term or statement they originated
//! from. The `Display` implementations render readable C for tests and
//! debugging; the production pretty-printer lives outside this core.

use std::fmt;

use cryo_ir::{StmtId, TermId};

/// A type of the C-like language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CType {
    Void,
    /// A fixed-width integer; size in bits.
    Integer { size: u32, unsigned: bool },
    Pointer { pointee: Box<CType> },
}

impl CType {
    pub fn integer(size: u32, unsigned: bool) -> Self {
        Self::Integer { size, unsigned }
    }

    pub fn pointer(pointee: CType) -> Self {
        Self::Pointer {
            pointee: Box::new(pointee),
        }
    }
}

impl fmt::Display for CType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Void => write!(f, "void"),
            Self::Integer { size, unsigned } => {
                write!(f, "{}int{}_t", if *unsigned { "u" } else { "" }, size)
            }
            Self::Pointer { pointee } => write!(f, "{}*", pointee),
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CUnaryOp {
    Negation,
    BitwiseNot,
    LogicalNot,
    Dereference,
    Reference,
}

impl CUnaryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Negation => "-",
            Self::BitwiseNot => "~",
            Self::LogicalNot => "!",
            Self::Dereference => "*",
            Self::Reference => "&",
        }
    }
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CBinaryOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,
    Shl,
    Shr,
    Equal,
    Less,
    LessOrEqual,
    LogicalAnd,
    LogicalOr,
    Comma,
}

impl CBinaryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Assign => "=",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
            Self::BitwiseAnd => "&",
            Self::BitwiseOr => "|",
            Self::BitwiseXor => "^",
            Self::Shl => "<<",
            Self::Shr => ">>",
            Self::Equal => "==",
            Self::Less => "<",
            Self::LessOrEqual => "<=",
            Self::LogicalAnd => "&&",
            Self::LogicalOr => "||",
            Self::Comma => ",",
        }
    }

    /// Precedence for rendering; higher binds tighter.
    pub fn precedence(&self) -> u8 {
        match self {
            Self::Comma => 1,
            Self::Assign => 2,
            Self::LogicalOr => 3,
            Self::LogicalAnd => 4,
            Self::BitwiseOr => 5,
            Self::BitwiseXor => 6,
            Self::BitwiseAnd => 7,
            Self::Equal => 8,
            Self::Less | Self::LessOrEqual => 9,
            Self::Shl | Self::Shr => 10,
            Self::Add | Self::Sub => 11,
            Self::Mul | Self::Div | Self::Rem => 12,
        }
    }
}

const UNARY_PRECEDENCE: u8 = 13;
const PRIMARY_PRECEDENCE: u8 = 14;

/// An expression node.
#[derive(Debug, Clone, PartialEq)]
pub struct CExpr {
    pub kind: CExprKind,
    /// The IR term this expression was lowered from.
    pub term: Option<TermId>,
}

/// The kind of an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum CExprKind {
    IntegerConstant { value: u64, ty: CType },
    StringLiteral(String),
    VariableRef(String),
    FunctionRef(String),
    LabelRef(String),
    Unary {
        op: CUnaryOp,
        operand: Box<CExpr>,
    },
    Binary {
        op: CBinaryOp,
        left: Box<CExpr>,
        right: Box<CExpr>,
    },
    Typecast {
        ty: CType,
        operand: Box<CExpr>,
    },
    Call {
        target: Box<CExpr>,
        args: Vec<CExpr>,
    },
}

impl CExpr {
    pub fn new(kind: CExprKind) -> Self {
        Self { kind, term: None }
    }

    pub fn integer(value: u64, ty: CType) -> Self {
        Self::new(CExprKind::IntegerConstant { value, ty })
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::new(CExprKind::StringLiteral(value.into()))
    }

    pub fn variable(name: impl Into<String>) -> Self {
        Self::new(CExprKind::VariableRef(name.into()))
    }

    pub fn function_ref(name: impl Into<String>) -> Self {
        Self::new(CExprKind::FunctionRef(name.into()))
    }

    pub fn label_ref(name: impl Into<String>) -> Self {
        Self::new(CExprKind::LabelRef(name.into()))
    }

    pub fn unary(op: CUnaryOp, operand: CExpr) -> Self {
        Self::new(CExprKind::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    pub fn binary(op: CBinaryOp, left: CExpr, right: CExpr) -> Self {
        Self::new(CExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn cast(ty: CType, operand: CExpr) -> Self {
        Self::new(CExprKind::Typecast {
            ty,
            operand: Box::new(operand),
        })
    }

    pub fn call(target: CExpr, args: Vec<CExpr>) -> Self {
        Self::new(CExprKind::Call {
            target: Box::new(target),
            args,
        })
    }

    /// The `intrinsic()` placeholder for values nothing better is known of.
    pub fn intrinsic() -> Self {
        Self::call(Self::function_ref("intrinsic"), Vec::new())
    }

    fn precedence(&self) -> u8 {
        match &self.kind {
            CExprKind::Binary { op, .. } => op.precedence(),
            CExprKind::Unary { .. } | CExprKind::Typecast { .. } => UNARY_PRECEDENCE,
            _ => PRIMARY_PRECEDENCE,
        }
    }

    fn fmt_prec(&self, f: &mut fmt::Formatter<'_>, min_prec: u8) -> fmt::Result {
        let needs_parens = self.precedence() < min_prec;
        if needs_parens {
            write!(f, "(")?;
        }
        match &self.kind {
            CExprKind::IntegerConstant { value, ty } => {
                let negative_magnitude = match ty {
                    CType::Integer { size, unsigned }
                        if !unsigned && *size > 0 && *size < 64 && value >> (size - 1) & 1 == 1 =>
                    {
                        Some((1u128 << size) - *value as u128)
                    }
                    _ => None,
                };
                if let Some(magnitude) = negative_magnitude {
                    write!(f, "-{}", magnitude)?;
                } else if *value < 10 {
                    write!(f, "{}", value)?;
                } else {
                    write!(f, "{:#x}", value)?;
                }
            }
            CExprKind::StringLiteral(value) => write!(f, "{:?}", value)?,
            CExprKind::VariableRef(name)
            | CExprKind::FunctionRef(name)
            | CExprKind::LabelRef(name) => write!(f, "{}", name)?,
            CExprKind::Unary { op, operand } => {
                write!(f, "{}", op.as_str())?;
                operand.fmt_prec(f, UNARY_PRECEDENCE)?;
            }
            CExprKind::Binary { op, left, right } => {
                let prec = op.precedence();
                left.fmt_prec(f, prec)?;
                if *op == CBinaryOp::Comma {
                    write!(f, ", ")?;
                } else {
                    write!(f, " {} ", op.as_str())?;
                }
                right.fmt_prec(f, prec + 1)?;
            }
            CExprKind::Typecast { ty, operand } => {
                write!(f, "({})", ty)?;
                operand.fmt_prec(f, UNARY_PRECEDENCE)?;
            }
            CExprKind::Call { target, args } => {
                target.fmt_prec(f, PRIMARY_PRECEDENCE)?;
                write!(f, "(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    // Protect comma expressions in argument position.
                    arg.fmt_prec(f, CBinaryOp::Assign.precedence())?;
                }
                write!(f, ")")?;
            }
        }
        if needs_parens {
            write!(f, ")")?;
        }
        Ok(())
    }
}

impl fmt::Display for CExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_prec(f, 0)
    }
}

/// A statement node.
#[derive(Debug, Clone, PartialEq)]
pub struct CStatement {
    pub kind: CStatementKind,
    /// The IR statement this was lowered from.
    pub stmt: Option<StmtId>,
}

/// The kind of a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum CStatementKind {
    Expression(CExpr),
    Block(CBlock),
    If {
        condition: CExpr,
        then_stmt: Box<CStatement>,
        else_stmt: Option<Box<CStatement>>,
    },
    While {
        condition: CExpr,
        body: Box<CStatement>,
    },
    DoWhile {
        body: Box<CStatement>,
        condition: CExpr,
    },
    Switch {
        value: CExpr,
        body: Box<CStatement>,
    },
    CaseLabel {
        value: u64,
        ty: CType,
    },
    DefaultLabel,
    Label(String),
    Goto(CExpr),
    Break,
    Continue,
    Return(Option<CExpr>),
    InlineAssembly(String),
    Comment(String),
}

impl CStatement {
    pub fn new(kind: CStatementKind) -> Self {
        Self { kind, stmt: None }
    }

    pub fn expression(expr: CExpr) -> Self {
        Self::new(CStatementKind::Expression(expr))
    }

    pub fn block(block: CBlock) -> Self {
        Self::new(CStatementKind::Block(block))
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        let pad = "    ".repeat(indent);
        match &self.kind {
            CStatementKind::Expression(expr) => writeln!(f, "{}{};", pad, expr),
            CStatementKind::Block(block) => {
                writeln!(f, "{}{{", pad)?;
                block.fmt_indented(f, indent + 1)?;
                writeln!(f, "{}}}", pad)
            }
            CStatementKind::If {
                condition,
                then_stmt,
                else_stmt,
            } => {
                writeln!(f, "{}if ({}) {{", pad, condition)?;
                then_stmt.fmt_inner(f, indent)?;
                if let Some(else_stmt) = else_stmt {
                    writeln!(f, "{}}} else {{", pad)?;
                    else_stmt.fmt_inner(f, indent)?;
                }
                writeln!(f, "{}}}", pad)
            }
            CStatementKind::While { condition, body } => {
                writeln!(f, "{}while ({}) {{", pad, condition)?;
                body.fmt_inner(f, indent)?;
                writeln!(f, "{}}}", pad)
            }
            CStatementKind::DoWhile { body, condition } => {
                writeln!(f, "{}do {{", pad)?;
                body.fmt_inner(f, indent)?;
                writeln!(f, "{}}} while ({});", pad, condition)
            }
            CStatementKind::Switch { value, body } => {
                writeln!(f, "{}switch ({}) {{", pad, value)?;
                body.fmt_inner(f, indent)?;
                writeln!(f, "{}}}", pad)
            }
            CStatementKind::CaseLabel { value, .. } => writeln!(f, "{}case {}:", pad, value),
            CStatementKind::DefaultLabel => writeln!(f, "{}default:", pad),
            CStatementKind::Label(name) => writeln!(f, "{}{}:", pad, name),
            CStatementKind::Goto(target) => writeln!(f, "{}goto {};", pad, target),
            CStatementKind::Break => writeln!(f, "{}break;", pad),
            CStatementKind::Continue => writeln!(f, "{}continue;", pad),
            CStatementKind::Return(None) => writeln!(f, "{}return;", pad),
            CStatementKind::Return(Some(expr)) => writeln!(f, "{}return {};", pad, expr),
            CStatementKind::InlineAssembly(text) => writeln!(f, "{}__asm__({:?});", pad, text),
            CStatementKind::Comment(text) => writeln!(f, "{}/* {} */", pad, text),
        }
    }

    /// Renders the statement as the body of a brace pair the caller owns.
    fn fmt_inner(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        match &self.kind {
            CStatementKind::Block(block) => block.fmt_indented(f, indent + 1),
            _ => self.fmt_indented(f, indent + 1),
        }
    }
}

impl fmt::Display for CStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}

/// A brace-enclosed sequence of statements.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CBlock {
    pub statements: Vec<CStatement>,
}

impl CBlock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, statement: CStatement) {
        self.statements.push(statement);
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        for statement in &self.statements {
            statement.fmt_indented(f, indent)?;
        }
        Ok(())
    }
}

/// A local or parameter declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDeclaration {
    pub name: String,
    pub ty: CType,
}

impl fmt::Display for VariableDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.ty, self.name)
    }
}

/// The synthesized definition of one function.
#[derive(Debug, Clone)]
pub struct FunctionDefinition {
    pub name: String,
    pub return_type: CType,
    pub parameters: Vec<VariableDeclaration>,
    pub variadic: bool,
    pub comment: Option<String>,
    /// Local declarations collected while lowering the body.
    pub declarations: Vec<VariableDeclaration>,
    /// All labels issued for the body, in creation order.
    pub labels: Vec<String>,
    pub body: CBlock,
}

impl fmt::Display for FunctionDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(comment) = &self.comment {
            writeln!(f, "/* {} */", comment)?;
        }
        write!(f, "{} {}(", self.return_type, self.name)?;
        for (i, parameter) in self.parameters.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", parameter)?;
        }
        if self.variadic {
            if !self.parameters.is_empty() {
                write!(f, ", ")?;
            }
            write!(f, "...")?;
        }
        writeln!(f, ") {{")?;
        for declaration in &self.declarations {
            writeln!(f, "    {};", declaration)?;
        }
        self.body.fmt_indented(f, 1)?;
        writeln!(f, "}}")
    }
}

/// Sets the originating term on every node of the expression that does not
/// carry one yet, recursing only into such nodes, so outer wrappers
/// attribute to the outermost producer and inner nodes keep their own
/// origin.
pub fn annotate_term(expr: &mut CExpr, term: TermId) {
    if expr.term.is_some() {
        return;
    }
    expr.term = Some(term);
    match &mut expr.kind {
        CExprKind::Unary { operand, .. } | CExprKind::Typecast { operand, .. } => {
            annotate_term(operand, term);
        }
        CExprKind::Binary { left, right, .. } => {
            annotate_term(left, term);
            annotate_term(right, term);
        }
        CExprKind::Call { target, args } => {
            annotate_term(target, term);
            for arg in args {
                annotate_term(arg, term);
            }
        }
        CExprKind::IntegerConstant { .. }
        | CExprKind::StringLiteral(_)
        | CExprKind::VariableRef(_)
        | CExprKind::FunctionRef(_)
        | CExprKind::LabelRef(_) => {}
    }
}

/// Statement counterpart of [`annotate_term`].
pub fn annotate_stmt(statement: &mut CStatement, stmt: StmtId) {
    if statement.stmt.is_some() {
        return;
    }
    statement.stmt = Some(stmt);
    match &mut statement.kind {
        CStatementKind::Block(block) => {
            for child in &mut block.statements {
                annotate_stmt(child, stmt);
            }
        }
        CStatementKind::If {
            then_stmt,
            else_stmt,
            ..
        } => {
            annotate_stmt(then_stmt, stmt);
            if let Some(else_stmt) = else_stmt {
                annotate_stmt(else_stmt, stmt);
            }
        }
        CStatementKind::While { body, .. }
        | CStatementKind::DoWhile { body, .. }
        | CStatementKind::Switch { body, .. } => annotate_stmt(body, stmt),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_display() {
        assert_eq!(CType::integer(32, false).to_string(), "int32_t");
        assert_eq!(CType::integer(8, true).to_string(), "uint8_t");
        assert_eq!(
            CType::pointer(CType::integer(8, true)).to_string(),
            "uint8_t*"
        );
        assert_eq!(CType::Void.to_string(), "void");
    }

    #[test]
    fn test_expression_precedence() {
        // (a + b) * c needs parentheses, a + b * c does not.
        let a = CExpr::variable("a");
        let b = CExpr::variable("b");
        let c = CExpr::variable("c");
        let sum = CExpr::binary(CBinaryOp::Add, a.clone(), b.clone());
        let product = CExpr::binary(CBinaryOp::Mul, sum, c.clone());
        assert_eq!(product.to_string(), "(a + b) * c");

        let product = CExpr::binary(CBinaryOp::Mul, b, c);
        let sum = CExpr::binary(CBinaryOp::Add, a, product);
        assert_eq!(sum.to_string(), "a + b * c");
    }

    #[test]
    fn test_cast_display() {
        let expr = CExpr::cast(CType::integer(32, true), CExpr::variable("v0"));
        assert_eq!(expr.to_string(), "(uint32_t)v0");

        let sum = CExpr::binary(CBinaryOp::Add, CExpr::variable("a"), CExpr::variable("b"));
        let cast = CExpr::cast(CType::integer(64, false), sum);
        assert_eq!(cast.to_string(), "(int64_t)(a + b)");
    }

    #[test]
    fn test_negative_constant_display() {
        let expr = CExpr::integer(0xfff8, CType::integer(16, false));
        assert_eq!(expr.to_string(), "-8");
        let expr = CExpr::integer(0xfff8, CType::integer(16, true));
        assert_eq!(expr.to_string(), "0xfff8");
    }

    #[test]
    fn test_statement_display() {
        let mut block = CBlock::new();
        block.push(CStatement::expression(CExpr::binary(
            CBinaryOp::Assign,
            CExpr::variable("v0"),
            CExpr::integer(1, CType::integer(32, false)),
        )));
        let stmt = CStatement::new(CStatementKind::If {
            condition: CExpr::variable("cond"),
            then_stmt: Box::new(CStatement::block(block)),
            else_stmt: None,
        });
        let rendered = stmt.to_string();
        assert!(rendered.contains("if (cond) {"));
        assert!(rendered.contains("v0 = 1;"));
    }

    #[test]
    fn test_annotate_term_keeps_existing() {
        let mut inner = CExpr::variable("x");
        inner.term = Some(TermId(7));
        let mut outer = CExpr::cast(CType::integer(32, false), inner);
        annotate_term(&mut outer, TermId(9));

        assert_eq!(outer.term, Some(TermId(9)));
        if let CExprKind::Typecast { operand, .. } = &outer.kind {
            assert_eq!(operand.term, Some(TermId(7)));
        } else {
            panic!("expected cast");
        }
    }

    #[test]
    fn test_annotate_stmt_recurses_into_unset() {
        let inner = CStatement::expression(CExpr::variable("x"));
        let mut outer = CStatement::new(CStatementKind::While {
            condition: CExpr::variable("c"),
            body: Box::new(inner),
        });
        annotate_stmt(&mut outer, StmtId(3));

        assert_eq!(outer.stmt, Some(StmtId(3)));
        if let CStatementKind::While { body, .. } = &outer.kind {
            assert_eq!(body.stmt, Some(StmtId(3)));
        } else {
            panic!("expected while");
        }
    }

    #[test]
    fn test_function_definition_display() {
        let definition = FunctionDefinition {
            name: "sub_401000".to_string(),
            return_type: CType::integer(32, false),
            parameters: vec![VariableDeclaration {
                name: "a1".to_string(),
                ty: CType::integer(64, true),
            }],
            variadic: false,
            comment: Some("reconstructed".to_string()),
            declarations: vec![VariableDeclaration {
                name: "v0".to_string(),
                ty: CType::integer(32, true),
            }],
            labels: vec!["label_0".to_string()],
            body: CBlock::new(),
        };
        let rendered = definition.to_string();
        assert!(rendered.contains("/* reconstructed */"));
        assert!(rendered.contains("int32_t sub_401000(uint64_t a1) {"));
        assert!(rendered.contains("uint32_t v0;"));
    }
}
