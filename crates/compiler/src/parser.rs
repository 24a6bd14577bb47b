//! Recursive-descent parser for the MOO language
//!
//! `compile` is the entry point used by `set_verb_code`: it returns either a
//! `Program` or the list of error-message strings the builtin hands back to
//! the programmer. Parsing is followed by a validation pass that checks the
//! things a tree-walker cannot cheaply check at runtime: loop-label scoping,
//! `break`/`continue` placement, fork restrictions, and assignment to
//! read-only context variables.

use crate::ast::*;
use crate::lexer::{tokenize, Tok, Token};
use byre_core::Var;

/// Parse-failure report: one message per error, first error wins for
/// position information. `set_verb_code` returns these as a MOO list.
pub type CompileErrors = Vec<String>;

/// Compile verb source to a program.
pub fn compile(source: &str) -> Result<Program, CompileErrors> {
    let tokens = tokenize(source).map_err(|e| vec![e])?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        index_depth: 0,
    };
    let stmts = parser.statements(&[])?;
    if !parser.is_at_end() {
        return Err(vec![format!(
            "Line {}: unexpected token after program end",
            parser.line()
        )]);
    }
    let program = Program { stmts };
    let problems = validate(&program);
    if problems.is_empty() {
        Ok(program)
    } else {
        Err(problems)
    }
}

/// Variables bound by the kernel on every activation; never assignable.
pub const READ_ONLY_VARS: &[&str] = &[
    "this", "caller", "verb", "player", "args", "argstr", "dobj", "iobj", "dobjstr", "iobjstr",
    "prepstr",
];

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Depth of enclosing `[...]` index expressions; `^` and `$` markers are
    /// legal only when this is positive.
    index_depth: usize,
}

// An element of a `{...}` construct, before we know whether it is a list
// literal or a scatter pattern.
enum BraceElem {
    Arg(Arg),
    Optional(String, Option<Expr>),
}

impl Parser {
    fn is_at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos).map(|t| &t.tok)
    }

    fn peek2(&self) -> Option<&Tok> {
        self.tokens.get(self.pos + 1).map(|t| &t.tok)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos.min(self.tokens.len().saturating_sub(1)))
            .map(|t| t.line)
            .unwrap_or(1)
    }

    fn bump(&mut self) -> Option<Tok> {
        let t = self.tokens.get(self.pos).map(|t| t.tok.clone());
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: Tok, what: &str) -> Result<(), CompileErrors> {
        if self.eat(&tok) {
            Ok(())
        } else {
            Err(vec![format!("Line {}: expected {}", self.line(), what)])
        }
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        match self.peek() {
            Some(Tok::Id(id)) if id == kw => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn at_keyword(&self, kw: &str) -> bool {
        matches!(self.peek(), Some(Tok::Id(id)) if id == kw)
    }

    fn expect_id(&mut self, what: &str) -> Result<String, CompileErrors> {
        match self.bump() {
            Some(Tok::Id(id)) => Ok(id),
            _ => Err(vec![format!("Line {}: expected {}", self.line(), what)]),
        }
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    /// Parse statements until one of `terminators` (keywords) or EOF.
    fn statements(&mut self, terminators: &[&str]) -> Result<Vec<Stmt>, CompileErrors> {
        let mut stmts = Vec::new();
        loop {
            if self.is_at_end() {
                if terminators.is_empty() {
                    return Ok(stmts);
                }
                return Err(vec![format!(
                    "Line {}: missing {}",
                    self.line(),
                    terminators.join(" or ")
                )]);
            }
            if terminators.iter().any(|t| self.at_keyword(t)) {
                return Ok(stmts);
            }
            if let Some(stmt) = self.statement()? {
                stmts.push(stmt);
            }
        }
    }

    /// One statement; `None` for a bare `;`.
    fn statement(&mut self) -> Result<Option<Stmt>, CompileErrors> {
        let line = self.line();
        let kind = if self.eat_keyword("if") {
            self.if_stmt()?
        } else if self.eat_keyword("while") {
            self.while_stmt()?
        } else if self.eat_keyword("for") {
            self.for_stmt()?
        } else if self.eat_keyword("fork") {
            self.fork_stmt()?
        } else if self.eat_keyword("try") {
            self.try_stmt()?
        } else if self.eat_keyword("return") {
            let expr = if self.peek() == Some(&Tok::Semi) {
                None
            } else {
                Some(self.expr()?)
            };
            self.expect(Tok::Semi, "';' after return")?;
            StmtKind::Return(expr)
        } else if self.eat_keyword("break") {
            let label = self.opt_label()?;
            self.expect(Tok::Semi, "';' after break")?;
            StmtKind::Break(label)
        } else if self.eat_keyword("continue") {
            let label = self.opt_label()?;
            self.expect(Tok::Semi, "';' after continue")?;
            StmtKind::Continue(label)
        } else if self.eat(&Tok::Semi) {
            return Ok(None);
        } else {
            let expr = self.expr()?;
            self.expect(Tok::Semi, "';' after expression")?;
            StmtKind::Expr(expr)
        };
        Ok(Some(Stmt { kind, line }))
    }

    fn opt_label(&mut self) -> Result<Option<String>, CompileErrors> {
        match self.peek() {
            Some(Tok::Id(_)) => Ok(Some(self.expect_id("loop label")?)),
            _ => Ok(None),
        }
    }

    fn if_stmt(&mut self) -> Result<StmtKind, CompileErrors> {
        let mut arms = Vec::new();
        self.expect(Tok::LParen, "'(' after if")?;
        let cond = self.expr()?;
        self.expect(Tok::RParen, "')' after condition")?;
        let body = self.statements(&["elseif", "else", "endif"])?;
        arms.push((cond, body));
        loop {
            if self.eat_keyword("elseif") {
                self.expect(Tok::LParen, "'(' after elseif")?;
                let cond = self.expr()?;
                self.expect(Tok::RParen, "')' after condition")?;
                let body = self.statements(&["elseif", "else", "endif"])?;
                arms.push((cond, body));
            } else if self.eat_keyword("else") {
                let otherwise = self.statements(&["endif"])?;
                self.expect_keyword("endif")?;
                return Ok(StmtKind::Cond { arms, otherwise });
            } else {
                self.expect_keyword("endif")?;
                return Ok(StmtKind::Cond {
                    arms,
                    otherwise: Vec::new(),
                });
            }
        }
    }

    fn expect_keyword(&mut self, kw: &str) -> Result<(), CompileErrors> {
        if self.eat_keyword(kw) {
            Ok(())
        } else {
            Err(vec![format!("Line {}: expected {}", self.line(), kw)])
        }
    }

    fn while_stmt(&mut self) -> Result<StmtKind, CompileErrors> {
        // `while label (cond)`: an identifier before the open paren names
        // the loop.
        let label = match (self.peek(), self.peek2()) {
            (Some(Tok::Id(_)), Some(Tok::LParen)) => Some(self.expect_id("loop label")?),
            _ => None,
        };
        self.expect(Tok::LParen, "'(' after while")?;
        let cond = self.expr()?;
        self.expect(Tok::RParen, "')' after condition")?;
        let body = self.statements(&["endwhile"])?;
        self.expect_keyword("endwhile")?;
        Ok(StmtKind::While { label, cond, body })
    }

    fn for_stmt(&mut self) -> Result<StmtKind, CompileErrors> {
        let value = self.expect_id("loop variable")?;
        let index = if self.eat(&Tok::Comma) {
            Some(self.expect_id("second loop variable")?)
        } else {
            None
        };
        self.expect_keyword("in")?;
        if self.eat(&Tok::LParen) {
            let expr = self.expr()?;
            self.expect(Tok::RParen, "')' after loop expression")?;
            let body = self.statements(&["endfor"])?;
            self.expect_keyword("endfor")?;
            Ok(StmtKind::ForList {
                label: Some(value.clone()),
                value,
                index,
                expr,
                body,
            })
        } else if self.eat(&Tok::LBracket) {
            if index.is_some() {
                return Err(vec![format!(
                    "Line {}: index variable is not allowed with a range loop",
                    self.line()
                )]);
            }
            let from = self.expr()?;
            self.expect(Tok::DotDot, "'..' in range loop")?;
            let to = self.expr()?;
            self.expect(Tok::RBracket, "']' after range")?;
            let body = self.statements(&["endfor"])?;
            self.expect_keyword("endfor")?;
            Ok(StmtKind::ForRange {
                label: Some(value.clone()),
                var: value,
                from,
                to,
                body,
            })
        } else {
            Err(vec![format!(
                "Line {}: expected '(' or '[' after 'in'",
                self.line()
            )])
        }
    }

    fn fork_stmt(&mut self) -> Result<StmtKind, CompileErrors> {
        let var = match (self.peek(), self.peek2()) {
            (Some(Tok::Id(_)), Some(Tok::LParen)) => Some(self.expect_id("fork variable")?),
            _ => None,
        };
        self.expect(Tok::LParen, "'(' after fork")?;
        let delay = self.expr()?;
        self.expect(Tok::RParen, "')' after fork delay")?;
        let body = self.statements(&["endfork"])?;
        self.expect_keyword("endfork")?;
        Ok(StmtKind::Fork { var, delay, body })
    }

    fn try_stmt(&mut self) -> Result<StmtKind, CompileErrors> {
        let body = self.statements(&["except", "finally", "endtry"])?;
        if self.eat_keyword("finally") {
            let handler = self.statements(&["endtry"])?;
            self.expect_keyword("endtry")?;
            return Ok(StmtKind::TryFinally { body, handler });
        }
        let mut excepts = Vec::new();
        while self.eat_keyword("except") {
            let id = match (self.peek(), self.peek2()) {
                (Some(Tok::Id(_)), Some(Tok::LParen)) => Some(self.expect_id("error variable")?),
                _ => None,
            };
            self.expect(Tok::LParen, "'(' after except")?;
            let codes = self.codes()?;
            self.expect(Tok::RParen, "')' after error codes")?;
            let arm_body = self.statements(&["except", "endtry"])?;
            excepts.push(ExceptArm {
                id,
                codes,
                body: arm_body,
            });
        }
        if excepts.is_empty() {
            return Err(vec![format!(
                "Line {}: try requires except or finally",
                self.line()
            )]);
        }
        self.expect_keyword("endtry")?;
        Ok(StmtKind::TryExcept { body, excepts })
    }

    /// Error codes: `ANY` or a comma list of expressions.
    fn codes(&mut self) -> Result<Codes, CompileErrors> {
        if self.eat_keyword("any") {
            return Ok(Codes::Any);
        }
        let mut list = Vec::new();
        loop {
            if self.eat(&Tok::At) {
                list.push(Arg::Splice(self.expr()?));
            } else {
                list.push(Arg::Normal(self.expr()?));
            }
            if !self.eat(&Tok::Comma) {
                return Ok(Codes::List(list));
            }
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn expr(&mut self) -> Result<Expr, CompileErrors> {
        let lhs = self.ternary()?;
        if self.eat(&Tok::Assign) {
            let rhs = self.expr()?;
            return match lhs {
                Expr::Id(_) | Expr::Prop { .. } | Expr::Index(..) | Expr::Range { .. } => {
                    Ok(Expr::Assign {
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                    })
                }
                Expr::Sysprop(name) => Ok(Expr::Assign {
                    lhs: Box::new(Expr::Prop {
                        obj: Box::new(Expr::Value(Var::obj(0))),
                        name: Box::new(Expr::Value(Var::str(&name))),
                    }),
                    rhs: Box::new(rhs),
                }),
                _ => Err(vec![format!(
                    "Line {}: invalid assignment target",
                    self.line()
                )]),
            };
        }
        Ok(lhs)
    }

    fn ternary(&mut self) -> Result<Expr, CompileErrors> {
        let cond = self.or_expr()?;
        if self.eat(&Tok::Question) {
            let yes = self.expr()?;
            self.expect(Tok::Bar, "'|' in conditional expression")?;
            let no = self.ternary()?;
            return Ok(Expr::Cond {
                cond: Box::new(cond),
                yes: Box::new(yes),
                no: Box::new(no),
            });
        }
        Ok(cond)
    }

    fn or_expr(&mut self) -> Result<Expr, CompileErrors> {
        let mut lhs = self.and_expr()?;
        while self.eat(&Tok::OrOr) {
            let rhs = self.and_expr()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Expr, CompileErrors> {
        let mut lhs = self.comparison()?;
        while self.eat(&Tok::AndAnd) {
            let rhs = self.comparison()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn comparison(&mut self) -> Result<Expr, CompileErrors> {
        let mut lhs = self.bitwise()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Eq) => BinaryOp::Eq,
                Some(Tok::Ne) => BinaryOp::Ne,
                Some(Tok::Lt) => BinaryOp::Lt,
                Some(Tok::Le) => BinaryOp::Le,
                Some(Tok::Gt) => BinaryOp::Gt,
                Some(Tok::Ge) => BinaryOp::Ge,
                Some(Tok::Id(id)) if id == "in" => BinaryOp::In,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.bitwise()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn bitwise(&mut self) -> Result<Expr, CompileErrors> {
        let mut lhs = self.shift()?;
        loop {
            let op = match self.peek() {
                Some(Tok::BitAnd) => BinaryOp::BitAnd,
                Some(Tok::BitOr) => BinaryOp::BitOr,
                Some(Tok::BitXor) => BinaryOp::BitXor,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.shift()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn shift(&mut self) -> Result<Expr, CompileErrors> {
        let mut lhs = self.additive()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Shl) => BinaryOp::Shl,
                Some(Tok::Shr) => BinaryOp::Shr,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.additive()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn additive(&mut self) -> Result<Expr, CompileErrors> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Plus) => BinaryOp::Add,
                Some(Tok::Minus) => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn multiplicative(&mut self) -> Result<Expr, CompileErrors> {
        let mut lhs = self.power()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Star) => BinaryOp::Mul,
                Some(Tok::Slash) => BinaryOp::Div,
                Some(Tok::Percent) => BinaryOp::Rem,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.power()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn power(&mut self) -> Result<Expr, CompileErrors> {
        let lhs = self.unary()?;
        if self.peek() == Some(&Tok::Caret) {
            self.pos += 1;
            // Right-associative.
            let rhs = self.power()?;
            return Ok(Expr::Binary(BinaryOp::Pow, Box::new(lhs), Box::new(rhs)));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, CompileErrors> {
        if self.eat(&Tok::Bang) {
            return Ok(Expr::Not(Box::new(self.unary()?)));
        }
        if self.eat(&Tok::Minus) {
            return Ok(Expr::Neg(Box::new(self.unary()?)));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, CompileErrors> {
        let mut expr = self.primary()?;
        loop {
            match self.peek() {
                Some(Tok::Dot) => {
                    self.pos += 1;
                    let name = self.member_name()?;
                    expr = Expr::Prop {
                        obj: Box::new(expr),
                        name: Box::new(name),
                    };
                }
                Some(Tok::Colon) => {
                    self.pos += 1;
                    let name = self.member_name()?;
                    self.expect(Tok::LParen, "'(' after verb name")?;
                    let args = self.arglist(Tok::RParen)?;
                    expr = Expr::Verb {
                        obj: Box::new(expr),
                        name: Box::new(name),
                        args,
                    };
                }
                Some(Tok::LBracket) => {
                    self.pos += 1;
                    self.index_depth += 1;
                    let first = self.expr()?;
                    let result = if self.eat(&Tok::DotDot) {
                        let to = self.expr()?;
                        Expr::Range {
                            base: Box::new(expr),
                            from: Box::new(first),
                            to: Box::new(to),
                        }
                    } else {
                        Expr::Index(Box::new(expr), Box::new(first))
                    };
                    self.index_depth -= 1;
                    self.expect(Tok::RBracket, "']' after index")?;
                    expr = result;
                }
                _ => return Ok(expr),
            }
        }
    }

    /// Property / verb name position: a bare identifier means the literal
    /// string; `(expr)` computes the name.
    fn member_name(&mut self) -> Result<Expr, CompileErrors> {
        match self.peek() {
            Some(Tok::Id(_)) => {
                let id = self.expect_id("member name")?;
                Ok(Expr::Value(Var::str(&id)))
            }
            Some(Tok::LParen) => {
                self.pos += 1;
                let e = self.expr()?;
                self.expect(Tok::RParen, "')' after computed name")?;
                Ok(e)
            }
            _ => Err(vec![format!(
                "Line {}: expected property or verb name",
                self.line()
            )]),
        }
    }

    fn primary(&mut self) -> Result<Expr, CompileErrors> {
        match self.peek().cloned() {
            Some(Tok::Int(n)) => {
                self.pos += 1;
                Ok(Expr::Value(Var::Int(n)))
            }
            Some(Tok::Float(f)) => {
                self.pos += 1;
                Ok(Expr::Value(Var::Float(f)))
            }
            Some(Tok::Str(s)) => {
                self.pos += 1;
                Ok(Expr::Value(Var::Str(byre_core::MooStr::from_bytes(s))))
            }
            Some(Tok::Obj(n)) => {
                self.pos += 1;
                Ok(Expr::Value(Var::obj(n)))
            }
            Some(Tok::ErrLit(e)) => {
                self.pos += 1;
                Ok(Expr::Value(Var::Err(e)))
            }
            Some(Tok::Id(id)) if id == "true" => {
                self.pos += 1;
                Ok(Expr::Value(Var::Bool(true)))
            }
            Some(Tok::Id(id)) if id == "false" => {
                self.pos += 1;
                Ok(Expr::Value(Var::Bool(false)))
            }
            Some(Tok::Id(id)) => {
                self.pos += 1;
                // A bare identifier directly followed by '(' is a builtin
                // call; otherwise a variable read.
                if self.peek() == Some(&Tok::LParen) {
                    self.pos += 1;
                    let args = self.arglist(Tok::RParen)?;
                    Ok(Expr::Call { func: id, args })
                } else {
                    Ok(Expr::Id(id))
                }
            }
            Some(Tok::Dollar) => {
                self.pos += 1;
                match self.peek() {
                    Some(Tok::Id(_)) => Ok(Expr::Sysprop(self.expect_id("property name")?)),
                    _ if self.index_depth > 0 => Ok(Expr::RangeEnd),
                    _ => Err(vec![format!(
                        "Line {}: '$' is only meaningful inside an index",
                        self.line()
                    )]),
                }
            }
            Some(Tok::Caret) if self.index_depth > 0 => {
                self.pos += 1;
                Ok(Expr::RangeStart)
            }
            Some(Tok::LParen) => {
                self.pos += 1;
                let e = self.expr()?;
                self.expect(Tok::RParen, "')'")?;
                Ok(e)
            }
            Some(Tok::LBrace) => {
                self.pos += 1;
                self.brace_construct()
            }
            Some(Tok::LBracket) => {
                self.pos += 1;
                self.map_literal()
            }
            Some(Tok::Backquote) => {
                self.pos += 1;
                let expr = self.expr()?;
                self.expect(Tok::Bang, "'!' in catch expression")?;
                let codes = self.codes()?;
                let except = if self.eat(&Tok::FatArrow) {
                    Some(Box::new(self.expr()?))
                } else {
                    None
                };
                self.expect(Tok::Quote, "closing quote of catch expression")?;
                Ok(Expr::Catch {
                    expr: Box::new(expr),
                    codes,
                    except,
                })
            }
            _ => Err(vec![format!(
                "Line {}: unexpected token in expression",
                self.line()
            )]),
        }
    }

    /// `{...}`: list literal, or scatter pattern when followed by `=`.
    fn brace_construct(&mut self) -> Result<Expr, CompileErrors> {
        let mut elems = Vec::new();
        if !self.eat(&Tok::RBrace) {
            loop {
                elems.push(self.brace_elem()?);
                if self.eat(&Tok::Comma) {
                    continue;
                }
                self.expect(Tok::RBrace, "'}' after list")?;
                break;
            }
        }
        if self.eat(&Tok::Assign) {
            let targets = self.to_scatter(elems)?;
            let rhs = self.expr()?;
            return Ok(Expr::Scatter {
                targets,
                rhs: Box::new(rhs),
            });
        }
        let mut args = Vec::new();
        for elem in elems {
            match elem {
                BraceElem::Arg(a) => args.push(a),
                BraceElem::Optional(..) => {
                    return Err(vec![format!(
                        "Line {}: '?' target outside scatter assignment",
                        self.line()
                    )])
                }
            }
        }
        Ok(Expr::List(args))
    }

    fn brace_elem(&mut self) -> Result<BraceElem, CompileErrors> {
        if self.eat(&Tok::Question) {
            let name = self.expect_id("optional target name")?;
            let default = if self.eat(&Tok::Assign) {
                Some(self.expr()?)
            } else {
                None
            };
            return Ok(BraceElem::Optional(name, default));
        }
        if self.eat(&Tok::At) {
            return Ok(BraceElem::Arg(Arg::Splice(self.expr()?)));
        }
        Ok(BraceElem::Arg(Arg::Normal(self.expr()?)))
    }

    fn to_scatter(&mut self, elems: Vec<BraceElem>) -> Result<Vec<ScatterTarget>, CompileErrors> {
        let mut targets = Vec::new();
        let mut rest_seen = false;
        for elem in elems {
            let target = match elem {
                BraceElem::Arg(Arg::Normal(Expr::Id(name))) => ScatterTarget {
                    name,
                    kind: ScatterKind::Required,
                },
                BraceElem::Arg(Arg::Splice(Expr::Id(name))) => {
                    if rest_seen {
                        return Err(vec![format!(
                            "Line {}: more than one '@' target in scatter",
                            self.line()
                        )]);
                    }
                    rest_seen = true;
                    ScatterTarget {
                        name,
                        kind: ScatterKind::Rest,
                    }
                }
                BraceElem::Optional(name, default) => ScatterTarget {
                    name,
                    kind: ScatterKind::Optional(default),
                },
                _ => {
                    return Err(vec![format!(
                        "Line {}: scatter targets must be variable names",
                        self.line()
                    )])
                }
            };
            targets.push(target);
        }
        if targets.is_empty() {
            return Err(vec![format!("Line {}: empty scatter pattern", self.line())]);
        }
        Ok(targets)
    }

    /// `[k -> v, ...]` map literal.
    fn map_literal(&mut self) -> Result<Expr, CompileErrors> {
        let mut pairs = Vec::new();
        if self.eat(&Tok::RBracket) {
            return Ok(Expr::Map(pairs));
        }
        loop {
            let key = self.expr()?;
            self.expect(Tok::Arrow, "'->' in map literal")?;
            let value = self.expr()?;
            pairs.push((key, value));
            if self.eat(&Tok::Comma) {
                continue;
            }
            self.expect(Tok::RBracket, "']' after map literal")?;
            return Ok(Expr::Map(pairs));
        }
    }

    /// Comma-separated arguments up to `close` (consumed).
    fn arglist(&mut self, close: Tok) -> Result<Vec<Arg>, CompileErrors> {
        let mut args = Vec::new();
        if self.eat(&close) {
            return Ok(args);
        }
        loop {
            if self.eat(&Tok::At) {
                args.push(Arg::Splice(self.expr()?));
            } else {
                args.push(Arg::Normal(self.expr()?));
            }
            if self.eat(&Tok::Comma) {
                continue;
            }
            self.expect(close, "')' after arguments")?;
            return Ok(args);
        }
    }
}

// ----------------------------------------------------------------------
// Validation
// ----------------------------------------------------------------------

/// Post-parse checks: loop labels, break/continue placement, fork
/// restrictions, read-only assignment targets.
fn validate(program: &Program) -> Vec<String> {
    let mut problems = Vec::new();
    check_stmts(&program.stmts, &mut Vec::new(), &mut problems);
    problems
}

fn check_stmts(stmts: &[Stmt], loops: &mut Vec<Option<String>>, problems: &mut Vec<String>) {
    for stmt in stmts {
        check_stmt(stmt, loops, problems);
    }
}

fn check_stmt(stmt: &Stmt, loops: &mut Vec<Option<String>>, problems: &mut Vec<String>) {
    let line = stmt.line;
    match &stmt.kind {
        StmtKind::Cond { arms, otherwise } => {
            for (cond, body) in arms {
                check_expr(cond, line, problems);
                check_stmts(body, loops, problems);
            }
            check_stmts(otherwise, loops, problems);
        }
        StmtKind::While { label, cond, body } => {
            check_expr(cond, line, problems);
            enter_loop(label, line, loops, problems);
            check_stmts(body, loops, problems);
            loops.pop();
        }
        StmtKind::ForList {
            label, expr, body, ..
        } => {
            check_expr(expr, line, problems);
            enter_loop(label, line, loops, problems);
            check_stmts(body, loops, problems);
            loops.pop();
        }
        StmtKind::ForRange {
            label,
            from,
            to,
            body,
            ..
        } => {
            check_expr(from, line, problems);
            check_expr(to, line, problems);
            enter_loop(label, line, loops, problems);
            check_stmts(body, loops, problems);
            loops.pop();
        }
        StmtKind::Fork { delay, body, .. } => {
            check_expr(delay, line, problems);
            // The fork body is a fresh task: enclosing loops are not
            // reachable from it.
            let mut inner = Vec::new();
            check_stmts(body, &mut inner, problems);
        }
        StmtKind::TryExcept { body, excepts } => {
            check_stmts(body, loops, problems);
            for arm in excepts {
                if let Codes::List(list) = &arm.codes {
                    for arg in list {
                        let (Arg::Normal(e) | Arg::Splice(e)) = arg;
                        check_expr(e, line, problems);
                    }
                }
                check_stmts(&arm.body, loops, problems);
            }
        }
        StmtKind::TryFinally { body, handler } => {
            check_stmts(body, loops, problems);
            check_stmts(handler, loops, problems);
        }
        StmtKind::Break(label) | StmtKind::Continue(label) => {
            let what = if matches!(stmt.kind, StmtKind::Break(_)) {
                "break"
            } else {
                "continue"
            };
            if loops.is_empty() {
                problems.push(format!("Line {line}: {what} outside of a loop"));
            } else if let Some(name) = label {
                if !loops.iter().any(|l| l.as_deref() == Some(name)) {
                    problems.push(format!("Line {line}: {what} to unknown loop '{name}'"));
                }
            }
        }
        StmtKind::Return(expr) => {
            if let Some(e) = expr {
                check_expr(e, line, problems);
            }
        }
        StmtKind::Expr(e) => check_expr(e, line, problems),
    }
}

fn enter_loop(
    label: &Option<String>,
    line: usize,
    loops: &mut Vec<Option<String>>,
    problems: &mut Vec<String>,
) {
    if let Some(name) = label {
        if loops.iter().any(|l| l.as_deref() == Some(name)) {
            problems.push(format!("Line {line}: duplicate loop label '{name}'"));
        }
    }
    loops.push(label.clone());
}

fn check_expr(expr: &Expr, line: usize, problems: &mut Vec<String>) {
    match expr {
        Expr::Assign { lhs, rhs } => {
            if let Expr::Id(name) = lhs.as_ref() {
                if READ_ONLY_VARS.contains(&name.as_str()) {
                    problems.push(format!("Line {line}: '{name}' is read-only"));
                }
            }
            check_expr(lhs, line, problems);
            check_expr(rhs, line, problems);
        }
        Expr::Scatter { targets, rhs } => {
            for t in targets {
                if READ_ONLY_VARS.contains(&t.name.as_str()) {
                    problems.push(format!("Line {line}: '{}' is read-only", t.name));
                }
                if let ScatterKind::Optional(Some(default)) = &t.kind {
                    check_expr(default, line, problems);
                }
            }
            check_expr(rhs, line, problems);
        }
        Expr::And(a, b) | Expr::Or(a, b) | Expr::Binary(_, a, b) => {
            check_expr(a, line, problems);
            check_expr(b, line, problems);
        }
        Expr::Not(e) | Expr::Neg(e) => check_expr(e, line, problems),
        Expr::Index(a, b) => {
            check_expr(a, line, problems);
            check_expr(b, line, problems);
        }
        Expr::Range { base, from, to } => {
            check_expr(base, line, problems);
            check_expr(from, line, problems);
            check_expr(to, line, problems);
        }
        Expr::Cond { cond, yes, no } => {
            check_expr(cond, line, problems);
            check_expr(yes, line, problems);
            check_expr(no, line, problems);
        }
        Expr::Catch { expr, codes, except } => {
            check_expr(expr, line, problems);
            if let Codes::List(list) = codes {
                for arg in list {
                    let (Arg::Normal(e) | Arg::Splice(e)) = arg;
                    check_expr(e, line, problems);
                }
            }
            if let Some(e) = except {
                check_expr(e, line, problems);
            }
        }
        Expr::Prop { obj, name } => {
            check_expr(obj, line, problems);
            check_expr(name, line, problems);
        }
        Expr::Verb { obj, name, args } => {
            check_expr(obj, line, problems);
            check_expr(name, line, problems);
            for arg in args {
                let (Arg::Normal(e) | Arg::Splice(e)) = arg;
                check_expr(e, line, problems);
            }
        }
        Expr::Call { args, .. } => {
            for arg in args {
                let (Arg::Normal(e) | Arg::Splice(e)) = arg;
                check_expr(e, line, problems);
            }
        }
        Expr::List(args) => {
            for arg in args {
                let (Arg::Normal(e) | Arg::Splice(e)) = arg;
                check_expr(e, line, problems);
            }
        }
        Expr::Map(pairs) => {
            for (k, v) in pairs {
                check_expr(k, line, problems);
                check_expr(v, line, problems);
            }
        }
        Expr::Value(_) | Expr::Id(_) | Expr::Sysprop(_) | Expr::RangeStart | Expr::RangeEnd => {}
    }
}
