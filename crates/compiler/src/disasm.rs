//! Pseudo-instruction listing for `disassemble`
//!
//! The evaluator walks the tree directly, so there is no bytecode to dump.
//! `disassemble` instead flattens the AST into one pseudo-instruction per
//! node, depth-first, which is what a programmer wants from the builtin:
//! a stable, line-tagged view of what will execute.

use crate::ast::*;

/// One line per node, e.g. `12: PUSH 5` or `3: CALL_VERB`.
pub fn listing(program: &Program) -> Vec<String> {
    let mut out = Vec::new();
    for stmt in &program.stmts {
        stmt_lines(stmt, &mut out);
    }
    out
}

fn emit(out: &mut Vec<String>, line: usize, text: impl Into<String>) {
    out.push(format!("{line:>4}: {}", text.into()));
}

fn stmt_lines(stmt: &Stmt, out: &mut Vec<String>) {
    let line = stmt.line;
    match &stmt.kind {
        StmtKind::Cond { arms, otherwise } => {
            for (i, (cond, body)) in arms.iter().enumerate() {
                emit(out, line, if i == 0 { "IF" } else { "ELSEIF" });
                expr_lines(cond, line, out);
                for s in body {
                    stmt_lines(s, out);
                }
            }
            if !otherwise.is_empty() {
                emit(out, line, "ELSE");
                for s in otherwise {
                    stmt_lines(s, out);
                }
            }
            emit(out, line, "ENDIF");
        }
        StmtKind::While { label, cond, body } => {
            emit(out, line, label_text("WHILE", label.as_deref()));
            expr_lines(cond, line, out);
            for s in body {
                stmt_lines(s, out);
            }
            emit(out, line, "ENDWHILE");
        }
        StmtKind::ForList {
            value,
            index,
            expr,
            body,
            ..
        } => {
            expr_lines(expr, line, out);
            match index {
                Some(i) => emit(out, line, format!("FOR_LIST {value}, {i}")),
                None => emit(out, line, format!("FOR_LIST {value}")),
            }
            for s in body {
                stmt_lines(s, out);
            }
            emit(out, line, "ENDFOR");
        }
        StmtKind::ForRange { var, from, to, body, .. } => {
            expr_lines(from, line, out);
            expr_lines(to, line, out);
            emit(out, line, format!("FOR_RANGE {var}"));
            for s in body {
                stmt_lines(s, out);
            }
            emit(out, line, "ENDFOR");
        }
        StmtKind::Fork { var, delay, body } => {
            expr_lines(delay, line, out);
            match var {
                Some(v) => emit(out, line, format!("FORK {v}")),
                None => emit(out, line, "FORK"),
            }
            for s in body {
                stmt_lines(s, out);
            }
            emit(out, line, "ENDFORK");
        }
        StmtKind::TryExcept { body, excepts } => {
            emit(out, line, "TRY_EXCEPT");
            for s in body {
                stmt_lines(s, out);
            }
            for arm in excepts {
                let id = arm.id.as_deref().unwrap_or("_");
                emit(out, line, format!("EXCEPT {id}"));
                for s in &arm.body {
                    stmt_lines(s, out);
                }
            }
            emit(out, line, "ENDTRY");
        }
        StmtKind::TryFinally { body, handler } => {
            emit(out, line, "TRY_FINALLY");
            for s in body {
                stmt_lines(s, out);
            }
            emit(out, line, "FINALLY");
            for s in handler {
                stmt_lines(s, out);
            }
            emit(out, line, "ENDTRY");
        }
        StmtKind::Break(label) => emit(out, line, label_text("BREAK", label.as_deref())),
        StmtKind::Continue(label) => emit(out, line, label_text("CONTINUE", label.as_deref())),
        StmtKind::Return(Some(e)) => {
            expr_lines(e, line, out);
            emit(out, line, "RETURN");
        }
        StmtKind::Return(None) => emit(out, line, "RETURN_0"),
        StmtKind::Expr(e) => {
            expr_lines(e, line, out);
            emit(out, line, "POP");
        }
    }
}

fn label_text(op: &str, label: Option<&str>) -> String {
    match label {
        Some(l) => format!("{op} {l}"),
        None => op.to_string(),
    }
}

fn expr_lines(expr: &Expr, line: usize, out: &mut Vec<String>) {
    match expr {
        Expr::Value(v) => emit(out, line, format!("PUSH {}", byre_core::literal::to_literal(v))),
        Expr::Id(name) => emit(out, line, format!("PUSH_VAR {name}")),
        Expr::Sysprop(name) => emit(out, line, format!("PUSH_SYSPROP {name}")),
        Expr::List(args) => {
            args_lines(args, line, out);
            emit(out, line, format!("MAKE_LIST {}", args.len()));
        }
        Expr::Map(pairs) => {
            for (k, v) in pairs {
                expr_lines(k, line, out);
                expr_lines(v, line, out);
            }
            emit(out, line, format!("MAKE_MAP {}", pairs.len()));
        }
        Expr::And(a, b) => {
            expr_lines(a, line, out);
            emit(out, line, "AND");
            expr_lines(b, line, out);
        }
        Expr::Or(a, b) => {
            expr_lines(a, line, out);
            emit(out, line, "OR");
            expr_lines(b, line, out);
        }
        Expr::Not(e) => {
            expr_lines(e, line, out);
            emit(out, line, "NOT");
        }
        Expr::Neg(e) => {
            expr_lines(e, line, out);
            emit(out, line, "NEG");
        }
        Expr::Binary(op, a, b) => {
            expr_lines(a, line, out);
            expr_lines(b, line, out);
            emit(out, line, format!("{op:?}").to_uppercase());
        }
        Expr::Index(base, idx) => {
            expr_lines(base, line, out);
            expr_lines(idx, line, out);
            emit(out, line, "INDEX");
        }
        Expr::Range { base, from, to } => {
            expr_lines(base, line, out);
            expr_lines(from, line, out);
            expr_lines(to, line, out);
            emit(out, line, "RANGE");
        }
        Expr::RangeStart => emit(out, line, "PUSH_RANGE_START"),
        Expr::RangeEnd => emit(out, line, "PUSH_RANGE_END"),
        Expr::Cond { cond, yes, no } => {
            expr_lines(cond, line, out);
            emit(out, line, "IF_EXPR");
            expr_lines(yes, line, out);
            emit(out, line, "ELSE_EXPR");
            expr_lines(no, line, out);
        }
        Expr::Catch { expr, .. } => {
            emit(out, line, "CATCH_PUSH");
            expr_lines(expr, line, out);
            emit(out, line, "CATCH_POP");
        }
        Expr::Prop { obj, name } => {
            expr_lines(obj, line, out);
            expr_lines(name, line, out);
            emit(out, line, "GET_PROP");
        }
        Expr::Verb { obj, name, args } => {
            expr_lines(obj, line, out);
            expr_lines(name, line, out);
            args_lines(args, line, out);
            emit(out, line, "CALL_VERB");
        }
        Expr::Call { func, args } => {
            args_lines(args, line, out);
            emit(out, line, format!("CALL_BUILTIN {func}"));
        }
        Expr::Assign { lhs, rhs } => {
            expr_lines(rhs, line, out);
            match lhs.as_ref() {
                Expr::Id(name) => emit(out, line, format!("STORE {name}")),
                Expr::Prop { obj, name } => {
                    expr_lines(obj, line, out);
                    expr_lines(name, line, out);
                    emit(out, line, "SET_PROP");
                }
                Expr::Index(base, idx) => {
                    expr_lines(base, line, out);
                    expr_lines(idx, line, out);
                    emit(out, line, "SET_INDEX");
                }
                Expr::Range { base, from, to } => {
                    expr_lines(base, line, out);
                    expr_lines(from, line, out);
                    expr_lines(to, line, out);
                    emit(out, line, "SET_RANGE");
                }
                _ => emit(out, line, "STORE_INVALID"),
            }
        }
        Expr::Scatter { targets, rhs } => {
            expr_lines(rhs, line, out);
            let spec: Vec<String> = targets
                .iter()
                .map(|t| match &t.kind {
                    ScatterKind::Required => t.name.clone(),
                    ScatterKind::Optional(_) => format!("?{}", t.name),
                    ScatterKind::Rest => format!("@{}", t.name),
                })
                .collect();
            emit(out, line, format!("SCATTER {}", spec.join(" ")));
        }
    }
}

fn args_lines(args: &[Arg], line: usize, out: &mut Vec<String>) {
    for arg in args {
        match arg {
            Arg::Normal(e) => expr_lines(e, line, out),
            Arg::Splice(e) => {
                expr_lines(e, line, out);
                emit(out, line, "SPLICE");
            }
        }
    }
}
