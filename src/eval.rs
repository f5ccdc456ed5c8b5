use crate::ast::*;
use crate::context::Context;
use crate::error::{DiagnosticKind, Diagnostics, EvalError, ParseError};
use crate::lexer::tokenize;
use crate::parser::{build, parse_expression};
use crate::value::Value;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::cmp::Ordering;

static LIST_LITERAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\[.*\]$").unwrap());

/// `{{?expr}}` nested inside an include's arguments.
static INLINE_VARIABLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{\s*\?([^}]*?)\s*\}\}").unwrap());

/// Largest integer a `for` block will count to.
pub const MAX_RANGE: usize = 1 << 20;

/// Evaluate expression source against a context frame.
pub fn evaluate(src: &str, ctx: &Context) -> Result<Value, EvalError> {
    let expr = parse_expression(src)?;
    eval_expr(&expr, ctx)
}

/// Tokenize, build and render `text` in one step. Declarations and includes
/// are not processed here; see [`crate::engine::Engine`].
pub fn render_str(text: &str, ctx: &Context, diagnostics: &mut Diagnostics) -> Result<String, ParseError> {
    let template = build(tokenize(text), diagnostics)?;
    Ok(Evaluator::new(diagnostics).render(&template, ctx))
}

/// A piece of rendered output.
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    Text(String),
    Include(PendingInclude),
}

/// An include directive met while rendering, with the frame it was met in.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingInclude {
    /// Directive text with any `{{?expr}}` in its arguments filled in.
    pub directive: String,
    pub args: String,
    pub frame: Context,
}

enum Iteration {
    Items(Vec<Value>),
    Count(usize),
}

/// Walks a block tree and produces text. Problems inside directives degrade
/// the output and are recorded; they never abort the render.
pub struct Evaluator<'d> {
    diagnostics: &'d mut Diagnostics,
}

impl<'d> Evaluator<'d> {
    pub fn new(diagnostics: &'d mut Diagnostics) -> Self {
        Self { diagnostics }
    }

    /// Render to text. Include directives are written back out as text.
    pub fn render(&mut self, template: &[Node], ctx: &Context) -> String {
        self.render_fragments(template, ctx)
            .into_iter()
            .map(|fragment| match fragment {
                Fragment::Text(s) => s,
                Fragment::Include(include) => include.directive,
            })
            .collect()
    }

    pub fn render_fragments(&mut self, template: &[Node], ctx: &Context) -> Vec<Fragment> {
        let mut output = Vec::new();
        self.render_into(&mut output, template, ctx);
        output
    }

    fn render_into(&mut self, output: &mut Vec<Fragment>, template: &[Node], ctx: &Context) {
        for node in template {
            match node {
                Node::Text(s) => push_text(output, s),
                Node::Var(expr) => {
                    if let Some(val) = self.eval_or_record(expr, ctx) {
                        push_text(output, &val.to_string());
                    }
                }
                Node::For {
                    target,
                    iterable,
                    body,
                } => {
                    let Some(val) = self.eval_or_record(iterable, ctx) else {
                        continue;
                    };
                    match iteration(val) {
                        Ok(Iteration::Items(items)) => {
                            for item in items {
                                let frame = ctx.bind(target, item);
                                self.render_into(output, body, &frame);
                            }
                        }
                        Ok(Iteration::Count(n)) => {
                            for i in 0..n {
                                let frame = ctx.bind(target, Value::from(i));
                                self.render_into(output, body, &frame);
                            }
                        }
                        Err(reason) => self.diagnostics.push(
                            DiagnosticKind::UnsupportedIterable,
                            format!("for({target} in {iterable}): {reason}"),
                        ),
                    }
                }
                Node::If { condition, body } => {
                    if self
                        .eval_or_record(condition, ctx)
                        .is_some_and(|v| v.is_truthy())
                    {
                        self.render_into(output, body, ctx);
                    }
                }
                Node::Include { directive, args } => {
                    let include = PendingInclude {
                        directive: self.fill_variables(directive, ctx),
                        args: self.fill_variables(args, ctx),
                        frame: ctx.clone(),
                    };
                    output.push(Fragment::Include(include));
                }
            }
        }
    }

    fn eval_or_record(&mut self, src: &str, ctx: &Context) -> Option<Value> {
        match evaluate(src, ctx) {
            Ok(val) => Some(val),
            Err(e) => {
                self.diagnostics
                    .push(DiagnosticKind::Evaluation, format!("{{{{{src}}}}}: {e}"));
                None
            }
        }
    }

    fn fill_variables(&mut self, text: &str, ctx: &Context) -> String {
        INLINE_VARIABLE
            .replace_all(text, |caps: &Captures<'_>| {
                self.eval_or_record(caps[1].trim(), ctx)
                    .map(|v| v.to_string())
                    .unwrap_or_default()
            })
            .into_owned()
    }
}

fn push_text(output: &mut Vec<Fragment>, text: &str) {
    if let Some(Fragment::Text(prev)) = output.last_mut() {
        prev.push_str(text);
    } else {
        output.push(Fragment::Text(text.to_string()));
    }
}

/// What a `for` block walks over, or why it walks over nothing.
fn iteration(val: Value) -> Result<Iteration, String> {
    let val = match val {
        Value::String(s) if LIST_LITERAL.is_match(s.trim()) => {
            // Literal-only: no context, so identifiers inside fail.
            match evaluate(s.trim(), &Context::new()) {
                Ok(parsed @ Value::Array(_)) => parsed,
                _ => Value::String(s),
            }
        }
        other => other,
    };
    match val {
        Value::Array(items) => Ok(Iteration::Items(items)),
        other => match other.as_count() {
            Some(n) if n > MAX_RANGE => Err(format!("count {n} exceeds the limit of {MAX_RANGE}")),
            Some(n) => Ok(Iteration::Count(n)),
            None => Err(format!("cannot iterate over {}", other.type_name())),
        },
    }
}

pub fn eval_expr(expr: &Expr, ctx: &Context) -> Result<Value, EvalError> {
    match expr {
        Expr::NumberLit(n) => Ok(Value::Number(*n)),
        Expr::StringLit(s) => Ok(Value::String(s.clone())),
        Expr::BoolLit(b) => Ok(Value::Bool(*b)),
        Expr::Null => Ok(Value::Null),
        Expr::Array(items) => Ok(Value::Array(
            items
                .iter()
                .map(|e| eval_expr(e, ctx))
                .collect::<Result<_, _>>()?,
        )),
        Expr::Object(entries) => Ok(Value::Map(
            entries
                .iter()
                .map(|(k, e)| Ok((k.clone(), eval_expr(e, ctx)?)))
                .collect::<Result<_, EvalError>>()?,
        )),
        Expr::Var(name) => ctx
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::UndefinedVariable(name.clone())),
        Expr::Attribute(obj, attr) => {
            let val = eval_expr(obj, ctx)?;
            member(&val, attr)
        }
        Expr::Index(obj, idx) => {
            let val = eval_expr(obj, ctx)?;
            let idx_val = eval_expr(idx, ctx)?;
            match (&val, &idx_val) {
                (Value::Array(a), Value::Number(_)) => Ok(idx_val
                    .as_count()
                    .and_then(|i| a.get(i).cloned())
                    .unwrap_or(Value::Null)),
                (Value::String(s), Value::Number(_)) => Ok(idx_val
                    .as_count()
                    .and_then(|i| s.chars().nth(i))
                    .map_or(Value::Null, |c| Value::String(c.to_string()))),
                (_, Value::String(key)) => member(&val, key),
                _ => Err(EvalError::Type(format!(
                    "cannot index {} with {}",
                    val.type_name(),
                    idx_val.type_name()
                ))),
            }
        }
        Expr::Unary(op, operand) => {
            let v = eval_expr(operand, ctx)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!v.is_truthy())),
                UnaryOp::Neg => match v {
                    Value::Number(n) => Ok(Value::Number(-n)),
                    other => Err(EvalError::Type(format!("cannot negate {}", other.type_name()))),
                },
            }
        }
        Expr::BinOp(lhs, BinOp::And, rhs) => {
            let l = eval_expr(lhs, ctx)?;
            Ok(Value::Bool(l.is_truthy() && eval_expr(rhs, ctx)?.is_truthy()))
        }
        Expr::BinOp(lhs, BinOp::Or, rhs) => {
            let l = eval_expr(lhs, ctx)?;
            Ok(Value::Bool(l.is_truthy() || eval_expr(rhs, ctx)?.is_truthy()))
        }
        Expr::BinOp(lhs, op, rhs) => {
            let l = eval_expr(lhs, ctx)?;
            let r = eval_expr(rhs, ctx)?;
            binary(*op, l, r)
        }
        Expr::Conditional(cond, then, otherwise) => {
            if eval_expr(cond, ctx)?.is_truthy() {
                eval_expr(then, ctx)
            } else {
                eval_expr(otherwise, ctx)
            }
        }
    }
}

fn member(val: &Value, name: &str) -> Result<Value, EvalError> {
    match (val, name) {
        (Value::Map(m), _) if m.contains_key(name) => Ok(m[name].clone()),
        (Value::Map(m), "length") => Ok(Value::from(m.len())),
        (Value::Map(_), _) => Ok(Value::Null),
        (Value::Array(a), "length") => Ok(Value::from(a.len())),
        (Value::String(s), "length") => Ok(Value::from(s.chars().count())),
        _ => Err(EvalError::Type(format!(
            "cannot read `{}` of {}",
            name,
            val.type_name()
        ))),
    }
}

fn binary(op: BinOp, l: Value, r: Value) -> Result<Value, EvalError> {
    match op {
        BinOp::Eq => Ok(Value::Bool(l == r)),
        BinOp::NotEq => Ok(Value::Bool(l != r)),
        BinOp::Add => match (l, r) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
            (l @ Value::String(_), r) | (l, r @ Value::String(_)) => {
                Ok(Value::String(format!("{}{}", l, r)))
            }
            (l, r) => Err(EvalError::Type(format!(
                "cannot add {} and {}",
                l.type_name(),
                r.type_name()
            ))),
        },
        BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Rem => {
            let (Value::Number(a), Value::Number(b)) = (&l, &r) else {
                return Err(EvalError::Type(format!(
                    "arithmetic on {} and {}",
                    l.type_name(),
                    r.type_name()
                )));
            };
            match op {
                BinOp::Sub => Ok(Value::Number(a - b)),
                BinOp::Mul => Ok(Value::Number(a * b)),
                _ if *b == 0.0 => Err(EvalError::DivisionByZero),
                BinOp::Div => Ok(Value::Number(a / b)),
                _ => Ok(Value::Number(a % b)),
            }
        }
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            let ordering = match (&l, &r) {
                (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => {
                    return Err(EvalError::Type(format!(
                        "cannot compare {} with {}",
                        l.type_name(),
                        r.type_name()
                    )))
                }
            };
            // NaN compares false both ways.
            Ok(Value::Bool(ordering.is_some_and(|o| match op {
                BinOp::Lt => o == Ordering::Less,
                BinOp::Le => o != Ordering::Greater,
                BinOp::Gt => o == Ordering::Greater,
                _ => o != Ordering::Less,
            })))
        }
        BinOp::And | BinOp::Or => unreachable!("short-circuit operators are handled in eval_expr"),
    }
}
