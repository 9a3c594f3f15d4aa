//! PEST-based parser for sandbox scripts.
//!
//! Produces the AST from [`super::ast`] and runs a small static validation
//! pass, so every error a script can have before it starts running is
//! reported as a [`CompileError`].

use std::collections::HashSet;
use std::rc::Rc;

use pest::Parser;
use pest::error::{InputLocation, LineColLocation};
use pest_derive::Parser;
use snafu::Snafu;

use super::ast::{
    BinaryOp, DeclKind, Expr, FunctionBody, FunctionDef, LogicalOp, Stmt, TemplatePart, UnaryOp,
    UpdateOp,
};
use super::value::number_to_string;

#[derive(Parser)]
#[grammar = "sandbox/script.pest"]
struct ScriptParser;

type Pair<'i> = pest::iterators::Pair<'i, Rule>;

#[derive(Debug, Clone, PartialEq, Snafu)]
pub enum CompileError {
    #[snafu(display("Unexpected token '{}' (line {}, column {})", token, line, column))]
    UnexpectedToken {
        token: String,
        line: usize,
        column: usize,
    },
    #[snafu(display("Unexpected end of input"))]
    UnexpectedEnd,
    #[snafu(display("Identifier '{}' has already been declared", name))]
    DuplicateDeclaration { name: String },
    #[snafu(display("Missing initializer in const declaration"))]
    MissingInitializer,
    #[snafu(display("Illegal break statement"))]
    IllegalBreak,
    #[snafu(display("Illegal continue statement: no surrounding iteration statement"))]
    IllegalContinue,
    #[snafu(display("Invalid left-hand side in assignment"))]
    InvalidAssignmentTarget,
    #[snafu(display("Invalid left-hand side expression in {} operation", position))]
    InvalidUpdateTarget { position: &'static str },
    #[snafu(display("Missing catch or finally after try"))]
    MissingCatchOrFinally,
    #[snafu(display("Invalid number literal '{}'", literal))]
    InvalidNumber { literal: String },
    #[snafu(display("Malformed syntax tree: expected {}", expected))]
    Malformed { expected: &'static str },
}

/// Parses and validates a whole script.
pub fn parse_script(source: &str) -> Result<Vec<Stmt>, CompileError> {
    let mut pairs =
        ScriptParser::parse(Rule::program, source).map_err(|err| syntax_error(source, &err))?;
    let program = pairs.next().ok_or(CompileError::Malformed {
        expected: "program",
    })?;

    let body = program
        .into_inner()
        .filter(|pair| pair.as_rule() != Rule::EOI)
        .map(build_statement)
        .collect::<Result<Vec<_>, _>>()?;

    Validator::default().block(&body)?;
    Ok(body)
}

fn syntax_error(source: &str, err: &pest::error::Error<Rule>) -> CompileError {
    let position = match err.location {
        InputLocation::Pos(pos) => pos,
        InputLocation::Span((start, _)) => start,
    };
    let (line, column) = match err.line_col {
        LineColLocation::Pos(line_col) => line_col,
        LineColLocation::Span(line_col, _) => line_col,
    };

    unexpected_token(source, position, line, column)
}

fn unexpected_token(source: &str, position: usize, line: usize, column: usize) -> CompileError {
    let rest = source.get(position..).unwrap_or_default().trim_start();
    let Some(first) = rest.chars().next() else {
        return CompileError::UnexpectedEnd;
    };
    let token = if is_ident_char(first) {
        rest.chars().take_while(|c| is_ident_char(*c)).collect()
    } else {
        first.to_string()
    };
    CompileError::UnexpectedToken {
        token,
        line,
        column,
    }
}

/// A statement without a trailing `;` must be followed by a line break, a
/// closing brace or the end of the script.
fn check_terminated(pair: &Pair<'_>) -> Result<(), CompileError> {
    let source = pair.get_input();
    let end = content_end(pair);
    if source.get(..end).is_some_and(|text| text.ends_with(';')) {
        return Ok(());
    }
    let rest = source.get(end..).unwrap_or_default();
    let (gap, line_break) = leading_gap(rest);
    let next = &rest[gap..];
    if line_break || next.is_empty() || next.starts_with('}') {
        return Ok(());
    }
    let (line, column) = pest::Position::new(source, end + gap)
        .map(|position| position.line_col())
        .unwrap_or((1, 1));
    Err(unexpected_token(source, end + gap, line, column))
}

/// End of the last token of a pair. Spans of rules ending in an optional
/// part also cover the whitespace skipped before it.
fn content_end(pair: &Pair<'_>) -> usize {
    let span = pair.as_span();
    match pair.clone().into_inner().last() {
        Some(last) => {
            let tail = pair
                .get_input()
                .get(last.as_span().end()..span.end())
                .unwrap_or_default();
            if leading_gap(tail).0 == tail.len() {
                content_end(&last)
            } else {
                span.end()
            }
        }
        None => span.end(),
    }
}

/// Byte length of the whitespace and comments `text` starts with, and
/// whether they contain a line break.
fn leading_gap(text: &str) -> (usize, bool) {
    let mut rest = text;
    let mut line_break = false;
    loop {
        let trimmed = rest.trim_start_matches([' ', '\t', '\r', '\n']);
        line_break |= rest[..rest.len() - trimmed.len()].contains('\n');
        rest = trimmed;
        if let Some(comment) = rest.strip_prefix("//") {
            rest = comment.find('\n').map_or("", |end| &comment[end..]);
        } else if let Some(comment) = rest.strip_prefix("/*") {
            let Some(end) = comment.find("*/") else {
                break;
            };
            line_break |= comment[..end].contains('\n');
            rest = &comment[end + 2..];
        } else {
            break;
        }
    }
    (text.len() - rest.len(), line_break)
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

fn is_keyword(rule: Rule) -> bool {
    matches!(
        rule,
        Rule::kw_function
            | Rule::kw_if
            | Rule::kw_else
            | Rule::kw_while
            | Rule::kw_for
            | Rule::kw_of
            | Rule::kw_return
            | Rule::kw_break
            | Rule::kw_continue
            | Rule::kw_throw
            | Rule::kw_try
            | Rule::kw_catch
            | Rule::kw_finally
            | Rule::kw_new
    )
}

/// Inner pairs without keyword tokens.
fn significant(pair: Pair<'_>) -> impl Iterator<Item = Pair<'_>> {
    pair.into_inner().filter(|inner| !is_keyword(inner.as_rule()))
}

fn expect<'i>(
    pairs: &mut impl Iterator<Item = Pair<'i>>,
    expected: &'static str,
) -> Result<Pair<'i>, CompileError> {
    pairs.next().ok_or(CompileError::Malformed { expected })
}

/* ===================== Statements ===================== */

fn build_statement(pair: Pair<'_>) -> Result<Stmt, CompileError> {
    if matches!(
        pair.as_rule(),
        Rule::var_decl_stmt
            | Rule::expr_stmt
            | Rule::return_stmt
            | Rule::break_stmt
            | Rule::continue_stmt
            | Rule::throw_stmt
    ) {
        check_terminated(&pair)?;
    }
    match pair.as_rule() {
        Rule::block => Ok(Stmt::Block {
            body: build_block(pair)?,
        }),
        Rule::function_decl => {
            let mut inner = significant(pair);
            let name = expect(&mut inner, "function name")?.as_str().to_string();
            let params = build_params(expect(&mut inner, "parameter list")?);
            let body = build_block(expect(&mut inner, "function body")?)?;
            Ok(Stmt::Function {
                function: Rc::new(FunctionDef {
                    name: Some(name),
                    params,
                    body: FunctionBody::Block(body),
                }),
            })
        }
        Rule::var_decl_stmt => {
            let mut inner = pair.into_inner();
            build_var_decl(expect(&mut inner, "declaration")?)
        }
        Rule::if_stmt => {
            let mut inner = significant(pair);
            let test = build_expression(expect(&mut inner, "if condition")?)?;
            let then_s = Box::new(build_statement(expect(&mut inner, "if body")?)?);
            let else_s = inner
                .next()
                .map(build_statement)
                .transpose()?
                .map(Box::new);
            Ok(Stmt::If {
                test,
                then_s,
                else_s,
            })
        }
        Rule::while_stmt => {
            let mut inner = significant(pair);
            let test = build_expression(expect(&mut inner, "while condition")?)?;
            let body = Box::new(build_statement(expect(&mut inner, "while body")?)?);
            Ok(Stmt::While { test, body })
        }
        Rule::for_stmt => build_for(pair),
        Rule::return_stmt => {
            let value = significant(pair).next().map(build_expression).transpose()?;
            Ok(Stmt::Return { value })
        }
        Rule::break_stmt => Ok(Stmt::Break),
        Rule::continue_stmt => Ok(Stmt::Continue),
        Rule::throw_stmt => {
            let mut inner = significant(pair);
            let value = build_expression(expect(&mut inner, "thrown value")?)?;
            Ok(Stmt::Throw { value })
        }
        Rule::try_stmt => build_try(pair),
        Rule::empty_stmt => Ok(Stmt::Empty),
        Rule::expr_stmt => {
            let mut inner = pair.into_inner();
            let expr = build_expression(expect(&mut inner, "expression")?)?;
            Ok(Stmt::Expr { expr })
        }
        _ => Err(CompileError::Malformed {
            expected: "statement",
        }),
    }
}

fn build_block(pair: Pair<'_>) -> Result<Vec<Stmt>, CompileError> {
    pair.into_inner().map(build_statement).collect()
}

fn build_params(pair: Pair<'_>) -> Vec<String> {
    pair.into_inner()
        .map(|param| param.as_str().to_string())
        .collect()
}

fn decl_kind(pair: &Pair<'_>) -> DeclKind {
    match pair.as_str() {
        "const" => DeclKind::Const,
        "var" => DeclKind::Var,
        _ => DeclKind::Let,
    }
}

fn build_var_decl(pair: Pair<'_>) -> Result<Stmt, CompileError> {
    let mut inner = pair.into_inner();
    let kind = decl_kind(&expect(&mut inner, "declaration kind")?);

    let declarations = inner
        .map(|declarator| {
            let mut parts = declarator.into_inner();
            let name = expect(&mut parts, "declared name")?.as_str().to_string();
            let init = parts.next().map(build_expression).transpose()?;
            Ok((name, init))
        })
        .collect::<Result<Vec<_>, CompileError>>()?;

    Ok(Stmt::Declare { kind, declarations })
}

fn build_for(pair: Pair<'_>) -> Result<Stmt, CompileError> {
    let mut inner = significant(pair);
    let head = expect(&mut inner, "for head")?;
    let body = Box::new(build_statement(expect(&mut inner, "for body")?)?);

    if head.as_rule() == Rule::for_of_head {
        let mut parts = significant(head);
        let kind = decl_kind(&expect(&mut parts, "declaration kind")?);
        let binding = expect(&mut parts, "loop binding")?.as_str().to_string();
        let iterable = build_expression(expect(&mut parts, "iterable")?)?;
        return Ok(Stmt::ForOf {
            kind,
            binding,
            iterable,
            body,
        });
    }

    let mut init = None;
    let mut test = None;
    let mut update = None;
    for part in head.into_inner() {
        match part.as_rule() {
            Rule::for_init => {
                let mut clause = part.into_inner();
                let clause = expect(&mut clause, "for initializer")?;
                let stmt = if clause.as_rule() == Rule::var_decl {
                    build_var_decl(clause)?
                } else {
                    Stmt::Expr {
                        expr: build_expression(clause)?,
                    }
                };
                init = Some(Box::new(stmt));
            }
            Rule::for_test => {
                let mut clause = part.into_inner();
                test = Some(build_expression(expect(&mut clause, "for condition")?)?);
            }
            Rule::for_update => {
                let mut clause = part.into_inner();
                update = Some(build_expression(expect(&mut clause, "for update")?)?);
            }
            _ => {}
        }
    }

    Ok(Stmt::For {
        init,
        test,
        update,
        body,
    })
}

fn build_try(pair: Pair<'_>) -> Result<Stmt, CompileError> {
    let mut inner = significant(pair);
    let body = build_block(expect(&mut inner, "try block")?)?;

    let mut catch_param = None;
    let mut catch_body = None;
    let mut finally_body = None;
    for clause in inner {
        match clause.as_rule() {
            Rule::catch_clause => {
                for part in significant(clause) {
                    match part.as_rule() {
                        Rule::identifier => catch_param = Some(part.as_str().to_string()),
                        _ => catch_body = Some(build_block(part)?),
                    }
                }
            }
            Rule::finally_clause => {
                let mut parts = significant(clause);
                finally_body = Some(build_block(expect(&mut parts, "finally block")?)?);
            }
            _ => {}
        }
    }

    if catch_body.is_none() && finally_body.is_none() {
        return Err(CompileError::MissingCatchOrFinally);
    }

    Ok(Stmt::Try {
        body,
        catch_param,
        catch_body,
        finally_body,
    })
}

/* ===================== Expressions ===================== */

fn build_expression(pair: Pair<'_>) -> Result<Expr, CompileError> {
    match pair.as_rule() {
        Rule::expression | Rule::paren_expr => {
            let mut inner = pair.into_inner();
            build_expression(expect(&mut inner, "expression")?)
        }
        Rule::assignment => build_assignment(pair),
        Rule::arrow_function => build_arrow(pair),
        Rule::conditional => {
            let mut inner = pair.into_inner();
            let test = build_expression(expect(&mut inner, "condition")?)?;
            let Some(consequent) = inner.next() else {
                return Ok(test);
            };
            let consequent = build_expression(consequent)?;
            let alternate = build_expression(expect(&mut inner, "conditional alternate")?)?;
            Ok(Expr::Conditional {
                test: Box::new(test),
                consequent: Box::new(consequent),
                alternate: Box::new(alternate),
            })
        }
        Rule::logical_or
        | Rule::logical_and
        | Rule::equality
        | Rule::relational
        | Rule::additive
        | Rule::multiplicative => build_binary_chain(pair),
        Rule::unary => build_unary(pair),
        Rule::postfix => build_postfix(pair),
        Rule::call_member => build_call_member(pair),
        Rule::number => parse_number(pair.as_str()).map(|v| Expr::LitNum { v }),
        Rule::string => Ok(Expr::LitStr {
            v: string_value(pair),
        }),
        Rule::template => {
            let parts = pair
                .into_inner()
                .map(|part| match part.as_rule() {
                    Rule::template_subst => {
                        let mut inner = part.into_inner();
                        build_expression(expect(&mut inner, "template expression")?)
                            .map(TemplatePart::Expr)
                    }
                    _ => Ok(TemplatePart::Text(unescape(part.as_str()))),
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Expr::Template { parts })
        }
        Rule::boolean => Ok(Expr::LitBool {
            v: pair.as_str() == "true",
        }),
        Rule::null_lit => Ok(Expr::LitNull),
        Rule::undefined_lit => Ok(Expr::LitUndefined),
        Rule::function_expr => {
            let mut name = None;
            let mut params = Vec::new();
            let mut body = Vec::new();
            for part in significant(pair) {
                match part.as_rule() {
                    Rule::identifier => name = Some(part.as_str().to_string()),
                    Rule::params => params = build_params(part),
                    _ => body = build_block(part)?,
                }
            }
            Ok(Expr::Function {
                function: Rc::new(FunctionDef {
                    name,
                    params,
                    body: FunctionBody::Block(body),
                }),
            })
        }
        Rule::new_expr => {
            let mut inner = significant(pair);
            let constructor = expect(&mut inner, "constructor name")?.as_str().to_string();
            let args = match inner.next() {
                Some(args) => build_args(args)?,
                None => Vec::new(),
            };
            Ok(Expr::New { constructor, args })
        }
        Rule::array_literal => {
            let items = pair
                .into_inner()
                .map(build_expression)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Expr::Array { items })
        }
        Rule::object_literal => {
            let properties = pair
                .into_inner()
                .map(build_property)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Expr::Object { properties })
        }
        Rule::identifier => Ok(Expr::Ident {
            name: pair.as_str().to_string(),
        }),
        _ => Err(CompileError::Malformed {
            expected: "expression",
        }),
    }
}

fn build_assignment(pair: Pair<'_>) -> Result<Expr, CompileError> {
    let mut inner = pair.into_inner();
    let target = build_expression(expect(&mut inner, "assignment operand")?)?;
    let Some(op) = inner.next() else {
        return Ok(target);
    };
    if !target.is_assignable() {
        return Err(CompileError::InvalidAssignmentTarget);
    }

    let op = match op.as_str() {
        "+=" => Some(BinaryOp::Add),
        "-=" => Some(BinaryOp::Sub),
        "*=" => Some(BinaryOp::Mul),
        "/=" => Some(BinaryOp::Div),
        "%=" => Some(BinaryOp::Rem),
        _ => None,
    };
    let value = build_expression(expect(&mut inner, "assigned value")?)?;
    Ok(Expr::Assign {
        target: Box::new(target),
        op,
        value: Box::new(value),
    })
}

fn build_arrow(pair: Pair<'_>) -> Result<Expr, CompileError> {
    let mut inner = pair.into_inner();
    let params = build_params(expect(&mut inner, "arrow parameters")?);
    let body = expect(&mut inner, "arrow body")?;
    let body = match body.as_rule() {
        Rule::block => FunctionBody::Block(build_block(body)?),
        _ => FunctionBody::Expr(build_expression(body)?),
    };
    Ok(Expr::Function {
        function: Rc::new(FunctionDef {
            name: None,
            params,
            body,
        }),
    })
}

fn build_binary_chain(pair: Pair<'_>) -> Result<Expr, CompileError> {
    let mut inner = pair.into_inner();
    let mut expr = build_expression(expect(&mut inner, "operand")?)?;

    while let Some(op) = inner.next() {
        let right = build_expression(expect(&mut inner, "right operand")?)?;
        let (left, right) = (Box::new(expr), Box::new(right));
        expr = match op.as_str() {
            "||" => Expr::Logical {
                op: LogicalOp::Or,
                left,
                right,
            },
            "??" => Expr::Logical {
                op: LogicalOp::Nullish,
                left,
                right,
            },
            "&&" => Expr::Logical {
                op: LogicalOp::And,
                left,
                right,
            },
            other => Expr::Binary {
                op: binary_op(other)?,
                left,
                right,
            },
        };
    }

    Ok(expr)
}

fn binary_op(op: &str) -> Result<BinaryOp, CompileError> {
    Ok(match op {
        "+" => BinaryOp::Add,
        "-" => BinaryOp::Sub,
        "*" => BinaryOp::Mul,
        "/" => BinaryOp::Div,
        "%" => BinaryOp::Rem,
        "===" => BinaryOp::StrictEq,
        "!==" => BinaryOp::StrictNe,
        "==" => BinaryOp::LooseEq,
        "!=" => BinaryOp::LooseNe,
        "<" => BinaryOp::Lt,
        "<=" => BinaryOp::Le,
        ">" => BinaryOp::Gt,
        ">=" => BinaryOp::Ge,
        _ => {
            return Err(CompileError::Malformed {
                expected: "binary operator",
            });
        }
    })
}

fn build_unary(pair: Pair<'_>) -> Result<Expr, CompileError> {
    let mut ops = Vec::new();
    let mut operand = None;
    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::unary_op => ops.push(match part.as_str() {
                "!" => UnaryOp::Not,
                "-" => UnaryOp::Neg,
                "+" => UnaryOp::Plus,
                _ => UnaryOp::TypeOf,
            }),
            _ => operand = Some(build_expression(part)?),
        }
    }

    let operand = operand.ok_or(CompileError::Malformed {
        expected: "unary operand",
    })?;
    Ok(ops.into_iter().rev().fold(operand, |expr, op| Expr::Unary {
        op,
        operand: Box::new(expr),
    }))
}

fn update_op(pair: &Pair<'_>) -> UpdateOp {
    if pair.as_str() == "--" {
        UpdateOp::Decrement
    } else {
        UpdateOp::Increment
    }
}

fn build_postfix(pair: Pair<'_>) -> Result<Expr, CompileError> {
    let mut inner = pair.into_inner();
    let first = expect(&mut inner, "postfix operand")?;

    if first.as_rule() == Rule::prefix_update {
        let mut parts = first.into_inner();
        let op = update_op(&expect(&mut parts, "update operator")?);
        let target = build_expression(expect(&mut parts, "update target")?)?;
        if !target.is_assignable() {
            return Err(CompileError::InvalidUpdateTarget { position: "prefix" });
        }
        return Ok(Expr::Update {
            op,
            prefix: true,
            target: Box::new(target),
        });
    }

    let target = build_expression(first)?;
    match inner.next() {
        None => Ok(target),
        Some(op) => {
            if !target.is_assignable() {
                return Err(CompileError::InvalidUpdateTarget {
                    position: "postfix",
                });
            }
            Ok(Expr::Update {
                op: update_op(&op),
                prefix: false,
                target: Box::new(target),
            })
        }
    }
}

fn build_call_member(pair: Pair<'_>) -> Result<Expr, CompileError> {
    let mut inner = pair.into_inner();
    let mut expr = build_expression(expect(&mut inner, "primary expression")?)?;

    for accessor in inner {
        expr = match accessor.as_rule() {
            Rule::member_access => {
                let mut parts = accessor.into_inner();
                Expr::Member {
                    object: Box::new(expr),
                    property: expect(&mut parts, "property name")?.as_str().to_string(),
                }
            }
            Rule::index_access => {
                let mut parts = accessor.into_inner();
                Expr::Index {
                    object: Box::new(expr),
                    index: Box::new(build_expression(expect(&mut parts, "index")?)?),
                }
            }
            _ => Expr::Call {
                callee: Box::new(expr),
                args: build_args(accessor)?,
            },
        };
    }

    Ok(expr)
}

fn build_args(pair: Pair<'_>) -> Result<Vec<Expr>, CompileError> {
    pair.into_inner().map(build_expression).collect()
}

fn build_property(pair: Pair<'_>) -> Result<(String, Expr), CompileError> {
    if pair.as_rule() == Rule::shorthand_property {
        let name = pair.as_str().to_string();
        return Ok((name.clone(), Expr::Ident { name }));
    }

    let mut inner = pair.into_inner();
    let key = expect(&mut inner, "property key")?;
    let mut key_parts = key.into_inner();
    let key = expect(&mut key_parts, "property key")?;
    let key = match key.as_rule() {
        Rule::string => string_value(key),
        Rule::number => number_to_string(parse_number(key.as_str())?),
        _ => key.as_str().to_string(),
    };
    let value = build_expression(expect(&mut inner, "property value")?)?;
    Ok((key, value))
}

/* ===================== Literals ===================== */

fn parse_number(literal: &str) -> Result<f64, CompileError> {
    literal
        .parse::<f64>()
        .map_err(|_| CompileError::InvalidNumber {
            literal: literal.to_string(),
        })
}

fn string_value(pair: Pair<'_>) -> String {
    pair.into_inner()
        .next()
        .map(|inner| unescape(inner.as_str()))
        .unwrap_or_default()
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('b') => out.push('\u{8}'),
            Some('f') => out.push('\u{c}'),
            Some('v') => out.push('\u{b}'),
            Some('0') => out.push('\0'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => out.push(decoded),
                    None => {
                        out.push('u');
                        out.push_str(&hex);
                    }
                }
            }
            Some('\n') => {}
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/* ===================== Static validation ===================== */

/// Catches the errors a JavaScript engine reports before running anything:
/// redeclared lexical bindings and `break`/`continue` outside of loops.
#[derive(Default)]
struct Validator {
    loop_depth: usize,
}

impl Validator {
    fn block(&mut self, body: &[Stmt]) -> Result<(), CompileError> {
        let mut declared = HashSet::new();
        for stmt in body {
            if let Stmt::Declare {
                kind: DeclKind::Const,
                declarations,
            } = stmt
                && declarations.iter().any(|(_, init)| init.is_none())
            {
                return Err(CompileError::MissingInitializer);
            }

            let names: Vec<&String> = match stmt {
                Stmt::Declare {
                    kind: DeclKind::Let | DeclKind::Const,
                    declarations,
                } => declarations.iter().map(|(name, _)| name).collect(),
                Stmt::Function { function } => function.name.iter().collect(),
                _ => Vec::new(),
            };
            for name in names {
                if !declared.insert(name.as_str()) {
                    return Err(CompileError::DuplicateDeclaration { name: name.clone() });
                }
            }
            self.statement(stmt)?;
        }
        Ok(())
    }

    fn statement(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        match stmt {
            Stmt::Block { body } => self.block(body),
            Stmt::Declare { declarations, .. } => declarations
                .iter()
                .filter_map(|(_, init)| init.as_ref())
                .try_for_each(|init| self.expression(init)),
            Stmt::Function { function } => self.function(function),
            Stmt::Expr { expr } => self.expression(expr),
            Stmt::If {
                test,
                then_s,
                else_s,
            } => {
                self.expression(test)?;
                self.statement(then_s)?;
                else_s
                    .as_deref()
                    .map_or(Ok(()), |else_s| self.statement(else_s))
            }
            Stmt::While { test, body } => {
                self.expression(test)?;
                self.in_loop(body)
            }
            Stmt::For {
                init,
                test,
                update,
                body,
            } => {
                if let Some(init) = init {
                    self.statement(init)?;
                }
                for expr in test.iter().chain(update.iter()) {
                    self.expression(expr)?;
                }
                self.in_loop(body)
            }
            Stmt::ForOf { iterable, body, .. } => {
                self.expression(iterable)?;
                self.in_loop(body)
            }
            Stmt::Return { value } => value.as_ref().map_or(Ok(()), |v| self.expression(v)),
            Stmt::Throw { value } => self.expression(value),
            Stmt::Break if self.loop_depth == 0 => Err(CompileError::IllegalBreak),
            Stmt::Continue if self.loop_depth == 0 => Err(CompileError::IllegalContinue),
            Stmt::Try {
                body,
                catch_body,
                finally_body,
                ..
            } => {
                self.block(body)?;
                for handler in catch_body.iter().chain(finally_body.iter()) {
                    self.block(handler)?;
                }
                Ok(())
            }
            Stmt::Break | Stmt::Continue | Stmt::Empty => Ok(()),
        }
    }

    fn in_loop(&mut self, body: &Stmt) -> Result<(), CompileError> {
        self.loop_depth += 1;
        let result = self.statement(body);
        self.loop_depth -= 1;
        result
    }

    fn function(&mut self, function: &FunctionDef) -> Result<(), CompileError> {
        let enclosing_loops = std::mem::take(&mut self.loop_depth);
        let result = match &function.body {
            FunctionBody::Block(body) => self.block(body),
            FunctionBody::Expr(expr) => self.expression(expr),
        };
        self.loop_depth = enclosing_loops;
        result
    }

    fn expression(&mut self, expr: &Expr) -> Result<(), CompileError> {
        match expr {
            Expr::Function { function } => self.function(function),
            Expr::Template { parts } => parts.iter().try_for_each(|part| match part {
                TemplatePart::Expr(expr) => self.expression(expr),
                TemplatePart::Text(_) => Ok(()),
            }),
            Expr::Array { items } => items.iter().try_for_each(|item| self.expression(item)),
            Expr::Object { properties } => properties
                .iter()
                .try_for_each(|(_, value)| self.expression(value)),
            Expr::Member { object, .. } => self.expression(object),
            Expr::Index { object, index } => {
                self.expression(object)?;
                self.expression(index)
            }
            Expr::Call { callee, args } => {
                self.expression(callee)?;
                args.iter().try_for_each(|arg| self.expression(arg))
            }
            Expr::New { args, .. } => args.iter().try_for_each(|arg| self.expression(arg)),
            Expr::Unary { operand, .. } => self.expression(operand),
            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                self.expression(left)?;
                self.expression(right)
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                self.expression(test)?;
                self.expression(consequent)?;
                self.expression(alternate)
            }
            Expr::Assign { target, value, .. } => {
                self.expression(target)?;
                self.expression(value)
            }
            Expr::Update { target, .. } => self.expression(target),
            Expr::LitUndefined
            | Expr::LitNull
            | Expr::LitBool { .. }
            | Expr::LitNum { .. }
            | Expr::LitStr { .. }
            | Expr::Ident { .. } => Ok(()),
        }
    }
}
