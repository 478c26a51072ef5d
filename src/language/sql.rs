use super::vector::{BinaryKind, Operand};
use super::{Language, Scope};
use crate::array::Array;
use crate::error::{ReadError, Result};
use crate::helpers::edit_distance::closest_names;
use crate::pipeline::ExpressionContext;
use sqlparser::ast::{
    BinaryOperator, DateTimeField, Expr, Function, FunctionArg, FunctionArgExpr, UnaryOperator,
    Value,
};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::Token;
use std::collections::{HashMap, HashSet};
use tracing::trace;

const MAX_SUGGESTIONS: usize = 10;

/// Arithmetic, comparison and logic over branches, written as SQL scalar
/// expressions: `sqrt(px*px + py*py)`, `num(jets) > 2 AND met > 40`.
///
/// Names that are not identifiers are written `get('name')`; a dotted name
/// such as `p4.x` refers to the branch of that name.
#[derive(Clone, Copy, Debug, Default)]
pub struct SqlLanguage;

impl SqlLanguage {
    pub fn new() -> Self {
        SqlLanguage
    }

    fn parse(text: &str) -> Result<Expr> {
        let dialect = GenericDialect {};
        let parse_error = |source| ReadError::Parse {
            expression: text.to_string(),
            source,
        };
        let mut parser = Parser::new(&dialect)
            .try_with_sql(text)
            .map_err(parse_error)?;
        let expr = parser.parse_expr().map_err(parse_error)?;
        let next = parser.peek_token();
        if next.token != Token::EOF {
            return Err(ReadError::expression(
                text,
                format!("unexpected {} after the expression", next.token),
            ));
        }
        Ok(expr)
    }

    fn collect_symbols(
        expr: &Expr,
        text: &str,
        scope: Scope<'_>,
        out: &mut Vec<String>,
    ) -> Result<()> {
        if let Some(name) = symbol_name(expr, text)? {
            if !scope.keys.contains(&name) && !scope.aliases.contains_key(&name) {
                return Err(missing_name(&name, scope));
            }
            if !out.contains(&name) {
                out.push(name);
            }
            return Ok(());
        }

        match expr {
            Expr::Value(_) => Ok(()),
            Expr::Nested(inner)
            | Expr::UnaryOp { expr: inner, .. }
            | Expr::Floor { expr: inner, .. }
            | Expr::Ceil { expr: inner, .. } => Self::collect_symbols(inner, text, scope, out),
            Expr::BinaryOp { left, right, .. } => {
                Self::collect_symbols(left, text, scope, out)?;
                Self::collect_symbols(right, text, scope, out)
            }
            Expr::Function(function) => {
                for arg in function_args(function, text)? {
                    Self::collect_symbols(arg, text, scope, out)?;
                }
                Ok(())
            }
            other => Err(ReadError::expression(
                text,
                format!("unsupported syntax: {other}"),
            )),
        }
    }

    fn evaluate(
        &self,
        expr: &Expr,
        text: &str,
        values: &HashMap<String, Array>,
    ) -> Result<Operand> {
        let fail = |reason: String| ReadError::expression(text, reason);

        if let Some(name) = symbol_name(expr, text)? {
            let array = lookup(values, &name, text)?;
            return Operand::from_array(array).map_err(fail);
        }

        match expr {
            Expr::Value(Value::Number(n, _)) => match n.parse::<i64>() {
                Ok(int) => Ok(Operand::int(int)),
                Err(_) => n
                    .parse::<f64>()
                    .map(Operand::float)
                    .map_err(|_| fail(format!("invalid number {n}"))),
            },
            Expr::Value(Value::Boolean(b)) => Ok(Operand::boolean(*b)),
            Expr::Nested(inner) => self.evaluate(inner, text, values),
            Expr::UnaryOp { op, expr } => {
                let value = self.evaluate(expr, text, values)?;
                match op {
                    UnaryOperator::Plus => Ok(value),
                    UnaryOperator::Minus => Ok(value.negate()),
                    UnaryOperator::Not => Ok(value.not()),
                    _ => Err(fail(format!("unsupported unary operator {op}"))),
                }
            }
            Expr::BinaryOp { left, op, right } => {
                let kind = match op {
                    BinaryOperator::Plus => BinaryKind::Add,
                    BinaryOperator::Minus => BinaryKind::Sub,
                    BinaryOperator::Multiply => BinaryKind::Mul,
                    BinaryOperator::Divide => BinaryKind::Div,
                    BinaryOperator::Modulo => BinaryKind::Mod,
                    BinaryOperator::Eq => BinaryKind::Eq,
                    BinaryOperator::NotEq => BinaryKind::NotEq,
                    BinaryOperator::Lt => BinaryKind::Lt,
                    BinaryOperator::LtEq => BinaryKind::LtEq,
                    BinaryOperator::Gt => BinaryKind::Gt,
                    BinaryOperator::GtEq => BinaryKind::GtEq,
                    BinaryOperator::And => BinaryKind::And,
                    BinaryOperator::Or => BinaryKind::Or,
                    BinaryOperator::Xor => BinaryKind::Xor,
                    _ => return Err(fail(format!("unsupported operator {op}"))),
                };
                let lhs = self.evaluate(left, text, values)?;
                let rhs = self.evaluate(right, text, values)?;
                lhs.binary(kind, rhs).map_err(fail)
            }
            Expr::Floor { expr: inner, field } | Expr::Ceil { expr: inner, field } => {
                if *field != DateTimeField::NoDateTime {
                    return Err(fail("FLOOR and CEIL only take numeric expressions".into()));
                }
                let value = self.evaluate(inner, text, values)?;
                if matches!(expr, Expr::Floor { .. }) {
                    Ok(value.map_float(f64::floor))
                } else {
                    Ok(value.map_float(f64::ceil))
                }
            }
            Expr::Function(function) => self.evaluate_function(function, text, values),
            other => Err(fail(format!("unsupported syntax: {other}"))),
        }
    }

    fn evaluate_function(
        &self,
        function: &Function,
        text: &str,
        values: &HashMap<String, Array>,
    ) -> Result<Operand> {
        let fail = |reason: String| ReadError::expression(text, reason);
        let name = function.name.to_string().to_lowercase();
        let args = function_args(function, text)?
            .into_iter()
            .map(|arg| self.evaluate(arg, text, values))
            .collect::<Result<Vec<Operand>>>()?;

        let arity = match name.as_str() {
            "atan2" | "pow" | "power" => 2,
            _ => 1,
        };
        if args.len() != arity {
            return Err(fail(format!(
                "{name}() takes {arity} argument(s), got {}",
                args.len()
            )));
        }
        let mut args = args.into_iter();
        let (Some(first), second) = (args.next(), args.next()) else {
            return Err(fail(format!("{name}() is missing its argument")));
        };

        match (name.as_str(), second) {
            ("sqrt", None) => Ok(first.map_float(f64::sqrt)),
            ("exp", None) => Ok(first.map_float(f64::exp)),
            ("log", None) | ("ln", None) => Ok(first.map_float(f64::ln)),
            ("log10", None) => Ok(first.map_float(f64::log10)),
            ("sin", None) => Ok(first.map_float(f64::sin)),
            ("cos", None) => Ok(first.map_float(f64::cos)),
            ("tan", None) => Ok(first.map_float(f64::tan)),
            ("floor", None) => Ok(first.map_float(f64::floor)),
            ("ceil", None) => Ok(first.map_float(f64::ceil)),
            ("abs", None) => Ok(first.abs()),
            ("num", None) => first.counts().map_err(fail),
            ("sum", None) => first.sums().map_err(fail),
            ("atan2", Some(second)) => first.binary(BinaryKind::Atan2, second).map_err(fail),
            ("pow" | "power", Some(second)) => first.binary(BinaryKind::Pow, second).map_err(fail),
            _ => Err(fail(format!("unknown function {name}()"))),
        }
    }

    fn evaluate_text(
        &self,
        text: &str,
        values: &HashMap<String, Array>,
        num_entries: usize,
    ) -> Result<Array> {
        // a whole name wins over parsing, as in free_symbols
        if let Some(array) = values.get(text) {
            return Ok(array.clone());
        }
        let expr = Self::parse(text)?;
        // plain references keep their type, strings and records included
        if let Some(name) = symbol_name(&expr, text)? {
            return lookup(values, &name, text).cloned();
        }
        self.evaluate(&expr, text, values)?
            .into_array_of_len(num_entries)
            .map_err(|reason| ReadError::expression(text, reason))
    }
}

impl Language for SqlLanguage {
    fn getter_of(&self, name: &str) -> String {
        format!("get('{}')", name.replace('\'', "''"))
    }

    fn free_symbols(&self, expression: &str, scope: Scope<'_>) -> Result<Vec<String>> {
        if scope.keys.contains(expression) {
            return Ok(vec![expression.to_string()]);
        }
        let expr = Self::parse(expression)?;
        let mut out = Vec::new();
        Self::collect_symbols(&expr, expression, scope, &mut out)?;
        Ok(out)
    }

    fn compute_expressions(
        &self,
        arrays: &HashMap<String, Array>,
        contexts: &[ExpressionContext],
        num_entries: usize,
        scope: Scope<'_>,
    ) -> Result<HashMap<String, Array>> {
        let mut values: HashMap<String, Array> = HashMap::with_capacity(contexts.len());
        let mut cut: Option<(&str, CutMask)> = None;

        for context in contexts {
            let array = match values.get(&context.expression) {
                Some(array) => array.clone(),
                None => match &context.branch {
                    Some(branch) => arrays.get(branch.cache_key()).cloned().ok_or_else(|| {
                        ReadError::mismatch(format!(
                            "branch {} was not materialized",
                            branch.object_path()
                        ))
                    })?,
                    None => {
                        let text = scope
                            .aliases
                            .get(&context.expression)
                            .map_or(context.expression.as_str(), String::as_str);
                        trace!(expression = %context.expression, text, "evaluating");
                        self.evaluate_text(text, &values, num_entries)?
                    }
                },
            };

            if context.is_cut {
                let operand = Operand::from_array(&array)
                    .map_err(|reason| ReadError::expression(&context.expression, reason))?;
                let mask = match operand.offsets {
                    Some(offsets) => CutMask::Items {
                        offsets,
                        mask: operand.data.truthy(),
                    },
                    None => CutMask::Entries(operand.data.truthy()),
                };
                cut = Some((context.expression.as_str(), mask));
            }
            values.insert(context.expression.clone(), array);
        }

        if let Some((cut_expression, mask)) = cut {
            let mut done = HashSet::new();
            for context in contexts.iter().filter(|c| c.is_primary && !c.is_cut) {
                if !done.insert(context.expression.as_str()) {
                    continue;
                }
                if let Some(array) = values.get_mut(&context.expression) {
                    *array = mask.apply(array, cut_expression, &context.expression)?;
                }
            }
        }
        Ok(values)
    }
}

/// A cut's truth values: one per entry, or one per item of a jagged layout.
enum CutMask {
    Entries(Vec<bool>),
    Items { offsets: Vec<usize>, mask: Vec<bool> },
}

impl CutMask {
    fn apply(&self, array: &Array, cut_expression: &str, output: &str) -> Result<Array> {
        match self {
            CutMask::Entries(mask) => array.filter(mask),
            CutMask::Items { offsets, mask } => match array {
                Array::Jagged(jagged) if jagged.offsets() == offsets.as_slice() => {
                    Ok(Array::Jagged(jagged.filter_items(mask)?))
                }
                _ => Err(ReadError::expression(
                    cut_expression,
                    format!("a per-item cut does not line up with the items of {output}"),
                )),
            },
        }
    }
}

/// The name an expression refers to, when it is a plain reference.
fn symbol_name(expr: &Expr, text: &str) -> Result<Option<String>> {
    match expr {
        Expr::Identifier(ident) => Ok(Some(ident.value.clone())),
        Expr::CompoundIdentifier(idents) => Ok(Some(
            idents
                .iter()
                .map(|ident| ident.value.as_str())
                .collect::<Vec<_>>()
                .join("."),
        )),
        Expr::Function(function) if function.name.to_string().eq_ignore_ascii_case("get") => {
            match function_args(function, text)?.as_slice() {
                [Expr::Value(Value::SingleQuotedString(name))] => Ok(Some(name.clone())),
                _ => Err(ReadError::expression(
                    text,
                    "get() takes exactly one quoted name",
                )),
            }
        }
        _ => Ok(None),
    }
}

fn function_args<'a>(function: &'a Function, text: &str) -> Result<Vec<&'a Expr>> {
    function
        .args
        .iter()
        .map(|arg| match arg {
            FunctionArg::Unnamed(FunctionArgExpr::Expr(expr)) => Ok(expr),
            _ => Err(ReadError::expression(
                text,
                format!("{}() arguments must be plain expressions", function.name),
            )),
        })
        .collect()
}

fn lookup<'a>(values: &'a HashMap<String, Array>, name: &str, text: &str) -> Result<&'a Array> {
    values.get(name).ok_or_else(|| {
        ReadError::expression(text, format!("{name:?} was not computed before use"))
    })
}

fn missing_name(name: &str, scope: Scope<'_>) -> ReadError {
    let candidates = scope
        .keys
        .iter()
        .map(String::as_str)
        .chain(scope.aliases.keys().map(String::as_str));
    ReadError::MissingName {
        name: name.to_string(),
        suggestions: closest_names(name, candidates, MAX_SUGGESTIONS),
        file_path: scope.file_path.to_string(),
        object_path: scope.object_path.to_string(),
    }
}
