use crate::error::EvaluationError;
use crate::value::Value;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FunctionName {
    Sum,
    Average,
    Median,
    Min,
    Max,
    StandardDeviation,
    Variance,
    Count,
    Abs,
    Round,
    Floor,
    Ceil,
    Sqrt,
    Pow,
    Log,
    Exp,
    Concat,
    Upper,
    Lower,
    Trim,
    Length,
    Substring,
    Year,
    Month,
    Day,
    If,
    IsEmpty,
    Number,
    Text,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    Between(usize, usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Exact(n) => count == n,
            Arity::Between(min, max) => (min..=max).contains(&count),
            Arity::AtLeast(min) => count >= min,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "{}", n),
            Arity::Between(min, max) => write!(f, "{} to {}", min, max),
            Arity::AtLeast(min) => write!(f, "at least {}", min),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReturnType {
    Number,
    Text,
    Boolean,
    Any,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Category {
    Math,
    Statistics,
    Text,
    Date,
    Logic,
}

impl FunctionName {
    /// Case-insensitive lookup, including aliases (`mean`, `avg`, `stdev`, ...).
    pub fn from_name(name: &str) -> Option<Self> {
        let function = match name.to_ascii_lowercase().as_str() {
            "sum" => FunctionName::Sum,
            "average" | "mean" | "avg" => FunctionName::Average,
            "median" => FunctionName::Median,
            "min" => FunctionName::Min,
            "max" => FunctionName::Max,
            "standarddeviation" | "stdev" | "std" => FunctionName::StandardDeviation,
            "variance" => FunctionName::Variance,
            "count" => FunctionName::Count,
            "abs" => FunctionName::Abs,
            "round" => FunctionName::Round,
            "floor" => FunctionName::Floor,
            "ceil" => FunctionName::Ceil,
            "sqrt" => FunctionName::Sqrt,
            "pow" => FunctionName::Pow,
            "log" => FunctionName::Log,
            "exp" => FunctionName::Exp,
            "concat" => FunctionName::Concat,
            "upper" => FunctionName::Upper,
            "lower" => FunctionName::Lower,
            "trim" => FunctionName::Trim,
            "length" => FunctionName::Length,
            "substring" => FunctionName::Substring,
            "year" => FunctionName::Year,
            "month" => FunctionName::Month,
            "day" => FunctionName::Day,
            "if" => FunctionName::If,
            "isempty" => FunctionName::IsEmpty,
            "number" => FunctionName::Number,
            "text" => FunctionName::Text,
            _ => return None,
        };
        Some(function)
    }

    pub fn name(self) -> &'static str {
        match self {
            FunctionName::Sum => "sum",
            FunctionName::Average => "average",
            FunctionName::Median => "median",
            FunctionName::Min => "min",
            FunctionName::Max => "max",
            FunctionName::StandardDeviation => "standardDeviation",
            FunctionName::Variance => "variance",
            FunctionName::Count => "count",
            FunctionName::Abs => "abs",
            FunctionName::Round => "round",
            FunctionName::Floor => "floor",
            FunctionName::Ceil => "ceil",
            FunctionName::Sqrt => "sqrt",
            FunctionName::Pow => "pow",
            FunctionName::Log => "log",
            FunctionName::Exp => "exp",
            FunctionName::Concat => "concat",
            FunctionName::Upper => "upper",
            FunctionName::Lower => "lower",
            FunctionName::Trim => "trim",
            FunctionName::Length => "length",
            FunctionName::Substring => "substring",
            FunctionName::Year => "year",
            FunctionName::Month => "month",
            FunctionName::Day => "day",
            FunctionName::If => "if",
            FunctionName::IsEmpty => "isEmpty",
            FunctionName::Number => "number",
            FunctionName::Text => "text",
        }
    }

    pub fn arity(self) -> Arity {
        match self {
            FunctionName::Sum
            | FunctionName::Average
            | FunctionName::Median
            | FunctionName::Min
            | FunctionName::Max
            | FunctionName::StandardDeviation
            | FunctionName::Variance => Arity::AtLeast(1),
            FunctionName::Count | FunctionName::Concat => Arity::AtLeast(0),
            FunctionName::Round => Arity::Between(1, 2),
            FunctionName::Substring => Arity::Between(2, 3),
            FunctionName::Pow => Arity::Exact(2),
            FunctionName::If => Arity::Exact(3),
            _ => Arity::Exact(1),
        }
    }

    pub fn return_type(self) -> ReturnType {
        match self {
            FunctionName::Concat
            | FunctionName::Upper
            | FunctionName::Lower
            | FunctionName::Trim
            | FunctionName::Substring
            | FunctionName::Text => ReturnType::Text,
            FunctionName::IsEmpty => ReturnType::Boolean,
            FunctionName::If => ReturnType::Any,
            _ => ReturnType::Number,
        }
    }

    pub fn category(self) -> Category {
        match self {
            FunctionName::Sum
            | FunctionName::Average
            | FunctionName::Median
            | FunctionName::Min
            | FunctionName::Max
            | FunctionName::StandardDeviation
            | FunctionName::Variance
            | FunctionName::Count => Category::Statistics,
            FunctionName::Abs
            | FunctionName::Round
            | FunctionName::Floor
            | FunctionName::Ceil
            | FunctionName::Sqrt
            | FunctionName::Pow
            | FunctionName::Log
            | FunctionName::Exp
            | FunctionName::Number => Category::Math,
            FunctionName::Concat
            | FunctionName::Upper
            | FunctionName::Lower
            | FunctionName::Trim
            | FunctionName::Length
            | FunctionName::Substring
            | FunctionName::Text => Category::Text,
            FunctionName::Year | FunctionName::Month | FunctionName::Day => Category::Date,
            FunctionName::If | FunctionName::IsEmpty => Category::Logic,
        }
    }

    pub fn check_arity(self, got: usize) -> Result<(), EvaluationError> {
        let arity = self.arity();
        if arity.accepts(got) {
            Ok(())
        } else {
            Err(EvaluationError::Arity {
                name: self.name(),
                expected: arity.to_string(),
                got,
            })
        }
    }

    /// Index of the `if` argument selected by `condition`: 1 when truthy, else 2.
    ///
    /// The evaluator uses this to evaluate only the chosen branch.
    pub fn if_branch(condition: &Value) -> usize {
        if condition.is_truthy() { 1 } else { 2 }
    }

    /// Applies the function to already evaluated arguments.
    ///
    /// Never fails: malformed inputs produce NaN (or empty text) the same way
    /// numeric coercion does.
    pub fn call(self, args: &[Value]) -> Value {
        match self {
            FunctionName::Sum => Value::Number(numbers(args).sum()),
            FunctionName::Average => Value::Number(mean(&numbers(args).collect::<Vec<_>>())),
            FunctionName::Median => Value::Number(median(numbers(args).collect())),
            FunctionName::Min => Value::Number(extreme(args, f64::min)),
            FunctionName::Max => Value::Number(extreme(args, f64::max)),
            FunctionName::StandardDeviation => {
                Value::Number(variance(&numbers(args).collect::<Vec<_>>()).sqrt())
            }
            FunctionName::Variance => {
                Value::Number(variance(&numbers(args).collect::<Vec<_>>()))
            }
            FunctionName::Count => {
                Value::Number(args.iter().filter(|v| !v.is_absent()).count() as f64)
            }
            FunctionName::Abs => unary(args, f64::abs),
            FunctionName::Round => {
                let x = first_number(args);
                let digits = args.get(1).map_or(0.0, Value::to_number);
                if digits.is_nan() {
                    return Value::Number(f64::NAN);
                }
                let factor = 10f64.powi(digits.trunc() as i32);
                Value::Number((x * factor).round() / factor)
            }
            FunctionName::Floor => unary(args, f64::floor),
            FunctionName::Ceil => unary(args, f64::ceil),
            FunctionName::Sqrt => unary(args, f64::sqrt),
            FunctionName::Pow => {
                let base = first_number(args);
                let exponent = args.get(1).map_or(f64::NAN, Value::to_number);
                Value::Number(base.powf(exponent))
            }
            FunctionName::Log => unary(args, f64::ln),
            FunctionName::Exp => unary(args, f64::exp),
            FunctionName::Number => Value::Number(first_number(args)),
            FunctionName::Concat => Value::Text(args.iter().map(Value::to_text).collect()),
            FunctionName::Upper => Value::Text(first_text(args).to_uppercase()),
            FunctionName::Lower => Value::Text(first_text(args).to_lowercase()),
            FunctionName::Trim => Value::Text(first_text(args).trim().to_string()),
            FunctionName::Text => Value::Text(first_text(args)),
            FunctionName::Length => Value::Number(first_text(args).chars().count() as f64),
            FunctionName::Substring => substring(args),
            FunctionName::Year => date_part(args, |d| d.year() as f64),
            FunctionName::Month => date_part(args, |d| d.month() as f64),
            FunctionName::Day => date_part(args, |d| d.day() as f64),
            FunctionName::If => {
                let condition = args.first().unwrap_or(&Value::Absent);
                args.get(Self::if_branch(condition))
                    .cloned()
                    .unwrap_or(Value::Absent)
            }
            FunctionName::IsEmpty => Value::Boolean(match args.first() {
                None | Some(Value::Absent) => true,
                Some(Value::Text(s)) => s.is_empty(),
                Some(_) => false,
            }),
        }
    }
}

impl fmt::Display for FunctionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

fn numbers(args: &[Value]) -> impl Iterator<Item = f64> + '_ {
    args.iter().map(Value::to_number)
}

fn first_number(args: &[Value]) -> f64 {
    args.first().map_or(f64::NAN, Value::to_number)
}

fn first_text(args: &[Value]) -> String {
    args.first().map(Value::to_text).unwrap_or_default()
}

fn unary(args: &[Value], op: fn(f64) -> f64) -> Value {
    Value::Number(op(first_number(args)))
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample variance; fewer than two values have no spread.
fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|x| (x - m) * (x - m)).sum::<f64>() / (values.len() - 1) as f64
}

fn median(mut values: Vec<f64>) -> f64 {
    if values.is_empty() || values.iter().any(|v| v.is_nan()) {
        return f64::NAN;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

fn extreme(args: &[Value], pick: fn(f64, f64) -> f64) -> f64 {
    let mut result: Option<f64> = None;
    for n in numbers(args) {
        if n.is_nan() {
            return f64::NAN;
        }
        result = Some(result.map_or(n, |r| pick(r, n)));
    }
    result.unwrap_or(f64::NAN)
}

fn substring(args: &[Value]) -> Value {
    let text: Vec<char> = first_text(args).chars().collect();
    let clamp = |v: Option<&Value>, default: usize| -> usize {
        match v.map(Value::to_number) {
            None => default,
            Some(n) if n.is_nan() || n < 0.0 => 0,
            Some(n) => (n as usize).min(text.len()),
        }
    };
    let start = clamp(args.get(1), 0);
    let end = clamp(args.get(2), text.len());
    let (from, to) = if start <= end { (start, end) } else { (end, start) };
    Value::Text(text[from..to].iter().collect())
}

fn parse_date(value: &Value) -> Option<NaiveDateTime> {
    match value {
        Value::Number(millis) if millis.is_finite() => {
            DateTime::<Utc>::from_timestamp_millis(*millis as i64).map(|d| d.naive_utc())
        }
        Value::Text(s) => {
            let s = s.trim();
            if let Ok(d) = DateTime::parse_from_rfc3339(s) {
                return Some(d.naive_utc());
            }
            for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
                if let Ok(d) = NaiveDateTime::parse_from_str(s, format) {
                    return Some(d);
                }
            }
            for format in ["%Y-%m-%d", "%m/%d/%Y"] {
                if let Ok(d) = NaiveDate::parse_from_str(s, format) {
                    return d.and_hms_opt(0, 0, 0);
                }
            }
            None
        }
        _ => None,
    }
}

fn date_part(args: &[Value], part: fn(&NaiveDateTime) -> f64) -> Value {
    let n = args
        .first()
        .and_then(parse_date)
        .map_or(f64::NAN, |d| part(&d));
    Value::Number(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nums(values: &[f64]) -> Vec<Value> {
        values.iter().map(|n| Value::Number(*n)).collect()
    }

    #[test]
    fn resolves_aliases_case_insensitively() {
        assert_eq!(FunctionName::from_name("MEAN"), Some(FunctionName::Average));
        assert_eq!(
            FunctionName::from_name("standardDeviation"),
            Some(FunctionName::StandardDeviation)
        );
        assert_eq!(FunctionName::from_name("nope"), None);
    }

    #[test]
    fn statistics() {
        let args = nums(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_eq!(FunctionName::Sum.call(&args), Value::Number(40.0));
        assert_eq!(FunctionName::Average.call(&args), Value::Number(5.0));
        assert_eq!(FunctionName::Median.call(&args), Value::Number(4.5));
        assert_eq!(FunctionName::Min.call(&args), Value::Number(2.0));
        assert_eq!(FunctionName::Max.call(&args), Value::Number(9.0));
        assert_eq!(FunctionName::Variance.call(&args), Value::Number(32.0 / 7.0));
        assert_eq!(
            FunctionName::StandardDeviation.call(&nums(&[3.0])),
            Value::Number(0.0)
        );
    }

    #[test]
    fn nan_poisons_min_and_max() {
        let args = vec![Value::from(1), Value::from("x")];
        assert!(FunctionName::Min.call(&args).to_number().is_nan());
        assert!(FunctionName::Max.call(&args).to_number().is_nan());
    }

    #[test]
    fn if_picks_branch_on_truthiness() {
        let args = |c: Value| vec![c, Value::from("yes"), Value::from("no")];
        assert_eq!(FunctionName::If.call(&args(Value::from(1))), Value::from("yes"));
        assert_eq!(FunctionName::If.call(&args(Value::from(""))), Value::from("no"));
        assert_eq!(FunctionName::If.call(&args(Value::Absent)), Value::from("no"));
        assert_eq!(FunctionName::if_branch(&Value::Number(f64::NAN)), 2);
    }

    #[test]
    fn arity_contract() {
        assert!(FunctionName::Pow.check_arity(2).is_ok());
        assert_eq!(
            FunctionName::Pow.check_arity(1),
            Err(EvaluationError::Arity {
                name: "pow",
                expected: "2".to_string(),
                got: 1
            })
        );
        assert!(FunctionName::Concat.check_arity(0).is_ok());
        assert!(FunctionName::Sum.check_arity(0).is_err());
        assert_eq!(FunctionName::Year.return_type(), ReturnType::Number);
        assert_eq!(FunctionName::Concat.category(), Category::Text);
    }

    #[test]
    fn text_functions() {
        let args = vec![Value::from("ab"), Value::from(1), Value::Absent, Value::from(true)];
        assert_eq!(FunctionName::Concat.call(&args), Value::from("ab1true"));
        assert_eq!(
            FunctionName::Substring.call(&[Value::from("hello"), Value::from(3), Value::from(1)]),
            Value::from("el")
        );
        assert_eq!(FunctionName::Length.call(&[Value::from("héllo")]), Value::from(5));
        assert_eq!(
            FunctionName::Round.call(&[Value::from(3.14159), Value::from(2)]),
            Value::from(3.14)
        );
        assert_eq!(FunctionName::Round.call(&[Value::from(2.5)]), Value::from(3));
    }

    #[test]
    fn date_parts() {
        assert_eq!(FunctionName::Year.call(&[Value::from("2021-03-14")]), Value::from(2021));
        assert_eq!(FunctionName::Month.call(&[Value::from("03/14/2021")]), Value::from(3));
        assert_eq!(
            FunctionName::Day.call(&[Value::from("2021-03-14T10:00:00Z")]),
            Value::from(14)
        );
        // 2020-01-01T00:00:00Z in epoch milliseconds
        assert_eq!(FunctionName::Year.call(&[Value::from(1_577_836_800_000.0)]), Value::from(2020));
        assert!(FunctionName::Year.call(&[Value::from("soon")]).to_number().is_nan());
    }
}
