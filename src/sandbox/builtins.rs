use std::rc::Rc;

use serde::Serialize;
use serde_json::Value as Json;
use tracing::debug;

use super::interpreter::{Completion, Interpreter, Scope, throw};
use super::value::{ArrayRef, ErrorKind, JsonFailure, Method, Native, Val, number_to_string};

/// Strings longer than this are refused by `repeat`.
const MAX_STRING_LENGTH: usize = 1 << 28;

fn namespace(entries: &[(&str, Val)]) -> Val {
    Val::object(
        entries
            .iter()
            .map(|(name, value)| ((*name).to_string(), value.clone()))
            .collect(),
    )
}

/// Builds the global scope every evaluation starts from.
pub fn global_scope() -> Rc<Scope> {
    let scope = Scope::global();

    let console = namespace(&[
        ("log", Val::Native(Native::ConsoleLog)),
        ("error", Val::Native(Native::ConsoleError)),
        ("warn", Val::Native(Native::ConsoleWarn)),
    ]);
    let math = namespace(&[
        ("floor", Val::Native(Native::MathFloor)),
        ("ceil", Val::Native(Native::MathCeil)),
        ("round", Val::Native(Native::MathRound)),
        ("abs", Val::Native(Native::MathAbs)),
        ("min", Val::Native(Native::MathMin)),
        ("max", Val::Native(Native::MathMax)),
        ("pow", Val::Native(Native::MathPow)),
        ("sqrt", Val::Native(Native::MathSqrt)),
        ("trunc", Val::Native(Native::MathTrunc)),
        ("PI", Val::Num(std::f64::consts::PI)),
    ]);
    let json = namespace(&[
        ("stringify", Val::Native(Native::JsonStringify)),
        ("parse", Val::Native(Native::JsonParse)),
    ]);
    let object = namespace(&[
        ("keys", Val::Native(Native::ObjectKeys)),
        ("values", Val::Native(Native::ObjectValues)),
    ]);
    let array = namespace(&[("isArray", Val::Native(Native::ArrayIsArray))]);

    let globals = [
        ("console", console),
        ("Math", math),
        ("JSON", json),
        ("Object", object),
        ("Array", array),
        ("String", Val::Native(Native::String)),
        ("Number", Val::Native(Native::Number)),
        ("Error", Val::Native(Native::ErrorConstructor(ErrorKind::Error))),
        (
            "TypeError",
            Val::Native(Native::ErrorConstructor(ErrorKind::TypeError)),
        ),
        (
            "RangeError",
            Val::Native(Native::ErrorConstructor(ErrorKind::RangeError)),
        ),
        ("parseInt", Val::Native(Native::ParseInt)),
        ("parseFloat", Val::Native(Native::ParseFloat)),
        ("isNaN", Val::Native(Native::IsNaN)),
        ("setTimeout", Val::Native(Native::SetTimeout)),
        ("setInterval", Val::Native(Native::SetInterval)),
        ("NaN", Val::Num(f64::NAN)),
        ("Infinity", Val::Num(f64::INFINITY)),
    ];
    for (name, value) in globals {
        scope.define(name, value, false);
    }
    scope
}

fn arg(args: &[Val], index: usize) -> Val {
    args.get(index).cloned().unwrap_or(Val::Undefined)
}

fn number_arg(args: &[Val], index: usize) -> f64 {
    args.get(index).map_or(f64::NAN, Val::to_number)
}

fn unserialisable(failure: JsonFailure) -> Completion<Json> {
    match failure {
        JsonFailure::Circular => throw(
            ErrorKind::TypeError,
            "Converting circular structure to JSON",
        ),
        JsonFailure::TooDeep => throw(ErrorKind::RangeError, "Maximum call stack size exceeded"),
    }
}

/// Fixed-point notation of a finite number. Rounds the exact decimal value
/// of `n`, with ties going away from zero.
fn to_fixed(n: f64, digits: usize) -> String {
    // Every finite f64 has at most 1074 fractional decimal digits.
    let exact = format!("{:.1074}", n.abs());
    let (whole, fraction) = exact.split_once('.').unwrap_or((exact.as_str(), ""));
    let mut kept: Vec<u8> = whole
        .bytes()
        .chain(fraction.bytes().chain(std::iter::repeat(b'0')).take(digits))
        .collect();
    if fraction.as_bytes().get(digits).is_some_and(|next| *next >= b'5') {
        let mut carry = true;
        for digit in kept.iter_mut().rev() {
            if *digit == b'9' {
                *digit = b'0';
            } else {
                *digit += 1;
                carry = false;
                break;
            }
        }
        if carry {
            kept.insert(0, b'1');
        }
    }

    let point = kept.len() - digits;
    let mut out = String::with_capacity(kept.len() + 2);
    if n < 0.0 {
        out.push('-');
    }
    out.extend(kept[..point].iter().map(|digit| char::from(*digit)));
    if digits > 0 {
        out.push('.');
        out.extend(kept[point..].iter().map(|digit| char::from(*digit)));
    }
    out
}

/// Text `console.log` prints for one argument: objects as JSON, everything
/// else through string conversion.
fn log_text(value: &Val) -> Completion<String> {
    match value {
        Val::Null | Val::Array(_) | Val::Object(_) | Val::Error(_) => {
            let json = match value.to_json() {
                Ok(json) => json.unwrap_or(Json::Null),
                Err(failure) => unserialisable(failure)?,
            };
            Ok(json.to_string())
        }
        other => Ok(other.to_js_string()),
    }
}

/// `args.join(' ')`: `null` and `undefined` become empty strings.
fn joined(args: &[Val]) -> String {
    args.iter()
        .map(|value| {
            if value.is_nullish() {
                String::new()
            } else {
                value.to_js_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn call_native(
    interpreter: &mut Interpreter,
    native: Native,
    args: Vec<Val>,
) -> Completion<Val> {
    let result = match native {
        Native::ConsoleLog => {
            let line = args
                .iter()
                .map(log_text)
                .collect::<Completion<Vec<_>>>()?
                .join(" ");
            interpreter.sink_mut().log(line);
            Val::Undefined
        }
        Native::ConsoleError => {
            interpreter.sink_mut().error(joined(&args));
            Val::Undefined
        }
        Native::ConsoleWarn => {
            interpreter.sink_mut().warn(joined(&args));
            Val::Undefined
        }
        Native::MathFloor => Val::Num(number_arg(&args, 0).floor()),
        Native::MathCeil => Val::Num(number_arg(&args, 0).ceil()),
        Native::MathRound => {
            let n = number_arg(&args, 0);
            Val::Num(if n.fract() == -0.5 { n.ceil() } else { n.round() })
        }
        Native::MathAbs => Val::Num(number_arg(&args, 0).abs()),
        Native::MathTrunc => Val::Num(number_arg(&args, 0).trunc()),
        Native::MathSqrt => Val::Num(number_arg(&args, 0).sqrt()),
        Native::MathPow => Val::Num(number_arg(&args, 0).powf(number_arg(&args, 1))),
        Native::MathMin => Val::Num(args.iter().map(Val::to_number).fold(
            f64::INFINITY,
            |acc, n| {
                if acc.is_nan() || n.is_nan() {
                    f64::NAN
                } else {
                    acc.min(n)
                }
            },
        )),
        Native::MathMax => Val::Num(args.iter().map(Val::to_number).fold(
            f64::NEG_INFINITY,
            |acc, n| {
                if acc.is_nan() || n.is_nan() {
                    f64::NAN
                } else {
                    acc.max(n)
                }
            },
        )),
        Native::JsonStringify => json_stringify(&args)?,
        Native::JsonParse => match serde_json::from_str::<Json>(&arg(&args, 0).to_js_string()) {
            Ok(json) => Val::from_json(json),
            Err(err) => return throw(ErrorKind::SyntaxError, err.to_string()),
        },
        Native::ObjectKeys => Val::array(
            own_entries(&arg(&args, 0))?
                .into_iter()
                .map(|(key, _)| Val::Str(key))
                .collect(),
        ),
        Native::ObjectValues => Val::array(
            own_entries(&arg(&args, 0))?
                .into_iter()
                .map(|(_, value)| value)
                .collect(),
        ),
        Native::ArrayIsArray => Val::Bool(matches!(args.first(), Some(Val::Array(_)))),
        Native::String => Val::Str(args.first().map(Val::to_js_string).unwrap_or_default()),
        Native::Number => Val::Num(args.first().map_or(0.0, Val::to_number)),
        Native::ErrorConstructor(kind) => {
            let message = match arg(&args, 0) {
                Val::Undefined => String::new(),
                value => value.to_js_string(),
            };
            Val::error(kind, message)
        }
        Native::ParseInt => {
            let radix = match arg(&args, 1) {
                Val::Undefined => None,
                value => Some(value.to_number()),
            };
            Val::Num(parse_int(&arg(&args, 0).to_js_string(), radix))
        }
        Native::ParseFloat => Val::Num(parse_float(&arg(&args, 0).to_js_string())),
        Native::IsNaN => Val::Bool(number_arg(&args, 0).is_nan()),
        Native::SetTimeout | Native::SetInterval => {
            debug!("Discarding callback scheduled with {}", native.name());
            Val::Num(1.0)
        }
    };
    Ok(result)
}

fn json_stringify(args: &[Val]) -> Completion<Val> {
    let indent = match args.get(2) {
        Some(Val::Num(n)) if *n >= 1.0 => " ".repeat(n.min(10.0) as usize),
        Some(Val::Str(s)) => s.chars().take(10).collect(),
        _ => String::new(),
    };

    let json = match arg(args, 0).to_json() {
        Ok(Some(json)) => json,
        Ok(None) => return Ok(Val::Undefined),
        Err(failure) => unserialisable(failure)?,
    };

    if indent.is_empty() {
        return Ok(Val::Str(json.to_string()));
    }
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    if json.serialize(&mut serializer).is_err() {
        return Ok(Val::Str(json.to_string()));
    }
    Ok(Val::Str(
        String::from_utf8(out).unwrap_or_else(|_| json.to_string()),
    ))
}

/// Enumerable own properties as `Object.keys`/`Object.values` see them.
fn own_entries(target: &Val) -> Completion<Vec<(String, Val)>> {
    Ok(match target {
        Val::Undefined | Val::Null => {
            return throw(
                ErrorKind::TypeError,
                "Cannot convert undefined or null to object",
            );
        }
        Val::Object(properties) => properties
            .borrow()
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
        Val::Array(items) => items
            .borrow()
            .iter()
            .enumerate()
            .map(|(index, value)| (index.to_string(), value.clone()))
            .collect(),
        Val::Str(text) => text
            .chars()
            .enumerate()
            .map(|(index, c)| (index.to_string(), Val::Str(c.to_string())))
            .collect(),
        _ => Vec::new(),
    })
}

fn parse_int(input: &str, radix: Option<f64>) -> f64 {
    let text = input.trim_start();
    let (negative, text) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };

    let mut radix = match radix {
        Some(r) if r.is_finite() && r.trunc() != 0.0 => r.trunc() as i64,
        _ => 0,
    };
    let mut digits = text;
    if (radix == 0 || radix == 16)
        && let Some(hex) = digits
            .strip_prefix("0x")
            .or_else(|| digits.strip_prefix("0X"))
    {
        digits = hex;
        radix = 16;
    }
    if radix == 0 {
        radix = 10;
    }
    let Ok(radix) = u32::try_from(radix) else {
        return f64::NAN;
    };
    if !(2..=36).contains(&radix) {
        return f64::NAN;
    }

    let value = digits
        .chars()
        .map_while(|c| c.to_digit(radix))
        .fold(None, |acc: Option<f64>, digit| {
            Some(acc.unwrap_or(0.0) * f64::from(radix) + f64::from(digit))
        });
    match value {
        Some(value) if negative => -value,
        Some(value) => value,
        None => f64::NAN,
    }
}

fn parse_float(input: &str) -> f64 {
    let text = input.trim_start();
    let bytes = text.as_bytes();
    let mut end = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));

    if text[end..].starts_with("Infinity") {
        return if text.starts_with('-') {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        };
    }

    let is_digit = |index: usize| bytes.get(index).is_some_and(u8::is_ascii_digit);
    let digits_start = end;
    while is_digit(end) {
        end += 1;
    }
    let integer_digits = end - digits_start;
    let mut fraction_digits = 0;
    if bytes.get(end) == Some(&b'.') {
        end += 1;
        while is_digit(end) {
            end += 1;
            fraction_digits += 1;
        }
    }
    if integer_digits + fraction_digits == 0 {
        return f64::NAN;
    }

    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exponent_end = end + 1;
        if matches!(bytes.get(exponent_end), Some(b'+' | b'-')) {
            exponent_end += 1;
        }
        let exponent_digits = exponent_end;
        while is_digit(exponent_end) {
            exponent_end += 1;
        }
        if exponent_end > exponent_digits {
            end = exponent_end;
        }
    }

    text[..end].trim_end_matches('.').parse().unwrap_or(f64::NAN)
}

/* ===================== Methods ===================== */

pub fn call_method(
    interpreter: &mut Interpreter,
    receiver: &Val,
    method: Method,
    args: Vec<Val>,
) -> Completion<Val> {
    match receiver {
        Val::Array(items) => array_method(interpreter, items, method, args),
        Val::Str(text) => string_method(text, method, &args),
        Val::Num(n) => number_method(*n, method, &args),
        other => throw(
            ErrorKind::TypeError,
            format!("{} is not a function", other.to_js_string()),
        ),
    }
}

/// Resolves a relative `slice` bound against a length.
fn relative_index(value: &Val, len: usize, default: usize) -> usize {
    if matches!(value, Val::Undefined) {
        return default;
    }
    let n = value.to_number();
    let n = if n.is_nan() { 0.0 } else { n.trunc() };
    let len = len as f64;
    let index = if n < 0.0 { (len + n).max(0.0) } else { n.min(len) };
    index as usize
}

fn callback(args: &[Val]) -> Completion<Val> {
    let callback = arg(args, 0);
    if !callback.is_callable() {
        return throw(
            ErrorKind::TypeError,
            format!("{} is not a function", callback.to_js_string()),
        );
    }
    Ok(callback)
}

fn array_method(
    interpreter: &mut Interpreter,
    items: &ArrayRef,
    method: Method,
    args: Vec<Val>,
) -> Completion<Val> {
    let result = match method {
        Method::Push => {
            let mut items = items.borrow_mut();
            items.extend(args);
            Val::Num(items.len() as f64)
        }
        Method::Pop => items.borrow_mut().pop().unwrap_or(Val::Undefined),
        Method::Join | Method::ToString => {
            let separator = match arg(&args, 0) {
                Val::Undefined => ",".to_string(),
                value if method == Method::Join => value.to_js_string(),
                _ => ",".to_string(),
            };
            let parts: Vec<String> = items
                .borrow()
                .iter()
                .map(|item| {
                    if item.is_nullish() {
                        String::new()
                    } else {
                        item.to_js_string()
                    }
                })
                .collect();
            Val::Str(parts.join(&separator))
        }
        Method::Map | Method::Filter | Method::ForEach => {
            let callback = callback(&args)?;
            let len = items.borrow().len();
            let mut collected = Vec::new();
            for index in 0..len {
                let Some(item) = items.borrow().get(index).cloned() else {
                    break;
                };
                let result = interpreter.call(
                    &callback,
                    vec![item.clone(), Val::Num(index as f64), Val::Array(items.clone())],
                )?;
                match method {
                    Method::Map => collected.push(result),
                    Method::Filter if result.is_truthy() => collected.push(item),
                    _ => {}
                }
            }
            match method {
                Method::ForEach => Val::Undefined,
                _ => Val::array(collected),
            }
        }
        Method::Reduce => {
            let callback = callback(&args)?;
            let len = items.borrow().len();
            let mut index = 0;
            let mut accumulator = match args.get(1) {
                Some(initial) => initial.clone(),
                None => {
                    let Some(first) = items.borrow().first().cloned() else {
                        return throw(
                            ErrorKind::TypeError,
                            "Reduce of empty array with no initial value",
                        );
                    };
                    index = 1;
                    first
                }
            };
            while index < len {
                let Some(item) = items.borrow().get(index).cloned() else {
                    break;
                };
                accumulator = interpreter.call(
                    &callback,
                    vec![
                        accumulator,
                        item,
                        Val::Num(index as f64),
                        Val::Array(items.clone()),
                    ],
                )?;
                index += 1;
            }
            accumulator
        }
        Method::Includes => {
            let needle = arg(&args, 0);
            Val::Bool(items.borrow().iter().any(|item| item.same_value_zero(&needle)))
        }
        Method::IndexOf => {
            let needle = arg(&args, 0);
            let position = items
                .borrow()
                .iter()
                .position(|item| item.strict_equals(&needle));
            Val::Num(position.map_or(-1.0, |index| index as f64))
        }
        Method::Slice => {
            let items = items.borrow();
            let start = relative_index(&arg(&args, 0), items.len(), 0);
            let end = relative_index(&arg(&args, 1), items.len(), items.len());
            Val::array(items.get(start..end.max(start)).unwrap_or_default().to_vec())
        }
        _ => return not_a_method(method),
    };
    Ok(result)
}

fn string_method(text: &str, method: Method, args: &[Val]) -> Completion<Val> {
    let needle = || arg(args, 0).to_js_string();
    let result = match method {
        Method::ToUpperCase => Val::Str(text.to_uppercase()),
        Method::ToLowerCase => Val::Str(text.to_lowercase()),
        Method::Trim => Val::string(text.trim()),
        Method::ToString => Val::string(text),
        Method::Split => match arg(args, 0) {
            Val::Undefined => Val::array(vec![Val::string(text)]),
            separator => {
                let separator = separator.to_js_string();
                let parts: Vec<Val> = if separator.is_empty() {
                    text.chars().map(|c| Val::Str(c.to_string())).collect()
                } else {
                    text.split(separator.as_str()).map(Val::string).collect()
                };
                Val::array(parts)
            }
        },
        Method::Includes => Val::Bool(text.contains(needle().as_str())),
        Method::StartsWith => Val::Bool(text.starts_with(needle().as_str())),
        Method::EndsWith => Val::Bool(text.ends_with(needle().as_str())),
        Method::IndexOf => {
            let position = text
                .find(needle().as_str())
                .map(|byte| text[..byte].chars().count());
            Val::Num(position.map_or(-1.0, |index| index as f64))
        }
        Method::Slice => {
            let chars: Vec<char> = text.chars().collect();
            let start = relative_index(&arg(args, 0), chars.len(), 0);
            let end = relative_index(&arg(args, 1), chars.len(), chars.len());
            Val::Str(chars.get(start..end.max(start)).unwrap_or_default().iter().collect())
        }
        Method::Repeat => {
            let count = number_arg(args, 0);
            let count = if count.is_nan() { 0.0 } else { count.trunc() };
            if count < 0.0 || count.is_infinite() {
                return throw(
                    ErrorKind::RangeError,
                    format!("Invalid count value: {}", number_to_string(count)),
                );
            }
            if text.len() as f64 * count > MAX_STRING_LENGTH as f64 {
                return throw(ErrorKind::RangeError, "Invalid string length");
            }
            Val::Str(text.repeat(count as usize))
        }
        _ => return not_a_method(method),
    };
    Ok(result)
}

fn number_method(n: f64, method: Method, args: &[Val]) -> Completion<Val> {
    match method {
        Method::ToFixed => {
            let digits = match arg(args, 0) {
                Val::Undefined => 0.0,
                value => value.to_number().trunc(),
            };
            if !(0.0..=100.0).contains(&digits) {
                return throw(
                    ErrorKind::RangeError,
                    "toFixed() digits argument must be between 0 and 100",
                );
            }
            if !n.is_finite() || n.abs() >= 1e21 {
                return Ok(Val::Str(number_to_string(n)));
            }
            Ok(Val::Str(to_fixed(n, digits as usize)))
        }
        Method::ToString => {
            let radix = match arg(args, 0) {
                Val::Undefined => 10.0,
                value => value.to_number().trunc(),
            };
            if !(2.0..=36.0).contains(&radix) {
                return throw(
                    ErrorKind::RangeError,
                    "toString() radix must be between 2 and 36",
                );
            }
            Ok(Val::Str(number_in_radix(n, radix as u32)))
        }
        _ => not_a_method(method),
    }
}

fn number_in_radix(n: f64, radix: u32) -> String {
    let exact_integer = n.is_finite() && n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0;
    if radix == 10 || !exact_integer {
        return number_to_string(n);
    }

    let mut value = n.abs() as u64;
    let mut digits = Vec::new();
    loop {
        digits.extend(char::from_digit((value % u64::from(radix)) as u32, radix));
        value /= u64::from(radix);
        if value == 0 {
            break;
        }
    }
    if n < 0.0 {
        digits.push('-');
    }
    digits.iter().rev().collect()
}

fn not_a_method(method: Method) -> Completion<Val> {
    throw(
        ErrorKind::TypeError,
        format!("{method:?} is not a function"),
    )
}
