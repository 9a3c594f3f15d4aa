use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use derive_more::Display;
use hashlink::LinkedHashMap;
use serde_json::Value as Json;

use super::ast::FunctionDef;
use super::interpreter::Scope;

pub type ArrayRef = Rc<RefCell<Vec<Val>>>;
pub type ObjectRef = Rc<RefCell<LinkedHashMap<String, Val>>>;

/// A runtime value of the sandbox language.
///
/// Arrays and objects are shared references, so mutations through one
/// binding are visible through every other binding of the same value.
#[derive(Debug, Clone)]
pub enum Val {
    Undefined,
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    Array(ArrayRef),
    Object(ObjectRef),
    Function(Rc<Closure>),
    Native(Native),
    Method(Rc<BoundMethod>),
    Error(Rc<ErrorObject>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ErrorKind {
    Error,
    TypeError,
    RangeError,
    ReferenceError,
    SyntaxError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorObject {
    pub kind: ErrorKind,
    pub message: String,
}

/// A script function together with the scope it closes over.
pub struct Closure {
    pub def: Rc<FunctionDef>,
    pub scope: Rc<Scope>,
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Closure")
            .field("name", &self.def.name)
            .field("params", &self.def.params)
            .finish_non_exhaustive()
    }
}

/// Host functions reachable from the global scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Native {
    ConsoleLog,
    ConsoleError,
    ConsoleWarn,
    MathFloor,
    MathCeil,
    MathRound,
    MathAbs,
    MathMin,
    MathMax,
    MathPow,
    MathSqrt,
    MathTrunc,
    JsonStringify,
    JsonParse,
    ObjectKeys,
    ObjectValues,
    ArrayIsArray,
    String,
    Number,
    ErrorConstructor(ErrorKind),
    ParseInt,
    ParseFloat,
    IsNaN,
    SetTimeout,
    SetInterval,
}

impl Native {
    pub fn name(self) -> &'static str {
        match self {
            Native::ConsoleLog => "log",
            Native::ConsoleError => "error",
            Native::ConsoleWarn => "warn",
            Native::MathFloor => "floor",
            Native::MathCeil => "ceil",
            Native::MathRound => "round",
            Native::MathAbs => "abs",
            Native::MathMin => "min",
            Native::MathMax => "max",
            Native::MathPow => "pow",
            Native::MathSqrt => "sqrt",
            Native::MathTrunc => "trunc",
            Native::JsonStringify => "stringify",
            Native::JsonParse => "parse",
            Native::ObjectKeys => "keys",
            Native::ObjectValues => "values",
            Native::ArrayIsArray => "isArray",
            Native::String => "String",
            Native::Number => "Number",
            Native::ErrorConstructor(ErrorKind::Error) => "Error",
            Native::ErrorConstructor(ErrorKind::TypeError) => "TypeError",
            Native::ErrorConstructor(ErrorKind::RangeError) => "RangeError",
            Native::ErrorConstructor(ErrorKind::ReferenceError) => "ReferenceError",
            Native::ErrorConstructor(ErrorKind::SyntaxError) => "SyntaxError",
            Native::ParseInt => "parseInt",
            Native::ParseFloat => "parseFloat",
            Native::IsNaN => "isNaN",
            Native::SetTimeout => "setTimeout",
            Native::SetInterval => "setInterval",
        }
    }
}

/// Built-in methods of arrays, strings and numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Push,
    Pop,
    Join,
    Map,
    Filter,
    ForEach,
    Reduce,
    Includes,
    IndexOf,
    Slice,
    ToUpperCase,
    ToLowerCase,
    Trim,
    Split,
    StartsWith,
    EndsWith,
    Repeat,
    ToFixed,
    ToString,
}

impl Method {
    pub fn for_array(name: &str) -> Option<Self> {
        Some(match name {
            "push" => Method::Push,
            "pop" => Method::Pop,
            "join" => Method::Join,
            "map" => Method::Map,
            "filter" => Method::Filter,
            "forEach" => Method::ForEach,
            "reduce" => Method::Reduce,
            "includes" => Method::Includes,
            "indexOf" => Method::IndexOf,
            "slice" => Method::Slice,
            "toString" => Method::ToString,
            _ => return None,
        })
    }

    pub fn for_string(name: &str) -> Option<Self> {
        Some(match name {
            "toUpperCase" => Method::ToUpperCase,
            "toLowerCase" => Method::ToLowerCase,
            "trim" => Method::Trim,
            "split" => Method::Split,
            "includes" => Method::Includes,
            "startsWith" => Method::StartsWith,
            "endsWith" => Method::EndsWith,
            "slice" => Method::Slice,
            "indexOf" => Method::IndexOf,
            "repeat" => Method::Repeat,
            "toString" => Method::ToString,
            _ => return None,
        })
    }

    pub fn for_number(name: &str) -> Option<Self> {
        match name {
            "toFixed" => Some(Method::ToFixed),
            "toString" => Some(Method::ToString),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct BoundMethod {
    pub receiver: Val,
    pub method: Method,
}

/// Arrays and objects nested deeper than this are not converted.
pub const MAX_NESTING_DEPTH: usize = 1024;

/// Why a value has no JSON form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonFailure {
    /// The value contains itself.
    Circular,
    /// Nesting exceeds [`MAX_NESTING_DEPTH`].
    TooDeep,
}

impl Val {
    pub fn string(s: impl Into<String>) -> Self {
        Val::Str(s.into())
    }

    pub fn array(items: Vec<Val>) -> Self {
        Val::Array(Rc::new(RefCell::new(items)))
    }

    pub fn object(properties: LinkedHashMap<String, Val>) -> Self {
        Val::Object(Rc::new(RefCell::new(properties)))
    }

    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Val::Error(Rc::new(ErrorObject {
            kind,
            message: message.into(),
        }))
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Val::Undefined => "undefined",
            Val::Bool(_) => "boolean",
            Val::Num(_) => "number",
            Val::Str(_) => "string",
            Val::Function(_) | Val::Native(_) | Val::Method(_) => "function",
            Val::Null | Val::Array(_) | Val::Object(_) | Val::Error(_) => "object",
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Val::Undefined | Val::Null)
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Val::Function(_) | Val::Native(_) | Val::Method(_))
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Val::Undefined | Val::Null => false,
            Val::Bool(b) => *b,
            Val::Num(n) => *n != 0.0 && !n.is_nan(),
            Val::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Val::Undefined => f64::NAN,
            Val::Null => 0.0,
            Val::Bool(b) => f64::from(u8::from(*b)),
            Val::Num(n) => *n,
            Val::Str(s) => string_to_number(s),
            Val::Array(_) => string_to_number(&self.to_js_string()),
            _ => f64::NAN,
        }
    }

    /// `String(value)`
    ///
    /// Arrays nested past [`MAX_NESTING_DEPTH`] and arrays that contain
    /// themselves render as the empty string.
    pub fn to_js_string(&self) -> String {
        let mut out = String::new();
        self.write_string(&mut out, &mut HashSet::new());
        out
    }

    fn write_string(&self, out: &mut String, seen: &mut HashSet<*const RefCell<Vec<Val>>>) {
        match self {
            Val::Undefined => out.push_str("undefined"),
            Val::Null => out.push_str("null"),
            Val::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Val::Num(n) => out.push_str(&number_to_string(*n)),
            Val::Str(s) => out.push_str(s),
            Val::Array(items) => {
                let ptr = Rc::as_ptr(items);
                if seen.len() >= MAX_NESTING_DEPTH || !seen.insert(ptr) {
                    return;
                }
                for (index, item) in items.borrow().iter().enumerate() {
                    if index > 0 {
                        out.push(',');
                    }
                    if !item.is_nullish() {
                        item.write_string(out, seen);
                    }
                }
                seen.remove(&ptr);
            }
            Val::Object(_) => out.push_str("[object Object]"),
            Val::Function(closure) => {
                let params = closure.def.params.join(", ");
                match &closure.def.name {
                    Some(name) => out.push_str(&format!("function {name}({params}) {{ ... }}")),
                    None => out.push_str(&format!("({params}) => {{ ... }}")),
                }
            }
            Val::Native(native) => out.push_str(&format!(
                "function {}() {{ [native code] }}",
                native.name()
            )),
            Val::Method(_) => out.push_str("function () { [native code] }"),
            Val::Error(error) if error.message.is_empty() => out.push_str(&error.kind.to_string()),
            Val::Error(error) => out.push_str(&format!("{}: {}", error.kind, error.message)),
        }
    }

    /// Key used when a value indexes an object.
    pub fn to_property_key(&self) -> String {
        self.to_js_string()
    }

    /// `===`
    pub fn strict_equals(&self, other: &Val) -> bool {
        match (self, other) {
            (Val::Undefined, Val::Undefined) | (Val::Null, Val::Null) => true,
            (Val::Bool(a), Val::Bool(b)) => a == b,
            (Val::Num(a), Val::Num(b)) => a == b,
            (Val::Str(a), Val::Str(b)) => a == b,
            (Val::Array(a), Val::Array(b)) => Rc::ptr_eq(a, b),
            (Val::Object(a), Val::Object(b)) => Rc::ptr_eq(a, b),
            (Val::Function(a), Val::Function(b)) => Rc::ptr_eq(a, b),
            (Val::Native(a), Val::Native(b)) => a == b,
            (Val::Method(a), Val::Method(b)) => Rc::ptr_eq(a, b),
            (Val::Error(a), Val::Error(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// `==`
    pub fn loose_equals(&self, other: &Val) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() || b.is_nullish() => a.is_nullish() && b.is_nullish(),
            (Val::Num(_), Val::Str(_)) | (Val::Str(_), Val::Num(_)) => {
                self.to_number() == other.to_number()
            }
            (Val::Bool(_), _) => Val::Num(self.to_number()).loose_equals(other),
            (_, Val::Bool(_)) => self.loose_equals(&Val::Num(other.to_number())),
            (Val::Num(_) | Val::Str(_), b) if b.type_of() == "object" => {
                self.loose_equals(&Val::Str(b.to_js_string()))
            }
            (a, Val::Num(_) | Val::Str(_)) if a.type_of() == "object" => {
                Val::Str(a.to_js_string()).loose_equals(other)
            }
            _ => self.strict_equals(other),
        }
    }

    /// Equality used by `includes`: like `===` except that `NaN` equals itself.
    pub fn same_value_zero(&self, other: &Val) -> bool {
        match (self, other) {
            (Val::Num(a), Val::Num(b)) if a.is_nan() && b.is_nan() => true,
            _ => self.strict_equals(other),
        }
    }

    /// JSON form of the value, `None` where `JSON.stringify` yields
    /// `undefined` (functions and `undefined` itself).
    pub fn to_json(&self) -> Result<Option<Json>, JsonFailure> {
        self.to_json_inner(&mut HashSet::new())
    }

    /// `seen` holds the containers on the path from the root, so its size is
    /// the current nesting depth.
    fn to_json_inner(&self, seen: &mut HashSet<*const ()>) -> Result<Option<Json>, JsonFailure> {
        Ok(Some(match self {
            Val::Undefined | Val::Function(_) | Val::Native(_) | Val::Method(_) => return Ok(None),
            Val::Null => Json::Null,
            Val::Bool(b) => Json::Bool(*b),
            Val::Num(n) => json_number(*n),
            Val::Str(s) => Json::String(s.clone()),
            Val::Error(_) => Json::Object(serde_json::Map::new()),
            Val::Array(items) => {
                let ptr = enter(seen, Rc::as_ptr(items).cast())?;
                let mut array = Vec::new();
                for item in items.borrow().iter() {
                    array.push(item.to_json_inner(seen)?.unwrap_or(Json::Null));
                }
                seen.remove(&ptr);
                Json::Array(array)
            }
            Val::Object(properties) => {
                let ptr = enter(seen, Rc::as_ptr(properties).cast())?;
                let mut map = serde_json::Map::new();
                for (key, value) in properties.borrow().iter() {
                    if let Some(json) = value.to_json_inner(seen)? {
                        map.insert(key.clone(), json);
                    }
                }
                seen.remove(&ptr);
                Json::Object(map)
            }
        }))
    }

    pub fn from_json(json: Json) -> Self {
        match json {
            Json::Null => Val::Null,
            Json::Bool(b) => Val::Bool(b),
            Json::Number(n) => Val::Num(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Val::Str(s),
            Json::Array(items) => Val::array(items.into_iter().map(Val::from_json).collect()),
            Json::Object(map) => Val::object(
                map.into_iter()
                    .map(|(key, value)| (key, Val::from_json(value)))
                    .collect(),
            ),
        }
    }
}

fn enter(seen: &mut HashSet<*const ()>, ptr: *const ()) -> Result<*const (), JsonFailure> {
    if seen.len() >= MAX_NESTING_DEPTH {
        return Err(JsonFailure::TooDeep);
    }
    if !seen.insert(ptr) {
        return Err(JsonFailure::Circular);
    }
    Ok(ptr)
}

/// Drops values one container at a time, so releasing a deeply nested array
/// or object does not recurse once per level.
pub fn release(values: impl IntoIterator<Item = Val>) {
    let mut pending: Vec<Val> = values.into_iter().collect();
    while let Some(value) = pending.pop() {
        match value {
            Val::Array(items) => {
                if let Ok(items) = Rc::try_unwrap(items) {
                    pending.extend(items.into_inner());
                }
            }
            Val::Object(properties) => {
                if let Ok(properties) = Rc::try_unwrap(properties) {
                    pending.extend(properties.into_inner().into_iter().map(|(_, value)| value));
                }
            }
            _ => {}
        }
    }
}

fn json_number(n: f64) -> Json {
    if !n.is_finite() {
        return Json::Null;
    }
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        return Json::from(n as i64);
    }
    serde_json::Number::from_f64(n).map_or(Json::Null, Json::Number)
}

/// Formats a number the way JavaScript's `String(number)` does.
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }

    let magnitude = n.abs();
    if (1e-6..1e21).contains(&magnitude) {
        return format!("{n}");
    }

    let exponential = format!("{n:e}");
    match exponential.split_once('e') {
        Some((mantissa, exponent)) if !exponent.starts_with('-') => {
            format!("{mantissa}e+{exponent}")
        }
        _ => exponential,
    }
}

/// `Number(string)`: surrounding whitespace is ignored, the empty string is
/// zero and anything that is not a complete numeric literal is `NaN`.
pub fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }

    match trimmed {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }

    if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        return u64::from_str_radix(hex, 16).map_or(f64::NAN, |v| v as f64);
    }

    let is_decimal_literal = trimmed
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'));
    if !is_decimal_literal {
        return f64::NAN;
    }
    trimmed.parse().unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(1.0, "1")]
    #[case(-0.0, "0")]
    #[case(0.1 + 0.2, "0.30000000000000004")]
    #[case(2.5, "2.5")]
    #[case(1e21, "1e+21")]
    #[case(1.5e-7, "1.5e-7")]
    #[case(123456789.0, "123456789")]
    #[case(f64::NAN, "NaN")]
    #[case(f64::NEG_INFINITY, "-Infinity")]
    fn formats_numbers(#[case] n: f64, #[case] expected: &str) {
        assert_eq!(number_to_string(n), expected);
    }

    #[rstest]
    #[case("42", 42.0)]
    #[case("  3.5 ", 3.5)]
    #[case("", 0.0)]
    #[case("0x1F", 31.0)]
    #[case("-Infinity", f64::NEG_INFINITY)]
    fn parses_numeric_strings(#[case] input: &str, #[case] expected: f64) {
        assert_eq!(string_to_number(input), expected);
    }

    #[rstest]
    #[case("abc")]
    #[case("inf")]
    #[case("1px")]
    fn rejects_non_numeric_strings(#[case] input: &str) {
        assert!(string_to_number(input).is_nan());
    }

    #[test]
    fn arrays_stringify_like_join() {
        let value = Val::array(vec![
            Val::Num(1.0),
            Val::Null,
            Val::array(vec![Val::string("a"), Val::Bool(true)]),
        ]);
        assert_eq!(value.to_js_string(), "1,,a,true");
    }

    #[test]
    fn json_keeps_insertion_order_and_skips_undefined() {
        let mut properties = LinkedHashMap::new();
        properties.insert("b".to_string(), Val::Num(1.0));
        properties.insert("a".to_string(), Val::Undefined);
        properties.insert("c".to_string(), Val::array(vec![Val::Undefined, Val::Num(0.5)]));
        let json = Val::object(properties).to_json().unwrap().unwrap();
        assert_eq!(json.to_string(), r#"{"b":1,"c":[null,0.5]}"#);
    }

    #[test]
    fn circular_json_is_reported() {
        let items = Rc::new(RefCell::new(Vec::new()));
        let array = Val::Array(items.clone());
        items.borrow_mut().push(array.clone());
        assert_eq!(array.to_json(), Err(JsonFailure::Circular));
        assert_eq!(array.to_js_string(), "");
        items.borrow_mut().clear();
    }

    fn nested(depth: usize) -> Val {
        let mut value = Val::array(Vec::new());
        for _ in 0..depth {
            value = Val::array(vec![value]);
        }
        value
    }

    #[test]
    fn nesting_past_the_limit_has_no_json_form() {
        let shallow = nested(MAX_NESTING_DEPTH - 1);
        assert!(shallow.to_json().is_ok());
        release([shallow]);

        let deep = nested(MAX_NESTING_DEPTH);
        assert_eq!(deep.to_json(), Err(JsonFailure::TooDeep));
        release([deep]);
    }

    #[test]
    fn shared_values_are_not_circular() {
        let shared = Val::array(vec![Val::Num(1.0)]);
        let value = Val::array(vec![shared.clone(), shared]);
        assert_eq!(value.to_json().unwrap().unwrap().to_string(), "[[1],[1]]");
        assert_eq!(value.to_js_string(), "1,1");
    }

    #[test]
    fn release_handles_long_chains() {
        let mut properties = LinkedHashMap::new();
        properties.insert("next".to_string(), nested(200_000));
        release([Val::object(properties)]);
    }

    #[rstest]
    #[case(Val::Null, Val::Undefined, true)]
    #[case(Val::Num(1.0), Val::string("1"), true)]
    #[case(Val::Bool(true), Val::Num(1.0), true)]
    #[case(Val::Num(0.0), Val::Null, false)]
    #[case(Val::string("a"), Val::string("b"), false)]
    fn loose_equality(#[case] a: Val, #[case] b: Val, #[case] expected: bool) {
        assert_eq!(a.loose_equals(&b), expected);
    }

    #[test]
    fn truthiness_and_typeof() {
        assert!(!Val::string("").is_truthy());
        assert!(!Val::Num(f64::NAN).is_truthy());
        assert!(Val::array(Vec::new()).is_truthy());
        assert_eq!(Val::Null.type_of(), "object");
        assert_eq!(Val::Native(Native::ConsoleLog).type_of(), "function");
    }
}
