//! Dynamic Values
//!
//! [`Value`] is what reactive targets store. Scalars are held inline;
//! aggregates are shared [`Obj`] handles, so copying a value never copies
//! an object.
//!
//! # Equality
//!
//! Two relations are used:
//!
//! - `==` (and `Hash`) is SameValueZero: `NaN` equals `NaN`, `0.0` equals
//!   `-0.0`, and an integral float equals the matching integer. Map and set
//!   keys use it.
//! - [`Value::same_value`] is SameValue (`Object.is`): like `==`, except
//!   that `0` and `-0.0` differ. Change detection on writes uses it.
//!
//! Objects compare by identity: the same node seen through the same view.

use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use super::obj::Obj;
use super::target::{TargetData, TargetId};

/// A value stored in a reactive target.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Object(Obj),
}

/// The integer a float is equal to, if any.
fn integral(f: f64) -> Option<i64> {
    // 2^63 is exactly representable; i64::MAX is not.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    (f.fract() == 0.0 && (-LIMIT..LIMIT).contains(&f)).then_some(f as i64)
}

impl Value {
    /// Name of the value's type, as used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Object(obj) => obj.kind().name(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The value as an integer. Integral floats convert.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) => integral(*f),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_obj(&self) -> Option<&Obj> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// SameValue comparison (`Object.is`).
    pub fn same_value(&self, other: &Value) -> bool {
        fn negative_zero(f: f64) -> bool {
            f == 0.0 && f.is_sign_negative()
        }
        match (self, other) {
            (Value::Float(a), Value::Float(b)) => {
                a.to_bits() == b.to_bits() || (a.is_nan() && b.is_nan())
            }
            (Value::Int(i), Value::Float(f)) | (Value::Float(f), Value::Int(i)) => {
                !negative_zero(*f) && integral(*f) == Some(*i)
            }
            _ => self == other,
        }
    }

    /// The value with any object handle replaced by its raw view.
    pub fn to_raw(&self) -> Value {
        match self {
            Value::Object(obj) => Value::Object(obj.to_raw()),
            other => other.clone(),
        }
    }

    /// Convert to JSON. Untracked; reads the raw data.
    ///
    /// Map keys are stringified. A reference cycle is cut with `null`.
    pub fn to_json(&self) -> serde_json::Value {
        self.to_json_inner(&mut HashSet::new())
    }

    fn to_json_inner(&self, seen: &mut HashSet<TargetId>) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(i) => Json::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f).map_or(Json::Null, Json::Number),
            Value::Str(s) => Json::String(s.to_string()),
            Value::Object(obj) => {
                if !seen.insert(obj.id()) {
                    return Json::Null;
                }
                let json = match &*obj.node().data.borrow() {
                    TargetData::Object(props) => Json::Object(
                        props
                            .iter()
                            .map(|(k, v)| (k.to_string(), v.to_json_inner(seen)))
                            .collect(),
                    ),
                    TargetData::Array(items) => {
                        Json::Array(items.iter().map(|v| v.to_json_inner(seen)).collect())
                    }
                    TargetData::Map(entries) => Json::Object(
                        entries
                            .iter()
                            .map(|(k, v)| (k.key_string(), v.to_json_inner(seen)))
                            .collect(),
                    ),
                    TargetData::Set(items) => {
                        Json::Array(items.iter().map(|v| v.to_json_inner(seen)).collect())
                    }
                };
                seen.remove(&obj.id());
                json
            }
        }
    }

    fn key_string(&self) -> String {
        match self {
            Value::Str(s) => s.to_string(),
            other => other.to_json().to_string(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::Int(i), Value::Float(f)) | (Value::Float(f), Value::Int(i)) => {
                integral(*f) == Some(*i)
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::Null => 0u8.hash(state),
            Value::Bool(b) => (1u8, b).hash(state),
            Value::Int(i) => (2u8, i).hash(state),
            Value::Float(f) => match integral(*f) {
                Some(i) => (2u8, i).hash(state),
                None if f.is_nan() => 3u8.hash(state),
                None => (4u8, f.to_bits()).hash(state),
            },
            Value::Str(s) => (5u8, s).hash(state),
            Value::Object(obj) => (6u8, obj).hash(state),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<Obj> for Value {
    fn from(obj: Obj) -> Self {
        Value::Object(obj)
    }
}

impl From<&Obj> for Value {
    fn from(obj: &Obj) -> Self {
        Value::Object(obj.clone())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl From<serde_json::Value> for Value {
    /// JSON objects and arrays become new raw targets.
    fn from(json: serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Json::String(s) => Value::from(s),
            Json::Array(items) => {
                Value::Object(Obj::array_from(items.into_iter().map(Value::from)))
            }
            Json::Object(props) => Value::Object(Obj::object_from(
                props.into_iter().map(|(k, v)| (k, Value::from(v))),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(value: &Value) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn same_value_zero_equality() {
        assert_eq!(Value::Float(f64::NAN), Value::Float(f64::NAN));
        assert_eq!(Value::Float(0.0), Value::Float(-0.0));
        assert_eq!(Value::Int(3), Value::Float(3.0));
        assert_ne!(Value::Int(3), Value::Float(3.5));
        assert_ne!(Value::Int(1), Value::Bool(true));
        assert_ne!(Value::from("1"), Value::Int(1));
    }

    #[test]
    fn equal_values_hash_alike() {
        assert_eq!(hash_of(&Value::Int(3)), hash_of(&Value::Float(3.0)));
        assert_eq!(hash_of(&Value::Float(0.0)), hash_of(&Value::Float(-0.0)));
        assert_eq!(
            hash_of(&Value::Float(f64::NAN)),
            hash_of(&Value::Float(-f64::NAN))
        );
    }

    #[test]
    fn same_value_distinguishes_signed_zero() {
        assert!(!Value::Float(0.0).same_value(&Value::Float(-0.0)));
        assert!(!Value::Int(0).same_value(&Value::Float(-0.0)));
        assert!(Value::Int(0).same_value(&Value::Float(0.0)));
        assert!(Value::Float(f64::NAN).same_value(&Value::Float(f64::NAN)));
    }

    #[test]
    fn huge_floats_are_not_integers() {
        assert_eq!(Value::Float(1e300).as_int(), None);
        assert_eq!(Value::Float(f64::INFINITY).as_int(), None);
        assert_eq!(Value::Float(-4.0).as_int(), Some(-4));
    }

    #[test]
    fn objects_compare_by_identity() {
        let a = Obj::object();
        let b = Obj::object();
        assert_eq!(Value::from(&a), Value::from(&a));
        assert_ne!(Value::from(&a), Value::from(&b));
    }

    #[test]
    fn json_round_trip_preserves_structure() {
        let json = serde_json::json!({ "name": "ada", "tags": [1, 2.5, null], "ok": true });
        let value = Value::from(json.clone());
        assert_eq!(value.type_name(), "object");
        assert_eq!(value.to_json(), json);
    }

    #[test]
    fn json_cuts_cycles() {
        let obj = Obj::object();
        obj.set("me", &obj).unwrap();
        assert_eq!(
            Value::from(&obj).to_json(),
            serde_json::json!({ "me": null })
        );
        obj.delete("me").unwrap();
    }

    #[test]
    fn map_keys_are_stringified() {
        let map = Obj::map();
        map.map_insert(1, "one").unwrap();
        map.map_insert("two", 2).unwrap();
        assert_eq!(
            Value::from(&map).to_json(),
            serde_json::json!({ "1": "one", "two": 2 })
        );
    }
}
