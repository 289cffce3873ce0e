use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::chunk::Chunk;

// ── Static types ─────────────────────────────────────────────────────

/// Static type of an expression or binding.
///
/// The declaration order is the widening order: a binary expression takes
/// the higher-ranked of its operand types, so `Float < Double < Long`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Type {
    Boolean,
    Int,
    Float,
    Double,
    Long,
    Object,
}

impl Type {
    pub fn widen(self, other: Type) -> Type {
        self.max(other)
    }

    pub fn is_number(self) -> bool {
        matches!(self, Type::Int | Type::Float | Type::Double | Type::Long)
    }

    pub fn name(self) -> &'static str {
        match self {
            Type::Boolean => "bool",
            Type::Int => "int",
            Type::Float => "float",
            Type::Double => "double",
            Type::Long => "long",
            Type::Object => "any",
        }
    }

    pub fn from_name(name: &str) -> Option<Type> {
        match name {
            "bool" => Some(Type::Boolean),
            "int" => Some(Type::Int),
            "float" => Some(Type::Float),
            "double" => Some(Type::Double),
            "long" => Some(Type::Long),
            "any" => Some(Type::Object),
            _ => None,
        }
    }

    /// Value a binding of this type holds before anything is assigned.
    pub fn zero(self) -> Value {
        match self {
            Type::Boolean => Value::Boolean(false),
            Type::Int => Value::Int(0),
            Type::Float => Value::Float(0.0),
            Type::Double => Value::Double(0.0),
            Type::Long => Value::Long(0),
            Type::Object => Value::null(),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A declared parameter: `name: type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: Type,
}

// ── Runtime values ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValueError {
    #[error("expected number but got {got}")]
    ExpectedNumber { got: &'static str },
    #[error("expected boolean but got {got}")]
    ExpectedBoolean { got: &'static str },
    #[error("division by zero")]
    DivisionByZero,
}

type ValueResult<T> = Result<T, ValueError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Arith {
    Add,
    Subtract,
    Multiply,
    Divide,
}

#[derive(Debug, Clone)]
pub enum Value {
    Boolean(bool),
    Int(i32),
    Float(f32),
    Double(f64),
    Long(i64),
    Object(Object),
}

/// Heap objects. Cloning an `Object` clones the `Rc`, never the payload, so
/// every holder of an instance observes the same field map.
#[derive(Debug, Clone)]
pub enum Object {
    Null,
    String(Rc<str>),
    Function(Rc<Function>),
    Class(Rc<Class>),
    Instance(Rc<Instance>),
}

#[derive(Debug)]
pub struct Function {
    pub name: String,
    pub chunk: Chunk,
    pub params: Vec<Param>,
    pub return_type: Option<Type>,
    pub is_method: bool,
}

impl Function {
    /// A function or method compiled into this function's constant pool.
    pub fn find(&self, name: &str) -> Option<Rc<Function>> {
        self.chunk.constants.iter().find_map(|c| match c {
            Value::Object(Object::Function(f)) if f.name == name => Some(f.clone()),
            Value::Object(Object::Class(class)) => class.methods.get(name).cloned(),
            _ => None,
        })
    }
}

#[derive(Debug)]
pub struct Class {
    pub name: String,
    pub methods: HashMap<String, Rc<Function>>,
}

pub struct Instance {
    pub class: Rc<Class>,
    fields: RefCell<HashMap<String, Value>>,
}

impl Instance {
    /// Builds an instance whose field map already binds every method of its
    /// class, so a method call is a plain field read.
    pub fn new(class: Rc<Class>) -> Self {
        let fields = class
            .methods
            .iter()
            .map(|(name, method)| (name.clone(), Value::Object(Object::Function(method.clone()))))
            .collect();
        Instance { class, fields: RefCell::new(fields) }
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.fields.borrow().get(name).cloned()
    }

    pub fn set(&self, name: &str, value: Value) {
        self.fields.borrow_mut().insert(name.to_string(), value);
    }

    pub fn field_count(&self) -> usize {
        self.fields.borrow().len()
    }
}

// Field maps can point back at the instance, so Debug stays shallow.
impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("class", &self.class.name)
            .field("fields", &self.field_count())
            .finish()
    }
}

impl Object {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Object::Null => "null",
            Object::String(_) => "string",
            Object::Function(_) => "function",
            Object::Class(_) => "class",
            Object::Instance(_) => "instance",
        }
    }

    /// Strings compare by content, everything else by identity.
    pub fn same(&self, other: &Object) -> bool {
        match (self, other) {
            (Object::Null, Object::Null) => true,
            (Object::String(a), Object::String(b)) => a == b,
            (Object::Function(a), Object::Function(b)) => Rc::ptr_eq(a, b),
            (Object::Class(a), Object::Class(b)) => Rc::ptr_eq(a, b),
            (Object::Instance(a), Object::Instance(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Object::Null => write!(f, "null"),
            Object::String(s) => write!(f, "{}", s),
            Object::Function(func) => write!(f, "<fn {}>", func.name),
            Object::Class(class) => write!(f, "<class {}>", class.name),
            Object::Instance(inst) => write!(f, "<{} instance>", inst.class.name),
        }
    }
}

enum Num {
    Integral(i64),
    Real(f64),
}

impl Value {
    pub fn null() -> Self {
        Value::Object(Object::Null)
    }

    pub fn string(s: &str) -> Self {
        Value::Object(Object::String(Rc::from(s)))
    }

    pub fn ty(&self) -> Type {
        match self {
            Value::Boolean(_) => Type::Boolean,
            Value::Int(_) => Type::Int,
            Value::Float(_) => Type::Float,
            Value::Double(_) => Type::Double,
            Value::Long(_) => Type::Long,
            Value::Object(_) => Type::Object,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Object(obj) => obj.kind_name(),
            other => other.ty().name(),
        }
    }

    pub fn is_number(&self) -> bool {
        self.ty().is_number()
    }

    pub fn as_bool(&self) -> ValueResult<bool> {
        match self {
            Value::Boolean(b) => Ok(*b),
            other => Err(ValueError::ExpectedBoolean { got: other.kind_name() }),
        }
    }

    pub fn as_instance(&self) -> Option<&Rc<Instance>> {
        match self {
            Value::Object(Object::Instance(inst)) => Some(inst),
            _ => None,
        }
    }

    /// True when the value is numerically zero. Non-numbers are never zero.
    pub fn is_zero(&self) -> bool {
        match self.num() {
            Ok(Num::Integral(n)) => n == 0,
            Ok(Num::Real(x)) => x == 0.0,
            Err(_) => false,
        }
    }

    fn num(&self) -> ValueResult<Num> {
        match self {
            Value::Int(n) => Ok(Num::Integral(*n as i64)),
            Value::Long(n) => Ok(Num::Integral(*n)),
            Value::Float(x) => Ok(Num::Real(*x as f64)),
            Value::Double(x) => Ok(Num::Real(*x)),
            other => Err(ValueError::ExpectedNumber { got: other.kind_name() }),
        }
    }

    /// Converts a numeric value to the representation of `ty`.
    pub fn coerce_to(&self, ty: Type) -> ValueResult<Value> {
        let num = self.num()?;
        Ok(match (ty, num) {
            (Type::Int, Num::Integral(n)) => Value::Int(n as i32),
            (Type::Int, Num::Real(x)) => Value::Int(x as i32),
            (Type::Long, Num::Integral(n)) => Value::Long(n),
            (Type::Long, Num::Real(x)) => Value::Long(x as i64),
            (Type::Float, Num::Integral(n)) => Value::Float(n as f32),
            (Type::Float, Num::Real(x)) => Value::Float(x as f32),
            (Type::Double, Num::Integral(n)) => Value::Double(n as f64),
            (Type::Double, Num::Real(x)) => Value::Double(x),
            (Type::Boolean | Type::Object, _) => {
                return Err(ValueError::ExpectedNumber { got: self.kind_name() });
            }
        })
    }

    /// Binary arithmetic. The right operand is converted to the left
    /// operand's representation first, so the result has the left's kind.
    pub fn arith(&self, op: Arith, rhs: &Value) -> ValueResult<Value> {
        if !self.is_number() {
            return Err(ValueError::ExpectedNumber { got: self.kind_name() });
        }
        let rhs = rhs.coerce_to(self.ty())?;
        Ok(match (self, rhs) {
            (Value::Int(a), Value::Int(b)) => Value::Int(match op {
                Arith::Add => a.wrapping_add(b),
                Arith::Subtract => a.wrapping_sub(b),
                Arith::Multiply => a.wrapping_mul(b),
                Arith::Divide => {
                    if b == 0 {
                        return Err(ValueError::DivisionByZero);
                    }
                    a.wrapping_div(b)
                }
            }),
            (Value::Long(a), Value::Long(b)) => Value::Long(match op {
                Arith::Add => a.wrapping_add(b),
                Arith::Subtract => a.wrapping_sub(b),
                Arith::Multiply => a.wrapping_mul(b),
                Arith::Divide => {
                    if b == 0 {
                        return Err(ValueError::DivisionByZero);
                    }
                    a.wrapping_div(b)
                }
            }),
            (Value::Float(a), Value::Float(b)) => Value::Float(match op {
                Arith::Add => a + b,
                Arith::Subtract => a - b,
                Arith::Multiply => a * b,
                Arith::Divide => a / b,
            }),
            (Value::Double(a), Value::Double(b)) => Value::Double(match op {
                Arith::Add => a + b,
                Arith::Subtract => a - b,
                Arith::Multiply => a * b,
                Arith::Divide => a / b,
            }),
            _ => return Err(ValueError::ExpectedNumber { got: self.kind_name() }),
        })
    }

    pub fn negate(&self) -> ValueResult<Value> {
        match self {
            Value::Int(n) => Ok(Value::Int(n.wrapping_neg())),
            Value::Long(n) => Ok(Value::Long(n.wrapping_neg())),
            Value::Float(x) => Ok(Value::Float(-x)),
            Value::Double(x) => Ok(Value::Double(-x)),
            other => Err(ValueError::ExpectedNumber { got: other.kind_name() }),
        }
    }

    pub fn not(&self) -> ValueResult<Value> {
        Ok(Value::Boolean(!self.as_bool()?))
    }

    /// Numeric ordering after converting `rhs` to the left operand's kind.
    /// `None` when either side is NaN.
    pub fn compare(&self, rhs: &Value) -> ValueResult<Option<Ordering>> {
        if !self.is_number() {
            return Err(ValueError::ExpectedNumber { got: self.kind_name() });
        }
        let rhs = rhs.coerce_to(self.ty())?;
        Ok(match (self, &rhs) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Long(a), Value::Long(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Double(a), Value::Double(b)) => a.partial_cmp(b),
            _ => None,
        })
    }

    pub fn equals(&self, rhs: &Value) -> bool {
        match (self, rhs) {
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.same(b),
            (a, b) if a.is_number() && b.is_number() => {
                matches!(a.compare(b), Ok(Some(Ordering::Equal)))
            }
            _ => false,
        }
    }

    /// Whether two constant-pool entries can share one slot.
    pub fn same_constant(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            (Value::Object(a), Value::Object(b)) => a.same(b),
            _ => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        self.same_constant(other)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Long(n) => write!(f, "{}", n),
            // Debug keeps the trailing ".0" on whole floats.
            Value::Float(x) => write!(f, "{:?}", x),
            Value::Double(x) => write!(f, "{:?}", x),
            Value::Object(obj) => write!(f, "{}", obj),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Long(n)
    }
}

impl From<f32> for Value {
    fn from(x: f32) -> Self {
        Value::Float(x)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Double(x)
    }
}

/// IR dumps show literals as `{"Int": 3}`; objects serialize as their text.
impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Boolean(b) => serializer.serialize_newtype_variant("Value", 0, "Boolean", b),
            Value::Int(n) => serializer.serialize_newtype_variant("Value", 1, "Int", n),
            Value::Float(x) => serializer.serialize_newtype_variant("Value", 2, "Float", x),
            Value::Double(x) => serializer.serialize_newtype_variant("Value", 3, "Double", x),
            Value::Long(n) => serializer.serialize_newtype_variant("Value", 4, "Long", n),
            Value::Object(obj) => {
                serializer.serialize_newtype_variant("Value", 5, "Object", &obj.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widening_follows_declaration_rank() {
        assert_eq!(Type::Int.widen(Type::Float), Type::Float);
        assert_eq!(Type::Float.widen(Type::Double), Type::Double);
        assert_eq!(Type::Double.widen(Type::Long), Type::Long);
        assert_eq!(Type::Long.widen(Type::Int), Type::Long);
        assert_eq!(Type::Boolean.widen(Type::Boolean), Type::Boolean);
        assert_eq!(Type::Int.widen(Type::Object), Type::Object);
    }

    #[test]
    fn type_names_roundtrip() {
        for ty in [Type::Boolean, Type::Int, Type::Float, Type::Double, Type::Long, Type::Object] {
            assert_eq!(Type::from_name(ty.name()), Some(ty));
        }
        assert_eq!(Type::from_name("string"), None);
    }

    #[test]
    fn right_operand_coerces_to_left_kind() {
        let r = Value::Int(7).arith(Arith::Add, &Value::Float(2.9)).unwrap();
        assert!(matches!(r, Value::Int(9)));

        let r = Value::Float(1.5).arith(Arith::Multiply, &Value::Int(2)).unwrap();
        assert!(matches!(r, Value::Float(x) if x == 3.0));

        let r = Value::Long(10).arith(Arith::Subtract, &Value::Double(0.5)).unwrap();
        assert!(matches!(r, Value::Long(10)));
    }

    #[test]
    fn integer_division_by_zero_is_an_error() {
        assert_eq!(Value::Int(1).arith(Arith::Divide, &Value::Int(0)), Err(ValueError::DivisionByZero));
        assert_eq!(Value::Long(1).arith(Arith::Divide, &Value::Long(0)), Err(ValueError::DivisionByZero));
        let r = Value::Double(1.0).arith(Arith::Divide, &Value::Double(0.0)).unwrap();
        assert!(matches!(r, Value::Double(x) if x.is_infinite()));
    }

    #[test]
    fn arithmetic_rejects_non_numbers() {
        let err = Value::Boolean(true).arith(Arith::Add, &Value::Int(1)).unwrap_err();
        assert_eq!(err, ValueError::ExpectedNumber { got: "bool" });
        let err = Value::Int(1).arith(Arith::Add, &Value::null()).unwrap_err();
        assert_eq!(err, ValueError::ExpectedNumber { got: "null" });
    }

    #[test]
    fn compare_coerces_right_operand() {
        assert_eq!(Value::Int(3).compare(&Value::Double(3.7)).unwrap(), Some(Ordering::Equal));
        assert_eq!(Value::Double(3.5).compare(&Value::Int(3)).unwrap(), Some(Ordering::Greater));
        assert_eq!(Value::Float(f32::NAN).compare(&Value::Float(1.0)).unwrap(), None);
    }

    #[test]
    fn equality_by_kind() {
        assert!(Value::Int(2).equals(&Value::Long(2)));
        assert!(Value::Boolean(false).equals(&Value::Boolean(false)));
        assert!(Value::string("a").equals(&Value::string("a")));
        assert!(!Value::Boolean(true).equals(&Value::Int(1)));
        assert!(Value::null().equals(&Value::null()));
    }

    #[test]
    fn display_matches_source_literals() {
        assert_eq!(Value::Int(3).to_string(), "3");
        assert_eq!(Value::Float(3.0).to_string(), "3.0");
        assert_eq!(Value::Double(0.25).to_string(), "0.25");
        assert_eq!(Value::Long(-4).to_string(), "-4");
        assert_eq!(Value::Boolean(true).to_string(), "true");
        assert_eq!(Value::null().to_string(), "null");
        assert_eq!(Value::string("hi").to_string(), "hi");
    }

    #[test]
    fn instance_is_seeded_with_methods_and_shared_by_reference() {
        let method = Rc::new(Function {
            name: "bump".to_string(),
            chunk: Chunk::new(),
            params: Vec::new(),
            return_type: None,
            is_method: true,
        });
        let mut methods = HashMap::new();
        methods.insert("bump".to_string(), method);
        let class = Rc::new(Class { name: "Counter".to_string(), methods });

        let inst = Rc::new(Instance::new(class));
        assert!(matches!(inst.get("bump"), Some(Value::Object(Object::Function(_)))));

        let a = Value::Object(Object::Instance(inst));
        let b = a.clone();
        a.as_instance().unwrap().set("count", Value::Int(5));
        assert!(matches!(b.as_instance().unwrap().get("count"), Some(Value::Int(5))));
        assert!(a.equals(&b));
    }

    #[test]
    fn zero_values() {
        assert!(matches!(Type::Int.zero(), Value::Int(0)));
        assert!(matches!(Type::Boolean.zero(), Value::Boolean(false)));
        assert!(matches!(Type::Object.zero(), Value::Object(Object::Null)));
    }

    #[test]
    fn literal_serializes_as_tagged_variant() {
        let json = serde_json::to_string(&Value::Int(3)).unwrap();
        assert_eq!(json, r#"{"Int":3}"#);
        let json = serde_json::to_string(&Value::string("x")).unwrap();
        assert_eq!(json, r#"{"Object":"x"}"#);
    }
}
