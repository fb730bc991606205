//! Field and method descriptors (§4.3).

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use nom::branch::alt;
use nom::bytes::complete::{take_while1, take_while_m_n};
use nom::character::complete::{char, one_of};
use nom::combinator::{all_consuming, map, verify};
use nom::multi::many0;
use nom::sequence::{delimited, pair};
use nom::IResult;

use crate::error::{Error, Result};

/// Arrays may have at most this many dimensions.
pub const MAX_ARRAY_DIMENSIONS: usize = 255;

/// The type of a field, parameter, local variable or value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
    /// A class or interface, by internal name (`java/lang/String`).
    Object(String),
    Array(Box<FieldType>),
}

impl FieldType {
    /// A class type. Dotted names are converted to internal form.
    pub fn object(name: &str) -> FieldType {
        FieldType::Object(name.replace('.', "/"))
    }

    pub fn array_of(component: FieldType) -> FieldType {
        FieldType::Array(Box::new(component))
    }

    pub fn decode(descriptor: &str) -> Result<FieldType> {
        all_consuming(field_type)(descriptor)
            .map(|(_, field_type)| field_type)
            .map_err(|_| invalid(descriptor))
    }

    pub fn descriptor(&self) -> String {
        self.to_string()
    }

    /// The number of local variable or operand stack slots a value of this type occupies.
    pub fn slots(&self) -> u16 {
        match *self {
            FieldType::Long | FieldType::Double => 2,
            _ => 1,
        }
    }

    pub fn is_reference(&self) -> bool {
        match *self {
            FieldType::Object(_) | FieldType::Array(_) => true,
            _ => false,
        }
    }

    pub fn is_primitive(&self) -> bool {
        !self.is_reference()
    }

    pub fn dimensions(&self) -> usize {
        match *self {
            FieldType::Array(ref component) => 1 + component.dimensions(),
            _ => 0,
        }
    }

    /// The name used for this type by `Class` constant pool entries: the internal name for
    /// classes, the descriptor for arrays. `None` for primitives.
    pub fn class_name(&self) -> Option<String> {
        match *self {
            FieldType::Object(ref name) => Some(name.clone()),
            FieldType::Array(_) => Some(self.descriptor()),
            _ => None,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            FieldType::Byte => write!(f, "B"),
            FieldType::Char => write!(f, "C"),
            FieldType::Double => write!(f, "D"),
            FieldType::Float => write!(f, "F"),
            FieldType::Int => write!(f, "I"),
            FieldType::Long => write!(f, "J"),
            FieldType::Short => write!(f, "S"),
            FieldType::Boolean => write!(f, "Z"),
            FieldType::Object(ref name) => write!(f, "L{};", name),
            FieldType::Array(ref component) => write!(f, "[{}", component),
        }
    }
}

/// The parameter and return types of a method. A `return_type` of `None` is `void`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    pub params: Vec<FieldType>,
    pub return_type: Option<FieldType>,
}

impl MethodDescriptor {
    pub fn new(params: Vec<FieldType>, return_type: Option<FieldType>) -> Self {
        MethodDescriptor { params, return_type }
    }

    pub fn decode(descriptor: &str) -> Result<MethodDescriptor> {
        all_consuming(method_descriptor)(descriptor)
            .map(|(_, method)| method)
            .map_err(|_| invalid(descriptor))
    }

    pub fn descriptor(&self) -> String {
        self.to_string()
    }

    /// Local variable slots taken by the parameters, not counting `this`.
    pub fn param_slots(&self) -> u16 {
        self.params.iter().map(FieldType::slots).sum()
    }

    /// Operand stack slots taken by the return value.
    pub fn return_slots(&self) -> u16 {
        self.return_type.as_ref().map_or(0, FieldType::slots)
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "(")?;
        for param in &self.params {
            write!(f, "{}", param)?;
        }
        write!(f, ")")?;
        match self.return_type {
            Some(ref return_type) => write!(f, "{}", return_type),
            None => write!(f, "V"),
        }
    }
}

fn invalid(descriptor: &str) -> Error {
    Error::InvalidDescriptor { descriptor: descriptor.to_owned() }
}

fn base_type(c: char) -> FieldType {
    match c {
        'B' => FieldType::Byte,
        'C' => FieldType::Char,
        'D' => FieldType::Double,
        'F' => FieldType::Float,
        'I' => FieldType::Int,
        'J' => FieldType::Long,
        'S' => FieldType::Short,
        _ => FieldType::Boolean,
    }
}

/// An internal class name: non-empty segments separated by single slashes.
fn class_name(input: &str) -> IResult<&str, &str> {
    verify(
        take_while1(|c: char| c != ';' && c != '.' && c != '['),
        |name: &str| name.split('/').all(|segment| !segment.is_empty()),
    )(input)
}

fn element_type(input: &str) -> IResult<&str, FieldType> {
    alt((
        map(one_of("BCDFIJSZ"), base_type),
        map(delimited(char('L'), class_name, char(';')), |name: &str| {
            FieldType::Object(name.to_owned())
        }),
    ))(input)
}

/// The leading `[`s are counted rather than recursed into, and at most
/// `MAX_ARRAY_DIMENSIONS` of them are accepted.
fn field_type(input: &str) -> IResult<&str, FieldType> {
    let dimensions = verify(
        take_while_m_n(0, MAX_ARRAY_DIMENSIONS + 1, |c: char| c == '['),
        |brackets: &str| brackets.len() <= MAX_ARRAY_DIMENSIONS,
    );
    map(pair(dimensions, element_type), |(brackets, element): (&str, FieldType)| {
        (0..brackets.len()).fold(element, |ty, _| FieldType::array_of(ty))
    })(input)
}

fn return_type(input: &str) -> IResult<&str, Option<FieldType>> {
    alt((map(char('V'), |_| None), map(field_type, Some)))(input)
}

fn method_descriptor(input: &str) -> IResult<&str, MethodDescriptor> {
    map(
        pair(delimited(char('('), many0(field_type), char(')')), return_type),
        |(params, return_type)| MethodDescriptor { params, return_type },
    )(input)
}

/// Decoded method descriptors, shared between everything that assembles or inspects methods.
/// Reads proceed concurrently; a miss decodes once and appends.
#[derive(Debug, Default)]
pub struct DescriptorCache {
    methods: RwLock<HashMap<String, Arc<MethodDescriptor>>>,
}

impl DescriptorCache {
    pub fn new() -> Self {
        DescriptorCache::default()
    }

    pub fn method(&self, descriptor: &str) -> Result<Arc<MethodDescriptor>> {
        {
            let methods = self.methods.read().unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(method) = methods.get(descriptor) {
                return Ok(method.clone());
            }
        }
        let decoded = Arc::new(MethodDescriptor::decode(descriptor)?);
        let mut methods = self.methods.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(methods.entry(descriptor.to_owned()).or_insert(decoded).clone())
    }

    pub fn len(&self) -> usize {
        self.methods.read().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use quickcheck::{quickcheck, Arbitrary, Gen};
    use std::thread;

    #[test]
    fn decodes_field_types() {
        assert_eq!(FieldType::decode("I").unwrap(), FieldType::Int);
        assert_eq!(
            FieldType::decode("Ljava/lang/String;").unwrap(),
            FieldType::object("java.lang.String")
        );
        assert_eq!(
            FieldType::decode("[[J").unwrap(),
            FieldType::array_of(FieldType::array_of(FieldType::Long))
        );
    }

    #[test]
    fn decodes_method_descriptors() {
        let method = MethodDescriptor::decode("(IDLjava/lang/Thread;)Ljava/lang/Object;").unwrap();
        assert_eq!(
            method.params,
            vec![FieldType::Int, FieldType::Double, FieldType::object("java/lang/Thread")]
        );
        assert_eq!(method.return_type, Some(FieldType::object("java/lang/Object")));
        assert_eq!(method.param_slots(), 4);
        assert_eq!(MethodDescriptor::decode("()V").unwrap(), MethodDescriptor::new(vec![], None));
    }

    #[test]
    fn rejects_malformed_descriptors() {
        for descriptor in &[
            "", "V", "Q", "L;", "Ljava/lang/String", "La//b;", "L/a;", "La.b;", "[", "II", "I ",
        ] {
            assert_eq!(
                FieldType::decode(descriptor),
                Err(Error::InvalidDescriptor { descriptor: descriptor.to_string() }),
                "{:?}",
                descriptor
            );
        }
        for descriptor in &["", "()", "(V)V", "I", "(I", "()VV", "(I)[V"] {
            assert!(MethodDescriptor::decode(descriptor).is_err(), "{:?}", descriptor);
        }
    }

    #[test]
    fn limits_array_dimensions() {
        let max = format!("{}I", "[".repeat(255));
        assert_eq!(FieldType::decode(&max).unwrap().dimensions(), 255);
        let over = format!("{}I", "[".repeat(256));
        assert_eq!(
            FieldType::decode(&over),
            Err(Error::InvalidDescriptor { descriptor: over.clone() })
        );
        assert!(MethodDescriptor::decode(&format!("({})V", over)).is_err());
        assert!(MethodDescriptor::decode(&format!("(){}", over)).is_err());
    }

    #[test]
    fn deep_arrays_fail_without_exhausting_the_stack() {
        let deep = format!("{}I", "[".repeat(60000));
        assert!(FieldType::decode(&deep).is_err());
        assert!(MethodDescriptor::decode(&format!("({})V", deep)).is_err());
        assert!(MethodDescriptor::decode(&format!("(){}", deep)).is_err());
    }

    #[test]
    fn cache_is_shared_between_threads() {
        let cache = Arc::new(DescriptorCache::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = cache.clone();
                thread::spawn(move || cache.method("(Ljava/lang/String;)V").map(|m| m.param_slots()))
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), Ok(1));
        }
        assert_eq!(cache.len(), 1);
        assert!(cache.method("(").is_err());
        assert_eq!(cache.len(), 1);
    }

    fn arbitrary_element(g: &mut Gen) -> FieldType {
        let names = ["java/lang/Object", "java/lang/String", "Greeter", "a/b/C$D", "x"];
        match u8::arbitrary(g) % 9 {
            0 => FieldType::Byte,
            1 => FieldType::Char,
            2 => FieldType::Double,
            3 => FieldType::Float,
            4 => FieldType::Int,
            5 => FieldType::Long,
            6 => FieldType::Short,
            7 => FieldType::Boolean,
            _ => FieldType::Object(g.choose(&names).unwrap().to_string()),
        }
    }

    impl Arbitrary for FieldType {
        fn arbitrary(g: &mut Gen) -> Self {
            let element = arbitrary_element(g);
            // mostly scalars and shallow arrays, sometimes right up to the limit
            let dimensions = match u8::arbitrary(g) % 8 {
                0..=3 => 0,
                4..=6 => 1 + usize::arbitrary(g) % 4,
                _ => MAX_ARRAY_DIMENSIONS - usize::arbitrary(g) % 8,
            };
            (0..dimensions).fold(element, |ty, _| FieldType::array_of(ty))
        }
    }

    quickcheck! {
        fn field_descriptors_round_trip(ty: FieldType) -> bool {
            FieldType::decode(&ty.descriptor()) == Ok(ty)
        }

        fn method_descriptors_round_trip(params: Vec<FieldType>, return_type: Option<FieldType>) -> bool {
            let method = MethodDescriptor::new(params, return_type);
            let encoded = method.descriptor();
            MethodDescriptor::decode(&encoded) == Ok(method)
                && MethodDescriptor::decode(&encoded).map(|m| m.descriptor()) == Ok(encoded)
        }

        fn arrays_past_the_limit_are_rejected(ty: FieldType, extra: u8) -> bool {
            let brackets = "[".repeat(MAX_ARRAY_DIMENSIONS + 1 + usize::from(extra));
            FieldType::decode(&format!("{}{}", brackets, ty)).is_err()
        }
    }
}
