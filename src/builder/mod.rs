//! Builds a `ClassFile` from a description of its members.
//!
//! The class is put together in two phases. Fields and methods are added one at a time, each
//! method body being assembled immediately against the class's constant pool. `build` then
//! freezes the class: it adds the implicit default constructor, interns the class references
//! and the name of every attribute, and hands back the finished model.

use std::sync::Arc;

use crate::assembler::CodeBuilder;
use crate::error::{Error, Result};
use crate::model::class_file::access_flags::is_set;
use crate::model::class_file::attribute::AttributeInfo;
use crate::model::class_file::constant_pool::{ConstantPool, Literal};
use crate::model::class_file::{
    class_access_flags, field_access_flags, method_access_flags, ClassFile, FieldInfo,
    MethodInfo,
};
use crate::model::descriptor::{DescriptorCache, FieldType};
use crate::writer::write_class_file;

pub const DEFAULT_MAJOR_VERSION: u16 = 52;
pub const OBJECT: &str = "java/lang/Object";
const CONSTRUCTOR: &str = "<init>";

/// Local variable slots a method may use for `this` and its parameters.
const MAX_PARAMETER_SLOTS: u16 = 255;

pub struct ClassBuilder {
    name: String,
    super_name: String,
    interfaces: Vec<String>,
    access_flags: class_access_flags::t,
    major_version: u16,
    minor_version: u16,
    source_file: Option<String>,
    default_constructor: bool,
    constant_pool: ConstantPool,
    descriptors: Arc<DescriptorCache>,
    fields: Vec<FieldInfo>,
    methods: Vec<MethodInfo>,
    has_constructor: bool,
}

impl ClassBuilder {
    /// Starts a public class extending `java/lang/Object`. `name` may be dotted or internal.
    pub fn new(name: &str) -> Self {
        ClassBuilder {
            name: name.replace('.', "/"),
            super_name: OBJECT.to_owned(),
            interfaces: Vec::new(),
            access_flags: class_access_flags::ACC_PUBLIC | class_access_flags::ACC_SUPER,
            major_version: DEFAULT_MAJOR_VERSION,
            minor_version: 0,
            source_file: None,
            default_constructor: true,
            constant_pool: ConstantPool::new(),
            descriptors: Arc::new(DescriptorCache::new()),
            fields: Vec::new(),
            methods: Vec::new(),
            has_constructor: false,
        }
    }

    /// Shares a descriptor cache with other builders.
    pub fn with_descriptor_cache(mut self, descriptors: Arc<DescriptorCache>) -> Self {
        self.descriptors = descriptors;
        self
    }

    pub fn version(mut self, major: u16, minor: u16) -> Self {
        self.major_version = major;
        self.minor_version = minor;
        self
    }

    pub fn access(mut self, access_flags: class_access_flags::t) -> Self {
        self.access_flags = access_flags;
        self
    }

    pub fn super_class(mut self, name: &str) -> Self {
        self.super_name = name.replace('.', "/");
        self
    }

    pub fn implements(mut self, name: &str) -> Self {
        self.interfaces.push(name.replace('.', "/"));
        self
    }

    pub fn source_file(mut self, file: &str) -> Self {
        self.source_file = Some(file.to_owned());
        self
    }

    /// Whether `build` adds a no-argument constructor calling `super()` when none was declared.
    /// On by default.
    pub fn default_constructor(mut self, enabled: bool) -> Self {
        self.default_constructor = enabled;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn super_name(&self) -> &str {
        &self.super_name
    }

    pub fn major_version(&self) -> u16 {
        self.major_version
    }

    pub fn descriptors(&self) -> &Arc<DescriptorCache> {
        &self.descriptors
    }

    pub fn constant_pool(&mut self) -> &mut ConstantPool {
        &mut self.constant_pool
    }

    pub fn field(
        &mut self,
        access_flags: field_access_flags::t,
        name: &str,
        field_type: &FieldType,
    ) -> Result<&mut Self> {
        let name_index = self.constant_pool.utf8(name)?;
        let descriptor_index = self.constant_pool.utf8(&field_type.descriptor())?;
        trace!("{}: field {} {}", self.name, name, field_type);
        self.fields.push(FieldInfo {
            access_flags,
            name_index,
            descriptor_index,
            attributes: Vec::new(),
        });
        Ok(self)
    }

    /// Adds a field initialized from a `ConstantValue` attribute.
    pub fn constant_field(
        &mut self,
        access_flags: field_access_flags::t,
        name: &str,
        field_type: &FieldType,
        value: &Literal,
    ) -> Result<&mut Self> {
        let fits = match (field_type, value) {
            (&FieldType::Long, &Literal::Long(_))
            | (&FieldType::Float, &Literal::Float(_))
            | (&FieldType::Double, &Literal::Double(_)) => true,
            (&FieldType::Object(ref class), &Literal::String(_)) => class == "java/lang/String",
            (field_type, &Literal::Int(_)) => {
                field_type.is_primitive()
                    && !matches!(*field_type, FieldType::Long | FieldType::Float | FieldType::Double)
            }
            _ => false,
        };
        if !fits {
            return Err(Error::UnsupportedConstruct(format!(
                "constant {:?} for field {} of type {}",
                value, name, field_type
            )));
        }
        let constant_value_index = self.constant_pool.literal(value)?;
        self.field(access_flags, name, field_type)?;
        if let Some(field) = self.fields.last_mut() {
            field.attributes.push(AttributeInfo::ConstantValue { constant_value_index });
        }
        Ok(self)
    }

    /// Starts a public method. Finish it with `code` or `no_code`.
    pub fn method(&mut self, name: &str, descriptor: &str) -> MethodBuilder<'_> {
        MethodBuilder {
            class: self,
            name: name.to_owned(),
            descriptor: descriptor.to_owned(),
            access_flags: method_access_flags::ACC_PUBLIC,
            throws: Vec::new(),
            max_stack: None,
        }
    }

    fn add_default_constructor(&mut self) -> Result<()> {
        let super_name = self.super_name.clone();
        debug!("{}: adding default constructor", self.name);
        self.method(CONSTRUCTOR, "()V").code(|c| {
            c.load_this()?.invoke_special(&super_name, CONSTRUCTOR, "()V")?;
            c.emit_return();
            Ok(())
        })
    }

    /// Freezes the class into its model.
    pub fn build(mut self) -> Result<ClassFile> {
        let is_interface = is_set(self.access_flags, class_access_flags::ACC_INTERFACE);
        if self.default_constructor && !self.has_constructor && !is_interface {
            self.add_default_constructor()?;
        }

        let this_class = self.constant_pool.class(&self.name)?;
        let super_class = if self.name == OBJECT {
            0
        } else {
            self.constant_pool.class(&self.super_name)?
        };
        let mut interfaces = Vec::with_capacity(self.interfaces.len());
        for interface in &self.interfaces {
            interfaces.push(self.constant_pool.class(interface)?);
        }
        let mut attributes = Vec::new();
        if let Some(ref file) = self.source_file {
            let sourcefile_index = self.constant_pool.utf8(file)?;
            attributes.push(AttributeInfo::SourceFile { sourcefile_index });
        }

        // the writer never interns, so every attribute name goes into the pool now
        let mut names = Vec::new();
        {
            let mut collect = |name: &'static str| names.push(name);
            let members = self.fields.iter().flat_map(|field| field.attributes.iter());
            let methods = self.methods.iter().flat_map(|method| method.attributes.iter());
            for attribute in members.chain(methods).chain(attributes.iter()) {
                attribute.for_each_name(&mut collect);
            }
        }
        for name in names {
            self.constant_pool.utf8(name)?;
        }

        debug!(
            "built class {} ({} fields, {} methods, {} constant pool slots)",
            self.name,
            self.fields.len(),
            self.methods.len(),
            self.constant_pool.len()
        );
        Ok(ClassFile {
            minor_version: self.minor_version,
            major_version: self.major_version,
            constant_pool: self.constant_pool,
            access_flags: self.access_flags,
            this_class,
            super_class,
            interfaces,
            fields: self.fields,
            methods: self.methods,
            attributes,
        })
    }

    pub fn to_bytes(self) -> Result<Vec<u8>> {
        write_class_file(&self.build()?)
    }
}

/// One method of a `ClassBuilder`, added when `code` or `no_code` is called.
pub struct MethodBuilder<'a> {
    class: &'a mut ClassBuilder,
    name: String,
    descriptor: String,
    access_flags: method_access_flags::t,
    throws: Vec<String>,
    max_stack: Option<u16>,
}

impl<'a> MethodBuilder<'a> {
    pub fn access(mut self, access_flags: method_access_flags::t) -> Self {
        self.access_flags = access_flags;
        self
    }

    /// Declares a checked exception in the method's `Exceptions` attribute.
    pub fn throws(mut self, class: &str) -> Self {
        self.throws.push(class.to_owned());
        self
    }

    /// Fails the build if the body needs a deeper operand stack than `max_stack`.
    pub fn max_stack(mut self, max_stack: u16) -> Self {
        self.max_stack = Some(max_stack);
        self
    }

    fn has_body(&self) -> bool {
        !is_set(self.access_flags, method_access_flags::ACC_ABSTRACT)
            && !is_set(self.access_flags, method_access_flags::ACC_NATIVE)
    }

    fn check_signature(&self) -> Result<()> {
        let descriptor = self.class.descriptors.method(&self.descriptor)?;
        if self.name == CONSTRUCTOR && descriptor.return_type.is_some() {
            return Err(Error::EncodingError(format!(
                "constructor {}{} must return void",
                self.class.name, self.descriptor
            )));
        }
        let is_static = is_set(self.access_flags, method_access_flags::ACC_STATIC);
        let slots = descriptor.param_slots() as u32 + if is_static { 0 } else { 1 };
        if slots > MAX_PARAMETER_SLOTS as u32 {
            return Err(Error::EncodingError(format!(
                "{}{} takes {} parameter slots",
                self.name, self.descriptor, slots
            )));
        }
        Ok(())
    }

    /// Interns the name, descriptor and thrown classes and puts the method together.
    fn method_info(&mut self, code: Option<AttributeInfo>) -> Result<MethodInfo> {
        let pool = &mut self.class.constant_pool;
        let name_index = pool.utf8(&self.name)?;
        let descriptor_index = pool.utf8(&self.descriptor)?;
        let mut attributes = Vec::new();
        attributes.extend(code);
        if !self.throws.is_empty() {
            let mut exception_index_table = Vec::with_capacity(self.throws.len());
            for class in &self.throws {
                exception_index_table.push(pool.class(class)?);
            }
            attributes.push(AttributeInfo::Exceptions { exception_index_table });
        }
        Ok(MethodInfo { access_flags: self.access_flags, name_index, descriptor_index, attributes })
    }

    /// Adds the method, or on failure drops every constant it interned so the class is left as
    /// it was.
    fn add(self, mark: usize, method: Result<MethodInfo>) -> Result<()> {
        let method = match method {
            Ok(method) => method,
            Err(error) => {
                self.class.constant_pool.truncate(mark);
                return Err(error);
            }
        };
        debug!("{}: method {}{}", self.class.name, self.name, self.descriptor);
        if self.name == CONSTRUCTOR {
            self.class.has_constructor = true;
        }
        self.class.methods.push(method);
        Ok(())
    }

    fn assemble<F>(&mut self, body: F) -> Result<AttributeInfo>
    where
        F: FnOnce(&mut CodeBuilder<'_>) -> Result<()>,
    {
        let is_static = is_set(self.access_flags, method_access_flags::ACC_STATIC);
        let major_version = self.class.major_version;
        let descriptors = Arc::clone(&self.class.descriptors);
        let mut builder = CodeBuilder::new(
            &mut self.class.constant_pool,
            &descriptors,
            &self.descriptor,
            is_static,
        )?;
        if let Some(max_stack) = self.max_stack {
            builder.declare_max_stack(max_stack);
        }
        body(&mut builder)?;
        if major_version >= 50 && builder.needs_stack_map() {
            return Err(Error::UnsupportedConstruct(format!(
                "{}{} branches, which needs a StackMapTable in version {} classes; use version 49",
                self.name, self.descriptor, major_version
            )));
        }
        Ok(AttributeInfo::Code(builder.finish()?))
    }

    /// Assembles the method body with `body` and adds the method. A failed body leaves the class
    /// unchanged.
    pub fn code<F>(mut self, body: F) -> Result<()>
    where
        F: FnOnce(&mut CodeBuilder<'_>) -> Result<()>,
    {
        self.check_signature()?;
        if !self.has_body() {
            return Err(Error::UnsupportedConstruct(format!(
                "abstract or native method {} cannot have code",
                self.name
            )));
        }
        let mark = self.class.constant_pool.len();
        let method = self.assemble(body).and_then(|code| self.method_info(Some(code)));
        self.add(mark, method)
    }

    /// Adds an abstract or native method.
    pub fn no_code(mut self) -> Result<()> {
        self.check_signature()?;
        if self.has_body() {
            return Err(Error::UnsupportedConstruct(format!(
                "method {} needs code unless it is abstract or native",
                self.name
            )));
        }
        let mark = self.class.constant_pool.len();
        let method = self.method_info(None);
        self.add(mark, method)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::assembler::Condition;
    use crate::parser::parse_class_file;

    #[test]
    fn empty_class_defaults() {
        let class = ClassBuilder::new("pkg.Empty").build().unwrap();
        assert_eq!(class.major_version, 52);
        assert_eq!(class.minor_version, 0);
        assert_eq!(class.access_flags, 0x0021);
        assert_eq!(class.name(), Some("pkg/Empty".to_owned()));
        assert_eq!(class.super_name(), Some(OBJECT.to_owned()));
        let init = class.find_method("<init>", "()V").unwrap();
        let code = init.code().unwrap();
        assert_eq!((code.max_stack, code.max_locals), (1, 1));
        assert_eq!(code.code.len(), 5);
    }

    #[test]
    fn reads_back_what_it_writes() {
        let mut builder = ClassBuilder::new("pkg/Point").source_file("Point.java");
        builder.field(field_access_flags::ACC_PRIVATE, "x", &FieldType::Int).unwrap();
        builder
            .constant_field(
                field_access_flags::ACC_STATIC | field_access_flags::ACC_FINAL,
                "ORIGIN",
                &FieldType::Long,
                &Literal::Long(1 << 40),
            )
            .unwrap();
        builder
            .method("getX", "()I")
            .code(|c| {
                c.load_this()?.get_field("pkg/Point", "x", &FieldType::Int)?;
                c.emit_return();
                Ok(())
            })
            .unwrap();
        let class = builder.build().unwrap();
        let bytes = write_class_file(&class).unwrap();
        assert_eq!(parse_class_file(&bytes).unwrap(), class);
    }

    #[test]
    fn declared_constructor_suppresses_default() {
        let mut builder = ClassBuilder::new("Named");
        builder
            .method("<init>", "(Ljava/lang/String;)V")
            .code(|c| {
                c.load_this()?.invoke_special(OBJECT, "<init>", "()V")?;
                c.emit_return();
                Ok(())
            })
            .unwrap();
        let class = builder.build().unwrap();
        assert!(class.find_method("<init>", "()V").is_none());
        assert_eq!(class.methods.len(), 1);
    }

    #[test]
    fn constructor_must_return_void() {
        let mut builder = ClassBuilder::new("Bad");
        let result = builder.method("<init>", "()I").code(|c| {
            c.push_int(0)?.emit_return();
            Ok(())
        });
        assert!(matches!(result, Err(Error::EncodingError(_))));
    }

    #[test]
    fn too_many_parameter_slots() {
        let descriptor = format!("({})V", "J".repeat(128));
        let mut builder = ClassBuilder::new("Wide");
        let result = builder
            .method("take", &descriptor)
            .access(method_access_flags::ACC_PUBLIC | method_access_flags::ACC_STATIC)
            .code(|c| {
            c.emit_return();
            Ok(())
        });
        assert!(matches!(result, Err(Error::EncodingError(_))));
    }

    fn branching(major_version: u16) -> Result<ClassFile> {
        let mut builder = ClassBuilder::new("Branchy").version(major_version, 0);
        builder.method("sign", "(I)I").code(|c| {
            let negative = c.new_label();
            c.load_param(0)?.branch(Condition::Lt, negative);
            c.push_int(1)?.emit_return();
            c.place(negative).push_int(-1)?.emit_return();
            Ok(())
        })?;
        builder.build()
    }

    #[test]
    fn branches_need_old_versions() {
        assert!(matches!(branching(52), Err(Error::UnsupportedConstruct(_))));
        let class = branching(49).unwrap();
        assert_eq!(class.major_version, 49);
    }

    #[test]
    fn abstract_methods_have_no_code() {
        let mut builder = ClassBuilder::new("Shape").access(
            class_access_flags::ACC_PUBLIC | class_access_flags::ACC_ABSTRACT,
        );
        builder
            .method("area", "()D")
            .access(method_access_flags::ACC_PUBLIC | method_access_flags::ACC_ABSTRACT)
            .no_code()
            .unwrap();
        assert!(matches!(
            builder.method("perimeter", "()D").no_code(),
            Err(Error::UnsupportedConstruct(_))
        ));
        let class = builder.build().unwrap();
        assert!(class.find_method("area", "()D").unwrap().code().is_none());
    }

    #[test]
    fn constant_field_type_must_match() {
        let mut builder = ClassBuilder::new("Constants");
        let flags = field_access_flags::ACC_STATIC | field_access_flags::ACC_FINAL;
        builder.constant_field(flags, "ANSWER", &FieldType::Int, &Literal::Int(42)).unwrap();
        builder
            .constant_field(flags, "NAME", &FieldType::object("java/lang/String"), &Literal::String("x".to_owned()))
            .unwrap();
        let mismatch = builder.constant_field(flags, "PI", &FieldType::Int, &Literal::Double(3.14));
        assert!(matches!(mismatch, Err(Error::UnsupportedConstruct(_))));
        let class = builder.build().unwrap();
        let answer = class.find_field("ANSWER").unwrap().constant_value_index().unwrap();
        assert_eq!(class.constant_pool.literal_at(answer), Some(Literal::Int(42)));
    }

    #[test]
    fn throws_and_max_stack() {
        let mut builder = ClassBuilder::new("Thrower");
        let too_shallow = builder.method("fail", "()V").max_stack(1).code(|c| {
            c.new_object("java/io/IOException")?.dup();
            c.invoke_special("java/io/IOException", "<init>", "()V")?;
            c.throw();
            Ok(())
        });
        assert_eq!(too_shallow, Err(Error::MaxStackExceeded { declared: 1, computed: 2 }));
        builder
            .method("fail", "()V")
            .throws("java/io/IOException")
            .code(|c| {
                c.new_object("java/io/IOException")?.dup();
                c.invoke_special("java/io/IOException", "<init>", "()V")?;
                c.throw();
                Ok(())
            })
            .unwrap();
        let class = builder.build().unwrap();
        let method = class.find_method("fail", "()V").unwrap();
        match method.attributes[1] {
            AttributeInfo::Exceptions { ref exception_index_table } => {
                let name = class.constant_pool.class_name_at(exception_index_table[0]);
                assert_eq!(name, Some("java/io/IOException".to_owned()));
            }
            ref other => panic!("expected Exceptions, got {:?}", other),
        }
        assert_eq!(method.code().unwrap().max_stack, 2);
    }

    #[test]
    fn failed_bodies_leave_the_class_unchanged() {
        let mut builder = ClassBuilder::new("Thrower");
        let too_shallow = builder.method("fail", "()V").max_stack(1).code(|c| {
            c.new_object("java/io/IOException")?.dup();
            c.invoke_special("java/io/IOException", "<init>", "()V")?;
            c.throw();
            Ok(())
        });
        assert!(too_shallow.is_err());
        let refused = builder.method("refuse", "(J)V").throws("java/io/IOException").code(|c| {
            c.push_string("never used")?.push_long(1 << 40)?;
            Err(Error::UnsupportedConstruct("refused".to_owned()))
        });
        assert_eq!(refused, Err(Error::UnsupportedConstruct("refused".to_owned())));

        assert_eq!(builder.to_bytes().unwrap(), ClassBuilder::new("Thrower").to_bytes().unwrap());
    }
}
