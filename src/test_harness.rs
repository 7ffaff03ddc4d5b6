use std::collections::BTreeMap;

use crate::classfile::{
    ACC_ANNOTATION, ACC_BRIDGE, ACC_ENUM, ACC_INTERFACE, ACC_PRIVATE, ACC_PUBLIC, ACC_STATIC,
    ACC_SYNTHETIC, ClassFile, ConstantValue, FieldInfo, InnerClass, MethodInfo, RawAnnotation,
};
use crate::model::ClassIndex;
use crate::qualifier::{AnnotationValue, Hierarchies};

const ACC_FINAL: u16 = 0x0010;
const ACC_ABSTRACT: u16 = 0x0400;
const OBJECT: &str = "java/lang/Object";

/// Writes minimal class file bytes for reader tests.
pub(crate) struct ClassBytesWriter {
    pool: Vec<Vec<u8>>,
    pool_slots: u16,
    utf8: BTreeMap<String, u16>,
    access_flags: u16,
    this_class: u16,
    super_class: u16,
    signature: Option<u16>,
    fields: Vec<Vec<u8>>,
    methods: Vec<Vec<u8>>,
}

impl ClassBytesWriter {
    pub(crate) fn new(name: &str, super_name: Option<&str>, access_flags: u16) -> Self {
        let mut writer = Self {
            pool: Vec::new(),
            pool_slots: 1,
            utf8: BTreeMap::new(),
            access_flags,
            this_class: 0,
            super_class: 0,
            signature: None,
            fields: Vec::new(),
            methods: Vec::new(),
        };
        writer.this_class = writer.class_ref(name);
        if let Some(super_name) = super_name {
            writer.super_class = writer.class_ref(super_name);
        }
        writer
    }

    pub(crate) fn set_signature(&mut self, signature: &str) {
        let index = self.utf8_ref(signature);
        self.signature = Some(index);
    }

    pub(crate) fn add_field(
        &mut self,
        name: &str,
        descriptor: &str,
        access_flags: u16,
        signature: Option<&str>,
        constant: Option<ConstantValue>,
    ) {
        let mut attributes = Vec::new();
        if let Some(signature) = signature {
            attributes.push(self.signature_attribute(signature));
        }
        if let Some(constant) = constant {
            let index = self.constant_ref(&constant);
            attributes.push(self.attribute("ConstantValue", &index.to_be_bytes()));
        }
        let member = self.member(name, descriptor, access_flags, attributes);
        self.fields.push(member);
    }

    /// A field whose type carries one marker type annotation at `path`
    /// (`type_path_kind`, `type_argument_index` pairs).
    pub(crate) fn add_field_type_annotation(
        &mut self,
        name: &str,
        descriptor: &str,
        signature: &str,
        path: &[(u8, u8)],
        annotation: &str,
    ) {
        let mut body = Vec::new();
        body.extend_from_slice(&1u16.to_be_bytes());
        body.push(0x13);
        body.push(path.len() as u8);
        for (kind, argument) in path {
            body.push(*kind);
            body.push(*argument);
        }
        body.extend_from_slice(&self.utf8_ref(annotation).to_be_bytes());
        body.extend_from_slice(&0u16.to_be_bytes());
        let attributes = vec![
            self.signature_attribute(signature),
            self.attribute("RuntimeVisibleTypeAnnotations", &body),
        ];
        let member = self.member(name, descriptor, ACC_PUBLIC, attributes);
        self.fields.push(member);
    }

    /// `annotations` pairs a type descriptor with an optional string element.
    pub(crate) fn add_method(
        &mut self,
        name: &str,
        descriptor: &str,
        access_flags: u16,
        signature: Option<&str>,
        annotations: &[(&str, Option<(&str, &str)>)],
    ) {
        let mut attributes = Vec::new();
        if let Some(signature) = signature {
            attributes.push(self.signature_attribute(signature));
        }
        if !annotations.is_empty() {
            let mut body = Vec::new();
            body.extend_from_slice(&(annotations.len() as u16).to_be_bytes());
            for (type_descriptor, element) in annotations {
                body.extend_from_slice(&self.utf8_ref(type_descriptor).to_be_bytes());
                match element {
                    Some((element_name, value)) => {
                        body.extend_from_slice(&1u16.to_be_bytes());
                        body.extend_from_slice(&self.utf8_ref(element_name).to_be_bytes());
                        body.push(b's');
                        body.extend_from_slice(&self.utf8_ref(value).to_be_bytes());
                    }
                    None => body.extend_from_slice(&0u16.to_be_bytes()),
                }
            }
            attributes.push(self.attribute("RuntimeVisibleAnnotations", &body));
        }
        let member = self.member(name, descriptor, access_flags, attributes);
        self.methods.push(member);
    }

    pub(crate) fn finish(mut self) -> Vec<u8> {
        let class_attributes = match self.signature {
            Some(index) => vec![self.attribute("Signature", &index.to_be_bytes())],
            None => Vec::new(),
        };
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0xCAFEBABEu32.to_be_bytes());
        bytes.extend_from_slice(&0u16.to_be_bytes());
        bytes.extend_from_slice(&61u16.to_be_bytes());
        bytes.extend_from_slice(&self.pool_slots.to_be_bytes());
        for entry in &self.pool {
            bytes.extend_from_slice(entry);
        }
        bytes.extend_from_slice(&self.access_flags.to_be_bytes());
        bytes.extend_from_slice(&self.this_class.to_be_bytes());
        bytes.extend_from_slice(&self.super_class.to_be_bytes());
        bytes.extend_from_slice(&0u16.to_be_bytes());
        for members in [&self.fields, &self.methods] {
            bytes.extend_from_slice(&(members.len() as u16).to_be_bytes());
            for member in members {
                bytes.extend_from_slice(member);
            }
        }
        bytes.extend_from_slice(&(class_attributes.len() as u16).to_be_bytes());
        for attribute in class_attributes {
            bytes.extend_from_slice(&attribute);
        }
        bytes
    }

    fn member(
        &mut self,
        name: &str,
        descriptor: &str,
        access_flags: u16,
        attributes: Vec<Vec<u8>>,
    ) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&access_flags.to_be_bytes());
        bytes.extend_from_slice(&self.utf8_ref(name).to_be_bytes());
        bytes.extend_from_slice(&self.utf8_ref(descriptor).to_be_bytes());
        bytes.extend_from_slice(&(attributes.len() as u16).to_be_bytes());
        for attribute in attributes {
            bytes.extend_from_slice(&attribute);
        }
        bytes
    }

    fn signature_attribute(&mut self, signature: &str) -> Vec<u8> {
        let index = self.utf8_ref(signature);
        self.attribute("Signature", &index.to_be_bytes())
    }

    fn attribute(&mut self, name: &str, body: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&self.utf8_ref(name).to_be_bytes());
        bytes.extend_from_slice(&(body.len() as u32).to_be_bytes());
        bytes.extend_from_slice(body);
        bytes
    }

    fn push_entry(&mut self, entry: Vec<u8>, slots: u16) -> u16 {
        let index = self.pool_slots;
        self.pool.push(entry);
        self.pool_slots += slots;
        index
    }

    fn utf8_ref(&mut self, value: &str) -> u16 {
        if let Some(index) = self.utf8.get(value) {
            return *index;
        }
        let mut entry = vec![1];
        entry.extend_from_slice(&(value.len() as u16).to_be_bytes());
        entry.extend_from_slice(value.as_bytes());
        let index = self.push_entry(entry, 1);
        self.utf8.insert(value.to_string(), index);
        index
    }

    fn class_ref(&mut self, name: &str) -> u16 {
        let name_index = self.utf8_ref(name);
        let mut entry = vec![7];
        entry.extend_from_slice(&name_index.to_be_bytes());
        self.push_entry(entry, 1)
    }

    fn constant_ref(&mut self, constant: &ConstantValue) -> u16 {
        match constant {
            ConstantValue::Int(value) => {
                let mut entry = vec![3];
                entry.extend_from_slice(&value.to_be_bytes());
                self.push_entry(entry, 1)
            }
            ConstantValue::Float(value) => {
                let mut entry = vec![4];
                entry.extend_from_slice(&value.to_bits().to_be_bytes());
                self.push_entry(entry, 1)
            }
            ConstantValue::Long(value) => {
                let mut entry = vec![5];
                entry.extend_from_slice(&value.to_be_bytes());
                self.push_entry(entry, 2)
            }
            ConstantValue::Double(value) => {
                let mut entry = vec![6];
                entry.extend_from_slice(&value.to_bits().to_be_bytes());
                self.push_entry(entry, 2)
            }
            ConstantValue::String(value) => {
                let utf8 = self.utf8_ref(value);
                let mut entry = vec![8];
                entry.extend_from_slice(&utf8.to_be_bytes());
                self.push_entry(entry, 1)
            }
        }
    }
}

/// Builds in-memory class files for model and engine tests.
pub(crate) struct ClassBuilder {
    class: ClassFile,
}

impl ClassBuilder {
    pub(crate) fn class(internal: &str) -> Self {
        Self::with_flags(internal, ACC_PUBLIC, Some(OBJECT))
    }

    pub(crate) fn interface(internal: &str) -> Self {
        Self::with_flags(internal, ACC_PUBLIC | ACC_INTERFACE | ACC_ABSTRACT, Some(OBJECT))
    }

    /// An annotation type whose `@Target` lists `targets` (`ElementType` names).
    pub(crate) fn annotation(internal: &str, targets: &[&str]) -> Self {
        let mut builder = Self::with_flags(
            internal,
            ACC_PUBLIC | ACC_INTERFACE | ACC_ABSTRACT | ACC_ANNOTATION,
            Some(OBJECT),
        );
        builder
            .class
            .interfaces
            .push("java/lang/annotation/Annotation".to_string());
        let targets = targets
            .iter()
            .map(|target| AnnotationValue::Enum {
                owner: "java.lang.annotation.ElementType".to_string(),
                name: target.to_string(),
            })
            .collect();
        builder.class.annotations.push(RawAnnotation {
            type_name: "java/lang/annotation/Target".to_string(),
            elements: BTreeMap::from([("value".to_string(), AnnotationValue::Array(targets))]),
        });
        builder
    }

    /// An enum with the given constants and its synthetic `(String, int)` constructor.
    pub(crate) fn enumeration(internal: &str, constants: &[&str]) -> Self {
        let mut builder = Self::with_flags(
            internal,
            ACC_PUBLIC | ACC_FINAL | ACC_ENUM,
            Some("java/lang/Enum"),
        );
        builder.class.signature = Some(format!(
            "Ljava/lang/Enum<L{internal};>;"
        ));
        for constant in constants {
            builder.class.fields.push(FieldInfo {
                name: constant.to_string(),
                descriptor: format!("L{internal};"),
                access_flags: ACC_PUBLIC | ACC_STATIC | ACC_FINAL | ACC_ENUM,
                ..FieldInfo::default()
            });
        }
        builder.class.methods.push(MethodInfo {
            name: "<init>".to_string(),
            descriptor: "(Ljava/lang/String;I)V".to_string(),
            access_flags: ACC_PRIVATE,
            ..MethodInfo::default()
        });
        builder
    }

    /// A record class: one private final field per component, its accessors and
    /// the canonical constructor. Components pair a name with a descriptor.
    pub(crate) fn record(internal: &str, components: &[(&str, &str)]) -> Self {
        let mut builder = Self::with_flags(
            internal,
            ACC_PUBLIC | ACC_FINAL,
            Some("java/lang/Record"),
        );
        builder.class.is_record = true;
        let mut constructor = String::from("(");
        for (name, descriptor) in components {
            builder.class.fields.push(FieldInfo {
                name: name.to_string(),
                descriptor: descriptor.to_string(),
                access_flags: ACC_PRIVATE | ACC_FINAL,
                ..FieldInfo::default()
            });
            constructor.push_str(descriptor);
        }
        constructor.push_str(")V");
        for (name, descriptor) in components {
            builder.class.methods.push(MethodInfo {
                name: name.to_string(),
                descriptor: format!("(){descriptor}"),
                access_flags: ACC_PUBLIC,
                ..MethodInfo::default()
            });
        }
        builder.class.methods.push(MethodInfo {
            name: "<init>".to_string(),
            descriptor: constructor,
            access_flags: ACC_PUBLIC,
            ..MethodInfo::default()
        });
        builder
    }

    fn with_flags(internal: &str, access_flags: u16, super_name: Option<&str>) -> Self {
        Self {
            class: ClassFile {
                name: internal.to_string(),
                access_flags,
                super_name: super_name.map(str::to_string),
                ..ClassFile::default()
            },
        }
    }

    /// Record an `InnerClasses` entry; both the outer and the nested class need it.
    pub(crate) fn nested(mut self, inner: &str, outer: &str, simple: &str, flags: u16) -> Self {
        self.class.inner_classes.push(InnerClass {
            inner: inner.to_string(),
            outer: Some(outer.to_string()),
            simple_name: Some(simple.to_string()),
            access_flags: flags,
        });
        self
    }

    pub(crate) fn signature(mut self, signature: &str) -> Self {
        self.class.signature = Some(signature.to_string());
        self
    }

    pub(crate) fn extends(mut self, super_name: &str) -> Self {
        self.class.super_name = Some(super_name.to_string());
        self
    }

    pub(crate) fn implements(mut self, interface: &str) -> Self {
        self.class.interfaces.push(interface.to_string());
        self
    }

    pub(crate) fn field(self, name: &str, descriptor: &str) -> Self {
        self.push_field(name, descriptor, ACC_PUBLIC, None, None)
    }

    pub(crate) fn generic_field(self, name: &str, descriptor: &str, signature: &str) -> Self {
        self.push_field(name, descriptor, ACC_PUBLIC, Some(signature), None)
    }

    pub(crate) fn private_field(self, name: &str, descriptor: &str) -> Self {
        self.push_field(name, descriptor, ACC_PRIVATE, None, None)
    }

    pub(crate) fn constant(self, name: &str, descriptor: &str, value: ConstantValue) -> Self {
        self.push_field(
            name,
            descriptor,
            ACC_PUBLIC | ACC_STATIC | ACC_FINAL,
            None,
            Some(value),
        )
    }

    pub(crate) fn method(self, name: &str, descriptor: &str) -> Self {
        self.push_method(name, descriptor, ACC_PUBLIC, None)
    }

    pub(crate) fn generic_method(self, name: &str, descriptor: &str, signature: &str) -> Self {
        self.push_method(name, descriptor, ACC_PUBLIC, Some(signature))
    }

    pub(crate) fn static_method(self, name: &str, descriptor: &str) -> Self {
        self.push_method(name, descriptor, ACC_PUBLIC | ACC_STATIC, None)
    }

    /// A compiler-generated bridge, as javac emits for covariant overrides.
    pub(crate) fn bridge_method(self, name: &str, descriptor: &str) -> Self {
        self.push_method(name, descriptor, ACC_PUBLIC | ACC_BRIDGE | ACC_SYNTHETIC, None)
    }

    pub(crate) fn last_field(mut self, edit: impl FnOnce(&mut FieldInfo)) -> Self {
        if let Some(field) = self.class.fields.last_mut() {
            edit(field);
        }
        self
    }

    pub(crate) fn last_method(mut self, edit: impl FnOnce(&mut MethodInfo)) -> Self {
        if let Some(method) = self.class.methods.last_mut() {
            edit(method);
        }
        self
    }

    pub(crate) fn build(self) -> ClassFile {
        self.class
    }

    fn push_field(
        mut self,
        name: &str,
        descriptor: &str,
        access_flags: u16,
        signature: Option<&str>,
        constant: Option<ConstantValue>,
    ) -> Self {
        self.class.fields.push(FieldInfo {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            access_flags,
            signature: signature.map(str::to_string),
            constant,
            ..FieldInfo::default()
        });
        self
    }

    fn push_method(
        mut self,
        name: &str,
        descriptor: &str,
        access_flags: u16,
        signature: Option<&str>,
    ) -> Self {
        let access_flags = if self.class.is_interface() && access_flags & ACC_STATIC == 0 {
            access_flags | ACC_ABSTRACT
        } else {
            access_flags
        };
        self.class.methods.push(MethodInfo {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            access_flags,
            signature: signature.map(str::to_string),
            ..MethodInfo::default()
        });
        self
    }
}

/// A marker annotation as a class file stores it.
pub(crate) fn marker(type_name: &str) -> RawAnnotation {
    RawAnnotation {
        type_name: type_name.to_string(),
        elements: BTreeMap::new(),
    }
}

/// Index `classes` with the built-in hierarchies, supplying `java.lang.Object`.
pub(crate) fn model(mut classes: Vec<ClassFile>) -> ClassIndex {
    if !classes.iter().any(|class| class.name == OBJECT) {
        classes.push(ClassFile {
            name: OBJECT.to_string(),
            access_flags: ACC_PUBLIC,
            ..ClassFile::default()
        });
    }
    ClassIndex::new(classes, &Hierarchies::new(&Hierarchies::builtin()))
}
