use std::collections::BTreeMap;

use anyhow::{Context, Result};
use jclassfile::attributes::{Annotation, Attribute, ElementValue, TargetInfo, TargetType};
use jclassfile::class_file;
use jclassfile::constant_pool::ConstantPool;

use crate::qualifier::AnnotationValue;
use crate::signature::{TypeSig, canonical_name, parse_field_signature};

pub(crate) const ACC_PUBLIC: u16 = 0x0001;
pub(crate) const ACC_PRIVATE: u16 = 0x0002;
pub(crate) const ACC_STATIC: u16 = 0x0008;
pub(crate) const ACC_BRIDGE: u16 = 0x0040;
pub(crate) const ACC_VARARGS: u16 = 0x0080;
pub(crate) const ACC_INTERFACE: u16 = 0x0200;
pub(crate) const ACC_SYNTHETIC: u16 = 0x1000;
pub(crate) const ACC_ANNOTATION: u16 = 0x2000;
pub(crate) const ACC_ENUM: u16 = 0x4000;

/// Class data needed to resolve overlay declarations and read real qualifiers.
#[derive(Clone, Debug, Default)]
pub(crate) struct ClassFile {
    pub(crate) name: String,
    pub(crate) access_flags: u16,
    pub(crate) super_name: Option<String>,
    pub(crate) interfaces: Vec<String>,
    pub(crate) signature: Option<String>,
    pub(crate) fields: Vec<FieldInfo>,
    pub(crate) methods: Vec<MethodInfo>,
    pub(crate) annotations: Vec<RawAnnotation>,
    pub(crate) type_annotations: Vec<TypeAnnotation>,
    pub(crate) inner_classes: Vec<InnerClass>,
    pub(crate) is_record: bool,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct FieldInfo {
    pub(crate) name: String,
    pub(crate) descriptor: String,
    pub(crate) access_flags: u16,
    pub(crate) signature: Option<String>,
    pub(crate) constant: Option<ConstantValue>,
    pub(crate) annotations: Vec<RawAnnotation>,
    pub(crate) type_annotations: Vec<TypeAnnotation>,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct MethodInfo {
    pub(crate) name: String,
    pub(crate) descriptor: String,
    pub(crate) access_flags: u16,
    pub(crate) signature: Option<String>,
    pub(crate) annotations: Vec<RawAnnotation>,
    pub(crate) parameter_annotations: Vec<Vec<RawAnnotation>>,
    pub(crate) type_annotations: Vec<TypeAnnotation>,
}

/// `InnerClasses` entry.
#[derive(Clone, Debug, Default)]
pub(crate) struct InnerClass {
    pub(crate) inner: String,
    pub(crate) outer: Option<String>,
    pub(crate) simple_name: Option<String>,
    pub(crate) access_flags: u16,
}

/// `ConstantValue` of a static final field, as stored in the constant pool.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum ConstantValue {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
}

/// Annotation read from a `RuntimeVisible*Annotations` attribute.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct RawAnnotation {
    /// Internal name of the annotation type.
    pub(crate) type_name: String,
    pub(crate) elements: BTreeMap<String, AnnotationValue>,
}

/// Member-level positions a type annotation can target.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum TypeAnnotationTarget {
    /// 65535 for the superclass, otherwise an index into `interfaces`.
    Supertype(u16),
    Field,
    Return,
    Receiver,
    Parameter(u8),
}

/// One step of a `type_path`, from the targeted type towards the annotated node.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum TypePathStep {
    ArrayComponent,
    Nested,
    WildcardBound,
    TypeArgument(u8),
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct TypeAnnotation {
    pub(crate) target: TypeAnnotationTarget,
    pub(crate) path: Vec<TypePathStep>,
    pub(crate) annotation: RawAnnotation,
}

impl ClassFile {
    pub(crate) fn is_interface(&self) -> bool {
        self.access_flags & ACC_INTERFACE != 0
    }
}

/// Parse the parts of a class file the overlay engine reads.
pub(crate) fn parse_class_bytes(data: &[u8]) -> Result<ClassFile> {
    let class_file = match class_file::parse(data) {
        Ok(parsed) => parsed,
        Err(err) => {
            let message = format!("{err}");
            if message.contains("unmatched attribute") {
                return parse_class_bytes_minimal(data).context("failed to parse class file bytes");
            }
            return Err(err).context("failed to parse class file bytes");
        }
    };
    let constant_pool = class_file.constant_pool();
    let name =
        resolve_class_name(constant_pool, class_file.this_class()).context("resolve class name")?;
    let super_name = if class_file.super_class() == 0 {
        None
    } else {
        Some(
            resolve_class_name(constant_pool, class_file.super_class())
                .context("resolve super class name")?,
        )
    };
    let mut interfaces = Vec::new();
    for interface in class_file.interfaces() {
        interfaces
            .push(resolve_class_name(constant_pool, *interface).context("resolve interface name")?);
    }

    let mut class = ClassFile {
        name,
        access_flags: class_file.access_flags().bits(),
        super_name,
        interfaces,
        fields: parse_fields(constant_pool, class_file.fields()).context("parse fields")?,
        methods: parse_methods(constant_pool, class_file.methods()).context("parse methods")?,
        ..ClassFile::default()
    };
    for attribute in class_file.attributes() {
        match attribute {
            Attribute::Signature { signature_index } => {
                class.signature = Some(resolve_utf8(constant_pool, *signature_index)?);
            }
            Attribute::RuntimeVisibleAnnotations { annotations, .. } => {
                class.annotations = convert_annotations(constant_pool, annotations)?;
            }
            Attribute::RuntimeVisibleTypeAnnotations { type_annotations } => {
                class.type_annotations = convert_type_annotations(constant_pool, type_annotations)?;
            }
            Attribute::InnerClasses { classes } => {
                for record in classes {
                    class.inner_classes.push(InnerClass {
                        inner: resolve_class_name(constant_pool, record.inner_class_info_index())?,
                        outer: optional_index(record.outer_class_info_index())
                            .map(|index| resolve_class_name(constant_pool, index))
                            .transpose()?,
                        simple_name: optional_index(record.inner_name_index())
                            .map(|index| resolve_utf8(constant_pool, index))
                            .transpose()?,
                        access_flags: record.inner_class_access_flags().bits(),
                    });
                }
            }
            Attribute::Record { .. } => class.is_record = true,
            _ => {}
        }
    }
    Ok(class)
}

fn parse_fields(
    constant_pool: &[ConstantPool],
    fields: &[jclassfile::fields::FieldInfo],
) -> Result<Vec<FieldInfo>> {
    let mut parsed = Vec::new();
    for field in fields {
        let name = resolve_utf8(constant_pool, field.name_index()).context("resolve field name")?;
        let descriptor = resolve_utf8(constant_pool, field.descriptor_index())
            .context("resolve field descriptor")?;
        let mut info = FieldInfo {
            name,
            descriptor,
            access_flags: field.access_flags().bits(),
            ..FieldInfo::default()
        };
        for attribute in field.attributes() {
            match attribute {
                Attribute::Signature { signature_index } => {
                    info.signature = Some(resolve_utf8(constant_pool, *signature_index)?);
                }
                Attribute::ConstantValue {
                    constantvalue_index,
                } => {
                    info.constant = Some(resolve_constant(constant_pool, *constantvalue_index)?);
                }
                Attribute::RuntimeVisibleAnnotations { annotations, .. } => {
                    info.annotations = convert_annotations(constant_pool, annotations)?;
                }
                Attribute::RuntimeVisibleTypeAnnotations { type_annotations } => {
                    info.type_annotations =
                        convert_type_annotations(constant_pool, type_annotations)?;
                }
                _ => {}
            }
        }
        parsed.push(info);
    }
    Ok(parsed)
}

fn parse_methods(
    constant_pool: &[ConstantPool],
    methods: &[jclassfile::methods::MethodInfo],
) -> Result<Vec<MethodInfo>> {
    let mut parsed = Vec::new();
    for method in methods {
        let name =
            resolve_utf8(constant_pool, method.name_index()).context("resolve method name")?;
        let descriptor = resolve_utf8(constant_pool, method.descriptor_index())
            .context("resolve method descriptor")?;
        let mut info = MethodInfo {
            name,
            descriptor,
            access_flags: method.access_flags().bits(),
            ..MethodInfo::default()
        };
        for attribute in method.attributes() {
            match attribute {
                Attribute::Signature { signature_index } => {
                    info.signature = Some(resolve_utf8(constant_pool, *signature_index)?);
                }
                Attribute::RuntimeVisibleAnnotations { annotations, .. } => {
                    info.annotations = convert_annotations(constant_pool, annotations)?;
                }
                Attribute::RuntimeVisibleParameterAnnotations {
                    parameter_annotations,
                } => {
                    for annotations in parameter_annotations {
                        info.parameter_annotations
                            .push(convert_annotations(constant_pool, annotations.annotations())?);
                    }
                }
                Attribute::RuntimeVisibleTypeAnnotations { type_annotations } => {
                    info.type_annotations =
                        convert_type_annotations(constant_pool, type_annotations)?;
                }
                _ => {}
            }
        }
        parsed.push(info);
    }
    Ok(parsed)
}

fn optional_index(index: u16) -> Option<u16> {
    (index != 0).then_some(index)
}

fn resolve_class_name(constant_pool: &[ConstantPool], class_index: u16) -> Result<String> {
    let entry = constant_pool
        .get(class_index as usize)
        .context("missing class entry")?;
    match entry {
        ConstantPool::Class { name_index } => resolve_utf8(constant_pool, *name_index),
        _ => anyhow::bail!("unexpected class entry"),
    }
}

fn resolve_utf8(constant_pool: &[ConstantPool], index: u16) -> Result<String> {
    let entry = constant_pool
        .get(index as usize)
        .context("missing utf8 entry")?;
    match entry {
        ConstantPool::Utf8 { value } => Ok(value.clone()),
        _ => anyhow::bail!("unexpected utf8 entry"),
    }
}

fn resolve_constant(constant_pool: &[ConstantPool], index: u16) -> Result<ConstantValue> {
    let entry = constant_pool
        .get(index as usize)
        .context("missing constant entry")?;
    let value = match entry {
        ConstantPool::Integer { value } => ConstantValue::Int(*value),
        ConstantPool::Long { value } => ConstantValue::Long(*value),
        ConstantPool::Float { value } => ConstantValue::Float(*value),
        ConstantPool::Double { value } => ConstantValue::Double(*value),
        ConstantPool::String { string_index } => {
            ConstantValue::String(resolve_utf8(constant_pool, *string_index)?)
        }
        ConstantPool::Utf8 { value } => ConstantValue::String(value.clone()),
        _ => anyhow::bail!("unexpected constant entry at {index}"),
    };
    Ok(value)
}

fn convert_annotations(
    constant_pool: &[ConstantPool],
    annotations: &[Annotation],
) -> Result<Vec<RawAnnotation>> {
    annotations
        .iter()
        .map(|annotation| convert_annotation(constant_pool, annotation))
        .collect()
}

fn convert_annotation(constant_pool: &[ConstantPool], annotation: &Annotation) -> Result<RawAnnotation> {
    let descriptor =
        resolve_utf8(constant_pool, annotation.type_index()).context("resolve annotation type")?;
    let type_name = descriptor
        .strip_prefix('L')
        .and_then(|value| value.strip_suffix(';'))
        .context("invalid annotation descriptor")?
        .to_string();
    let mut elements = BTreeMap::new();
    for pair in annotation.element_value_pairs() {
        let name = resolve_utf8(constant_pool, pair.element_name_index())?;
        if let Some(value) = convert_element_value(constant_pool, pair.value())? {
            elements.insert(name, value);
        }
    }
    Ok(RawAnnotation {
        type_name,
        elements,
    })
}

/// Nested annotation values are dropped.
fn convert_element_value(
    constant_pool: &[ConstantPool],
    value: &ElementValue,
) -> Result<Option<AnnotationValue>> {
    let converted = match value {
        ElementValue::ConstValueIndex {
            tag,
            const_value_index,
        } => {
            let tag = u8::try_from(*tag).unwrap_or_default();
            let constant = resolve_constant(constant_pool, *const_value_index)?;
            Some(element_constant(tag, constant)?)
        }
        ElementValue::EnumConstValue {
            type_name_index,
            const_name_index,
        } => Some(AnnotationValue::Enum {
            owner: descriptor_to_canonical(&resolve_utf8(constant_pool, *type_name_index)?)?,
            name: resolve_utf8(constant_pool, *const_name_index)?,
        }),
        ElementValue::ClassInfoIndex { class_info_index } => Some(AnnotationValue::Class(
            descriptor_to_canonical(&resolve_utf8(constant_pool, *class_info_index)?)?,
        )),
        ElementValue::AnnotationValue { .. } => None,
        ElementValue::ArrayValue { values } => {
            let mut converted = Vec::with_capacity(values.len());
            for value in values {
                if let Some(value) = convert_element_value(constant_pool, value)? {
                    converted.push(value);
                }
            }
            Some(AnnotationValue::Array(converted))
        }
    };
    Ok(converted)
}

fn element_constant(tag: u8, constant: ConstantValue) -> Result<AnnotationValue> {
    let value = match (tag, constant) {
        (b'B', ConstantValue::Int(value)) => AnnotationValue::Byte(value as i8),
        (b'C', ConstantValue::Int(value)) => {
            AnnotationValue::Char(char::from_u32(value as u32).unwrap_or('\u{fffd}'))
        }
        (b'I', ConstantValue::Int(value)) => AnnotationValue::Int(value),
        (b'S', ConstantValue::Int(value)) => AnnotationValue::Short(value as i16),
        (b'Z', ConstantValue::Int(value)) => AnnotationValue::Boolean(value != 0),
        (b'D', ConstantValue::Double(value)) => AnnotationValue::Double(value),
        (b'F', ConstantValue::Float(value)) => AnnotationValue::Float(value),
        (b'J', ConstantValue::Long(value)) => AnnotationValue::Long(value),
        (b's', ConstantValue::String(value)) => AnnotationValue::String(value),
        (tag, constant) => anyhow::bail!(
            "element value tag {} does not match constant {:?}",
            tag as char,
            constant
        ),
    };
    Ok(value)
}

fn convert_type_annotations(
    constant_pool: &[ConstantPool],
    type_annotations: &[jclassfile::attributes::TypeAnnotation],
) -> Result<Vec<TypeAnnotation>> {
    let mut converted = Vec::new();
    for annotation in type_annotations {
        let target = match (annotation.target_type(), annotation.target_info()) {
            (TargetType::CLASS_EXTENDS, TargetInfo::SupertypeTarget { supertype_index }) => {
                TypeAnnotationTarget::Supertype(*supertype_index)
            }
            (TargetType::FIELD, TargetInfo::EmptyTarget) => TypeAnnotationTarget::Field,
            (TargetType::METHOD_RETURN, TargetInfo::EmptyTarget) => TypeAnnotationTarget::Return,
            (TargetType::METHOD_RECEIVER, TargetInfo::EmptyTarget) => {
                TypeAnnotationTarget::Receiver
            }
            (
                TargetType::METHOD_FORMAL_PARAMETER,
                TargetInfo::FormalParameterTarget {
                    formal_parameter_index,
                },
            ) => TypeAnnotationTarget::Parameter(*formal_parameter_index),
            // Type parameter bounds, throws clauses and code positions.
            _ => continue,
        };
        let mut path = Vec::new();
        for entry in annotation.type_path() {
            let step = match entry.type_path_kind() {
                0 => TypePathStep::ArrayComponent,
                1 => TypePathStep::Nested,
                2 => TypePathStep::WildcardBound,
                3 => TypePathStep::TypeArgument(entry.type_argument_index()),
                kind => anyhow::bail!("unsupported type path kind: {kind}"),
            };
            path.push(step);
        }
        converted.push(TypeAnnotation {
            target,
            path,
            annotation: convert_annotation(constant_pool, annotation.annotation())?,
        });
    }
    Ok(converted)
}

/// Names, supertypes and members of a class whose attributes the full parser
/// rejects. Annotations and signatures are not read.
fn parse_class_bytes_minimal(data: &[u8]) -> Result<ClassFile> {
    let mut offset = 0usize;
    let magic = read_u32_class(data, &mut offset)?;
    if magic != 0xCAFEBABE {
        anyhow::bail!("invalid class file magic");
    }
    let _minor = read_u16_class(data, &mut offset)?;
    let _major = read_u16_class(data, &mut offset)?;
    let (cp_entries, class_entries) = parse_constant_pool_minimal(data, &mut offset)?;
    let access_flags = read_u16_class(data, &mut offset)?;
    let this_class = read_u16_class(data, &mut offset)?;
    let super_class = read_u16_class(data, &mut offset)?;

    let name = resolve_class_name_minimal(&cp_entries, &class_entries, this_class)
        .context("resolve class name")?;
    let super_name = if super_class == 0 {
        None
    } else {
        Some(
            resolve_class_name_minimal(&cp_entries, &class_entries, super_class)
                .context("resolve super class name")?,
        )
    };
    let interface_count = read_u16_class(data, &mut offset)? as usize;
    let mut interfaces = Vec::with_capacity(interface_count);
    for _ in 0..interface_count {
        let index = read_u16_class(data, &mut offset)?;
        interfaces.push(resolve_class_name_minimal(&cp_entries, &class_entries, index)?);
    }

    let mut fields = Vec::new();
    for (name, descriptor, access_flags) in parse_members_minimal(data, &mut offset, &cp_entries)? {
        fields.push(FieldInfo {
            name,
            descriptor,
            access_flags,
            ..FieldInfo::default()
        });
    }
    let mut methods = Vec::new();
    for (name, descriptor, access_flags) in parse_members_minimal(data, &mut offset, &cp_entries)? {
        methods.push(MethodInfo {
            name,
            descriptor,
            access_flags,
            ..MethodInfo::default()
        });
    }
    skip_attributes(data, &mut offset)?;

    Ok(ClassFile {
        name,
        access_flags,
        super_name,
        interfaces,
        fields,
        methods,
        ..ClassFile::default()
    })
}

#[derive(Clone)]
enum CpEntryMin {
    Utf8(String),
    Other,
}

fn parse_constant_pool_minimal(
    data: &[u8],
    offset: &mut usize,
) -> Result<(Vec<CpEntryMin>, Vec<Option<u16>>)> {
    let count = read_u16_class(data, offset)?;
    let mut entries = Vec::with_capacity(count as usize);
    entries.push(CpEntryMin::Other);
    let mut class_entries = vec![None; count as usize];
    let mut index = 1u16;
    while index < count {
        let tag = read_u8_class(data, offset)?;
        match tag {
            1 => {
                let len = read_u16_class(data, offset)? as usize;
                let bytes = read_bytes_class(data, offset, len)?;
                entries.push(CpEntryMin::Utf8(String::from_utf8_lossy(bytes).to_string()));
            }
            7 => {
                let name_index = read_u16_class(data, offset)?;
                entries.push(CpEntryMin::Other);
                class_entries[index as usize] = Some(name_index);
            }
            3 | 4 | 9 | 10 | 11 | 12 | 17 | 18 => {
                skip_class_bytes(data, offset, 4)?;
                entries.push(CpEntryMin::Other);
            }
            5 | 6 => {
                skip_class_bytes(data, offset, 8)?;
                entries.push(CpEntryMin::Other);
                entries.push(CpEntryMin::Other);
                index += 1;
            }
            15 => {
                skip_class_bytes(data, offset, 3)?;
                entries.push(CpEntryMin::Other);
            }
            8 | 16 | 19 | 20 => {
                skip_class_bytes(data, offset, 2)?;
                entries.push(CpEntryMin::Other);
            }
            _ => anyhow::bail!("unsupported constant pool tag: {}", tag),
        }
        index += 1;
    }
    Ok((entries, class_entries))
}

fn resolve_utf8_minimal(entries: &[CpEntryMin], index: u16) -> Result<String> {
    match entries.get(index as usize) {
        Some(CpEntryMin::Utf8(value)) => Ok(value.clone()),
        _ => anyhow::bail!("missing utf8 entry at {index}"),
    }
}

fn resolve_class_name_minimal(
    entries: &[CpEntryMin],
    class_entries: &[Option<u16>],
    class_index: u16,
) -> Result<String> {
    let entry = class_entries
        .get(class_index as usize)
        .context("missing class entry")?;
    let name_index = entry.context("missing class name index")?;
    resolve_utf8_minimal(entries, name_index)
}

fn parse_members_minimal(
    data: &[u8],
    offset: &mut usize,
    entries: &[CpEntryMin],
) -> Result<Vec<(String, String, u16)>> {
    let count = read_u16_class(data, offset)?;
    let mut members = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let access_flags = read_u16_class(data, offset)?;
        let name = resolve_utf8_minimal(entries, read_u16_class(data, offset)?)?;
        let descriptor = resolve_utf8_minimal(entries, read_u16_class(data, offset)?)?;
        skip_attributes(data, offset)?;
        members.push((name, descriptor, access_flags));
    }
    Ok(members)
}

fn skip_attributes(data: &[u8], offset: &mut usize) -> Result<()> {
    let count = read_u16_class(data, offset)?;
    for _ in 0..count {
        skip_class_bytes(data, offset, 2)?;
        let length = read_u32_class(data, offset)? as usize;
        skip_class_bytes(data, offset, length)?;
    }
    Ok(())
}

/// `Ljava/lang/String;` -> `java.lang.String`, `[I` -> `int[]`, `V` -> `void`.
pub(crate) fn descriptor_to_canonical(descriptor: &str) -> Result<String> {
    let ty = parse_field_signature(descriptor)?;
    Ok(type_sig_to_canonical(&ty))
}

fn type_sig_to_canonical(ty: &TypeSig) -> String {
    match ty {
        TypeSig::Base(primitive) => primitive.keyword().to_string(),
        TypeSig::Void => "void".to_string(),
        TypeSig::Class { name, .. } => canonical_name(name),
        TypeSig::TypeVar(name) => name.clone(),
        TypeSig::Array(component) => format!("{}[]", type_sig_to_canonical(component)),
    }
}

fn read_u8_class(data: &[u8], offset: &mut usize) -> Result<u8> {
    let byte = *data.get(*offset).context("class file out of bounds")?;
    *offset += 1;
    Ok(byte)
}

fn read_u16_class(data: &[u8], offset: &mut usize) -> Result<u16> {
    let bytes = read_bytes_class(data, offset, 2)?;
    Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
}

fn read_u32_class(data: &[u8], offset: &mut usize) -> Result<u32> {
    let bytes = read_bytes_class(data, offset, 4)?;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn read_bytes_class<'a>(data: &'a [u8], offset: &mut usize, len: usize) -> Result<&'a [u8]> {
    let start = *offset;
    let end = start + len;
    let slice = data.get(start..end).context("class file out of bounds")?;
    *offset = end;
    Ok(slice)
}

fn skip_class_bytes(data: &[u8], offset: &mut usize, len: usize) -> Result<()> {
    read_bytes_class(data, offset, len)?;
    Ok(())
}
