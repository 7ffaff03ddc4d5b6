use std::str::FromStr;

use anyhow::{Context, Result};
use jdescriptor::{MethodDescriptor, TypeDescriptor};

use crate::atype::PrimitiveKind;
use crate::qualifier::MemberType;
use crate::signature::{TypeSig, canonical_name, parse_method_signature};

/// Count parameters in a JVM method descriptor.
pub(crate) fn method_param_count(descriptor: &str) -> Result<usize> {
    let descriptor =
        MethodDescriptor::from_str(descriptor).context("parse method descriptor")?;
    Ok(descriptor.parameter_types().len())
}

/// Whether the first descriptor parameter is a reference to `owner`, as javac emits
/// for the outer instance of an inner-class constructor.
pub(crate) fn leads_with_outer_instance(descriptor: &str, owner: &str) -> Result<bool> {
    let descriptor =
        MethodDescriptor::from_str(descriptor).context("parse method descriptor")?;
    Ok(matches!(
        descriptor.parameter_types().first(),
        Some(TypeDescriptor::Object(class)) if class.as_str() == owner
    ))
}

/// Member type of an annotation element from its `()X` descriptor.
pub(crate) fn annotation_member_type(descriptor: &str) -> Result<MemberType> {
    let sig = parse_method_signature(descriptor)?;
    Ok(member_type(&sig.ret))
}

fn member_type(ty: &TypeSig) -> MemberType {
    match ty {
        TypeSig::Base(primitive) => match primitive {
            PrimitiveKind::Boolean => MemberType::Boolean,
            PrimitiveKind::Byte => MemberType::Byte,
            PrimitiveKind::Short => MemberType::Short,
            PrimitiveKind::Char => MemberType::Char,
            PrimitiveKind::Int => MemberType::Int,
            PrimitiveKind::Long => MemberType::Long,
            PrimitiveKind::Float => MemberType::Float,
            PrimitiveKind::Double => MemberType::Double,
        },
        TypeSig::Class { name, .. } if name == "java/lang/String" => MemberType::String,
        TypeSig::Class { name, .. } if name == "java/lang/Class" => MemberType::Class,
        TypeSig::Class { name, .. } => MemberType::Enum(canonical_name(name)),
        TypeSig::Array(component) => MemberType::Array(Box::new(member_type(component))),
        TypeSig::TypeVar(_) | TypeSig::Void => MemberType::String,
    }
}
