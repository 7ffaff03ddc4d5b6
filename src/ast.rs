//! Declaration tree produced by the overlay parser.
//!
//! The tree is purely syntactic: names are kept as written and annotation-use
//! expressions are not resolved until merging.

pub(crate) use crate::atype::PrimitiveKind;

/// Line and column (both 1-based) of a node in its overlay file.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd)]
pub(crate) struct Position {
    pub(crate) line: u32,
    pub(crate) column: u32,
}

impl Position {
    pub(crate) fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// One parsed overlay file.
#[derive(Clone, Debug, Default)]
pub(crate) struct OverlayFile {
    pub(crate) units: Vec<CompilationUnit>,
}

/// A package clause with its imports and type declarations.
#[derive(Clone, Debug, Default)]
pub(crate) struct CompilationUnit {
    pub(crate) package: Option<PackageDecl>,
    pub(crate) imports: Vec<ImportDecl>,
    pub(crate) types: Vec<TypeDecl>,
}

#[derive(Clone, Debug)]
pub(crate) struct PackageDecl {
    pub(crate) name: String,
    pub(crate) annotations: Vec<AnnotationExpr>,
    pub(crate) position: Position,
}

#[derive(Clone, Debug)]
pub(crate) struct ImportDecl {
    pub(crate) name: String,
    pub(crate) is_static: bool,
    pub(crate) is_wildcard: bool,
    pub(crate) position: Position,
}

/// Modifier keywords that matter for matching. Others are accepted and dropped.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub(crate) struct Modifiers {
    pub(crate) is_private: bool,
    pub(crate) is_protected: bool,
    pub(crate) is_public: bool,
    pub(crate) is_static: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum TypeDeclKind {
    Class,
    Interface,
    Enum,
    Annotation,
    /// A bare `;` at type-declaration level.
    Empty,
}

#[derive(Clone, Debug)]
pub(crate) struct TypeDecl {
    pub(crate) name: String,
    pub(crate) kind: TypeDeclKind,
    pub(crate) modifiers: Modifiers,
    pub(crate) annotations: Vec<AnnotationExpr>,
    pub(crate) type_parameters: Vec<TypeParameter>,
    pub(crate) extends: Vec<TypeRef>,
    pub(crate) implements: Vec<TypeRef>,
    pub(crate) enum_constants: Vec<EnumConstantDecl>,
    /// Header components of a record declaration.
    pub(crate) record_components: Vec<Parameter>,
    pub(crate) members: Vec<Member>,
    pub(crate) position: Position,
}

impl TypeDecl {
    pub(crate) fn empty(position: Position) -> Self {
        Self {
            name: String::new(),
            kind: TypeDeclKind::Empty,
            modifiers: Modifiers::default(),
            annotations: Vec::new(),
            type_parameters: Vec::new(),
            extends: Vec::new(),
            implements: Vec::new(),
            enum_constants: Vec::new(),
            record_components: Vec::new(),
            members: Vec::new(),
            position,
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) enum Member {
    Field(FieldDecl),
    Method(MethodDecl),
    Type(TypeDecl),
}

#[derive(Clone, Debug)]
pub(crate) struct EnumConstantDecl {
    pub(crate) name: String,
    pub(crate) annotations: Vec<AnnotationExpr>,
    pub(crate) position: Position,
}

/// `int a, b[];` keeps one declarator per variable with its full type.
#[derive(Clone, Debug)]
pub(crate) struct FieldDecl {
    pub(crate) modifiers: Modifiers,
    pub(crate) annotations: Vec<AnnotationExpr>,
    pub(crate) variables: Vec<VariableDecl>,
    pub(crate) position: Position,
}

#[derive(Clone, Debug)]
pub(crate) struct VariableDecl {
    pub(crate) name: String,
    pub(crate) ty: TypeRef,
    pub(crate) position: Position,
}

#[derive(Clone, Debug)]
pub(crate) struct MethodDecl {
    pub(crate) name: String,
    pub(crate) modifiers: Modifiers,
    pub(crate) annotations: Vec<AnnotationExpr>,
    pub(crate) type_parameters: Vec<TypeParameter>,
    /// `None` for constructors.
    pub(crate) return_type: Option<TypeRef>,
    pub(crate) receiver: Option<ReceiverParameter>,
    pub(crate) parameters: Vec<Parameter>,
    pub(crate) position: Position,
}

impl MethodDecl {
    pub(crate) fn is_constructor(&self) -> bool {
        self.return_type.is_none()
    }
}

#[derive(Clone, Debug)]
pub(crate) struct ReceiverParameter {
    pub(crate) annotations: Vec<AnnotationExpr>,
    pub(crate) ty: TypeRef,
}

#[derive(Clone, Debug)]
pub(crate) struct Parameter {
    pub(crate) name: String,
    pub(crate) annotations: Vec<AnnotationExpr>,
    /// For varargs this is the element type; the array is implicit.
    pub(crate) ty: TypeRef,
    pub(crate) is_varargs: bool,
    /// Annotations written just before `...`.
    pub(crate) varargs_annotations: Vec<AnnotationExpr>,
    pub(crate) position: Position,
}

#[derive(Clone, Debug)]
pub(crate) struct TypeParameter {
    pub(crate) name: String,
    pub(crate) annotations: Vec<AnnotationExpr>,
    pub(crate) bounds: Vec<TypeRef>,
    pub(crate) position: Position,
}

/// A type as written in the overlay, with its own annotations.
#[derive(Clone, Debug)]
pub(crate) struct TypeRef {
    pub(crate) annotations: Vec<AnnotationExpr>,
    pub(crate) kind: TypeRefKind,
    pub(crate) position: Position,
}

#[derive(Clone, Debug)]
pub(crate) enum TypeRefKind {
    Primitive(PrimitiveKind),
    Void,
    /// `a.b.Outer<X>.Inner<Y>`; annotations written on the last segment live on
    /// the enclosing `TypeRef`.
    Class(Vec<ClassSegment>),
    /// The outermost `Array` node holds the first written bracket.
    Array(Box<TypeRef>),
    Wildcard {
        extends: Option<Box<TypeRef>>,
        super_bound: Option<Box<TypeRef>>,
    },
}

#[derive(Clone, Debug)]
pub(crate) struct ClassSegment {
    pub(crate) name: String,
    pub(crate) type_arguments: Option<Vec<TypeRef>>,
}

impl TypeRef {
    /// Dotted name of a class type as written, without type arguments.
    pub(crate) fn class_name(&self) -> Option<String> {
        match &self.kind {
            TypeRefKind::Class(segments) => Some(
                segments
                    .iter()
                    .map(|segment| segment.name.as_str())
                    .collect::<Vec<_>>()
                    .join("."),
            ),
            _ => None,
        }
    }

    /// Type arguments of the last segment of a class type.
    pub(crate) fn type_arguments(&self) -> Option<&[TypeRef]> {
        match &self.kind {
            TypeRefKind::Class(segments) => segments
                .last()
                .and_then(|segment| segment.type_arguments.as_deref()),
            _ => None,
        }
    }

    pub(crate) fn array_depth(&self) -> usize {
        match &self.kind {
            TypeRefKind::Array(component) => 1 + component.array_depth(),
            _ => 0,
        }
    }

    pub(crate) fn innermost(&self) -> &TypeRef {
        match &self.kind {
            TypeRefKind::Array(component) => component.innermost(),
            _ => self,
        }
    }

    pub(crate) fn is_wildcard(&self) -> bool {
        matches!(self.kind, TypeRefKind::Wildcard { .. })
    }
}

/// `@Name`, `@Name(value)` or `@Name(a = x, b = y)`.
#[derive(Clone, Debug)]
pub(crate) struct AnnotationExpr {
    pub(crate) name: String,
    pub(crate) arguments: Vec<AnnotationArgument>,
    pub(crate) position: Position,
}

impl AnnotationExpr {
    pub(crate) fn simple_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }
}

#[derive(Clone, Debug)]
pub(crate) struct AnnotationArgument {
    /// `value` for the single-value form.
    pub(crate) name: String,
    pub(crate) value: Expr,
}

#[derive(Clone, Debug)]
pub(crate) enum Expr {
    Integer { text: String, position: Position },
    Long { text: String, position: Position },
    Float { text: String, position: Position },
    Double { text: String, position: Position },
    Char { value: char, position: Position },
    String { value: String, position: Position },
    Boolean { value: bool, position: Position },
    Null { position: Position },
    /// A simple or dotted name: constant reference, enum constant, static field.
    Name { name: String, position: Position },
    /// `Type.class`, including `int.class` and `String[].class`.
    ClassLiteral { ty: TypeRef, position: Position },
    Array { values: Vec<Expr>, position: Position },
    Annotation(Box<AnnotationExpr>),
    Unary { operator: char, operand: Box<Expr>, position: Position },
    /// Parsed so the file stays readable; never evaluated.
    Binary { operator: String, left: Box<Expr>, right: Box<Expr>, position: Position },
}

impl Expr {
    pub(crate) fn position(&self) -> Position {
        match self {
            Expr::Integer { position, .. }
            | Expr::Long { position, .. }
            | Expr::Float { position, .. }
            | Expr::Double { position, .. }
            | Expr::Char { position, .. }
            | Expr::String { position, .. }
            | Expr::Boolean { position, .. }
            | Expr::Null { position }
            | Expr::Name { position, .. }
            | Expr::ClassLiteral { position, .. }
            | Expr::Array { position, .. }
            | Expr::Unary { position, .. }
            | Expr::Binary { position, .. } => *position,
            Expr::Annotation(annotation) => annotation.position,
        }
    }
}

impl std::fmt::Display for TypeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for annotation in &self.annotations {
            write!(f, "@{} ", annotation.name)?;
        }
        match &self.kind {
            TypeRefKind::Primitive(kind) => write!(f, "{}", kind.keyword()),
            TypeRefKind::Void => write!(f, "void"),
            TypeRefKind::Class(segments) => {
                for (index, segment) in segments.iter().enumerate() {
                    if index > 0 {
                        write!(f, ".")?;
                    }
                    write!(f, "{}", segment.name)?;
                    if let Some(arguments) = &segment.type_arguments {
                        write!(f, "<")?;
                        for (arg_index, argument) in arguments.iter().enumerate() {
                            if arg_index > 0 {
                                write!(f, ", ")?;
                            }
                            write!(f, "{argument}")?;
                        }
                        write!(f, ">")?;
                    }
                }
                Ok(())
            }
            TypeRefKind::Array(component) => write!(f, "{component}[]"),
            TypeRefKind::Wildcard {
                extends,
                super_bound,
            } => {
                write!(f, "?")?;
                if let Some(bound) = extends {
                    write!(f, " extends {bound}")?;
                }
                if let Some(bound) = super_bound {
                    write!(f, " super {bound}")?;
                }
                Ok(())
            }
        }
    }
}
