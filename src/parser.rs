use std::fmt;

use crate::ast::{
    AnnotationArgument, AnnotationExpr, ClassSegment, CompilationUnit, EnumConstantDecl, Expr,
    FieldDecl, ImportDecl, Member, MethodDecl, Modifiers, OverlayFile, PackageDecl, Parameter,
    Position, PrimitiveKind, ReceiverParameter, TypeDecl, TypeDeclKind, TypeParameter, TypeRef,
    TypeRefKind, VariableDecl,
};
use crate::lexer::{Token, TokenKind, tokenize};

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ParseError {
    pub(crate) position: Position,
    pub(crate) message: String,
}

/// Every syntax error found in one overlay file.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ParseFailure {
    pub(crate) errors: Vec<ParseError>,
}

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, error) in self.errors.iter().enumerate() {
            if index > 0 {
                write!(f, "; ")?;
            }
            write!(
                f,
                "{}:{}: {}",
                error.position.line, error.position.column, error.message
            )?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseFailure {}

type PResult<T> = Result<T, ParseError>;

const MODIFIER_KEYWORDS: &[&str] = &[
    "public",
    "protected",
    "private",
    "static",
    "abstract",
    "final",
    "native",
    "synchronized",
    "transient",
    "volatile",
    "strictfp",
    "default",
    "sealed",
];

/// Parse overlay text into a declaration tree.
pub(crate) fn parse_overlay(text: &str) -> Result<OverlayFile, ParseFailure> {
    let tokens = tokenize(text).map_err(|error| ParseFailure {
        errors: vec![ParseError {
            position: error.position,
            message: error.message,
        }],
    })?;
    let mut parser = Parser {
        tokens,
        index: 0,
        errors: Vec::new(),
    };
    let file = parser.file();
    if parser.errors.is_empty() {
        Ok(file)
    } else {
        Err(ParseFailure {
            errors: parser.errors,
        })
    }
}

struct Parser {
    tokens: Vec<Token>,
    index: usize,
    errors: Vec<ParseError>,
}

impl Parser {
    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let index = (self.index + offset).min(self.tokens.len() - 1);
        &self.tokens[index]
    }

    fn position(&self) -> Position {
        self.peek().position
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.index += 1;
        }
        token
    }

    fn at_eof(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn is_punct_at(&self, offset: usize, ch: char) -> bool {
        self.peek_at(offset).kind == TokenKind::Punct(ch)
    }

    fn is_punct(&self, ch: char) -> bool {
        self.is_punct_at(0, ch)
    }

    fn eat_punct(&mut self, ch: char) -> bool {
        if self.is_punct(ch) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, ch: char) -> PResult<Position> {
        if self.is_punct(ch) {
            Ok(self.advance().position)
        } else {
            Err(self.unexpected(&format!("'{ch}'")))
        }
    }

    fn is_keyword_at(&self, offset: usize, word: &str) -> bool {
        matches!(&self.peek_at(offset).kind, TokenKind::Identifier(name) if name == word)
    }

    fn is_keyword(&self, word: &str) -> bool {
        self.is_keyword_at(0, word)
    }

    fn eat_keyword(&mut self, word: &str) -> bool {
        if self.is_keyword(word) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn is_identifier_at(&self, offset: usize) -> bool {
        matches!(self.peek_at(offset).kind, TokenKind::Identifier(_))
    }

    fn expect_identifier(&mut self) -> PResult<(String, Position)> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Identifier(name) => {
                self.advance();
                Ok((name, token.position))
            }
            _ => Err(self.unexpected("an identifier")),
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        let token = self.peek();
        let found = match &token.kind {
            TokenKind::Identifier(name) => format!("'{name}'"),
            TokenKind::Integer(text)
            | TokenKind::Long(text)
            | TokenKind::Float(text)
            | TokenKind::Double(text) => format!("number {text}"),
            TokenKind::Char(ch) => format!("character {ch:?}"),
            TokenKind::String(value) => format!("string {value:?}"),
            TokenKind::Punct(ch) => format!("'{ch}'"),
            TokenKind::Ellipsis => "'...'".to_string(),
            TokenKind::Eof => "end of file".to_string(),
        };
        ParseError {
            position: token.position,
            message: format!("expected {expected} but found {found}"),
        }
    }

    fn file(&mut self) -> OverlayFile {
        let mut file = OverlayFile::default();
        let mut unit = CompilationUnit::default();
        while !self.at_eof() {
            match self.top_level(&mut unit) {
                Ok(Some(next)) => {
                    file.units.push(std::mem::replace(&mut unit, next));
                }
                Ok(None) => {}
                Err(error) => {
                    self.errors.push(error);
                    break;
                }
            }
        }
        file.units.push(unit);
        file
    }

    /// Parse one top-level item into `unit`; a package clause after content
    /// returns the new unit it starts.
    fn top_level(&mut self, unit: &mut CompilationUnit) -> PResult<Option<CompilationUnit>> {
        let start = self.index;
        let position = self.position();
        let annotations = self.annotations()?;
        if self.eat_keyword("package") {
            let (name, _) = self.qualified_name()?;
            self.expect_punct(';')?;
            let package = PackageDecl {
                name,
                annotations,
                position,
            };
            let is_fresh = unit.package.is_none() && unit.imports.is_empty() && unit.types.is_empty();
            if is_fresh {
                unit.package = Some(package);
                return Ok(None);
            }
            return Ok(Some(CompilationUnit {
                package: Some(package),
                ..CompilationUnit::default()
            }));
        }
        if annotations.is_empty() && self.eat_keyword("import") {
            let is_static = self.eat_keyword("static");
            let (name, _) = self.qualified_name()?;
            let mut is_wildcard = false;
            if self.eat_punct('.') {
                self.expect_punct('*')?;
                is_wildcard = true;
            }
            self.expect_punct(';')?;
            unit.imports.push(ImportDecl {
                name,
                is_static,
                is_wildcard,
                position,
            });
            return Ok(None);
        }
        self.index = start;
        if self.is_punct(';') {
            let position = self.advance().position;
            unit.types.push(TypeDecl::empty(position));
            return Ok(None);
        }
        let decl = self.type_declaration()?;
        unit.types.push(decl);
        Ok(None)
    }

    fn qualified_name(&mut self) -> PResult<(String, Position)> {
        let (mut name, position) = self.expect_identifier()?;
        while self.is_punct('.') && self.is_identifier_at(1) {
            self.advance();
            let (segment, _) = self.expect_identifier()?;
            name.push('.');
            name.push_str(&segment);
        }
        Ok((name, position))
    }

    fn is_annotation_start(&self) -> bool {
        self.is_punct('@') && !self.is_keyword_at(1, "interface")
    }

    fn annotations(&mut self) -> PResult<Vec<AnnotationExpr>> {
        let mut annotations = Vec::new();
        while self.is_annotation_start() {
            annotations.push(self.annotation()?);
        }
        Ok(annotations)
    }

    fn annotation(&mut self) -> PResult<AnnotationExpr> {
        let position = self.expect_punct('@')?;
        let (name, _) = self.qualified_name()?;
        let mut arguments = Vec::new();
        if self.eat_punct('(') {
            if !self.is_punct(')') {
                if self.is_identifier_at(0) && self.is_punct_at(1, '=') && !self.is_punct_at(2, '=')
                {
                    loop {
                        let (name, _) = self.expect_identifier()?;
                        self.expect_punct('=')?;
                        let value = self.element_value()?;
                        arguments.push(AnnotationArgument { name, value });
                        if !self.eat_punct(',') {
                            break;
                        }
                    }
                } else {
                    let value = self.element_value()?;
                    arguments.push(AnnotationArgument {
                        name: "value".to_string(),
                        value,
                    });
                }
            }
            self.expect_punct(')')?;
        }
        Ok(AnnotationExpr {
            name,
            arguments,
            position,
        })
    }

    fn element_value(&mut self) -> PResult<Expr> {
        if self.is_annotation_start() {
            return Ok(Expr::Annotation(Box::new(self.annotation()?)));
        }
        if self.is_punct('{') {
            let position = self.advance().position;
            let mut values = Vec::new();
            while !self.is_punct('}') {
                values.push(self.element_value()?);
                if !self.eat_punct(',') {
                    break;
                }
            }
            self.expect_punct('}')?;
            return Ok(Expr::Array { values, position });
        }
        self.expression()
    }

    fn is_binary_operator(&self) -> bool {
        matches!(
            self.peek().kind,
            TokenKind::Punct('+' | '-' | '*' | '/' | '%' | '&' | '|' | '^' | '<' | '>' | '=' | '!' | '?' | ':')
        )
    }

    fn expression(&mut self) -> PResult<Expr> {
        let mut left = self.unary()?;
        while self.is_binary_operator() {
            let token = self.advance();
            let mut operator = String::new();
            if let TokenKind::Punct(ch) = token.kind {
                operator.push(ch);
            }
            let mut last = token.position;
            while self.is_binary_operator()
                && self.position().line == last.line
                && self.position().column == last.column + 1
            {
                let next = self.advance();
                if let TokenKind::Punct(ch) = next.kind {
                    operator.push(ch);
                }
                last = next.position;
            }
            let right = self.unary()?;
            left = Expr::Binary {
                operator,
                left: Box::new(left),
                right: Box::new(right),
                position: token.position,
            };
        }
        Ok(left)
    }

    fn unary(&mut self) -> PResult<Expr> {
        if let TokenKind::Punct(operator @ ('-' | '+' | '!' | '~')) = self.peek().kind {
            let position = self.advance().position;
            let operand = self.unary()?;
            return Ok(Expr::Unary {
                operator,
                operand: Box::new(operand),
                position,
            });
        }
        self.primary()
    }

    fn primary(&mut self) -> PResult<Expr> {
        let token = self.peek().clone();
        let position = token.position;
        let literal = match token.kind {
            TokenKind::Integer(text) => Some(Expr::Integer { text, position }),
            TokenKind::Long(text) => Some(Expr::Long { text, position }),
            TokenKind::Float(text) => Some(Expr::Float { text, position }),
            TokenKind::Double(text) => Some(Expr::Double { text, position }),
            TokenKind::Char(value) => Some(Expr::Char { value, position }),
            TokenKind::String(value) => Some(Expr::String { value, position }),
            TokenKind::Identifier(ref word) if word == "true" || word == "false" => {
                Some(Expr::Boolean {
                    value: word == "true",
                    position,
                })
            }
            TokenKind::Identifier(ref word) if word == "null" => Some(Expr::Null { position }),
            _ => None,
        };
        if let Some(literal) = literal {
            self.advance();
            return Ok(literal);
        }
        if self.eat_punct('(') {
            let inner = self.expression()?;
            self.expect_punct(')')?;
            return Ok(inner);
        }
        if !self.is_identifier_at(0) {
            return Err(self.unexpected("an annotation value"));
        }

        let mut segments = vec![self.expect_identifier()?.0];
        while self.is_punct('.') && self.is_identifier_at(1) && !self.is_keyword_at(1, "class") {
            self.advance();
            segments.push(self.expect_identifier()?.0);
        }
        let mut levels = Vec::new();
        while self.is_punct('[') && self.is_punct_at(1, ']') {
            let position = self.advance().position;
            self.advance();
            levels.push((Vec::new(), position));
        }
        if self.is_punct('.') && self.is_keyword_at(1, "class") {
            self.advance();
            self.advance();
            let primitive = match segments.as_slice() {
                [single] => PrimitiveKind::from_keyword(single),
                _ => None,
            };
            let kind = match primitive {
                Some(primitive) => TypeRefKind::Primitive(primitive),
                None if segments.len() == 1 && segments[0] == "void" => TypeRefKind::Void,
                None => TypeRefKind::Class(
                    segments
                        .into_iter()
                        .map(|name| ClassSegment {
                            name,
                            type_arguments: None,
                        })
                        .collect(),
                ),
            };
            let base = TypeRef {
                annotations: Vec::new(),
                kind,
                position,
            };
            return Ok(Expr::ClassLiteral {
                ty: wrap_dimensions(base, levels),
                position,
            });
        }
        if !levels.is_empty() {
            return Err(self.unexpected("'.class'"));
        }
        Ok(Expr::Name {
            name: segments.join("."),
            position,
        })
    }

    fn modifiers(&mut self) -> PResult<(Modifiers, Vec<AnnotationExpr>)> {
        let mut modifiers = Modifiers::default();
        let mut annotations = Vec::new();
        loop {
            if self.is_annotation_start() {
                annotations.push(self.annotation()?);
                continue;
            }
            if self.is_keyword("non") && self.is_punct_at(1, '-') && self.is_keyword_at(2, "sealed")
            {
                self.advance();
                self.advance();
                self.advance();
                continue;
            }
            let word = match &self.peek().kind {
                TokenKind::Identifier(word) if MODIFIER_KEYWORDS.contains(&word.as_str()) => {
                    word.clone()
                }
                _ => break,
            };
            self.advance();
            match word.as_str() {
                "public" => modifiers.is_public = true,
                "protected" => modifiers.is_protected = true,
                "private" => modifiers.is_private = true,
                "static" => modifiers.is_static = true,
                _ => {}
            }
        }
        Ok((modifiers, annotations))
    }

    fn is_type_declaration_start(&self) -> bool {
        self.is_keyword("class")
            || self.is_keyword("interface")
            || self.is_keyword("enum")
            || (self.is_keyword("record") && self.is_identifier_at(1))
            || (self.is_punct('@') && self.is_keyword_at(1, "interface"))
    }

    fn type_declaration(&mut self) -> PResult<TypeDecl> {
        let position = self.position();
        let (modifiers, annotations) = self.modifiers()?;
        if !self.is_type_declaration_start() {
            return Err(self.unexpected("a type declaration"));
        }
        self.type_declaration_rest(position, modifiers, annotations)
    }

    fn type_declaration_rest(
        &mut self,
        position: Position,
        modifiers: Modifiers,
        annotations: Vec<AnnotationExpr>,
    ) -> PResult<TypeDecl> {
        let (kind, is_record) = if self.eat_punct('@') {
            self.advance();
            (TypeDeclKind::Annotation, false)
        } else {
            let (keyword, _) = self.expect_identifier()?;
            match keyword.as_str() {
                "interface" => (TypeDeclKind::Interface, false),
                "enum" => (TypeDeclKind::Enum, false),
                "record" => (TypeDeclKind::Class, true),
                _ => (TypeDeclKind::Class, false),
            }
        };
        let (name, _) = self.expect_identifier()?;
        let type_parameters = if self.is_punct('<') {
            self.type_parameters()?
        } else {
            Vec::new()
        };
        let record_components = if is_record {
            self.record_components()?
        } else {
            Vec::new()
        };
        let mut extends = Vec::new();
        let mut implements = Vec::new();
        loop {
            if self.eat_keyword("extends") {
                extends.extend(self.type_list()?);
            } else if self.eat_keyword("implements") {
                implements.extend(self.type_list()?);
            } else if self.eat_keyword("permits") {
                self.type_list()?;
            } else {
                break;
            }
        }

        self.expect_punct('{')?;
        let enum_constants = if kind == TypeDeclKind::Enum {
            self.enum_constants()?
        } else {
            Vec::new()
        };
        let members = self.members(&name)?;
        Ok(TypeDecl {
            name,
            kind,
            modifiers,
            annotations,
            type_parameters,
            extends,
            implements,
            enum_constants,
            record_components,
            members,
            position,
        })
    }

    fn record_components(&mut self) -> PResult<Vec<Parameter>> {
        self.expect_punct('(')?;
        let mut components = Vec::new();
        if !self.is_punct(')') {
            loop {
                components.push(self.parameter()?);
                if !self.eat_punct(',') {
                    break;
                }
            }
        }
        self.expect_punct(')')?;
        Ok(components)
    }

    fn type_list(&mut self) -> PResult<Vec<TypeRef>> {
        let mut types = vec![self.parse_type()?];
        while self.eat_punct(',') {
            types.push(self.parse_type()?);
        }
        Ok(types)
    }

    fn type_parameters(&mut self) -> PResult<Vec<TypeParameter>> {
        self.expect_punct('<')?;
        let mut parameters = Vec::new();
        loop {
            let position = self.position();
            let annotations = self.annotations()?;
            let (name, _) = self.expect_identifier()?;
            let mut bounds = Vec::new();
            if self.eat_keyword("extends") {
                bounds.push(self.parse_type()?);
                while self.eat_punct('&') {
                    bounds.push(self.parse_type()?);
                }
            }
            parameters.push(TypeParameter {
                name,
                annotations,
                bounds,
                position,
            });
            if !self.eat_punct(',') {
                break;
            }
        }
        self.expect_punct('>')?;
        Ok(parameters)
    }

    fn enum_constants(&mut self) -> PResult<Vec<EnumConstantDecl>> {
        let mut constants = Vec::new();
        while !self.is_punct(';') && !self.is_punct('}') {
            let position = self.position();
            let annotations = self.annotations()?;
            let (name, _) = self.expect_identifier()?;
            if self.is_punct('(') {
                self.skip_balanced('(', ')')?;
            }
            if self.is_punct('{') {
                self.skip_balanced('{', '}')?;
            }
            constants.push(EnumConstantDecl {
                name,
                annotations,
                position,
            });
            if !self.eat_punct(',') {
                break;
            }
        }
        self.eat_punct(';');
        Ok(constants)
    }

    /// Members up to and including the closing brace. Errors inside one member
    /// are recorded and parsing resumes at the next member.
    fn members(&mut self, enclosing: &str) -> PResult<Vec<Member>> {
        let mut members = Vec::new();
        loop {
            if self.eat_punct('}') {
                return Ok(members);
            }
            if self.at_eof() {
                return Err(self.unexpected("'}'"));
            }
            match self.member(enclosing) {
                Ok(Some(member)) => members.push(member),
                Ok(None) => {}
                Err(error) => {
                    self.errors.push(error);
                    self.recover_member();
                }
            }
        }
    }

    fn recover_member(&mut self) {
        let mut depth = 0usize;
        loop {
            match self.peek().kind {
                TokenKind::Eof => return,
                TokenKind::Punct('{') => depth += 1,
                TokenKind::Punct('}') => {
                    if depth == 0 {
                        return;
                    }
                    depth -= 1;
                    if depth == 0 {
                        self.advance();
                        return;
                    }
                }
                TokenKind::Punct(';') if depth == 0 => {
                    self.advance();
                    return;
                }
                _ => {}
            }
            self.advance();
        }
    }

    fn member(&mut self, enclosing: &str) -> PResult<Option<Member>> {
        if self.eat_punct(';') {
            return Ok(None);
        }
        if self.is_punct('{') || (self.is_keyword("static") && self.is_punct_at(1, '{')) {
            self.eat_keyword("static");
            self.skip_balanced('{', '}')?;
            return Ok(None);
        }
        let position = self.position();
        let (modifiers, annotations) = self.modifiers()?;
        if self.is_type_declaration_start() {
            let decl = self.type_declaration_rest(position, modifiers, annotations)?;
            return Ok(Some(Member::Type(decl)));
        }
        let type_parameters = if self.is_punct('<') {
            self.type_parameters()?
        } else {
            Vec::new()
        };
        if self.is_identifier_at(0) && self.is_punct_at(1, '{') && self.is_keyword(enclosing) {
            // compact record constructor
            self.advance();
            self.skip_balanced('{', '}')?;
            return Ok(None);
        }
        if self.is_identifier_at(0) && self.is_punct_at(1, '(') {
            let (name, _) = self.expect_identifier()?;
            let method =
                self.method_rest(name, modifiers, annotations, type_parameters, None, position)?;
            return Ok(Some(Member::Method(method)));
        }
        let ty = self.parse_type()?;
        let (name, name_position) = self.expect_identifier()?;
        if self.is_punct('(') {
            let method = self.method_rest(
                name,
                modifiers,
                annotations,
                type_parameters,
                Some(ty),
                position,
            )?;
            return Ok(Some(Member::Method(method)));
        }

        let mut variables = Vec::new();
        let mut current = (name, name_position);
        loop {
            let levels = self.dimension_levels()?;
            variables.push(VariableDecl {
                name: current.0,
                ty: wrap_dimensions(ty.clone(), levels),
                position: current.1,
            });
            if self.eat_punct('=') {
                self.skip_initializer();
            }
            if !self.eat_punct(',') {
                break;
            }
            current = self.expect_identifier()?;
        }
        self.expect_punct(';')?;
        Ok(Some(Member::Field(FieldDecl {
            modifiers,
            annotations,
            variables,
            position,
        })))
    }

    fn method_rest(
        &mut self,
        name: String,
        modifiers: Modifiers,
        annotations: Vec<AnnotationExpr>,
        type_parameters: Vec<TypeParameter>,
        return_type: Option<TypeRef>,
        position: Position,
    ) -> PResult<MethodDecl> {
        self.expect_punct('(')?;
        let mut receiver = None;
        let mut parameters = Vec::new();
        if !self.is_punct(')') {
            loop {
                let start = self.index;
                if let Some(found) = self.receiver_parameter()? {
                    receiver = Some(found);
                } else {
                    self.index = start;
                    parameters.push(self.parameter()?);
                }
                if !self.eat_punct(',') {
                    break;
                }
            }
        }
        self.expect_punct(')')?;
        let return_type = match return_type {
            Some(ty) => {
                let levels = self.dimension_levels()?;
                Some(wrap_dimensions(ty, levels))
            }
            None => None,
        };
        if self.eat_keyword("throws") {
            self.type_list()?;
        }
        if self.eat_keyword("default") {
            self.skip_initializer();
        }
        if self.is_punct('{') {
            self.skip_balanced('{', '}')?;
        } else {
            self.expect_punct(';')?;
        }
        Ok(MethodDecl {
            name,
            modifiers,
            annotations,
            type_parameters,
            return_type,
            receiver,
            parameters,
            position,
        })
    }

    /// `@A Outer this` or `@A Outer Outer.this`; `None` leaves the position unspecified.
    fn receiver_parameter(&mut self) -> PResult<Option<ReceiverParameter>> {
        let (_, annotations) = self.modifiers()?;
        let Ok(ty) = self.parse_type() else {
            return Ok(None);
        };
        if self.eat_keyword("this") {
            return Ok(Some(ReceiverParameter { annotations, ty }));
        }
        if self.is_identifier_at(0) && self.is_punct_at(1, '.') && self.is_keyword_at(2, "this") {
            self.advance();
            self.advance();
            self.advance();
            return Ok(Some(ReceiverParameter { annotations, ty }));
        }
        Ok(None)
    }

    fn parameter(&mut self) -> PResult<Parameter> {
        let position = self.position();
        let (_, annotations) = self.modifiers()?;
        let ty = self.parse_type()?;
        let varargs_annotations = self.annotations()?;
        let is_varargs = if self.peek().kind == TokenKind::Ellipsis {
            self.advance();
            true
        } else {
            if !varargs_annotations.is_empty() {
                return Err(self.unexpected("'[' or '...'"));
            }
            false
        };
        let (name, _) = self.expect_identifier()?;
        let levels = self.dimension_levels()?;
        Ok(Parameter {
            name,
            annotations,
            ty: wrap_dimensions(ty, levels),
            is_varargs,
            varargs_annotations,
            position,
        })
    }

    fn parse_type(&mut self) -> PResult<TypeRef> {
        let position = self.position();
        let mut annotations = self.annotations()?;
        let kind = if self.eat_punct('?') {
            let mut extends = None;
            let mut super_bound = None;
            if self.eat_keyword("extends") {
                extends = Some(Box::new(self.parse_type()?));
            } else if self.eat_keyword("super") {
                super_bound = Some(Box::new(self.parse_type()?));
            }
            TypeRefKind::Wildcard {
                extends,
                super_bound,
            }
        } else {
            let (first, _) = self.expect_identifier()?;
            if first == "void" {
                TypeRefKind::Void
            } else if let Some(primitive) = PrimitiveKind::from_keyword(&first) {
                TypeRefKind::Primitive(primitive)
            } else {
                let mut segments = Vec::new();
                let mut name = first;
                loop {
                    let type_arguments = if self.is_punct('<') {
                        Some(self.type_arguments()?)
                    } else {
                        None
                    };
                    segments.push(ClassSegment {
                        name,
                        type_arguments,
                    });
                    let continues = self.is_punct('.')
                        && (self.is_punct_at(1, '@')
                            || (self.is_identifier_at(1) && !self.is_keyword_at(1, "this")));
                    if !continues {
                        break;
                    }
                    self.advance();
                    annotations.extend(self.annotations()?);
                    name = self.expect_identifier()?.0;
                }
                TypeRefKind::Class(segments)
            }
        };
        let base = TypeRef {
            annotations,
            kind,
            position,
        };
        let levels = self.dimension_levels()?;
        Ok(wrap_dimensions(base, levels))
    }

    fn type_arguments(&mut self) -> PResult<Vec<TypeRef>> {
        self.expect_punct('<')?;
        let mut arguments = Vec::new();
        if self.eat_punct('>') {
            return Ok(arguments);
        }
        loop {
            arguments.push(self.parse_type()?);
            if !self.eat_punct(',') {
                break;
            }
        }
        self.expect_punct('>')?;
        Ok(arguments)
    }

    /// `@A [] @B []` in written order. Annotations not followed by `[]` are left unread.
    fn dimension_levels(&mut self) -> PResult<Vec<(Vec<AnnotationExpr>, Position)>> {
        let mut levels = Vec::new();
        loop {
            let start = self.index;
            let annotations = self.annotations()?;
            if self.is_punct('[') && self.is_punct_at(1, ']') {
                let position = self.advance().position;
                self.advance();
                levels.push((annotations, position));
            } else {
                self.index = start;
                return Ok(levels);
            }
        }
    }

    fn skip_balanced(&mut self, open: char, close: char) -> PResult<()> {
        self.expect_punct(open)?;
        let mut depth = 1usize;
        while depth > 0 {
            match self.advance().kind {
                TokenKind::Punct(ch) if ch == open => depth += 1,
                TokenKind::Punct(ch) if ch == close => depth -= 1,
                TokenKind::Eof => return Err(self.unexpected(&format!("'{close}'"))),
                _ => {}
            }
        }
        Ok(())
    }

    /// Skip an initializer or default value up to `,` or `;` outside any brackets.
    fn skip_initializer(&mut self) {
        let mut depth = 0usize;
        loop {
            match self.peek().kind {
                TokenKind::Eof => return,
                TokenKind::Punct('(' | '[' | '{') => depth += 1,
                TokenKind::Punct(')' | ']' | '}') => {
                    if depth == 0 {
                        return;
                    }
                    depth -= 1;
                }
                TokenKind::Punct(',' | ';') if depth == 0 => return,
                _ => {}
            }
            self.advance();
        }
    }
}

/// Wrap `base` in array levels; the first level becomes the outermost array.
fn wrap_dimensions(base: TypeRef, levels: Vec<(Vec<AnnotationExpr>, Position)>) -> TypeRef {
    let mut ty = base;
    for (annotations, position) in levels.into_iter().rev() {
        ty = TypeRef {
            annotations,
            kind: TypeRefKind::Array(Box::new(ty)),
            position,
        };
    }
    ty
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> OverlayFile {
        parse_overlay(text).expect("parse overlay")
    }

    fn only_type(file: &OverlayFile) -> &TypeDecl {
        &file.units[0].types[0]
    }

    #[test]
    fn parses_package_imports_and_members() {
        let file = parse(
            "package java.util;\n\
             import stubweave.qual.*;\n\
             import static java.lang.Integer.MAX_VALUE;\n\
             public interface List<E> extends Collection<E> {\n\
               @Pure int size();\n\
               E get(int index) throws IndexOutOfBoundsException;\n\
               <T> T[] toArray(T @NonNull [] a) { return null; }\n\
             }\n",
        );

        let unit = &file.units[0];
        assert_eq!(unit.package.as_ref().map(|p| p.name.as_str()), Some("java.util"));
        assert!(unit.imports[0].is_wildcard);
        assert!(unit.imports[1].is_static);
        assert_eq!(unit.imports[1].name, "java.lang.Integer.MAX_VALUE");

        let list = only_type(&file);
        assert_eq!(list.kind, TypeDeclKind::Interface);
        assert_eq!(list.type_parameters[0].name, "E");
        assert_eq!(list.extends[0].class_name().as_deref(), Some("Collection"));
        assert_eq!(list.members.len(), 3);
        let Member::Method(size) = &list.members[0] else {
            panic!("method");
        };
        assert_eq!(size.annotations[0].name, "Pure");
        let Member::Method(to_array) = &list.members[2] else {
            panic!("method");
        };
        assert_eq!(to_array.type_parameters.len(), 1);
        assert_eq!(to_array.parameters[0].ty.annotations[0].name, "NonNull");
    }

    #[test]
    fn array_brackets_map_outer_to_inner() {
        let file = parse("class A { @X int @Y [] @Z [] f; }");
        let Member::Field(field) = &only_type(&file).members[0] else {
            panic!("field");
        };
        let ty = &field.variables[0].ty;

        assert_eq!(field.annotations[0].name, "X");
        assert_eq!(ty.annotations[0].name, "Y");
        let TypeRefKind::Array(inner) = &ty.kind else {
            panic!("array");
        };
        assert_eq!(inner.annotations[0].name, "Z");
        assert_eq!(ty.array_depth(), 2);
    }

    #[test]
    fn declarator_brackets_are_outer_dimensions() {
        let file = parse("class A { String @B [] f @C [], g; }");
        let Member::Field(field) = &only_type(&file).members[0] else {
            panic!("field");
        };

        let f = &field.variables[0].ty;
        assert_eq!(f.array_depth(), 2);
        assert_eq!(f.annotations[0].name, "C");
        assert_eq!(field.variables[1].ty.array_depth(), 1);
    }

    #[test]
    fn parses_varargs_and_receiver() {
        let file = parse(
            "class A {\n\
               void log(@Readonly A this, String fmt, Object @V ... args);\n\
             }",
        );
        let Member::Method(log) = &only_type(&file).members[0] else {
            panic!("method");
        };

        let receiver = log.receiver.as_ref().expect("receiver");
        assert_eq!(receiver.annotations[0].name, "Readonly");
        assert_eq!(log.parameters.len(), 2);
        assert!(log.parameters[1].is_varargs);
        assert_eq!(log.parameters[1].varargs_annotations[0].name, "V");
        assert_eq!(log.parameters[1].ty.class_name().as_deref(), Some("Object"));
    }

    #[test]
    fn parses_annotation_arguments() {
        let file = parse(
            "@Range(from = -1, to = Integer.MAX_VALUE) @Names({\"a\", \"b\",}) @Kind(String[].class)\n\
             class A {}",
        );
        let decl = only_type(&file);

        let range = &decl.annotations[0];
        assert_eq!(range.arguments.len(), 2);
        assert!(matches!(
            &range.arguments[0].value,
            Expr::Unary { operator: '-', .. }
        ));
        assert!(matches!(&range.arguments[1].value, Expr::Name { name, .. } if name == "Integer.MAX_VALUE"));
        assert!(matches!(&decl.annotations[1].arguments[0].value, Expr::Array { values, .. } if values.len() == 2));
        let Expr::ClassLiteral { ty, .. } = &decl.annotations[2].arguments[0].value else {
            panic!("class literal");
        };
        assert_eq!(ty.array_depth(), 1);
    }

    #[test]
    fn skips_bodies_initializers_and_enum_arguments() {
        let file = parse(
            "enum Mode {\n\
               @Deprecated FAST(1) { void run() {} }, SLOW(2);\n\
               private final int weight = compute(1, 2);\n\
               static { init(); }\n\
               Mode(int weight) { this.weight = weight; }\n\
             }",
        );
        let mode = only_type(&file);

        assert_eq!(mode.kind, TypeDeclKind::Enum);
        assert_eq!(mode.enum_constants.len(), 2);
        assert_eq!(mode.enum_constants[0].annotations[0].name, "Deprecated");
        assert_eq!(mode.members.len(), 2);
        let Member::Method(constructor) = &mode.members[1] else {
            panic!("constructor");
        };
        assert!(constructor.is_constructor());
    }

    #[test]
    fn several_package_clauses_start_new_units() {
        let file = parse("package a; class A {} package b; class B {} ;");

        assert_eq!(file.units.len(), 2);
        assert_eq!(file.units[1].package.as_ref().map(|p| p.name.as_str()), Some("b"));
        assert_eq!(file.units[1].types.len(), 2);
        assert_eq!(file.units[1].types[1].kind, TypeDeclKind::Empty);
    }

    #[test]
    fn nested_generics_close_with_adjacent_brackets() {
        let file = parse("class A { Map<String, List<@X ? extends Number>> m; }");
        let Member::Field(field) = &only_type(&file).members[0] else {
            panic!("field");
        };
        let arguments = field.variables[0].ty.type_arguments().expect("arguments");
        let inner = arguments[1].type_arguments().expect("inner");

        assert!(inner[0].is_wildcard());
        assert_eq!(inner[0].annotations[0].name, "X");
    }

    #[test]
    fn collects_errors_from_several_members() {
        let failure = parse_overlay("class A {\n int = ;\n void ok();\n String (;\n}").expect_err("failure");

        assert_eq!(failure.errors.len(), 2);
        assert_eq!(failure.errors[0].position.line, 2);
        assert!(failure.to_string().starts_with("2:"));
    }

    #[test]
    fn annotation_type_declarations_parse() {
        let file = parse("@interface Marker { int value() default 3; String[] names() default {}; }");
        let marker = only_type(&file);

        assert_eq!(marker.kind, TypeDeclKind::Annotation);
        assert_eq!(marker.members.len(), 2);
    }

    #[test]
    fn record_headers_keep_their_components() {
        let file = parse(
            "record Pair<T>(@Nullable T first, String @NonNull ... rest) implements Cloneable {\n\
               Pair { }\n\
               T first();\n\
             }",
        );
        let pair = only_type(&file);

        assert_eq!(pair.kind, TypeDeclKind::Class);
        assert_eq!(pair.implements.len(), 1);
        assert_eq!(pair.record_components.len(), 2);
        assert_eq!(pair.record_components[0].name, "first");
        assert_eq!(pair.record_components[0].annotations[0].name, "Nullable");
        assert!(pair.record_components[1].is_varargs);
        assert_eq!(pair.record_components[1].varargs_annotations[0].name, "NonNull");
        assert_eq!(pair.members.len(), 1);
    }

    #[test]
    fn empty_record_headers_parse() {
        let file = parse("record Unit() {}");

        assert!(only_type(&file).record_components.is_empty());
    }
}
