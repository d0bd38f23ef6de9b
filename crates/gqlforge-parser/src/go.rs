//! Shallow Go declaration extraction
//!
//! Parses the top-level declarations of a package's source files and keeps
//! what type synthesis needs: exported type declarations with their fields
//! and methods. Expressions and function bodies are skipped wholesale, and
//! every type expression is reduced to a canonical string form.

use std::collections::BTreeMap;

use gqlforge_core::naming::is_exported;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::error::ParserError;
use crate::fetch::FileContent;
use crate::go_lexer::{tokenize, SyntaxError, Token, TokenKind};

/// What a type declaration's right-hand side is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    Struct,
    Interface,
    /// Defined from a (possibly qualified) type name
    Alias,
    /// Anything else; the expression is kept in `underlying`
    Basic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    pub tag: String,
    pub embedded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParamInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MethodInfo {
    pub name: String,
    pub params: Vec<ParamInfo>,
    pub results: Vec<ParamInfo>,
    /// First parameter is `context.Context`
    pub has_context: bool,
}

impl MethodInfo {
    pub fn new(name: impl Into<String>, params: Vec<ParamInfo>, results: Vec<ParamInfo>) -> Self {
        let has_context = params
            .first()
            .map(|p| p.ty == "context.Context" || p.ty == "Context")
            .unwrap_or(false);
        Self {
            name: name.into(),
            params,
            results,
            has_context,
        }
    }
}

/// One exported type declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeInfo {
    pub name: String,
    pub package: String,
    pub import_path: String,
    pub kind: TypeKind,
    pub fields: Vec<FieldInfo>,
    pub methods: Vec<MethodInfo>,
    pub underlying: String,
}

/// Declarations extracted from every file of one package
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PackageTypes {
    pub name: String,
    pub import_path: String,
    pub types: BTreeMap<String, TypeInfo>,
}

impl PackageTypes {
    pub fn get(&self, name: &str) -> Option<&TypeInfo> {
        self.types.get(name)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Extracts exported type declarations from Go source text
#[derive(Debug, Clone, Default)]
pub struct GoSourceExtractor;

impl GoSourceExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Parse all files of a package
    ///
    /// A syntax error in any file fails the whole package; no partial
    /// results are returned.
    #[instrument(skip(self, files), fields(files = files.len()), level = "debug")]
    pub fn extract_package(
        &self,
        import_path: &str,
        files: &[FileContent],
    ) -> Result<PackageTypes, ParserError> {
        let mut pkg = PackageTypes {
            import_path: import_path.to_string(),
            ..Default::default()
        };
        let mut methods = Vec::new();

        for file in files {
            let decls = parse_file(&file.content).map_err(|e| ParserError::SourceParseFailed {
                path: file.path.clone(),
                line: e.line,
                message: e.message,
            })?;
            if pkg.name.is_empty() {
                pkg.name = decls.package.clone();
            }

            for decl in decls.types {
                if !is_exported(&decl.name) {
                    continue;
                }
                let info = type_info(decl, &pkg.name, import_path);
                pkg.types.insert(info.name.clone(), info);
            }
            methods.extend(decls.methods);
        }

        // Receivers may be declared in a different file than their type
        for (receiver, method) in methods {
            if !is_exported(&method.name) {
                continue;
            }
            match pkg.types.get_mut(&receiver) {
                Some(info) => info.methods.push(method),
                None => debug!(receiver = %receiver, method = %method.name, "dropping method of unknown type"),
            }
        }

        debug!(package = %pkg.name, types = pkg.types.len(), "extracted package");
        Ok(pkg)
    }
}

fn type_info(decl: TypeDecl, package: &str, import_path: &str) -> TypeInfo {
    let mut info = TypeInfo {
        name: decl.name,
        package: package.to_string(),
        import_path: import_path.to_string(),
        kind: TypeKind::Basic,
        fields: Vec::new(),
        methods: Vec::new(),
        underlying: String::new(),
    };
    match decl.ty {
        TypeExpr::Struct(fields) => {
            info.kind = TypeKind::Struct;
            info.fields = fields;
        }
        TypeExpr::Interface { methods, .. } => {
            info.kind = TypeKind::Interface;
            info.methods = methods;
        }
        ty @ (TypeExpr::Name(_) | TypeExpr::Qualified(..)) => {
            info.kind = TypeKind::Alias;
            info.underlying = ty.render();
        }
        ty => info.underlying = ty.render(),
    }
    info
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TypeExpr {
    Name(String),
    Qualified(String, String),
    /// Instantiation of a generic type, arguments dropped
    Generic(Box<TypeExpr>),
    Pointer(Box<TypeExpr>),
    Slice(Box<TypeExpr>),
    Array(String, Box<TypeExpr>),
    Map(Box<TypeExpr>, Box<TypeExpr>),
    Chan(Box<TypeExpr>),
    Func,
    Interface { methods: Vec<MethodInfo>, elements: usize },
    Struct(Vec<FieldInfo>),
    Ellipsis(Box<TypeExpr>),
}

impl TypeExpr {
    fn render(&self) -> String {
        match self {
            TypeExpr::Name(name) => name.clone(),
            TypeExpr::Qualified(pkg, name) => format!("{}.{}", pkg, name),
            TypeExpr::Generic(base) => format!("{}[...]", base.render()),
            TypeExpr::Pointer(elem) => format!("*{}", elem.render()),
            TypeExpr::Slice(elem) => format!("[]{}", elem.render()),
            TypeExpr::Array(len, elem) => format!("[{}]{}", len, elem.render()),
            TypeExpr::Map(key, value) => format!("map[{}]{}", key.render(), value.render()),
            TypeExpr::Chan(elem) => format!("chan {}", elem.render()),
            TypeExpr::Func => "func(...)".to_string(),
            TypeExpr::Interface { elements: 0, .. } => "interface{}".to_string(),
            TypeExpr::Interface { .. } => "interface{...}".to_string(),
            TypeExpr::Struct(_) => "struct{...}".to_string(),
            TypeExpr::Ellipsis(elem) => format!("...{}", elem.render()),
        }
    }

    /// Identifier a receiver or embedded field is named after
    fn base_name(&self) -> Option<&str> {
        match self {
            TypeExpr::Name(name) | TypeExpr::Qualified(_, name) => Some(name),
            TypeExpr::Generic(base) | TypeExpr::Pointer(base) => base.base_name(),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct TypeDecl {
    name: String,
    ty: TypeExpr,
}

#[derive(Debug, Default)]
struct FileDecls {
    package: String,
    types: Vec<TypeDecl>,
    methods: Vec<(String, MethodInfo)>,
}

type Params = Vec<(Option<String>, TypeExpr)>;

fn parse_file(source: &str) -> Result<FileDecls, SyntaxError> {
    let tokens = tokenize(source)?;
    Parser { tokens, pos: 0 }.file()
}

fn params_info(params: Params) -> Vec<ParamInfo> {
    params
        .into_iter()
        .map(|(name, ty)| ParamInfo {
            name: name.unwrap_or_default(),
            ty: ty.render(),
        })
        .collect()
}

fn unquote_tag(tok: &Token) -> String {
    match tok.kind {
        TokenKind::RawString => tok.text.trim_matches('`').to_string(),
        _ => {
            let inner = tok
                .text
                .strip_prefix('"')
                .and_then(|s| s.strip_suffix('"'))
                .unwrap_or(&tok.text);
            inner.replace("\\\"", "\"").replace("\\\\", "\\")
        }
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.pos + offset).min(last)]
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if tok.kind != TokenKind::Eof {
            self.pos += 1;
        }
        tok
    }

    fn at_op(&self, op: &str) -> bool {
        self.peek().is_op(op)
    }

    fn at_semi(&self) -> bool {
        self.peek().kind == TokenKind::Semi
    }

    fn skip_semis(&mut self) {
        while self.at_semi() {
            self.advance();
        }
    }

    fn error_at(&self, tok: &Token, expected: &str) -> SyntaxError {
        let found = match tok.kind {
            TokenKind::Eof => "EOF".to_string(),
            TokenKind::Semi if tok.text == "\n" => "newline".to_string(),
            _ => format!("'{}'", tok.text),
        };
        SyntaxError {
            line: tok.line,
            message: format!("expected {}, found {}", expected, found),
        }
    }

    fn unexpected(&self, expected: &str) -> SyntaxError {
        self.error_at(self.peek(), expected)
    }

    fn expect_op(&mut self, op: &str) -> Result<(), SyntaxError> {
        if self.at_op(op) {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{}'", op)))
        }
    }

    fn expect_ident(&mut self) -> Result<String, SyntaxError> {
        let tok = self.peek();
        if tok.kind == TokenKind::Ident && !tok.is_keyword() {
            Ok(self.advance().text)
        } else {
            Err(self.unexpected("identifier"))
        }
    }

    fn expect_terminator(&mut self) -> Result<(), SyntaxError> {
        match self.peek().kind {
            TokenKind::Semi => {
                self.advance();
                Ok(())
            }
            TokenKind::Eof => Ok(()),
            _ => Err(self.unexpected("';'")),
        }
    }

    /// Index of the bracket closing the one at `offset`
    fn matching_close(&self, offset: usize) -> Option<usize> {
        let mut depth = 0usize;
        let mut i = self.pos + offset;
        while let Some(tok) = self.tokens.get(i) {
            match tok.kind {
                TokenKind::Eof => return None,
                TokenKind::Op => match tok.text.as_str() {
                    "(" | "[" | "{" => depth += 1,
                    ")" | "]" | "}" => {
                        depth = depth.saturating_sub(1);
                        if depth == 0 {
                            return Some(i);
                        }
                    }
                    _ => {}
                },
                _ => {}
            }
            i += 1;
        }
        None
    }

    /// Skip a bracketed group starting at the current token
    fn skip_balanced(&mut self) -> Result<(), SyntaxError> {
        match self.matching_close(0) {
            Some(close) => {
                self.pos = close + 1;
                Ok(())
            }
            None => {
                let open = self.peek().text.clone();
                Err(SyntaxError {
                    line: self.peek().line,
                    message: format!("unclosed '{}'", open),
                })
            }
        }
    }

    /// Skip tokens up to a `;` or closing `}` at the current nesting level
    fn skip_element(&mut self) -> Result<(), SyntaxError> {
        loop {
            let tok = self.peek();
            match tok.kind {
                TokenKind::Semi => return Ok(()),
                TokenKind::Eof => return Err(self.unexpected("';'")),
                TokenKind::Op if tok.text == "}" || tok.text == ")" => return Ok(()),
                TokenKind::Op if matches!(tok.text.as_str(), "(" | "[" | "{") => {
                    self.skip_balanced()?
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    /// Token after the bracket group at `offset`
    fn after_group(&self, offset: usize) -> Option<&Token> {
        self.matching_close(offset).and_then(|i| self.tokens.get(i + 1))
    }

    fn file(mut self) -> Result<FileDecls, SyntaxError> {
        self.skip_semis();
        if !self.peek().is_ident("package") {
            return Err(self.unexpected("'package'"));
        }
        self.advance();
        let mut decls = FileDecls {
            package: self.expect_ident()?,
            ..Default::default()
        };
        self.expect_terminator()?;

        loop {
            self.skip_semis();
            let tok = self.peek();
            if tok.kind == TokenKind::Eof {
                break;
            }
            match (tok.kind, tok.text.as_str()) {
                (TokenKind::Ident, "import" | "const" | "var") => {
                    self.advance();
                    if self.at_op("(") {
                        self.skip_balanced()?;
                    } else {
                        self.skip_element()?;
                    }
                    self.expect_terminator()?;
                }
                (TokenKind::Ident, "type") => {
                    self.advance();
                    self.type_decl(&mut decls)?;
                }
                (TokenKind::Ident, "func") => {
                    self.advance();
                    self.func_decl(&mut decls)?;
                }
                _ => return Err(self.unexpected("declaration")),
            }
        }
        Ok(decls)
    }

    fn type_decl(&mut self, decls: &mut FileDecls) -> Result<(), SyntaxError> {
        if !self.at_op("(") {
            self.type_spec(decls)?;
            return self.expect_terminator();
        }
        self.advance();
        loop {
            self.skip_semis();
            if self.at_op(")") {
                self.advance();
                break;
            }
            self.type_spec(decls)?;
            if self.at_semi() {
                self.advance();
            } else if !self.at_op(")") {
                return Err(self.unexpected("';' or ')'"));
            }
        }
        self.expect_terminator()
    }

    fn type_spec(&mut self, decls: &mut FileDecls) -> Result<(), SyntaxError> {
        let name = self.expect_ident()?;
        if self.at_op("[") && self.starts_type_params() {
            self.skip_balanced()?;
        }
        if self.at_op("=") {
            self.advance();
        }
        let ty = self.parse_type()?;
        decls.types.push(TypeDecl { name, ty });
        Ok(())
    }

    /// `[T any]` versus an array length such as `[N]`
    fn starts_type_params(&self) -> bool {
        let first = self.peek_at(1);
        let second = self.peek_at(2);
        first.kind == TokenKind::Ident
            && !first.is_keyword()
            && (second.kind == TokenKind::Ident || second.is_op(",") || second.is_op("~"))
    }

    fn func_decl(&mut self, decls: &mut FileDecls) -> Result<(), SyntaxError> {
        let receiver = if self.at_op("(") {
            Some(self.parse_params()?)
        } else {
            None
        };
        let name = self.expect_ident()?;
        if self.at_op("[") {
            self.skip_balanced()?;
        }
        let (params, results) = self.signature()?;
        if self.at_op("{") {
            self.skip_balanced()?;
        }
        self.expect_terminator()?;

        let base = receiver
            .as_ref()
            .and_then(|recv| recv.first())
            .and_then(|(_, ty)| ty.base_name())
            .map(str::to_string);
        if let Some(base) = base {
            let method = MethodInfo::new(name, params_info(params), params_info(results));
            decls.methods.push((base, method));
        }
        Ok(())
    }

    fn signature(&mut self) -> Result<(Params, Params), SyntaxError> {
        let params = self.parse_params()?;
        let results = if self.at_op("(") {
            self.parse_params()?
        } else if self.starts_type() {
            vec![(None, self.parse_type()?)]
        } else {
            Vec::new()
        };
        Ok((params, results))
    }

    fn starts_type(&self) -> bool {
        let tok = self.peek();
        match tok.kind {
            TokenKind::Ident => {
                !tok.is_keyword()
                    || matches!(tok.text.as_str(), "map" | "chan" | "func" | "interface" | "struct")
            }
            TokenKind::Op => matches!(tok.text.as_str(), "*" | "[" | "<-"),
            _ => false,
        }
    }

    fn parse_params(&mut self) -> Result<Params, SyntaxError> {
        let line = self.peek().line;
        self.expect_op("(")?;
        let mut entries = Vec::new();
        loop {
            if self.at_op(")") {
                self.advance();
                break;
            }
            entries.push(self.param_entry()?);
            if self.at_op(",") {
                self.advance();
                continue;
            }
            self.expect_op(")")?;
            break;
        }

        if entries.iter().all(|(name, _)| name.is_none()) {
            return Ok(entries);
        }

        // `a, b int` declares both names with the type that follows them
        let mut grouped = Vec::with_capacity(entries.len());
        let mut pending: Option<TypeExpr> = None;
        for (name, ty) in entries.into_iter().rev() {
            match (name, ty, &pending) {
                (Some(name), ty, _) => {
                    pending = Some(ty.clone());
                    grouped.push((Some(name), ty));
                }
                (None, TypeExpr::Name(name), Some(shared)) => {
                    grouped.push((Some(name), shared.clone()));
                }
                _ => {
                    return Err(SyntaxError {
                        line,
                        message: "mixed named and unnamed parameters".to_string(),
                    })
                }
            }
        }
        grouped.reverse();
        Ok(grouped)
    }

    fn param_entry(&mut self) -> Result<(Option<String>, TypeExpr), SyntaxError> {
        let tok = self.peek();
        if tok.kind == TokenKind::Ident && !tok.is_keyword() {
            let next = self.peek_at(1);
            let named = match next.kind {
                TokenKind::Ident => true,
                TokenKind::Op => match next.text.as_str() {
                    "*" | "..." | "<-" => true,
                    // `xs []int` names a parameter, `List[int]` instantiates a type
                    "[" => !matches!(self.after_group(1), Some(t) if t.is_op(",") || t.is_op(")")),
                    _ => false,
                },
                _ => false,
            };
            if named {
                let name = self.advance().text;
                return Ok((Some(name), self.parse_type()?));
            }
        }
        Ok((None, self.parse_type()?))
    }

    fn parse_type(&mut self) -> Result<TypeExpr, SyntaxError> {
        let tok = self.advance();
        match tok.kind {
            TokenKind::Ident => match tok.text.as_str() {
                "map" => {
                    self.expect_op("[")?;
                    let key = self.parse_type()?;
                    self.expect_op("]")?;
                    let value = self.parse_type()?;
                    Ok(TypeExpr::Map(Box::new(key), Box::new(value)))
                }
                "chan" => {
                    if self.at_op("<-") {
                        self.advance();
                    }
                    Ok(TypeExpr::Chan(Box::new(self.parse_type()?)))
                }
                "func" => {
                    self.signature()?;
                    Ok(TypeExpr::Func)
                }
                "interface" => self.interface_body(),
                "struct" => self.struct_body(),
                _ if tok.is_keyword() => Err(self.error_at(&tok, "type")),
                _ => {
                    let mut ty = TypeExpr::Name(tok.text);
                    if self.at_op(".") {
                        self.advance();
                        let selector = self.expect_ident()?;
                        if let TypeExpr::Name(pkg) = ty {
                            ty = TypeExpr::Qualified(pkg, selector);
                        }
                    }
                    if self.at_op("[") {
                        self.skip_balanced()?;
                        ty = TypeExpr::Generic(Box::new(ty));
                    }
                    Ok(ty)
                }
            },
            TokenKind::Op => match tok.text.as_str() {
                "*" => Ok(TypeExpr::Pointer(Box::new(self.parse_type()?))),
                "[" => {
                    if self.at_op("]") {
                        self.advance();
                        return Ok(TypeExpr::Slice(Box::new(self.parse_type()?)));
                    }
                    let len = self.array_len()?;
                    Ok(TypeExpr::Array(len, Box::new(self.parse_type()?)))
                }
                "<-" => {
                    if !self.peek().is_ident("chan") {
                        return Err(self.unexpected("'chan'"));
                    }
                    self.advance();
                    Ok(TypeExpr::Chan(Box::new(self.parse_type()?)))
                }
                "(" => {
                    let inner = self.parse_type()?;
                    self.expect_op(")")?;
                    Ok(inner)
                }
                "..." => Ok(TypeExpr::Ellipsis(Box::new(self.parse_type()?))),
                _ => Err(self.error_at(&tok, "type")),
            },
            _ => Err(self.error_at(&tok, "type")),
        }
    }

    /// Length expression of an array type, up to and including the `]`
    fn array_len(&mut self) -> Result<String, SyntaxError> {
        let mut len = String::new();
        let mut depth = 0usize;
        loop {
            let tok = self.advance();
            match tok.kind {
                TokenKind::Eof | TokenKind::Semi => return Err(self.error_at(&tok, "']'")),
                TokenKind::Op if tok.text == "]" && depth == 0 => return Ok(len),
                TokenKind::Op if matches!(tok.text.as_str(), "(" | "[") => depth += 1,
                TokenKind::Op if matches!(tok.text.as_str(), ")" | "]") => {
                    depth = depth.saturating_sub(1)
                }
                _ => {}
            }
            len.push_str(&tok.text);
        }
    }

    fn struct_body(&mut self) -> Result<TypeExpr, SyntaxError> {
        self.expect_op("{")?;
        let mut fields = Vec::new();
        loop {
            self.skip_semis();
            if self.at_op("}") {
                self.advance();
                break;
            }
            self.field_decl(&mut fields)?;
            if self.at_semi() {
                self.advance();
            } else if !self.at_op("}") {
                return Err(self.unexpected("';' or '}'"));
            }
        }
        Ok(TypeExpr::Struct(fields))
    }

    fn is_embedded_field(&self) -> bool {
        let tok = self.peek();
        if tok.is_op("*") {
            return true;
        }
        if tok.kind != TokenKind::Ident || tok.is_keyword() {
            return false;
        }
        let ends_field = |t: &Token| {
            matches!(t.kind, TokenKind::Semi | TokenKind::String | TokenKind::RawString)
                || t.is_op("}")
        };
        let next = self.peek_at(1);
        if next.is_op(".") || ends_field(next) {
            return true;
        }
        next.is_op("[") && self.after_group(1).map(ends_field).unwrap_or(false)
    }

    fn field_tag(&mut self) -> String {
        match self.peek().kind {
            TokenKind::String | TokenKind::RawString => unquote_tag(&self.advance()),
            _ => String::new(),
        }
    }

    fn field_decl(&mut self, fields: &mut Vec<FieldInfo>) -> Result<(), SyntaxError> {
        if self.is_embedded_field() {
            let ty = self.parse_type()?;
            let tag = self.field_tag();
            let rendered = ty.render();
            fields.push(FieldInfo {
                name: ty.base_name().map(str::to_string).unwrap_or_else(|| rendered.clone()),
                ty: rendered,
                tag,
                embedded: true,
            });
            return Ok(());
        }

        let mut names = vec![self.expect_ident()?];
        while self.at_op(",") {
            self.advance();
            names.push(self.expect_ident()?);
        }
        let ty = self.parse_type()?.render();
        let tag = self.field_tag();
        fields.extend(names.into_iter().filter(|n| is_exported(n)).map(|name| FieldInfo {
            name,
            ty: ty.clone(),
            tag: tag.clone(),
            embedded: false,
        }));
        Ok(())
    }

    fn interface_body(&mut self) -> Result<TypeExpr, SyntaxError> {
        self.expect_op("{")?;
        let mut methods = Vec::new();
        let mut elements = 0;
        loop {
            self.skip_semis();
            if self.at_op("}") {
                self.advance();
                break;
            }
            elements += 1;
            let tok = self.peek();
            if tok.kind == TokenKind::Ident && !tok.is_keyword() && self.peek_at(1).is_op("(") {
                let name = self.advance().text;
                let (params, results) = self.signature()?;
                if is_exported(&name) {
                    methods.push(MethodInfo::new(name, params_info(params), params_info(results)));
                }
            } else {
                // embedded interfaces and type sets
                self.skip_element()?;
            }
            if self.at_semi() {
                self.advance();
            } else if !self.at_op("}") {
                return Err(self.unexpected("';' or '}'"));
            }
        }
        Ok(TypeExpr::Interface { methods, elements })
    }
}
