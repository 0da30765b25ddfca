//! Datalog IR: typed records, relations, rules and fold functions.
//!
//! Everything the compiler produces is first built as these values and only
//! turned into program text by their `Display` impls, which the
//! [`code_generator`](crate::code_generator) stitches together.

use std::fmt;

// ============================================================================
// Types
// ============================================================================

/// A type in the target dialect
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DlType {
    Bool,
    /// `signed<N>`
    Signed(u16),
    Float,
    Double,
    String,
    /// `Option<T>`
    Option(Box<DlType>),
    /// Generated or catalog record type
    Named(String),
    /// `()`
    Unit,
    /// `(A, B, ...)`
    Tuple(Vec<DlType>),
    /// `Group<K, V>`
    Group(Box<DlType>, Box<DlType>),
}

impl DlType {
    /// `Option<self>`
    pub fn optional(self) -> DlType {
        DlType::Option(Box::new(self))
    }
}

impl fmt::Display for DlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DlType::Bool => write!(f, "bool"),
            DlType::Signed(width) => write!(f, "signed<{width}>"),
            DlType::Float => write!(f, "float"),
            DlType::Double => write!(f, "double"),
            DlType::String => write!(f, "string"),
            DlType::Option(inner) => write!(f, "Option<{inner}>"),
            DlType::Named(name) => write!(f, "{name}"),
            DlType::Unit => write!(f, "()"),
            DlType::Tuple(items) => {
                write!(f, "(")?;
                write_separated(f, items, ", ")?;
                write!(f, ")")
            }
            DlType::Group(key, value) => write!(f, "Group<{key}, {value}>"),
        }
    }
}

/// Field of a record type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub ty: DlType,
}

/// `typedef N = N{a:T, b:U}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDecl {
    pub name: String,
    pub fields: Vec<Field>,
}

impl fmt::Display for TypeDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "typedef {} = {}{{", self.name, self.name)?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}:{}", field.name, field.ty)?;
        }
        write!(f, "}}")
    }
}

// ============================================================================
// Relations
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationRole {
    /// Catalog table, fed by the host
    Input,
    /// Temporary relation invisible to the query author
    Internal,
    /// The view being compiled
    Output,
}

/// `[input |output ]relation R[T]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDecl {
    pub name: String,
    pub role: RelationRole,
    pub element_type: String,
}

impl fmt::Display for RelationDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.role {
            RelationRole::Input => write!(f, "input ")?,
            RelationRole::Output => write!(f, "output ")?,
            RelationRole::Internal => {}
        }
        write!(f, "relation {}[{}]", self.name, self.element_type)
    }
}

// ============================================================================
// Patterns and expressions
// ============================================================================

/// Binding pattern inside an atom
#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    Var(String),
    Wildcard,
    /// `T{.f = p,.g = q}`
    Record {
        type_name: String,
        fields: Vec<(String, Pattern)>,
    },
    /// `Some{.x = p}`
    Some(Box<Pattern>),
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Var(name) => write!(f, "{name}"),
            Pattern::Wildcard => write!(f, "_"),
            Pattern::Record { type_name, fields } => {
                write!(f, "{type_name}{{")?;
                for (i, (name, pat)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, ".{name} = {pat}")?;
                }
                write!(f, "}}")
            }
            Pattern::Some(inner) => write!(f, "Some{{.x = {inner}}}"),
        }
    }
}

/// Literal constant in the target dialect
#[derive(Debug, Clone, PartialEq)]
pub enum DlLiteral {
    Bool(bool),
    /// `64'sd5`
    Signed { width: u16, value: i64 },
    /// `64'f1.5`
    Float { width: u16, value: f64 },
    String(String),
}

impl fmt::Display for DlLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DlLiteral::Bool(b) => write!(f, "{b}"),
            DlLiteral::Signed { width, value } if *value < 0 => {
                write!(f, "-{width}'sd{}", value.unsigned_abs())
            }
            DlLiteral::Signed { width, value } => write!(f, "{width}'sd{value}"),
            DlLiteral::Float { width, value } if value.is_sign_negative() => {
                write!(f, "-{width}'f{:?}", -value)
            }
            DlLiteral::Float { width, value } => write!(f, "{width}'f{value:?}"),
            DlLiteral::String(s) => {
                write!(f, "\"")?;
                for c in s.chars() {
                    match c {
                        '"' => write!(f, "\\\"")?,
                        '\\' => write!(f, "\\\\")?,
                        '\n' => write!(f, "\\n")?,
                        c => write!(f, "{c}")?,
                    }
                }
                write!(f, "\"")
            }
        }
    }
}

/// Plain (non null-aware) binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DlBinOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    And,
    Or,
    Plus,
    Minus,
    Mult,
    Div,
    Mod,
    Concat,
}

impl DlBinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            DlBinOp::Eq => "==",
            DlBinOp::Neq => "!=",
            DlBinOp::Lt => "<",
            DlBinOp::Lte => "<=",
            DlBinOp::Gt => ">",
            DlBinOp::Gte => ">=",
            DlBinOp::And => "and",
            DlBinOp::Or => "or",
            DlBinOp::Plus => "+",
            DlBinOp::Minus => "-",
            DlBinOp::Mult => "*",
            DlBinOp::Div => "/",
            DlBinOp::Mod => "%",
            DlBinOp::Concat => "++",
        }
    }

    /// Stem used by the null-aware helper family (`a_<name>_RN`)
    pub fn helper_name(self) -> &'static str {
        match self {
            DlBinOp::Eq => "eq",
            DlBinOp::Neq => "neq",
            DlBinOp::Lt => "lt",
            DlBinOp::Lte => "lte",
            DlBinOp::Gt => "gt",
            DlBinOp::Gte => "gte",
            DlBinOp::And => "and",
            DlBinOp::Or => "or",
            DlBinOp::Plus => "plus",
            DlBinOp::Minus => "minus",
            DlBinOp::Mult => "mult",
            DlBinOp::Div => "div",
            DlBinOp::Mod => "mod",
            DlBinOp::Concat => "concat",
        }
    }
}

/// Expression in rule bodies and function statements
#[derive(Debug, Clone, PartialEq)]
pub enum DlExpr {
    Var(String),
    /// `e.f`
    Field(Box<DlExpr>, String),
    /// `e.0`
    TupleField(Box<DlExpr>, usize),
    Literal(DlLiteral),
    /// `(l op r)`
    Binary {
        op: DlBinOp,
        left: Box<DlExpr>,
        right: Box<DlExpr>,
    },
    /// `not e`
    Not(Box<DlExpr>),
    /// `(-e)`
    Neg(Box<DlExpr>),
    /// `f(a, b)`
    Call { function: String, args: Vec<DlExpr> },
    /// `T{.a = x,.b = y}`
    Record {
        type_name: String,
        fields: Vec<(String, DlExpr)>,
    },
    /// `Some{.x = e}`
    Some(Box<DlExpr>),
    /// `None{}`
    None,
    /// `(a, b)`; a single element renders as `(a)`
    Tuple(Vec<DlExpr>),
    /// `(e).group_by(k)`
    GroupBy { source: Box<DlExpr>, key: Box<DlExpr> },
    /// `e.m(args)`
    Method {
        receiver: Box<DlExpr>,
        method: String,
        args: Vec<DlExpr>,
    },
    /// `e: T`
    Ascribed(Box<DlExpr>, DlType),
}

impl DlExpr {
    pub fn var(name: impl Into<String>) -> DlExpr {
        DlExpr::Var(name.into())
    }

    /// `self.field`
    #[must_use]
    pub fn field(self, name: impl Into<String>) -> DlExpr {
        DlExpr::Field(Box::new(self), name.into())
    }

    pub fn call(function: impl Into<String>, args: Vec<DlExpr>) -> DlExpr {
        DlExpr::Call {
            function: function.into(),
            args,
        }
    }

    pub fn binary(op: DlBinOp, left: DlExpr, right: DlExpr) -> DlExpr {
        DlExpr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// `Some{.x = self}`
    #[must_use]
    pub fn wrap_some(self) -> DlExpr {
        DlExpr::Some(Box::new(self))
    }

    pub fn bool(value: bool) -> DlExpr {
        DlExpr::Literal(DlLiteral::Bool(value))
    }
}

impl fmt::Display for DlExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DlExpr::Var(name) => write!(f, "{name}"),
            DlExpr::Field(base, name) => write!(f, "{base}.{name}"),
            DlExpr::TupleField(base, index) => write!(f, "{base}.{index}"),
            DlExpr::Literal(lit) => write!(f, "{lit}"),
            DlExpr::Binary { op, left, right } => {
                write!(f, "({left} {} {right})", op.symbol())
            }
            DlExpr::Not(inner) => write!(f, "not {inner}"),
            DlExpr::Neg(inner) => write!(f, "(-{inner})"),
            DlExpr::Call { function, args } => {
                write!(f, "{function}(")?;
                write_separated(f, args, ", ")?;
                write!(f, ")")
            }
            DlExpr::Record { type_name, fields } => {
                write!(f, "{type_name}{{")?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, ".{name} = {value}")?;
                }
                write!(f, "}}")
            }
            DlExpr::Some(inner) => write!(f, "Some{{.x = {inner}}}"),
            DlExpr::None => write!(f, "None{{}}"),
            DlExpr::Tuple(items) => {
                write!(f, "(")?;
                write_separated(f, items, ", ")?;
                write!(f, ")")
            }
            DlExpr::GroupBy { source, key } => write!(f, "({source}).group_by({key})"),
            DlExpr::Method {
                receiver,
                method,
                args,
            } => {
                write!(f, "{receiver}.{method}(")?;
                write_separated(f, args, ", ")?;
                write!(f, ")")
            }
            DlExpr::Ascribed(inner, ty) => write!(f, "{inner}: {ty}"),
        }
    }
}

// ============================================================================
// Rules
// ============================================================================

/// `R[p]`
#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    pub relation: String,
    pub pattern: Pattern,
}

impl Atom {
    pub fn new(relation: impl Into<String>, pattern: Pattern) -> Self {
        Atom {
            relation: relation.into(),
            pattern,
        }
    }

    /// Atom binding the whole row to `var`
    pub fn row(relation: impl Into<String>, var: impl Into<String>) -> Self {
        Atom::new(relation, Pattern::Var(var.into()))
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.relation, self.pattern)
    }
}

/// One element of a rule body, evaluated left to right
#[derive(Debug, Clone, PartialEq)]
pub enum BodyItem {
    Atom(Atom),
    /// `not R[p]`
    Negated(Atom),
    /// `var x = e`
    Binding { var: String, expr: DlExpr },
    /// Filter; must evaluate to `bool`
    Condition(DlExpr),
}

impl BodyItem {
    pub fn binding(var: impl Into<String>, expr: DlExpr) -> Self {
        BodyItem::Binding {
            var: var.into(),
            expr,
        }
    }
}

impl fmt::Display for BodyItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BodyItem::Atom(atom) => write!(f, "{atom}"),
            BodyItem::Negated(atom) => write!(f, "not {atom}"),
            BodyItem::Binding { var, expr } => write!(f, "var {var} = {expr}"),
            BodyItem::Condition(expr) => write!(f, "{expr}"),
        }
    }
}

/// `H[p] :- b1,b2.`
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub head: Atom,
    pub body: Vec<BodyItem>,
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} :- ", self.head)?;
        write_separated(f, &self.body, ",")?;
        write!(f, ".")
    }
}

// ============================================================================
// Aggregate fold functions
// ============================================================================

/// Statement of a fold function body
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `var x = e`
    VarDecl { name: String, init: DlExpr },
    /// `(var x = e)`, scoped to the enclosing block
    ScopedVarDecl { name: String, init: DlExpr },
    /// `(x = e)`
    Assign { target: String, value: DlExpr },
    /// `(for ((item, _) in group) {...})`
    ForEachInGroup {
        group: String,
        item: String,
        body: Vec<Stmt>,
    },
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stmt::VarDecl { name, init } => write!(f, "var {name} = {init}"),
            Stmt::ScopedVarDecl { name, init } => write!(f, "(var {name} = {init})"),
            Stmt::Assign { target, value } => write!(f, "({target} = {value})"),
            Stmt::ForEachInGroup { group, item, body } => {
                writeln!(f, "(for (({item}, _) in {group}) {{")?;
                write_separated(f, body, ";\n")?;
                write!(f, "}}\n)")
            }
        }
    }
}

/// `function name(p: T):R { stmts; (result) }`
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<(String, DlType)>,
    pub return_type: DlType,
    pub body: Vec<Stmt>,
    pub result: DlExpr,
}

impl fmt::Display for FunctionDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "function {}(", self.name)?;
        for (i, (name, ty)) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}: {ty}")?;
        }
        writeln!(f, "):{} {{", self.return_type)?;
        for stmt in &self.body {
            writeln!(f, "{stmt};")?;
        }
        write!(f, "({})\n}}", self.result)
    }
}

// ============================================================================
// Compilation unit
// ============================================================================

/// Everything generated for one view, in first-introduced order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompilationUnit {
    pub view: String,
    pub output_relation: String,
    pub types: Vec<TypeDecl>,
    pub functions: Vec<FunctionDecl>,
    /// Temporary relations first, the output relation last
    pub relations: Vec<RelationDecl>,
    pub rules: Vec<Rule>,
}

impl CompilationUnit {
    pub fn type_decl(&self, name: &str) -> Option<&TypeDecl> {
        self.types.iter().find(|t| t.name == name)
    }

    pub fn relation(&self, name: &str) -> Option<&RelationDecl> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// Element type of the output relation
    pub fn output_type(&self) -> Option<&str> {
        self.relation(&self.output_relation)
            .map(|r| r.element_type.as_str())
    }

    /// Rules whose head is `relation`
    pub fn rules_for<'a>(&'a self, relation: &'a str) -> impl Iterator<Item = &'a Rule> + 'a {
        self.rules.iter().filter(move |r| r.head.relation == relation)
    }
}

fn write_separated<T: fmt::Display>(
    f: &mut fmt::Formatter<'_>,
    items: &[T],
    sep: &str,
) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, "{sep}")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_decl_display() {
        let decl = TypeDecl {
            name: "Ttmp".to_string(),
            fields: vec![
                Field {
                    name: "column1".to_string(),
                    ty: DlType::Signed(64),
                },
                Field {
                    name: "column2".to_string(),
                    ty: DlType::String.optional(),
                },
            ],
        };
        assert_eq!(
            decl.to_string(),
            "typedef Ttmp = Ttmp{column1:signed<64>, column2:Option<string>}"
        );
    }

    #[test]
    fn test_relation_decl_display() {
        let rel = RelationDecl {
            name: "Rv0".to_string(),
            role: RelationRole::Output,
            element_type: "TRt1".to_string(),
        };
        assert_eq!(rel.to_string(), "output relation Rv0[TRt1]");
        let temp = RelationDecl {
            role: RelationRole::Internal,
            ..rel
        };
        assert_eq!(temp.to_string(), "relation Rv0[TRt1]");
    }

    #[test]
    fn test_literals() {
        let five = DlLiteral::Signed {
            width: 64,
            value: 5,
        };
        assert_eq!(five.to_string(), "64'sd5");
        let minus = DlLiteral::Signed {
            width: 16,
            value: -3,
        };
        assert_eq!(minus.to_string(), "-16'sd3");
        let float = DlLiteral::Float {
            width: 64,
            value: 1.0,
        };
        assert_eq!(float.to_string(), "64'f1.0");
        assert_eq!(
            DlLiteral::String("say \"hi\"".to_string()).to_string(),
            "\"say \\\"hi\\\"\""
        );
    }

    #[test]
    fn test_rule_display() {
        let rule = Rule {
            head: Atom::row("Rv0", "v1"),
            body: vec![
                BodyItem::Atom(Atom::row("Rt1", "v")),
                BodyItem::Condition(DlExpr::binary(
                    DlBinOp::Eq,
                    DlExpr::var("v").field("column2"),
                    DlExpr::Literal(DlLiteral::String("a".to_string())),
                )),
                BodyItem::Negated(Atom::row("Rtmp", "v")),
                BodyItem::binding("v1", DlExpr::var("v")),
            ],
        };
        assert_eq!(
            rule.to_string(),
            "Rv0[v1] :- Rt1[v],(v.column2 == \"a\"),not Rtmp[v],var v1 = v."
        );
    }

    #[test]
    fn test_record_pattern_with_some() {
        let pattern = Pattern::Record {
            type_name: "TRt4".to_string(),
            fields: vec![
                (
                    "column1".to_string(),
                    Pattern::Some(Box::new(Pattern::Var("column1".to_string()))),
                ),
                ("column2".to_string(), Pattern::Var("column20".to_string())),
            ],
        };
        assert_eq!(
            pattern.to_string(),
            "TRt4{.column1 = Some{.x = column1},.column2 = column20}"
        );
    }

    #[test]
    fn test_function_display() {
        let function = FunctionDecl {
            name: "agg".to_string(),
            params: vec![(
                "g".to_string(),
                DlType::Group(Box::new(DlType::Unit), Box::new(DlType::Named("TRt1".to_string()))),
            )],
            return_type: DlType::Named("TRtmp".to_string()),
            body: vec![
                Stmt::VarDecl {
                    name: "count".to_string(),
                    init: DlExpr::Ascribed(
                        Box::new(DlExpr::Literal(DlLiteral::Signed {
                            width: 64,
                            value: 0,
                        })),
                        DlType::Signed(64),
                    ),
                },
                Stmt::ForEachInGroup {
                    group: "g".to_string(),
                    item: "i".to_string(),
                    body: vec![
                        Stmt::VarDecl {
                            name: "v1".to_string(),
                            init: DlExpr::var("i"),
                        },
                        Stmt::ScopedVarDecl {
                            name: "incr".to_string(),
                            init: DlExpr::var("v1").field("column2"),
                        },
                        Stmt::Assign {
                            target: "count".to_string(),
                            value: DlExpr::call(
                                "agg_count_R",
                                vec![DlExpr::var("count"), DlExpr::var("incr")],
                            ),
                        },
                    ],
                },
            ],
            result: DlExpr::Record {
                type_name: "TRtmp".to_string(),
                fields: vec![("ct".to_string(), DlExpr::var("count"))],
            },
        };
        let expected = "function agg(g: Group<(), TRt1>):TRtmp {\n\
                        var count = 64'sd0: signed<64>;\n\
                        (for ((i, _) in g) {\n\
                        var v1 = i;\n\
                        (var incr = v1.column2);\n\
                        (count = agg_count_R(count, incr))}\n\
                        );\n\
                        (TRtmp{.ct = count})\n\
                        }";
        assert_eq!(function.to_string(), expected);
    }

    #[test]
    fn test_group_by_display() {
        let expr = DlExpr::GroupBy {
            source: Box::new(DlExpr::var("v1")),
            key: Box::new(DlExpr::Tuple(vec![])),
        };
        assert_eq!(expr.to_string(), "(v1).group_by(())");
        let keyed = DlExpr::GroupBy {
            source: Box::new(DlExpr::var("v1")),
            key: Box::new(DlExpr::Tuple(vec![DlExpr::var("v1").field("column1")])),
        };
        assert_eq!(keyed.to_string(), "(v1).group_by((v1.column1))");
    }
}
