//! # Null Semantics
//!
//! SQL scalars are three-valued: a predicate over a NULL operand is neither
//! true nor false. This module makes that explicit in two steps.
//!
//! 1. Expressions are first built as [`Typed`] values: a small scalar IR that
//!    carries the SQL type and nullability of every node. The constructors
//!    (`compare`, `logical`, `arithmetic`, ...) check operand types and fold
//!    constants through the [`Truth`] lattice.
//! 2. [`lower`] and [`admit`] turn a `Typed` tree into target expressions.
//!    Operators whose operands are all non-null use the plain operator;
//!    anything touching a nullable operand uses the `a_<op>_<L><R>` helper
//!    family, where `L`/`R` is `R` for a raw operand and `N` for a nullable
//!    one. Row admission maps unknown to false through `unwrapBool`.

use crate::error::{CompileError, CompileResult};
use crate::ir::{DlBinOp, DlExpr, DlLiteral, DlType};
use crate::schema::DataType;

// ============================================================================
// Truth lattice
// ============================================================================

/// Three-valued boolean
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Truth {
    True,
    False,
    Unknown,
}

impl Truth {
    pub fn from_bool(b: bool) -> Self {
        if b {
            Truth::True
        } else {
            Truth::False
        }
    }

    #[must_use]
    pub fn and(self, other: Truth) -> Truth {
        match (self, other) {
            (Truth::False, _) | (_, Truth::False) => Truth::False,
            (Truth::True, Truth::True) => Truth::True,
            _ => Truth::Unknown,
        }
    }

    #[must_use]
    pub fn or(self, other: Truth) -> Truth {
        match (self, other) {
            (Truth::True, _) | (_, Truth::True) => Truth::True,
            (Truth::False, Truth::False) => Truth::False,
            _ => Truth::Unknown,
        }
    }

    #[must_use]
    pub fn not(self) -> Truth {
        match self {
            Truth::True => Truth::False,
            Truth::False => Truth::True,
            Truth::Unknown => Truth::Unknown,
        }
    }

    /// Does a row pass a filter with this value? Unknown rejects.
    pub fn admits(self) -> bool {
        self == Truth::True
    }
}

// ============================================================================
// Typed scalar IR
// ============================================================================

/// Literal constant before it has been given a target width
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Int(i64),
    Float(f64),
    Str(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    /// Already-lowered term, e.g. `v.column1`
    Leaf(DlExpr),
    Constant(Constant),
    /// Boolean constant, including unknown
    Truth(Truth),
    /// NULL; the type is known only after it meets a typed operand
    Null,
    Binary {
        op: DlBinOp,
        left: Box<Typed>,
        right: Box<Typed>,
        construct: String,
    },
    Not {
        operand: Box<Typed>,
        construct: String,
    },
    Negate {
        operand: Box<Typed>,
        construct: String,
    },
    IsNull {
        operand: Box<Typed>,
        negated: bool,
    },
}

/// Scalar with its SQL type and nullability
#[derive(Debug, Clone, PartialEq)]
pub struct Typed {
    pub scalar: Scalar,
    /// `None` only for an untyped NULL
    pub ty: Option<DataType>,
    pub nullable: bool,
}

impl Typed {
    pub fn leaf(expr: DlExpr, ty: DataType, nullable: bool) -> Self {
        Typed {
            scalar: Scalar::Leaf(expr),
            ty: Some(ty),
            nullable,
        }
    }

    pub fn integer(value: i64) -> Self {
        Typed {
            scalar: Scalar::Constant(Constant::Int(value)),
            ty: Some(DataType::BigInt),
            nullable: false,
        }
    }

    pub fn double(value: f64) -> Self {
        Typed {
            scalar: Scalar::Constant(Constant::Float(value)),
            ty: Some(DataType::Double),
            nullable: false,
        }
    }

    pub fn string(value: impl Into<String>) -> Self {
        Typed {
            scalar: Scalar::Constant(Constant::Str(value.into())),
            ty: Some(DataType::Varchar),
            nullable: false,
        }
    }

    pub fn truth(value: Truth) -> Self {
        Typed {
            scalar: Scalar::Truth(value),
            ty: Some(DataType::Boolean),
            nullable: value == Truth::Unknown,
        }
    }

    pub fn null() -> Self {
        Typed {
            scalar: Scalar::Null,
            ty: None,
            nullable: true,
        }
    }

    fn null_of(ty: Option<DataType>) -> Self {
        Typed {
            scalar: Scalar::Null,
            ty,
            nullable: true,
        }
    }

    pub fn is_null_constant(&self) -> bool {
        matches!(self.scalar, Scalar::Null)
    }

    /// Constant truth value, if this folded to one
    pub fn as_truth(&self) -> Option<Truth> {
        match self.scalar {
            Scalar::Truth(t) => Some(t),
            Scalar::Null if self.ty.is_none() || self.ty == Some(DataType::Boolean) => {
                Some(Truth::Unknown)
            }
            _ => None,
        }
    }

    fn type_name(&self) -> String {
        self.ty
            .map_or_else(|| "null".to_string(), |t| t.sql_name().to_string())
    }
}

/// Nullability of a merged column
pub fn merge_nullable(a: bool, b: bool) -> bool {
    a || b
}

/// Value flowing into a field: raw values entering an optional field are
/// wrapped in `Some{.x = e}`
pub fn into_field(expr: DlExpr, value_nullable: bool, field_nullable: bool) -> DlExpr {
    if field_nullable && !value_nullable {
        expr.wrap_some()
    } else {
        expr
    }
}

// ============================================================================
// Constructors with type checking and folding
// ============================================================================

/// Give a numeric literal the type of the other operand, if possible.
/// Integer literals must fit the target width.
fn coerce_constant(value: Typed, target: DataType) -> Option<Typed> {
    let ok = match (&value.scalar, value.ty) {
        (Scalar::Constant(Constant::Int(i)), Some(from)) if from.is_integer() => match target {
            DataType::SmallInt => i16::try_from(*i).is_ok(),
            DataType::Integer => i32::try_from(*i).is_ok(),
            _ => target.is_numeric(),
        },
        (Scalar::Constant(Constant::Float(_)), Some(from)) if from.is_floating() => {
            target.is_floating()
        }
        _ => false,
    };
    ok.then(|| Typed {
        ty: Some(target),
        ..value
    })
}

/// Bring both operands to one type without implicit casts of non-constants
fn unify(left: Typed, right: Typed, construct: &str) -> CompileResult<(Typed, Typed, Option<DataType>)> {
    match (left.ty, right.ty) {
        (None, None) => Ok((left, right, None)),
        (None, Some(t)) => Ok((Typed::null_of(Some(t)), right, Some(t))),
        (Some(t), None) => Ok((left, Typed::null_of(Some(t)), Some(t))),
        (Some(a), Some(b)) if a == b => Ok((left, right, Some(a))),
        (Some(a), Some(b)) => {
            let left_name = left.type_name();
            let right_name = right.type_name();
            if matches!(left.scalar, Scalar::Constant(_)) {
                if let Some(coerced) = coerce_constant(left.clone(), b) {
                    return Ok((coerced, right, Some(b)));
                }
            }
            if matches!(right.scalar, Scalar::Constant(_)) {
                if let Some(coerced) = coerce_constant(right, a) {
                    return Ok((left, coerced, Some(a)));
                }
            }
            Err(CompileError::type_mismatch(construct, left_name, right_name))
        }
    }
}

fn binary(op: DlBinOp, left: Typed, right: Typed, ty: DataType, construct: &str) -> Typed {
    let nullable = merge_nullable(left.nullable, right.nullable);
    Typed {
        scalar: Scalar::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
            construct: construct.to_string(),
        },
        ty: Some(ty),
        nullable,
    }
}

/// `=`, `<>`, `<`, `<=`, `>`, `>=`
pub fn compare(op: DlBinOp, left: Typed, right: Typed, construct: &str) -> CompileResult<Typed> {
    let (left, right, _) = unify(left, right, construct)?;
    if left.is_null_constant() || right.is_null_constant() {
        return Ok(Typed::truth(Truth::Unknown));
    }
    Ok(binary(op, left, right, DataType::Boolean, construct))
}

fn require_boolean(value: Typed, construct: &str) -> CompileResult<Typed> {
    match value.ty {
        None => Ok(Typed::truth(Truth::Unknown)),
        Some(DataType::Boolean) => Ok(value),
        Some(other) => Err(CompileError::type_mismatch(construct, other, DataType::Boolean)),
    }
}

/// `AND` / `OR`
pub fn logical(op: DlBinOp, left: Typed, right: Typed, construct: &str) -> CompileResult<Typed> {
    let left = require_boolean(left, construct)?;
    let right = require_boolean(right, construct)?;
    let folded = match (op, left.as_truth(), right.as_truth()) {
        (DlBinOp::And, Some(a), Some(b)) => Some(Typed::truth(a.and(b))),
        (DlBinOp::Or, Some(a), Some(b)) => Some(Typed::truth(a.or(b))),
        (DlBinOp::And, Some(Truth::False), _) | (DlBinOp::And, _, Some(Truth::False)) => {
            Some(Typed::truth(Truth::False))
        }
        (DlBinOp::Or, Some(Truth::True), _) | (DlBinOp::Or, _, Some(Truth::True)) => {
            Some(Typed::truth(Truth::True))
        }
        _ => None,
    };
    if let Some(folded) = folded {
        return Ok(folded);
    }
    Ok(match (op, left.as_truth(), right.as_truth()) {
        (DlBinOp::And, Some(Truth::True), _) | (DlBinOp::Or, Some(Truth::False), _) => right,
        (DlBinOp::And, _, Some(Truth::True)) | (DlBinOp::Or, _, Some(Truth::False)) => left,
        _ => binary(op, left, right, DataType::Boolean, construct),
    })
}

/// `NOT e`
pub fn not(operand: Typed, construct: &str) -> CompileResult<Typed> {
    let operand = require_boolean(operand, construct)?;
    if let Some(t) = operand.as_truth() {
        return Ok(Typed::truth(t.not()));
    }
    let nullable = operand.nullable;
    Ok(Typed {
        scalar: Scalar::Not {
            operand: Box::new(operand),
            construct: construct.to_string(),
        },
        ty: Some(DataType::Boolean),
        nullable,
    })
}

/// `+ - * / %` on numbers and `||` on strings
pub fn arithmetic(op: DlBinOp, left: Typed, right: Typed, construct: &str) -> CompileResult<Typed> {
    let (left, right, ty) = unify(left, right, construct)?;
    if let Some(t) = ty {
        let fits = if op == DlBinOp::Concat {
            t == DataType::Varchar
        } else {
            t.is_numeric()
        };
        if !fits {
            let expected = if op == DlBinOp::Concat { "varchar" } else { "numeric" };
            return Err(CompileError::type_mismatch(construct, t, expected));
        }
    }
    if left.is_null_constant() || right.is_null_constant() {
        return Ok(Typed::null_of(ty));
    }
    match ty {
        Some(t) => Ok(binary(op, left, right, t, construct)),
        None => Ok(Typed::null()),
    }
}

/// Unary minus
pub fn negate(operand: Typed, construct: &str) -> CompileResult<Typed> {
    match operand.ty {
        None => return Ok(Typed::null()),
        Some(t) if !t.is_numeric() => {
            return Err(CompileError::type_mismatch(construct, t, "numeric"))
        }
        Some(_) => {}
    }
    let folded = match &operand.scalar {
        Scalar::Constant(Constant::Int(i)) => Some(Scalar::Constant(Constant::Int(i.wrapping_neg()))),
        Scalar::Constant(Constant::Float(f)) => Some(Scalar::Constant(Constant::Float(-f))),
        Scalar::Null => Some(Scalar::Null),
        _ => None,
    };
    if let Some(scalar) = folded {
        return Ok(Typed { scalar, ..operand });
    }
    let (ty, nullable) = (operand.ty, operand.nullable);
    Ok(Typed {
        scalar: Scalar::Negate {
            operand: Box::new(operand),
            construct: construct.to_string(),
        },
        ty,
        nullable,
    })
}

/// `e IS [NOT] NULL`; constant for non-nullable operands
pub fn is_null(operand: Typed, negated: bool) -> Typed {
    if operand.is_null_constant() {
        return Typed::truth(Truth::from_bool(!negated));
    }
    if !operand.nullable {
        return Typed::truth(Truth::from_bool(negated));
    }
    Typed {
        scalar: Scalar::IsNull {
            operand: Box::new(operand),
            negated,
        },
        ty: Some(DataType::Boolean),
        nullable: false,
    }
}

// ============================================================================
// Lowering
// ============================================================================

fn tag(nullable: bool) -> &'static str {
    if nullable {
        "N"
    } else {
        "R"
    }
}

fn constant_literal(constant: &Constant, ty: Option<DataType>) -> DlLiteral {
    match (constant, ty) {
        (Constant::Int(i), Some(t)) if t.is_floating() => {
            #[allow(clippy::cast_precision_loss)]
            let value = *i as f64;
            DlLiteral::Float {
                width: t.width().unwrap_or(64),
                value,
            }
        }
        (Constant::Int(i), t) => DlLiteral::Signed {
            width: t.and_then(DataType::width).unwrap_or(64),
            value: *i,
        },
        (Constant::Float(f), t) => DlLiteral::Float {
            width: t.and_then(DataType::width).unwrap_or(64),
            value: *f,
        },
        (Constant::Str(s), _) => DlLiteral::String(s.clone()),
    }
}

fn none_of(ty: DlType) -> DlExpr {
    DlExpr::Ascribed(Box::new(DlExpr::None), ty.optional())
}

/// Lower a typed scalar to a target expression.
///
/// With `null_aware` off, an operator over a nullable operand is a
/// `NullabilityMismatch` instead of a helper call.
pub fn lower(value: &Typed, null_aware: bool) -> CompileResult<DlExpr> {
    match &value.scalar {
        Scalar::Leaf(expr) => Ok(expr.clone()),
        Scalar::Constant(c) => Ok(DlExpr::Literal(constant_literal(c, value.ty))),
        Scalar::Truth(Truth::True) => Ok(DlExpr::bool(true)),
        Scalar::Truth(Truth::False) => Ok(DlExpr::bool(false)),
        Scalar::Truth(Truth::Unknown) => Ok(none_of(DlType::Bool)),
        Scalar::Null => Ok(match value.ty {
            Some(t) => none_of(t.dl_type()),
            None => DlExpr::None,
        }),
        Scalar::Binary {
            op,
            left,
            right,
            construct,
        } => {
            let l = lower(left, null_aware)?;
            let r = lower(right, null_aware)?;
            if !left.nullable && !right.nullable {
                return Ok(DlExpr::binary(*op, l, r));
            }
            if !null_aware {
                return Err(CompileError::nullability_mismatch(construct.clone()));
            }
            let helper = format!(
                "a_{}_{}{}",
                op.helper_name(),
                tag(left.nullable),
                tag(right.nullable)
            );
            Ok(DlExpr::call(helper, vec![l, r]))
        }
        Scalar::Not { operand, construct } => {
            let inner = lower(operand, null_aware)?;
            if !operand.nullable {
                Ok(DlExpr::Not(Box::new(inner)))
            } else if null_aware {
                Ok(DlExpr::call("a_not_N", vec![inner]))
            } else {
                Err(CompileError::nullability_mismatch(construct.clone()))
            }
        }
        Scalar::Negate { operand, construct } => {
            let inner = lower(operand, null_aware)?;
            if !operand.nullable {
                Ok(DlExpr::Neg(Box::new(inner)))
            } else if null_aware {
                Ok(DlExpr::call("a_neg_N", vec![inner]))
            } else {
                Err(CompileError::nullability_mismatch(construct.clone()))
            }
        }
        Scalar::IsNull { operand, negated } => {
            let inner = lower(operand, null_aware)?;
            let function = if *negated { "is_some" } else { "is_none" };
            Ok(DlExpr::call(function, vec![inner]))
        }
    }
}

/// Lower a predicate used to admit rows.
///
/// Returns `None` when the predicate is constantly true (no filter needed).
/// Constant false or unknown becomes the literal `false`; a nullable
/// predicate is wrapped in `unwrapBool`, mapping unknown to false.
pub fn admit(value: &Typed, null_aware: bool, construct: &str) -> CompileResult<Option<DlExpr>> {
    match value.ty {
        None | Some(DataType::Boolean) => {}
        Some(other) => {
            return Err(CompileError::type_mismatch(construct, other, DataType::Boolean))
        }
    }
    if let Some(t) = value.as_truth() {
        return Ok(if t.admits() {
            None
        } else {
            Some(DlExpr::bool(false))
        });
    }
    let lowered = lower(value, null_aware)?;
    if !value.nullable {
        return Ok(Some(lowered));
    }
    if !null_aware {
        return Err(CompileError::nullability_mismatch(construct));
    }
    Ok(Some(DlExpr::call("unwrapBool", vec![lowered])))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(var: &str, field: &str, ty: DataType, nullable: bool) -> Typed {
        Typed::leaf(DlExpr::var(var).field(field), ty, nullable)
    }

    #[test]
    fn test_truth_lattice() {
        use Truth::*;
        assert_eq!(Unknown.and(False), False);
        assert_eq!(Unknown.and(True), Unknown);
        assert_eq!(Unknown.or(True), True);
        assert_eq!(Unknown.or(False), Unknown);
        assert_eq!(Unknown.not(), Unknown);
        assert!(True.admits());
        assert!(!Unknown.admits());
        assert!(!False.admits());
    }

    #[test]
    fn test_plain_comparison() {
        let cmp = compare(
            DlBinOp::Lt,
            col("v", "column1", DataType::BigInt, false),
            col("v0", "column1", DataType::BigInt, false),
            "t1.column1 < t2.column1",
        )
        .unwrap();
        let cond = admit(&cmp, true, "ON").unwrap().unwrap();
        assert_eq!(cond.to_string(), "(v.column1 < v0.column1)");
    }

    #[test]
    fn test_null_aware_comparison() {
        let cmp = compare(
            DlBinOp::Lt,
            col("v", "column1", DataType::BigInt, false),
            col("v0", "column1", DataType::BigInt, true),
            "t1.column1 < t4.column1",
        )
        .unwrap();
        let cond = admit(&cmp, true, "ON").unwrap().unwrap();
        assert_eq!(cond.to_string(), "unwrapBool(a_lt_RN(v.column1, v0.column1))");
    }

    #[test]
    fn test_nullability_mismatch_without_helpers() {
        let cmp = compare(
            DlBinOp::Eq,
            col("v", "a", DataType::Varchar, true),
            Typed::string("x"),
            "a = 'x'",
        )
        .unwrap();
        let err = admit(&cmp, false, "WHERE").unwrap_err();
        assert_eq!(err.kind(), "NullabilityMismatch");
    }

    #[test]
    fn test_constant_folding() {
        let unknown = compare(DlBinOp::Eq, col("v", "a", DataType::BigInt, false), Typed::null(), "a = NULL").unwrap();
        assert_eq!(unknown.as_truth(), Some(Truth::Unknown));
        assert_eq!(admit(&unknown, true, "WHERE").unwrap(), Some(DlExpr::bool(false)));

        let always = logical(DlBinOp::Or, Typed::truth(Truth::True), col("v", "b", DataType::Boolean, true), "TRUE OR b").unwrap();
        assert_eq!(admit(&always, true, "WHERE").unwrap(), None);

        let passthrough = logical(DlBinOp::And, Typed::truth(Truth::True), col("v", "b", DataType::Boolean, false), "TRUE AND b").unwrap();
        assert_eq!(lower(&passthrough, true).unwrap().to_string(), "v.b");
    }

    #[test]
    fn test_literal_coercion() {
        let cmp = compare(
            DlBinOp::Gt,
            col("v", "column4", DataType::Double, false),
            Typed::integer(1),
            "column4 > 1",
        )
        .unwrap();
        assert_eq!(lower(&cmp, true).unwrap().to_string(), "(v.column4 > 64'f1.0)");

        let small = compare(
            DlBinOp::Eq,
            Typed::integer(3),
            col("v", "s", DataType::SmallInt, false),
            "3 = s",
        )
        .unwrap();
        assert_eq!(lower(&small, true).unwrap().to_string(), "(16'sd3 == v.s)");
    }

    #[test]
    fn test_literal_out_of_range_for_column_width() {
        let small = col("v", "s", DataType::SmallInt, false);
        let err = compare(DlBinOp::Gt, small.clone(), Typed::integer(100_000), "s > 100000").unwrap_err();
        assert_eq!(err.kind(), "TypeMismatch");
        assert!(compare(DlBinOp::Gt, small.clone(), Typed::integer(32_767), "s > 32767").is_ok());
        let lowest = negate(Typed::integer(32_768), "-32768").unwrap();
        assert!(compare(DlBinOp::Gt, small, lowest, "s > -32768").is_ok());

        let int = col("v", "i", DataType::Integer, false);
        let err = arithmetic(DlBinOp::Plus, int, Typed::integer(1 << 31), "i + 2147483648").unwrap_err();
        assert_eq!(err.kind(), "TypeMismatch");
    }

    #[test]
    fn test_type_mismatch() {
        let err = compare(
            DlBinOp::Eq,
            col("v", "column1", DataType::BigInt, false),
            col("v", "column2", DataType::Varchar, false),
            "column1 = column2",
        )
        .unwrap_err();
        assert_eq!(
            err,
            CompileError::type_mismatch("column1 = column2", "bigint", "varchar")
        );
        assert!(logical(DlBinOp::And, Typed::integer(1), Typed::truth(Truth::True), "1 AND TRUE").is_err());
    }

    #[test]
    fn test_is_null_forms() {
        let nullable = is_null(col("v", "a", DataType::BigInt, true), false);
        assert_eq!(lower(&nullable, true).unwrap().to_string(), "is_none(v.a)");
        let not_null = is_null(col("v", "a", DataType::BigInt, true), true);
        assert_eq!(lower(&not_null, true).unwrap().to_string(), "is_some(v.a)");
        let constant = is_null(col("v", "b", DataType::BigInt, false), false);
        assert_eq!(constant.as_truth(), Some(Truth::False));
    }

    #[test]
    fn test_arithmetic_and_negation() {
        let sum = arithmetic(
            DlBinOp::Plus,
            col("v", "a", DataType::BigInt, true),
            Typed::integer(1),
            "a + 1",
        )
        .unwrap();
        assert!(sum.nullable);
        assert_eq!(lower(&sum, true).unwrap().to_string(), "a_plus_NR(v.a, 64'sd1)");

        let neg = negate(Typed::integer(5), "-5").unwrap();
        assert_eq!(lower(&neg, true).unwrap().to_string(), "-64'sd5");

        let concat = arithmetic(DlBinOp::Concat, Typed::string("a"), Typed::integer(1), "'a' || 1");
        assert!(concat.is_err());
    }

    #[test]
    fn test_not_on_nullable() {
        let n = not(col("v", "flag", DataType::Boolean, true), "NOT flag").unwrap();
        assert_eq!(lower(&n, true).unwrap().to_string(), "a_not_N(v.flag)");
        let plain = not(col("v", "flag", DataType::Boolean, false), "NOT flag").unwrap();
        assert_eq!(lower(&plain, true).unwrap().to_string(), "not v.flag");
    }

    #[test]
    fn test_into_field_wraps_raw_values() {
        let e = into_field(DlExpr::var("column1"), false, true);
        assert_eq!(e.to_string(), "Some{.x = column1}");
        assert_eq!(into_field(DlExpr::var("c"), true, true).to_string(), "c");
    }
}
