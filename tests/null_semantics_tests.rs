//! Three-valued logic over nullable columns, as seen in generated rules.

use sql2ddlog::ast::builders::*;
use sql2ddlog::ast::{Expr, ViewDefinition};
use sql2ddlog::schema::{ColumnSchema, DataType};
use sql2ddlog::{compile_view, Catalog, CompilationUnit, Config, TableSchema};

fn catalog() -> Catalog {
    Catalog::from_tables([TableSchema::new(
        "t",
        vec![
            ColumnSchema::new("column1", DataType::BigInt, false),
            ColumnSchema::new("column2", DataType::Varchar, true),
            ColumnSchema::new("column3", DataType::Integer, true),
            ColumnSchema::new("small", DataType::SmallInt, false),
        ],
    )])
    .unwrap()
}

fn compile(view: &ViewDefinition) -> CompilationUnit {
    compile_view(&catalog(), &Config::default(), view).unwrap()
}

fn filtered(predicate: Expr) -> String {
    let view = QueryBuilder::new()
        .select_all()
        .from(table("t"))
        .filter(predicate)
        .view("v0");
    compile(&view).rules[0].to_string()
}

#[test]
fn test_nullable_comparison_is_unwrapped() {
    assert_eq!(
        filtered(col("column2").eq(lit_str("a"))),
        "Rv0[v0] :- Rt[v],unwrapBool(a_eq_NR(v.column2, \"a\")),var v0 = v."
    );
}

#[test]
fn test_non_nullable_comparison_is_plain() {
    assert_eq!(
        filtered(col("column1").gt_eq(lit_int(3))),
        "Rv0[v0] :- Rt[v],(v.column1 >= 64'sd3),var v0 = v."
    );
}

#[test]
fn test_literal_takes_column_width() {
    assert!(filtered(col("column3").gt(lit_int(1))).contains("unwrapBool(a_gt_NR(v.column3, 32'sd1))"));
}

#[test]
fn test_is_null() {
    assert!(filtered(col("column2").is_null()).contains(",is_none(v.column2),"));
    assert!(filtered(col("column2").is_not_null()).contains(",is_some(v.column2),"));
}

#[test]
fn test_is_null_on_non_nullable_column_folds() {
    assert_eq!(filtered(col("column1").is_not_null()), "Rv0[v0] :- Rt[v],var v0 = v.");
    assert_eq!(filtered(col("column1").is_null()), "Rv0[v0] :- Rt[v],false,var v0 = v.");
}

#[test]
fn test_comparison_with_null_rejects_every_row() {
    assert_eq!(filtered(col("column2").eq(null())), "Rv0[v0] :- Rt[v],false,var v0 = v.");
}

#[test]
fn test_not_and_or_over_unknown() {
    assert!(filtered(col("column2").eq(lit_str("a")).not())
        .contains("unwrapBool(a_not_N(a_eq_NR(v.column2, \"a\")))"));
    assert!(filtered(col("column2").eq(lit_str("a")).or(col("column1").gt(lit_int(3))))
        .contains("unwrapBool(a_or_NR(a_eq_NR(v.column2, \"a\"), (v.column1 > 64'sd3)))"));
}

#[test]
fn test_or_with_true_needs_no_filter() {
    assert_eq!(
        filtered(col("column2").eq(lit_str("a")).or(lit_bool(true))),
        "Rv0[v0] :- Rt[v],var v0 = v."
    );
}

#[test]
fn test_nullable_arithmetic_projection() {
    let unit = compile(
        &QueryBuilder::new()
            .select_as(col("column3").plus(lit_int(1)), "total")
            .from(table("t"))
            .view("v0"),
    );
    assert_eq!(
        unit.types[0].to_string(),
        "typedef TRtmp = TRtmp{total:Option<signed<32>>}"
    );
    assert!(unit.rules[0].to_string().contains("TRtmp{.total = a_plus_NR(v.column3, 32'sd1)}"));
}

#[test]
fn test_mixed_width_arithmetic_is_rejected() {
    let err = compile_view(
        &catalog(),
        &Config::default(),
        &QueryBuilder::new()
            .select(col("column1").plus(col("column3")))
            .from(table("t"))
            .view("v0"),
    )
    .unwrap_err();
    assert_eq!(err.kind(), "TypeMismatch");
}

#[test]
fn test_literal_must_fit_column_width() {
    let err = compile_view(
        &catalog(),
        &Config::default(),
        &QueryBuilder::new()
            .select_all()
            .from(table("t"))
            .filter(col("small").gt(lit_int(100_000)))
            .view("v0"),
    )
    .unwrap_err();
    assert_eq!(err.kind(), "TypeMismatch");
    assert!(filtered(col("small").gt(lit_int(-32_768))).contains("(v.small > -16'sd32768)"));
}
