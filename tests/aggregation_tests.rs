//! Aggregation: fold functions, grouping keys, HAVING and aggregates over joins.

use sql2ddlog::ast::builders::*;
use sql2ddlog::ast::ViewDefinition;
use sql2ddlog::schema::{ColumnSchema, DataType};
use sql2ddlog::{compile_view, Catalog, CodeGenerator, CompilationUnit, Config, TableSchema};

fn catalog() -> Catalog {
    Catalog::from_tables([
        TableSchema::new(
            "t1",
            vec![
                ColumnSchema::new("column1", DataType::BigInt, false),
                ColumnSchema::new("column2", DataType::Varchar, false),
                ColumnSchema::new("column3", DataType::Boolean, false),
                ColumnSchema::new("column4", DataType::Double, false),
            ],
        ),
        TableSchema::new("t2", vec![ColumnSchema::new("column1", DataType::BigInt, false)]),
        TableSchema::new(
            "t3",
            vec![
                ColumnSchema::new("d", DataType::Varchar, false),
                ColumnSchema::new("amount", DataType::Integer, true),
            ],
        ),
    ])
    .unwrap()
}

fn compile(view: &ViewDefinition) -> CompilationUnit {
    compile_view(&catalog(), &Config::default(), view).unwrap()
}

#[test]
fn test_count_over_join() {
    let view = QueryBuilder::new()
        .select_as(count(qcol("t1", "column2")), "ct")
        .from(table("t1").join(table("t2"), qcol("t1", "column1").eq(qcol("t2", "column1"))))
        .view("v0");
    let expected = "typedef TRtmp = TRtmp{ct:signed<64>}\n\
         function agg(g: Group<(), TRt1>):TRtmp {\n\
         var count = 64'sd0: signed<64>;\n\
         (for ((i, _) in g) {\n\
         var v1 = i;\n\
         (var incr = v1.column2);\n\
         (count = agg_count_R(count, incr))}\n\
         );\n\
         (TRtmp{.ct = count})\n\
         }\n\
         output relation Rv0[TRtmp]\n\
         Rv0[v3] :- Rt1[TRt1{.column1 = column1,.column2 = column2,.column3 = column3,.column4 = column4}],Rt2[TRt2{.column1 = column1}],var v1 = TRt1{.column1 = column1,.column2 = column2,.column3 = column3,.column4 = column4},var groupResult = (v1).group_by(()),var aggResult = agg(groupResult),var v2 = aggResult,var v3 = v2.\n";
    assert_eq!(CodeGenerator::default().render_unit(&compile(&view)), expected);
}

#[test]
fn test_count_nullable_column_uses_nullable_helper() {
    let unit = compile(
        &QueryBuilder::new()
            .select(count(col("amount")))
            .from(table("t3"))
            .view("v0"),
    );
    let function = unit.functions[0].to_string();
    assert!(function.contains("(count = agg_count_N(count, incr))"));
    assert_eq!(unit.types[0].to_string(), "typedef TRtmp = TRtmp{count:signed<64>}");
}

#[test]
fn test_min_max_avg_are_nullable() {
    let unit = compile(
        &QueryBuilder::new()
            .select(col("d"))
            .select(min(col("amount")))
            .select(max(col("amount")))
            .select_as(avg(col("amount")), "mean")
            .from(table("t3"))
            .group_by(col("d"))
            .view("v0"),
    );
    assert_eq!(
        unit.types[0].to_string(),
        "typedef TRtmp = TRtmp{d:string, min:Option<signed<32>>, max:Option<signed<32>>, mean:Option<signed<32>>}"
    );
    let function = unit.functions[0].to_string();
    assert!(function.starts_with("function agg(g: Group<string, TRt3>):TRtmp {\nvar key = g.key();\n"));
    assert!(function.contains("(max = agg_max_N(max, incr0))"));
    assert!(function.contains("var avg = None{}: Option<(signed<32>, signed<64>)>;"));
    assert!(function.contains("(min = agg_min_N(min, incr))"));
    assert!(function.contains("(TRtmp{.d = key,.min = min,.max = max,.mean = agg_avg_finish(avg)})"));
}

#[test]
fn test_group_by_derived_table_column() {
    let inner = QueryBuilder::new()
        .select_as(col("column1"), "k")
        .select_as(col("column4"), "x")
        .from(table("t1"))
        .build();
    let unit = compile(
        &QueryBuilder::new()
            .select(col("k"))
            .select_as(sum(col("x")), "s")
            .from(derived(inner, "d"))
            .group_by(col("k"))
            .view("v0"),
    );
    assert_eq!(unit.relations[0].to_string(), "relation Rtmp[TRd]");
    let rule = unit.rules[1].to_string();
    assert!(rule.starts_with("Rv0["));
    assert!(rule.contains("Rtmp[v2],var groupResult = (v2).group_by(v2.k)"));
}

#[test]
fn test_having_on_key_and_aggregate() {
    let unit = compile(
        &QueryBuilder::new()
            .select_as(count_star(), "n")
            .from(table("t1"))
            .group_by(col("column3"))
            .having(col("column3").and(count_star().gt(lit_int(2))))
            .view("v0"),
    );
    assert_eq!(unit.types[0].to_string(), "typedef TRtmp = TRtmp{n:signed<64>, column3:bool}");
    assert_eq!(unit.types[1].to_string(), "typedef TRtmp0 = TRtmp0{n:signed<64>}");
    let rule = unit.rules[0].to_string();
    assert!(rule.contains(",(v0.column3 and (v0.n > 64'sd2)),"));
    assert!(rule.ends_with("var v1 = TRtmp0{.n = v0.n},var v2 = v1."));
}

#[test]
fn test_aggregate_without_group_by_in_where_is_rejected() {
    let err = compile_view(
        &catalog(),
        &Config::default(),
        &QueryBuilder::new()
            .select_all()
            .from(table("t1"))
            .filter(count_star().gt(lit_int(1)))
            .view("v0"),
    )
    .unwrap_err();
    assert_eq!(err.kind(), "UnsupportedConstruct");
}
