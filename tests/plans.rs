//! Plan execution: DDL rules, DML routing, CSV loading and error kinds

use std::io::Write;

use pagedb::error::ErrorCode;
use pagedb::plan::{
    ColumnDef, CreateIndexPlan, CreateTablePlan, DeletePlan, DropIndexPlan, DropTablePlan,
    IndexKind, InsertPlan, LoadFromCsvPlan, Plan, PlanOutput, SelectPlan, WherePredicate,
};
use pagedb::types::{FieldType, Value};
use pagedb::DatabaseManager;
use tempfile::TempDir;

fn manager(dir: &TempDir) -> DatabaseManager {
    DatabaseManager::new(dir.path(), "testdb").unwrap()
}

#[test]
fn create_table_key_selection_rules() {
    let dir = TempDir::new().unwrap();
    let mut db = manager(&dir);

    // explicit key flag wins
    db.execute(Plan::CreateTable(CreateTablePlan {
        table: "a".into(),
        columns: vec![
            ColumnDef::new("nombre", FieldType::Char(8)),
            ColumnDef::new("codigo", FieldType::Int).key(),
        ],
    }))
    .unwrap();
    assert_eq!(db.schema("a").unwrap().key_name(), "codigo");

    // else the first INT column
    db.execute(Plan::CreateTable(CreateTablePlan {
        table: "b".into(),
        columns: vec![
            ColumnDef::new("nombre", FieldType::Char(8)),
            ColumnDef::new("edad", FieldType::Int),
        ],
    }))
    .unwrap();
    assert_eq!(db.schema("b").unwrap().key_name(), "edad");

    // else the first column
    db.execute(Plan::CreateTable(CreateTablePlan {
        table: "c".into(),
        columns: vec![
            ColumnDef::new("nombre", FieldType::Char(8)),
            ColumnDef::new("precio", FieldType::Float),
        ],
    }))
    .unwrap();
    assert_eq!(db.schema("c").unwrap().key_name(), "nombre");
}

#[test]
fn insert_with_named_columns_reorders() {
    let dir = TempDir::new().unwrap();
    let mut db = manager(&dir);
    db.create_table(
        "t",
        vec![
            ColumnDef::new("id", FieldType::Int).key().indexed(IndexKind::BTree),
            ColumnDef::new("nombre", FieldType::Char(8)),
            ColumnDef::new("precio", FieldType::Float),
        ],
    )
    .unwrap();

    let result = db
        .execute(Plan::Insert(InsertPlan {
            table: "t".into(),
            columns: Some(vec!["precio".into(), "id".into(), "nombre".into()]),
            // an INT literal widens into the FLOAT column
            values: vec![Value::Int(12), Value::Int(1), Value::Str("sal".into())],
        }))
        .unwrap();
    assert_eq!(result.data, PlanOutput::Inserted(true));

    let rows = db.search("t", None, &Value::Int(1)).unwrap().data;
    assert_eq!(rows[0].values[1], Value::Str("sal".into()));
    assert_eq!(rows[0].values[2], Value::Float(12.0));
}

#[test]
fn delete_plan_reports_affected() {
    let dir = TempDir::new().unwrap();
    let mut db = manager(&dir);
    db.create_table(
        "t",
        vec![ColumnDef::new("id", FieldType::Int).key().indexed(IndexKind::Sequential)],
    )
    .unwrap();
    for i in 1..=20 {
        db.execute(Plan::Insert(InsertPlan {
            table: "t".into(),
            columns: None,
            values: vec![Value::Int(i)],
        }))
        .unwrap();
    }

    let result = db
        .execute(Plan::Delete(DeletePlan {
            table: "t".into(),
            where_clause: WherePredicate::Between {
                column: "id".into(),
                low: Value::Int(5),
                high: Value::Int(8),
            },
        }))
        .unwrap();
    assert_eq!(result.data, PlanOutput::Affected(4));

    let left = db.scan_all("t").unwrap().data;
    assert_eq!(left.len(), 16);
}

#[test]
fn load_from_csv_reports_counts() {
    let dir = TempDir::new().unwrap();
    let mut db = manager(&dir);
    db.create_table(
        "ventas",
        vec![
            ColumnDef::new("id", FieldType::Int).key().indexed(IndexKind::BTree),
            ColumnDef::new("nombre", FieldType::Char(20)),
            ColumnDef::new("cantidad", FieldType::Int),
            ColumnDef::new("precio", FieldType::Float),
            ColumnDef::new("fecha", FieldType::Date),
        ],
    )
    .unwrap();

    let csv_path = dir.path().join("ventas.csv");
    let mut f = std::fs::File::create(&csv_path).unwrap();
    // Spanish headers, semicolon delimiter, DD/MM/YYYY dates, one bad row
    write!(
        f,
        "ID Venta;Nombre Producto;Cantidad Vendida;Precio Unitario;Fecha Venta\n\
         1;Aceite;5;12.5;3/11/2023\n\
         2;Arroz;3;4.2;04/11/2023\n\
         bad;Sal;1;1.0;05/11/2023\n\
         3;Azucar;2;3.3;2023-11-06\n"
    )
    .unwrap();
    drop(f);

    let plan = Plan::LoadFromCsv(LoadFromCsvPlan {
        table: "ventas".into(),
        path: csv_path.clone(),
        index_kind: Some(IndexKind::Hash),
        index_cols: vec!["nombre".into()],
    });
    let result = db.execute(plan.clone()).unwrap();
    let PlanOutput::Load(report) = result.data else {
        panic!("expected a load report");
    };
    assert_eq!(report.inserted, 3);
    assert_eq!(report.duplicates, 0);
    assert_eq!(report.cast_errors, 1);

    // dates were normalized before reaching the core
    let rows = db.search("ventas", None, &Value::Int(1)).unwrap().data;
    assert_eq!(rows[0].values[4], Value::Str("2023-11-03".into()));

    // the pre-created hash index answers equality lookups
    let hits = db
        .search("ventas", Some("nombre"), &Value::Str("Arroz".into()))
        .unwrap();
    assert_eq!(hits.data.len(), 1);
    assert!(hits.breakdown.unwrap().get("secondary_nombre").is_some());

    // loading the same file again counts everything as duplicates
    let result = db.execute(plan).unwrap();
    let PlanOutput::Load(report) = result.data else {
        panic!("expected a load report");
    };
    assert_eq!(report.inserted, 0);
    assert_eq!(report.duplicates, 3);
}

#[test]
fn drop_index_by_both_name_forms() {
    let dir = TempDir::new().unwrap();
    let mut db = manager(&dir);
    db.create_table(
        "t",
        vec![
            ColumnDef::new("id", FieldType::Int).key().indexed(IndexKind::BTree),
            ColumnDef::new("ciudad", FieldType::Char(8)),
            ColumnDef::new("precio", FieldType::Float),
        ],
    )
    .unwrap();
    db.execute(Plan::CreateIndex(CreateIndexPlan {
        table: "t".into(),
        column: "ciudad".into(),
        index_type: IndexKind::Hash,
    }))
    .unwrap();
    db.create_index("t", "precio", IndexKind::BTree).unwrap();

    db.execute(Plan::DropIndex(DropIndexPlan {
        index_name: "t.ciudad".into(),
    }))
    .unwrap();
    db.execute(Plan::DropIndex(DropIndexPlan {
        index_name: "t_precio_btree".into(),
    }))
    .unwrap();

    // both gone: equality on ciudad now scans, range on precio now scans
    let result = db.search("t", Some("ciudad"), &Value::Str("x".into())).unwrap();
    assert!(result.breakdown.unwrap().get("secondary_ciudad").is_none());
}

#[test]
fn drop_table_removes_every_file() {
    let dir = TempDir::new().unwrap();
    let mut db = manager(&dir);
    db.create_table(
        "t",
        vec![
            ColumnDef::new("id", FieldType::Int).key().indexed(IndexKind::Isam),
            ColumnDef::new("ciudad", FieldType::Char(8)).indexed(IndexKind::Hash),
        ],
    )
    .unwrap();
    db.insert(
        "t",
        &pagedb::Record::new(vec![Value::Int(1), Value::Str("Lima".into())]),
    )
    .unwrap();

    db.execute(Plan::DropTable(DropTablePlan { table: "t".into() })).unwrap();

    let db_dir = dir.path().join("testdb");
    assert!(!db_dir.join("t").exists());
    assert!(!db_dir.join("t_idx").exists());
    let err = db.scan_all("t").unwrap_err();
    assert_eq!(err.code(), ErrorCode::Schema);
}

#[test]
fn error_kinds_surface_as_specified() {
    let dir = TempDir::new().unwrap();
    let mut db = manager(&dir);

    // unknown table
    let err = db.scan_all("nope").unwrap_err();
    assert_eq!(err.code(), ErrorCode::Schema);

    db.create_table(
        "t",
        vec![
            ColumnDef::new("id", FieldType::Int).key().indexed(IndexKind::BTree),
            ColumnDef::new("ciudad", FieldType::Char(8)),
            ColumnDef::new("pos", FieldType::ArrayFloat(2)),
        ],
    )
    .unwrap();

    // HASH cannot be a primary index
    let err = db
        .create_table(
            "h",
            vec![ColumnDef::new("id", FieldType::Int).key().indexed(IndexKind::Hash)],
        )
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Schema);

    // SEQUENTIAL cannot be a secondary index
    let err = db.create_index("t", "ciudad", IndexKind::Sequential).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Schema);

    // no secondary index on the primary key
    let err = db.create_index("t", "id", IndexKind::BTree).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Schema);

    // RTREE needs a 2-D point column
    let err = db.create_index("t", "ciudad", IndexKind::RTree).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Schema);

    // range over a HASH path is unsupported
    db.create_index("t", "ciudad", IndexKind::Hash).unwrap();
    let err = db
        .range_search("t", Some("ciudad"), &Value::Str("A".into()), &Value::Str("Z".into()))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Unsupported);

    // spatial queries need an RTREE
    let err = db.radius_search("t", "pos", (0.0, 0.0), 1.0).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Unsupported);

    // dropping the primary index is forbidden
    let err = db.drop_index_by_name("t_id_btree").unwrap_err();
    assert_eq!(err.code(), ErrorCode::Schema);

    // unrepresentable value
    let err = db
        .execute(Plan::Insert(InsertPlan {
            table: "t".into(),
            columns: None,
            values: vec![
                Value::Int(1 << 40),
                Value::Str("x".into()),
                Value::ArrayFloat(vec![0.0, 0.0]),
            ],
        }))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Encoding);
}

#[test]
fn select_without_where_scans_everything() {
    let dir = TempDir::new().unwrap();
    let mut db = manager(&dir);
    db.create_table(
        "t",
        vec![ColumnDef::new("id", FieldType::Int).key().indexed(IndexKind::Isam)],
    )
    .unwrap();
    for i in 1..=15 {
        db.insert("t", &pagedb::Record::new(vec![Value::Int(i)])).unwrap();
    }
    let result = db
        .execute(Plan::Select(SelectPlan {
            table: "t".into(),
            columns: None,
            where_clause: None,
        }))
        .unwrap();
    let PlanOutput::Rows(rows) = result.data else { panic!("expected rows") };
    assert_eq!(rows.len(), 15);
    assert_eq!(rows.columns, vec!["id".to_string()]);
}

#[test]
fn unindexed_equality_falls_back_to_scan() {
    let dir = TempDir::new().unwrap();
    let mut db = manager(&dir);
    db.create_table(
        "t",
        vec![
            ColumnDef::new("id", FieldType::Int).key().indexed(IndexKind::BTree),
            ColumnDef::new("ciudad", FieldType::Char(8)),
        ],
    )
    .unwrap();
    for (i, c) in ["Lima", "Cusco", "Lima"].iter().enumerate() {
        db.insert(
            "t",
            &pagedb::Record::new(vec![Value::Int(i as i64 + 1), Value::Str(c.to_string())]),
        )
        .unwrap();
    }
    let hits = db.search("t", Some("ciudad"), &Value::Str("Lima".into())).unwrap().data;
    assert_eq!(hits.len(), 2);
}
