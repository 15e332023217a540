//! End-to-end scenarios through the catalog and the raw index structures

use pagedb::plan::{ColumnDef, IndexKind, Plan, PlanOutput, SelectPlan, WherePredicate};
use pagedb::record::{Record, Schema};
use pagedb::storage::btree::BPlusTree;
use pagedb::storage::hash::{ExtendibleHash, HashConfig};
use pagedb::types::{FieldType, Value};
use pagedb::util::hash::fnv1a;
use pagedb::DatabaseManager;
use tempfile::TempDir;

fn manager(dir: &TempDir) -> DatabaseManager {
    DatabaseManager::new(dir.path(), "testdb").unwrap()
}

fn sales_columns(primary: IndexKind) -> Vec<ColumnDef> {
    vec![
        ColumnDef::new("id", FieldType::Int).key().indexed(primary),
        ColumnDef::new("nombre", FieldType::Char(20)),
        ColumnDef::new("precio", FieldType::Float),
        ColumnDef::new("fecha", FieldType::Date),
    ]
}

fn sale(id: i64, nombre: &str, precio: f64) -> Record {
    Record::new(vec![
        Value::Int(id),
        Value::Str(nombre.into()),
        Value::Float(precio),
        Value::Str("2023-11-01".into()),
    ])
}

// Scenario 1: sequential primary, 1000 ordered inserts, range [200, 400]
#[test]
fn sequential_primary_thousand_inserts() {
    let dir = TempDir::new().unwrap();
    let mut db = manager(&dir);
    db.create_table("ventas", sales_columns(IndexKind::Sequential)).unwrap();

    let mut rebuilds = 0;
    for id in 1..=1000 {
        let result = db.insert("ventas", &sale(id, "x", 1.0)).unwrap();
        assert!(result.data, "insert {} should succeed", id);
        if result.rebuild_triggered {
            rebuilds += 1;
        }
    }
    assert!(rebuilds >= 1, "the auxiliary area must trigger rebuilds");

    let result = db
        .range_search("ventas", None, &Value::Int(200), &Value::Int(400))
        .unwrap();
    assert_eq!(result.data.len(), 201);
    let ids: Vec<i64> = result.data.iter().map(|r| r.values[0].as_int().unwrap()).collect();
    assert_eq!(ids, (200..=400).collect::<Vec<i64>>());
}

// Scenario 2: clustered B+-tree of order 4 over five keys
#[test]
fn btree_order_four_basic_flow() {
    let dir = TempDir::new().unwrap();
    let schema = Schema::new(
        vec![("id", FieldType::Int), ("nombre", FieldType::Char(16))],
        "id",
    )
    .unwrap();
    let mut tree = BPlusTree::open(dir.path().join("t"), schema, Some(4)).unwrap();

    for id in [10, 20, 30, 40, 50] {
        let rec = Record::new(vec![Value::Int(id), Value::Str(format!("r{}", id))]);
        assert!(tree.insert(&rec).unwrap().data.inserted);
    }

    let found = tree.search(&Value::Int(30)).unwrap().data.unwrap();
    assert_eq!(found.values[0], Value::Int(30));

    assert!(tree.remove(&Value::Int(20)).unwrap().data);
    assert!(tree.search(&Value::Int(20)).unwrap().data.is_none());

    let range = tree.range_search(&Value::Int(10), &Value::Int(40)).unwrap().data;
    assert_eq!(range.len(), 3);
}

// Scenario 3: unclustered B+-tree over a CHAR column with duplicates
#[test]
fn secondary_btree_with_duplicate_values() {
    let dir = TempDir::new().unwrap();
    let mut db = manager(&dir);
    db.create_table(
        "personas",
        vec![
            ColumnDef::new("id", FieldType::Int).key().indexed(IndexKind::Isam),
            ColumnDef::new("ciudad", FieldType::Char(16)),
        ],
    )
    .unwrap();
    db.create_index("personas", "ciudad", IndexKind::BTree).unwrap();

    let cities = [
        "Tokyo", "Tokyo", "London", "Paris", "Lima", "Quito", "Bogota", "Madrid", "Roma", "Oslo",
    ];
    for (i, city) in cities.iter().enumerate() {
        let rec = Record::new(vec![Value::Int(i as i64 + 1), Value::Str(city.to_string())]);
        assert!(db.insert("personas", &rec).unwrap().data);
    }

    let tokyo = db
        .search("personas", Some("ciudad"), &Value::Str("Tokyo".into()))
        .unwrap()
        .data;
    assert_eq!(tokyo.len(), 2);

    // removing one of the two leaves the other findable
    let victim_id = tokyo[0].values[0].clone();
    let removed = db
        .delete(
            "personas",
            &WherePredicate::Eq {
                column: "id".into(),
                value: victim_id,
            },
        )
        .unwrap();
    assert_eq!(removed.data, 1);

    let tokyo = db
        .search("personas", Some("ciudad"), &Value::Str("Tokyo".into()))
        .unwrap()
        .data;
    assert_eq!(tokyo.len(), 1);
}

// Scenario 4: extendible hash with one clustered slot doubles the directory
#[test]
fn hash_clustered_inserts_double_directory() {
    let dir = TempDir::new().unwrap();
    let mut idx = ExtendibleHash::open(
        dir.path().join("h"),
        FieldType::Char(12),
        FieldType::Int,
        HashConfig {
            block_factor: 8,
            max_overflow: 2,
        },
    )
    .unwrap();
    let initial_depth = idx.global_depth();

    // 64 values that all land in the same initial directory slot
    let clustered: Vec<String> = (0..)
        .map(|i| format!("k{}", i))
        .filter(|s| fnv1a(s.as_bytes()) % (1u64 << initial_depth) == 5)
        .take(64)
        .collect();
    for (i, v) in clustered.iter().enumerate() {
        idx.insert(&Value::Str(v.clone()), &Value::Int(i as i64 + 1)).unwrap();
    }

    assert!(idx.global_depth() > initial_depth, "directory must have doubled");
    for (i, v) in clustered.iter().enumerate() {
        let pks = idx.search(&Value::Str(v.clone())).unwrap().data;
        assert_eq!(pks, vec![Value::Int(i as i64 + 1)], "key {}", v);
    }
}

// Scenario 5: R-tree nearest and radius over five points
#[test]
fn rtree_nearest_and_radius() {
    let dir = TempDir::new().unwrap();
    let mut db = manager(&dir);
    db.create_table(
        "lugares",
        vec![
            ColumnDef::new("id", FieldType::Int).key().indexed(IndexKind::BTree),
            ColumnDef::new("pos", FieldType::ArrayFloat(2)).indexed(IndexKind::RTree),
        ],
    )
    .unwrap();

    let points = [(0.0, 0.0), (1.0, 1.0), (10.0, 10.0), (10.5, 9.8), (50.0, 50.0)];
    for (i, (x, y)) in points.iter().enumerate() {
        let rec = Record::new(vec![Value::Int(i as i64 + 1), Value::ArrayFloat(vec![*x, *y])]);
        assert!(db.insert("lugares", &rec).unwrap().data);
    }

    let nearest = db.knn_search("lugares", "pos", (10.0, 10.0), 2).unwrap().data;
    let ids: Vec<i64> = nearest.iter().map(|r| r.values[0].as_int().unwrap()).collect();
    assert_eq!(ids, vec![3, 4]);

    let within = db.radius_search("lugares", "pos", (0.0, 0.0), 2.0).unwrap().data;
    let ids: Vec<i64> = within.iter().map(|r| r.values[0].as_int().unwrap()).collect();
    assert_eq!(ids, vec![1, 2]);
}

// Scenario 6: ISAM primary + secondary BTREE range equals the filtered scan
#[test]
fn secondary_range_matches_full_scan() {
    let dir = TempDir::new().unwrap();
    let mut db = manager(&dir);
    db.create_table(
        "clientes",
        vec![
            ColumnDef::new("id", FieldType::Int).key().indexed(IndexKind::Isam),
            ColumnDef::new("country", FieldType::Char(16)),
        ],
    )
    .unwrap();

    let countries = [
        "Argentina", "Brasil", "Chile", "Alemania", "Belgica", "Canada", "Dinamarca", "Ecuador",
        "Austria", "Colombia", "Francia", "Bolivia",
    ];
    for (i, country) in countries.iter().enumerate() {
        let rec = Record::new(vec![Value::Int(i as i64 + 1), Value::Str(country.to_string())]);
        assert!(db.insert("clientes", &rec).unwrap().data);
    }
    db.create_index("clientes", "country", IndexKind::BTree).unwrap();

    let lo = Value::Str("A".into());
    let hi = Value::Str("D".into());
    let indexed = db
        .range_search("clientes", Some("country"), &lo, &hi)
        .unwrap();

    // the same answer computed without the index
    let mut expected: Vec<String> = countries
        .iter()
        .copied()
        .filter(|c| *c >= "A" && *c <= "D")
        .map(|c| c.to_string())
        .collect();
    expected.sort();
    let mut got: Vec<String> = indexed
        .data
        .iter()
        .map(|r| r.values[1].as_str().unwrap().to_string())
        .collect();
    let mut got_sorted = got.clone();
    got_sorted.sort();
    assert_eq!(got_sorted, expected);
    // the secondary returns them in value order already
    assert_eq!(got.remove(0), "Alemania");

    // the breakdown must report reads against both indexes
    let breakdown = indexed.breakdown.expect("routed query has a breakdown");
    let secondary = breakdown.get("secondary_country").expect("secondary slice");
    let primary = breakdown.get("primary").expect("primary slice");
    assert!(secondary.reads > 0);
    assert!(primary.reads > 0);
    assert_eq!(
        breakdown.totals().reads,
        indexed.reads,
        "slice sums equal the totals"
    );
}

// Plans drive the same flows end to end
#[test]
fn select_plan_with_projection() {
    let dir = TempDir::new().unwrap();
    let mut db = manager(&dir);
    db.create_table("ventas", sales_columns(IndexKind::BTree)).unwrap();
    for id in 1..=10 {
        db.insert("ventas", &sale(id, &format!("p{}", id), id as f64)).unwrap();
    }

    let result = db
        .execute(Plan::Select(SelectPlan {
            table: "ventas".into(),
            columns: Some(vec!["nombre".into(), "id".into()]),
            where_clause: Some(WherePredicate::Between {
                column: "id".into(),
                low: Value::Int(3),
                high: Value::Int(5),
            }),
        }))
        .unwrap();

    let PlanOutput::Rows(rows) = result.data else {
        panic!("expected rows");
    };
    assert_eq!(rows.columns, vec!["nombre".to_string(), "id".to_string()]);
    assert_eq!(rows.len(), 3);
    assert_eq!(rows.rows[0], vec![Value::Str("p3".into()), Value::Int(3)]);
}
