/// Column table tests: construction, column management, atomic appends,
/// expression evaluation and filtered row iteration.
use std::sync::Arc;

use anyhow::bail;
use carray_codecs::{Lz4Codec, ZstdCodec};
use carray_core::{
    Array, ArrayOptions, CArray, CTable, Codec, ColumnData, DType, Error, Row, Rows, ScalarKind,
    Value, Vars, NROW,
};

fn opts(chunklen: usize) -> ArrayOptions {
    ArrayOptions::new(Arc::new(ZstdCodec)).chunklen(chunklen)
}

fn ab_table() -> CTable {
    CTable::from_columns(
        vec![vec![1i64, 2, 3, 4].into(), vec![10i64, 20, 30, 40].into()],
        Some(vec!["a".into(), "b".into()]),
        opts(3),
    )
    .unwrap()
}

fn collect_rows(iter: impl Iterator<Item = carray_core::Result<Row>>) -> Vec<Vec<Value>> {
    iter.map(|r| r.unwrap().into_values()).collect()
}

/// Fails every compression call.
struct FailingCodec;

impl Codec for FailingCodec {
    fn id(&self) -> u16 {
        999
    }

    fn name(&self) -> &'static str {
        "failing"
    }

    fn version(&self) -> String {
        "0".into()
    }

    fn compress_block(&self, _raw: &[u8], _clevel: u8) -> anyhow::Result<Vec<u8>> {
        bail!("injected compression failure")
    }

    fn decompress_block(&self, compressed: &[u8], _raw_len: usize) -> anyhow::Result<Vec<u8>> {
        Ok(compressed.to_vec())
    }
}

/// Stores blocks as-is but refuses to read them back.
struct UnreadableCodec;

impl Codec for UnreadableCodec {
    fn id(&self) -> u16 {
        998
    }

    fn name(&self) -> &'static str {
        "unreadable"
    }

    fn version(&self) -> String {
        "0".into()
    }

    fn compress_block(&self, raw: &[u8], _clevel: u8) -> anyhow::Result<Vec<u8>> {
        Ok(raw.to_vec())
    }

    fn decompress_block(&self, _compressed: &[u8], _raw_len: usize) -> anyhow::Result<Vec<u8>> {
        bail!("injected decompression failure")
    }
}

// ── construction ──────────────────────────────────────────────────────────

#[test]
fn scenario_eval_and_filter() {
    let t = ab_table();
    assert_eq!(t.len(), 4);
    assert_eq!(t.names(), ["a", "b"]);

    let sum = t.eval("a+b").unwrap();
    assert_eq!(sum.len(), 4);
    assert_eq!(sum.to_vec::<i64>().unwrap(), vec![11, 22, 33, 44]);

    let rows = collect_rows(t.filter("a>2", Some(&["a"])).unwrap());
    assert_eq!(rows, vec![vec![Value::Int64(3)], vec![Value::Int64(4)]]);
}

#[test]
fn default_names_and_schema() {
    let t = CTable::from_columns(
        vec![vec![1.5f32, 2.5].into(), vec![true, false].into()],
        None,
        opts(8),
    )
    .unwrap();
    assert_eq!(t.names(), ["f0", "f1"]);
    assert_eq!(
        t.dtype(),
        vec![
            ("f0".to_string(), DType::scalar(ScalarKind::Float32)),
            ("f1".to_string(), DType::scalar(ScalarKind::Bool)),
        ]
    );
    assert_eq!(t.shape(), vec![2]);
}

#[test]
fn from_columns_rejects_unequal_lengths() {
    let err = CTable::from_columns(
        vec![vec![1i32, 2, 3].into(), vec![1i32].into()],
        None,
        opts(8),
    )
    .unwrap_err();
    assert!(matches!(err, Error::LengthMismatch { expected: 3, actual: 1 }));
}

#[test]
fn from_records_builds_in_batches() {
    let schema = [
        ("id", DType::scalar(ScalarKind::Int32)),
        ("score", DType::scalar(ScalarKind::Float64)),
    ];
    let records = (0..25).map(|i| vec![Value::Int64(i), Value::Float64(i as f64 / 2.0)]);
    let t = CTable::from_records(&schema, records, opts(4)).unwrap();
    assert_eq!(t.len(), 25);
    let id = t.column("id").unwrap();
    assert_eq!(id.nchunks(), 6);
    assert_eq!(id.to_vec::<i32>().unwrap(), (0..25).collect::<Vec<_>>());
    assert_eq!(t.get_row(7).unwrap().get("score"), Some(&Value::Float64(3.5)));
}

// ── column management ─────────────────────────────────────────────────────

#[test]
fn addcol_by_name_and_position() {
    let mut t = ab_table();
    t.addcol(vec![0u8, 1, 0, 1], Some("flag"), None).unwrap();
    t.addcol(vec![5i16; 4], None, Some(0)).unwrap();
    assert_eq!(t.names(), ["f0", "a", "b", "flag"]);
    t.addcol(vec![9i16; 4], Some("mid"), Some(2)).unwrap();
    assert_eq!(t.names(), ["f0", "a", "mid", "b", "flag"]);
    t.validate().unwrap();
}

#[test]
fn addcol_errors_leave_table_untouched() {
    let mut t = ab_table();
    assert!(matches!(
        t.addcol(vec![1i64; 4], None, None),
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        t.addcol(vec![1i64; 4], Some("a"), None),
        Err(Error::DuplicateName(n)) if n == "a"
    ));
    assert!(matches!(
        t.addcol(vec![1i64; 3], Some("c"), None),
        Err(Error::LengthMismatch { expected: 4, actual: 3 })
    ));
    assert!(matches!(
        t.addcol(vec![1i64; 4], Some("c"), Some(7)),
        Err(Error::InvalidArgument(_))
    ));
    for bad in ["1x", "has space", "__hidden", NROW, ""] {
        assert!(t.addcol(vec![1i64; 4], Some(bad), None).is_err(), "{bad}");
    }
    assert_eq!(t.names(), ["a", "b"]);
}

#[test]
fn delcol_by_name_or_position() {
    let mut t = ab_table();
    t.addcol(vec![7i64; 4], Some("c"), None).unwrap();

    let b = t.delcol(Some("b"), None).unwrap();
    assert_eq!(b.to_vec::<i64>().unwrap(), vec![10, 20, 30, 40]);
    assert_eq!(t.names(), ["a", "c"]);

    assert!(t.delcol(Some("c"), Some(0)).is_err());
    assert!(t.delcol(Some("nope"), None).is_err());
    assert!(t.delcol(None, Some(2)).is_err());
    assert!(t.delcol(None, None).is_err());

    t.delcol(None, Some(1)).unwrap();
    t.delcol(Some("a"), Some(0)).unwrap();
    assert_eq!(t.ncols(), 0);
    assert_eq!(t.len(), 0);
}

#[test]
fn moved_in_column_keeps_its_layout() {
    let col = CArray::from_slice(&[1u32, 2, 3], &ArrayOptions::new(Arc::new(Lz4Codec)).chunklen(2)).unwrap();
    let mut t = CTable::new(opts(100));
    t.addcol(col, Some("x"), None).unwrap();
    let x = t.column("x").unwrap();
    assert_eq!(x.chunklen(), 2);
    assert_eq!(x.codec().name(), "lz4");
}

// ── appends ───────────────────────────────────────────────────────────────

#[test]
fn append_records_columns_and_tables() {
    let mut t = ab_table();
    let n = t
        .append(Rows::Records(vec![
            vec![Value::Int64(5), Value::Int64(50)],
            vec![Value::Int32(6), Value::UInt8(60)],
        ]))
        .unwrap();
    assert_eq!(n, 2);

    t.append(Rows::Columns(vec![
        Array::from_vec(vec![7i64]),
        Array::from_vec(vec![70i32]),
    ]))
    .unwrap();

    let other = ab_table();
    assert_eq!(t.append(Rows::Table(&other)).unwrap(), 4);

    assert_eq!(t.len(), 11);
    assert_eq!(
        t.column("a").unwrap().to_vec::<i64>().unwrap(),
        vec![1, 2, 3, 4, 5, 6, 7, 1, 2, 3, 4]
    );
    assert_eq!(
        t.column("b").unwrap().to_vec::<i64>().unwrap(),
        vec![10, 20, 30, 40, 50, 60, 70, 10, 20, 30, 40]
    );
    t.validate().unwrap();
}

#[test]
fn append_rejects_bad_batches() {
    let mut t = ab_table();
    assert!(t.append(Rows::Records(vec![vec![Value::Int64(1)]])).is_err());
    assert!(matches!(
        t.append(Rows::Records(vec![vec![Value::Float64(1.5), Value::Int64(1)]])),
        Err(Error::TypeMismatch(_))
    ));
    assert!(matches!(
        t.append(Rows::Columns(vec![
            Array::from_vec(vec![1i64, 2]),
            Array::from_vec(vec![1i64]),
        ])),
        Err(Error::LengthMismatch { .. })
    ));
    let renamed = CTable::from_columns(
        vec![vec![1i64].into(), vec![1i64].into()],
        Some(vec!["a".into(), "z".into()]),
        opts(3),
    )
    .unwrap();
    assert!(t.append(Rows::Table(&renamed)).is_err());
    assert_eq!(t.len(), 4);
    t.validate().unwrap();
}

#[test]
fn failed_append_rolls_back_every_column() {
    let good = CArray::empty(DType::scalar(ScalarKind::Int64), &opts(4)).unwrap();
    let bad_opts = ArrayOptions::new(Arc::new(FailingCodec)).chunklen(4);
    let bad = CArray::empty(DType::scalar(ScalarKind::Int64), &bad_opts).unwrap();

    let mut t = CTable::new(opts(4));
    t.addcol(good, Some("good"), None).unwrap();
    t.addcol(bad, Some("bad"), None).unwrap();

    // Fits in the leftover buffers: nothing is compressed yet.
    t.append(Rows::Columns(vec![
        Array::from_vec(vec![1i64, 2]),
        Array::from_vec(vec![1i64, 2]),
    ]))
    .unwrap();

    let batch: Vec<i64> = (3..10).collect();
    let err = t
        .append(Rows::Columns(vec![
            Array::from_vec(batch.clone()),
            Array::from_vec(batch),
        ]))
        .unwrap_err();
    assert_eq!(err.code(), "COMPRESSION_ERROR");

    assert_eq!(t.len(), 2);
    let good = t.column("good").unwrap();
    assert_eq!(good.len(), 2);
    assert_eq!(good.nchunks(), 0);
    assert_eq!(good.to_vec::<i64>().unwrap(), vec![1, 2]);
    assert_eq!(t.column("bad").unwrap().len(), 2);
    t.validate().unwrap();
}

#[test]
fn trim_and_resize_apply_to_every_column() {
    let mut t = ab_table();
    t.resize(6).unwrap();
    assert_eq!(t.column("b").unwrap().to_vec::<i64>().unwrap(), vec![10, 20, 30, 40, 0, 0]);
    t.trim(3).unwrap();
    assert_eq!(t.len(), 3);
    assert_eq!(t.column("a").unwrap().to_vec::<i64>().unwrap(), vec![1, 2, 3]);
    assert!(t.trim(4).is_err());
    t.validate().unwrap();
}

#[test]
fn failed_shrink_leaves_every_column_intact() {
    let rows: Vec<i64> = (0..10).collect();
    let good = CArray::from_slice(&rows, &opts(4)).unwrap();
    let bad_opts = ArrayOptions::new(Arc::new(UnreadableCodec)).chunklen(4);
    let bad = CArray::from_slice(&rows, &bad_opts).unwrap();

    let mut t = CTable::new(opts(4));
    t.addcol(good, Some("good"), None).unwrap();
    t.addcol(bad, Some("bad"), None).unwrap();

    // The cut lands inside the second chunk, which "bad" cannot decompress.
    let err = t.resize(6).unwrap_err();
    assert_eq!(err.code(), "COMPRESSION_ERROR");
    assert_eq!(t.len(), 10);
    let good = t.column("good").unwrap();
    assert_eq!(good.len(), 10);
    assert_eq!(good.nchunks(), 2);
    assert_eq!(good.to_vec::<i64>().unwrap(), rows);
    assert_eq!(t.column("bad").unwrap().len(), 10);
    t.validate().unwrap();

    // Cuts on a chunk boundary need no decompression.
    t.resize(4).unwrap();
    assert_eq!(t.len(), 4);
    assert_eq!(t.column("good").unwrap().to_vec::<i64>().unwrap(), vec![0, 1, 2, 3]);
    t.validate().unwrap();
}

#[test]
fn float32_columns_reject_out_of_range_values() {
    let mut t = CTable::from_columns(vec![vec![1.5f32].into()], Some(vec!["x".into()]), opts(4)).unwrap();
    assert!(matches!(
        t.append(Rows::Records(vec![vec![Value::Float64(1e300)]])),
        Err(Error::TypeMismatch(_))
    ));
    assert!(matches!(
        t.append(Rows::Records(vec![vec![Value::Int64(16_777_217)]])),
        Err(Error::TypeMismatch(_))
    ));
    assert_eq!(t.len(), 1);

    t.append(Rows::Records(vec![vec![Value::Float64(0.1)], vec![Value::Int64(3)]])).unwrap();
    assert_eq!(t.column("x").unwrap().to_vec::<f32>().unwrap(), vec![1.5, 0.1, 3.0]);
    t.validate().unwrap();
}

// ── evaluation ────────────────────────────────────────────────────────────

#[test]
fn eval_with_extra_variables() {
    let t = ab_table();
    let k = Array::from_vec(vec![1.0f64, 0.5, 0.25, 0.0]);
    let vars = Vars::new().with("k", &k).with("off", Value::Int64(1));
    let out = t.eval_with("b * k + off", &vars).unwrap();
    assert_eq!(out.to_vec::<f64>().unwrap(), vec![11.0, 11.0, 8.5, 1.0]);

    let clash = Vars::new().with("a", Value::Int64(0));
    assert!(matches!(t.eval_with("a", &clash), Err(Error::InvalidArgument(_))));
}

#[test]
fn constant_expression_is_broadcast() {
    let t = ab_table();
    let out = t.eval("2 * 3").unwrap();
    assert_eq!(out.to_vec::<i64>().unwrap(), vec![6; 4]);
}

#[test]
fn eval_reports_unknown_names() {
    let t = ab_table();
    assert!(matches!(t.eval("a + c"), Err(Error::UnknownVariable(n)) if n == "c"));
    assert!(matches!(t.eval("a +* b"), Err(Error::Expression(_))));
}

// ── iteration ─────────────────────────────────────────────────────────────

#[test]
fn iter_with_row_numbers_and_stride() {
    let t = ab_table();
    let it = t.iter(1, None, 2, Some(&[NROW, "b"])).unwrap();
    assert_eq!(it.names(), [NROW, "b"]);
    let rows = collect_rows(it);
    assert_eq!(
        rows,
        vec![
            vec![Value::Int64(1), Value::Int64(20)],
            vec![Value::Int64(3), Value::Int64(40)],
        ]
    );
    assert!(t.iter(0, None, 0, None).is_err());
    assert!(t.iter(0, None, 1, Some(&["missing"])).is_err());
}

#[test]
fn rows_yield_named_values() {
    let t = ab_table();
    let first = t.rows().unwrap().next().unwrap().unwrap();
    assert_eq!(first.get("b"), Some(&Value::Int64(10)));
    assert_eq!(first[0], Value::Int64(1));
    assert_eq!(first.to_string(), "(a=1, b=10)");
    assert_eq!(t.rows().unwrap().count(), 4);
}

#[test]
fn filter_with_mask_and_row_numbers() {
    let t = ab_table();
    let mask = CArray::from_slice(&[true, false, false, true], &opts(2)).unwrap();
    let rows = collect_rows(t.filter(&mask, Some(&[NROW])).unwrap());
    assert_eq!(rows, vec![vec![Value::Int64(0)], vec![Value::Int64(3)]]);

    assert!(matches!(t.filter("a + b", None), Err(Error::TypeMismatch(_))));
    let short = CArray::from_slice(&[true], &opts(2)).unwrap();
    assert!(matches!(t.filter(&short, None), Err(Error::LengthMismatch { .. })));
}

#[test]
fn filter_spanning_many_chunks() {
    let n = 1_000i64;
    let t = CTable::from_columns(
        vec![(0..n).collect::<Vec<i64>>().into(), (0..n).map(|v| v * v).collect::<Vec<i64>>().into()],
        Some(vec!["x".into(), "sq".into()]),
        opts(64),
    )
    .unwrap();
    let hits: Vec<i64> = t
        .filter("(x % 100 == 0) | (x > 995)", Some(&["sq"]))
        .unwrap()
        .map(|r| r.unwrap()[0].as_i64().unwrap())
        .collect();
    let want: Vec<i64> = (0..n).filter(|x| x % 100 == 0 || *x > 995).map(|x| x * x).collect();
    assert_eq!(hits, want);
}

// ── copies ────────────────────────────────────────────────────────────────

#[test]
fn copy_and_select_are_independent() {
    let t = ab_table();
    let new_opts = ArrayOptions::new(Arc::new(Lz4Codec)).chunklen(2);
    let mut c = t.copy(Some(&new_opts)).unwrap();
    assert_eq!(c.column("a").unwrap().chunklen(), 2);
    c.append(Rows::Records(vec![vec![Value::Int64(0), Value::Int64(0)]])).unwrap();
    assert_eq!(c.len(), 5);
    assert_eq!(t.len(), 4);

    let s = t.select(&["b"]).unwrap();
    assert_eq!(s.names(), ["b"]);
    assert_eq!(s.column("b").unwrap().to_vec::<i64>().unwrap(), vec![10, 20, 30, 40]);
    assert!(t.select(&["zz"]).is_err());
}

#[test]
fn get_row_bounds() {
    let t = ab_table();
    assert_eq!(t.get_row(3).unwrap().into_values(), vec![Value::Int64(4), Value::Int64(40)]);
    assert!(matches!(t.get_row(4), Err(Error::InvalidArgument(_))));
}

#[test]
fn display_lists_schema() {
    let t = ab_table();
    let text = t.to_string();
    assert!(text.starts_with("ctable((4,), [('a', 'int64'), ('b', 'int64')])"), "{text}");
    assert!(text.contains("(a=3, b=30)"));
}

#[test]
fn display_elides_only_past_one_hundred_rows() {
    let full = CTable::from_columns(vec![(0..100i32).collect::<Vec<_>>().into()], Some(vec!["x".into()]), opts(16)).unwrap();
    let text = full.to_string();
    assert!(!text.contains("..."), "{text}");
    assert!(text.contains("(x=50)"));

    let long = CTable::from_columns(vec![(0..101i32).collect::<Vec<_>>().into()], Some(vec!["x".into()]), opts(16)).unwrap();
    let text = long.to_string();
    assert!(text.contains("(x=2),\n ...\n (x=98)"), "{text}");
    assert!(!text.contains("(x=50)"));
}

#[test]
fn column_data_conversions() {
    let c: ColumnData = CArray::from_slice(&[1i8], &opts(4)).unwrap().into();
    assert!(matches!(c, ColumnData::CArray(_)));
    let a: ColumnData = Array::from_vec(vec![1i8]).into();
    assert!(matches!(a, ColumnData::Array(_)));
}
