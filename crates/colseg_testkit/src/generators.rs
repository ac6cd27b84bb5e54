//! Property-based test generators using proptest.
//!
//! Provides strategies for generating segments that pass `MemSegment`
//! validation: unique column names, one pack per 65536 rows, and pack row
//! counts adding up to the segment's row count.

use crate::fixtures::pack_rows;
use colseg_core::{
    format::PACK_ROW_COUNT, ColumnSchema, MemColumn, MemPack, MemSegment, SegmentMode,
    SegmentSchema, SqlType,
};
use proptest::prelude::*;

/// Strategy for generating column SQL types.
pub fn sql_type_strategy() -> impl Strategy<Value = SqlType> {
    prop_oneof![
        Just(SqlType::Int),
        Just(SqlType::BigInt),
        Just(SqlType::Float),
        Just(SqlType::Double),
        Just(SqlType::VarChar),
        Just(SqlType::Date),
        Just(SqlType::Time),
        Just(SqlType::DateTime),
    ]
}

/// Strategy for generating segment modes.
pub fn segment_mode_strategy() -> impl Strategy<Value = SegmentMode> {
    prop_oneof![Just(SegmentMode::Plain), Just(SegmentMode::Compressed)]
}

/// Strategy for generating valid column names.
pub fn column_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,15}").expect("Invalid regex")
}

/// Strategy for generating schemas of `1..=max_columns` uniquely named
/// columns in arbitrary order.
pub fn schema_strategy(max_columns: usize) -> impl Strategy<Value = SegmentSchema> {
    prop::collection::btree_map(
        column_name_strategy(),
        (sql_type_strategy(), any::<bool>()),
        1..=max_columns,
    )
    .prop_map(|columns| {
        columns
            .into_iter()
            .map(|(name, (sql_type, is_indexed))| ColumnSchema::new(name, sql_type, is_indexed))
            .collect::<Vec<_>>()
    })
    .prop_shuffle()
    .prop_map(|columns| SegmentSchema::new(columns).expect("Names are unique"))
}

/// Strategy for one pack of `rows` rows with small random sections.
pub fn pack_strategy(rows: u32) -> impl Strategy<Value = MemPack> {
    (
        prop::collection::vec(any::<u8>(), 0..64),
        prop::collection::vec(any::<u8>(), 0..16),
        prop::collection::vec(any::<u8>(), 0..8),
        any::<i64>(),
        any::<i64>(),
        0..=rows,
    )
        .prop_map(move |(data, index, ext_index, a, b, nulls)| {
            MemPack::new(rows, data)
                .with_index(index)
                .with_ext_index(ext_index)
                .with_bounds(a.min(b), a.max(b))
                .with_nulls(nulls)
        })
}

/// Strategy for one column holding `row_count` rows.
pub fn column_strategy(row_count: u64) -> impl Strategy<Value = MemColumn> {
    let packs: Vec<_> = pack_rows(row_count).into_iter().map(pack_strategy).collect();
    (packs, prop::collection::vec(any::<u8>(), 0..32))
        .prop_map(|(packs, outer_index)| MemColumn::new(packs).with_outer_index(outer_index))
}

/// Strategy for whole segments of up to `max_columns` columns and up to
/// three packs per column.
pub fn mem_segment_strategy(max_columns: usize) -> impl Strategy<Value = MemSegment> {
    (
        schema_strategy(max_columns),
        0..=PACK_ROW_COUNT * 3,
        any::<u32>(),
        segment_mode_strategy(),
    )
        .prop_flat_map(|(schema, row_count, version, mode)| {
            let columns: Vec<_> = (0..schema.len())
                .map(|_| column_strategy(row_count))
                .collect();
            (
                Just(schema),
                Just(row_count),
                Just(version),
                Just(mode),
                columns,
            )
        })
        .prop_map(|(schema, row_count, version, mode, columns)| {
            MemSegment::new("seg_prop", schema, row_count, columns)
                .expect("Generated segment is valid")
                .with_version(version)
                .with_mode(mode)
        })
}
