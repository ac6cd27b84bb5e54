//! The integrate protocol: one segment, one file.
//!
//! [`write`] lays out every column section by section and closes the file
//! with a footer and trailer. [`read`] reverses only the footer; column data
//! is never touched until a segment is opened.

use crate::dpn::{encode_dpns, DataPackNode};
use crate::error::{SegmentError, SegmentResult};
use crate::format::{footer_crc32, Trailer, LAYOUT_VERSION, TRAILER_SIZE};
use crate::mem::{MemColumn, MemSegment};
use crate::meta::{ColumnMeta, SegmentMeta, COLUMN_FIXED_SIZE, FOOTER_TAIL_SIZE};
use colseg_storage::{ReadOpener, StorageBackend, WriteOpener};
use tracing::debug;

/// Writes `segment` through a writer obtained from `opener`.
///
/// The destination is truncated first. Nothing is done to make the write
/// atomic; publish through a temporary name and a rename if readers may race
/// with the writer.
///
/// # Errors
///
/// Returns [`SegmentError::Storage`] if the writer fails, or
/// [`SegmentError::InvalidSegment`] if a column name does not fit the footer.
pub fn write(segment: &MemSegment, opener: &dyn WriteOpener) -> SegmentResult<SegmentMeta> {
    let predicted = predicted_size(segment);
    let mut writer = opener.create(predicted)?;

    let schema = segment.schema().columns();
    let mut column_infos = Vec::with_capacity(schema.len());
    let mut column_node_infos = Vec::with_capacity(schema.len());

    for (column_schema, column) in schema.iter().zip(segment.columns()) {
        let dpns = build_dpns(column);

        let dpn_offset = write_section(writer.as_mut(), [&encode_dpns(&dpns)[..]])?;
        let index_offset =
            write_section(writer.as_mut(), column.packs.iter().map(|p| &p.index[..]))?;
        let ext_index_offset = write_section(
            writer.as_mut(),
            column.packs.iter().map(|p| &p.ext_index[..]),
        )?;
        let outer_index_offset = write_section(writer.as_mut(), [&column.outer_index[..]])?;
        let pack_offset =
            write_section(writer.as_mut(), column.packs.iter().map(|p| &p.data[..]))?;

        column_infos.push(ColumnMeta {
            name: column_schema.name.clone(),
            sql_type: column_schema.sql_type,
            is_indexed: column_schema.is_indexed,
            dpn_offset,
            index_offset,
            ext_index_offset,
            outer_index_offset,
            outer_index_size: column.outer_index.len() as u64,
            pack_offset,
        });
        column_node_infos.push(column.node_for(column_schema.sql_type));
    }

    let meta = SegmentMeta {
        version: segment.version(),
        mode: segment.mode(),
        column_count: schema.len() as u32,
        row_count: segment.row_count(),
        column_infos,
        column_node_infos,
        data_end: writer.size()?,
    };

    let footer = meta.encode_footer()?;
    let trailer = Trailer {
        footer_len: footer.len() as u64,
        footer_crc: footer_crc32(&footer),
        layout_version: LAYOUT_VERSION,
    };
    writer.append(&footer)?;
    writer.append(&trailer.encode())?;
    writer.flush()?;
    writer.sync()?;

    debug!(
        segment = segment.name(),
        destination = opener.name(),
        columns = meta.column_count,
        rows = meta.row_count,
        bytes = writer.size()?,
        predicted,
        "integrated segment written"
    );
    Ok(meta)
}

/// Reads the footer of an integrated segment.
///
/// Returns `Ok(None)` if the data is too short for a trailer or does not end
/// with the segment magic.
///
/// # Errors
///
/// Returns [`SegmentError::CorruptSegment`] if the magic is present but the
/// footer is inconsistent, [`SegmentError::UnsupportedVersion`] for a newer
/// layout, and [`SegmentError::Storage`] if reading fails.
pub fn read(reader: &dyn StorageBackend) -> SegmentResult<Option<SegmentMeta>> {
    let size = reader.size()?;
    if size < TRAILER_SIZE as u64 {
        return Ok(None);
    }

    let trailer_at = size - TRAILER_SIZE as u64;
    let trailer_bytes = reader.read_at(trailer_at, TRAILER_SIZE)?;
    let Some(trailer) = Trailer::decode(&trailer_bytes)? else {
        return Ok(None);
    };

    let data_end = trailer_at.checked_sub(trailer.footer_len).ok_or_else(|| {
        SegmentError::corrupt(format!(
            "footer length {} exceeds file of {size} bytes",
            trailer.footer_len
        ))
    })?;
    let footer_len = usize::try_from(trailer.footer_len)
        .map_err(|_| SegmentError::corrupt("footer length does not fit in memory"))?;

    let footer = reader.read_at(data_end, footer_len)?;
    let crc = footer_crc32(&footer);
    if crc != trailer.footer_crc {
        return Err(SegmentError::corrupt(format!(
            "footer checksum mismatch: expected {:08x}, got {crc:08x}",
            trailer.footer_crc
        )));
    }

    let meta = SegmentMeta::decode_footer(&footer, data_end)?;
    debug!(
        columns = meta.column_count,
        rows = meta.row_count,
        footer_len,
        "integrated segment footer read"
    );
    Ok(Some(meta))
}

/// Opens a reader from `opener` and reads the footer.
pub fn probe(opener: &dyn ReadOpener) -> SegmentResult<Option<SegmentMeta>> {
    let reader = opener.open(0)?;
    read(reader.as_ref())
}

/// Builds the DPN array, addressing each pack relative to its sections.
fn build_dpns(column: &MemColumn) -> Vec<DataPackNode> {
    let mut pack_addr = 0u64;
    let mut index_addr = 0u64;
    let mut ext_index_addr = 0u64;

    column
        .packs
        .iter()
        .map(|pack| {
            let dpn = DataPackNode {
                row_count: pack.row_count,
                null_count: pack.null_count,
                pack_addr,
                pack_size: pack.data.len() as u32,
                index_addr,
                index_size: pack.index.len() as u32,
                ext_index_addr,
                ext_index_size: pack.ext_index.len() as u32,
                min_value: pack.min_value,
                max_value: pack.max_value,
            };
            pack_addr += pack.data.len() as u64;
            index_addr += pack.index.len() as u64;
            ext_index_addr += pack.ext_index.len() as u64;
            dpn
        })
        .collect()
}

/// Appends `parts` back to back, returning the offset of the first byte.
fn write_section<'a>(
    writer: &mut dyn StorageBackend,
    parts: impl IntoIterator<Item = &'a [u8]>,
) -> SegmentResult<u64> {
    let offset = writer.size()?;
    for part in parts {
        writer.append(part)?;
    }
    Ok(offset)
}

/// Exact size of the file `write` will produce.
fn predicted_size(segment: &MemSegment) -> u64 {
    let footer: u64 = segment
        .schema()
        .columns()
        .iter()
        .map(|c| (COLUMN_FIXED_SIZE + c.name.len()) as u64)
        .sum::<u64>()
        + FOOTER_TAIL_SIZE as u64;
    segment.data_size() + footer + TRAILER_SIZE as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{pack_count, DPN_SIZE, SEGMENT_MAGIC};
    use crate::mem::MemPack;
    use crate::meta::ColumnNodeMeta;
    use crate::types::{ColumnSchema, SegmentMode, SegmentSchema, SqlType};
    use colseg_storage::{MemoryOpener, ReadOpener};

    fn id_name_segment() -> MemSegment {
        let schema = SegmentSchema::new(vec![
            ColumnSchema::new("id", SqlType::Int, true),
            ColumnSchema::new("name", SqlType::VarChar, false),
        ])
        .unwrap();
        let id = MemColumn::new(vec![MemPack::new(1000, vec![1u8; 4000])
            .with_index(vec![2u8; 32])
            .with_ext_index(vec![3u8; 8])
            .with_bounds(0, 999)])
        .with_outer_index(vec![4u8; 16]);
        let name = MemColumn::new(vec![MemPack::new(1000, vec![5u8; 7000])]);
        MemSegment::new("seg_0", schema, 1000, vec![id, name])
            .unwrap()
            .with_version(6)
            .with_mode(SegmentMode::Compressed)
    }

    fn written() -> (MemoryOpener, SegmentMeta) {
        let opener = MemoryOpener::new("seg_0");
        let meta = write(&id_name_segment(), &opener).unwrap();
        (opener, meta)
    }

    #[test]
    fn write_then_read_roundtrip() {
        let (opener, meta) = written();
        let read_back = probe(&opener).unwrap().unwrap();

        assert_eq!(read_back, meta);
        assert_eq!(read_back.column_count, 2);
        assert_eq!(read_back.row_count, 1000);
        assert_eq!(read_back.version, 6);
        assert_eq!(read_back.mode, SegmentMode::Compressed);
        let names: Vec<_> = read_back.column_infos.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["id", "name"]);
        assert_eq!(read_back.column_node_infos[0], ColumnNodeMeta::new(0, 999));
    }

    #[test]
    fn sections_are_laid_out_in_order() {
        let (opener, meta) = written();
        let file_len = opener.data().len() as u64;

        let id = &meta.column_infos[0];
        assert_eq!(id.dpn_offset, 0);
        assert_eq!(id.index_offset, pack_count(1000) * DPN_SIZE as u64);
        assert_eq!(id.ext_index_offset, id.index_offset + 32);
        assert_eq!(id.outer_index_offset, id.ext_index_offset + 8);
        assert_eq!(id.pack_offset, id.outer_index_offset + 16);

        let name = &meta.column_infos[1];
        assert_eq!(name.dpn_offset, id.pack_offset + 4000);
        assert_eq!(name.index_offset, name.ext_index_offset);
        assert_eq!(meta.data_end, name.pack_offset + 7000);
        assert!(meta.data_end < file_len);
    }

    #[test]
    fn predicted_size_is_exact() {
        let segment = id_name_segment();
        let opener = MemoryOpener::new("seg_0");
        write(&segment, &opener).unwrap();
        assert_eq!(opener.data().len() as u64, predicted_size(&segment));
    }

    #[test]
    fn file_ends_with_magic() {
        let (opener, _) = written();
        let data = opener.data();
        assert_eq!(&data[data.len() - 8..], &SEGMENT_MAGIC);
    }

    #[test]
    fn foreign_data_is_not_recognized() {
        let opener = MemoryOpener::with_data("junk", vec![7u8; 100]);
        assert!(probe(&opener).unwrap().is_none());

        let tiny = MemoryOpener::with_data("tiny", b"abc".to_vec());
        assert!(probe(&tiny).unwrap().is_none());
    }

    #[test]
    fn flipped_footer_byte_is_corrupt() {
        let (opener, _) = written();
        let mut data = opener.data();
        let at = data.len() - TRAILER_SIZE - 3;
        data[at] ^= 0xFF;

        let damaged = MemoryOpener::with_data("damaged", data);
        let err = probe(&damaged).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn oversized_footer_length_is_corrupt() {
        let (opener, _) = written();
        let mut data = opener.data();
        let at = data.len() - TRAILER_SIZE;
        data[at..at + 8].copy_from_slice(&u64::MAX.to_le_bytes());

        let damaged = MemoryOpener::with_data("damaged", data);
        assert!(probe(&damaged).unwrap_err().is_corruption());
    }

    #[test]
    fn truncated_file_is_not_recognized() {
        let (opener, _) = written();
        let mut data = opener.data();
        data.truncate(data.len() - 1);

        let truncated = MemoryOpener::with_data("truncated", data);
        assert!(probe(&truncated).unwrap().is_none());
    }

    #[test]
    fn read_through_base_offset() {
        let (opener, meta) = written();
        let mut data = b"prefix".to_vec();
        data.extend_from_slice(&opener.data());

        let shifted = MemoryOpener::with_data("shifted", data);
        let reader = ReadOpener::open(&shifted, 6).unwrap();
        assert_eq!(read(reader.as_ref()).unwrap(), Some(meta));
    }
}
