//! CSV -> Arrow -> Parquet, every column as nullable text.
//!
//! Portal exports mix numbers formatted with thousands separators, dates
//! in local format, and free text, so nothing is type-inferred. Empty
//! cells become nulls.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{ArrayRef, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;

/// Errors from converting a CSV report to Parquet.
#[derive(Debug, thiserror::Error)]
pub enum ColumnarError {
    /// Reading the CSV failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Building the record batch failed.
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Writing the Parquet file failed.
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file has no header row.
    #[error("{} has no header row", .0.display())]
    MissingHeader(PathBuf),
}

/// A CSV held in memory as text cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextTable {
    /// Column names, unique and non-empty.
    pub columns: Vec<String>,
    /// Rows, each exactly `columns.len()` cells long.
    pub rows: Vec<Vec<Option<String>>>,
}

/// Shape of a converted file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertedFile {
    /// Column names written.
    pub columns: Vec<String>,
    /// Data rows written.
    pub rows: usize,
}

/// Reads `path` as a headed CSV.
///
/// Invalid UTF-8 is replaced rather than rejected. Short rows are padded
/// with nulls and long rows truncated to the header width.
///
/// # Errors
///
/// Returns [`ColumnarError::MissingHeader`] for an empty file, or the
/// underlying CSV error.
pub fn read_text_csv(path: &Path) -> Result<TextTable, ColumnarError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;

    let raw_headers: Vec<String> = reader
        .byte_headers()?
        .iter()
        .map(|field| String::from_utf8_lossy(field).into_owned())
        .collect();
    if raw_headers.is_empty() {
        return Err(ColumnarError::MissingHeader(path.to_path_buf()));
    }
    let columns = normalize_headers(&raw_headers);
    let width = columns.len();

    let mut rows = Vec::new();
    for record in reader.byte_records() {
        let record = record?;
        let mut row: Vec<Option<String>> = record
            .iter()
            .take(width)
            .map(|field| {
                if field.is_empty() {
                    None
                } else {
                    Some(String::from_utf8_lossy(field).into_owned())
                }
            })
            .collect();
        row.resize(width, None);
        rows.push(row);
    }

    Ok(TextTable { columns, rows })
}

/// Makes header names usable as column names: trimmed, byte-order mark
/// removed, blanks named by position, duplicates suffixed. Names are
/// compared ignoring case, as the warehouse does.
fn normalize_headers(raw: &[String]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    raw.iter()
        .enumerate()
        .map(|(i, header)| {
            let trimmed = header.trim_start_matches('\u{feff}').trim();
            let base = if trimmed.is_empty() {
                format!("column_{i}")
            } else {
                trimmed.to_owned()
            };

            let mut name = base.clone();
            let mut n = 1;
            while !seen.insert(name.to_lowercase()) {
                name = format!("{base}_{n}");
                n += 1;
            }
            name
        })
        .collect()
}

/// Builds an all-`Utf8` record batch from `table`.
///
/// # Errors
///
/// Returns [`ColumnarError::Arrow`] if the batch cannot be assembled.
pub fn to_record_batch(table: &TextTable) -> Result<RecordBatch, ColumnarError> {
    let schema = Arc::new(Schema::new(
        table
            .columns
            .iter()
            .map(|name| Field::new(name, DataType::Utf8, true))
            .collect::<Vec<_>>(),
    ));

    let arrays: Vec<ArrayRef> = (0..table.columns.len())
        .map(|col| {
            let values: StringArray = table
                .rows
                .iter()
                .map(|row| row[col].as_deref())
                .collect();
            Arc::new(values) as ArrayRef
        })
        .collect();

    Ok(RecordBatch::try_new(schema, arrays)?)
}

/// Writes `batch` to `path` with zstd compression.
///
/// # Errors
///
/// Returns [`ColumnarError`] if the file cannot be created or written.
pub fn write_parquet(batch: &RecordBatch, path: &Path) -> Result<(), ColumnarError> {
    let file = std::fs::File::create(path)?;
    let props = WriterProperties::builder()
        .set_compression(Compression::ZSTD(ZstdLevel::default()))
        .build();

    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
    writer.write(batch)?;
    writer.close()?;
    Ok(())
}

/// Converts the CSV at `csv_path` into a Parquet file at `parquet_path`.
///
/// # Errors
///
/// Returns [`ColumnarError`] if reading, building, or writing fails.
pub fn convert_csv_to_parquet(
    csv_path: &Path,
    parquet_path: &Path,
) -> Result<ConvertedFile, ColumnarError> {
    let table = read_text_csv(csv_path)?;
    let batch = to_record_batch(&table)?;
    write_parquet(&batch, parquet_path)?;

    log::debug!(
        "{} -> {} ({} columns, {} rows)",
        csv_path.display(),
        parquet_path.display(),
        table.columns.len(),
        table.rows.len()
    );

    Ok(ConvertedFile {
        rows: table.rows.len(),
        columns: table.columns,
    })
}

#[cfg(test)]
mod tests {
    use arrow::array::Array as _;
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    use super::*;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn keeps_every_column_as_text_with_nulls_for_empty_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "ganhos.csv",
            "data,valor,obs\n2024-01-01,1.234,\n2024-01-02,,ok\n",
        );

        let table = read_text_csv(&path).unwrap();

        assert_eq!(table.columns, vec!["data", "valor", "obs"]);
        assert_eq!(
            table.rows,
            vec![
                vec![Some("2024-01-01".to_owned()), Some("1.234".to_owned()), None],
                vec![Some("2024-01-02".to_owned()), None, Some("ok".to_owned())],
            ]
        );

        let batch = to_record_batch(&table).unwrap();
        assert!(
            batch
                .schema()
                .fields()
                .iter()
                .all(|f| f.data_type() == &DataType::Utf8 && f.is_nullable())
        );
        assert_eq!(batch.column(1).null_count(), 1);
    }

    #[test]
    fn ragged_rows_are_padded_and_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "midia.csv", "a,b\n1\n2,3,4\n");

        let table = read_text_csv(&path).unwrap();

        assert_eq!(table.rows[0], vec![Some("1".to_owned()), None]);
        assert_eq!(table.rows[1], vec![Some("2".to_owned()), Some("3".to_owned())]);
    }

    #[test]
    fn blank_and_duplicate_headers_get_unique_names() {
        let raw: Vec<String> = ["\u{feff}id", "", "valor", "valor", " ", "Valor", "ID"]
            .iter()
            .map(|s| (*s).to_owned())
            .collect();

        assert_eq!(
            normalize_headers(&raw),
            vec!["id", "column_1", "valor", "valor_1", "column_4", "Valor_2", "ID_1"]
        );
    }

    #[test]
    fn empty_file_has_no_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "registros.csv", "");

        assert!(matches!(
            read_text_csv(&path),
            Err(ColumnarError::MissingHeader(_))
        ));
    }

    #[test]
    fn header_only_file_converts_to_zero_rows() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = write(dir.path(), "atividades.csv", "jogador,acao\n");
        let parquet_path = dir.path().join("atividades.parquet");

        let converted = convert_csv_to_parquet(&csv_path, &parquet_path).unwrap();

        assert_eq!(converted.rows, 0);
        assert_eq!(converted.columns, vec!["jogador", "acao"]);
        assert!(parquet_path.exists());
    }

    #[test]
    fn parquet_output_reads_back_as_text() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = write(dir.path(), "midia.csv", "criativo,cliques\nbanner,10\npopup,\n");
        let parquet_path = dir.path().join("midia.parquet");

        convert_csv_to_parquet(&csv_path, &parquet_path).unwrap();

        let file = std::fs::File::open(&parquet_path).unwrap();
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .unwrap()
            .build()
            .unwrap();
        let batches: Vec<RecordBatch> = reader.map(Result::unwrap).collect();
        let total: usize = batches.iter().map(RecordBatch::num_rows).sum();
        assert_eq!(total, 2);

        let clicks = batches[0]
            .column(1)
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(clicks.value(0), "10");
        assert!(clicks.is_null(1));
    }
}
