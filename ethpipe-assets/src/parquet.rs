//! Arrow schema and Parquet I/O for flattened transactions.
//!
//! Hashes and addresses are `0x`-prefixed lowercase hex. Wei amounts and fee
//! caps can exceed 64 bits and are stored as decimal strings. Block
//! timestamps are UTC milliseconds.

use std::path::Path;
use std::sync::{Arc, LazyLock};

use anyhow::{Context, Result, anyhow};
use arrow_array::{Array, RecordBatch, StringArray, TimestampMillisecondArray, UInt64Array};
use arrow_schema::{DataType, Field, Schema, TimeUnit};
use chrono::DateTime;
use ethpipe::TransactionRecord;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::file::properties::WriterProperties;

/// Arrow schema for one transaction row.
pub static TRANSACTION_SCHEMA: LazyLock<Arc<Schema>> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new("block_number", DataType::UInt64, false),
        Field::new(
            "block_timestamp",
            DataType::Timestamp(TimeUnit::Millisecond, Some("UTC".into())),
            false,
        ),
        Field::new("hash", DataType::Utf8, false),
        Field::new("from", DataType::Utf8, false),
        Field::new("to", DataType::Utf8, true),
        Field::new("value_wei", DataType::Utf8, false),
        Field::new("gas", DataType::UInt64, false),
        Field::new("max_fee_per_gas", DataType::Utf8, true),
        Field::new("max_priority_fee_per_gas", DataType::Utf8, true),
        Field::new("nonce", DataType::UInt64, false),
        Field::new("transaction_index", DataType::UInt64, false),
    ]))
});

/// Convert transaction records into a columnar [`RecordBatch`].
///
/// # Errors
///
/// Returns an error if the Arrow `RecordBatch` construction fails.
pub fn records_to_batch(records: &[TransactionRecord]) -> Result<RecordBatch> {
    let cap = records.len();
    let mut block_numbers = Vec::with_capacity(cap);
    let mut timestamps = Vec::with_capacity(cap);
    let mut hashes = Vec::with_capacity(cap);
    let mut froms = Vec::with_capacity(cap);
    let mut tos: Vec<Option<String>> = Vec::with_capacity(cap);
    let mut values = Vec::with_capacity(cap);
    let mut gas = Vec::with_capacity(cap);
    let mut max_fees: Vec<Option<String>> = Vec::with_capacity(cap);
    let mut priority_fees: Vec<Option<String>> = Vec::with_capacity(cap);
    let mut nonces = Vec::with_capacity(cap);
    let mut indices = Vec::with_capacity(cap);

    for r in records {
        block_numbers.push(r.block_number);
        timestamps.push(r.block_timestamp.timestamp_millis());
        hashes.push(format!("{:#x}", r.hash));
        froms.push(format!("{:#x}", r.from));
        tos.push(r.to.map(|a| format!("{a:#x}")));
        values.push(r.value_wei.to_string());
        gas.push(r.gas);
        max_fees.push(r.max_fee_per_gas.map(|v| v.to_string()));
        priority_fees.push(r.max_priority_fee_per_gas.map(|v| v.to_string()));
        nonces.push(r.nonce);
        indices.push(r.transaction_index);
    }

    let batch = RecordBatch::try_new(
        Arc::clone(&TRANSACTION_SCHEMA),
        vec![
            Arc::new(UInt64Array::from(block_numbers)),
            Arc::new(TimestampMillisecondArray::from(timestamps).with_timezone("UTC")),
            Arc::new(StringArray::from(hashes)),
            Arc::new(StringArray::from(froms)),
            Arc::new(StringArray::from(tos)),
            Arc::new(StringArray::from(values)),
            Arc::new(UInt64Array::from(gas)),
            Arc::new(StringArray::from(max_fees)),
            Arc::new(StringArray::from(priority_fees)),
            Arc::new(UInt64Array::from(nonces)),
            Arc::new(UInt64Array::from(indices)),
        ],
    )?;

    Ok(batch)
}

fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .ok_or_else(|| anyhow!("missing column {name}"))?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| anyhow!("column {name} has unexpected type"))
}

fn optional(col: &StringArray, i: usize) -> Option<&str> {
    col.is_valid(i).then(|| col.value(i))
}

/// Convert a [`RecordBatch`] written by [`records_to_batch`] back into
/// records.
///
/// # Errors
///
/// Returns an error if a column is missing, has the wrong type, or holds a
/// value that does not parse.
pub fn batch_to_records(batch: &RecordBatch) -> Result<Vec<TransactionRecord>> {
    let block_numbers = column::<UInt64Array>(batch, "block_number")?;
    let timestamps = column::<TimestampMillisecondArray>(batch, "block_timestamp")?;
    let hashes = column::<StringArray>(batch, "hash")?;
    let froms = column::<StringArray>(batch, "from")?;
    let tos = column::<StringArray>(batch, "to")?;
    let values = column::<StringArray>(batch, "value_wei")?;
    let gas = column::<UInt64Array>(batch, "gas")?;
    let max_fees = column::<StringArray>(batch, "max_fee_per_gas")?;
    let priority_fees = column::<StringArray>(batch, "max_priority_fee_per_gas")?;
    let nonces = column::<UInt64Array>(batch, "nonce")?;
    let indices = column::<UInt64Array>(batch, "transaction_index")?;

    (0..batch.num_rows())
        .map(|i| -> Result<TransactionRecord> {
            let ts = timestamps.value(i);
            Ok(TransactionRecord {
                block_number: block_numbers.value(i),
                block_timestamp: DateTime::from_timestamp_millis(ts)
                    .ok_or_else(|| anyhow!("row {i}: invalid timestamp {ts}"))?,
                hash: hashes.value(i).parse().with_context(|| format!("row {i}: hash"))?,
                from: froms.value(i).parse().with_context(|| format!("row {i}: from"))?,
                to: optional(tos, i)
                    .map(str::parse)
                    .transpose()
                    .with_context(|| format!("row {i}: to"))?,
                value_wei: values
                    .value(i)
                    .parse()
                    .with_context(|| format!("row {i}: value_wei"))?,
                gas: gas.value(i),
                max_fee_per_gas: optional(max_fees, i)
                    .map(str::parse)
                    .transpose()
                    .with_context(|| format!("row {i}: max_fee_per_gas"))?,
                max_priority_fee_per_gas: optional(priority_fees, i)
                    .map(str::parse)
                    .transpose()
                    .with_context(|| format!("row {i}: max_priority_fee_per_gas"))?,
                nonce: nonces.value(i),
                transaction_index: indices.value(i),
            })
        })
        .collect()
}

/// Total rows across batches.
#[must_use]
pub fn row_count(batches: &[RecordBatch]) -> usize {
    batches.iter().map(RecordBatch::num_rows).sum()
}

/// Lowest and highest `block_number` across all batches.
#[must_use]
pub fn block_span(batches: &[RecordBatch]) -> Option<(u64, u64)> {
    batches
        .iter()
        .filter(|b| b.num_rows() > 0)
        .filter_map(|batch| {
            let col = batch.column(0).as_any().downcast_ref::<UInt64Array>()?;
            let min = col.values().iter().copied().min()?;
            let max = col.values().iter().copied().max()?;
            Some((min, max))
        })
        .reduce(|(lo, hi), (min, max)| (lo.min(min), hi.max(max)))
}

/// Read all record batches from a Parquet file.
///
/// Returns an empty vec if the file does not exist.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn read(path: &Path) -> Result<Vec<RecordBatch>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    ParquetRecordBatchReaderBuilder::try_new(file)
        .with_context(|| format!("reading parquet header: {}", path.display()))?
        .build()
        .with_context(|| format!("building parquet reader: {}", path.display()))?
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("reading batches from {}", path.display()))
}

/// Write record batches to a Parquet file using Zstd compression.
///
/// Uses atomic write (temp file + rename); parent directories are created.
/// An empty `batches` slice still produces a valid file with the schema.
///
/// # Errors
///
/// Returns an error on I/O failure or if the Parquet writer rejects the data.
pub fn write(path: &Path, batches: &[RecordBatch]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }

    let tmp = path.with_extension("parquet.tmp");
    let file =
        std::fs::File::create(&tmp).with_context(|| format!("creating {}", tmp.display()))?;

    let props = WriterProperties::builder()
        .set_compression(parquet::basic::Compression::ZSTD(
            parquet::basic::ZstdLevel::try_new(3).context("invalid zstd level")?,
        ))
        .build();

    let mut writer = ArrowWriter::try_new(file, Arc::clone(&TRANSACTION_SCHEMA), Some(props))?;
    for batch in batches {
        writer.write(batch)?;
    }
    writer.close()?;

    std::fs::rename(&tmp, path)
        .with_context(|| format!("renaming {} -> {}", tmp.display(), path.display()))?;

    Ok(())
}

/// Write transaction records as a single-batch Parquet file.
///
/// # Errors
///
/// See [`write`].
pub fn write_records(path: &Path, records: &[TransactionRecord]) -> Result<()> {
    let batch = records_to_batch(records)?;
    write(path, &[batch])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::synthetic_block;

    fn rows() -> Vec<TransactionRecord> {
        let mut rows = synthetic_block(41, 3).transactions;
        rows.extend(synthetic_block(42, 2).transactions);
        rows
    }

    #[test]
    fn batch_has_schema_and_hex_encoding() {
        let batch = records_to_batch(&rows()).unwrap();
        assert_eq!(batch.num_rows(), 5);
        assert_eq!(batch.num_columns(), TRANSACTION_SCHEMA.fields().len());

        let hashes = column::<StringArray>(&batch, "hash").unwrap();
        assert!(hashes.value(0).starts_with("0x"), "hash is 0x-prefixed");
        assert_eq!(hashes.value(0), hashes.value(0).to_lowercase());

        // (42 + 0) is a multiple of 7: contract creation.
        let tos = column::<StringArray>(&batch, "to").unwrap();
        assert!(tos.is_null(3), "creation has null recipient");
        assert!(tos.is_valid(0), "call has recipient");

        let fees = column::<StringArray>(&batch, "max_fee_per_gas").unwrap();
        assert_eq!(fees.value(0), "30000000000");
        assert!(fees.is_null(1), "legacy row has no fee cap");
    }

    #[test]
    fn timestamps_are_utc_milliseconds() {
        let field = TRANSACTION_SCHEMA.field_with_name("block_timestamp").unwrap();
        assert_eq!(
            field.data_type(),
            &DataType::Timestamp(TimeUnit::Millisecond, Some("UTC".into()))
        );

        let rows = rows();
        let batch = records_to_batch(&rows).unwrap();
        let ts = column::<TimestampMillisecondArray>(&batch, "block_timestamp").unwrap();
        assert_eq!(ts.value(0), rows[0].block_timestamp.timestamp() * 1_000);
    }

    #[test]
    fn write_then_read_preserves_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("tx.parquet");
        let original = rows();

        write_records(&path, &original).unwrap();
        assert!(
            !path.with_extension("parquet.tmp").exists(),
            "temp file renamed away"
        );

        let batches = read(&path).unwrap();
        assert_eq!(row_count(&batches), original.len());
        assert_eq!(block_span(&batches), Some((41, 42)));

        let back: Vec<_> = batches
            .iter()
            .map(batch_to_records)
            .collect::<Result<Vec<_>>>()
            .unwrap()
            .concat();
        assert_eq!(back, original);
    }

    #[test]
    fn empty_write_keeps_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.parquet");
        write_records(&path, &[]).unwrap();

        let batches = read(&path).unwrap();
        assert_eq!(row_count(&batches), 0);
        assert_eq!(block_span(&batches), None);
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(
            read(&dir.path().join("absent.parquet")).unwrap().is_empty(),
            "absent file has no batches"
        );
    }

    #[test]
    fn large_values_survive_as_decimal_strings() {
        let mut row = synthetic_block(1, 1).transactions.remove(0);
        row.value_wei = alloy::primitives::U256::MAX;
        row.max_fee_per_gas = Some(u128::MAX);

        let batch = records_to_batch(std::slice::from_ref(&row)).unwrap();
        let back = batch_to_records(&batch).unwrap();
        assert_eq!(back, vec![row]);
    }
}
