//! Parquet encoding
//!
//! Arrow record batches are encoded into in-memory Parquet files which the
//! staging layer then uploads to the destination store.

use crate::error::{Error, Result};
use crate::types::CompressionCodec;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::{EnabledStatistics, WriterProperties};
use std::io::Write;

/// Configuration for Parquet writer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParquetWriterConfig {
    codec: CompressionCodec,
    row_group_size: usize,
    dictionary_enabled: bool,
    statistics_enabled: bool,
}

impl Default for ParquetWriterConfig {
    fn default() -> Self {
        Self {
            codec: CompressionCodec::default(),
            row_group_size: 1024 * 1024, // 1M rows
            dictionary_enabled: true,
            statistics_enabled: true,
        }
    }
}

impl ParquetWriterConfig {
    /// Create a new config with default settings
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the compression codec applied to every column chunk
    #[must_use]
    pub fn with_codec(mut self, codec: CompressionCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Set row group size
    #[must_use]
    pub fn with_row_group_size(mut self, size: usize) -> Self {
        self.row_group_size = size.max(1);
        self
    }

    /// Enable or disable dictionary encoding
    #[must_use]
    pub fn with_dictionary(mut self, enabled: bool) -> Self {
        self.dictionary_enabled = enabled;
        self
    }

    /// Enable or disable statistics
    #[must_use]
    pub fn with_statistics(mut self, enabled: bool) -> Self {
        self.statistics_enabled = enabled;
        self
    }

    /// Compression codec
    pub fn codec(&self) -> CompressionCodec {
        self.codec
    }

    /// Get row group size
    pub fn row_group_size(&self) -> usize {
        self.row_group_size
    }

    /// Get dictionary encoding enabled
    pub fn is_dictionary_enabled(&self) -> bool {
        self.dictionary_enabled
    }

    /// Get statistics enabled
    pub fn is_statistics_enabled(&self) -> bool {
        self.statistics_enabled
    }

    fn build_properties(&self) -> WriterProperties {
        let mut builder = WriterProperties::builder()
            .set_compression(self.codec.to_parquet())
            .set_max_row_group_size(self.row_group_size)
            .set_created_by(format!("{} {}", crate::NAME, crate::VERSION));

        if !self.dictionary_enabled {
            builder = builder.set_dictionary_enabled(false);
        }

        if !self.statistics_enabled {
            builder = builder.set_statistics_enabled(EnabledStatistics::None);
        }

        builder.build()
    }
}

/// Streaming Parquet writer over any byte sink
pub struct ParquetWriter<W: Write + Send> {
    writer: ArrowWriter<W>,
    rows_written: usize,
}

impl<W: Write + Send> ParquetWriter<W> {
    /// Create a writer; the Arrow schema is embedded in the file footer
    pub fn new(sink: W, schema: SchemaRef, config: &ParquetWriterConfig) -> Result<Self> {
        let writer = ArrowWriter::try_new(sink, schema, Some(config.build_properties()))
            .map_err(|e| Error::output(format!("Failed to create Parquet writer: {e}")))?;

        Ok(Self {
            writer,
            rows_written: 0,
        })
    }

    /// Write a RecordBatch
    pub fn write(&mut self, batch: &RecordBatch) -> Result<()> {
        self.writer
            .write(batch)
            .map_err(|e| Error::output(format!("Failed to write batch: {e}")))?;

        self.rows_written += batch.num_rows();
        Ok(())
    }

    /// Get the number of rows written so far
    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    /// Write the footer and hand back the sink
    pub fn finish(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| Error::output(format!("Failed to close Parquet writer: {e}")))
    }
}

/// Encode batches sharing `schema` into a complete Parquet file
pub fn encode_parquet(
    schema: SchemaRef,
    batches: &[RecordBatch],
    config: &ParquetWriterConfig,
) -> Result<Bytes> {
    let mut writer = ParquetWriter::new(Vec::new(), schema, config)?;
    for batch in batches {
        writer.write(batch)?;
    }
    Ok(Bytes::from(writer.finish()?))
}
