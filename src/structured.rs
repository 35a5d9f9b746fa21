//! Structured batch decoder.
//!
//! Walks a batch that the host has already materialized as nested
//! sequences. Only fields 2 (`sql`) and 3 (`arg_batches`) of each operation
//! are read; fields 0 and 1 are never touched.

use crate::batch::{unsupported_argument, BatchStats};
use crate::error::{Error, Result};
use crate::host::HostValue;
use crate::statement::StatementCache;
use crate::types::Value;

/// Executes every ArgBatch of every operation, in order.
///
/// Each execution asks the cache for the statement; repeated SQL is served
/// from the cache but otherwise gets no special treatment.
pub(crate) fn run<H: HostValue>(
    cache: &mut StatementCache<'_>,
    operations: &[H],
    stats: &mut BatchStats,
) -> Result<()> {
    for (index, operation) in operations.iter().enumerate() {
        let sql = operation
            .element(2)
            .and_then(HostValue::as_text)
            .ok_or_else(|| malformed(index, "field 2 (sql) must be a string"))?;

        let arg_batches = operation
            .element(3)
            .ok_or_else(|| malformed(index, "missing field 3 (argBatches)"))?;
        let batch_count = arg_batches
            .seq_len()
            .ok_or_else(|| malformed(index, "field 3 (argBatches) must be an array"))?;

        for position in 0..batch_count {
            let args = arg_batches
                .element(position)
                .ok_or_else(|| malformed(index, "argBatches changed length while iterating"))?;
            let values = host_args(args, sql, index)?;

            cache.compile(sql)?.execute(&values)?;
            stats.executions += 1;
        }

        stats.operations += 1;
    }

    Ok(())
}

/// Converts one host ArgBatch into bind values.
fn host_args<H: HostValue>(args: &H, sql: &str, op_index: usize) -> Result<Vec<Value>> {
    let len = args
        .seq_len()
        .ok_or_else(|| malformed(op_index, "each argBatch must be an array"))?;

    let mut values = Vec::with_capacity(len);
    for i in 0..len {
        let element = args
            .element(i)
            .ok_or_else(|| malformed(op_index, "argBatch changed length while iterating"))?;
        let value = element
            .to_value()
            .ok_or_else(|| unsupported_argument(sql, i, element.kind()))?;
        values.push(value);
    }

    Ok(values)
}

fn malformed(index: usize, detail: &str) -> Error {
    Error::MalformedBatch(format!("operation {index}: {detail}"))
}
