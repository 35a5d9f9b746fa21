//! # Streamed Batch Decoder
//!
//! Applies a batch straight out of its serialized JSON form without building
//! the batch in memory first.
//!
//! ## Forward-Only Decoding
//!
//! The payload is consumed through serde's `SeqAccess`, which only moves
//! forward: a field can be read once, in order, and never revisited. That
//! dictates the walk:
//!
//! ```text
//! [ opType, table, sql, [ [args...], [args...], ... ] ]
//!     │       │     │     │
//!     skip   skip  keep   execute each ArgBatch as soon as it is decoded,
//!                         with `sql` (field 2) still in scope
//! ```
//!
//! The statement for an operation is compiled once, on its first ArgBatch,
//! and reused for every following ArgBatch of that operation. Each ArgBatch
//! is fully decoded before anything is bound, so a malformed ArgBatch never
//! leaves a half-bound statement behind.
//!
//! ## Carrying Engine Errors Through serde
//!
//! A visitor can only fail with the deserializer's own error type. When the
//! engine fails inside a visitor, the real [`Error`] is parked in a slot and
//! the visitor returns a placeholder serde error. [`run`] then prefers the
//! parked error, so callers see `InvalidSql` / `BindArityOrType` /
//! `Execution` exactly as the structured path reports them. Anything else
//! serde reports is `Error::MalformedBatch`.

use std::fmt;

use serde::de::{self, DeserializeSeed, Deserializer, IgnoredAny, SeqAccess, Visitor};
use serde::Deserialize;

use crate::batch::{unsupported_argument, BatchStats};
use crate::error::{Error, Result};
use crate::statement::{CompiledStatement, StatementCache};
use crate::types::Value;

const EXPECTED_OPERATION: &str = "an operation [opType, table, sql, argBatches]";

/// Decodes `read` and executes every ArgBatch as it arrives.
pub(crate) fn run<'de, R>(
    cache: &mut StatementCache<'_>,
    read: R,
    stats: &mut BatchStats,
) -> Result<()>
where
    R: serde_json::de::Read<'de>,
{
    let mut de = serde_json::Deserializer::new(read);
    let mut failure: Option<Error> = None;

    let outcome = BatchSeed {
        cache,
        failure: &mut failure,
        stats,
    }
    .deserialize(&mut de)
    .and_then(|()| de.end());

    match outcome {
        Ok(()) => Ok(()),
        Err(e) => Err(failure.take().unwrap_or_else(|| Error::MalformedBatch(e.to_string()))),
    }
}

/// Parks `err` and returns the placeholder serde error.
fn abort<E: de::Error>(slot: &mut Option<Error>, err: Error) -> E {
    *slot = Some(err);
    E::custom("batch aborted by engine error")
}

// =============================================================================
// Batch: [operation, operation, ...]
// =============================================================================

struct BatchSeed<'a, 'conn> {
    cache: &'a mut StatementCache<'conn>,
    failure: &'a mut Option<Error>,
    stats: &'a mut BatchStats,
}

impl<'de> DeserializeSeed<'de> for BatchSeed<'_, '_> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> std::result::Result<(), D::Error> {
        deserializer.deserialize_seq(self)
    }
}

impl<'de> Visitor<'de> for BatchSeed<'_, '_> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an array of operations")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<(), A::Error> {
        let BatchSeed {
            cache,
            failure,
            stats,
        } = self;

        while seq
            .next_element_seed(OperationSeed {
                cache: &mut *cache,
                failure: &mut *failure,
                stats: &mut *stats,
            })?
            .is_some()
        {}

        Ok(())
    }
}

// =============================================================================
// Operation: [opType, table, sql, argBatches]
// =============================================================================

struct OperationSeed<'a, 'conn> {
    cache: &'a mut StatementCache<'conn>,
    failure: &'a mut Option<Error>,
    stats: &'a mut BatchStats,
}

impl<'de> DeserializeSeed<'de> for OperationSeed<'_, '_> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> std::result::Result<(), D::Error> {
        deserializer.deserialize_seq(self)
    }
}

impl<'de> Visitor<'de> for OperationSeed<'_, '_> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(EXPECTED_OPERATION)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<(), A::Error> {
        let OperationSeed {
            cache,
            failure,
            stats,
        } = self;

        // Fields 0 and 1 are opaque to the engine.
        for field in 0..2 {
            if seq.next_element::<IgnoredAny>()?.is_none() {
                return Err(de::Error::invalid_length(field, &EXPECTED_OPERATION));
            }
        }

        let sql: String = seq
            .next_element()?
            .ok_or_else(|| <A::Error as de::Error>::invalid_length(2, &EXPECTED_OPERATION))?;

        let executed = seq.next_element_seed(ArgBatchesSeed {
            cache,
            failure,
            stats: &mut *stats,
            sql: &sql,
        })?;
        if executed.is_none() {
            return Err(de::Error::invalid_length(3, &EXPECTED_OPERATION));
        }

        // Trailing fields are tolerated and skipped.
        while seq.next_element::<IgnoredAny>()?.is_some() {}

        stats.operations += 1;
        Ok(())
    }
}

// =============================================================================
// ArgBatches: [[args...], [args...], ...]
// =============================================================================

struct ArgBatchesSeed<'a, 'conn> {
    cache: &'a mut StatementCache<'conn>,
    failure: &'a mut Option<Error>,
    stats: &'a mut BatchStats,
    sql: &'a str,
}

impl<'de> DeserializeSeed<'de> for ArgBatchesSeed<'_, '_> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> std::result::Result<(), D::Error> {
        deserializer.deserialize_seq(self)
    }
}

impl<'de> Visitor<'de> for ArgBatchesSeed<'_, '_> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an array of argument arrays")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<(), A::Error> {
        let ArgBatchesSeed {
            cache,
            failure,
            stats,
            sql,
        } = self;

        let Some(first) = seq.next_element::<Vec<Slot>>()? else {
            return Ok(());
        };
        let first = into_values(first, sql).map_err(|e| abort::<A::Error>(failure, e))?;

        let stmt = match cache.compile(sql) {
            Ok(stmt) => stmt,
            Err(e) => return Err(abort(failure, e)),
        };
        execute::<A::Error>(stmt, &first, failure, stats)?;

        while let Some(slots) = seq.next_element::<Vec<Slot>>()? {
            let values = into_values(slots, sql).map_err(|e| abort::<A::Error>(failure, e))?;
            execute::<A::Error>(stmt, &values, failure, stats)?;
        }

        Ok(())
    }
}

fn execute<E: de::Error>(
    stmt: &mut CompiledStatement<'_>,
    values: &[Value],
    failure: &mut Option<Error>,
    stats: &mut BatchStats,
) -> std::result::Result<(), E> {
    stmt.execute(values).map_err(|e| abort::<E>(failure, e))?;
    stats.executions += 1;
    Ok(())
}

// =============================================================================
// Argument Slots
// =============================================================================

/// One decoded argument. Nested arrays and objects are consumed and recorded
/// rather than rejected by serde, so they surface as bind errors instead of
/// payload errors.
enum Slot {
    Scalar(Value),
    Nested(&'static str),
}

fn into_values(slots: Vec<Slot>, sql: &str) -> Result<Vec<Value>> {
    slots
        .into_iter()
        .enumerate()
        .map(|(i, slot)| match slot {
            Slot::Scalar(value) => Ok(value),
            Slot::Nested(kind) => Err(unsupported_argument(sql, i, kind)),
        })
        .collect()
}

impl<'de> Deserialize<'de> for Slot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(SlotVisitor)
    }
}

struct SlotVisitor;

impl<'de> Visitor<'de> for SlotVisitor {
    type Value = Slot;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a bind value")
    }

    fn visit_unit<E: de::Error>(self) -> std::result::Result<Slot, E> {
        Ok(Slot::Scalar(Value::Null))
    }

    fn visit_none<E: de::Error>(self) -> std::result::Result<Slot, E> {
        Ok(Slot::Scalar(Value::Null))
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> std::result::Result<Slot, D::Error> {
        Slot::deserialize(deserializer)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> std::result::Result<Slot, E> {
        Ok(Slot::Scalar(Value::from(v)))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Slot, E> {
        Ok(Slot::Scalar(Value::Integer(v)))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Slot, E> {
        let value = i64::try_from(v)
            .map(Value::Integer)
            .unwrap_or(Value::Real(v as f64));
        Ok(Slot::Scalar(value))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<Slot, E> {
        Ok(Slot::Scalar(Value::Real(v)))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Slot, E> {
        Ok(Slot::Scalar(Value::Text(v.to_string())))
    }

    fn visit_string<E: de::Error>(self, v: String) -> std::result::Result<Slot, E> {
        Ok(Slot::Scalar(Value::Text(v)))
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> std::result::Result<Slot, E> {
        Ok(Slot::Scalar(Value::Blob(v.to_vec())))
    }

    fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> std::result::Result<Slot, E> {
        Ok(Slot::Scalar(Value::Blob(v)))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<Slot, A::Error> {
        while seq.next_element::<IgnoredAny>()?.is_some() {}
        Ok(Slot::Nested("array"))
    }

    fn visit_map<A: de::MapAccess<'de>>(self, mut map: A) -> std::result::Result<Slot, A::Error> {
        while map.next_entry::<IgnoredAny, IgnoredAny>()?.is_some() {}
        Ok(Slot::Nested("object"))
    }
}

// =============================================================================
// Tests
// =============================================================================
