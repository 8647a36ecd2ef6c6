use std::io::{self, Write};

use crate::types::Record;

pub const TIMEOUT_NOTICE: &str = "Timeout reached. Stopping consumer.";

/// One block per record: a summary line, then a line per header. A missing
/// key prints as empty, bytes that are not UTF-8 print lossily.
pub fn write_record_block<W: Write>(out: &mut W, record: &Record) -> io::Result<()> {
    let key = record
        .key
        .as_deref()
        .map(String::from_utf8_lossy)
        .unwrap_or_default();
    writeln!(
        out,
        "Topic: {}, Partition: {}, Offset: {}, Key: {}, Value: {}",
        record.topic,
        record.partition,
        record.offset,
        key,
        String::from_utf8_lossy(&record.value)
    )?;
    for header in &record.headers {
        writeln!(
            out,
            "Header: {}: {}",
            header.key,
            String::from_utf8_lossy(&header.value)
        )?;
    }
    Ok(())
}

pub fn write_records<W: Write>(out: &mut W, records: &[Record]) -> io::Result<()> {
    for record in records {
        write_record_block(out, record)?;
    }
    out.flush()
}

/// Tail output is the bare value.
pub fn write_value_line<W: Write>(out: &mut W, record: &Record) -> io::Result<()> {
    out.write_all(&record.value)?;
    out.write_all(b"\n")
}
