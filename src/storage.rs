use std::collections::HashMap;
use std::fmt;
use std::io::{self, Read, Write};
use std::str::FromStr;

use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::classmap::ClassMap;
use crate::error::{BayesError, Result};
use crate::model::Item;
use crate::nodelog::{NodeLog, NodeLogger};

// Upper bound on a single binary frame. Guards against reading a garbage length.
const MAX_FRAME_LEN: usize = 1 << 30; // 1 GiB

/// Encoding used to persist a node's statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpFormat {
    Json,
    /// Length-prefixed rkyv archive.
    Binary,
    Csv,
    Sql,
}

impl fmt::Display for DumpFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DumpFormat::Json => "json",
            DumpFormat::Binary => "binary",
            DumpFormat::Csv => "csv",
            DumpFormat::Sql => "sql",
        };
        f.write_str(name)
    }
}

impl FromStr for DumpFormat {
    type Err = BayesError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(DumpFormat::Json),
            "binary" | "bin" | "rkyv" => Ok(DumpFormat::Binary),
            "csv" => Ok(DumpFormat::Csv),
            "sql" => Ok(DumpFormat::Sql),
            other => Err(BayesError::InvalidLiteral { reason: format!("unknown dump format '{}'", other) }),
        }
    }
}

/// Persisted form of a node: its counters plus the class map handed in at
/// store time.
#[derive(Archive, RkyvDeserialize, RkyvSerialize, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[archive(check_bytes)]
pub struct NodeDump {
    #[serde(rename = "NodeID")]
    pub node_id: u64,
    pub from_a_to_b: HashMap<u64, HashMap<u64, u64>>,
    pub from_a: HashMap<u64, u64>,
    pub to_b: HashMap<u64, u64>,
    pub total_accesses: u64,
    #[serde(rename = "ClassMap", default)]
    pub class_map: Vec<Item>,
}

impl NodeDump {
    pub fn capture<C: ClassMap + ?Sized>(log: &NodeLog, classes: &C) -> Self {
        Self {
            node_id: log.id(),
            from_a_to_b: log.from_a_to_b_map().clone(),
            from_a: log.from_a_map().clone(),
            to_b: log.to_b_map().clone(),
            total_accesses: log.total_accesses(),
            class_map: classes.items(),
        }
    }

    /// Turns the dump back into a live log, checking counter consistency
    /// and the UID of every class item.
    pub fn hydrate(self) -> Result<(NodeLog, Vec<Item>)> {
        if let Some(bad) = self.class_map.iter().find(|item| !item.is_valid_uid()) {
            warn!(uid = bad.uid, "restored class item failed its UID check");
            return Err(BayesError::decode(format!("class item {:016x} does not match its value", bad.uid)));
        }

        let log = NodeLog::from_parts(
            self.node_id,
            self.from_a_to_b,
            self.from_a,
            self.to_b,
            self.total_accesses,
        )?;

        Ok((log, self.class_map))
    }
}

/// Writes `log` and `classes` to `w` in the given format.
pub fn store<W: Write, C: ClassMap + ?Sized>(format: DumpFormat, log: &NodeLog, classes: &C, mut w: W) -> Result<()> {
    let dump = NodeDump::capture(log, classes);

    match format {
        DumpFormat::Json => serde_json::to_writer_pretty(&mut w, &dump)?,
        DumpFormat::Binary => write_frame(&mut w, &dump)?,
        DumpFormat::Csv | DumpFormat::Sql => return Err(BayesError::UnsupportedDumpFormat(format)),
    }
    w.flush()?;

    info!(
        node = dump.node_id,
        total_accesses = dump.total_accesses,
        classes = dump.class_map.len(),
        %format,
        "node stored"
    );
    Ok(())
}

/// Reads a dump written by [`store`] and validates it.
pub fn restore<R: Read>(format: DumpFormat, mut r: R) -> Result<(NodeLog, Vec<Item>)> {
    let dump: NodeDump = match format {
        DumpFormat::Json => serde_json::from_reader(&mut r)
        .map_err(|e| BayesError::decode(format!("json: {}", e)))?,
        DumpFormat::Binary => read_frame(&mut r)?,
        DumpFormat::Csv | DumpFormat::Sql => return Err(BayesError::UnsupportedDumpFormat(format)),
    };

    let (log, items) = dump.hydrate()?;
    info!(
        node = log.id(),
        total_accesses = log.total_accesses(),
        classes = items.len(),
        %format,
        "node restored"
    );
    Ok((log, items))
}

pub fn encode<C: ClassMap + ?Sized>(format: DumpFormat, log: &NodeLog, classes: &C) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    store(format, log, classes, &mut buf)?;
    Ok(buf)
}

pub fn decode(format: DumpFormat, bytes: &[u8]) -> Result<(NodeLog, Vec<Item>)> {
    restore(format, bytes)
}

// Frame layout: [Length (4b, LE)][rkyv archive (N bytes)]
fn write_frame<W: Write>(w: &mut W, dump: &NodeDump) -> io::Result<()> {
    let bytes = rkyv::to_bytes::<_, 4096>(dump)
    .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;

    let len = u32::try_from(bytes.len())
    .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "dump exceeds 4 GiB"))?;

    w.write_all(&len.to_le_bytes())?;
    w.write_all(&bytes)?;
    Ok(())
}

fn read_frame<R: Read>(r: &mut R) -> Result<NodeDump> {
    let mut len_buf = [0u8; 4];
    read_exact_or_truncated(r, &mut len_buf)?;
    let len = u32::from_le_bytes(len_buf) as usize;

    if len > MAX_FRAME_LEN {
        return Err(BayesError::decode(format!("frame length {} is implausible", len)));
    }

    let mut bytes = vec![0u8; len];
    read_exact_or_truncated(r, &mut bytes)?;

    let mut aligned = rkyv::AlignedVec::with_capacity(len);
    aligned.extend_from_slice(&bytes);

    let archived = rkyv::check_archived_root::<NodeDump>(&aligned)
    .map_err(|e| BayesError::decode(format!("malformed node archive: {}", e)))?;

    let dump: NodeDump = archived
    .deserialize(&mut rkyv::Infallible)
    .unwrap_or_else(|never| match never {});

    Ok(dump)
}

fn read_exact_or_truncated<R: Read>(r: &mut R, buf: &mut [u8]) -> Result<()> {
    r.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => BayesError::decode("truncated dump"),
        _ => BayesError::Io(e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classmap::MemClassMap;
    use crate::model::Value;

    fn trained() -> (NodeLog, MemClassMap) {
        let mut log = NodeLog::new(2);
        log.update(1, 3);
        log.update(3, 1);
        log.update(1, 3);
        log.update(0xFFFF_FFFF_FFFF_FFFF, 3);

        let mut classes = MemClassMap::new();
        classes.add_any(&[Value::from("x"), Value::from(3u8), Value::from(false)]).unwrap();
        (log, classes)
    }

    #[test]
    fn json_round_trip() {
        let (log, classes) = trained();
        let bytes = encode(DumpFormat::Json, &log, &classes).unwrap();
        let (restored, items) = decode(DumpFormat::Json, &bytes).unwrap();
        assert_eq!(restored, log);
        assert_eq!(items, classes.items());
    }

    #[test]
    fn binary_round_trip() {
        let (log, classes) = trained();
        let bytes = encode(DumpFormat::Binary, &log, &classes).unwrap();
        let (restored, items) = decode(DumpFormat::Binary, &bytes).unwrap();
        assert_eq!(restored, log);
        assert_eq!(items, classes.items());
    }

    #[test]
    fn json_uses_documented_field_names() {
        let (log, classes) = trained();
        let bytes = encode(DumpFormat::Json, &log, &classes).unwrap();
        let doc: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(doc["NodeID"], 2);
        assert_eq!(doc["total_accesses"], 4);
        assert_eq!(doc["from_a"]["1"], 2);
        assert_eq!(doc["to_b"]["3"], 3);
        assert_eq!(doc["from_a_to_b"]["1"]["3"], 2);
        assert_eq!(doc["from_a_to_b"]["18446744073709551615"]["3"], 1);
        assert_eq!(doc["ClassMap"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn json_without_class_map_still_restores() {
        let raw = r#"{"NodeID": 9, "from_a_to_b": {"1": {"2": 1}}, "from_a": {"1": 1}, "to_b": {"2": 1}, "total_accesses": 1}"#;
        let (log, items) = decode(DumpFormat::Json, raw.as_bytes()).unwrap();
        assert_eq!(log.id(), 9);
        assert_eq!(log.from_a_to_b_count(1, 2), 1);
        assert!(items.is_empty());
    }

    #[test]
    fn non_finite_float_classes_survive_json() {
        let mut log = NodeLog::new(1);
        let mut classes = MemClassMap::new();
        let values = [Value::F64(f64::INFINITY), Value::F64(f64::NAN), Value::F32(f32::NEG_INFINITY), Value::I64(2)];
        classes.add_any(&values).unwrap();
        log.update(crate::hasher::to_uid(&values[0]), crate::hasher::to_uid(&values[3]));

        let bytes = encode(DumpFormat::Json, &log, &classes).unwrap();
        let (restored, items) = decode(DumpFormat::Json, &bytes).unwrap();
        assert_eq!(restored, log);
        assert_eq!(items.len(), 4);
        assert!(items.iter().all(Item::is_valid_uid));
    }

    #[test]
    fn csv_and_sql_are_placeholders() {
        let (log, classes) = trained();
        for format in [DumpFormat::Csv, DumpFormat::Sql] {
            assert!(matches!(
                encode(format, &log, &classes),
                Err(BayesError::UnsupportedDumpFormat(f)) if f == format
            ));
            assert!(matches!(decode(format, b"{}"), Err(BayesError::UnsupportedDumpFormat(_))));
        }
    }

    #[test]
    fn truncated_binary_is_a_decode_failure() {
        let (log, classes) = trained();
        let bytes = encode(DumpFormat::Binary, &log, &classes).unwrap();

        for cut in [0, 2, 4, bytes.len() / 2, bytes.len() - 1] {
            assert!(
                matches!(decode(DumpFormat::Binary, &bytes[..cut]), Err(BayesError::DecodeFailure { .. })),
                "cut at {}",
                cut
            );
        }
    }

    #[test]
    fn garbage_json_is_a_decode_failure() {
        assert!(matches!(decode(DumpFormat::Json, b"{not json"), Err(BayesError::DecodeFailure { .. })));
    }

    #[test]
    fn inconsistent_counters_are_rejected() {
        let raw = r#"{"NodeID": 1, "from_a_to_b": {}, "from_a": {"1": 1}, "to_b": {"2": 1}, "total_accesses": 5}"#;
        assert!(matches!(decode(DumpFormat::Json, raw.as_bytes()), Err(BayesError::DecodeFailure { .. })));
    }

    #[test]
    fn tampered_class_item_is_rejected() {
        let (log, classes) = trained();
        let mut dump = NodeDump::capture(&log, &classes);
        dump.class_map[0].uid ^= 0xFF;
        let bytes = serde_json::to_vec(&dump).unwrap();
        assert!(matches!(decode(DumpFormat::Json, &bytes), Err(BayesError::DecodeFailure { .. })));
    }

    #[test]
    fn format_names_parse() {
        assert_eq!("json".parse::<DumpFormat>().unwrap(), DumpFormat::Json);
        assert_eq!("BINARY".parse::<DumpFormat>().unwrap(), DumpFormat::Binary);
        assert!("yaml".parse::<DumpFormat>().is_err());
        assert_eq!(DumpFormat::Sql.to_string(), "sql");
    }
}
