use std::collections::BTreeMap;
use std::io::Write;

use serde::Serialize;
use serde_with::skip_serializing_none;

use crate::error::{SimError, SimResult};
use crate::output::{Geometry, OutputSink, RecordHeader, ZoneOutline};

/// First line of an NDJSON output: the static geometry.
#[skip_serializing_none]
#[derive(Clone, Debug, Serialize)]
pub struct GeometryFrame<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub edge: &'a [(f64, f64)],
    pub land: Option<&'a [(f64, f64)]>,
    pub zones: Option<&'a [ZoneOutline]>,
}

impl<'a> GeometryFrame<'a> {
    pub fn new(geometry: &'a Geometry) -> Self {
        Self {
            kind: "geometry",
            edge: &geometry.edge,
            land: (!geometry.land.is_empty()).then_some(geometry.land.as_slice()),
            zones: (!geometry.zones.is_empty()).then_some(geometry.zones.as_slice()),
        }
    }
}

/// One recorded step.
#[skip_serializing_none]
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Frame {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub step: usize,
    pub time: f64,
    pub date: String,
    pub last: Option<bool>,
    pub variables: BTreeMap<String, Vec<Option<f64>>>,
}

impl Frame {
    pub fn new(header: &RecordHeader) -> Self {
        Self {
            kind: "record",
            step: header.step,
            time: header.time,
            date: header.date.clone(),
            last: header.last.then_some(true),
            variables: BTreeMap::new(),
        }
    }

    pub fn to_ndjson(&self) -> serde_json::Result<String> {
        to_ndjson(self)
    }
}

fn to_ndjson<T: Serialize>(value: &T) -> serde_json::Result<String> {
    let mut json = serde_json::to_string(value)?;
    json.push('\n');
    Ok(json)
}

/// Writes the geometry then one JSON line per record.
pub struct NdjsonSink<W: Write + Send> {
    writer: W,
    pending: Option<Frame>,
}

impl<W: Write + Send> NdjsonSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            pending: None,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_line(&mut self, line: &str) -> SimResult<()> {
        self.writer.write_all(line.as_bytes())?;
        Ok(())
    }
}

impl<W: Write + Send> OutputSink for NdjsonSink<W> {
    fn open(&mut self, geometry: &Geometry) -> SimResult<()> {
        let line = to_ndjson(&GeometryFrame::new(geometry))?;
        self.write_line(&line)
    }

    fn begin_record(&mut self, header: &RecordHeader) -> SimResult<()> {
        if self.pending.is_some() {
            return Err(SimError::Output(format!(
                "record for step {} opened before the previous one ended",
                header.step
            )));
        }
        self.pending = Some(Frame::new(header));
        Ok(())
    }

    fn write_variable(&mut self, name: &str, values: &[Option<f64>]) -> SimResult<()> {
        let frame = self
            .pending
            .as_mut()
            .ok_or_else(|| SimError::Output(format!("variable {name} written outside a record")))?;
        frame.variables.insert(name.to_string(), values.to_vec());
        Ok(())
    }

    fn end_record(&mut self) -> SimResult<()> {
        let Some(frame) = self.pending.take() else {
            return Err(SimError::Output("no record to end".to_string()));
        };
        let line = frame.to_ndjson()?;
        self.write_line(&line)?;
        self.writer.flush()?;
        Ok(())
    }

    fn close(&mut self) -> SimResult<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(step: usize, last: bool) -> RecordHeader {
        RecordHeader {
            step,
            time: 3_600.0 * step as f64,
            date: "year 2000 month 01 day 01 at 01:00".to_string(),
            last,
        }
    }

    fn lines(sink: NdjsonSink<Vec<u8>>) -> Vec<serde_json::Value> {
        String::from_utf8(sink.into_inner())
            .expect("utf8 output")
            .lines()
            .map(|line| serde_json::from_str(line).expect("valid json"))
            .collect()
    }

    #[test]
    fn geometry_line_omits_empty_parts() {
        let mut sink = NdjsonSink::new(Vec::new());
        sink.open(&Geometry {
            edge: vec![(0.0, 0.0), (1.0, 0.0)],
            ..Geometry::default()
        })
        .unwrap();
        let lines = lines(sink);
        let geometry = lines[0].as_object().expect("geometry is object");
        assert_eq!(geometry.get("type").and_then(|v| v.as_str()), Some("geometry"));
        assert!(geometry.contains_key("edge"));
        assert!(!geometry.contains_key("land"));
        assert!(!geometry.contains_key("zones"));
    }

    #[test]
    fn records_carry_variables_and_last_flag() {
        let mut sink = NdjsonSink::new(Vec::new());
        sink.begin_record(&header(0, false)).unwrap();
        sink.write_variable("lon", &[Some(1.5), None]).unwrap();
        sink.end_record().unwrap();
        sink.begin_record(&header(1, true)).unwrap();
        sink.end_record().unwrap();

        let lines = lines(sink);
        assert_eq!(lines.len(), 2);
        let first = lines[0].as_object().expect("record is object");
        assert!(!first.contains_key("last"));
        assert_eq!(first["variables"]["lon"], serde_json::json!([1.5, null]));
        assert_eq!(lines[1]["last"], serde_json::Value::Bool(true));
        assert_eq!(lines[1]["step"].as_u64(), Some(1));
    }

    #[test]
    fn writes_outside_a_record_fail() {
        let mut sink = NdjsonSink::new(Vec::new());
        assert!(sink.write_variable("lon", &[]).is_err());
        assert!(sink.end_record().is_err());
    }
}
