use std::fs::{self, File};
use std::io;
use std::path::Path;

use csv::StringRecord;

use crate::error::{LinkError, Result};
use crate::structure::Position;

/// Particle-observation table: one row per detected particle per frame.
///
/// Cells are kept as text so that columns the linker does not use are written
/// back exactly as they were read.
#[derive(Debug, Clone)]
pub struct ParticleTable {
    headers: StringRecord,
    rows: Vec<StringRecord>,
}

impl ParticleTable {
    /// Load a table from a CSV file with a header row
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| LinkError::io(path, e))?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: io::Read>(reader: R) -> Result<Self> {
        let mut reader = csv::Reader::from_reader(reader);
        let headers = reader.headers()?.clone();

        let mut rows = Vec::new();
        for record in reader.records() {
            rows.push(record?);
        }

        Ok(Self { headers, rows })
    }

    pub fn headers(&self) -> Vec<&str> {
        self.headers.iter().collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| LinkError::MissingColumn(name.to_string()))
    }

    /// Parse a column of finite floating point values
    pub fn float_column(&self, name: &str) -> Result<Vec<f64>> {
        let idx = self.column_index(name)?;
        self.rows
            .iter()
            .enumerate()
            .map(|(row, record)| {
                let text = record.get(idx).unwrap_or("").trim();
                match text.parse::<f64>() {
                    Ok(v) if v.is_finite() => Ok(v),
                    _ => Err(invalid_value(row, name, text)),
                }
            })
            .collect()
    }

    /// Parse a column of integers. Floats with an integral value such as `3.0` are accepted.
    pub fn int_column(&self, name: &str) -> Result<Vec<i64>> {
        let idx = self.column_index(name)?;
        self.rows
            .iter()
            .enumerate()
            .map(|(row, record)| {
                let text = record.get(idx).unwrap_or("").trim();
                parse_integer(text).ok_or_else(|| invalid_value(row, name, text))
            })
            .collect()
    }

    /// Gather one position per row from the given columns
    pub fn positions(&self, columns: &[String]) -> Result<Vec<Position>> {
        let parsed: Vec<Vec<f64>> = columns
            .iter()
            .map(|name| self.float_column(name))
            .collect::<Result<_>>()?;

        Ok((0..self.rows.len())
            .map(|row| Position::new(parsed.iter().map(|col| col[row]).collect()))
            .collect())
    }

    /// Set an integer column, replacing it if present and appending it otherwise
    pub fn set_int_column(&mut self, name: &str, values: &[i64]) -> Result<()> {
        if values.len() != self.rows.len() {
            return Err(LinkError::InvalidConfig(format!(
                "column '{}' has {} values for {} rows",
                name,
                values.len(),
                self.rows.len()
            )));
        }

        match self.column_index(name) {
            Ok(idx) => {
                for (record, value) in self.rows.iter_mut().zip(values) {
                    let value = value.to_string();
                    let updated: StringRecord = record
                        .iter()
                        .enumerate()
                        .map(|(i, field)| if i == idx { value.as_str() } else { field })
                        .collect();
                    *record = updated;
                }
            }
            Err(_) => {
                self.headers.push_field(name);
                for (record, value) in self.rows.iter_mut().zip(values) {
                    record.push_field(&value.to_string());
                }
            }
        }
        Ok(())
    }

    pub fn write_to<W: io::Write>(&self, writer: W) -> Result<()> {
        let mut writer = csv::Writer::from_writer(writer);
        writer.write_record(&self.headers)?;
        for record in &self.rows {
            writer.write_record(record)?;
        }
        writer
            .flush()
            .map_err(|e| LinkError::Csv(csv::Error::from(e)))?;
        Ok(())
    }

    /// Save the table to `path`.
    ///
    /// The table is written to a temporary file next to `path` and then renamed over
    /// it, so `path` may be the file the table was read from.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| LinkError::io(dir, e))?;
        self.write_to(tmp.as_file())?;
        tmp.as_file().sync_all().map_err(|e| LinkError::io(tmp.path(), e))?;

        if let Ok(meta) = fs::metadata(path) {
            fs::set_permissions(tmp.path(), meta.permissions())
                .map_err(|e| LinkError::io(tmp.path(), e))?;
        }

        tmp.persist(path).map_err(|e| LinkError::io(path, e.error))?;
        Ok(())
    }
}

fn parse_integer(text: &str) -> Option<i64> {
    if let Ok(v) = text.parse::<i64>() {
        return Some(v);
    }
    let v = text.parse::<f64>().ok()?;
    if v.is_finite() && v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
        Some(v as i64)
    } else {
        None
    }
}

fn invalid_value(row: usize, column: &str, text: &str) -> LinkError {
    LinkError::InvalidValue {
        row: row + 1,
        column: column.to_string(),
        value: text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "x,y,z,frame,mass\n1.0,2.0,3.0,0,12.5\n1.1,2.1,3.1,1,13\n";

    fn sample() -> ParticleTable {
        ParticleTable::from_reader(SAMPLE.as_bytes()).unwrap()
    }

    #[test]
    fn test_reads_positions_and_frames() {
        let table = sample();
        assert_eq!(table.len(), 2);
        let cols = vec!["x".to_string(), "y".to_string(), "z".to_string()];
        let positions = table.positions(&cols).unwrap();
        assert_eq!(positions[1], Position::new(vec![1.1, 2.1, 3.1]));
        assert_eq!(table.int_column("frame").unwrap(), vec![0, 1]);
    }

    #[test]
    fn test_missing_column() {
        let err = sample().float_column("w").unwrap_err();
        assert!(matches!(err, LinkError::MissingColumn(ref c) if c == "w"));
    }

    #[test]
    fn test_non_numeric_position() {
        let table = ParticleTable::from_reader("x,frame\n1.0,0\nabc,1\n".as_bytes()).unwrap();
        match table.float_column("x").unwrap_err() {
            LinkError::InvalidValue { row, column, value } => {
                assert_eq!(row, 2);
                assert_eq!(column, "x");
                assert_eq!(value, "abc");
            }
            other => panic!("unexpected error: {other}"),
        }
        let table = ParticleTable::from_reader("x,frame\nNaN,0\n".as_bytes()).unwrap();
        assert!(table.float_column("x").is_err());
    }

    #[test]
    fn test_integral_float_frames() {
        let table = ParticleTable::from_reader("frame\n3.0\n 4 \n".as_bytes()).unwrap();
        assert_eq!(table.int_column("frame").unwrap(), vec![3, 4]);
        let table = ParticleTable::from_reader("frame\n3.5\n".as_bytes()).unwrap();
        assert!(matches!(
            table.int_column("frame"),
            Err(LinkError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_append_and_replace_column() {
        let mut table = sample();
        table.set_int_column("particle", &[7, 8]).unwrap();
        assert_eq!(table.headers(), vec!["x", "y", "z", "frame", "mass", "particle"]);

        table.set_int_column("particle", &[0, 1]).unwrap();
        assert_eq!(table.headers().len(), 6);

        let mut out = Vec::new();
        table.write_to(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "x,y,z,frame,mass,particle\n1.0,2.0,3.0,0,12.5,0\n1.1,2.1,3.1,1,13,1\n"
        );
    }

    #[test]
    fn test_set_column_length_mismatch() {
        let mut table = sample();
        assert!(table.set_int_column("particle", &[1]).is_err());
    }
}
