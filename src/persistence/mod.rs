use chrono::NaiveDate;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use crate::strategy::patterns::SignalRecord;
use crate::Result;

/// Daily CSV archive of classified bars
///
/// One file per UTC day, `signals_output_YYYY-MM-DD.csv`. The header is written when the
/// file is created; later cycles append rows only.
#[derive(Debug, Clone)]
pub struct SignalArchive {
    dir: PathBuf,
}

impl SignalArchive {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Archive file for a given day
    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("signals_output_{}.csv", date.format("%Y-%m-%d")))
    }

    /// Append records to the file for `date`, creating it if needed
    ///
    /// Returns the number of rows written. An empty slice touches nothing.
    pub fn append(&self, date: NaiveDate, records: &[SignalRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(date);
        let needs_header = std::fs::metadata(&path).map_or(true, |m| m.len() == 0);

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(needs_header)
            .from_writer(file);

        for record in records {
            writer.serialize(record)?;
        }
        writer.flush()?;

        tracing::debug!(
            path = %path.display(),
            rows = records.len(),
            created = needs_header,
            "Archived signals"
        );

        Ok(records.len())
    }

    /// Read back every row archived for `date`
    pub fn load(&self, date: NaiveDate) -> Result<Vec<SignalRecord>> {
        let mut reader = csv::Reader::from_path(self.path_for(date))?;
        let records = reader
            .deserialize()
            .collect::<std::result::Result<Vec<SignalRecord>, csv::Error>>()?;
        Ok(records)
    }
}
