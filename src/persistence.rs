// This file is part of ring_stiffness_controller.
//
// Developed for the pipe ring-stiffness test rig.
// See the COPYRIGHT file at the top-level directory of this distribution
// for details of code ownership.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcOffset};

use crate::error::PersistenceError;
use crate::lifecycle::test_run::{DataPoint, FinishedRun};
use crate::telemetry::parameters::TestParameters;

/// Operator metadata of the next test, supplied before the test ends.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PendingMetadata {
    pub sample_id: String,
    pub operator: String,
    pub notes: String,
}

impl PendingMetadata {
    /// Nothing is supplied or not.
    pub fn is_empty(&self) -> bool {
        self.sample_id.is_empty() && self.operator.is_empty() && self.notes.is_empty()
    }
}

/// Record of a finished test to save.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestRecord {
    pub parameters: TestParameters,
    // Ring stiffness in kN/m2.
    pub ring_stiffness: f64,
    // Force at the target deflection in N.
    pub force_at_target: f64,
    pub sn_class: i16,
    pub passed: bool,
    // Test speed in mm/min, captured at the start.
    pub test_speed: f64,
    pub final_status: i16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PendingMetadata>,
    // Test date in RFC 3339 with the local offset.
    pub test_date: String,
    #[serde(skip)]
    pub data_points: Vec<DataPoint>,
}

impl TestRecord {
    /// Create a new test record.
    ///
    /// # Arguments
    /// * `parameters` - Test parameters read after the completion.
    /// * `run` - Finished run.
    /// * `metadata` - Operator metadata.
    /// * `offset_hours` - Local offset from UTC in hour.
    ///
    /// # Returns
    /// New test record.
    pub fn new(
        parameters: TestParameters,
        run: &FinishedRun,
        metadata: &PendingMetadata,
        offset_hours: i8,
    ) -> Result<Self, PersistenceError> {
        let offset = UtcOffset::from_hms(offset_hours, 0, 0)?;
        let test_date = OffsetDateTime::now_utc().to_offset(offset).format(&Rfc3339)?;

        Ok(Self {
            parameters,
            ring_stiffness: run.results.ring_stiffness,
            force_at_target: run.results.force_at_target,
            sn_class: run.results.sn_class,
            passed: run.passed(),
            test_speed: run.test_speed,
            final_status: run.final_status(),
            metadata: (!metadata.is_empty()).then(|| metadata.clone()),
            test_date,
            data_points: run.data_points.clone(),
        })
    }
}

/// Storage of the finished tests.
pub trait TestRecorder: Send {
    /// Save the test record.
    ///
    /// # Arguments
    /// * `record` - Test record.
    ///
    /// # Returns
    /// Identifier of the saved record.
    fn save(&mut self, record: &TestRecord) -> Result<i64, PersistenceError>;
}

/// Save each test as a JSON summary and a CSV file of the data points.
pub struct FileRecorder {
    // Directory of the files.
    _dir: PathBuf,
    // Identifier of the next record.
    _next_id: i64,
}

impl FileRecorder {
    /// Create a new file recorder. The directory is created if needed and
    /// the identifiers continue after the existing records.
    ///
    /// # Arguments
    /// * `dir` - Directory of the files.
    ///
    /// # Returns
    /// New file recorder.
    pub fn new(dir: &Path) -> Result<Self, PersistenceError> {
        fs::create_dir_all(dir)?;

        let last_id = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .and_then(|name| name.strip_prefix("test_"))
                    .and_then(|name| name.strip_suffix(".json"))
                    .and_then(|id| id.parse::<i64>().ok())
            })
            .max()
            .unwrap_or(0);

        info!("Test records are saved in {dir:?}, next id is {}.", last_id + 1);

        Ok(Self {
            _dir: dir.to_path_buf(),
            _next_id: last_id + 1,
        })
    }

    /// Path of the summary of the record.
    pub fn summary_path(&self, id: i64) -> PathBuf {
        self._dir.join(format!("test_{id}.json"))
    }

    /// Path of the data points of the record.
    pub fn data_points_path(&self, id: i64) -> PathBuf {
        self._dir.join(format!("test_{id}.csv"))
    }
}

impl TestRecorder for FileRecorder {
    fn save(&mut self, record: &TestRecord) -> Result<i64, PersistenceError> {
        let id = self._next_id;

        let mut writer = csv::Writer::from_path(self.data_points_path(id))?;
        for point in &record.data_points {
            writer.serialize(point)?;
        }
        writer.flush()?;

        // The summary is written last, so an id is only taken by a complete
        // record.
        let file = File::create(self.summary_path(id))?;
        if let Err(error) = serde_json::to_writer_pretty(file, record) {
            warn!("Failed to write the summary of the test {id}: {error}.");
            return Err(error.into());
        }

        self._next_id += 1;

        info!(
            "Test {id} is saved: RS={:.1} kN/m2, SN{}, {}, {} data points.",
            record.ring_stiffness,
            record.sn_class,
            if record.passed { "PASS" } else { "FAIL" },
            record.data_points.len()
        );

        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::Value;
    use std::time::Instant;
    use tempfile::tempdir;

    use crate::lifecycle::test_run::TestRun;
    use crate::telemetry::snapshot::LiveSnapshot;

    fn create_finished_run() -> FinishedRun {
        let mut snapshot = LiveSnapshot::disconnected("127.0.0.1");
        snapshot.force.kn = 1.2;

        let mut run = TestRun::new(12.0, Instant::now());
        run.record(&snapshot, Instant::now());
        run.record(&snapshot, Instant::now());

        snapshot.test.status = 0;
        snapshot.test.passed = true;
        snapshot.results.ring_stiffness = 9.1;
        snapshot.results.sn_class = 8;

        run.finish(&snapshot)
    }

    fn create_record(metadata: &PendingMetadata) -> TestRecord {
        TestRecord::new(
            TestParameters::default(),
            &create_finished_run(),
            metadata,
            3,
        )
        .unwrap()
    }

    #[test]
    fn test_record_new() {
        let record = create_record(&PendingMetadata::default());

        assert!(record.passed);
        assert_eq!(record.sn_class, 8);
        assert_eq!(record.data_points.len(), 2);
        assert_eq!(record.metadata, None);
        assert!(record.test_date.ends_with("+03:00"));
    }

    #[test]
    fn test_record_new_invalid_offset() {
        let result = TestRecord::new(
            TestParameters::default(),
            &create_finished_run(),
            &PendingMetadata::default(),
            30,
        );

        assert!(matches!(result, Err(PersistenceError::TimeZone(_))));
    }

    #[test]
    fn test_record_with_metadata() {
        let metadata = PendingMetadata {
            sample_id: String::from("S-001"),
            ..PendingMetadata::default()
        };

        let record = create_record(&metadata);

        assert_eq!(record.metadata, Some(metadata));
    }

    #[test]
    fn test_save() {
        let dir = tempdir().unwrap();
        let mut recorder = FileRecorder::new(dir.path()).unwrap();

        let record = create_record(&PendingMetadata::default());

        assert_eq!(recorder.save(&record).unwrap(), 1);
        assert_eq!(recorder.save(&record).unwrap(), 2);

        let summary: Value =
            serde_json::from_reader(File::open(recorder.summary_path(1)).unwrap()).unwrap();
        assert_eq!(summary["sn_class"], 8);
        assert_eq!(summary["parameters"]["test_speed"], 12.0);
        assert!(summary.get("data_points").is_none());

        let mut reader = csv::Reader::from_path(recorder.data_points_path(1)).unwrap();
        let headers: Vec<String> = reader
            .headers()
            .unwrap()
            .iter()
            .map(String::from)
            .collect();
        assert_eq!(headers, vec!["timestamp", "force", "deflection", "position"]);
        assert_eq!(reader.records().count(), 2);
    }

    #[test]
    fn test_new_continues_ids() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("test_7.json"), "{}").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();

        let mut recorder = FileRecorder::new(dir.path()).unwrap();

        assert_eq!(
            recorder.save(&create_record(&PendingMetadata::default())).unwrap(),
            8
        );
    }

    #[test]
    fn test_save_fail() {
        let dir = tempdir().unwrap();
        let mut recorder = FileRecorder::new(&dir.path().join("data")).unwrap();

        fs::remove_dir_all(dir.path().join("data")).unwrap();

        assert!(recorder
            .save(&create_record(&PendingMetadata::default()))
            .is_err());
    }
}
