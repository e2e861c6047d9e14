//! Transcript writer (§6): one directory per session holding `request.json`,
//! `stage1.json`, `stage2.json`, `stage3.json`, `result.json`, and an
//! append-only `events.ndjson`. The directory itself is the external sink;
//! this crate owns only the writer for that layout.

use crate::domain::{DeliberationResult, Query, StageOneResponse};
use crate::error::Result;
use crate::events::LayerEvent;
use crate::rubric::PeerReview;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Owns the on-disk layout for one session. Created at `SELECTING_PANEL`,
/// written to incrementally as each stage completes, sealed at `SEALED`/`FAILED`.
pub struct TranscriptWriter {
    dir: PathBuf,
}

impl TranscriptWriter {
    /// Creates the session directory (and its `events.ndjson`) under `root`.
    pub fn create(root: impl AsRef<Path>, query_id: impl std::fmt::Display) -> Result<Self> {
        let dir = root.as_ref().join(query_id.to_string());
        fs::create_dir_all(&dir)?;
        // Touch the events file up front so readers can tail it from the start.
        OpenOptions::new().create(true).append(true).open(dir.join("events.ndjson"))?;
        Ok(Self { dir })
    }

    pub fn write_request(&self, query: &Query) -> Result<()> {
        self.write_json("request.json", query)
    }

    pub fn write_stage1(&self, responses: &[StageOneResponse]) -> Result<()> {
        self.write_json("stage1.json", responses)
    }

    pub fn write_stage2(&self, reviews: &[PeerReview]) -> Result<()> {
        self.write_json("stage2.json", reviews)
    }

    pub fn write_stage3(&self, synthesis: &str) -> Result<()> {
        self.write_json("stage3.json", &serde_json::json!({ "synthesis": synthesis }))
    }

    /// Appends one line to `events.ndjson`. Called for every event the
    /// session emits, independent of whether any live subscriber is watching.
    pub fn append_event(&self, event: &LayerEvent) -> Result<()> {
        let mut file = OpenOptions::new().append(true).open(self.dir.join("events.ndjson"))?;
        writeln!(file, "{}", serde_json::to_string(event)?)?;
        Ok(())
    }

    /// Writes `result.json`; this is the seal — called exactly once, on
    /// `council.completed` or `council.failed`.
    pub fn seal(&self, result: &DeliberationResult) -> Result<()> {
        self.write_json("result.json", result)
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn write_json<T: Serialize>(&self, filename: &str, value: &T) -> Result<()> {
        let file = File::create(self.dir.join(filename))?;
        serde_json::to_writer_pretty(file, value)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Mode, Tier, VerdictType};
    use crate::events::{EventEmitter, EventKind};
    use tempfile::tempdir;

    #[test]
    fn create_touches_events_file() {
        let root = tempdir().unwrap();
        let writer = TranscriptWriter::create(root.path(), "session-1").unwrap();
        assert!(writer.path().join("events.ndjson").exists());
    }

    #[test]
    fn write_request_then_read_back() {
        let root = tempdir().unwrap();
        let writer = TranscriptWriter::create(root.path(), "session-2").unwrap();
        let query = Query::new("what is the plan?", Mode::Consensus, VerdictType::FreeForm, Tier::Standard);
        writer.write_request(&query).unwrap();

        let raw = fs::read_to_string(writer.path().join("request.json")).unwrap();
        assert!(raw.contains("what is the plan?"));
    }

    #[test]
    fn append_event_accumulates_ndjson_lines() {
        let root = tempdir().unwrap();
        let writer = TranscriptWriter::create(root.path(), "session-3").unwrap();
        let emitter = EventEmitter::new("session-3");
        writer.append_event(&emitter.emit(EventKind::CouncilStarted, None, None)).unwrap();
        writer.append_event(&emitter.emit(EventKind::CouncilCompleted, None, None)).unwrap();

        let raw = fs::read_to_string(writer.path().join("events.ndjson")).unwrap();
        assert_eq!(raw.lines().count(), 2);
    }
}
