//! File loaders and writers around the agent: notes CSV, memory Markdown,
//! YAML documents, and the results CSV.

use std::fs;
use std::io::Write;
use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::Note;

/// Header of the results CSV written by [`write_results_csv`].
pub const RESULT_COLUMNS: [&str; 5] = [
    "raw_input",
    "interpreted_text",
    "clarity_score",
    "entity_type",
    "intent",
];

// ── CSV ────────────────────────────────────────────────────────────

/// Split CSV text into records of fields. No header row is assumed and
/// records may differ in length. Blank lines produce no record.
pub fn parse_csv(text: &str) -> std::result::Result<Vec<Vec<String>>, csv::Error> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes())
        .records()
        .map(|record| Ok(record?.iter().map(str::to_string).collect()))
        .collect()
}

fn csv_error(path: &Path, err: csv::Error) -> Error {
    Error::Csv {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

/// Load notes from a CSV file: the first non-blank cell of each row,
/// trimmed. Rows with no non-blank cell are skipped.
pub fn read_notes_csv(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    let records = parse_csv(&text).map_err(|e| csv_error(path, e))?;
    let notes: Vec<String> = records
        .iter()
        .filter_map(|r| r.iter().map(|c| c.trim()).find(|c| !c.is_empty()))
        .map(str::to_string)
        .collect();
    debug!("Loaded {} note(s) from {}", notes.len(), path.display());
    Ok(notes)
}

/// Write interpreted notes as a CSV with [`RESULT_COLUMNS`].
pub fn write_results_csv(path: impl AsRef<Path>, notes: &[Note]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    let mut writer = csv::Writer::from_path(path).map_err(|e| csv_error(path, e))?;
    writer
        .write_record(RESULT_COLUMNS)
        .map_err(|e| csv_error(path, e))?;
    for note in notes {
        writer
            .write_record([
                note.raw_input.clone(),
                note.field("interpreted_text"),
                note.field("clarity_score"),
                note.field("entity_type"),
                note.field("intent"),
            ])
            .map_err(|e| csv_error(path, e))?;
    }
    writer.flush().map_err(|e| Error::io(path, e))?;
    debug!("Wrote {} result row(s) to {}", notes.len(), path.display());
    Ok(())
}

// ── Memory ─────────────────────────────────────────────────────────

/// Load memory bullets: every line that starts with `* ` after trimming,
/// kept verbatim (bullet included).
pub fn read_user_memory(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| l.starts_with("* "))
        .map(str::to_string)
        .collect())
}

/// Append memory points to a Markdown file, one `* ` bullet per point.
/// Points that already carry the bullet are written unchanged.
pub fn append_memory_points(path: impl AsRef<Path>, points: &[String]) -> Result<()> {
    let path = path.as_ref();
    if points.is_empty() {
        return Ok(());
    }
    let needs_newline = fs::read_to_string(path)
        .map(|existing| !existing.is_empty() && !existing.ends_with('\n'))
        .unwrap_or(false);
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| Error::io(path, e))?;
    let mut buf = String::new();
    if needs_newline {
        buf.push('\n');
    }
    for point in points {
        let point = point.trim();
        if point.starts_with("* ") {
            buf.push_str(point);
        } else {
            buf.push_str("* ");
            buf.push_str(point);
        }
        buf.push('\n');
    }
    file.write_all(buf.as_bytes())
        .map_err(|e| Error::io(path, e))?;
    Ok(())
}

// ── YAML ───────────────────────────────────────────────────────────

/// Load a YAML document as a JSON value. An empty file yields `null`.
pub fn read_yaml(path: impl AsRef<Path>) -> Result<Value> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_yaml::from_str(&text).map_err(|e| Error::yaml(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DataEntry;

    #[test]
    fn parse_csv_handles_quotes() {
        let records = parse_csv("a,\"b, c\",\"say \"\"hi\"\"\"\r\n\"multi\nline\",x\n").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], vec!["a", "b, c", "say \"hi\""]);
        assert_eq!(records[1], vec!["multi\nline", "x"]);
    }

    #[test]
    fn parse_csv_keeps_ragged_rows_and_skips_blank_lines() {
        let records = parse_csv("note\n\nwater plants,phone,extra\n\n\"a\"\"b\"\n").unwrap();
        assert_eq!(
            records,
            vec![
                vec!["note"],
                vec!["water plants", "phone", "extra"],
                vec!["a\"b"],
            ]
        );
    }

    #[test]
    fn notes_use_first_non_blank_cell() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.csv");
        fs::write(&path, "  continue plan  \n,,\n, call mom,ignored\n\n").unwrap();

        let notes = read_notes_csv(&path).unwrap();
        assert_eq!(notes, vec!["continue plan", "call mom"]);
    }

    #[test]
    fn memory_keeps_bullets_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.md");
        fs::write(&path, "# Memory\n* memory one\nplain line\n  * memory two\n*no space\n").unwrap();

        let memory = read_user_memory(&path).unwrap();
        assert_eq!(memory, vec!["* memory one", "* memory two"]);
    }

    #[test]
    fn append_memory_adds_bullets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.md");
        fs::write(&path, "* existing").unwrap();

        append_memory_points(&path, &["* x".to_string(), "y".to_string()]).unwrap();
        let memory = read_user_memory(&path).unwrap();
        assert_eq!(memory, vec!["* existing", "* x", "* y"]);
    }

    #[test]
    fn results_csv_round_trips_through_parser() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("results.csv");
        let mut note = Note::new("buy milk, eggs");
        note.apply_entry(&DataEntry {
            raw_text: "buy milk, eggs".into(),
            interpreted_text: "Buy \"milk\" and eggs".into(),
            entity_type: "task".into(),
            intent: "@DO".into(),
            clarity_score: 90,
        });

        write_results_csv(&path, &[note]).unwrap();
        let records = parse_csv(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(records[0], RESULT_COLUMNS.to_vec());
        assert_eq!(
            records[1],
            vec!["buy milk, eggs", "Buy \"milk\" and eggs", "90", "task", "@DO"]
        );
    }

    #[test]
    fn read_yaml_parses_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.yaml");
        fs::write(&path, "entity_types: [task]\nintents: [\"@DO\"]\n").unwrap();

        let value = read_yaml(&path).unwrap();
        assert_eq!(value["entity_types"][0], "task");
        assert_eq!(value["intents"][0], "@DO");
    }

    #[test]
    fn read_yaml_missing_file_is_io_error() {
        let err = read_yaml("/nonexistent/definitely/missing.yaml").unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
