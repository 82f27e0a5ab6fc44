use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

const CSV_HEADER: &str = "#,Prompt,Response\n";

/// One answered prompt, ready for the ordered writer. A prompt whose
/// request failed carries an empty response list and emits no rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptRecord {
    pub index: usize,
    pub prompt: String,
    pub responses: Vec<String>,
}

/// RFC4180-style field quoting: wrap in double quotes and double any
/// embedded quote, so commas and newlines survive a round trip.
pub fn csv_field(raw: &str) -> String {
    let mut field = String::with_capacity(raw.len() + 2);
    field.push('"');
    for ch in raw.chars() {
        if ch == '"' {
            field.push('"');
        }
        field.push(ch);
    }
    field.push('"');
    field
}

fn csv_rows(record: &PromptRecord) -> String {
    let prompt = csv_field(&record.prompt);
    let mut rows = String::new();
    for response in &record.responses {
        rows.push_str(&format!(
            "{},{},{}\n",
            record.index,
            prompt,
            csv_field(response)
        ));
    }
    rows
}

/// Append-only CSV destination. Every write happens under one mutex so the
/// header-on-empty check and the append cannot interleave, whichever path
/// (sequential or writer task) is flushing.
#[derive(Debug)]
pub struct CsvSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl CsvSink {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates the file and writes the header if it is empty.
    pub async fn initialize(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut file = self.open_with_header().await?;
        file.flush()
            .await
            .with_context(|| format!("Failed to flush output file '{}'", self.path.display()))?;
        Ok(())
    }

    /// Appends one row per response choice. Records with no responses only
    /// ensure the header exists.
    pub async fn append(&self, record: &PromptRecord) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut file = self.open_with_header().await?;
        let rows = csv_rows(record);
        if !rows.is_empty() {
            file.write_all(rows.as_bytes()).await.with_context(|| {
                format!("Failed to append to output file '{}'", self.path.display())
            })?;
        }
        file.flush()
            .await
            .with_context(|| format!("Failed to flush output file '{}'", self.path.display()))?;
        Ok(())
    }

    async fn open_with_header(&self) -> Result<File> {
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open output file '{}'", self.path.display()))?;

        let len = file
            .metadata()
            .await
            .with_context(|| format!("Failed to stat output file '{}'", self.path.display()))?
            .len();
        if len == 0 {
            file.write_all(CSV_HEADER.as_bytes()).await.with_context(|| {
                format!(
                    "Failed to write header to output file '{}'",
                    self.path.display()
                )
            })?;
        }
        Ok(file)
    }
}

/// Holds records that completed ahead of their turn until every earlier
/// index has been flushed. Never retains more entries than there are
/// concurrent workers.
#[derive(Debug)]
pub struct ReorderBuffer {
    pending: HashMap<usize, PromptRecord>,
    next_index: usize,
}

impl ReorderBuffer {
    pub fn new() -> Self {
        Self {
            pending: HashMap::new(),
            next_index: 1,
        }
    }

    /// Inserts a completed record and returns the maximal run of records
    /// that are now ready to flush, in ascending index order.
    pub fn push(&mut self, record: PromptRecord) -> Vec<PromptRecord> {
        self.pending.insert(record.index, record);

        let mut ready = Vec::new();
        while let Some(next) = self.pending.remove(&self.next_index) {
            ready.push(next);
            self.next_index += 1;
        }
        ready
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

impl Default for ReorderBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Forces a `.csv` extension and suffixes `_1`, `_2`, ... until the path
/// does not collide with an existing file.
pub fn unique_output_path(requested: &Path) -> PathBuf {
    let base = requested.with_extension("");
    let mut candidate = base.with_extension("csv");
    let mut counter = 1;
    while candidate.exists() {
        candidate = PathBuf::from(format!("{}_{}.csv", base.display(), counter));
        counter += 1;
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::{CsvSink, PromptRecord, ReorderBuffer, csv_field, unique_output_path};

    fn record(index: usize, responses: &[&str]) -> PromptRecord {
        PromptRecord {
            index,
            prompt: format!("prompt {index}"),
            responses: responses.iter().map(|r| r.to_string()).collect(),
        }
    }

    /// Minimal CSV-aware unquoting for round-trip assertions.
    fn unquote(field: &str) -> String {
        let inner = field
            .strip_prefix('"')
            .and_then(|rest| rest.strip_suffix('"'))
            .expect("field should be quoted");
        inner.replace("\"\"", "\"")
    }

    #[test]
    fn csv_field_doubles_embedded_quotes() {
        assert_eq!(csv_field(r#"say "hi", please"#), r#""say ""hi"", please""#);
    }

    #[test]
    fn csv_field_round_trips_awkward_content() {
        for raw in [r#"a "quoted" word"#, "commas, everywhere,", "\"", ""] {
            assert_eq!(unquote(&csv_field(raw)), raw);
        }
    }

    #[test]
    fn reorder_buffer_releases_records_in_index_order() {
        let mut buffer = ReorderBuffer::new();
        assert!(buffer.push(record(3, &["c"])).is_empty());
        assert!(buffer.push(record(2, &["b"])).is_empty());
        assert_eq!(buffer.pending_len(), 2);

        let ready = buffer.push(record(1, &["a"]));
        let indices: Vec<usize> = ready.iter().map(|r| r.index).collect();
        assert_eq!(indices, [1, 2, 3]);
        assert_eq!(buffer.pending_len(), 0);
    }

    #[test]
    fn reorder_buffer_handles_interleaved_arrivals() {
        let mut buffer = ReorderBuffer::new();
        let mut flushed = Vec::new();
        for index in [2, 5, 1, 3, 4] {
            flushed.extend(buffer.push(record(index, &["x"])).into_iter().map(|r| r.index));
        }
        assert_eq!(flushed, [1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn sink_writes_header_exactly_once() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let sink = CsvSink::new(dir.path().join("out.csv"));

        sink.initialize().await.expect("initialize should succeed");
        sink.append(&record(1, &["one"]))
            .await
            .expect("append should succeed");
        sink.append(&record(2, &["two"]))
            .await
            .expect("append should succeed");

        let contents = std::fs::read_to_string(sink.path()).expect("output should be readable");
        let headers = contents
            .lines()
            .filter(|line| *line == "#,Prompt,Response")
            .count();
        assert_eq!(headers, 1);
        assert!(contents.starts_with("#,Prompt,Response\n"));
    }

    #[tokio::test]
    async fn sink_emits_one_row_per_response_choice() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let sink = CsvSink::new(dir.path().join("out.csv"));

        sink.append(&record(7, &["first", "second"]))
            .await
            .expect("append should succeed");

        let contents = std::fs::read_to_string(sink.path()).expect("output should be readable");
        let rows: Vec<&str> = contents.lines().skip(1).collect();
        assert_eq!(
            rows,
            [r#"7,"prompt 7","first""#, r#"7,"prompt 7","second""#]
        );
    }

    #[tokio::test]
    async fn sink_skips_rows_for_empty_response_sets() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let sink = CsvSink::new(dir.path().join("out.csv"));

        sink.append(&record(1, &[])).await.expect("append should succeed");

        let contents = std::fs::read_to_string(sink.path()).expect("output should be readable");
        assert_eq!(contents, "#,Prompt,Response\n");
    }

    #[test]
    fn unique_output_path_forces_csv_extension() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let requested = dir.path().join("results.txt");
        assert_eq!(unique_output_path(&requested), dir.path().join("results.csv"));
    }

    #[test]
    fn unique_output_path_suffixes_until_free() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        std::fs::write(dir.path().join("out.csv"), "x").expect("write should succeed");
        std::fs::write(dir.path().join("out_1.csv"), "x").expect("write should succeed");

        let requested = dir.path().join("out.csv");
        assert_eq!(unique_output_path(&requested), dir.path().join("out_2.csv"));
    }
}
