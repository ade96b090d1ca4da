use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use tracing::{debug, error, info};

pub const FIELD_NAMES: [&str; 6] = ["qid", "question", "answer", "research", "citations", "datetime"];

const ROW_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const FILE_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// One row of the question table. Empty strings stand for absent values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuestionRecord {
    pub qid: String,
    pub question: String,
    pub answer: String,
    pub research: String,
    pub citations: String,
    pub datetime: String,
}

impl QuestionRecord {
    fn from_fields(record: &csv::StringRecord) -> Self {
        let field = |i: usize| record.get(i).unwrap_or_default().to_string();
        Self {
            qid: field(0),
            question: field(1),
            answer: field(2),
            research: field(3),
            citations: field(4),
            datetime: field(5),
        }
    }

    fn to_fields(&self) -> [&str; 6] {
        [
            &self.qid,
            &self.question,
            &self.answer,
            &self.research,
            &self.citations,
            &self.datetime,
        ]
    }

    pub fn is_answered(&self) -> bool {
        !self.answer.is_empty()
    }

    pub fn set_answer(&mut self, answer: String, answered_at: NaiveDateTime) {
        self.answer = answer;
        self.datetime = answered_at.format(ROW_TIMESTAMP_FORMAT).to_string();
    }
}

/// Reads the question table, discarding the header row. Any failure is
/// logged and yields an empty table.
pub fn read_questions(path: &Path) -> Vec<QuestionRecord> {
    match try_read_questions(path) {
        Ok(questions) => questions,
        Err(e) => {
            error!("Error reading CSV file: {:#}", e);
            Vec::new()
        }
    }
}

fn try_read_questions(path: &Path) -> Result<Vec<QuestionRecord>> {
    info!("Reading questions from CSV file: {}", path.display());

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .context(format!("Failed to open questions file: {}", path.display()))?;

    let mut questions = Vec::new();
    for (i, row) in reader.records().enumerate() {
        let row = row.context(format!("Failed to parse row {}", i + 2))?;
        let question = QuestionRecord::from_fields(&row);
        debug!(
            qid = %question.qid,
            answered = question.is_answered(),
            "Read question: {}",
            question.question
        );
        questions.push(question);
    }

    Ok(questions)
}

/// Replaces the whole file with a header and every row.
pub fn write_questions(path: &Path, questions: &[QuestionRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .context(format!("Failed to create output file: {}", path.display()))?;

    writer
        .write_record(FIELD_NAMES)
        .context("Failed to write header")?;
    for question in questions {
        writer
            .write_record(question.to_fields())
            .context(format!("Failed to write question {}", question.qid))?;
    }
    writer.flush().context("Failed to flush output file")?;

    Ok(())
}

/// `<stem>_<timestamp>[_<user>].csv` next to the input file.
pub fn output_path(input: &Path, started_at: NaiveDateTime, act_as: Option<&str>) -> PathBuf {
    let stem = match input.extension().and_then(|ext| ext.to_str()) {
        Some("csv") => input.file_stem(),
        _ => input.file_name(),
    }
    .map(|s| s.to_string_lossy().into_owned())
    .unwrap_or_default();

    let mut name = format!("{}_{}", stem, started_at.format(FILE_TIMESTAMP_FORMAT));
    if let Some(user) = act_as {
        name.push('_');
        name.push_str(user);
    }
    name.push_str(".csv");

    input.with_file_name(name)
}
