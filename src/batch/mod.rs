pub mod questions;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{error, info};

use crate::glean::{AnswerResponse, AnswerSource};
use crate::instrumentation::TimingSummary;

pub use questions::{output_path, read_questions, write_questions, QuestionRecord};

/// Pause after every row to stay under the API rate limit.
pub const ROW_PAUSE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub processed: usize,
    pub skipped: usize,
    pub answered: usize,
    pub failed: usize,
    pub timing: Option<TimingSummary>,
}

impl BatchReport {
    pub fn summary(&self) -> String {
        let mut line = format!(
            "Processed: {} | Skipped: {} | Answered: {} | Failed: {}",
            self.processed, self.skipped, self.answered, self.failed
        );
        match &self.timing {
            Some(timing) => {
                line.push_str(" | ");
                line.push_str(&timing.summary());
            }
            None => line.push_str(" | No API calls made"),
        }
        line
    }
}

pub struct BatchRunner<'a, S> {
    source: &'a S,
    output: PathBuf,
    persist: bool,
    pause: Duration,
}

impl<'a, S: AnswerSource> BatchRunner<'a, S> {
    pub fn new(source: &'a S, output: PathBuf) -> Self {
        Self {
            source,
            output,
            persist: true,
            pause: ROW_PAUSE,
        }
    }

    /// Dry runs neither write the output file nor record latency.
    pub fn persist(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }

    pub fn pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    pub async fn run(&self, questions: &mut [QuestionRecord]) -> BatchReport {
        let mut report = BatchReport::default();
        let mut latencies: Vec<f64> = Vec::new();

        for i in 0..questions.len() {
            report.processed += 1;

            if questions[i].is_answered() {
                let question = &questions[i];
                info!(
                    "Skipping question {} - already has an answer: {}",
                    question.qid, question.question
                );
                report.skipped += 1;
            } else {
                info!("Processing question: {}", questions[i].question);

                let call_start = Instant::now();
                let result = self.source.answer(&questions[i]).await;
                let call_latency = call_start.elapsed().as_secs_f64();

                match result {
                    Ok(response) => {
                        if self.persist {
                            latencies.push(call_latency);
                        }
                        if merge_response(&mut questions[i], response) {
                            report.answered += 1;
                        }
                    }
                    Err(e) => {
                        if self.persist && e.reached_network() {
                            latencies.push(call_latency);
                        }
                        error!("Error processing question {}: {}", questions[i].qid, e);
                        report.failed += 1;
                    }
                }

                if self.persist {
                    info!("Syncing question log to: {}", self.output.display());
                    if let Err(e) = write_questions(&self.output, questions) {
                        error!("Error writing to CSV file: {:#}", e);
                    }
                }
            }

            tokio::time::sleep(self.pause).await;
        }

        report.timing = TimingSummary::from_latencies(&latencies);
        report
    }
}

/// Copies a successful response into the row. Returns whether the row is now
/// answered; lists are only written when non-empty.
fn merge_response(question: &mut QuestionRecord, response: AnswerResponse) -> bool {
    let mut answered = false;
    if let Some(answer) = response.answer.filter(|a| !a.is_empty()) {
        question.set_answer(answer, chrono::Local::now().naive_local());
        answered = true;
    }
    if !response.citations.is_empty() {
        question.citations = response.citations.join("\n");
    }
    if !response.research.is_empty() {
        question.research = response.research.join("\n");
    }
    answered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::glean::ClientError;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::fs;

    /// Replays canned results and records which questions were asked.
    struct ScriptedSource {
        results: RefCell<VecDeque<Result<AnswerResponse, ClientError>>>,
        asked: RefCell<Vec<String>>,
    }

    impl ScriptedSource {
        fn new(results: Vec<Result<AnswerResponse, ClientError>>) -> Self {
            Self {
                results: RefCell::new(results.into()),
                asked: RefCell::new(Vec::new()),
            }
        }
    }

    impl AnswerSource for ScriptedSource {
        async fn answer(&self, question: &QuestionRecord) -> Result<AnswerResponse, ClientError> {
            self.asked.borrow_mut().push(question.qid.clone());
            self.results
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Ok(AnswerResponse::default()))
        }
    }

    fn unanswered(qid: &str, question: &str) -> QuestionRecord {
        QuestionRecord {
            qid: qid.into(),
            question: question.into(),
            ..Default::default()
        }
    }

    fn paris() -> AnswerResponse {
        AnswerResponse {
            answer: Some("Paris".into()),
            research: vec!["https://b".into(), "https://c".into()],
            citations: vec!["https://a".into()],
        }
    }

    #[tokio::test]
    async fn skips_answered_rows_and_keeps_them_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("questions.csv");
        let output = dir.path().join("questions_out.csv");
        let answered_row = "1,Already asked?,Yes,,https://x,2024-01-01 00:00:00";
        fs::write(
            &input,
            format!("qid,question,answer,research,citations,datetime\n{answered_row}\n2,Capital of France?,,,,\n"),
        )
        .unwrap();

        let mut questions = read_questions(&input);
        let source = ScriptedSource::new(vec![Ok(paris())]);
        let report = BatchRunner::new(&source, output.clone())
            .pause(Duration::ZERO)
            .run(&mut questions)
            .await;

        assert_eq!(report.skipped, 1);
        assert_eq!(report.processed, 2);
        assert_eq!(report.answered, 1);
        assert_eq!(*source.asked.borrow(), vec!["2".to_string()]);

        let written = fs::read_to_string(&output).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines[0], "qid,question,answer,research,citations,datetime");
        assert_eq!(lines[1], answered_row);
    }

    #[tokio::test]
    async fn error_leaves_row_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.csv");
        let original = QuestionRecord {
            research: "old research".into(),
            citations: "old citations".into(),
            datetime: "2023-12-31 23:59:59".into(),
            ..unanswered("1", "Capital of France?")
        };
        let mut questions = vec![original.clone()];

        let source = ScriptedSource::new(vec![Err(ClientError::Status {
            status: 500,
            body: "boom".into(),
        })]);
        let report = BatchRunner::new(&source, output.clone())
            .pause(Duration::ZERO)
            .run(&mut questions)
            .await;

        assert_eq!(questions[0], original);
        assert_eq!(report.failed, 1);
        assert_eq!(report.answered, 0);
        assert_eq!(report.timing.map(|t| t.calls), Some(1));
        // The file is still rewritten after a failed row.
        assert!(output.exists());
    }

    #[tokio::test]
    async fn success_merges_answer_and_urls() {
        let dir = tempfile::tempdir().unwrap();
        let mut questions = vec![unanswered("1", "Capital of France?")];

        let source = ScriptedSource::new(vec![Ok(paris())]);
        let before = chrono::Local::now().naive_local();
        BatchRunner::new(&source, dir.path().join("out.csv"))
            .pause(Duration::ZERO)
            .run(&mut questions)
            .await;

        let row = &questions[0];
        assert_eq!(row.answer, "Paris");
        assert_eq!(row.citations, "https://a");
        assert_eq!(row.research, "https://b\nhttps://c");
        let stamped = chrono::NaiveDateTime::parse_from_str(&row.datetime, "%Y-%m-%d %H:%M:%S").unwrap();
        assert!(stamped >= before - chrono::Duration::seconds(1));
    }

    #[tokio::test]
    async fn empty_answer_keeps_row_unanswered_but_merges_urls() {
        let dir = tempfile::tempdir().unwrap();
        let mut questions = vec![unanswered("1", "Capital of France?")];

        let source = ScriptedSource::new(vec![Ok(AnswerResponse {
            answer: Some(String::new()),
            research: Vec::new(),
            citations: vec!["https://a".into()],
        })]);
        let report = BatchRunner::new(&source, dir.path().join("out.csv"))
            .pause(Duration::ZERO)
            .run(&mut questions)
            .await;

        assert!(!questions[0].is_answered());
        assert_eq!(questions[0].datetime, "");
        assert_eq!(questions[0].citations, "https://a");
        assert_eq!(questions[0].research, "");
        assert_eq!(report.answered, 0);
    }

    #[tokio::test]
    async fn dry_run_writes_nothing_and_records_no_latency() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.csv");
        let mut questions = vec![unanswered("1", "a"), unanswered("2", "b")];

        let source = ScriptedSource::new(Vec::new());
        let report = BatchRunner::new(&source, output.clone())
            .persist(false)
            .pause(Duration::ZERO)
            .run(&mut questions)
            .await;

        assert!(!output.exists());
        assert_eq!(report.processed, 2);
        assert_eq!(report.timing, None);
        assert_eq!(source.asked.borrow().len(), 2);
    }

    #[tokio::test]
    async fn validation_failure_records_no_latency() {
        let dir = tempfile::tempdir().unwrap();
        let mut questions = vec![unanswered("", "")];

        let source = ScriptedSource::new(vec![Err(ClientError::MissingFields(vec!["qid", "question"]))]);
        let report = BatchRunner::new(&source, dir.path().join("out.csv"))
            .pause(Duration::ZERO)
            .run(&mut questions)
            .await;

        assert_eq!(report.failed, 1);
        assert_eq!(report.timing, None);
    }

    #[tokio::test]
    async fn write_failure_does_not_stop_the_loop() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("missing-dir").join("out.csv");
        let mut questions = vec![unanswered("1", "a"), unanswered("2", "b")];

        let source = ScriptedSource::new(vec![Ok(paris()), Ok(paris())]);
        let report = BatchRunner::new(&source, output)
            .pause(Duration::ZERO)
            .run(&mut questions)
            .await;

        assert_eq!(report.answered, 2);
        assert!(questions.iter().all(QuestionRecord::is_answered));
    }

    #[test]
    fn summary_mentions_counts() {
        let report = BatchReport {
            processed: 3,
            skipped: 1,
            answered: 2,
            failed: 0,
            timing: None,
        };
        assert_eq!(
            report.summary(),
            "Processed: 3 | Skipped: 1 | Answered: 2 | Failed: 0 | No API calls made"
        );
    }
}
