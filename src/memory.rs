use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::PathBuf;

use chrono::Utc;

use crate::classification::ClassificationResult;
use crate::error::Result;

/// Optional, append-only record of completed interactions: one dated markdown file
/// per day under `base_dir`, each line a `UserInput -> ClassificationResult ->
/// terminal message` triple. No long-term promotion pass — entries are written once
/// and never revisited or summarized.
pub struct AppendOnlyLog {
    base_dir: PathBuf,
    enabled: bool,
}

impl AppendOnlyLog {
    pub fn new(base_dir: PathBuf, enabled: bool) -> Self {
        Self { base_dir, enabled }
    }

    pub fn disabled() -> Self {
        Self { base_dir: PathBuf::new(), enabled: false }
    }

    fn today_path(&self) -> PathBuf {
        self.base_dir.join(format!("{}.md", Utc::now().format("%Y-%m-%d")))
    }

    pub fn record(&self, input: &str, classification: &ClassificationResult, outcome: &str) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        std::fs::create_dir_all(&self.base_dir)?;
        let path = self.today_path();
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        let line = format!(
            "- [{}] `{}` -> {:?} ({:.2}, {}) -> {}\n",
            Utc::now().format("%H:%M:%S"),
            input.replace('\n', " "),
            classification.input_type,
            classification.confidence,
            classification.method.name(),
            outcome.replace('\n', " ")
        );
        file.write_all(line.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classification::Method;

    #[test]
    fn disabled_log_is_a_no_op() {
        let log = AppendOnlyLog::disabled();
        let result = ClassificationResult::new(crate::classification::InputType::Prompt, 0.5, Method::RuleBased, "x");
        assert!(log.record("hi", &result, "done").is_ok());
    }

    #[test]
    fn enabled_log_writes_a_dated_file() {
        let dir = std::env::temp_dir().join(format!("agentcore-memory-test-{}", std::process::id()));
        let log = AppendOnlyLog::new(dir.clone(), true);
        let result = ClassificationResult::new(crate::classification::InputType::Command, 1.0, Method::RuleBased, "x");
        log.record("/status", &result, "ok").unwrap();
        let path = log.today_path();
        assert!(path.exists());
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("/status"));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
