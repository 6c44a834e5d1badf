use std::fmt;
use std::path::PathBuf;

const RULE_WIDTH: usize = 37;
const LABEL_WIDTH: usize = 28;
const VALUE_WIDTH: usize = 7;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedRecord {
    pub path: PathBuf,
    pub reason: String,
}

/// Counters collected over one run, printed as the final report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStatistics {
    pub files_found: u64,
    pub updated: u64,
    pub skipped: u64,
    pub new_from_provider: u64,
    pub from_exact_cache: u64,
    pub from_fuzzy_cache: u64,
    pub failed_reverse_geocode: u64,
    pub from_catalog: u64,
    pub no_catalog_data: u64,
    pub ambiguous_catalog: u64,
    pub failed: Vec<FailedRecord>,
}

impl RunStatistics {
    pub fn record_failure(&mut self, path: impl Into<PathBuf>, reason: impl Into<String>) {
        self.failed.push(FailedRecord {
            path: path.into(),
            reason: reason.into(),
        });
    }

    pub fn failures(&self) -> usize {
        self.failed.len()
    }

    fn rows(&self) -> [(&'static str, u64); 10] {
        [
            ("Sidecar files found", self.files_found),
            ("Updated", self.updated),
            ("Skipped", self.skipped),
            ("New from provider", self.new_from_provider),
            ("From exact cache", self.from_exact_cache),
            ("From fuzzy cache", self.from_fuzzy_cache),
            ("Failed reverse geocode", self.failed_reverse_geocode),
            ("From catalog", self.from_catalog),
            ("No catalog data found", self.no_catalog_data),
            ("Ambiguous catalog match", self.ambiguous_catalog),
        ]
    }
}

impl fmt::Display for RunStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", "=".repeat(RULE_WIDTH))?;
        for (label, value) in self.rows() {
            writeln!(
                f,
                "{label:<LABEL_WIDTH$}: {:>VALUE_WIDTH$}",
                group_thousands(value)
            )?;
        }
        if !self.failed.is_empty() {
            writeln!(f, "{}", "-".repeat(RULE_WIDTH))?;
            writeln!(f, "Files that failed to update:")?;
            for failure in &self.failed {
                writeln!(f, "{}: {}", failure.path.display(), failure.reason)?;
            }
        }
        Ok(())
    }
}

fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    grouped
}
