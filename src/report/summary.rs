//! Training and validation summaries for the terminal

use comfy_table::{presets::UTF8_FULL_CONDENSED, Attribute, Cell, Color, Table};
use console::style;
use serde::Serialize;

use crate::pipeline::estimators::format_params;
use crate::pipeline::{CandidateResult, ValidationReport};

/// One tuned model as shown in the summary
#[derive(Debug, Clone, Serialize)]
pub struct CandidateRow {
    pub model_name: String,
    pub params: String,
    pub cv_score: f64,
    pub score: f64,
}

impl From<&CandidateResult> for CandidateRow {
    fn from(candidate: &CandidateResult) -> Self {
        Self {
            model_name: candidate.model_name.clone(),
            params: format_params(&candidate.best_params),
            cv_score: candidate.cv_score,
            score: candidate.score,
        }
    }
}

/// Summary of the tuned candidates against the baseline
#[derive(Debug, Default)]
pub struct TrainingSummary {
    pub baseline: f64,
    pub candidates: Vec<CandidateRow>,
}

impl TrainingSummary {
    pub fn new(baseline: f64) -> Self {
        Self {
            baseline,
            ..Default::default()
        }
    }

    pub fn add_candidate(&mut self, candidate: &CandidateResult) {
        self.candidates.push(CandidateRow::from(candidate));
    }

    /// Index of the highest test score; the first wins ties
    pub fn best_index(&self) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (i, row) in self.candidates.iter().enumerate() {
            if row.score.is_nan() {
                continue;
            }
            if best.map_or(true, |b| row.score > self.candidates[b].score) {
                best = Some(i);
            }
        }
        best
    }

    pub fn qualifying(&self) -> usize {
        self.candidates
            .iter()
            .filter(|row| row.score >= self.baseline)
            .count()
    }

    pub fn display(&self) {
        println!();
        println!(
            "    {} {}",
            style("📋").cyan(),
            style("CANDIDATE MODELS").white().bold()
        );
        println!("    {}", style("─".repeat(50)).dim());
        println!();

        let mut table = Table::new();
        table.load_preset(UTF8_FULL_CONDENSED);
        table.set_header(vec![
            Cell::new("Model").add_attribute(Attribute::Bold),
            Cell::new("Best Parameters").add_attribute(Attribute::Bold),
            Cell::new("CV R²").add_attribute(Attribute::Bold),
            Cell::new("Test R²").add_attribute(Attribute::Bold),
        ]);

        let best = self.best_index();
        for (i, row) in self.candidates.iter().enumerate() {
            let color = if row.score >= self.baseline {
                Color::Green
            } else {
                Color::Yellow
            };
            let mut name = Cell::new(&row.model_name);
            let mut score = Cell::new(format!("{:.4}", row.score)).fg(color);
            if Some(i) == best {
                name = name.add_attribute(Attribute::Bold);
                score = score.add_attribute(Attribute::Bold);
            }
            table.add_row(vec![
                name,
                Cell::new(&row.params),
                Cell::new(format!("{:.4}", row.cv_score)),
                score,
            ]);
        }

        for line in table.to_string().lines() {
            println!("    {}", line);
        }

        println!();
        println!(
            "      Baseline {}  {} of {} models qualify",
            style(format!("{:.4}", self.baseline)).yellow(),
            style(self.qualifying()).yellow().bold(),
            self.candidates.len()
        );
    }
}

/// Print the schema checks and the drifted columns of a validation report
pub fn display_validation(report: &ValidationReport) {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec![
        Cell::new("Check").add_attribute(Attribute::Bold),
        Cell::new("Train").add_attribute(Attribute::Bold),
        Cell::new("Test").add_attribute(Attribute::Bold),
    ]);

    if let Some(drift) = &report.drift {
        let share = format!("{}/{} drifted", drift.n_drifted, drift.n_features());
        table.add_row(vec![
            Cell::new("📉 Data drift"),
            Cell::new("reference"),
            Cell::new(share).fg(if drift.dataset_drift {
                Color::Red
            } else {
                Color::Green
            }),
        ]);
    }

    let rows: [(&str, fn(&crate::pipeline::SchemaCheck) -> bool); 3] = [
        ("🔢 Column count", |c| c.columns_ok()),
        ("🏷️  Categorical columns", |c| c.categorical_ok()),
        ("📏 Numerical columns", |c| c.numerical_ok()),
    ];
    for (label, check) in rows {
        table.add_row(vec![
            Cell::new(label),
            status_cell(report.train.as_ref().map(check)),
            status_cell(report.test.as_ref().map(check)),
        ]);
    }

    for line in table.to_string().lines() {
        println!("      {}", line);
    }

    if let Some(drift) = report.drift.as_ref().filter(|d| d.n_drifted > 0) {
        println!();
        println!(
            "      {} {}:",
            style("Drifted columns").yellow(),
            style(format!("({})", drift.n_drifted)).dim()
        );
        for feature in drift.features.iter().filter(|f| f.drift_detected) {
            println!(
                "        {} {} {}",
                style("•").dim(),
                feature.column,
                style(format!(
                    "({:?} {:.3} > {:.3})",
                    feature.test, feature.statistic, feature.threshold
                ))
                .dim()
            );
        }
    }
}

fn status_cell(passed: Option<bool>) -> Cell {
    match passed {
        Some(true) => Cell::new("pass").fg(Color::Green),
        Some(false) => Cell::new("FAIL").fg(Color::Red),
        None => Cell::new("skipped").fg(Color::DarkGrey),
    }
}
