//! 📊 "So... did it work?" asks every operator, after every run.
//!
//! 🍽️ One comfy table, one row per document pass: did it exist, did we create it,
//! what never verified, and how the patch went. Logged once at the end of a run so the
//! answer is in one place instead of scattered across forty log lines.

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};

use crate::gateway::UpdateOutcome;

/// 📋 Everything that happened to one document during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DocumentOutcome {
    pub label: String,
    pub existed: bool,
    pub created: bool,
    /// 🕳️ Flattened keys that never verified before the deadline.
    pub missing: Vec<String>,
    pub update: UpdateOutcome,
}

impl DocumentOutcome {
    /// ✅ Fully provisioned: nothing missing, or the gaps got patched.
    pub(crate) fn is_complete(&self) -> bool {
        matches!(self.update, UpdateOutcome::NotNeeded | UpdateOutcome::Applied)
    }
}

/// 📊 The end-of-run summary.
#[derive(Debug, Default)]
pub(crate) struct ProvisionReport {
    outcomes: Vec<DocumentOutcome>,
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

impl ProvisionReport {
    pub(crate) fn push(&mut self, outcome: DocumentOutcome) {
        self.outcomes.push(outcome);
    }

    pub(crate) fn outcomes(&self) -> &[DocumentOutcome] {
        &self.outcomes
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.outcomes.iter().all(DocumentOutcome::is_complete)
    }

    /// 🍽️ Render the table. NOTHING preset, because the borders looked bad in log files.
    pub(crate) fn render(&self) -> String {
        let mut table = Table::new();
        table.load_preset(NOTHING);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec!["document", "existed", "created", "missing fields", "update"]);

        for outcome in &self.outcomes {
            let missing = if outcome.missing.is_empty() {
                "-".to_string()
            } else {
                outcome.missing.join(", ")
            };
            table.add_row(vec![
                Cell::new(&outcome.label),
                Cell::new(yes_no(outcome.existed)).set_alignment(CellAlignment::Center),
                Cell::new(yes_no(outcome.created)).set_alignment(CellAlignment::Center),
                Cell::new(missing),
                Cell::new(outcome.update.to_string()),
            ]);
        }

        table.to_string()
    }
}
