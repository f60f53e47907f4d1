//! The process-wide question catalog.
//!
//! Built once at startup from the bank file, validated, and frozen
//! behind an `Arc` in [`crate::state::AppState`]. The retake set is
//! computed here exactly once; no request path ever re-runs selection,
//! so a mid-run reload can never change a live run's item set.

use serde::Deserialize;

use lumen_core::question_bank::{Question, QuestionBank, QuestionBankError};
use lumen_core::retake::{build_retake_set, SelectionError};
use lumen_core::run::AssessmentMode;

/// Bank file bundled into the binary; `QUESTION_BANK_PATH` overrides it.
const EMBEDDED_BANK_JSON: &str = include_str!("../data/question_bank.json");

/// On-disk shape of the bank file.
#[derive(Debug, Deserialize)]
struct BankFile {
    #[allow(dead_code)]
    version: u32,
    items: Vec<Question>,
}

/// Why the catalog could not be built. Always fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("cannot read question bank file: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse question bank file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Bank(#[from] QuestionBankError),

    #[error(transparent)]
    Selection(#[from] SelectionError),
}

/// The validated bank plus both precomputed item-id sets.
#[derive(Debug, Clone)]
pub struct QuestionCatalog {
    bank: QuestionBank,
    full_item_ids: Vec<String>,
    retake_item_ids: Vec<String>,
}

impl QuestionCatalog {
    /// Build the catalog from raw bank JSON.
    pub fn from_json_str(raw: &str) -> Result<Self, CatalogError> {
        let file: BankFile = serde_json::from_str(raw)?;
        let bank = QuestionBank::new(file.items)?;
        let full_item_ids = bank.item_ids();
        let retake_item_ids = build_retake_set(&bank)?;
        Ok(Self {
            bank,
            full_item_ids,
            retake_item_ids,
        })
    }

    /// Load the catalog from an override path, or the embedded bank.
    pub fn load(path: Option<&str>) -> Result<Self, CatalogError> {
        match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                Self::from_json_str(&raw)
            }
            None => Self::from_json_str(EMBEDDED_BANK_JSON),
        }
    }

    pub fn bank(&self) -> &QuestionBank {
        &self.bank
    }

    /// Number of items in the full bank.
    pub fn item_count(&self) -> usize {
        self.full_item_ids.len()
    }

    /// The frozen ordered id list a run of the given mode is assigned.
    pub fn item_ids_for_mode(&self, mode: AssessmentMode) -> &[String] {
        match mode {
            AssessmentMode::Full143 => &self.full_item_ids,
            AssessmentMode::Monthly43 => &self.retake_item_ids,
        }
    }
}
