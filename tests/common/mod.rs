//! Shared fixtures for pipeline integration tests
//!
//! `RunFixture` describes a fifteen-slot research run shaped like real
//! note-producer output: mixed slot spellings, citations embedded in the
//! payload for some slots and in the dedicated column for others, and the
//! same source cited from several slots under different URL spellings.

#![allow(dead_code)]

use dossier::{MemoryStore, ResearchNote, Run, RunId, RunStore, SqliteStore};
use serde_json::{json, Value};

pub const RUN_ID: &str = "run-acme-2026";
pub const SOURCE_ID: &str = "acme";
pub const TARGET_ID: &str = "globex";

/// The Reuters story cited by NB1, NB3 and NB14 under three spellings.
pub const SHARED_URLS: [&str; 3] = [
    "https://www.reuters.com/business/acme-q3-results/",
    "http://reuters.com/business/acme-q3-results",
    "https://REUTERS.com/business/acme-q3-results#summary",
];

pub struct RunFixture {
    pub run_id: RunId,
    notes: Vec<ResearchNote>,
}

impl RunFixture {
    pub fn new() -> Self {
        Self {
            run_id: RunId::from_string(RUN_ID),
            notes: (1..=15).map(note_for).collect(),
        }
    }

    /// Drop the note for slot `NB{n}`.
    pub fn without_slot(mut self, n: u32) -> Self {
        let key = format!("{}", n);
        self.notes.retain(|note| digits(&note.slot_id) != key);
        self
    }

    /// Replace the note for slot `NB{n}`.
    pub fn with_note(mut self, n: u32, note: ResearchNote) -> Self {
        self = self.without_slot(n);
        self.notes.push(note);
        self
    }

    pub fn notes(&self) -> &[ResearchNote] {
        &self.notes
    }

    pub fn run(&self) -> Run {
        Run::new(self.run_id.clone(), SOURCE_ID).with_target(TARGET_ID)
    }

    pub fn seed_memory(&self, store: &MemoryStore) {
        store.save_run(&self.run()).unwrap();
        for note in &self.notes {
            store.insert_note(&self.run_id, note.clone());
        }
    }

    pub fn seed_sqlite(&self, store: &SqliteStore) {
        store.save_run(&self.run()).unwrap();
        for note in &self.notes {
            store.insert_note(&self.run_id, note).unwrap();
        }
    }
}

impl Default for RunFixture {
    fn default() -> Self {
        Self::new()
    }
}

fn digits(raw: &str) -> String {
    raw.chars()
        .filter(char::is_ascii_digit)
        .collect::<String>()
        .trim_start_matches('0')
        .to_string()
}

fn cite(title: &str, url: &str, source: &str) -> Value {
    json!({ "title": title, "url": url, "source": source })
}

/// One note per slot, spelled the way the producer has spelled them over time.
pub fn note_for(n: u32) -> ResearchNote {
    match n {
        1 => ResearchNote::new(
            "NB1",
            json!({
                "summary": "Acme faces margin and talent pressure.",
                "pressures": [
                    "Gross margin fell 4 points year over year [1]",
                    "**Talent attrition** in field engineering [2]",
                    "Board demands cost discipline [9]"
                ],
                "citations": [
                    cite("Acme Q3 results", SHARED_URLS[0], "Reuters"),
                    cite("Engineering exodus", "https://www.theinformation.com/acme-attrition", "The Information")
                ]
            }),
        )
        .with_telemetry(1200, 8400),
        2 => ResearchNote::new(
            "nb-02",
            json!({ "summary": "Regulatory scrutiny is rising in the EU market." }),
        )
        .with_citations(json!(["https://ec.europa.eu/competition/acme-case"])),
        3 => ResearchNote::new(
            "NB-3",
            json!({
                "financial_pressures": "- Cash conversion slowed to 61% [1]\n- Debt refinancing due in 2027 [2]",
                "metrics": [
                    { "label": "Operating margin", "value": "11.2% [1]" },
                    { "label": "Customer churn", "value": "rising" }
                ]
            }),
        )
        .with_citations(json!([
            cite("Acme Q3 results", SHARED_URLS[1], "Reuters"),
            cite("Acme 10-K", "https://www.sec.gov/acme-10k", "SEC")
        ])),
        4 => ResearchNote::new(
            "NB_4",
            json!({ "priorities": ["Consolidate platforms", "Expand in APAC"] }),
        ),
        5 => ResearchNote::new(
            "NB5",
            json!({
                "challenges": "Legacy ERP slows every close cycle [1].",
                "citations": [cite("ERP drag", "https://www.gartner.com/acme-erp", "Gartner")]
            }),
        ),
        6 => ResearchNote::new(
            "nb 6",
            json!({
                "capabilities": [
                    { "name": "Unified data platform", "description": "Cuts reporting time in half [1]" },
                    "Automation of **close** workflows"
                ]
            }),
        )
        .with_citations(json!([cite("Platform brief", "https://vendor.example.com/brief", "Vendor")])),
        7 => ResearchNote::new(
            "NB7",
            json!({
                "key_metrics": ["Ticket backlog up 18% [1]", "Uptime steady"],
                "citations": ["https://status.acme.com/report"]
            }),
        ),
        8 => ResearchNote::new("NB8", json!({ "competitors": ["Initech", "Umbrella"] })),
        9 => ResearchNote::new(
            "NB-9",
            json!({ "levers": ["Partner-led expansion", "Unified data platform"] }),
        ),
        10 => ResearchNote::new("NB10", json!({ "risks": ["Key customer concentration"] })),
        11 => ResearchNote::new(
            "NB11",
            json!({
                "executives": [
                    { "name": "Dana Ruiz", "title": "CFO, owns the cost program" },
                    { "name": "Lee Park", "title": "CIO since 2025" }
                ]
            }),
        ),
        12 => ResearchNote::new("NB12", json!({ "partners": ["Globex", "Hooli"] })),
        13 => ResearchNote::new("NB13", json!({ "signals": ["Net promoter score flat"] })),
        14 => ResearchNote::new(
            "NB14",
            json!({
                "timing_signals": ["Budget cycle opens in November [1]", "New CFO 100-day plan due Q1"],
                "citations": [cite("Acme Q3 results", SHARED_URLS[2], "Reuters")]
            }),
        ),
        _ => ResearchNote::new(
            format!("NB{}", n),
            json!({ "alignment": "Strong overlap with the target's data platform offering." }),
        ),
    }
}
