//! Core data model: runs, research notes, slots, citations

mod citation;
mod note;
mod run;
mod slot;

#[cfg(test)]
mod tests;

pub use citation::{domain_of, identity_key, Citation};
pub use note::{NoteStatus, ResearchNote};
pub use run::{Run, RunId, RunStatus};
pub use slot::{InvalidSlotId, SlotId};
