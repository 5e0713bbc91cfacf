//! Section composition: drafting, voice enforcement, markup validation

mod drafting;
mod markup;
mod section;
mod voice;

pub use drafting::{Draft, SectionComposer, SectionDrafter, EMITTED_CLASSES, EMITTED_TAGS};
pub use markup::{classes_in, tags_in, MarkupOverrides, MarkupPolicy, MarkupViolation};
pub use section::{Section, SectionCode};
pub use voice::{Voice, VoiceRule};
