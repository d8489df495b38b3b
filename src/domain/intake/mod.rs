//! Intake flow domain: stages, the structured record, turns, and the
//! conversation state machine.

mod flow;
mod record;
mod stage;
mod turn;

pub use flow::{FieldId, FlowPolicy, IntakeFlow, StepOutcome};
pub use record::{
    Allergies, Demographics, ExtractedFields, FieldValue, IntakeRecord, MedicalHistory, Medication,
    Visit,
};
pub use stage::Stage;
pub use turn::{Speaker, Turn};
