pub mod record;
pub mod scenario;
pub mod synthesizer;

pub use record::{Record, Transaction, TransactionKind, TransactionStatus};
pub use scenario::{Scenario, ScenarioError, ScenarioSet, TransactionImpact, TransactionProfile};
pub use synthesizer::{Mode, ObservabilitySynthesizer, SynthError, Synthesizer};
