//! Text post-processing between recognition and the sink.

pub mod emergency;
pub mod punctuate;

pub use emergency::EmergencyDetector;
pub use punctuate::{ModelState, PunctuationModel, Punctuator, RulePunctuator, SmartPunctuator};
