//! Rule-based assistant helpers: regex intents, canned replies, face
//! descriptor matching and attendance anomaly checks.

pub mod anomaly;
pub mod face;
pub mod history;
pub mod intent;
pub mod responder;
