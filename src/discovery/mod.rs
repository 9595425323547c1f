//! Area identifier discovery: collect candidates from a rendered page, then
//! probe the listing endpoint until one of them answers with events.

pub mod collector;
pub mod verifier;

pub use collector::collect_candidates;
pub use verifier::{AreaSelection, CandidateVerifier};
