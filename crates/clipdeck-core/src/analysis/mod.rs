//! Advisory analysis of finished buffers: tempo and key
//!
//! Both detectors degrade instead of failing: tempo returns `None`, key
//! returns a low-confidence default.

pub mod bpm;
pub mod key;
pub mod music;

pub use bpm::{detect_bpm, detect_bpm_with_options, BpmRange, BpmResult};
pub use key::{chromagram, detect_key, KeyCandidate, KeyResult};
pub use music::{Mode, MusicalKey};
