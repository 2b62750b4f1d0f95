//! Signal-processing nodes.

pub mod dtw;
pub mod filter_bank;
pub mod iir;
pub mod transforms;
pub mod vad;

pub use dtw::DTWNode;
pub use filter_bank::FilterBankNode;
pub use iir::IIRFilterNode;
pub use transforms::{DCTNode, FFTNode, HammingWindowNode};
pub use vad::{VoiceActivityDetectorNode, VoiceActivityDetectorParameters};
