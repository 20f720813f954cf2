mod classifier;
mod key;
mod stabilizer;

pub use classifier::{classify, matching_rule, ClassifierSettings};
pub use key::{default_descriptors, DescriptorMap, UiStateDescriptor, UiStateKey};
pub use stabilizer::{
    Clock, EventKind, FeedbackStabilizer, KeyScore, ManualClock, MonotonicClock,
    StabilizerOptions, UiStateEvent,
};
