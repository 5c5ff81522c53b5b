//! Comparison policy and per-extraction-type profiles.

pub mod comparison;
pub mod profile;

pub use comparison::{ComparisonPolicy, StatusOrder, DEFAULT_TOLERANCE};
pub use profile::{
    builtin_profiles, load_profiles, parse_profiles,
    CompareRule, ExtractionProfile, ProfileError,
};
