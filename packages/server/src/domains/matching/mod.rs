//! Property/handyman match scoring.

pub mod scoring;

pub use scoring::{
    rank_handymen, rank_properties, MatchCandidate, MatchScore, RankedHandyman, RankedProperty,
};
