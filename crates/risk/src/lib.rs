//! Risk scoring for Tally
//!
//! Ranks test cases by how likely they are to fail next:
//! - churn: Change statistics from version control
//! - propagation: Risk inherited from imported components
//! - scorer: Weighted multi-factor score, ranking and selection
//!
//! Scores are in `[0, 1]`; rankings are highest first with ties broken by
//! identifier.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod churn;
pub mod propagation;
pub mod scorer;

pub use churn::{parse_numstat, ChurnProvider, ChurnStat, GitChurn, StaticChurn};
pub use propagation::{ComponentIndex, ModuleResolver};
pub use scorer::{
    prioritize, select_above, select_top, RiskBreakdown, RiskScorer, RiskWeights, ScoringContext,
};
