//! Finds premade teams ("rosters") in multiplayer match records.
//!
//! Players who keep queueing together form a weighted party graph. Communities
//! in that graph are pruned down to players who also share enough games on the
//! same team, and every surviving roster gets win/loss, attendance and lineup
//! statistics.

pub mod analysis_context;
pub mod community;
pub mod data_loader;
pub mod error;
pub mod filter;
pub mod pairs;
pub mod pipeline;
pub mod report;
pub mod roster_graph;
pub mod roster_stats;
mod util;

pub use analysis_context::{AnalysisContext, FilterMode};
pub use community::{Louvain, Partition, Partitioner};
pub use data_loader::{load_relations, prepare_relations, Dataset, ParticipationRecord, UserId};
pub use error::{Error, Result};
pub use pipeline::{analyze, AnalysisOutcome, RunSummary};
pub use report::{output_report, write_json, CommunityRecord, RosterReport};
pub use roster_graph::RosterGraph;
