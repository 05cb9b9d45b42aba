//! Alumni referral stages: mining, matching, paths, messages

mod matching;
mod messages;
mod mining;
mod paths;

pub use matching::{rank_matches, score_alumni, MatchDomainsStage};
pub use messages::{recommend_approach, template_message, GenerateMessagesStage};
pub use mining::{matches_criteria, MineAlumniStage};
pub use paths::{confidence, evaluate, path_score, recommend, RecommendPathsStage};
