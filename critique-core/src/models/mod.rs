pub mod analysis;
pub mod interaction;
pub mod output;
pub mod recommendation;

pub use analysis::{Analysis, AnalysisStatus};
pub use interaction::{Interaction, InteractionAction};
pub use output::{KeyedDraft, ModelOutput, RECOMMENDATION_COUNT};
pub use recommendation::{Category, Level, Recommendation, RecommendationDraft};
