pub mod errors;
pub mod models;
pub mod utils;

pub use errors::ForgeError;
pub use models::{
    CardContent,
    CardProposal,
    DuplicateScope,
    FlaggedCard,
    OutcomeRecord,
    OutcomeStatus,
    ReviewSelection,
    SelectedCandidate,
};
