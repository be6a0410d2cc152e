pub mod campaign;
pub mod config;
pub mod feedback;
pub mod layout;
pub mod randomizer;
pub mod registry;
pub mod run;
pub mod scratch;
pub mod toolchain;
pub mod verdict;

#[cfg(test)]
mod testing;

pub use campaign::{
    CampaignError, CampaignReport, CancelToken, FuzzingCampaign, ProgressLog, StopReason,
};
pub use config::{CampaignSettings, CasehunterConfig, LanguageConfig, ToolchainSettings};
pub use feedback::{FeedbackBundle, FeedbackError, first_failing_case, parse_feedback};
pub use layout::{CaseLayout, HeaderShape, LayoutError};
pub use randomizer::{SeedError, SeedStructure, SeedTemplate};
pub use registry::{JobContext, JobRegistry, JobSnapshot, RegistryError};
pub use run::{FuzzingRun, RunError, RunOutcome, TrialSettings};
pub use toolchain::{CommandToolchain, CommandToolchainConfig, Toolchain, ToolchainError};
pub use verdict::{RunVerdict, VerdictError};
