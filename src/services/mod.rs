pub mod callback_sync;
pub mod orchestrator;
pub mod parameter_resolver;
pub mod platform_selector;
pub mod test_plan_registry;

pub use callback_sync::{CallbackSynchronizer, SyncKey, WaitHandle};
pub use orchestrator::{
    Collaborators, FinalizeMode, InstantiationOutcome, Orchestrator, OrchestratorSettings,
    EVENT_ACTOR,
};
pub use parameter_resolver::DescriptorStamp;
pub use platform_selector::PlatformSelector;
pub use test_plan_registry::TestPlanRegistry;
