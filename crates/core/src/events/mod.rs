//! Event taxonomy and the publish/subscribe bus

mod bus;
mod types;

pub use bus::{EventBus, SubscriptionToken};
pub use types::{
    AudioControlAction, ComponentPhase, Event, EventCategory, EventDestination, EventPayload,
    GenerationPhase, ModelPhase, PipelinePhase, SttPhase, TtsPhase, VadPhase,
};
