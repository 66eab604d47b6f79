use std::sync::Arc;

use reflex_error::Result;
use reflex_logger::warn;
use reflex_message::{FilterOutcome, MessageFilter, MessageRef, WeakMessageHub};
use reflex_scheduler::Scheduler;

/// Message function staging the next state. The payload carries
/// [`PAYLOAD_NEXT_STATE`].
pub const FUNCTION_PREPARE: &str = "PrepareNextState";
/// Message function swapping to the staged state.
pub const FUNCTION_START: &str = "StartNextStateExecution";
/// Message function stopping the active state.
pub const FUNCTION_STOP: &str = "StopCurrentStateExecution";
/// Payload key naming the state for [`FUNCTION_PREPARE`].
pub const PAYLOAD_NEXT_STATE: &str = "NextState";

const STATUS_KEY: &str = "Status";
const REASON_KEY: &str = "Reason";
const STATUS_OK: &str = "NoError";

/// Maps lifecycle command messages onto the scheduler and materializes
/// the outcome in the reply payload: `Status = NoError` or the error kind
/// plus a `Reason`.
pub(crate) struct LifecycleFilter {
    scheduler: Arc<Scheduler>,
    hub: WeakMessageHub,
}

impl LifecycleFilter {
    pub(crate) fn new(scheduler: Arc<Scheduler>, hub: WeakMessageHub) -> Self {
        LifecycleFilter { scheduler, hub }
    }
}

impl MessageFilter for LifecycleFilter {
    fn name(&self) -> &str {
        "lifecycle"
    }

    fn consume(&mut self, message: &MessageRef) -> Result<FilterOutcome> {
        let function = message.with(|m| m.function.clone());
        let outcome = match function.as_str() {
            FUNCTION_PREPARE => {
                let state = message.with(|m| {
                    m.payload
                        .get_str(PAYLOAD_NEXT_STATE)
                        .map(str::to_owned)
                });
                match state {
                    Some(state) => self.scheduler.prepare_next_state(&state),
                    None => Err(reflex_error::Error::parameters(
                        "PrepareNextState payload names no NextState",
                    )),
                }
            }
            FUNCTION_START => self.scheduler.start_next_state_execution(),
            FUNCTION_STOP => self.scheduler.stop_current_state_execution(),
            _ => return Ok(FilterOutcome::Ignored),
        };

        let indirect = message.with(|m| m.indirect_reply);
        message.update(|m| match &outcome {
            Ok(()) => {
                m.payload.insert(STATUS_KEY, STATUS_OK);
            }
            Err(err) => {
                m.payload.insert(STATUS_KEY, err.kind().to_string());
                m.payload.insert(REASON_KEY, err.reason());
            }
        });
        message.mark_replied();
        if indirect {
            match self.hub.upgrade() {
                Some(hub) => {
                    if let Err(err) = hub.send_message(message) {
                        warn!("lifecycle reply could not be posted: {err}");
                    }
                }
                None => warn!("lifecycle reply dropped: the hub is gone"),
            }
        }
        Ok(FilterOutcome::Handled)
    }
}
