use crate::selfdrive::interfaces::{ActuationCommand, ActuationSink};
use tracing::trace;

/// Forwards the planner's per-tick target to the simulator unchanged.
#[derive(Debug, Clone)]
pub struct ControlOutputAdapter {
    vehicle_id: String,
    last: Option<ActuationCommand>,
}

impl ControlOutputAdapter {
    pub fn new(vehicle_id: &str) -> Self {
        ControlOutputAdapter {
            vehicle_id: vehicle_id.to_string(),
            last: None,
        }
    }

    pub fn publish<S: ActuationSink + ?Sized>(&mut self, sink: &mut S, command: ActuationCommand) {
        trace!(vehicle = %self.vehicle_id, ?command, "actuation");
        sink.move_to(&self.vehicle_id, command);
        self.last = Some(command);
    }

    /// Most recent command sent.
    pub fn last(&self) -> Option<&ActuationCommand> {
        self.last.as_ref()
    }
}
