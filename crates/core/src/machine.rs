//! State machine execution semantics (pure, deterministic).

/// A finite state machine driven by commands and evolved by events.
///
/// - **Decision logic**: `handle(&self, cmd)` validates the command against the
///   current state and returns the events describing the transition.
/// - **State mutation**: `apply(&mut self, event)` evolves state.
///
/// Implementations perform no IO. Side effects (persistence, timers) belong to
/// whoever executes the machine, after the events are known.
pub trait StateMachine {
    type Command: core::fmt::Debug;
    type Event: Clone + core::fmt::Debug;
    type Error: core::fmt::Debug;

    /// Decide which events to emit given the current state and a command.
    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;

    /// Evolve in-memory state from a single event.
    ///
    /// Implementations should bump `version()` once per applied event.
    fn apply(&mut self, event: &Self::Event);

    /// Number of events applied so far.
    fn version(&self) -> u64;

    /// Handle a command and apply the resulting events in order.
    fn execute(&mut self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        let events = self.handle(command)?;
        for event in &events {
            self.apply(event);
        }
        Ok(events)
    }
}
