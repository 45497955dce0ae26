//! Feedback layers around the decision loop: regime progression, closed-loop process
//! control, stall detection, and population equilibrium.

pub mod controller;
pub mod population;
pub mod regime;
pub mod stall;

pub use controller::{ClosedLoopController, ControlStep, ControllerKey, ControllerPhase, ControllerState};
pub use population::PopulationController;
pub use regime::{RegimeMachine, RegimeTransition};
pub use stall::{StallDetector, StallReason, StallWindow};
