pub mod automator;
pub mod guard;

pub use automator::{Registrar, RegistrantProfile, RegistrationDriver};
pub use guard::{EmergencyStop, EMERGENCY_STOP_THRESHOLD};
