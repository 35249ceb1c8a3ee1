pub mod blocked;
pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod io;
pub mod memory;
pub mod message;
pub mod process;
pub mod scheduler;
pub mod state;
pub mod translation;
pub mod vm_manager;
pub mod worker;

// Re-export commonly used items for convenience
pub use clock::{ClockRegion, SimClock};
pub use config::{Geometry, SimConfig};
pub use constants::*;
pub use error::{Result, SimError};
pub use state::{SimulationState, Stats};
pub use translation::{Resolution, VirtualAddress};
pub use vm_manager::VmManager;
