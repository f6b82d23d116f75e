pub mod facilitator;
pub mod state_machine;

pub use facilitator::{Facilitator, FacilitatorError, LocalFacilitator, RemoteFacilitator};
