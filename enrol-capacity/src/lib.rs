pub mod accountant;
pub mod pricing;
pub mod reservation;

pub use accountant::{CapacityAccountant, CapacityError, CapacityView};
pub use pricing::{PriceGroupError, PriceGroupResolver};
pub use reservation::{ReservationConfig, ReservationError, SeatReservationManager};
