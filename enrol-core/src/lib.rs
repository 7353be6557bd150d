pub mod clock;
pub mod notify;
pub mod payment;
pub mod price;
pub mod registration;
pub mod repository;
pub mod reservation;
pub mod signup;

pub use clock::{Clock, FixedClock, SystemClock};
pub use registration::Registration;
pub use reservation::SeatReservation;
pub use signup::{AttendeeStatus, ContactPerson, Signup, SignupGroup, SignupRequest};
