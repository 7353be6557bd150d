pub mod admission;
pub mod promotion;
pub mod service;

pub use admission::{AdmissionController, AdmissionError, AdmissionOutcome, GroupRequest};
pub use promotion::{PromotionConfig, PromotionError, PromotionPass, WaitlistPromotionEngine};
pub use service::{
    AdmissionResult, MockPaymentProvider, PaymentOutcome, RegistrationCapacity, ReservationView,
    ServiceError, SignupService,
};
