use enrol_core::price::PriceGroupSnapshot;
use enrol_core::registration::Registration;
use uuid::Uuid;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PriceGroupError {
    #[error("a price group selection is required for this registration")]
    Required,

    #[error("price group {0} is not available for this registration")]
    NotAllowed(Uuid),
}

/// Resolves a requested price-group reference against the registration's
/// configured set and freezes it into a snapshot.
pub struct PriceGroupResolver;

impl PriceGroupResolver {
    pub fn resolve(
        registration: &Registration,
        requested: Option<Uuid>,
    ) -> Result<Option<PriceGroupSnapshot>, PriceGroupError> {
        match (registration.has_price_groups(), requested) {
            (false, None) => Ok(None),
            (false, Some(id)) => Err(PriceGroupError::NotAllowed(id)),
            (true, None) => Err(PriceGroupError::Required),
            (true, Some(id)) => registration
                .price_group(id)
                .map(|group| Some(group.snapshot()))
                .ok_or(PriceGroupError::NotAllowed(id)),
        }
    }
}
