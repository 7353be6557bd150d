use std::sync::Arc;

use enrol_admission::SignupService;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SignupService>,
}
