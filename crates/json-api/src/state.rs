//! State

use floodgate_app::context::AppContext;

#[derive(Clone)]
pub(crate) struct State {
    pub(crate) app: AppContext,
    /// Header the payment gateway uses to carry the callback signature.
    pub(crate) webhook_signature_header: String,
}

impl State {
    #[must_use]
    pub(crate) fn new(app: AppContext, webhook_signature_header: String) -> Self {
        Self {
            app,
            webhook_signature_header,
        }
    }
}
