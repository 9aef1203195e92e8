pub mod callbacks;
pub mod vouchers;

use axum::{routing::post, Router};
use std::sync::Arc;

use crate::services::voucher_lifecycle::VoucherLifecycle;

#[derive(Clone)]
pub struct ApiState {
    pub lifecycle: Arc<VoucherLifecycle>,
}

/// Routes owned by the voucher API. Merged into the application router in
/// `main` alongside the health endpoints.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/vouchers/purchase", post(vouchers::purchase_voucher))
        .route("/api/vouchers/redeem", post(vouchers::redeem_voucher))
        .route("/callbacks/mpesa", post(callbacks::handle_mpesa_callback))
        .with_state(state)
}
