use crate::payments::error::PaymentResult;
use crate::payments::types::{PushAck, PushRequest};
use async_trait::async_trait;

/// Boundary to the mobile-money provider. Implementations submit
/// money-movement requests to a live external system, so tests stub this
/// trait instead of calling through it.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Submits a payment push. A successful return means the provider
    /// accepted the request for processing; the actual payment outcome
    /// arrives later on the confirmation callback.
    async fn request_push(&self, request: PushRequest) -> PaymentResult<PushAck>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;

    struct MockGateway;

    #[async_trait]
    impl PaymentGateway for MockGateway {
        async fn request_push(&self, request: PushRequest) -> PaymentResult<PushAck> {
            request.validate()?;
            Ok(PushAck {
                merchant_request_id: "mock_merchant_1".to_string(),
                checkout_request_id: "mock_checkout_1".to_string(),
                response_description: Some("Accepted for processing".to_string()),
            })
        }
    }

    #[tokio::test]
    async fn trait_can_be_implemented_by_mock_gateway() {
        let gateway: Box<dyn PaymentGateway> = Box::new(MockGateway);
        let ack = gateway
            .request_push(PushRequest {
                phone_number: "254712345678".to_string(),
                amount: BigDecimal::from(50),
                reference: "AB12CD34".to_string(),
                description: "Voucher Purchase".to_string(),
            })
            .await
            .expect("push should be accepted");
        assert_eq!(ack.checkout_request_id, "mock_checkout_1");
    }
}
