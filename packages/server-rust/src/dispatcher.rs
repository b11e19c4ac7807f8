//! Top-level message handler: decode, process, encode, send.

use std::sync::Arc;

use async_trait::async_trait;
use ledgerbridge_core::BusResponse;
use tracing::{debug, error, warn};

use crate::bridge::ShutdownController;
use crate::bus::{BusEndpoint, MessageHandler, PendingAck, TransportError};
use crate::codec::WireCodec;
use crate::processing::MessageProcessor;

pub struct Dispatcher {
    codec: Arc<dyn WireCodec>,
    processor: MessageProcessor,
    endpoint: Arc<dyn BusEndpoint>,
    shutdown: Arc<ShutdownController>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        codec: Arc<dyn WireCodec>,
        processor: MessageProcessor,
        endpoint: Arc<dyn BusEndpoint>,
        shutdown: Arc<ShutdownController>,
    ) -> Self {
        Self {
            codec,
            processor,
            endpoint,
            shutdown,
        }
    }

    async fn handle(&self, body: &str, ack: PendingAck) -> Vec<BusResponse> {
        match self.codec.decode(body) {
            Ok(request) => self.processor.process(request, ack).await,
            Err(e) => {
                metrics::counter!("ledgerbridge_format_errors_total").increment(1);
                warn!(
                    request_id = e.request_id().unwrap_or("-"),
                    error = %e,
                    "inbound message could not be decoded"
                );
                ack.complete().await;
                vec![e.into_response()]
            }
        }
    }

    async fn reply(&self, response: &BusResponse) {
        let variant = response.variant_name();
        let body = match self.codec.encode(response) {
            Ok(body) => body,
            Err(e) => {
                error!(variant, error = %e, "failed to encode reply");
                return;
            }
        };
        metrics::counter!("ledgerbridge_responses_total", "variant" => variant).increment(1);
        match self.endpoint.send(body).await {
            Ok(()) => debug!(
                request_id = response.request_id().unwrap_or("-"),
                variant,
                "reply sent"
            ),
            Err(e) => warn!(
                request_id = response.request_id().unwrap_or("-"),
                variant,
                error = %e,
                "reply was not sent"
            ),
        }
    }
}

#[async_trait]
impl MessageHandler for Dispatcher {
    async fn on_message(&self, body: String, ack: PendingAck) {
        if !self.shutdown.accepts_work() {
            ack.abandon();
            return;
        }
        let _guard = self.shutdown.in_flight_guard();

        for response in self.handle(&body, ack).await {
            self.reply(&response).await;
        }
    }

    fn notify_exception(&self, error: &TransportError) {
        warn!(error = %error, "receive failed");
    }
}
