use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{
    EventHandler,
    EventProducer,
    Handler,
    PaymentApprovedEvent,
    PaymentCanceledEvent,
    PaymentFailedEvent,
};

/// The set of producers handed to the flow API. Each emitting site iterates over the matching
/// vector, so zero subscribers is a perfectly fine configuration.
#[derive(Default, Clone)]
pub struct EventProducers {
    pub payment_approved_producer: Vec<EventProducer<PaymentApprovedEvent>>,
    pub payment_failed_producer: Vec<EventProducer<PaymentFailedEvent>>,
    pub payment_canceled_producer: Vec<EventProducer<PaymentCanceledEvent>>,
}

pub struct EventHandlers {
    pub on_payment_approved: Option<EventHandler<PaymentApprovedEvent>>,
    pub on_payment_failed: Option<EventHandler<PaymentFailedEvent>>,
    pub on_payment_canceled: Option<EventHandler<PaymentCanceledEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_payment_approved = hooks.on_payment_approved.map(|f| EventHandler::new(buffer_size, f));
        let on_payment_failed = hooks.on_payment_failed.map(|f| EventHandler::new(buffer_size, f));
        let on_payment_canceled = hooks.on_payment_canceled.map(|f| EventHandler::new(buffer_size, f));
        Self { on_payment_approved, on_payment_failed, on_payment_canceled }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_payment_approved {
            result.payment_approved_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_payment_failed {
            result.payment_failed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_payment_canceled {
            result.payment_canceled_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_payment_approved {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_payment_failed {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_payment_canceled {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_payment_approved: Option<Handler<PaymentApprovedEvent>>,
    pub on_payment_failed: Option<Handler<PaymentFailedEvent>>,
    pub on_payment_canceled: Option<Handler<PaymentCanceledEvent>>,
}

impl EventHooks {
    pub fn on_payment_approved<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(PaymentApprovedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_payment_approved = Some(Arc::new(f));
        self
    }

    pub fn on_payment_failed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(PaymentFailedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_payment_failed = Some(Arc::new(f));
        self
    }

    pub fn on_payment_canceled<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(PaymentCanceledEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_payment_canceled = Some(Arc::new(f));
        self
    }
}
