//! Webhook signature middleware.
//!
//! The payment provider signs every webhook delivery: HMAC-SHA256 over the raw request body,
//! base64-encoded, in the `X-Gateway-Signature` header. This middleware verifies the signature
//! before the handler runs, and replays the consumed body into the request so the handler can
//! still read it.
//!
//! Wrap the webhook scope with this middleware; everything inside it can then trust the body.

use std::{
    future::{ready, Ready},
    rc::Rc,
};

use actix_http::h1;
use actix_web::{
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    error::{ErrorBadRequest, ErrorForbidden},
    web,
    Error,
};
use futures::future::LocalBoxFuture;
use log::{trace, warn};
use pay_common::Secret;

use crate::helpers::calculate_hmac;

pub struct HmacMiddlewareFactory {
    signature_header: String,
    key: Secret<String>,
    // If false, the middleware allows every call without checking. Test environments only.
    enabled: bool,
}

impl HmacMiddlewareFactory {
    pub fn new(signature_header: &str, key: Secret<String>, enabled: bool) -> Self {
        HmacMiddlewareFactory { signature_header: signature_header.into(), key, enabled }
    }
}

impl<S, B> Transform<S, ServiceRequest> for HmacMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = HmacMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(HmacMiddlewareService {
            signature_header: self.signature_header.clone(),
            key: self.key.clone(),
            enabled: self.enabled,
            service: Rc::new(service),
        }))
    }
}

pub struct HmacMiddlewareService<S> {
    signature_header: String,
    key: Secret<String>,
    enabled: bool,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for HmacMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let secret = self.key.reveal().clone();
        let signature_header = self.signature_header.clone();
        let enabled = self.enabled;
        Box::pin(async move {
            trace!("🔐️ Checking webhook signature");
            if !enabled {
                trace!("🔐️ Signature checks are disabled. Allowing request.");
                return service.call(req).await;
            }
            let body = req.extract::<web::Bytes>().await.map_err(|e| {
                warn!("🔐️ Failed to read the webhook body: {e:?}");
                ErrorBadRequest("Failed to read the request body.")
            })?;
            let expected = calculate_hmac(&secret, body.as_ref());
            let provided = req.headers().get(&signature_header).ok_or_else(|| {
                warn!("🔐️ No signature found on webhook request. Denying access.");
                ErrorForbidden("No signature found.")
            })?;
            if provided == expected.as_str() {
                trace!("🔐️ Webhook signature ✅️");
                req.set_payload(bytes_to_payload(body));
                service.call(req).await
            } else {
                warn!("🔐️ Invalid signature on webhook request. Denying access.");
                Err(ErrorForbidden("Invalid signature."))
            }
        })
    }
}

fn bytes_to_payload(buf: web::Bytes) -> Payload {
    let (_, mut pl) = h1::Payload::create(true);
    pl.unread_data(buf);
    Payload::from(pl)
}
