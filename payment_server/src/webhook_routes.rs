//----------------------------------------------   Gateway webhook  ----------------------------------------------

use actix_web::{web, HttpRequest, HttpResponse};
use log::*;
use payment_engine::{PaymentFlowApi, PaymentStore, WebhookError, WebhookOutcome};

use crate::{data_objects::JsonResponse, route};

route!(gateway_webhook => Post "/webhook" impl PaymentStore);
/// Receives asynchronous status notifications from the payment provider.
///
/// The HMAC middleware has already verified the body signature by the time this handler runs.
/// The provider redelivers any notification that is not answered with a 2xx, so the response
/// policy is: every outcome the server has *handled* — applied, duplicate, no-op, or a
/// permanent rejection that redelivery cannot fix — answers 200 with a `{success, message}`
/// body. Only storage failures answer 500, precisely because a redelivery may succeed.
pub async fn gateway_webhook<B: PaymentStore>(
    req: HttpRequest,
    body: web::Bytes,
    api: web::Data<PaymentFlowApi<B>>,
) -> HttpResponse {
    trace!("📨️ Received gateway webhook request: {}", req.uri());
    let result = match api.handle_webhook(body.as_ref()).await {
        Ok(WebhookOutcome::Applied(payment)) => {
            info!("📨️ Webhook applied. Payment [{}] is now {}.", payment.payment_key, payment.status);
            JsonResponse::success(format!("Payment is now {}.", payment.status))
        },
        Ok(WebhookOutcome::Duplicate) => {
            debug!("📨️ Duplicate webhook delivery ignored.");
            JsonResponse::success("Duplicate delivery ignored.")
        },
        Ok(WebhookOutcome::NoChange) => {
            debug!("📨️ Webhook matched the current payment status. Nothing to do.");
            JsonResponse::success("Payment already in the reported status.")
        },
        Err(WebhookError::StorageError(e)) => {
            // a redelivery may succeed once storage recovers, so ask for one
            error!("📨️ Could not persist webhook result. {e}");
            return HttpResponse::InternalServerError().json(JsonResponse::failure("Storage failure."));
        },
        Err(e @ WebhookError::InvalidPayload(_)) => {
            warn!("📨️ Rejecting webhook. {e}");
            JsonResponse::failure(e)
        },
        Err(e @ WebhookError::UnknownStatus(_)) => {
            warn!("📨️ Rejecting webhook. {e}");
            JsonResponse::failure(e)
        },
        Err(e @ WebhookError::PaymentNotFound(_)) => {
            warn!("📨️ Rejecting webhook. {e}");
            JsonResponse::failure(e)
        },
        Err(e @ WebhookError::IllegalTransition { .. }) => {
            warn!("📨️ Rejecting webhook. {e}");
            JsonResponse::failure(e)
        },
    };
    HttpResponse::Ok().json(result)
}
