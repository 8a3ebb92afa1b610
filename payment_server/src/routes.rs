//! Request handler definitions
//!
//! Define each route and its handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module
//! neat and tidy 🙏
//!
//! Handlers are generic over the storage backend, which actix cannot route to directly, so the
//! `route!` macro generates a small `HttpServiceFactory` wrapper per handler that pins the
//! backend type at registration time.

use actix_web::{get, web, HttpResponse, Responder};
use log::*;
use payment_engine::{db_types::OrderId, ConfirmRequest, PaymentFlowApi, PaymentStore};

use crate::{
    auth::JwtClaims,
    data_objects::{CancelParams, ConfirmParams},
    errors::ServerError,
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal) => {
        paste::paste! { pub struct [<$name:camel Route>];}
        paste::paste! {
            impl [<$name:camel Route>] {
                #[allow(clippy::new_without_default)]
                pub fn new() -> Self { Self }
            }
        }
        paste::paste! {
            impl actix_web::dev::HttpServiceFactory for [<$name:camel Route>] {
                fn register(self, config: &mut actix_web::dev::AppService) {
                    let res = actix_web::Resource::new($path)
                        .name(stringify!($name))
                        .guard(actix_web::guard::$method())
                        .to($name);
                    actix_web::dev::HttpServiceFactory::register(res, config);
                }
            }
        }
    };

    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Confirm  ----------------------------------------------------
route!(confirm_payment => Post "/payments/confirm" impl PaymentStore);
/// Route handler for the payment confirmation endpoint.
///
/// The customer-facing client calls this after the provider's checkout flow has produced a
/// payment key. The requesting user is taken from the access token; the handler validates the
/// order against the collaborating services, captures the payment with the provider, and
/// answers with the recorded payment. Repeating the call with the same payment key and order
/// returns the same payment without touching the provider again.
pub async fn confirm_payment<B: PaymentStore>(
    claims: JwtClaims,
    body: web::Json<ConfirmParams>,
    api: web::Data<PaymentFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let params = body.into_inner();
    debug!("💻️ POST confirm payment [{}] for order {}", params.payment_key, params.order_id);
    let request = ConfirmRequest {
        payment_key: params.payment_key,
        order_id: params.order_id,
        amount: params.amount,
        user_id: claims.user_id().to_string(),
    };
    let payment = api.confirm(request).await?;
    Ok(HttpResponse::Ok().json(payment))
}

//----------------------------------------------   Cancel  ----------------------------------------------------
route!(cancel_payment => Patch "/payments/cancel/{order_id}" impl PaymentStore);
/// Cancel the caller's approved payment for the given order. Answers with the ledger entry that
/// recorded the cancellation.
pub async fn cancel_payment<B: PaymentStore>(
    claims: JwtClaims,
    path: web::Path<String>,
    body: web::Json<CancelParams>,
    api: web::Data<PaymentFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId(path.into_inner());
    let params = body.into_inner();
    debug!("💻️ PATCH cancel payment for order {order_id}");
    let entry = api.cancel(&order_id, claims.user_id(), &params.cancel_reason).await?;
    Ok(HttpResponse::Ok().json(entry))
}

//----------------------------------------------   Lookups  ----------------------------------------------------
route!(payment_for_order => Get "/payments/order/{order_id}" impl PaymentStore);
pub async fn payment_for_order<B: PaymentStore>(
    claims: JwtClaims,
    path: web::Path<String>,
    api: web::Data<PaymentFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId(path.into_inner());
    trace!("💻️ GET payment for order {order_id}");
    let payment = api
        .payment_for_order(&order_id, claims.user_id())
        .await?
        .ok_or_else(|| ServerError::NoRecordFound(format!("No payment for order {order_id}")))?;
    Ok(HttpResponse::Ok().json(payment))
}

route!(my_payments => Get "/payments/me" impl PaymentStore);
pub async fn my_payments<B: PaymentStore>(
    claims: JwtClaims,
    api: web::Data<PaymentFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    trace!("💻️ GET payments for {}", claims.user_id());
    let payments = api.payments_for_user(claims.user_id()).await?;
    Ok(HttpResponse::Ok().json(payments))
}
