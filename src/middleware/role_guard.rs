/// Role Guard Middleware
///
/// Runs after `JwtMiddleware` and admits only callers whose role is in the
/// allowed set. A request that reaches it without an authenticated
/// identity is refused as unauthenticated.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;

use crate::accounts::Role;
use crate::auth::{require_role, AuthenticatedAccount};
use crate::error::{AppError, AuthError};

pub struct RoleGuard {
    allowed: Rc<Vec<Role>>,
}

impl RoleGuard {
    pub fn new(allowed: Vec<Role>) -> Self {
        Self {
            allowed: Rc::new(allowed),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RoleGuard
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RoleGuardService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(RoleGuardService {
            service: Rc::new(service),
            allowed: self.allowed.clone(),
        }))
    }
}

pub struct RoleGuardService<S> {
    service: Rc<S>,
    allowed: Rc<Vec<Role>>,
}

impl<S, B> Service<ServiceRequest> for RoleGuardService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let verdict = match req.extensions().get::<AuthenticatedAccount>() {
            Some(account) => require_role(&self.allowed, account.role).map_err(|e| {
                tracing::warn!(
                    account_id = account.account_id,
                    role = %account.role,
                    path = %req.path(),
                    "Role not permitted"
                );
                e
            }),
            None => Err(AuthError::MissingToken),
        };

        match verdict {
            Ok(()) => {
                let service = self.service.clone();
                Box::pin(async move { service.call(req).await })
            }
            Err(e) => {
                let error: Error = AppError::from(e).into();
                Box::pin(async move { Err(error) })
            }
        }
    }
}
