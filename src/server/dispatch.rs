//! Operation handlers
//!
//! Maps one decoded request to its response, executing against the
//! backing store. Authentication gating and tenant namespacing happen
//! here, before the store is ever touched.

use crate::config::ServerConfig;
use crate::protocol::{Operation, Request, Response, SessionOptions};
use crate::store::CacheStore;

use super::session::Session;

/// Execute `request` against `store` under `session`.
///
/// Always produces a response; the dispatch loop's watchdog decides
/// whether it still gets sent.
pub(crate) fn handle(
    request: &Request,
    session: &Session,
    store: &dyn CacheStore,
    config: &ServerConfig,
) -> Response {
    // Cache operations are fenced off until Login has both
    // authenticated the session and bound its options
    if request.operation.requires_auth() && !session.is_ready() {
        tracing::debug!(
            connection = session.connection_id(),
            operation = ?request.operation,
            "unauthenticated request rejected"
        );
        return Response::failed(request.identifier, request.key.clone());
    }

    match request.operation {
        Operation::Ping => Response::success(
            request.identifier,
            Operation::Ping,
            request.key.clone(),
            Response::ACK.to_vec(),
        ),

        Operation::Login => login(request, session, config),

        Operation::Logout => {
            session.logout();
            Response::success(
                request.identifier,
                Operation::Logout,
                request.key.clone(),
                Response::ACK.to_vec(),
            )
        }

        Operation::Set => {
            let defaults = session
                .options()
                .map(|options| options.defaults)
                .unwrap_or_default();
            let policy = request
                .options
                .clone()
                .unwrap_or_default()
                .or_defaults(&defaults);

            store.set(&session.effective_key(&request.key), request.value.clone(), &policy);
            Response::success(
                request.identifier,
                Operation::Set,
                request.key.clone(),
                Response::ACK.to_vec(),
            )
        }

        Operation::Get => {
            // Absent keys answer success with an empty payload
            let value = store
                .get(&session.effective_key(&request.key))
                .unwrap_or_default();
            Response::success(request.identifier, Operation::Get, request.key.clone(), value)
        }

        Operation::Refresh => {
            // The read itself extends a sliding expiration
            let _ = store.get(&session.effective_key(&request.key));
            Response::success(
                request.identifier,
                Operation::Refresh,
                request.key.clone(),
                Response::ACK.to_vec(),
            )
        }

        Operation::Remove => {
            store.remove(&session.effective_key(&request.key));
            Response::success(
                request.identifier,
                Operation::Remove,
                request.key.clone(),
                Response::ACK.to_vec(),
            )
        }

        // Response-only opcodes arriving as requests
        Operation::Failed | Operation::Timeout => {
            Response::failed(request.identifier, request.key.clone())
        }
    }
}

fn login(request: &Request, session: &Session, config: &ServerConfig) -> Response {
    let options = match SessionOptions::decode(&request.value) {
        Ok(options) => options,
        Err(e) => {
            tracing::debug!(connection = session.connection_id(), "bad login payload: {}", e);
            return Response::failed(request.identifier, request.key.clone());
        }
    };

    if config.use_credentials {
        let accepted = config.credentials.iter().any(|credential| {
            credential.username == options.username && credential.password == options.password
        });
        if !accepted {
            tracing::debug!(
                connection = session.connection_id(),
                username = %options.username,
                "login rejected"
            );
            return Response::failed(request.identifier, request.key.clone());
        }
    }

    session.login(options);
    Response::success(
        request.identifier,
        Operation::Login,
        request.key.clone(),
        Response::ACK.to_vec(),
    )
}
