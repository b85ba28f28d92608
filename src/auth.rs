use actix_web::HttpRequest;
use uuid::Uuid;

use crate::config::Configuration;

/// Pull the authenticated user id out of the identity header. The proxy in
/// front of vidstash is responsible for validating credentials and setting
/// the header.
pub(crate) fn owner_id(req: &HttpRequest, config: &Configuration) -> Option<Uuid> {
    let value = req.headers().get(config.server.identity_header.as_str())?;
    let value = value.to_str().ok()?;

    value.parse().ok()
}
