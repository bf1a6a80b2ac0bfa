//! The Endpoint Selector: picks one upstream URL from a non-empty list.

use crate::error::Error;
use url::Url;

/// Current policy: always return the first endpoint. A future health-aware
/// or round-robin policy can replace this body without touching call sites.
pub fn select_endpoint(endpoints: &[Url]) -> Result<Url, Error> {
    endpoints.first().cloned().ok_or(Error::EndpointsEmpty)
}
