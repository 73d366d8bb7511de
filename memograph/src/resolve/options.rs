//! Call-site resolution constraints.

use crate::context::Context;
use crate::request::ErasedRequest;
use crate::resolve::ResolveError;

/// Pins axes of the resolution cascade at the call site.
///
/// Unpinned axes dispatch on context state. Contradictory pins, and
/// forcing a proxy request local, are input errors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveOptions {
    pub force_remote: bool,
    pub force_local: bool,
    pub force_sync: bool,
    pub force_async: bool,
}

impl ResolveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn local(mut self) -> Self {
        self.force_local = true;
        self
    }

    pub fn remote(mut self) -> Self {
        self.force_remote = true;
        self
    }

    pub fn sync(mut self) -> Self {
        self.force_sync = true;
        self
    }

    pub fn asynchronous(mut self) -> Self {
        self.force_async = true;
        self
    }

    pub(crate) fn validate(
        &self,
        _ctx: &Context,
        request: &ErasedRequest,
    ) -> Result<(), ResolveError> {
        if self.force_remote && self.force_local {
            return Err(ResolveError::InvalidConstraints(
                "cannot force both remote and local".to_string(),
            ));
        }
        if self.force_sync && self.force_async {
            return Err(ResolveError::InvalidConstraints(
                "cannot force both sync and async".to_string(),
            ));
        }
        if self.force_local && request.is_proxy() {
            return Err(ResolveError::InvalidConstraints(
                "a proxy request cannot be resolved locally".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::context::Resources;
    use crate::request::{ProxyRequest, RequestUuid};
    use crate::value::ValueKind;

    fn ctx() -> Context {
        Context::builder(Resources::new(Config::default()).unwrap()).build()
    }

    #[test]
    fn test_contradictory_pins_rejected() {
        let req = ErasedRequest::literal(1);
        let err = ResolveOptions::new()
            .local()
            .remote()
            .validate(&ctx(), &req)
            .unwrap_err();
        assert!(matches!(err, ResolveError::InvalidConstraints(_)));

        let err = ResolveOptions::new()
            .sync()
            .asynchronous()
            .validate(&ctx(), &req)
            .unwrap_err();
        assert!(matches!(err, ResolveError::InvalidConstraints(_)));
    }

    #[test]
    fn test_force_local_proxy_rejected() {
        let proxy = ProxyRequest::new(
            RequestUuid::new("remote/x@v1").unwrap(),
            ValueKind::Nil,
            vec![],
        )
        .unwrap();
        let err = ResolveOptions::new()
            .local()
            .validate(&ctx(), &proxy)
            .unwrap_err();
        assert!(matches!(err, ResolveError::InvalidConstraints(_)));
    }

    #[test]
    fn test_default_options_validate() {
        let req = ErasedRequest::literal(1);
        assert!(ResolveOptions::default().validate(&ctx(), &req).is_ok());
    }
}
