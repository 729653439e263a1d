//! Error response construction.

use crate::classify::{Classification, ErrorClassifier};
use crate::envelope::{EnvelopeRenderer, ErrorEnvelope, FlatJsonRenderer};
use crate::types::Response;
use http::header::CONTENT_TYPE;
use http::HeaderValue;
use http_body_util::Full;
use std::sync::Arc;
use std::time::Duration;
use waypoint_core::{CorrelationContext, RequestFailure};

/// Classifies failures and renders them as error responses.
///
/// # Example
///
/// ```
/// use waypoint_core::RequestFailure;
/// use waypoint_middleware::ErrorResponder;
///
/// let responder = ErrorResponder::default();
/// let (response, classification) =
///     responder.respond(None, "/accounts/42", &RequestFailure::validation("invalid amount"), None);
///
/// assert_eq!(response.status(), 400);
/// assert_eq!(classification.message, "invalid amount");
/// assert_eq!(response.headers()["content-type"], "application/json");
/// ```
#[derive(Debug, Clone)]
pub struct ErrorResponder {
    classifier: ErrorClassifier,
    renderer: Arc<dyn EnvelopeRenderer>,
}

impl Default for ErrorResponder {
    fn default() -> Self {
        Self::new(ErrorClassifier::default())
    }
}

impl ErrorResponder {
    /// Creates a responder rendering flat JSON.
    #[must_use]
    pub fn new(classifier: ErrorClassifier) -> Self {
        Self {
            classifier,
            renderer: Arc::new(FlatJsonRenderer),
        }
    }

    /// Replaces the envelope renderer.
    #[must_use]
    pub fn with_renderer(mut self, renderer: Arc<dyn EnvelopeRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Returns the classifier.
    #[must_use]
    pub fn classifier(&self) -> &ErrorClassifier {
        &self.classifier
    }

    /// Classifies `failure` and builds its error response.
    pub fn respond(
        &self,
        context: Option<&CorrelationContext>,
        path: &str,
        failure: &RequestFailure,
        processing_time: Option<Duration>,
    ) -> (Response, Classification) {
        let classification = self.classifier.classify(failure);
        let envelope = ErrorEnvelope::build(context, path, &classification, processing_time);
        (self.render(&envelope, &classification), classification)
    }

    /// Renders an already built envelope.
    pub fn render(&self, envelope: &ErrorEnvelope, classification: &Classification) -> Response {
        let mut response = Response::new(Full::new(self.renderer.render(envelope)));
        *response.status_mut() = classification.status;
        response.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static(self.renderer.content_type()),
        );
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::StatusCode;
    use http_body_util::BodyExt;
    use waypoint_core::RequestId;

    #[derive(Debug)]
    struct PlainRenderer;

    impl EnvelopeRenderer for PlainRenderer {
        fn render(&self, envelope: &ErrorEnvelope) -> Bytes {
            Bytes::from(format!("{} {}", envelope.status(), envelope.message()))
        }

        fn content_type(&self) -> &'static str {
            "text/plain"
        }
    }

    async fn body_text(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_respond_writes_envelope_once() {
        let ctx = CorrelationContext::new(RequestId::from("abc-123"), "t", "s");
        let (response, classification) = ErrorResponder::default().respond(
            Some(&ctx),
            "/accounts/42",
            &RequestFailure::validation("invalid amount"),
            Some(Duration::from_millis(5)),
        );

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(classification.status, StatusCode::BAD_REQUEST);

        let body = body_text(response).await;
        assert!(body.contains("\"requestId\":\"abc-123\""));
        assert!(body.contains("\"message\":\"invalid amount\""));
        assert!(body.contains("\"path\":\"/accounts/42\""));
        assert!(body.contains("\"processingTimeMs\":5"));
    }

    #[tokio::test]
    async fn test_custom_renderer() {
        let responder = ErrorResponder::default().with_renderer(Arc::new(PlainRenderer));
        let (response, _) =
            responder.respond(None, "/", &RequestFailure::not_found("no account"), None);

        assert_eq!(response.headers()[CONTENT_TYPE], "text/plain");
        assert_eq!(body_text(response).await, "404 no account");
    }

    #[test]
    fn test_classifier_accessor() {
        let responder = ErrorResponder::new(ErrorClassifier::new().fallback_status(503));
        let c = responder
            .classifier()
            .classify(&RequestFailure::application("Busy", "try later"));
        assert_eq!(c.status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
