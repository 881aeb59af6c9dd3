use super::error::{
    EncodeResponseSnafu, MalformedRequestSnafu, NotAcceptableSnafu, PayloadTooLargeSnafu,
    ReadBodySnafu, ReviewError, UnsupportedMediaTypeSnafu,
};
use crate::conversion::ConversionEngine;
use crate::metrics::{RequestCounter, WebhookMetrics, OPERATION_CONVERTING};
use crate::negotiation::CodecTable;
use crate::review::{convert_review, ConversionReviewRequest};

use actix_web::{
    error::PayloadError,
    http::header::{ACCEPT, CONTENT_LENGTH, CONTENT_TYPE},
    web::{self, Bytes, BytesMut, Data},
    HttpRequest, HttpResponse,
};
use futures::{Stream, StreamExt};
use models::constants::WEBHOOK_DEFAULT_MAX_REQUEST_BYTES;
use snafu::{ensure, ResultExt};
use tracing::{event, Level, Span};

use std::sync::Arc;
use std::time::Instant;

/// Everything a conversion request needs, shared by every worker of the primary listener.
#[derive(Debug, Clone)]
pub struct ConversionHandler {
    codecs: Arc<CodecTable>,
    engine: Arc<ConversionEngine>,
    metrics: WebhookMetrics,
    body_limit: usize,
}

impl ConversionHandler {
    pub fn new(
        codecs: Arc<CodecTable>,
        engine: Arc<ConversionEngine>,
        metrics: WebhookMetrics,
    ) -> Self {
        ConversionHandler {
            codecs,
            engine,
            metrics,
            body_limit: WEBHOOK_DEFAULT_MAX_REQUEST_BYTES,
        }
    }

    /// Caps the size of a request body. Larger requests are refused before they are buffered.
    pub fn with_body_limit(mut self, body_limit: usize) -> Self {
        self.body_limit = body_limit;
        self
    }

    /// Answers one conversion request and records its outcome in the request metrics.
    pub async fn respond<S>(
        &self,
        req: &HttpRequest,
        payload: S,
    ) -> Result<HttpResponse, ReviewError>
    where
        S: Stream<Item = Result<Bytes, PayloadError>> + Unpin,
    {
        let started = Instant::now();
        self.metrics.increment(RequestCounter::Total, OPERATION_CONVERTING);

        let result = self.handle(req, payload).await;

        match &result {
            Ok(_) => self
                .metrics
                .increment(RequestCounter::Successful, OPERATION_CONVERTING),
            Err(err) => {
                event!(Level::WARN, error = %err, "Rejected conversion request.");
                let counter = if err.is_internal() {
                    RequestCounter::InternalError
                } else {
                    RequestCounter::Invalid
                };
                self.metrics.increment(counter, OPERATION_CONVERTING);
            }
        }
        self.metrics.observe(OPERATION_CONVERTING, started.elapsed());

        result
    }

    async fn read_body<S>(&self, req: &HttpRequest, mut payload: S) -> Result<Bytes, ReviewError>
    where
        S: Stream<Item = Result<Bytes, PayloadError>> + Unpin,
    {
        let limit = self.body_limit;
        let declared_length = req
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<usize>().ok());
        if let Some(length) = declared_length {
            ensure!(length <= limit, PayloadTooLargeSnafu { limit });
        }

        // Content-Length may be absent or wrong, so the limit is enforced on the stream as well.
        let mut body = BytesMut::with_capacity(declared_length.unwrap_or_default());
        while let Some(chunk) = payload.next().await {
            let chunk = chunk.context(ReadBodySnafu)?;
            ensure!(body.len() + chunk.len() <= limit, PayloadTooLargeSnafu { limit });
            body.extend_from_slice(&chunk);
        }
        Ok(body.freeze())
    }

    async fn handle<S>(&self, req: &HttpRequest, payload: S) -> Result<HttpResponse, ReviewError>
    where
        S: Stream<Item = Result<Bytes, PayloadError>> + Unpin,
    {
        // A Content-Type that isn't valid UTF-8 can't name a supported media type.
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        let decoder = self
            .codecs
            .select_decoder(content_type)
            .context(UnsupportedMediaTypeSnafu)?;

        let body = self.read_body(req, payload).await?;
        let review: ConversionReviewRequest =
            decoder.decode(&body).context(MalformedRequestSnafu)?;
        Span::current().record("conversion_uid", review.request.uid.as_str());
        event!(
            Level::DEBUG,
            desired_version = %review.request.desired_api_version,
            objects = review.request.objects.len(),
            "Received ConversionReview."
        );

        let response = convert_review(&review, &self.engine);

        let accept = req
            .headers()
            .get(ACCEPT)
            .and_then(|value| value.to_str().ok());
        let encoder = self
            .codecs
            .select_encoder(accept)
            .context(NotAcceptableSnafu)?;
        let body = encoder.encode(&response).context(EncodeResponseSnafu)?;

        Ok(HttpResponse::Ok()
            .content_type(encoder.media_type().to_string())
            .body(body))
    }
}

/// HTTP endpoint which converts the custom resources of a ConversionReview to the desired version.
pub async fn convert_custom_resources(
    handler: Data<ConversionHandler>,
    req: HttpRequest,
    payload: web::Payload,
) -> Result<HttpResponse, ReviewError> {
    handler.respond(&req, payload).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::primary_routes;
    use crate::metrics::MetricsExporter;
    use crate::review::{ConversionReviewResponse, Status};

    use actix_web::{body, http::StatusCode, test, App, ResponseError};
    use models::constants::{CLUSTER_V1ALPHA4, STABLE_V1, STABLE_V2};
    use serde_json::{json, Value};

    fn test_handler() -> (ConversionHandler, MetricsExporter) {
        let exporter = MetricsExporter::new().unwrap();
        let handler = ConversionHandler::new(
            Arc::new(CodecTable::default()),
            Arc::new(ConversionEngine::default_rules().unwrap()),
            exporter.webhook_metrics(),
        );
        (handler, exporter)
    }

    fn review(uid: &str, desired_api_version: &str, objects: Vec<Value>) -> Value {
        json!({
            "apiVersion": "apiextensions.k8s.io/v1",
            "kind": "ConversionReview",
            "request": {
                "uid": uid,
                "desiredAPIVersion": desired_api_version,
                "objects": objects,
            },
        })
    }

    fn convert_request(body: &Value) -> test::TestRequest {
        test::TestRequest::post()
            .uri("/crdconvert")
            .insert_header((CONTENT_TYPE, "application/json"))
            .set_payload(serde_json::to_vec(body).unwrap())
    }

    fn metric(exporter: &MetricsExporter, name: &str) -> String {
        let text = MetricsExporter::encode(&exporter.registry()).unwrap();
        let prefix = format!("{}{{operation=\"converting\"}} ", name);
        text.lines()
            .find_map(|line| line.strip_prefix(&prefix))
            .unwrap_or("0")
            .to_string()
    }

    #[actix_web::test]
    async fn test_convert_v1_to_v2() {
        let (handler, exporter) = test_handler();
        let app = test::init_service(
            App::new()
                .app_data(Data::new(handler))
                .configure(primary_routes),
        )
        .await;
        let body = review(
            "uid-1",
            STABLE_V2,
            vec![json!({
                "apiVersion": STABLE_V1,
                "kind": "Endpoint",
                "metadata": {"name": "web", "namespace": "default"},
                "hostPort": "10.0.0.1:443",
            })],
        );

        let resp = test::call_service(&app, convert_request(&body).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );

        let review: ConversionReviewResponse = test::read_body_json(resp).await;
        assert_eq!(review.response.uid, "uid-1");
        assert_eq!(review.response.result.status, Status::Success);
        assert_eq!(
            review.response.converted_objects,
            Some(vec![json!({
                "apiVersion": STABLE_V2,
                "kind": "Endpoint",
                "metadata": {"name": "web", "namespace": "default"},
                "host": "10.0.0.1",
                "port": "443",
            })])
        );

        assert_eq!(metric(&exporter, "total_requests"), "1");
        assert_eq!(metric(&exporter, "successful_requests"), "1");
        assert_eq!(metric(&exporter, "request_duration_seconds_count"), "1");
    }

    #[actix_web::test]
    async fn test_convert_v2_to_v1() {
        let (handler, _exporter) = test_handler();
        let app = test::init_service(
            App::new()
                .app_data(Data::new(handler))
                .configure(primary_routes),
        )
        .await;
        let body = review(
            "uid-2",
            STABLE_V1,
            vec![json!({
                "apiVersion": STABLE_V2,
                "kind": "Endpoint",
                "metadata": {"name": "web"},
                "host": "10.0.0.1",
                "port": "443",
            })],
        );

        let resp = test::call_service(&app, convert_request(&body).to_request()).await;
        let review: ConversionReviewResponse = test::read_body_json(resp).await;
        let converted = review.response.converted_objects.unwrap();
        assert_eq!(converted[0]["hostPort"], "10.0.0.1:443");
        assert_eq!(converted[0].get("host"), None);
        assert_eq!(converted[0].get("port"), None);
    }

    #[actix_web::test]
    async fn test_missing_host_port_passes_through() {
        let (handler, _exporter) = test_handler();
        let app = test::init_service(
            App::new()
                .app_data(Data::new(handler))
                .configure(primary_routes),
        )
        .await;
        let object = json!({
            "apiVersion": STABLE_V1,
            "kind": "Endpoint",
            "metadata": {"name": "web"},
            "spec": {"replicas": 1},
        });
        let body = review("uid-3", STABLE_V2, vec![object]);

        let resp = test::call_service(&app, convert_request(&body).to_request()).await;
        let review: ConversionReviewResponse = test::read_body_json(resp).await;
        assert_eq!(
            review.response.converted_objects,
            Some(vec![json!({
                "apiVersion": STABLE_V2,
                "kind": "Endpoint",
                "metadata": {"name": "web"},
                "spec": {"replicas": 1},
            })])
        );
    }

    #[actix_web::test]
    async fn test_failed_batch_is_encoded() {
        let (handler, exporter) = test_handler();
        let app = test::init_service(
            App::new()
                .app_data(Data::new(handler))
                .configure(primary_routes),
        )
        .await;
        let objects = ["a:1", "no-port", "c:3"]
            .iter()
            .enumerate()
            .map(|(i, host_port)| {
                json!({
                    "apiVersion": STABLE_V1,
                    "kind": "Endpoint",
                    "metadata": {"name": format!("endpoint-{}", i), "namespace": "default"},
                    "hostPort": host_port,
                })
            })
            .collect();
        let body = review("uid-4", STABLE_V2, objects);

        let resp = test::call_service(&app, convert_request(&body).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let review: ConversionReviewResponse = test::read_body_json(resp).await;
        assert_eq!(review.response.uid, "uid-4");
        assert_eq!(review.response.result.status, Status::Failure);
        assert_eq!(review.response.converted_objects, None);
        let message = review.response.result.message.unwrap();
        assert!(message.contains("Endpoint default/endpoint-1"), "{}", message);

        assert_eq!(metric(&exporter, "successful_requests"), "1");
        assert_eq!(metric(&exporter, "invalid_requests"), "0");
    }

    #[actix_web::test]
    async fn test_yaml_request_and_response() {
        let (handler, _exporter) = test_handler();
        let app = test::init_service(
            App::new()
                .app_data(Data::new(handler))
                .configure(primary_routes),
        )
        .await;
        let body = r#"
apiVersion: apiextensions.k8s.io/v1
kind: ConversionReview
request:
  uid: uid-yaml
  desiredAPIVersion: cluster.example.com/v1alpha4
  objects:
  - apiVersion: cluster.example.com/v1alpha3
    kind: Cluster
    metadata:
      name: workload
    spec:
      controlPlaneEndpoint:
        host: api.example.com
        port: 6443
    status:
      controlPlaneInitialized: true
"#;
        let req = test::TestRequest::post()
            .uri("/crdconvert")
            .insert_header((CONTENT_TYPE, "application/yaml"))
            .insert_header((ACCEPT, "application/yaml"))
            .set_payload(body)
            .to_request();

        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get(CONTENT_TYPE).unwrap(),
            "application/yaml"
        );

        let body = test::read_body(resp).await;
        let review: ConversionReviewResponse = serde_yaml::from_slice(&body).unwrap();
        assert_eq!(review.response.uid, "uid-yaml");
        let converted = &review.response.converted_objects.unwrap()[0];
        assert_eq!(converted["apiVersion"], CLUSTER_V1ALPHA4);
        assert_eq!(
            converted["status"]["conditions"],
            json!([{"type": "ControlPlaneInitialized", "status": "True"}])
        );
    }

    #[actix_web::test]
    async fn test_invalid_requests() {
        let (handler, exporter) = test_handler();
        let app = test::init_service(
            App::new()
                .app_data(Data::new(handler))
                .configure(primary_routes),
        )
        .await;
        let body = review("uid-5", STABLE_V2, vec![]);

        let unsupported = convert_request(&body)
            .insert_header((CONTENT_TYPE, "text/plain"))
            .to_request();
        let not_acceptable = convert_request(&body)
            .insert_header((ACCEPT, "text/nonexistent"))
            .to_request();
        let malformed = test::TestRequest::post()
            .uri("/crdconvert")
            .insert_header((CONTENT_TYPE, "application/json"))
            .set_payload("{\"apiVersion\": ")
            .to_request();
        let missing_content_type = test::TestRequest::post()
            .uri("/crdconvert")
            .set_payload(serde_json::to_vec(&body).unwrap())
            .to_request();

        for req in [unsupported, not_acceptable, malformed, missing_content_type] {
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
            assert!(test::read_body(resp).await.is_empty());
        }

        assert_eq!(metric(&exporter, "total_requests"), "4");
        assert_eq!(metric(&exporter, "invalid_requests"), "4");
        assert_eq!(metric(&exporter, "successful_requests"), "0");
        assert_eq!(metric(&exporter, "request_duration_seconds_count"), "4");
    }

    #[actix_web::test]
    async fn test_health_check() {
        let (handler, exporter) = test_handler();
        let app = test::init_service(
            App::new()
                .app_data(Data::new(handler))
                .configure(primary_routes),
        )
        .await;
        let req = test::TestRequest::get().uri("/healthz").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(test::read_body(resp).await, web::Bytes::from_static(b"ok"));
        assert_eq!(metric(&exporter, "total_requests"), "0");
    }

    #[actix_web::test]
    async fn test_concurrent_requests() {
        let (handler, exporter) = test_handler();
        let app = test::init_service(
            App::new()
                .app_data(Data::new(handler))
                .configure(primary_routes),
        )
        .await;
        let requests = (0..6).map(|i| {
            let (from, to, object) = if i % 2 == 0 {
                (
                    STABLE_V1,
                    STABLE_V2,
                    json!({"hostPort": format!("host-{}:{}", i, 8000 + i)}),
                )
            } else {
                (
                    STABLE_V2,
                    STABLE_V1,
                    json!({"host": format!("host-{}", i), "port": format!("{}", 8000 + i)}),
                )
            };
            let mut object = object;
            object["apiVersion"] = json!(from);
            object["kind"] = json!("Endpoint");
            let body = review(&format!("uid-{}", i), to, vec![object]);
            test::call_service(&app, convert_request(&body).to_request())
        });

        let responses = futures::future::join_all(requests).await;
        for (i, resp) in responses.into_iter().enumerate() {
            let review: ConversionReviewResponse = test::read_body_json(resp).await;
            assert_eq!(review.response.uid, format!("uid-{}", i));
            let converted = &review.response.converted_objects.unwrap()[0];
            if i % 2 == 0 {
                assert_eq!(converted["host"], format!("host-{}", i));
            } else {
                assert_eq!(converted["hostPort"], format!("host-{}:{}", i, 8000 + i));
            }
        }

        assert_eq!(metric(&exporter, "total_requests"), "6");
        assert_eq!(metric(&exporter, "successful_requests"), "6");
    }

    #[actix_web::test]
    async fn test_oversized_body_is_rejected() {
        let (handler, exporter) = test_handler();
        let app = test::init_service(
            App::new()
                .app_data(Data::new(handler.with_body_limit(256)))
                .configure(primary_routes),
        )
        .await;
        let padding = "x".repeat(1024);
        let body = review(
            "uid-large",
            STABLE_V2,
            vec![json!({
                "apiVersion": STABLE_V1,
                "kind": "Endpoint",
                "metadata": {"name": "web", "annotations": {"padding": padding}},
                "hostPort": "10.0.0.1:443",
            })],
        );

        let resp = test::call_service(&app, convert_request(&body).to_request()).await;
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(test::read_body(resp).await.is_empty());

        assert_eq!(metric(&exporter, "total_requests"), "1");
        assert_eq!(metric(&exporter, "invalid_requests"), "1");
        assert_eq!(metric(&exporter, "successful_requests"), "0");
    }

    #[actix_web::test]
    async fn test_body_limit_applies_without_content_length() {
        let (handler, exporter) = test_handler();
        let handler = handler.with_body_limit(16);
        let req = test::TestRequest::post()
            .uri("/crdconvert")
            .insert_header((CONTENT_TYPE, "application/json"))
            .to_http_request();
        let chunks = futures::stream::iter(vec![
            Ok::<_, PayloadError>(Bytes::from_static(b"{\"apiVersion\": ")),
            Ok(Bytes::from_static(b"\"apiextensions.k8s.io/v1\"}")),
        ]);

        let err = handler.respond(&req, chunks).await.unwrap_err();
        assert!(matches!(err, ReviewError::PayloadTooLarge { limit: 16 }));
        assert_eq!(metric(&exporter, "invalid_requests"), "1");
    }

    #[actix_web::test]
    async fn test_unreadable_body_is_internal_error() {
        let (handler, exporter) = test_handler();
        let req = test::TestRequest::post()
            .uri("/crdconvert")
            .insert_header((CONTENT_TYPE, "application/json"))
            .to_http_request();
        let chunks = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"{\"apiVersion\": ")),
            Err(PayloadError::Incomplete(None)),
        ]);

        let err = handler.respond(&req, chunks).await.unwrap_err();
        assert!(matches!(err, ReviewError::ReadBody { .. }));
        let resp = err.error_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body::to_bytes(resp.into_body()).await.unwrap().is_empty());

        assert_eq!(metric(&exporter, "total_requests"), "1");
        assert_eq!(metric(&exporter, "internal_error"), "1");
        assert_eq!(metric(&exporter, "invalid_requests"), "0");
        assert_eq!(metric(&exporter, "request_duration_seconds_count"), "1");
    }
}
