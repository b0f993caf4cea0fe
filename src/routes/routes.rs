//! Routes of the credential service.
//!
//! ## Structure
//! - **Access endpoints**
//!   - `POST   /v1/access`                  register an access grant
//!   - `GET    /v1/access/{access_key_id}`  resolve grant and secret key
//!
//! - **Record endpoints** (raw key/value contract)
//!   - `PUT    /v1/records/{key_hash}`             insert, at most once
//!   - `GET    /v1/records/{key_hash}`             fetch
//!   - `DELETE /v1/records/{key_hash}`             delete, idempotent
//!   - `POST   /v1/records/{key_hash}/invalidate`  invalidate, first reason wins

use crate::{
    handlers::{
        auth_handlers::{
            delete_record, get_access, get_record, invalidate_record, put_record,
            register_access,
        },
        health_handlers::{healthz, readyz},
    },
    services::auth_db::Database,
};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Build the router. Handlers share the credential [`Database`] as state.
pub fn routes() -> Router<Database> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/v1/access", post(register_access))
        .route("/v1/access/{access_key_id}", get(get_access))
        .route(
            "/v1/records/{key_hash}",
            put(put_record).get(get_record).delete(delete_record),
        )
        .route("/v1/records/{key_hash}/invalidate", post(invalidate_record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::access::AccessGrant;
    use crate::services::memory_kv::MemoryKv;
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode},
    };
    use serde_json::{Value, json};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app() -> Router {
        routes().with_state(Database::new(Arc::new(MemoryKv::new())))
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), 1 << 20).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn serialized_grant() -> String {
        AccessGrant {
            satellite_address: "sat.example:7777".into(),
            api_key: b"api-key".to_vec(),
            root_secret: vec![2; 32],
            prefixes: Vec::new(),
        }
        .serialize()
        .unwrap()
    }

    #[tokio::test]
    async fn healthz_is_ok() {
        let response = app()
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn readyz_pings_the_store() {
        let response = app()
            .oneshot(Request::builder().uri("/readyz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["checks"]["kv"]["ok"], true);
    }

    #[tokio::test]
    async fn register_then_resolve_access() {
        let app = app();
        let grant = serialized_grant();
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/v1/access",
                json!({ "access_grant": grant }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let registered = body_json(response).await;
        let access_key_id = registered["access_key_id"].as_str().unwrap().to_string();

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/v1/access/{}", access_key_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let resolved = body_json(response).await;
        assert_eq!(resolved["access_grant"], grant.as_str());
        assert_eq!(resolved["secret_key"], registered["secret_key"]);
    }

    #[tokio::test]
    async fn malformed_grant_is_bad_request() {
        let response = app()
            .oneshot(json_request(
                "POST",
                "/v1/access",
                json!({ "access_grant": "%%%" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn record_lifecycle_over_http() {
        let app = app();
        let hash = "ab".repeat(32);
        let record = json!({
            "satellite_address": "sat",
            "macaroon_head": [1, 2],
            "encrypted_secret_key": [3],
            "encrypted_access_grant": [4],
        });
        let uri = format!("/v1/records/{}", hash);

        let put = app
            .clone()
            .oneshot(json_request("PUT", &uri, record.clone()))
            .await
            .unwrap();
        assert_eq!(put.status(), StatusCode::OK);

        let again = app
            .clone()
            .oneshot(json_request("PUT", &uri, record.clone()))
            .await
            .unwrap();
        assert_eq!(again.status(), StatusCode::CONFLICT);

        for reason in ["reason-A", "reason-B"] {
            let invalidated = app
                .clone()
                .oneshot(json_request(
                    "POST",
                    &format!("{}/invalidate", uri),
                    json!({ "reason": reason }),
                ))
                .await
                .unwrap();
            assert_eq!(invalidated.status(), StatusCode::NO_CONTENT);
        }

        let get = app
            .clone()
            .oneshot(Request::builder().uri(&uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(get.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(get).await["error"], "reason-A");

        let delete = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(&uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(delete.status(), StatusCode::NO_CONTENT);

        let get = app
            .oneshot(Request::builder().uri(&uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(get.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_key_hash_is_bad_request() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/v1/records/not-hex")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
