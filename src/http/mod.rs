//! axum router, request handlers, and the streaming response helpers that
//! sit on top of `Storage`.

mod body;
mod dir;
mod extract;
mod file;
mod ping;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::storage::Storage;

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<Storage>,
}

pub fn build_router(state: AppState) -> Router {
    let data_dir = ServeDir::new(state.storage.root());

    Router::new()
        .route("/api/ping", get(ping::ping))
        .route("/api/dir/list", get(dir::list))
        .route("/api/dir/download", get(dir::download))
        .route("/api/dir/new", post(dir::new_dir))
        .route("/api/dir/copy", post(dir::copy_dir))
        .route("/api/dir/move", post(dir::move_dir))
        .route("/api/dir/remove", post(dir::remove_dir))
        .route("/api/file/view", get(file::view))
        .route("/api/file/download", get(file::download))
        .route("/api/file/new", post(file::new_file))
        .route("/api/file/upload", post(file::upload))
        .route("/api/file/copy", post(file::copy_file))
        .route("/api/file/move", post(file::move_file))
        .route("/api/file/remove", post(file::remove_file))
        .nest_service("/data", data_dir)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;

    fn router() -> (Router, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let storage = Arc::new(Storage::new(tmp.path().to_path_buf()));
        (build_router(AppState { storage }), tmp)
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
        hyper::body::to_bytes(response.into_body()).await.unwrap().to_vec()
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap()
    }

    fn get_request(uri: String) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    /// Builds a `path`-then-`data` multipart body, matching the field order
    /// `/api/file/upload` expects.
    fn multipart_request(uri: &str, path: &str, data: &[u8]) -> Request<Body> {
        const BOUNDARY: &str = "offcloud-test-boundary";
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(b"Content-Disposition: form-data; name=\"path\"\r\n\r\n");
        body.extend_from_slice(path.as_bytes());
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(b"Content-Disposition: form-data; name=\"data\"\r\n\r\n");
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn ping_returns_pong() {
        let (app, _tmp) = router();
        let res = app
            .oneshot(Request::builder().uri("/api/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await, json!({ "message": "pong" }));
    }

    #[tokio::test]
    async fn list_on_fresh_root_is_empty() {
        let (app, _tmp) = router();
        let res = app
            .oneshot(
                Request::builder()
                    .uri("/api/dir/list?path=/")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await, json!({ "result": [] }));
    }

    #[tokio::test]
    async fn new_file_then_list_shows_it() {
        let (app, _tmp) = router();
        let res = app
            .clone()
            .oneshot(json_request("POST", "/api/file/new", json!({ "path": "/a" })))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);

        let res = app
            .oneshot(
                Request::builder()
                    .uri("/api/dir/list?path=/")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            body_json(res).await,
            json!({ "result": [{ "path": "/a", "type": "f" }] })
        );
    }

    #[tokio::test]
    async fn new_file_nested_missing_ancestors() {
        let (app, _tmp) = router();
        let res = app
            .oneshot(json_request(
                "POST",
                "/api/file/new",
                json!({ "path": "/d1/d2/d3/f1" }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn new_file_twice_already_exists() {
        let (app, _tmp) = router();
        let app2 = app.clone();
        app2.oneshot(json_request("POST", "/api/file/new", json!({ "path": "/a" })))
            .await
            .unwrap();

        let res = app
            .oneshot(json_request("POST", "/api/file/new", json!({ "path": "/a" })))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body = body_json(res).await;
        assert!(body["error"].as_str().unwrap().contains("already exists"));
    }

    #[tokio::test]
    async fn escape_attempt_is_rejected() {
        let (app, _tmp) = router();
        let res = app
            .oneshot(
                Request::builder()
                    .uri("/api/dir/list?path=/../escape")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body = body_json(res).await;
        assert!(body["error"].as_str().unwrap().contains("DANGER"));
    }

    #[tokio::test]
    async fn missing_query_parameter_reports_which_one() {
        let (app, _tmp) = router();
        let res = app
            .oneshot(Request::builder().uri("/api/dir/list").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body = body_json(res).await;
        assert_eq!(body, json!({ "error": "missing query parameter 'path'" }));
    }

    #[tokio::test]
    async fn copy_same_src_dest_rejected() {
        let (app, _tmp) = router();
        let app2 = app.clone();
        app2.oneshot(json_request("POST", "/api/file/new", json!({ "path": "/a" })))
            .await
            .unwrap();

        let res = app
            .oneshot(json_request(
                "POST",
                "/api/file/copy",
                json!({ "src": "/a", "dest": "/a" }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body = body_json(res).await;
        assert!(body["error"].as_str().unwrap().contains("are the same"));
    }

    #[tokio::test]
    async fn upload_then_download_round_trips_bytes() {
        let (app, _tmp) = router();
        let res = app
            .clone()
            .oneshot(multipart_request("/api/file/upload", "/greeting", b"hello offcloud"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);

        let res = app
            .oneshot(get_request("/api/file/download?path=/greeting".to_string()))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_bytes(res).await, b"hello offcloud");
    }

    #[tokio::test]
    async fn copy_file_leaves_src_and_dest_with_identical_bytes() {
        let (app, _tmp) = router();
        app.clone()
            .oneshot(multipart_request("/api/file/upload", "/src", b"payload"))
            .await
            .unwrap();

        let res = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/file/copy",
                json!({ "src": "/src", "dest": "/dest" }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        for path in ["/src", "/dest"] {
            let res = app
                .clone()
                .oneshot(get_request(format!("/api/file/download?path={path}")))
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::OK);
            assert_eq!(body_bytes(res).await, b"payload");
        }
    }

    #[tokio::test]
    async fn move_file_leaves_dest_with_bytes_and_removes_src() {
        let (app, _tmp) = router();
        app.clone()
            .oneshot(multipart_request("/api/file/upload", "/src", b"move-me"))
            .await
            .unwrap();

        let res = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/file/move",
                json!({ "src": "/src", "dest": "/dest" }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let res = app
            .clone()
            .oneshot(get_request("/api/file/download?path=/src".to_string()))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body = body_json(res).await;
        assert!(body["error"].as_str().unwrap().contains("not found"));

        let res = app
            .oneshot(get_request("/api/file/download?path=/dest".to_string()))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_bytes(res).await, b"move-me");
    }

    #[tokio::test]
    async fn copy_dir_leaves_src_and_dest_both_listed() {
        let (app, _tmp) = router();
        app.clone()
            .oneshot(json_request("POST", "/api/dir/new", json!({ "path": "/srcdir" })))
            .await
            .unwrap();
        app.clone()
            .oneshot(multipart_request("/api/file/upload", "/srcdir/f", b"in-dir"))
            .await
            .unwrap();

        let res = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/dir/copy",
                json!({ "src": "/srcdir", "dest": "/destdir" }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        for (dir, expected) in [("/srcdir", "/srcdir/f"), ("/destdir", "/destdir/f")] {
            let res = app
                .clone()
                .oneshot(get_request(format!("/api/dir/list?path={dir}")))
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::OK);
            assert_eq!(
                body_json(res).await,
                json!({ "result": [{ "path": expected, "type": "f" }] })
            );
        }
    }

    #[tokio::test]
    async fn move_dir_removes_src_and_populates_dest() {
        let (app, _tmp) = router();
        app.clone()
            .oneshot(json_request("POST", "/api/dir/new", json!({ "path": "/srcdir" })))
            .await
            .unwrap();
        app.clone()
            .oneshot(multipart_request("/api/file/upload", "/srcdir/f", b"in-dir"))
            .await
            .unwrap();

        let res = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/dir/move",
                json!({ "src": "/srcdir", "dest": "/destdir" }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let res = app
            .clone()
            .oneshot(get_request("/api/dir/list?path=/srcdir".to_string()))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let res = app
            .oneshot(get_request("/api/dir/list?path=/destdir".to_string()))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            body_json(res).await,
            json!({ "result": [{ "path": "/destdir/f", "type": "f" }] })
        );
    }

    #[tokio::test]
    async fn dir_download_produces_zip_with_expected_entry() {
        let (app, _tmp) = router();
        app.clone()
            .oneshot(multipart_request("/api/file/upload", "/notes.txt", b"zip me"))
            .await
            .unwrap();

        let res = app
            .oneshot(get_request("/api/dir/download?path=/".to_string()))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            res.headers().get(axum::http::header::CONTENT_TYPE).unwrap(),
            "application/zip"
        );
        let bytes = body_bytes(res).await;
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
        let mut entry = archive.by_name("notes.txt").unwrap();
        let mut contents = String::new();
        entry.read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "zip me");
    }
}
