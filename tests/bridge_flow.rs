//! End-to-end tests: HTTP client → bridge → mock TCP backend.

use std::time::Duration;

use tokio::io::AsyncWriteExt;
use upload_bridge::http::BridgeResponse;
use upload_bridge::protocol::codec::{encode_i64, encode_string};

mod common;

#[tokio::test]
async fn granted_upload_returns_final_message() {
    let (backend, mut seen) = common::start_upload_backend("ALLOWED", "OK").await;
    let bridge = common::start_bridge(common::config_for(backend)).await;

    let res = common::client()
        .post(bridge.url("/upload"))
        .header("x-filename", "quarterly%20report.pdf")
        .body(b"%PDF-1.7 fake".to_vec())
        .send()
        .await
        .expect("Bridge unreachable");

    assert_eq!(res.status(), 200);
    assert!(res.headers().contains_key("x-request-id"));
    let body: BridgeResponse = res.json().await.unwrap();
    assert_eq!(body, BridgeResponse::success("OK"));

    let seen = seen.recv().await.unwrap();
    assert_eq!(seen.op, "UPLOAD");
    assert_eq!(seen.filename, "quarterly report.pdf");
    assert_eq!(seen.size, 13);
    assert_eq!(seen.payload, b"%PDF-1.7 fake");

    assert!(bridge.state.tracker.wait_for_drain(Duration::from_secs(1)).await);
    bridge.stop();
}

#[tokio::test]
async fn denied_upload_is_403_and_sends_no_payload() {
    let (backend, mut seen) = common::start_upload_backend("DENIED: quota exceeded", "").await;
    let bridge = common::start_bridge(common::config_for(backend)).await;

    let res = common::client()
        .post(bridge.url("/upload"))
        .header("x-filename", "huge.iso")
        .body(vec![0u8; 64 * 1024])
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 403);
    let body: BridgeResponse = res.json().await.unwrap();
    assert_eq!(body, BridgeResponse::failure("DENIED: quota exceeded"));

    let seen = seen.recv().await.unwrap();
    assert_eq!(seen.size, 64 * 1024);
    assert!(seen.payload.is_empty(), "payload bytes leaked after denial");
    bridge.stop();
}

#[tokio::test]
async fn backend_closing_before_reply_is_500() {
    let backend = common::start_programmable_backend(|socket| async move {
        drop(socket);
    })
    .await;
    let bridge = common::start_bridge(common::config_for(backend)).await;

    let res = common::client()
        .post(bridge.url("/upload"))
        .header("x-filename", "a.txt")
        .body("hello")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 500);
    let body: BridgeResponse = res.json().await.unwrap();
    assert!(!body.success);
    assert!(body.message.unwrap().contains("backend"));
    assert!(bridge.state.tracker.wait_for_drain(Duration::from_secs(1)).await);
    bridge.stop();
}

#[tokio::test]
async fn zero_byte_upload_completes_handshake() {
    let (backend, mut seen) = common::start_upload_backend("ALLOWED", "stored").await;
    let bridge = common::start_bridge(common::config_for(backend)).await;

    let res = common::client()
        .post(bridge.url("/upload"))
        .header("x-filename", "empty.txt")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 200);
    let body: BridgeResponse = res.json().await.unwrap();
    assert_eq!(body.message.as_deref(), Some("stored"));

    let seen = seen.recv().await.unwrap();
    assert_eq!(seen.size, 0);
    assert!(seen.payload.is_empty());
    bridge.stop();
}

#[tokio::test]
async fn missing_filename_header_uses_default_name() {
    let (backend, mut seen) = common::start_upload_backend("ALLOWED", "OK").await;
    let bridge = common::start_bridge(common::config_for(backend)).await;

    let res = common::client()
        .post(bridge.url("/upload"))
        .body("x")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(seen.recv().await.unwrap().filename, "uploaded_file");
    bridge.stop();
}

#[tokio::test]
async fn concurrent_uploads_use_independent_connections() {
    let (backend, mut seen) = common::start_upload_backend("ALLOWED", "OK").await;
    let bridge = common::start_bridge(common::config_for(backend)).await;
    let client = common::client();

    let mut tasks = Vec::new();
    for i in 0..8 {
        let client = client.clone();
        let url = bridge.url("/upload");
        tasks.push(tokio::spawn(async move {
            client
                .post(url)
                .header("x-filename", format!("file-{}.bin", i))
                .body(vec![i as u8; 1000 * (i + 1)])
                .send()
                .await
                .unwrap()
                .status()
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap(), 200);
    }

    let mut names = Vec::new();
    for _ in 0..8 {
        let upload = seen.recv().await.unwrap();
        assert_eq!(upload.payload.len() as i64, upload.size);
        names.push(upload.filename);
    }
    names.sort();
    names.dedup();
    assert_eq!(names.len(), 8);
    assert!(bridge.state.tracker.wait_for_drain(Duration::from_secs(1)).await);
    bridge.stop();
}

#[tokio::test]
async fn download_returns_file_bytes() {
    let backend = common::start_programmable_backend(|mut socket| async move {
        assert_eq!(common::read_string(&mut socket).await, "DOWNLOAD");
        let name = common::read_string(&mut socket).await;
        if name == "notes.txt" {
            socket.write_all(&encode_i64(5)).await.unwrap();
            socket.write_all(b"hello").await.unwrap();
            socket.write_all(&encode_string("OK").unwrap()).await.unwrap();
        } else {
            socket.write_all(&encode_i64(-1)).await.unwrap();
            common::write_string(&mut socket, "ERROR: File not found").await;
        }
    })
    .await;
    let bridge = common::start_bridge(common::config_for(backend)).await;
    let client = common::client();

    let res = client.get(bridge.url("/download/notes.txt")).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["content-type"], "application/octet-stream");
    assert_eq!(res.headers()["x-backend-message"], "OK");
    assert_eq!(&res.bytes().await.unwrap()[..], b"hello");

    let res = client.get(bridge.url("/download/ghost.txt")).send().await.unwrap();
    assert_eq!(res.status(), 404);
    let body: BridgeResponse = res.json().await.unwrap();
    assert_eq!(body, BridgeResponse::failure("ERROR: File not found"));
    bridge.stop();
}

#[tokio::test]
async fn reloaded_config_targets_new_backend() {
    let (old_backend, _old_seen) = common::start_upload_backend("ALLOWED", "old").await;
    let (new_backend, _new_seen) = common::start_upload_backend("ALLOWED", "new").await;
    let bridge = common::start_bridge(common::config_for(old_backend)).await;
    let client = common::client();

    bridge.config_tx.send(common::config_for(new_backend)).unwrap();
    let mut message = None;
    for _ in 0..20 {
        let res = client.post(bridge.url("/upload")).body("x").send().await.unwrap();
        let body: BridgeResponse = res.json().await.unwrap();
        if body.message.as_deref() == Some("new") {
            message = body.message;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(message.as_deref(), Some("new"));
    bridge.stop();
}
