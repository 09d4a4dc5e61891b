//! Failure injection tests for the bridge.

use std::time::Duration;

use upload_bridge::http::BridgeResponse;

mod common;

#[tokio::test]
async fn unreachable_backend_is_500() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead = listener.local_addr().unwrap();
    drop(listener);

    let bridge = common::start_bridge(common::config_for(dead)).await;
    let res = common::client()
        .post(bridge.url("/upload"))
        .header("x-filename", "a.txt")
        .body("data")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 500);
    let body: BridgeResponse = res.json().await.unwrap();
    assert!(body.message.unwrap().contains("failed to connect"));
    bridge.stop();
}

#[tokio::test]
async fn silent_backend_hits_read_timeout() {
    let backend = common::start_programmable_backend(|mut socket| async move {
        let _ = common::read_string(&mut socket).await;
        tokio::time::sleep(Duration::from_secs(5)).await;
    })
    .await;
    let mut config = common::config_for(backend);
    config.timeouts.read_secs = 1;
    let bridge = common::start_bridge(config).await;

    let res = common::client()
        .post(bridge.url("/upload"))
        .header("x-filename", "slow.txt")
        .body("data")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 500);
    let body: BridgeResponse = res.json().await.unwrap();
    assert!(body.message.unwrap().contains("timed out"));
    assert!(bridge.state.tracker.wait_for_drain(Duration::from_secs(1)).await);
    bridge.stop();
}

#[tokio::test]
async fn backend_dying_after_permission_is_500() {
    let backend = common::start_programmable_backend(|mut socket| async move {
        let _ = common::read_string(&mut socket).await;
        let _ = common::read_string(&mut socket).await;
        let _ = tokio::io::AsyncReadExt::read_i64(&mut socket).await;
        common::write_string(&mut socket, "ALLOWED").await;
    })
    .await;
    let bridge = common::start_bridge(common::config_for(backend)).await;

    let res = common::client()
        .post(bridge.url("/upload"))
        .header("x-filename", "half.bin")
        .body(vec![1u8; 256 * 1024])
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 500);
    let body: BridgeResponse = res.json().await.unwrap();
    assert!(!body.success);
    assert!(bridge.state.tracker.wait_for_drain(Duration::from_secs(1)).await);
    bridge.stop();
}

#[tokio::test]
async fn backend_that_stops_reading_is_500() {
    let backend = common::start_programmable_backend(|mut socket| async move {
        let _ = common::read_string(&mut socket).await;
        let _ = common::read_string(&mut socket).await;
        let _ = tokio::io::AsyncReadExt::read_i64(&mut socket).await;
        common::write_string(&mut socket, "ALLOWED").await;
        tokio::time::sleep(Duration::from_secs(10)).await;
    })
    .await;
    let mut config = common::config_for(backend);
    config.timeouts.write_secs = 1;
    config.timeouts.request_secs = 8;
    let bridge = common::start_bridge(config).await;

    let res = common::client()
        .post(bridge.url("/upload"))
        .header("x-filename", "stuck.bin")
        .body(vec![7u8; 64 * 1024 * 1024])
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 500);
    let body: BridgeResponse = res.json().await.unwrap();
    assert!(!body.success);
    assert!(body.message.unwrap().contains("timed out writing"));
    assert!(bridge.state.tracker.wait_for_drain(Duration::from_secs(1)).await);
    bridge.stop();
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let (backend, _seen) = common::start_upload_backend("ALLOWED", "OK").await;
    let mut config = common::config_for(backend);
    config.limits.max_upload_bytes = 1024;
    let bridge = common::start_bridge(config).await;

    let res = common::client()
        .post(bridge.url("/upload"))
        .header("x-filename", "big.bin")
        .body(vec![0u8; 4096])
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 413);
    let body: BridgeResponse = res.json().await.unwrap();
    assert!(!body.success);
    assert!(body.message.unwrap().contains("length limit"));
    assert_eq!(bridge.state.tracker.active_count(), 0);
    bridge.stop();
}

#[tokio::test]
async fn aborted_request_releases_backend_socket() {
    let backend = common::start_programmable_backend(|mut socket| async move {
        let _ = common::read_string(&mut socket).await;
        tokio::time::sleep(Duration::from_secs(5)).await;
    })
    .await;
    let mut config = common::config_for(backend);
    config.timeouts.read_secs = 30;
    let bridge = common::start_bridge(config).await;

    let client = common::client();
    let url = bridge.url("/upload");
    let pending = tokio::spawn(async move {
        let _ = client.post(url).header("x-filename", "a").body("x").send().await;
    });

    let mut opened = false;
    for _ in 0..40 {
        if bridge.state.tracker.active_count() == 1 {
            opened = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    assert!(opened, "handshake never reached the backend");

    pending.abort();
    assert!(
        bridge.state.tracker.wait_for_drain(Duration::from_secs(2)).await,
        "backend socket leaked after client abort"
    );
    bridge.stop();
}
