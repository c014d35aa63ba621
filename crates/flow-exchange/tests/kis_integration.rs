//! KIS 커넥터 통합 테스트 (mockito 서버).

use chrono::{Duration as ChronoDuration, Utc};
use flow_core::{Credential, FlowError, InMemoryTokenStore, Market, TokenStore};
use flow_exchange::connector::kis::{path, tr_id};
use flow_exchange::{
    DomesticMarketSource, KisClient, KisConfig, KisMarketProvider, KisTokenManager,
    OverseasChangeSource,
};
use mockito::{Matcher, Server, ServerGuard};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

fn test_config(base_url: &str) -> Arc<KisConfig> {
    Arc::new(
        KisConfig::new(base_url, "test-key", "test-secret")
            .with_request_spacing(Duration::ZERO)
            .with_retry_delays(vec![Duration::from_millis(5), Duration::from_millis(5)])
            .with_timeout(Duration::from_secs(5)),
    )
}

fn token_body(token: &str, expires_in: i64) -> String {
    json!({
        "access_token": token,
        "token_type": "Bearer",
        "expires_in": expires_in
    })
    .to_string()
}

fn stack(server: &ServerGuard) -> (KisTokenManager, Arc<KisClient>, Arc<InMemoryTokenStore>) {
    let config = test_config(&server.url());
    let store = Arc::new(InMemoryTokenStore::new());
    let tokens = KisTokenManager::new(config.clone(), store.clone()).unwrap();
    let client = Arc::new(KisClient::new(config, tokens.clone()).unwrap());
    (tokens, client, store)
}

#[tokio::test]
async fn test_concurrent_token_requests_share_one_acquisition() {
    let mut server = Server::new_async().await;
    let token_mock = server
        .mock("POST", path::TOKEN)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(token_body("shared-token", 86_400))
        .expect(1)
        .create_async()
        .await;

    let (tokens, _client, store) = stack(&server);

    let (a, b) = tokio::join!(tokens.get_token(), tokens.get_token());
    assert_eq!(a.unwrap().access_token(), "shared-token");
    assert_eq!(b.unwrap().access_token(), "shared-token");
    assert_eq!(tokens.acquisition_count(), 1);

    // 발급된 토큰은 영속 보관소에도 기록
    let stored = store.load("kis").await.unwrap().unwrap();
    assert_eq!(stored.access_token(), "shared-token");

    token_mock.assert_async().await;
}

#[tokio::test]
async fn test_token_inside_safety_margin_is_reacquired() {
    let mut server = Server::new_async().await;
    let token_mock = server
        .mock("POST", path::TOKEN)
        .with_status(200)
        .with_body(token_body("short-lived", 30))
        .expect(2)
        .create_async()
        .await;

    let (tokens, _client, _store) = stack(&server);

    tokens.get_token().await.unwrap();
    tokens.get_token().await.unwrap();
    assert_eq!(tokens.acquisition_count(), 2);

    token_mock.assert_async().await;
}

#[tokio::test]
async fn test_stored_token_is_promoted_without_network() {
    let mut server = Server::new_async().await;
    let token_mock = server
        .mock("POST", path::TOKEN)
        .expect(0)
        .create_async()
        .await;

    let (tokens, _client, store) = stack(&server);
    store
        .save(
            "kis",
            &Credential::new("persisted", Utc::now() + ChronoDuration::hours(6)),
        )
        .await
        .unwrap();

    assert_eq!(tokens.get_token().await.unwrap().access_token(), "persisted");
    // 두 번째는 메모리 캐시
    assert_eq!(tokens.get_token().await.unwrap().access_token(), "persisted");
    assert_eq!(tokens.acquisition_count(), 0);

    token_mock.assert_async().await;
}

#[tokio::test]
async fn test_token_error_code_maps_to_provider_error() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", path::TOKEN)
        .with_status(403)
        .with_body(
            json!({"error_code": "EGW00133", "error_description": "접근토큰 발급 잠시 후 다시 시도하세요(1분당 1회)"})
                .to_string(),
        )
        .create_async()
        .await;

    let (tokens, _client, _store) = stack(&server);
    match tokens.get_token().await {
        Err(FlowError::Provider { code, status, .. }) => {
            assert_eq!(code.as_deref(), Some("EGW00133"));
            assert_eq!(status, Some(403));
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_expired_token_is_refreshed_once() {
    let mut server = Server::new_async().await;
    let token_mock = server
        .mock("POST", path::TOKEN)
        .with_status(200)
        .with_body(token_body("fresh", 86_400))
        .expect(2)
        .create_async()
        .await;

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    server
        .mock("GET", path::INVESTOR_TIME_BY_MARKET)
        .match_query(Matcher::Any)
        .match_header("tr_id", tr_id::INVESTOR_TIME_BY_MARKET)
        .match_header("appkey", "test-key")
        .with_status(200)
        .with_body_from_request(move |_| {
            let body = if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                json!({"rt_cd": "1", "msg_cd": "EGW00123", "msg1": "기간이 만료된 token 입니다."})
            } else {
                json!({
                    "rt_cd": "0",
                    "output": [
                        {"prsn_ntby_tr_pbmn": "-10", "frgn_ntby_tr_pbmn": "5", "orgn_ntby_tr_pbmn": "5"},
                        {"prsn_ntby_tr_pbmn": "-1,200", "frgn_ntby_tr_pbmn": "700", "orgn_ntby_tr_pbmn": "500"}
                    ]
                })
            };
            body.to_string().into_bytes()
        })
        .expect(2)
        .create_async()
        .await;

    let (tokens, client, _store) = stack(&server);
    let provider = KisMarketProvider::new(client);

    let flow = provider.investor_flow(Market::Kospi).await.unwrap();
    assert_eq!(flow.individual, -1200.0);
    assert_eq!(flow.foreign, 700.0);
    assert_eq!(flow.institution, 500.0);
    assert_eq!(tokens.invalidation_count(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    token_mock.assert_async().await;
}

#[tokio::test]
async fn test_repeated_expiry_surfaces_auth_expired() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", path::TOKEN)
        .with_status(200)
        .with_body(token_body("fresh", 86_400))
        .expect(2)
        .create_async()
        .await;
    server
        .mock("GET", path::INDEX_TIME_PRICE)
        .match_query(Matcher::Any)
        .with_status(500)
        .with_body("token expired")
        .expect(2)
        .create_async()
        .await;

    let (tokens, client, _store) = stack(&server);
    let provider = KisMarketProvider::new(client);

    let result = provider.index_quote(Market::Kosdaq).await;
    assert!(matches!(result, Err(FlowError::AuthExpired(_))));
    assert_eq!(tokens.invalidation_count(), 1);
}

#[tokio::test]
async fn test_unreachable_host_is_transient_network() {
    let config = test_config("http://127.0.0.1:1");
    let store = Arc::new(InMemoryTokenStore::new());
    store
        .save(
            "kis",
            &Credential::new("persisted", Utc::now() + ChronoDuration::hours(6)),
        )
        .await
        .unwrap();
    let tokens = KisTokenManager::new(config.clone(), store).unwrap();
    let client = KisClient::new(config, tokens).unwrap();

    let result = client
        .get(path::INDEX_TIME_PRICE, tr_id::INDEX_TIME_PRICE, &[])
        .await;
    match result {
        Err(err) => {
            assert!(err.is_retryable(), "unexpected error: {:?}", err);
            assert!(matches!(err, FlowError::TransientNetwork(_)));
        }
        Ok(_) => panic!("request to closed port should fail"),
    }
}

#[tokio::test]
async fn test_missing_output_is_provider_error() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", path::TOKEN)
        .with_status(200)
        .with_body(token_body("t", 86_400))
        .create_async()
        .await;
    server
        .mock("GET", path::INDEX_TIME_PRICE)
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(json!({"rt_cd": "0", "msg1": "정상처리"}).to_string())
        .create_async()
        .await;

    let (_tokens, client, _store) = stack(&server);
    let result = client
        .get(path::INDEX_TIME_PRICE, tr_id::INDEX_TIME_PRICE, &[])
        .await;
    match result {
        Err(FlowError::Provider { message, .. }) => {
            assert_eq!(message, "KIS response missing output.")
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_non_expiry_failure_is_provider_error() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", path::TOKEN)
        .with_status(200)
        .with_body(token_body("t", 86_400))
        .create_async()
        .await;
    server
        .mock("GET", path::INVESTOR_TIME_BY_MARKET)
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(
            json!({"rt_cd": "1", "msg_cd": "EGW00201", "msg1": "초당 거래건수를 초과하였습니다."})
                .to_string(),
        )
        .create_async()
        .await;

    let (tokens, client, _store) = stack(&server);
    let provider = KisMarketProvider::new(client);
    match provider.investor_flow(Market::Kosdaq).await {
        Err(FlowError::Provider { code, .. }) => assert_eq!(code.as_deref(), Some("EGW00201")),
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(tokens.invalidation_count(), 0);
}

#[tokio::test]
async fn test_empty_output_is_data_shape_error() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", path::TOKEN)
        .with_status(200)
        .with_body(token_body("t", 86_400))
        .create_async()
        .await;
    server
        .mock("GET", path::INVESTOR_TIME_BY_MARKET)
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(json!({"rt_cd": "0", "output": []}).to_string())
        .create_async()
        .await;

    let (_tokens, client, _store) = stack(&server);
    let provider = KisMarketProvider::new(client);
    assert!(matches!(
        provider.investor_flow(Market::Kospi).await,
        Err(FlowError::DataShape(_))
    ));
}

#[tokio::test]
async fn test_overseas_change_from_output1() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", path::TOKEN)
        .with_status(200)
        .with_body(token_body("t", 86_400))
        .create_async()
        .await;
    server
        .mock("GET", path::OVERSEAS_DAILY_CHART)
        .match_query(Matcher::UrlEncoded("FID_INPUT_ISCD".into(), "COMP".into()))
        .match_header("tr_id", tr_id::OVERSEAS_DAILY_CHART)
        .with_status(200)
        .with_body(
            json!({
                "rt_cd": "0",
                "output1": {"ovrs_nmix_prpr": "16,200.00", "ovrs_nmix_prdy_clpr": "16,000.00"},
                "output2": [{"stck_bsop_date": "20240102"}]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let (_tokens, client, _store) = stack(&server);
    let provider = KisMarketProvider::new(client);
    let change = provider.fetch_overseas_change().await.unwrap();
    assert!((change - 1.25).abs() < 1e-9);
}

#[tokio::test]
async fn test_http_error_with_expired_code_refreshes_token() {
    let mut server = Server::new_async().await;
    let issued = Arc::new(AtomicUsize::new(0));
    let counter = issued.clone();
    server
        .mock("POST", path::TOKEN)
        .with_status(200)
        .with_body_from_request(move |_| {
            let token = if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                "stale"
            } else {
                "fresh"
            };
            token_body(token, 86_400).into_bytes()
        })
        .expect(2)
        .create_async()
        .await;
    // 메시지에 "token"이 없어도 EGW00123 코드로 만료를 판정
    let expired = server
        .mock("GET", path::INDEX_TIME_PRICE)
        .match_query(Matcher::Any)
        .match_header("authorization", "Bearer stale")
        .with_status(500)
        .with_body(
            json!({"rt_cd": "1", "msg_cd": "EGW00123", "msg1": "접근토큰 유효기간이 지났습니다"})
                .to_string(),
        )
        .expect(1)
        .create_async()
        .await;
    let ok = server
        .mock("GET", path::INDEX_TIME_PRICE)
        .match_query(Matcher::Any)
        .match_header("authorization", "Bearer fresh")
        .with_status(200)
        .with_body(json!({"rt_cd": "0", "output": [{"bstp_nmix_prdy_ctrt": "0.42"}]}).to_string())
        .expect(1)
        .create_async()
        .await;

    let (tokens, client, _store) = stack(&server);
    let payload = client
        .get(path::INDEX_TIME_PRICE, tr_id::INDEX_TIME_PRICE, &[])
        .await
        .unwrap();
    assert_eq!(payload.output[0]["bstp_nmix_prdy_ctrt"], "0.42");
    assert_eq!(tokens.invalidation_count(), 1);
    assert_eq!(tokens.acquisition_count(), 2);

    expired.assert_async().await;
    ok.assert_async().await;
}

#[tokio::test]
async fn test_http_error_without_expiry_signal_is_provider_error() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", path::TOKEN)
        .with_status(200)
        .with_body(token_body("t", 86_400))
        .create_async()
        .await;
    server
        .mock("GET", path::INDEX_TIME_PRICE)
        .match_query(Matcher::Any)
        .with_status(500)
        .with_body(
            json!({"rt_cd": "1", "msg_cd": "EGW00201", "msg1": "초당 거래건수를 초과하였습니다."})
                .to_string(),
        )
        .create_async()
        .await;

    let (tokens, client, _store) = stack(&server);
    let result = client
        .get(path::INDEX_TIME_PRICE, tr_id::INDEX_TIME_PRICE, &[])
        .await;
    assert!(matches!(
        result,
        Err(FlowError::Provider {
            status: Some(500),
            ..
        })
    ));
    assert_eq!(tokens.invalidation_count(), 0);
}

/// 첫 연결은 바로 끊고, 이후 연결에는 `body`로 응답하는 서버.
async fn flaky_server(body: String) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let connections = Arc::new(AtomicUsize::new(0));
    let seen = connections.clone();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                drop(socket);
                continue;
            }
            let mut buf = vec![0u8; 8192];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    (format!("http://{}", addr), connections)
}

async fn persisted_store() -> Arc<InMemoryTokenStore> {
    let store = Arc::new(InMemoryTokenStore::new());
    store
        .save(
            "kis",
            &Credential::new("persisted", Utc::now() + ChronoDuration::hours(6)),
        )
        .await
        .unwrap();
    store
}

#[tokio::test]
async fn test_transport_failure_is_retried_then_succeeds() {
    let body = json!({"rt_cd": "0", "output": [{"bstp_nmix_prdy_ctrt": "-0.15"}]}).to_string();
    let (base_url, connections) = flaky_server(body).await;

    let config = test_config(&base_url);
    let tokens = KisTokenManager::new(config.clone(), persisted_store().await).unwrap();
    let client = KisClient::new(config, tokens.clone()).unwrap();

    let payload = client
        .get(path::INDEX_TIME_PRICE, tr_id::INDEX_TIME_PRICE, &[])
        .await
        .unwrap();
    assert_eq!(payload.output[0]["bstp_nmix_prdy_ctrt"], "-0.15");
    assert_eq!(connections.load(Ordering::SeqCst), 2);
    assert_eq!(tokens.acquisition_count(), 0);
    assert_eq!(tokens.invalidation_count(), 0);
}

#[tokio::test]
async fn test_request_spacing_is_shared_across_concurrent_calls() {
    let mut server = Server::new_async().await;
    let quotes = server
        .mock("GET", path::INDEX_TIME_PRICE)
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(json!({"rt_cd": "0", "output": [{"bstp_nmix_prdy_ctrt": "0.1"}]}).to_string())
        .expect(2)
        .create_async()
        .await;

    let spacing = Duration::from_millis(150);
    let config = Arc::new(
        KisConfig::new(server.url(), "test-key", "test-secret")
            .with_request_spacing(spacing)
            .with_timeout(Duration::from_secs(5)),
    );
    let tokens = KisTokenManager::new(config.clone(), persisted_store().await).unwrap();
    let client = KisClient::new(config, tokens).unwrap();

    let started = Instant::now();
    let (a, b) = tokio::join!(
        client.get(path::INDEX_TIME_PRICE, tr_id::INDEX_TIME_PRICE, &[]),
        client.get(path::INDEX_TIME_PRICE, tr_id::INDEX_TIME_PRICE, &[])
    );
    let elapsed = started.elapsed();

    assert!(a.is_ok() && b.is_ok());
    assert!(elapsed >= spacing * 2, "elapsed {:?}", elapsed);
    quotes.assert_async().await;
}
