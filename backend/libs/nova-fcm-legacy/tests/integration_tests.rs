/// Integration tests for the FCM legacy client against a mock gateway
use nova_fcm_legacy::{
    ApnsBatchRequest, BackoffPolicy, CancellationToken, FCMError, FcmClient, FcmConfig, Message,
};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MULTICAST_REPLY: &str = r#"{"multicast_id":1003859738309903334,"success":2,"failure":1,"canonical_ids":0,"results":[{"message_id":"0:1448128667408487%ecaaa23db3fd7efd"},{"message_id":"0:1468135657607438%ecafacddf9ff8ead"},{"error":"InvalidRegistration"}]}"#;
const UNAVAILABLE_REPLY: &str = r#"{"multicast_id":1,"success":2,"failure":1,"canonical_ids":0,"results":[{"message_id":"a"},{"message_id":"b"},{"error":"Unavailable"}]}"#;

fn data() -> HashMap<String, String> {
    HashMap::from([
        ("msg".to_string(), "Hello World".to_string()),
        ("sum".to_string(), "Happy Day".to_string()),
    ])
}

fn tokens() -> Vec<String> {
    vec![
        "token0".to_string(),
        "token1".to_string(),
        "token2".to_string(),
    ]
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn client(server: &MockServer) -> FcmClient {
    init_tracing();
    let config = FcmConfig::new("test-key")
        .with_send_url(format!("{}/fcm/send", server.uri()))
        .with_iid_base_url(server.uri())
        .with_backoff(BackoffPolicy::new(
            Duration::from_millis(5),
            Duration::from_millis(20),
        ))
        .with_request_timeout(Duration::from_secs(5));
    FcmClient::new(config).unwrap()
}

// ==================== Send Tests ====================

#[tokio::test]
async fn test_multicast_counts_match_recipients() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/fcm/send"))
        .and(header("Authorization", "key=test-key"))
        .and(header("Content-Type", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_string(MULTICAST_REPLY))
        .expect(1)
        .mount(&server)
        .await;

    let message = Message::to_registration_ids(&tokens()[..1], data())
        .append_recipients(&tokens()[1..])
        .unwrap();
    let outcome = client(&server).send(&message).await.unwrap();

    assert!(outcome.ok);
    assert!(!outcome.is_retryable());
    assert_eq!((outcome.success + outcome.failure) as usize, tokens().len());
    assert_eq!(outcome.results.len(), tokens().len());

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = requests[0].body_json().unwrap();
    assert_eq!(body["registration_ids"], serde_json::json!(tokens()));
    assert_eq!(body["data"]["msg"], "Hello World");
}

#[tokio::test]
async fn test_topic_send() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/fcm/send"))
        .and(body_json(serde_json::json!({
            "to": "/topics/topicName",
            "data": {"msg": "Hello bits"}
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(r#"{"message_id":6985435902064854329}"#),
        )
        .expect(1)
        .mount(&server)
        .await;

    let message = Message::to_topic("/topics/topicName", data()).set_data(HashMap::from([(
        "msg".to_string(),
        "Hello bits".to_string(),
    )]));
    let outcome = client(&server).send(&message).await.unwrap();

    assert_eq!(outcome.message_id, Some(6985435902064854329));
    assert!(outcome.results.is_empty());
}

#[tokio::test]
async fn test_service_unavailable_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/fcm/send"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/fcm/send"))
        .respond_with(ResponseTemplate::new(200).set_body_string(MULTICAST_REPLY))
        .expect(1)
        .mount(&server)
        .await;

    let message = Message::to_registration_ids(&tokens(), data());
    let outcome = client(&server)
        .send_with_retries(&message, 2)
        .await
        .unwrap();

    assert!(outcome.ok);
    assert_eq!(outcome.success, 2);
}

#[tokio::test]
async fn test_unavailable_recipient_exhausts_retries() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/fcm/send"))
        .respond_with(ResponseTemplate::new(200).set_body_string(UNAVAILABLE_REPLY))
        .expect(3)
        .mount(&server)
        .await;

    let message = Message::to_registration_ids(&tokens(), data());
    let err = client(&server)
        .send_with_retries(&message, 2)
        .await
        .unwrap_err();

    match err {
        FCMError::RetriesExhausted { attempts, last } => {
            assert_eq!(attempts, 3);
            assert_eq!(last.retryable_recipients(&message), vec!["token2".to_string()]);
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_retry_after_header_is_honored() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/fcm/send"))
        .respond_with(ResponseTemplate::new(503).insert_header("Retry-After", "100ms"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/fcm/send"))
        .respond_with(ResponseTemplate::new(200).set_body_string(MULTICAST_REPLY))
        .mount(&server)
        .await;

    let message = Message::to_registration_ids(&tokens(), data());
    let start = Instant::now();
    client(&server)
        .send_with_retries(&message, 1)
        .await
        .unwrap();

    assert!(start.elapsed() >= Duration::from_millis(100));
}

#[tokio::test]
async fn test_unauthorized_is_permanent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/fcm/send"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .expect(1)
        .mount(&server)
        .await;

    let message = Message::to_device("token0", data());
    let err = client(&server).send(&message).await.unwrap_err();

    let outcome = err.outcome().unwrap();
    assert!(matches!(err, FCMError::PermanentDelivery(_)));
    assert_eq!(outcome.status_code, 401);
    assert_eq!(outcome.error.as_deref(), Some("Unauthorized"));
}

#[tokio::test]
async fn test_connection_refused_is_transport_error() {
    // Reserve a port, then release it so nothing is listening there.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = FcmClient::new(
        FcmConfig::new("test-key").with_send_url(format!("http://{}/fcm/send", addr)),
    )
    .unwrap();

    let message = Message::to_device("token0", data());
    let result = client.send(&message).await;

    assert!(matches!(result, Err(FCMError::Transport(_))));
}

#[tokio::test]
async fn test_cancel_during_slow_gateway() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/fcm/send"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(MULTICAST_REPLY)
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let client = client(&server);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let message = Message::to_registration_ids(&tokens(), data());
    let start = Instant::now();
    let result = client.send_with_cancel(&message, 0, &cancel).await;

    assert!(matches!(result, Err(FCMError::Cancelled)));
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_concurrent_sends_share_client() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/fcm/send"))
        .respond_with(ResponseTemplate::new(200).set_body_string(MULTICAST_REPLY))
        .expect(8)
        .mount(&server)
        .await;

    let client = client(&server);
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let client = client.clone();
            tokio::spawn(async move {
                let message = Message::to_device(format!("token{}", i), data());
                client.send(&message).await
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }
}

// ==================== Instance ID Tests ====================

#[tokio::test]
async fn test_batch_subscribe_and_classify() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/iid/v1:batchAdd"))
        .and(header("Authorization", "key=test-key"))
        .and(body_json(serde_json::json!({
            "to": "/topics/news",
            "registration_tokens": ["token0", "token1", "token2"]
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"{"results":[{},{"error":"NOT_FOUND"},{"error":"INTERNAL"}]}"#),
        )
        .expect(1)
        .mount(&server)
        .await;

    let request_tokens = tokens();
    let response = client(&server)
        .batch_subscribe(&request_tokens, "/TOPICS/news")
        .await
        .unwrap();

    assert_eq!(response.status_code, 200);
    let classification =
        response.classify(&nova_fcm_legacy::BatchRequest::new(&request_tokens, "news"));
    assert_eq!(classification.succeeded, vec!["token0".to_string()]);
    assert_eq!(classification.retryable_tokens(), vec!["token2".to_string()]);
    assert_eq!(classification.rejected.len(), 1);
}

#[tokio::test]
async fn test_get_info_with_details() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/iid/info/tok"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"application":"com.comp.company","platform":"ANDROID","rel":{"topics":{"global":{"addDate":"2016-07-02"}}}}"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let info = client(&server).get_info("tok", true).await.unwrap();

    assert_eq!(info.platform.as_deref(), Some("ANDROID"));
    assert_eq!(info.subscribed_topics(), vec!["global"]);
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests[0].url.query(), Some("details=true"));
}

#[tokio::test]
async fn test_subscribe_single_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/iid/v1/DeviceToken/rel/topics/news"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(1)
        .mount(&server)
        .await;

    let response = client(&server)
        .subscribe_to_topic("DeviceToken", "/topics/news")
        .await
        .unwrap();

    assert!(response.is_success());
}

#[tokio::test]
async fn test_apns_batch_import() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/iid/v1:batchImport"))
        .and(body_json(serde_json::json!({
            "application": "com.comp.company",
            "sandbox": true,
            "apns_tokens": ["apns-a", "apns-b"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"results":[{"apns_token":"apns-a","status":"OK","registration_token":"reg-a"},{"apns_token":"apns-b","status":"Internal Server Error"}]}"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let request = ApnsBatchRequest::new(
        "com.comp.company",
        true,
        &["apns-a".to_string(), "apns-b".to_string()],
    );
    let response = client(&server).apns_batch_import(&request).await.unwrap();

    assert_eq!(response.registrations(), vec![("apns-a", "reg-a")]);
    assert_eq!(response.status, "200 OK");
}
