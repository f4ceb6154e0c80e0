use httpmock::prelude::*;
use serde_json::json;

use marketplace_adapter::provider::aliyun::AliyunClient;
use marketplace_adapter::provider::ProviderClient;

#[tokio::test]
async fn gateway_checkout_parses_token_expiry_and_availability() {
    let server = MockServer::start_async().await;

    let checkout_mock = server.mock(|when, then| {
        when.method(POST)
            .path("/check_out_license")
            .json_body(json!({ "Channel": "ComputeNest" }));
        then.status(200).json_body(json!({
            "code": 200,
            "requestId": "req-1",
            "result": {
                "Token": "tok-abc",
                "ExpireTime": "2026-09-01T12:00:00Z",
                "LicenseMetadata": { "CustomData": "15" }
            }
        }));
    });

    let client = AliyunClient::new(server.base_url()).unwrap();

    let (token, expiry) = client.token_and_expiry(1).await.unwrap();
    assert_eq!(token, "tok-abc");
    assert_eq!(expiry.to_rfc3339(), "2026-09-01T12:00:00+00:00");

    assert_eq!(client.available_entitlements().await.unwrap(), 15);
    assert!(client.check_in("tok-abc").await.unwrap());

    checkout_mock.assert_hits(3);
}

#[tokio::test]
async fn gateway_error_code_fails_checkout() {
    let server = MockServer::start_async().await;

    server.mock(|when, then| {
        when.method(POST).path("/check_out_license");
        then.status(200).json_body(json!({
            "code": 403,
            "requestId": "req-2"
        }));
    });

    let client = AliyunClient::new(server.base_url()).unwrap();

    let err = client.token_and_expiry(1).await.unwrap_err();
    assert!(err.to_string().contains("code 403"));
    assert!(client.available_entitlements().await.is_err());
}

#[tokio::test]
async fn gateway_http_failure_surfaces() {
    let server = MockServer::start_async().await;

    server.mock(|when, then| {
        when.method(POST).path("/check_out_license");
        then.status(503);
    });

    let client = AliyunClient::new(server.base_url()).unwrap();
    assert!(client.token_and_expiry(1).await.is_err());
    assert!(client.check_in("tok").await.is_err());
}

#[tokio::test]
async fn missing_token_or_entitlement_count_is_an_error() {
    let server = MockServer::start_async().await;

    server.mock(|when, then| {
        when.method(POST).path("/check_out_license");
        then.status(200).json_body(json!({
            "code": 200,
            "result": { "ExpireTime": "2026-09-01T12:00:00Z" }
        }));
    });

    let client = AliyunClient::new(server.base_url()).unwrap();
    assert!(client.token_and_expiry(1).await.is_err());
    assert!(client.available_entitlements().await.is_err());
}
