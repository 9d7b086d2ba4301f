use anyhow::Result;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_string_contains, method, path},
};

use notification_dispatcher::{
    models::job::NotificationPayload,
    providers::{
        MailerProvider, SendProvider, TwilioProvider,
        fcm::validate_device_token,
        mailer::MailerConfig,
        twilio::TwilioConfig,
    },
};

fn sms_payload(to: &str) -> NotificationPayload {
    NotificationPayload {
        to: to.to_string(),
        title: None,
        body: "your code is 1234".to_string(),
        data: None,
    }
}

fn email_payload(to: &str) -> NotificationPayload {
    NotificationPayload {
        to: to.to_string(),
        title: Some("Welcome".to_string()),
        body: "<p>hello</p>".to_string(),
        data: None,
    }
}

fn twilio_provider(api_base: String) -> TwilioProvider {
    TwilioProvider::new(
        "twilio-sms",
        TwilioConfig {
            account_sid: "AC123".to_string(),
            auth_token: "secret".to_string(),
            from: "+15550009999".to_string(),
            api_base: Some(api_base),
        },
    )
}

/// Test: a Twilio 201 with a sid is a successful send
#[tokio::test]
async fn test_twilio_send_success() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/2010-04-01/Accounts/AC123/Messages.json"))
        .and(body_string_contains("To=%2B15550001111"))
        .and(body_string_contains("From=%2B15550009999"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "sid": "SM1",
            "status": "queued"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = twilio_provider(server.uri());
    let outcome = provider.send(&sms_payload("+15550001111")).await;

    assert!(outcome.success);
    assert_eq!(outcome.message_id.as_deref(), Some("SM1"));

    Ok(())
}

/// Test: a Twilio error response surfaces the upstream message, not a panic
#[tokio::test]
async fn test_twilio_send_rejected() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/2010-04-01/Accounts/AC123/Messages.json"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "code": 21211,
            "message": "The 'To' number is not a valid phone number."
        })))
        .mount(&server)
        .await;

    let provider = twilio_provider(server.uri());
    let outcome = provider.send(&sms_payload("not-a-number")).await;

    assert!(!outcome.success);
    assert_eq!(
        outcome.error.as_deref(),
        Some("The 'To' number is not a valid phone number.")
    );

    Ok(())
}

/// Test: Twilio payload validation rejects empty fields before any request
#[test]
fn test_twilio_validate_payload() {
    let provider = twilio_provider("http://unused.invalid".to_string());

    assert!(provider.validate_payload(&sms_payload("+15550001111")).is_ok());
    assert!(provider.validate_payload(&sms_payload("")).is_err());

    let mut empty_body = sms_payload("+15550001111");
    empty_body.body = String::new();
    assert!(provider.validate_payload(&empty_body).is_err());
}

/// Test: the mail relay happy path returns the relay's message id
#[tokio::test]
async fn test_mailer_send_success() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/send"))
        .and(body_string_contains("\"to\":\"user@example.com\""))
        .and(body_string_contains("\"subject\":\"Welcome\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "message_id": "mail-1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = MailerProvider::new(MailerConfig {
        endpoint: format!("{}/send", server.uri()),
        from: "noreply@example.com".to_string(),
        api_token: None,
    });

    let outcome = provider.send(&email_payload("user@example.com")).await;

    assert!(outcome.success);
    assert_eq!(outcome.message_id.as_deref(), Some("mail-1"));

    Ok(())
}

/// Test: a relay failure body maps onto an unsuccessful outcome
#[tokio::test]
async fn test_mailer_send_failure() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/send"))
        .respond_with(ResponseTemplate::new(502).set_body_json(serde_json::json!({
            "error": "upstream smtp unavailable"
        })))
        .mount(&server)
        .await;

    let provider = MailerProvider::new(MailerConfig {
        endpoint: format!("{}/send", server.uri()),
        from: "noreply@example.com".to_string(),
        api_token: Some("relay-token".to_string()),
    });

    let outcome = provider.send(&email_payload("user@example.com")).await;

    assert!(!outcome.success);
    assert_eq!(outcome.error.as_deref(), Some("upstream smtp unavailable"));

    Ok(())
}

/// Test: mailer validation covers address shape, subject and body
#[test]
fn test_mailer_validate_payload() {
    let provider = MailerProvider::new(MailerConfig {
        endpoint: "http://unused.invalid".to_string(),
        from: "noreply@example.com".to_string(),
        api_token: None,
    });

    assert!(provider.validate_payload(&email_payload("user@example.com")).is_ok());
    assert!(provider.validate_payload(&email_payload("")).is_err());
    assert!(provider.validate_payload(&email_payload("not-an-address")).is_err());

    let mut no_subject = email_payload("user@example.com");
    no_subject.title = None;
    assert!(provider.validate_payload(&no_subject).is_err());

    let mut no_body = email_payload("user@example.com");
    no_body.body = String::new();
    assert!(provider.validate_payload(&no_body).is_err());
}

/// Test: device token validation bounds length and character set
#[test]
fn test_validate_device_token() {
    assert!(validate_device_token("valid_token-1234567890:APA91b.abc").is_ok());

    assert!(validate_device_token("").is_err());
    assert!(validate_device_token("too-short").is_err());
    assert!(validate_device_token(&"x".repeat(201)).is_err());
    assert!(validate_device_token("invalid token with spaces!!").is_err());
}
